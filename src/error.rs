use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A target specification that could not be turned into any endpoint.
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("invalid port '{port}'")]
    InvalidPort { port: String },

    #[error("malformed address '{target}'")]
    BadAddress { target: String },

    #[error("lookup of '{host}' failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("target resolves to no IP addresses")]
    NoAddresses { host: String },
}

/// Where in the connect/authenticate/exec sequence an attack stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Dial,
    Handshake,
    Session,
    ScriptExecution,
}

/// Per-endpoint failure. Never leaves the worker that produced it.
#[derive(Error, Debug)]
pub enum AttackError {
    #[error("dial failed: {0}")]
    Dial(#[source] std::io::Error),

    #[error("dial timeout")]
    DialTimeout,

    #[error("handshake failed: {0}")]
    Handshake(#[source] russh::Error),

    #[error("handshake timeout")]
    HandshakeTimeout,

    #[error("unable to authenticate as '{user}', attempted methods [{methods}]")]
    AuthRejected { user: String, methods: String },

    #[error("unable to open session: {0}")]
    SessionOpen(#[source] russh::Error),

    #[error("session open timeout")]
    SessionOpenTimeout,

    #[error("unable to start command: {0}")]
    Exec(#[source] russh::Error),

    #[error("server refused to run '{command}'")]
    CommandRejected { command: String },

    #[error("unable to send script: {0}")]
    Stdin(#[source] russh::Error),

    #[error("process exited with status {0}")]
    ExitStatus(u32),

    #[error("process killed by signal {signal}{}", format_signal_message(.message))]
    ExitSignal { signal: String, message: String },

    #[error("remote command exited without exit status or exit signal")]
    ExitMissing,

    #[error("session idle for {0:?}")]
    SessionTimeout(Duration),

    #[error("script did not finish in time")]
    ExecTimeout,
}

fn format_signal_message(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

impl AttackError {
    pub fn phase(&self) -> Phase {
        match self {
            AttackError::Dial(_) | AttackError::DialTimeout => Phase::Dial,
            AttackError::Handshake(_)
            | AttackError::HandshakeTimeout
            | AttackError::AuthRejected { .. } => Phase::Handshake,
            AttackError::SessionOpen(_)
            | AttackError::SessionOpenTimeout
            | AttackError::Exec(_)
            | AttackError::CommandRejected { .. } => Phase::Session,
            AttackError::Stdin(_)
            | AttackError::ExitStatus(_)
            | AttackError::ExitSignal { .. }
            | AttackError::ExitMissing
            | AttackError::SessionTimeout(_)
            | AttackError::ExecTimeout => Phase::ScriptExecution,
        }
    }
}

/// Conditions that stop the run before any worker starts.
#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("No targets specified")]
    NoTargets,

    #[error("Script file needed (--script)")]
    MissingScript,

    #[error("Unable to read script from {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Username needed (--user)")]
    MissingUser,

    #[error("Unable to read key from {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse key from {path}: {source}")]
    KeyParse {
        path: PathBuf,
        #[source]
        source: russh_keys::Error,
    },

    #[error("Error reading password from stdin: {0}")]
    PasswordRead(#[source] std::io::Error),
}

impl PreflightError {
    /// Process exit status for this condition.
    pub fn exit_code(&self) -> i32 {
        match self {
            PreflightError::MissingScript => 1,
            PreflightError::ScriptRead { .. } => 2,
            PreflightError::MissingUser => 3,
            PreflightError::KeyRead { .. } | PreflightError::KeyParse { .. } => 4,
            PreflightError::PasswordRead(_) => 5,
            PreflightError::NoTargets => 6,
        }
    }
}
