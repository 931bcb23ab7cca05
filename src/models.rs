use crate::error::{AttackError, Phase};
use russh_keys::key::KeyPair;
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 22;

/// A resolved `host:port` ready to be dialed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(pub SocketAddr);

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SocketAddr already brackets v6 hosts.
        write!(f, "{}", self.0)
    }
}

impl Serialize for Endpoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone)]
pub enum AuthMethod {
    PublicKey(Arc<KeyPair>),
    Password(String),
    /// Answers every prompt with the password.
    KeyboardInteractive(String),
}

impl AuthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::PublicKey(_) => "publickey",
            AuthMethod::Password(_) => "password",
            AuthMethod::KeyboardInteractive(_) => "keyboard-interactive",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a worker needs to attack one endpoint. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct SprayConfig {
    pub user: String,
    pub auth: Vec<AuthMethod>,
    pub interpreter: String,
    pub script: Vec<u8>,
    pub timeout: Duration,
    pub exec_timeout: Option<Duration>,
}

#[derive(Debug)]
pub struct AttackResult {
    pub endpoint: Endpoint,
    pub output: Option<Vec<u8>>,
    pub error: Option<AttackError>,
}

impl AttackResult {
    pub fn success(endpoint: Endpoint, output: Vec<u8>) -> Self {
        Self {
            endpoint,
            output: Some(output),
            error: None,
        }
    }

    /// The attack never reached the point of running anything.
    pub fn setup_failure(endpoint: Endpoint, error: AttackError) -> Self {
        Self {
            endpoint,
            output: None,
            error: Some(error),
        }
    }

    pub fn execution_failure(endpoint: Endpoint, output: Vec<u8>, error: AttackError) -> Self {
        Self {
            endpoint,
            output: Some(output),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    #[serde(rename = "error")]
    SetupFailure,
    #[serde(rename = "fail")]
    ExecutionFailure,
}

/// One classified line of output.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub endpoint: Endpoint,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_lossy"
    )]
    pub output: Option<Vec<u8>>,
}

fn serialize_lossy<S: serde::Serializer>(
    output: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match output {
        Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    pub attacked: usize,
    pub succeeded: usize,
    pub errored: usize,
    pub failed: usize,
    pub unresolved: usize,
}

impl PoolSummary {
    pub fn add(&mut self, outcome: Outcome) {
        self.attacked += 1;
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::SetupFailure => self.errored += 1,
            Outcome::ExecutionFailure => self.failed += 1,
        }
    }
}
