//! Targets evaluated against the rule set
//!
//! A target is either a process or a network connection taken from one
//! snapshot. Targets are rebuilt every cycle and dropped after matching.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A process as seen in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRef {
    pub pid: u32,
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl ProcessRef {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            username: None,
            status: "running".to_string(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

impl fmt::Display for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PID:{}, Name:{}, User:{}, Status:{}",
            self.pid,
            self.name,
            self.username.as_deref().unwrap_or("N/A"),
            self.status
        )
    }
}

/// One side of a socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ip.contains(':') {
            write!(f, "[{}]:{}", self.ip, self.port)
        } else {
            write!(f, "{}:{}", self.ip, self.port)
        }
    }
}

/// A network connection as seen in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRef {
    /// Owning process, when the OS reports one
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default, alias = "local_addr")]
    pub local: Option<Endpoint>,
    #[serde(default, alias = "remote_addr")]
    pub remote: Option<Endpoint>,
    #[serde(default)]
    pub status: String,
}

impl ConnectionRef {
    pub fn new(pid: Option<u32>, local: Option<Endpoint>, remote: Option<Endpoint>) -> Self {
        let status = if remote.is_some() {
            "ESTABLISHED"
        } else {
            "LISTEN"
        };
        Self {
            pid,
            local,
            remote,
            status: status.to_string(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn local_port(&self) -> Option<u16> {
        self.local.as_ref().map(|e| e.port)
    }

    pub fn remote_ip(&self) -> Option<&str> {
        self.remote.as_ref().map(|e| e.ip.as_str())
    }

    pub fn is_listening(&self) -> bool {
        self.status.eq_ignore_ascii_case("LISTEN")
    }

    pub fn is_established(&self) -> bool {
        self.status.eq_ignore_ascii_case("ESTABLISHED")
    }

    /// `local <-> remote`, with `-` for a missing side
    pub fn socket_pair(&self) -> String {
        format!(
            "{} <-> {}",
            endpoint_or_dash(self.local.as_ref()),
            endpoint_or_dash(self.remote.as_ref())
        )
    }
}

fn endpoint_or_dash(endpoint: Option<&Endpoint>) -> String {
    endpoint.map_or_else(|| "-".to_string(), Endpoint::to_string)
}

impl fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "PID:{} | ", pid)?,
            None => f.write_str("PID:- | ")?,
        }
        write!(f, "{} | Status:{}", self.socket_pair(), self.status)
    }
}

/// Kind tag recorded in audit entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Process,
    Connection,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Process => "process",
            TargetKind::Connection => "connection",
        }
    }
}

/// Something the firewall evaluates: exactly one of a process or a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Process(ProcessRef),
    Connection(ConnectionRef),
}

impl Target {
    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Process(_) => TargetKind::Process,
            Target::Connection(_) => TargetKind::Connection,
        }
    }

    /// The process the target belongs to, if any
    pub fn pid(&self) -> Option<u32> {
        match self {
            Target::Process(p) => Some(p.pid),
            Target::Connection(c) => c.pid,
        }
    }

    /// Local port, for connections
    pub fn port(&self) -> Option<u16> {
        match self {
            Target::Process(_) => None,
            Target::Connection(c) => c.local_port(),
        }
    }
}

impl From<ProcessRef> for Target {
    fn from(p: ProcessRef) -> Self {
        Target::Process(p)
    }
}

impl From<ConnectionRef> for Target {
    fn from(c: ConnectionRef) -> Self {
        Target::Connection(c)
    }
}
