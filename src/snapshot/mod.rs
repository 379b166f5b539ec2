//! Snapshot providers
//!
//! The pipeline does not care where targets come from. A provider hands
//! out the current processes and connections on demand.

#[cfg(any(target_os = "linux", test))]
mod procnet;
pub mod system;

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::target::{ConnectionRef, Endpoint, ProcessRef};

pub use system::SystemSnapshot;

/// Source of process and connection snapshots
pub trait SnapshotProvider {
    fn processes(&mut self) -> Result<Vec<ProcessRef>>;
    fn connections(&mut self) -> Result<Vec<ConnectionRef>>;

    /// Whether `connections()` reports real sockets. A provider that cannot
    /// enumerate them returns an empty list and `false` here.
    fn lists_connections(&self) -> bool {
        true
    }
}

/// Fixed in-memory snapshot
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticSnapshot {
    #[serde(default)]
    pub processes: Vec<ProcessRef>,
    #[serde(default)]
    pub connections: Vec<ConnectionRef>,
}

impl StaticSnapshot {
    pub fn new(processes: Vec<ProcessRef>, connections: Vec<ConnectionRef>) -> Self {
        Self {
            processes,
            connections,
        }
    }
}

impl SnapshotProvider for StaticSnapshot {
    fn processes(&mut self) -> Result<Vec<ProcessRef>> {
        Ok(self.processes.clone())
    }

    fn connections(&mut self) -> Result<Vec<ConnectionRef>> {
        Ok(self.connections.clone())
    }
}

/// Snapshot read from a JSON file shaped `{"processes": [...], "connections": [...]}`.
/// The file is re-read on every call.
#[derive(Debug, Clone)]
pub struct JsonSnapshot {
    path: PathBuf,
}

impl JsonSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StaticSnapshot> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl SnapshotProvider for JsonSnapshot {
    fn processes(&mut self) -> Result<Vec<ProcessRef>> {
        Ok(self.read()?.processes)
    }

    fn connections(&mut self) -> Result<Vec<ConnectionRef>> {
        Ok(self.read()?.connections)
    }
}

/// Synthetic demo: a handful of desktop apps, each with a few connections
#[derive(Debug, Clone)]
pub struct DemoSnapshot {
    processes: Vec<ProcessRef>,
    connections: Vec<ConnectionRef>,
}

const DEMO_APPS: &[(&str, usize)] = &[("Chrome", 3), ("Spotify", 2), ("VSCode", 1), ("Slack", 4)];
const DEMO_REMOTES: &[&str] = &["142.250.74.14", "35.186.224.25", "192.168.1.10", "13.107.6.158"];
const DEMO_PORTS: &[u16] = &[443, 8080, 80, 4070];

impl DemoSnapshot {
    pub fn new() -> Self {
        let mut processes = Vec::new();
        let mut connections = Vec::new();

        for (i, (name, conn_count)) in DEMO_APPS.iter().enumerate() {
            let pid = 1000 + i as u32;
            processes.push(ProcessRef::new(pid, *name).with_username("demo"));

            for c in 0..*conn_count {
                let slot = i + c;
                let local = Endpoint::new("127.0.0.1", DEMO_PORTS[slot % DEMO_PORTS.len()]);
                let remote = Endpoint::new(
                    DEMO_REMOTES[slot % DEMO_REMOTES.len()],
                    50000 + (i * 10 + c) as u16,
                );
                connections.push(ConnectionRef::new(Some(pid), Some(local), Some(remote)));
            }
        }

        Self {
            processes,
            connections,
        }
    }
}

impl Default for DemoSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotProvider for DemoSnapshot {
    fn processes(&mut self) -> Result<Vec<ProcessRef>> {
        Ok(self.processes.clone())
    }

    fn connections(&mut self) -> Result<Vec<ConnectionRef>> {
        Ok(self.connections.clone())
    }
}

/// Connections bound to a local port
pub fn owners_of_port(connections: &[ConnectionRef], port: u16) -> Vec<&ConnectionRef> {
    connections
        .iter()
        .filter(|c| c.local_port() == Some(port))
        .collect()
}
