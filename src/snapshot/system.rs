//! Live snapshots of the host
//!
//! Processes come from sysinfo. Sockets are read from `/proc/net` on Linux;
//! elsewhere `connections()` is empty and `lists_connections()` says so.

use sysinfo::{ProcessesToUpdate, System, Users};
use tracing::debug;

use super::SnapshotProvider;
use crate::error::Result;
use crate::target::{ConnectionRef, ProcessRef};

/// Reads the running processes from the OS
pub struct SystemSnapshot {
    system: System,
    users: Users,
}

impl SystemSnapshot {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            users: Users::new_with_refreshed_list(),
        }
    }
}

impl Default for SystemSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotProvider for SystemSnapshot {
    fn processes(&mut self) -> Result<Vec<ProcessRef>> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        self.users = Users::new_with_refreshed_list();

        let mut processes: Vec<ProcessRef> = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let username = process
                    .user_id()
                    .and_then(|uid| self.users.get_user_by_id(uid))
                    .map(|user| user.name().to_string());
                ProcessRef {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().into_owned(),
                    username,
                    status: process.status().to_string(),
                }
            })
            .collect();

        processes.sort_by_key(|p| p.pid);
        debug!(count = processes.len(), "process snapshot taken");
        Ok(processes)
    }

    #[cfg(target_os = "linux")]
    fn connections(&mut self) -> Result<Vec<ConnectionRef>> {
        let connections = super::procnet::connections(std::path::Path::new("/proc"))?;
        debug!(count = connections.len(), "socket snapshot taken");
        Ok(connections)
    }

    #[cfg(not(target_os = "linux"))]
    fn connections(&mut self) -> Result<Vec<ConnectionRef>> {
        Ok(Vec::new())
    }

    fn lists_connections(&self) -> bool {
        cfg!(target_os = "linux")
    }
}
