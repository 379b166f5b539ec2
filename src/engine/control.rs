//! OS-facing process control
//!
//! The enforcer never touches the OS directly; it goes through a
//! `ProcessControl`. `SignalControl` talks to the real system,
//! `NoopControl` never does.

use std::io;

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};
use thiserror::Error;

use crate::target::Target;

/// Failures of a real enforcement attempt
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("process {pid} no longer exists")]
    TargetGone { pid: u32 },

    #[error("permission denied for process {pid}")]
    PermissionDenied { pid: u32 },

    #[error("refusing to signal pid {pid}: {reason}")]
    Refused { pid: u32, reason: &'static str },

    #[error("operation not supported by this control")]
    Unsupported,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Side-effecting operations available to the enforcer
pub trait ProcessControl: Send + Sync {
    /// Ask the process to exit
    fn terminate(&self, pid: u32) -> Result<(), ControlError>;

    /// Cut a target off from the network. No built-in control can do this.
    fn block(&self, target: &Target) -> Result<(), ControlError> {
        let _ = target;
        Err(ControlError::Unsupported)
    }

    /// Current name of a process, used to describe connections
    fn process_name(&self, pid: u32) -> Result<Option<String>, ControlError>;
}

/// A control that performs no side effects at all
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopControl;

impl ProcessControl for NoopControl {
    fn terminate(&self, _pid: u32) -> Result<(), ControlError> {
        Err(ControlError::Unsupported)
    }

    fn process_name(&self, _pid: u32) -> Result<Option<String>, ControlError> {
        Ok(None)
    }
}

/// Real process control: SIGTERM on unix, sysinfo elsewhere
pub struct SignalControl {
    system: Mutex<System>,
}

impl SignalControl {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn guard(&self, pid: u32) -> Result<(), ControlError> {
        if pid == 0 {
            return Err(ControlError::Refused {
                pid,
                reason: "pid 0 addresses a process group",
            });
        }
        if pid == 1 {
            return Err(ControlError::Refused {
                pid,
                reason: "init process",
            });
        }
        if pid == std::process::id() {
            return Err(ControlError::Refused {
                pid,
                reason: "own process",
            });
        }
        Ok(())
    }

    #[cfg(unix)]
    fn send_term(&self, pid: u32) -> Result<(), ControlError> {
        let raw = libc::pid_t::try_from(pid).map_err(|_| ControlError::TargetGone { pid })?;

        // SAFETY: kill(2) has no memory-safety preconditions
        let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Err(ControlError::TargetGone { pid }),
            Some(libc::EPERM) => Err(ControlError::PermissionDenied { pid }),
            _ => Err(ControlError::Io(err)),
        }
    }

    #[cfg(not(unix))]
    fn send_term(&self, pid: u32) -> Result<(), ControlError> {
        let mut system = self.system.lock();
        let sys_pid = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);

        let process = system
            .process(sys_pid)
            .ok_or(ControlError::TargetGone { pid })?;
        let sent = process
            .kill_with(sysinfo::Signal::Term)
            .unwrap_or_else(|| process.kill());
        if sent {
            Ok(())
        } else {
            Err(ControlError::PermissionDenied { pid })
        }
    }
}

impl Default for SignalControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SignalControl {
    fn terminate(&self, pid: u32) -> Result<(), ControlError> {
        self.guard(pid)?;
        self.send_term(pid)
    }

    fn process_name(&self, pid: u32) -> Result<Option<String>, ControlError> {
        let mut system = self.system.lock();
        let sys_pid = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);

        match system.process(sys_pid) {
            Some(process) => Ok(Some(process.name().to_string_lossy().into_owned())),
            None => Err(ControlError::TargetGone { pid }),
        }
    }
}
