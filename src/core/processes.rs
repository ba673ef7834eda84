//! Process snapshot and termination collaborator.
//!
//! Jobs only ever talk to the [`ProcessProvider`] trait. [`SysinfoProvider`] is
//! the default implementation, backed by the `sysinfo` crate.

use std::process::Command;
use std::sync::Mutex;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// One entry of a point-in-time process snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessEntry {
    pub pid: u32,
    /// Short executable name as reported by the OS (e.g. `notepad.exe`).
    pub name: String,
    /// Full command line, space-joined. Empty when the OS does not expose it.
    pub cmd: String,
}

impl ProcessEntry {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            cmd: String::new(),
        }
    }
}

/// Supplies process snapshots and terminates processes on request.
pub trait ProcessProvider: Send + Sync {
    /// Enumerate all running processes at this instant.
    fn list_processes(&self) -> Result<Vec<ProcessEntry>>;

    /// Request termination of `pid`. Failing because the process is already
    /// gone or access is denied is an ordinary, per-process error.
    ///
    /// With `expected_name`, the kill is refused unless `pid` still belongs to
    /// a process of that name (compared case-insensitively), so a pid recycled
    /// since the snapshot is left alone.
    fn terminate(&self, pid: u32, expected_name: Option<&str>) -> Result<()>;

    /// Start `exe` with `args` detached from the caller and return its pid.
    fn launch(&self, exe: &str, args: &[String]) -> Result<u32>;
}

/// [`ProcessProvider`] backed by a shared `sysinfo::System`.
pub struct SysinfoProvider {
    system: Mutex<System>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProvider for SysinfoProvider {
    fn list_processes(&self) -> Result<Vec<ProcessEntry>> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| anyhow!("process table lock poisoned"))?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_cmd(sysinfo::UpdateKind::OnlyIfNotSet),
        );

        let mut entries: Vec<ProcessEntry> = system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                cmd: process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .collect();
        entries.sort_by_key(|e| e.pid);
        Ok(entries)
    }

    fn terminate(&self, pid: u32, expected_name: Option<&str>) -> Result<()> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| anyhow!("process table lock poisoned"))?;
        let target = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

        let Some(process) = system.process(target) else {
            bail!("process {pid} no longer exists");
        };
        if let Some(expected) = expected_name {
            let current = process.name().to_string_lossy();
            if !current.eq_ignore_ascii_case(expected) {
                bail!("pid {pid} now belongs to {current}, not {expected}; left running");
            }
        }
        if !process.kill() {
            bail!("failed to terminate process {pid} (access denied or already exiting)");
        }
        Ok(())
    }

    fn launch(&self, exe: &str, args: &[String]) -> Result<u32> {
        let mut child = Command::new(exe)
            .args(args)
            .spawn()
            .with_context(|| format!("failed to start {exe}"))?;
        let pid = child.id();
        let reaper = thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || {
                let _ = child.wait();
            });
        if let Err(e) = reaper {
            tracing::warn!("no reaper thread for PID {pid}: {e}");
        }
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysinfo_lists_current_process() {
        let provider = SysinfoProvider::new();
        let entries = provider.list_processes().unwrap();
        let me = std::process::id();
        assert!(entries.iter().any(|e| e.pid == me), "own pid {me} missing from snapshot");
        assert!(entries.windows(2).all(|w| w[0].pid <= w[1].pid));
    }

    #[test]
    fn test_sysinfo_terminate_unknown_pid_fails() {
        let provider = SysinfoProvider::new();
        let err = provider.terminate(u32::MAX - 7, None).unwrap_err();
        assert!(err.to_string().contains("no longer exists"));
    }

    #[test]
    fn test_sysinfo_terminate_refuses_recycled_pid() {
        let provider = SysinfoProvider::new();
        let me = std::process::id();
        let err = provider
            .terminate(me, Some("definitely-not-this-test.exe"))
            .unwrap_err();
        assert!(err.to_string().contains("left running"), "{err:#}");
        assert!(provider.list_processes().unwrap().iter().any(|e| e.pid == me));
    }

    #[test]
    fn test_sysinfo_launch_missing_executable_fails() {
        let provider = SysinfoProvider::new();
        let err = provider
            .launch("definitely-not-installed-sysmgmt-binary", &[])
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to start"));
    }

    #[cfg(unix)]
    #[test]
    fn test_sysinfo_launch_returns_child_pid() {
        let provider = SysinfoProvider::new();
        let pid = provider.launch("sleep", &["0".to_string()]).unwrap();
        assert!(pid > 0);
        assert_ne!(pid, std::process::id());
    }

    #[test]
    fn test_process_entry_new_has_empty_cmd() {
        let entry = ProcessEntry::new(4, "System");
        assert_eq!(entry.pid, 4);
        assert_eq!(entry.name, "System");
        assert!(entry.cmd.is_empty());
    }
}
