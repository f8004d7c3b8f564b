//! OS process enumeration, termination and detached launches.

use crate::error::ProcessError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use sysinfo::{ProcessRefreshKind, System, UpdateKind};
use tracing::{debug, info, warn};

/// A running process whose executable was found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub exe: PathBuf,
}

/// View of the host's process table
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Processes whose executable lives under `dir`
    async fn processes_under(&self, dir: &Path) -> Result<Vec<ProcessInfo>, ProcessError>;

    /// Kills every process under `dir`, returning how many were signalled
    async fn terminate_under(&self, dir: &Path) -> Result<usize, ProcessError>;
}

/// [`ProcessTable`] backed by `sysinfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProcessTable;

fn refreshed_system() -> System {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
    );
    system
}

fn is_under(exe: &Path, dir: &Path) -> bool {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let exe = exe.canonicalize().unwrap_or_else(|_| exe.to_path_buf());
    exe.starts_with(dir)
}

fn scan(system: &System, dir: &Path) -> Vec<ProcessInfo> {
    system
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            let exe = process.exe()?;
            is_under(exe, dir).then(|| ProcessInfo {
                pid: pid.as_u32(),
                exe: exe.to_path_buf(),
            })
        })
        .collect()
}

#[async_trait]
impl ProcessTable for SysinfoProcessTable {
    async fn processes_under(&self, dir: &Path) -> Result<Vec<ProcessInfo>, ProcessError> {
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || scan(&refreshed_system(), &dir))
            .await
            .map_err(|e| ProcessError::Enumeration(e.to_string()))
    }

    async fn terminate_under(&self, dir: &Path) -> Result<usize, ProcessError> {
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let system = refreshed_system();
            let mut killed = 0;
            for found in scan(&system, &dir) {
                let pid = sysinfo::Pid::from_u32(found.pid);
                match system.process(pid) {
                    Some(process) if process.kill() => {
                        info!("🛑 Terminated {} (pid {})", found.exe.display(), found.pid);
                        killed += 1;
                    }
                    _ => warn!("Failed to terminate pid {}", found.pid),
                }
            }
            killed
        })
        .await
        .map_err(|e| ProcessError::Enumeration(e.to_string()))
    }
}

/// Starts `program` detached from the agent with raised scheduling priority.
///
/// The child gets its own process group and null standard streams; the
/// agent never waits on it.
pub fn spawn_detached(
    program: &Path,
    args: &[String],
    working_dir: &Path,
) -> Result<u32, ProcessError> {
    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    command.process_group(0);

    let child = command
        .spawn()
        .map_err(|e| ProcessError::Spawn(program.to_path_buf(), e))?;
    let pid = child.id().unwrap_or_default();
    raise_priority(pid);
    debug!("Spawned {} as pid {}", program.display(), pid);
    Ok(pid)
}

/// Best effort: a failure is logged and otherwise ignored
#[cfg(unix)]
fn raise_priority(pid: u32) {
    // SAFETY: setpriority only reads its integer arguments
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, -5) };
    if result != 0 {
        warn!(
            "Could not raise priority of pid {}: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn raise_priority(pid: u32) {
    debug!("Priority adjustment not supported here, pid {} left as is", pid);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_under() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let exe = bin.join("server");
        std::fs::write(&exe, b"").unwrap();

        assert!(is_under(&exe, dir.path()));
        assert!(!is_under(Path::new("/usr/bin/env"), dir.path()));
    }

    #[tokio::test]
    async fn test_empty_dir_has_no_processes() {
        let dir = tempfile::tempdir().unwrap();
        let table = SysinfoProcessTable;
        assert!(table.processes_under(dir.path()).await.unwrap().is_empty());
        assert_eq!(table.terminate_under(dir.path()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let err = spawn_detached(&dir.path().join("nope"), &[], dir.path()).unwrap_err();
        assert!(matches!(err, ProcessError::Spawn(_, _)));
    }
}
