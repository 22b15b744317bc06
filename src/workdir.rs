//! Per-platform lookup of a process's current working directory.
//!
//! The scanner only sees the [`WorkingDirResolver`] trait. [`PlatformWorkingDir`]
//! picks the implementation for the build target; tests pass closures.

use std::path::PathBuf;

use crate::error::WorkingDirError;

pub trait WorkingDirResolver {
    fn resolve(&self, pid: u32) -> Result<PathBuf, WorkingDirError>;
}

impl<F> WorkingDirResolver for F
where
    F: Fn(u32) -> Result<PathBuf, WorkingDirError>,
{
    fn resolve(&self, pid: u32) -> Result<PathBuf, WorkingDirError> {
        self(pid)
    }
}

#[cfg(target_os = "linux")]
pub type PlatformWorkingDir = ProcfsWorkingDir;

#[cfg(not(target_os = "linux"))]
pub type PlatformWorkingDir = SysinfoWorkingDir;

/// Reads the `/proc/<pid>/cwd` symlink.
#[cfg(target_os = "linux")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsWorkingDir;

#[cfg(target_os = "linux")]
impl WorkingDirResolver for ProcfsWorkingDir {
    fn resolve(&self, pid: u32) -> Result<PathBuf, WorkingDirError> {
        std::fs::read_link(format!("/proc/{pid}/cwd"))
            .map_err(|err| WorkingDirError::from_io(pid, err))
    }
}

/// Refreshes a single pid through sysinfo with only the cwd requested.
/// On macOS this ends up in `proc_pidinfo(PROC_PIDVNODEPATHINFO)`.
#[cfg(not(target_os = "linux"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoWorkingDir;

#[cfg(not(target_os = "linux"))]
impl WorkingDirResolver for SysinfoWorkingDir {
    fn resolve(&self, pid: u32) -> Result<PathBuf, WorkingDirError> {
        use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

        let target = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::nothing().with_cwd(UpdateKind::Always),
        );
        let process = system
            .process(target)
            .ok_or(WorkingDirError::NotFound { pid })?;
        process
            .cwd()
            .filter(|cwd| !cwd.as_os_str().is_empty())
            .map(|cwd| cwd.to_path_buf())
            .ok_or(WorkingDirError::PermissionDenied { pid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_act_as_resolvers() {
        let resolver = |pid: u32| -> Result<PathBuf, WorkingDirError> {
            if pid == 1 {
                Ok(PathBuf::from("/work"))
            } else {
                Err(WorkingDirError::PermissionDenied { pid })
            }
        };

        assert_eq!(resolver.resolve(1).expect("cwd"), PathBuf::from("/work"));
        assert!(matches!(
            resolver.resolve(2),
            Err(WorkingDirError::PermissionDenied { pid: 2 })
        ));
    }

    #[test]
    fn platform_resolver_finds_own_working_directory() {
        let own = std::env::current_dir().expect("current dir");
        let resolved = PlatformWorkingDir::default()
            .resolve(std::process::id())
            .expect("own cwd");
        assert_eq!(
            resolved.canonicalize().expect("canonical resolved"),
            own.canonicalize().expect("canonical own")
        );
    }
}
