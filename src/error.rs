use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal to a process scan: the OS process table could not be listed at all.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to enumerate processes: {0}")]
    Enumeration(String),
}

/// Failure collecting one metric for one process. The scanner drops the
/// process and moves on; this never reaches the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("command line unavailable for pid {pid}")]
    CommandLine { pid: u32 },
    #[error("start time unavailable for pid {pid}")]
    StartTime { pid: u32 },
    #[error("resident memory unavailable for pid {pid}")]
    Memory { pid: u32 },
}

#[derive(Debug, Error)]
pub enum WorkingDirError {
    #[error("permission denied reading working directory of pid {pid}")]
    PermissionDenied { pid: u32 },
    #[error("process {pid} not found")]
    NotFound { pid: u32 },
    #[error("failed to resolve working directory of pid {pid}: {source}")]
    Io { pid: u32, source: io::Error },
}

impl WorkingDirError {
    pub fn from_io(pid: u32, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { pid },
            io::ErrorKind::NotFound => Self::NotFound { pid },
            _ => Self::Io { pid, source: err },
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to open session file {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("error reading session file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cannot read projects directory {}: {source}", path.display())]
    RootUnreadable { path: PathBuf, source: io::Error },
}
