//! Discovery of running Claude CLI instances and their live resource metrics.
//!
//! The process table and the working-directory lookup are both injected, so
//! the scanner runs the same against sysinfo in production and against fixed
//! rows in tests.
//!
//! CPU percent is a delta between two refreshes of the same table. The first
//! scan that sees a pid reports `0.0` for it; scanning on a fixed tick gives
//! accurate numbers from the second tick on.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::debug;

use crate::config::ProcessMatchConfig;
use crate::error::{MetricError, ScanError};
use crate::util::serialize_duration_secs;
use crate::workdir::{PlatformWorkingDir, WorkingDirResolver};

pub const PERMISSION_DENIED_MARKER: &str = "[Permission Denied]";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkingDir {
    Path(PathBuf),
    PermissionDenied,
}

impl WorkingDir {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Path(path) => Some(path),
            Self::PermissionDenied => None,
        }
    }
}

impl fmt::Display for WorkingDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::PermissionDenied => f.write_str(PERMISSION_DENIED_MARKER),
        }
    }
}

impl Serialize for WorkingDir {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Path(path) => path.serialize(serializer),
            Self::PermissionDenied => serializer.serialize_str(PERMISSION_DENIED_MARKER),
        }
    }
}

/// One running instance, as seen at scan time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub working_dir: WorkingDir,
    pub command: String,
    pub start_time: DateTime<Utc>,
    #[serde(rename = "uptime_seconds", serialize_with = "serialize_duration_secs")]
    pub uptime: Duration,
    pub is_helper: bool,
}

/// Raw row from a [`ProcessTable`]. `None` means the platform would not give
/// us that field for this pid.
#[derive(Debug, Clone, Default)]
pub struct ProcessSample {
    pub pid: u32,
    pub exe: Option<PathBuf>,
    pub command: Option<String>,
    pub cpu_percent: f32,
    pub memory_bytes: Option<u64>,
    pub start_time: Option<DateTime<Utc>>,
}

pub trait ProcessTable {
    fn snapshot(&mut self) -> Result<Vec<ProcessSample>, ScanError>;
}

/// sysinfo-backed table. Keeps its `System` between snapshots so CPU usage
/// has a previous sample to diff against.
pub struct SysinfoProcessTable {
    system: System,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn snapshot(&mut self) -> Result<Vec<ProcessSample>, ScanError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ScanError::Enumeration(
                "process listing is not supported on this platform".to_string(),
            ));
        }

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );

        let processes = self.system.processes();
        if processes.is_empty() {
            return Err(ScanError::Enumeration(
                "operating system returned an empty process table".to_string(),
            ));
        }

        Ok(processes
            .iter()
            .map(|(pid, process)| {
                let command = process
                    .cmd()
                    .iter()
                    .map(|part| part.to_string_lossy().to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                ProcessSample {
                    pid: pid.as_u32(),
                    exe: process.exe().map(|exe| exe.to_path_buf()),
                    command: Some(command).filter(|cmd| !cmd.is_empty()),
                    cpu_percent: process.cpu_usage(),
                    memory_bytes: Some(process.memory()),
                    start_time: unix_seconds(process.start_time()),
                }
            })
            .collect())
    }
}

fn unix_seconds(secs: u64) -> Option<DateTime<Utc>> {
    if secs == 0 {
        return None;
    }
    Utc.timestamp_opt(i64::try_from(secs).ok()?, 0).single()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProcessSort {
    #[default]
    Pid,
    Cpu,
    Memory,
    Uptime,
}

impl ProcessSort {
    pub fn next(self) -> Self {
        match self {
            Self::Pid => Self::Cpu,
            Self::Cpu => Self::Memory,
            Self::Memory => Self::Uptime,
            Self::Uptime => Self::Pid,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pid => "pid",
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Uptime => "uptime",
        }
    }
}

pub fn sort_processes(records: &mut [ProcessRecord], sort: ProcessSort, ascending: bool) {
    records.sort_by(|a, b| {
        let ordering = match sort {
            ProcessSort::Pid => a.pid.cmp(&b.pid),
            ProcessSort::Cpu => a.cpu_percent.total_cmp(&b.cpu_percent),
            ProcessSort::Memory => a.memory_mb.total_cmp(&b.memory_mb),
            ProcessSort::Uptime => a.uptime.cmp(&b.uptime),
        }
        .then_with(|| a.pid.cmp(&b.pid));
        if ascending { ordering } else { ordering.reverse() }
    });
}

pub struct ProcessScanner<T = SysinfoProcessTable, R = PlatformWorkingDir> {
    table: T,
    resolver: R,
    rules: ProcessMatchConfig,
    own_pid: Option<u32>,
}

impl ProcessScanner {
    pub fn system(rules: ProcessMatchConfig) -> Self {
        Self::new(
            SysinfoProcessTable::new(),
            PlatformWorkingDir::default(),
            rules,
        )
        .skip_pid(std::process::id())
    }
}

impl<T: ProcessTable, R: WorkingDirResolver> ProcessScanner<T, R> {
    pub fn new(table: T, resolver: R, rules: ProcessMatchConfig) -> Self {
        Self {
            table,
            resolver,
            rules,
            own_pid: None,
        }
    }

    /// Never report this pid, used to keep the inspector itself out of the list.
    pub fn skip_pid(mut self, pid: u32) -> Self {
        self.own_pid = Some(pid);
        self
    }

    /// Returns every target instance, minus helper subprocesses unless
    /// `include_helpers` is set. Fails only when the table cannot be listed.
    pub fn discover(&mut self, include_helpers: bool) -> Result<Vec<ProcessRecord>, ScanError> {
        let samples = self.table.snapshot()?;
        let now = Utc::now();
        let mut records = Vec::new();

        for sample in samples {
            if self.own_pid == Some(sample.pid) || !self.is_target(&sample) {
                continue;
            }

            let Some(command) = sample.command.as_deref() else {
                debug!(pid = sample.pid, "skipping process without readable command line");
                continue;
            };
            let is_helper = self.is_helper_command(command);
            if is_helper && !include_helpers {
                continue;
            }

            match self.collect_metrics(&sample, is_helper, now) {
                Ok(record) => records.push(record),
                Err(err) => debug!(error = %err, "dropping process from scan"),
            }
        }

        records.sort_by_key(|record| record.pid);
        Ok(records)
    }

    fn is_target(&self, sample: &ProcessSample) -> bool {
        let Some(exe) = &sample.exe else {
            return false;
        };
        let exe = exe.to_string_lossy();
        exe.contains(self.rules.target_substring.as_str())
            && !self
                .rules
                .excluded_substrings
                .iter()
                .any(|excluded| exe.contains(excluded.as_str()))
    }

    fn is_helper_command(&self, command: &str) -> bool {
        self.rules
            .helper_markers
            .iter()
            .any(|marker| command.contains(marker.as_str()))
    }

    fn collect_metrics(
        &self,
        sample: &ProcessSample,
        is_helper: bool,
        now: DateTime<Utc>,
    ) -> Result<ProcessRecord, MetricError> {
        let pid = sample.pid;
        let command = sample
            .command
            .clone()
            .ok_or(MetricError::CommandLine { pid })?;
        let start_time = sample.start_time.ok_or(MetricError::StartTime { pid })?;
        let memory_bytes = sample.memory_bytes.ok_or(MetricError::Memory { pid })?;

        let working_dir = match self.resolver.resolve(pid) {
            Ok(path) => WorkingDir::Path(path),
            Err(err) => {
                debug!(pid, error = %err, "working directory unavailable");
                WorkingDir::PermissionDenied
            }
        };

        Ok(ProcessRecord {
            pid,
            cpu_percent: sample.cpu_percent,
            memory_mb: memory_bytes as f64 / BYTES_PER_MB,
            working_dir,
            command,
            start_time,
            uptime: (now - start_time).to_std().unwrap_or_default(),
            is_helper,
        })
    }
}
