//! Background loading for the dashboard.
//!
//! Scans run on one long-lived worker that owns the scanner, so its CPU
//! baseline survives between ticks. Discovery and parsing each get a
//! short-lived thread. Every request carries an id; a result whose id is no
//! longer the latest for its kind is dropped on receipt.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::discovery::{self, ProjectDir, SessionInfo};
use crate::error::{DiscoveryError, ParseError, ScanError};
use crate::process::{ProcessRecord, ProcessScanner, ProcessTable};
use crate::session::{self, SessionStats};
use crate::workdir::WorkingDirResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Processes,
    Sessions,
    Detail,
    Projects,
}

impl LoadKind {
    const COUNT: usize = 4;

    fn slot(self) -> usize {
        match self {
            Self::Processes => 0,
            Self::Sessions => 1,
            Self::Detail => 2,
            Self::Projects => 3,
        }
    }
}

#[derive(Debug)]
pub enum Payload {
    Processes(Result<Vec<ProcessRecord>, ScanError>),
    Sessions {
        dir: PathBuf,
        result: Result<Vec<SessionInfo>, DiscoveryError>,
    },
    Detail(Result<SessionStats, ParseError>),
    Projects(Result<Vec<ProjectDir>, DiscoveryError>),
}

impl Payload {
    pub fn kind(&self) -> LoadKind {
        match self {
            Self::Processes(_) => LoadKind::Processes,
            Self::Sessions { .. } => LoadKind::Sessions,
            Self::Detail(_) => LoadKind::Detail,
            Self::Projects(_) => LoadKind::Projects,
        }
    }
}

#[derive(Debug)]
struct Loaded {
    id: u64,
    payload: Payload,
}

#[derive(Debug)]
struct ScanRequest {
    id: u64,
    include_helpers: bool,
}

pub struct Loader {
    scan_tx: Sender<ScanRequest>,
    results_tx: Sender<Loaded>,
    results_rx: Receiver<Loaded>,
    projects_root: PathBuf,
    next_id: u64,
    latest: [Option<u64>; LoadKind::COUNT],
    pending: [bool; LoadKind::COUNT],
}

impl Loader {
    pub fn spawn<T, R>(mut scanner: ProcessScanner<T, R>, projects_root: PathBuf) -> Self
    where
        T: ProcessTable + Send + 'static,
        R: WorkingDirResolver + Send + 'static,
    {
        let (scan_tx, scan_rx) = mpsc::channel::<ScanRequest>();
        let (results_tx, results_rx) = mpsc::channel::<Loaded>();

        let worker_tx = results_tx.clone();
        thread::spawn(move || {
            // Ends once the loader, and with it the request sender, is dropped.
            while let Ok(request) = scan_rx.recv() {
                let result = scanner.discover(request.include_helpers);
                let loaded = Loaded {
                    id: request.id,
                    payload: Payload::Processes(result),
                };
                if worker_tx.send(loaded).is_err() {
                    break;
                }
            }
            debug!("scanner worker stopped");
        });

        Self {
            scan_tx,
            results_tx,
            results_rx,
            projects_root,
            next_id: 0,
            latest: [None; LoadKind::COUNT],
            pending: [false; LoadKind::COUNT],
        }
    }

    pub fn request_scan(&mut self, include_helpers: bool) {
        let id = self.issue(LoadKind::Processes);
        if self
            .scan_tx
            .send(ScanRequest {
                id,
                include_helpers,
            })
            .is_err()
        {
            debug!("scanner worker is gone; scan request dropped");
            self.pending[LoadKind::Processes.slot()] = false;
        }
    }

    pub fn request_sessions(&mut self, dir: PathBuf) {
        let id = self.issue(LoadKind::Sessions);
        let root = self.projects_root.clone();
        self.spawn_job(id, move || {
            let result = discovery::find_sessions_for_directory(&root, &dir);
            Payload::Sessions { dir, result }
        });
    }

    pub fn request_detail(&mut self, path: PathBuf) {
        let id = self.issue(LoadKind::Detail);
        self.spawn_job(id, move || Payload::Detail(session::parse_session_file(&path)));
    }

    pub fn request_projects(&mut self) {
        let id = self.issue(LoadKind::Projects);
        let root = self.projects_root.clone();
        self.spawn_job(id, move || Payload::Projects(discovery::list_projects(&root)));
    }

    pub fn is_pending(&self, kind: LoadKind) -> bool {
        self.pending[kind.slot()]
    }

    /// Forgets any outstanding request of `kind`; its result will be dropped.
    pub fn cancel(&mut self, kind: LoadKind) {
        self.latest[kind.slot()] = None;
        self.pending[kind.slot()] = false;
    }

    /// Next fresh result without blocking.
    pub fn try_next(&mut self) -> Option<Payload> {
        while let Ok(loaded) = self.results_rx.try_recv() {
            if let Some(payload) = self.accept(loaded) {
                return Some(payload);
            }
        }
        None
    }

    /// Next fresh result, waiting up to `timeout`.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Payload> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results_rx.recv_timeout(remaining) {
                Ok(loaded) => {
                    if let Some(payload) = self.accept(loaded) {
                        return Some(payload);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn issue(&mut self, kind: LoadKind) -> u64 {
        self.next_id += 1;
        self.latest[kind.slot()] = Some(self.next_id);
        self.pending[kind.slot()] = true;
        self.next_id
    }

    fn spawn_job<F>(&self, id: u64, job: F)
    where
        F: FnOnce() -> Payload + Send + 'static,
    {
        let tx = self.results_tx.clone();
        thread::spawn(move || {
            let _ = tx.send(Loaded {
                id,
                payload: job(),
            });
        });
    }

    fn accept(&mut self, loaded: Loaded) -> Option<Payload> {
        let slot = loaded.payload.kind().slot();
        if self.latest[slot] != Some(loaded.id) {
            trace!(id = loaded.id, kind = ?loaded.payload.kind(), "dropping stale result");
            return None;
        }
        self.pending[slot] = false;
        Some(loaded.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use chrono::Utc;
    use tempfile::TempDir;

    use crate::config::ProcessMatchConfig;
    use crate::error::WorkingDirError;
    use crate::process::ProcessSample;

    struct OneClaude;

    impl ProcessTable for OneClaude {
        fn snapshot(&mut self) -> Result<Vec<ProcessSample>, ScanError> {
            Ok(vec![ProcessSample {
                pid: 42,
                exe: Some(PathBuf::from("/usr/local/bin/claude")),
                command: Some("claude".to_string()),
                cpu_percent: 1.5,
                memory_bytes: Some(64 * 1024 * 1024),
                start_time: Some(Utc::now()),
            }])
        }
    }

    fn loader(root: &Path) -> Loader {
        let resolver = |_pid: u32| -> Result<PathBuf, WorkingDirError> { Ok(PathBuf::from("/work")) };
        let scanner = ProcessScanner::new(OneClaude, resolver, ProcessMatchConfig::default());
        Loader::spawn(scanner, root.to_path_buf())
    }

    fn wait(loader: &mut Loader) -> Payload {
        loader
            .next_timeout(Duration::from_secs(10))
            .expect("result before timeout")
    }

    #[test]
    fn scan_results_come_back_from_worker() {
        let tmp = TempDir::new().expect("temp dir");
        let mut loader = loader(tmp.path());

        loader.request_scan(false);
        assert!(loader.is_pending(LoadKind::Processes));

        match wait(&mut loader) {
            Payload::Processes(Ok(records)) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].pid, 42);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(!loader.is_pending(LoadKind::Processes));
    }

    #[test]
    fn superseded_detail_requests_are_dropped() {
        let tmp = TempDir::new().expect("temp dir");
        let first = tmp.path().join("first.jsonl");
        let second = tmp.path().join("second.jsonl");
        fs::write(&first, "").expect("write first");
        fs::write(&second, "").expect("write second");
        let mut loader = loader(tmp.path());

        loader.request_detail(first);
        loader.request_detail(second.clone());

        match wait(&mut loader) {
            Payload::Detail(Ok(stats)) => assert_eq!(stats.file_path, second),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(!loader.is_pending(LoadKind::Detail));
        assert!(loader.next_timeout(Duration::from_millis(200)).is_none());
    }

    #[test]
    fn cancelled_requests_never_surface() {
        let tmp = TempDir::new().expect("temp dir");
        let mut loader = loader(tmp.path());

        loader.request_projects();
        loader.cancel(LoadKind::Projects);
        assert!(!loader.is_pending(LoadKind::Projects));
        assert!(loader.next_timeout(Duration::from_millis(300)).is_none());
    }

    #[test]
    fn discovery_errors_are_delivered() {
        let tmp = TempDir::new().expect("temp dir");
        let mut loader = loader(&tmp.path().join("missing"));

        loader.request_sessions(PathBuf::from("/work"));
        match wait(&mut loader) {
            Payload::Sessions { dir, result } => {
                assert_eq!(dir, PathBuf::from("/work"));
                assert!(matches!(result, Err(DiscoveryError::RootUnreadable { .. })));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
