//! Locates session logs for a working directory without parsing them in full.
//!
//! The CLI stores one subdirectory per project under `~/.claude/projects`,
//! named after the project's working directory with every character outside
//! `[A-Za-z0-9-]` replaced by `-`. A `sessions-index.json` may sit next to
//! the logs and carry the original path plus per-session titles.

use std::cmp::Reverse;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::DiscoveryError;
use crate::session::{EntryKind, MessageKind, Role, SessionLogEntry, parse_utc_timestamp};
use crate::util::{format_local_time, single_line};

const SESSIONS_INDEX_FILE: &str = "sessions-index.json";
const SESSION_LOG_EXTENSION: &str = "jsonl";
const HEAD_SCAN_LINES: usize = 64;
const HEAD_SCAN_BYTES: u64 = 256 * 1024;
const UNTITLED: &str = "(untitled)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub title: String,
    pub updated: DateTime<Utc>,
    pub path: PathBuf,
}

impl SessionInfo {
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }

    pub fn updated_label(&self) -> String {
        format_local_time(Some(self.updated), "%Y-%m-%d %H:%M")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectDir {
    pub name: String,
    pub path: PathBuf,
    pub display_name: String,
    pub original_path: Option<PathBuf>,
    pub modified: DateTime<Utc>,
    pub sessions: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionsIndex {
    #[serde(default)]
    original_path: Option<String>,
    #[serde(default)]
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    full_path: Option<String>,
    #[serde(default)]
    first_prompt: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    modified: Option<Value>,
    #[serde(default)]
    project_path: Option<String>,
}

// Older CLI versions wrote a bare list of entries.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexFile {
    Object(SessionsIndex),
    Entries(Vec<IndexEntry>),
}

impl SessionsIndex {
    fn load(project_dir: &Path) -> Option<Self> {
        let path = project_dir.join(SESSIONS_INDEX_FILE);
        let raw = fs::read(&path).ok()?;
        match serde_json::from_slice::<IndexFile>(&raw) {
            Ok(IndexFile::Object(index)) => Some(index),
            Ok(IndexFile::Entries(entries)) => Some(Self {
                original_path: None,
                entries,
            }),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "ignoring unreadable sessions index");
                None
            }
        }
    }

    fn original_path(&self) -> Option<PathBuf> {
        self.original_path
            .as_deref()
            .into_iter()
            .chain(
                self.entries
                    .iter()
                    .filter_map(|entry| entry.project_path.as_deref()),
            )
            .map(str::trim)
            .find(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    fn entry_for(&self, session_id: &str, log_path: &Path) -> Option<&IndexEntry> {
        self.entries.iter().find(|entry| {
            entry.session_id.as_deref() == Some(session_id)
                || entry
                    .full_path
                    .as_deref()
                    .is_some_and(|full| Path::new(full) == log_path)
        })
    }
}

impl IndexEntry {
    fn title(&self) -> Option<String> {
        [self.summary.as_deref(), self.first_prompt.as_deref()]
            .into_iter()
            .flatten()
            .map(|text| single_line(text).trim().to_string())
            .find(|text| !text.is_empty() && text != "No prompt")
    }

    fn modified(&self) -> Option<DateTime<Utc>> {
        match self.modified.as_ref()? {
            Value::String(text) => parse_utc_timestamp(text),
            Value::Number(num) => num.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
            _ => None,
        }
    }
}

/// What a bounded read of the start of a log tells us. A line crossing the
/// byte budget is cut short and skipped as undecodable.
#[derive(Debug, Default)]
struct LogHead {
    cwd: Option<String>,
    summary: Option<String>,
    first_user_text: Option<String>,
}

impl LogHead {
    fn scan(path: &Path) -> Self {
        let mut head = Self::default();
        let Ok(file) = File::open(path) else {
            return head;
        };
        let mut reader = BufReader::new(file.take(HEAD_SCAN_BYTES));
        let mut line = Vec::new();

        for _ in 0..HEAD_SCAN_LINES {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let Some(entry) = SessionLogEntry::decode(&line) else {
                continue;
            };

            if head.cwd.is_none() {
                head.cwd = entry.cwd.clone().filter(|cwd| !cwd.is_empty());
            }
            match entry.kind() {
                EntryKind::Summary if head.summary.is_none() => {
                    head.summary = entry
                        .summary
                        .as_deref()
                        .map(|s| single_line(s).trim().to_string())
                        .filter(|s| !s.is_empty());
                }
                EntryKind::User
                    if head.first_user_text.is_none() && entry.role() == Some(Role::User) =>
                {
                    head.first_user_text = entry
                        .resolved_content()
                        .filter(|content| content.kind == MessageKind::Text)
                        .map(|content| single_line(&content.text).trim().to_string())
                        .filter(|text| !text.is_empty());
                }
                _ => {}
            }

            if head.cwd.is_some() && head.summary.is_some() && head.first_user_text.is_some() {
                break;
            }
        }
        head
    }
}

/// Replaces every character outside `[A-Za-z0-9-]` with `-`.
pub fn encode_project_dir(dir: &Path) -> String {
    dir.to_string_lossy()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                ch
            } else {
                '-'
            }
        })
        .collect()
}

pub fn find_sessions_for_directory(
    projects_root: &Path,
    dir: &Path,
) -> Result<Vec<SessionInfo>, DiscoveryError> {
    let encoded = encode_project_dir(dir);
    let mut sessions = Vec::new();

    for project in project_dirs(projects_root)? {
        let index = SessionsIndex::load(&project);
        let matches = match index.as_ref().and_then(SessionsIndex::original_path) {
            Some(original) => original == dir,
            None => project.file_name().and_then(|name| name.to_str()) == Some(encoded.as_str()),
        };
        if !matches {
            continue;
        }

        for log_path in session_logs(&project) {
            let head = LogHead::scan(&log_path);
            if let Some(cwd) = head.cwd.as_deref()
                && Path::new(cwd) != dir
            {
                debug!(path = %log_path.display(), cwd, "skipping log from a colliding directory");
                continue;
            }

            let id = log_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let index_entry = index
                .as_ref()
                .and_then(|index| index.entry_for(&id, &log_path));

            let title = index_entry
                .and_then(IndexEntry::title)
                .or(head.summary)
                .or(head.first_user_text)
                .unwrap_or_else(|| UNTITLED.to_string());
            let updated = index_entry
                .and_then(IndexEntry::modified)
                .or_else(|| file_modified(&log_path))
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

            sessions.push(SessionInfo {
                id,
                title,
                updated,
                path: log_path,
            });
        }
    }

    sessions.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.id.cmp(&b.id)));
    Ok(sessions)
}

pub fn list_projects(projects_root: &Path) -> Result<Vec<ProjectDir>, DiscoveryError> {
    let home = dirs::home_dir();
    let mut projects = Vec::new();

    for path in project_dirs(projects_root)? {
        let Some(modified) = file_modified(&path) else {
            continue;
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let original_path =
            SessionsIndex::load(&path).and_then(|index| index.original_path());
        let display_name = match &original_path {
            Some(original) => display_path(original, home.as_deref()),
            None => name.clone(),
        };
        let sessions = session_logs(&path).len();

        projects.push(ProjectDir {
            name,
            path,
            display_name,
            original_path,
            modified,
            sessions,
        });
    }

    projects.sort_by_key(|project| Reverse(project.modified));
    Ok(projects)
}

/// Shows paths under the home directory as `~/...`.
pub fn display_path(path: &Path, home: Option<&Path>) -> String {
    if let Some(home) = home
        && let Ok(rest) = path.strip_prefix(home)
    {
        if rest.as_os_str().is_empty() {
            return "~".to_string();
        }
        return format!("~/{}", rest.display());
    }
    path.display().to_string()
}

fn project_dirs(projects_root: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let entries = fs::read_dir(projects_root).map_err(|source| DiscoveryError::RootUnreadable {
        path: projects_root.to_path_buf(),
        source,
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn session_logs(project_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(project_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            path.extension().and_then(|ext| ext.to_str()) == Some(SESSION_LOG_EXTENSION)
        })
        .collect()
}

fn file_modified(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(|modified: SystemTime| DateTime::<Utc>::from(modified))
}
