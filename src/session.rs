//! Full parse of one Claude session log into [`SessionStats`].
//!
//! A session log is newline-delimited JSON appended to by the running CLI.
//! Lines are decoded one at a time and a line that does not decode is
//! skipped, since the file may be mid-write while we read it.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::error::ParseError;
use crate::util::{
    format_local_time, human_duration, serialize_duration_secs, single_line, truncate,
};

/// Gap between consecutive messages above which the later one counts as a
/// resumed session.
pub const INTERRUPTION_GAP: Duration = Duration::from_secs(60 * 60);

const COMPACT_BOUNDARY_SUBTYPE: &str = "compact_boundary";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Assistant,
    Compact,
    Error,
    System,
    FileHistorySnapshot,
    Progress,
    QueueOperation,
    Summary,
    Other,
}

impl EntryKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "compact" => Self::Compact,
            "error" => Self::Error,
            "system" => Self::System,
            "file-history-snapshot" => Self::FileHistorySnapshot,
            "progress" => Self::Progress,
            "queue-operation" => Self::QueueOperation,
            "summary" => Self::Summary,
            _ => Self::Other,
        }
    }
}

/// One decoded log line. Only the fields we aggregate are typed; anything
/// else in the record is ignored. Typed fields holding an unexpected JSON
/// type decode as `None` instead of rejecting the line.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionLogEntry {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub tag: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<LogMessage>,
    #[serde(default, deserialize_with = "lenient")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub version: Option<String>,
    #[serde(default, rename = "gitBranch", deserialize_with = "lenient")]
    pub git_branch: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub cwd: Option<String>,
    #[serde(default, rename = "sessionId", deserialize_with = "lenient")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

/// Message content is either a bare string or a list of typed blocks.
/// Anything else lands in `Other` and is resolved leniently.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(Value),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Option<Value>,
    },
    ToolResult {
        #[serde(default)]
        content: Option<ToolResultContent>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn from_tag(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    ToolUse,
    ToolResult,
}

impl MessageKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::ToolUse => "tool use",
            Self::ToolResult => "tool result",
        }
    }
}

/// Text pulled out of a message plus what kind of block it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    pub text: String,
    pub kind: MessageKind,
    pub tool_name: Option<String>,
    pub tool_input: Option<String>,
}

impl MessageContent {
    /// String content is taken verbatim. Block lists yield the first block
    /// carrying text; a `tool_use` block in the same list is attached as the
    /// tool invocation. Returns `None` when nothing textual is present.
    pub fn resolve(&self) -> Option<ResolvedContent> {
        match self {
            Self::Text(text) => (!text.is_empty()).then(|| ResolvedContent {
                text: text.clone(),
                kind: MessageKind::Text,
                tool_name: None,
                tool_input: None,
            }),
            Self::Blocks(blocks) => resolve_blocks(blocks),
            Self::Other(value) => resolve_loose(value),
        }
    }
}

fn resolve_blocks(blocks: &[ContentBlock]) -> Option<ResolvedContent> {
    let (text, from_tool_result) = blocks.iter().find_map(|block| match block {
        ContentBlock::Text { text: Some(text) } if !text.is_empty() => Some((text.clone(), false)),
        ContentBlock::ToolResult {
            content: Some(content),
        } => tool_result_text(content).map(|text| (text, true)),
        _ => None,
    })?;

    let tool = blocks.iter().find_map(|block| match block {
        ContentBlock::ToolUse { name, input } => Some((name.clone(), input.as_ref())),
        _ => None,
    });

    let kind = if from_tool_result {
        MessageKind::ToolResult
    } else if tool.is_some() {
        MessageKind::ToolUse
    } else {
        MessageKind::Text
    };
    let (tool_name, tool_input) = match tool {
        Some((name, input)) => (
            name.filter(|name| !name.is_empty()),
            input.map(Value::to_string),
        ),
        None => (None, None),
    };

    Some(ResolvedContent {
        text,
        kind,
        tool_name,
        tool_input,
    })
}

fn tool_result_text(content: &ToolResultContent) -> Option<String> {
    match content {
        ToolResultContent::Text(text) => (!text.is_empty()).then(|| text.clone()),
        ToolResultContent::Blocks(blocks) => blocks.iter().find_map(|block| match block {
            ContentBlock::Text { text: Some(text) } if !text.is_empty() => Some(text.clone()),
            _ => None,
        }),
        ToolResultContent::Other(value) => resolve_loose(value).map(|resolved| resolved.text),
    }
}

// Lists whose items lack a `type` tag fail the typed decode and end up here.
fn resolve_loose(value: &Value) -> Option<ResolvedContent> {
    let text = value.as_array()?.iter().find_map(|item| {
        ["text", "content"]
            .iter()
            .find_map(|key| item.get(*key).and_then(Value::as_str))
            .filter(|text| !text.is_empty())
            .map(ToString::to_string)
    })?;
    Some(ResolvedContent {
        text,
        kind: MessageKind::Text,
        tool_name: None,
        tool_input: None,
    })
}

impl SessionLogEntry {
    /// Decodes one raw line. `None` for blank or malformed lines.
    pub fn decode(line: &[u8]) -> Option<Self> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_slice::<SessionLogEntry>(trimmed) {
            Ok(entry) => Some(entry),
            Err(err) => {
                trace!(error = %err, "skipping undecodable session log line");
                None
            }
        }
    }

    pub fn kind(&self) -> EntryKind {
        EntryKind::from_tag(self.tag.as_deref().unwrap_or_default())
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_ref()
            .and_then(Value::as_str)
            .and_then(parse_utc_timestamp)
    }

    pub fn role(&self) -> Option<Role> {
        self.message
            .as_ref()
            .and_then(|message| message.role.as_deref())
            .and_then(Role::from_tag)
    }

    pub fn resolved_content(&self) -> Option<ResolvedContent> {
        self.message
            .as_ref()
            .and_then(|message| message.content.as_ref())
            .and_then(MessageContent::resolve)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: MessageKind,
    pub tool_name: Option<String>,
    pub tool_input: Option<String>,
}

impl Message {
    pub fn preview(&self, max_chars: usize) -> String {
        truncate(&single_line(&self.content), max_chars)
    }

    pub fn summary_line(&self, max_chars: usize) -> String {
        format!("[{}] {}", self.role.as_str(), self.preview(max_chars))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFilter {
    #[default]
    All,
    UserOnly,
    AssistantOnly,
}

impl MessageFilter {
    pub fn matches(self, message: &Message) -> bool {
        match self {
            Self::All => true,
            Self::UserOnly => message.role == Role::User,
            Self::AssistantOnly => message.role == Role::Assistant,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::All => Self::UserOnly,
            Self::UserOnly => Self::AssistantOnly,
            Self::AssistantOnly => Self::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::UserOnly => "user",
            Self::AssistantOnly => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub file_path: PathBuf,
    pub session_id: Option<String>,
    pub title: Option<String>,
    pub claude_version: Option<String>,
    pub git_branch: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(rename = "duration_seconds", serialize_with = "serialize_duration_secs")]
    pub duration: Duration,
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub compact_count: usize,
    pub error_count: usize,
    pub interruptions: usize,
    pub system_events: usize,
    pub file_snapshots: usize,
    pub progress_events: usize,
    pub queue_operations: usize,
    pub messages: Vec<Message>,
}

impl SessionStats {
    pub fn filtered_messages(&self, filter: MessageFilter) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(move |message| filter.matches(message))
    }

    pub fn summary(&self) -> String {
        format!(
            "Started: {} | Duration: {} | Messages: {} (User: {}, AI: {}) | Compacts: {} | Interruptions: {}",
            format_local_time(self.created_at, "%Y-%m-%d %H:%M"),
            human_duration(self.duration),
            self.total_messages,
            self.user_messages,
            self.assistant_messages,
            self.compact_count,
            self.interruptions,
        )
    }

    pub fn render_detail(&self, preview_chars: usize) -> String {
        let mut out = String::with_capacity(1024 + self.messages.len() * 96);

        out.push_str("=== SESSION DETAILS ===\n");
        push_field(&mut out, 16, "File", self.file_path.display());
        push_field(&mut out, 16, "Session ID", or_na(self.session_id.as_deref()));
        push_field(&mut out, 16, "Title", or_na(self.title.as_deref()));
        push_field(&mut out, 16, "Claude Version", or_na(self.claude_version.as_deref()));
        push_field(&mut out, 16, "Git Branch", or_na(self.git_branch.as_deref()));

        out.push_str("\n=== STATISTICS ===\n");
        push_field(
            &mut out,
            16,
            "Started",
            format_local_time(self.created_at, "%Y-%m-%d %H:%M:%S"),
        );
        push_field(
            &mut out,
            16,
            "Last Activity",
            format_local_time(self.last_activity, "%Y-%m-%d %H:%M:%S"),
        );
        push_field(&mut out, 16, "Duration", human_duration(self.duration));
        push_field(&mut out, 16, "Interruptions", self.interruptions);

        out.push_str("\n=== MESSAGE COUNTS ===\n");
        push_field(&mut out, 21, "Total Messages", self.total_messages);
        push_field(&mut out, 21, "User Prompts", self.user_messages);
        push_field(&mut out, 21, "Claude Responses", self.assistant_messages);

        out.push_str("\n=== EVENTS ===\n");
        push_field(&mut out, 21, "Compactions", self.compact_count);
        push_field(&mut out, 21, "System Events", self.system_events);
        push_field(&mut out, 21, "File Snapshots", self.file_snapshots);
        push_field(&mut out, 21, "Progress Events", self.progress_events);
        push_field(&mut out, 21, "Queue Operations", self.queue_operations);
        push_field(&mut out, 21, "Errors", self.error_count);

        if !self.messages.is_empty() {
            out.push_str("\n=== CONVERSATION ===\n");
            for (idx, message) in self.messages.iter().enumerate() {
                out.push_str(&format!(
                    "[{}] {} ({}): {}",
                    idx + 1,
                    message.role.as_str(),
                    format_local_time(message.timestamp, "%H:%M:%S"),
                    message.preview(preview_chars)
                ));
                if let Some(tool) = &message.tool_name {
                    out.push_str(&format!(" [tool: {tool}]"));
                }
                out.push('\n');
            }
        }

        out
    }
}

fn push_field(out: &mut String, width: usize, label: &str, value: impl Display) {
    let label = format!("{label}:");
    out.push_str(&format!("{label:<width$}{value}\n"));
}

fn or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("n/a")
}

#[derive(Debug, Default)]
struct SessionAccumulator {
    session_id: Option<String>,
    title: Option<String>,
    claude_version: Option<String>,
    git_branch: Option<String>,
    created_at: Option<DateTime<Utc>>,
    last_activity: Option<DateTime<Utc>>,
    total_messages: usize,
    user_messages: usize,
    assistant_messages: usize,
    compact_count: usize,
    error_count: usize,
    system_events: usize,
    file_snapshots: usize,
    progress_events: usize,
    queue_operations: usize,
    messages: Vec<Message>,
}

impl SessionAccumulator {
    fn apply_entry(&mut self, entry: &SessionLogEntry) {
        let timestamp = entry.parsed_timestamp();
        if let Some(ts) = timestamp {
            self.created_at = min_datetime(self.created_at, Some(ts));
            self.last_activity = max_datetime(self.last_activity, Some(ts));
        }

        fill_once(&mut self.session_id, entry.session_id.as_deref());
        fill_once(&mut self.claude_version, entry.version.as_deref());
        fill_once(&mut self.git_branch, entry.git_branch.as_deref());

        match entry.kind() {
            EntryKind::User | EntryKind::Assistant => self.apply_message(entry, timestamp),
            EntryKind::Compact => self.compact_count += 1,
            EntryKind::Error => self.error_count += 1,
            EntryKind::System => {
                self.system_events += 1;
                if entry.subtype.as_deref() == Some(COMPACT_BOUNDARY_SUBTYPE) {
                    self.compact_count += 1;
                }
            }
            EntryKind::FileHistorySnapshot => self.file_snapshots += 1,
            EntryKind::Progress => self.progress_events += 1,
            EntryKind::QueueOperation => self.queue_operations += 1,
            EntryKind::Summary => {
                if let Some(summary) = entry.summary.as_deref().filter(|s| !s.trim().is_empty()) {
                    self.title = Some(summary.trim().to_string());
                }
            }
            EntryKind::Other => {}
        }
    }

    fn apply_message(&mut self, entry: &SessionLogEntry, timestamp: Option<DateTime<Utc>>) {
        let Some(role) = entry.role() else {
            return;
        };

        self.total_messages += 1;
        match role {
            Role::User => self.user_messages += 1,
            Role::Assistant => self.assistant_messages += 1,
        }

        if let Some(resolved) = entry.resolved_content() {
            self.messages.push(Message {
                role,
                content: resolved.text,
                timestamp,
                kind: resolved.kind,
                tool_name: resolved.tool_name,
                tool_input: resolved.tool_input,
            });
        }
    }

    fn finish(self, path: &Path) -> SessionStats {
        let interruptions = count_interruptions(&self.messages, INTERRUPTION_GAP);
        SessionStats {
            file_path: path.to_path_buf(),
            session_id: self.session_id,
            title: self.title,
            claude_version: self.claude_version,
            git_branch: self.git_branch,
            created_at: self.created_at,
            last_activity: self.last_activity,
            duration: clamped_duration(self.created_at, self.last_activity),
            total_messages: self.total_messages,
            user_messages: self.user_messages,
            assistant_messages: self.assistant_messages,
            compact_count: self.compact_count,
            error_count: self.error_count,
            interruptions,
            system_events: self.system_events,
            file_snapshots: self.file_snapshots,
            progress_events: self.progress_events,
            queue_operations: self.queue_operations,
            messages: self.messages,
        }
    }
}

pub fn parse_session_file(path: &Path) -> Result<SessionStats, ParseError> {
    let file = File::open(path).map_err(|source| ParseError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let mut accumulator = SessionAccumulator::default();

    let mut line = Vec::new();
    loop {
        line.clear();
        let bytes = reader
            .read_until(b'\n', &mut line)
            .map_err(|source| ParseError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if bytes == 0 {
            break;
        }
        if let Some(entry) = SessionLogEntry::decode(&line) {
            accumulator.apply_entry(&entry);
        }
    }

    Ok(accumulator.finish(path))
}

/// Counts consecutive message pairs whose gap is strictly greater than `gap`.
/// Pairs missing a timestamp, or running backwards, never count.
pub fn count_interruptions(messages: &[Message], gap: Duration) -> usize {
    messages
        .windows(2)
        .filter(|pair| match (pair[0].timestamp, pair[1].timestamp) {
            (Some(earlier), Some(later)) => (later - earlier)
                .to_std()
                .is_ok_and(|elapsed| elapsed > gap),
            _ => false,
        })
        .count()
}

// Negative spans clamp to zero instead of erroring.
fn clamped_duration(
    created_at: Option<DateTime<Utc>>,
    last_activity: Option<DateTime<Utc>>,
) -> Duration {
    match (created_at, last_activity) {
        (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
        _ => Duration::ZERO,
    }
}

fn fill_once(slot: &mut Option<String>, value: Option<&str>) {
    if slot.is_none()
        && let Some(value) = value.map(str::trim).filter(|v| !v.is_empty())
    {
        *slot = Some(value.to_string());
    }
}

fn min_datetime(
    left: Option<DateTime<Utc>>,
    right: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (left, right) {
        (Some(a), Some(b)) => Some(if a <= b { a } else { b }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn max_datetime(
    left: Option<DateTime<Utc>>,
    right: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (left, right) {
        (Some(a), Some(b)) => Some(if a >= b { a } else { b }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

pub(crate) fn parse_utc_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn parse_one(content: &str) -> SessionStats {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("session.jsonl");
        std::fs::write(&path, content).expect("write session");
        parse_session_file(&path).expect("parse session")
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 9, h, m, s)
            .single()
            .expect("valid timestamp")
    }

    fn assert_invariants(stats: &SessionStats) {
        assert_eq!(
            stats.total_messages,
            stats.user_messages + stats.assistant_messages
        );
        if let (Some(created), Some(last)) = (stats.created_at, stats.last_activity) {
            assert!(created <= last);
            assert_eq!(stats.duration, (last - created).to_std().expect("non-negative"));
        }
    }

    #[test]
    fn parses_counts_bounds_and_history() {
        let stats = parse_one(
            r#"{"type":"user","uuid":"msg1","timestamp":"2026-01-09T14:02:46.229Z","message":{"role":"user","content":"test"},"version":"2.1.1","cwd":"/test/path","sessionId":"test-session","gitBranch":"main"}
{"type":"assistant","uuid":"msg2","timestamp":"2026-01-09T14:02:52.977Z","message":{"model":"claude-sonnet-4-5-20250929","role":"assistant","content":[{"type":"text","text":"response"}],"usage":{"input_tokens":10,"output_tokens":3}}}
{"type":"user","uuid":"msg3","timestamp":"2026-01-09T14:03:00.000Z","message":{"role":"user","content":"second message"}}
{"type":"assistant","uuid":"msg4","timestamp":"2026-01-09T14:04:00.000Z","message":{"role":"assistant","content":[]}}
"#,
        );

        assert_invariants(&stats);
        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.user_messages, 2);
        assert_eq!(stats.assistant_messages, 2);
        assert_eq!(stats.messages.len(), 3);
        assert_eq!(stats.interruptions, 0);
        assert_eq!(stats.session_id.as_deref(), Some("test-session"));
        assert_eq!(stats.git_branch.as_deref(), Some("main"));
        assert_eq!(stats.claude_version.as_deref(), Some("2.1.1"));
        assert_eq!(stats.created_at, Some(at(14, 2, 46) + chrono::Duration::milliseconds(229)));
        assert_eq!(stats.last_activity, Some(at(14, 4, 0)));
        assert!(stats.duration > Duration::ZERO);

        let contents: Vec<&str> = stats.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["test", "response", "second message"]);
        assert_eq!(stats.messages[1].role, Role::Assistant);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let stats = parse_one(
            r#"{"type":"user","timestamp":"2026-01-09T14:00:00Z","message":{"role":"user","content":"one"}}
{"type":"assistant","timestamp":"2026-01-09T14:00:05Z","message":{"role":"assis
not json at all

{"type":"assistant","timestamp":"2026-01-09T14:00:10Z","message":{"role":"assistant","content":"two"}}
"#,
        );

        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.messages.len(), 2);
        assert_eq!(stats.last_activity, Some(at(14, 0, 10)));
    }

    #[test]
    fn string_content_is_kept_verbatim() {
        let stats = parse_one(
            r#"{"type":"user","timestamp":"2026-01-09T14:00:00Z","message":{"role":"user","content":"  spaced\nmulti-line  "}}"#,
        );
        assert_eq!(stats.messages[0].content, "  spaced\nmulti-line  ");
        assert_eq!(stats.messages[0].kind, MessageKind::Text);
    }

    #[test]
    fn block_content_uses_first_text_block() {
        let stats = parse_one(
            r#"{"type":"assistant","timestamp":"2026-01-09T14:00:00Z","message":{"role":"assistant","content":[{"type":"thinking","thinking":"hmm"},{"type":"image","source":{}},{"type":"text","text":"first"},{"type":"text","text":"second"}]}}"#,
        );
        assert_eq!(stats.messages.len(), 1);
        assert_eq!(stats.messages[0].content, "first");
    }

    #[test]
    fn blocks_without_text_count_but_add_no_history() {
        let stats = parse_one(
            r#"{"type":"assistant","timestamp":"2026-01-09T14:00:00Z","message":{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"a.rs"}}]}}
{"type":"assistant","timestamp":"2026-01-09T14:00:01Z","message":{"content":"no role"}}
{"type":"user","timestamp":"2026-01-09T14:00:02Z"}"#,
        );
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.assistant_messages, 1);
        assert!(stats.messages.is_empty());
        assert_invariants(&stats);
    }

    #[test]
    fn tool_invocations_and_results_are_classified() {
        let stats = parse_one(
            r#"{"type":"assistant","timestamp":"2026-01-09T14:00:00Z","message":{"role":"assistant","content":[{"type":"text","text":"Reading it"},{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"a.rs"}}]}}
{"type":"user","timestamp":"2026-01-09T14:00:01Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"fn main() {}"}]}}
{"type":"user","timestamp":"2026-01-09T14:00:02Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t2","content":[{"type":"text","text":"nested"}]}]}}"#,
        );

        assert_eq!(stats.messages.len(), 3);
        let invocation = &stats.messages[0];
        assert_eq!(invocation.kind, MessageKind::ToolUse);
        assert_eq!(invocation.tool_name.as_deref(), Some("Read"));
        assert_eq!(
            invocation.tool_input.as_deref(),
            Some(r#"{"file_path":"a.rs"}"#)
        );
        assert_eq!(stats.messages[1].kind, MessageKind::ToolResult);
        assert_eq!(stats.messages[1].content, "fn main() {}");
        assert_eq!(stats.messages[2].content, "nested");
    }

    #[test]
    fn untyped_block_lists_resolve_leniently() {
        let content: MessageContent =
            serde_json::from_str(r#"[{"content":"legacy text"}]"#).expect("decode content");
        assert!(matches!(content, MessageContent::Other(_)));
        assert_eq!(
            content.resolve().map(|r| r.text).as_deref(),
            Some("legacy text")
        );
    }

    #[test]
    fn parsing_twice_is_identical() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("session.jsonl");
        std::fs::write(
            &path,
            r#"{"type":"user","timestamp":"2026-01-09T14:00:00Z","message":{"role":"user","content":"hi"}}
{"type":"assistant","timestamp":"2026-01-09T16:00:00Z","message":{"role":"assistant","content":[{"type":"text","text":"hello"}]}}
{"type":"compact","timestamp":"2026-01-09T16:01:00Z"}"#,
        )
        .expect("write session");

        let first = parse_session_file(&path).expect("first parse");
        let second = parse_session_file(&path).expect("second parse");
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).expect("serialize first"),
            serde_json::to_string(&second).expect("serialize second")
        );
    }

    #[test]
    fn detects_one_interruption_across_long_gap() {
        let stats = parse_one(
            r#"{"type":"user","timestamp":"2026-01-09T14:00:00.000Z","message":{"role":"user","content":"msg1"}}
{"type":"assistant","timestamp":"2026-01-09T14:01:00.000Z","message":{"role":"assistant","content":"reply1"}}
{"type":"user","timestamp":"2026-01-09T16:30:00.000Z","message":{"role":"user","content":"msg2"}}
{"type":"assistant","timestamp":"2026-01-09T16:31:00.000Z","message":{"role":"assistant","content":"reply2"}}"#,
        );
        assert_eq!(stats.messages.len(), 4);
        assert_eq!(stats.interruptions, 1);
    }

    #[test]
    fn gap_equal_to_threshold_is_not_an_interruption() {
        let message = |ts: DateTime<Utc>| Message {
            role: Role::User,
            content: "x".to_string(),
            timestamp: Some(ts),
            kind: MessageKind::Text,
            tool_name: None,
            tool_input: None,
        };
        let exact = vec![message(at(10, 0, 0)), message(at(11, 0, 0))];
        assert_eq!(count_interruptions(&exact, INTERRUPTION_GAP), 0);

        let over = vec![message(at(10, 0, 0)), message(at(11, 0, 1))];
        assert_eq!(count_interruptions(&over, INTERRUPTION_GAP), 1);

        let mut untimed = message(at(12, 0, 0));
        untimed.timestamp = None;
        let skipped = vec![message(at(9, 0, 0)), untimed, message(at(15, 0, 0))];
        assert_eq!(count_interruptions(&skipped, INTERRUPTION_GAP), 0);
    }

    #[test]
    fn empty_file_yields_zeroed_stats() {
        let stats = parse_one("");
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.duration, Duration::ZERO);
        assert_eq!(stats.created_at, None);
        assert_eq!(stats.last_activity, None);
        assert!(stats.messages.is_empty());
    }

    #[test]
    fn non_message_events_still_set_bounds() {
        let stats = parse_one(
            r#"{"type":"system","timestamp":"2026-01-09T14:00:00Z","subtype":"turn_duration","durationMs":50000}
{"type":"error","timestamp":"2026-01-09T14:10:00Z","data":{"message":"rate limited"}}
{"type":"system","timestamp":"2026-01-09T14:20:00Z","subtype":"compact_boundary"}"#,
        );

        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.created_at, Some(at(14, 0, 0)));
        assert_eq!(stats.last_activity, Some(at(14, 20, 0)));
        assert_eq!(stats.duration, Duration::from_secs(20 * 60));
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.system_events, 2);
        assert_eq!(stats.compact_count, 1);
    }

    #[test]
    fn event_types_update_their_own_counters() {
        let stats = parse_one(
            r#"{"type":"user","timestamp":"2026-01-09T14:00:00.000Z","message":{"role":"user","content":"hello"}}
{"type":"compact","timestamp":"2026-01-09T14:00:30Z"}
{"type":"file-history-snapshot","timestamp":"2026-01-09T14:02:00.000Z","snapshot":{"timestamp":"2026-01-09T14:02:00.000Z"}}
{"type":"progress","timestamp":"2026-01-09T14:03:00Z","data":{"step":1}}
{"type":"queue-operation","timestamp":"2026-01-09T14:04:00Z","operation":"enqueue"}
{"type":"summary","summary":"Fix the parser","leafUuid":"abc"}"#,
        );

        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.compact_count, 1);
        assert_eq!(stats.file_snapshots, 1);
        assert_eq!(stats.progress_events, 1);
        assert_eq!(stats.queue_operations, 1);
        assert_eq!(stats.title.as_deref(), Some("Fix the parser"));
        assert_eq!(stats.last_activity, Some(at(14, 4, 0)));
    }

    #[test]
    fn mistyped_informational_fields_do_not_drop_the_line() {
        let stats = parse_one(
            r#"{"type":"user","timestamp":"2026-01-09T14:00:00Z","message":{"role":"user","content":"hi"},"version":2,"cwd":["/a"],"sessionId":null}
{"type":"error","timestamp":"2026-01-09T14:05:00Z","summary":{"text":"x"},"gitBranch":false}
{"type":"system","timestamp":"2026-01-09T14:10:00Z","subtype":7}
{"type":"summary","summary":42}
{"type":"assistant","timestamp":"2026-01-09T14:15:00Z","message":{"role":5,"content":"dropped role"}}
{"type":"assistant","timestamp":"2026-01-09T14:20:00Z","message":"not an object"}"#,
        );

        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.system_events, 1);
        assert_eq!(stats.compact_count, 0);
        assert_eq!(stats.claude_version, None);
        assert_eq!(stats.git_branch, None);
        assert_eq!(stats.title, None);
        assert_eq!(stats.created_at, Some(at(14, 0, 0)));
        assert_eq!(stats.last_activity, Some(at(14, 20, 0)));
    }

    #[test]
    fn non_string_type_tag_counts_as_other() {
        let entry = SessionLogEntry::decode(br#"{"type":3,"timestamp":"2026-01-09T14:00:00Z"}"#)
            .expect("valid JSON line decodes");
        assert_eq!(entry.kind(), EntryKind::Other);
        assert_eq!(entry.parsed_timestamp(), Some(at(14, 0, 0)));
    }

    #[test]
    fn unparsable_timestamps_skip_bounds_but_keep_side_effects() {
        let stats = parse_one(
            r#"{"type":"user","timestamp":"yesterday","message":{"role":"user","content":"undated"}}
{"type":"error","timestamp":12345}
{"type":"assistant","timestamp":"2026-01-09T14:00:00+02:00","message":{"role":"assistant","content":"dated"}}"#,
        );

        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.messages[0].timestamp, None);
        assert_eq!(stats.created_at, Some(at(12, 0, 0)));
        assert_eq!(stats.created_at, stats.last_activity);
        assert_eq!(stats.duration, Duration::ZERO);
    }

    #[test]
    fn out_of_order_entries_keep_bounds_ordered() {
        let stats = parse_one(
            r#"{"type":"user","timestamp":"2026-01-09T15:00:00Z","message":{"role":"user","content":"later"}}
{"type":"assistant","timestamp":"2026-01-09T14:00:00Z","message":{"role":"assistant","content":"earlier"}}"#,
        );
        assert_invariants(&stats);
        assert_eq!(stats.duration, Duration::from_secs(3600));
        assert_eq!(stats.interruptions, 0);
        assert_eq!(stats.messages[0].content, "later");
    }

    #[test]
    fn negative_span_clamps_to_zero() {
        assert_eq!(
            clamped_duration(Some(at(15, 0, 0)), Some(at(14, 0, 0))),
            Duration::ZERO
        );
        assert_eq!(clamped_duration(None, Some(at(14, 0, 0))), Duration::ZERO);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let tmp = TempDir::new().expect("temp dir");
        let err = parse_session_file(&tmp.path().join("missing.jsonl")).expect_err("missing");
        assert!(matches!(err, ParseError::Open { .. }));
    }

    #[test]
    fn summary_and_detail_render_from_stats() {
        let stats = parse_one(
            r#"{"type":"user","timestamp":"2026-01-09T14:00:00Z","message":{"role":"user","content":"first line\nsecond line"}}
{"type":"assistant","timestamp":"2026-01-09T14:05:00Z","message":{"role":"assistant","content":[{"type":"text","text":"ok"},{"type":"tool_use","name":"Bash","input":{"command":"ls"}}]}}"#,
        );

        let summary = stats.summary();
        assert!(summary.contains("Duration: 5m 0s"));
        assert!(summary.contains("Messages: 2 (User: 1, AI: 1)"));
        assert!(summary.contains("Compacts: 0"));

        let detail = stats.render_detail(100);
        assert!(detail.contains("=== STATISTICS ==="));
        assert!(detail.contains("=== CONVERSATION ==="));
        assert!(detail.contains("first line second line"));
        assert!(detail.contains("[tool: Bash]"));
        assert!(detail.contains("Git Branch:     n/a\n"));
        assert!(detail.contains("User Prompts:        1\n"));
    }

    #[test]
    fn message_filter_cycles_and_matches() {
        let stats = parse_one(
            r#"{"type":"user","timestamp":"2026-01-09T14:00:00Z","message":{"role":"user","content":"q"}}
{"type":"assistant","timestamp":"2026-01-09T14:00:01Z","message":{"role":"assistant","content":"a"}}"#,
        );
        assert_eq!(stats.filtered_messages(MessageFilter::All).count(), 2);
        assert_eq!(stats.filtered_messages(MessageFilter::UserOnly).count(), 1);
        assert_eq!(
            stats
                .filtered_messages(MessageFilter::AssistantOnly)
                .next()
                .map(|m| m.content.as_str()),
            Some("a")
        );
        assert_eq!(MessageFilter::AssistantOnly.next(), MessageFilter::All);
    }

    #[test]
    fn message_preview_is_single_line_and_truncated() {
        let message = Message {
            role: Role::Assistant,
            content: "line one\nline two that keeps going".to_string(),
            timestamp: None,
            kind: MessageKind::Text,
            tool_name: None,
            tool_input: None,
        };
        assert_eq!(message.preview(12), "line one ...");
        assert_eq!(message.summary_line(80), "[assistant] line one line two that keeps going");
    }
}
