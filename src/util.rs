use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serializer;
use tracing_subscriber::{EnvFilter, fmt};

/// Logs go to stderr so table and JSON output on stdout stay clean.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

pub fn human_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

pub fn format_memory_mb(memory_mb: f64) -> String {
    if memory_mb >= 1024.0 {
        format!("{:.2}G", memory_mb / 1024.0)
    } else {
        format!("{memory_mb:.1}M")
    }
}

pub fn format_local_time(ts: Option<DateTime<Utc>>, pattern: &str) -> String {
    match ts {
        Some(ts) => ts.with_timezone(&Local).format(pattern).to_string(),
        None => "n/a".to_string(),
    }
}

/// Char-based, so multi-byte text never gets split mid-codepoint.
pub fn truncate(input: &str, max_len: usize) -> String {
    if input.chars().count() <= max_len {
        return input.to_string();
    }
    if max_len <= 3 {
        return input.chars().take(max_len).collect();
    }
    let head: String = input.chars().take(max_len - 3).collect();
    format!("{head}...")
}

pub fn single_line(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch == '\n' || ch == '\r' || ch == '\t' { ' ' } else { ch })
        .collect()
}

/// Word-wraps each input line to `width` chars. Words longer than a line are
/// split. Blank input lines are kept.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for raw in text.lines() {
        let raw = raw.replace('\t', "    ");
        if raw.chars().count() <= width {
            lines.push(raw);
            continue;
        }

        let mut current = String::new();
        let mut current_len = 0;
        for word in raw.split(' ') {
            let word_len = word.chars().count();
            if current_len > 0 && current_len + 1 + word_len > width {
                lines.push(current.trim_end().to_string());
                current.clear();
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            for ch in word.chars() {
                if current_len == width {
                    lines.push(current.trim_end().to_string());
                    current.clear();
                    current_len = 0;
                }
                current.push(ch);
                current_len += 1;
            }
        }
        if !current.is_empty() {
            lines.push(current.trim_end().to_string());
        }
    }
    lines
}

pub fn now_local() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn serialize_duration_secs<S: Serializer>(
    value: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}
