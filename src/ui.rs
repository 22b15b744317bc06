use std::io::{Write, stdout};
use std::path::Path;

use anyhow::Result;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::execute;
use crossterm::style::{Color, Stylize};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};

use crate::discovery::{ProjectDir, SessionInfo};
use crate::process::{ProcessRecord, ProcessSort};
use crate::session::{Message, MessageFilter, SessionStats};
use crate::util::{
    format_local_time, format_memory_mb, human_duration, now_local, truncate, wrap_text,
};

const FOOTER_ROWS: u16 = 2;
const BANNER: &str = "claudewatch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiLayoutMode {
    Full,
    Compact,
    Minimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Processes,
    Sessions,
    Detail,
    Message,
    Projects,
}

impl View {
    fn title(self) -> &'static str {
        match self {
            Self::Processes => "Processes",
            Self::Sessions => "Sessions",
            Self::Detail => "Session Detail",
            Self::Message => "Message",
            Self::Projects => "Projects",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameBudget {
    pub width: u16,
    pub height: u16,
    pub footer_rows: u16,
}

impl FrameBudget {
    fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            footer_rows: FOOTER_ROWS.min(height),
        }
    }

    fn body_bottom(self) -> u16 {
        self.height.saturating_sub(self.footer_rows)
    }
}

pub struct RenderData<'a> {
    pub view: View,
    pub refresh_secs: u64,
    pub show_helpers: bool,
    pub sort: ProcessSort,
    pub ascending: bool,
    pub processes: &'a [ProcessRecord],
    pub process_cursor: usize,
    pub sessions_dir: Option<&'a Path>,
    pub sessions: &'a [SessionInfo],
    pub session_cursor: usize,
    pub detail: Option<&'a SessionStats>,
    pub message_filter: MessageFilter,
    pub detail_scroll: usize,
    pub preview_chars: usize,
    pub message: Option<&'a Message>,
    pub message_scroll: usize,
    pub projects: &'a [ProjectDir],
    pub project_cursor: usize,
    pub loading: bool,
    pub status: Option<&'a str>,
}

pub fn enter_terminal() -> Result<()> {
    let mut out = stdout();
    terminal::enable_raw_mode()?;
    execute!(out, EnterAlternateScreen, Hide)?;
    Ok(())
}

pub fn leave_terminal() -> Result<()> {
    let mut out = stdout();
    execute!(out, Show, LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    Ok(())
}

/// Rows available for a scrolling list once the header lines are drawn.
pub fn list_rows(height: u16) -> usize {
    usize::from(FrameBudget::new(0, height).body_bottom().saturating_sub(5))
}

pub fn draw(data: &RenderData<'_>) -> Result<()> {
    let mut out = stdout();
    let (width, height) = terminal::size()?;
    if width == 0 || height == 0 {
        return Ok(());
    }

    let budget = FrameBudget::new(width, height);
    let max_body_row = budget.body_bottom();
    let layout = select_layout_mode(width, height);
    let w = width as usize;

    execute!(out, MoveTo(0, 0), Clear(ClearType::All))?;

    let mut row = 0u16;
    render_header(&mut out, &mut row, max_body_row, w, layout, data)?;

    match data.view {
        View::Processes => render_processes(&mut out, &mut row, max_body_row, w, layout, data)?,
        View::Sessions => render_sessions(&mut out, &mut row, max_body_row, w, data)?,
        View::Detail => render_detail(&mut out, &mut row, max_body_row, w, layout, data)?,
        View::Message => render_message(&mut out, &mut row, max_body_row, w, data)?,
        View::Projects => render_projects(&mut out, &mut row, max_body_row, w, layout, data)?,
    }

    render_footer(&mut out, w, height, data.view)?;
    out.flush()?;
    Ok(())
}

fn render_header(
    out: &mut impl Write,
    row: &mut u16,
    max_body_row: u16,
    width: usize,
    layout: UiLayoutMode,
    data: &RenderData<'_>,
) -> Result<()> {
    let mut header = format!("{BANNER} | {} | {}", data.view.title(), now_local());
    if !matches!(layout, UiLayoutMode::Minimal) {
        header.push_str(&format!(
            " | refresh {}s | helpers {}",
            data.refresh_secs,
            if data.show_helpers { "on" } else { "off" }
        ));
    }
    if data.loading {
        header.push_str(" | loading...");
    }
    write_line(out, row, max_body_row, width, &header)?;

    match data.status {
        Some(status) => {
            if *row < max_body_row {
                execute!(out, MoveTo(0, *row), Clear(ClearType::CurrentLine))?;
                write!(out, "{}", truncate(status, width).with(Color::Red))?;
                *row += 1;
            }
        }
        None => {
            write_line(out, row, max_body_row, width, "")?;
        }
    }
    Ok(())
}

fn render_processes(
    out: &mut impl Write,
    row: &mut u16,
    max_body_row: u16,
    width: usize,
    layout: UiLayoutMode,
    data: &RenderData<'_>,
) -> Result<()> {
    let order = if data.ascending { "asc" } else { "desc" };
    let title = format!(
        "{} Claude process(es) | sort {} {order}",
        data.processes.len(),
        data.sort.label()
    );
    if !write_line(out, row, max_body_row, width, &hr(&title, width))? {
        return Ok(());
    }

    let columns = ProcessColumns::for_width(width, layout);
    write_line(out, row, max_body_row, width, &columns.header())?;

    if data.processes.is_empty() {
        let message = if data.loading {
            "Scanning..."
        } else {
            "No Claude processes found."
        };
        write_line(out, row, max_body_row, width, message)?;
        return Ok(());
    }

    let rows = usize::from(max_body_row.saturating_sub(*row));
    let (start, end) = visible_window(data.process_cursor, data.processes.len(), rows);
    for (idx, record) in data.processes[start..end].iter().enumerate() {
        let selected = start + idx == data.process_cursor;
        if !write_row(
            out,
            row,
            max_body_row,
            width,
            &columns.row(record),
            selected,
            record.is_helper,
        )? {
            break;
        }
    }
    Ok(())
}

fn render_sessions(
    out: &mut impl Write,
    row: &mut u16,
    max_body_row: u16,
    width: usize,
    data: &RenderData<'_>,
) -> Result<()> {
    let dir = data
        .sessions_dir
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|| "n/a".to_string());
    let title = format!("{} session(s) in {dir}", data.sessions.len());
    if !write_line(out, row, max_body_row, width, &hr(&title, width))? {
        return Ok(());
    }
    write_line(
        out,
        row,
        max_body_row,
        width,
        &session_header(width),
    )?;

    if data.sessions.is_empty() {
        let message = if data.loading {
            "Looking for session logs..."
        } else {
            "No sessions recorded for this directory."
        };
        write_line(out, row, max_body_row, width, message)?;
        return Ok(());
    }

    let rows = usize::from(max_body_row.saturating_sub(*row));
    let (start, end) = visible_window(data.session_cursor, data.sessions.len(), rows);
    for (idx, info) in data.sessions[start..end].iter().enumerate() {
        let selected = start + idx == data.session_cursor;
        if !write_row(
            out,
            row,
            max_body_row,
            width,
            &session_row(info, width),
            selected,
            false,
        )? {
            break;
        }
    }
    Ok(())
}

fn render_detail(
    out: &mut impl Write,
    row: &mut u16,
    max_body_row: u16,
    width: usize,
    layout: UiLayoutMode,
    data: &RenderData<'_>,
) -> Result<()> {
    let Some(stats) = data.detail else {
        let message = if data.loading {
            "Parsing session log..."
        } else {
            "No session loaded."
        };
        write_line(out, row, max_body_row, width, message)?;
        return Ok(());
    };

    if !write_line(out, row, max_body_row, width, &hr("Statistics", width))? {
        return Ok(());
    }

    let mut lines = vec![
        kv_line(
            "Session",
            stats.session_id.as_deref().unwrap_or("n/a"),
        ),
        kv_line(
            "Started",
            &format_local_time(stats.created_at, "%Y-%m-%d %H:%M:%S"),
        ),
        kv_line("Duration", &human_duration(stats.duration)),
        kv_line(
            "Messages",
            &format!(
                "{} (user {}, assistant {})",
                stats.total_messages, stats.user_messages, stats.assistant_messages
            ),
        ),
        kv_line(
            "Events",
            &format!(
                "compacts {} | errors {} | interruptions {}",
                stats.compact_count, stats.error_count, stats.interruptions
            ),
        ),
    ];
    if matches!(layout, UiLayoutMode::Full) {
        lines.insert(1, kv_line("Title", stats.title.as_deref().unwrap_or("n/a")));
        lines.push(kv_line(
            "Version",
            &format!(
                "{} | branch {}",
                stats.claude_version.as_deref().unwrap_or("n/a"),
                stats.git_branch.as_deref().unwrap_or("n/a")
            ),
        ));
        lines.push(kv_line(
            "File",
            &stats.file_path.display().to_string(),
        ));
    }
    for line in lines {
        if !write_line(out, row, max_body_row, width, &line)? {
            return Ok(());
        }
    }

    let messages: Vec<_> = stats.filtered_messages(data.message_filter).collect();
    let title = format!(
        "Conversation | {} message(s) | filter {}",
        messages.len(),
        data.message_filter.label()
    );
    if !write_line(out, row, max_body_row, width, &hr(&title, width))? {
        return Ok(());
    }
    if messages.is_empty() {
        write_line(out, row, max_body_row, width, "No messages.")?;
        return Ok(());
    }

    let preview_chars = data.preview_chars.min(width.saturating_sub(24).max(8));
    for (idx, message) in messages.iter().skip(data.detail_scroll).enumerate() {
        let mut line = format!(
            "{} {:<9} {}",
            format_local_time(message.timestamp, "%H:%M:%S"),
            message.role.as_str(),
            message.preview(preview_chars)
        );
        if let Some(tool) = &message.tool_name {
            line.push_str(&format!(" [{tool}]"));
        }
        if !write_row(out, row, max_body_row, width, &line, idx == 0, false)? {
            break;
        }
    }
    Ok(())
}

fn render_message(
    out: &mut impl Write,
    row: &mut u16,
    max_body_row: u16,
    width: usize,
    data: &RenderData<'_>,
) -> Result<()> {
    let Some(message) = data.message else {
        write_line(out, row, max_body_row, width, "No message selected.")?;
        return Ok(());
    };

    let lines = message_lines(message, width);
    let rows = usize::from(max_body_row.saturating_sub(*row + 1));
    let scroll = data
        .message_scroll
        .min(lines.len().saturating_sub(rows.max(1)));
    let title = format!(
        "{} message | lines {}-{} of {}",
        message.role.as_str(),
        (scroll + 1).min(lines.len()),
        (scroll + rows).min(lines.len()),
        lines.len()
    );
    if !write_line(out, row, max_body_row, width, &hr(&title, width))? {
        return Ok(());
    }
    for line in lines.iter().skip(scroll) {
        if !write_line(out, row, max_body_row, width, line)? {
            break;
        }
    }
    Ok(())
}

/// Full text of one message, wrapped to `width`: metadata first, then the
/// tool invocation if any, then the content.
pub fn message_lines(message: &Message, width: usize) -> Vec<String> {
    let mut lines = vec![
        kv_line("Role", message.role.as_str()),
        kv_line("Time", &format_local_time(message.timestamp, "%Y-%m-%d %H:%M:%S")),
        kv_line("Kind", message.kind.label()),
    ];
    if let Some(tool) = &message.tool_name {
        lines.push(kv_line("Tool", tool));
    }
    if let Some(input) = &message.tool_input {
        lines.push("Tool input:".to_string());
        lines.extend(wrap_text(input, width));
    }
    lines.push(String::new());
    lines.extend(wrap_text(&message.content, width));
    lines
}

fn render_projects(
    out: &mut impl Write,
    row: &mut u16,
    max_body_row: u16,
    width: usize,
    layout: UiLayoutMode,
    data: &RenderData<'_>,
) -> Result<()> {
    let title = format!("{} project(s)", data.projects.len());
    if !write_line(out, row, max_body_row, width, &hr(&title, width))? {
        return Ok(());
    }

    if data.projects.is_empty() {
        let message = if data.loading {
            "Reading projects..."
        } else {
            "No projects found."
        };
        write_line(out, row, max_body_row, width, message)?;
        return Ok(());
    }

    let rows = usize::from(max_body_row.saturating_sub(*row));
    let (start, end) = visible_window(data.project_cursor, data.projects.len(), rows);
    for (idx, project) in data.projects[start..end].iter().enumerate() {
        let selected = start + idx == data.project_cursor;
        if !write_row(
            out,
            row,
            max_body_row,
            width,
            &project_row(project, layout),
            selected,
            project.original_path.is_none(),
        )? {
            break;
        }
    }
    Ok(())
}

fn render_footer(out: &mut impl Write, width: usize, height: u16, view: View) -> Result<()> {
    if height == 0 {
        return Ok(());
    }

    let hints = key_hints(view, width);
    if height >= 2 {
        execute!(out, MoveTo(0, height - 2), Clear(ClearType::CurrentLine))?;
        write!(out, "{}", "-".repeat(width).dark_grey())?;
    }
    execute!(out, MoveTo(0, height - 1), Clear(ClearType::CurrentLine))?;
    write!(out, "{}", truncate(hints, width))?;
    Ok(())
}

fn key_hints(view: View, width: usize) -> &'static str {
    let wide = width >= 96;
    match (view, wide) {
        (View::Processes, true) => {
            "↑/↓ move  Enter sessions  r refresh  h helpers  s sort  o order  p projects  q quit"
        }
        (View::Processes, false) => "↑↓ Enter r h s o p q",
        (View::Sessions, true) => "↑/↓ move  Enter inspect  Esc back  r refresh  q quit",
        (View::Sessions, false) => "↑↓ Enter Esc r q",
        (View::Detail, true) => {
            "↑/↓ PgUp/PgDn scroll  Enter open  f filter  Esc back  r reload  q quit"
        }
        (View::Detail, false) => "↑↓ PgUp PgDn Enter f Esc r q",
        (View::Message, true) => "↑/↓ PgUp/PgDn scroll  Esc back  q quit",
        (View::Message, false) => "↑↓ PgUp PgDn Esc q",
        (View::Projects, true) => "↑/↓ move  Enter sessions  Esc back  r refresh  q quit",
        (View::Projects, false) => "↑↓ Enter Esc r q",
    }
}

struct ProcessColumns {
    workdir: usize,
    command: usize,
}

impl ProcessColumns {
    const PID: usize = 8;
    const CPU: usize = 7;
    const MEM: usize = 9;
    const UPTIME: usize = 9;

    fn for_width(width: usize, layout: UiLayoutMode) -> Self {
        let fixed = Self::PID + Self::CPU + Self::MEM + Self::UPTIME + 5;
        let rest = width.saturating_sub(fixed);
        if matches!(layout, UiLayoutMode::Minimal) {
            return Self {
                workdir: rest,
                command: 0,
            };
        }
        let workdir = (rest * 2 / 5).max(12);
        Self {
            workdir,
            command: rest.saturating_sub(workdir + 1),
        }
    }

    fn header(&self) -> String {
        self.format(["PID", "CPU%", "MEM", "UPTIME", "WORKDIR", "COMMAND"])
    }

    fn row(&self, record: &ProcessRecord) -> String {
        let pid = if record.is_helper {
            format!("{}*", record.pid)
        } else {
            record.pid.to_string()
        };
        self.format([
            &pid,
            &format!("{:.1}", record.cpu_percent),
            &format_memory_mb(record.memory_mb),
            &human_duration(record.uptime),
            &record.working_dir.to_string(),
            &record.command,
        ])
    }

    fn format(&self, cells: [&str; 6]) -> String {
        let mut line = format!(
            "{} {} {} {} {}",
            pad(cells[0], Self::PID),
            pad(cells[1], Self::CPU),
            pad(cells[2], Self::MEM),
            pad(cells[3], Self::UPTIME),
            pad(cells[4], self.workdir),
        );
        if self.command > 0 {
            line.push(' ');
            line.push_str(&truncate(cells[5], self.command));
        }
        line.trim_end().to_string()
    }
}

fn session_header(width: usize) -> String {
    let title = width.saturating_sub(8 + 16 + 2);
    format!("{} {} {}", pad("ID", 8), pad("UPDATED", 16), truncate("TITLE", title))
}

fn session_row(info: &SessionInfo, width: usize) -> String {
    let title = width.saturating_sub(8 + 16 + 2);
    format!(
        "{} {} {}",
        pad(info.short_id(), 8),
        pad(&info.updated_label(), 16),
        truncate(&info.title, title)
    )
}

fn project_row(project: &ProjectDir, layout: UiLayoutMode) -> String {
    let sessions = format!("{:>4} session(s)", project.sessions);
    if matches!(layout, UiLayoutMode::Minimal) {
        return format!("{sessions}  {}", project.display_name);
    }
    format!(
        "{sessions}  {}  {}",
        format_local_time(Some(project.modified), "%Y-%m-%d %H:%M"),
        project.display_name
    )
}

/// First and one-past-last index of a scrolling list that keeps `cursor`
/// on screen.
fn visible_window(cursor: usize, len: usize, rows: usize) -> (usize, usize) {
    if rows == 0 || len == 0 {
        return (0, 0);
    }
    let start = if cursor >= rows { cursor + 1 - rows } else { 0 };
    let start = start.min(len.saturating_sub(1));
    (start, (start + rows).min(len))
}

fn pad(text: &str, width: usize) -> String {
    format!("{:<width$}", truncate(text, width))
}

fn write_line(
    out: &mut impl Write,
    row: &mut u16,
    max_body_row: u16,
    width: usize,
    text: &str,
) -> Result<bool> {
    if *row >= max_body_row {
        return Ok(false);
    }

    execute!(out, MoveTo(0, *row), Clear(ClearType::CurrentLine))?;
    write!(out, "{}", truncate(text, width))?;
    *row += 1;
    Ok(true)
}

fn write_row(
    out: &mut impl Write,
    row: &mut u16,
    max_body_row: u16,
    width: usize,
    text: &str,
    selected: bool,
    dimmed: bool,
) -> Result<bool> {
    if *row >= max_body_row {
        return Ok(false);
    }

    execute!(out, MoveTo(0, *row), Clear(ClearType::CurrentLine))?;
    let clipped = format!("{:<width$}", truncate(text, width));
    if selected {
        write!(out, "{}", clipped.reverse())?;
    } else if dimmed {
        write!(out, "{}", clipped.dark_grey())?;
    } else {
        write!(out, "{clipped}")?;
    }
    *row += 1;
    Ok(true)
}

fn kv_line(label: &str, value: &str) -> String {
    format!("{label:<11}: {value}")
}

fn hr(title: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }

    let core = format!(" {title} ");
    let core_len = core.chars().count();
    if core_len >= width {
        return truncate(title, width);
    }

    let side = (width - core_len) / 2;
    let right = width - core_len - side;
    format!("{}{}{}", "-".repeat(side), core, "-".repeat(right))
}

fn select_layout_mode(width: u16, height: u16) -> UiLayoutMode {
    if width >= 104 && height >= 28 {
        UiLayoutMode::Full
    } else if width >= 76 && height >= 18 {
        UiLayoutMode::Compact
    } else {
        UiLayoutMode::Minimal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use chrono::Utc;

    use crate::process::WorkingDir;
    use crate::session::{MessageKind, Role};

    fn record(pid: u32, helper: bool) -> ProcessRecord {
        ProcessRecord {
            pid,
            cpu_percent: 12.345,
            memory_mb: 256.0,
            working_dir: WorkingDir::Path(PathBuf::from("/Users/dev/project")),
            command: "claude --resume".to_string(),
            start_time: Utc::now(),
            uptime: Duration::from_secs(3_725),
            is_helper: helper,
        }
    }

    #[test]
    fn header_rule_respects_requested_width() {
        let line = hr("Test", 24);
        assert_eq!(line.len(), 24);
    }

    #[test]
    fn layout_mode_switches_by_terminal_size() {
        assert_eq!(select_layout_mode(120, 32), UiLayoutMode::Full);
        assert_eq!(select_layout_mode(90, 22), UiLayoutMode::Compact);
        assert_eq!(select_layout_mode(60, 16), UiLayoutMode::Minimal);
    }

    #[test]
    fn frame_budget_reserves_footer() {
        let budget = FrameBudget::new(120, 30);
        assert_eq!(budget.body_bottom(), 28);
        assert_eq!(list_rows(30), 23);
        assert_eq!(list_rows(3), 0);
    }

    #[test]
    fn visible_window_keeps_cursor_on_screen() {
        assert_eq!(visible_window(0, 50, 10), (0, 10));
        assert_eq!(visible_window(9, 50, 10), (0, 10));
        assert_eq!(visible_window(10, 50, 10), (1, 11));
        assert_eq!(visible_window(49, 50, 10), (40, 50));
        assert_eq!(visible_window(2, 3, 10), (0, 3));
        assert_eq!(visible_window(0, 0, 10), (0, 0));
    }

    #[test]
    fn process_rows_line_up_with_header() {
        let columns = ProcessColumns::for_width(120, UiLayoutMode::Full);
        let header = columns.header();
        let row = columns.row(&record(4242, false));

        assert!(header.starts_with("PID      CPU%"));
        assert!(row.starts_with("4242     12.3"));
        assert_eq!(header.find("WORKDIR"), row.find("/Users/dev/project"));
        assert!(row.contains("256.0M"));
        assert!(row.contains("1h 2m"));
        assert!(row.ends_with("claude --resume"));
    }

    #[test]
    fn helpers_are_marked_and_minimal_layout_drops_command() {
        let columns = ProcessColumns::for_width(60, UiLayoutMode::Minimal);
        let row = columns.row(&record(7, true));
        assert!(row.starts_with("7*"));
        assert!(!row.contains("claude --resume"));
        assert!(!columns.header().contains("COMMAND"));
    }

    #[test]
    fn key_hints_shrink_on_narrow_terminals() {
        assert!(key_hints(View::Processes, 120).contains("Enter sessions"));
        assert_eq!(key_hints(View::Detail, 40), "↑↓ PgUp PgDn Enter f Esc r q");
    }

    #[test]
    fn message_lines_show_tool_call_and_wrapped_content() {
        let message = Message {
            role: Role::Assistant,
            content: "Running the listing now\nsecond paragraph".to_string(),
            timestamp: None,
            kind: MessageKind::ToolUse,
            tool_name: Some("Bash".to_string()),
            tool_input: Some(r#"{"command":"ls -la"}"#.to_string()),
        };

        let lines = message_lines(&message, 12);
        assert_eq!(lines[0], kv_line("Role", "assistant"));
        assert_eq!(lines[2], kv_line("Kind", "tool use"));
        assert_eq!(lines[3], kv_line("Tool", "Bash"));
        assert_eq!(lines[4], "Tool input:");
        assert_eq!(lines[5], r#"{"command":""#);
        assert_eq!(lines[6], r#"ls -la"}"#);
        assert_eq!(lines[7], "");
        assert_eq!(&lines[8..], ["Running the", "listing now", "second", "paragraph"]);
    }
}
