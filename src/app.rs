use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use serde::Serialize;
use tracing::debug;

use crate::config::{self, RuntimeSettings, WatchConfig};
use crate::discovery::{self, ProjectDir, SessionInfo};
use crate::process::{ProcessRecord, ProcessScanner, ProcessSort, sort_processes};
use crate::session::{Message, MessageFilter, SessionStats, parse_session_file};
use crate::tasks::{LoadKind, Loader, Payload};
use crate::ui::{self, RenderData, View};
use crate::util::{format_memory_mb, human_duration, single_line, truncate};

const COMMAND_COLUMN_CHARS: usize = 50;
const TITLE_COLUMN_CHARS: usize = 80;
const FORCED_REDRAW_EVERY: Duration = Duration::from_secs(30);

pub fn print_processes(
    config: &WatchConfig,
    runtime: &RuntimeSettings,
    sort: ProcessSort,
    json: bool,
) -> Result<()> {
    let mut scanner = ProcessScanner::system(config.process.clone());
    // The first pass only primes CPU counters.
    scanner
        .discover(runtime.show_helpers)
        .context("process scan failed")?;
    thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    let mut records = scanner
        .discover(runtime.show_helpers)
        .context("process scan failed")?;
    sort_processes(&mut records, sort, matches!(sort, ProcessSort::Pid));

    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No Claude processes found");
        return Ok(());
    }
    print!("{}", process_table(&records));
    Ok(())
}

pub fn print_sessions(dir: &Path, json: bool) -> Result<()> {
    let dir = std::path::absolute(dir)
        .with_context(|| format!("cannot resolve directory {}", dir.display()))?;
    let sessions = discovery::find_sessions_for_directory(&config::projects_path(), &dir)?;

    if json {
        return print_json(&sessions);
    }
    if sessions.is_empty() {
        println!("No sessions found for {}", dir.display());
        return Ok(());
    }
    print!("{}", sessions_table(&sessions));
    Ok(())
}

pub fn print_inspect(file: &Path, json: bool, preview_chars: usize) -> Result<()> {
    let stats = parse_session_file(file)?;

    if json {
        return print_json(&stats);
    }
    println!("{}", stats.summary());
    println!();
    print!("{}", stats.render_detail(preview_chars));
    Ok(())
}

pub fn print_projects(json: bool) -> Result<()> {
    let projects = discovery::list_projects(&config::projects_path())?;

    if json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects found");
        return Ok(());
    }
    print!("{}", projects_table(&projects));
    Ok(())
}

pub fn run_dashboard(config: WatchConfig, runtime: RuntimeSettings) -> Result<()> {
    let stop = install_stop_signal()?;
    if !io::stdout().is_terminal() {
        return run_headless(&config, &runtime, &stop);
    }

    let loader = Loader::spawn(
        ProcessScanner::system(config.process.clone()),
        config::projects_path(),
    );
    let mut dashboard = Dashboard::new(loader, &runtime, config.display.message_preview_chars);
    let (width, height) = terminal::size()?;
    dashboard.set_viewport(width, height);

    let mut last_tick = Instant::now() - runtime.refresh_interval;
    let mut last_render_at = Instant::now();
    let mut dirty = true;

    ui::enter_terminal()?;

    let mut run = || -> Result<()> {
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }

            if last_tick.elapsed() >= runtime.refresh_interval {
                dashboard.tick();
                last_tick = Instant::now();
            }

            while let Some(payload) = dashboard.loader.try_next() {
                dashboard.apply(payload);
                dirty = true;
            }

            if dirty || last_render_at.elapsed() >= FORCED_REDRAW_EVERY {
                ui::draw(&dashboard.render_data(runtime.refresh_interval.as_secs()))?;
                last_render_at = Instant::now();
                dirty = false;
            }

            if event::poll(Duration::from_millis(100))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if dashboard.handle_key(key) == Flow::Quit {
                            break;
                        }
                        dirty = true;
                    }
                    Event::Resize(width, height) => {
                        dashboard.set_viewport(width, height);
                        dirty = true;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    };

    let run_result = run();
    let _ = ui::leave_terminal();
    run_result
}

fn run_headless(
    config: &WatchConfig,
    runtime: &RuntimeSettings,
    stop: &Arc<AtomicBool>,
) -> Result<()> {
    let mut scanner = ProcessScanner::system(config.process.clone());
    println!("No interactive terminal detected; printing the process table periodically.");
    println!("Press Ctrl+C to stop.");

    while !stop.load(Ordering::Relaxed) {
        let records = scanner
            .discover(runtime.show_helpers)
            .context("process scan failed")?;
        println!("--- {} ---", crate::util::now_local());
        if records.is_empty() {
            println!("No Claude processes found");
        } else {
            print!("{}", process_table(&records));
        }
        thread::sleep(runtime.refresh_interval);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Dashboard state. Key handling and result application are kept free of
/// terminal I/O.
pub struct Dashboard {
    loader: Loader,
    view: View,
    show_helpers: bool,
    sort: ProcessSort,
    ascending: bool,
    processes: Vec<ProcessRecord>,
    process_cursor: usize,
    sessions_origin: View,
    sessions_dir: Option<PathBuf>,
    sessions: Vec<SessionInfo>,
    session_cursor: usize,
    detail: Option<SessionStats>,
    detail_path: Option<PathBuf>,
    detail_scroll: usize,
    message_filter: MessageFilter,
    message_index: usize,
    message_scroll: usize,
    projects: Vec<ProjectDir>,
    project_cursor: usize,
    preview_chars: usize,
    page_rows: usize,
    page_width: usize,
    status: Option<String>,
}

impl Dashboard {
    pub fn new(loader: Loader, runtime: &RuntimeSettings, preview_chars: usize) -> Self {
        Self {
            loader,
            view: View::Processes,
            show_helpers: runtime.show_helpers,
            sort: ProcessSort::Pid,
            ascending: true,
            processes: Vec::new(),
            process_cursor: 0,
            sessions_origin: View::Processes,
            sessions_dir: None,
            sessions: Vec::new(),
            session_cursor: 0,
            detail: None,
            detail_path: None,
            detail_scroll: 0,
            message_filter: MessageFilter::All,
            message_index: 0,
            message_scroll: 0,
            projects: Vec::new(),
            project_cursor: 0,
            preview_chars,
            page_rows: 10,
            page_width: 80,
            status: None,
        }
    }

    pub fn set_viewport(&mut self, width: u16, height: u16) {
        self.page_rows = ui::list_rows(height).max(1);
        self.page_width = usize::from(width).max(1);
    }

    /// Periodic process rescan; skipped while the previous one is in flight.
    pub fn tick(&mut self) {
        if !self.loader.is_pending(LoadKind::Processes) {
            self.loader.request_scan(self.show_helpers);
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.code == KeyCode::Char('q')
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        {
            return Flow::Quit;
        }

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.move_by(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_by(1),
            KeyCode::PageUp => self.move_by(-page_step(self.page_rows)),
            KeyCode::PageDown => self.move_by(page_step(self.page_rows)),
            KeyCode::Enter => self.open_selected(),
            KeyCode::Esc | KeyCode::Backspace => self.go_back(),
            KeyCode::Char('r') => self.refresh_current(),
            KeyCode::Char('h') => {
                self.show_helpers = !self.show_helpers;
                self.loader.request_scan(self.show_helpers);
            }
            KeyCode::Char('s') if self.view == View::Processes => {
                self.sort = self.sort.next();
                self.resort();
            }
            KeyCode::Char('o') if self.view == View::Processes => {
                self.ascending = !self.ascending;
                self.resort();
            }
            KeyCode::Char('p') => {
                self.view = View::Projects;
                self.status = None;
                self.loader.request_projects();
            }
            KeyCode::Char('f') if self.view == View::Detail => {
                self.message_filter = self.message_filter.next();
                self.detail_scroll = 0;
            }
            _ => {}
        }
        Flow::Continue
    }

    pub fn apply(&mut self, payload: Payload) {
        match payload {
            Payload::Processes(Ok(records)) => {
                let selected_pid = self.selected_pid();
                self.processes = records;
                sort_processes(&mut self.processes, self.sort, self.ascending);
                self.reselect(selected_pid);
                if self.view == View::Processes {
                    self.status = None;
                }
            }
            Payload::Processes(Err(err)) => {
                debug!(error = %err, "dashboard scan failed");
                self.status = Some(format!("Process scan failed: {err}"));
            }
            Payload::Sessions { dir, result } => {
                if self.sessions_dir.as_deref() != Some(dir.as_path()) {
                    return;
                }
                match result {
                    Ok(sessions) => {
                        self.sessions = sessions;
                        self.session_cursor = clamp_cursor(self.session_cursor, self.sessions.len());
                    }
                    Err(err) => self.status = Some(err.to_string()),
                }
            }
            Payload::Detail(Ok(stats)) => {
                self.detail = Some(stats);
                self.clamp_detail_scroll();
            }
            Payload::Detail(Err(err)) => self.status = Some(err.to_string()),
            Payload::Projects(Ok(projects)) => {
                self.projects = projects;
                self.project_cursor = clamp_cursor(self.project_cursor, self.projects.len());
            }
            Payload::Projects(Err(err)) => self.status = Some(err.to_string()),
        }
    }

    pub fn render_data(&self, refresh_secs: u64) -> RenderData<'_> {
        let loading = match self.view {
            View::Processes => self.loader.is_pending(LoadKind::Processes),
            View::Sessions => self.loader.is_pending(LoadKind::Sessions),
            View::Detail => self.loader.is_pending(LoadKind::Detail),
            View::Message => false,
            View::Projects => self.loader.is_pending(LoadKind::Projects),
        };
        RenderData {
            view: self.view,
            refresh_secs,
            show_helpers: self.show_helpers,
            sort: self.sort,
            ascending: self.ascending,
            processes: &self.processes,
            process_cursor: self.process_cursor,
            sessions_dir: self.sessions_dir.as_deref(),
            sessions: &self.sessions,
            session_cursor: self.session_cursor,
            detail: self.detail.as_ref(),
            message_filter: self.message_filter,
            detail_scroll: self.detail_scroll,
            preview_chars: self.preview_chars,
            message: self.selected_message(),
            message_scroll: self.message_scroll,
            projects: &self.projects,
            project_cursor: self.project_cursor,
            loading,
            status: self.status.as_deref(),
        }
    }

    fn move_by(&mut self, delta: isize) {
        match self.view {
            View::Processes => {
                self.process_cursor = step(self.process_cursor, delta, self.processes.len());
            }
            View::Sessions => {
                self.session_cursor = step(self.session_cursor, delta, self.sessions.len());
            }
            View::Projects => {
                self.project_cursor = step(self.project_cursor, delta, self.projects.len());
            }
            View::Detail => {
                self.detail_scroll = step(self.detail_scroll, delta, self.filtered_len());
            }
            View::Message => {
                let lines = self
                    .selected_message()
                    .map(|message| ui::message_lines(message, self.page_width).len())
                    .unwrap_or(0);
                self.message_scroll = step(self.message_scroll, delta, lines);
            }
        }
    }

    fn open_selected(&mut self) {
        match self.view {
            View::Processes => {
                let Some((pid, dir)) = self
                    .processes
                    .get(self.process_cursor)
                    .map(|record| (record.pid, record.working_dir.path().cloned()))
                else {
                    return;
                };
                match dir {
                    Some(dir) => self.open_sessions(dir, View::Processes),
                    None => {
                        self.status = Some(format!("Working directory of pid {pid} is not readable"));
                    }
                }
            }
            View::Projects => {
                let Some((name, dir)) = self
                    .projects
                    .get(self.project_cursor)
                    .map(|project| (project.name.clone(), project.original_path.clone()))
                else {
                    return;
                };
                match dir {
                    Some(dir) => self.open_sessions(dir, View::Projects),
                    None => {
                        self.status = Some(format!(
                            "{name} has no recorded original path; try `claudewatch sessions <DIR>`"
                        ));
                    }
                }
            }
            View::Sessions => {
                let Some(path) = self.sessions.get(self.session_cursor).map(|s| s.path.clone())
                else {
                    return;
                };
                self.view = View::Detail;
                self.status = None;
                self.detail = None;
                self.detail_scroll = 0;
                self.message_filter = MessageFilter::All;
                self.detail_path = Some(path.clone());
                self.loader.request_detail(path);
            }
            View::Detail => {
                if self.detail_scroll < self.filtered_len() {
                    self.view = View::Message;
                    self.status = None;
                    self.message_index = self.detail_scroll;
                    self.message_scroll = 0;
                }
            }
            View::Message => {}
        }
    }

    fn open_sessions(&mut self, dir: PathBuf, origin: View) {
        self.view = View::Sessions;
        self.sessions_origin = origin;
        self.status = None;
        self.sessions.clear();
        self.session_cursor = 0;
        self.sessions_dir = Some(dir.clone());
        self.loader.request_sessions(dir);
    }

    fn go_back(&mut self) {
        self.status = None;
        match self.view {
            View::Message => self.view = View::Detail,
            View::Detail => {
                self.loader.cancel(LoadKind::Detail);
                self.view = View::Sessions;
            }
            View::Sessions => {
                self.loader.cancel(LoadKind::Sessions);
                self.view = self.sessions_origin;
            }
            View::Projects => {
                self.loader.cancel(LoadKind::Projects);
                self.view = View::Processes;
            }
            View::Processes => {}
        }
    }

    fn refresh_current(&mut self) {
        self.status = None;
        match self.view {
            View::Processes => self.loader.request_scan(self.show_helpers),
            View::Sessions => {
                if let Some(dir) = self.sessions_dir.clone() {
                    self.loader.request_sessions(dir);
                }
            }
            View::Detail => {
                if let Some(path) = self.detail_path.clone() {
                    self.loader.request_detail(path);
                }
            }
            View::Message => {}
            View::Projects => self.loader.request_projects(),
        }
    }

    fn resort(&mut self) {
        let selected_pid = self.selected_pid();
        sort_processes(&mut self.processes, self.sort, self.ascending);
        self.reselect(selected_pid);
    }

    fn selected_pid(&self) -> Option<u32> {
        self.processes.get(self.process_cursor).map(|record| record.pid)
    }

    fn reselect(&mut self, pid: Option<u32>) {
        if let Some(pid) = pid
            && let Some(idx) = self.processes.iter().position(|record| record.pid == pid)
        {
            self.process_cursor = idx;
        }
        self.process_cursor = clamp_cursor(self.process_cursor, self.processes.len());
    }

    fn selected_message(&self) -> Option<&Message> {
        self.detail
            .as_ref()?
            .filtered_messages(self.message_filter)
            .nth(self.message_index)
    }

    fn filtered_len(&self) -> usize {
        self.detail
            .as_ref()
            .map(|stats| stats.filtered_messages(self.message_filter).count())
            .unwrap_or(0)
    }

    fn clamp_detail_scroll(&mut self) {
        self.detail_scroll = clamp_cursor(self.detail_scroll, self.filtered_len());
    }
}

fn page_step(rows: usize) -> isize {
    isize::try_from(rows.max(1)).unwrap_or(isize::MAX)
}

fn step(cursor: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    cursor.saturating_add_signed(delta).min(len - 1)
}

fn clamp_cursor(cursor: usize, len: usize) -> usize {
    cursor.min(len.saturating_sub(1))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value).context("failed to encode JSON output")?;
    println!("{data}");
    Ok(())
}

fn process_table(records: &[ProcessRecord]) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            vec![
                record.pid.to_string(),
                format!("{:.1}%", record.cpu_percent),
                format_memory_mb(record.memory_mb),
                human_duration(record.uptime),
                record.working_dir.to_string(),
                truncate(&record.command, COMMAND_COLUMN_CHARS),
            ]
        })
        .collect();
    format_table(&["PID", "CPU%", "MEM", "UPTIME", "WORKDIR", "COMMAND"], &rows)
}

fn sessions_table(sessions: &[SessionInfo]) -> String {
    let rows: Vec<Vec<String>> = sessions
        .iter()
        .map(|info| {
            vec![
                info.id.clone(),
                info.updated_label(),
                truncate(&single_line(&info.title), TITLE_COLUMN_CHARS),
            ]
        })
        .collect();
    format_table(&["SESSION ID", "UPDATED", "TITLE"], &rows)
}

fn projects_table(projects: &[ProjectDir]) -> String {
    let rows: Vec<Vec<String>> = projects
        .iter()
        .map(|project| {
            vec![
                project.sessions.to_string(),
                crate::util::format_local_time(Some(project.modified), "%Y-%m-%d %H:%M"),
                project.display_name.clone(),
            ]
        })
        .collect();
    format_table(&["SESSIONS", "UPDATED", "PROJECT"], &rows)
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header. The last column is never padded.
fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(idx) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = table_row(headers, &widths);
    let rules: Vec<String> = headers.iter().map(|h| "-".repeat(h.chars().count())).collect();
    out.push_str(&table_row(rules.as_slice(), &widths));
    for row in rows {
        out.push_str(&table_row(row.as_slice(), &widths));
    }
    out
}

fn table_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let cells: Vec<String> = cells
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let cell = cell.as_ref();
            match widths.get(idx) {
                Some(width) if idx + 1 < widths.len() => format!("{cell:<width$}"),
                _ => cell.to_string(),
            }
        })
        .collect();
    let mut line = cells.join("  ").trim_end().to_string();
    line.push('\n');
    line
}

fn install_stop_signal() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })
    .context("failed to install Ctrl+C handler")?;
    Ok(stop)
}
