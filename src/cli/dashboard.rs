//! Live queue dashboard: filter bar, scrollable job table, status line and
//! key help, refreshed on demand and on a timer.
//!
//! Uses `crossterm` for raw terminal manipulation (alternate screen, cursor
//! positioning, color output). The layout is a fixed stack of lines, so all
//! screen content is computed by [`frame_lines`] and only painted here.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event};
use crossterm::style::{Attribute, Color, SetAttribute, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::queue;

use crate::cli::input::{InputAction, InputMode, help_bindings, resolve_key_event};
use crate::cli::terminal_guard::TerminalGuard;
use crate::core::config::Config;
use crate::core::errors::Result;
use crate::queue::controller::{MutationOutcome, QueueController, status_message};
use crate::queue::filter::FilterSpec;
use crate::queue::job::{JobField, JobRecord, filterable_attributes};
use crate::queue::scheduler::{JobAction, Scheduler};

/// Lines reserved around the table: title, filter, header, status, footer.
const CHROME_LINES: usize = 5;

/// Event poll granularity; also bounds timer-refresh latency.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

// ──────────────────── dashboard options ────────────────────

/// How the dashboard behaves for this run.
#[derive(Debug, Clone)]
pub struct DashboardOptions {
    /// Automatic refresh period; `None` refreshes on demand only.
    pub refresh: Option<Duration>,
    /// Ask before hold/release/kill-all.
    pub confirm_bulk: bool,
    /// Attribute preselected in the filter bar.
    pub attribute: JobField,
    /// Shown in the title bar, usually the queue owner.
    pub user: String,
    pub color: bool,
}

impl DashboardOptions {
    #[must_use]
    pub fn from_config(config: &Config, user: &str) -> Self {
        let refresh_ms = config.dashboard.refresh_ms;
        Self {
            refresh: (refresh_ms > 0).then(|| Duration::from_millis(refresh_ms)),
            confirm_bulk: config.dashboard.confirm_bulk,
            attribute: config.default_filter_field().unwrap_or(JobField::Name),
            user: user.to_string(),
            color: true,
        }
    }
}

// ──────────────────── dashboard state ────────────────────

/// Whether the event loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Status {
    text: String,
    error: bool,
}

/// Everything the dashboard tracks besides the controller itself.
#[derive(Debug)]
pub struct DashboardState {
    mode: InputMode,
    attribute: JobField,
    pattern: String,
    draft: String,
    selected: usize,
    offset: usize,
    confirm_bulk: bool,
    refresh_requested: bool,
    last_refresh: Option<Instant>,
    refreshed_at: Option<String>,
    status: Option<Status>,
    dirty: bool,
}

impl DashboardState {
    #[must_use]
    pub fn new(options: &DashboardOptions) -> Self {
        Self {
            mode: InputMode::Normal,
            attribute: options.attribute,
            pattern: String::new(),
            draft: String::new(),
            selected: 0,
            offset: 0,
            confirm_bulk: options.confirm_bulk,
            refresh_requested: false,
            last_refresh: None,
            refreshed_at: None,
            status: None,
            dirty: true,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> InputMode {
        self.mode
    }

    #[must_use]
    pub const fn selected(&self) -> usize {
        self.selected
    }

    #[must_use]
    pub fn status_text(&self) -> Option<&str> {
        self.status.as_ref().map(|s| s.text.as_str())
    }

    /// Ask for a refresh at the end of the current loop turn. Repeated
    /// requests within one turn collapse into a single refresh.
    pub const fn request_refresh(&mut self) {
        self.refresh_requested = true;
    }

    /// Whether the timer period has elapsed since the last refresh attempt.
    #[must_use]
    pub fn refresh_due(&self, period: Option<Duration>) -> bool {
        match (period, self.last_refresh) {
            (_, None) => true,
            (Some(period), Some(at)) => at.elapsed() >= period,
            (None, Some(_)) => false,
        }
    }

    /// Filter built from the attribute and applied pattern.
    pub fn filter_spec(&self) -> Result<FilterSpec> {
        FilterSpec::new(Some(self.attribute), &self.pattern)
    }

    /// Run the pending refresh, if any. Returns whether one ran.
    pub fn refresh_if_requested<S: Scheduler>(
        &mut self,
        controller: &mut QueueController<S>,
    ) -> bool {
        if !std::mem::take(&mut self.refresh_requested) {
            return false;
        }
        self.last_refresh = Some(Instant::now());
        self.dirty = true;

        let outcome = self
            .filter_spec()
            .and_then(|spec| controller.refresh(spec));
        match outcome {
            Ok(_) => {
                self.refreshed_at = Some(chrono::Local::now().format("%H:%M:%S").to_string());
                if self.status.as_ref().is_some_and(|s| s.error) {
                    self.status = None;
                }
            }
            Err(error) => self.set_error(status_message(&error)),
        }
        self.clamp_selection(controller.snapshot().len());
        true
    }

    /// Apply one resolved key action. `page` is the number of visible table rows.
    pub fn handle<S: Scheduler>(
        &mut self,
        action: InputAction,
        controller: &mut QueueController<S>,
        page: usize,
    ) -> Flow {
        self.dirty = true;
        let len = controller.snapshot().len();
        let last = len.saturating_sub(1);
        match action {
            InputAction::Quit => return Flow::Quit,
            InputAction::ScrollUp => self.selected = self.selected.saturating_sub(1),
            InputAction::ScrollDown => self.selected = (self.selected + 1).min(last),
            InputAction::PageUp => self.selected = self.selected.saturating_sub(page.max(1)),
            InputAction::PageDown => self.selected = (self.selected + page.max(1)).min(last),
            InputAction::JumpTop => self.selected = 0,
            InputAction::JumpBottom => self.selected = last,
            InputAction::Act(job_action) => self.act_on_selected(job_action, controller),
            InputAction::ActAll(job_action) => {
                if self.confirm_bulk {
                    self.mode = InputMode::Confirm(job_action);
                    self.set_info(format!(
                        "{job_action} all {len} job(s) in view? [y/n]"
                    ));
                } else {
                    self.run_bulk(job_action, controller);
                }
            }
            InputAction::Confirm => {
                if let InputMode::Confirm(job_action) = self.mode {
                    self.mode = InputMode::Normal;
                    self.run_bulk(job_action, controller);
                }
            }
            InputAction::Cancel => {
                self.mode = InputMode::Normal;
                self.set_info("cancelled".to_string());
            }
            InputAction::Refresh => self.request_refresh(),
            InputAction::CycleAttribute => self.cycle_attribute(),
            InputAction::BeginPatternEdit => {
                self.mode = InputMode::EditPattern;
                self.draft = self.pattern.clone();
            }
            InputAction::PatternInput(c) => self.draft.push(c),
            InputAction::PatternBackspace => {
                self.draft.pop();
            }
            InputAction::PatternApply => self.apply_pattern(),
            InputAction::PatternCancel => {
                self.mode = InputMode::Normal;
                self.draft.clear();
            }
        }
        self.clamp_selection(len);
        Flow::Continue
    }

    fn act_on_selected<S: Scheduler>(
        &mut self,
        action: JobAction,
        controller: &mut QueueController<S>,
    ) {
        let Some(job) = controller.snapshot().get(self.selected).cloned() else {
            self.set_info("no job selected".to_string());
            return;
        };
        match controller.mutate(action, &job) {
            Ok(MutationOutcome::Issued) => {
                self.set_info(format!("{action} issued for job {}", job.job_id));
                self.request_refresh();
            }
            Ok(MutationOutcome::Skipped) => {
                self.set_info(format!("{} is not a job id; nothing to {action}", job.job_id));
            }
            Err(error) => self.set_error(status_message(&error)),
        }
    }

    fn run_bulk<S: Scheduler>(&mut self, action: JobAction, controller: &mut QueueController<S>) {
        let report = controller.apply_all(action);
        if report.is_success() {
            self.set_info(report.summary());
        } else {
            self.set_error(report.summary());
        }
        self.request_refresh();
    }

    fn cycle_attribute(&mut self) {
        let attributes = filterable_attributes();
        let next = attributes
            .iter()
            .position(|(_, field)| *field == self.attribute)
            .map_or(0, |i| (i + 1) % attributes.len());
        self.attribute = attributes[next].1;
        self.set_info(format!("filter attribute: {}", self.attribute.display_name()));
        if !self.pattern.is_empty() {
            self.request_refresh();
        }
    }

    fn apply_pattern(&mut self) {
        match FilterSpec::new(Some(self.attribute), &self.draft) {
            Ok(_) => {
                self.pattern = std::mem::take(&mut self.draft);
                self.mode = InputMode::Normal;
                self.selected = 0;
                self.request_refresh();
            }
            Err(error) => self.set_error(error.to_string()),
        }
    }

    fn clamp_selection(&mut self, len: usize) {
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    /// Scroll so the selection stays within a window of `page` rows.
    fn scroll_into_view(&mut self, page: usize) {
        let page = page.max(1);
        if self.selected < self.offset {
            self.offset = self.selected;
        } else if self.selected >= self.offset + page {
            self.offset = self.selected + 1 - page;
        }
    }

    fn set_info(&mut self, text: String) {
        self.status = Some(Status { text, error: false });
    }

    fn set_error(&mut self, text: String) {
        self.status = Some(Status { text, error: true });
    }
}

// ──────────────────── frame layout ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Title,
    Filter,
    Header,
    /// A job row; carries the row's scheduler state color.
    Job { selected: bool },
    Empty,
    Status { error: bool },
    Footer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub kind: LineKind,
    pub text: String,
    /// Job state for coloring job rows.
    pub state: Option<String>,
}

impl Line {
    fn new(kind: LineKind, text: String) -> Self {
        Self {
            kind,
            text,
            state: None,
        }
    }
}

/// Table rows visible in a terminal of `rows` lines.
#[must_use]
pub const fn visible_rows(rows: usize) -> usize {
    let page = rows.saturating_sub(CHROME_LINES);
    if page == 0 { 1 } else { page }
}

/// Compute every line of the screen, top to bottom.
#[must_use]
pub fn frame_lines(
    state: &DashboardState,
    options: &DashboardOptions,
    jobs: &[JobRecord],
    width: usize,
    rows: usize,
) -> Vec<Line> {
    let page = visible_rows(rows);
    let mut lines = Vec::with_capacity(page + CHROME_LINES);

    let left = format!(" squid · {}  [{} jobs]", options.user, jobs.len());
    let right = state
        .refreshed_at
        .as_deref()
        .map_or_else(|| "not refreshed ".to_string(), |at| format!("refreshed {at} "));
    let pad = width.saturating_sub(char_len(&left) + char_len(&right) + 4);
    lines.push(Line::new(
        LineKind::Title,
        fit(&format!("┌─{left}{:─<pad$}{right}─┐", ""), width),
    ));

    let pattern = match state.mode {
        InputMode::EditPattern => format!("{}▏", state.draft),
        _ if state.pattern.is_empty() => "(all jobs)".to_string(),
        _ => state.pattern.clone(),
    };
    lines.push(Line::new(
        LineKind::Filter,
        fit(
            &format!(
                "│ filter: {} =~ {pattern}",
                state.attribute.display_name()
            ),
            width,
        ),
    ));

    lines.push(Line::new(
        LineKind::Header,
        fit(&format!("  {}", JobRecord::header().display_row()), width),
    ));

    let end = (state.offset + page).min(jobs.len());
    let window = jobs.get(state.offset..end).unwrap_or(&[]);
    for (i, job) in window.iter().enumerate() {
        let selected = state.offset + i == state.selected;
        let marker = if selected { "▶ " } else { "  " };
        lines.push(Line {
            kind: LineKind::Job { selected },
            text: fit(&format!("{marker}{}", job.display_row()), width),
            state: Some(job.state.clone()),
        });
    }
    if jobs.is_empty() {
        lines.push(Line::new(LineKind::Empty, fit("  (no jobs)", width)));
    }
    while lines.len() < page + 3 {
        lines.push(Line::new(LineKind::Empty, String::new()));
    }

    let (status, error) = state
        .status
        .as_ref()
        .map_or(("", false), |s| (s.text.as_str(), s.error));
    lines.push(Line::new(
        LineKind::Status { error },
        fit(&format!(" {status}"), width),
    ));

    let help = help_bindings(state.mode)
        .iter()
        .map(|(keys, what)| format!("{keys} {what}"))
        .collect::<Vec<_>>()
        .join("  ");
    let footer = format!(" {help} ");
    let pad = width.saturating_sub(char_len(&footer) + 4);
    lines.push(Line::new(
        LineKind::Footer,
        fit(&format!("└─{footer}{:─<pad$}─┘", ""), width),
    ));
    lines
}

/// Row color for a scheduler state.
fn state_color(state: &str) -> Color {
    match state {
        "RUNNING" | "R" | "COMPLETING" | "CG" => Color::Green,
        "PENDING" | "PD" | "CONFIGURING" | "CF" => Color::Yellow,
        s if s.contains("HOLD") || s == "SUSPENDED" || s == "S" => Color::DarkYellow,
        "FAILED" | "F" | "TIMEOUT" | "TO" | "NODE_FAIL" | "NF" | "OUT_OF_MEMORY" | "OOM" => {
            Color::Red
        }
        _ => Color::White,
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Truncate `s` to `width` characters.
fn fit(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

// ──────────────────── main dashboard loop ────────────────────

/// Run the dashboard until the user exits (q/Esc/Ctrl-C).
///
/// Core errors never end the loop; they are shown in the status line.
pub fn run<S: Scheduler>(
    controller: &mut QueueController<S>,
    options: &DashboardOptions,
) -> io::Result<()> {
    let _guard = TerminalGuard::new()?;
    let mut stdout = io::stdout();
    run_inner(&mut stdout, controller, options)
}

fn run_inner<S: Scheduler>(
    stdout: &mut io::Stdout,
    controller: &mut QueueController<S>,
    options: &DashboardOptions,
) -> io::Result<()> {
    let mut state = DashboardState::new(options);
    let mut size = TerminalGuard::terminal_size();

    loop {
        if state.refresh_due(options.refresh) {
            state.request_refresh();
        }
        state.refresh_if_requested(controller);

        let page = visible_rows(usize::from(size.1));
        if std::mem::take(&mut state.dirty) {
            state.scroll_into_view(page);
            let lines = frame_lines(
                &state,
                options,
                controller.snapshot(),
                usize::from(size.0),
                usize::from(size.1),
            );
            render_frame(stdout, &lines, options.color)?;
        }

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        // Drain everything queued so a burst of keys costs one refresh.
        loop {
            match event::read()? {
                Event::Key(key) => {
                    if let Some(action) = resolve_key_event(&key, state.mode)
                        && state.handle(action, controller, page) == Flow::Quit
                    {
                        return Ok(());
                    }
                }
                Event::Resize(cols, rows) => {
                    size = (cols.max(1), rows.max(1));
                    state.dirty = true;
                }
                _ => {}
            }
            if !event::poll(Duration::ZERO)? {
                break;
            }
        }
    }
}

// ──────────────────── frame rendering ────────────────────

fn render_frame(stdout: &mut io::Stdout, lines: &[Line], color: bool) -> io::Result<()> {
    queue!(stdout, MoveTo(0, 0), Clear(ClearType::All))?;

    for (row, line) in lines.iter().enumerate() {
        let row = u16::try_from(row).unwrap_or(u16::MAX);
        queue!(stdout, MoveTo(0, row))?;
        if color {
            match line.kind {
                LineKind::Title | LineKind::Footer => {
                    queue!(stdout, SetForegroundColor(Color::Cyan))?;
                }
                LineKind::Filter => queue!(stdout, SetForegroundColor(Color::White))?,
                LineKind::Header => queue!(
                    stdout,
                    SetForegroundColor(Color::White),
                    SetAttribute(Attribute::Bold)
                )?,
                LineKind::Job { .. } => {
                    let state = line.state.as_deref().unwrap_or_default();
                    queue!(stdout, SetForegroundColor(state_color(state)))?;
                }
                LineKind::Status { error: true } => {
                    queue!(stdout, SetForegroundColor(Color::Red))?;
                }
                LineKind::Status { error: false } => {
                    queue!(stdout, SetForegroundColor(Color::Green))?;
                }
                LineKind::Empty => {}
            }
        }
        if line.kind == (LineKind::Job { selected: true }) {
            queue!(stdout, SetAttribute(Attribute::Reverse))?;
        }
        write!(stdout, "{}", line.text)?;
        queue!(stdout, SetAttribute(Attribute::Reset))?;
    }

    stdout.flush()
}

// ──────────────────── tests ────────────────────
