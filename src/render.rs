//! Live fleet table.
//!
//! The renderer is the only writer of the table. It owns one row per repository in
//! scanner order and folds [`FleetEvent`]s into those rows as they arrive, in any order.
//! On a terminal every update rewrites the whole table in place; otherwise only the
//! final table is printed.
use std::io::{self, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::color::{hyperlink, paint, BLUE_BOLD, GRAY, GREEN, RED, YELLOW};
use crate::operation::{OperationResult, Payload, Phase, RemoteStatus, SyncState};
use crate::repo::Repository;
use crate::scheduler::{FleetEvent, FleetPlan, RepoOutcome, RunSummary, SkipReason, TaskState};
use crate::util::{center, display_width, fit};

const TICK: Duration = Duration::from_millis(100);
const NAME_MAX: usize = 40;
const DETAIL_MIN: usize = 12;

/// Spinner frames for pending cells
fn pending_spinner_frames(ascii: bool) -> &'static [&'static str] {
    if ascii {
        &["-", "\\", "|", "/"]
    } else {
        &["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"]
    }
}

/// Terminal width: COLUMNS when sane, else 100.
pub fn terminal_width_or_default() -> usize {
    if let Ok(cols) = std::env::var("COLUMNS") {
        if let Ok(n) = cols.trim().parse::<usize>() {
            if n >= 40 {
                return n.min(400);
            }
        }
    }
    100
}

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub color: bool,
    /// Redraw in place while the run is in progress (stdout is a terminal).
    pub live: bool,
    pub ascii: bool,
    pub width: usize,
}

impl RenderOptions {
    pub fn plain() -> Self {
        Self {
            color: false,
            live: false,
            ascii: true,
            width: 100,
        }
    }
}

struct Row {
    name: String,
    outcome: RepoOutcome,
}

#[derive(Default)]
struct Cell {
    text: String,
    color: Option<&'static str>,
    link: Option<String>,
    centered: bool,
}

impl Cell {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    fn colored(text: impl Into<String>, color: &'static str) -> Self {
        Self {
            text: text.into(),
            color: Some(color),
            ..Self::default()
        }
    }

    fn linked(mut self, url: Option<&str>) -> Self {
        self.link = url.filter(|u| !u.is_empty()).map(str::to_string);
        self
    }

    fn centered(mut self) -> Self {
        self.centered = true;
        self
    }
}

pub struct ProgressRenderer<W: Write> {
    out: W,
    opts: RenderOptions,
    status_view: bool,
    rows: Vec<Row>,
    frame: usize,
    drawn_lines: usize,
}

impl<W: Write> ProgressRenderer<W> {
    pub fn new(out: W, repos: &[Repository], plan: &FleetPlan, opts: RenderOptions) -> Self {
        let rows = repos
            .iter()
            .map(|r| Row {
                name: r.display_name.clone(),
                outcome: RepoOutcome {
                    local: TaskState::Pending,
                    second: if plan.second.is_some() {
                        TaskState::Pending
                    } else {
                        TaskState::NotPlanned
                    },
                },
            })
            .collect();
        Self {
            out,
            opts,
            status_view: plan.is_status(),
            rows,
            frame: 0,
            drawn_lines: 0,
        }
    }

    pub fn apply(&mut self, event: FleetEvent) {
        let (index, phase, state) = match event {
            FleetEvent::Completed {
                index,
                phase,
                result,
                cached,
            } => (index, phase, TaskState::Done { result, cached }),
            FleetEvent::Skipped {
                index,
                phase,
                reason,
            } => (index, phase, TaskState::Skipped(reason)),
        };
        let Some(row) = self.rows.get_mut(index) else {
            tracing::debug!(index, "event for unknown row");
            return;
        };
        match phase {
            Phase::Local => row.outcome.local = state,
            Phase::Network => row.outcome.second = state,
        }
    }

    /// Actor loop: consume events until every sender is gone, then hand the renderer back
    /// for [`finish`](Self::finish).
    pub fn run(mut self, events: Receiver<FleetEvent>) -> Self {
        if !self.opts.live {
            for ev in events.iter() {
                self.apply(ev);
            }
            return self;
        }
        self.redraw();
        loop {
            match events.recv_timeout(TICK) {
                Ok(ev) => {
                    self.apply(ev);
                    while let Ok(more) = events.try_recv() {
                        self.apply(more);
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.frame = self.frame.wrapping_add(1),
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.redraw();
        }
        self
    }

    fn redraw(&mut self) {
        if let Err(e) = self.draw(true) {
            tracing::debug!(error = %e, "redraw failed");
        }
    }

    /// Final redraw without spinners, then the summary line.
    pub fn finish(mut self, summary: &RunSummary, elapsed: Duration) -> io::Result<W> {
        self.draw(false)?;
        let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
        let line = format!("{summary} in {}", humantime::format_duration(elapsed));
        let code = if summary.failed > 0 {
            RED
        } else if summary.skipped > 0 {
            YELLOW
        } else {
            GREEN
        };
        writeln!(self.out)?;
        writeln!(self.out, "{}", paint(self.opts.color, code, &line))?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn draw(&mut self, spinning: bool) -> io::Result<()> {
        let spinner = if spinning {
            let frames = pending_spinner_frames(self.opts.ascii);
            frames[self.frame % frames.len()]
        } else {
            "·"
        };
        let lines = self.layout(spinner);

        let mut buf = String::new();
        if self.drawn_lines > 0 {
            buf.push_str(&format!("\x1b[{}A", self.drawn_lines));
        }
        for l in &lines {
            if self.opts.live {
                buf.push_str("\r\x1b[2K");
            }
            buf.push_str(l);
            buf.push('\n');
        }
        self.out.write_all(buf.as_bytes())?;
        self.out.flush()?;
        if self.opts.live {
            self.drawn_lines = lines.len();
        }
        Ok(())
    }

    fn headers(&self) -> Vec<&'static str> {
        if self.status_view {
            vec!["Repository", "Unstaged", "Branch", "PR", "Sync"]
        } else {
            vec!["Repository", "Branch", "Result"]
        }
    }

    fn layout(&self, spinner: &str) -> Vec<String> {
        let mut headers = self.headers();
        let mut grid: Vec<Vec<Cell>> = self
            .rows
            .iter()
            .map(|r| {
                if self.status_view {
                    status_cells(r, spinner)
                } else {
                    write_cells(r, spinner)
                }
            })
            .collect();

        let details: Vec<Option<String>> = self.rows.iter().map(|r| failure_detail(&r.outcome)).collect();
        let with_detail = details.iter().any(Option::is_some);
        if with_detail {
            headers.push("Detail");
            for (cells, d) in grid.iter_mut().zip(details) {
                cells.push(Cell::colored(d.unwrap_or_default(), GRAY));
            }
        }

        let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
        for cells in &grid {
            for (w, c) in widths.iter_mut().zip(cells) {
                *w = (*w).max(display_width(&c.text));
            }
        }
        widths[0] = widths[0].min(NAME_MAX);
        if with_detail {
            // Shrink the detail column so a row never wraps; wrapped rows break in-place redraw.
            let fixed: usize = widths[..widths.len() - 1].iter().map(|w| w + 2).sum();
            let last = widths.len() - 1;
            widths[last] = widths[last].min(self.opts.width.saturating_sub(fixed).max(DETAIL_MIN));
        }

        let color = self.opts.color;
        let mut lines = Vec::with_capacity(grid.len() + 1);
        let header: Vec<String> = headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| paint(color, BLUE_BOLD, &fit(h, *w)))
            .collect();
        lines.push(header.join("  ").trim_end().to_string());
        for cells in &grid {
            let parts: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| render_cell(c, *w, color))
                .collect();
            lines.push(parts.join("  ").trim_end().to_string());
        }
        lines
    }
}

/// Pad/truncate on plain text first so escape codes never count toward the width.
fn render_cell(c: &Cell, width: usize, color: bool) -> String {
    let text = if display_width(&c.text) > width {
        fit(&c.text, width)
    } else {
        c.text.clone()
    };
    let (left, right) = if c.centered {
        let padded = center(&text, width);
        let left = padded.len() - padded.trim_start().len();
        (left, width.saturating_sub(display_width(&text) + left))
    } else {
        (0, width.saturating_sub(display_width(&text)))
    };
    let mut shown = match &c.link {
        Some(url) => hyperlink(color, url, &text),
        None => text,
    };
    if let Some(code) = c.color {
        shown = paint(color, code, &shown);
    }
    format!("{}{}{}", " ".repeat(left), shown, " ".repeat(right))
}

fn spinner_cell(spinner: &str) -> Cell {
    Cell::colored(spinner, GRAY)
}

fn remote_of(o: &RepoOutcome) -> Option<&RemoteStatus> {
    match o.second.result() {
        Some(OperationResult::Success(Payload::Sync(r))) => Some(r),
        _ => None,
    }
}

fn status_cells(row: &Row, spinner: &str) -> Vec<Cell> {
    let o = &row.outcome;
    let remote = remote_of(o);
    let name = Cell::plain(&row.name).linked(remote.and_then(|r| r.web_url.as_deref()));

    let (unstaged, branch) = match &o.local {
        TaskState::Pending => (spinner_cell(spinner), spinner_cell(spinner)),
        TaskState::Done {
            result: OperationResult::Success(Payload::Status(s)),
            ..
        } => {
            let count = if s.unstaged > 0 {
                Cell::colored(s.unstaged.to_string(), YELLOW)
            } else {
                Cell::colored("0", GREEN)
            };
            let branch = if s.detached {
                Cell::colored(&s.branch, GRAY)
            } else {
                Cell::plain(&s.branch)
            };
            (count.centered(), branch)
        }
        TaskState::Done {
            result: OperationResult::Failure(f),
            ..
        } => (Cell::plain(""), Cell::colored(f.kind.as_str(), RED)),
        TaskState::Done { .. } => (Cell::plain(""), Cell::plain("")),
        TaskState::Skipped(_) | TaskState::NotPlanned => {
            (Cell::plain(""), Cell::colored("skipped", GRAY))
        }
    };

    let (pr, sync) = match &o.second {
        TaskState::Pending => (spinner_cell(spinner), spinner_cell(spinner).centered()),
        TaskState::NotPlanned | TaskState::Skipped(SkipReason::LocalFailed) => {
            (Cell::plain(""), Cell::plain(""))
        }
        TaskState::Skipped(SkipReason::Interrupted) => {
            (Cell::plain(""), Cell::colored("skipped", GRAY))
        }
        TaskState::Done {
            result: OperationResult::Failure(f),
            ..
        } => (Cell::plain(""), Cell::colored(f.kind.as_str(), RED)),
        TaskState::Done { .. } => match remote {
            Some(r) => {
                let pr = match &r.pull_request {
                    Some(p) => Cell::colored(format!("#{}", p.number), BLUE_BOLD).linked(Some(p.url.as_str())),
                    None => Cell::plain(""),
                };
                (pr, sync_cell(r).centered())
            }
            None => (Cell::plain(""), Cell::plain("")),
        },
    };

    vec![name, unstaged, branch, pr, sync]
}

fn sync_cell(r: &RemoteStatus) -> Cell {
    match r.state {
        SyncState::Synced => Cell::colored("✓", GREEN),
        SyncState::Ahead => Cell::colored(format!("↑{}", r.ahead), YELLOW),
        SyncState::Behind => Cell::colored(format!("↓{}", r.behind), RED),
        SyncState::Diverged => Cell::colored(format!("↕ ↑{} ↓{}", r.ahead, r.behind), RED),
        SyncState::Unknown => Cell::colored("?", GRAY),
    }
}

fn write_cells(row: &Row, spinner: &str) -> Vec<Cell> {
    let o = &row.outcome;
    let name = Cell::plain(&row.name);
    let local_branch = o
        .local
        .result()
        .and_then(OperationResult::local_status)
        .map(|s| s.branch.clone());

    let (branch, result) = match (&o.local, &o.second) {
        (TaskState::Pending, _) => (spinner_cell(spinner), spinner_cell(spinner)),
        (
            TaskState::Done {
                result: OperationResult::Failure(f),
                ..
            },
            _,
        ) => (Cell::plain(""), Cell::colored(f.kind.as_str(), RED)),
        (_, TaskState::Pending) => (
            Cell::plain(local_branch.unwrap_or_default()),
            spinner_cell(spinner),
        ),
        (_, TaskState::Done { result, .. }) => match result {
            OperationResult::Success(Payload::Checkout(c)) => {
                (Cell::plain(&c.branch), Cell::colored(&c.message, GREEN))
            }
            OperationResult::Success(Payload::Pull(p)) => (
                Cell::plain(local_branch.unwrap_or_default()),
                Cell::colored(&p.message, GREEN),
            ),
            OperationResult::Success(_) => (
                Cell::plain(local_branch.unwrap_or_default()),
                Cell::colored("ok", GREEN),
            ),
            OperationResult::Failure(f) => (
                Cell::plain(local_branch.unwrap_or_default()),
                Cell::colored(f.kind.as_str(), RED),
            ),
        },
        (_, TaskState::Skipped(_)) | (_, TaskState::NotPlanned) => (
            Cell::plain(local_branch.unwrap_or_default()),
            Cell::colored("skipped", GRAY),
        ),
    };
    vec![name, branch, result]
}

fn failure_detail(o: &RepoOutcome) -> Option<String> {
    match o.final_result() {
        Some(OperationResult::Failure(f)) if !f.detail.is_empty() => Some(f.detail.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FailureKind, OperationFailure};
    use crate::operation::{LocalStatus, PullRequest};
    use std::path::PathBuf;

    fn repos(names: &[&str]) -> Vec<Repository> {
        names
            .iter()
            .map(|n| Repository::new(PathBuf::from(format!("/ws/{n}")), n.to_string(), n.to_string()))
            .collect()
    }

    fn status(branch: &str, unstaged: u32) -> OperationResult {
        OperationResult::Success(Payload::Status(LocalStatus {
            branch: branch.to_string(),
            detached: false,
            unstaged,
            changed: unstaged,
        }))
    }

    fn done(index: usize, phase: Phase, result: OperationResult) -> FleetEvent {
        FleetEvent::Completed {
            index,
            phase,
            result,
            cached: false,
        }
    }

    fn render(r: ProgressRenderer<Vec<u8>>) -> String {
        let summary = RunSummary::default();
        let out = r.finish(&summary, Duration::from_millis(1500)).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_rows_follow_scanner_order_not_completion_order() {
        let rs = repos(&["a", "b", "c"]);
        let plan = FleetPlan::status(true);
        let mut r = ProgressRenderer::new(Vec::new(), &rs, &plan, RenderOptions::plain());
        r.apply(done(2, Phase::Local, status("dev", 0)));
        r.apply(done(0, Phase::Local, status("main", 0)));
        r.apply(done(1, Phase::Local, status("feature", 3)));
        let text = render(r);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Repository"), "{text}");
        assert!(lines[1].starts_with("a ") && lines[1].contains("main"), "{text}");
        assert!(lines[2].starts_with("b ") && lines[2].contains("feature") && lines[2].contains('3'), "{text}");
        assert!(lines[3].starts_with("c ") && lines[3].contains("dev"), "{text}");
        assert!(text.contains("1s 500ms"), "{text}");
    }

    #[test]
    fn test_failure_shows_kind_and_detail_column() {
        let rs = repos(&["a", "b"]);
        let plan = FleetPlan::pull();
        let mut r = ProgressRenderer::new(Vec::new(), &rs, &plan, RenderOptions::plain());
        r.apply(done(0, Phase::Local, status("main", 0)));
        r.apply(done(
            1,
            Phase::Local,
            OperationResult::Failure(OperationFailure {
                kind: FailureKind::CommandError,
                task: "status".to_string(),
                repository: PathBuf::from("/ws/b"),
                exit_code: Some(128),
                detail: "fatal: bad object HEAD".to_string(),
            }),
        ));
        r.apply(FleetEvent::Skipped {
            index: 1,
            phase: Phase::Network,
            reason: SkipReason::LocalFailed,
        });
        let text = render(r);
        assert!(text.lines().next().unwrap().contains("Detail"), "{text}");
        let b = text.lines().find(|l| l.starts_with("b ")).unwrap();
        assert!(b.contains("command-error") && b.contains("fatal: bad object HEAD"), "{text}");
        // pull still pending for a at finish: shown with the idle marker, not a spinner frame
        let a = text.lines().find(|l| l.starts_with("a ")).unwrap();
        assert!(a.contains('·'), "{text}");
    }

    #[test]
    fn test_pr_and_sync_cells() {
        let rs = repos(&["a"]);
        let plan = FleetPlan::status(false);
        let mut r = ProgressRenderer::new(Vec::new(), &rs, &plan, RenderOptions::plain());
        r.apply(done(0, Phase::Local, status("main", 0)));
        r.apply(done(
            0,
            Phase::Network,
            OperationResult::Success(Payload::Sync(RemoteStatus {
                state: SyncState::Ahead,
                ahead: 2,
                behind: 0,
                pull_request: Some(PullRequest {
                    number: 7,
                    url: "https://example.invalid/pr/7".to_string(),
                }),
                web_url: None,
            })),
        ));
        let text = render(r);
        let a = text.lines().nth(1).unwrap();
        assert!(a.contains("#7") && a.contains("↑2"), "{text}");
        assert!(!text.contains('\x1b'), "plain output carries no escapes: {text:?}");
    }

    #[test]
    fn test_live_mode_rewrites_in_place() {
        let rs = repos(&["a"]);
        let plan = FleetPlan::status(true);
        let opts = RenderOptions {
            live: true,
            ..RenderOptions::plain()
        };
        let mut r = ProgressRenderer::new(Vec::new(), &rs, &plan, opts);
        r.redraw();
        r.apply(done(0, Phase::Local, status("main", 0)));
        let text = render(r);
        assert!(text.contains("\x1b[2A"), "{text:?}");
        assert!(text.contains("\x1b[2K"), "{text:?}");
    }

    #[test]
    fn test_colored_cells_pad_on_visible_width() {
        let c = Cell::colored("ok", GREEN);
        let s = render_cell(&c, 5, true);
        assert_eq!(s, "\x1b[32mok\x1b[0m   ");
        let linked = Cell::plain("#1").linked(Some("https://x"));
        assert_eq!(render_cell(&linked, 2, false), "#1");
    }
}
