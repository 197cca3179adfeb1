//! The thinking indicator shown while an agent attempt is in flight.
//!
//! The spinner is an explicit state machine (idle, ticking, flushing) owned
//! by the invoker and stopped through a scoped guard, so every exit path of
//! an attempt — success, failure, timeout, interrupt — erases the spinner
//! row before any further output.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Tick cadence while the spinner is animating.
const TICK: Duration = Duration::from_millis(100);

/// Dot cadence for the non-TTY fallback.
const DOT_TICK: Duration = Duration::from_millis(500);

/// Named spinner animations selectable via `behavior.spinner_style`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpinnerStyle {
    /// Braille dots (the default).
    Dots,
    /// Spinning line.
    Line,
    /// Rotating arc.
    Arc,
}

impl SpinnerStyle {
    /// Resolves a style by name; unknown names fall back to dots.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "line" => SpinnerStyle::Line,
            "arc" => SpinnerStyle::Arc,
            _ => SpinnerStyle::Dots,
        }
    }

    fn frames(self) -> &'static [&'static str] {
        match self {
            SpinnerStyle::Dots => &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"],
            SpinnerStyle::Line => &["-", "\\", "|", "/"],
            SpinnerStyle::Arc => &["◜", "◠", "◝", "◞", "◡", "◟"],
        }
    }
}

/// Lifecycle states of the indicator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpinnerState {
    /// No animation running.
    Idle,
    /// Ticker thread animating.
    Ticking,
    /// Stop requested, row being erased.
    Flushing,
}

/// Spinner factory configured once per session.
#[derive(Clone, Debug)]
pub struct Spinner {
    style: SpinnerStyle,
    enabled: bool,
    tty: bool,
    label: String,
}

impl Spinner {
    /// Creates a spinner.
    ///
    /// `enabled` follows `ui.show_thinking_indicator`; `tty` selects the
    /// animated row versus the plain-dot fallback for piped output.
    pub fn new(style: SpinnerStyle, enabled: bool, tty: bool) -> Self {
        Self {
            style,
            enabled,
            tty,
            label: "Thinking...".to_string(),
        }
    }

    /// Starts ticking and returns the guard that stops it.
    pub fn start(&self) -> SpinnerGuard {
        if !self.enabled {
            return SpinnerGuard::idle();
        }
        let stop = Arc::new(AtomicBool::new(false));
        let ticker_stop = stop.clone();
        let style = self.style;
        let tty = self.tty;
        let label = self.label.clone();
        let handle = std::thread::spawn(move || {
            let mut frame = 0usize;
            let frames = style.frames();
            while !ticker_stop.load(Ordering::Relaxed) {
                let mut out = std::io::stdout().lock();
                if tty {
                    let _ = write!(out, "\r{} {}", frames[frame % frames.len()], label);
                } else {
                    let _ = write!(out, ".");
                }
                let _ = out.flush();
                drop(out);
                frame += 1;
                std::thread::sleep(if tty { TICK } else { DOT_TICK });
            }
        });
        SpinnerGuard {
            state: SpinnerState::Ticking,
            stop,
            handle: Some(handle),
            tty,
            row_width: self.label.chars().count() + 2,
        }
    }
}

/// Scoped guard for a running spinner.
///
/// Dropping the guard stops the ticker and erases the spinner row; an
/// explicit [`SpinnerGuard::stop`] does the same eagerly.
pub struct SpinnerGuard {
    state: SpinnerState,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    tty: bool,
    row_width: usize,
}

impl SpinnerGuard {
    fn idle() -> Self {
        Self {
            state: SpinnerState::Idle,
            stop: Arc::new(AtomicBool::new(true)),
            handle: None,
            tty: false,
            row_width: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SpinnerState {
        self.state
    }

    /// Stops the ticker and erases the row.
    pub fn stop(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.state != SpinnerState::Ticking {
            return;
        }
        self.state = SpinnerState::Flushing;
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let mut out = std::io::stdout().lock();
        if self.tty {
            let _ = write!(out, "\r{}\r", " ".repeat(self.row_width));
        } else {
            let _ = writeln!(out);
        }
        let _ = out.flush();
        self.state = SpinnerState::Idle;
    }
}

impl Drop for SpinnerGuard {
    fn drop(&mut self) {
        self.finish();
    }
}
