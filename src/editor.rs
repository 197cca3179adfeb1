//! Line editing and logical input capture.
//!
//! The editor owns the controlling terminal: reads happen directly on the
//! main control flow (never a worker thread), which is what keeps
//! rustyline's caret motion, kill/yank, and reverse incremental search
//! working. Without a terminal (piped input, CI), it degrades to plain
//! stdin reads with history and editing disabled.

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use rustyline::DefaultEditor;
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::error::Result;
use crate::render::{Palette, Role};

/// History cap; the file is trimmed from the front beyond this.
const HISTORY_SIZE: usize = 1000;

/// Continuation prompt shown in multi-line mode.
const CONTINUATION_PROMPT: &str = "... ";

/// What one read produced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReadOutcome {
    /// A submitted line (or joined multi-line input).
    Line(String),
    /// Ctrl-C at the prompt; current line cleared.
    Interrupted,
    /// End of input.
    Eof,
}

/// Terminal reader with persistent history.
pub struct LineEditor {
    inner: Option<DefaultEditor>,
    history_path: Option<PathBuf>,
}

impl LineEditor {
    /// Creates the editor.
    ///
    /// Line editing and history require both `features.readline_enabled`
    /// and a controlling terminal; otherwise reads fall back to plain
    /// stdin.
    pub fn new(readline_enabled: bool, history_path: Option<PathBuf>) -> Result<Self> {
        let interactive = readline_enabled && std::io::stdin().is_terminal();
        if !interactive {
            debug!("line editing disabled, using plain stdin reads");
            return Ok(Self {
                inner: None,
                history_path: None,
            });
        }
        let config = Config::builder()
            .max_history_size(HISTORY_SIZE)
            .map_err(|err| {
                crate::error::Error::io(err.to_string(), std::io::Error::other(err.to_string()))
            })?
            .auto_add_history(false)
            .build();
        let mut editor = DefaultEditor::with_config(config).map_err(|err| {
            crate::error::Error::io(err.to_string(), std::io::Error::other(err.to_string()))
        })?;
        if let Some(path) = &history_path
            && path.exists()
            && let Err(err) = editor.load_history(path)
        {
            debug!(%err, "could not load history");
        }
        Ok(Self {
            inner: Some(editor),
            history_path,
        })
    }

    /// True when the full line editor (and history) is active.
    pub fn interactive(&self) -> bool {
        self.inner.is_some()
    }

    /// Reads one physical line.
    pub fn readline(&mut self, prompt: &str) -> ReadOutcome {
        let Some(editor) = &mut self.inner else {
            return plain_readline(prompt);
        };
        let result = editor.readline(prompt);
        match result {
            Ok(line) => {
                self.record(&line);
                ReadOutcome::Line(line)
            }
            Err(ReadlineError::Interrupted) => ReadOutcome::Interrupted,
            Err(ReadlineError::Eof) => ReadOutcome::Eof,
            Err(err) => {
                debug!(%err, "readline failed, treating as end of input");
                ReadOutcome::Eof
            }
        }
    }

    /// Reads one logical input, entering multi-line mode on `\\`.
    ///
    /// Multi-line mode accumulates physical lines until an empty line and
    /// joins them with newlines; Ctrl-C abandons the buffer.
    pub fn read_input(&mut self, prompt: &str, palette: &Palette) -> ReadOutcome {
        match self.readline(prompt) {
            ReadOutcome::Line(line) if line.trim() == "\\\\" => {
                println!(
                    "{}",
                    palette.paint(Role::System, "Multi-line mode (empty line to submit):")
                );
                self.read_multiline(palette)
            }
            outcome => outcome,
        }
    }

    fn read_multiline(&mut self, palette: &Palette) -> ReadOutcome {
        let prompt = palette.paint(Role::User, CONTINUATION_PROMPT);
        collect_multiline(|| self.readline(&prompt))
    }

    /// Appends a submitted line to the history and persists it.
    fn record(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let Some(editor) = &mut self.inner else {
            return;
        };
        let _ = editor.add_history_entry(line);
        if let Some(path) = &self.history_path
            && let Err(err) = editor.save_history(path)
        {
            debug!(%err, "could not save history");
        }
    }

    /// Clears the screen and resets the editor's notion of it.
    pub fn clear_screen(&mut self) {
        print!("{}", crate::render::CLEAR_SCREEN);
        let _ = std::io::stdout().flush();
    }
}

/// Accumulates multi-line input: physical lines until an empty line, joined
/// with newlines (the terminating empty line is not included). Ctrl-C
/// abandons the buffer; end-of-input submits what was collected.
fn collect_multiline<F: FnMut() -> ReadOutcome>(mut read: F) -> ReadOutcome {
    let mut lines: Vec<String> = Vec::new();
    loop {
        match read() {
            ReadOutcome::Line(line) => {
                if line.trim().is_empty() {
                    return ReadOutcome::Line(lines.join("\n"));
                }
                lines.push(line);
            }
            ReadOutcome::Interrupted => return ReadOutcome::Interrupted,
            ReadOutcome::Eof => return ReadOutcome::Line(lines.join("\n")),
        }
    }
}

fn plain_readline(prompt: &str) -> ReadOutcome {
    print!("{prompt}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) => ReadOutcome::Eof,
        Ok(_) => {
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            ReadOutcome::Line(line)
        }
        Err(err) => {
            debug!(%err, "stdin read failed, treating as end of input");
            ReadOutcome::Eof
        }
    }
}

/// Default history location, `~/.chat_history`.
pub fn default_history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".chat_history"))
}
