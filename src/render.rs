//! Colored terminal output.
//!
//! Six semantic color roles plus reset, sourced from the `colors` config
//! section. When stdout is not a terminal all escape sequences are elided,
//! so piped output stays clean.

use std::io::IsTerminal;
use std::time::Duration;

use serde_yaml::Value;

use crate::config::ChatConfig;

/// ANSI escape to clear the screen and home the cursor.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Width of horizontal rules and framed blocks.
pub const FRAME_WIDTH: usize = 60;

/// Semantic color roles.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// User input and prompts.
    User,
    /// Agent output.
    Agent,
    /// System messages.
    System,
    /// Errors.
    Error,
    /// Confirmations.
    Success,
    /// Secondary text.
    Dim,
}

/// Maps color roles to escape sequences.
#[derive(Clone, Debug)]
pub struct Palette {
    user: String,
    agent: String,
    system: String,
    error: String,
    success: String,
    dim: String,
    reset: String,
    enabled: bool,
}

impl Palette {
    /// Builds a palette from the merged `colors` section.
    ///
    /// Colors are only emitted when stdout is a terminal.
    pub fn from_config(config: &ChatConfig, agent: Option<&str>) -> Self {
        Self::from_config_with_tty(config, agent, std::io::stdout().is_terminal())
    }

    /// Builds a palette with an explicit TTY decision (for tests).
    pub fn from_config_with_tty(config: &ChatConfig, agent: Option<&str>, tty: bool) -> Self {
        let colors = config.section("colors", agent);
        let pick = |key: &str, fallback: &str| -> String {
            colors
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };
        Self {
            user: pick("user", "\x1b[97m"),
            agent: pick("agent", "\x1b[94m"),
            system: pick("system", "\x1b[33m"),
            error: pick("error", "\x1b[91m"),
            success: pick("success", "\x1b[92m"),
            dim: pick("dim", "\x1b[2m"),
            reset: pick("reset", "\x1b[0m"),
            enabled: tty,
        }
    }

    /// A palette that never emits escapes.
    pub fn plain() -> Self {
        Self {
            user: String::new(),
            agent: String::new(),
            system: String::new(),
            error: String::new(),
            success: String::new(),
            dim: String::new(),
            reset: String::new(),
            enabled: false,
        }
    }

    fn code(&self, role: Role) -> &str {
        match role {
            Role::User => &self.user,
            Role::Agent => &self.agent,
            Role::System => &self.system,
            Role::Error => &self.error,
            Role::Success => &self.success,
            Role::Dim => &self.dim,
        }
    }

    /// Wraps text in a role's escape plus reset; a no-op off-terminal.
    pub fn paint(&self, role: Role, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        format!("{}{}{}", self.code(role), text, self.reset)
    }

    /// True when escapes are emitted.
    pub fn colored(&self) -> bool {
        self.enabled
    }

    /// A dim horizontal rule.
    pub fn rule(&self, ch: char) -> String {
        self.paint(Role::Dim, &ch.to_string().repeat(FRAME_WIDTH))
    }
}

/// The single-line status box repainted before each prompt.
///
/// The bar renders from values passed per repaint; it holds no counters of
/// its own, so it stays decoupled from the input buffer and session state.
#[derive(Clone, Debug)]
pub struct StatusBar {
    agent_name: String,
    model_info: String,
    show_tokens: bool,
}

impl StatusBar {
    /// Maximum model-identifier width before truncation.
    const MODEL_WIDTH: usize = 30;

    /// Creates a status bar for an agent and model.
    pub fn new(agent_name: &str, model_info: &str, show_tokens: bool) -> Self {
        let model_info = if model_info.chars().count() > Self::MODEL_WIDTH {
            let head: String = model_info.chars().take(Self::MODEL_WIDTH - 3).collect();
            format!("{head}...")
        } else {
            model_info.to_string()
        };
        Self {
            agent_name: agent_name.to_string(),
            model_info,
            show_tokens,
        }
    }

    /// Renders the bordered status line.
    pub fn render(&self, query_count: u64, total_tokens: u64, elapsed: Duration) -> String {
        let queries = if query_count == 1 { "query" } else { "queries" };
        let mut parts = vec![self.agent_name.clone(), self.model_info.clone()];
        if self.show_tokens && total_tokens > 0 {
            parts.push(format!(
                "{} tokens",
                crate::usage::format_tokens(total_tokens)
            ));
        }
        parts.push(format!("{query_count} {queries}"));
        parts.push(format_elapsed(elapsed));

        let line = parts.join(" │ ");
        let width = line.chars().count() + 2;
        let top = format!("┌{}┐", "─".repeat(width));
        let middle = format!("│ {line} │");
        let bottom = format!("└{}┘", "─".repeat(width));
        format!("{top}\n{middle}\n{bottom}")
    }
}

/// Formats elapsed time for the status bar as `Xs` or `Xm Ys`.
///
/// Minutes never roll into hours; a long session reads `62m 5s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let minutes = total / 60;
    let seconds = total % 60;
    if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
