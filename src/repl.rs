//! The main chat loop.
//!
//! Composes the resolver, editor, dispatcher, template store, invoker, and
//! session state into the REPL. One turn at a time, strictly serialized:
//! the prompt is never re-opened while an agent call is in flight, and the
//! session summary is emitted on every terminating path exactly once.

use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::agent::{Agent, AgentFactory};
use crate::config::ChatConfig;
use crate::dispatch::{Builtin, InputClassification, classify, help_text};
use crate::editor::{LineEditor, ReadOutcome, default_history_path};
use crate::error::{ErrorCategory, Result};
use crate::invoke::{Invoker, RetryPolicy};
use crate::observability;
use crate::render::{Palette, Role, StatusBar};
use crate::session::SessionState;
use crate::spinner::{Spinner, SpinnerStyle};
use crate::template::TemplateStore;
use crate::usage::{PricingTable, format_cost, format_tokens};

/// Whether the loop should keep reading after a turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TurnControl {
    /// Keep prompting.
    Continue,
    /// End the REPL; the caller runs the shutdown sequence.
    Exit,
}

/// Feature flags resolved once at startup for the active agent.
#[derive(Clone, Copy, Debug)]
struct Features {
    auto_save: bool,
    show_tokens: bool,
    show_metadata: bool,
    show_banner: bool,
    show_duration: bool,
    show_status_bar: bool,
}

impl Features {
    fn resolve(config: &ChatConfig, agent: Option<&str>) -> Self {
        Self {
            auto_save: config.get_bool("features.auto_save", false, agent),
            show_tokens: config.get_bool("features.show_tokens", false, agent),
            show_metadata: config.get_bool("features.show_metadata", true, agent),
            show_banner: config.get_bool("ui.show_banner", true, agent),
            show_duration: config.get_bool("ui.show_duration", true, agent),
            show_status_bar: config.get_bool("ui.show_status_bar", false, agent),
        }
    }
}

/// The interactive chat loop.
pub struct ChatLoop {
    config: ChatConfig,
    factory: Box<dyn AgentFactory>,
    agent: Box<dyn Agent>,
    agent_name: String,
    agent_description: String,
    model_info: Option<String>,
    features: Features,
    palette: Palette,
    editor: LineEditor,
    templates: TemplateStore,
    invoker: Invoker,
    session: SessionState,
    pricing: PricingTable,
    status_bar: Option<StatusBar>,
    interrupted: Arc<AtomicBool>,
    summary_emitted: bool,
}

impl ChatLoop {
    /// Builds the loop: acquires the agent from the factory, resolves the
    /// per-agent configuration view, and initializes terminal I/O.
    pub fn new(config: ChatConfig, factory: Box<dyn AgentFactory>) -> Result<Self> {
        let agent = factory.create()?;
        let agent_name = agent.name().to_string();
        let agent_description = agent.description().to_string();
        let features = Features::resolve(&config, Some(&agent_name));

        // Config can override the best-effort model extraction.
        let model_info = config
            .get_string_opt("model_display_name", Some(&agent_name))
            .or_else(|| agent.model_id());

        let palette = Palette::from_config(&config, Some(&agent_name));
        let tty = std::io::stdout().is_terminal();
        let readline_enabled = config.get_bool("features.readline_enabled", true, Some(&agent_name));
        let editor = LineEditor::new(readline_enabled, default_history_path())?;

        let spinner = Spinner::new(
            SpinnerStyle::from_name(&config.get_string(
                "behavior.spinner_style",
                "dots",
                Some(&agent_name),
            )),
            config.get_bool("ui.show_thinking_indicator", true, Some(&agent_name)),
            tty,
        );
        let invoker = Invoker::new(RetryPolicy::from_config(&config, Some(&agent_name)), spinner);

        let status_bar = (features.show_status_bar && tty).then(|| {
            StatusBar::new(
                &agent_name,
                &model_info
                    .clone()
                    .map(|m| prettify_model(&m))
                    .unwrap_or_else(|| "Unknown Model".to_string()),
                features.show_tokens,
            )
        });

        Ok(Self {
            config,
            factory,
            agent,
            agent_name,
            agent_description,
            model_info,
            features,
            palette,
            editor,
            templates: TemplateStore::new(),
            invoker,
            session: SessionState::new(),
            pricing: PricingTable::new(),
            status_bar,
            interrupted: Arc::new(AtomicBool::new(false)),
            summary_emitted: false,
        })
    }

    /// Replaces the template store (tests point this at a scratch dir).
    pub fn with_template_store(mut self, store: TemplateStore) -> Self {
        self.templates = store;
        self
    }

    /// Replaces the palette.
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    /// The flag a Ctrl-C handler should set to interrupt an agent call.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// The session state (read-only).
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// The active agent's display name.
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Runs the REPL to completion.
    ///
    /// The shutdown sequence — summary, optional export, agent cleanup —
    /// runs on every exit path, including an error propagating out of the
    /// read loop.
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();
        let result = self.read_loop().await;
        if let Err(err) = &result {
            error!(%err, "chat loop terminating on error");
        }
        self.finish().await;
        result
    }

    async fn read_loop(&mut self) -> Result<()> {
        let mut interrupted_last = false;
        loop {
            self.draw_status_bar();
            self.interrupted.store(false, Ordering::Relaxed);
            match self.editor.read_input("\nYou: ", &self.palette) {
                ReadOutcome::Line(line) => {
                    interrupted_last = false;
                    match self.handle_input(&line).await {
                        TurnControl::Continue => {}
                        TurnControl::Exit => return Ok(()),
                    }
                }
                ReadOutcome::Interrupted => {
                    // A second Ctrl-C in immediate succession shuts down.
                    if interrupted_last {
                        println!();
                        return Ok(());
                    }
                    interrupted_last = true;
                    println!();
                }
                ReadOutcome::Eof => {
                    println!();
                    return Ok(());
                }
            }
        }
    }

    /// Handles one logical input.
    ///
    /// Internal failures (a broken template file, an export hiccup) are
    /// reported as system errors and the prompt is redisplayed; they never
    /// tear the loop down.
    pub async fn handle_input(&mut self, input: &str) -> TurnControl {
        match classify(input) {
            InputClassification::Empty => TurnControl::Continue,
            InputClassification::MultiLine => {
                // The editor resolves multi-line before dispatch; a bare
                // initiator reaching this point is ignored.
                TurnControl::Continue
            }
            InputClassification::Builtin(builtin) => self.handle_builtin(builtin).await,
            InputClassification::Template { name, context } => {
                match self.templates.materialize(&name, &context) {
                    Ok(prompt) => {
                        println!(
                            "{}",
                            self.palette
                                .paint(Role::Success, &format!("Loaded template: {name}"))
                        );
                        self.prompt_turn(&prompt).await
                    }
                    Err(err) => {
                        println!(
                            "{}",
                            self.palette
                                .paint(Role::Error, &format!("Template not found: {name}"))
                        );
                        let names: Vec<String> = self
                            .templates
                            .list()
                            .into_iter()
                            .map(|t| format!("/{}", t.name))
                            .collect();
                        let available = if names.is_empty() {
                            "none".to_string()
                        } else {
                            names.join(", ")
                        };
                        println!("Available templates: {available}");
                        println!(
                            "Create at: {}/{name}.md",
                            self.templates.dir().display()
                        );
                        warn!(%err, template = %name, "template invocation failed");
                        TurnControl::Continue
                    }
                }
            }
            InputClassification::Prompt(prompt) => self.prompt_turn(&prompt).await,
        }
    }

    async fn handle_builtin(&mut self, builtin: Builtin) -> TurnControl {
        match builtin {
            Builtin::Help => {
                self.print_help();
                TurnControl::Continue
            }
            Builtin::Info => {
                self.print_info();
                TurnControl::Continue
            }
            Builtin::Templates => {
                self.print_templates();
                TurnControl::Continue
            }
            Builtin::Clear => {
                self.clear_session().await;
                TurnControl::Continue
            }
            Builtin::Exit => {
                println!(
                    "{}",
                    self.palette.paint(
                        Role::System,
                        &format!("\nGoodbye! Thanks for using {}!", self.agent_name),
                    )
                );
                TurnControl::Exit
            }
        }
    }

    /// One ordinary prompt: invoke the agent, account for usage, render.
    async fn prompt_turn(&mut self, prompt: &str) -> TurnControl {
        info!(prefix = %prompt.chars().take(100).collect::<String>(), "processing query");
        self.session.record_user(prompt);

        let outcome = self
            .invoker
            .invoke(
                self.agent.as_mut(),
                prompt,
                &self.interrupted,
                &self.palette,
            )
            .await;

        match outcome {
            Ok(outcome) => {
                let (input, output, total) = crate::usage::extract_counters(&outcome.response.meta);
                let metrics = crate::usage::extract_metrics(&outcome.response.meta);
                let model = outcome
                    .response
                    .model
                    .clone()
                    .or_else(|| self.model_info.clone());
                let usage = self.pricing.usage(model.as_deref(), input, output, total);

                println!(
                    "\n{}: {}",
                    self.palette.paint(Role::Agent, &self.agent_name),
                    outcome.response.text
                );

                self.session.record_turn(&outcome.response.text, usage);
                observability::TURN_DURATION.add(outcome.duration.as_secs_f64());

                self.print_turn_line(&outcome, usage, metrics, model.as_deref());
                info!(
                    duration_s = outcome.duration.as_secs_f64(),
                    attempts = outcome.attempts,
                    "query completed"
                );
                TurnControl::Continue
            }
            Err(err) => {
                observability::TURN_ERRORS.click();
                let category = ErrorCategory::of(&err);
                match category {
                    ErrorCategory::Cancelled => {
                        // Indicator already cleaned up; back to the prompt.
                        println!();
                    }
                    _ => {
                        println!("{}", self.palette.rule('-'));
                        println!(
                            "{}",
                            self.palette.paint(
                                Role::Error,
                                &format!(
                                    "{}: Query failed [{category}] - {err}",
                                    self.agent_name
                                ),
                            )
                        );
                        if let Some(hint) = category.hint() {
                            println!("{}", self.palette.paint(Role::System, hint));
                        }
                        error!(%err, category = %category, "query failed");
                    }
                }
                TurnControl::Continue
            }
        }
    }

    fn print_turn_line(
        &self,
        outcome: &crate::invoke::TurnOutcome,
        usage: crate::usage::Usage,
        metrics: crate::usage::TurnMetrics,
        model: Option<&str>,
    ) {
        let mut parts: Vec<String> = Vec::new();
        if self.features.show_duration {
            parts.push(format!("Time: {:.1}s", outcome.duration.as_secs_f64()));
        }
        if let Some(cycles) = metrics.cycles.filter(|c| *c > 0) {
            let word = if cycles == 1 { "cycle" } else { "cycles" };
            parts.push(format!("{cycles} {word}"));
        }
        if let Some(tools) = metrics.tool_calls.filter(|t| *t > 0) {
            let word = if tools == 1 { "tool" } else { "tools" };
            parts.push(format!("{tools} {word}"));
        }
        if self.features.show_tokens && usage.has_tokens() {
            parts.push(format!(
                "Tokens: {} (in: {}, out: {})",
                format_tokens(usage.total_tokens),
                format_tokens(usage.input_tokens),
                format_tokens(usage.output_tokens),
            ));
            let model_known = model.is_some_and(|m| self.pricing.knows(m));
            if model_known {
                parts.push(format!("Cost: {}", format_cost(usage.cost)));
                parts.push(format!("Session: {}", format_cost(self.session.totals().cost)));
            }
        }
        if !parts.is_empty() {
            println!("{}", self.palette.rule('-'));
            println!("{}", self.palette.paint(Role::System, &parts.join(" │ ")));
        }
    }

    async fn clear_session(&mut self) {
        self.editor.clear_screen();
        self.agent.cleanup().await;
        match self.factory.create() {
            Ok(agent) => {
                self.agent = agent;
                self.session.reset();
                println!(
                    "{}",
                    self.palette
                        .paint(Role::Success, "Screen cleared and agent session reset")
                );
                info!("agent session reset via clear command");
            }
            Err(err) => {
                println!(
                    "{}",
                    self.palette.paint(
                        Role::Error,
                        &format!("Could not reset agent session: {err}"),
                    )
                );
                println!(
                    "{}",
                    self.palette
                        .paint(Role::System, "Screen cleared but agent session maintained")
                );
                error!(%err, "failed to reset agent session");
            }
        }
        self.print_banner();
    }

    fn draw_status_bar(&mut self) {
        let Some(bar) = &self.status_bar else {
            return;
        };
        print!("{}", crate::render::CLEAR_SCREEN);
        println!(
            "{}",
            bar.render(
                self.session.query_count(),
                self.session.totals().total_tokens,
                self.session.elapsed(),
            )
        );
    }

    fn print_banner(&self) {
        if !self.features.show_banner {
            return;
        }
        println!("\n{} - Interactive Chat", self.agent_name.to_uppercase());
        println!("{}", self.palette.rule('='));
        println!("Welcome to {}!", self.agent_name);
        if !self.agent_description.is_empty() {
            println!("{}", self.agent_description);
        }
        if self.features.show_metadata {
            println!();
            println!("{}", self.palette.paint(Role::Dim, "Agent Configuration:"));
            let model = self
                .model_info
                .clone()
                .map(|m| prettify_model(&m))
                .unwrap_or_else(|| "Unknown Model".to_string());
            println!("  Model: {model}");
            let tools = self.agent.tools();
            if !tools.is_empty() {
                println!("  Tools: {} available", tools.len());
            }
        }
        println!();
        for line in help_text().lines() {
            println!("{line}");
        }
        println!();
        println!("Features:");
        if self.editor.interactive() {
            println!("  Up/Down - Navigate command history");
        }
        println!("  Enter   - Submit single line");
        println!("  \\\\      - Start multi-line input (end with empty line)");
        if !self.config.sources().is_empty() {
            println!();
            println!("{}", self.palette.paint(Role::Dim, "Configuration loaded"));
            if self.features.auto_save {
                let location = self.config.get_path(
                    "paths.save_location",
                    "~/agent-conversations",
                    Some(&self.agent_name),
                );
                println!("  Auto-save: enabled -> {}", location.display());
            }
        }
        println!("{}", self.palette.rule('='));
    }

    fn print_help(&self) {
        println!("\n{} - Help", self.agent_name.to_uppercase());
        println!("{}", self.palette.rule('='));
        println!("Agent: {}", self.agent_name);
        println!("Description: {}", self.agent_description);
        println!();
        for line in help_text().lines() {
            println!("{line}");
        }
        println!();
        println!("Prompt Templates:");
        println!("  Create: Save markdown files to {}/name.md", self.templates.dir().display());
        println!("  Use: Type /name <optional context>");
        println!("  Variables: Use {{input}} in template for substitution");
        println!();
        println!("Multi-line Input:");
        println!("  Type \\\\ to start multi-line mode");
        println!("  Press Enter on empty line to submit");
        if self.editor.interactive() {
            println!();
            println!("History:");
            println!("  Use Up/Down arrows to navigate previous queries");
            println!("  History saved to ~/.chat_history");
        }
        println!("{}", self.palette.rule('='));
    }

    fn print_info(&self) {
        println!("\n{} - Information", self.agent_name.to_uppercase());
        println!("{}", self.palette.rule('='));
        println!("Name: {}", self.agent_name);
        println!("Description: {}", self.agent_description);
        println!();
        println!("Configuration:");
        println!(
            "  Model ID: {}",
            self.model_info.as_deref().unwrap_or("Unknown")
        );
        let policy = self.invoker.policy();
        println!("  Max retries: {}", policy.max_retries);
        println!("  Timeout: {:.0}s", policy.timeout.as_secs_f64());
        let tools = self.agent.tools();
        if tools.is_empty() {
            println!("Tools: None");
        } else {
            println!("Available Tools ({}):", tools.len());
            for (idx, tool) in tools.iter().enumerate() {
                println!("  {}. {tool}", idx + 1);
            }
        }
        println!();
        println!("Features:");
        if self.editor.interactive() {
            println!("  + Command history with full line editing");
        }
        println!("  + Multi-line input support");
        println!("  + Automatic error recovery and retry logic");
        println!("  + Session reset with 'clear' command");
        if !self.config.sources().is_empty() {
            println!("  + Configuration file support (~/.chatrc or .chatrc)");
        }
        if self.features.auto_save {
            println!("  + Auto-save conversations on exit");
        }
        if self.features.show_tokens {
            println!("  + Per-turn token and cost reporting");
        }
        println!("{}", self.palette.rule('='));
    }

    fn print_templates(&self) {
        let templates = self.templates.list();
        if templates.is_empty() {
            println!(
                "\n{}",
                self.palette.paint(Role::System, "No prompt templates found")
            );
            println!("Create templates in: {}", self.templates.dir().display());
            println!("Example: {}/review.md", self.templates.dir().display());
            return;
        }
        println!(
            "\n{} ({}):",
            self.palette.paint(Role::System, "Available Prompt Templates"),
            templates.len()
        );
        println!("{}", self.palette.rule('-'));
        for template in &templates {
            match &template.description {
                Some(description) => println!(
                    "  /{} - {}",
                    self.palette.paint(Role::Success, &template.name),
                    self.palette.paint(Role::Dim, description),
                ),
                None => println!("  /{}", self.palette.paint(Role::Success, &template.name)),
            }
        }
        println!("{}", self.palette.rule('-'));
        println!(
            "{}",
            self.palette
                .paint(Role::System, "Usage: /template_name <optional context>")
        );
        println!(
            "{}",
            self.palette.paint(
                Role::System,
                &format!("Location: {}", self.templates.dir().display()),
            )
        );
    }

    /// Shutdown sequence: summary (exactly once), optional export, cleanup.
    async fn finish(&mut self) {
        if !self.summary_emitted {
            self.summary_emitted = true;
            println!("{}", self.session.render_summary(&self.palette));
        }
        if self.features.auto_save && !self.session.transcript().is_empty() {
            let location = self.config.get_path(
                "paths.save_location",
                "~/agent-conversations",
                Some(&self.agent_name),
            );
            match crate::export::export_conversation(
                &location,
                &self.agent_name,
                self.model_info.as_deref(),
                &self.session,
            ) {
                Ok(path) => println!(
                    "{}",
                    self.palette.paint(
                        Role::Success,
                        &format!("Conversation saved to {}", path.display()),
                    )
                ),
                Err(err) => println!(
                    "{}",
                    self.palette
                        .paint(Role::Error, &format!("Could not save conversation: {err}")),
                ),
            }
        }
        self.agent.cleanup().await;
        println!(
            "{}",
            self.palette.paint(
                Role::Success,
                &format!("\n{} session complete!", self.agent_name),
            )
        );
    }
}

/// Shortens raw platform model identifiers for display.
///
/// `us.anthropic.claude-sonnet-4-5-20250929-v1:0` reads better as
/// `Claude Sonnet 4.5`; identifiers that don't match a known family pass
/// through untouched.
fn prettify_model(model_id: &str) -> String {
    let lower = model_id.to_lowercase();
    if lower.contains("claude-sonnet") {
        if lower.contains("4-5") || lower.contains("4.5") {
            "Claude Sonnet 4.5".to_string()
        } else if lower.contains("3-5") || lower.contains("3.5") {
            "Claude Sonnet 3.5".to_string()
        } else {
            "Claude Sonnet".to_string()
        }
    } else if lower.contains("claude-opus") {
        "Claude Opus".to_string()
    } else if lower.contains("claude-haiku") {
        "Claude Haiku".to_string()
    } else {
        model_id.to_string()
    }
}
