//! Interactive terminal chat loop for pluggable AI agents.
//!
//! This crate drives conversational sessions with any [`Agent`]: a callable
//! that accepts a prompt string and returns an opaque [`Response`]. It
//! supports:
//!
//! - Layered YAML configuration with per-agent overrides
//! - Line editing with persistent history and multi-line input
//! - A thinking indicator with guaranteed cleanup on every exit path
//! - Retry with exponential backoff for transient failures
//! - Prompt templates with `{input}` substitution
//! - Token and cost accounting with a per-session summary
//! - Optional markdown export of the conversation
//!
//! # Architecture
//!
//! The crate is organized into leaf components composed by the REPL:
//!
//! - [`config`]: layered configuration resolver
//! - [`editor`]: terminal input with history and multi-line capture
//! - [`dispatch`]: input classification
//! - [`template`]: prompt template store
//! - [`invoke`]: agent invocation with retry and timeout
//! - [`usage`]: token accounting and pricing
//! - [`session`]: per-session counters and the exit summary
//! - [`export`]: markdown conversation export
//! - [`repl`]: the orchestrating chat loop

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod editor;
pub mod error;
pub mod export;
pub mod invoke;
mod observability;
pub mod render;
pub mod repl;
pub mod session;
pub mod spinner;
pub mod template;
pub mod usage;

pub use agent::{Agent, AgentFactory, AgentSpec, CommandAgent, Response};
pub use config::{ChatConfig, ConfigLoader};
pub use dispatch::{Builtin, InputClassification, classify, help_text};
pub use editor::{LineEditor, ReadOutcome};
pub use error::{Error, ErrorCategory, Result};
pub use invoke::{Invoker, RetryPolicy, TurnOutcome};
pub use observability::register_biometrics;
pub use render::{Palette, Role, StatusBar};
pub use repl::{ChatLoop, TurnControl};
pub use session::{SessionState, TranscriptEntry, TranscriptRole};
pub use spinner::{Spinner, SpinnerGuard, SpinnerState, SpinnerStyle};
pub use template::{TemplateInfo, TemplateStore};
pub use usage::{PricingTable, TurnMetrics, Usage, format_cost, format_tokens};
