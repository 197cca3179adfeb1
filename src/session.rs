//! Per-session counters, transcript, and the exit summary.
//!
//! One [`SessionState`] lives for the lifetime of the REPL. Only successful
//! turns advance the query counter and the cumulative usage; retries and
//! failed turns leave both untouched. The summary block renders on every
//! terminating path of the orchestrator.

use std::time::{Duration, Instant};

use time::OffsetDateTime;

use crate::observability;
use crate::render::{Palette, Role};
use crate::usage::{Usage, format_cost, format_tokens};

/// Who produced a transcript entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptRole {
    /// The human.
    User,
    /// The agent.
    Agent,
}

/// One transcript entry.
#[derive(Clone, Debug)]
pub struct TranscriptEntry {
    /// Who spoke.
    pub role: TranscriptRole,
    /// What was said, verbatim.
    pub text: String,
    /// When it was recorded.
    pub timestamp: OffsetDateTime,
}

/// Lifetime counters for one chat session.
#[derive(Debug)]
pub struct SessionState {
    started: Instant,
    started_at: OffsetDateTime,
    query_count: u64,
    totals: Usage,
    transcript: Vec<TranscriptEntry>,
    last_response: Option<String>,
}

impl SessionState {
    /// Creates a fresh session clocked from now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: now(),
            query_count: 0,
            totals: Usage::default(),
            transcript: Vec::new(),
            last_response: None,
        }
    }

    /// Successful turns so far.
    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    /// Cumulative usage across successful turns.
    pub fn totals(&self) -> Usage {
        self.totals
    }

    /// Wall-clock session start.
    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Elapsed session time.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The conversation so far, in order.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Text of the most recent agent response, if any.
    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// Records an accepted user input.
    pub fn record_user(&mut self, text: &str) {
        self.transcript.push(TranscriptEntry {
            role: TranscriptRole::User,
            text: text.to_string(),
            timestamp: now(),
        });
    }

    /// Records one successful agent turn.
    ///
    /// This is the only place the query counter advances.
    pub fn record_turn(&mut self, response_text: &str, usage: Usage) {
        self.query_count += 1;
        self.totals += usage;
        self.last_response = Some(response_text.to_string());
        self.transcript.push(TranscriptEntry {
            role: TranscriptRole::Agent,
            text: response_text.to_string(),
            timestamp: now(),
        });
        observability::TURNS.click();
        observability::TOKENS_IN.count(usage.input_tokens);
        observability::TOKENS_OUT.count(usage.output_tokens);
    }

    /// Resets counters and transcript; used by the `clear` builtin.
    pub fn reset(&mut self) {
        self.query_count = 0;
        self.totals = Usage::default();
        self.transcript.clear();
        self.last_response = None;
    }

    /// Renders the framed summary block.
    pub fn render_summary(&self, palette: &Palette) -> String {
        let mut lines = Vec::new();
        lines.push(palette.rule('='));
        lines.push(palette.paint(Role::System, "Session Summary"));
        lines.push(palette.rule('-'));
        lines.push(palette.paint(
            Role::System,
            &format!("  Duration: {}", format_duration(self.elapsed())),
        ));
        lines.push(palette.paint(Role::System, &format!("  Queries: {}", self.query_count)));
        if self.totals.has_tokens() {
            lines.push(palette.paint(
                Role::System,
                &format!(
                    "  Tokens: {} (in: {}, out: {})",
                    format_tokens(self.totals.total_tokens),
                    format_tokens(self.totals.input_tokens),
                    format_tokens(self.totals.output_tokens),
                ),
            ));
            if self.totals.cost > 0.0 {
                lines.push(palette.paint(
                    Role::System,
                    &format!("  Total Cost: {}", format_cost(self.totals.cost)),
                ));
            }
        }
        lines.push(palette.rule('='));
        lines.join("\n")
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Formats the session duration for the summary: `Xs` under a minute,
/// `Xm Ys` under an hour, `Xh Ym` beyond (seconds dropped).
fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    if total < 60 {
        format!("{total}s")
    } else if total < 3600 {
        format!("{}m {}s", total / 60, total % 60)
    } else {
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64) -> Usage {
        Usage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
            cost: 0.0,
        }
    }

    #[test]
    fn counts_only_successful_turns() {
        let mut session = SessionState::new();
        assert_eq!(session.query_count(), 0);
        session.record_user("hello");
        assert_eq!(session.query_count(), 0);
        session.record_turn("hi", usage(10, 5));
        assert_eq!(session.query_count(), 1);
    }

    #[test]
    fn totals_are_element_wise_sums() {
        let mut session = SessionState::new();
        session.record_turn("a", usage(10, 5));
        session.record_turn("b", usage(1, 2));
        let totals = session.totals();
        assert_eq!(totals.input_tokens, 11);
        assert_eq!(totals.output_tokens, 7);
        assert_eq!(totals.total_tokens, 18);
    }

    #[test]
    fn transcript_interleaves_roles() {
        let mut session = SessionState::new();
        session.record_user("question");
        session.record_turn("answer", usage(1, 1));
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, TranscriptRole::User);
        assert_eq!(transcript[1].role, TranscriptRole::Agent);
        assert_eq!(session.last_response(), Some("answer"));
    }

    #[test]
    fn summary_with_zero_queries() {
        let session = SessionState::new();
        let summary = session.render_summary(&Palette::plain());
        assert!(summary.contains("Session Summary"));
        assert!(summary.contains("Queries: 0"));
        assert!(!summary.contains("Tokens:"));
    }

    #[test]
    fn summary_shows_token_split() {
        let mut session = SessionState::new();
        session.record_turn("hi", usage(10, 5));
        let summary = session.render_summary(&Palette::plain());
        assert!(summary.contains("Queries: 1"));
        assert!(summary.contains("Tokens: 15 (in: 10, out: 5)"));
        // Zero cost stays silent.
        assert!(!summary.contains("Total Cost"));
    }

    #[test]
    fn summary_shows_cost_when_priced() {
        let mut session = SessionState::new();
        session.record_turn(
            "hi",
            Usage {
                input_tokens: 100,
                output_tokens: 50,
                total_tokens: 150,
                cost: 0.0105,
            },
        );
        let summary = session.render_summary(&Palette::plain());
        assert!(summary.contains("Total Cost: $0.0105"));
    }

    #[test]
    fn summary_duration_formats() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
        // Above an hour the summary drops seconds.
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m");
    }

    #[test]
    fn reset_clears_counters_and_transcript() {
        let mut session = SessionState::new();
        session.record_user("q");
        session.record_turn("a", usage(5, 5));
        session.reset();
        assert_eq!(session.query_count(), 0);
        assert!(session.transcript().is_empty());
        assert_eq!(session.totals(), Usage::default());
        assert!(session.last_response().is_none());
    }
}
