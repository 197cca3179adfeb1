//! Markdown export of the conversation on clean exit.
//!
//! When `features.auto_save` is enabled, the transcript is written to
//! `<paths.save_location>/YYYY-MM-DD_HH-MM-SS_<agent-slug>.md`. Export
//! failures are reported but never change the exit status or suppress the
//! session summary.

use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::info;

use crate::error::{Error, Result};
use crate::session::{SessionState, TranscriptRole};
use crate::usage::{format_cost, format_tokens};

/// Writes the transcript to a timestamped markdown file, returning its path.
pub fn export_conversation(
    dir: &Path,
    agent_name: &str,
    model: Option<&str>,
    session: &SessionState,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .map_err(|err| Error::io(format!("cannot create {}: {err}", dir.display()), err))?;
    let path = dir.join(file_name(agent_name, now()));
    let body = render_markdown(agent_name, model, session);
    std::fs::write(&path, body)
        .map_err(|err| Error::io(format!("cannot write {}: {err}", path.display()), err))?;
    info!(path = %path.display(), "conversation exported");
    Ok(path)
}

/// Builds `YYYY-MM-DD_HH-MM-SS_<slug>.md`.
fn file_name(agent_name: &str, at: OffsetDateTime) -> String {
    let stamp = at
        .format(format_description!(
            "[year]-[month]-[day]_[hour]-[minute]-[second]"
        ))
        .unwrap_or_else(|_| "unknown-time".to_string());
    format!("{stamp}_{}.md", slug(agent_name))
}

/// Lowercases and replaces non-word characters with `-`.
pub fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '-' })
        .collect()
}

fn render_markdown(agent_name: &str, model: Option<&str>, session: &SessionState) -> String {
    let totals = session.totals();
    let mut out = String::new();
    out.push_str(&format!("# Conversation with {agent_name}\n\n"));
    out.push_str(&format!("- Agent: {agent_name}\n"));
    out.push_str(&format!("- Model: {}\n", model.unwrap_or("unknown")));
    out.push_str(&format!("- Started: {}\n", rfc3339(session.started_at())));
    out.push_str(&format!("- Ended: {}\n", rfc3339(now())));
    out.push_str(&format!("- Queries: {}\n", session.query_count()));
    out.push_str(&format!(
        "- Tokens: {} (in: {}, out: {})\n",
        format_tokens(totals.total_tokens),
        format_tokens(totals.input_tokens),
        format_tokens(totals.output_tokens),
    ));
    if totals.cost > 0.0 {
        out.push_str(&format!("- Cost: {}\n", format_cost(totals.cost)));
    }
    out.push('\n');
    for entry in session.transcript() {
        let heading = match entry.role {
            TranscriptRole::User => "## User",
            TranscriptRole::Agent => "## Agent",
        };
        out.push_str(heading);
        out.push('\n');
        out.push('\n');
        out.push_str(&entry.text);
        out.push('\n');
        out.push('\n');
    }
    out
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
