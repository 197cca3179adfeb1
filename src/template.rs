//! Prompt template store.
//!
//! Templates are user-managed markdown files in `~/.prompts/`; each
//! `<name>.md` defines a template invocable as `/<name>`. Discovery happens
//! per invocation so new files appear without a restart.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Width templates descriptions are truncated to in listings.
const DESCRIPTION_WIDTH: usize = 60;

/// A discovered template: name plus a short description for listings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemplateInfo {
    /// Template name (file stem, lowercased).
    pub name: String,
    /// First meaningful line of the body, truncated.
    pub description: Option<String>,
}

/// Discovers and materializes prompt templates from a directory.
#[derive(Clone, Debug)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    /// Creates a store rooted at `~/.prompts/`.
    pub fn new() -> Self {
        let dir = dirs::home_dir()
            .map(|home| home.join(".prompts"))
            .unwrap_or_else(|| PathBuf::from(".prompts"));
        Self { dir }
    }

    /// Creates a store rooted at an explicit directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory templates are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Enumerates templates in alphabetical order.
    ///
    /// Only `<name>.md` files whose stem is lowercase word characters are
    /// templates; everything else in the directory is ignored.
    pub fn list(&self) -> Vec<TemplateInfo> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut templates: Vec<TemplateInfo> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let name = template_name(&path)?;
                let description = std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|body| describe(&body));
                Some(TemplateInfo { name, description })
            })
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates
    }

    /// Loads a template body by name.
    pub fn load(&self, name: &str) -> Result<String> {
        let wanted = name.to_lowercase();
        let path = self.dir.join(format!("{wanted}.md"));
        let path = if path.is_file() {
            path
        } else {
            // The on-disk stem may be mixed case; names are compared lowercased.
            self.find_by_name(&wanted).ok_or_else(|| {
                Error::template(
                    format!("not found under {}", self.dir.display()),
                    Some(name.to_string()),
                )
            })?
        };
        std::fs::read_to_string(&path).map_err(|err| {
            Error::template(format!("cannot read: {err}"), Some(name.to_string()))
        })
    }

    fn find_by_name(&self, wanted: &str) -> Option<PathBuf> {
        std::fs::read_dir(&self.dir)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .find(|path| template_name(path).as_deref() == Some(wanted))
    }

    /// Loads a template and substitutes the trailing context into it.
    pub fn materialize(&self, name: &str, context: &str) -> Result<String> {
        let body = self.load(name)?;
        debug!(template = name, "materialized template");
        Ok(substitute(&body, context))
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the trailing context to a template body.
///
/// Every literal `{input}` is replaced by the context; a body without the
/// placeholder gets a non-empty context appended after a blank line.
pub fn substitute(body: &str, context: &str) -> String {
    if body.contains("{input}") {
        body.replace("{input}", context)
    } else if !context.is_empty() {
        format!("{body}\n\n{context}")
    } else {
        body.to_string()
    }
}

fn template_name(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("md") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let name = stem.to_lowercase();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(name)
}

/// A template describes itself only through a leading `#` comment line;
/// anything else lists bare.
fn describe(body: &str) -> Option<String> {
    let line = body.lines().next()?.trim();
    if !line.starts_with('#') {
        return None;
    }
    let text = line.trim_start_matches('#').trim();
    if text.is_empty() {
        return None;
    }
    let truncated: String = text.chars().take(DESCRIPTION_WIDTH).collect();
    Some(truncated)
}
