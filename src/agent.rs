//! The agent invocation contract and the subprocess-backed default agent.
//!
//! The chat loop drives any [`Agent`]: a callable that accepts a prompt and
//! returns a [`Response`]. Responses are opaque; the loop probes the
//! `meta` payload for usage and metrics (see [`crate::usage`]) and never
//! assumes a concrete shape. The binary's `--agent <path>` convention loads
//! a YAML [`AgentSpec`] and wires it to a [`CommandAgent`] that pipes the
//! prompt through a subprocess.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// The value returned from invoking an agent.
///
/// Only `text` is required; everything else is best-effort and probed by
/// the token accountant and the display layer.
#[derive(Clone, Debug, Default)]
pub struct Response {
    /// Textual content of the response.
    pub text: String,
    /// Model identifier, if the agent reports one.
    pub model: Option<String>,
    /// Heterogeneous payload probed for usage counters and metrics.
    pub meta: Value,
}

impl Response {
    /// Creates a text-only response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            meta: Value::Null,
        }
    }

    /// Attaches a model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attaches a metadata payload.
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}

/// An external collaborator invoked once per non-builtin turn.
///
/// Implementations may be fully synchronous (return a ready future) or
/// genuinely asynchronous; the invoker drives the future to completion on
/// the main control flow either way.
#[async_trait::async_trait]
pub trait Agent: Send {
    /// Produces a response to one prompt.
    async fn respond(&mut self, prompt: &str) -> Result<Response>;

    /// Display name.
    fn name(&self) -> &str;

    /// Short description shown in the banner.
    fn description(&self) -> &str {
        "An agent"
    }

    /// Best-effort model identifier.
    fn model_id(&self) -> Option<String> {
        None
    }

    /// Best-effort tool enumeration.
    fn tools(&self) -> Vec<String> {
        Vec::new()
    }

    /// Best-effort cleanup hook, called on `clear` and at shutdown.
    async fn cleanup(&mut self) {}
}

/// Produces fresh agent instances; used at startup and on `clear`.
pub trait AgentFactory: Send {
    /// Creates a new agent.
    fn create(&self) -> Result<Box<dyn Agent>>;
}

/// A YAML agent definition loaded from the `--agent <path>` argument.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AgentSpec {
    /// Display name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Model identifier used for pricing and display.
    #[serde(default)]
    pub model: Option<String>,
    /// Command argv invoked once per prompt.
    pub command: Vec<String>,
    /// Tool names advertised by the agent, if any.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentSpec {
    /// Loads and validates an agent definition.
    ///
    /// # Errors
    ///
    /// A missing or malformed file is a configuration error; the chat loop
    /// cannot start without an agent.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::config(
                format!("cannot read agent definition {}: {err}", path.display()),
                Some("pass --agent an existing agent YAML file".to_string()),
            )
        })?;
        let spec: AgentSpec = serde_yaml::from_str(&text).map_err(|err| {
            Error::config(
                format!("invalid agent definition {}: {err}", path.display()),
                Some("agent YAML needs `name` and `command` fields".to_string()),
            )
        })?;
        if spec.command.is_empty() {
            return Err(Error::config(
                format!("agent definition {} has an empty command", path.display()),
                Some("list the argv to run per prompt under `command`".to_string()),
            ));
        }
        Ok(spec)
    }
}

impl AgentFactory for AgentSpec {
    fn create(&self) -> Result<Box<dyn Agent>> {
        Ok(Box::new(CommandAgent::new(self.clone())))
    }
}

/// Agent backed by a subprocess.
///
/// Each prompt spawns the configured command, writes the prompt to the
/// child's stdin, and parses stdout as a JSON response envelope with a
/// raw-text fallback.
pub struct CommandAgent {
    spec: AgentSpec,
}

impl CommandAgent {
    /// Creates an agent from its definition.
    pub fn new(spec: AgentSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Agent for CommandAgent {
    async fn respond(&mut self, prompt: &str) -> Result<Response> {
        let (program, args) = self
            .spec
            .command
            .split_first()
            .ok_or_else(|| Error::config("agent command is empty", None))?;
        debug!(agent = %self.spec.name, %program, "spawning agent process");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::connection(format!("cannot spawn {program}: {err}"), None))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|err| Error::connection(format!("agent stdin closed: {err}"), None))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|err| Error::connection(format!("agent process failed: {err}"), None))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::agent(stderr.trim().to_string()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(parse_response(&stdout, self.spec.model.as_deref()))
    }

    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn model_id(&self) -> Option<String> {
        self.spec.model.clone()
    }

    fn tools(&self) -> Vec<String> {
        self.spec.tools.clone()
    }
}

/// Parses agent stdout as a JSON envelope, falling back to raw text.
///
/// The envelope's `text` (or `content`) field becomes the response text;
/// the whole object is kept as the metadata payload for usage probing.
pub fn parse_response(stdout: &str, fallback_model: Option<&str>) -> Response {
    let trimmed = stdout.trim_end();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if value.is_object() => {
            let text = value
                .get("text")
                .or_else(|| value.get("content"))
                .and_then(Value::as_str)
                .unwrap_or(trimmed)
                .to_string();
            let model = value
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| fallback_model.map(str::to_string));
            Response {
                text,
                model,
                meta: value,
            }
        }
        _ => {
            let mut response = Response::text(trimmed);
            response.model = fallback_model.map(str::to_string);
            response
        }
    }
}
