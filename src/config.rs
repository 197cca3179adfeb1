//! Layered configuration resolver.
//!
//! # Load order
//!
//! 1. Built-in defaults (compile-time)
//! 2. Global config (`~/.chatrc`)
//! 3. Project config (first `.chatrc` found walking up at most three parents
//!    from the working directory)
//! 4. Explicit config (`--config <path>`)
//!
//! Each layer overrides the previous. Within a layer, an `agents.<name>`
//! mapping overrides that layer's base sections for the named agent, so the
//! full precedence order (highest wins) is: explicit agent override, explicit
//! base, project agent override, project base, global agent override, global
//! base, defaults. Runtime `set` calls land in a separate in-memory overlay
//! above everything; nothing is ever persisted.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Built-in defaults, lowest-precedence layer.
const DEFAULTS: &str = r#"
colors:
  user: "\e[97m"
  agent: "\e[94m"
  system: "\e[33m"
  error: "\e[91m"
  success: "\e[92m"
  dim: "\e[2m"
  reset: "\e[0m"
features:
  auto_save: false
  rich_enabled: true
  show_tokens: false
  show_metadata: true
  readline_enabled: true
paths:
  save_location: "~/agent-conversations"
  log_location: ".logs"
behavior:
  max_retries: 3
  retry_delay: 2.0
  timeout: 120.0
  spinner_style: "dots"
ui:
  show_banner: true
  show_thinking_indicator: true
  show_duration: true
  show_status_bar: false
"#;

/// How many parent directories to walk when discovering a project config.
const PROJECT_WALK_DEPTH: usize = 3;

/// Where a configuration layer came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LayerOrigin {
    /// Compile-time defaults.
    Defaults,
    /// `~/.chatrc`.
    Global,
    /// Nearest `.chatrc` walking up from the working directory.
    Project,
    /// Path supplied with `--config`.
    Explicit,
    /// In-memory overlay written by [`ChatConfig::set`].
    Runtime,
}

/// One source of configuration values.
#[derive(Clone, Debug)]
pub struct ConfigLayer {
    /// Where this layer came from.
    pub origin: LayerOrigin,
    /// Parsed YAML root. Always a mapping; unknown keys are preserved.
    root: Value,
}

impl ConfigLayer {
    fn new(origin: LayerOrigin, root: Value) -> Self {
        Self { origin, root }
    }

    /// Resolves a dotted key within this layer, checking the agent override
    /// section before the base sections.
    fn lookup(&self, key: &str, agent: Option<&str>) -> Option<&Value> {
        if let Some(agent) = agent
            && let Some(overrides) = self.root.get("agents").and_then(|a| a.get(agent))
            && let Some(found) = lookup_path(overrides, key)
        {
            return Some(found);
        }
        lookup_path(&self.root, key)
    }
}

/// The deep-merged configuration view consumed at runtime.
///
/// Layers are stored lowest-precedence first and frozen at startup; the only
/// mutation path is [`ChatConfig::set`], which writes into a runtime overlay.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    layers: Vec<ConfigLayer>,
    sources: Vec<PathBuf>,
}

impl ChatConfig {
    /// Returns a config consisting only of the built-in defaults.
    pub fn builtin() -> Self {
        let root = serde_yaml::from_str(DEFAULTS).unwrap_or(Value::Mapping(Mapping::new()));
        Self {
            layers: vec![
                ConfigLayer::new(LayerOrigin::Defaults, root),
                ConfigLayer::new(LayerOrigin::Runtime, Value::Mapping(Mapping::new())),
            ],
            sources: Vec::new(),
        }
    }

    /// Files that contributed a layer, in load order.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Returns the raw merged value for a dotted key, if any layer defines it.
    ///
    /// Layers are consulted highest-precedence first; within each layer the
    /// agent override section wins over the base sections.
    pub fn get(&self, key: &str, agent: Option<&str>) -> Option<Value> {
        for layer in self.layers.iter().rev() {
            if let Some(value) = layer.lookup(key, agent) {
                return Some(value.clone());
            }
        }
        None
    }

    /// Updates the in-memory runtime overlay. Never persisted.
    pub fn set(&mut self, key: &str, value: Value, agent: Option<&str>) {
        let overlay = match self
            .layers
            .iter_mut()
            .find(|l| l.origin == LayerOrigin::Runtime)
        {
            Some(layer) => layer,
            None => {
                self.layers.push(ConfigLayer::new(
                    LayerOrigin::Runtime,
                    Value::Mapping(Mapping::new()),
                ));
                self.layers.last_mut().expect("layer just pushed")
            }
        };
        let target = match agent {
            Some(agent) => format!("agents.{agent}.{key}"),
            None => key.to_string(),
        };
        insert_path(&mut overlay.root, &target, value);
    }

    /// Boolean lookup with default; a type conflict falls back to the default
    /// with a warning.
    pub fn get_bool(&self, key: &str, default: bool, agent: Option<&str>) -> bool {
        match self.get(key, agent) {
            Some(Value::Bool(b)) => b,
            Some(other) => {
                warn!(key, value = ?other, "expected bool, using default");
                default
            }
            None => default,
        }
    }

    /// Float lookup with default. Integers coerce to floats.
    pub fn get_f64(&self, key: &str, default: f64, agent: Option<&str>) -> f64 {
        match self.get(key, agent) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(other) => {
                warn!(key, value = ?other, "expected number, using default");
                default
            }
            None => default,
        }
    }

    /// Unsigned integer lookup with default.
    pub fn get_u32(&self, key: &str, default: u32, agent: Option<&str>) -> u32 {
        match self.get(key, agent) {
            Some(Value::Number(n)) => match n.as_u64() {
                Some(v) if v <= u64::from(u32::MAX) => v as u32,
                _ => {
                    warn!(key, "expected non-negative integer, using default");
                    default
                }
            },
            Some(other) => {
                warn!(key, value = ?other, "expected integer, using default");
                default
            }
            None => default,
        }
    }

    /// String lookup with default.
    pub fn get_string(&self, key: &str, default: &str, agent: Option<&str>) -> String {
        match self.get(key, agent) {
            Some(Value::String(s)) => s,
            Some(other) => {
                warn!(key, value = ?other, "expected string, using default");
                default.to_string()
            }
            None => default.to_string(),
        }
    }

    /// Optional string lookup, no default.
    pub fn get_string_opt(&self, key: &str, agent: Option<&str>) -> Option<String> {
        match self.get(key, agent)? {
            Value::String(s) => Some(s),
            other => {
                warn!(key, value = ?other, "expected string, ignoring");
                None
            }
        }
    }

    /// Path lookup with `~` and `$VAR` expansion applied at read time.
    pub fn get_path(&self, key: &str, default: &str, agent: Option<&str>) -> PathBuf {
        PathBuf::from(expand_path(&self.get_string(key, default, agent)))
    }

    /// Returns a named section deep-merged across every layer, including the
    /// per-agent overrides of each layer.
    pub fn section(&self, name: &str, agent: Option<&str>) -> Mapping {
        let mut merged = Value::Mapping(Mapping::new());
        for layer in &self.layers {
            if let Some(base) = lookup_path(&layer.root, name) {
                deep_merge(&mut merged, base);
            }
            if let Some(agent) = agent
                && let Some(overrides) = layer
                    .root
                    .get("agents")
                    .and_then(|a| a.get(agent))
                    .and_then(|o| lookup_path(o, name))
            {
                deep_merge(&mut merged, overrides);
            }
        }
        match merged {
            Value::Mapping(map) => map,
            _ => Mapping::new(),
        }
    }
}

/// Configuration loader with builder-style knobs for discovery.
///
/// The knobs exist so tests can point discovery at a scratch directory
/// instead of the real `$HOME` and working directory.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
    global_path: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    skip_global: bool,
    skip_project: bool,
}

impl ConfigLoader {
    /// Creates a loader with default discovery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the explicit config path (`--config`). Missing file is fatal.
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    /// Overrides the global config path (defaults to `~/.chatrc`).
    pub fn with_global_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_path = Some(path.into());
        self
    }

    /// Overrides the directory project discovery starts from.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Disables the global layer.
    pub fn skip_global(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Disables project discovery.
    pub fn skip_project(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Discovers, parses, and stacks the configuration layers.
    ///
    /// # Errors
    ///
    /// Only an unreadable explicit path is fatal; every other layer is
    /// optional and a syntactically invalid layer is reported and skipped.
    pub fn load(self) -> Result<ChatConfig> {
        let mut config = ChatConfig::builtin();
        // Keep the runtime overlay on top as layers are appended.
        let overlay = config.layers.pop();

        if !self.skip_global {
            let global = self
                .global_path
                .clone()
                .or_else(|| dirs::home_dir().map(|h| h.join(".chatrc")));
            if let Some(path) = global
                && path.exists()
                && let Some(root) = parse_layer(&path)
            {
                config.layers.push(ConfigLayer::new(LayerOrigin::Global, root));
                config.sources.push(path);
            }
        }

        if !self.skip_project
            && let Some(path) = self.discover_project()
            && let Some(root) = parse_layer(&path)
        {
            config.layers.push(ConfigLayer::new(LayerOrigin::Project, root));
            config.sources.push(path);
        }

        if let Some(path) = self.explicit {
            let text = std::fs::read_to_string(&path).map_err(|err| {
                Error::config(
                    format!("cannot read config file {}: {err}", path.display()),
                    Some("pass --config an existing, readable file".to_string()),
                )
            })?;
            match serde_yaml::from_str::<Value>(&text) {
                Ok(root) if root.is_mapping() => {
                    config.layers.push(ConfigLayer::new(LayerOrigin::Explicit, root));
                    config.sources.push(path);
                }
                Ok(_) => warn!(path = %path.display(), "config root is not a mapping, skipping"),
                Err(err) => warn!(path = %path.display(), %err, "invalid config file, skipping"),
            }
        }

        if let Some(overlay) = overlay {
            config.layers.push(overlay);
        }
        debug!(layers = config.layers.len(), "configuration loaded");
        Ok(config)
    }

    fn discover_project(&self) -> Option<PathBuf> {
        let start = self
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())?;
        let mut dir: &Path = &start;
        for _ in 0..=PROJECT_WALK_DEPTH {
            let candidate = dir.join(".chatrc");
            if candidate.is_file() {
                return Some(candidate);
            }
            dir = dir.parent()?;
        }
        None
    }
}

fn parse_layer(path: &Path) -> Option<Value> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot read config file, skipping");
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&text) {
        Ok(root) if root.is_mapping() => Some(root),
        Ok(_) => {
            warn!(path = %path.display(), "config root is not a mapping, skipping");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "invalid config file, skipping");
            None
        }
    }
}

/// Walks a dotted key through nested mappings.
fn lookup_path<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Inserts a value at a dotted key, creating intermediate mappings.
fn insert_path(root: &mut Value, key: &str, value: Value) {
    if !root.is_mapping() {
        *root = Value::Mapping(Mapping::new());
    }
    let mut current = root;
    let parts: Vec<&str> = key.split('.').collect();
    for (idx, part) in parts.iter().enumerate() {
        if current.as_mapping_mut().is_none() {
            *current = Value::Mapping(Mapping::new());
        }
        let map = match current.as_mapping_mut() {
            Some(map) => map,
            None => return,
        };
        let entry = map
            .entry(Value::String((*part).to_string()))
            .or_insert(Value::Mapping(Mapping::new()));
        if idx == parts.len() - 1 {
            *entry = value;
            return;
        }
        current = entry;
    }
}

/// Deep merge: later mappings override per key, scalars and lists are
/// replaced wholesale.
fn deep_merge(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Mapping(dst_map), Value::Mapping(src_map)) => {
            for (key, src_value) in src_map {
                match dst_map.get_mut(key) {
                    Some(dst_value) => deep_merge(dst_value, src_value),
                    None => {
                        dst_map.insert(key.clone(), src_value.clone());
                    }
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

/// Expands a leading `~` and any `$VAR` references in a path string.
pub fn expand_path(raw: &str) -> String {
    let mut text = raw.to_string();
    if text == "~" {
        if let Some(home) = dirs::home_dir() {
            text = home.to_string_lossy().into_owned();
        }
    } else if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        text = home.join(rest).to_string_lossy().into_owned();
    }
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('$') {
        let start = search_from + offset;
        let tail = &text[start + 1..];
        let mut chars = tail.chars();
        if !chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            search_from = start + 1;
            continue;
        }
        let len = 1 + chars
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .count();
        let name = &tail[..len];
        let replacement = std::env::var(name).unwrap_or_default();
        text.replace_range(start..start + 1 + len, &replacement);
        search_from = start + replacement.len();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).expect("write config");
        path
    }

    fn loader_in(dir: &TempDir) -> ConfigLoader {
        ConfigLoader::new()
            .with_global_path(dir.path().join("no-such-rc"))
            .with_working_dir(dir.path())
    }

    #[test]
    fn builtin_defaults() {
        let config = ChatConfig::builtin();
        assert_eq!(config.get_u32("behavior.max_retries", 0, None), 3);
        assert!((config.get_f64("behavior.timeout", 0.0, None) - 120.0).abs() < f64::EPSILON);
        assert!(!config.get_bool("features.auto_save", true, None));
        assert_eq!(config.get_string("behavior.spinner_style", "", None), "dots");
        assert!(config.sources().is_empty());
    }

    #[test]
    fn default_only_when_no_layer_defines_key() {
        let config = ChatConfig::builtin();
        assert_eq!(config.get("behavior.nonexistent", None), None);
        assert_eq!(config.get_u32("behavior.nonexistent", 7, None), 7);
    }

    #[test]
    fn global_layer_overrides_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let global = write_config(dir.path(), "rc", "behavior:\n  max_retries: 5\n");
        let config = ConfigLoader::new()
            .with_global_path(global)
            .skip_project()
            .load()
            .expect("load");
        assert_eq!(config.get_u32("behavior.max_retries", 0, None), 5);
        // Untouched keys still come from defaults.
        assert!((config.get_f64("behavior.retry_delay", 0.0, None) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn project_discovery_walks_up() {
        let dir = TempDir::new().expect("tempdir");
        write_config(dir.path(), ".chatrc", "behavior:\n  timeout: 30\n");
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).expect("mkdirs");
        let config = ConfigLoader::new()
            .with_global_path(dir.path().join("no-such-rc"))
            .with_working_dir(&nested)
            .load()
            .expect("load");
        assert!((config.get_f64("behavior.timeout", 0.0, None) - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn explicit_beats_project() {
        let dir = TempDir::new().expect("tempdir");
        write_config(dir.path(), ".chatrc", "behavior:\n  timeout: 30\n");
        let explicit = write_config(dir.path(), "other.yaml", "behavior:\n  timeout: 60\n");
        let config = loader_in(&dir)
            .with_explicit(explicit)
            .load()
            .expect("load");
        assert!((config.get_f64("behavior.timeout", 0.0, None) - 60.0).abs() < f64::EPSILON);
        assert_eq!(config.sources().len(), 2);
    }

    #[test]
    fn missing_explicit_is_fatal() {
        let dir = TempDir::new().expect("tempdir");
        let err = loader_in(&dir)
            .with_explicit(dir.path().join("nope.yaml"))
            .load()
            .unwrap_err();
        assert_eq!(crate::ErrorCategory::of(&err), crate::ErrorCategory::Configuration);
    }

    #[test]
    fn invalid_layer_is_skipped() {
        let dir = TempDir::new().expect("tempdir");
        write_config(dir.path(), ".chatrc", ": not yaml [\n");
        let config = loader_in(&dir).load().expect("load");
        // Defaults still intact.
        assert_eq!(config.get_u32("behavior.max_retries", 0, None), 3);
        assert!(config.sources().is_empty());
    }

    #[test]
    fn per_agent_override_beats_base() {
        let dir = TempDir::new().expect("tempdir");
        write_config(
            dir.path(),
            ".chatrc",
            concat!(
                "behavior:\n",
                "  timeout: 120\n",
                "agents:\n",
                "  Product Pete:\n",
                "    behavior:\n",
                "      timeout: 5\n",
            ),
        );
        let config = loader_in(&dir).load().expect("load");
        assert!(
            (config.get_f64("behavior.timeout", 0.0, Some("Product Pete")) - 5.0).abs()
                < f64::EPSILON
        );
        assert!(
            (config.get_f64("behavior.timeout", 0.0, Some("Data Daniel")) - 120.0).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn lower_layer_agent_override_loses_to_higher_base() {
        let dir = TempDir::new().expect("tempdir");
        let global = write_config(
            dir.path(),
            "global.yaml",
            concat!(
                "agents:\n",
                "  Pete:\n",
                "    behavior:\n",
                "      timeout: 5\n",
            ),
        );
        let explicit = write_config(dir.path(), "explicit.yaml", "behavior:\n  timeout: 90\n");
        let config = ConfigLoader::new()
            .with_global_path(global)
            .skip_project()
            .with_explicit(explicit)
            .load()
            .expect("load");
        // Explicit base outranks the global layer's agent override.
        assert!((config.get_f64("behavior.timeout", 0.0, Some("Pete")) - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn type_conflict_falls_back_to_default() {
        let dir = TempDir::new().expect("tempdir");
        write_config(dir.path(), ".chatrc", "features:\n  auto_save: \"yes please\"\n");
        let config = loader_in(&dir).load().expect("load");
        assert!(!config.get_bool("features.auto_save", false, None));
    }

    #[test]
    fn unknown_keys_are_preserved() {
        let dir = TempDir::new().expect("tempdir");
        write_config(dir.path(), ".chatrc", "custom:\n  anything: 42\n");
        let config = loader_in(&dir).load().expect("load");
        assert_eq!(config.get_u32("custom.anything", 0, None), 42);
    }

    #[test]
    fn runtime_set_wins_and_is_in_memory_only() {
        let mut config = ChatConfig::builtin();
        config.set("behavior.timeout", Value::from(7.5), None);
        assert!((config.get_f64("behavior.timeout", 0.0, None) - 7.5).abs() < f64::EPSILON);
        config.set("behavior.timeout", Value::from(9.0), Some("Pete"));
        assert!((config.get_f64("behavior.timeout", 0.0, Some("Pete")) - 9.0).abs() < f64::EPSILON);
        assert!((config.get_f64("behavior.timeout", 0.0, None) - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn section_merges_layers_and_agent_overrides() {
        let dir = TempDir::new().expect("tempdir");
        write_config(
            dir.path(),
            ".chatrc",
            concat!(
                "colors:\n",
                "  user: \"\\e[31m\"\n",
                "agents:\n",
                "  Pete:\n",
                "    colors:\n",
                "      agent: \"\\e[35m\"\n",
            ),
        );
        let config = loader_in(&dir).load().expect("load");
        let colors = config.section("colors", Some("Pete"));
        assert_eq!(
            colors.get("user").and_then(Value::as_str),
            Some("\u{1b}[31m")
        );
        assert_eq!(
            colors.get("agent").and_then(Value::as_str),
            Some("\u{1b}[35m")
        );
        // Default keys survive the merge.
        assert!(colors.get("reset").is_some());
    }

    #[test]
    fn lists_replace_wholesale() {
        let mut dst: Value = serde_yaml::from_str("items: [1, 2, 3]").expect("yaml");
        let src: Value = serde_yaml::from_str("items: [9]").expect("yaml");
        deep_merge(&mut dst, &src);
        let items = dst.get("items").and_then(Value::as_sequence).expect("seq");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn expand_tilde_and_vars() {
        unsafe { std::env::set_var("CONFAB_TEST_DIR", "/tmp/confab") };
        assert_eq!(expand_path("$CONFAB_TEST_DIR/logs"), "/tmp/confab/logs");
        let home = dirs::home_dir().expect("home");
        assert_eq!(
            expand_path("~/x"),
            home.join("x").to_string_lossy().into_owned()
        );
        assert_eq!(expand_path("/plain/path"), "/plain/path");
        // A bare dollar sign does not stop later expansion.
        assert_eq!(
            expand_path("costs $5 under $CONFAB_TEST_DIR"),
            "costs $5 under /tmp/confab"
        );
    }
}
