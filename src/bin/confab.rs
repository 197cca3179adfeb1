//! Interactive chat with a pluggable agent.
//!
//! # Usage
//!
//! ```bash
//! # Chat with an agent defined in YAML
//! confab --agent agents/product_pete.yaml
//!
//! # Override the discovered configuration file
//! confab --agent agents/product_pete.yaml --config ./team.chatrc
//! ```
//!
//! The agent definition names the command to run per prompt; see
//! [`confab::AgentSpec`]. While chatting: `help`, `info`, `templates`,
//! `/name` for templates, `clear`, and `exit`/`quit`.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use confab::{AgentSpec, ChatLoop, ConfigLoader, Palette, Role};

/// Command-line arguments for the confab binary.
#[derive(CommandLine, Debug, Default, Eq, PartialEq)]
struct ChatArgs {
    /// Path to the agent definition YAML.
    #[arrrg(optional, "Path to the agent definition YAML (required)", "PATH")]
    agent: Option<String>,

    /// Explicit configuration file.
    #[arrrg(optional, "Path to a configuration file (default: ~/.chatrc)", "PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let (args, _free) =
        ChatArgs::from_command_line_relaxed("USAGE: confab --agent <path> [--config <path>]");
    let Some(agent_path) = args.agent else {
        eprintln!("confab: --agent <path> is required");
        eprintln!("USAGE: confab --agent <path> [--config <path>]");
        std::process::exit(1);
    };

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_explicit(path);
    }
    let config = match loader.load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("confab: {err}");
            std::process::exit(1);
        }
    };

    let spec = match AgentSpec::load(std::path::Path::new(&agent_path)) {
        Ok(spec) => spec,
        Err(err) => {
            eprintln!("confab: {err}");
            std::process::exit(1);
        }
    };

    init_logging(&config, &spec.name);

    let palette = Palette::from_config(&config, Some(&spec.name));
    for source in config.sources() {
        println!(
            "{}",
            palette.paint(
                Role::System,
                &format!("Loaded configuration from: {}", source.display()),
            )
        );
    }
    println!(
        "{}",
        palette.paint(Role::System, &format!("Loading agent from: {agent_path}"))
    );

    let mut chat = match ChatLoop::new(config, Box::new(spec.clone())) {
        Ok(chat) => chat,
        Err(err) => {
            eprintln!("confab: {err}");
            std::process::exit(1);
        }
    };
    println!(
        "{}",
        palette.paint(
            Role::Success,
            &format!("Agent loaded successfully: {}", spec.name),
        )
    );

    let interrupted = chat.interrupt_flag();
    if let Err(err) = ctrlc::set_handler(move || {
        interrupted.store(true, Ordering::Relaxed);
    }) {
        eprintln!("confab: cannot install interrupt handler: {err}");
    }

    if let Err(err) = chat.run().await {
        eprintln!("confab: {err}");
        std::process::exit(1);
    }
}

/// Routes diagnostics to a per-agent log file under `paths.log_location`.
fn init_logging(config: &confab::ChatConfig, agent_name: &str) {
    let log_dir = config.get_path("paths.log_location", ".logs", Some(agent_name));
    if std::fs::create_dir_all(&log_dir).is_err() {
        return;
    }
    let file_name = format!(
        "{}_chat.log",
        agent_name.to_lowercase().replace(' ', "_")
    );
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(file_name))
    else {
        return;
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
}
