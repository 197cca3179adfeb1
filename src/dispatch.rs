//! Input classification for the chat loop.
//!
//! Each completed user input is classified as a builtin command, a template
//! invocation, the multi-line initiator, or an ordinary prompt. Builtins are
//! handled locally and never reach the agent.

/// A builtin command recognized at the prompt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Builtin {
    /// Print the command table.
    Help,
    /// Print agent name, model, tools, and enabled features.
    Info,
    /// List discovered prompt templates.
    Templates,
    /// Clear the terminal and reset the agent session.
    Clear,
    /// End the REPL.
    Exit,
}

/// What a completed user input turned out to be.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InputClassification {
    /// Blank after trimming; ignored.
    Empty,
    /// The `\\` initiator; the editor takes over until multi-line completes.
    MultiLine,
    /// A builtin command.
    Builtin(Builtin),
    /// `/name trailing context`.
    Template {
        /// Template name (token after the slash).
        name: String,
        /// Stripped remainder of the line.
        context: String,
    },
    /// An ordinary prompt for the agent.
    Prompt(String),
}

/// Classifies one completed user input.
///
/// Rules are applied in order: empty, multi-line initiator, builtin
/// (case-insensitive; `quit` and `bye` alias `exit`), template invocation,
/// ordinary prompt.
pub fn classify(input: &str) -> InputClassification {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return InputClassification::Empty;
    }
    if trimmed == "\\\\" {
        return InputClassification::MultiLine;
    }
    match trimmed.to_lowercase().as_str() {
        "help" => return InputClassification::Builtin(Builtin::Help),
        "info" => return InputClassification::Builtin(Builtin::Info),
        "templates" => return InputClassification::Builtin(Builtin::Templates),
        "clear" => return InputClassification::Builtin(Builtin::Clear),
        "exit" | "quit" | "bye" => return InputClassification::Builtin(Builtin::Exit),
        _ => {}
    }
    if let Some(rest) = trimmed.strip_prefix('/')
        && rest
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
    {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default().to_string();
        let context = parts.next().map(str::trim).unwrap_or_default().to_string();
        return InputClassification::Template { name, context };
    }
    InputClassification::Prompt(trimmed.to_string())
}

/// Returns the command table shown by `help` and the banner.
pub fn help_text() -> &'static str {
    r#"Commands:
  help      - Show this help message
  info      - Show detailed agent information
  templates - List available prompt templates
  /name     - Use prompt template from ~/.prompts/name.md
  clear     - Clear screen and reset agent session
  exit      - Exit the chat (also: quit)"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_inputs() {
        assert_eq!(classify(""), InputClassification::Empty);
        assert_eq!(classify("   "), InputClassification::Empty);
        assert_eq!(classify("\t"), InputClassification::Empty);
    }

    #[test]
    fn multiline_initiator() {
        assert_eq!(classify("\\\\"), InputClassification::MultiLine);
        assert_eq!(classify("  \\\\  "), InputClassification::MultiLine);
        // A single backslash is just a prompt.
        assert_eq!(
            classify("\\"),
            InputClassification::Prompt("\\".to_string())
        );
    }

    #[test]
    fn builtins_case_insensitive() {
        assert_eq!(classify("help"), InputClassification::Builtin(Builtin::Help));
        assert_eq!(classify("HELP"), InputClassification::Builtin(Builtin::Help));
        assert_eq!(classify("info"), InputClassification::Builtin(Builtin::Info));
        assert_eq!(
            classify("templates"),
            InputClassification::Builtin(Builtin::Templates)
        );
        assert_eq!(
            classify("clear"),
            InputClassification::Builtin(Builtin::Clear)
        );
        assert_eq!(classify("exit"), InputClassification::Builtin(Builtin::Exit));
        assert_eq!(classify("Quit"), InputClassification::Builtin(Builtin::Exit));
        assert_eq!(classify("bye"), InputClassification::Builtin(Builtin::Exit));
    }

    #[test]
    fn template_invocations() {
        assert_eq!(
            classify("/review code X"),
            InputClassification::Template {
                name: "review".to_string(),
                context: "code X".to_string(),
            }
        );
        assert_eq!(
            classify("/review"),
            InputClassification::Template {
                name: "review".to_string(),
                context: String::new(),
            }
        );
        assert_eq!(
            classify("/summary   trailing spaces   "),
            InputClassification::Template {
                name: "summary".to_string(),
                context: "trailing spaces".to_string(),
            }
        );
    }

    #[test]
    fn bare_slash_is_a_prompt() {
        assert_eq!(classify("/"), InputClassification::Prompt("/".to_string()));
        assert_eq!(
            classify("/ leading space"),
            InputClassification::Prompt("/ leading space".to_string())
        );
    }

    #[test]
    fn ordinary_prompts() {
        assert_eq!(
            classify("hello there"),
            InputClassification::Prompt("hello there".to_string())
        );
        // A builtin word with trailing content is a prompt, not a command.
        assert_eq!(
            classify("help me write a poem"),
            InputClassification::Prompt("help me write a poem".to_string())
        );
    }

    #[test]
    fn builtins_never_reach_the_agent() {
        for word in ["help", "info", "templates", "clear", "exit", "quit", "bye"] {
            assert!(matches!(
                classify(word),
                InputClassification::Builtin(_)
            ));
        }
    }

    #[test]
    fn help_text_lists_commands() {
        let help = help_text();
        for word in ["help", "info", "templates", "clear", "exit"] {
            assert!(help.contains(word));
        }
    }
}
