//! Error types for the confab chat loop.
//!
//! This module defines the crate-wide error type plus the coarser
//! [`ErrorCategory`] taxonomy that drives retry and display decisions.

use std::error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// The main error type for the chat loop.
#[derive(Clone, Debug)]
pub enum Error {
    /// An agent attempt exceeded its deadline.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// The agent's backend is rate limiting us.
    RateLimit {
        /// Human-readable error message.
        message: String,
        /// Time to wait before retrying, in seconds.
        retry_after: Option<u64>,
    },

    /// Network-family failure (reset, DNS, unreachable).
    Connection {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Invalid configuration or invalid request parameters.
    Config {
        /// Human-readable error message.
        message: String,
        /// Actionable remediation hint shown to the user.
        hint: Option<String>,
    },

    /// The user interrupted an in-flight operation.
    Interrupted {
        /// Human-readable error message.
        message: String,
    },

    /// Opaque failure raised by the agent.
    ///
    /// These carry only a message; [`ErrorCategory::of`] inspects the text
    /// to decide whether the failure is retryable.
    Agent {
        /// Human-readable error message.
        message: String,
    },

    /// A prompt template could not be loaded.
    Template {
        /// Human-readable error message.
        message: String,
        /// Name of the offending template.
        name: Option<String>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },

    /// Error during serialization or deserialization.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new rate limit error.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new connection error.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>, hint: Option<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint,
        }
    }

    /// Creates a new interrupted error.
    pub fn interrupted(message: impl Into<String>) -> Self {
        Error::Interrupted {
            message: message.into(),
        }
    }

    /// Creates a new opaque agent error.
    pub fn agent(message: impl Into<String>) -> Self {
        Error::Agent {
            message: message.into(),
        }
    }

    /// Creates a new template error.
    pub fn template(message: impl Into<String>, name: Option<String>) -> Self {
        Error::Template {
            message: message.into(),
            name,
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if this error is related to rate limiting.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimit { .. })
    }

    /// Returns true if this error was caused by a user interrupt.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted { .. })
    }

    /// Returns true if retrying the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        ErrorCategory::of(self).is_retryable()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timeout: {message} ({duration} seconds)")
                } else {
                    write!(f, "Timeout: {message}")
                }
            }
            Error::RateLimit {
                message,
                retry_after,
            } => {
                if let Some(retry_after) = retry_after {
                    write!(
                        f,
                        "Rate limit exceeded: {message} (retry after {retry_after} seconds)"
                    )
                } else {
                    write!(f, "Rate limit exceeded: {message}")
                }
            }
            Error::Connection { message, .. } => {
                write!(f, "Connection error: {message}")
            }
            Error::Config { message, hint } => {
                if let Some(hint) = hint {
                    write!(f, "Configuration error: {message} (hint: {hint})")
                } else {
                    write!(f, "Configuration error: {message}")
                }
            }
            Error::Interrupted { message } => {
                write!(f, "Interrupted: {message}")
            }
            Error::Agent { message } => {
                write!(f, "Agent error: {message}")
            }
            Error::Template { message, name } => {
                if let Some(name) = name {
                    write!(f, "Template error ({name}): {message}")
                } else {
                    write!(f, "Template error: {message}")
                }
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source),
            Error::Serialization { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("YAML error: {err}"), Some(Box::new(err)))
    }
}

/// A specialized Result type for chat loop operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure taxonomy driving retry and display decisions.
///
/// Every [`Error`] maps to exactly one category. Opaque agent errors are
/// classified by message text, since the agent's error types are invisible
/// across the invocation boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    /// Network-family failure; retryable.
    TransientNetwork,
    /// Backend rate limiting; retryable with doubled base delay.
    RateLimited,
    /// Attempt exceeded its deadline; retryable.
    Timeout,
    /// Invalid configuration or parameters; not retryable.
    Configuration,
    /// User interrupt; not retryable, not rendered as an error.
    Cancelled,
    /// Everything else; not retryable.
    Fatal,
}

impl ErrorCategory {
    /// Classifies an error into its category.
    pub fn of(err: &Error) -> Self {
        match err {
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::RateLimit { .. } => ErrorCategory::RateLimited,
            Error::Connection { .. } => ErrorCategory::TransientNetwork,
            Error::Config { .. } => ErrorCategory::Configuration,
            Error::Interrupted { .. } => ErrorCategory::Cancelled,
            Error::Agent { message } => Self::of_message(message),
            Error::Template { .. } | Error::Io { .. } | Error::Serialization { .. } => {
                ErrorCategory::Fatal
            }
        }
    }

    /// Classifies an opaque error message by its text.
    pub fn of_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("ended prematurely")
        {
            ErrorCategory::Timeout
        } else if lower.contains("rate limit") || lower.contains("throttl") || lower.contains("429")
        {
            ErrorCategory::RateLimited
        } else if lower.contains("connection reset")
            || lower.contains("connection refused")
            || lower.contains("connection error")
            || lower.contains("dns")
            || lower.contains("unreachable")
            || lower.contains("broken pipe")
        {
            ErrorCategory::TransientNetwork
        } else if lower.contains("isn't supported")
            || lower.contains("is not supported")
            || lower.contains("unsupported")
            || lower.contains("invalid argument")
            || lower.contains("validation")
        {
            ErrorCategory::Configuration
        } else {
            ErrorCategory::Fatal
        }
    }

    /// Returns true if an error in this category is worth retrying.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::TransientNetwork | ErrorCategory::RateLimited | ErrorCategory::Timeout
        )
    }

    /// Short label used in user-visible failure lines.
    pub fn label(self) -> &'static str {
        match self {
            ErrorCategory::TransientNetwork => "network",
            ErrorCategory::RateLimited => "rate-limited",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Fatal => "fatal",
        }
    }

    /// Remediation hint printed after a final failure, if any.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            ErrorCategory::TransientNetwork => Some("Check your network connection."),
            ErrorCategory::RateLimited => Some("Rate limit persists. Please wait and try again."),
            ErrorCategory::Timeout => Some("Max retries reached. Please try again later."),
            ErrorCategory::Configuration => {
                Some("Check the model identifier and agent configuration.")
            }
            ErrorCategory::Cancelled | ErrorCategory::Fatal => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_categories() {
        assert_eq!(
            ErrorCategory::of(&Error::timeout("slow", Some(120.0))),
            ErrorCategory::Timeout
        );
        assert_eq!(
            ErrorCategory::of(&Error::rate_limit("slow down", None)),
            ErrorCategory::RateLimited
        );
        assert_eq!(
            ErrorCategory::of(&Error::connection("reset", None)),
            ErrorCategory::TransientNetwork
        );
        assert_eq!(
            ErrorCategory::of(&Error::config("bad model", None)),
            ErrorCategory::Configuration
        );
        assert_eq!(
            ErrorCategory::of(&Error::interrupted("ctrl-c")),
            ErrorCategory::Cancelled
        );
    }

    #[test]
    fn message_classification() {
        assert_eq!(
            ErrorCategory::of_message("request timed out after 120s"),
            ErrorCategory::Timeout
        );
        assert_eq!(
            ErrorCategory::of_message("response ended prematurely"),
            ErrorCategory::Timeout
        );
        assert_eq!(
            ErrorCategory::of_message("HTTP 429 Too Many Requests"),
            ErrorCategory::RateLimited
        );
        assert_eq!(
            ErrorCategory::of_message("ThrottlingException: slow down"),
            ErrorCategory::RateLimited
        );
        assert_eq!(
            ErrorCategory::of_message("connection reset by peer"),
            ErrorCategory::TransientNetwork
        );
        assert_eq!(
            ErrorCategory::of_message("the model ID foo isn't supported"),
            ErrorCategory::Configuration
        );
        assert_eq!(
            ErrorCategory::of_message("something exploded"),
            ErrorCategory::Fatal
        );
    }

    #[test]
    fn retryability() {
        assert!(Error::timeout("t", None).is_retryable());
        assert!(Error::rate_limit("r", None).is_retryable());
        assert!(Error::connection("c", None).is_retryable());
        assert!(!Error::config("bad", None).is_retryable());
        assert!(!Error::interrupted("i").is_retryable());
        assert!(!Error::agent("boom").is_retryable());
        assert!(Error::agent("socket timeout").is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = Error::timeout("attempt exceeded deadline", Some(30.0));
        assert!(err.to_string().contains("30"));
        let err = Error::config("unknown model", Some("check model identifier".to_string()));
        assert!(err.to_string().contains("hint"));
    }
}
