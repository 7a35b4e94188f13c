//! Error types for medinfo.
//!
//! Library crates use [`MedinfoError`] via `thiserror` for failures that stop
//! an operation (startup, config, dataset loading). Remote model calls report
//! [`ServiceError`] instead, which the resolver always recovers from.
//! App crates (cli/tui) wrap both with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for medinfo operations that can fail the process.
#[derive(Debug, thiserror::Error)]
pub enum MedinfoError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while initializing a remote client.
    #[error("network error: {0}")]
    Network(String),

    /// Dataset loading error (missing column, bad row, out-of-range value).
    #[error("dataset error: {message}")]
    Dataset { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MedinfoError>;

impl MedinfoError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a dataset error from any displayable message.
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a single call to a remote model tier.
///
/// Never propagated out of query resolution: a `ServiceError` from the
/// medical tier advances to the next tier, and one from the generic tier is
/// rendered with [`ServiceError::user_message`] and shown to the user.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// Connection failure, DNS error, body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body could not be parsed or lacked the expected fields.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The body parsed but carried no answer candidates.
    #[error("response contained no candidates")]
    NoCandidates,

    /// The remote side reported an error of its own (e.g. a failed job).
    #[error("remote error: {0}")]
    Remote(String),

    /// The call did not finish within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The call was cancelled by the user.
    #[error("cancelled")]
    Cancelled,
}

impl ServiceError {
    /// Plain-language text shown to the user when this error is terminal.
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { status, body } => format!(
                "Error fetching information from the generic model: {status} - {body}"
            ),
            Self::Malformed(_) => {
                "I'm sorry, there was an error processing your request.".to_string()
            }
            Self::NoCandidates => {
                "I'm sorry, but I couldn't retrieve the information you requested.".to_string()
            }
            Self::Transport(msg) | Self::Remote(msg) => {
                format!("Error fetching information from the generic model: {msg}")
            }
            Self::Timeout(after) => format!(
                "The generic model did not answer within {} seconds. Please try again.",
                after.as_secs()
            ),
            Self::Cancelled => "Request cancelled.".to_string(),
        }
    }

    /// Whether this is a transport-level failure rather than a bad answer.
    ///
    /// Only used to pick log levels; user-facing behavior is identical.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = MedinfoError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = MedinfoError::dataset("missing column `Uses`");
        assert!(err.to_string().contains("missing column"));
    }

    #[test]
    fn status_user_message_embeds_code_and_body() {
        let err = ServiceError::Status {
            status: 429,
            body: "quota exceeded".into(),
        };
        let msg = err.user_message();
        assert!(msg.contains("429"));
        assert!(msg.contains("quota exceeded"));
    }

    #[test]
    fn no_candidates_has_fixed_message() {
        assert_eq!(
            ServiceError::NoCandidates.user_message(),
            "I'm sorry, but I couldn't retrieve the information you requested."
        );
    }

    #[test]
    fn transport_classification() {
        assert!(ServiceError::Transport("refused".into()).is_transport());
        assert!(ServiceError::Timeout(Duration::from_secs(3)).is_transport());
        assert!(!ServiceError::NoCandidates.is_transport());
        assert!(!ServiceError::Malformed("eof".into()).is_transport());
    }
}
