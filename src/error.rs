//! Error types for pdfgloss.

use std::io;
use thiserror::Error;

/// Result type alias for pdfgloss operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while annotating a document.
///
/// Only [`Error::UnreadableDocument`], [`Error::WriteError`], [`Error::Config`]
/// and [`Error::MissingCredentials`] abort a run. The model-facing variants are
/// demoted to per-chunk skips by the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is encrypted, corrupted, not a PDF, or has no text layer.
    #[error("Unreadable document: {0}")]
    UnreadableDocument(String),

    /// Transient failure talking to the model endpoint.
    #[error("Upstream error{}: {message}", status_suffix(.status))]
    Upstream {
        /// HTTP status, when a response was received at all
        status: Option<u16>,
        /// Human-readable cause
        message: String,
    },

    /// The model endpoint refused the request and retrying will not help.
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status of the refusal
        status: u16,
        /// Response body or cause
        message: String,
    },

    /// The model answered with something that is not the expected JSON.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// The annotated document could not be written.
    #[error("Cannot write output: {0}")]
    WriteError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No API key was supplied by flag, environment, or config file.
    #[error("No API key configured (use --api-key, OPENAI_API_KEY, or api_key in the config file)")]
    MissingCredentials,

    /// The run was interrupted before the request could be sent.
    #[error("Interrupted before the request was sent")]
    Cancelled,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl Error {
    /// Whether this error ends the whole run rather than a single chunk.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::UnreadableDocument(_)
                | Error::WriteError(_)
                | Error::Config(_)
                | Error::MissingCredentials
        )
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => {
                Error::UnreadableDocument("document is encrypted".to_string())
            }
            _ => Error::UnreadableDocument(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnreadableDocument("document is encrypted".into());
        assert_eq!(
            err.to_string(),
            "Unreadable document: document is encrypted"
        );

        let err = Error::Upstream {
            status: Some(503),
            message: "service unavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "Upstream error (HTTP 503): service unavailable"
        );

        let err = Error::Upstream {
            status: None,
            message: "timed out".into(),
        };
        assert_eq!(err.to_string(), "Upstream error: timed out");
    }

    #[test]
    fn test_terminal_classification() {
        assert!(Error::WriteError("read-only".into()).is_terminal());
        assert!(Error::MissingCredentials.is_terminal());
        assert!(!Error::MalformedResponse("not json".into()).is_terminal());
        assert!(!Error::Cancelled.is_terminal());
        assert!(!Error::Upstream {
            status: None,
            message: "reset".into()
        }
        .is_terminal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
