use std::path::PathBuf;

use client::ClientError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the automation facade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The remote answered, but not with the shape the call expects.
    #[error("unexpected response to '{method}': {detail}")]
    UnexpectedResponse { method: String, detail: String },

    #[error("invalid key combination '{0}'")]
    InvalidKey(String),

    #[error("reference screenshot not found: {}", .0.display())]
    MissingReference(PathBuf),

    #[error(
        "screenshot does not match {}: similarity {similarity:.4}, required {threshold:.4}",
        reference.display()
    )]
    ScreenshotMismatch {
        reference: PathBuf,
        similarity: f64,
        threshold: f64,
    },

    #[error("comparing screenshots failed")]
    Compare(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether a poller should keep trying after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Client(e) => e.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn unexpected(method: &str, detail: impl Into<String>) -> Self {
        Error::UnexpectedResponse {
            method: method.to_string(),
            detail: detail.into(),
        }
    }
}
