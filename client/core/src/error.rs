//! Error Types
//!
//! Error taxonomy for one stream session. All of these are local to a
//! single session: the transcript stays usable for a subsequent send.
//!
//! Malformed frame payloads are deliberately absent here; they degrade to
//! best-effort text content in the classifier and reducer instead of
//! surfacing as errors.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the transport and session layers
#[derive(Debug, Error)]
pub enum StreamError {
    /// The service answered with a non-success HTTP status
    #[error("service returned {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body text
        body: String,
    },

    /// Connect or read failure on the underlying transport
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    /// The session was cancelled; never surfaced as a user-visible error
    #[error("stream cancelled")]
    Cancelled,

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl StreamError {
    /// Whether this error represents cancellation rather than a failure
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
