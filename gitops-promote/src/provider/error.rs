//! Git provider error types.

use thiserror::Error;

/// Errors from talking to a git provider API.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// GitHub API error.
    #[error("GitHub API error: {0}")]
    GitHub(#[from] octocrab::Error),

    /// The provider response was missing a field the engine requires.
    #[error("Provider response for {operation} was missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    /// The authenticated user could not be resolved.
    #[error("Could not resolve the authenticated provider user: {message}")]
    NoUser { message: String },
}
