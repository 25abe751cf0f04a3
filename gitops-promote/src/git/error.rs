//! Git working-copy error types.

use thiserror::Error;

/// Errors that can occur while driving the local git client.
#[derive(Debug, Error)]
pub enum GitError {
    /// Failed to spawn the git binary.
    #[error("Failed to execute git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Git exited with a non-zero status.
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// A git URL could not be parsed into host/owner/repo.
    #[error("Failed to parse git URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}
