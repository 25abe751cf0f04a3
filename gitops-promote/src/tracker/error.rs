//! Activity tracking error types.

use thiserror::Error;

/// Errors from reading or writing the promotion activity store.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The backing store rejected a read or write.
    #[error("Activity store failure for '{name}': {message}")]
    Store { name: String, message: String },
}
