//! Merge watch error types.

use crate::publisher::PublishError;
use crate::tracker::TrackerError;
use std::time::Duration;
use thiserror::Error;

/// Terminal outcomes of watching a promotion pull request.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// The PR was closed by someone without being merged.
    #[error("Pull request {url} was closed without merging")]
    ClosedWithoutMerge { url: String },

    /// A commit status reported error or failure.
    #[error("Commit status '{context}' failed: {description}")]
    StatusFailed { context: String, description: String },

    /// The configured wait duration elapsed before the promotion landed.
    #[error("Timed out waiting {} for pull request {url} to merge and deploy", format_duration(*timeout))]
    TimedOut { url: String, timeout: Duration },

    /// A caller-supplied hook failed terminally.
    #[error("Watch hook failed: {message}")]
    Hook { message: String },

    /// The watch was cancelled by the operator.
    #[error("Watch cancelled")]
    Cancelled,
}

pub(crate) fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
