//! Promotion error types.

use crate::config::ConfigError;
use crate::provider::ProviderError;
use crate::publisher::PublishError;
use crate::tracker::TrackerError;
use crate::watch::WatchError;
use thiserror::Error;

/// Errors that can occur while promoting an application.
#[derive(Debug, Error)]
pub enum PromoteError {
    /// No application name was supplied.
    #[error("No application name was given")]
    MissingApplication,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Failed to spawn the helm binary.
    #[error("Failed to run '{command}': {source}")]
    HelmSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Helm ran but reported an error.
    #[error("'{command}' failed: {stderr}")]
    HelmFailed { command: String, stderr: String },

    /// Helm produced output the engine could not parse.
    #[error("Could not parse output of '{command}': {source}")]
    HelmOutput {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    /// No version was given and none could be found in the helm repository.
    #[error("Could not find a version for application '{application}'")]
    NoVersion { application: String },

    /// The operator declined the confirmation prompt.
    #[error("Promotion to '{environment}' aborted")]
    Aborted { environment: String },

    /// Reading the confirmation prompt failed.
    #[error("Failed to read confirmation: {0}")]
    Prompt(#[source] std::io::Error),
}
