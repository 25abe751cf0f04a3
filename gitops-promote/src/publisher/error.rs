//! Pull request publishing error types.

use crate::dependency::DependencyError;
use crate::git::GitError;
use crate::provider::ProviderError;
use thiserror::Error;

/// Errors that can occur while applying changes and publishing a PR.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// Failed to read or write a file in the working copy.
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A change applier was configured with an invalid regex.
    #[error("Invalid pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A change applier was configured with an invalid file glob.
    #[error("Invalid glob '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A YAML file in the working copy could not be parsed or rewritten.
    #[error("Failed to process '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A chart dependency the change applier expected was not declared.
    #[error("No dependency named '{name}' in {path}")]
    MissingDependency { name: String, path: String },
}
