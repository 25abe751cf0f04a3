//! Dependency matrix error types.

use thiserror::Error;

/// Errors while reading, writing or expanding dependency update data.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// Failed to read or write a matrix file.
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse or render YAML.
    #[error("Failed to parse YAML in '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Failed to download an upstream dependency-updates asset.
    #[error("Failed to fetch dependency updates from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
