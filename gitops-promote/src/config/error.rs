//! Configuration error types.

use thiserror::Error;

/// Errors that can occur while loading environment definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file.
    #[error("Failed to read file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML content.
    #[error("Failed to parse environments file '{path}': {source}")]
    TomlError {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// Validation error in an environment definition.
    #[error("Invalid environment '{name}': {message}")]
    ValidationError { name: String, message: String },

    /// Missing required file.
    #[error("Missing required file: {path}")]
    MissingFile { path: String },

    /// No environment matches the requested name or label.
    #[error("No environment found matching '{name}'")]
    UnknownEnvironment { name: String },
}
