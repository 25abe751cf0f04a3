//! Environment configuration loading.
//!
//! This module parses the environments TOML file that describes the
//! deployment targets promotions flow through.

mod environment;
mod error;

pub use environment::{Environment, EnvironmentKind, EnvironmentSource, PromotionStrategy};
pub use error::ConfigError;

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct EnvironmentsFile {
    #[serde(default)]
    environments: Vec<Environment>,
}

/// Loads environment definitions from a TOML file.
///
/// The file structure is:
/// ```toml
/// [[environments]]
/// name = "staging"
/// namespace = "apps-staging"
/// kind = "permanent"
/// promotion-strategy = "automatic"
/// order = 100
///
/// [environments.source]
/// url = "https://github.com/acme/environment-staging.git"
/// ref = "master"
/// ```
///
/// Environments are returned sorted by their `order`, the succession used
/// when promoting through all automatic environments.
///
/// # Errors
///
/// Returns an error if the file is missing or malformed, if two
/// environments share a name, or if an environment has an empty name or
/// namespace.
pub fn load_environments(path: &Path) -> Result<Vec<Environment>, ConfigError> {
    info!(path = %path.display(), "Loading environments");

    if !path.exists() {
        return Err(ConfigError::MissingFile {
            path: path.display().to_string(),
        });
    }

    let data = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        source: e,
    })?;
    let file: EnvironmentsFile = toml::from_str(&data).map_err(|e| ConfigError::TomlError {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut environments = file.environments;
    for env in &environments {
        if env.name.is_empty() {
            return Err(ConfigError::ValidationError {
                name: env.name.clone(),
                message: "name must not be empty".to_string(),
            });
        }
        if env.namespace.is_empty() {
            return Err(ConfigError::ValidationError {
                name: env.name.clone(),
                message: "namespace must not be empty".to_string(),
            });
        }
        if environments.iter().filter(|e| e.name == env.name).count() > 1 {
            return Err(ConfigError::ValidationError {
                name: env.name.clone(),
                message: "duplicate environment name".to_string(),
            });
        }
    }
    environments.sort_by_key(|e| e.order);

    debug!(count = environments.len(), "Loaded environments");
    Ok(environments)
}

/// Finds the environment matching `query` by name or label.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownEnvironment`] when nothing matches.
pub fn find_environment<'a>(
    environments: &'a [Environment],
    query: &str,
) -> Result<&'a Environment, ConfigError> {
    environments
        .iter()
        .find(|e| e.matches(query))
        .ok_or_else(|| ConfigError::UnknownEnvironment {
            name: query.to_string(),
        })
}

/// Permanent environments with an automatic promotion strategy, in
/// promotion order. These are the targets of an all-automatic promotion.
#[must_use]
pub fn automatic_environments(environments: &[Environment]) -> Vec<&Environment> {
    environments
        .iter()
        .filter(|e| e.kind.is_permanent() && e.promotion_strategy == PromotionStrategy::Automatic)
        .collect()
}
