//! Change appliers: the pluggable edits a pull request carries.
//!
//! Each applier rewrites files in a working copy and reports the version
//! strings it replaced, which feed the commit message and PR body.

use crate::delta::describe_old_versions;
use crate::git::{GitRepoRef, Gitter};
use crate::publisher::PublishError;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// An edit applied to a cloned repository before publishing a PR.
#[async_trait]
pub trait ChangeFiles: Send + Sync {
    /// Applies the change under `dir`, returning the replaced old versions.
    async fn apply(&self, dir: &Path, repo: &GitRepoRef) -> Result<Vec<String>, PublishError>;
}

/// Rewrites every match of a regex across a glob of files.
///
/// When the pattern contains a named capture group `version`, only that
/// group is replaced and its old text is reported; otherwise the whole
/// match is.
pub struct RegexChange {
    /// Regex to search for, optionally with a `(?P<version>...)` group.
    pub pattern: String,

    /// Glob of files to edit, relative to the working copy root.
    pub files: String,

    /// Replacement version string.
    pub version: String,
}

#[async_trait]
impl ChangeFiles for RegexChange {
    async fn apply(&self, dir: &Path, _repo: &GitRepoRef) -> Result<Vec<String>, PublishError> {
        let re = Regex::new(&self.pattern).map_err(|e| PublishError::Regex {
            pattern: self.pattern.clone(),
            source: e,
        })?;
        let glob_pattern = dir.join(&self.files).display().to_string();
        let paths = glob::glob(&glob_pattern).map_err(|e| PublishError::Glob {
            pattern: self.files.clone(),
            source: e,
        })?;

        let mut old_versions = Vec::new();
        for entry in paths.flatten() {
            if !entry.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&entry).map_err(|e| PublishError::Io {
                path: entry.display().to_string(),
                source: e,
            })?;
            let rewritten = self.replace_all(&re, &content, &mut old_versions);
            if rewritten != content {
                debug!(file = %entry.display(), "rewrote versions");
                std::fs::write(&entry, rewritten).map_err(|e| PublishError::Io {
                    path: entry.display().to_string(),
                    source: e,
                })?;
            }
        }
        Ok(old_versions)
    }
}

impl RegexChange {
    fn replace_all(&self, re: &Regex, content: &str, old_versions: &mut Vec<String>) -> String {
        let has_group = re.capture_names().flatten().any(|n| n == "version");
        let mut out = String::with_capacity(content.len());
        let mut last = 0;
        for caps in re.captures_iter(content) {
            let m = if has_group {
                caps.name("version")
            } else {
                caps.get(0)
            };
            let Some(m) = m else { continue };
            if m.as_str() != self.version {
                old_versions.push(m.as_str().to_string());
            }
            out.push_str(&content[last..m.start()]);
            out.push_str(&self.version);
            last = m.end();
        }
        out.push_str(&content[last..]);
        out
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Requirements {
    #[serde(default)]
    dependencies: Vec<ChartDependency>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChartDependency {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repository: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_yaml::Value>,
}

/// File the chart applier edits.
pub const REQUIREMENTS_FILE: &str = "requirements.yaml";

/// Bumps (or adds) a chart dependency in `requirements.yaml`.
pub struct ChartVersionChange {
    /// Chart name to match, also matched against dependency aliases.
    pub name: String,

    /// Optional alias to set when the dependency is added.
    pub alias: Option<String>,

    /// Version to pin the dependency to.
    pub version: String,

    /// Chart repository URL, required when the dependency is absent and
    /// has to be added.
    pub repository: Option<String>,
}

#[async_trait]
impl ChangeFiles for ChartVersionChange {
    async fn apply(&self, dir: &Path, _repo: &GitRepoRef) -> Result<Vec<String>, PublishError> {
        let path = dir.join("env").join(REQUIREMENTS_FILE);
        let path = if path.exists() {
            path
        } else {
            dir.join(REQUIREMENTS_FILE)
        };

        let mut requirements = if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| PublishError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            serde_yaml::from_str(&data).map_err(|e| PublishError::Yaml {
                path: path.display().to_string(),
                source: e,
            })?
        } else {
            Requirements::default()
        };

        let mut old_versions = Vec::new();
        for dep in &mut requirements.dependencies {
            let matches = dep.name == self.name || dep.alias.as_deref() == Some(self.name.as_str());
            if matches && dep.version != self.version {
                old_versions.push(dep.version.clone());
                dep.version = self.version.clone();
            }
        }
        let known = requirements.dependencies.iter().any(|d| {
            d.name == self.name || d.alias.as_deref() == Some(self.name.as_str())
        });
        if !known {
            let Some(repository) = &self.repository else {
                return Err(PublishError::MissingDependency {
                    name: self.name.clone(),
                    path: path.display().to_string(),
                });
            };
            info!(app = %self.name, version = %self.version, "adding new chart dependency");
            requirements.dependencies.push(ChartDependency {
                name: self.name.clone(),
                alias: self.alias.clone(),
                version: self.version.clone(),
                repository: Some(repository.clone()),
                extra: BTreeMap::new(),
            });
        }

        let data = serde_yaml::to_string(&requirements).map_err(|e| PublishError::Yaml {
            path: path.display().to_string(),
            source: e,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PublishError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(&path, data).map_err(|e| PublishError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(old_versions)
    }
}

/// Writes a stable version file, reporting its previous content.
pub struct VersionFileChange {
    /// File to write, relative to the working copy root.
    pub file: String,

    /// New version.
    pub version: String,
}

#[async_trait]
impl ChangeFiles for VersionFileChange {
    async fn apply(&self, dir: &Path, _repo: &GitRepoRef) -> Result<Vec<String>, PublishError> {
        let path = dir.join(&self.file);
        let mut old_versions = Vec::new();
        if path.exists() {
            let old = std::fs::read_to_string(&path).map_err(|e| PublishError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let old = old.trim();
            if !old.is_empty() && old != self.version {
                old_versions.push(old.to_string());
            }
        }
        std::fs::write(&path, format!("{}\n", self.version)).map_err(|e| PublishError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(old_versions)
    }
}

/// Chains several appliers, concatenating their replaced versions.
pub struct CompositeChange {
    pub changes: Vec<Box<dyn ChangeFiles>>,
}

#[async_trait]
impl ChangeFiles for CompositeChange {
    async fn apply(&self, dir: &Path, repo: &GitRepoRef) -> Result<Vec<String>, PublishError> {
        let mut old_versions = Vec::new();
        for change in &self.changes {
            old_versions.extend(change.apply(dir, repo).await?);
        }
        Ok(old_versions)
    }
}

/// Runs an applier and commits the result, or does nothing if the tree is
/// unchanged.
///
/// A no-diff run is a silent no-op rather than an error, which lets a
/// sequence of wrapped appliers batch several commits into one PR.
pub struct CommitWrappedChange {
    pub inner: Box<dyn ChangeFiles>,
    pub gitter: Arc<dyn Gitter>,

    /// What is being bumped, used in the commit message.
    pub name: String,

    /// Version being bumped to.
    pub to_version: String,
}

#[async_trait]
impl ChangeFiles for CommitWrappedChange {
    async fn apply(&self, dir: &Path, repo: &GitRepoRef) -> Result<Vec<String>, PublishError> {
        let old_versions = self.inner.apply(dir, repo).await?;
        self.gitter.add_all(dir).await?;
        if !self.gitter.has_changes(dir).await? {
            debug!(name = %self.name, "no changes to commit");
            return Ok(old_versions);
        }
        let described = describe_old_versions(&old_versions);
        let message = if described.is_empty() {
            format!("chore(deps): bump {} to {}", self.name, self.to_version)
        } else {
            format!(
                "chore(deps): bump {} from {} to {}",
                self.name, described, self.to_version
            )
        };
        self.gitter.commit(dir, &message).await?;
        Ok(old_versions)
    }
}
