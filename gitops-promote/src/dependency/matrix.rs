//! The dependency-matrix artifact committed into target repositories.
//!
//! The matrix records which dependency versions a repository carries and
//! which transitive chains produced them. It lives in
//! `dependency-matrix/matrix.yaml` with a generated markdown rendering next
//! to it.

use crate::dependency::error::DependencyError;
use crate::dependency::update::{DependencyUpdate, DependencyUpdatePath};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Directory inside a repository holding the matrix files.
pub const DEPENDENCY_MATRIX_DIR: &str = "dependency-matrix";

/// File name of the YAML matrix.
pub const DEPENDENCY_MATRIX_FILE: &str = "matrix.yaml";

/// Identity and current version of one tracked dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixEntryDetails {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, rename = "versionURL")]
    pub version_url: String,
}

impl fmt::Display for MatrixEntryDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.repo)?;
        if let Some(component) = &self.component {
            write!(f, ":{component}")?;
        }
        Ok(())
    }
}

impl MatrixEntryDetails {
    fn key_equals_update(&self, update: &DependencyUpdate) -> bool {
        let d = &update.details;
        self.host == d.host
            && self.owner == d.owner
            && self.repo == d.repo
            && self.component == d.component
    }

    fn markdown(&self) -> String {
        format!("[{self}]({})", self.url)
    }
}

/// One transitive chain that pulled the dependency in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixSource {
    pub path: Vec<MatrixEntryDetails>,
    #[serde(default)]
    pub version: String,
    #[serde(default, rename = "versionURL")]
    pub version_url: String,
}

impl MatrixSource {
    fn path_key(&self) -> String {
        self.path
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(";")
    }

    fn path_markdown(&self) -> String {
        self.path
            .iter()
            .map(|e| e.markdown())
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// A dependency plus every chain that sources it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixDependency {
    #[serde(flatten)]
    pub details: MatrixEntryDetails,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<MatrixSource>,
}

/// The whole matrix for a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMatrix {
    #[serde(default)]
    pub dependencies: Vec<MatrixDependency>,
}

impl DependencyMatrix {
    /// Returns the recorded version of a dependency, if tracked.
    #[must_use]
    pub fn find_version(&self, host: &str, owner: &str, repo: &str) -> Option<&str> {
        self.dependencies
            .iter()
            .find(|d| d.details.host == host && d.details.owner == owner && d.details.repo == repo)
            .map(|d| d.details.version.as_str())
    }
}

fn path_from_update(path: &DependencyUpdatePath) -> Vec<MatrixEntryDetails> {
    path.iter()
        .map(|e| MatrixEntryDetails {
            host: e.host.clone(),
            owner: e.owner.clone(),
            repo: e.repo.clone(),
            component: e.component.clone(),
            url: e.url.clone(),
            version: e.to_version.clone(),
            version_url: e.to_release_html_url.clone().unwrap_or_default(),
        })
        .collect()
}

/// Loads the matrix from `dir`, returning an empty matrix when absent.
pub fn load_dependency_matrix(dir: &Path) -> Result<DependencyMatrix, DependencyError> {
    let path = dir.join(DEPENDENCY_MATRIX_DIR).join(DEPENDENCY_MATRIX_FILE);
    if !path.exists() {
        return Ok(DependencyMatrix::default());
    }
    let data = std::fs::read_to_string(&path).map_err(|e| DependencyError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_yaml::from_str(&data).map_err(|e| DependencyError::Yaml {
        path: path.display().to_string(),
        source: e,
    })
}

/// Merges `update` into the matrix under `dir` and rewrites both the YAML
/// file and its markdown rendering.
///
/// A matching dependency (same host/owner/repo/component) has its version
/// and source paths updated in place; an unknown one is appended. When the
/// matrix location is a plain file the update is skipped with a warning.
pub fn update_dependency_matrix(
    dir: &Path,
    update: &DependencyUpdate,
) -> Result<(), DependencyError> {
    let matrix_dir = dir.join(DEPENDENCY_MATRIX_DIR);
    if matrix_dir.exists() && !matrix_dir.is_dir() {
        warn!(path = %matrix_dir.display(), "dependency matrix location is not a directory, skipping");
        return Ok(());
    }
    std::fs::create_dir_all(&matrix_dir).map_err(|e| DependencyError::Io {
        path: matrix_dir.display().to_string(),
        source: e,
    })?;

    let mut matrix = load_dependency_matrix(dir)?;
    apply_update(&mut matrix, update);

    let path = matrix_dir.join(DEPENDENCY_MATRIX_FILE);
    let data = serde_yaml::to_string(&matrix).map_err(|e| DependencyError::Yaml {
        path: path.display().to_string(),
        source: e,
    })?;
    std::fs::write(&path, data).map_err(|e| DependencyError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    // Keep an existing matrix.md if the repo carries one, else README.md.
    let mut markdown_path = matrix_dir.join("matrix.md");
    if !markdown_path.exists() {
        markdown_path = matrix_dir.join("README.md");
    }
    let markdown = render_markdown(&matrix);
    std::fs::write(&markdown_path, markdown).map_err(|e| DependencyError::Io {
        path: markdown_path.display().to_string(),
        source: e,
    })
}

fn apply_update(matrix: &mut DependencyMatrix, update: &DependencyUpdate) {
    let mut found = false;
    for dep in &mut matrix.dependencies {
        if !dep.details.key_equals_update(update) {
            continue;
        }
        found = true;
        dep.details.version = update.details.to_version.clone();
        dep.details.url = update.details.url.clone();
        dep.details.version_url = update
            .details
            .to_release_html_url
            .clone()
            .unwrap_or_default();
        for path in &update.paths {
            let incoming = MatrixSource {
                path: path_from_update(path),
                version: update.details.to_version.clone(),
                version_url: update
                    .details
                    .to_release_html_url
                    .clone()
                    .unwrap_or_default(),
            };
            match dep
                .sources
                .iter_mut()
                .find(|s| s.path_key() == incoming.path_key())
            {
                Some(existing) => *existing = incoming,
                None => dep.sources.push(incoming),
            }
        }
    }
    if !found {
        let sources = update
            .paths
            .iter()
            .map(|path| MatrixSource {
                path: path_from_update(path),
                version: update.details.to_version.clone(),
                version_url: update
                    .details
                    .to_release_html_url
                    .clone()
                    .unwrap_or_default(),
            })
            .collect();
        matrix.dependencies.push(MatrixDependency {
            details: MatrixEntryDetails {
                host: update.details.host.clone(),
                owner: update.details.owner.clone(),
                repo: update.details.repo.clone(),
                component: update.details.component.clone(),
                url: update.details.url.clone(),
                version: update.details.to_version.clone(),
                version_url: update
                    .details
                    .to_release_html_url
                    .clone()
                    .unwrap_or_default(),
            },
            sources,
        });
    }
    for dep in &mut matrix.dependencies {
        dep.sources.sort_by_key(MatrixSource::path_key);
    }
}

fn render_markdown(matrix: &DependencyMatrix) -> String {
    let mut md = String::new();
    md.push_str("# Dependency Matrix\n\n");
    md.push_str("Dependency | Sources | Version | Mismatched versions\n");
    md.push_str("---------- | ------- | ------- | -------------------\n");
    for dep in &matrix.dependencies {
        let sources: Vec<String> = dep.sources.iter().map(MatrixSource::path_markdown).collect();
        let mut mismatched: Vec<String> = dep
            .sources
            .iter()
            .filter(|s| s.version != dep.details.version)
            .map(|s| format!("**{}**: {}", s.version, s.path_markdown()))
            .collect();
        mismatched.sort();
        let component = dep
            .details
            .component
            .as_ref()
            .map(|c| format!(":{c}"))
            .unwrap_or_default();
        md.push_str(&format!(
            "[{}/{}]({}){} | {} | [{}]({}) | {}\n",
            dep.details.owner,
            dep.details.repo,
            dep.details.url,
            component,
            sources.join(";"),
            dep.details.version,
            dep.details.version_url,
            mismatched.join("<br>")
        ));
    }
    md
}
