//! Dependency update records exchanged between releases.

use serde::{Deserialize, Serialize};

/// One hop of a dependency change: which repository moved, from and to
/// which version, with optional release links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyUpdateDetails {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default)]
    pub from_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_release_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "fromReleaseHTMLURL")]
    pub from_release_html_url: Option<String>,
    #[serde(default)]
    pub to_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_release_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "toReleaseHTMLURL")]
    pub to_release_html_url: Option<String>,
}

impl DependencyUpdateDetails {
    /// True when host, owner, repo and component all match.
    #[must_use]
    pub fn key_equals(&self, other: &DependencyUpdateDetails) -> bool {
        self.host == other.host
            && self.owner == other.owner
            && self.repo == other.repo
            && self.component == other.component
    }
}

/// A chain of hops explaining how an update arrived transitively.
pub type DependencyUpdatePath = Vec<DependencyUpdateDetails>;

/// A dependency bump plus the transitive chains that caused it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyUpdate {
    #[serde(flatten)]
    pub details: DependencyUpdateDetails,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<DependencyUpdatePath>,
}

/// The document attached to a release describing all its dependency updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyUpdates {
    #[serde(default)]
    pub updates: Vec<DependencyUpdate>,
}

/// Asset name under which a release publishes its [`DependencyUpdates`].
pub const DEPENDENCY_UPDATES_ASSET_NAME: &str = "dependency-updates.yaml";
