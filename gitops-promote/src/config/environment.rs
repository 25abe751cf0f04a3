//! Environment definition deserialization.

use serde::{Deserialize, Serialize};

/// What an environment is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentKind {
    /// A long-lived environment such as staging or production.
    #[default]
    Permanent,
    /// A short-lived preview spun up for a pull request.
    Preview,
    /// The development environment releases originate from.
    Development,
}

impl EnvironmentKind {
    /// True for long-lived environments that can be promoted to.
    #[must_use]
    pub fn is_permanent(self) -> bool {
        matches!(self, EnvironmentKind::Permanent)
    }
}

/// How releases reach an environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromotionStrategy {
    /// Every release is promoted without operator involvement.
    Automatic,
    /// Promotion happens only when explicitly requested.
    #[default]
    Manual,
    /// The environment never receives promotions.
    Never,
}

/// The GitOps repository backing an environment.
///
/// An environment without a source is managed by direct installs rather
/// than pull requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EnvironmentSource {
    /// Clone URL of the environment repository.
    pub url: String,

    /// Branch that deployments are driven from.
    #[serde(default = "default_source_ref", rename = "ref")]
    pub git_ref: String,
}

pub(crate) fn default_source_ref() -> String {
    "master".to_string()
}

/// A deployment target parsed from the environments file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Environment {
    /// Unique environment name, e.g. "staging".
    pub name: String,

    /// Namespace the environment deploys into.
    pub namespace: String,

    /// Human-readable label (defaults to the name).
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub kind: EnvironmentKind,

    #[serde(default)]
    pub promotion_strategy: PromotionStrategy,

    /// GitOps source repository; absent for direct-install environments.
    #[serde(default)]
    pub source: Option<EnvironmentSource>,

    /// Position in the promotion pipeline; lower promotes first.
    #[serde(default)]
    pub order: i32,
}

impl Environment {
    /// The label shown to operators, falling back to the name.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// True when promotion to this environment goes through pull requests.
    #[must_use]
    pub fn is_gitops(&self) -> bool {
        self.source.is_some()
    }

    /// Matches a user-supplied name against name or label, case-insensitively
    /// for the label.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        self.name == query || self.label().eq_ignore_ascii_case(query)
    }
}
