//! Data returned by and sent to git provider APIs.

use crate::git::GitRepoRef;
use serde::{Deserialize, Serialize};

/// State of a single commit status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusState {
    Pending,
    InProgress,
    Success,
    Error,
    Failure,
}

impl StatusState {
    /// True for the terminal failure states.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Error | Self::Failure)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Success => "success",
            Self::Error => "error",
            Self::Failure => "failure",
        }
    }

    /// Parses a provider status string, defaulting unknown values to pending.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "error" => Self::Error,
            "failure" => Self::Failure,
            "in-progress" | "in_progress" | "running" => Self::InProgress,
            _ => Self::Pending,
        }
    }
}

/// One commit status reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub state: StatusState,

    /// Status context, e.g. `continuous-integration/ci`, or `tide`.
    pub context: String,

    /// API URL of the status itself.
    pub url: String,

    /// Link to the system that produced the status.
    pub target_url: String,

    pub description: String,
}

/// A pull request as last observed at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub owner: String,
    pub repo: String,
    pub title: String,
    pub body: String,

    /// True when the PR is closed, whether or not it merged.
    pub closed: bool,

    /// True once the PR has merged.
    pub merged: bool,

    /// The commit created by the merge; may lag behind `merged`.
    pub merge_commit_sha: Option<String>,

    /// None while the provider is still computing mergeability.
    pub mergeable: Option<bool>,

    /// SHA of the head commit before merge.
    pub last_commit_sha: String,

    /// Head branch name.
    pub head_ref: String,

    /// Owner of the head branch (differs from `owner` for fork PRs).
    pub head_owner: Option<String>,

    pub labels: Vec<String>,
}

/// Arguments for creating or updating a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestArguments {
    pub repository: GitRepoRef,
    pub title: String,
    pub body: String,
    pub base: String,

    /// Head in `branch` or `owner:branch` form.
    pub head: String,

    pub labels: Vec<String>,
}

/// A release published at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRelease {
    pub name: String,
    pub tag: String,
    pub html_url: String,

    /// Release notes body; promotion mines it for closed-issue references.
    pub body: String,

    pub assets: Vec<GitReleaseAsset>,
}

/// A downloadable asset attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}
