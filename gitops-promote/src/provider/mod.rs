//! Git provider client contract and the GitHub implementation.
//!
//! Everything the promotion engine needs from a provider API lives behind
//! [`GitProvider`] so that the publisher, orchestrator and merge watcher can
//! be exercised against fakes.

mod error;
mod github;
mod types;

pub use error::ProviderError;
pub use github::GitHubProvider;
pub use types::{
    CommitStatus, GitRelease, GitReleaseAsset, PullRequest, PullRequestArguments, StatusState,
};

use crate::git::GitRepoRef;
use async_trait::async_trait;
use std::collections::HashMap;

/// Client for a git provider's REST API.
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// Login of the authenticated user.
    fn current_username(&self) -> &str;

    /// Clone URL for `repo` carrying this provider's credentials.
    fn clone_url(&self, repo: &GitRepoRef) -> String;

    /// Fetches the current state of a pull request.
    async fn get_pull_request(
        &self,
        repo: &GitRepoRef,
        number: u64,
    ) -> Result<PullRequest, ProviderError>;

    /// Opens a new pull request.
    async fn create_pull_request(
        &self,
        args: &PullRequestArguments,
    ) -> Result<PullRequest, ProviderError>;

    /// Updates the title and body of an existing pull request.
    async fn update_pull_request(
        &self,
        number: u64,
        args: &PullRequestArguments,
    ) -> Result<PullRequest, ProviderError>;

    /// Lists open pull requests against `repo`.
    async fn list_open_pull_requests(
        &self,
        repo: &GitRepoRef,
    ) -> Result<Vec<PullRequest>, ProviderError>;

    /// Merges a pull request with the given commit message.
    async fn merge_pull_request(
        &self,
        pr: &PullRequest,
        message: &str,
    ) -> Result<(), ProviderError>;

    /// Lists the statuses reported against a commit.
    async fn list_commit_statuses(
        &self,
        repo: &GitRepoRef,
        sha: &str,
    ) -> Result<Vec<CommitStatus>, ProviderError>;

    /// Adds labels to an issue or pull request.
    async fn add_labels(
        &self,
        repo: &GitRepoRef,
        number: u64,
        labels: &[String],
    ) -> Result<(), ProviderError>;

    /// Comments on an issue or pull request.
    async fn create_issue_comment(
        &self,
        repo: &GitRepoRef,
        number: u64,
        body: &str,
    ) -> Result<(), ProviderError>;

    /// Looks up a release by tag, returning None when it does not exist.
    async fn get_release(
        &self,
        repo: &GitRepoRef,
        tag: &str,
    ) -> Result<Option<GitRelease>, ProviderError>;

    /// Returns the most recent release of `repo`, if any.
    async fn get_latest_release(
        &self,
        repo: &GitRepoRef,
    ) -> Result<Option<GitRelease>, ProviderError>;

    /// True when the authenticated user cannot push to `repo` directly.
    async fn should_fork(&self, repo: &GitRepoRef) -> Result<bool, ProviderError>;

    /// Returns the user's fork of `repo`, creating it when missing.
    async fn ensure_fork(&self, repo: &GitRepoRef) -> Result<GitRepoRef, ProviderError>;

    /// Aggregate state of a pull request's last commit.
    ///
    /// Takes the newest status per context; any failure wins, then any
    /// pending, then success. A commit with no statuses is pending.
    async fn last_commit_status(&self, pr: &PullRequest) -> Result<StatusState, ProviderError> {
        let repo = GitRepoRef::new("", &pr.owner, &pr.repo);
        let statuses = self.list_commit_statuses(&repo, &pr.last_commit_sha).await?;
        Ok(aggregate_status(&statuses))
    }
}

/// Folds a status list into one overall state, keeping only the newest
/// status per context (providers return newest first).
#[must_use]
pub fn aggregate_status(statuses: &[CommitStatus]) -> StatusState {
    let mut latest: HashMap<&str, StatusState> = HashMap::new();
    for status in statuses {
        latest.entry(status.context.as_str()).or_insert(status.state);
    }
    if latest.is_empty() {
        return StatusState::Pending;
    }
    if latest.values().any(|s| s.is_failed()) {
        return StatusState::Failure;
    }
    if latest.values().any(|s| matches!(s, StatusState::InProgress)) {
        return StatusState::InProgress;
    }
    if latest.values().all(|s| matches!(s, StatusState::Success)) {
        return StatusState::Success;
    }
    StatusState::Pending
}
