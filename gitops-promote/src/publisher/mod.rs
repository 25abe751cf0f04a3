//! Pull request publishing.
//!
//! This module clones each target repository, applies a change applier,
//! records dependency-matrix entries and opens (or idempotently updates)
//! a machine-managed pull request.

mod change;
mod error;

pub use change::{
    ChangeFiles, ChartVersionChange, CommitWrappedChange, CompositeChange, RegexChange,
    VersionFileChange, REQUIREMENTS_FILE,
};
pub use error::PublishError;

use crate::delta::{self, describe_old_versions, PullRequestDetails, UpdateDetails};
use crate::dependency::{
    fetch_dependency_updates, prepend_path_hop, update_dependency_matrix,
    DEPENDENCY_UPDATES_ASSET_NAME,
};
use crate::git::{to_valid_branch_name, GitRepoRef, Gitter};
use crate::provider::{GitProvider, ProviderError, PullRequest, PullRequestArguments};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// Label marking a pull request as machine-managed.
///
/// An open PR carrying this label gets updated in place instead of a
/// duplicate being opened.
pub const UPDATEBOT_LABEL: &str = "updatebot";

/// Committer identity used for published changes.
const GIT_USER_NAME: &str = "gitops-promote";
const GIT_USER_EMAIL: &str = "gitops-promote@users.noreply.github.com";

/// Yields a provider client for a repository's host.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn provider_for(&self, repo: &GitRepoRef)
        -> Result<Arc<dyn GitProvider>, ProviderError>;
}

/// A published pull request together with the client and arguments that
/// produced it, enough to refresh or recreate it later.
#[derive(Clone)]
pub struct PullRequestInfo {
    pub provider: Arc<dyn GitProvider>,
    pub pull_request: PullRequest,
    pub arguments: PullRequestArguments,
}

impl std::fmt::Debug for PullRequestInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullRequestInfo")
            .field("pull_request", &self.pull_request)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// What to publish and where.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Repositories to open a pull request against.
    pub target_git_urls: Vec<String>,

    /// Base branch the pull request targets.
    pub base_branch: String,

    /// Repository whose release caused this change, when known; enables
    /// dependency-matrix recording and transitive expansion.
    pub src_repo_url: Option<String>,

    /// Component within the source repository, if any.
    pub component: Option<String>,

    /// Version being moved to.
    pub to_version: String,

    /// Caller-supplied branch/title/body. When absent they are derived
    /// from the replaced versions.
    pub details: Option<PullRequestDetails>,

    /// Extra labels applied on top of [`UPDATEBOT_LABEL`].
    pub labels: Vec<String>,

    /// Leave committing to the change applier.
    pub skip_commit: bool,

    /// Stop after the local commit, before push and PR creation.
    pub dry_run: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            target_git_urls: Vec::new(),
            base_branch: "master".to_string(),
            src_repo_url: None,
            component: None,
            to_version: String::new(),
            details: None,
            labels: Vec::new(),
            skip_commit: false,
            dry_run: false,
        }
    }
}

/// Publishes change-applier output as pull requests.
pub struct PullRequestPublisher {
    gitter: Arc<dyn Gitter>,
    providers: Arc<dyn ProviderFactory>,
}

impl PullRequestPublisher {
    pub fn new(gitter: Arc<dyn Gitter>, providers: Arc<dyn ProviderFactory>) -> Self {
        Self { gitter, providers }
    }

    /// Applies `changes` to every configured target and publishes the
    /// result.
    ///
    /// Returns the last published pull request, or `None` when nothing
    /// changed or `dry_run` stopped before publishing. Any git or provider
    /// failure aborts the whole call; there is no partial-success return.
    pub async fn create_pull_request(
        &self,
        config: &PublisherConfig,
        kind: &str,
        changes: &dyn ChangeFiles,
    ) -> Result<Option<PullRequestInfo>, PublishError> {
        let mut answer = None;
        for url in &config.target_git_urls {
            let span = info_span!("create_pull_request", repo = %url, kind);
            if let Some(info) = self
                .publish_one(config, kind, changes, url)
                .instrument(span)
                .await?
            {
                answer = Some(info);
            }
        }
        Ok(answer)
    }

    async fn publish_one(
        &self,
        config: &PublisherConfig,
        kind: &str,
        changes: &dyn ChangeFiles,
        url: &str,
    ) -> Result<Option<PullRequestInfo>, PublishError> {
        let repo = GitRepoRef::parse(url)?;
        let provider = self.providers.provider_for(&repo).await?;

        // The temp dir is dropped, and the clone removed, on every exit
        // path out of this function.
        let temp = tempfile::tempdir().map_err(|e| PublishError::Io {
            path: "tempdir".to_string(),
            source: e,
        })?;
        let dir = temp.path();

        let fork = if provider.should_fork(&repo).await? {
            let fork = provider.ensure_fork(&repo).await?;
            info!(fork = %fork.full_name(), "pushing via fork");
            Some(fork)
        } else {
            None
        };

        self.gitter.clone_repo(&provider.clone_url(&repo), dir).await?;
        self.gitter.checkout(dir, &config.base_branch).await?;
        self.gitter.pull(dir).await?;
        self.gitter.set_user(dir, GIT_USER_NAME, GIT_USER_EMAIL).await?;

        let branch_name = match &config.details {
            Some(d) => to_valid_branch_name(&d.branch_name),
            None => delta::bump_branch_name(kind),
        };
        self.gitter.create_branch(dir, &branch_name).await?;

        let old_versions = changes.apply(dir, &repo).await?;
        debug!(replaced = old_versions.len(), "change applier finished");

        let details = match &config.details {
            Some(d) => UpdateDetails {
                commit_message: d.title.clone(),
                pull_request: d.clone(),
                update: None,
                assets: Vec::new(),
            },
            None => {
                let from = describe_old_versions(&old_versions);
                delta::dependency_update_details(
                    provider.as_ref(),
                    kind,
                    config.src_repo_url.as_deref(),
                    &repo,
                    &from,
                    &config.to_version,
                    config.component.as_deref(),
                )
                .await?
            }
        };

        if let Some(update) = &details.update {
            update_dependency_matrix(dir, update)?;
            for asset in &details.assets {
                if asset.name == DEPENDENCY_UPDATES_ASSET_NAME {
                    let upstream = fetch_dependency_updates(&asset.browser_download_url).await?;
                    for expanded in prepend_path_hop(upstream, update) {
                        update_dependency_matrix(dir, &expanded)?;
                    }
                }
            }
        }

        if !config.skip_commit {
            self.gitter.add_all(dir).await?;
            if !self.gitter.has_changes(dir).await? {
                info!("working tree unchanged, no pull request needed");
                return Ok(None);
            }
            self.gitter.commit(dir, &details.commit_message).await?;
        }

        if config.dry_run {
            info!(branch = %branch_name, "dry run, stopping before push");
            return Ok(None);
        }

        let mut labels = vec![UPDATEBOT_LABEL.to_string()];
        labels.extend(config.labels.iter().cloned());

        let head = match &fork {
            Some(f) => format!("{}:{}", f.owner, branch_name),
            None => branch_name.clone(),
        };
        let arguments = PullRequestArguments {
            repository: repo.clone(),
            title: details.pull_request.title.clone(),
            body: details.pull_request.message.clone(),
            base: config.base_branch.clone(),
            head,
            labels: labels.clone(),
        };

        let existing = provider
            .list_open_pull_requests(&repo)
            .await?
            .into_iter()
            .find(|pr| pr.labels.iter().any(|l| l == UPDATEBOT_LABEL));

        let pull_request = match existing {
            Some(open) => {
                // Reuse the machine-managed PR: push over its head branch
                // and refresh the title and body.
                let head_repo = match open.head_owner.as_deref() {
                    Some(owner) if owner != repo.owner => {
                        GitRepoRef::new(&repo.host, owner, &repo.name)
                    }
                    _ => repo.clone(),
                };
                self.gitter
                    .push(
                        dir,
                        &provider.clone_url(&head_repo),
                        true,
                        &format!("HEAD:refs/heads/{}", open.head_ref),
                    )
                    .await?;
                let updated = provider.update_pull_request(open.number, &arguments).await?;
                info!(number = updated.number, url = %updated.url, "updated existing pull request");
                updated
            }
            None => {
                let push_repo = fork.as_ref().unwrap_or(&repo);
                self.gitter
                    .push(
                        dir,
                        &provider.clone_url(push_repo),
                        true,
                        &format!("HEAD:refs/heads/{branch_name}"),
                    )
                    .await?;
                let created = provider.create_pull_request(&arguments).await?;
                info!(number = created.number, url = %created.url, "created pull request");
                created
            }
        };

        provider.add_labels(&repo, pull_request.number, &labels).await?;

        Ok(Some(PullRequestInfo {
            provider,
            pull_request,
            arguments,
        }))
    }
}
