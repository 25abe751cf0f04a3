//! GitHub implementation of [`GitProvider`] using octocrab.

use crate::git::GitRepoRef;
use crate::provider::types::{
    CommitStatus, GitRelease, GitReleaseAsset, PullRequest, PullRequestArguments, StatusState,
};
use crate::provider::{GitProvider, ProviderError};
use async_trait::async_trait;
use octocrab::Octocrab;
use serde::Deserialize;
use tracing::{debug, info};

/// [`GitProvider`] backed by the GitHub REST API.
pub struct GitHubProvider {
    client: Octocrab,
    username: String,
    token: String,
}

impl GitHubProvider {
    /// Builds an authenticated client and resolves the current user.
    pub async fn connect(token: String) -> Result<Self, ProviderError> {
        let client = Octocrab::builder()
            .personal_token(token.clone())
            .build()?;
        let user: UserPayload = client.get("/user", None::<&()>).await?;
        if user.login.is_empty() {
            return Err(ProviderError::NoUser {
                message: "empty login in /user response".to_string(),
            });
        }
        Ok(Self {
            client,
            username: user.login,
            token,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    #[serde(default)]
    login: String,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    state: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    target_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoPayload {
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    owner: Option<OwnerPayload>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    permissions: Option<PermissionsPayload>,
}

#[derive(Debug, Deserialize)]
struct OwnerPayload {
    #[serde(default)]
    login: String,
}

#[derive(Debug, Deserialize)]
struct PermissionsPayload {
    #[serde(default)]
    push: bool,
}

fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(err, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

fn map_pull_request(repo: &GitRepoRef, pr: octocrab::models::pulls::PullRequest) -> PullRequest {
    let url = pr
        .html_url
        .as_ref()
        .map(|u| u.to_string())
        .unwrap_or_else(|| {
            format!("https://{}/{}/{}/pull/{}", repo.host, repo.owner, repo.name, pr.number)
        });
    PullRequest {
        number: pr.number,
        url,
        owner: repo.owner.clone(),
        repo: repo.name.clone(),
        title: pr.title.clone().unwrap_or_default(),
        body: pr.body.clone().unwrap_or_default(),
        closed: matches!(pr.state, Some(octocrab::models::IssueState::Closed)),
        merged: pr.merged_at.is_some(),
        merge_commit_sha: pr.merge_commit_sha.clone(),
        mergeable: pr.mergeable,
        last_commit_sha: pr.head.sha.clone(),
        head_ref: pr.head.ref_field.clone(),
        head_owner: pr.head.user.as_ref().map(|u| u.login.clone()),
        labels: pr
            .labels
            .as_ref()
            .map(|labels| labels.iter().map(|l| l.name.clone()).collect())
            .unwrap_or_default(),
    }
}

fn map_release(release: octocrab::models::repos::Release) -> GitRelease {
    GitRelease {
        name: release.name.clone().unwrap_or_else(|| release.tag_name.clone()),
        tag: release.tag_name.clone(),
        html_url: release.html_url.to_string(),
        body: release.body.clone().unwrap_or_default(),
        assets: release
            .assets
            .iter()
            .map(|a| GitReleaseAsset {
                name: a.name.clone(),
                browser_download_url: a.browser_download_url.to_string(),
            })
            .collect(),
    }
}

#[async_trait]
impl GitProvider for GitHubProvider {
    fn current_username(&self) -> &str {
        &self.username
    }

    fn clone_url(&self, repo: &GitRepoRef) -> String {
        repo.clone_url_with_token(&self.token)
    }

    async fn get_pull_request(
        &self,
        repo: &GitRepoRef,
        number: u64,
    ) -> Result<PullRequest, ProviderError> {
        let pr = self
            .client
            .pulls(&repo.owner, &repo.name)
            .get(number)
            .await?;
        Ok(map_pull_request(repo, pr))
    }

    async fn create_pull_request(
        &self,
        args: &PullRequestArguments,
    ) -> Result<PullRequest, ProviderError> {
        let repo = &args.repository;
        let pr = self
            .client
            .pulls(&repo.owner, &repo.name)
            .create(&args.title, &args.head, &args.base)
            .body(&args.body)
            .send()
            .await?;
        info!(url = %pr.html_url.as_ref().map(|u| u.to_string()).unwrap_or_default(), "Created pull request");
        Ok(map_pull_request(repo, pr))
    }

    async fn update_pull_request(
        &self,
        number: u64,
        args: &PullRequestArguments,
    ) -> Result<PullRequest, ProviderError> {
        let repo = &args.repository;
        let pr = self
            .client
            .pulls(&repo.owner, &repo.name)
            .update(number)
            .title(&args.title)
            .body(&args.body)
            .send()
            .await?;
        Ok(map_pull_request(repo, pr))
    }

    async fn list_open_pull_requests(
        &self,
        repo: &GitRepoRef,
    ) -> Result<Vec<PullRequest>, ProviderError> {
        let page = self
            .client
            .pulls(&repo.owner, &repo.name)
            .list()
            .state(octocrab::params::State::Open)
            .per_page(100)
            .send()
            .await?;
        Ok(page.items.into_iter().map(|pr| map_pull_request(repo, pr)).collect())
    }

    async fn merge_pull_request(
        &self,
        pr: &PullRequest,
        message: &str,
    ) -> Result<(), ProviderError> {
        self.client
            .pulls(&pr.owner, &pr.repo)
            .merge(pr.number)
            .message(message)
            .send()
            .await?;
        Ok(())
    }

    async fn list_commit_statuses(
        &self,
        repo: &GitRepoRef,
        sha: &str,
    ) -> Result<Vec<CommitStatus>, ProviderError> {
        let route = format!(
            "/repos/{}/{}/commits/{}/statuses",
            repo.owner, repo.name, sha
        );
        let statuses: Vec<StatusPayload> = self.client.get(route, None::<&()>).await?;
        Ok(statuses
            .into_iter()
            .map(|s| CommitStatus {
                state: StatusState::parse(&s.state),
                context: s.context.unwrap_or_default(),
                url: s.url.unwrap_or_default(),
                target_url: s.target_url.unwrap_or_default(),
                description: s.description.unwrap_or_default(),
            })
            .collect())
    }

    async fn add_labels(
        &self,
        repo: &GitRepoRef,
        number: u64,
        labels: &[String],
    ) -> Result<(), ProviderError> {
        if labels.is_empty() {
            return Ok(());
        }
        self.client
            .issues(&repo.owner, &repo.name)
            .add_labels(number, labels)
            .await?;
        Ok(())
    }

    async fn create_issue_comment(
        &self,
        repo: &GitRepoRef,
        number: u64,
        body: &str,
    ) -> Result<(), ProviderError> {
        self.client
            .issues(&repo.owner, &repo.name)
            .create_comment(number, body)
            .await?;
        Ok(())
    }

    async fn get_release(
        &self,
        repo: &GitRepoRef,
        tag: &str,
    ) -> Result<Option<GitRelease>, ProviderError> {
        match self
            .client
            .repos(&repo.owner, &repo.name)
            .releases()
            .get_by_tag(tag)
            .await
        {
            Ok(release) => Ok(Some(map_release(release))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_latest_release(
        &self,
        repo: &GitRepoRef,
    ) -> Result<Option<GitRelease>, ProviderError> {
        match self
            .client
            .repos(&repo.owner, &repo.name)
            .releases()
            .get_latest()
            .await
        {
            Ok(release) => Ok(Some(map_release(release))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn should_fork(&self, repo: &GitRepoRef) -> Result<bool, ProviderError> {
        if repo.owner == self.username {
            return Ok(false);
        }
        let route = format!("/repos/{}/{}", repo.owner, repo.name);
        let payload: RepoPayload = self.client.get(route, None::<&()>).await?;
        let push = payload.permissions.map(|p| p.push).unwrap_or(false);
        Ok(!push)
    }

    async fn ensure_fork(&self, repo: &GitRepoRef) -> Result<GitRepoRef, ProviderError> {
        // An existing fork under the user wins; otherwise create one.
        let route = format!("/repos/{}/{}", self.username, repo.name);
        match self.client.get::<RepoPayload, _, ()>(&route, None).await {
            Ok(existing) if existing.fork => {
                debug!(repo = %repo.full_name(), "reusing existing fork");
                return Ok(GitRepoRef::new(&repo.host, &self.username, &existing.name));
            }
            Ok(_) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }
        let route = format!("/repos/{}/{}/forks", repo.owner, repo.name);
        let forked: RepoPayload = self.client.post(route, None::<&()>).await?;
        let owner = forked
            .owner
            .map(|o| o.login)
            .ok_or(ProviderError::MissingField {
                operation: "fork repository",
                field: "owner.login",
            })?;
        info!(fork = %format!("{}/{}", owner, forked.name), "Forked repository");
        Ok(GitRepoRef::new(&repo.host, &owner, &forked.name))
    }
}
