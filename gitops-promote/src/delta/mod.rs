//! Human-readable summaries of version changes.
//!
//! Turns the raw "old versions replaced" output of a change applier into a
//! commit message, pull request details and a structured
//! [`DependencyUpdate`](crate::dependency::DependencyUpdate) record.

use crate::dependency::{DependencyUpdate, DependencyUpdateDetails};
use crate::git::GitRepoRef;
use crate::provider::{GitProvider, GitRelease, GitReleaseAsset, ProviderError};
use semver::Version;
use uuid::Uuid;

/// Title, body and branch for a pull request about to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDetails {
    pub branch_name: String,
    pub title: String,
    pub message: String,
}

/// Everything derived from one dependency version change.
#[derive(Debug, Clone)]
pub struct UpdateDetails {
    pub commit_message: String,
    pub pull_request: PullRequestDetails,
    pub update: Option<DependencyUpdate>,
    pub assets: Vec<GitReleaseAsset>,
}

/// Renders a set of replaced version strings as one phrase.
///
/// Versions that parse as strict semver sort ascending; everything else,
/// including otherwise-valid versions carrying a leading `v`, sorts lexically
/// in a second group. Both groups are deduplicated and joined with `" and "`
/// when both are present.
#[must_use]
pub fn describe_old_versions(old_versions: &[String]) -> String {
    let mut semantic: Vec<Version> = Vec::new();
    let mut non_semantic: Vec<String> = Vec::new();
    for v in old_versions {
        match Version::parse(v) {
            Ok(sv) => semantic.push(sv),
            Err(_) => non_semantic.push(v.clone()),
        }
    }
    semantic.sort();
    semantic.dedup();
    non_semantic.sort();
    non_semantic.dedup();

    let semantic: Vec<String> = semantic.iter().map(|v| v.to_string()).collect();
    let mut answer = semantic.join(", ");
    if !non_semantic.is_empty() {
        if !answer.is_empty() {
            answer.push_str(" and ");
        }
        answer.push_str(&non_semantic.join(", "));
    }
    answer
}

/// Generates a branch name for a dependency bump, unique across runs.
#[must_use]
pub fn bump_branch_name(kind: &str) -> String {
    format!("bump-{}-version-{}", kind, Uuid::new_v4())
}

/// Looks up the release for a version, trying the tag verbatim and then
/// with a `v` prefix.
pub async fn find_release(
    provider: &dyn GitProvider,
    repo: &GitRepoRef,
    version: &str,
) -> Result<Option<GitRelease>, ProviderError> {
    if let Some(release) = provider.get_release(repo, version).await? {
        return Ok(Some(release));
    }
    provider.get_release(repo, &format!("v{version}")).await
}

/// Builds the commit message, PR details and [`DependencyUpdate`] for a
/// dependency bump caused by `src_repo` moving to `to_version`.
///
/// `from_versions` is the output of [`describe_old_versions`]. When the
/// provider resolves a release for either end of the change, the PR body
/// links to its release page, and the to-release's assets are returned for
/// transitive dependency processing.
pub async fn dependency_update_details(
    provider: &dyn GitProvider,
    kind: &str,
    src_repo_url: Option<&str>,
    dest_repo: &GitRepoRef,
    from_versions: &str,
    to_version: &str,
    component: Option<&str>,
) -> Result<UpdateDetails, crate::publisher::PublishError> {
    let mut commit_message = String::from("chore(deps): bump ");
    let mut title = String::from("chore(deps): bump ");
    let mut message = String::from("Update ");
    let mut update = None;
    let mut assets = Vec::new();

    if let Some(src_url) = src_repo_url {
        let src_repo = GitRepoRef::parse(src_url)?;
        let mut details = DependencyUpdateDetails {
            owner: src_repo.owner.clone(),
            repo: src_repo.name.clone(),
            url: src_url.to_string(),
            ..DependencyUpdateDetails::default()
        };
        if src_repo.host != dest_repo.host {
            commit_message.push_str(src_url);
            title.push_str(src_url);
            details.host = src_repo.host.clone();
        } else {
            let name = src_repo.full_name();
            commit_message.push_str(&name);
            title.push_str(&name);
            details.host = dest_repo.host.clone();
        }
        message.push_str(&format!("[{}]({})", src_repo.full_name(), src_url));

        if let Some(component) = component {
            let suffix = format!(":{component}");
            commit_message.push_str(&suffix);
            title.push_str(&suffix);
            message.push_str(&suffix);
            details.component = Some(component.to_string());
        }
        commit_message.push(' ');
        title.push(' ');
        message.push(' ');

        if !from_versions.is_empty() {
            let from_text = format!("from {from_versions} ");
            commit_message.push_str(&from_text);
            title.push_str(&from_text);
            details.from_version = from_versions.to_string();
            match find_release(provider, &src_repo, from_versions).await? {
                Some(release) => {
                    message.push_str(&format!("from [{}]({}) ", from_versions, release.html_url));
                    details.from_release_name = Some(release.name);
                    details.from_release_html_url = Some(release.html_url);
                }
                None => message.push_str(&from_text),
            }
        }
        if !to_version.is_empty() {
            let to_text = format!("to {to_version}");
            commit_message.push_str(&to_text);
            title.push_str(&to_text);
            details.to_version = to_version.to_string();
            match find_release(provider, &src_repo, to_version).await? {
                Some(release) => {
                    message.push_str(&format!("to [{}]({})", to_version, release.html_url));
                    details.to_release_name = Some(release.name);
                    details.to_release_html_url = Some(release.html_url);
                    assets = release.assets;
                }
                None => message.push_str(&to_text),
            }
        }
        update = Some(DependencyUpdate {
            details,
            paths: Vec::new(),
        });
    }

    Ok(UpdateDetails {
        commit_message,
        pull_request: PullRequestDetails {
            branch_name: bump_branch_name(kind),
            title,
            message,
        },
        update,
        assets,
    })
}
