//! Parsed git repository coordinates.

use crate::git::GitError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Host, owner and name of a git repository, parsed from its URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepoRef {
    /// Git host, e.g. `github.com`.
    pub host: String,

    /// Owner or organisation.
    pub owner: String,

    /// Repository name without the `.git` suffix.
    pub name: String,
}

impl GitRepoRef {
    pub fn new(host: &str, owner: &str, name: &str) -> Self {
        Self {
            host: host.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    /// Parses an https or scp-like git URL into its coordinates.
    pub fn parse(git_url: &str) -> Result<Self, GitError> {
        // scp-like form: git@github.com:owner/repo.git
        if let Some(rest) = git_url.strip_prefix("git@") {
            let (host, path) = rest.split_once(':').ok_or_else(|| GitError::InvalidUrl {
                url: git_url.to_string(),
                message: "missing ':' in scp-like URL".to_string(),
            })?;
            return Self::from_parts(git_url, host, path);
        }

        let url = Url::parse(git_url).map_err(|e| GitError::InvalidUrl {
            url: git_url.to_string(),
            message: e.to_string(),
        })?;
        let host = url.host_str().ok_or_else(|| GitError::InvalidUrl {
            url: git_url.to_string(),
            message: "missing host".to_string(),
        })?;
        Self::from_parts(git_url, host, url.path())
    }

    fn from_parts(git_url: &str, host: &str, path: &str) -> Result<Self, GitError> {
        let mut segments = path.trim_matches('/').splitn(2, '/');
        let owner = segments.next().unwrap_or_default();
        let name = segments
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .trim_end_matches(".git");
        if owner.is_empty() || name.is_empty() {
            return Err(GitError::InvalidUrl {
                url: git_url.to_string(),
                message: "expected <host>/<owner>/<repo>".to_string(),
            });
        }
        Ok(Self::new(host, owner, name))
    }

    /// Returns `owner/name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Returns the canonical https URL of the repository.
    #[must_use]
    pub fn https_url(&self) -> String {
        format!("https://{}/{}/{}", self.host, self.owner, self.name)
    }

    /// Returns an https clone URL embedding the given access token.
    #[must_use]
    pub fn clone_url_with_token(&self, token: &str) -> String {
        format!(
            "https://x-access-token:{}@{}/{}/{}.git",
            token, self.host, self.owner, self.name
        )
    }
}
