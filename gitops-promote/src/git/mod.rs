//! Local git working-copy operations.
//!
//! The [`Gitter`] trait is the typed contract for everything the engine
//! does against a local clone; [`CliGitter`] implements it by shelling out
//! to the `git` binary.

mod error;
mod repo;

pub use error::GitError;
pub use repo::GitRepoRef;

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Client for operations on a local git working copy.
#[async_trait]
pub trait Gitter: Send + Sync {
    /// Clones `url` into `dir`.
    async fn clone_repo(&self, url: &str, dir: &Path) -> Result<(), GitError>;

    /// Checks out an existing branch or ref.
    async fn checkout(&self, dir: &Path, ref_name: &str) -> Result<(), GitError>;

    /// Creates and checks out a new branch.
    async fn create_branch(&self, dir: &Path, branch: &str) -> Result<(), GitError>;

    /// Stages all changes in the working tree.
    async fn add_all(&self, dir: &Path) -> Result<(), GitError>;

    /// Returns true when the index or working tree differs from HEAD.
    async fn has_changes(&self, dir: &Path) -> Result<bool, GitError>;

    /// Commits the staged changes.
    async fn commit(&self, dir: &Path, message: &str) -> Result<(), GitError>;

    /// Pushes `refspec` to `remote_url`.
    async fn push(&self, dir: &Path, remote_url: &str, force: bool, refspec: &str)
        -> Result<(), GitError>;

    /// Fetches the current branch's upstream.
    async fn pull(&self, dir: &Path) -> Result<(), GitError>;

    /// Configures the committer identity for the repository.
    async fn set_user(&self, dir: &Path, name: &str, email: &str) -> Result<(), GitError>;
}

/// [`Gitter`] backed by the `git` command line client.
#[derive(Debug, Clone, Default)]
pub struct CliGitter;

impl CliGitter {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        debug!(dir = %dir.display(), command = %args.join(" "), "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GitError::Spawn {
                command: args.join(" "),
                source: e,
            })?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Gitter for CliGitter {
    async fn clone_repo(&self, url: &str, dir: &Path) -> Result<(), GitError> {
        self.run(dir, &["clone", url, "."]).await.map(|_| ())
    }

    async fn checkout(&self, dir: &Path, ref_name: &str) -> Result<(), GitError> {
        self.run(dir, &["checkout", ref_name]).await.map(|_| ())
    }

    async fn create_branch(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        self.run(dir, &["checkout", "-b", branch]).await.map(|_| ())
    }

    async fn add_all(&self, dir: &Path) -> Result<(), GitError> {
        self.run(dir, &["add", "-A"]).await.map(|_| ())
    }

    async fn has_changes(&self, dir: &Path) -> Result<bool, GitError> {
        let stdout = self.run(dir, &["status", "--porcelain"]).await?;
        Ok(!stdout.trim().is_empty())
    }

    async fn commit(&self, dir: &Path, message: &str) -> Result<(), GitError> {
        self.run(dir, &["commit", "-m", message]).await.map(|_| ())
    }

    async fn push(
        &self,
        dir: &Path,
        remote_url: &str,
        force: bool,
        refspec: &str,
    ) -> Result<(), GitError> {
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.push(remote_url);
        args.push(refspec);
        self.run(dir, &args).await.map(|_| ())
    }

    async fn pull(&self, dir: &Path) -> Result<(), GitError> {
        self.run(dir, &["pull"]).await.map(|_| ())
    }

    async fn set_user(&self, dir: &Path, name: &str, email: &str) -> Result<(), GitError> {
        self.run(dir, &["config", "user.name", name]).await?;
        self.run(dir, &["config", "user.email", email]).await.map(|_| ())
    }
}

/// Converts arbitrary text into a name git accepts for a branch.
///
/// Invalid ref characters collapse to `-`; leading/trailing separators are
/// trimmed.
#[must_use]
pub fn to_valid_branch_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.') {
            out.push(c);
        } else {
            out.push('-');
        }
    }
    out.trim_matches(|c| matches!(c, '-' | '/' | '.')).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_branch_names() {
        assert_eq!(to_valid_branch_name("promote-myapp-1.2.3"), "promote-myapp-1.2.3");
        assert_eq!(to_valid_branch_name("chore: bump to v2"), "chore--bump-to-v2");
        assert_eq!(to_valid_branch_name("/weird..name/"), "weird..name");
    }
}
