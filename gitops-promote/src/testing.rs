//! Fake collaborators for unit tests.

use crate::git::{GitError, GitRepoRef, Gitter};
use crate::provider::{
    CommitStatus, GitProvider, GitRelease, ProviderError, PullRequest, PullRequestArguments,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

/// A [`Gitter`] that records operations instead of running git.
pub(crate) struct FakeGitter {
    dirty: bool,
    commits: Mutex<Vec<String>>,
    pushes: Mutex<Vec<(String, String)>>,
    pushed_files: Mutex<Vec<String>>,
}

impl FakeGitter {
    /// A gitter whose working tree always reports changes.
    pub(crate) fn dirty() -> Self {
        Self {
            dirty: true,
            commits: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
            pushed_files: Mutex::new(Vec::new()),
        }
    }

    /// A gitter whose working tree never reports changes.
    pub(crate) fn clean() -> Self {
        Self {
            dirty: false,
            ..Self::dirty()
        }
    }

    pub(crate) fn commits(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }

    pub(crate) fn pushed_refspecs(&self) -> Vec<String> {
        self.pushes.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Relative paths of the files in the working copy when `push` ran.
    ///
    /// The caller's working copy is a temporary directory that is gone by
    /// the time a test regains control, so the snapshot is taken here.
    pub(crate) fn pushed_files(&self) -> Vec<String> {
        self.pushed_files.lock().unwrap().clone()
    }

    fn snapshot_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                Self::snapshot_files(root, &path, out);
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
}

#[async_trait]
impl Gitter for FakeGitter {
    async fn clone_repo(&self, _url: &str, _dir: &Path) -> Result<(), GitError> {
        Ok(())
    }
    async fn checkout(&self, _dir: &Path, _ref_name: &str) -> Result<(), GitError> {
        Ok(())
    }
    async fn create_branch(&self, _dir: &Path, _branch: &str) -> Result<(), GitError> {
        Ok(())
    }
    async fn add_all(&self, _dir: &Path) -> Result<(), GitError> {
        Ok(())
    }
    async fn has_changes(&self, _dir: &Path) -> Result<bool, GitError> {
        Ok(self.dirty)
    }
    async fn commit(&self, _dir: &Path, message: &str) -> Result<(), GitError> {
        self.commits.lock().unwrap().push(message.to_string());
        Ok(())
    }
    async fn push(
        &self,
        dir: &Path,
        remote_url: &str,
        _force: bool,
        refspec: &str,
    ) -> Result<(), GitError> {
        self.pushes
            .lock()
            .unwrap()
            .push((remote_url.to_string(), refspec.to_string()));
        let mut files = Vec::new();
        Self::snapshot_files(dir, dir, &mut files);
        *self.pushed_files.lock().unwrap() = files;
        Ok(())
    }
    async fn pull(&self, _dir: &Path) -> Result<(), GitError> {
        Ok(())
    }
    async fn set_user(&self, _dir: &Path, _name: &str, _email: &str) -> Result<(), GitError> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeProviderState {
    open: Vec<PullRequest>,
    created: usize,
    next_number: u64,
    pr_states: VecDeque<PullRequest>,
    statuses: HashMap<String, Vec<CommitStatus>>,
    releases: HashMap<String, GitRelease>,
    comments: Vec<(u64, String)>,
    merged: Vec<u64>,
    fail_merge: bool,
    fork: bool,
}

/// A [`GitProvider`] whose responses are scripted by the test.
pub(crate) struct FakeProvider {
    username: String,
    state: Mutex<FakeProviderState>,
}

/// Builds a pull request with the given shape and sensible defaults.
pub(crate) fn pull_request(number: u64, head_ref: &str, labels: &[&str]) -> PullRequest {
    PullRequest {
        number,
        url: format!("https://github.com/acme/environment-staging/pull/{number}"),
        owner: "acme".to_string(),
        repo: "environment-staging".to_string(),
        title: String::new(),
        body: String::new(),
        closed: false,
        merged: false,
        merge_commit_sha: None,
        mergeable: Some(true),
        last_commit_sha: "headsha".to_string(),
        head_ref: head_ref.to_string(),
        head_owner: Some("acme".to_string()),
        labels: labels.iter().map(|l| l.to_string()).collect(),
    }
}

impl FakeProvider {
    pub(crate) fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            state: Mutex::new(FakeProviderState {
                next_number: 1,
                ..FakeProviderState::default()
            }),
        }
    }

    pub(crate) fn seed_open_pull_request(&self, head_ref: &str, labels: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let number = state.next_number;
        state.next_number += 1;
        state.open.push(pull_request(number, head_ref, labels));
    }

    /// Queues a state for successive `get_pull_request` calls; the last
    /// queued state repeats once the queue drains down to it.
    pub(crate) fn push_pr_state(&self, pr: PullRequest) {
        self.state.lock().unwrap().pr_states.push_back(pr);
    }

    pub(crate) fn set_statuses(&self, sha: &str, statuses: Vec<CommitStatus>) {
        self.state.lock().unwrap().statuses.insert(sha.to_string(), statuses);
    }

    pub(crate) fn seed_release(&self, release: GitRelease) {
        self.state
            .lock()
            .unwrap()
            .releases
            .insert(release.tag.clone(), release);
    }

    pub(crate) fn fail_merges(&self) {
        self.state.lock().unwrap().fail_merge = true;
    }

    pub(crate) fn set_fork_required(&self) {
        self.state.lock().unwrap().fork = true;
    }

    pub(crate) fn created_pull_requests(&self) -> usize {
        self.state.lock().unwrap().created
    }

    pub(crate) fn merged_numbers(&self) -> Vec<u64> {
        self.state.lock().unwrap().merged.clone()
    }

    pub(crate) fn comments(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().comments.clone()
    }
}

#[async_trait]
impl GitProvider for FakeProvider {
    fn current_username(&self) -> &str {
        &self.username
    }

    fn clone_url(&self, repo: &GitRepoRef) -> String {
        format!("{}.git", repo.https_url())
    }

    async fn get_pull_request(
        &self,
        _repo: &GitRepoRef,
        number: u64,
    ) -> Result<PullRequest, ProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.pr_states.len() > 1 {
            return Ok(state.pr_states.pop_front().unwrap());
        }
        if let Some(pr) = state.pr_states.front() {
            return Ok(pr.clone());
        }
        state
            .open
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
            .ok_or(ProviderError::MissingField {
                operation: "get_pull_request",
                field: "number",
            })
    }

    async fn create_pull_request(
        &self,
        args: &PullRequestArguments,
    ) -> Result<PullRequest, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let number = state.next_number;
        state.next_number += 1;
        state.created += 1;
        let head_ref = args.head.rsplit(':').next().unwrap_or(&args.head).to_string();
        let mut pr = pull_request(number, &head_ref, &[]);
        pr.owner = args.repository.owner.clone();
        pr.repo = args.repository.name.clone();
        pr.title = args.title.clone();
        pr.body = args.body.clone();
        state.open.push(pr.clone());
        Ok(pr)
    }

    async fn update_pull_request(
        &self,
        number: u64,
        args: &PullRequestArguments,
    ) -> Result<PullRequest, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let pr = state
            .open
            .iter_mut()
            .find(|pr| pr.number == number)
            .ok_or(ProviderError::MissingField {
                operation: "update_pull_request",
                field: "number",
            })?;
        pr.title = args.title.clone();
        pr.body = args.body.clone();
        Ok(pr.clone())
    }

    async fn list_open_pull_requests(
        &self,
        _repo: &GitRepoRef,
    ) -> Result<Vec<PullRequest>, ProviderError> {
        Ok(self.state.lock().unwrap().open.clone())
    }

    async fn merge_pull_request(
        &self,
        pr: &PullRequest,
        _message: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_merge {
            return Err(ProviderError::MissingField {
                operation: "merge_pull_request",
                field: "denied",
            });
        }
        state.merged.push(pr.number);
        Ok(())
    }

    async fn list_commit_statuses(
        &self,
        _repo: &GitRepoRef,
        sha: &str,
    ) -> Result<Vec<CommitStatus>, ProviderError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .statuses
            .get(sha)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_labels(
        &self,
        _repo: &GitRepoRef,
        number: u64,
        labels: &[String],
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        if let Some(pr) = state.open.iter_mut().find(|pr| pr.number == number) {
            for label in labels {
                if !pr.labels.contains(label) {
                    pr.labels.push(label.clone());
                }
            }
        }
        Ok(())
    }

    async fn create_issue_comment(
        &self,
        _repo: &GitRepoRef,
        number: u64,
        body: &str,
    ) -> Result<(), ProviderError> {
        self.state
            .lock()
            .unwrap()
            .comments
            .push((number, body.to_string()));
        Ok(())
    }

    async fn get_release(
        &self,
        _repo: &GitRepoRef,
        tag: &str,
    ) -> Result<Option<GitRelease>, ProviderError> {
        Ok(self.state.lock().unwrap().releases.get(tag).cloned())
    }

    async fn get_latest_release(
        &self,
        _repo: &GitRepoRef,
    ) -> Result<Option<GitRelease>, ProviderError> {
        Ok(self.state.lock().unwrap().releases.values().next().cloned())
    }

    async fn should_fork(&self, _repo: &GitRepoRef) -> Result<bool, ProviderError> {
        Ok(self.state.lock().unwrap().fork)
    }

    async fn ensure_fork(&self, repo: &GitRepoRef) -> Result<GitRepoRef, ProviderError> {
        Ok(GitRepoRef::new(&repo.host, &self.username, &repo.name))
    }
}
