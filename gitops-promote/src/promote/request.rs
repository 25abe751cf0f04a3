//! The promotion request and its result.

use crate::publisher::PullRequestInfo;
use std::time::Duration;

/// Everything one promotion run needs, passed explicitly instead of living
/// in ambient state.
#[derive(Debug, Clone)]
pub struct PromotionRequest {
    /// Application (chart) being promoted.
    pub application: String,

    /// Version to promote; empty means "latest in the helm repository".
    pub version: String,

    /// Git URL of the application's own repository, used for release
    /// lookups and issue comments.
    pub app_git_url: Option<String>,

    /// Overrides the helm release name, which otherwise defaults to
    /// `<namespace>-<application>`.
    pub release_name: Option<String>,

    /// Name of the local helm repository holding release charts.
    pub local_helm_repo: String,

    /// Chart repository URL recorded when the application is added to an
    /// environment for the first time.
    pub helm_repository_url: Option<String>,

    /// Pipeline this promotion belongs to, e.g. `acme/myapp/master`.
    pub pipeline: String,

    /// Build number within the pipeline.
    pub build: String,

    /// Non-interactive mode: never prompt.
    pub batch: bool,

    /// Stop before pushing or opening pull requests.
    pub dry_run: bool,

    /// Never merge pull requests ourselves.
    pub no_merge: bool,

    /// Do not watch the pull request at all.
    pub no_poll: bool,

    /// Stop watching once the merge commit is known.
    pub no_wait_after_merge: bool,

    /// After merge, do not wait for the environment's update pipeline.
    pub no_wait_for_update_pipeline: bool,

    /// Overall wait deadline for merge plus deploy.
    pub timeout: Duration,

    /// Sleep between watch polls.
    pub poll_interval: Duration,
}

impl Default for PromotionRequest {
    fn default() -> Self {
        Self {
            application: String::new(),
            version: String::new(),
            app_git_url: None,
            release_name: None,
            local_helm_repo: "releases".to_string(),
            helm_repository_url: None,
            pipeline: String::new(),
            build: String::new(),
            batch: false,
            dry_run: false,
            no_merge: false,
            no_poll: false,
            no_wait_after_merge: false,
            no_wait_for_update_pipeline: false,
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(20),
        }
    }
}

/// The outcome of promoting one application to one environment.
#[derive(Debug, Clone)]
pub struct ReleaseInfo {
    /// Helm release name, `<namespace>-<application>`.
    pub release_name: String,

    /// Fully qualified application name.
    pub full_app_name: String,

    /// Version that was promoted.
    pub version: String,

    /// The promotion pull request; `None` for direct installs and for
    /// no-op promotions where the environment already carried the version.
    pub pull_request: Option<PullRequestInfo>,
}
