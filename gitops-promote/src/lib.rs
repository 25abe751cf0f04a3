#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

pub mod config;
pub mod delta;
pub mod dependency;
pub mod git;
pub mod promote;
pub mod provider;
pub mod publisher;
pub mod tracker;
pub mod watch;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{
    automatic_environments, find_environment, load_environments, ConfigError, Environment,
    EnvironmentKind, EnvironmentSource, PromotionStrategy,
};
pub use delta::{
    bump_branch_name, dependency_update_details, describe_old_versions, find_release,
    PullRequestDetails, UpdateDetails,
};
pub use dependency::{
    load_dependency_matrix, update_dependency_matrix, DependencyError, DependencyMatrix,
    DependencyUpdate,
};
pub use git::{to_valid_branch_name, CliGitter, GitError, GitRepoRef, Gitter};
pub use promote::{CliHelm, HelmClient, PromoteError, Promoter, PromotionRequest, ReleaseInfo};
pub use provider::{
    GitHubProvider, GitProvider, GitRelease, ProviderError, PullRequest, StatusState,
};
pub use publisher::{
    ChangeFiles, ChartVersionChange, ProviderFactory, PublishError, PublisherConfig,
    PullRequestInfo, PullRequestPublisher, RegexChange, UPDATEBOT_LABEL,
};
pub use tracker::{
    ActivityStatus, ActivityStore, InMemoryActivityStore, PipelineActivity, PromotionKey,
    PromotionTracker, TrackerError,
};
pub use watch::{MergeWatcher, NoopHooks, WatchError, WatchHooks, WatchOptions};
