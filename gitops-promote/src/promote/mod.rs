//! Promotion orchestration.
//!
//! Decides per environment between PR-based GitOps promotion and a direct
//! helm install, records progress in the activity tracker and drives the
//! merge watcher.

mod error;
mod helm;
mod request;

pub use error::PromoteError;
pub use helm::{CliHelm, HelmClient};
pub use request::{PromotionRequest, ReleaseInfo};

use crate::config::{automatic_environments, find_environment, Environment, PromotionStrategy};
use crate::delta::{self, PullRequestDetails};
use crate::git::{GitRepoRef, Gitter};
use crate::publisher::{
    ChartVersionChange, ProviderFactory, PublishError, PublisherConfig, PullRequestInfo,
    PullRequestPublisher,
};
use crate::tracker::{ActivityStatus, ActivityStore, PromotionKey, PromotionTracker, TrackerError};
use crate::watch::{MergeWatcher, WatchError, WatchHooks, WatchOptions};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Promotes application versions into environments.
pub struct Promoter {
    environments: Vec<Environment>,
    gitter: Arc<dyn Gitter>,
    providers: Arc<dyn ProviderFactory>,
    helm: Arc<dyn HelmClient>,
    store: Arc<dyn ActivityStore>,
}

impl Promoter {
    pub fn new(
        environments: Vec<Environment>,
        gitter: Arc<dyn Gitter>,
        providers: Arc<dyn ProviderFactory>,
        helm: Arc<dyn HelmClient>,
        store: Arc<dyn ActivityStore>,
    ) -> Self {
        Self {
            environments,
            gitter,
            providers,
            helm,
            store,
        }
    }

    fn tracker(&self, request: &PromotionRequest, environment: &str) -> PromotionTracker {
        PromotionTracker::new(
            self.store.clone(),
            PromotionKey {
                pipeline: request.pipeline.clone(),
                build: request.build.clone(),
                environment: environment.to_string(),
            },
        )
    }

    /// Promotes one application version to one environment.
    ///
    /// A permanent environment with a GitOps source gets a promotion pull
    /// request; success then means "the PR exists", not "the version is
    /// deployed" (see [`Promoter::wait_for_promotion`]). Anything else is
    /// installed directly with helm, bracketed by update transitions.
    pub async fn promote(
        &self,
        request: &PromotionRequest,
        environment: &str,
        target_namespace: Option<&str>,
        warn_if_auto: bool,
    ) -> Result<ReleaseInfo, PromoteError> {
        if request.application.trim().is_empty() {
            return Err(PromoteError::MissingApplication);
        }
        let env = find_environment(&self.environments, environment)?.clone();
        let span = info_span!("promote", app = %request.application, environment = %env.name);
        self.promote_inner(request, &env, target_namespace, warn_if_auto)
            .instrument(span)
            .await
    }

    async fn promote_inner(
        &self,
        request: &PromotionRequest,
        env: &Environment,
        target_namespace: Option<&str>,
        warn_if_auto: bool,
    ) -> Result<ReleaseInfo, PromoteError> {
        let namespace = target_namespace.unwrap_or(&env.namespace).to_string();
        let version = self.resolve_version(request).await?;

        if warn_if_auto && env.promotion_strategy == PromotionStrategy::Automatic && !request.batch {
            warn!(environment = %env.name, "environment is promoted to automatically on releases");
            let question = format!(
                "Promote {} to '{}' anyway?",
                request.application, env.name
            );
            if !confirm(&question)? {
                return Err(PromoteError::Aborted {
                    environment: env.name.clone(),
                });
            }
        }

        let tracker = self.tracker(request, &env.name);
        let mut release = ReleaseInfo {
            release_name: request
                .release_name
                .clone()
                .unwrap_or_else(|| format!("{}-{}", namespace, request.application)),
            full_app_name: request.application.clone(),
            version: version.clone(),
            pull_request: None,
        };

        if env.is_gitops() && env.kind.is_permanent() {
            info!(version = %version, "promoting via pull request");
            release.pull_request = self
                .promote_via_pull_request(request, env, &version, &tracker)
                .await?;
        } else {
            info!(version = %version, namespace = %namespace, "promoting via direct install");
            tracker.start_promotion_update().await?;
            let chart = format!("{}/{}", request.local_helm_repo, request.application);
            match self
                .helm
                .upgrade(&release.release_name, &chart, &version, &namespace)
                .await
            {
                Ok(()) => {
                    tracker.complete_promotion_update().await?;
                    if let Err(e) = self.comment_on_issues(request, env.label(), &version).await {
                        warn!(error = %e, "could not comment on issues");
                    }
                }
                Err(e) => {
                    tracker.failed_promotion_update().await?;
                    return Err(e);
                }
            }
        }
        Ok(release)
    }

    /// Promotes to every permanent automatic environment, in order,
    /// waiting for each promotion to land before starting the next.
    /// Short-circuits on the first hard error.
    pub async fn promote_all_automatic(
        &self,
        request: &PromotionRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReleaseInfo>, PromoteError> {
        let names: Vec<String> = automatic_environments(&self.environments)
            .iter()
            .map(|e| e.name.clone())
            .collect();
        if names.is_empty() {
            warn!("no automatic environments configured");
        }
        let mut releases = Vec::new();
        for name in names {
            let mut release = self.promote(request, &name, None, false).await?;
            self.wait_for_promotion(request, &name, &mut release, cancel).await?;
            releases.push(release);
        }
        Ok(releases)
    }

    /// Watches a promotion pull request through merge and deployment.
    ///
    /// Any terminal failure marks the step it died in failed before
    /// propagating: the update step when the pull request already merged,
    /// the pull-request step otherwise. A release without a pull request,
    /// or a request with `no_poll`, returns immediately.
    pub async fn wait_for_promotion(
        &self,
        request: &PromotionRequest,
        environment: &str,
        release: &mut ReleaseInfo,
        cancel: &CancellationToken,
    ) -> Result<(), PromoteError> {
        if request.no_poll {
            debug!("polling disabled, not waiting for promotion");
            return Ok(());
        }
        let env = find_environment(&self.environments, environment)?.clone();
        let Some(info) = release.pull_request.as_mut() else {
            return Ok(());
        };
        let tracker = self.tracker(request, &env.name);
        let options = WatchOptions {
            timeout: request.timeout,
            poll_interval: request.poll_interval,
            auto_merge: !request.no_merge,
            no_wait_after_merge: request.no_wait_after_merge,
            no_wait_for_update_pipeline: request.no_wait_for_update_pipeline,
        };
        let hooks = PromoterHooks {
            promoter: self,
            request,
            environment: env,
            version: release.version.clone(),
            tracker: tracker.clone(),
        };
        match MergeWatcher::new(options).wait(info, &tracker, &hooks, cancel).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(te) = record_watch_failure(&tracker).await {
                    warn!(error = %te, "could not record failed promotion");
                }
                Err(e.into())
            }
        }
    }

    async fn resolve_version(&self, request: &PromotionRequest) -> Result<String, PromoteError> {
        if !request.version.is_empty() {
            return Ok(request.version.clone());
        }
        info!(
            app = %request.application,
            repo = %request.local_helm_repo,
            "no version given, searching the helm repository"
        );
        self.helm
            .search_latest_version(&request.local_helm_repo, &request.application)
            .await?
            .ok_or_else(|| PromoteError::NoVersion {
                application: request.application.clone(),
            })
    }

    async fn promote_via_pull_request(
        &self,
        request: &PromotionRequest,
        env: &Environment,
        version: &str,
        tracker: &PromotionTracker,
    ) -> Result<Option<PullRequestInfo>, PromoteError> {
        let Some(source) = &env.source else {
            return Ok(None);
        };
        let app = &request.application;
        let details = PullRequestDetails {
            branch_name: format!("promote-{app}-{version}"),
            title: format!("chore: {app} to {version}"),
            message: format!("chore: Promote {app} to version {version}"),
        };
        let config = PublisherConfig {
            target_git_urls: vec![source.url.clone()],
            base_branch: source.git_ref.clone(),
            to_version: version.to_string(),
            details: Some(details),
            dry_run: request.dry_run,
            ..PublisherConfig::default()
        };
        let changes = ChartVersionChange {
            name: app.clone(),
            alias: None,
            version: version.to_string(),
            repository: request.helm_repository_url.clone(),
        };
        let publisher = PullRequestPublisher::new(self.gitter.clone(), self.providers.clone());
        let published = publisher.create_pull_request(&config, "app", &changes).await?;
        if let Some(info) = &published {
            tracker
                .start_promotion_pull_request(&info.pull_request.url)
                .await?;
        }
        Ok(published)
    }

    /// Comments "deployed" on every issue the promoted release closed.
    ///
    /// Issue numbers are mined from the release notes. Missing releases or
    /// an unset application git URL make this a no-op.
    pub async fn comment_on_issues(
        &self,
        request: &PromotionRequest,
        environment_label: &str,
        version: &str,
    ) -> Result<(), PublishError> {
        let Some(app_url) = &request.app_git_url else {
            return Ok(());
        };
        let repo = GitRepoRef::parse(app_url)?;
        let provider = self.providers.provider_for(&repo).await?;
        let Some(release) = delta::find_release(provider.as_ref(), &repo, version).await? else {
            debug!(version, "no release found, skipping issue comments");
            return Ok(());
        };

        let pattern = r"(?i)(?:closes|fixes|resolves)\s+#(\d+)";
        let re = Regex::new(pattern).map_err(|e| PublishError::Regex {
            pattern: pattern.to_string(),
            source: e,
        })?;
        let mut numbers: Vec<u64> = Vec::new();
        for caps in re.captures_iter(&release.body) {
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok()) {
                if !numbers.contains(&n) {
                    numbers.push(n);
                }
            }
        }
        for number in numbers {
            info!(issue = number, "commenting on closed issue");
            let comment = format!(
                "The fix for this issue is now deployed to **{environment_label}** in version [{version}]({}) :tada:",
                release.html_url
            );
            provider.create_issue_comment(&repo, number, &comment).await?;
        }
        Ok(())
    }
}

struct PromoterHooks<'a> {
    promoter: &'a Promoter,
    request: &'a PromotionRequest,
    environment: Environment,
    version: String,
    tracker: PromotionTracker,
}

#[async_trait]
impl WatchHooks for PromoterHooks<'_> {
    async fn recreate_pull_request(
        &self,
        _info: &PullRequestInfo,
    ) -> Result<Option<PullRequestInfo>, WatchError> {
        self.promoter
            .promote_via_pull_request(self.request, &self.environment, &self.version, &self.tracker)
            .await
            .map_err(|e| match e {
                PromoteError::Publish(p) => WatchError::Publish(p),
                PromoteError::Tracker(t) => WatchError::Tracker(t),
                other => WatchError::Hook {
                    message: other.to_string(),
                },
            })
    }

    async fn promotion_succeeded(&self) -> Result<(), WatchError> {
        self.promoter
            .comment_on_issues(self.request, self.environment.label(), &self.version)
            .await
            .map_err(WatchError::Publish)
    }
}

/// Fails the step the watch died in: the update step once the pull request
/// already merged, the pull-request step otherwise.
async fn record_watch_failure(tracker: &PromotionTracker) -> Result<(), TrackerError> {
    let pr_succeeded = tracker
        .activity()
        .await?
        .as_ref()
        .and_then(|a| a.promote_step(&tracker.key().environment))
        .and_then(|s| s.pull_request.as_ref())
        .is_some_and(|pr| pr.status == ActivityStatus::Succeeded);
    if pr_succeeded {
        tracker.failed_promotion_update().await
    } else {
        tracker.failed_promotion_pull_request().await
    }
}

fn confirm(question: &str) -> Result<bool, PromoteError> {
    use std::io::{BufRead, Write};
    let mut stderr = std::io::stderr();
    write!(stderr, "{question} [y/N]: ").map_err(PromoteError::Prompt)?;
    stderr.flush().map_err(PromoteError::Prompt)?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(PromoteError::Prompt)?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
