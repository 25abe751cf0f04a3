//! Watching a promotion pull request through to a deployed release.
//!
//! The watcher polls the provider until the PR merges and the environment's
//! update pipeline reports green, auto-merging and recreating conflicted
//! PRs along the way.

mod error;

pub use error::WatchError;

use crate::provider::{aggregate_status, StatusState};
use crate::publisher::PullRequestInfo;
use crate::tracker::{GitStatusEntry, PromotionTracker};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Status context owned by an external merge bot. When present the watcher
/// never merges on its own.
pub const TIDE_CONTEXT: &str = "tide";

/// Knobs for one watch.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Overall deadline for merge plus update pipeline.
    pub timeout: Duration,

    /// Sleep between provider polls.
    pub poll_interval: Duration,

    /// Merge the PR ourselves once its checks are green.
    pub auto_merge: bool,

    /// Stop as soon as the merge commit is known.
    pub no_wait_after_merge: bool,

    /// After merge, do not wait for the environment's update pipeline.
    pub no_wait_for_update_pipeline: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(20),
            auto_merge: true,
            no_wait_after_merge: false,
            no_wait_for_update_pipeline: false,
        }
    }
}

/// Callbacks the watcher needs from its caller.
#[async_trait]
pub trait WatchHooks: Send + Sync {
    /// Rebuilds the pull request after a merge conflict. Returning `None`
    /// leaves the current PR in place.
    async fn recreate_pull_request(
        &self,
        info: &PullRequestInfo,
    ) -> Result<Option<PullRequestInfo>, WatchError> {
        let _ = info;
        Ok(None)
    }

    /// Invoked once the promotion has landed, before the watch returns.
    async fn promotion_succeeded(&self) -> Result<(), WatchError> {
        Ok(())
    }
}

/// Hooks that do nothing.
pub struct NoopHooks;

impl WatchHooks for NoopHooks {}

/// Polls a promotion pull request until it lands, fails or times out.
pub struct MergeWatcher {
    options: WatchOptions,
}

impl MergeWatcher {
    pub fn new(options: WatchOptions) -> Self {
        Self { options }
    }

    /// Runs the watch loop.
    ///
    /// `info` is refreshed in place each tick and replaced wholesale when a
    /// merge conflict forces the PR to be recreated. Transient refresh
    /// errors are logged and retried; terminal outcomes are returned. The
    /// caller records the failed step transition on error.
    pub async fn wait(
        &self,
        info: &mut PullRequestInfo,
        tracker: &PromotionTracker,
        hooks: &dyn WatchHooks,
        cancel: &CancellationToken,
    ) -> Result<(), WatchError> {
        let span = info_span!("merge_watch", pr = %info.pull_request.url);
        self.wait_inner(info, tracker, hooks, cancel).instrument(span).await
    }

    async fn wait_inner(
        &self,
        info: &mut PullRequestInfo,
        tracker: &PromotionTracker,
        hooks: &dyn WatchHooks,
        cancel: &CancellationToken,
    ) -> Result<(), WatchError> {
        let start = Instant::now();
        let mut pr_complete_recorded = false;
        // Latest observed state per status URL, kept across ticks so a
        // check that went green stays counted even if it stops reporting.
        let mut url_states: HashMap<String, StatusState> = HashMap::new();

        loop {
            let repo = info.arguments.repository.clone();
            match info
                .provider
                .get_pull_request(&repo, info.pull_request.number)
                .await
            {
                Ok(pr) => info.pull_request = pr,
                Err(e) => {
                    warn!(error = %e, "could not refresh pull request, will retry");
                }
            }
            let pr = info.pull_request.clone();

            if pr.merged {
                let Some(merge_sha) = pr.merge_commit_sha.clone() else {
                    debug!("merged but merge commit not yet known");
                    self.sleep_or_bail(start, &pr.url, cancel).await?;
                    continue;
                };

                if !pr_complete_recorded {
                    info!(sha = %merge_sha, "pull request merged");
                    tracker.complete_promotion_pull_request(&merge_sha).await?;
                    pr_complete_recorded = true;

                    if self.options.no_wait_after_merge {
                        return Ok(());
                    }
                    tracker.start_promotion_update().await?;
                    if self.options.no_wait_for_update_pipeline {
                        hooks.promotion_succeeded().await?;
                        tracker.complete_promotion_update().await?;
                        return Ok(());
                    }
                }

                match info.provider.list_commit_statuses(&repo, &merge_sha).await {
                    Ok(statuses) => {
                        if let Some(failed) = statuses.iter().find(|s| s.state.is_failed()) {
                            return Err(WatchError::StatusFailed {
                                context: failed.context.clone(),
                                description: failed.description.clone(),
                            });
                        }
                        // Newest first from the provider; keep the first
                        // occurrence per URL for this tick.
                        let mut tick: HashMap<String, StatusState> = HashMap::new();
                        for status in &statuses {
                            tick.entry(status.url.clone()).or_insert(status.state);
                        }
                        url_states.extend(tick);

                        if !url_states.is_empty()
                            && url_states.values().all(|s| *s == StatusState::Success)
                        {
                            info!("update pipeline succeeded");
                            hooks.promotion_succeeded().await?;
                            tracker.complete_promotion_update().await?;
                            return Ok(());
                        }
                        let entries = url_states
                            .iter()
                            .map(|(url, state)| GitStatusEntry {
                                url: url.clone(),
                                status: state.as_str().to_string(),
                            })
                            .collect();
                        tracker.record_update_statuses(entries).await?;
                    }
                    Err(e) => {
                        warn!(error = %e, "could not list commit statuses, will retry");
                    }
                }
            } else {
                if pr.closed {
                    return Err(WatchError::ClosedWithoutMerge { url: pr.url.clone() });
                }

                match info.provider.list_commit_statuses(&repo, &pr.last_commit_sha).await {
                    Ok(statuses) => {
                        if let Some(failed) = statuses.iter().find(|s| s.state.is_failed()) {
                            return Err(WatchError::StatusFailed {
                                context: failed.context.clone(),
                                description: failed.description.clone(),
                            });
                        }
                        let state = aggregate_status(&statuses);
                        let has_tide = statuses.iter().any(|s| s.context == TIDE_CONTEXT);
                        if state == StatusState::Success && self.options.auto_merge && !has_tide {
                            info!("checks green, merging pull request");
                            if let Err(e) = info
                                .provider
                                .merge_pull_request(&pr, "merged by promotion")
                                .await
                            {
                                // Another actor may win the merge race.
                                warn!(error = %e, "merge attempt failed, will retry");
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "could not list commit statuses, will retry");
                    }
                }

                if pr.mergeable == Some(false) {
                    info!("pull request has conflicts, recreating");
                    if let Some(recreated) = hooks.recreate_pull_request(info).await? {
                        *info = recreated;
                    }
                }
            }

            self.sleep_or_bail(start, &info.pull_request.url, cancel).await?;
        }
    }

    async fn sleep_or_bail(
        &self,
        start: Instant,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), WatchError> {
        if start.elapsed() >= self.options.timeout {
            return Err(WatchError::TimedOut {
                url: url.to_string(),
                timeout: self.options.timeout,
            });
        }
        tokio::select! {
            () = cancel.cancelled() => Err(WatchError::Cancelled),
            () = tokio::time::sleep(self.options.poll_interval) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitRepoRef;
    use crate::provider::{CommitStatus, PullRequest, PullRequestArguments};
    use crate::testing::{pull_request, FakeProvider};
    use crate::tracker::{ActivityStatus, InMemoryActivityStore, PromotionKey};
    use std::sync::Arc;
    use std::sync::Mutex;

    fn tracker() -> PromotionTracker {
        PromotionTracker::new(
            Arc::new(InMemoryActivityStore::new()),
            PromotionKey {
                pipeline: "acme/myapp/master".to_string(),
                build: "1".to_string(),
                environment: "staging".to_string(),
            },
        )
    }

    fn info(provider: Arc<FakeProvider>, pr: PullRequest) -> PullRequestInfo {
        PullRequestInfo {
            provider,
            arguments: PullRequestArguments {
                repository: GitRepoRef::new("github.com", &pr.owner, &pr.repo),
                title: pr.title.clone(),
                body: pr.body.clone(),
                base: "master".to_string(),
                head: pr.head_ref.clone(),
                labels: Vec::new(),
            },
            pull_request: pr,
        }
    }

    fn options() -> WatchOptions {
        WatchOptions {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
            ..WatchOptions::default()
        }
    }

    fn status(url: &str, context: &str, state: StatusState) -> CommitStatus {
        CommitStatus {
            state,
            context: context.to_string(),
            url: url.to_string(),
            target_url: String::new(),
            description: format!("{context} is {}", state.as_str()),
        }
    }

    fn merged_pr(number: u64) -> PullRequest {
        let mut pr = pull_request(number, "promote-myapp-1.0.0", &[]);
        pr.merged = true;
        pr.closed = true;
        pr.merge_commit_sha = Some("mergesha".to_string());
        pr
    }

    #[tokio::test]
    async fn succeeds_when_merged_and_statuses_green() {
        let provider = Arc::new(FakeProvider::new("bot"));
        provider.push_pr_state(merged_pr(1));
        provider.set_statuses(
            "mergesha",
            vec![status("u1", "pipeline", StatusState::Success)],
        );
        let tracker = tracker();
        let mut info = info(provider, merged_pr(1));

        MergeWatcher::new(options())
            .wait(&mut info, &tracker, &NoopHooks, &CancellationToken::new())
            .await
            .unwrap();

        let activity = tracker.activity().await.unwrap().unwrap();
        let step = activity.promote_step("staging").unwrap();
        assert_eq!(step.pull_request.as_ref().unwrap().status, ActivityStatus::Succeeded);
        assert_eq!(
            step.pull_request.as_ref().unwrap().merge_commit_sha.as_deref(),
            Some("mergesha")
        );
        assert_eq!(step.update.as_ref().unwrap().status, ActivityStatus::Succeeded);
    }

    #[tokio::test]
    async fn no_wait_after_merge_returns_before_statuses() {
        let provider = Arc::new(FakeProvider::new("bot"));
        provider.push_pr_state(merged_pr(1));
        let tracker = tracker();
        let mut info = info(provider, merged_pr(1));

        let mut opts = options();
        opts.no_wait_after_merge = true;
        MergeWatcher::new(opts)
            .wait(&mut info, &tracker, &NoopHooks, &CancellationToken::new())
            .await
            .unwrap();

        let activity = tracker.activity().await.unwrap().unwrap();
        assert!(activity.promote_step("staging").unwrap().update.is_none());
    }

    #[tokio::test]
    async fn fails_immediately_on_failed_status_pre_merge() {
        let provider = Arc::new(FakeProvider::new("bot"));
        let pr = pull_request(1, "promote-myapp-1.0.0", &[]);
        provider.push_pr_state(pr.clone());
        provider.set_statuses("headsha", vec![status("u1", "lint", StatusState::Failure)]);
        let tracker = tracker();
        let mut info = info(provider, pr);

        let result = MergeWatcher::new(options())
            .wait(&mut info, &tracker, &NoopHooks, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(WatchError::StatusFailed { .. })));
    }

    #[tokio::test]
    async fn fails_on_closed_without_merge() {
        let provider = Arc::new(FakeProvider::new("bot"));
        let mut pr = pull_request(1, "promote-myapp-1.0.0", &[]);
        pr.closed = true;
        provider.push_pr_state(pr.clone());
        let tracker = tracker();
        let mut info = info(provider, pr);

        let result = MergeWatcher::new(options())
            .wait(&mut info, &tracker, &NoopHooks, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(WatchError::ClosedWithoutMerge { .. })));
    }

    #[tokio::test]
    async fn auto_merges_when_green_and_no_tide() {
        let provider = Arc::new(FakeProvider::new("bot"));
        let pr = pull_request(1, "promote-myapp-1.0.0", &[]);
        provider.push_pr_state(pr.clone());
        provider.push_pr_state(merged_pr(1));
        provider.set_statuses("headsha", vec![status("u1", "ci", StatusState::Success)]);
        provider.set_statuses("mergesha", vec![status("u2", "pipeline", StatusState::Success)]);
        let tracker = tracker();
        let mut info = info(provider.clone(), pr);

        MergeWatcher::new(options())
            .wait(&mut info, &tracker, &NoopHooks, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provider.merged_numbers(), vec![1]);
    }

    #[tokio::test]
    async fn tide_context_suppresses_auto_merge() {
        let provider = Arc::new(FakeProvider::new("bot"));
        let pr = pull_request(1, "promote-myapp-1.0.0", &[]);
        provider.push_pr_state(pr.clone());
        provider.push_pr_state(merged_pr(1));
        provider.set_statuses(
            "headsha",
            vec![
                status("u1", "ci", StatusState::Success),
                status("u2", TIDE_CONTEXT, StatusState::Success),
            ],
        );
        provider.set_statuses("mergesha", vec![status("u3", "pipeline", StatusState::Success)]);
        let tracker = tracker();
        let mut info = info(provider.clone(), pr);

        MergeWatcher::new(options())
            .wait(&mut info, &tracker, &NoopHooks, &CancellationToken::new())
            .await
            .unwrap();

        assert!(provider.merged_numbers().is_empty());
    }

    #[tokio::test]
    async fn merge_failure_does_not_abort_the_loop() {
        let provider = Arc::new(FakeProvider::new("bot"));
        let pr = pull_request(1, "promote-myapp-1.0.0", &[]);
        provider.push_pr_state(pr.clone());
        provider.push_pr_state(merged_pr(1));
        provider.set_statuses("headsha", vec![status("u1", "ci", StatusState::Success)]);
        provider.set_statuses("mergesha", vec![status("u2", "pipeline", StatusState::Success)]);
        provider.fail_merges();
        let tracker = tracker();
        let mut info = info(provider, pr);

        MergeWatcher::new(options())
            .wait(&mut info, &tracker, &NoopHooks, &CancellationToken::new())
            .await
            .unwrap();
    }

    struct RecreatingHooks {
        replacement: Mutex<Option<PullRequestInfo>>,
    }

    #[async_trait]
    impl WatchHooks for RecreatingHooks {
        async fn recreate_pull_request(
            &self,
            _info: &PullRequestInfo,
        ) -> Result<Option<PullRequestInfo>, WatchError> {
            Ok(self.replacement.lock().unwrap().take())
        }
    }

    #[tokio::test]
    async fn conflict_triggers_recreation() {
        let provider = Arc::new(FakeProvider::new("bot"));
        let mut conflicted = pull_request(1, "promote-myapp-1.0.0", &[]);
        conflicted.mergeable = Some(false);
        provider.push_pr_state(conflicted.clone());
        provider.push_pr_state(merged_pr(2));
        provider.set_statuses("mergesha", vec![status("u1", "pipeline", StatusState::Success)]);

        let replacement = info(provider.clone(), pull_request(2, "promote-myapp-1.0.0-2", &[]));
        let hooks = RecreatingHooks {
            replacement: Mutex::new(Some(replacement)),
        };
        let tracker = tracker();
        let mut info = info(provider, conflicted);

        MergeWatcher::new(options())
            .wait(&mut info, &tracker, &hooks, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(info.pull_request.number, 2);
    }

    #[tokio::test]
    async fn timeout_names_the_configured_duration() {
        let provider = Arc::new(FakeProvider::new("bot"));
        let pr = pull_request(1, "promote-myapp-1.0.0", &[]);
        provider.push_pr_state(pr.clone());
        let tracker = tracker();
        let mut info = info(provider, pr);

        let mut opts = options();
        opts.timeout = Duration::from_millis(0);
        let result = MergeWatcher::new(opts)
            .wait(&mut info, &tracker, &NoopHooks, &CancellationToken::new())
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, WatchError::TimedOut { .. }));
        assert!(err.to_string().contains("0s"));
    }

    #[tokio::test]
    async fn cancellation_stops_the_watch() {
        let provider = Arc::new(FakeProvider::new("bot"));
        let pr = pull_request(1, "promote-myapp-1.0.0", &[]);
        provider.push_pr_state(pr.clone());
        let tracker = tracker();
        let mut info = info(provider, pr);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = MergeWatcher::new(options())
            .wait(&mut info, &tracker, &NoopHooks, &cancel)
            .await;

        assert!(matches!(result, Err(WatchError::Cancelled)));
    }
}
