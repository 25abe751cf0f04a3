//! The promotion activity record and its pure state transitions.
//!
//! Every mutation of a [`PipelineActivity`] goes through a named transition
//! function here. The functions are idempotent: re-applying a completion to
//! an already-completed step changes nothing, so retried watch ticks are
//! harmless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an activity step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ActivityStatus {
    /// True once the step can no longer change.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One commit status observed while waiting for the update pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatusEntry {
    pub url: String,
    pub status: String,
}

/// The pull-request half of a promotion step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotePullRequestStep {
    pub status: ActivityStatus,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub pull_request_url: Option<String>,
    pub merge_commit_sha: Option<String>,
}

/// The post-merge update half of a promotion step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoteUpdateStep {
    pub status: ActivityStatus,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub statuses: Vec<GitStatusEntry>,
}

/// Promotion progress for one environment within a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoteStep {
    pub environment: String,
    pub pull_request: Option<PromotePullRequestStep>,
    pub update: Option<PromoteUpdateStep>,
}

/// The externally visible record of one pipeline run's promotions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineActivity {
    /// Store key, derived from pipeline and build.
    pub name: String,
    pub pipeline: String,
    pub build: String,
    pub steps: Vec<PromoteStep>,
}

impl PipelineActivity {
    /// The promotion step for `environment`, created on first use.
    pub fn promote_step_mut(&mut self, environment: &str) -> &mut PromoteStep {
        if let Some(i) = self.steps.iter().position(|s| s.environment == environment) {
            return &mut self.steps[i];
        }
        self.steps.push(PromoteStep {
            environment: environment.to_string(),
            ..PromoteStep::default()
        });
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    /// The promotion step for `environment`, if one was ever started.
    #[must_use]
    pub fn promote_step(&self, environment: &str) -> Option<&PromoteStep> {
        self.steps.iter().find(|s| s.environment == environment)
    }
}

/// Marks the PR step started and records the PR URL.
pub fn start_promotion_pull_request(
    activity: &mut PipelineActivity,
    environment: &str,
    pull_request_url: &str,
) {
    let step = activity.promote_step_mut(environment);
    let pr = step.pull_request.get_or_insert_with(PromotePullRequestStep::default);
    if pr.status.is_terminal() {
        return;
    }
    pr.status = ActivityStatus::Running;
    pr.started.get_or_insert_with(Utc::now);
    pr.pull_request_url = Some(pull_request_url.to_string());
}

/// Marks the PR step succeeded, recording the merge commit.
pub fn complete_promotion_pull_request(
    activity: &mut PipelineActivity,
    environment: &str,
    merge_commit_sha: &str,
) {
    let step = activity.promote_step_mut(environment);
    let pr = step.pull_request.get_or_insert_with(PromotePullRequestStep::default);
    if pr.status == ActivityStatus::Succeeded {
        return;
    }
    pr.status = ActivityStatus::Succeeded;
    pr.completed.get_or_insert_with(Utc::now);
    pr.merge_commit_sha = Some(merge_commit_sha.to_string());
}

/// Marks the PR step failed.
pub fn failed_promotion_pull_request(activity: &mut PipelineActivity, environment: &str) {
    let step = activity.promote_step_mut(environment);
    let pr = step.pull_request.get_or_insert_with(PromotePullRequestStep::default);
    if pr.status == ActivityStatus::Succeeded {
        return;
    }
    pr.status = ActivityStatus::Failed;
    pr.completed.get_or_insert_with(Utc::now);
}

/// Marks the post-merge update step started.
pub fn start_promotion_update(activity: &mut PipelineActivity, environment: &str) {
    let step = activity.promote_step_mut(environment);
    let update = step.update.get_or_insert_with(PromoteUpdateStep::default);
    if update.status.is_terminal() {
        return;
    }
    update.status = ActivityStatus::Running;
    update.started.get_or_insert_with(Utc::now);
}

/// Marks the post-merge update step succeeded.
pub fn complete_promotion_update(activity: &mut PipelineActivity, environment: &str) {
    let step = activity.promote_step_mut(environment);
    let update = step.update.get_or_insert_with(PromoteUpdateStep::default);
    if update.status == ActivityStatus::Succeeded {
        return;
    }
    update.status = ActivityStatus::Succeeded;
    update.completed.get_or_insert_with(Utc::now);
}

/// Marks the post-merge update step failed.
pub fn failed_promotion_update(activity: &mut PipelineActivity, environment: &str) {
    let step = activity.promote_step_mut(environment);
    let update = step.update.get_or_insert_with(PromoteUpdateStep::default);
    if update.status == ActivityStatus::Succeeded {
        return;
    }
    update.status = ActivityStatus::Failed;
    update.completed.get_or_insert_with(Utc::now);
}

/// Records the commit statuses observed while the update pipeline runs.
pub fn record_update_statuses(
    activity: &mut PipelineActivity,
    environment: &str,
    statuses: Vec<GitStatusEntry>,
) {
    let step = activity.promote_step_mut(environment);
    let update = step.update.get_or_insert_with(PromoteUpdateStep::default);
    update.statuses = statuses;
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENV: &str = "staging";

    #[test]
    fn start_then_complete_pull_request() {
        let mut activity = PipelineActivity::default();
        start_promotion_pull_request(&mut activity, ENV, "https://example.com/pr/1");
        complete_promotion_pull_request(&mut activity, ENV, "abc123");

        let pr = activity.promote_step(ENV).unwrap().pull_request.as_ref().unwrap();
        assert_eq!(pr.status, ActivityStatus::Succeeded);
        assert_eq!(pr.merge_commit_sha.as_deref(), Some("abc123"));
        assert!(pr.started.is_some());
        assert!(pr.completed.is_some());
    }

    #[test]
    fn complete_twice_keeps_first_completion() {
        let mut activity = PipelineActivity::default();
        complete_promotion_pull_request(&mut activity, ENV, "abc123");
        let first = activity.promote_step(ENV).unwrap().pull_request.clone().unwrap();

        complete_promotion_pull_request(&mut activity, ENV, "other");
        let second = activity.promote_step(ENV).unwrap().pull_request.clone().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn failure_does_not_override_success() {
        let mut activity = PipelineActivity::default();
        complete_promotion_update(&mut activity, ENV);
        failed_promotion_update(&mut activity, ENV);

        let update = activity.promote_step(ENV).unwrap().update.as_ref().unwrap();
        assert_eq!(update.status, ActivityStatus::Succeeded);
    }

    #[test]
    fn environments_track_independently() {
        let mut activity = PipelineActivity::default();
        start_promotion_pull_request(&mut activity, "staging", "url-a");
        start_promotion_pull_request(&mut activity, "production", "url-b");

        assert_eq!(activity.steps.len(), 2);
        assert_eq!(
            activity
                .promote_step("production")
                .unwrap()
                .pull_request
                .as_ref()
                .unwrap()
                .pull_request_url
                .as_deref(),
            Some("url-b")
        );
    }

    #[test]
    fn statuses_are_replaced_wholesale() {
        let mut activity = PipelineActivity::default();
        record_update_statuses(
            &mut activity,
            ENV,
            vec![GitStatusEntry {
                url: "u1".to_string(),
                status: "pending".to_string(),
            }],
        );
        record_update_statuses(
            &mut activity,
            ENV,
            vec![GitStatusEntry {
                url: "u1".to_string(),
                status: "success".to_string(),
            }],
        );

        let update = activity.promote_step(ENV).unwrap().update.as_ref().unwrap();
        assert_eq!(update.statuses.len(), 1);
        assert_eq!(update.statuses[0].status, "success");
    }
}
