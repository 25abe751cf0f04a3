//! Promotion activity tracking.
//!
//! Binds the pure transitions in [`activity`] to an external store via
//! read-modify-write. There is deliberately no optimistic concurrency:
//! two processes promoting the same (pipeline, build, environment) key can
//! overwrite each other's updates.

mod activity;
mod error;

pub use activity::{
    complete_promotion_pull_request, complete_promotion_update, failed_promotion_pull_request,
    failed_promotion_update, record_update_statuses, start_promotion_pull_request,
    start_promotion_update, ActivityStatus, GitStatusEntry, PipelineActivity, PromoteStep,
    PromotePullRequestStep, PromoteUpdateStep,
};
pub use error::TrackerError;

use crate::git::to_valid_branch_name;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::debug;

/// Identifies one promotion within the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PromotionKey {
    pub pipeline: String,
    pub build: String,
    pub environment: String,
}

impl PromotionKey {
    /// The store key, a sanitized `<pipeline>-<build>` name.
    #[must_use]
    pub fn activity_name(&self) -> String {
        to_valid_branch_name(&format!("{}-{}", self.pipeline, self.build)).replace('/', "-")
    }
}

/// External store of [`PipelineActivity`] records.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Fetches the activity by name, if it exists.
    async fn get(&self, name: &str) -> Result<Option<PipelineActivity>, TrackerError>;

    /// Creates or replaces the activity.
    async fn upsert(&self, activity: PipelineActivity) -> Result<(), TrackerError>;
}

/// [`ActivityStore`] held in process memory.
#[derive(Default)]
pub struct InMemoryActivityStore {
    activities: Mutex<HashMap<String, PipelineActivity>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn get(&self, name: &str) -> Result<Option<PipelineActivity>, TrackerError> {
        Ok(self.activities.lock().unwrap_or_else(|e| e.into_inner()).get(name).cloned())
    }

    async fn upsert(&self, activity: PipelineActivity) -> Result<(), TrackerError> {
        self.activities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(activity.name.clone(), activity);
        Ok(())
    }
}

/// Applies named transitions for one promotion key against a store.
#[derive(Clone)]
pub struct PromotionTracker {
    store: Arc<dyn ActivityStore>,
    key: PromotionKey,
}

impl PromotionTracker {
    pub fn new(store: Arc<dyn ActivityStore>, key: PromotionKey) -> Self {
        Self { store, key }
    }

    #[must_use]
    pub fn key(&self) -> &PromotionKey {
        &self.key
    }

    async fn modify<F>(&self, transition: F) -> Result<(), TrackerError>
    where
        F: FnOnce(&mut PipelineActivity, &str),
    {
        let name = self.key.activity_name();
        let mut activity = self.store.get(&name).await?.unwrap_or_else(|| PipelineActivity {
            name: name.clone(),
            pipeline: self.key.pipeline.clone(),
            build: self.key.build.clone(),
            steps: Vec::new(),
        });
        transition(&mut activity, &self.key.environment);
        debug!(activity = %name, environment = %self.key.environment, "recording promotion step");
        self.store.upsert(activity).await
    }

    pub async fn start_promotion_pull_request(&self, pr_url: &str) -> Result<(), TrackerError> {
        self.modify(|a, env| start_promotion_pull_request(a, env, pr_url)).await
    }

    pub async fn complete_promotion_pull_request(
        &self,
        merge_commit_sha: &str,
    ) -> Result<(), TrackerError> {
        self.modify(|a, env| complete_promotion_pull_request(a, env, merge_commit_sha))
            .await
    }

    pub async fn failed_promotion_pull_request(&self) -> Result<(), TrackerError> {
        self.modify(failed_promotion_pull_request).await
    }

    pub async fn start_promotion_update(&self) -> Result<(), TrackerError> {
        self.modify(start_promotion_update).await
    }

    pub async fn complete_promotion_update(&self) -> Result<(), TrackerError> {
        self.modify(complete_promotion_update).await
    }

    pub async fn failed_promotion_update(&self) -> Result<(), TrackerError> {
        self.modify(failed_promotion_update).await
    }

    pub async fn record_update_statuses(
        &self,
        statuses: Vec<GitStatusEntry>,
    ) -> Result<(), TrackerError> {
        self.modify(|a, env| record_update_statuses(a, env, statuses)).await
    }

    /// Current state of this promotion's activity, if any was recorded.
    pub async fn activity(&self) -> Result<Option<PipelineActivity>, TrackerError> {
        self.store.get(&self.key.activity_name()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(environment: &str) -> PromotionKey {
        PromotionKey {
            pipeline: "acme/myapp/master".to_string(),
            build: "7".to_string(),
            environment: environment.to_string(),
        }
    }

    #[test]
    fn activity_name_is_sanitized() {
        assert_eq!(key("staging").activity_name(), "acme-myapp-master-7");
    }

    #[tokio::test]
    async fn tracker_creates_activity_on_first_transition() {
        let store = Arc::new(InMemoryActivityStore::new());
        let tracker = PromotionTracker::new(store.clone(), key("staging"));

        tracker
            .start_promotion_pull_request("https://example.com/pr/1")
            .await
            .unwrap();

        let activity = tracker.activity().await.unwrap().unwrap();
        assert_eq!(activity.pipeline, "acme/myapp/master");
        let pr = activity.promote_step("staging").unwrap().pull_request.as_ref().unwrap();
        assert_eq!(pr.status, ActivityStatus::Running);
    }

    #[tokio::test]
    async fn trackers_for_different_environments_share_the_activity() {
        let store = Arc::new(InMemoryActivityStore::new());
        let staging = PromotionTracker::new(store.clone(), key("staging"));
        let production = PromotionTracker::new(store.clone(), key("production"));

        staging.start_promotion_update().await.unwrap();
        production.start_promotion_update().await.unwrap();

        let activity = staging.activity().await.unwrap().unwrap();
        assert_eq!(activity.steps.len(), 2);
    }

    #[tokio::test]
    async fn full_transition_sequence() {
        let store = Arc::new(InMemoryActivityStore::new());
        let tracker = PromotionTracker::new(store, key("staging"));

        tracker.start_promotion_pull_request("url").await.unwrap();
        tracker.complete_promotion_pull_request("sha").await.unwrap();
        tracker.start_promotion_update().await.unwrap();
        tracker
            .record_update_statuses(vec![GitStatusEntry {
                url: "u".to_string(),
                status: "pending".to_string(),
            }])
            .await
            .unwrap();
        tracker.complete_promotion_update().await.unwrap();

        let activity = tracker.activity().await.unwrap().unwrap();
        let step = activity.promote_step("staging").unwrap();
        assert_eq!(step.pull_request.as_ref().unwrap().status, ActivityStatus::Succeeded);
        assert_eq!(step.update.as_ref().unwrap().status, ActivityStatus::Succeeded);
    }
}
