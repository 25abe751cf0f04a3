//! Helm client contract and the CLI-backed implementation.

use crate::promote::PromoteError;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Client for installing charts and querying chart repositories.
#[async_trait]
pub trait HelmClient: Send + Sync {
    /// Latest chart version of `chart` in the named repository, if any.
    async fn search_latest_version(
        &self,
        repo: &str,
        chart: &str,
    ) -> Result<Option<String>, PromoteError>;

    /// Installs or upgrades a release to the given chart version.
    async fn upgrade(
        &self,
        release: &str,
        chart: &str,
        version: &str,
        namespace: &str,
    ) -> Result<(), PromoteError>;
}

/// [`HelmClient`] backed by the `helm` binary.
#[derive(Debug, Clone, Default)]
pub struct CliHelm;

impl CliHelm {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<String, PromoteError> {
        let command = format!("helm {}", args.join(" "));
        debug!(command = %command, "running helm");
        let output = Command::new("helm")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PromoteError::HelmSpawn {
                command: command.clone(),
                source: e,
            })?;
        if !output.status.success() {
            return Err(PromoteError::HelmFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    name: String,
    version: String,
}

#[async_trait]
impl HelmClient for CliHelm {
    async fn search_latest_version(
        &self,
        repo: &str,
        chart: &str,
    ) -> Result<Option<String>, PromoteError> {
        let qualified = format!("{repo}/{chart}");
        let stdout = self
            .run(&["search", "repo", &qualified, "--output", "json"])
            .await?;
        let entries: Vec<SearchEntry> =
            serde_json::from_str(&stdout).map_err(|e| PromoteError::HelmOutput {
                command: format!("helm search repo {qualified}"),
                source: e,
            })?;
        Ok(entries
            .into_iter()
            .find(|e| e.name == qualified)
            .map(|e| e.version))
    }

    async fn upgrade(
        &self,
        release: &str,
        chart: &str,
        version: &str,
        namespace: &str,
    ) -> Result<(), PromoteError> {
        info!(release, chart, version, namespace, "installing chart");
        self.run(&[
            "upgrade",
            "--install",
            "--wait",
            "--namespace",
            namespace,
            "--version",
            version,
            release,
            chart,
        ])
        .await
        .map(|_| ())
    }
}
