//! CLI for the GitOps promotion engine.
//!
//! Promotes an application version into an environment, either by raising a
//! pull request against the environment's GitOps repository or by installing
//! the chart directly, and optionally waits for the promotion to land.

use clap::Parser;
use gitops_promote::{
    load_environments, ActivityStore, CliGitter, CliHelm, GitHubProvider, GitProvider, GitRepoRef,
    InMemoryActivityStore, PromoteError, Promoter, PromotionRequest, ProviderError,
    ProviderFactory, ReleaseInfo,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Promote an application version into a GitOps-managed environment.
// The built-in --version flag is omitted: --version names the version
// being promoted.
#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
struct Args {
    /// Name of the application to promote.
    #[arg(long, short = 'a')]
    app: String,

    /// Version to promote; the latest chart version when omitted.
    #[arg(long, short = 'v', default_value = "")]
    version: String,

    /// Target environment name or label.
    #[arg(long, short = 'e', required_unless_present = "all_auto", conflicts_with = "all_auto")]
    env: Option<String>,

    /// Promote through every automatic environment in order.
    #[arg(long)]
    all_auto: bool,

    /// Override the target namespace.
    #[arg(long, short = 'n')]
    namespace: Option<String>,

    /// Path to the environments definition file.
    #[arg(long, default_value = "environments.toml")]
    environments: PathBuf,

    /// GitHub Personal Access Token.
    #[arg(long, env = "GITHUB_TOKEN")]
    token: String,

    /// Git URL of the application's own repository, used for commenting on
    /// issues the release closed.
    #[arg(long)]
    app_git_url: Option<String>,

    /// Override the helm release name (defaults to <namespace>-<app>).
    #[arg(long)]
    release: Option<String>,

    /// Name of the local helm repository to resolve versions from.
    #[arg(long, default_value = "releases")]
    helm_repo: String,

    /// URL of the chart repository, required when the chart has to be added
    /// to an environment for the first time.
    #[arg(long)]
    helm_repo_url: Option<String>,

    /// Pipeline name this promotion runs in, e.g. "owner/repo/branch".
    #[arg(long, default_value = "")]
    pipeline: String,

    /// Build number this promotion runs in.
    #[arg(long, default_value = "1")]
    build: String,

    /// Non-interactive mode; never prompt for confirmation.
    #[arg(long, short = 'b')]
    batch: bool,

    /// Preview changes without pushing or opening pull requests.
    #[arg(long)]
    dry_run: bool,

    /// Leave merging the promotion PR to the environment's own automation.
    #[arg(long)]
    no_merge: bool,

    /// Do not wait for the promotion PR to merge and deploy.
    #[arg(long)]
    no_poll: bool,

    /// Stop waiting as soon as the promotion PR merges.
    #[arg(long)]
    no_wait_after_merge: bool,

    /// Do not wait for the environment's update pipeline after the merge.
    #[arg(long)]
    no_wait_for_update_pipeline: bool,

    /// Seconds to wait for the promotion to merge and deploy.
    #[arg(long, default_value_t = 3600)]
    timeout: u64,

    /// Seconds between provider polls while waiting.
    #[arg(long, default_value_t = 20)]
    poll_time: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    // Install aws-lc-rs as the process-wide rustls crypto provider before
    // any TLS connection is made.
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("default rustls crypto provider was already installed");
    }

    let args = Args::parse();

    match run(args).await {
        Ok(releases) => {
            for release in &releases {
                match &release.pull_request {
                    Some(info) => info!(
                        app = %release.full_app_name,
                        version = %release.version,
                        pr = %info.pull_request.url,
                        "promotion raised"
                    ),
                    None => info!(
                        app = %release.full_app_name,
                        version = %release.version,
                        release = %release.release_name,
                        "promotion installed"
                    ),
                }
            }
            ExitCode::from(0)
        }
        Err(PromoteError::Aborted { environment }) => {
            warn!(environment = %environment, "promotion aborted");
            ExitCode::from(1)
        }
        // Setup problems (bad config, failed provider connection) exit 2;
        // a promotion that started and failed exits 1.
        Err(e @ (PromoteError::Config(_) | PromoteError::Provider(_))) => {
            error!(error = %e, "setup failed");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "promotion failed");
            ExitCode::from(1)
        }
    }
}

/// Initializes tracing with environment filter support.
///
/// Compact single-line output, with the level filtered via `RUST_LOG`
/// (defaulting to "info").
fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// A [`ProviderFactory`] that serves one authenticated GitHub client for
/// every repository.
struct GitHubFactory(Arc<GitHubProvider>);

#[async_trait::async_trait]
impl ProviderFactory for GitHubFactory {
    async fn provider_for(
        &self,
        _repo: &GitRepoRef,
    ) -> Result<Arc<dyn GitProvider>, ProviderError> {
        Ok(self.0.clone())
    }
}

async fn run(args: Args) -> Result<Vec<ReleaseInfo>, PromoteError> {
    let environments = load_environments(&args.environments)?;
    let provider = GitHubProvider::connect(args.token.clone()).await?;
    let store: Arc<dyn ActivityStore> = Arc::new(InMemoryActivityStore::new());
    let promoter = Promoter::new(
        environments,
        Arc::new(CliGitter),
        Arc::new(GitHubFactory(Arc::new(provider))),
        Arc::new(CliHelm),
        store,
    );

    let request = PromotionRequest {
        application: args.app,
        version: args.version,
        app_git_url: args.app_git_url,
        release_name: args.release,
        local_helm_repo: args.helm_repo,
        helm_repository_url: args.helm_repo_url,
        pipeline: args.pipeline,
        build: args.build,
        batch: args.batch,
        dry_run: args.dry_run,
        no_merge: args.no_merge,
        no_poll: args.no_poll,
        no_wait_after_merge: args.no_wait_after_merge,
        no_wait_for_update_pipeline: args.no_wait_for_update_pipeline,
        timeout: Duration::from_secs(args.timeout),
        poll_interval: Duration::from_secs(args.poll_time),
    };

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    if args.all_auto {
        return promoter.promote_all_automatic(&request, &cancel).await;
    }

    // clap requires --env whenever --all-auto is absent.
    let environment = args.env.as_deref().unwrap_or_default();
    let mut release = promoter
        .promote(&request, environment, args.namespace.as_deref(), true)
        .await?;
    promoter
        .wait_for_promotion(&request, environment, &mut release, &cancel)
        .await?;
    Ok(vec![release])
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping the watch");
            cancel.cancel();
        }
    });
}
