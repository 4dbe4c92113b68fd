use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use topo_scheduler::api::ApiServer;
use topo_scheduler::cache::SchedulerCache;
use topo_scheduler::config::Cli;
use topo_scheduler::k8s::kube_client::init_kube_client;
use topo_scheduler::k8s::ClusterFeed;
use topo_scheduler::scheduler::Priority;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    let _guard = logging::init(std::env::var(logging::LOG_PATH_ENV_VAR).ok());

    tracing::info!("Starting topology scheduler {}", &**version::VERSION);

    let client = init_kube_client(cli.kubeconfig.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create kubernetes client: {e:?}"))?;

    let (feed, lister) = ClusterFeed::new(client);
    let lister = Arc::new(lister);
    let cache = Arc::new(SchedulerCache::new(lister.clone()));
    let cancellation_token = CancellationToken::new();

    let feed_handle = tokio::spawn({
        let cache = cache.clone();
        let token = cancellation_token.clone();
        async move {
            if let Err(e) = feed.run(cache, token).await {
                tracing::error!("Cluster feed failed: {e:?}");
            }
        }
    });

    if !lister.wait_until_ready().await {
        anyhow::bail!("cluster feed stopped before the initial listing completed");
    }
    if let Err(e) = cache.build() {
        tracing::error!("Failed to build scheduler cache: {e:?}");
    }

    let priority = Arc::new(Priority::new(cli.scheduler_name, cache));

    tokio::spawn({
        let token = cancellation_token.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
                return;
            }
            tracing::info!("Shutdown signal received");
            token.cancel();
        }
    });

    let result = ApiServer::new(priority, cli.listen_addr)
        .run(cancellation_token.clone())
        .await;

    cancellation_token.cancel();
    if let Err(e) = feed_handle.await {
        tracing::error!("Cluster feed task failed: {e}");
    }

    result.map_err(|e| anyhow::anyhow!("API server failed: {e:?}"))
}
