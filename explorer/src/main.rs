//! Viacoin block explorer - main entry point

use std::sync::Arc;
use anyhow::Context;
use tracing::{error, info};
use via_explorer::{
    api::{ApiServer, ApiState},
    cli::{self, Command},
    indexer::{BlockRef, Follower, IngestionService, PollingNotifier},
    AppContext, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::parse_args();
    init_logging(&args);

    info!("Starting Viacoin explorer {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config_path {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env_overrides();
    config.apply_cli_overrides(&args);

    let ctx = AppContext::connect(config, args.memory)
        .await
        .context("failed to initialise explorer")?;
    let service = Arc::new(IngestionService::new(&ctx));
    let follower = Follower::new(service, ctx.rpc.clone(), ctx.config.indexer.retry_policy());

    match args.command {
        Command::Ingest { height } => {
            let report = follower.ingest_with_retry(BlockRef::Height(height)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Rebuild => {
            let blocks = follower.rebuild(ctx.config.indexer.start_height).await?;
            info!("Rebuilt index with {} blocks", blocks);
        }
        Command::Run => {
            if ctx.config.api.enabled {
                let server = ApiServer::new(
                    ApiState {
                        store: ctx.store.clone(),
                        tracker: ctx.tracker.clone(),
                    },
                    &ctx.config.chain.symbol,
                    &ctx.config.api.bind_address,
                    ctx.config.api.port,
                );
                tokio::spawn(async move {
                    if let Err(e) = server.start().await {
                        error!("API server error: {}", e);
                    }
                });
            }

            let start = follower.resume_height(ctx.config.indexer.start_height).await?;
            let notifier = Arc::new(PollingNotifier::new(
                ctx.rpc.clone(),
                ctx.config.indexer.poll_interval(),
                start,
            ));

            tokio::select! {
                result = follower.follow(notifier) => result?,
                _ = tokio::signal::ctrl_c() => info!("Shutting down"),
            }
        }
    }

    Ok(())
}

fn init_logging(args: &cli::Args) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}
