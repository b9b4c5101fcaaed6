use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use channelguide_recs::{
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache},
    jobs::{RecomputeJob, RecomputeMode},
    services::{store::PgStore, SimilarityEngine},
};

/// Batch recompute of the channel similarity table
///
/// `calculate-recommendations all` rebuilds every approved channel; with no
/// argument only channels with recent subscription activity are rebuilt.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let mode = RecomputeMode::from_arg(
        std::env::args().nth(1).as_deref(),
        config.recent_activity(),
    );

    let pool = create_pool(&config.database_url, config.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    run_migrations(&pool).await?;
    let store = Arc::new(PgStore::new(pool));

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::new(redis_client).await;

    let engine = SimilarityEngine::new(store.clone(), store.clone(), store)
        .with_window(config.similarity_window());
    let job = RecomputeJob::new(Arc::new(engine), Arc::new(cache));

    tracing::info!(%mode, window_days = config.similarity_window_days, "Starting batch recompute");
    let result = job.run(mode).await;
    cache_writer.shutdown().await;

    let summary = result?;
    tracing::info!(
        channels = summary.channels,
        pairs_scored = summary.pairs_scored,
        edges_written = summary.edges_written,
        edges_cleared = summary.edges_cleared,
        "Batch recompute complete"
    );
    Ok(())
}
