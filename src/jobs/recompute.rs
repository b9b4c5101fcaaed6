use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;

use chrono::Duration;
use tracing::instrument;

use crate::{
    error::AppResult,
    jobs::checkpoint::CheckpointStore,
    models::{ChannelId, ChannelPair},
    services::similarity::{ChannelOutcome, RecomputeScope, RecomputeSummary, SimilarityEngine},
};

/// Attempts per channel before a transient failure aborts the run
const MAX_ATTEMPTS: u32 = 3;

/// Which channels a batch run rebuilds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeMode {
    /// Every approved channel, after clearing the whole table
    All,
    /// Channels with eligible subscriptions within the period
    Recent(Duration),
}

impl RecomputeMode {
    /// Parses the binary's first argument; anything but `all`/`full` is a recent run
    pub fn from_arg(arg: Option<&str>, recent: Duration) -> Self {
        match arg.map(str::to_ascii_lowercase).as_deref() {
            Some("all" | "full") => RecomputeMode::All,
            _ => RecomputeMode::Recent(recent),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecomputeMode::All => "all",
            RecomputeMode::Recent(_) => "recent",
        }
    }

    pub fn scope(&self) -> RecomputeScope {
        match self {
            RecomputeMode::All => RecomputeScope::Global,
            RecomputeMode::Recent(_) => RecomputeScope::Bounded,
        }
    }
}

impl Display for RecomputeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecomputeMode::All => write!(f, "all"),
            RecomputeMode::Recent(period) => write!(f, "recent ({}h)", period.num_hours()),
        }
    }
}

/// Scheduled full recompute that can pick up where an interrupted run stopped
pub struct RecomputeJob {
    engine: Arc<SimilarityEngine>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl RecomputeJob {
    pub fn new(engine: Arc<SimilarityEngine>, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            engine,
            checkpoints,
        }
    }

    /// Runs one batch recompute
    ///
    /// Channels are processed in ascending id order and each one is
    /// checkpointed once committed. A run that finds a checkpoint for its mode
    /// skips the clearing phase and every channel up to the checkpoint.
    #[instrument(skip(self, mode), fields(%mode))]
    pub async fn run(&self, mode: RecomputeMode) -> AppResult<RecomputeSummary> {
        let mut channels = match mode {
            RecomputeMode::All => self.engine.approved_channels().await?,
            RecomputeMode::Recent(period) => self.engine.active_channels(period).await?,
        };
        channels.sort_unstable();
        channels.dedup();

        let mut summary = RecomputeSummary::default();
        match self.checkpoints.load(mode.name()).await? {
            Some(last) => {
                channels.retain(|channel| *channel > last);
                tracing::info!(
                    resume_after = last,
                    remaining = channels.len(),
                    "Resuming interrupted recompute"
                );
            }
            None => {
                if channels.is_empty() && matches!(mode, RecomputeMode::Recent(_)) {
                    tracing::info!("No recent subscription activity, nothing to recompute");
                    return Ok(summary);
                }
                summary.edges_cleared = self.engine.clear_scope(&channels, mode.scope()).await?;
                tracing::info!(
                    channels = channels.len(),
                    edges_cleared = summary.edges_cleared,
                    "Starting recompute"
                );
            }
        }

        let mut visited = HashSet::new();
        for channel in channels {
            let outcome = self.recompute_with_retry(channel, &mut visited).await?;
            self.checkpoints.save(mode.name(), channel).await?;
            summary.absorb(outcome);
        }

        self.checkpoints.clear(mode.name()).await?;
        tracing::info!(
            channels = summary.channels,
            pairs_scored = summary.pairs_scored,
            edges_written = summary.edges_written,
            "Recompute finished"
        );
        Ok(summary)
    }

    async fn recompute_with_retry(
        &self,
        channel: ChannelId,
        visited: &mut HashSet<ChannelPair>,
    ) -> AppResult<ChannelOutcome> {
        let mut attempt = 1;
        loop {
            match self.engine.recompute_channel(channel, visited).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        channel_id = channel,
                        attempt,
                        error = %e,
                        "Transient failure, retrying channel"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(200 * u64::from(attempt)))
                        .await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
