use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::{
    error::AppResult,
    models::{ChannelId, ChannelPair, EdgeUpdate, UNKNOWN_SOURCE},
    services::{
        clock::{Clock, SystemClock},
        store::{ChannelCatalog, SimilarityStore, SubscriptionLog},
    },
};

/// Subscriptions older than this do not count towards similarity
pub const DEFAULT_SIMILARITY_WINDOW_DAYS: i64 = 30;

/// Which existing edges a full recompute clears before reinserting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeScope {
    /// The whole table
    Global,
    /// Only edges with an endpoint in the recomputed batch
    Bounded,
}

/// Work done for one outer-loop channel of a full recompute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub pairs_scored: usize,
    pub edges_written: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeSummary {
    pub channels: usize,
    pub pairs_scored: usize,
    pub edges_written: usize,
    pub edges_cleared: u64,
}

impl RecomputeSummary {
    pub fn absorb(&mut self, outcome: ChannelOutcome) {
        self.channels += 1;
        self.pairs_scored += outcome.pairs_scored;
        self.edges_written += outcome.edges_written;
    }
}

/// Cosine between two presence vectors
///
/// Zero when either vector is all-false.
pub fn cosine(v1: &[bool], v2: &[bool]) -> f64 {
    let dot = v1.iter().zip(v2).filter(|(a, b)| **a && **b).count();
    let len1 = v1.iter().filter(|a| **a).count();
    let len2 = v2.iter().filter(|b| **b).count();
    if len1 == 0 || len2 == 0 {
        return 0.0;
    }
    (dot as f64 / ((len1 * len2) as f64).sqrt()).min(1.0)
}

/// Cosine between channels `a` and `b` from their eligible `(channel, source)` rows
///
/// One vector component per distinct source, in source order.
fn presence_cosine(a: ChannelId, b: ChannelId, rows: &[(ChannelId, String)]) -> f64 {
    let mut vectors: BTreeMap<&str, [bool; 2]> = BTreeMap::new();
    for (channel, source) in rows {
        let slot = if *channel == a {
            0
        } else if *channel == b {
            1
        } else {
            continue;
        };
        vectors.entry(source.as_str()).or_default()[slot] = true;
    }

    let (v1, v2): (Vec<bool>, Vec<bool>) = vectors.values().map(|v| (v[0], v[1])).unzip();
    cosine(&v1, &v2)
}

/// Computes and maintains pairwise channel similarity from shared subscription sources
pub struct SimilarityEngine {
    subscriptions: Arc<dyn SubscriptionLog>,
    edges: Arc<dyn SimilarityStore>,
    catalog: Arc<dyn ChannelCatalog>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl SimilarityEngine {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionLog>,
        edges: Arc<dyn SimilarityStore>,
        catalog: Arc<dyn ChannelCatalog>,
    ) -> Self {
        Self {
            subscriptions,
            edges,
            catalog,
            window: Duration::days(DEFAULT_SIMILARITY_WINDOW_DAYS),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn window_start(&self) -> DateTime<Utc> {
        self.clock.now() - self.window
    }

    /// Cosine similarity of two channels in [0, 1]
    ///
    /// Never an error for missing data: unknown channels, channels without
    /// eligible subscriptions and self-pairs all yield 0.0.
    pub async fn similarity(&self, a: ChannelId, b: ChannelId) -> AppResult<f64> {
        if a == b {
            return Ok(0.0);
        }
        let rows = self
            .subscriptions
            .eligible_sources(&[a, b], self.window_start())
            .await?;
        Ok(presence_cosine(a, b, &rows))
    }

    /// Channels worth scoring against `channel`
    ///
    /// With a `source`, the other channels that source is subscribed to.
    /// Without, every channel sharing any eligible source with `channel`.
    pub async fn relevant_candidates(
        &self,
        channel: ChannelId,
        source: Option<&str>,
    ) -> AppResult<BTreeSet<ChannelId>> {
        let since = self.window_start();
        let ids = match source {
            Some(UNKNOWN_SOURCE) => Vec::new(),
            Some(source) => self.subscriptions.channels_for_source(source, since).await?,
            None => {
                self.subscriptions
                    .channels_sharing_sources(channel, since)
                    .await?
            }
        };
        Ok(ids.into_iter().filter(|id| *id != channel).collect())
    }

    /// Rebuilds every edge around `channels`
    ///
    /// Clears the scope first, then commits one batch per channel so an
    /// interrupted run loses at most the channel in progress.
    #[instrument(skip(self, channels), fields(channels = channels.len()))]
    pub async fn recompute_full(
        &self,
        channels: &[ChannelId],
        scope: RecomputeScope,
    ) -> AppResult<RecomputeSummary> {
        tracing::info!("Recomputing similarity");

        let edges_cleared = self.clear_scope(channels, scope).await?;

        let mut summary = RecomputeSummary {
            edges_cleared,
            ..Default::default()
        };
        let mut visited = HashSet::new();
        for &channel in channels {
            let outcome = self.recompute_channel(channel, &mut visited).await?;
            summary.absorb(outcome);
        }

        tracing::info!(
            channels = summary.channels,
            pairs_scored = summary.pairs_scored,
            edges_written = summary.edges_written,
            edges_cleared = summary.edges_cleared,
            "Similarity recompute finished"
        );
        Ok(summary)
    }

    /// Deletes the edges a full recompute over `channels` will rebuild
    pub async fn clear_scope(&self, channels: &[ChannelId], scope: RecomputeScope) -> AppResult<u64> {
        match scope {
            RecomputeScope::Global => self.edges.clear_all().await,
            RecomputeScope::Bounded => self.edges.clear_channels(channels).await,
        }
    }

    /// Scores every not-yet-visited pair around one channel and commits them together
    ///
    /// Pairs are marked visited only once the batch is committed, so a failed
    /// call can be retried with the same `visited` set.
    pub async fn recompute_channel(
        &self,
        channel: ChannelId,
        visited: &mut HashSet<ChannelPair>,
    ) -> AppResult<ChannelOutcome> {
        let candidates = self.relevant_candidates(channel, None).await?;

        let mut updates = Vec::with_capacity(candidates.len());
        for other in candidates {
            let Some(pair) = ChannelPair::new(channel, other) else {
                continue;
            };
            if visited.contains(&pair) {
                continue;
            }
            let cosine = self.similarity(channel, other).await?;
            updates.push(EdgeUpdate::new(pair, cosine));
        }

        let edges_written = self.edges.apply(&updates).await?;
        visited.extend(updates.iter().map(|update| update.pair));
        tracing::debug!(
            channel_id = channel,
            pairs = updates.len(),
            edges_written,
            "Committed channel similarities"
        );

        Ok(ChannelOutcome {
            pairs_scored: updates.len(),
            edges_written,
        })
    }

    /// Global pass over every approved channel
    pub async fn recompute_all(&self) -> AppResult<RecomputeSummary> {
        let channels = self.catalog.approved_channels().await?;
        self.recompute_full(&channels, RecomputeScope::Global).await
    }

    /// Bounded pass over channels with eligible activity within `period`
    pub async fn recompute_recent(&self, period: Duration) -> AppResult<RecomputeSummary> {
        let channels = self.active_channels(period).await?;
        if channels.is_empty() {
            tracing::info!("No recent subscription activity, nothing to recompute");
            return Ok(RecomputeSummary::default());
        }
        self.recompute_full(&channels, RecomputeScope::Bounded).await
    }

    /// Channels with eligible activity within `period`, ascending
    pub async fn active_channels(&self, period: Duration) -> AppResult<Vec<ChannelId>> {
        self.subscriptions
            .active_channels(self.clock.now() - period)
            .await
    }

    pub async fn approved_channels(&self) -> AppResult<Vec<ChannelId>> {
        self.catalog.approved_channels().await
    }

    /// Refreshes the edges a new `(channel, source)` subscription can have changed
    ///
    /// Each pair is deleted and reinserted in its own transaction. Returns the
    /// number of pairs re-scored.
    #[instrument(skip(self))]
    pub async fn recompute_incremental(&self, channel: ChannelId, source: &str) -> AppResult<usize> {
        if source == UNKNOWN_SOURCE {
            tracing::debug!("Unknown source, skipping similarity update");
            return Ok(0);
        }

        let mut others = self.relevant_candidates(channel, Some(source)).await?;
        // A new distinct source also changes the channel's norm against every stored neighbour
        for edge in self.edges.edges_touching(&[channel]).await? {
            if let Some(other) = edge.pair().and_then(|pair| pair.other(channel)) {
                others.insert(other);
            }
        }

        let mut rescored = 0;
        for other in others {
            let Some(pair) = ChannelPair::new(channel, other) else {
                continue;
            };
            let cosine = self.similarity(channel, other).await?;
            self.edges.apply(&[EdgeUpdate::new(pair, cosine)]).await?;
            rescored += 1;
        }

        tracing::debug!(rescored, "Incremental similarity update");
        Ok(rescored)
    }
}
