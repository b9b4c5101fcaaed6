use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{
        AddedChannel, ChannelId, ChannelPair, ChannelState, EdgeUpdate, Rating, SimilarityEdge,
        SubscriptionEvent, UserId,
    },
    services::store::{ChannelCatalog, RatingSource, SimilarityStore, SubscriptionLog},
};

#[derive(Debug, Clone, Copy)]
struct ChannelRecord {
    state: ChannelState,
    archived: bool,
}

#[derive(Default)]
struct MemoryStoreInner {
    channels: HashMap<ChannelId, ChannelRecord>,
    subscriptions: Vec<SubscriptionEvent>,
    edges: BTreeMap<ChannelPair, f64>,
    ratings: Vec<Rating>,
    added: Vec<AddedChannel>,
}

impl MemoryStoreInner {
    fn is_approved(&self, channel: ChannelId) -> bool {
        self.channels
            .get(&channel)
            .is_some_and(|c| c.state == ChannelState::Approved)
    }

    fn eligible(&self, since: DateTime<Utc>) -> impl Iterator<Item = &SubscriptionEvent> + '_ {
        self.subscriptions
            .iter()
            .filter(move |e| e.counts_since(since) && self.is_approved(e.channel_id))
    }
}

/// In-process implementation of every storage port
///
/// Cloning shares the underlying data, so one instance can be handed to the
/// engine, the scorer and the test that seeds it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel (or changes its state)
    pub async fn add_channel(&self, channel: ChannelId, state: ChannelState) {
        let mut inner = self.inner.write().await;
        let record = inner.channels.entry(channel).or_insert(ChannelRecord {
            state,
            archived: false,
        });
        record.state = state;
    }

    pub async fn archive_channel(&self, channel: ChannelId) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.channels.get_mut(&channel) {
            record.archived = true;
        }
    }

    pub async fn add_rating(&self, rating: Rating) {
        self.inner.write().await.ratings.push(rating);
    }

    /// Adds a channel to a user's list; adding it again only moves the timestamp
    pub async fn add_to_user(&self, added: AddedChannel) {
        let mut inner = self.inner.write().await;
        inner
            .added
            .retain(|a| (a.user_id, a.channel_id) != (added.user_id, added.channel_id));
        inner.added.push(added);
    }

    /// Stores an edge directly, bypassing the engine
    pub async fn seed_edge(&self, a: ChannelId, b: ChannelId, cosine: f64) {
        if let Some(pair) = ChannelPair::new(a, b) {
            self.inner.write().await.edges.insert(pair, cosine);
        }
    }

    /// Snapshot of the similarity table in canonical pair order
    pub async fn edges(&self) -> Vec<SimilarityEdge> {
        let inner = self.inner.read().await;
        inner
            .edges
            .iter()
            .map(|(pair, cosine)| SimilarityEdge {
                channel1_id: pair.channel1(),
                channel2_id: pair.channel2(),
                cosine: *cosine,
            })
            .collect()
    }

    pub async fn subscription_count(&self) -> usize {
        self.inner.read().await.subscriptions.len()
    }
}

#[async_trait::async_trait]
impl SubscriptionLog for MemoryStore {
    async fn append(&self, event: &SubscriptionEvent) -> AppResult<()> {
        self.inner.write().await.subscriptions.push(event.clone());
        Ok(())
    }

    async fn seen_source_since(&self, source: &str, since: DateTime<Utc>) -> AppResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .any(|e| e.source == source && e.timestamp > since))
    }

    async fn eligible_sources(
        &self,
        channels: &[ChannelId],
        since: DateTime<Utc>,
    ) -> AppResult<Vec<(ChannelId, String)>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<(ChannelId, String)> = inner
            .eligible(since)
            .filter(|e| channels.contains(&e.channel_id))
            .map(|e| (e.channel_id, e.source.clone()))
            .collect();
        rows.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(rows)
    }

    async fn channels_sharing_sources(
        &self,
        channel: ChannelId,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<ChannelId>> {
        let inner = self.inner.read().await;
        let sources: BTreeSet<&str> = inner
            .eligible(since)
            .filter(|e| e.channel_id == channel)
            .map(|e| e.source.as_str())
            .collect();
        let shared: BTreeSet<ChannelId> = inner
            .eligible(since)
            .filter(|e| e.channel_id != channel && sources.contains(e.source.as_str()))
            .map(|e| e.channel_id)
            .collect();
        Ok(shared.into_iter().collect())
    }

    async fn channels_for_source(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<ChannelId>> {
        let inner = self.inner.read().await;
        let channels: BTreeSet<ChannelId> = inner
            .eligible(since)
            .filter(|e| e.source == source)
            .map(|e| e.channel_id)
            .collect();
        Ok(channels.into_iter().collect())
    }

    async fn active_channels(&self, since: DateTime<Utc>) -> AppResult<Vec<ChannelId>> {
        let inner = self.inner.read().await;
        let channels: BTreeSet<ChannelId> = inner.eligible(since).map(|e| e.channel_id).collect();
        Ok(channels.into_iter().collect())
    }
}

#[async_trait::async_trait]
impl SimilarityStore for MemoryStore {
    async fn edges_touching(&self, channels: &[ChannelId]) -> AppResult<Vec<SimilarityEdge>> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges
            .iter()
            .filter(|(pair, _)| channels.iter().any(|c| pair.contains(*c)))
            .map(|(pair, cosine)| SimilarityEdge {
                channel1_id: pair.channel1(),
                channel2_id: pair.channel2(),
                cosine: *cosine,
            })
            .collect())
    }

    async fn edge(&self, pair: ChannelPair) -> AppResult<Option<SimilarityEdge>> {
        let inner = self.inner.read().await;
        Ok(inner.edges.get(&pair).map(|cosine| SimilarityEdge {
            channel1_id: pair.channel1(),
            channel2_id: pair.channel2(),
            cosine: *cosine,
        }))
    }

    async fn apply(&self, updates: &[EdgeUpdate]) -> AppResult<usize> {
        // One write guard for the whole batch stands in for the transaction
        let mut inner = self.inner.write().await;
        let mut stored = 0;
        for update in updates {
            inner.edges.remove(&update.pair);
            if let Some(edge) = update.edge() {
                inner.edges.insert(update.pair, edge.cosine);
                stored += 1;
            }
        }
        Ok(stored)
    }

    async fn clear_all(&self) -> AppResult<u64> {
        let mut inner = self.inner.write().await;
        let removed = inner.edges.len() as u64;
        inner.edges.clear();
        Ok(removed)
    }

    async fn clear_channels(&self, channels: &[ChannelId]) -> AppResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.edges.len();
        inner
            .edges
            .retain(|pair, _| !channels.iter().any(|c| pair.contains(*c)));
        Ok((before - inner.edges.len()) as u64)
    }
}

#[async_trait::async_trait]
impl ChannelCatalog for MemoryStore {
    async fn approved_channels(&self) -> AppResult<Vec<ChannelId>> {
        let inner = self.inner.read().await;
        let mut ids: Vec<ChannelId> = inner
            .channels
            .iter()
            .filter(|(_, record)| record.state == ChannelState::Approved)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn listed(&self, channels: &[ChannelId]) -> AppResult<Vec<ChannelId>> {
        let inner = self.inner.read().await;
        Ok(channels
            .iter()
            .copied()
            .filter(|id| {
                inner
                    .channels
                    .get(id)
                    .is_some_and(|c| c.state == ChannelState::Approved && !c.archived)
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl RatingSource for MemoryStore {
    async fn ratings_for_user(&self, user_id: UserId) -> AppResult<Vec<Rating>> {
        let inner = self.inner.read().await;
        let mut ratings: Vec<Rating> = inner
            .ratings
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        ratings.sort_by_key(|r| r.timestamp);
        Ok(ratings)
    }

    async fn added_channels(&self, user_id: UserId) -> AppResult<Vec<AddedChannel>> {
        let inner = self.inner.read().await;
        let mut added: Vec<AddedChannel> = inner
            .added
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        added.sort_by_key(|a| a.timestamp);
        Ok(added)
    }
}
