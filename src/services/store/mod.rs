//! Storage ports for the recommendation core
//!
//! The engine and scorer never hold a connection of their own. Everything they
//! read or write goes through these traits, so the same core runs against
//! Postgres in production and against the in-memory store in tests.
//!
//! Every subscription query applies the eligibility rule: the source is not
//! [`UNKNOWN_SOURCE`](crate::models::UNKNOWN_SOURCE), the event is not flagged
//! `ignore_for_recommendations`, the channel is approved and the event is newer
//! than `since`.

use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        AddedChannel, ChannelId, ChannelPair, EdgeUpdate, Rating, SimilarityEdge, SubscriptionEvent,
        UserId,
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Append-only log of subscription events
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SubscriptionLog: Send + Sync {
    /// Appends one event to the log
    async fn append(&self, event: &SubscriptionEvent) -> AppResult<()>;

    /// Whether any event from `source` was recorded after `since`, eligible or not
    ///
    /// Used to throttle repeated subscribe hits from one client.
    async fn seen_source_since(&self, source: &str, since: DateTime<Utc>) -> AppResult<bool>;

    /// Eligible `(channel_id, source)` pairs for the given channels, ordered by source
    async fn eligible_sources(
        &self,
        channels: &[ChannelId],
        since: DateTime<Utc>,
    ) -> AppResult<Vec<(ChannelId, String)>>;

    /// Distinct channels, other than `channel`, sharing an eligible source with it
    async fn channels_sharing_sources(
        &self,
        channel: ChannelId,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<ChannelId>>;

    /// Distinct channels `source` is eligibly subscribed to
    async fn channels_for_source(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<ChannelId>>;

    /// Distinct channels with eligible activity after `since`
    async fn active_channels(&self, since: DateTime<Utc>) -> AppResult<Vec<ChannelId>>;
}

/// The denormalized pairwise similarity table
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Every stored edge with at least one endpoint in `channels`
    async fn edges_touching(&self, channels: &[ChannelId]) -> AppResult<Vec<SimilarityEdge>>;

    /// The stored edge for one pair, if any
    async fn edge(&self, pair: ChannelPair) -> AppResult<Option<SimilarityEdge>>;

    /// Applies a batch of updates in one transaction
    ///
    /// Positive updates upsert the pair's row, zero updates delete it. Readers
    /// never observe a pair between its delete and its reinsert. Returns the
    /// number of rows left stored by the batch.
    async fn apply(&self, updates: &[EdgeUpdate]) -> AppResult<usize>;

    /// Removes every edge. Returns the number of rows deleted
    async fn clear_all(&self) -> AppResult<u64>;

    /// Removes every edge touching one of `channels`. Returns the number of rows deleted
    async fn clear_channels(&self, channels: &[ChannelId]) -> AppResult<u64>;
}

/// Read access to channel moderation data
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChannelCatalog: Send + Sync {
    /// Ids of every approved channel, ascending
    async fn approved_channels(&self) -> AppResult<Vec<ChannelId>>;

    /// The subset of `channels` that may be recommended (approved, not archived)
    async fn listed(&self, channels: &[ChannelId]) -> AppResult<Vec<ChannelId>>;
}

/// Read access to what a user has told the guide about channels
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RatingSource: Send + Sync {
    /// All ratings by one user, oldest first
    async fn ratings_for_user(&self, user_id: UserId) -> AppResult<Vec<Rating>>;

    /// Channels the user has added, oldest first
    async fn added_channels(&self, user_id: UserId) -> AppResult<Vec<AddedChannel>>;
}
