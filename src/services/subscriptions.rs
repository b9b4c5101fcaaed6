use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{NewSubscription, SubscriptionEvent, UNKNOWN_SOURCE},
    services::{similarity::SimilarityEngine, store::SubscriptionLog},
};

/// A source subscribing again within this many seconds is not recorded
pub const THROTTLE_SECONDS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubscribeOutcome {
    /// Dropped as a repeat hit from the same source
    Throttled,
    /// Appended to the log; `rescored` similarity pairs were refreshed
    Recorded { rescored: usize },
}

/// Records subscriptions and keeps the similarity table current as they arrive
pub struct SubscriptionService {
    log: Arc<dyn SubscriptionLog>,
    engine: Arc<SimilarityEngine>,
}

impl SubscriptionService {
    pub fn new(log: Arc<dyn SubscriptionLog>, engine: Arc<SimilarityEngine>) -> Self {
        Self { log, engine }
    }

    /// Appends a subscription and runs the incremental similarity update for it
    ///
    /// Live hits (no explicit timestamp) are throttled per source. Imports that
    /// carry their own timestamp are always recorded. Events that cannot count
    /// towards similarity are recorded without touching the similarity table.
    pub async fn subscribe(&self, subscription: NewSubscription) -> AppResult<SubscribeOutcome> {
        if subscription.source.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Subscription source cannot be empty".to_string(),
            ));
        }

        let timestamp = match subscription.timestamp {
            Some(timestamp) => timestamp,
            None => {
                let now = self.engine.now();
                let recent = now - Duration::seconds(THROTTLE_SECONDS);
                if self.log.seen_source_since(&subscription.source, recent).await? {
                    tracing::warn!(
                        channel_id = subscription.channel_id,
                        source = %subscription.source,
                        "Throttled repeat subscription"
                    );
                    return Ok(SubscribeOutcome::Throttled);
                }
                now
            }
        };

        let event = SubscriptionEvent {
            channel_id: subscription.channel_id,
            source: subscription.source,
            timestamp,
            ignore_for_recommendations: subscription.ignore_for_recommendations,
        };
        self.log.append(&event).await?;

        let rescored = if event.ignore_for_recommendations || event.source == UNKNOWN_SOURCE {
            0
        } else {
            self.engine
                .recompute_incremental(event.channel_id, &event.source)
                .await?
        };

        tracing::debug!(
            channel_id = event.channel_id,
            rescored,
            "Subscription recorded"
        );
        Ok(SubscribeOutcome::Recorded { rescored })
    }
}
