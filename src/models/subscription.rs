use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChannelId;

/// Source recorded when the subscriber's origin is unknown
///
/// Never counts as a shared source between two channels.
pub const UNKNOWN_SOURCE: &str = "0.0.0.0";

/// Moderation state of a channel; only approved channels take part in similarity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChannelState {
    #[serde(rename = "N")]
    New,
    #[serde(rename = "D")]
    DontKnow,
    #[serde(rename = "R")]
    Rejected,
    #[serde(rename = "A")]
    Approved,
    #[serde(rename = "U")]
    Audio,
    #[serde(rename = "B")]
    Broken,
    #[serde(rename = "S")]
    Suspended,
}

impl ChannelState {
    /// Single-letter code stored in the channel table
    pub fn code(&self) -> &'static str {
        match self {
            ChannelState::New => "N",
            ChannelState::DontKnow => "D",
            ChannelState::Rejected => "R",
            ChannelState::Approved => "A",
            ChannelState::Audio => "U",
            ChannelState::Broken => "B",
            ChannelState::Suspended => "S",
        }
    }
}

/// One recorded subscription action; the log is append-only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionEvent {
    pub channel_id: ChannelId,
    /// Opaque subscriber grouping, in practice the client IP address
    pub source: String,
    pub timestamp: DateTime<Utc>,
    /// Manual exclusion from recommendation math
    pub ignore_for_recommendations: bool,
}

impl SubscriptionEvent {
    /// Whether the event can contribute to similarity computed at `since` onwards
    ///
    /// Channel approval lives in the catalog, so it is checked by the store.
    pub fn counts_since(&self, since: DateTime<Utc>) -> bool {
        self.source != UNKNOWN_SOURCE && !self.ignore_for_recommendations && self.timestamp > since
    }
}

/// A subscription about to be appended to the log
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub channel_id: ChannelId,
    pub source: String,
    /// Defaults to the clock's now when absent
    pub timestamp: Option<DateTime<Utc>>,
    pub ignore_for_recommendations: bool,
}

impl NewSubscription {
    pub fn new(channel_id: ChannelId, source: impl Into<String>) -> Self {
        Self {
            channel_id,
            source: source.into(),
            timestamp: None,
            ignore_for_recommendations: false,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignore_for_recommendations = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(source: &str, age_days: i64, ignore: bool) -> SubscriptionEvent {
        SubscriptionEvent {
            channel_id: 1,
            source: source.to_string(),
            timestamp: Utc::now() - Duration::days(age_days),
            ignore_for_recommendations: ignore,
        }
    }

    #[test]
    fn test_recent_event_counts() {
        let since = Utc::now() - Duration::days(30);
        assert!(event("1.1.1.1", 3, false).counts_since(since));
    }

    #[test]
    fn test_unknown_source_never_counts() {
        let since = Utc::now() - Duration::days(30);
        assert!(!event(UNKNOWN_SOURCE, 0, false).counts_since(since));
    }

    #[test]
    fn test_ignored_and_old_events_do_not_count() {
        let since = Utc::now() - Duration::days(30);
        assert!(!event("1.1.1.1", 0, true).counts_since(since));
        assert!(!event("1.1.1.1", 31 * 7, false).counts_since(since));
    }

    #[test]
    fn test_state_serializes_to_code() {
        let json = serde_json::to_string(&ChannelState::Approved).unwrap();
        assert_eq!(json, "\"A\"");
        assert_eq!(ChannelState::Approved.code(), "A");
    }
}
