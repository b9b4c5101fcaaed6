use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChannelId;

pub type UserId = i64;

/// A user's explicit score for a channel, owned by the rating subsystem
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub rating: f64,
    pub timestamp: DateTime<Utc>,
}

/// A channel the user has added to their own list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddedChannel {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub timestamp: DateTime<Utc>,
}
