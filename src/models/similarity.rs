use serde::{Deserialize, Serialize};

use super::ChannelId;

/// Unordered pair of distinct channels, stored smaller id first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelPair {
    low: ChannelId,
    high: ChannelId,
}

impl ChannelPair {
    /// Builds the canonical pair; `None` for a self-pair
    pub fn new(a: ChannelId, b: ChannelId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn channel1(&self) -> ChannelId {
        self.low
    }

    pub fn channel2(&self) -> ChannelId {
        self.high
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.low == channel || self.high == channel
    }

    /// The endpoint that is not `channel`, if `channel` is an endpoint
    pub fn other(&self, channel: ChannelId) -> Option<ChannelId> {
        if channel == self.low {
            Some(self.high)
        } else if channel == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

/// A persisted similarity row; cosine is always in (0, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SimilarityEdge {
    pub channel1_id: ChannelId,
    pub channel2_id: ChannelId,
    pub cosine: f64,
}

impl SimilarityEdge {
    pub fn pair(&self) -> Option<ChannelPair> {
        ChannelPair::new(self.channel1_id, self.channel2_id)
    }
}

/// Freshly computed similarity for one pair
///
/// Applying an update with a zero cosine removes the pair's row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeUpdate {
    pub pair: ChannelPair,
    pub cosine: f64,
}

impl EdgeUpdate {
    pub fn new(pair: ChannelPair, cosine: f64) -> Self {
        Self { pair, cosine }
    }

    pub fn is_removal(&self) -> bool {
        self.cosine <= 0.0
    }

    /// Row to store, or `None` when the pair must not be stored
    pub fn edge(&self) -> Option<SimilarityEdge> {
        if self.is_removal() {
            return None;
        }
        Some(SimilarityEdge {
            channel1_id: self.pair.channel1(),
            channel2_id: self.pair.channel2(),
            cosine: self.cosine,
        })
    }
}
