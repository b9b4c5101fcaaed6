use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ChannelId;

/// How much one rated channel pushed a predicted score (`cosine * rating`)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Contribution {
    pub score: f64,
    pub channel_id: ChannelId,
}

/// Contributions behind one predicted score, ascending by `(score, channel_id)`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ContributorList(Vec<Contribution>);

impl ContributorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts keeping the ascending order
    pub fn insert(&mut self, contribution: Contribution) {
        let at = self
            .0
            .partition_point(|c| Self::key_cmp(c, &contribution).is_le());
        self.0.insert(at, contribution);
    }

    /// The `n` largest contributions, largest first
    ///
    /// The list itself stays ascending; "top" readers take its tail.
    pub fn strongest(&self, n: usize) -> Vec<Contribution> {
        self.0.iter().rev().take(n).copied().collect()
    }

    pub fn as_slice(&self) -> &[Contribution] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn key_cmp(a: &Contribution, b: &Contribution) -> std::cmp::Ordering {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.channel_id.cmp(&b.channel_id))
    }
}

impl FromIterator<Contribution> for ContributorList {
    fn from_iter<I: IntoIterator<Item = Contribution>>(iter: I) -> Self {
        let mut contributions: Vec<Contribution> = iter.into_iter().collect();
        contributions.sort_by(Self::key_cmp);
        Self(contributions)
    }
}

/// Raw scorer output for one rating set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Recommendations {
    /// Similarity-weighted average rating per unrated channel
    pub scores: HashMap<ChannelId, f64>,
    /// Number of rated channels behind each score
    pub support_counts: HashMap<ChannelId, usize>,
    pub top_contributors: HashMap<ChannelId, ContributorList>,
}

impl Recommendations {
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Drops every channel `keep` rejects from all three maps
    pub fn retain(&mut self, mut keep: impl FnMut(ChannelId) -> bool) {
        self.scores.retain(|id, _| keep(*id));
        self.support_counts.retain(|id, _| keep(*id));
        self.top_contributors.retain(|id, _| keep(*id));
    }
}

/// One entry of a user's ranked recommendation list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoredChannel {
    pub channel_id: ChannelId,
    pub score: f64,
}

/// What a user is shown: best predicted scores first, with the reasons behind them
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RankedRecommendations {
    pub ranked: Vec<ScoredChannel>,
    pub reasons: HashMap<ChannelId, ContributorList>,
}

impl RankedRecommendations {
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.ranked.iter().map(|s| s.channel_id).collect()
    }
}
