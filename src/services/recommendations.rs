use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::instrument;

use crate::{
    cached,
    config::Config,
    db::{Cache, CacheKey},
    error::AppResult,
    models::{
        AddedChannel, ChannelId, Contribution, RankedRecommendations, Rating, Recommendations,
        ScoredChannel, SimilarityEdge, UserId,
    },
    services::store::{ChannelCatalog, RatingSource, SimilarityStore},
};

/// Tunables for turning raw scores into what a user is shown
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorerSettings {
    /// Rated channels needed behind a score before it is trusted
    pub min_support: usize,
    pub min_predicted_score: f64,
    pub max_results: usize,
    /// Seconds a ranked list stays cached
    pub cache_ttl: u64,
    /// Weakest edge still shown as a similar channel
    pub similar_min_cosine: f64,
    pub similar_limit: usize,
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self {
            min_support: 4,
            min_predicted_score: 3.25,
            max_results: 99,
            cache_ttl: 3600,
            similar_min_cosine: 0.025,
            similar_limit: 3,
        }
    }
}

impl From<&Config> for ScorerSettings {
    fn from(config: &Config) -> Self {
        Self {
            min_support: config.min_support,
            min_predicted_score: config.min_predicted_score,
            max_results: config.max_recommendations,
            cache_ttl: config.recommendation_cache_ttl,
            similar_min_cosine: config.similar_min_cosine,
            similar_limit: config.similar_channels_limit,
        }
    }
}

/// Projects ratings onto unrated neighbours through the similarity edges
///
/// Each unrated channel gets the similarity-weighted average of the ratings
/// of the rated channels it is connected to. Channels without a positive
/// edge to any rated channel are absent from the result.
pub fn calculate_scores(
    edges: &[SimilarityEdge],
    ratings: &HashMap<ChannelId, f64>,
) -> Recommendations {
    let mut weighted: HashMap<ChannelId, f64> = HashMap::new();
    let mut total_similarity: HashMap<ChannelId, f64> = HashMap::new();
    let mut recommendations = Recommendations::default();

    for edge in edges.iter().filter(|e| e.cosine > 0.0) {
        let directions = [
            (edge.channel1_id, edge.channel2_id),
            (edge.channel2_id, edge.channel1_id),
        ];
        for (rated, other) in directions {
            let Some(&rating) = ratings.get(&rated) else {
                continue;
            };
            if ratings.contains_key(&other) {
                continue;
            }

            let contribution = edge.cosine * rating;
            *weighted.entry(other).or_default() += contribution;
            *total_similarity.entry(other).or_default() += edge.cosine;
            *recommendations.support_counts.entry(other).or_default() += 1;
            recommendations
                .top_contributors
                .entry(other)
                .or_default()
                .insert(Contribution {
                    score: contribution,
                    channel_id: rated,
                });
        }
    }

    recommendations.scores = weighted
        .into_iter()
        .map(|(channel, sum)| (channel, sum / total_similarity[&channel]))
        .collect();
    recommendations
}

/// Sorts by predicted score, drops weak scores and keeps reasons only for what survives
///
/// Channels in `excluded` are dropped before truncation.
fn rank(
    recommendations: Recommendations,
    settings: &ScorerSettings,
    excluded: &HashSet<ChannelId>,
) -> RankedRecommendations {
    let mut ranked: Vec<ScoredChannel> = recommendations
        .scores
        .iter()
        .filter(|(id, score)| **score >= settings.min_predicted_score && !excluded.contains(*id))
        .map(|(&channel_id, &score)| ScoredChannel { channel_id, score })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.channel_id.cmp(&b.channel_id))
    });
    ranked.truncate(settings.max_results);

    let mut contributors = recommendations.top_contributors;
    let reasons = ranked
        .iter()
        .filter_map(|s| {
            contributors
                .remove(&s.channel_id)
                .map(|list| (s.channel_id, list))
        })
        .collect();

    RankedRecommendations { ranked, reasons }
}

/// Turns a user's ratings into predicted scores for channels they have not rated
pub struct RecommendationScorer {
    edges: Arc<dyn SimilarityStore>,
    catalog: Arc<dyn ChannelCatalog>,
    ratings: Arc<dyn RatingSource>,
    cache: Option<Cache>,
    settings: ScorerSettings,
}

impl RecommendationScorer {
    pub fn new(
        edges: Arc<dyn SimilarityStore>,
        catalog: Arc<dyn ChannelCatalog>,
        ratings: Arc<dyn RatingSource>,
    ) -> Self {
        Self {
            edges,
            catalog,
            ratings,
            cache: None,
            settings: ScorerSettings::default(),
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_settings(mut self, settings: ScorerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Raw scores, support counts and contributors for one rating set
    #[instrument(skip(self, ratings), fields(rated = ratings.len()))]
    pub async fn score(&self, ratings: &HashMap<ChannelId, f64>) -> AppResult<Recommendations> {
        if ratings.is_empty() {
            return Ok(Recommendations::default());
        }

        let mut rated: Vec<ChannelId> = ratings.keys().copied().collect();
        rated.sort_unstable();
        let edges = self.edges.edges_touching(&rated).await?;
        let recommendations = calculate_scores(&edges, ratings);

        tracing::debug!(
            edges = edges.len(),
            scored = recommendations.scores.len(),
            "Scored rating set"
        );
        Ok(recommendations)
    }

    /// Scores with the support filter applied
    ///
    /// Keeps channels backed by at least `min_support` rated channels that are
    /// still listed. When nothing reaches the support threshold the unfiltered
    /// scores are returned instead.
    pub async fn recommend_from_ratings(
        &self,
        ratings: &HashMap<ChannelId, f64>,
    ) -> AppResult<Recommendations> {
        let mut recommendations = self.score(ratings).await?;

        let mut supported: Vec<ChannelId> = recommendations
            .support_counts
            .iter()
            .filter(|(_, count)| **count >= self.settings.min_support)
            .map(|(id, _)| *id)
            .collect();
        if supported.is_empty() {
            tracing::debug!(
                min_support = self.settings.min_support,
                "No channel reaches min support, keeping unfiltered scores"
            );
            return Ok(recommendations);
        }
        supported.sort_unstable();

        let listed: HashSet<ChannelId> = self.catalog.listed(&supported).await?.into_iter().collect();
        recommendations.retain(|id| listed.contains(&id));
        Ok(recommendations)
    }

    /// Ranked recommendations for a set of ratings, leaving out channels already added
    pub async fn rank_ratings(
        &self,
        ratings: &[Rating],
        added: &[AddedChannel],
    ) -> AppResult<RankedRecommendations> {
        let by_channel: HashMap<ChannelId, f64> =
            ratings.iter().map(|r| (r.channel_id, r.rating)).collect();
        let recommendations = self.recommend_from_ratings(&by_channel).await?;
        let excluded: HashSet<ChannelId> = added.iter().map(|a| a.channel_id).collect();
        Ok(rank(recommendations, &self.settings, &excluded))
    }

    /// Ranked recommendations for a user, read through the cache when one is configured
    ///
    /// Channels the user already added are never recommended. The cache key
    /// carries the time of the user's latest rating or added channel, so either
    /// moves the user to a fresh key.
    #[instrument(skip(self))]
    pub async fn recommend_for_user(&self, user_id: UserId) -> AppResult<RankedRecommendations> {
        let ratings = self.ratings.ratings_for_user(user_id).await?;
        let Some(latest_rating) = ratings.iter().map(|r| r.timestamp).max() else {
            return Ok(RankedRecommendations::default());
        };
        let added = self.ratings.added_channels(user_id).await?;
        let as_of = added
            .iter()
            .map(|a| a.timestamp)
            .fold(latest_rating, |latest, ts| latest.max(ts));

        let ranked: AppResult<RankedRecommendations> = match &self.cache {
            Some(cache) => {
                let key = CacheKey::Recommendations {
                    user_id,
                    as_of: as_of.timestamp(),
                };
                cached!(cache, key, self.settings.cache_ttl, async {
                    self.rank_ratings(&ratings, &added).await
                })
            }
            None => self.rank_ratings(&ratings, &added).await,
        };
        let ranked = ranked?;

        tracing::info!(
            ratings = ratings.len(),
            added = added.len(),
            recommended = ranked.ranked.len(),
            "Recommendations ready"
        );
        Ok(ranked)
    }

    /// Channels most similar to `channel`, strongest first
    ///
    /// Only edges at or above `similar_min_cosine` count, and only listed
    /// channels are returned, at most `similar_limit` of them.
    #[instrument(skip(self))]
    pub async fn similar_channels(&self, channel: ChannelId) -> AppResult<Vec<ScoredChannel>> {
        let mut neighbours: Vec<ScoredChannel> = self
            .edges
            .edges_touching(&[channel])
            .await?
            .into_iter()
            .filter(|edge| edge.cosine >= self.settings.similar_min_cosine)
            .filter_map(|edge| {
                let other = edge.pair()?.other(channel)?;
                Some(ScoredChannel {
                    channel_id: other,
                    score: edge.cosine,
                })
            })
            .collect();
        if neighbours.is_empty() {
            return Ok(neighbours);
        }

        let ids: Vec<ChannelId> = neighbours.iter().map(|n| n.channel_id).collect();
        let listed: HashSet<ChannelId> = self.catalog.listed(&ids).await?.into_iter().collect();

        neighbours.retain(|n| listed.contains(&n.channel_id));
        neighbours.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.channel_id.cmp(&b.channel_id))
        });
        neighbours.truncate(self.settings.similar_limit);
        Ok(neighbours)
    }
}
