use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_test::assert_ok;

use channelguide_recs::{
    jobs::{MemoryCheckpoints, RecomputeJob, RecomputeMode},
    models::{
        ChannelId, ChannelPair, ChannelState, NewSubscription, Rating, SimilarityEdge,
        UNKNOWN_SOURCE,
    },
    services::{
        calculate_scores,
        store::{MemoryStore, SimilarityStore},
        ManualClock, RecommendationScorer, ScorerSettings, SimilarityEngine, SubscriptionService,
    },
};

const IP1: &str = "1.1.1.1";
const IP2: &str = "2.2.2.2";
const IP3: &str = "3.3.3.3";

/// Subscriptions behind the fixture, as `(channel, source, age in days, ignored)`
///
/// Channels 0..=9 are approved, channel 10 is an audio channel and never counts.
fn fixture_events() -> Vec<(ChannelId, &'static str, i64, bool)> {
    vec![
        (0, UNKNOWN_SOURCE, 0, false),
        (0, IP1, 0, false),
        (0, IP2, 0, false),
        (1, IP1, 0, false),
        (1, IP2, 0, false),
        (2, IP2, 0, false),
        (2, IP3, 0, false),
        (3, UNKNOWN_SOURCE, 0, false),
        (4, UNKNOWN_SOURCE, 0, false),
        (4, IP1, 0, false),
        (5, IP1, 0, true),
        (6, IP1, 3, false),
        (7, IP1, 217, false),
        (8, IP3, 0, false),
        (9, IP1, 3, false),
        (10, IP1, 0, false),
        (10, IP2, 0, false),
    ]
}

struct Fixture {
    store: MemoryStore,
    clock: Arc<ManualClock>,
    engine: Arc<SimilarityEngine>,
    subscriptions: SubscriptionService,
    now: DateTime<Utc>,
}

async fn empty_fixture() -> Fixture {
    let store = MemoryStore::new();
    for id in 0..=9 {
        store.add_channel(id, ChannelState::Approved).await;
    }
    store.add_channel(10, ChannelState::Audio).await;

    let now = Utc::now();
    let clock = Arc::new(ManualClock::new(now));
    let shared = Arc::new(store.clone());
    let engine = Arc::new(
        SimilarityEngine::new(shared.clone(), shared.clone(), shared.clone()).with_clock(clock.clone()),
    );
    let subscriptions = SubscriptionService::new(shared, engine.clone());

    Fixture {
        store,
        clock,
        engine,
        subscriptions,
        now,
    }
}

async fn subscribed_fixture() -> Fixture {
    let fixture = empty_fixture().await;
    for (channel, source, age_days, ignored) in fixture_events() {
        let mut subscription =
            NewSubscription::new(channel, source).at(fixture.now - Duration::days(age_days));
        if ignored {
            subscription = subscription.ignored();
        }
        assert_ok!(fixture.subscriptions.subscribe(subscription).await);
    }
    fixture
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

fn sorted(mut edges: Vec<SimilarityEdge>) -> Vec<(ChannelId, ChannelId, f64)> {
    edges.sort_by_key(|e| (e.channel1_id, e.channel2_id));
    edges
        .into_iter()
        .map(|e| (e.channel1_id, e.channel2_id, e.cosine))
        .collect()
}

#[tokio::test]
async fn test_similarity_from_shared_sources() {
    let f = subscribed_fixture().await;
    let half_sqrt2 = 1.0 / 2f64.sqrt();

    let expected = [
        (0, 1, 1.0),
        (0, 2, 0.5),
        (0, 4, half_sqrt2),
        (0, 6, half_sqrt2),
        (0, 9, half_sqrt2),
        (1, 2, 0.5),
        (1, 4, half_sqrt2),
        (2, 8, half_sqrt2),
        (4, 6, 1.0),
        (4, 9, 1.0),
        (6, 9, 1.0),
    ];
    for (a, b, cosine) in expected {
        assert_close(f.engine.similarity(a, b).await.unwrap(), cosine);
    }
}

#[tokio::test]
async fn test_excluded_events_never_count() {
    let f = subscribed_fixture().await;

    // Only the unknown source in common
    assert_eq!(f.engine.similarity(3, 4).await.unwrap(), 0.0);
    assert_eq!(f.engine.similarity(0, 3).await.unwrap(), 0.0);
    // Older than the window
    assert_eq!(f.engine.similarity(4, 7).await.unwrap(), 0.0);
    // Flagged ignore_for_recommendations
    assert_eq!(f.engine.similarity(4, 5).await.unwrap(), 0.0);
    // Not an approved channel
    assert_eq!(f.engine.similarity(0, 10).await.unwrap(), 0.0);
    // Unknown channel
    assert_eq!(f.engine.similarity(0, 999).await.unwrap(), 0.0);

    let edges = f.store.edges().await;
    assert!(edges
        .iter()
        .all(|e| ![3, 5, 7, 10].contains(&e.channel1_id) && ![3, 5, 7, 10].contains(&e.channel2_id)));
}

#[tokio::test]
async fn test_similarity_is_symmetric_and_bounded() {
    let f = subscribed_fixture().await;
    for a in 0..=10 {
        for b in 0..=10 {
            let ab = f.engine.similarity(a, b).await.unwrap();
            let ba = f.engine.similarity(b, a).await.unwrap();
            assert_eq!(ab, ba, "similarity({a}, {b})");
            assert!((0.0..=1.0).contains(&ab));
        }
        assert_eq!(f.engine.similarity(a, a).await.unwrap(), 0.0);
    }
}

#[tokio::test]
async fn test_relevant_candidates() {
    let f = subscribed_fixture().await;

    let by_source = f.engine.relevant_candidates(1, Some(IP1)).await.unwrap();
    assert_eq!(by_source.into_iter().collect::<Vec<_>>(), vec![0, 4, 6, 9]);

    for (channel, expected) in [
        (1, vec![0, 2, 4, 6, 9]),
        (2, vec![0, 1, 8]),
        (4, vec![0, 1, 6, 9]),
    ] {
        let shared = f.engine.relevant_candidates(channel, None).await.unwrap();
        assert_eq!(shared.into_iter().collect::<Vec<_>>(), expected);
    }

    let sentinel = f.engine.relevant_candidates(3, Some(UNKNOWN_SOURCE)).await.unwrap();
    assert!(sentinel.is_empty());
}

#[tokio::test]
async fn test_full_recompute_builds_canonical_pruned_table() {
    let f = subscribed_fixture().await;
    f.store.seed_edge(3, 5, 0.4).await;

    let summary = f.engine.recompute_all().await.unwrap();
    assert_eq!(summary.channels, 10);
    assert_eq!(summary.edges_written, 13);

    let pairs: Vec<(ChannelId, ChannelId)> = sorted(f.store.edges().await)
        .into_iter()
        .map(|(a, b, _)| (a, b))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (0, 1),
            (0, 2),
            (0, 4),
            (0, 6),
            (0, 9),
            (1, 2),
            (1, 4),
            (1, 6),
            (1, 9),
            (2, 8),
            (4, 6),
            (4, 9),
            (6, 9),
        ]
    );
    for edge in f.store.edges().await {
        assert!(edge.channel1_id < edge.channel2_id);
        assert!(edge.cosine > 0.0);
    }
}

#[tokio::test]
async fn test_incremental_updates_match_full_recompute() {
    let f = subscribed_fixture().await;
    let incremental = sorted(f.store.edges().await);
    assert!(!incremental.is_empty());

    f.engine.recompute_all().await.unwrap();
    let full = sorted(f.store.edges().await);

    assert_eq!(incremental.len(), full.len());
    for ((a1, b1, c1), (a2, b2, c2)) in incremental.into_iter().zip(full) {
        assert_eq!((a1, b1), (a2, b2));
        assert_close(c1, c2);
    }
}

#[tokio::test]
async fn test_new_source_rescales_existing_neighbours() {
    let f = subscribed_fixture().await;
    assert_close(f.store.edge(pair(4, 6)).await.unwrap().unwrap().cosine, 1.0);

    // Channel 4 picks up a source nobody else has; its norm grows
    f.subscriptions
        .subscribe(NewSubscription::new(4, "9.9.9.9").at(f.now))
        .await
        .unwrap();

    assert_close(
        f.store.edge(pair(4, 6)).await.unwrap().unwrap().cosine,
        1.0 / 2f64.sqrt(),
    );
}

#[tokio::test]
async fn test_unknown_source_subscription_stores_nothing() {
    let f = empty_fixture().await;
    for channel in [3, 4] {
        f.subscriptions
            .subscribe(NewSubscription::new(channel, UNKNOWN_SOURCE).at(f.now))
            .await
            .unwrap();
    }
    assert_eq!(f.engine.recompute_incremental(3, UNKNOWN_SOURCE).await.unwrap(), 0);
    assert_eq!(f.engine.similarity(3, 4).await.unwrap(), 0.0);
    assert!(f.store.edges().await.is_empty());
    assert_eq!(f.store.subscription_count().await, 2);
}

#[tokio::test]
async fn test_events_age_out_of_the_window() {
    let f = subscribed_fixture().await;
    assert_eq!(f.engine.similarity(4, 6).await.unwrap(), 1.0);

    // Channel 6's event is now 31 days old, channel 4's only 28
    f.clock.advance(Duration::days(28));
    assert_eq!(f.engine.similarity(4, 6).await.unwrap(), 0.0);
    assert_eq!(f.engine.similarity(0, 1).await.unwrap(), 1.0);

    f.engine.recompute_all().await.unwrap();
    assert!(f.store.edge(pair(4, 6)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_batch_job_over_fixture() {
    let f = subscribed_fixture().await;
    let checkpoints = Arc::new(MemoryCheckpoints::new());
    let job = RecomputeJob::new(f.engine.clone(), checkpoints);

    let recent = job
        .run(RecomputeMode::Recent(Duration::hours(48)))
        .await
        .unwrap();
    // Channels 6 and 9 were last active three days ago
    assert_eq!(recent.channels, 5);

    let all = job.run(RecomputeMode::All).await.unwrap();
    assert_eq!(all.channels, 10);
    assert_eq!(f.store.edges().await.len(), 13);
}

fn pair(a: ChannelId, b: ChannelId) -> ChannelPair {
    ChannelPair::new(a, b).unwrap()
}

fn rating(user_id: i64, channel_id: ChannelId, rating: f64, at: DateTime<Utc>) -> Rating {
    Rating {
        user_id,
        channel_id,
        rating,
        timestamp: at,
    }
}

#[tokio::test]
async fn test_scores_from_stored_similarities() {
    let store = MemoryStore::new();
    for id in 0..=4 {
        store.add_channel(id, ChannelState::Approved).await;
    }
    store.seed_edge(0, 1, 0.5).await;
    store.seed_edge(0, 3, 0.6).await;
    store.seed_edge(2, 4, 0.9).await;
    store.seed_edge(3, 4, 0.2).await;

    let shared = Arc::new(store.clone());
    let scorer = RecommendationScorer::new(shared.clone(), shared.clone(), shared);
    let ratings: HashMap<ChannelId, f64> = [(0, 5.0), (4, 3.0)].into_iter().collect();

    let recs = scorer.score(&ratings).await.unwrap();
    assert_eq!(recs.scores.len(), 3);
    assert_close(recs.scores[&1], 5.0);
    assert_close(recs.scores[&2], 3.0);
    assert_close(recs.scores[&3], (5.0 * 0.6 + 3.0 * 0.2) / 0.8);
    assert_eq!(recs.support_counts[&3], 2);

    let contributors: Vec<ChannelId> = recs.top_contributors[&3]
        .as_slice()
        .iter()
        .map(|c| c.channel_id)
        .collect();
    assert_eq!(contributors, vec![4, 0]);
    assert_eq!(recs.top_contributors[&3].strongest(1)[0].channel_id, 0);
}

#[tokio::test]
async fn test_zero_support_channel_is_absent() {
    let f = subscribed_fixture().await;
    f.engine.recompute_all().await.unwrap();

    let edges = f.store.edges_touching(&[0]).await.unwrap();
    let ratings: HashMap<ChannelId, f64> = [(0, 5.0)].into_iter().collect();
    let recs = calculate_scores(&edges, &ratings);

    // Channel 8 shares nothing with channel 0
    assert!(!recs.scores.contains_key(&8));
    assert!(!recs.scores.contains_key(&0));
    assert_close(recs.scores[&1], 5.0);
}

#[tokio::test]
async fn test_user_recommendations_over_fixture() {
    let f = subscribed_fixture().await;
    f.engine.recompute_all().await.unwrap();

    // Rated channels 0, 1, 4 and 9 all neighbour channel 6
    for (channel, score) in [(0, 4.0), (1, 5.0), (4, 4.0), (9, 3.0)] {
        f.store.add_rating(rating(1, channel, score, f.now)).await;
    }

    let shared = Arc::new(f.store.clone());
    let scorer = RecommendationScorer::new(shared.clone(), shared.clone(), shared).with_settings(
        ScorerSettings {
            min_support: 4,
            ..ScorerSettings::default()
        },
    );

    let ranked = scorer.recommend_for_user(1).await.unwrap();
    assert_eq!(ranked.channel_ids(), vec![6]);

    let half_sqrt2 = 1.0 / 2f64.sqrt();
    let expected = (4.0 * half_sqrt2 + 5.0 * half_sqrt2 + 4.0 + 3.0) / (2.0 * half_sqrt2 + 2.0);
    assert_close(ranked.ranked[0].score, expected);
    assert_eq!(ranked.reasons[&6].len(), 4);
    assert!(ranked.reasons.keys().all(|id| *id == 6));
}

#[tokio::test]
async fn test_similar_channels_over_fixture() {
    let f = subscribed_fixture().await;
    f.engine.recompute_all().await.unwrap();

    let shared = Arc::new(f.store.clone());
    let scorer = RecommendationScorer::new(shared.clone(), shared.clone(), shared);

    let similar = scorer.similar_channels(4).await.unwrap();
    let ids: Vec<ChannelId> = similar.iter().map(|s| s.channel_id).collect();
    assert_eq!(ids, vec![6, 9, 0]);
    assert_close(similar[2].score, 1.0 / 2f64.sqrt());

    f.store.archive_channel(6).await;
    let ids: Vec<ChannelId> = scorer
        .similar_channels(4)
        .await
        .unwrap()
        .iter()
        .map(|s| s.channel_id)
        .collect();
    assert_eq!(ids, vec![9, 0, 1]);
}
