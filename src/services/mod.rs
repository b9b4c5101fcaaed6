pub mod clock;
pub mod recommendations;
pub mod similarity;
pub mod store;
pub mod subscriptions;

pub use clock::{Clock, ManualClock, SystemClock};
pub use recommendations::{calculate_scores, RecommendationScorer, ScorerSettings};
pub use similarity::{RecomputeScope, RecomputeSummary, SimilarityEngine};
pub use subscriptions::{SubscribeOutcome, SubscriptionService};
