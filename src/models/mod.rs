pub mod rating;
pub mod recommendation;
pub mod similarity;
pub mod subscription;

pub use rating::{AddedChannel, Rating, UserId};
pub use recommendation::{
    Contribution, ContributorList, RankedRecommendations, Recommendations, ScoredChannel,
};
pub use similarity::{ChannelPair, EdgeUpdate, SimilarityEdge};
pub use subscription::{ChannelState, NewSubscription, SubscriptionEvent, UNKNOWN_SOURCE};

/// Identifier of a channel in the guide
///
/// The whole core speaks in bare ids; mapping records to ids is the caller's job.
pub type ChannelId = i64;
