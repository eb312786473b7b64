pub mod attempt;
pub mod context;
pub mod recommendation;

pub use attempt::{AttemptOutcome, GenerationAttempt};
pub use context::{
    Identity, Interaction, PersonalizationContext, ProfileAttributes, SearchEntry,
    StoredProfile, WeightedInterest, RECENT_INTERACTION_WINDOW,
};
pub use recommendation::{
    ContentType, RecommendationRecord, RecommendationSource, Recommendations,
};

use serde::Deserialize;

/// Request body for the recommendations endpoint
#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub query: String,
}

/// Request body for tracking an interaction
#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub title: String,
    pub action: String,
    #[serde(default)]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

/// Request body for recording a search
#[derive(Debug, Deserialize)]
pub struct SearchHistoryRequest {
    pub query: String,
}

/// Request body replacing the selected platforms
#[derive(Debug, Deserialize)]
pub struct SelectedPlatformsRequest {
    pub platforms: Vec<String>,
}

/// One interest as submitted; the weight defaults to 1
#[derive(Debug, Deserialize)]
pub struct InterestInput {
    pub interest: String,
    #[serde(default = "default_interest_weight")]
    pub weight: i64,
}

/// Request body replacing the saved interests
#[derive(Debug, Deserialize)]
pub struct InterestsRequest {
    pub interests: Vec<InterestInput>,
}

/// Query parameters for the interaction history endpoint
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

/// Query parameters for the feed endpoint
#[derive(Debug, Deserialize)]
pub struct FeedParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

fn default_interest_weight() -> i64 {
    1
}

fn default_history_limit() -> usize {
    50
}
