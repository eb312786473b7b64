use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Maximum number of interactions kept in a personalization context
pub const RECENT_INTERACTION_WINDOW: usize = 20;

/// Who a request is personalized for
///
/// Authenticated users are keyed by their numeric id; anonymous visitors by an
/// opaque session token that stands in for personalization storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    User(i64),
    Session(String),
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::User(id) => write!(f, "user:{}", id),
            Identity::Session(token) => write!(f, "session:{}", token),
        }
    }
}

/// Profile row as stored; converted into [`ProfileAttributes`] by the aggregator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Demographic attributes used to tailor prompts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

impl ProfileAttributes {
    /// Builds attributes from a stored profile, deriving age from the birth year
    pub fn from_stored(profile: StoredProfile, today: NaiveDate) -> Self {
        use chrono::Datelike;

        Self {
            age: profile.birth_date.map(|born| today.year() - born.year()),
            gender: non_blank(profile.gender),
            country: non_blank(profile.country),
            city: non_blank(profile.city),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.age.is_none() && self.gender.is_none() && self.country.is_none() && self.city.is_none()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A weighted interest as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedInterest {
    pub interest: String,
    pub weight: i64,
}

/// A single user interaction with a recommendation (click, like, search, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub title: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// A past search, as shown in search history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything known about an identity that is useful for tailoring a prompt
///
/// Built fresh for every request and never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonalizationContext {
    pub identity: Option<Identity>,
    pub profile: ProfileAttributes,
    /// Topic weights, sorted by weight descending
    pub preference_weights: Vec<(String, f64)>,
    /// Interests, most weighted first
    pub interests: Vec<String>,
    pub selected_platforms: Vec<String>,
    /// Most recent first, at most [`RECENT_INTERACTION_WINDOW`] entries
    pub recent_interactions: Vec<Interaction>,
}

impl PersonalizationContext {
    /// An empty context for requests without any identity
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Titles of the most recent `click` interactions
    pub fn top_clicked(&self, limit: usize) -> Vec<&str> {
        self.recent_interactions
            .iter()
            .filter(|i| i.action == "click")
            .take(limit)
            .map(|i| i.title.as_str())
            .collect()
    }

    /// Preference topic names, heaviest first
    pub fn top_preferences(&self, limit: usize) -> Vec<&str> {
        self.preference_weights
            .iter()
            .take(limit)
            .map(|(topic, _)| topic.as_str())
            .collect()
    }

    pub fn top_interests(&self, limit: usize) -> Vec<&str> {
        self.interests.iter().take(limit).map(String::as_str).collect()
    }
}
