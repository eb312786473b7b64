//! Personalization context aggregation
//!
//! Every read against the personalization store is best-effort: a failing or
//! slow sub-resource is logged and replaced by an empty value so the pipeline
//! never blocks on partial data.
use chrono::{DateTime, Utc};
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use crate::{
    error::AppResult,
    models::{
        Identity, Interaction, PersonalizationContext, ProfileAttributes, SearchEntry,
        StoredProfile, WeightedInterest, RECENT_INTERACTION_WINDOW,
    },
    services::clock::Clock,
};

/// Per-identity personalization storage
///
/// Implementations back authenticated users and anonymous sessions with
/// whatever store they like. The aggregator only relies on the reads; the
/// writes and history reads serve the tracking and selection endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContextSource: Send + Sync {
    async fn profile(&self, identity: &Identity) -> AppResult<Option<StoredProfile>>;

    /// Topic → weight map of saved preferences
    async fn preferences(&self, identity: &Identity) -> AppResult<HashMap<String, f64>>;

    async fn selected_platforms(&self, identity: &Identity) -> AppResult<Vec<String>>;

    async fn interests(&self, identity: &Identity) -> AppResult<Vec<WeightedInterest>>;

    /// Up to `limit` interactions, most recent first
    async fn recent_interactions(
        &self,
        identity: &Identity,
        limit: usize,
    ) -> AppResult<Vec<Interaction>>;

    async fn record_interaction(
        &self,
        identity: &Identity,
        interaction: Interaction,
    ) -> AppResult<()>;

    async fn record_search(
        &self,
        identity: &Identity,
        query: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Distinct past searches, most recent first
    async fn search_history(&self, identity: &Identity) -> AppResult<Vec<SearchEntry>>;

    /// Replaces the selected platforms
    async fn save_selected_platforms(
        &self,
        identity: &Identity,
        platforms: Vec<String>,
    ) -> AppResult<()>;

    /// Replaces the saved interests
    async fn save_interests(
        &self,
        identity: &Identity,
        interests: Vec<WeightedInterest>,
    ) -> AppResult<()>;
}

/// Builds a [`PersonalizationContext`] for an identity
#[derive(Clone)]
pub struct ContextAggregator {
    source: Arc<dyn ContextSource>,
    clock: Arc<dyn Clock>,
    read_timeout: Duration,
}

impl ContextAggregator {
    pub fn new(source: Arc<dyn ContextSource>, clock: Arc<dyn Clock>, read_timeout: Duration) -> Self {
        Self {
            source,
            clock,
            read_timeout,
        }
    }

    /// Gathers profile, preferences, platforms, interests and recent interactions.
    ///
    /// Never fails. Without an identity the context is empty.
    pub async fn aggregate(&self, identity: Option<&Identity>) -> PersonalizationContext {
        let Some(identity) = identity else {
            return PersonalizationContext::anonymous();
        };

        let (profile, preferences, platforms, interests, interactions) = tokio::join!(
            self.read("profile", identity, self.source.profile(identity)),
            self.read("preferences", identity, self.source.preferences(identity)),
            self.read("platforms", identity, self.source.selected_platforms(identity)),
            self.read("interests", identity, self.source.interests(identity)),
            self.read(
                "interactions",
                identity,
                self.source
                    .recent_interactions(identity, RECENT_INTERACTION_WINDOW)
            ),
        );

        let context = PersonalizationContext {
            identity: Some(identity.clone()),
            profile: profile
                .map(|p| ProfileAttributes::from_stored(p, self.clock.today()))
                .unwrap_or_default(),
            preference_weights: sort_preferences(preferences),
            interests: sort_interests(interests),
            selected_platforms: platforms
                .into_iter()
                .filter(|p| !p.trim().is_empty())
                .collect(),
            recent_interactions: sort_interactions(interactions),
        };

        tracing::debug!(
            identity = %identity,
            preferences = context.preference_weights.len(),
            interests = context.interests.len(),
            platforms = context.selected_platforms.len(),
            interactions = context.recent_interactions.len(),
            "Personalization context aggregated"
        );

        context
    }

    /// Runs one store read under the read timeout, defaulting on any failure
    async fn read<T, F>(&self, resource: &'static str, identity: &Identity, read: F) -> T
    where
        T: Default,
        F: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout(self.read_timeout, read).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!(
                    identity = %identity,
                    resource = resource,
                    error = %e,
                    "Context read failed, using empty default"
                );
                T::default()
            }
            Err(_) => {
                tracing::warn!(
                    identity = %identity,
                    resource = resource,
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "Context read timed out, using empty default"
                );
                T::default()
            }
        }
    }
}

fn sort_preferences(preferences: HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut weights: Vec<(String, f64)> = preferences
        .into_iter()
        .filter(|(topic, _)| !topic.trim().is_empty())
        .collect();
    // Ties broken by name so the order does not depend on hash iteration
    weights.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    weights
}

fn sort_interests(mut interests: Vec<WeightedInterest>) -> Vec<String> {
    interests.sort_by(|a, b| b.weight.cmp(&a.weight));
    interests
        .into_iter()
        .map(|i| i.interest)
        .filter(|i| !i.trim().is_empty())
        .collect()
}

fn sort_interactions(mut interactions: Vec<Interaction>) -> Vec<Interaction> {
    interactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    interactions.truncate(RECENT_INTERACTION_WINDOW);
    interactions
}
