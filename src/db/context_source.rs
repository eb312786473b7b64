use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::collections::HashMap;

use crate::{
    db::redis::{SessionData, SessionStore, SessionUpdate},
    error::{AppError, AppResult},
    models::{Identity, Interaction, SearchEntry, StoredProfile, WeightedInterest},
    services::context::ContextSource,
};

/// Action recorded when an authenticated user searches
const SEARCH_ACTION: &str = "search";

const MAX_SEARCH_HISTORY: i64 = 20;

#[derive(sqlx::FromRow)]
struct ProfileRow {
    birth_date: Option<NaiveDate>,
    gender: Option<String>,
    country: Option<String>,
    city: Option<String>,
}

#[derive(sqlx::FromRow)]
struct InterestRow {
    interest: String,
    weight: i64,
}

#[derive(sqlx::FromRow)]
struct InteractionRow {
    title: String,
    action: String,
    occurred_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SearchRow {
    title: String,
    last_searched: DateTime<Utc>,
}

/// Session interactions are stored oldest first
fn most_recent(mut interactions: Vec<Interaction>, limit: usize) -> Vec<Interaction> {
    interactions.reverse();
    interactions.truncate(limit);
    interactions
}

/// Personalization storage: PostgreSQL for users, Redis for anonymous sessions
#[derive(Clone)]
pub struct PersistentContextSource {
    db_pool: PgPool,
    sessions: SessionStore,
}

impl PersistentContextSource {
    pub fn new(db_pool: PgPool, sessions: SessionStore) -> Self {
        Self { db_pool, sessions }
    }

    async fn session(&self, token: &str) -> AppResult<SessionData> {
        Ok(self.sessions.load(token).await?.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl ContextSource for PersistentContextSource {
    async fn profile(&self, identity: &Identity) -> AppResult<Option<StoredProfile>> {
        match identity {
            Identity::User(user_id) => {
                let row = sqlx::query_as::<_, ProfileRow>(
                    "SELECT birth_date, gender, country, city FROM users WHERE id = $1",
                )
                .bind(user_id)
                .fetch_optional(&self.db_pool)
                .await?;

                Ok(row.map(|r| StoredProfile {
                    birth_date: r.birth_date,
                    gender: r.gender,
                    country: r.country,
                    city: r.city,
                }))
            }
            // Profiles belong to accounts
            Identity::Session(_) => Ok(None),
        }
    }

    async fn preferences(&self, identity: &Identity) -> AppResult<HashMap<String, f64>> {
        match identity {
            Identity::User(user_id) => {
                let stored: Option<String> = sqlx::query_scalar(
                    "SELECT preferences FROM user_preferences WHERE user_id = $1",
                )
                .bind(user_id)
                .fetch_optional(&self.db_pool)
                .await?;

                match stored {
                    Some(json) => serde_json::from_str(&json).map_err(|e| {
                        AppError::Internal(format!("Malformed stored preferences: {}", e))
                    }),
                    None => Ok(HashMap::new()),
                }
            }
            Identity::Session(_) => Ok(HashMap::new()),
        }
    }

    async fn selected_platforms(&self, identity: &Identity) -> AppResult<Vec<String>> {
        match identity {
            Identity::User(user_id) => {
                let platforms: Vec<String> = sqlx::query_scalar(
                    "SELECT platform_name FROM user_selected_platforms WHERE user_id = $1 ORDER BY id",
                )
                .bind(user_id)
                .fetch_all(&self.db_pool)
                .await?;
                Ok(platforms)
            }
            Identity::Session(token) => Ok(self.session(token).await?.selected_platforms),
        }
    }

    async fn interests(&self, identity: &Identity) -> AppResult<Vec<WeightedInterest>> {
        match identity {
            Identity::User(user_id) => {
                let rows = sqlx::query_as::<_, InterestRow>(
                    "SELECT interest, weight FROM user_interests WHERE user_id = $1 ORDER BY weight DESC LIMIT 20",
                )
                .bind(user_id)
                .fetch_all(&self.db_pool)
                .await?;

                Ok(rows
                    .into_iter()
                    .map(|r| WeightedInterest {
                        interest: r.interest,
                        weight: r.weight,
                    })
                    .collect())
            }
            Identity::Session(token) => Ok(self.session(token).await?.interests),
        }
    }

    async fn recent_interactions(
        &self,
        identity: &Identity,
        limit: usize,
    ) -> AppResult<Vec<Interaction>> {
        match identity {
            Identity::User(user_id) => {
                let rows = sqlx::query_as::<_, InteractionRow>(
                    "SELECT title, action, occurred_at FROM user_interactions \
                     WHERE user_id = $1 ORDER BY occurred_at DESC LIMIT $2",
                )
                .bind(user_id)
                .bind(limit as i64)
                .fetch_all(&self.db_pool)
                .await?;

                Ok(rows
                    .into_iter()
                    .map(|r| Interaction {
                        title: r.title,
                        action: r.action,
                        timestamp: r.occurred_at,
                    })
                    .collect())
            }
            Identity::Session(token) => {
                Ok(most_recent(self.session(token).await?.interactions, limit))
            }
        }
    }

    async fn record_interaction(
        &self,
        identity: &Identity,
        interaction: Interaction,
    ) -> AppResult<()> {
        match identity {
            Identity::User(user_id) => {
                sqlx::query(
                    "INSERT INTO user_interactions (user_id, title, action, occurred_at) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(user_id)
                .bind(&interaction.title)
                .bind(&interaction.action)
                .bind(interaction.timestamp)
                .execute(&self.db_pool)
                .await?;
            }
            Identity::Session(token) => {
                self.sessions
                    .update(token, SessionUpdate::RecordInteraction(interaction))
                    .await?;
            }
        }

        tracing::debug!(identity = %identity, "Interaction recorded");
        Ok(())
    }

    async fn record_search(
        &self,
        identity: &Identity,
        query: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        match identity {
            Identity::User(_) => {
                self.record_interaction(
                    identity,
                    Interaction {
                        title: query.to_string(),
                        action: SEARCH_ACTION.to_string(),
                        timestamp: at,
                    },
                )
                .await
            }
            Identity::Session(token) => {
                let entry = SearchEntry {
                    query: query.to_string(),
                    timestamp: at,
                };
                self.sessions
                    .update(token, SessionUpdate::RecordSearch(entry))
                    .await?;
                tracing::debug!(identity = %identity, "Search recorded");
                Ok(())
            }
        }
    }

    async fn search_history(&self, identity: &Identity) -> AppResult<Vec<SearchEntry>> {
        match identity {
            Identity::User(user_id) => {
                let rows = sqlx::query_as::<_, SearchRow>(
                    "SELECT title, MAX(occurred_at) AS last_searched FROM user_interactions \
                     WHERE user_id = $1 AND action = $2 \
                     GROUP BY title ORDER BY last_searched DESC LIMIT $3",
                )
                .bind(user_id)
                .bind(SEARCH_ACTION)
                .bind(MAX_SEARCH_HISTORY)
                .fetch_all(&self.db_pool)
                .await?;

                Ok(rows
                    .into_iter()
                    .map(|r| SearchEntry {
                        query: r.title,
                        timestamp: r.last_searched,
                    })
                    .collect())
            }
            Identity::Session(token) => Ok(self.session(token).await?.searches),
        }
    }

    async fn save_selected_platforms(
        &self,
        identity: &Identity,
        platforms: Vec<String>,
    ) -> AppResult<()> {
        match identity {
            Identity::User(user_id) => {
                let mut tx = self.db_pool.begin().await?;
                sqlx::query("DELETE FROM user_selected_platforms WHERE user_id = $1")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                for platform in &platforms {
                    sqlx::query(
                        "INSERT INTO user_selected_platforms (user_id, platform_name) VALUES ($1, $2)",
                    )
                    .bind(user_id)
                    .bind(platform)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
            }
            Identity::Session(token) => {
                self.sessions
                    .update(token, SessionUpdate::SelectPlatforms(platforms))
                    .await?;
            }
        }

        tracing::debug!(identity = %identity, "Selected platforms saved");
        Ok(())
    }

    async fn save_interests(
        &self,
        identity: &Identity,
        interests: Vec<WeightedInterest>,
    ) -> AppResult<()> {
        match identity {
            Identity::User(user_id) => {
                let mut tx = self.db_pool.begin().await?;
                sqlx::query("DELETE FROM user_interests WHERE user_id = $1")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                for interest in &interests {
                    sqlx::query(
                        "INSERT INTO user_interests (user_id, interest, weight) VALUES ($1, $2, $3)",
                    )
                    .bind(user_id)
                    .bind(&interest.interest)
                    .bind(interest.weight)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
            }
            Identity::Session(token) => {
                self.sessions
                    .update(token, SessionUpdate::SetInterests(interests))
                    .await?;
            }
        }

        tracing::debug!(identity = %identity, "Interests saved");
        Ok(())
    }
}
