use async_trait::async_trait;
use redis::AsyncCommands;
use redis::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::error::AppResult;
use crate::models::{Interaction, SearchEntry, WeightedInterest};

/// Anonymous sessions expire an hour after their last write
pub const SESSION_TTL: u64 = 3600;

pub const MAX_SESSION_INTERACTIONS: usize = 50;
pub const MAX_SESSION_SEARCHES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Data(String),
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKey::Data(token) => write!(f, "session:{}", token),
        }
    }
}

/// Everything personalization keeps for a visitor without an account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionData {
    pub selected_platforms: Vec<String>,
    pub interests: Vec<WeightedInterest>,
    /// Oldest first
    pub interactions: Vec<Interaction>,
    /// Newest first, one entry per query
    pub searches: Vec<SearchEntry>,
}

/// A single change to a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    SelectPlatforms(Vec<String>),
    SetInterests(Vec<WeightedInterest>),
    RecordInteraction(Interaction),
    RecordSearch(SearchEntry),
}

impl SessionData {
    pub fn apply(&mut self, update: SessionUpdate) {
        match update {
            SessionUpdate::SelectPlatforms(platforms) => self.selected_platforms = platforms,
            SessionUpdate::SetInterests(interests) => self.interests = interests,
            SessionUpdate::RecordInteraction(interaction) => self.push_interaction(interaction),
            SessionUpdate::RecordSearch(entry) => self.push_search(entry),
        }
    }

    /// Appends an interaction, keeping only the most recent ones
    pub fn push_interaction(&mut self, interaction: Interaction) {
        self.interactions.push(interaction);
        if self.interactions.len() > MAX_SESSION_INTERACTIONS {
            let excess = self.interactions.len() - MAX_SESSION_INTERACTIONS;
            self.interactions.drain(..excess);
        }
    }

    /// Moves a repeated query to the front instead of storing it twice
    pub fn push_search(&mut self, entry: SearchEntry) {
        self.searches.retain(|existing| existing.query != entry.query);
        self.searches.insert(0, entry);
        self.searches.truncate(MAX_SESSION_SEARCHES);
    }
}

/// Key-value storage behind [`SessionStore`]
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: String, ttl: u64) -> AppResult<()>;
}

#[async_trait]
impl SessionBackend for Client {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.get_multiplexed_async_connection().await?;
        let stored: Option<String> = conn.get(key).await?;
        Ok(stored)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: u64) -> AppResult<()> {
        let mut conn = self.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, value, ttl).await?;
        Ok(())
    }
}

/// Creates a Redis client for session storage
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Queued session change, acknowledged once it is stored
struct SessionUpdateMessage {
    token: String,
    update: SessionUpdate,
    done: oneshot::Sender<AppResult<()>>,
}

/// Anonymous session storage
///
/// Reads go straight to the backend. Every change is a read-modify-write, so
/// all of them are applied one at a time by a single writer task; callers wait
/// for the acknowledgement.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    update_tx: mpsc::UnboundedSender<SessionUpdateMessage>,
}

/// Handle for gracefully shutting down the session writer
pub struct SessionWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SessionWriterHandle {
    /// Signals the writer to apply queued updates and waits for it to stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Session writer shutdown signal sent");

        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Session writer task failed");
        }
    }
}

impl SessionStore {
    /// Creates the store and spawns its writer
    pub fn new(backend: Arc<dyn SessionBackend>) -> (Self, SessionWriterHandle) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let writer_backend = backend.clone();
        let task = tokio::spawn(async move {
            Self::session_writer_task(writer_backend, update_rx, shutdown_rx).await;
        });

        let store = Self { backend, update_tx };

        (store, SessionWriterHandle { shutdown_tx, task })
    }

    async fn session_writer_task(
        backend: Arc<dyn SessionBackend>,
        mut update_rx: mpsc::UnboundedReceiver<SessionUpdateMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Session writer task started");
        let mut failed_writes = 0u64;

        loop {
            tokio::select! {
                Some(msg) = update_rx.recv() => {
                    if !Self::handle_update(backend.as_ref(), msg).await {
                        failed_writes += 1;
                        tracing::error!(failed = failed_writes, "Failed to write session");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Session writer shutting down, applying queued updates");

                    // Senders live in every store clone, so drain what is queued right now
                    while let Ok(msg) = update_rx.try_recv() {
                        Self::handle_update(backend.as_ref(), msg).await;
                    }

                    tracing::info!("Session writer task stopped");
                    break;
                }
            }
        }
    }

    /// Applies one update and reports the outcome to its sender
    async fn handle_update(backend: &dyn SessionBackend, msg: SessionUpdateMessage) -> bool {
        let result = Self::apply_update(backend, &msg.token, msg.update).await;
        let succeeded = result.is_ok();
        if let Err(e) = &result {
            tracing::error!(error = %e, "Session update failed");
        }
        // The caller may have gone away; the write stands either way
        let _ = msg.done.send(result);
        succeeded
    }

    async fn apply_update(
        backend: &dyn SessionBackend,
        token: &str,
        update: SessionUpdate,
    ) -> AppResult<()> {
        let mut data = Self::read(backend, token).await?.unwrap_or_default();
        data.apply(update);

        let json = serde_json::to_string(&data)
            .map_err(|e| AppError::Internal(format!("Session serialization error: {}", e)))?;
        let key = SessionKey::Data(token.to_string()).to_string();
        backend.set_ex(&key, json, SESSION_TTL).await
    }

    async fn read(backend: &dyn SessionBackend, token: &str) -> AppResult<Option<SessionData>> {
        let key = SessionKey::Data(token.to_string());

        match backend.get(&key.to_string()).await? {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Session deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Loads a session; `None` when it never existed or has expired
    pub async fn load(&self, token: &str) -> AppResult<Option<SessionData>> {
        Self::read(self.backend.as_ref(), token).await
    }

    /// Applies `update` to the session and refreshes its TTL
    pub async fn update(&self, token: &str, update: SessionUpdate) -> AppResult<()> {
        let (done, acknowledged) = oneshot::channel();
        let msg = SessionUpdateMessage {
            token: token.to_string(),
            update,
            done,
        };

        self.update_tx
            .send(msg)
            .map_err(|_| AppError::Internal("Session writer is not running".to_string()))?;

        acknowledged
            .await
            .map_err(|_| AppError::Internal("Session writer dropped the update".to_string()))?
    }
}
