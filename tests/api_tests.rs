use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::RwLock;

use feedwise_api::{
    config::PipelineConfig,
    error::{AppResult, GenerationError},
    models::{Identity, Interaction, SearchEntry, StoredProfile, WeightedInterest},
    routes::{create_router, AppState},
    services::{clock::FixedClock, Clock, ContextSource, TextGenerator},
};

/// Personalization store kept in memory
#[derive(Default)]
struct InMemoryContextSource {
    platforms: RwLock<HashMap<Identity, Vec<String>>>,
    interests: RwLock<HashMap<Identity, Vec<WeightedInterest>>>,
    interactions: RwLock<HashMap<Identity, Vec<Interaction>>>,
    searches: RwLock<HashMap<Identity, Vec<SearchEntry>>>,
}

#[async_trait::async_trait]
impl ContextSource for InMemoryContextSource {
    async fn profile(&self, _identity: &Identity) -> AppResult<Option<StoredProfile>> {
        Ok(None)
    }

    async fn preferences(&self, _identity: &Identity) -> AppResult<HashMap<String, f64>> {
        Ok(HashMap::new())
    }

    async fn selected_platforms(&self, identity: &Identity) -> AppResult<Vec<String>> {
        Ok(self
            .platforms
            .read()
            .await
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn interests(&self, identity: &Identity) -> AppResult<Vec<WeightedInterest>> {
        Ok(self
            .interests
            .read()
            .await
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn recent_interactions(
        &self,
        identity: &Identity,
        limit: usize,
    ) -> AppResult<Vec<Interaction>> {
        let interactions = self.interactions.read().await;
        Ok(interactions
            .get(identity)
            .map(|all| all.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn record_interaction(
        &self,
        identity: &Identity,
        interaction: Interaction,
    ) -> AppResult<()> {
        self.interactions
            .write()
            .await
            .entry(identity.clone())
            .or_default()
            .push(interaction);
        Ok(())
    }

    async fn record_search(
        &self,
        identity: &Identity,
        query: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.searches
            .write()
            .await
            .entry(identity.clone())
            .or_default()
            .insert(
                0,
                SearchEntry {
                    query: query.to_string(),
                    timestamp: at,
                },
            );
        Ok(())
    }

    async fn search_history(&self, identity: &Identity) -> AppResult<Vec<SearchEntry>> {
        Ok(self
            .searches
            .read()
            .await
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_selected_platforms(
        &self,
        identity: &Identity,
        platforms: Vec<String>,
    ) -> AppResult<()> {
        self.platforms
            .write()
            .await
            .insert(identity.clone(), platforms);
        Ok(())
    }

    async fn save_interests(
        &self,
        identity: &Identity,
        interests: Vec<WeightedInterest>,
    ) -> AppResult<()> {
        self.interests
            .write()
            .await
            .insert(identity.clone(), interests);
        Ok(())
    }
}

/// Generator that replays canned responses and remembers the prompts it saw
struct ScriptedGenerator {
    configured: bool,
    responses: std::sync::Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: std::sync::Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            configured: true,
            responses: std::sync::Mutex::new(responses.into()),
            prompts: std::sync::Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(vec![])
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Transport("no scripted response".to_string())))
    }
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()))
}

fn fast_pipeline() -> PipelineConfig {
    PipelineConfig {
        backoff_base: Duration::from_millis(1),
        ..Default::default()
    }
}

fn create_test_server(
    source: Arc<InMemoryContextSource>,
    generator: Arc<ScriptedGenerator>,
) -> TestServer {
    let state = AppState::new(source, generator, clock(), &fast_pipeline(), None);
    let app = create_router(state);
    TestServer::new(app).unwrap()
}

fn header(name: &'static str) -> HeaderName {
    HeaderName::from_static(name)
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server(
        Arc::new(InMemoryContextSource::default()),
        Arc::new(ScriptedGenerator::unconfigured()),
    );
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_recommendations_from_model() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
        r#"Sure! [{"title":"A","author":"B","platform":"YouTube","type":"video","url":"bad"}] Hope that helps."#
            .to_string(),
    )]));
    let server = create_test_server(Arc::new(InMemoryContextSource::default()), generator.clone());

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "query": "lofi beats" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["source"], "model");
    assert_eq!(body["recommendations"][0]["title"], "A");
    assert_eq!(body["recommendations"][0]["type"], "video");
    assert_eq!(
        body["recommendations"][0]["url"],
        "https://www.google.com/search?q=A%20YouTube"
    );
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_recommendations_fall_back_when_unconfigured() {
    let generator = Arc::new(ScriptedGenerator::unconfigured());
    let server = create_test_server(Arc::new(InMemoryContextSource::default()), generator.clone());

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "query": "Warhammer" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["source"], "fallback");
    let records = body["recommendations"].as_array().unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(records[0]["title"], "Warhammer 40K Lore Explained");
    assert_eq!(records[4]["title"], "Warhammer Miniatures Showcase");
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_recommendations_retry_then_fall_back() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerationError::Transport("503".to_string())),
        Err(GenerationError::Transport("503".to_string())),
        Err(GenerationError::Transport("503".to_string())),
    ]));
    let server = create_test_server(Arc::new(InMemoryContextSource::default()), generator.clone());

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "query": "sourdough" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["source"], "fallback");
    assert_eq!(body["recommendations"][0]["title"], "Popular sourdough Resources");
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn test_blank_query_is_rejected() {
    let server = create_test_server(
        Arc::new(InMemoryContextSource::default()),
        Arc::new(ScriptedGenerator::unconfigured()),
    );

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "query": "   " }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Query is required");
}

#[tokio::test]
async fn test_session_token_is_minted_once() {
    let server = create_test_server(
        Arc::new(InMemoryContextSource::default()),
        Arc::new(ScriptedGenerator::unconfigured()),
    );

    let response = server
        .post("/api/v1/search-history")
        .json(&json!({ "query": "jazz" }))
        .await;
    response.assert_status_ok();
    assert!(response.headers().contains_key("x-session-token"));

    let response = server
        .post("/api/v1/search-history")
        .add_header(header("x-session-token"), HeaderValue::from_static("known"))
        .json(&json!({ "query": "jazz" }))
        .await;
    response.assert_status_ok();
    assert!(!response.headers().contains_key("x-session-token"));
}

#[tokio::test]
async fn test_tracked_interactions_shape_the_prompt() {
    let source = Arc::new(InMemoryContextSource::default());
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok("[]".to_string())]));
    let server = create_test_server(source.clone(), generator.clone());

    let response = server
        .post("/api/v1/interactions")
        .add_header(header("x-user-id"), HeaderValue::from_static("7"))
        .json(&json!({ "title": "Deep Work summary", "action": "click" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);

    let response = server
        .post("/api/v1/recommendations")
        .add_header(header("x-user-id"), HeaderValue::from_static("7"))
        .json(&json!({ "query": "productivity" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["source"], "model");
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 0);

    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.contains("Recently, the user engaged with: Deep Work summary."));
    assert!(prompt.contains("(2026-10-17)"));
}

#[tokio::test]
async fn test_interaction_requires_title_and_action() {
    let server = create_test_server(
        Arc::new(InMemoryContextSource::default()),
        Arc::new(ScriptedGenerator::unconfigured()),
    );

    let response = server
        .post("/api/v1/interactions")
        .json(&json!({ "title": "Something", "action": "" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_history_is_recorded() {
    let source = Arc::new(InMemoryContextSource::default());
    let server = create_test_server(source.clone(), Arc::new(ScriptedGenerator::unconfigured()));

    let response = server
        .post("/api/v1/search-history")
        .add_header(header("x-user-id"), HeaderValue::from_static("9"))
        .json(&json!({ "query": "  rust async  " }))
        .await;
    response.assert_status_ok();

    let response = server
        .get("/api/v1/search-history")
        .add_header(header("x-user-id"), HeaderValue::from_static("9"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["searches"][0]["query"], "rust async");
    assert_eq!(body["searches"][0]["timestamp"], "2026-10-17T12:00:00Z");
}

#[tokio::test]
async fn test_feed_pagination() {
    let server = create_test_server(
        Arc::new(InMemoryContextSource::default()),
        Arc::new(ScriptedGenerator::unconfigured()),
    );

    let first = server
        .get("/api/v1/feed")
        .add_header(header("x-session-token"), HeaderValue::from_static("feed-test"))
        .add_query_param("page", 1)
        .add_query_param("page_size", 3)
        .await;
    first.assert_status_ok();
    let first: Value = first.json();
    assert_eq!(first["items"].as_array().unwrap().len(), 3);
    assert_eq!(first["has_more"], true);

    let second = server
        .get("/api/v1/feed")
        .add_header(header("x-session-token"), HeaderValue::from_static("feed-test"))
        .add_query_param("page", 2)
        .add_query_param("page_size", 3)
        .await;
    second.assert_status_ok();
    let second: Value = second.json();
    assert_eq!(second["items"].as_array().unwrap().len(), 2);
    assert_eq!(second["has_more"], false);
    assert_eq!(second["page"], 2);
}

#[tokio::test]
async fn test_feed_uses_selected_platforms() {
    let generator = Arc::new(ScriptedGenerator::unconfigured());
    let server = create_test_server(Arc::new(InMemoryContextSource::default()), generator);

    server
        .post("/api/v1/selected-platforms")
        .add_header(header("x-user-id"), HeaderValue::from_static("11"))
        .json(&json!({ "platforms": ["Reddit"] }))
        .await
        .assert_status_ok();
    server
        .post("/api/v1/interests")
        .add_header(header("x-user-id"), HeaderValue::from_static("11"))
        .json(&json!({ "interests": [{ "interest": "origami", "weight": 3 }] }))
        .await
        .assert_status_ok();

    let response = server
        .get("/api/v1/feed")
        .add_header(header("x-user-id"), HeaderValue::from_static("11"))
        .add_query_param("page_size", 50)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let items = body["items"].as_array().unwrap();
    // Main query plus one Reddit query, five fallback records each
    assert_eq!(items.len(), 10);
    assert!(items
        .iter()
        .all(|item| item["url"].as_str().unwrap().starts_with("https://")));
    assert!(items.iter().any(|item| item["platform"] == "Reddit"));
}

#[tokio::test]
async fn test_selected_platforms_round_trip_for_sessions() {
    let source = Arc::new(InMemoryContextSource::default());
    let server = create_test_server(source.clone(), Arc::new(ScriptedGenerator::unconfigured()));

    let response = server
        .post("/api/v1/selected-platforms")
        .add_header(header("x-session-token"), HeaderValue::from_static("visitor"))
        .json(&json!({ "platforms": [" YouTube ", "", "Spotify", "YouTube"] }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);

    let response = server
        .get("/api/v1/selected-platforms")
        .add_header(header("x-session-token"), HeaderValue::from_static("visitor"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["selected_platforms"], json!(["YouTube", "Spotify"]));

    // Stored once, under the caller's session
    let stored = source.platforms.read().await;
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_selected_platforms_must_be_a_list() {
    let server = create_test_server(
        Arc::new(InMemoryContextSource::default()),
        Arc::new(ScriptedGenerator::unconfigured()),
    );

    let response = server
        .post("/api/v1/selected-platforms")
        .json(&json!({ "platforms": "YouTube" }))
        .await;

    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_saved_interests_shape_the_prompt() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok("[]".to_string())]));
    let server = create_test_server(Arc::new(InMemoryContextSource::default()), generator.clone());

    server
        .post("/api/v1/interests")
        .add_header(header("x-session-token"), HeaderValue::from_static("visitor"))
        .json(&json!({ "interests": [
            { "interest": "chess" },
            { "interest": "birdwatching", "weight": 4 },
            { "interest": "  " }
        ] }))
        .await
        .assert_status_ok();

    let response = server
        .get("/api/v1/interests")
        .add_header(header("x-session-token"), HeaderValue::from_static("visitor"))
        .await;
    let body: Value = response.json();
    assert_eq!(body["interests"][0]["interest"], "birdwatching");
    assert_eq!(body["interests"][1]["weight"], 1);
    assert_eq!(body["interests"].as_array().unwrap().len(), 2);

    server
        .post("/api/v1/recommendations")
        .add_header(header("x-session-token"), HeaderValue::from_static("visitor"))
        .json(&json!({ "query": "weekend ideas" }))
        .await
        .assert_status_ok();

    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.contains("birdwatching"));
}

#[tokio::test]
async fn test_interaction_history_is_most_recent_first() {
    let server = create_test_server(
        Arc::new(InMemoryContextSource::default()),
        Arc::new(ScriptedGenerator::unconfigured()),
    );

    for title in ["first", "second", "third"] {
        server
            .post("/api/v1/interactions")
            .add_header(header("x-user-id"), HeaderValue::from_static("5"))
            .json(&json!({ "title": title, "action": "Click" }))
            .await
            .assert_status_ok();
    }

    let response = server
        .get("/api/v1/interaction-history")
        .add_header(header("x-user-id"), HeaderValue::from_static("5"))
        .add_query_param("limit", 2)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let interactions = body["interactions"].as_array().unwrap();
    assert_eq!(interactions.len(), 2);
    assert_eq!(interactions[0]["title"], "third");
    assert_eq!(interactions[0]["action"], "click");
    assert_eq!(interactions[1]["title"], "second");
}
