//! Personalized feed assembly
//!
//! A feed is the union of several recommendation queries derived from the
//! user's context, de-duplicated by URL, optionally filtered by reachability,
//! shuffled and paginated.
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::{
    collections::{hash_map::DefaultHasher, HashSet},
    hash::{Hash, Hasher},
    sync::Arc,
    time::Duration,
};

use crate::{
    error::AppResult,
    models::{Identity, PersonalizationContext, RecommendationRecord},
    services::{cancel::CancelSignal, clock::Clock, recommender::Recommender},
};

pub const MAX_PAGE_SIZE: usize = 50;

const FEED_TOPICS: usize = 3;
const MAX_PLATFORM_QUERIES: usize = 3;
const TRENDING_QUERY: &str = "trending content and popular topics";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One page of the feed
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedPage {
    pub items: Vec<RecommendationRecord>,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

/// Concatenates record lists, keeping the first record seen for each URL
pub fn merge(lists: Vec<Vec<RecommendationRecord>>) -> Vec<RecommendationRecord> {
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|record| seen.insert(record.url.clone()))
        .collect()
}

pub fn shuffle<R: Rng + ?Sized>(records: &mut [RecommendationRecord], rng: &mut R) {
    records.shuffle(rng);
}

/// Slices out a 1-based page; `page_size` is clamped to `1..=MAX_PAGE_SIZE`
pub fn paginate(records: Vec<RecommendationRecord>, page: usize, page_size: usize) -> FeedPage {
    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let start = (page - 1).saturating_mul(page_size);
    let has_more = start.saturating_add(page_size) < records.len();

    FeedPage {
        items: records.into_iter().skip(start).take(page_size).collect(),
        page,
        page_size,
        has_more,
    }
}

/// Topic phrase for the feed: top interests, else top preferences, else trending
fn feed_focus(context: &PersonalizationContext) -> String {
    let interests = context.top_interests(FEED_TOPICS);
    if !interests.is_empty() {
        return format!("content related to: {}", interests.join(", "));
    }

    let preferences = context.top_preferences(FEED_TOPICS);
    if !preferences.is_empty() {
        return format!("content related to: {}", preferences.join(", "));
    }

    TRENDING_QUERY.to_string()
}

/// The main feed query, including the selected-platform constraint
pub fn feed_query(context: &PersonalizationContext) -> String {
    let focus = feed_focus(context);
    if context.selected_platforms.is_empty() {
        focus
    } else {
        format!(
            "{}. Content should be available on platforms: {}",
            focus,
            context.selected_platforms.join(", ")
        )
    }
}

/// The main feed query followed by one query per selected platform
pub fn feed_queries(context: &PersonalizationContext) -> Vec<String> {
    let focus = feed_focus(context);
    let mut queries = vec![feed_query(context)];
    queries.extend(
        context
            .selected_platforms
            .iter()
            .take(MAX_PLATFORM_QUERIES)
            .map(|platform| format!("{} on {}", focus, platform)),
    );
    queries
}

/// Best-effort HEAD check of recommendation URLs
#[derive(Clone)]
pub struct UrlProbe {
    http_client: HttpClient,
}

impl UrlProbe {
    pub fn new() -> AppResult<Self> {
        Self::with_timeout(PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }

    /// 2xx and 3xx count as reachable; errors and timeouts do not
    pub async fn is_reachable(&self, url: &str) -> bool {
        match self.http_client.head(url).send().await {
            Ok(response) => {
                let status = response.status();
                status.is_success() || status.is_redirection()
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "URL probe failed");
                false
            }
        }
    }

    /// Drops records whose URL does not answer, preserving order
    pub async fn filter_reachable(
        &self,
        records: Vec<RecommendationRecord>,
    ) -> Vec<RecommendationRecord> {
        let mut tasks = Vec::new();

        for record in &records {
            let probe = self.clone();
            let url = record.url.clone();
            tasks.push(tokio::spawn(async move { probe.is_reachable(&url).await }));
        }

        let mut reachable = Vec::with_capacity(records.len());
        for (record, task) in records.into_iter().zip(tasks) {
            match task.await {
                Ok(true) => reachable.push(record),
                Ok(false) => tracing::debug!(url = %record.url, "Dropping unreachable feed item"),
                Err(e) => tracing::warn!(error = %e, "URL probe task failed"),
            }
        }

        reachable
    }
}

/// Builds feed pages from the recommendation pipeline
#[derive(Clone)]
pub struct FeedAssembler {
    recommender: Recommender,
    clock: Arc<dyn Clock>,
    probe: Option<UrlProbe>,
}

impl FeedAssembler {
    pub fn new(recommender: Recommender, clock: Arc<dyn Clock>, probe: Option<UrlProbe>) -> Self {
        Self {
            recommender,
            clock,
            probe,
        }
    }

    /// Runs every feed query concurrently and returns the requested page.
    ///
    /// The shuffle is seeded per identity and day so consecutive pages of the
    /// same feed keep a stable order.
    pub async fn assemble(
        &self,
        identity: Option<&Identity>,
        page: usize,
        page_size: usize,
        cancel: &CancelSignal,
    ) -> FeedPage {
        let context = Arc::new(self.recommender.context(identity).await);
        let queries = feed_queries(&context);

        tracing::info!(queries = queries.len(), "Assembling feed");

        let mut tasks = Vec::new();
        for query in queries {
            let recommender = self.recommender.clone();
            let context = context.clone();
            let cancel = cancel.clone();
            let task = tokio::spawn(async move {
                recommender
                    .recommend_with_context(&query, &context, &cancel)
                    .await
            });
            tasks.push(task);
        }

        let mut lists = Vec::new();
        for task in tasks {
            match task.await {
                Ok(recommendations) => lists.push(recommendations.records),
                Err(e) => tracing::warn!(error = %e, "Feed query task failed"),
            }
        }

        let mut records = merge(lists);
        if let Some(probe) = &self.probe {
            let before = records.len();
            records = probe.filter_reachable(records).await;
            tracing::debug!(before = before, after = records.len(), "Probed feed URLs");
        }

        let mut rng = StdRng::seed_from_u64(feed_seed(identity, &self.clock.today().to_string()));
        shuffle(&mut records, &mut rng);

        paginate(records, page, page_size)
    }
}

fn feed_seed(identity: Option<&Identity>, day: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    identity.hash(&mut hasher);
    day.hash(&mut hasher);
    hasher.finish()
}
