use reqwest::Url;

use crate::models::RecommendationRecord;

const WEB_SEARCH_PREFIX: &str = "https://www.google.com/search?q=";

/// True when `candidate` parses as an absolute http or https URL
pub fn is_web_url(candidate: &str) -> bool {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return false;
    }

    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}

/// Generic web-search URL for a piece of content
pub fn web_search_url(title: &str, platform: &str) -> String {
    let terms = format!("{} {}", title, platform);
    format!("{}{}", WEB_SEARCH_PREFIX, urlencoding::encode(terms.trim()))
}

/// Search URL on a specific platform, built without any network access.
///
/// Unknown platforms fall back to a web search scoped by the platform name.
pub fn platform_search_url(platform: &str, terms: &str) -> String {
    let encoded = urlencoding::encode(terms);
    match platform.trim().to_lowercase().as_str() {
        "youtube" => format!("https://www.youtube.com/results?search_query={}", encoded),
        "spotify" => format!("https://open.spotify.com/search/{}", encoded),
        "medium" => format!("https://medium.com/search?q={}", encoded),
        "coursera" => format!("https://www.coursera.org/search?query={}", encoded),
        "unsplash" => format!("https://unsplash.com/s/photos/{}", encoded),
        "github" => format!("https://github.com/search?q={}", encoded),
        "reddit" => format!("https://www.reddit.com/search/?q={}", encoded),
        "instagram" => format!(
            "https://www.instagram.com/explore/tags/{}/",
            urlencoding::encode(&terms.replace(' ', ""))
        ),
        "x" | "twitter" => format!("https://x.com/search?q={}", encoded),
        "netflix" => format!("https://www.netflix.com/search?q={}", encoded),
        "tiktok" => format!("https://www.tiktok.com/search?q={}", encoded),
        "soundcloud" => format!("https://soundcloud.com/search?q={}", encoded),
        "twitch" => format!("https://www.twitch.tv/search?term={}", encoded),
        "vk" => format!("https://vk.com/search?c%5Bq%5D={}", encoded),
        _ => web_search_url(terms, platform),
    }
}

/// Ensures every record carries a usable http(s) URL.
///
/// Valid URLs are kept as-is; missing or malformed ones are replaced by a web
/// search for the record's title and platform. Never drops a record.
pub fn repair_urls(records: Vec<RecommendationRecord>) -> Vec<RecommendationRecord> {
    records
        .into_iter()
        .map(|mut record| {
            if !is_web_url(&record.url) {
                tracing::debug!(
                    title = %record.title,
                    url = %record.url,
                    "Replacing unusable recommendation URL with search URL"
                );
                record.url = web_search_url(&record.title, &record.platform);
            }
            record
        })
        .collect()
}
