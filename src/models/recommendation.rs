use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Kind of content a recommendation points at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Music,
    Article,
    Photo,
    Text,
    Code,
    Course,
    Error,
}

impl ContentType {
    /// Maps a free-form label produced by the model onto a known content type.
    ///
    /// Matching is case-insensitive; anything unrecognised is treated as plain text.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "video" => ContentType::Video,
            "music" | "audio" | "podcast" => ContentType::Music,
            "article" => ContentType::Article,
            "photo" | "image" => ContentType::Photo,
            "code" => ContentType::Code,
            "course" => ContentType::Course,
            "error" => ContentType::Error,
            _ => ContentType::Text,
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ContentType::Video => "video",
            ContentType::Music => "music",
            ContentType::Article => "article",
            ContentType::Photo => "photo",
            ContentType::Text => "text",
            ContentType::Code => "code",
            ContentType::Course => "course",
            ContentType::Error => "error",
        };
        write!(f, "{}", label)
    }
}

/// A single recommendation returned to the client
///
/// Records leaving the pipeline always carry an http(s) `url`; the URL repair
/// pass is what guarantees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationRecord {
    pub title: String,
    pub author: String,
    pub platform: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub url: String,
}

impl RecommendationRecord {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        platform: impl Into<String>,
        content_type: ContentType,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            platform: platform.into(),
            content_type,
            url: url.into(),
        }
    }
}

/// Where a set of recommendations came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    /// Parsed from the generative model's response
    Model,
    /// Produced offline by the rule-based fallback generator
    Fallback,
}

/// Result of one pass through the recommendation pipeline
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Recommendations {
    #[serde(rename = "recommendations")]
    pub records: Vec<RecommendationRecord>,
    pub source: RecommendationSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_from_label_known() {
        assert_eq!(ContentType::from_label("video"), ContentType::Video);
        assert_eq!(ContentType::from_label("VIDEO"), ContentType::Video);
        assert_eq!(ContentType::from_label(" music "), ContentType::Music);
        assert_eq!(ContentType::from_label("course"), ContentType::Course);
    }

    #[test]
    fn test_content_type_from_label_unknown_is_text() {
        assert_eq!(ContentType::from_label("hologram"), ContentType::Text);
        assert_eq!(ContentType::from_label(""), ContentType::Text);
    }

    #[test]
    fn test_record_serializes_type_field() {
        let record = RecommendationRecord::new(
            "Rust in Action",
            "Tim McNamara",
            "YouTube",
            ContentType::Video,
            "https://www.youtube.com/results?search_query=rust",
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "video");
        assert_eq!(json["title"], "Rust in Action");
        assert!(json.get("content_type").is_none());
    }

    #[test]
    fn test_source_serialization() {
        assert_eq!(
            serde_json::to_string(&RecommendationSource::Fallback).unwrap(),
            "\"fallback\""
        );
    }
}
