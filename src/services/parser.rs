use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::ParseFailure,
    models::{ContentType, RecommendationRecord},
};

/// Loosely-typed recommendation as the model emits it
///
/// Every field is optional; [`RecommendationCandidate::into_record`] decides
/// whether the candidate is usable.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RecommendationCandidate {
    title: Option<Value>,
    author: Option<Value>,
    platform: Option<Value>,
    #[serde(rename = "type")]
    content_type: Option<Value>,
    url: Option<Value>,
}

impl RecommendationCandidate {
    /// Converts into a record, or `None` when the title is missing or blank
    fn into_record(self) -> Option<RecommendationRecord> {
        let title = text(self.title)?;
        if title.is_empty() {
            return None;
        }

        Some(RecommendationRecord {
            title,
            author: text(self.author).unwrap_or_default(),
            platform: text(self.platform).unwrap_or_default(),
            content_type: text(self.content_type)
                .map(|t| ContentType::from_label(&t))
                .unwrap_or(ContentType::Text),
            // Validated and repaired downstream; non-string URLs count as missing
            url: match self.url {
                Some(Value::String(url)) => url.trim().to_string(),
                _ => String::new(),
            },
        })
    }
}

/// Trimmed string content of a JSON value; numbers are accepted for free-text fields
fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extracts recommendation records from raw model output.
///
/// The span from the first `[` to the last `]` is decoded as a JSON array, so
/// prose around the array is tolerated. An empty array is a valid, empty
/// result. Elements that are not objects or lack a title are dropped.
pub fn parse_recommendations(raw: &str) -> Result<Vec<RecommendationRecord>, ParseFailure> {
    let start = raw.find('[').ok_or(ParseFailure::MissingArray)?;
    let end = raw.rfind(']').ok_or(ParseFailure::MissingArray)?;
    if end < start {
        return Err(ParseFailure::MissingArray);
    }

    let elements: Vec<Value> = serde_json::from_str(&raw[start..=end])
        .map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;

    let total = elements.len();
    let records: Vec<RecommendationRecord> = elements
        .into_iter()
        // Derived structs also decode positional arrays, so only objects qualify
        .filter(Value::is_object)
        .filter_map(|element| serde_json::from_value::<RecommendationCandidate>(element).ok())
        .filter_map(RecommendationCandidate::into_record)
        .collect();

    if records.len() < total {
        tracing::debug!(
            received = total,
            kept = records.len(),
            "Dropped unusable recommendation candidates"
        );
    }

    Ok(records)
}
