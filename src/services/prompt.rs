use chrono::NaiveDate;

use crate::models::PersonalizationContext;

/// Platforms suggested to the model when the user has not selected any
pub const DEFAULT_PLATFORMS: [&str; 7] = [
    "YouTube", "Spotify", "Netflix", "Instagram", "X", "GitHub", "Reddit",
];

/// Colloquial or niche terms mapped to phrases a general-purpose model understands
const TERM_EXPANSIONS: [(&str, &str); 4] = [
    ("кацка", "cat content, cute animals, funny"),
    (
        "вредный котик адольф",
        "cat memes, humorous cats, viral cat content",
    ),
    ("адольф", "cat character, funny cat, viral cat content"),
    (
        "warhammer",
        "warhammer, tabletop games, fantasy, strategy games, gaming",
    ),
];

const TOP_PREFERENCES: usize = 5;
const TOP_INTERESTS: usize = 5;
const TOP_CLICKS: usize = 3;

/// A user query and its expanded form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationQuery {
    raw_text: String,
    resolved_text: String,
}

impl RecommendationQuery {
    /// Expands known domain terms found in `raw` (case-insensitive).
    ///
    /// Each matched term appends its phrase; the raw text is always kept.
    pub fn resolve(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        let expansions: Vec<&str> = TERM_EXPANSIONS
            .iter()
            .filter(|(term, _)| lowered.contains(term))
            .map(|(_, phrase)| *phrase)
            .collect();

        let resolved_text = if expansions.is_empty() {
            raw.to_string()
        } else {
            format!("{}, {}", raw, expansions.join(", "))
        };

        Self {
            raw_text: raw.to_string(),
            resolved_text,
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn resolved_text(&self) -> &str {
        &self.resolved_text
    }
}

/// Renders the generation prompt.
///
/// Clause order is fixed: query, profile, preferences/interests, platforms,
/// recent clicks, recency, output format. The response parser relies on the
/// final directive asking for a JSON array of objects with a URL each.
pub fn build_prompt(
    query: &RecommendationQuery,
    context: &PersonalizationContext,
    today: NaiveDate,
) -> String {
    let mut prompt = format!(
        "Provide personalized recommendations based on this search: \"{}\". ",
        query.resolved_text()
    );

    if let Some(clause) = profile_clause(context) {
        prompt.push_str(&clause);
    }

    let preferences = context.top_preferences(TOP_PREFERENCES);
    let interests = context.top_interests(TOP_INTERESTS);
    if preferences.is_empty() && interests.is_empty() {
        prompt.push_str("The user has not specified particular interests yet. ");
    } else {
        if !preferences.is_empty() {
            prompt.push_str(&format!(
                "The user has shown interest in: {}. ",
                preferences.join(", ")
            ));
        }
        if !interests.is_empty() {
            prompt.push_str(&format!(
                "The user's specific interests include: {}. ",
                interests.join(", ")
            ));
        }
    }

    if context.selected_platforms.is_empty() {
        prompt.push_str(&format!(
            "Recommendations should be available on these popular platforms: {}. ",
            DEFAULT_PLATFORMS.join(", ")
        ));
    } else {
        let platforms = context.selected_platforms.join(", ");
        prompt.push_str(&format!(
            "The user has selected these platforms: {platforms}. \
             Provide recommendations that are available on these platforms: {platforms}. "
        ));
    }

    let clicked = context.top_clicked(TOP_CLICKS);
    if !clicked.is_empty() {
        prompt.push_str(&format!(
            "Recently, the user engaged with: {}. ",
            clicked.join(", ")
        ));
    }

    prompt.push_str(&format!(
        "Prefer recent content, published close to today's date ({}). ",
        today.format("%Y-%m-%d")
    ));

    prompt.push_str(&format!(
        "Provide relevant recommendations based on the query: \"{}\". \
         Respond with a JSON array of 5-10 recommendations in this exact format: \
         [{{\"title\": \"title\", \"author\": \"author\", \"platform\": \"platform_name\", \
         \"type\": \"video|music|article|photo|text|code\", \"url\": \"direct_URL_to_content\"}}]. \
         IMPORTANT: Every single item MUST include a real, working URL. \
         If you don't know a specific URL, create a relevant search URL like \
         https://www.youtube.com/results?search_query=term. \
         Focus on content related to the main topics in the query. \
         Make URLs as specific as possible to actual content.",
        query.raw_text()
    ));

    prompt
}

fn profile_clause(context: &PersonalizationContext) -> Option<String> {
    let profile = &context.profile;
    if profile.is_empty() {
        return None;
    }

    let mut parts = Vec::new();
    if let Some(age) = profile.age {
        parts.push(format!("{} years old", age));
    }
    if let Some(gender) = &profile.gender {
        parts.push(format!("identifies as {}", gender));
    }
    if let Some(country) = &profile.country {
        parts.push(format!("from {}", country));
    }
    if let Some(city) = &profile.city {
        parts.push(format!("in the city of {}", city));
    }

    Some(format!("The user is {}. ", parts.join(", ")))
}
