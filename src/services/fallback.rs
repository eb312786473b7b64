//! Offline, rule-based recommendations
//!
//! Used whenever the generative model cannot produce usable output. Everything
//! here is deterministic and performs no I/O.
use crate::{
    models::{ContentType, PersonalizationContext, RecommendationRecord},
    services::{prompt::DEFAULT_PLATFORMS, urls::platform_search_url},
};

/// Upper bound on fallback output
pub const MAX_FALLBACK_RECORDS: usize = 5;

const MAX_KEYWORDS: usize = 3;

/// Curated record: (title, author, platform, type, url)
type Curated = (&'static str, &'static str, &'static str, ContentType, &'static str);

const CAT_RECORDS: [Curated; 6] = [
    (
        "Funny Cat Videos Compilation",
        "Cat Lovers",
        "YouTube",
        ContentType::Video,
        "https://www.youtube.com/results?search_query=funny+cat+videos",
    ),
    (
        "Cute Cat Memes Collection",
        "Animal Humor",
        "Instagram",
        ContentType::Photo,
        "https://www.instagram.com/explore/tags/cute_cats/",
    ),
    (
        "Top Cat Care Tips",
        "Pet Experts",
        "Medium",
        ContentType::Article,
        "https://medium.com/search?q=cat+care+tips",
    ),
    (
        "Relaxing Cat Purring Sounds",
        "Nature Sounds",
        "Spotify",
        ContentType::Music,
        "https://open.spotify.com/search/cats+purring",
    ),
    (
        "Beautiful Cat Photography",
        "Pet Photographers",
        "Unsplash",
        ContentType::Photo,
        "https://unsplash.com/s/photos/cat",
    ),
    (
        "Cat Breeds Guide",
        "Veterinary Professionals",
        "Medium",
        ContentType::Article,
        "https://medium.com/search?q=cat+breeds",
    ),
];

const WARHAMMER_RECORDS: [Curated; 6] = [
    (
        "Warhammer 40K Lore Explained",
        "Warhammer Community",
        "YouTube",
        ContentType::Video,
        "https://www.youtube.com/results?search_query=warhammer+40k+lore",
    ),
    (
        "Top Warhammer Strategy Guides",
        "Gaming Experts",
        "YouTube",
        ContentType::Video,
        "https://www.youtube.com/results?search_query=warhammer+strategy+guide",
    ),
    (
        "Warhammer News and Updates",
        "Games Workshop",
        "Reddit",
        ContentType::Text,
        "https://www.reddit.com/r/Warhammer/",
    ),
    (
        "Warhammer Soundtrack Collection",
        "Warhammer Official",
        "Spotify",
        ContentType::Music,
        "https://open.spotify.com/search/warhammer+soundtrack",
    ),
    (
        "Warhammer Miniatures Showcase",
        "Model Painters",
        "Instagram",
        ContentType::Photo,
        "https://www.instagram.com/explore/tags/warhammer/",
    ),
    (
        "Warhammer Game Reviews",
        "Tabletop Gaming",
        "Medium",
        ContentType::Article,
        "https://medium.com/search?q=warhammer+game+review",
    ),
];

/// Special-cased topics, checked in order: (query needles, curated records)
const SPECIAL_CASES: [(&[&str], &[Curated]); 2] = [
    (&["кацка", "кот", "cat"], &CAT_RECORDS),
    (&["warhammer"], &WARHAMMER_RECORDS),
];

/// One synthesized record per content type
struct GenericSlot {
    prefix: &'static str,
    label: &'static str,
    author: &'static str,
    content_type: ContentType,
    default_platform: &'static str,
    /// Whether the search link carries the caller's topics or just the query
    uses_topics: bool,
}

const GENERIC_SLOTS: [GenericSlot; 6] = [
    GenericSlot {
        prefix: "Popular ",
        label: "Resources",
        author: "Community",
        content_type: ContentType::Video,
        default_platform: "YouTube",
        uses_topics: true,
    },
    GenericSlot {
        prefix: "",
        label: "Guide",
        author: "Experts",
        content_type: ContentType::Article,
        default_platform: "Medium",
        uses_topics: true,
    },
    GenericSlot {
        prefix: "",
        label: "Tutorials",
        author: "Teachers",
        content_type: ContentType::Course,
        default_platform: "Coursera",
        uses_topics: true,
    },
    GenericSlot {
        prefix: "",
        label: "Music",
        author: "Artists",
        content_type: ContentType::Music,
        default_platform: "Spotify",
        uses_topics: false,
    },
    GenericSlot {
        prefix: "",
        label: "Photos",
        author: "Photographers",
        content_type: ContentType::Photo,
        default_platform: "Unsplash",
        uses_topics: false,
    },
    GenericSlot {
        prefix: "",
        label: "Code Examples",
        author: "Developers",
        content_type: ContentType::Code,
        default_platform: "GitHub",
        uses_topics: false,
    },
];

/// Produces up to [`MAX_FALLBACK_RECORDS`] recommendations for `query`
pub fn fallback_recommendations(
    query: &str,
    context: &PersonalizationContext,
) -> Vec<RecommendationRecord> {
    let lowered = query.to_lowercase();

    let special = SPECIAL_CASES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lowered.contains(needle)));

    let records = match special {
        Some((_, curated)) => curated.iter().map(curated_record).collect(),
        None => generic_records(query, context),
    };

    records.into_iter().take(MAX_FALLBACK_RECORDS).collect()
}

fn curated_record(
    (title, author, platform, content_type, url): &Curated,
) -> RecommendationRecord {
    RecommendationRecord::new(*title, *author, *platform, *content_type, *url)
}

fn generic_records(query: &str, context: &PersonalizationContext) -> Vec<RecommendationRecord> {
    let query = query.trim();
    let suffix = profile_suffix(context);

    let keywords = combined_keywords(context);
    let topical_terms = if keywords.is_empty() {
        query.to_string()
    } else {
        format!("{} {}", query, keywords.join(", "))
    };

    let platforms: Vec<&str> = if context.selected_platforms.is_empty() {
        DEFAULT_PLATFORMS.to_vec()
    } else {
        context.selected_platforms.iter().map(String::as_str).collect()
    };

    GENERIC_SLOTS
        .iter()
        .enumerate()
        .map(|(index, slot)| {
            let platform = platforms
                .get(index)
                .copied()
                .unwrap_or(slot.default_platform);
            let terms = if slot.uses_topics {
                topical_terms.as_str()
            } else {
                query
            };
            RecommendationRecord::new(
                format!("{}{} {}{}", slot.prefix, query, slot.label, suffix),
                slot.author,
                platform,
                slot.content_type,
                platform_search_url(platform, terms),
            )
        })
        .collect()
}

/// Union of preference topics and interests, preserving order, first few only
fn combined_keywords(context: &PersonalizationContext) -> Vec<&str> {
    let mut keywords: Vec<&str> = Vec::new();
    let candidates = context
        .preference_weights
        .iter()
        .map(|(topic, _)| topic.as_str())
        .chain(context.interests.iter().map(String::as_str));

    for keyword in candidates {
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    keywords
}

fn profile_suffix(context: &PersonalizationContext) -> String {
    let profile = &context.profile;
    let mut suffix = String::new();
    if let Some(age) = profile.age {
        suffix.push_str(&format!(" for a {} year old", age));
    }
    if let Some(gender) = &profile.gender {
        suffix.push_str(&format!(" {}", gender));
    }
    if let Some(country) = &profile.country {
        suffix.push_str(&format!(" from {}", country));
    }
    if let Some(city) = &profile.city {
        suffix.push_str(&format!(" in {}", city));
    }
    suffix
}
