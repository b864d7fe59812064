//! Search-event classification for session enrichment.

use zkcookie_common::predicates::{
    INT_BEAUTY, INT_FITNESS, INT_GADGETS, INT_HOME_KITCHEN, INT_PERSONAL_CARE,
};

/// Keyword groups, checked in order; the first group with a hit wins.
const KEYWORD_TABLE: &[(&str, &[&str])] = &[
    (INT_GADGETS, &["fan", "cooling", "ac", "air cooler"]),
    (INT_GADGETS, &["printer", "thermal", "bluetooth"]),
    (
        INT_FITNESS,
        &["massage gun", "foam roller", "yoga", "workout", "gym"],
    ),
    (
        INT_BEAUTY,
        &["makeup", "eyelash", "eyebrow", "beauty", "skincare"],
    ),
    (
        INT_PERSONAL_CARE,
        &["toothbrush", "water flosser", "flosser", "oral"],
    ),
    (
        INT_PERSONAL_CARE,
        &["hair removal", "epilator", "shaver", "razor", "trimmer"],
    ),
    (
        INT_HOME_KITCHEN,
        &[
            "kitchen", "garlic", "chopper", "baking", "coffee", "pan", "pot", "juicer", "blender",
        ],
    ),
    (
        INT_HOME_KITCHEN,
        &["storage", "organizer", "rack", "container"],
    ),
    (INT_HOME_KITCHEN, &["laundry", "dishwasher", "dishwashing"]),
];

/// Maps a free-text search query to at most one interest predicate.
pub fn classify_query(query: &str) -> Option<&'static str> {
    let words = tokenize(query);
    if words.is_empty() {
        return None;
    }
    KEYWORD_TABLE
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| contains_phrase(&words, kw)))
        .map(|(interest, _)| *interest)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split(' ').collect();
    words
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(w, k)| word_matches(w, k)))
}

/// Exact match, or the keyword followed by a plural suffix.
fn word_matches(word: &str, keyword: &str) -> bool {
    match word.strip_prefix(keyword) {
        Some("") | Some("s") | Some("es") => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_queries_to_interests() {
        assert_eq!(classify_query("Best cooling FAN 2025"), Some(INT_GADGETS));
        assert_eq!(classify_query("thermal printers"), Some(INT_GADGETS));
        assert_eq!(classify_query("massage gun for back"), Some(INT_FITNESS));
        assert_eq!(classify_query("yoga mat"), Some(INT_FITNESS));
        assert_eq!(classify_query("eyelash curler"), Some(INT_BEAUTY));
        assert_eq!(classify_query("electric toothbrush"), Some(INT_PERSONAL_CARE));
        assert_eq!(classify_query("hair-removal cream"), Some(INT_PERSONAL_CARE));
        assert_eq!(classify_query("cast iron pans"), Some(INT_HOME_KITCHEN));
        assert_eq!(classify_query("dishwasher tablets"), Some(INT_HOME_KITCHEN));
    }

    #[test]
    fn short_keywords_need_whole_words() {
        assert_eq!(classify_query("fantasy novels"), None);
        assert_eq!(classify_query("backpack"), None);
        assert_eq!(classify_query("panorama camera"), None);
        assert_eq!(classify_query("portable ac unit"), Some(INT_GADGETS));
    }

    #[test]
    fn earlier_groups_win() {
        // matches both gadgets ("fan") and home/kitchen ("kitchen")
        assert_eq!(classify_query("kitchen exhaust fan"), Some(INT_GADGETS));
    }

    #[test]
    fn nothing_matches_empty_or_unrelated() {
        assert_eq!(classify_query(""), None);
        assert_eq!(classify_query("   "), None);
        assert_eq!(classify_query("train tickets"), None);
    }
}
