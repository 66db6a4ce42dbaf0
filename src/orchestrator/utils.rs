//! Orchestrator utility functions
//!
//! Common helpers for hashing, selection clean-up and keyword detection.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// Compute a short hash for a query string
///
/// Returns an 8-character hexadecimal hash suitable for logging and tracing,
/// so raw queries never end up in info-level logs.
///
/// # Arguments
/// * `query` - The query string to hash
///
/// # Returns
/// * `String` - 8-character hexadecimal hash
pub fn hash_query(query: &str) -> String {
    let mut hasher = DefaultHasher::new();
    query.hash(&mut hasher);
    format!("{:016x}", hasher.finish())[..8].to_string()
}

/// Drop repeated names, keeping the first occurrence of each
pub fn unique_in_order(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

/// Whether `text` contains `keyword` or its plural as a whole word, ignoring case
///
/// `"report"` matches "Report" and "reports" but not "reporting".
pub fn contains_word(text: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    text.split(|c: char| !c.is_alphanumeric()).any(|word| {
        word.eq_ignore_ascii_case(keyword)
            || word
                .strip_suffix(['s', 'S'])
                .is_some_and(|stem| stem.eq_ignore_ascii_case(keyword))
    })
}
