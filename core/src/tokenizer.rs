use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
}

/// Split text into lowercase keywords, keeping order and duplicates.
///
/// Anything that is not a letter, digit, underscore or apostrophe separates
/// tokens, so `"dog, cat!"` yields `["dog", "cat"]`.
pub fn keywords(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
}

/// Order- and duplicate-insensitive cache key for a keyword list.
pub fn canonical_key(keywords: &[String]) -> String {
    let unique: BTreeSet<&str> = keywords.iter().map(String::as_str).collect();
    unique.into_iter().collect::<Vec<_>>().join("+")
}

/// Term frequencies and total token count of a document body.
pub fn term_counts(text: &str) -> (HashMap<String, u32>, u32) {
    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut length = 0u32;
    for token in keywords(text) {
        *counts.entry(token).or_insert(0) += 1;
        length += 1;
    }
    (counts, length)
}
