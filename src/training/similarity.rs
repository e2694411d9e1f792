//! Text tokenization and similarity scoring for training lookups.

use std::collections::HashSet;

/// Words that carry no naming signal.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "enter", "for", "from", "if", "in", "is",
    "it", "of", "on", "or", "per", "please", "the", "this", "to", "with", "your",
];

/// Lowercased word tokens with stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.len() > 1 || w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Normalized token-set overlap (Jaccard index) of two token sets.
pub fn token_set_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Normalized spatial proximity of two points on a page, 1.0 at identical
/// positions falling linearly to 0.0 at the letter-page diagonal.
pub fn spatial_proximity(a: (f64, f64), b: (f64, f64)) -> f64 {
    const DIAGONAL: f64 = 1000.0;
    let dist = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
    (1.0 - dist / DIAGONAL).max(0.0)
}
