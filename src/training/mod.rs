//! Training store.
//!
//! Holds the historical `(context → approved name)` evidence the name
//! engine consults: an exact fingerprint index, a weighted-similarity
//! search over stored records, and the extracted [`NamingPattern`]
//! catalog. The store is built once per process and is immutable (and
//! `Send + Sync`) afterwards; workers share it by reference.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::context::FieldContext;
use crate::error::{Error, Result};
use crate::naming::grammar::{self, BemName};

pub mod similarity;

use similarity::{spatial_proximity, token_set_overlap, tokenize};

/// Similarity weights: text, spatial, kind, section, visual group.
const W_TEXT: f64 = 0.35;
const W_SPATIAL: f64 = 0.20;
const W_KIND: f64 = 0.15;
const W_SECTION: f64 = 0.20;
const W_VISUAL: f64 = 0.10;

/// One normalized training record.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingRecord {
    /// The historically approved BEM name
    pub approved_name: String,
    /// Field label, if recorded
    #[serde(default)]
    pub label: Option<String>,
    /// Nearby text, if recorded
    #[serde(default)]
    pub nearby_text: Vec<String>,
    /// Section header, if recorded
    #[serde(default)]
    pub section: Option<String>,
    /// Field kind token (`text`, `checkbox`, ...), if recorded
    #[serde(default)]
    pub kind: Option<String>,
    /// 1-based page number
    #[serde(default)]
    pub page: Option<u32>,
    /// Widget x coordinate
    #[serde(default)]
    pub x: Option<f64>,
    /// Widget y coordinate
    #[serde(default)]
    pub y: Option<f64>,
    /// Widget width
    #[serde(default)]
    pub width: Option<f64>,
    /// Widget height
    #[serde(default)]
    pub height: Option<f64>,
}

impl TrainingRecord {
    fn center(&self) -> Option<(f64, f64)> {
        let x = self.x?;
        let y = self.y?;
        Some((
            x + self.width.unwrap_or(0.0) / 2.0,
            y + self.height.unwrap_or(0.0) / 2.0,
        ))
    }
}

/// A naming pattern distilled from the training corpus.
#[derive(Debug, Clone)]
pub struct NamingPattern {
    /// Label tokens that trigger this pattern
    pub trigger_tokens: Vec<String>,
    /// Block of the produced name
    pub block: String,
    /// Element of the produced name, if any
    pub element: Option<String>,
    /// Most frequent modifier seen with this pattern, if any
    pub modifier_hint: Option<String>,
    /// Number of training records behind the pattern
    pub support: u32,
    /// `pattern_hits / fingerprints_observed` over the training set
    pub confidence: f64,
}

impl NamingPattern {
    /// The name this pattern produces (without modifier).
    pub fn base_name(&self) -> String {
        BemName {
            block: self.block.clone(),
            element: self.element.clone(),
            modifier: None,
        }
        .format()
    }
}

/// A stored record, pre-tokenized for similarity scoring.
#[derive(Debug, Clone)]
struct StoredRecord {
    name: String,
    label: String,
    section: String,
    kind: String,
    tokens: HashSet<String>,
    center: Option<(f64, f64)>,
    visual_group: String,
}

/// Lookup query derived from a field and its context.
#[derive(Debug, Clone)]
pub struct ContextQuery {
    /// Lowercased label
    pub label: String,
    /// Lowercased section header
    pub section: String,
    /// Field kind token
    pub kind: String,
    /// Label + nearby tokens
    pub tokens: HashSet<String>,
    /// Widget center, if the field has one
    pub center: Option<(f64, f64)>,
    /// Visual group bucket
    pub visual_group: String,
}

impl ContextQuery {
    /// Build a query from a field context and kind token.
    pub fn new(context: &FieldContext, kind: &str, center: Option<(f64, f64)>) -> Self {
        let mut tokens: HashSet<String> = tokenize(&context.label).into_iter().collect();
        for text in &context.nearby_text {
            tokens.extend(tokenize(text));
        }
        Self {
            label: context.label.trim().to_lowercase(),
            section: context.section_header.trim().to_lowercase(),
            kind: kind.to_string(),
            tokens,
            center,
            visual_group: context.visual_group.clone(),
        }
    }
}

/// The in-memory training index.
#[derive(Debug, Default)]
pub struct TrainingStore {
    exact: HashMap<String, Vec<(String, u32)>>,
    records: Vec<StoredRecord>,
    name_support: HashMap<String, u32>,
    patterns: Vec<NamingPattern>,
    discarded: usize,
}

impl TrainingStore {
    /// An empty store (no training evidence available).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the index from a sequence of records.
    ///
    /// Records whose `approved_name` fails the BEM grammar are discarded
    /// and counted. A non-empty input where every record is discarded is
    /// treated as corrupt.
    pub fn load(records: impl IntoIterator<Item = TrainingRecord>) -> Result<Self> {
        let mut store = Self::default();
        let mut total = 0usize;

        for record in records {
            total += 1;
            if !grammar::is_valid(&record.approved_name) {
                store.discarded += 1;
                continue;
            }
            store.insert(record);
        }

        if total > 0 && store.records.is_empty() {
            return Err(Error::TrainingCorrupt(format!(
                "all {} training records failed the name grammar",
                total
            )));
        }

        store.build_patterns();
        log::info!(
            "Training store loaded: {} records, {} patterns, {} discarded",
            store.records.len(),
            store.patterns.len(),
            store.discarded
        );
        Ok(store)
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records discarded at load time.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Names whose fingerprint equals this query's fingerprint, with
    /// support counts, highest support first.
    pub fn lookup_exact(&self, query: &ContextQuery) -> Vec<(String, u32)> {
        let key = fingerprint(&query.label, &query.section, &query.kind, query.center);
        let mut hits = self.exact.get(&key).cloned().unwrap_or_default();
        hits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits
    }

    /// Top-k names by weighted similarity, best first. Ties break toward
    /// the name with higher overall support.
    pub fn lookup_similar(&self, query: &ContextQuery, top_k: usize) -> Vec<(String, f64)> {
        let mut scored: Vec<(&StoredRecord, f64)> = self
            .records
            .iter()
            .map(|record| (record, self.score(record, query)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let sa = self.name_support.get(&a.0.name).copied().unwrap_or(0);
                    let sb = self.name_support.get(&b.0.name).copied().unwrap_or(0);
                    sb.cmp(&sa)
                })
        });

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(top_k);
        for (record, score) in scored {
            if seen.insert(record.name.clone()) {
                out.push((record.name.clone(), score));
                if out.len() >= top_k {
                    break;
                }
            }
        }
        out
    }

    /// Support (record count) behind a specific name.
    pub fn support_of(&self, name: &str) -> u32 {
        self.name_support.get(name).copied().unwrap_or(0)
    }

    /// The extracted pattern catalog, strongest support first.
    pub fn patterns(&self) -> &[NamingPattern] {
        &self.patterns
    }

    fn insert(&mut self, record: TrainingRecord) {
        let label = record.label.clone().unwrap_or_default().trim().to_lowercase();
        let section = record.section.clone().unwrap_or_default().trim().to_lowercase();
        let kind = record.kind.clone().unwrap_or_default().trim().to_lowercase();
        let center = record.center();

        let key = fingerprint(&label, &section, &kind, center);
        let bucket = self.exact.entry(key).or_default();
        match bucket.iter_mut().find(|(name, _)| *name == record.approved_name) {
            Some((_, support)) => *support += 1,
            None => bucket.push((record.approved_name.clone(), 1)),
        }

        *self
            .name_support
            .entry(record.approved_name.clone())
            .or_insert(0) += 1;

        let mut tokens: HashSet<String> = tokenize(&label).into_iter().collect();
        for text in &record.nearby_text {
            tokens.extend(tokenize(text));
        }

        let visual_group = center
            .map(|(cx, cy)| format!("g{}x{}", (cx / 100.0).floor() as i64, (cy / 100.0).floor() as i64))
            .unwrap_or_default();

        self.records.push(StoredRecord {
            name: record.approved_name,
            label,
            section,
            kind,
            tokens,
            center,
            visual_group,
        });
    }

    fn score(&self, record: &StoredRecord, query: &ContextQuery) -> f64 {
        let text = token_set_overlap(&record.tokens, &query.tokens);
        let spatial = match (record.center, query.center) {
            (Some(a), Some(b)) => spatial_proximity(a, b),
            _ => 0.0,
        };
        let kind = if !record.kind.is_empty() && record.kind == query.kind {
            1.0
        } else {
            0.0
        };
        let section = if !record.section.is_empty() && record.section == query.section {
            1.0
        } else {
            0.0
        };
        let visual = if !record.visual_group.is_empty() && record.visual_group == query.visual_group
        {
            1.0
        } else {
            0.0
        };

        W_TEXT * text + W_SPATIAL * spatial + W_KIND * kind + W_SECTION * section + W_VISUAL * visual
    }

    /// Group records by the (block, element) of their approved name and
    /// distill trigger tokens.
    fn build_patterns(&mut self) {
        let fingerprints_observed = self.exact.len().max(1);

        let mut groups: HashMap<(String, Option<String>), Vec<&StoredRecord>> = HashMap::new();
        for record in &self.records {
            if let Ok(parsed) = BemName::parse(&record.name) {
                groups
                    .entry((parsed.block, parsed.element))
                    .or_default()
                    .push(record);
            }
        }

        let mut patterns = Vec::with_capacity(groups.len());
        for ((block, element), members) in groups {
            let support = members.len() as u32;

            // Trigger tokens: label tokens present in at least half the group
            let mut token_counts: HashMap<String, usize> = HashMap::new();
            for member in &members {
                for token in tokenize(&member.label) {
                    *token_counts.entry(token).or_insert(0) += 1;
                }
            }
            let mut trigger_tokens: Vec<String> = token_counts
                .into_iter()
                .filter(|(_, count)| *count * 2 >= members.len())
                .map(|(token, _)| token)
                .collect();
            trigger_tokens.sort();

            // Most frequent modifier
            let mut modifier_counts: HashMap<String, usize> = HashMap::new();
            for member in &members {
                if let Ok(parsed) = BemName::parse(&member.name) {
                    if let Some(modifier) = parsed.modifier {
                        *modifier_counts.entry(modifier).or_insert(0) += 1;
                    }
                }
            }
            let modifier_hint = modifier_counts
                .into_iter()
                .max_by_key(|(_, count)| *count)
                .map(|(modifier, _)| modifier);

            patterns.push(NamingPattern {
                trigger_tokens,
                block,
                element,
                modifier_hint,
                support,
                confidence: support as f64 / fingerprints_observed as f64,
            });
        }

        patterns.sort_by(|a, b| {
            b.support
                .cmp(&a.support)
                .then_with(|| a.block.cmp(&b.block))
        });
        self.patterns = patterns;
    }
}

/// Lowercased fingerprint tuple: label, section, kind, position bands.
///
/// Bands are thirds of the US-Letter page box clamped to 0..=2; records
/// without coordinates band to the middle.
fn fingerprint(label: &str, section: &str, kind: &str, center: Option<(f64, f64)>) -> String {
    let (h_band, v_band) = match center {
        Some((cx, cy)) => (
            ((cx / 612.0 * 3.0).floor() as i64).clamp(0, 2),
            ((cy / 792.0 * 3.0).floor() as i64).clamp(0, 2),
        ),
        None => (1, 1),
    };
    format!("{}|{}|{}|{}|{}", label, section, kind, h_band, v_band)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, label: &str, kind: &str) -> TrainingRecord {
        TrainingRecord {
            approved_name: name.to_string(),
            label: Some(label.to_string()),
            nearby_text: Vec::new(),
            section: None,
            kind: Some(kind.to_string()),
            page: None,
            x: None,
            y: None,
            width: None,
            height: None,
        }
    }

    #[test]
    fn test_load_discards_invalid_names() {
        let store = TrainingStore::load(vec![
            record("owner-information_name", "Name:", "text"),
            record("NOT VALID", "Name:", "text"),
        ])
        .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.discarded(), 1);
    }

    #[test]
    fn test_load_all_invalid_is_corrupt() {
        let result = TrainingStore::load(vec![record("BAD NAME", "x", "text")]);
        assert!(matches!(result, Err(Error::TrainingCorrupt(_))));
    }

    #[test]
    fn test_load_empty_is_fine() {
        let store = TrainingStore::load(Vec::new()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_lookup_exact_counts_support() {
        let store = TrainingStore::load(vec![
            record("owner-information_name", "name:", "text"),
            record("owner-information_name", "name:", "text"),
            record("contact_phone-number", "phone:", "text"),
        ])
        .unwrap();

        let query = ContextQuery {
            label: "name:".to_string(),
            section: String::new(),
            kind: "text".to_string(),
            tokens: HashSet::new(),
            center: None,
            visual_group: String::new(),
        };
        let hits = store.lookup_exact(&query);
        assert_eq!(hits, vec![("owner-information_name".to_string(), 2)]);
    }

    #[test]
    fn test_lookup_similar_ranks_by_token_overlap() {
        let store = TrainingStore::load(vec![
            record("owner-information_name", "First Name", "text"),
            record("payment_amount", "Amount Due", "text"),
        ])
        .unwrap();

        let query = ContextQuery {
            label: "first name".to_string(),
            section: String::new(),
            kind: "text".to_string(),
            tokens: ["first".to_string(), "name".to_string()].into_iter().collect(),
            center: None,
            visual_group: String::new(),
        };
        let hits = store.lookup_similar(&query, 5);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].0, "owner-information_name");
    }

    #[test]
    fn test_patterns_extracted() {
        let store = TrainingStore::load(vec![
            record("owner-information_name", "First Name", "text"),
            record("owner-information_name", "Last Name", "text"),
            record("owner-information_name__middle", "Middle Name", "text"),
        ])
        .unwrap();

        let patterns = store.patterns();
        assert_eq!(patterns.len(), 1);
        let pattern = &patterns[0];
        assert_eq!(pattern.block, "owner-information");
        assert_eq!(pattern.element.as_deref(), Some("name"));
        assert_eq!(pattern.support, 3);
        assert!(pattern.trigger_tokens.contains(&"name".to_string()));
        assert_eq!(pattern.modifier_hint.as_deref(), Some("middle"));
        assert_eq!(pattern.base_name(), "owner-information_name");
    }

    #[test]
    fn test_fingerprint_bands() {
        let left_top = fingerprint("l", "s", "text", Some((10.0, 780.0)));
        let right_bottom = fingerprint("l", "s", "text", Some((600.0, 10.0)));
        assert_ne!(left_top, right_bottom);
        let unknown = fingerprint("l", "s", "text", None);
        assert!(unknown.ends_with("|1|1"));
    }
}
