//! Field context extraction.
//!
//! For each field, looks at the text surrounding its widget rectangle and
//! derives a probable label, directional neighbors, the governing section
//! header, a coarse visual group, and a confidence score. Page text runs
//! are extracted once and cached per page for the lifetime of one
//! document run.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::Result;
use crate::fields::Field;
use crate::reader::PdfReader;

pub mod text_runs;

pub use text_runs::TextRun;

/// How far the widget rectangle is inflated when gathering nearby text.
const PROXIMITY: f64 = 100.0;
/// Cap on the number of nearby runs kept.
const NEARBY_CAP: usize = 10;
/// Cell size of the visual-group grid.
const GRID: f64 = 100.0;

/// Label keywords that identify a run as a field caption even without a
/// trailing colon.
const LABEL_INDICATORS: &[&str] = &[
    "name", "address", "phone", "email", "date", "ssn", "amount", "signature",
];

/// Suffixes that mark a run as a section header.
const SECTION_SUFFIXES: &[&str] = &["Information", "Section"];

/// Context gathered around one field.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldContext {
    /// Probable label text (possibly empty)
    pub label: String,
    /// Governing section header, scoped to the page
    pub section_header: String,
    /// Nearby text runs, de-duplicated, nearest first
    pub nearby_text: Vec<String>,
    /// Nearest run above the field
    pub text_above: String,
    /// Nearest run below the field
    pub text_below: String,
    /// Nearest run left of the field
    pub text_left: String,
    /// Nearest run right of the field
    pub text_right: String,
    /// Coarse grid bucket grouping fields in the same visual region
    pub visual_group: String,
    /// Extraction confidence in [0, 1]
    pub confidence: f64,
}

/// Per-document context extractor with a page-level run cache.
#[derive(Default)]
pub struct ContextExtractor {
    page_cache: HashMap<u32, Vec<TextRun>>,
}

impl ContextExtractor {
    /// Create an extractor with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract contexts for every field, keyed by field id.
    ///
    /// Container fields (no rectangle of their own) are contextualized
    /// through the union of their children's rectangles, so radio groups
    /// still see their caption text.
    pub fn extract_all(
        &mut self,
        reader: &mut PdfReader,
        fields: &[Field],
    ) -> Result<HashMap<String, FieldContext>> {
        let mut contexts = HashMap::with_capacity(fields.len());
        for field in fields {
            let placement = self.placement_of(field, fields);
            let context = match placement {
                Some((page, rect)) => self.context_for(reader, page, rect)?,
                None => FieldContext {
                    confidence: 0.0,
                    ..FieldContext::default()
                },
            };
            contexts.insert(field.id.clone(), context);
        }
        Ok(contexts)
    }

    /// The page and rectangle to contextualize a field with.
    fn placement_of(&self, field: &Field, fields: &[Field]) -> Option<(u32, [f64; 4])> {
        if let (Some(page), Some(rect)) = (field.page, field.rect) {
            return Some((page, rect));
        }
        if !field.is_group_container {
            return None;
        }

        // Union of the children's rectangles, on the first child's page
        let mut page = None;
        let mut union: Option<[f64; 4]> = None;
        for child in fields.iter().filter(|f| f.parent_id.as_deref() == Some(&field.id)) {
            if let (Some(child_page), Some(rect)) = (child.page, child.rect) {
                page.get_or_insert(child_page);
                union = Some(match union {
                    None => rect,
                    Some([x1, y1, x2, y2]) => [
                        x1.min(rect[0]),
                        y1.min(rect[1]),
                        x2.max(rect[2]),
                        y2.max(rect[3]),
                    ],
                });
            }
        }
        Some((page?, union?))
    }

    /// Build the context for a rectangle on a page.
    fn context_for(
        &mut self,
        reader: &mut PdfReader,
        page: u32,
        rect: [f64; 4],
    ) -> Result<FieldContext> {
        let runs = self.page_runs(reader, page)?;
        let [x1, y1, x2, y2] = rect;
        let center = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);

        // Nearby: centers inside the inflated rectangle, nearest first
        let mut nearby: Vec<(&TextRun, f64)> = runs
            .iter()
            .filter(|run| {
                let (cx, cy) = run.center();
                cx >= x1 - PROXIMITY
                    && cx <= x2 + PROXIMITY
                    && cy >= y1 - PROXIMITY
                    && cy <= y2 + PROXIMITY
            })
            .map(|run| (run, distance(run.center(), center)))
            .collect();
        nearby.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut nearby_text: Vec<String> = Vec::new();
        for (run, _) in &nearby {
            let text = run.text.trim().to_string();
            if !text.is_empty() && !nearby_text.contains(&text) {
                nearby_text.push(text);
            }
            if nearby_text.len() >= NEARBY_CAP {
                break;
            }
        }

        let text_above = nearest_directional(runs, rect, Direction::Above);
        let text_below = nearest_directional(runs, rect, Direction::Below);
        let text_left = nearest_directional(runs, rect, Direction::Left);
        let text_right = nearest_directional(runs, rect, Direction::Right);

        let label = pick_label(&nearby_text, &text_left);
        let section_header = pick_section_header(runs, y2);
        let visual_group = format!(
            "g{}x{}",
            (center.0 / GRID).floor() as i64,
            (center.1 / GRID).floor() as i64
        );

        let label_strong = label.ends_with(':')
            || LABEL_INDICATORS
                .iter()
                .any(|kw| label.to_lowercase().contains(kw));
        let any_directional = !text_above.is_empty()
            || !text_below.is_empty()
            || !text_left.is_empty()
            || !text_right.is_empty();
        let mut confidence: f64 = 0.3;
        if !label.is_empty() && label_strong {
            confidence += 0.3;
        }
        if nearby_text.len() >= 3 {
            confidence += 0.2;
        }
        if !section_header.is_empty() {
            confidence += 0.1;
        }
        if any_directional {
            confidence += 0.1;
        }

        Ok(FieldContext {
            label,
            section_header,
            nearby_text,
            text_above,
            text_below,
            text_left,
            text_right,
            visual_group,
            confidence: confidence.min(1.0),
        })
    }

    /// Cached text runs of a page.
    fn page_runs(&mut self, reader: &mut PdfReader, page: u32) -> Result<&Vec<TextRun>> {
        if !self.page_cache.contains_key(&page) {
            let info = reader.pages().iter().find(|p| p.number == page).cloned();
            let runs = match info {
                Some(info) => text_runs::extract_text_runs(reader, &info)?,
                None => Vec::new(),
            };
            log::debug!("Page {}: {} text runs", page, runs.len());
            self.page_cache.insert(page, runs);
        }
        Ok(self.page_cache.get(&page).expect("just inserted"))
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Above,
    Below,
    Left,
    Right,
}

/// Nearest run in the given half-plane with the required overlap.
fn nearest_directional(runs: &[TextRun], rect: [f64; 4], direction: Direction) -> String {
    let [x1, y1, x2, y2] = rect;
    let center = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);

    runs.iter()
        .filter(|run| {
            let (cx, cy) = run.center();
            let h_overlap = run.x < x2 && run.x + run.width > x1;
            let v_overlap = run.y < y2 && run.y + run.height > y1;
            match direction {
                Direction::Above => cy > y2 && h_overlap,
                Direction::Below => cy < y1 && h_overlap,
                Direction::Left => cx < x1 && v_overlap,
                Direction::Right => cx > x2 && v_overlap,
            }
        })
        .map(|run| (run, distance(run.center(), center)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(run, _)| run.text.trim().to_string())
        .unwrap_or_default()
}

/// Label heuristic: colon-terminated run, then indicator keyword, then the
/// left neighbor, then the nearest run.
fn pick_label(nearby_text: &[String], text_left: &str) -> String {
    if let Some(colon) = nearby_text.iter().find(|t| t.trim_end().ends_with(':')) {
        return colon.clone();
    }
    if let Some(keyword) = nearby_text.iter().find(|t| {
        let lower = t.to_lowercase();
        LABEL_INDICATORS.iter().any(|kw| lower.contains(kw))
    }) {
        return keyword.clone();
    }
    if !text_left.is_empty() {
        return text_left.to_string();
    }
    nearby_text.first().cloned().unwrap_or_default()
}

/// First run above the field that looks like a section header.
fn pick_section_header(runs: &[TextRun], field_top: f64) -> String {
    runs.iter()
        .filter(|run| run.y > field_top)
        .filter(|run| is_section_header(&run.text))
        .min_by(|a, b| {
            (a.y - field_top)
                .partial_cmp(&(b.y - field_top))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|run| run.text.trim().to_string())
        .unwrap_or_default()
}

/// All-caps (at least three letters) or a known header suffix.
fn is_section_header(text: &str) -> bool {
    let trimmed = text.trim();
    if SECTION_SUFFIXES.iter().any(|s| trimmed.ends_with(s)) {
        return true;
    }
    let letters: Vec<char> = trimmed.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 3 && letters.iter().all(|c| c.is_uppercase())
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
