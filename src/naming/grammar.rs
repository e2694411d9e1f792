//! BEM name grammar.
//!
//! The canonical machine name for a field is
//! `block ('_' element)? ('__' modifier)?` where each segment matches
//! `[a-z][a-z0-9]*(-[a-z0-9]+)*`, the whole name is at most 50 bytes, and
//! a handful of block tokens are reserved.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

/// Maximum total length of a name.
pub const MAX_NAME_LEN: usize = 50;

/// Blocks that generated names must not start with (the fallback
/// generator's `form` namespace is exempted by its caller).
pub const RESERVED_BLOCKS: &[&str] = &["group", "custom", "temp", "field", "form", "pdf"];

lazy_static! {
    static ref BEM_NAME: Regex = Regex::new(
        r"^[a-z][a-z0-9]*(-[a-z0-9]+)*(_[a-z][a-z0-9]*(-[a-z0-9]+)*)?(__[a-z][a-z0-9]*(-[a-z0-9]+)*)?$"
    )
    .expect("static regex");
    static ref SEGMENT: Regex =
        Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").expect("static regex");
}

/// A parsed BEM name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BemName {
    /// Block segment
    pub block: String,
    /// Optional element segment
    pub element: Option<String>,
    /// Optional modifier segment
    pub modifier: Option<String>,
}

impl BemName {
    /// Parse a string that must already satisfy the grammar.
    pub fn parse(name: &str) -> Result<Self> {
        if !is_valid(name) {
            return Err(Error::NameGrammar(format!("'{}' does not match the BEM grammar", name)));
        }

        let (head, modifier) = match name.split_once("__") {
            Some((head, modifier)) => (head, Some(modifier.to_string())),
            None => (name, None),
        };
        let (block, element) = match head.split_once('_') {
            Some((block, element)) => (block.to_string(), Some(element.to_string())),
            None => (head.to_string(), None),
        };

        Ok(Self {
            block,
            element,
            modifier,
        })
    }

    /// Render the name back to its string form.
    pub fn format(&self) -> String {
        let mut out = self.block.clone();
        if let Some(element) = &self.element {
            out.push('_');
            out.push_str(element);
        }
        if let Some(modifier) = &self.modifier {
            out.push_str("__");
            out.push_str(modifier);
        }
        out
    }

    /// Whether the block is one of the reserved tokens.
    pub fn has_reserved_block(&self) -> bool {
        RESERVED_BLOCKS.contains(&self.block.as_str())
    }

    /// Copy of this name with the modifier replaced.
    pub fn with_modifier(&self, modifier: &str) -> Self {
        Self {
            block: self.block.clone(),
            element: self.element.clone(),
            modifier: Some(modifier.to_string()),
        }
    }

    /// Copy of this name with the element replaced.
    pub fn with_element(&self, element: &str) -> Self {
        Self {
            block: self.block.clone(),
            element: Some(element.to_string()),
            modifier: self.modifier.clone(),
        }
    }
}

/// Whether a string satisfies the grammar and the length bound.
pub fn is_valid(name: &str) -> bool {
    name.len() <= MAX_NAME_LEN && BEM_NAME.is_match(name)
}

/// Whether a string is a valid single segment.
pub fn is_valid_segment(segment: &str) -> bool {
    SEGMENT.is_match(segment)
}

/// Normalize a legacy identifier whose only problems are casing and
/// separator style.
///
/// Lowercases and re-maps separator runs onto the grammar: a single `_`
/// or a run of two or more `-` becomes the element separator, a run of
/// two or more `_` becomes the modifier separator, whitespace and other
/// characters become in-segment hyphens. Returns `None` when no valid
/// name can be formed.
pub fn normalize_name(raw: &str) -> Option<String> {
    #[derive(PartialEq)]
    enum Sep {
        None,
        Element,
        Modifier,
    }

    let lowered = raw.trim().to_lowercase();
    let mut segments: Vec<String> = vec![String::new()];
    let mut separators: Vec<Sep> = Vec::new();

    let mut chars = lowered.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            'a'..='z' | '0'..='9' => segments.last_mut().map(|s| s.push(c)).unwrap_or(()),
            '_' => {
                let mut run = 1;
                while chars.peek() == Some(&'_') {
                    chars.next();
                    run += 1;
                }
                separators.push(if run >= 2 { Sep::Modifier } else { Sep::Element });
                segments.push(String::new());
            },
            '-' => {
                let mut run = 1;
                while chars.peek() == Some(&'-') {
                    chars.next();
                    run += 1;
                }
                if run >= 2 {
                    separators.push(Sep::Element);
                    segments.push(String::new());
                } else {
                    segments.last_mut().map(|s| s.push('-')).unwrap_or(());
                }
            },
            _ => segments.last_mut().map(|s| s.push('-')).unwrap_or(()),
        }
    }

    // Assemble block / element / modifier, demoting surplus separators to
    // hyphens so nothing is silently dropped
    let mut block = String::new();
    let mut element: Option<String> = None;
    let mut modifier: Option<String> = None;
    for (i, segment) in segments.iter().enumerate() {
        let cleaned = clean_segment(segment);
        let sep = if i == 0 { &Sep::None } else { &separators[i - 1] };
        let target: &mut String = match sep {
            Sep::None => &mut block,
            Sep::Modifier if modifier.is_none() => modifier.get_or_insert_with(String::new),
            Sep::Element if element.is_none() && modifier.is_none() => {
                element.get_or_insert_with(String::new)
            },
            _ => {
                if let Some(m) = modifier.as_mut() {
                    m
                } else if let Some(e) = element.as_mut() {
                    e
                } else {
                    &mut block
                }
            },
        };
        if cleaned.is_empty() {
            continue;
        }
        if target.is_empty() {
            *target = cleaned;
        } else {
            target.push('-');
            target.push_str(&cleaned);
        }
    }

    if block.is_empty() {
        return None;
    }
    let element = element.filter(|e| !e.is_empty());
    let modifier = modifier.filter(|m| !m.is_empty());

    let candidate = BemName {
        block,
        element,
        modifier,
    }
    .format();

    is_valid(&candidate).then_some(candidate)
}

/// Reduce arbitrary text (an export value, a label) to one grammar-valid
/// segment. Returns `None` when nothing survivable remains.
pub fn transliterate_segment(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        match c {
            'a'..='z' | '0'..='9' => out.push(c),
            _ => {
                if !out.ends_with('-') && !out.is_empty() {
                    out.push('-');
                }
            },
        }
    }
    let out = out.trim_matches('-');
    // Segments start with a letter
    let start = out.find(|c: char| c.is_ascii_lowercase())?;
    let segment = out[start..].trim_matches('-').to_string();
    is_valid_segment(&segment).then_some(segment)
}

/// Strip a cleaned segment down to grammar shape: must start with a
/// letter, no hyphen runs, no edge hyphens.
fn clean_segment(segment: &str) -> String {
    let mut cleaned = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c == '-' {
            if !cleaned.is_empty() && !cleaned.ends_with('-') {
                cleaned.push('-');
            }
        } else {
            cleaned.push(c);
        }
    }
    let cleaned = cleaned.trim_matches('-');
    match cleaned.find(|c: char| c.is_ascii_lowercase()) {
        Some(start) => cleaned[start..].trim_matches('-').to_string(),
        None => String::new(),
    }
}
