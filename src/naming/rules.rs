//! Fixed semantic rule table.
//!
//! The last resort before the kind fallback: a small table mapping label
//! semantics to well-known names. Kind-scoped rules (signature, radio,
//! agreement checkboxes) run before keyword rules so a signature field
//! labeled "Name" still lands in the signature namespace.

use crate::context::FieldContext;
use crate::fields::FieldKind;
use crate::naming::grammar::transliterate_segment;
use crate::training::similarity::tokenize;

/// Keyword → name rules for text-like fields.
const KEYWORD_RULES: &[(&str, &str)] = &[
    ("name", "owner-information_name"),
    ("address", "owner-information_address"),
    ("ssn", "owner-information_ssn"),
    ("phone", "contact_phone-number"),
    ("email", "contact_email"),
    ("amount", "payment_amount"),
    ("date", "general_date"),
];

/// Words that mark an agreement checkbox.
const AGREEMENT_WORDS: &[&str] = &["agree", "accept", "consent", "acknowledge", "certify"];

/// Evaluate the rule table for one field.
pub fn apply(kind: FieldKind, context: &FieldContext) -> Option<String> {
    let haystack = rule_text(context);

    match kind {
        FieldKind::Signature => return Some("signatures_owner".to_string()),
        FieldKind::RadioGroup => return Some(format!("selection_{}", radio_block(context)?)),
        FieldKind::Checkbox => {
            if AGREEMENT_WORDS.iter().any(|w| haystack.contains(w)) {
                return Some("acknowledgment_agreement".to_string());
            }
        },
        _ => {},
    }

    for (keyword, name) in KEYWORD_RULES {
        if haystack.contains(keyword) {
            return Some((*name).to_string());
        }
    }

    None
}

/// Block token for a radio group, from its label tokens.
fn radio_block(context: &FieldContext) -> Option<String> {
    let tokens = tokenize(&context.label);
    let candidate = tokens
        .iter()
        .take(2)
        .cloned()
        .collect::<Vec<_>>()
        .join("-");
    transliterate_segment(&candidate)
}

/// Lowercased label + nearby text the keyword rules match against.
fn rule_text(context: &FieldContext) -> String {
    let mut text = context.label.to_lowercase();
    for nearby in &context.nearby_text {
        text.push(' ');
        text.push_str(&nearby.to_lowercase());
    }
    text
}
