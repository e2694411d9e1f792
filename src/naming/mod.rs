//! Name decision model.
//!
//! The engine turns each `(Field, FieldContext)` pair into a
//! [`NameDecision`]: whether to preserve, improve, or restructure the
//! current name, the validated new name, and the evidence trail behind
//! the choice.

use serde::Serialize;

pub mod engine;
pub mod grammar;
pub mod rules;

pub use engine::NameEngine;

/// What the engine chose to do with the field's current name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Keep the existing name unchanged
    Preserve,
    /// Keep the existing name's meaning, fix its style
    Improve,
    /// Generate a new name
    Restructure,
}

/// Which stage of the pipeline produced the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Exact training fingerprint match
    ExactMatch,
    /// Similar training name adapted to this context
    AdaptedPattern,
    /// Pattern catalog or fixed semantic rule
    Rule,
    /// Kind-and-label fallback
    Fallback,
}

/// The decision produced for one field.
#[derive(Debug, Clone, Serialize)]
pub struct NameDecision {
    /// Id of the decided field
    pub field_id: String,
    /// Chosen action
    pub action: DecisionAction,
    /// The validated new name
    pub new_name: String,
    /// Decision confidence in [0, 1]
    pub confidence: f64,
    /// Producing stage
    pub source: DecisionSource,
    /// Short human-readable evidence trail
    pub rationale: String,
    /// Other candidates that were considered, in rank order
    pub alternatives: Vec<String>,
}

/// Non-fatal conditions raised while deciding names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NamingWarning {
    /// The retry loop was exhausted; the last candidate was suffixed
    RetryExhausted {
        /// Id of the affected field
        field_id: String,
        /// The name finally assigned
        assigned: String,
    },
}

impl std::fmt::Display for NamingWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NamingWarning::RetryExhausted { field_id, assigned } => {
                write!(f, "name retries exhausted for {}; assigned '{}'", field_id, assigned)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serializes_snake_case() {
        let decision = NameDecision {
            field_id: "field_0000".to_string(),
            action: DecisionAction::Preserve,
            new_name: "owner-information_name".to_string(),
            confidence: 0.9,
            source: DecisionSource::ExactMatch,
            rationale: "test".to_string(),
            alternatives: Vec::new(),
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"action\":\"preserve\""));
        assert!(json.contains("\"source\":\"exact_match\""));
    }
}
