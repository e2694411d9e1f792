//! Name decision engine.
//!
//! Runs preservation analysis, the four-stage generation pipeline, and
//! validation/uniqueness enforcement for every field of a document. Each
//! field moves through an explicit state machine:
//! `initial → preserved | improved | generated → validated → assigned`,
//! and the engine reaches `finalized` once every field is assigned and
//! global uniqueness holds.
//!
//! Radio groups are decided before their widgets; every widget name is
//! the group name joined to its export-value tail, so the group-prefix
//! invariant holds by construction.

use std::collections::{HashMap, HashSet};

use crate::config::ProcessOptions;
use crate::context::FieldContext;
use crate::fields::{Field, FieldKind};
use crate::naming::grammar::{self, normalize_name, transliterate_segment, BemName};
use crate::naming::{rules, DecisionAction, DecisionSource, NameDecision, NamingWarning};
use crate::training::similarity::tokenize;
use crate::training::{ContextQuery, TrainingStore};

/// Retry bound for the generation/validation loop.
const MAX_RETRIES: usize = 5;

/// Per-field progress through the decision model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecisionState {
    Initial,
    Preserved,
    Improved,
    Generated,
    Validated,
    Assigned,
}

/// A generated-but-not-yet-validated candidate.
struct Candidate {
    name: String,
    source: DecisionSource,
    confidence: f64,
    rationale: String,
    alternatives: Vec<String>,
}

/// Output of one engine run.
#[derive(Debug)]
pub struct EngineOutput {
    /// Decisions in field order; fields that are not renaming targets
    /// (unnamed pushbuttons and the like) are absent
    pub decisions: Vec<NameDecision>,
    /// Non-fatal conditions raised while deciding
    pub warnings: Vec<NamingWarning>,
}

impl EngineOutput {
    /// Decision for a field id, if one was produced.
    pub fn decision_for(&self, field_id: &str) -> Option<&NameDecision> {
        self.decisions.iter().find(|d| d.field_id == field_id)
    }
}

/// The name engine. Holds the shared training store by reference; all
/// per-document state lives inside one `decide_all` call.
pub struct NameEngine<'a> {
    store: &'a TrainingStore,
    options: &'a ProcessOptions,
}

impl<'a> NameEngine<'a> {
    /// Create an engine over a loaded training store.
    pub fn new(store: &'a TrainingStore, options: &'a ProcessOptions) -> Self {
        Self { store, options }
    }

    /// Decide a name for every renameable field.
    ///
    /// `fields` must be in extraction order (containers precede their
    /// kids) and `contexts` must hold an entry per field id.
    pub fn decide_all(
        &self,
        fields: &[Field],
        contexts: &HashMap<String, FieldContext>,
    ) -> EngineOutput {
        let mut run = EngineRun {
            store: self.store,
            options: self.options,
            fields,
            contexts,
            assigned: HashSet::new(),
            base_owners: HashMap::new(),
            decisions: Vec::new(),
            index_by_field: HashMap::new(),
            warnings: Vec::new(),
        };

        for field in fields {
            run.decide_field(field);
        }

        debug_assert!(run.all_unique(), "finalized with duplicate names");
        log::info!(
            "Decided {} names ({} warnings)",
            run.decisions.len(),
            run.warnings.len()
        );

        EngineOutput {
            decisions: run.decisions,
            warnings: run.warnings,
        }
    }
}

/// Mutable state of one document's decision pass.
struct EngineRun<'a> {
    store: &'a TrainingStore,
    options: &'a ProcessOptions,
    fields: &'a [Field],
    contexts: &'a HashMap<String, FieldContext>,
    assigned: HashSet<String>,
    /// Base name (block + element) → index of the first owning decision
    base_owners: HashMap<String, usize>,
    decisions: Vec<NameDecision>,
    index_by_field: HashMap<String, usize>,
    warnings: Vec<NamingWarning>,
}

impl<'a> EngineRun<'a> {
    fn decide_field(&mut self, field: &Field) {
        // Unnamed non-widget fields and pushbuttons are not renaming targets
        if field.kind == FieldKind::Unknown {
            return;
        }
        if field.kind == FieldKind::RadioWidget && field.parent_id.is_some() {
            self.decide_radio_widget(field);
            return;
        }
        if field.name.is_empty() && field.local_title.is_none() {
            return;
        }

        let context = self.context_of(&field.id);
        let query = ContextQuery::new(&context, field.kind.token(), field.center());
        log::trace!("{} entering {:?}", field.id, DecisionState::Initial);

        let preserved = if self.options.preservation_mode {
            self.preservation_analysis(field, &query)
        } else {
            None
        };
        let (mut candidate, mut state) = match preserved {
            Some((candidate, state)) => (candidate, state),
            None => (
                self.generate(field, &context, &query, &HashSet::new()),
                DecisionState::Generated,
            ),
        };

        // Validation and uniqueness, re-entering generation on rejection
        let mut excluded: HashSet<String> = HashSet::new();
        let mut retries = 0;
        loop {
            match self.validate(field, &candidate, state) {
                Ok(validated) => {
                    candidate = validated;
                    state = DecisionState::Validated;
                    break;
                },
                Err(rejected) => {
                    excluded.insert(rejected);
                    retries += 1;
                    if retries > MAX_RETRIES {
                        // Exhausted: force-suffix the last candidate
                        let forced = self.force_unique(&candidate.name);
                        self.warnings.push(NamingWarning::RetryExhausted {
                            field_id: field.id.clone(),
                            assigned: forced.clone(),
                        });
                        candidate.rationale =
                            format!("{}; retries exhausted, suffixed", candidate.rationale);
                        candidate.name = forced;
                        state = DecisionState::Validated;
                        break;
                    }
                    candidate = self.generate(field, &context, &query, &excluded);
                    state = DecisionState::Generated;
                },
            }
        }

        debug_assert_eq!(state, DecisionState::Validated);
        let action = if self.was_preserved(field, &candidate) {
            DecisionAction::Preserve
        } else if self.was_improved(field, &candidate) {
            DecisionAction::Improve
        } else {
            DecisionAction::Restructure
        };

        state = DecisionState::Assigned;
        log::trace!("{} reached {:?}", field.id, state);
        self.assign(field, candidate, action);
    }

    /// §4.5.1 preservation analysis. Returns a candidate when the current
    /// name can be preserved or merely improved.
    fn preservation_analysis(
        &self,
        field: &Field,
        query: &ContextQuery,
    ) -> Option<(Candidate, DecisionState)> {
        let name = field.name.as_str();
        if name.is_empty() {
            return None;
        }

        if grammar::is_valid(name) {
            let parsed = BemName::parse(name).ok()?;
            if !parsed.has_reserved_block() {
                let exact_support = self
                    .store
                    .lookup_exact(query)
                    .into_iter()
                    .find(|(candidate, _)| candidate == name)
                    .map(|(_, support)| support)
                    .unwrap_or(0);
                let global_support = self.store.support_of(name);
                let support = exact_support.max(global_support);
                if support >= 1 {
                    return Some((
                        Candidate {
                            name: name.to_string(),
                            source: DecisionSource::ExactMatch,
                            confidence: 0.9,
                            rationale: format!(
                                "preserved: grammar-valid with training support {}",
                                support
                            ),
                            alternatives: Vec::new(),
                        },
                        DecisionState::Preserved,
                    ));
                }
            }
        }

        // Style-only violations: lowercase and re-map separators
        if let Some(normalized) = normalize_name(name) {
            let parsed = BemName::parse(&normalized).ok()?;
            if !parsed.has_reserved_block() {
                return Some((
                    Candidate {
                        name: normalized.clone(),
                        source: DecisionSource::Rule,
                        confidence: 0.6,
                        rationale: format!("normalized legacy style of '{}'", name),
                        alternatives: Vec::new(),
                    },
                    DecisionState::Improved,
                ));
            }
        }

        None
    }

    /// §4.5.2 generation pipeline; first success wins. Candidates in
    /// `excluded` were rejected by validation and are skipped.
    fn generate(
        &self,
        field: &Field,
        context: &FieldContext,
        query: &ContextQuery,
        excluded: &HashSet<String>,
    ) -> Candidate {
        // Stage 1: exact pattern match with dominance
        let exact_hits = self.store.lookup_exact(query);
        if let Some((name, support)) = exact_hits.first() {
            let dominant = exact_hits
                .get(1)
                .map(|(_, second)| *support >= second * 2)
                .unwrap_or(true);
            if *support >= self.options.exact_match_min_support
                && dominant
                && !excluded.contains(name)
                && grammar::is_valid(name)
            {
                return Candidate {
                    name: name.clone(),
                    source: DecisionSource::ExactMatch,
                    confidence: 0.9,
                    rationale: format!("exact training match (support {})", support),
                    alternatives: exact_hits.iter().skip(1).map(|(n, _)| n.clone()).collect(),
                };
            }
        }

        // Stage 2: similarity adaptation
        let similar = self.store.lookup_similar(query, 5);
        for (name, score) in &similar {
            if excluded.contains(name) || !grammar::is_valid(name) {
                continue;
            }
            let mut chosen = name.clone();
            let mut note = String::new();
            if self.assigned.contains(&chosen) {
                // Substitute the element with a context-derived token
                if let Some(adapted) = self.adapt_element(&chosen, context) {
                    if !excluded.contains(&adapted) {
                        note = format!(" (element adapted from '{}')", name);
                        chosen = adapted;
                    } else {
                        continue;
                    }
                } else {
                    continue;
                }
            }
            return Candidate {
                name: chosen,
                source: DecisionSource::AdaptedPattern,
                confidence: 0.7,
                rationale: format!("similar training name, score {:.2}{}", score, note),
                alternatives: similar
                    .iter()
                    .filter(|(n, _)| n != name)
                    .map(|(n, _)| n.clone())
                    .collect(),
            };
        }

        // Stage 3: pattern catalog, then the fixed rule table
        if let Some(candidate) = self.match_pattern(query, excluded) {
            return candidate;
        }
        if let Some(name) = rules::apply(field.kind, context) {
            if !excluded.contains(&name) && grammar::is_valid(&name) {
                return Candidate {
                    name,
                    source: DecisionSource::Rule,
                    confidence: 0.6,
                    rationale: "semantic rule".to_string(),
                    alternatives: Vec::new(),
                };
            }
        }

        // Stage 4: fallback in the form namespace
        let tail = transliterate_segment(&context.label)
            .or_else(|| transliterate_segment(&field.id))
            .unwrap_or_else(|| "unnamed".to_string());
        let name = fit_length(&format!("form_{}__{}", field.kind.token(), tail));
        Candidate {
            name,
            source: DecisionSource::Fallback,
            confidence: 0.4,
            rationale: "fallback from kind and label".to_string(),
            alternatives: Vec::new(),
        }
    }

    /// Stage 3a: a pattern fires when at least two trigger tokens (or all
    /// of them, when fewer) appear in the field's tokens.
    fn match_pattern(&self, query: &ContextQuery, excluded: &HashSet<String>) -> Option<Candidate> {
        for pattern in self.store.patterns() {
            if pattern.trigger_tokens.is_empty() {
                continue;
            }
            let matched = pattern
                .trigger_tokens
                .iter()
                .filter(|t| query.tokens.contains(*t))
                .count();
            let needed = pattern.trigger_tokens.len().min(2);
            if matched < needed {
                continue;
            }
            let name = pattern.base_name();
            if excluded.contains(&name) || !grammar::is_valid(&name) {
                continue;
            }
            return Some(Candidate {
                name,
                source: DecisionSource::Rule,
                confidence: 0.6,
                rationale: format!(
                    "pattern [{}] (support {}, confidence {:.2})",
                    pattern.trigger_tokens.join(" "),
                    pattern.support,
                    pattern.confidence
                ),
                alternatives: Vec::new(),
            });
        }
        None
    }

    /// §4.5.3 validation: grammar, reservation, length, then uniqueness
    /// with context-derived disambiguation. `Err` carries the rejected
    /// candidate name for the exclusion set.
    fn validate(
        &mut self,
        field: &Field,
        candidate: &Candidate,
        state: DecisionState,
    ) -> std::result::Result<Candidate, String> {
        let mut name = candidate.name.clone();

        if !grammar::is_valid(&name) {
            return Err(name);
        }
        let parsed = match BemName::parse(&name) {
            Ok(p) => p,
            Err(_) => return Err(name),
        };
        if parsed.has_reserved_block() && candidate.source != DecisionSource::Fallback {
            return Err(name);
        }

        // Radio group names must stay modifier-free so widget names can
        // append their own modifier
        if field.kind == FieldKind::RadioGroup {
            if let Some(modifier) = &parsed.modifier {
                let element = match &parsed.element {
                    Some(e) => format!("{}-{}", e, modifier),
                    None => modifier.clone(),
                };
                name = fit_length(
                    &BemName {
                        block: parsed.block.clone(),
                        element: Some(element),
                        modifier: None,
                    }
                    .format(),
                );
            }
        }

        let mut rationale = candidate.rationale.clone();

        // Preserved/improved names keep their identity; only generated
        // names take part in base-level disambiguation
        let generated = matches!(state, DecisionState::Generated);
        if generated {
            if let Some((disambiguated, note)) = self.disambiguate_base(field, &name) {
                name = disambiguated;
                rationale = format!("{}; {}", rationale, note);
            }
        }

        if self.assigned.contains(&name) {
            match self.uniquify(field, &name) {
                Some((unique, note)) => {
                    rationale = format!("{}; {}", rationale, note);
                    name = unique;
                },
                None => return Err(name),
            }
        }

        Ok(Candidate {
            name,
            source: candidate.source,
            confidence: candidate.confidence,
            rationale,
            alternatives: candidate.alternatives.clone(),
        })
    }

    /// When a generated base name was already produced for another field,
    /// give this one a context modifier and retroactively give the first
    /// owner its own modifier too, so siblings read symmetrically
    /// (`payment_amount__gross` / `payment_amount__net`).
    fn disambiguate_base(&mut self, field: &Field, name: &str) -> Option<(String, String)> {
        let parsed = BemName::parse(name).ok()?;
        if parsed.modifier.is_some() {
            return None;
        }
        let base = parsed.format();
        let owner_idx = match self.base_owners.get(&base) {
            Some(idx) => *idx,
            None => return None,
        };
        if self.decisions[owner_idx].field_id == field.id {
            return None;
        }

        let modifier = self.context_modifier(&field.id)?;
        let candidate = fit_length(&parsed.with_modifier(&modifier).format());
        if !grammar::is_valid(&candidate) {
            return None;
        }

        // Upgrade the original owner in place when it is still bare
        let (owner_action, owner_name, owner_field_id) = {
            let owner = &self.decisions[owner_idx];
            (owner.action, owner.new_name.clone(), owner.field_id.clone())
        };
        if owner_action == DecisionAction::Restructure && owner_name == base {
            if let Some(owner_modifier) = self.context_modifier(&owner_field_id) {
                let upgraded = fit_length(&parsed.with_modifier(&owner_modifier).format());
                if grammar::is_valid(&upgraded)
                    && upgraded != candidate
                    && !self.assigned.contains(&upgraded)
                {
                    self.assigned.remove(&base);
                    self.assigned.insert(upgraded.clone());
                    let owner = &mut self.decisions[owner_idx];
                    owner.rationale = format!(
                        "{}; disambiguated with modifier '{}'",
                        owner.rationale, owner_modifier
                    );
                    owner.new_name = upgraded;
                }
            }
        }

        Some((
            candidate,
            format!("disambiguated with modifier '{}'", modifier),
        ))
    }

    /// Resolve a direct collision: context modifier first, then a
    /// hyphen-joined counter on the final segment.
    fn uniquify(&self, field: &Field, name: &str) -> Option<(String, String)> {
        let parsed = BemName::parse(name).ok()?;

        if parsed.modifier.is_none() {
            if let Some(modifier) = self.context_modifier(&field.id) {
                let candidate = fit_length(&parsed.with_modifier(&modifier).format());
                if grammar::is_valid(&candidate) && !self.assigned.contains(&candidate) {
                    return Some((
                        candidate,
                        format!("disambiguated with modifier '{}'", modifier),
                    ));
                }
            }
        }

        for counter in 2..100u32 {
            let candidate = fit_length(&counter_variant(&parsed, counter));
            if grammar::is_valid(&candidate) && !self.assigned.contains(&candidate) {
                return Some((candidate, format!("disambiguated with counter {}", counter)));
            }
        }
        None
    }

    /// Unconditional uniquifier for the retry-exhaustion path.
    fn force_unique(&self, name: &str) -> String {
        if !self.assigned.contains(name) && grammar::is_valid(name) {
            return name.to_string();
        }
        let parsed = BemName::parse(name)
            .unwrap_or_else(|_| BemName {
                block: "form".to_string(),
                element: Some("unnamed".to_string()),
                modifier: None,
            });
        for counter in 2..10_000u32 {
            let candidate = fit_length(&counter_variant(&parsed, counter));
            if !self.assigned.contains(&candidate) {
                return candidate;
            }
        }
        parsed.format()
    }

    /// Modifier token from the field's context: section header first,
    /// then the first label token not already in the name.
    fn context_modifier(&self, field_id: &str) -> Option<String> {
        let context = self.contexts.get(field_id)?;
        if let Some(section) = transliterate_segment(&context.section_header) {
            return Some(section);
        }
        tokenize(&context.label)
            .into_iter()
            .find_map(|token| transliterate_segment(&token))
    }

    /// Substitute the element segment with a token derived from the label.
    fn adapt_element(&self, name: &str, context: &FieldContext) -> Option<String> {
        let parsed = BemName::parse(name).ok()?;
        let token = tokenize(&context.label)
            .into_iter()
            .find_map(|t| transliterate_segment(&t))?;
        if parsed.element.as_deref() == Some(token.as_str()) {
            return None;
        }
        let adapted = fit_length(&parsed.with_element(&token).format());
        grammar::is_valid(&adapted).then_some(adapted)
    }

    /// Derive a widget's name from its group's assigned name.
    fn decide_radio_widget(&mut self, field: &Field) {
        let group_idx = field
            .parent_id
            .as_ref()
            .and_then(|pid| self.index_by_field.get(pid))
            .copied();
        let group_idx = match group_idx {
            Some(idx) => idx,
            None => return,
        };
        let group_name = self.decisions[group_idx].new_name.clone();

        let sibling_position = self
            .fields
            .iter()
            .filter(|f| f.parent_id == field.parent_id && f.kind == FieldKind::RadioWidget)
            .position(|f| f.id == field.id)
            .unwrap_or(0);

        let tail = field
            .export_value
            .as_deref()
            .and_then(transliterate_segment)
            .unwrap_or_else(|| format!("opt{}", sibling_position + 1));

        let budget = grammar::MAX_NAME_LEN.saturating_sub(group_name.len() + 2);
        let tail = trim_segment(&tail, budget);
        let mut name = format!("{}__{}", group_name, tail);

        if self.assigned.contains(&name) {
            for counter in 2..100u32 {
                let candidate = format!("{}__{}-{}", group_name, tail, counter);
                if candidate.len() <= grammar::MAX_NAME_LEN && !self.assigned.contains(&candidate)
                {
                    name = candidate;
                    break;
                }
            }
        }

        let (action, source, confidence, rationale) = if name == field.name {
            (
                DecisionAction::Preserve,
                DecisionSource::ExactMatch,
                0.9,
                "widget already carries the group prefix".to_string(),
            )
        } else {
            (
                DecisionAction::Restructure,
                DecisionSource::Rule,
                0.6,
                format!("group prefix '{}' + export tail '{}'", group_name, tail),
            )
        };

        let decision = NameDecision {
            field_id: field.id.clone(),
            action,
            new_name: name.clone(),
            confidence,
            source,
            rationale,
            alternatives: Vec::new(),
        };
        self.record(field, decision, None);
    }

    fn was_preserved(&self, field: &Field, candidate: &Candidate) -> bool {
        candidate.name == field.name && candidate.source == DecisionSource::ExactMatch
    }

    fn was_improved(&self, field: &Field, candidate: &Candidate) -> bool {
        candidate.source == DecisionSource::Rule
            && candidate.rationale.starts_with("normalized legacy style")
            && normalize_name(&field.name).as_deref() == Some(candidate.name.as_str())
    }

    fn assign(&mut self, field: &Field, candidate: Candidate, action: DecisionAction) {
        let base = BemName::parse(&candidate.name)
            .map(|p| {
                BemName {
                    block: p.block,
                    element: p.element,
                    modifier: None,
                }
                .format()
            })
            .unwrap_or_else(|_| candidate.name.clone());

        let decision = NameDecision {
            field_id: field.id.clone(),
            action,
            new_name: candidate.name,
            confidence: candidate.confidence,
            source: candidate.source,
            rationale: candidate.rationale,
            alternatives: candidate.alternatives,
        };
        let register_base =
            (action == DecisionAction::Restructure).then_some(base);
        self.record(field, decision, register_base);
    }

    fn record(&mut self, field: &Field, decision: NameDecision, register_base: Option<String>) {
        let idx = self.decisions.len();
        self.assigned.insert(decision.new_name.clone());
        self.index_by_field.insert(field.id.clone(), idx);
        if let Some(base) = register_base {
            self.base_owners.entry(base).or_insert(idx);
        }
        log::debug!(
            "{}: {:?} '{}' -> '{}' ({:?}, {:.2})",
            field.id,
            decision.action,
            field.name,
            decision.new_name,
            decision.source,
            decision.confidence
        );
        self.decisions.push(decision);
    }

    fn context_of(&self, field_id: &str) -> FieldContext {
        self.contexts.get(field_id).cloned().unwrap_or_default()
    }

    fn all_unique(&self) -> bool {
        let names: HashSet<&String> = self.decisions.iter().map(|d| &d.new_name).collect();
        names.len() == self.decisions.len()
    }
}

/// Append a counter to the final segment, hyphen-joined so the grammar
/// still holds (`payment_amount-2`, `...__gross-2`).
fn counter_variant(parsed: &BemName, counter: u32) -> String {
    let mut variant = parsed.clone();
    if let Some(modifier) = &variant.modifier {
        variant.modifier = Some(format!("{}-{}", modifier, counter));
    } else if let Some(element) = &variant.element {
        variant.element = Some(format!("{}-{}", element, counter));
    } else {
        variant.block = format!("{}-{}", variant.block, counter);
    }
    variant.format()
}

/// Trim a name to the length bound, cutting the tail cleanly.
fn fit_length(name: &str) -> String {
    if name.len() <= grammar::MAX_NAME_LEN {
        return name.to_string();
    }
    let mut cut = &name[..grammar::MAX_NAME_LEN];
    while !cut.is_empty() && !grammar::is_valid(cut) {
        cut = &cut[..cut.len() - 1];
    }
    if cut.is_empty() {
        name[..grammar::MAX_NAME_LEN].to_string()
    } else {
        cut.to_string()
    }
}

/// Trim a single segment to a byte budget, keeping it grammar-valid.
fn trim_segment(segment: &str, budget: usize) -> String {
    if segment.len() <= budget {
        return segment.to_string();
    }
    let mut cut = &segment[..budget.min(segment.len())];
    while !cut.is_empty() && !grammar::is_valid_segment(cut) {
        cut = &cut[..cut.len() - 1];
    }
    if cut.is_empty() {
        "opt".to_string()
    } else {
        cut.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldFlags, FieldValue};
    use crate::training::TrainingRecord;

    fn field(id: &str, name: &str, kind: FieldKind) -> Field {
        Field {
            id: id.to_string(),
            name: name.to_string(),
            local_title: Some(name.to_string()),
            kind,
            page: Some(1),
            rect: Some([100.0, 100.0, 200.0, 120.0]),
            value: FieldValue::None,
            flags: FieldFlags::empty(),
            parent_id: None,
            child_ids: Vec::new(),
            export_value: None,
            tooltip: None,
            object_ref: None,
            is_group_container: false,
        }
    }

    fn ctx(label: &str, section: &str) -> FieldContext {
        FieldContext {
            label: label.to_string(),
            section_header: section.to_string(),
            ..FieldContext::default()
        }
    }

    fn record(name: &str, label: &str) -> TrainingRecord {
        TrainingRecord {
            approved_name: name.to_string(),
            label: Some(label.to_string()),
            nearby_text: Vec::new(),
            section: None,
            kind: Some("text".to_string()),
            page: None,
            x: None,
            y: None,
            width: None,
            height: None,
        }
    }

    fn decide(
        fields: &[Field],
        contexts: HashMap<String, FieldContext>,
        store: &TrainingStore,
    ) -> EngineOutput {
        let options = ProcessOptions::default();
        NameEngine::new(store, &options).decide_all(fields, &contexts)
    }

    #[test]
    fn test_preserve_supported_valid_name() {
        let store =
            TrainingStore::load(vec![record("owner-information_name", "Name")]).unwrap();
        let fields = vec![field("field_0000", "owner-information_name", FieldKind::Text)];
        let contexts =
            HashMap::from([("field_0000".to_string(), ctx("Name:", ""))]);

        let output = decide(&fields, contexts, &store);
        let decision = output.decision_for("field_0000").unwrap();
        assert_eq!(decision.action, DecisionAction::Preserve);
        assert_eq!(decision.new_name, "owner-information_name");
        assert_eq!(decision.confidence, 0.9);
    }

    #[test]
    fn test_improve_all_caps() {
        let store = TrainingStore::empty();
        let fields = vec![
            field("field_0000", "FIRST_NAME", FieldKind::Text),
            field("field_0001", "SSN", FieldKind::Text),
        ];
        let contexts = HashMap::from([
            ("field_0000".to_string(), ctx("", "")),
            ("field_0001".to_string(), ctx("", "")),
        ]);

        let output = decide(&fields, contexts, &store);
        let first = output.decision_for("field_0000").unwrap();
        assert_eq!(first.action, DecisionAction::Improve);
        assert_eq!(first.new_name, "first_name");
        assert!(first.confidence >= 0.6);
        assert_eq!(output.decision_for("field_0001").unwrap().new_name, "ssn");
    }

    #[test]
    fn test_collision_resolved_with_section_modifiers() {
        let store = TrainingStore::empty();
        let fields = vec![
            field("field_0000", "", FieldKind::Text),
            field("field_0001", "", FieldKind::Text),
            field("field_0002", "", FieldKind::Text),
        ];
        let contexts = HashMap::from([
            ("field_0000".to_string(), ctx("Amount", "Gross")),
            ("field_0001".to_string(), ctx("Amount", "Net")),
            ("field_0002".to_string(), ctx("Amount", "Fees")),
        ]);

        let output = decide(&fields, contexts, &store);
        let names: Vec<&str> = ["field_0000", "field_0001", "field_0002"]
            .iter()
            .map(|id| output.decision_for(id).unwrap().new_name.as_str())
            .collect();
        assert!(names.contains(&"payment_amount__gross"), "{:?}", names);
        assert!(names.contains(&"payment_amount__net"), "{:?}", names);
        assert!(names.contains(&"payment_amount__fees"), "{:?}", names);
        for id in ["field_0000", "field_0001", "field_0002"] {
            assert!(output
                .decision_for(id)
                .unwrap()
                .rationale
                .contains("disambiguated"));
        }
    }

    #[test]
    fn test_radio_group_and_widgets() {
        let store = TrainingStore::empty();
        let mut group = field("field_0000", "transaction--group", FieldKind::RadioGroup);
        group.is_group_container = true;
        group.rect = None;
        group.page = None;
        group.child_ids = vec!["field_0000_0".to_string(), "field_0000_1".to_string()];

        let mut w1 = field(
            "field_0000_0",
            "transaction--group__one-time",
            FieldKind::RadioWidget,
        );
        w1.parent_id = Some("field_0000".to_string());
        w1.export_value = Some("one-time".to_string());
        let mut w2 = field(
            "field_0000_1",
            "transaction--group__recurring",
            FieldKind::RadioWidget,
        );
        w2.parent_id = Some("field_0000".to_string());
        w2.export_value = Some("recurring".to_string());

        let fields = vec![group, w1, w2];
        let contexts = HashMap::from([
            ("field_0000".to_string(), ctx("", "")),
            ("field_0000_0".to_string(), ctx("", "")),
            ("field_0000_1".to_string(), ctx("", "")),
        ]);

        let output = decide(&fields, contexts, &store);
        assert_eq!(
            output.decision_for("field_0000").unwrap().new_name,
            "transaction_group"
        );
        assert_eq!(
            output.decision_for("field_0000_0").unwrap().new_name,
            "transaction_group__one-time"
        );
        assert_eq!(
            output.decision_for("field_0000_1").unwrap().new_name,
            "transaction_group__recurring"
        );
    }

    #[test]
    fn test_widget_without_export_gets_index_tail() {
        let store = TrainingStore::empty();
        let mut group = field("field_0000", "choices", FieldKind::RadioGroup);
        group.is_group_container = true;
        let mut w1 = field("field_0000_0", "choices", FieldKind::RadioWidget);
        w1.parent_id = Some("field_0000".to_string());
        w1.export_value = Some("***".to_string());

        let fields = vec![group, w1];
        let contexts = HashMap::from([
            ("field_0000".to_string(), ctx("", "")),
            ("field_0000_0".to_string(), ctx("", "")),
        ]);

        let output = decide(&fields, contexts, &store);
        let widget = output.decision_for("field_0000_0").unwrap();
        assert_eq!(widget.new_name, "choices__opt1");
    }

    #[test]
    fn test_fallback_for_label_less_field() {
        let store = TrainingStore::empty();
        let fields = vec![field("field_0007", "", FieldKind::Text)];
        let contexts = HashMap::from([("field_0007".to_string(), ctx("", ""))]);

        let output = decide(&fields, contexts, &store);
        let decision = output.decision_for("field_0007").unwrap();
        assert_eq!(decision.source, DecisionSource::Fallback);
        assert_eq!(decision.new_name, "form_text__field-0007");
        assert!(grammar::is_valid(&decision.new_name));
    }

    #[test]
    fn test_reserved_block_not_preserved() {
        let store = TrainingStore::load(vec![record("temp_field1", "whatever")]).unwrap();
        let fields = vec![field("field_0000", "temp_field1", FieldKind::Text)];
        let contexts = HashMap::from([("field_0000".to_string(), ctx("Phone:", ""))]);

        let output = decide(&fields, contexts, &store);
        let decision = output.decision_for("field_0000").unwrap();
        assert_ne!(decision.new_name, "temp_field1");
        assert!(!decision.new_name.starts_with("temp"));
    }

    #[test]
    fn test_all_names_unique_and_valid() {
        let store = TrainingStore::empty();
        let fields: Vec<Field> = (0..20)
            .map(|i| field(&format!("field_{:04}", i), "", FieldKind::Text))
            .collect();
        let contexts: HashMap<String, FieldContext> = fields
            .iter()
            .map(|f| (f.id.clone(), ctx("Amount", "")))
            .collect();

        let output = decide(&fields, contexts, &store);
        let mut seen = HashSet::new();
        for decision in &output.decisions {
            assert!(grammar::is_valid(&decision.new_name), "{}", decision.new_name);
            assert!(seen.insert(decision.new_name.clone()), "dup {}", decision.new_name);
        }
    }
}
