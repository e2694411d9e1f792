//! Modification planning.
//!
//! Translates the name decisions into an ordered, conflict-free mutation
//! plan over the PDF object graph: which objects get a new local /T
//! title, which dependent references (JavaScript actions, calculation
//! order, destinations) mention old names, which of those can be
//! rewritten mechanically, and how risky the whole plan is.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::fields::{Field, FieldKind};
use crate::naming::NameDecision;
use crate::object::{Object, ObjectRef};
use crate::parser::encode_text_string;
use crate::reader::PdfReader;

/// Safety-score penalty for plans above this edit count.
const LARGE_PLAN_EDITS: usize = 500;

/// A dependent reference that mentions an old field name.
#[derive(Debug, Clone, Serialize)]
pub struct DependentRef {
    /// Display form of the holding object's reference
    pub object_ref: String,
    /// Where the name appears (`javascript`, `calculation_order`, `destination`)
    pub kind: String,
    /// The old name that appears
    pub old_name: String,
    /// Whether the occurrence can be rewritten mechanically
    pub rewritable: bool,
}

/// One planned field rename.
#[derive(Debug, Clone, Serialize)]
pub struct FieldModification {
    /// Id of the renamed field
    pub field_id: String,
    /// Current fully qualified name
    pub old_name: String,
    /// Target fully qualified name
    pub new_name: String,
    /// The local /T value the object will hold
    pub new_local_title: String,
    /// Dependent references that mention the old name
    pub dependent_refs: Vec<DependentRef>,
    /// Object carrying the /T entry
    #[serde(skip)]
    pub object_ref: ObjectRef,
}

/// A detected plan-level conflict.
#[derive(Debug, Clone, Serialize)]
pub struct PlanConflict {
    /// Fields involved
    pub field_ids: Vec<String>,
    /// What clashes
    pub description: String,
}

/// The ordered, scored mutation plan.
#[derive(Debug, Clone)]
pub struct ModificationPlan {
    /// Title edits, parents before children
    pub edits: Vec<FieldModification>,
    /// Pre-rewritten dependent objects to write alongside the edits
    pub dependent_updates: Vec<(ObjectRef, Object)>,
    /// Expected post-apply fully qualified name per field id (all fields)
    pub expected_names: IndexMap<String, String>,
    /// Detected conflicts (sibling collisions)
    pub conflict_report: Vec<PlanConflict>,
    /// Hard blockers; a plan with any must not be applied
    pub blockers: Vec<String>,
    /// Pre-application risk summary in [0, 1]
    pub safety_score: f64,
}

impl ModificationPlan {
    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.dependent_updates.is_empty()
    }

    /// Whether the plan may be applied under the given safety threshold.
    pub fn is_applicable(&self, safety_threshold: f64) -> bool {
        self.blockers.is_empty() && self.safety_score >= safety_threshold
    }

    /// SHA-256 digest over the deterministic plan content, for the backup
    /// record.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for edit in &self.edits {
            hasher.update(edit.field_id.as_bytes());
            hasher.update(b"\x00");
            hasher.update(edit.old_name.as_bytes());
            hasher.update(b"\x00");
            hasher.update(edit.new_name.as_bytes());
            hasher.update(b"\x00");
        }
        for (obj_ref, _) in &self.dependent_updates {
            hasher.update(obj_ref.to_string().as_bytes());
            hasher.update(b"\x00");
        }
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// The planner.
pub struct ModificationPlanner;

impl ModificationPlanner {
    /// Build a plan from the extracted fields and their decisions.
    pub fn plan(
        reader: &mut PdfReader,
        fields: &[Field],
        decisions: &[NameDecision],
    ) -> Result<ModificationPlan> {
        let field_by_id: HashMap<&str, &Field> =
            fields.iter().map(|f| (f.id.as_str(), f)).collect();
        let decision_by_id: HashMap<&str, &NameDecision> =
            decisions.iter().map(|d| (d.field_id.as_str(), d)).collect();

        // Expected fully qualified names for every field
        let mut expected_names: IndexMap<String, String> = IndexMap::new();
        for field in fields {
            let expected = expected_name(field, &field_by_id, &decision_by_id);
            expected_names.insert(field.id.clone(), expected);
        }

        let mut blockers: Vec<String> = Vec::new();
        let mut conflict_report: Vec<PlanConflict> = Vec::new();

        // Title edits, in extraction order (parents precede children)
        let mut edits: Vec<FieldModification> = Vec::new();
        let mut renames: Vec<(String, String)> = Vec::new();
        for field in fields {
            let decision = match decision_by_id.get(field.id.as_str()) {
                Some(d) => d,
                None => continue,
            };
            if field.local_title.is_none() {
                // Widgets without /T derive their name from the group
                continue;
            }
            let new_local = decision.new_name.clone();
            if field.local_title.as_deref() == Some(new_local.as_str()) {
                continue;
            }
            let object_ref = match field.object_ref {
                Some(r) => r,
                None => {
                    blockers.push(format!(
                        "{}: field object is inlined and cannot be addressed",
                        field.id
                    ));
                    continue;
                },
            };
            let expected = expected_names
                .get(&field.id)
                .cloned()
                .unwrap_or_else(|| new_local.clone());
            renames.push((field.name.clone(), expected.clone()));
            edits.push(FieldModification {
                field_id: field.id.clone(),
                old_name: field.name.clone(),
                new_name: expected,
                new_local_title: new_local,
                dependent_refs: Vec::new(),
                object_ref,
            });
        }

        // Sibling collision check on the post-apply names
        detect_sibling_collisions(fields, &expected_names, &mut conflict_report, &mut blockers);

        // Dependent references across the object graph
        let dependent_updates =
            scan_dependents(reader, &renames, &mut edits, &mut blockers)?;

        // Safety score
        let planned_edits = edits.len() + dependent_updates.len();
        let export_changes = count_export_tail_changes(fields, &expected_names);
        let mut safety_score = if planned_edits == 0 {
            1.0
        } else {
            1.0 - blockers.len() as f64 / planned_edits as f64
        };
        if planned_edits > LARGE_PLAN_EDITS {
            safety_score -= 0.1;
        }
        safety_score -= 0.05 * export_changes as f64;
        let safety_score = safety_score.clamp(0.0, 1.0);

        log::info!(
            "Planned {} edits, {} dependent updates, {} blockers, safety {:.2}",
            edits.len(),
            dependent_updates.len(),
            blockers.len(),
            safety_score
        );

        Ok(ModificationPlan {
            edits,
            dependent_updates,
            expected_names,
            conflict_report,
            blockers,
            safety_score,
        })
    }
}

/// Post-apply fully qualified name of a field.
///
/// Fields with a /T get their decision name joined below the parent's
/// expected name; radio widgets derive `group__tail`; undecided fields
/// keep their current name.
fn expected_name(
    field: &Field,
    field_by_id: &HashMap<&str, &Field>,
    decision_by_id: &HashMap<&str, &NameDecision>,
) -> String {
    let decision = decision_by_id.get(field.id.as_str());

    let parent = field
        .parent_id
        .as_deref()
        .and_then(|pid| field_by_id.get(pid));

    if field.local_title.is_some() {
        let local = decision
            .map(|d| d.new_name.clone())
            .unwrap_or_else(|| field.local_title.clone().unwrap_or_default());
        return match parent {
            Some(parent_field) => {
                let parent_expected =
                    expected_name(parent_field, field_by_id, decision_by_id);
                if parent_expected.is_empty() {
                    local
                } else {
                    format!("{}.{}", parent_expected, local)
                }
            },
            None => local,
        };
    }

    // No /T of its own: the name follows the parent
    if let Some(parent_field) = parent {
        let parent_expected = expected_name(parent_field, field_by_id, decision_by_id);
        if field.kind == FieldKind::RadioWidget {
            // Tail from the decision (group prefix is the decision's view
            // of the group), else from the current name
            if let Some(d) = decision {
                if let Some((_, tail)) = d.new_name.rsplit_once("__") {
                    return format!("{}__{}", parent_expected, tail);
                }
            }
            if let Some(export) = &field.export_value {
                if let Some(tail) =
                    crate::naming::grammar::transliterate_segment(export)
                {
                    return format!("{}__{}", parent_expected, tail);
                }
            }
        }
        return parent_expected;
    }

    field.name.clone()
}

/// Flag duplicate post-apply names among siblings sharing a parent.
fn detect_sibling_collisions(
    fields: &[Field],
    expected_names: &IndexMap<String, String>,
    conflict_report: &mut Vec<PlanConflict>,
    blockers: &mut Vec<String>,
) {
    let mut groups: HashMap<Option<&str>, HashMap<&str, Vec<&str>>> = HashMap::new();
    for field in fields {
        if let Some(expected) = expected_names.get(&field.id) {
            if expected.is_empty() {
                continue;
            }
            groups
                .entry(field.parent_id.as_deref())
                .or_default()
                .entry(expected.as_str())
                .or_default()
                .push(field.id.as_str());
        }
    }

    for (parent, by_name) in groups {
        for (name, ids) in by_name {
            if ids.len() > 1 {
                let description = format!(
                    "siblings under {} would share the name '{}'",
                    parent.unwrap_or("the form root"),
                    name
                );
                blockers.push(description.clone());
                conflict_report.push(PlanConflict {
                    field_ids: ids.iter().map(|s| s.to_string()).collect(),
                    description,
                });
            }
        }
    }
}

/// Scan every object for strings that mention an old fully qualified
/// name in a JavaScript action, a calculation order array, or a
/// destination, and pre-rewrite the rewritable ones.
fn scan_dependents(
    reader: &mut PdfReader,
    renames: &[(String, String)],
    edits: &mut Vec<FieldModification>,
    blockers: &mut Vec<String>,
) -> Result<Vec<(ObjectRef, Object)>> {
    if renames.is_empty() {
        return Ok(Vec::new());
    }

    let mut updates = Vec::new();
    for obj_ref in reader.all_refs() {
        let obj = match reader.resolve(obj_ref) {
            Ok(o) => o,
            Err(_) => continue,
        };

        let mut found: Vec<DependentRef> = Vec::new();
        let rewritten = rewrite_object(&obj, renames, obj_ref, None, &mut found);

        if found.is_empty() {
            continue;
        }

        let all_rewritable = found.iter().all(|d| d.rewritable);
        if !all_rewritable {
            for dep in found.iter().filter(|d| !d.rewritable) {
                blockers.push(format!(
                    "{} mentions '{}' in a {} that cannot be rewritten safely",
                    dep.object_ref, dep.old_name, dep.kind
                ));
            }
        } else if let Some(new_obj) = rewritten {
            updates.push((obj_ref, new_obj));
        }

        // Attach the dependents to the edits that renamed those fields
        for dep in found {
            if let Some(edit) = edits.iter_mut().find(|e| e.old_name == dep.old_name) {
                edit.dependent_refs.push(dep);
            }
        }
    }

    Ok(updates)
}

/// Rewrite old-name mentions inside an object. Returns the rewritten
/// object when anything changed; appends every discovery to `found`.
fn rewrite_object(
    obj: &Object,
    renames: &[(String, String)],
    holder: ObjectRef,
    context_key: Option<&str>,
    found: &mut Vec<DependentRef>,
) -> Option<Object> {
    match obj {
        Object::String(bytes) => {
            let text = crate::parser::decode_text_string(bytes);
            let mentions: Vec<&(String, String)> = renames
                .iter()
                .filter(|(old, _)| !old.is_empty() && text.contains(old.as_str()))
                .collect();
            if mentions.is_empty() {
                return None;
            }

            let kind = match context_key {
                Some("JS") => "javascript",
                Some("CO") => "calculation_order",
                Some("Dest") | Some("D") => "destination",
                _ => return None,
            };

            let mut rewritten = text.clone();
            let mut all_ok = true;
            for (old, new) in &mentions {
                let (ok, out) = rewrite_mentions(&rewritten, old, new, kind);
                all_ok &= ok;
                rewritten = out;
                found.push(DependentRef {
                    object_ref: holder.to_string(),
                    kind: kind.to_string(),
                    old_name: old.clone(),
                    rewritable: ok,
                });
            }

            (all_ok && rewritten != text)
                .then(|| Object::String(encode_text_string(&rewritten)))
        },
        Object::Array(items) => {
            let mut changed = false;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match rewrite_object(item, renames, holder, context_key, found) {
                    Some(new_item) => {
                        changed = true;
                        out.push(new_item);
                    },
                    None => out.push(item.clone()),
                }
            }
            changed.then_some(Object::Array(out))
        },
        Object::Dictionary(dict) => {
            let mut changed = false;
            let mut out = dict.clone();
            for (key, value) in dict {
                if let Some(new_value) =
                    rewrite_object(value, renames, holder, Some(key.as_str()), found)
                {
                    changed = true;
                    out.insert(key.clone(), new_value);
                }
            }
            changed.then_some(Object::Dictionary(out))
        },
        _ => None,
    }
}

/// Rewrite mentions of `old` in `text`.
///
/// In JavaScript only exact quoted occurrences (`"old"` / `'old'`) are
/// mechanical; anything else is a blocker. Calculation-order and
/// destination strings must equal the old name outright.
fn rewrite_mentions(text: &str, old: &str, new: &str, kind: &str) -> (bool, String) {
    if kind != "javascript" {
        return if text == old {
            (true, new.to_string())
        } else {
            (false, text.to_string())
        };
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut ok = true;
    while let Some(pos) = rest.find(old) {
        let before = &rest[..pos];
        let after = &rest[pos + old.len()..];
        let quote_before = before.chars().last();
        let quote_after = after.chars().next();
        let quoted = matches!(
            (quote_before, quote_after),
            (Some('"'), Some('"')) | (Some('\''), Some('\''))
        );
        out.push_str(before);
        if quoted {
            out.push_str(new);
        } else {
            ok = false;
            out.push_str(old);
        }
        rest = after;
    }
    out.push_str(rest);
    (ok, out)
}

/// Widgets whose export-derived tail changes under the plan.
fn count_export_tail_changes(
    fields: &[Field],
    expected_names: &IndexMap<String, String>,
) -> usize {
    fields
        .iter()
        .filter(|f| f.kind == FieldKind::RadioWidget)
        .filter(|f| {
            let old_tail = f.name.rsplit_once("__").map(|(_, t)| t);
            let new_tail = expected_names
                .get(&f.id)
                .and_then(|n| n.rsplit_once("__").map(|(_, t)| t.to_string()));
            match (old_tail, new_tail) {
                (Some(old), Some(new)) => old != new,
                (None, Some(_)) | (Some(_), None) => true,
                (None, None) => false,
            }
        })
        .count()
}
