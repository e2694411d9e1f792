//! Safe modification engine.
//!
//! Applies a [`ModificationPlan`] end to end: exclusive path lock,
//! mandatory backup, incremental-update apply, post-apply validation by
//! re-extraction, and rollback on any validation failure. The original
//! bytes are never modified in place; the output is a new file whose
//! appended xref section shadows the mutated objects.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;

use crate::backup::BackupRecord;
use crate::config::ProcessOptions;
use crate::error::{Error, Result};
use crate::fields::{Field, FieldExtractor};
use crate::object::{Object, ObjectRef};
use crate::parser::encode_text_string;
use crate::plan::ModificationPlan;
use crate::reader::PdfReader;

/// Exclusive advisory lock on a source path.
///
/// Created with `create_new` so a second run against the same file fails
/// fast; the lock file is removed on every exit path via `Drop`.
pub struct PathLock {
    lock_path: PathBuf,
}

impl PathLock {
    /// Acquire the lock, failing if another run holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let lock_path = lock_path_for(path);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => {
                log::debug!("Acquired lock {}", lock_path.display());
                Ok(Self { lock_path })
            },
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    format!(
                        "{} is locked by a concurrent run (remove {} if stale)",
                        path.display(),
                        lock_path.display()
                    ),
                )))
            },
            Err(e) => Err(Error::Io(e)),
        }
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            log::warn!("Failed to remove lock {}: {}", self.lock_path.display(), e);
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}

/// Wall-clock budget for one document run.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    started: Instant,
    budget: Duration,
}

impl TimeBudget {
    /// Start the clock with a budget in seconds.
    pub fn start(budget_seconds: u64) -> Self {
        Self {
            started: Instant::now(),
            budget: Duration::from_secs(budget_seconds),
        }
    }

    /// Fail with `Timeout` if the budget is spent.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.started.elapsed() > self.budget {
            Err(Error::Timeout {
                budget_secs: self.budget.as_secs(),
                stage: stage.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Overall integrity verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    /// All checks passed
    Safe,
    /// Non-fatal deviations were observed
    Warning,
    /// Validation failed and the run was rolled back
    Critical,
}

/// One post-apply check.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityCheck {
    /// Check name (`field_ids_unchanged`, `names_match`, ...)
    pub name: String,
    /// Whether it passed
    pub passed: bool,
    /// Field ids implicated in a failure
    pub offending_field_ids: Vec<String>,
}

/// The full post-apply validation report.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    /// Overall status
    pub status: IntegrityStatus,
    /// Individual checks, in execution order
    pub checks: Vec<IntegrityCheck>,
}

impl IntegrityReport {
    fn failed(&self) -> bool {
        self.checks.iter().any(|c| !c.passed)
    }

    fn offending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .checks
            .iter()
            .flat_map(|c| c.offending_field_ids.iter().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Result of a successful apply.
#[derive(Debug)]
pub struct ApplyOutcome {
    /// Path of the modified document
    pub modified_path: PathBuf,
    /// The backup taken before mutation
    pub backup: BackupRecord,
    /// Post-apply validation report
    pub integrity: IntegrityReport,
}

/// The safe modifier.
pub struct SafeModifier<'a> {
    options: &'a ProcessOptions,
}

impl<'a> SafeModifier<'a> {
    /// Create a modifier with the run's options.
    pub fn new(options: &'a ProcessOptions) -> Self {
        Self { options }
    }

    /// Apply the plan, writing the modified document to `out_path`.
    ///
    /// Protocol: safety gate → lock → backup → apply → validate →
    /// commit or roll back. A plan with blockers or a safety score under
    /// the configured threshold is rejected before any mutation.
    pub fn apply(
        &self,
        reader: &mut PdfReader,
        fields_before: &[Field],
        plan: &ModificationPlan,
        out_path: &Path,
        budget: &TimeBudget,
    ) -> Result<ApplyOutcome> {
        if !plan.blockers.is_empty() {
            return Err(Error::PlanBlocker(plan.blockers.join("; ")));
        }
        if plan.safety_score < self.options.safety_threshold {
            return Err(Error::PlanBlocker(format!(
                "safety score {:.2} below threshold {:.2}",
                plan.safety_score, self.options.safety_threshold
            )));
        }

        let source_path = reader.path().to_path_buf();
        let _lock = PathLock::acquire(&source_path)?;
        budget.check("backup")?;

        let backup_dir = out_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&backup_dir)?;
        let backup = BackupRecord::create(&source_path, &backup_dir, &plan.digest())?;

        let result = self.apply_and_validate(reader, fields_before, plan, out_path, budget);

        match result {
            Ok(integrity) if !integrity.failed() => Ok(ApplyOutcome {
                modified_path: out_path.to_path_buf(),
                backup,
                integrity,
            }),
            Ok(integrity) => {
                self.rollback(&backup, out_path);
                Err(Error::ValidationFailed {
                    reason: "post-apply validation failed".to_string(),
                    field_ids: integrity.offending_ids(),
                })
            },
            Err(e) => {
                self.rollback(&backup, out_path);
                Err(e)
            },
        }
    }

    fn apply_and_validate(
        &self,
        reader: &mut PdfReader,
        fields_before: &[Field],
        plan: &ModificationPlan,
        out_path: &Path,
        budget: &TimeBudget,
    ) -> Result<IntegrityReport> {
        let mut updates: IndexMap<ObjectRef, Object> = IndexMap::new();
        for (obj_ref, obj) in &plan.dependent_updates {
            updates.insert(*obj_ref, obj.clone());
        }

        for edit in &plan.edits {
            budget.check("apply")?;
            let mut obj = match updates.get(&edit.object_ref) {
                Some(pending) => pending.clone(),
                None => reader.resolve(edit.object_ref)?,
            };
            let dict = obj.as_dict_mut().ok_or_else(|| {
                Error::InvalidPdf(format!(
                    "field object {} for {} is not a dictionary",
                    edit.object_ref, edit.field_id
                ))
            })?;
            dict.insert(
                "T".to_string(),
                Object::String(encode_text_string(&edit.new_local_title)),
            );
            updates.insert(edit.object_ref, obj);
        }

        budget.check("write")?;
        let update_list: Vec<(ObjectRef, Object)> =
            updates.into_iter().collect();
        reader.write_incremental(&update_list, out_path)?;

        budget.check("validate")?;
        self.validate(fields_before, plan, out_path)
    }

    /// Re-open the output, re-extract, and compare against the plan.
    fn validate(
        &self,
        fields_before: &[Field],
        plan: &ModificationPlan,
        out_path: &Path,
    ) -> Result<IntegrityReport> {
        let mut reopened =
            PdfReader::open(out_path, self.options.passphrase.as_deref())?;
        let after = FieldExtractor::extract(&mut reopened, self.options.large_form_threshold)?;

        let before_by_id: HashMap<&str, &Field> =
            fields_before.iter().map(|f| (f.id.as_str(), f)).collect();
        let after_by_id: HashMap<&str, &Field> =
            after.fields.iter().map(|f| (f.id.as_str(), f)).collect();

        let mut checks = Vec::new();

        // (a) the set of field ids is unchanged
        let before_ids: HashSet<&str> = before_by_id.keys().copied().collect();
        let after_ids: HashSet<&str> = after_by_id.keys().copied().collect();
        let missing: Vec<String> = before_ids
            .difference(&after_ids)
            .chain(after_ids.difference(&before_ids))
            .map(|s| s.to_string())
            .collect();
        checks.push(IntegrityCheck {
            name: "field_ids_unchanged".to_string(),
            passed: missing.is_empty(),
            offending_field_ids: missing,
        });

        // (b) every field's name equals the planned name
        let mut name_mismatches = Vec::new();
        for (field_id, expected) in &plan.expected_names {
            match after_by_id.get(field_id.as_str()) {
                Some(field) if &field.name == expected => {},
                Some(_) | None => name_mismatches.push(field_id.clone()),
            }
        }
        checks.push(IntegrityCheck {
            name: "names_match_plan".to_string(),
            passed: name_mismatches.is_empty(),
            offending_field_ids: name_mismatches,
        });

        // (c) parent/child edges are preserved
        let mut edge_breaks = Vec::new();
        for field in fields_before {
            match after_by_id.get(field.id.as_str()) {
                Some(after_field)
                    if after_field.parent_id == field.parent_id
                        && after_field.child_ids == field.child_ids => {},
                _ => edge_breaks.push(field.id.clone()),
            }
        }
        checks.push(IntegrityCheck {
            name: "hierarchy_preserved".to_string(),
            passed: edge_breaks.is_empty(),
            offending_field_ids: edge_breaks,
        });

        // (d) widget rectangles and pages are preserved
        let mut geometry_breaks = Vec::new();
        for field in fields_before.iter().filter(|f| !f.is_group_container) {
            if let Some(after_field) = after_by_id.get(field.id.as_str()) {
                let rect_same = match (field.rect, after_field.rect) {
                    (Some(a), Some(b)) => a
                        .iter()
                        .zip(b.iter())
                        .all(|(x, y)| (x - y).abs() < 0.001),
                    (None, None) => true,
                    _ => false,
                };
                if !rect_same || after_field.page != field.page {
                    geometry_breaks.push(field.id.clone());
                }
            }
        }
        checks.push(IntegrityCheck {
            name: "geometry_preserved".to_string(),
            passed: geometry_breaks.is_empty(),
            offending_field_ids: geometry_breaks,
        });

        // (e) the AcroForm tree root is still reachable
        let acroform_reachable = fields_before.is_empty() || !after.fields.is_empty();
        checks.push(IntegrityCheck {
            name: "acroform_reachable".to_string(),
            passed: acroform_reachable,
            offending_field_ids: Vec::new(),
        });

        let failed = checks.iter().any(|c| !c.passed);
        let status = if failed {
            IntegrityStatus::Critical
        } else if after.warnings.is_empty() {
            IntegrityStatus::Safe
        } else {
            IntegrityStatus::Warning
        };

        log::info!("Post-apply validation: {:?}", status);
        Ok(IntegrityReport { status, checks })
    }

    /// Restore the source and discard the output.
    fn rollback(&self, backup: &BackupRecord, out_path: &Path) {
        if let Err(e) = backup.restore() {
            log::error!("Rollback restore failed: {}", e);
        }
        if out_path.exists() {
            if let Err(e) = fs::remove_file(out_path) {
                log::error!("Failed to remove staged output {}: {}", out_path.display(), e);
            }
        }
        log::warn!("Run rolled back; source restored from backup {}", backup.backup_id);
    }
}
