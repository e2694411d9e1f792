//! High-level invocation surface.
//!
//! The functions external collaborators (CLIs, servers, batch wrappers)
//! call: [`analyze`], [`plan`], [`apply`], [`rollback`], and the bundled
//! [`process`]. Argument parsing, configuration files, and interactive
//! review stay outside; this module only exposes the operations and the
//! exit-status mapping a wrapper needs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::backup;
use crate::config::ProcessOptions;
use crate::context::{ContextExtractor, FieldContext};
use crate::error::{Error, Result};
use crate::fields::{ExtractionWarning, Field, FieldExtractor};
use crate::modify::{SafeModifier, TimeBudget};
use crate::naming::{NameDecision, NameEngine};
use crate::output::{self, DocumentSummary, OutputArtifacts, ProcessingReport};
use crate::plan::{ModificationPlan, ModificationPlanner};
use crate::reader::PdfReader;
use crate::training::TrainingStore;

/// Exit codes for any CLI wrapping this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Success
    Success,
    /// Unspecified error
    Failure,
    /// Input invalid or not a form
    InvalidInput,
    /// Encryption failure
    Encryption,
    /// Planning blocker
    PlanningBlocked,
    /// Modification rolled back
    RolledBack,
    /// Time budget exceeded
    TimedOut,
}

impl ExitStatus {
    /// The numeric process exit code.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
            ExitStatus::InvalidInput => 2,
            ExitStatus::Encryption => 3,
            ExitStatus::PlanningBlocked => 4,
            ExitStatus::RolledBack => 5,
            ExitStatus::TimedOut => 6,
        }
    }

    /// Classify an error into its exit status.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::InvalidHeader(_)
            | Error::InvalidXref
            | Error::InvalidPdf(_)
            | Error::ParseError { .. }
            | Error::ObjectNotFound(..)
            | Error::InvalidObjectType { .. }
            | Error::UnexpectedEof
            | Error::Decode(_)
            | Error::UnsupportedFilter(_)
            | Error::CircularReference(_)
            | Error::RecursionLimitExceeded(_)
            | Error::Utf8Error(_) => ExitStatus::InvalidInput,
            Error::Encrypted(_) => ExitStatus::Encryption,
            Error::PlanBlocker(_) => ExitStatus::PlanningBlocked,
            Error::ValidationFailed { .. } => ExitStatus::RolledBack,
            Error::Timeout { .. } => ExitStatus::TimedOut,
            Error::TrainingCorrupt(_)
            | Error::NameGrammar(_)
            | Error::BackupFailure(_)
            | Error::Io(_) => ExitStatus::Failure,
        }
    }
}

/// Everything the analysis phase produces.
#[derive(Debug)]
pub struct AnalysisResult {
    /// Document metadata
    pub metadata: DocumentSummary,
    /// Extracted fields in document order
    pub fields: Vec<Field>,
    /// Context per field id
    pub contexts: HashMap<String, FieldContext>,
    /// Extraction warnings
    pub warnings: Vec<ExtractionWarning>,
}

/// Result of the bundled [`process`] run.
#[derive(Debug)]
pub struct ProcessOutcome {
    /// Paths of the written artifacts
    pub artifacts: OutputArtifacts,
    /// The full processing report (also written to disk)
    pub report: ProcessingReport,
    /// The decisions that were applied
    pub decisions: Vec<NameDecision>,
}

/// Parse a document and extract fields plus contexts. No mutation.
pub fn analyze(path: impl AsRef<Path>, options: &ProcessOptions) -> Result<AnalysisResult> {
    let path = path.as_ref();
    let mut reader = PdfReader::open(path, options.passphrase.as_deref())?;
    let extraction = FieldExtractor::extract(&mut reader, options.large_form_threshold)?;
    let contexts = ContextExtractor::new().extract_all(&mut reader, &extraction.fields)?;

    let (major, minor) = reader.version();
    Ok(AnalysisResult {
        metadata: DocumentSummary {
            path: path.to_path_buf(),
            version: format!("{}.{}", major, minor),
            page_count: reader.pages().len(),
            field_count: extraction.fields.len(),
            encrypted: reader.is_encrypted(),
        },
        fields: extraction.fields,
        contexts,
        warnings: extraction.warnings,
    })
}

/// Build a modification plan from externally supplied decisions.
pub fn plan(
    path: impl AsRef<Path>,
    decisions: &[NameDecision],
    options: &ProcessOptions,
) -> Result<ModificationPlan> {
    let path = path.as_ref();
    let mut reader = PdfReader::open(path, options.passphrase.as_deref())?;
    let extraction = FieldExtractor::extract(&mut reader, options.large_form_threshold)?;
    ModificationPlanner::plan(&mut reader, &extraction.fields, decisions)
}

/// Apply a plan and emit the mapping and report artifacts.
///
/// The report's per-field decision details are only available through
/// [`process`]; this entry point records the plan's renames without the
/// generation evidence.
pub fn apply(
    path: impl AsRef<Path>,
    plan: &ModificationPlan,
    options: &ProcessOptions,
) -> Result<OutputArtifacts> {
    let path = path.as_ref();
    let budget = TimeBudget::start(options.time_budget_seconds);

    let mut reader = PdfReader::open(path, options.passphrase.as_deref())?;
    let extraction = FieldExtractor::extract(&mut reader, options.large_form_threshold)?;
    let contexts = ContextExtractor::new().extract_all(&mut reader, &extraction.fields)?;

    let mut artifacts = output::artifact_paths(path, options.output_dir.as_deref());
    if let Some(dir) = &options.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let integrity = if plan.is_empty() {
        std::fs::copy(path, &artifacts.modified_path)?;
        None
    } else {
        let outcome = SafeModifier::new(options).apply(
            &mut reader,
            &extraction.fields,
            plan,
            &artifacts.modified_path,
            &budget,
        )?;
        artifacts.backup_id = Some(outcome.backup.backup_id.clone());
        Some(outcome.integrity)
    };

    budget.check("emit")?;
    let (major, minor) = reader.version();
    let summary = DocumentSummary {
        path: path.to_path_buf(),
        version: format!("{}.{}", major, minor),
        page_count: reader.pages().len(),
        field_count: extraction.fields.len(),
        encrypted: reader.is_encrypted(),
    };
    let timestamp = chrono::Utc::now().to_rfc3339();
    output::write_mapping_csv(
        &artifacts.mapping_path,
        &extraction.fields,
        &contexts,
        plan,
        &timestamp,
    )?;
    ProcessingReport::assemble(
        summary,
        &extraction.fields,
        &contexts,
        &[],
        plan,
        &extraction.warnings,
        &[],
        integrity,
    )
    .write(&artifacts.report_path)?;

    Ok(artifacts)
}

/// Restore a document from a backup id, searching the given directory's
/// backup sidecars.
pub fn rollback(dir: impl AsRef<Path>, backup_id: &str) -> Result<PathBuf> {
    let record = backup::find_record(dir.as_ref(), backup_id)?;
    record.restore()
}

/// The bundled pipeline: analyze → decide → plan → apply → emit.
///
/// Fails with an invalid-input error when the document carries no form
/// fields, with a planning error when the plan has blockers or scores
/// under the safety threshold, and with a rolled-back error when
/// post-apply validation fails.
pub fn process(
    path: impl AsRef<Path>,
    training: &TrainingStore,
    options: &ProcessOptions,
) -> Result<ProcessOutcome> {
    let path = path.as_ref();
    let budget = TimeBudget::start(options.time_budget_seconds);

    let mut reader = PdfReader::open(path, options.passphrase.as_deref())?;
    budget.check("extract")?;
    let extraction = FieldExtractor::extract(&mut reader, options.large_form_threshold)?;
    if extraction.fields.is_empty() {
        return Err(Error::InvalidPdf(format!(
            "{} has no AcroForm fields",
            path.display()
        )));
    }

    budget.check("context")?;
    let contexts = ContextExtractor::new().extract_all(&mut reader, &extraction.fields)?;

    budget.check("decide")?;
    let engine = NameEngine::new(training, options);
    let engine_output = engine.decide_all(&extraction.fields, &contexts);

    budget.check("plan")?;
    let plan =
        ModificationPlanner::plan(&mut reader, &extraction.fields, &engine_output.decisions)?;
    if !plan.blockers.is_empty() {
        return Err(Error::PlanBlocker(plan.blockers.join("; ")));
    }
    if !plan.is_empty() && plan.safety_score < options.safety_threshold {
        return Err(Error::PlanBlocker(format!(
            "safety score {:.2} below threshold {:.2}",
            plan.safety_score, options.safety_threshold
        )));
    }

    let mut artifacts = output::artifact_paths(path, options.output_dir.as_deref());
    if let Some(dir) = &options.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let integrity = if plan.is_empty() {
        log::info!("Plan is empty; copying source to {}", artifacts.modified_path.display());
        std::fs::copy(path, &artifacts.modified_path)?;
        None
    } else {
        let outcome = SafeModifier::new(options).apply(
            &mut reader,
            &extraction.fields,
            &plan,
            &artifacts.modified_path,
            &budget,
        )?;
        artifacts.backup_id = Some(outcome.backup.backup_id.clone());
        Some(outcome.integrity)
    };

    budget.check("emit")?;
    let (major, minor) = reader.version();
    let summary = DocumentSummary {
        path: path.to_path_buf(),
        version: format!("{}.{}", major, minor),
        page_count: reader.pages().len(),
        field_count: extraction.fields.len(),
        encrypted: reader.is_encrypted(),
    };
    let timestamp = chrono::Utc::now().to_rfc3339();
    output::write_mapping_csv(
        &artifacts.mapping_path,
        &extraction.fields,
        &contexts,
        &plan,
        &timestamp,
    )?;
    let report = ProcessingReport::assemble(
        summary,
        &extraction.fields,
        &contexts,
        &engine_output.decisions,
        &plan,
        &extraction.warnings,
        &engine_output.warnings,
        integrity,
    );
    report.write(&artifacts.report_path)?;

    Ok(ProcessOutcome {
        artifacts,
        report,
        decisions: engine_output.decisions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(
            ExitStatus::from_error(&Error::InvalidPdf("x".to_string())).code(),
            2
        );
        assert_eq!(
            ExitStatus::from_error(&Error::Encrypted("x".to_string())).code(),
            3
        );
        assert_eq!(
            ExitStatus::from_error(&Error::PlanBlocker("x".to_string())).code(),
            4
        );
        assert_eq!(
            ExitStatus::from_error(&Error::ValidationFailed {
                reason: "x".to_string(),
                field_ids: Vec::new()
            })
            .code(),
            5
        );
        assert_eq!(
            ExitStatus::from_error(&Error::Timeout {
                budget_secs: 1,
                stage: "s".to_string()
            })
            .code(),
            6
        );
        assert_eq!(
            ExitStatus::from_error(&Error::BackupFailure("x".to_string())).code(),
            1
        );
    }
}
