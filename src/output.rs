//! Output artifacts.
//!
//! Per processed document: the modified PDF (written by the safe
//! modifier), the per-field mapping table whose column set is bit-exact
//! with the historical training CSV schema, and the structured JSON
//! processing report.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::context::FieldContext;
use crate::error::Result;
use crate::fields::{ExtractionWarning, Field, FieldKind};
use crate::modify::IntegrityReport;
use crate::naming::grammar::transliterate_segment;
use crate::naming::{NameDecision, NamingWarning};
use crate::plan::ModificationPlan;

/// Mapping CSV header, in contractual order.
const MAPPING_COLUMNS: [&str; 27] = [
    "ID",
    "Created at",
    "Updated at",
    "Label",
    "Description",
    "Form ID",
    "Order",
    "Api name",
    "UUID",
    "Type",
    "Parent ID",
    "Delete Parent ID",
    "Acrofieldlabel",
    "Section ID",
    "Excluded",
    "Partial label",
    "Custom",
    "Show group label",
    "Height",
    "Page",
    "Width",
    "X",
    "Y",
    "Unified field ID",
    "Delete",
    "Hidden",
    "Toggle description",
];

/// Paths of the artifacts one run produces.
#[derive(Debug, Clone, Serialize)]
pub struct OutputArtifacts {
    /// The modified PDF
    pub modified_path: PathBuf,
    /// The per-field mapping table
    pub mapping_path: PathBuf,
    /// The JSON processing report
    pub report_path: PathBuf,
    /// Id of the backup taken before mutation, if one was taken
    pub backup_id: Option<String>,
}

/// Compute the artifact paths for an input, next to it or in `out_dir`.
pub fn artifact_paths(input: &Path, out_dir: Option<&Path>) -> OutputArtifacts {
    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");

    OutputArtifacts {
        modified_path: dir.join(format!("{}_parsed.pdf", stem)),
        mapping_path: dir.join(format!("{}_mapping.csv", stem)),
        report_path: dir.join(format!("{}_report.json", stem)),
        backup_id: None,
    }
}

/// Document-level summary for the report.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    /// Source path
    pub path: PathBuf,
    /// PDF version, `major.minor`
    pub version: String,
    /// Page count
    pub page_count: usize,
    /// Extracted field count
    pub field_count: usize,
    /// Whether the document was encrypted
    pub encrypted: bool,
}

/// Modification status of one field in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ModificationStatus {
    /// Whether the plan contains a title edit for this field
    pub planned: bool,
    /// The name before processing
    pub old_name: String,
    /// The name after processing (current name when unchanged)
    pub new_name: String,
}

/// Per-field entry of the report.
#[derive(Debug, Clone, Serialize)]
pub struct FieldReport {
    /// Field id
    pub id: String,
    /// Fully qualified name before processing
    pub original_name: String,
    /// Field kind token
    pub kind: FieldKind,
    /// The decision, absent for fields that are not renaming targets
    pub decision: Option<NameDecision>,
    /// The extracted context
    pub context: Option<FieldContext>,
    /// What happened to the field
    pub modification: ModificationStatus,
}

/// One warning entry of the report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportWarning {
    /// Producing subsystem (`extraction`, `naming`)
    pub source: String,
    /// Human-readable message
    pub message: String,
}

/// The structured processing report.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    /// Document summary
    pub document: DocumentSummary,
    /// Per-field details, in extraction order
    pub fields: Vec<FieldReport>,
    /// Collected warnings
    pub warnings: Vec<ReportWarning>,
    /// The plan's safety score
    pub safety_score: f64,
    /// Post-apply validation report, when an apply ran
    pub integrity: Option<IntegrityReport>,
}

impl ProcessingReport {
    /// Assemble the report from the run's intermediate products.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        document: DocumentSummary,
        fields: &[Field],
        contexts: &HashMap<String, FieldContext>,
        decisions: &[NameDecision],
        plan: &ModificationPlan,
        extraction_warnings: &[ExtractionWarning],
        naming_warnings: &[NamingWarning],
        integrity: Option<IntegrityReport>,
    ) -> Self {
        let decision_by_id: HashMap<&str, &NameDecision> =
            decisions.iter().map(|d| (d.field_id.as_str(), d)).collect();
        let planned_ids: std::collections::HashSet<&str> =
            plan.edits.iter().map(|e| e.field_id.as_str()).collect();

        let field_reports = fields
            .iter()
            .map(|field| {
                let decision = decision_by_id.get(field.id.as_str()).map(|d| (*d).clone());
                let new_name = plan
                    .expected_names
                    .get(&field.id)
                    .cloned()
                    .unwrap_or_else(|| field.name.clone());
                FieldReport {
                    id: field.id.clone(),
                    original_name: field.name.clone(),
                    kind: field.kind,
                    decision,
                    context: contexts.get(&field.id).cloned(),
                    modification: ModificationStatus {
                        planned: planned_ids.contains(field.id.as_str()),
                        old_name: field.name.clone(),
                        new_name,
                    },
                }
            })
            .collect();

        let warnings = extraction_warnings
            .iter()
            .map(|w| ReportWarning {
                source: "extraction".to_string(),
                message: w.to_string(),
            })
            .chain(naming_warnings.iter().map(|w| ReportWarning {
                source: "naming".to_string(),
                message: w.to_string(),
            }))
            .collect();

        Self {
            document,
            fields: field_reports,
            warnings,
            safety_score: plan.safety_score,
            integrity,
        }
    }

    /// Write the report as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::Error::InvalidPdf(format!("report serialization: {}", e)))?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

/// Write the mapping CSV: UTF-8 with BOM, LF record terminator, strings
/// quoted only when needed, booleans as TRUE/FALSE, timestamps ISO-8601
/// UTC, `Api name` carrying the final BEM name.
pub fn write_mapping_csv(
    path: &Path,
    fields: &[Field],
    contexts: &HashMap<String, FieldContext>,
    plan: &ModificationPlan,
    timestamp: &str,
) -> Result<()> {
    let row_id_by_field: HashMap<&str, usize> = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.id.as_str(), i + 1))
        .collect();

    let mut file = File::create(path)?;
    file.write_all(b"\xEF\xBB\xBF")?;

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);

    writer
        .write_record(MAPPING_COLUMNS)
        .map_err(csv_error)?;

    for (index, field) in fields.iter().enumerate() {
        let context = contexts.get(&field.id);
        let api_name = plan
            .expected_names
            .get(&field.id)
            .cloned()
            .unwrap_or_else(|| field.name.clone());
        let parent_row = field
            .parent_id
            .as_deref()
            .and_then(|pid| row_id_by_field.get(pid))
            .map(|row| row.to_string())
            .unwrap_or_default();
        let section_id = context
            .and_then(|c| transliterate_segment(&c.section_header))
            .unwrap_or_default();
        let [x, y, width, height] = field
            .rect
            .map(|[x1, y1, x2, y2]| [x1, y1, x2 - x1, y2 - y1])
            .unwrap_or([0.0, 0.0, 0.0, 0.0]);

        let record = [
            (index + 1).to_string(),
            timestamp.to_string(),
            timestamp.to_string(),
            context.map(|c| c.label.clone()).unwrap_or_default(),
            field.tooltip.clone().unwrap_or_default(),
            String::new(),
            (index + 1).to_string(),
            api_name,
            uuid::Uuid::new_v4().to_string(),
            field.kind.token().to_string(),
            parent_row,
            String::new(),
            field.name.clone(),
            section_id,
            "FALSE".to_string(),
            "FALSE".to_string(),
            "FALSE".to_string(),
            bool_cell(field.is_group_container),
            number_cell(height),
            field.page.map(|p| p.to_string()).unwrap_or_default(),
            number_cell(width),
            number_cell(x),
            number_cell(y),
            String::new(),
            "FALSE".to_string(),
            "FALSE".to_string(),
            "FALSE".to_string(),
        ];
        writer.write_record(&record).map_err(csv_error)?;
    }

    writer.flush()?;
    Ok(())
}

fn bool_cell(value: bool) -> String {
    if value { "TRUE" } else { "FALSE" }.to_string()
}

/// Numbers with trailing zeros trimmed (`12.5`, `100`).
fn number_cell(value: f64) -> String {
    if value == value.trunc() {
        format!("{}", value.trunc() as i64)
    } else {
        let formatted = format!("{:.3}", value);
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

fn csv_error(e: csv::Error) -> crate::error::Error {
    crate::error::Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}
