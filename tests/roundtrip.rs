//! End-to-end tests: apply round trips, rollback on validation failure,
//! idempotence, and the safety gate.

mod common;

use common::{RadioGroupSpec, TestForm};
use pdf_bem::config::ProcessOptions;
use pdf_bem::context::ContextExtractor;
use pdf_bem::fields::FieldExtractor;
use pdf_bem::modify::{SafeModifier, TimeBudget};
use pdf_bem::naming::NameEngine;
use pdf_bem::plan::ModificationPlanner;
use pdf_bem::reader::PdfReader;
use pdf_bem::training::{TrainingRecord, TrainingStore};
use pdf_bem::{Error, ExitStatus};

fn record(name: &str) -> TrainingRecord {
    TrainingRecord {
        approved_name: name.to_string(),
        label: None,
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

fn options_for(dir: &std::path::Path) -> ProcessOptions {
    ProcessOptions {
        output_dir: Some(dir.to_path_buf()),
        ..ProcessOptions::default()
    }
}

#[test]
fn apply_round_trip_renames_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let form = TestForm::stacked_text_fields(&[
        ("FIRST_NAME", "First Name:"),
        ("LAST_NAME", "Last Name:"),
        ("SSN", "SSN:"),
    ]);
    let input = common::write_pdf(dir.path(), "form.pdf", &form.build());

    let training = TrainingStore::load(Vec::new()).unwrap();
    let options = options_for(dir.path());
    let outcome = pdf_bem::process(&input, &training, &options).unwrap();

    // Re-extract the output and compare with the plan's expectations
    let mut reopened = PdfReader::open(&outcome.artifacts.modified_path, None).unwrap();
    let after = FieldExtractor::extract(&mut reopened, 1000).unwrap();

    assert_eq!(after.fields.len(), 3);
    let names: Vec<&str> = after.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["first_name", "last_name", "ssn"]);

    // Ids unchanged relative to the source
    let mut reader = PdfReader::open(&input, None).unwrap();
    let before = FieldExtractor::extract(&mut reader, 1000).unwrap();
    let before_ids: Vec<&str> = before.fields.iter().map(|f| f.id.as_str()).collect();
    let after_ids: Vec<&str> = after.fields.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(before_ids, after_ids);

    // All three artifacts exist
    assert!(outcome.artifacts.modified_path.exists());
    assert!(outcome.artifacts.mapping_path.exists());
    assert!(outcome.artifacts.report_path.exists());
    assert!(outcome.artifacts.backup_id.is_some());
}

#[test]
fn preserve_all_run_produces_zero_edits() {
    let dir = tempfile::tempdir().unwrap();
    let names = [
        "personal-information_first-name",
        "personal-information_last-name",
        "personal-information_address",
        "personal-information_city",
        "personal-information_state",
        "personal-information_zip",
        "contact_phone-number",
        "contact_email",
        "payment_amount",
        "sign-here_date",
    ];
    let labeled: Vec<(&str, &str)> = names.iter().map(|n| (*n, "")).collect();
    let form = TestForm::stacked_text_fields(&labeled);
    let input = common::write_pdf(dir.path(), "form.pdf", &form.build());

    let training =
        TrainingStore::load(names.iter().map(|n| record(n)).collect::<Vec<_>>()).unwrap();
    let options = options_for(dir.path());
    let outcome = pdf_bem::process(&input, &training, &options).unwrap();

    // Every action preserved, zero edits, no backup taken
    for field in &outcome.report.fields {
        let decision = field.decision.as_ref().unwrap();
        assert_eq!(decision.action, pdf_bem::DecisionAction::Preserve);
        assert_eq!(decision.new_name, field.original_name);
        assert!(!field.modification.planned);
    }
    assert!(outcome.artifacts.backup_id.is_none());

    // The modified document has an identical extracted field set
    let mut reopened = PdfReader::open(&outcome.artifacts.modified_path, None).unwrap();
    let after = FieldExtractor::extract(&mut reopened, 1000).unwrap();
    let after_names: Vec<&str> = after.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(after_names, names.to_vec());

    // The mapping has a header and ten rows
    let csv = std::fs::read(&outcome.artifacts.mapping_path).unwrap();
    assert_eq!(&csv[..3], b"\xEF\xBB\xBF");
    let content = String::from_utf8(csv[3..].to_vec()).unwrap();
    assert_eq!(content.lines().count(), 11);
}

#[test]
fn radio_hierarchy_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut form = TestForm::default();
    form.radio_groups.push(RadioGroupSpec {
        name: "transaction--group".to_string(),
        exports: vec![
            "one-time".to_string(),
            "recurring".to_string(),
            "rmd".to_string(),
            "terminate".to_string(),
        ],
        rect_start: [100, 600, 120, 620],
    });
    let input = common::write_pdf(dir.path(), "form.pdf", &form.build());

    let training = TrainingStore::load(Vec::new()).unwrap();
    let options = options_for(dir.path());
    let outcome = pdf_bem::process(&input, &training, &options).unwrap();

    let mut reopened = PdfReader::open(&outcome.artifacts.modified_path, None).unwrap();
    let after = FieldExtractor::extract(&mut reopened, 1000).unwrap();

    assert_eq!(after.fields.len(), 5);
    let container = after.fields.iter().find(|f| f.is_group_container).unwrap();
    assert_eq!(container.name, "transaction_group");

    let widget_names: Vec<&str> = after
        .fields
        .iter()
        .filter(|f| !f.is_group_container)
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(
        widget_names,
        vec![
            "transaction_group__one-time",
            "transaction_group__recurring",
            "transaction_group__rmd",
            "transaction_group__terminate",
        ]
    );
}

#[test]
fn validation_failure_rolls_back_and_keeps_source_pristine() {
    let dir = tempfile::tempdir().unwrap();
    let mut form = TestForm::default();
    form.radio_groups.push(RadioGroupSpec {
        name: "plan".to_string(),
        exports: vec!["a".to_string(), "b".to_string()],
        rect_start: [100, 600, 120, 620],
    });
    let input = common::write_pdf(dir.path(), "form.pdf", &form.build());
    let original_bytes = std::fs::read(&input).unwrap();

    let options = options_for(dir.path());
    let training = TrainingStore::load(Vec::new()).unwrap();
    let mut reader = PdfReader::open(&input, None).unwrap();
    let extraction = FieldExtractor::extract(&mut reader, 1000).unwrap();
    let contexts = ContextExtractor::new()
        .extract_all(&mut reader, &extraction.fields)
        .unwrap();
    let engine = NameEngine::new(&training, &options);
    let decisions = engine.decide_all(&extraction.fields, &contexts).decisions;
    let mut plan =
        ModificationPlanner::plan(&mut reader, &extraction.fields, &decisions).unwrap();

    // Inject a planner bug: a widget expectation that breaks the
    // group-prefix invariant
    let widget_id = extraction
        .fields
        .iter()
        .find(|f| !f.is_group_container)
        .unwrap()
        .id
        .clone();
    plan.expected_names
        .insert(widget_id, "unrelated__name".to_string());

    let out_path = dir.path().join("form_parsed.pdf");
    let budget = TimeBudget::start(options.time_budget_seconds);
    let result = SafeModifier::new(&options).apply(
        &mut reader,
        &extraction.fields,
        &plan,
        &out_path,
        &budget,
    );

    let err = result.unwrap_err();
    assert!(matches!(err, Error::ValidationFailed { .. }));
    assert_eq!(ExitStatus::from_error(&err).code(), 5);

    // Source bytes identical, staged output gone
    assert_eq!(std::fs::read(&input).unwrap(), original_bytes);
    assert!(!out_path.exists());
    // The backup pair remains for the audit trail
    assert!(dir.path().join("form_backup.pdf").exists());
}

#[test]
fn applying_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let form = TestForm::stacked_text_fields(&[("FIRST_NAME", ""), ("LAST_NAME", "")]);
    let input = common::write_pdf(dir.path(), "form.pdf", &form.build());
    let training = TrainingStore::load(Vec::new()).unwrap();

    let out_a = dir.path().join("a");
    let out_b = dir.path().join("b");
    let outcome_a = pdf_bem::process(
        &input,
        &training,
        &ProcessOptions {
            output_dir: Some(out_a),
            ..ProcessOptions::default()
        },
    )
    .unwrap();
    let outcome_b = pdf_bem::process(
        &input,
        &training,
        &ProcessOptions {
            output_dir: Some(out_b),
            ..ProcessOptions::default()
        },
    )
    .unwrap();

    let bytes_a = std::fs::read(&outcome_a.artifacts.modified_path).unwrap();
    let bytes_b = std::fs::read(&outcome_b.artifacts.modified_path).unwrap();
    assert_eq!(bytes_a, bytes_b);

    // Re-planning from the output yields an empty plan
    let mut reader = PdfReader::open(&outcome_a.artifacts.modified_path, None).unwrap();
    let extraction = FieldExtractor::extract(&mut reader, 1000).unwrap();
    let contexts = ContextExtractor::new()
        .extract_all(&mut reader, &extraction.fields)
        .unwrap();
    let options = ProcessOptions::default();
    let decisions = NameEngine::new(&training, &options)
        .decide_all(&extraction.fields, &contexts)
        .decisions;
    let replan =
        ModificationPlanner::plan(&mut reader, &extraction.fields, &decisions).unwrap();
    assert!(replan.is_empty(), "re-plan has {} edits", replan.edits.len());
}

#[test]
fn unquoted_javascript_reference_blocks_the_plan() {
    let dir = tempfile::tempdir().unwrap();
    let mut form = TestForm::stacked_text_fields(&[("TOTAL_DUE", "Amount")]);
    form.javascript = Some("var v = TOTAL_DUE; app.alert(v);".to_string());
    let input = common::write_pdf(dir.path(), "form.pdf", &form.build());
    let original_bytes = std::fs::read(&input).unwrap();

    let training = TrainingStore::load(Vec::new()).unwrap();
    let options = options_for(dir.path());
    let err = pdf_bem::process(&input, &training, &options).unwrap_err();

    assert!(matches!(err, Error::PlanBlocker(_)));
    assert_eq!(ExitStatus::from_error(&err).code(), 4);

    // No mutation was attempted
    assert_eq!(std::fs::read(&input).unwrap(), original_bytes);
    assert!(!dir.path().join("form_parsed.pdf").exists());
}

#[test]
fn quoted_javascript_reference_is_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let mut form = TestForm::stacked_text_fields(&[("TOTAL_DUE", "Amount")]);
    form.javascript = Some("this.getField(\"TOTAL_DUE\").value = 0;".to_string());
    let input = common::write_pdf(dir.path(), "form.pdf", &form.build());

    let training = TrainingStore::load(Vec::new()).unwrap();
    let options = options_for(dir.path());
    let outcome = pdf_bem::process(&input, &training, &options).unwrap();

    // The new name appears in the rewritten action
    let modified = std::fs::read(&outcome.artifacts.modified_path).unwrap();
    let text = String::from_utf8_lossy(&modified);
    assert!(text.contains("total_due"), "rewritten JS missing new name");
}

#[test]
fn safety_gate_refuses_low_scores() {
    let dir = tempfile::tempdir().unwrap();
    let form = TestForm::stacked_text_fields(&[("FIRST_NAME", "")]);
    let input = common::write_pdf(dir.path(), "form.pdf", &form.build());

    let mut reader = PdfReader::open(&input, None).unwrap();
    let extraction = FieldExtractor::extract(&mut reader, 1000).unwrap();
    let contexts = ContextExtractor::new()
        .extract_all(&mut reader, &extraction.fields)
        .unwrap();
    let options = options_for(dir.path());
    let training = TrainingStore::load(Vec::new()).unwrap();
    let decisions = NameEngine::new(&training, &options)
        .decide_all(&extraction.fields, &contexts)
        .decisions;
    let mut plan =
        ModificationPlanner::plan(&mut reader, &extraction.fields, &decisions).unwrap();
    plan.safety_score = 0.2;

    let out_path = dir.path().join("form_parsed.pdf");
    let budget = TimeBudget::start(options.time_budget_seconds);
    let err = SafeModifier::new(&options)
        .apply(&mut reader, &extraction.fields, &plan, &out_path, &budget)
        .unwrap_err();
    assert!(matches!(err, Error::PlanBlocker(_)));
    assert!(!out_path.exists());
    // The gate fires before backup
    assert!(!dir.path().join("form_backup.pdf").exists());
}

#[test]
fn rollback_api_restores_from_backup_id() {
    let dir = tempfile::tempdir().unwrap();
    let form = TestForm::stacked_text_fields(&[("FIRST_NAME", "")]);
    let input = common::write_pdf(dir.path(), "form.pdf", &form.build());
    let original_bytes = std::fs::read(&input).unwrap();

    let training = TrainingStore::load(Vec::new()).unwrap();
    let options = options_for(dir.path());
    let outcome = pdf_bem::process(&input, &training, &options).unwrap();
    let backup_id = outcome.artifacts.backup_id.unwrap();

    // Clobber the source, then roll back by id
    std::fs::write(&input, b"clobbered").unwrap();
    let restored = pdf_bem::rollback(dir.path(), &backup_id).unwrap();
    assert_eq!(std::fs::read(restored).unwrap(), original_bytes);
}

#[test]
fn mapping_api_name_column_carries_final_names() {
    let dir = tempfile::tempdir().unwrap();
    let form = TestForm::stacked_text_fields(&[("FIRST_NAME", "First Name:")]);
    let input = common::write_pdf(dir.path(), "form.pdf", &form.build());

    let training = TrainingStore::load(Vec::new()).unwrap();
    let options = options_for(dir.path());
    let outcome = pdf_bem::process(&input, &training, &options).unwrap();

    let csv = std::fs::read_to_string(&outcome.artifacts.mapping_path).unwrap();
    let data_line = csv.lines().nth(1).unwrap();
    assert!(data_line.contains("first_name"));
    assert!(data_line.contains("FIRST_NAME")); // Acrofieldlabel keeps the original
}
