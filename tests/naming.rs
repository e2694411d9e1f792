//! Name engine integration tests: grammar conformance, uniqueness,
//! preservation, normalization, and collision resolution.

mod common;

use std::collections::HashMap;

use common::TestForm;
use pdf_bem::config::ProcessOptions;
use pdf_bem::context::ContextExtractor;
use pdf_bem::fields::FieldExtractor;
use pdf_bem::naming::grammar;
use pdf_bem::naming::{DecisionAction, NameEngine};
use pdf_bem::reader::PdfReader;
use pdf_bem::training::{TrainingRecord, TrainingStore};

use proptest::prelude::*;

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

fn decide_form(
    form: &TestForm,
    store: &TrainingStore,
) -> (Vec<pdf_bem::Field>, pdf_bem::naming::engine::EngineOutput) {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_pdf(dir.path(), "form.pdf", &form.build());
    let mut reader = PdfReader::open(&path, None).unwrap();
    let extraction = FieldExtractor::extract(&mut reader, 1000).unwrap();
    let contexts = ContextExtractor::new()
        .extract_all(&mut reader, &extraction.fields)
        .unwrap();
    let options = ProcessOptions::default();
    let output = NameEngine::new(store, &options).decide_all(&extraction.fields, &contexts);
    (extraction.fields, output)
}

#[test]
fn every_decision_matches_the_grammar_and_is_unique() {
    let form = TestForm::stacked_text_fields(&[
        ("FIRST_NAME", "First Name:"),
        ("LAST_NAME", "Last Name:"),
        ("SSN", "SSN:"),
        ("EMAIL", "Email:"),
        ("weird field!!", "Notes"),
        ("", "Amount"),
    ]);
    let store = TrainingStore::load(Vec::new()).unwrap();
    let (_, output) = decide_form(&form, &store);

    let mut seen = std::collections::HashSet::new();
    assert!(!output.decisions.is_empty());
    for decision in &output.decisions {
        assert!(
            grammar::is_valid(&decision.new_name),
            "'{}' violates the grammar",
            decision.new_name
        );
        assert!(decision.new_name.len() <= 50);
        assert!(
            seen.insert(decision.new_name.clone()),
            "duplicate name '{}'",
            decision.new_name
        );
    }
}

#[test]
fn preserves_supported_names_unchanged() {
    // Scenario: a form whose names are already canonical and supported
    let names = [
        "personal-information_first-name",
        "personal-information_last-name",
        "sign-here_date",
    ];
    let labeled: Vec<(&str, &str)> = names.iter().map(|n| (*n, "")).collect();
    let form = TestForm::stacked_text_fields(&labeled);

    let store =
        TrainingStore::load(names.iter().map(|n| record(n, "anything")).collect::<Vec<_>>())
            .unwrap();
    let (fields, output) = decide_form(&form, &store);

    for field in &fields {
        let decision = output.decision_for(&field.id).unwrap();
        assert_eq!(decision.action, DecisionAction::Preserve, "{}", field.name);
        assert_eq!(decision.new_name, field.name);
        assert!(decision.confidence >= 0.9);
    }
}

#[test]
fn improves_all_caps_names() {
    let form = TestForm::stacked_text_fields(&[
        ("FIRST_NAME", ""),
        ("LAST_NAME", ""),
        ("SSN", ""),
        ("EMAIL", ""),
    ]);
    let store = TrainingStore::load(Vec::new()).unwrap();
    let (fields, output) = decide_form(&form, &store);

    let expected = ["first_name", "last_name", "ssn", "email"];
    for (field, expected) in fields.iter().zip(expected) {
        let decision = output.decision_for(&field.id).unwrap();
        assert_eq!(decision.action, DecisionAction::Improve);
        assert_eq!(decision.new_name, expected);
        assert!(decision.confidence >= 0.6);
        assert!(grammar::is_valid(&decision.new_name));
    }
}

#[test]
fn amount_collision_resolves_with_section_modifiers() {
    // Three unnamed amount fields under three section headers
    let mut form = TestForm::default();
    for (i, section) in ["GROSS", "NET", "FEES"].iter().enumerate() {
        let y = 700 - (i as i32) * 150;
        form.page_text.push((section.to_string(), 150, y + 60));
        form.text_fields.push(common::TextFieldSpec {
            name: String::new(),
            rect: [150, y, 350, y + 20],
            label: Some("Amount".to_string()),
        });
    }

    let store = TrainingStore::load(Vec::new()).unwrap();
    let (_, output) = decide_form(&form, &store);

    let names: Vec<&str> = output
        .decisions
        .iter()
        .map(|d| d.new_name.as_str())
        .collect();
    assert!(names.contains(&"payment_amount__gross"), "{:?}", names);
    assert!(names.contains(&"payment_amount__net"), "{:?}", names);
    assert!(names.contains(&"payment_amount__fees"), "{:?}", names);

    for decision in &output.decisions {
        assert!(
            decision.rationale.contains("disambiguated"),
            "rationale '{}' lacks the resolution note",
            decision.rationale
        );
    }
}

#[test]
fn exact_training_match_dominates() {
    let form = TestForm::stacked_text_fields(&[("", "Daytime Phone")]);
    let store = TrainingStore::load(vec![
        record("contact_phone-number", "Daytime Phone"),
        record("contact_phone-number", "Daytime Phone"),
    ])
    .unwrap();
    let (_, output) = decide_form(&form, &store);

    let decision = &output.decisions[0];
    assert_eq!(decision.new_name, "contact_phone-number");
    assert!(decision.confidence >= 0.6);
}

#[test]
fn radio_widgets_carry_group_prefix() {
    let mut form = TestForm::default();
    form.radio_groups.push(common::RadioGroupSpec {
        name: "transaction--group".to_string(),
        exports: vec![
            "one-time".to_string(),
            "recurring".to_string(),
            "rmd".to_string(),
            "terminate".to_string(),
        ],
        rect_start: [100, 600, 120, 620],
    });
    let store = TrainingStore::load(Vec::new()).unwrap();
    let (fields, output) = decide_form(&form, &store);

    let group = fields.iter().find(|f| f.is_group_container).unwrap();
    let group_decision = output.decision_for(&group.id).unwrap();
    assert_eq!(group_decision.new_name, "transaction_group");

    for widget in fields.iter().filter(|f| !f.is_group_container) {
        let decision = output.decision_for(&widget.id).unwrap();
        assert!(
            decision
                .new_name
                .starts_with(&format!("{}__", group_decision.new_name)),
            "'{}' does not carry the group prefix",
            decision.new_name
        );
        assert!(grammar::is_valid(&decision.new_name));
    }

    let expected: Vec<String> = ["one-time", "recurring", "rmd", "terminate"]
        .iter()
        .map(|e| format!("transaction_group__{}", e))
        .collect();
    let widget_names: Vec<String> = fields
        .iter()
        .filter(|f| !f.is_group_container)
        .map(|f| output.decision_for(&f.id).unwrap().new_name.clone())
        .collect();
    assert_eq!(widget_names, expected);
}

#[test]
fn corrupt_training_store_is_fatal_at_load() {
    let result = TrainingStore::load(vec![record("NOT A NAME", "x")]);
    assert!(matches!(
        result,
        Err(pdf_bem::Error::TrainingCorrupt(_))
    ));
}

proptest! {
    /// Normalization either fails or produces a grammar-valid name.
    #[test]
    fn normalize_output_is_always_valid(input in "[A-Za-z0-9 _\\-]{0,60}") {
        if let Some(normalized) = grammar::normalize_name(&input) {
            prop_assert!(grammar::is_valid(&normalized), "'{}' -> '{}'", input, normalized);
        }
    }

    /// Transliteration either fails or produces a valid segment.
    #[test]
    fn transliterate_output_is_always_valid(input in ".{0,40}") {
        if let Some(segment) = grammar::transliterate_segment(&input) {
            prop_assert!(grammar::is_valid_segment(&segment), "'{}' -> '{}'", input, segment);
        }
    }

    /// Valid names survive a parse/format round trip.
    #[test]
    fn parse_format_round_trip(
        block in "[a-z][a-z0-9]{0,6}(-[a-z0-9]{1,4}){0,2}",
        element in proptest::option::of("[a-z][a-z0-9]{0,6}"),
        modifier in proptest::option::of("[a-z][a-z0-9]{0,6}"),
    ) {
        let mut name = block;
        if let Some(e) = element {
            name.push('_');
            name.push_str(&e);
        }
        if let Some(m) = modifier {
            name.push_str("__");
            name.push_str(&m);
        }
        prop_assume!(name.len() <= 50);
        let parsed = grammar::BemName::parse(&name).unwrap();
        prop_assert_eq!(parsed.format(), name);
    }
}

#[test]
fn decisions_for_unsupported_valid_names_do_not_rename() {
    // Grammar-valid but unsupported: improved with an identical name, so
    // the planner sees no edit
    let form = TestForm::stacked_text_fields(&[("owner-information_name", "")]);
    let store = TrainingStore::load(Vec::new()).unwrap();
    let (fields, output) = decide_form(&form, &store);

    let decision = output.decision_for(&fields[0].id).unwrap();
    assert_eq!(decision.new_name, "owner-information_name");
}

#[test]
fn contexts_are_attached_to_every_field() {
    let form = TestForm::stacked_text_fields(&[("a", "Alpha:"), ("b", "Beta:")]);
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_pdf(dir.path(), "form.pdf", &form.build());
    let mut reader = PdfReader::open(&path, None).unwrap();
    let extraction = FieldExtractor::extract(&mut reader, 1000).unwrap();
    let contexts: HashMap<_, _> = ContextExtractor::new()
        .extract_all(&mut reader, &extraction.fields)
        .unwrap();

    for field in &extraction.fields {
        assert!(contexts.contains_key(&field.id));
    }
}
