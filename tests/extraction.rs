//! Field extraction integration tests: totality, radio duality,
//! inheritance resolution, and the large-form guard.

mod common;

use common::{RadioGroupSpec, TestForm};
use pdf_bem::config::ProcessOptions;
use pdf_bem::fields::{ExtractionWarning, FieldExtractor, FieldKind};
use pdf_bem::reader::PdfReader;

fn open(bytes: Vec<u8>) -> PdfReader {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_pdf(dir.path(), "form.pdf", &bytes);
    PdfReader::open(&path, None).unwrap()
}

#[test]
fn extracts_every_text_field_exactly_once() {
    let form = TestForm::stacked_text_fields(&[
        ("first", "First Name:"),
        ("last", "Last Name:"),
        ("email", "Email:"),
    ]);
    let mut reader = open(form.build());
    let result = FieldExtractor::extract(&mut reader, 1000).unwrap();

    assert_eq!(result.fields.len(), 3);
    let names: Vec<&str> = result.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["first", "last", "email"]);

    // No duplicates by id or name
    let mut ids: Vec<&str> = result.fields.iter().map(|f| f.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[test]
fn radio_group_emits_container_plus_widgets() {
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

    let mut reader = open(form.build());
    let result = FieldExtractor::extract(&mut reader, 1000).unwrap();

    // 1 container + 4 widgets
    assert_eq!(result.fields.len(), 5);

    let container = &result.fields[0];
    assert!(container.is_group_container);
    assert_eq!(container.kind, FieldKind::RadioGroup);
    assert!(container.rect.is_none());
    assert!(container.page.is_none());
    assert_eq!(container.child_ids.len(), 4);

    let widgets: Vec<_> = result.fields.iter().filter(|f| !f.is_group_container).collect();
    assert_eq!(widgets.len(), 4);
    for widget in &widgets {
        assert_eq!(widget.kind, FieldKind::RadioWidget);
        assert_eq!(widget.parent_id.as_deref(), Some(container.id.as_str()));
        let rect = widget.rect.expect("widget must have a rectangle");
        assert!(rect.iter().all(|v| v.is_finite()));
        assert_eq!(widget.page, Some(1));
    }

    // Names derive from the group plus the export value
    assert_eq!(widgets[0].name, "transaction--group__one-time");
    assert_eq!(widgets[0].export_value.as_deref(), Some("one-time"));
    assert_eq!(widgets[3].name, "transaction--group__terminate");
}

#[test]
fn widgets_inherit_group_kind_and_flags() {
    let mut form = TestForm::default();
    form.radio_groups.push(RadioGroupSpec {
        name: "plan".to_string(),
        exports: vec!["a".to_string(), "b".to_string()],
        rect_start: [100, 500, 120, 520],
    });

    let mut reader = open(form.build());
    let result = FieldExtractor::extract(&mut reader, 1000).unwrap();

    for widget in result.fields.iter().filter(|f| !f.is_group_container) {
        // /FT and /Ff live on the group; the widgets resolve them by
        // walking the parent chain
        assert_eq!(widget.kind, FieldKind::RadioWidget);
        assert!(widget.flags.contains(pdf_bem::fields::FieldFlags::RADIO));
    }
}

#[test]
fn malformed_rect_yields_zeroed_rect_and_warning() {
    // Hand-build a field with a 3-entry /Rect
    let objects = vec![
        (
            1,
            "<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>".to_string(),
        ),
        (2, "<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_string()),
        (3, "<< /Fields [5 0 R] >>".to_string()),
        (
            4,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [5 0 R] >>".to_string(),
        ),
        (
            5,
            "<< /FT /Tx /T (broken) /Subtype /Widget /Rect [1 2 3] /P 4 0 R >>".to_string(),
        ),
    ];
    let mut reader = open(common::assemble(&objects));
    let result = FieldExtractor::extract(&mut reader, 1000).unwrap();

    assert_eq!(result.fields.len(), 1);
    assert_eq!(result.fields[0].rect, Some([0.0, 0.0, 0.0, 0.0]));
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, ExtractionWarning::BadRect { .. })));
}

#[test]
fn circular_field_tree_is_detected_not_looped() {
    // Field 5 lists itself as a kid
    let objects = vec![
        (
            1,
            "<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>".to_string(),
        ),
        (2, "<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_string()),
        (3, "<< /Fields [5 0 R] >>".to_string()),
        (
            4,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>".to_string(),
        ),
        (
            5,
            "<< /FT /Tx /T (loop) /Kids [5 0 R] >>".to_string(),
        ),
    ];
    let mut reader = open(common::assemble(&objects));
    let result = FieldExtractor::extract(&mut reader, 1000).unwrap();

    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, ExtractionWarning::CircularField { .. })));
}

#[test]
fn large_form_warns_but_completes() {
    let specs: Vec<(String, String)> = (0..1200)
        .map(|i| (format!("f{}", i), String::new()))
        .collect();
    let spec_refs: Vec<(&str, &str)> = specs
        .iter()
        .map(|(n, l)| (n.as_str(), l.as_str()))
        .collect();
    let form = TestForm::stacked_text_fields(&spec_refs);

    let started = std::time::Instant::now();
    let mut reader = open(form.build());
    let result = FieldExtractor::extract(&mut reader, 1000).unwrap();

    assert_eq!(result.fields.len(), 1200);
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, ExtractionWarning::LargeForm { count: 1200 })));
    // Well under the default time budget
    assert!(started.elapsed().as_secs() < ProcessOptions::default().time_budget_seconds);
}

#[test]
fn document_without_acroform_yields_empty_list() {
    let objects = vec![
        (1, "<< /Type /Catalog /Pages 2 0 R >>".to_string()),
        (2, "<< /Type /Pages /Kids [] /Count 0 >>".to_string()),
    ];
    let mut reader = open(common::assemble(&objects));
    let result = FieldExtractor::extract(&mut reader, 1000).unwrap();
    assert!(result.fields.is_empty());
    assert!(result.warnings.is_empty());
}

#[test]
fn context_extraction_finds_labels() {
    let form = TestForm::stacked_text_fields(&[("f1", "First Name:")]);
    let mut reader = open(form.build());
    let result = FieldExtractor::extract(&mut reader, 1000).unwrap();

    let contexts = pdf_bem::context::ContextExtractor::new()
        .extract_all(&mut reader, &result.fields)
        .unwrap();
    let context = &contexts[&result.fields[0].id];
    assert_eq!(context.label, "First Name:");
    assert!(context.confidence >= 0.6);
}
