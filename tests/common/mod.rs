//! Synthetic AcroForm PDF builder for integration tests.
//!
//! Emits real PDF bytes (header, body, conventional xref table, trailer)
//! so the reader parses test documents exactly like production input.
#![allow(dead_code)]

use std::fmt::Write as _;

/// A single-widget text field.
#[derive(Debug, Clone)]
pub struct TextFieldSpec {
    pub name: String,
    pub rect: [i32; 4],
    /// Label drawn left of the field in the page content
    pub label: Option<String>,
}

/// A radio group with one widget per export value.
#[derive(Debug, Clone)]
pub struct RadioGroupSpec {
    pub name: String,
    pub exports: Vec<String>,
    pub rect_start: [i32; 4],
}

/// Declarative description of a one-page test form.
#[derive(Debug, Clone, Default)]
pub struct TestForm {
    pub text_fields: Vec<TextFieldSpec>,
    pub radio_groups: Vec<RadioGroupSpec>,
    /// Extra text runs drawn at absolute positions (section headers etc.)
    pub page_text: Vec<(String, i32, i32)>,
    /// A document-open JavaScript action placed in the catalog
    pub javascript: Option<String>,
}

impl TestForm {
    /// A vertical stack of labeled text fields.
    pub fn stacked_text_fields(names_and_labels: &[(&str, &str)]) -> Self {
        let mut form = TestForm::default();
        for (i, (name, label)) in names_and_labels.iter().enumerate() {
            let y = 700 - (i as i32) * 40;
            form.text_fields.push(TextFieldSpec {
                name: name.to_string(),
                rect: [150, y, 350, y + 20],
                label: if label.is_empty() {
                    None
                } else {
                    Some(label.to_string())
                },
            });
        }
        form
    }

    /// Render the form as complete PDF bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut objects: Vec<(u32, String)> = Vec::new();
        let mut next_id = 6u32;
        let mut alloc = || {
            let id = next_id;
            next_id += 1;
            id
        };

        let mut field_refs: Vec<String> = Vec::new();
        let mut annot_refs: Vec<String> = Vec::new();
        let mut content = String::from("BT /F1 12 Tf ");

        for field in &self.text_fields {
            let id = alloc();
            let [x1, y1, x2, y2] = field.rect;
            objects.push((
                id,
                format!(
                    "<< /FT /Tx /T ({}) /Type /Annot /Subtype /Widget /Rect [{} {} {} {}] /P 4 0 R >>",
                    field.name, x1, y1, x2, y2
                ),
            ));
            field_refs.push(format!("{} 0 R", id));
            annot_refs.push(format!("{} 0 R", id));
            if let Some(label) = &field.label {
                let _ = write!(content, "1 0 0 1 {} {} Tm ({}) Tj ", x1 - 100, y1 + 4, label);
            }
        }

        for group in &self.radio_groups {
            let group_id = alloc();
            let mut kid_refs = Vec::new();
            for (i, export) in group.exports.iter().enumerate() {
                let widget_id = alloc();
                let [x1, y1, x2, y2] = group.rect_start;
                let offset = (i as i32) * 30;
                objects.push((
                    widget_id,
                    format!(
                        "<< /Parent {} 0 R /Type /Annot /Subtype /Widget \
                         /Rect [{} {} {} {}] /AS /Off \
                         /AP << /N << /{} null /Off null >> >> /P 4 0 R >>",
                        group_id,
                        x1,
                        y1 - offset,
                        x2,
                        y2 - offset,
                        export
                    ),
                ));
                kid_refs.push(format!("{} 0 R", widget_id));
                annot_refs.push(format!("{} 0 R", widget_id));
            }
            objects.push((
                group_id,
                format!(
                    "<< /FT /Btn /Ff 32768 /T ({}) /V /Off /Kids [{}] >>",
                    group.name,
                    kid_refs.join(" ")
                ),
            ));
            field_refs.push(format!("{} 0 R", group_id));
        }

        for (text, x, y) in &self.page_text {
            let _ = write!(content, "1 0 0 1 {} {} Tm ({}) Tj ", x, y, text);
        }
        content.push_str("ET");

        let open_action = match &self.javascript {
            Some(js) => format!(" /OpenAction << /S /JavaScript /JS ({}) >>", js),
            None => String::new(),
        };

        let mut all: Vec<(u32, String)> = vec![
            (
                1,
                format!("<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R{} >>", open_action),
            ),
            (
                2,
                "<< /Type /Pages /Kids [4 0 R] /Count 1 >>".to_string(),
            ),
            (3, format!("<< /Fields [{}] >>", field_refs.join(" "))),
            (
                4,
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 5 0 R /Annots [{}] >>",
                    annot_refs.join(" ")
                ),
            ),
            (
                5,
                format!(
                    "<< /Length {} >>\nstream\n{}\nendstream",
                    content.len(),
                    content
                ),
            ),
        ];
        all.extend(objects);
        all.sort_by_key(|(id, _)| *id);

        assemble(&all)
    }
}

/// Assemble numbered object bodies into a full PDF file.
pub fn assemble(objects: &[(u32, String)]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n%\x80\x81\x82\x83\n");

    let max_id = objects.iter().map(|(id, _)| *id).max().unwrap_or(0);
    let mut offsets: Vec<Option<usize>> = vec![None; (max_id + 1) as usize];

    for (id, body) in objects {
        offsets[*id as usize] = Some(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", max_id + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for id in 1..=max_id {
        match offsets[id as usize] {
            Some(offset) => {
                out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes())
            },
            None => out.extend_from_slice(b"0000000000 65535 f \n"),
        }
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            max_id + 1,
            xref_offset
        )
        .as_bytes(),
    );
    out
}

/// Write bytes to `dir/name` and return the full path.
pub fn write_pdf(dir: &std::path::Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
