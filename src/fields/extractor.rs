//! AcroForm field tree extraction.
//!
//! Walks the /AcroForm /Fields tree depth-first and produces the flat,
//! ordered field list: both logical fields and widget annotations, with
//! inherited attributes resolved, radio groups split into container +
//! widgets, and per-field failures contained as warnings.

use std::collections::HashSet;

use crate::error::Result;
use crate::fields::{ExtractionWarning, Field, FieldFlags, FieldKind, FieldValue};
use crate::object::{Dict, Object, ObjectRef};
use crate::parser::decode_text_string;
use crate::reader::PdfReader;

/// Result of one extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Flattened fields in document order (containers before their kids)
    pub fields: Vec<Field>,
    /// Non-fatal conditions encountered
    pub warnings: Vec<ExtractionWarning>,
}

/// Attributes a field node inherits from its ancestors.
#[derive(Debug, Clone, Default)]
struct Inherited {
    field_type: Option<String>,
    flags: Option<u32>,
    value: Option<Object>,
}

/// AcroForm field extractor.
pub struct FieldExtractor<'a> {
    reader: &'a mut PdfReader,
    visited: HashSet<ObjectRef>,
    fields: Vec<Field>,
    warnings: Vec<ExtractionWarning>,
}

impl<'a> FieldExtractor<'a> {
    /// Extract every field of the document.
    ///
    /// Returns an empty list when the catalog has no AcroForm. A field
    /// that fails to parse is omitted with a warning; extraction of the
    /// remaining fields is unaffected.
    pub fn extract(
        reader: &'a mut PdfReader,
        large_form_threshold: usize,
    ) -> Result<ExtractionResult> {
        let catalog = reader.root()?;
        let acroform = match reader.dict_get(&catalog, "AcroForm")? {
            Some(obj) => match obj.as_dict() {
                Some(d) => d.clone(),
                None => return Ok(empty_result()),
            },
            None => return Ok(empty_result()),
        };

        let fields_array = match reader.dict_get(&acroform, "Fields")? {
            Some(obj) => match obj.as_array() {
                Some(arr) => arr.clone(),
                None => return Ok(empty_result()),
            },
            None => return Ok(empty_result()),
        };

        // Inheritable defaults from the AcroForm dictionary itself
        let defaults = Inherited {
            field_type: acroform.get("FT").and_then(|o| o.as_name()).map(String::from),
            flags: acroform.get("Ff").and_then(|o| o.as_integer()).map(|f| f as u32),
            value: acroform.get("V").cloned(),
        };

        let mut extractor = Self {
            reader,
            visited: HashSet::new(),
            fields: Vec::new(),
            warnings: Vec::new(),
        };

        for (index, field_ref) in fields_array.iter().enumerate() {
            let id = format!("field_{:04}", index);
            if let Err(e) = extractor.walk(field_ref, "", None, &id, &defaults, false) {
                let at = field_ref
                    .as_reference()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "inline".to_string());
                log::warn!("Skipping field at {}: {}", at, e);
                extractor.warnings.push(ExtractionWarning::FieldSkipped {
                    object_ref: at,
                    reason: e.to_string(),
                });
            }
        }

        if extractor.fields.len() > large_form_threshold {
            extractor.warnings.push(ExtractionWarning::LargeForm {
                count: extractor.fields.len(),
            });
        }

        log::info!(
            "Extracted {} fields ({} warnings)",
            extractor.fields.len(),
            extractor.warnings.len()
        );

        Ok(ExtractionResult {
            fields: extractor.fields,
            warnings: extractor.warnings,
        })
    }

    /// Process one field node. `id` is this node's assigned id.
    fn walk(
        &mut self,
        node: &Object,
        parent_name: &str,
        parent_id: Option<&str>,
        id: &str,
        inherited: &Inherited,
        parent_is_radio_group: bool,
    ) -> Result<()> {
        let node_ref = node.as_reference();
        if let Some(r) = node_ref {
            if !self.visited.insert(r) {
                log::warn!("Circular field reference at {}", r);
                self.warnings.push(ExtractionWarning::CircularField {
                    object_ref: r.to_string(),
                });
                return Ok(());
            }
        }

        let dict = match self.reader.resolve_obj(node)?.as_dict() {
            Some(d) => d.clone(),
            None => return Ok(()),
        };

        // Resolve inherited attributes for this node
        let own = Inherited {
            field_type: self
                .reader
                .dict_get(&dict, "FT")?
                .and_then(|o| o.as_name().map(String::from))
                .or_else(|| inherited.field_type.clone()),
            flags: self
                .reader
                .dict_get(&dict, "Ff")?
                .and_then(|o| o.as_integer())
                .map(|f| f as u32)
                .or(inherited.flags),
            value: match dict.get("V") {
                Some(v) => Some(self.reader.resolve_obj(v)?),
                None => inherited.value.clone(),
            },
        };
        let flags = FieldFlags::from_bits_truncate(own.flags.unwrap_or(0));

        let local_title = self.text_entry(&dict, "T")?;
        let tooltip = self.text_entry(&dict, "TU")?;
        let name = qualified_name(parent_name, local_title.as_deref());

        let kids = self.field_kids(&dict)?;
        let is_radio = flags.contains(FieldFlags::RADIO)
            && !flags.contains(FieldFlags::PUSHBUTTON)
            && own.field_type.as_deref() == Some("Btn");
        let has_widget_kids = !kids.is_empty()
            && kids
                .iter()
                .any(|(kid_dict, _)| !kid_dict.contains_key("T"));

        let kind = classify(
            own.field_type.as_deref(),
            flags,
            is_radio && has_widget_kids,
            parent_is_radio_group,
        );

        if kids.is_empty() {
            // Terminal field: one record, merged field + widget
            let record = self.terminal_record(
                id,
                &dict,
                &name,
                local_title,
                tooltip,
                kind,
                flags,
                &own,
                node_ref,
                parent_id,
                parent_is_radio_group,
                parent_name,
            )?;
            self.fields.push(record);
            return Ok(());
        }

        // Container: emit the logical field first, then its kids
        let container_index = self.fields.len();
        self.fields.push(Field {
            id: id.to_string(),
            name: name.clone(),
            local_title,
            kind,
            page: None,
            rect: None,
            value: parse_field_value(own.value.as_ref(), kind),
            flags,
            parent_id: parent_id.map(String::from),
            child_ids: Vec::new(),
            export_value: None,
            tooltip,
            object_ref: node_ref,
            is_group_container: true,
        });

        let mut child_ids = Vec::with_capacity(kids.len());
        for (child_index, (_, kid_obj)) in kids.iter().enumerate() {
            let child_id = format!("{}_{}", id, child_index);
            child_ids.push(child_id.clone());
            if let Err(e) = self.walk(
                kid_obj,
                &name,
                Some(id),
                &child_id,
                &own,
                kind == FieldKind::RadioGroup,
            ) {
                let at = kid_obj
                    .as_reference()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "inline".to_string());
                self.warnings.push(ExtractionWarning::FieldSkipped {
                    object_ref: at,
                    reason: e.to_string(),
                });
            }
        }
        // Kids that failed still get listed; validation compares ids
        self.fields[container_index].child_ids = child_ids;

        Ok(())
    }

    /// Build the record for a terminal (widget-bearing) field node.
    #[allow(clippy::too_many_arguments)]
    fn terminal_record(
        &mut self,
        id: &str,
        dict: &Dict,
        name: &str,
        local_title: Option<String>,
        tooltip: Option<String>,
        kind: FieldKind,
        flags: FieldFlags,
        inherited: &Inherited,
        node_ref: Option<ObjectRef>,
        parent_id: Option<&str>,
        parent_is_radio_group: bool,
        parent_name: &str,
    ) -> Result<Field> {
        let rect = self.widget_rect(dict, id)?;
        let page = self.widget_page(dict, node_ref)?;

        let export_value = if parent_is_radio_group || kind == FieldKind::Checkbox {
            self.export_value(dict)?
        } else {
            None
        };

        // Radio widgets are addressed by the group name plus export value
        let name = if parent_is_radio_group {
            match &export_value {
                Some(export) => format!("{}__{}", parent_name, export),
                None => parent_name.to_string(),
            }
        } else {
            name.to_string()
        };

        Ok(Field {
            id: id.to_string(),
            name,
            local_title,
            kind,
            page,
            rect: Some(rect),
            value: parse_field_value(inherited.value.as_ref(), kind),
            flags,
            parent_id: parent_id.map(String::from),
            child_ids: Vec::new(),
            export_value,
            tooltip,
            object_ref: node_ref,
            is_group_container: false,
        })
    }

    /// Kids of a field node that are dictionaries, with their source objects.
    fn field_kids(&mut self, dict: &Dict) -> Result<Vec<(Dict, Object)>> {
        let kids = match self.reader.dict_get(dict, "Kids")? {
            Some(obj) => match obj.as_array() {
                Some(arr) => arr.clone(),
                None => return Ok(Vec::new()),
            },
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::with_capacity(kids.len());
        for kid in kids {
            if let Some(kid_dict) = self.reader.resolve_obj(&kid)?.as_dict() {
                out.push((kid_dict.clone(), kid));
            }
        }
        Ok(out)
    }

    /// Widget rectangle: four numeric entries, else zeros plus a warning.
    fn widget_rect(&mut self, dict: &Dict, field_id: &str) -> Result<[f64; 4]> {
        let rect_obj = self.reader.dict_get(dict, "Rect")?;
        let coords: Option<[f64; 4]> = rect_obj
            .as_ref()
            .and_then(|o| o.as_array())
            .and_then(|arr| {
                if arr.len() != 4 {
                    return None;
                }
                let mut out = [0.0; 4];
                for (slot, item) in out.iter_mut().zip(arr.iter()) {
                    *slot = item.as_number()?;
                }
                Some(out)
            });

        match coords {
            Some(rect) => Ok(rect),
            None => {
                self.warnings.push(ExtractionWarning::BadRect {
                    field_id: field_id.to_string(),
                });
                Ok([0.0; 4])
            },
        }
    }

    /// Page association: /P first, else the page whose /Annots lists us.
    fn widget_page(&mut self, dict: &Dict, node_ref: Option<ObjectRef>) -> Result<Option<u32>> {
        if let Some(page_ref) = dict.get("P").and_then(|o| o.as_reference()) {
            if let Some(page) = self
                .reader
                .pages()
                .iter()
                .find(|p| p.page_ref == page_ref)
            {
                return Ok(Some(page.number));
            }
        }
        Ok(node_ref.and_then(|r| self.reader.page_of_annotation(r)))
    }

    /// Export value from the appearance state, else the normal appearance
    /// map keys; off-states are never export values.
    fn export_value(&mut self, dict: &Dict) -> Result<Option<String>> {
        if let Some(state) = self
            .reader
            .dict_get(dict, "AS")?
            .and_then(|o| o.as_name().map(String::from))
        {
            if !is_off_state(&state) {
                return Ok(Some(state));
            }
        }

        let normal = self
            .reader
            .dict_get(dict, "AP")?
            .and_then(|ap| ap.as_dict().and_then(|d| d.get("N")).cloned());
        if let Some(normal) = normal {
            if let Some(states) = self.reader.resolve_obj(&normal)?.as_dict() {
                let mut keys: Vec<&String> =
                    states.keys().filter(|k| !is_off_state(k)).collect();
                keys.sort();
                if let Some(first) = keys.first() {
                    return Ok(Some((*first).clone()));
                }
            }
        }

        Ok(None)
    }

    /// A text-string entry of the field dictionary.
    fn text_entry(&mut self, dict: &Dict, key: &str) -> Result<Option<String>> {
        Ok(self
            .reader
            .dict_get(dict, key)?
            .and_then(|o| o.as_string().map(decode_text_string)))
    }
}

fn empty_result() -> ExtractionResult {
    ExtractionResult {
        fields: Vec::new(),
        warnings: Vec::new(),
    }
}

/// Join a parent name and a local title per the qualified-name rule.
fn qualified_name(parent_name: &str, local_title: Option<&str>) -> String {
    match (parent_name.is_empty(), local_title) {
        (true, Some(title)) => title.to_string(),
        (true, None) => String::new(),
        (false, Some(title)) if !title.is_empty() => format!("{}.{}", parent_name, title),
        (false, _) => parent_name.to_string(),
    }
}

/// Classify the field kind from the resolved type token and flags.
fn classify(
    field_type: Option<&str>,
    flags: FieldFlags,
    is_radio_group: bool,
    parent_is_radio_group: bool,
) -> FieldKind {
    match field_type {
        Some("Tx") => FieldKind::Text,
        Some("Ch") => FieldKind::Choice,
        Some("Sig") => FieldKind::Signature,
        Some("Btn") => {
            if flags.contains(FieldFlags::PUSHBUTTON) {
                FieldKind::Unknown
            } else if is_radio_group {
                FieldKind::RadioGroup
            } else if parent_is_radio_group {
                FieldKind::RadioWidget
            } else if flags.contains(FieldFlags::RADIO) {
                // A terminal radio-flagged field acts as its own widget
                FieldKind::RadioWidget
            } else {
                FieldKind::Checkbox
            }
        },
        _ if parent_is_radio_group => FieldKind::RadioWidget,
        _ => FieldKind::Unknown,
    }
}

/// Parse the inherited /V object into a typed value.
fn parse_field_value(obj: Option<&Object>, kind: FieldKind) -> FieldValue {
    let obj = match obj {
        Some(o) => o,
        None => return FieldValue::None,
    };
    match obj {
        Object::String(bytes) => FieldValue::Text(decode_text_string(bytes)),
        Object::Name(name) => {
            let is_button = matches!(
                kind,
                FieldKind::Checkbox | FieldKind::RadioGroup | FieldKind::RadioWidget
            );
            if is_button && (name == "Yes" || name == "On") {
                FieldValue::Boolean(true)
            } else if is_button && (name == "No" || name == "Off") {
                FieldValue::Boolean(false)
            } else {
                FieldValue::Name(name.clone())
            }
        },
        Object::Array(array) => FieldValue::Array(
            array
                .iter()
                .filter_map(|item| match item {
                    Object::String(bytes) => Some(decode_text_string(bytes)),
                    Object::Name(name) => Some(name.clone()),
                    _ => None,
                })
                .collect(),
        ),
        Object::Boolean(b) => FieldValue::Boolean(*b),
        _ => FieldValue::None,
    }
}

/// Appearance-state names that mean "off".
fn is_off_state(state: &str) -> bool {
    state == "Off" || state.is_empty()
}
