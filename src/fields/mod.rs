//! Form field model.
//!
//! A [`Field`] is one interactive control or container from the AcroForm
//! tree, flattened: inherited attributes are resolved onto the record and
//! radio groups appear as one logical container plus one record per
//! widget annotation.

use serde::Serialize;

use crate::object::ObjectRef;

pub mod extractor;

pub use extractor::{ExtractionResult, FieldExtractor};

bitflags::bitflags! {
    /// Field flags from the inherited /Ff word (ISO 32000-1, Tables 221/226/227/230).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldFlags: u32 {
        /// Field is read-only
        const READ_ONLY = 1 << 0;
        /// Field must have a value at submit time
        const REQUIRED = 1 << 1;
        /// Field is excluded from form submission
        const NO_EXPORT = 1 << 2;
        /// Text field spans multiple lines
        const MULTILINE = 1 << 12;
        /// Text field is a password entry
        const PASSWORD = 1 << 13;
        /// Exactly one radio button must be on at all times
        const NO_TOGGLE_TO_OFF = 1 << 14;
        /// Button field is a set of radio buttons
        const RADIO = 1 << 15;
        /// Button field is a push button
        const PUSHBUTTON = 1 << 16;
        /// Choice field is a combo box
        const COMBO = 1 << 17;
        /// Radio buttons with the same export value toggle in unison
        const RADIOS_IN_UNISON = 1 << 25;
    }
}

/// Classified field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Single or multi-line text input
    Text,
    /// Toggleable checkbox
    Checkbox,
    /// Logical radio group holding the selection
    RadioGroup,
    /// One visible option of a radio group
    RadioWidget,
    /// List or combo box
    Choice,
    /// Signature field
    Signature,
    /// Pushbuttons and anything unclassifiable
    Unknown,
}

impl FieldKind {
    /// Lowercase token used in fingerprints, fallbacks and reports.
    pub fn token(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Checkbox => "checkbox",
            FieldKind::RadioGroup => "radio_group",
            FieldKind::RadioWidget => "radio_widget",
            FieldKind::Choice => "choice",
            FieldKind::Signature => "signature",
            FieldKind::Unknown => "unknown",
        }
    }
}

/// Value of a field, from the inherited /V entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Text string value
    Text(String),
    /// On/off state (checkboxes)
    Boolean(bool),
    /// Name value (radio selections, choice fields)
    Name(String),
    /// Multi-select list values
    Array(Vec<String>),
    /// No value present
    None,
}

impl FieldValue {
    /// Whether there is no value.
    pub fn is_none(&self) -> bool {
        matches!(self, FieldValue::None)
    }
}

/// One flattened form field record.
#[derive(Debug, Clone)]
pub struct Field {
    /// Stable internally-assigned id (`field_0007`, `field_0007_0`, ...)
    pub id: String,
    /// Fully qualified name as PDF consumers see it
    pub name: String,
    /// The local /T title this field's object owns, if any
    pub local_title: Option<String>,
    /// Classified kind
    pub kind: FieldKind,
    /// 1-based page number; `None` for container-only fields
    pub page: Option<u32>,
    /// Widget rectangle in PDF user space; `None` for containers
    pub rect: Option<[f64; 4]>,
    /// Inherited value
    pub value: FieldValue,
    /// Inherited flags
    pub flags: FieldFlags,
    /// Parent field id, if nested
    pub parent_id: Option<String>,
    /// Child field ids in document order
    pub child_ids: Vec<String>,
    /// Export value for radio/checkbox widgets
    pub export_value: Option<String>,
    /// Tooltip from /TU
    pub tooltip: Option<String>,
    /// Back-reference to the object that defines this field
    pub object_ref: Option<ObjectRef>,
    /// Whether this record is a group container (no widget of its own)
    pub is_group_container: bool,
}

impl Field {
    /// Center of the widget rectangle, if the field has one.
    pub fn center(&self) -> Option<(f64, f64)> {
        self.rect
            .map(|[x1, y1, x2, y2]| ((x1 + x2) / 2.0, (y1 + y2) / 2.0))
    }

    /// Whether this field is a renaming target (owns a name of its own).
    pub fn is_renameable(&self) -> bool {
        !self.name.is_empty() && self.kind != FieldKind::Unknown
    }
}

/// Non-fatal condition collected during extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionWarning {
    /// The field tree contains a cycle; the repeated node was skipped
    CircularField {
        /// Display form of the repeated object reference
        object_ref: String,
    },
    /// A widget rectangle was malformed and replaced with zeros
    BadRect {
        /// Id of the affected field
        field_id: String,
    },
    /// The form exceeds the configured field-count threshold
    LargeForm {
        /// Total number of extracted fields
        count: usize,
    },
    /// A field failed to parse and was omitted
    FieldSkipped {
        /// Display form of the failing object reference
        object_ref: String,
        /// What went wrong
        reason: String,
    },
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionWarning::CircularField { object_ref } => {
                write!(f, "circular field reference at {}", object_ref)
            },
            ExtractionWarning::BadRect { field_id } => {
                write!(f, "malformed rectangle on {}", field_id)
            },
            ExtractionWarning::LargeForm { count } => {
                write!(f, "large form: {} fields", count)
            },
            ExtractionWarning::FieldSkipped { object_ref, reason } => {
                write!(f, "field at {} skipped: {}", object_ref, reason)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_word() {
        let flags = FieldFlags::from_bits_truncate((1 << 15) | (1 << 1));
        assert!(flags.contains(FieldFlags::RADIO));
        assert!(flags.contains(FieldFlags::REQUIRED));
        assert!(!flags.contains(FieldFlags::PUSHBUTTON));
    }

    #[test]
    fn test_kind_tokens() {
        assert_eq!(FieldKind::RadioGroup.token(), "radio_group");
        assert_eq!(FieldKind::Text.token(), "text");
    }

    #[test]
    fn test_center() {
        let field = Field {
            id: "field_0000".to_string(),
            name: "f".to_string(),
            local_title: Some("f".to_string()),
            kind: FieldKind::Text,
            page: Some(1),
            rect: Some([10.0, 20.0, 30.0, 40.0]),
            value: FieldValue::None,
            flags: FieldFlags::empty(),
            parent_id: None,
            child_ids: Vec::new(),
            export_value: None,
            tooltip: None,
            object_ref: None,
            is_group_container: false,
        };
        assert_eq!(field.center(), Some((20.0, 30.0)));
    }

    #[test]
    fn test_warning_display() {
        let warning = ExtractionWarning::LargeForm { count: 1200 };
        assert!(warning.to_string().contains("1200"));
    }
}
