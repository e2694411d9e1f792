//! # pdf_bem
//!
//! BEM renaming toolkit for PDF AcroForms: extract the complete
//! logical+widget field tree from a form-bearing PDF, decide a semantic
//! BEM name for every field from historical training evidence, and
//! rewrite the names in place without breaking form behavior.
//!
//! ## Subsystems
//!
//! - **Reading** (`reader`, `lexer`, `parser`, `xref`, `objstm`,
//!   `decoders`, `encryption`): the PDF object graph, with indirect
//!   references resolved on demand, object/xref streams supported, and
//!   the standard security handler for encrypted documents.
//! - **Extraction** (`fields`, `context`): the flattened field list with
//!   inherited attributes resolved and radio groups split into one
//!   logical container plus per-widget records, plus the surrounding
//!   text context of every widget.
//! - **Naming** (`training`, `naming`): preservation analysis, the
//!   four-stage generation pipeline, and validation with global
//!   uniqueness and the radio group-prefix invariant.
//! - **Modification** (`plan`, `backup`, `modify`): an ordered,
//!   conflict-checked mutation plan applied via incremental update under
//!   an exclusive lock, with mandatory backup, post-apply validation by
//!   re-extraction, and rollback.
//! - **Output** (`output`, `api`): the modified document, the mapping
//!   CSV, the JSON processing report, and the wrapper-facing entry
//!   points.
//!
//! ## Quick start
//!
//! ```no_run
//! use pdf_bem::config::ProcessOptions;
//! use pdf_bem::training::TrainingStore;
//!
//! # fn main() -> pdf_bem::error::Result<()> {
//! let training = TrainingStore::load(Vec::new())?;
//! let options = ProcessOptions::default();
//! let outcome = pdf_bem::api::process("form.pdf", &training, &options)?;
//! println!("wrote {}", outcome.artifacts.modified_path.display());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Configuration
pub mod config;

// Core PDF parsing
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod reader;
pub mod serializer;
pub mod xref;

// Stream decoders
pub mod decoders;

// Encryption support
pub mod encryption;

// Field extraction
pub mod context;
pub mod fields;

// Name generation
pub mod naming;
pub mod training;

// Safe modification
pub mod backup;
pub mod modify;
pub mod plan;

// Artifacts and the invocation surface
pub mod api;
pub mod output;

// Re-exports
pub use api::{analyze, apply, process, rollback, AnalysisResult, ExitStatus, ProcessOutcome};
pub use config::ProcessOptions;
pub use error::{Error, Result};
pub use fields::{Field, FieldKind};
pub use naming::{DecisionAction, DecisionSource, NameDecision};
pub use reader::PdfReader;
pub use training::{TrainingRecord, TrainingStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with("0."));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "pdf_bem");
    }
}
