//! Processing configuration.

use std::path::PathBuf;

/// Options controlling one processing run.
///
/// Defaults match the documented option surface: confidence threshold
/// 0.8, safety threshold 0.5, large-form threshold 1000, 120 second time
/// budget, preservation mode on, exact-match support 2.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Minimum decision confidence below which a decision is flagged for
    /// review in the report
    pub confidence_threshold: f64,
    /// Minimum plan safety score required before mutation
    pub safety_threshold: f64,
    /// Field count above which a `LargeForm` warning is emitted
    pub large_form_threshold: usize,
    /// Per-document time budget in seconds
    pub time_budget_seconds: u64,
    /// Whether names that already satisfy the grammar may be preserved
    pub preservation_mode: bool,
    /// Minimum training support for an exact-match generation hit
    pub exact_match_min_support: u32,
    /// Passphrase for encrypted documents
    pub passphrase: Option<String>,
    /// Directory for output artifacts; defaults to the input's directory
    pub output_dir: Option<PathBuf>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            safety_threshold: 0.5,
            large_form_threshold: 1000,
            time_budget_seconds: 120,
            preservation_mode: true,
            exact_match_min_support: 2,
            passphrase: None,
            output_dir: None,
        }
    }
}
