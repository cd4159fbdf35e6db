// Component G — Common Parser Contract (spec.md §4.G).
//
// Every format-specific parser in this crate (delimited text and its tab
// variant, record-oriented text, workbook, columnar binary — component E)
// implements the `Parser` trait below rather than reimplementing stats
// bookkeeping, abort flags, and default validation thresholds; that shared
// behaviour lives on `BaseParser`, which concrete parsers hold and delegate
// to.

pub mod columnar;
pub mod delimited;
pub mod record_text;
pub mod workbook;

use crate::error::{ErrorSuggestion, IngestError, ParseError};
use crate::logging::{Logger, NullLogger};
use crate::model::{ParsedRow, ParserFormat, ParserStats};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Outcome of a detector's content probe. Confidence is always in `[0, 1]`;
/// detectors never throw, a failed probe returns confidence `0.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub format: String,
    pub confidence: f64,
    pub metadata: HashMap<String, String>,
}

impl DetectionResult {
    pub fn new(format: impl Into<String>, confidence: f64) -> Self {
        DetectionResult {
            format: format.into(),
            confidence,
            metadata: HashMap::new(),
        }
    }

    pub fn failed(format: impl Into<String>) -> Self {
        DetectionResult::new(format, 0.0)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of `Parser::validate` (spec.md §4.G).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub can_proceed: bool,
    pub suggested_fixes: Vec<ErrorSuggestion>,
}

/// Every parser, regardless of format, exposes this surface (spec.md §4.G).
/// `parse` returns an owning, boxed iterator rather than borrowing from
/// `self`, so a `Box<dyn Parser>` in the registry can hand its row sequence
/// to a caller without pinning the parser's own lifetime to it.
pub trait Parser: Send {
    fn parse(
        &mut self,
        path: &Path,
        options: Option<crate::config::ParserOptions>,
    ) -> Result<Box<dyn Iterator<Item = Result<ParsedRow, IngestError>>>, IngestError>;

    fn detect(&self, path: &Path) -> DetectionResult;

    /// Default thresholds: confidence > 0.8 is valid, > 0.5 can proceed
    /// with a warning, otherwise the file is rejected outright.
    fn validate(&self, path: &Path) -> ValidationResult {
        BaseParser::default_validate(&self.detect(path))
    }

    fn get_stats(&self) -> ParserStats;

    fn abort(&mut self);

    fn supported_extensions(&self) -> &'static [&'static str];

    fn format_name(&self) -> &'static str;
}

/// Shared bookkeeping concrete parsers compose instead of reimplementing:
/// a stats handle shareable with a detached row iterator, and an abort
/// flag checked at the iterator's suspension points (spec.md §5).
pub struct BaseParser {
    stats: Arc<Mutex<ParserStats>>,
    aborted: Arc<AtomicBool>,
    logger: Box<dyn Logger>,
}

impl BaseParser {
    pub fn new(format: ParserFormat) -> Self {
        BaseParser {
            stats: Arc::new(Mutex::new(ParserStats::new(format))),
            aborted: Arc::new(AtomicBool::new(false)),
            logger: Box::new(NullLogger),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    /// A clone of the shared stats handle for a detached iterator to mutate
    /// as it yields rows.
    pub fn stats_handle(&self) -> Arc<Mutex<ParserStats>> {
        Arc::clone(&self.stats)
    }

    pub fn aborted_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.aborted)
    }

    pub fn get_stats(&self) -> ParserStats {
        self.stats.lock().expect("stats mutex poisoned").clone()
    }

    /// Idempotent; may be called any number of times (spec.md §5).
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn update_stats(&self, rows_delta: u64, bytes_delta: u64) {
        let mut stats = self.stats.lock().expect("stats mutex poisoned");
        stats.rows_processed += rows_delta;
        stats.bytes_processed += bytes_delta;
    }

    pub fn add_error(&self, error: ParseError) {
        self.stats.lock().expect("stats mutex poisoned").errors.push(error);
    }

    pub fn finish(&self) {
        self.stats.lock().expect("stats mutex poisoned").finish();
    }

    pub fn default_validate(detection: &DetectionResult) -> ValidationResult {
        let can_proceed = detection.confidence > 0.5;
        let valid = detection.confidence > 0.8;

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !can_proceed {
            errors.push(format!(
                "no confident match for format '{}' (confidence {:.2})",
                detection.format, detection.confidence
            ));
        } else if !valid {
            warnings.push(format!(
                "low-confidence match for format '{}' (confidence {:.2}); proceeding",
                detection.format, detection.confidence
            ));
        }

        ValidationResult {
            valid,
            errors,
            warnings,
            can_proceed,
            suggested_fixes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validate_high_confidence() {
        let detection = DetectionResult::new("json", 0.95);
        let result = BaseParser::default_validate(&detection);
        assert!(result.valid);
        assert!(result.can_proceed);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_default_validate_marginal_confidence() {
        let detection = DetectionResult::new("json", 0.6);
        let result = BaseParser::default_validate(&detection);
        assert!(!result.valid);
        assert!(result.can_proceed);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_default_validate_low_confidence_rejects() {
        let detection = DetectionResult::failed("json");
        let result = BaseParser::default_validate(&detection);
        assert!(!result.valid);
        assert!(!result.can_proceed);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_base_parser_stats_and_abort() {
        let base = BaseParser::new(ParserFormat::Json);
        assert!(!base.is_aborted());
        base.update_stats(3, 120);
        base.add_error(ParseError::new(1, crate::error::ErrorCode::InvalidJson, "bad"));
        let stats = base.get_stats();
        assert_eq!(stats.rows_processed, 3);
        assert_eq!(stats.bytes_processed, 120);
        assert_eq!(stats.errors.len(), 1);
        base.abort();
        assert!(base.is_aborted());
    }
}
