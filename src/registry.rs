// Component F — Parser Registry (spec.md §4.F).
//
// spec.md treats "detector" and "parser" as separate collaborators per
// registration; here a registration's factory builds the same `Parser`
// instance used for both, since every concrete parser in this crate is a
// thin, cheap-to-construct wrapper (`BaseParser` plus a handful of fields) —
// constructing one just to call `detect()` costs nothing a separate
// detector type would save (see DESIGN.md).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::config::ParserOptions;
use crate::error::IngestError;
use crate::parsers::columnar::ColumnarParser;
use crate::parsers::delimited::{DelimitedTextParser, TabDelimitedTextParser};
use crate::parsers::record_text::RecordTextParser;
use crate::parsers::workbook::WorkbookParser;
use crate::parsers::{DetectionResult, Parser};

pub type ParserFactory = Arc<dyn Fn() -> Box<dyn Parser> + Send + Sync>;

#[derive(Clone)]
pub struct ParserRegistration {
    pub format: String,
    pub factory: ParserFactory,
    pub priority: i32,
    pub extensions: Vec<String>,
}

impl std::fmt::Debug for ParserRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistration")
            .field("format", &self.format)
            .field("priority", &self.priority)
            .field("extensions", &self.extensions)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CandidateDetection {
    pub format: String,
    pub confidence: f64,
    pub metadata: HashMap<String, String>,
}

impl From<DetectionResult> for CandidateDetection {
    fn from(d: DetectionResult) -> Self {
        CandidateDetection {
            format: d.format,
            confidence: d.confidence,
            metadata: d.metadata,
        }
    }
}

pub struct GetParserResult {
    pub parser: Box<dyn Parser>,
    pub format: String,
    pub detection: DetectionResult,
    pub registration: ParserRegistration,
}

#[derive(Debug, Clone)]
pub struct ValidateFileResult {
    pub best: Option<CandidateDetection>,
    pub candidates: Vec<CandidateDetection>,
}

/// A process-wide (or instance-scoped) map from format tag to registration.
/// Registration is expected to happen during initialisation; reads after
/// that do not lock (spec.md §5).
#[derive(Default)]
pub struct ParserRegistry {
    registrations: HashMap<String, ParserRegistration>,
    by_extension: HashMap<String, Vec<String>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        ParserRegistry::default()
    }

    /// Registers the four built-in parser families at priorities that put
    /// content-specific formats ahead of delimited text, the one format
    /// whose detector is heuristic rather than a magic-byte or extension
    /// check (spec.md §4.F rationale).
    pub fn with_default_parsers() -> Self {
        let mut registry = ParserRegistry::new();
        registry.register(ParserRegistration {
            format: "workbook".into(),
            factory: Arc::new(|| Box::new(WorkbookParser::new())),
            priority: 90,
            extensions: vec!["xlsx".into(), "xlsm".into(), "xls".into()],
        });
        registry.register(ParserRegistration {
            format: "columnar".into(),
            factory: Arc::new(|| Box::new(ColumnarParser::new())),
            priority: 90,
            extensions: vec!["parquet".into()],
        });
        registry.register(ParserRegistration {
            format: "json".into(),
            factory: Arc::new(|| Box::new(RecordTextParser::json())),
            priority: 80,
            extensions: vec!["json".into()],
        });
        registry.register(ParserRegistration {
            format: "jsonl".into(),
            factory: Arc::new(|| Box::new(RecordTextParser::json_lines())),
            priority: 80,
            extensions: vec!["jsonl".into(), "ndjson".into()],
        });
        registry.register(ParserRegistration {
            format: "tab_delimited_text".into(),
            factory: Arc::new(|| Box::new(TabDelimitedTextParser::new())),
            priority: 60,
            extensions: vec!["tsv".into(), "tab".into()],
        });
        registry.register(ParserRegistration {
            format: "delimited_text".into(),
            factory: Arc::new(|| Box::new(DelimitedTextParser::new())),
            priority: 10,
            extensions: vec!["csv".into(), "txt".into()],
        });
        registry
    }

    /// Duplicate format tags overwrite (spec.md §4.F).
    pub fn register(&mut self, registration: ParserRegistration) {
        for ext in &registration.extensions {
            let list = self.by_extension.entry(ext.clone()).or_default();
            if !list.contains(&registration.format) {
                list.push(registration.format.clone());
            }
        }
        self.registrations
            .insert(registration.format.clone(), registration);
    }

    pub fn supported_formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self.registrations.keys().cloned().collect();
        formats.sort();
        formats
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    pub fn is_format_supported(&self, format: &str) -> bool {
        self.registrations.contains_key(format)
    }

    /// Instantiates the named format directly, never calling any parser's
    /// `detect()` (spec.md §8: "the registry, given the forced-format
    /// override, never invokes any detector").
    pub fn get_parser_by_format(
        &self,
        path: &Path,
        format: &str,
        _options: &ParserOptions,
    ) -> Result<GetParserResult, IngestError> {
        let registration =
            self.registrations
                .get(format)
                .cloned()
                .ok_or_else(|| IngestError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    message: format!("unknown format '{format}'"),
                })?;
        let parser = (registration.factory)();
        let detection = DetectionResult::new(registration.format.clone(), 1.0)
            .with_metadata("dispatch", "forced");
        Ok(GetParserResult {
            parser,
            format: registration.format.clone(),
            detection,
            registration,
        })
    }

    /// Extension candidate list, falling back to a full scan (sorted by
    /// descending priority) when the extension is unknown or unregistered
    /// (spec.md §4.F step 2).
    fn candidate_registrations(&self, path: &Path) -> Vec<&ParserRegistration> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        let by_ext = extension
            .as_ref()
            .and_then(|ext| self.by_extension.get(ext))
            .filter(|formats| !formats.is_empty());

        match by_ext {
            Some(formats) => formats
                .iter()
                .filter_map(|f| self.registrations.get(f))
                .collect(),
            None => {
                let mut all: Vec<&ParserRegistration> = self.registrations.values().collect();
                all.sort_by(|a, b| b.priority.cmp(&a.priority));
                all
            }
        }
    }

    /// The five-step dispatch algorithm (spec.md §4.F): forced format,
    /// extension candidates or full scan, per-candidate detection, a 0.1
    /// confidence band that lets priority break near-ties, and a > 0.5
    /// acceptance threshold.
    pub fn get_parser(
        &self,
        path: &Path,
        options: &ParserOptions,
    ) -> Result<GetParserResult, IngestError> {
        if let Some(format) = &options.format {
            return self.get_parser_by_format(path, format, options);
        }

        let candidates = self.candidate_registrations(path);
        if candidates.is_empty() {
            return Err(IngestError::UnsupportedFormat {
                path: path.to_path_buf(),
                message: "no parsers registered".into(),
            });
        }

        let mut detections: Vec<(&ParserRegistration, DetectionResult)> = candidates
            .into_iter()
            .map(|reg| {
                let parser = (reg.factory)();
                let detection = parser.detect(path);
                (reg, detection)
            })
            .collect();

        detections.sort_by(|(reg_a, det_a), (reg_b, det_b)| {
            let gap = (det_a.confidence - det_b.confidence).abs();
            if gap > 0.1 {
                det_b
                    .confidence
                    .partial_cmp(&det_a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            } else {
                reg_b.priority.cmp(&reg_a.priority)
            }
        });

        let (winner_reg, winner_detection) =
            detections
                .first()
                .ok_or_else(|| IngestError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    message: "no parsers registered".into(),
                })?;

        if winner_detection.confidence <= 0.5 {
            let top3: Vec<String> = detections
                .iter()
                .take(3)
                .map(|(reg, det)| format!("{}={:.2}", reg.format, det.confidence))
                .collect();
            return Err(IngestError::UnsupportedFormat {
                path: path.to_path_buf(),
                message: format!(
                    "no parser matched with sufficient confidence; supported formats: [{}]; \
                     supported extensions: [{}]; top candidates: [{}]",
                    self.supported_formats().join(", "),
                    self.supported_extensions().join(", "),
                    top3.join(", "),
                ),
            });
        }

        let registration = winner_reg.clone();
        let detection = winner_detection.clone();
        let parser = (registration.factory)();
        Ok(GetParserResult {
            parser,
            format: registration.format.clone(),
            detection,
            registration,
        })
    }

    pub fn validate_file(&self, path: &Path) -> ValidateFileResult {
        let mut candidates: Vec<CandidateDetection> = self
            .candidate_registrations(path)
            .into_iter()
            .map(|reg| {
                let parser = (reg.factory)();
                CandidateDetection::from(parser.detect(path))
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let best = candidates.first().cloned();
        ValidateFileResult { best, candidates }
    }
}

/// Process-wide default registry, constructed lazily on first use.
static SHARED: Lazy<ParserRegistry> = Lazy::new(ParserRegistry::with_default_parsers);

pub fn shared() -> &'static ParserRegistry {
    &SHARED
}
