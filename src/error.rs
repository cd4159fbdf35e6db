// Error taxonomy, severity/category classification, and the error-enrichment
// interface the driver and registry attach suggestions from.

use std::path::PathBuf;

/// Closed taxonomy of error codes surfaced by the core (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    EmptyFile,
    ParseFailed,
    PipelineError,
    StreamingPipelineError,
    MemoryLimit,
    SampleReadError,
    FormatDetectionFailed,
    DetectionProcessError,
    FieldTooLarge,
    InvalidJson,
    InvalidJsonl,
    UnsupportedFormat,
    FormatMetadata,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::EmptyFile => "EMPTY_FILE",
            ErrorCode::ParseFailed => "PARSE_FAILED",
            ErrorCode::PipelineError => "PIPELINE_ERROR",
            ErrorCode::StreamingPipelineError => "STREAMING_PIPELINE_ERROR",
            ErrorCode::MemoryLimit => "MEMORY_LIMIT",
            ErrorCode::SampleReadError => "SAMPLE_READ_ERROR",
            ErrorCode::FormatDetectionFailed => "FORMAT_DETECTION_FAILED",
            ErrorCode::DetectionProcessError => "DETECTION_PROCESS_ERROR",
            ErrorCode::FieldTooLarge => "FIELD_TOO_LARGE",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::InvalidJsonl => "INVALID_JSONL",
            ErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorCode::FormatMetadata => "FORMAT_METADATA_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an error, independent of its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Category of an error, independent of its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Parsing,
    Validation,
    Io,
    Configuration,
}

/// A row-level parse error recorded in `ParserStats.errors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub row: usize,
    pub column: Option<usize>,
    pub code: ErrorCode,
    pub message: String,
}

impl ParseError {
    pub fn new(row: usize, code: ErrorCode, message: impl Into<String>) -> Self {
        ParseError {
            row,
            column: None,
            code,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }
}

/// The crate's public error type. One variant per taxonomy code, each
/// carrying enough context to reconstruct a [`ParseError`] where applicable.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("empty file: {path}")]
    EmptyFile { path: PathBuf },

    #[error("parse failed at row {row}: {message}")]
    ParseFailed { row: usize, message: String },

    #[error("chunked I/O pipeline failed: {message}")]
    PipelineError { message: String },

    #[error("streaming pipeline failed: {message}")]
    StreamingPipelineError { message: String },

    #[error("heap watermark exceeded ({used} bytes > {threshold} bytes)")]
    MemoryLimit { used: usize, threshold: usize },

    #[error("could not read detection sample from {path}: {message}")]
    SampleReadError { path: PathBuf, message: String },

    #[error("dialect detection produced an unusable result: {message}")]
    FormatDetectionFailed { message: String },

    #[error("detection process failed: {message}")]
    DetectionProcessError { message: String },

    #[error("field at row {row}, column {column} exceeds max_field_size ({limit} bytes)")]
    FieldTooLarge {
        row: usize,
        column: usize,
        limit: usize,
    },

    #[error("invalid JSON at byte {offset}: {message}")]
    InvalidJson { offset: usize, message: String },

    #[error("invalid JSON-Lines at line {line}: {message}")]
    InvalidJsonl { line: usize, message: String },

    #[error("unsupported format for {path}: {message}")]
    UnsupportedFormat { path: PathBuf, message: String },

    #[error("format metadata error ({format}): {message}")]
    FormatMetadata { format: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IngestError::EmptyFile { .. } => ErrorCode::EmptyFile,
            IngestError::ParseFailed { .. } => ErrorCode::ParseFailed,
            IngestError::PipelineError { .. } => ErrorCode::PipelineError,
            IngestError::StreamingPipelineError { .. } => ErrorCode::StreamingPipelineError,
            IngestError::MemoryLimit { .. } => ErrorCode::MemoryLimit,
            IngestError::SampleReadError { .. } => ErrorCode::SampleReadError,
            IngestError::FormatDetectionFailed { .. } => ErrorCode::FormatDetectionFailed,
            IngestError::DetectionProcessError { .. } => ErrorCode::DetectionProcessError,
            IngestError::FieldTooLarge { .. } => ErrorCode::FieldTooLarge,
            IngestError::InvalidJson { .. } => ErrorCode::InvalidJson,
            IngestError::InvalidJsonl { .. } => ErrorCode::InvalidJsonl,
            IngestError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            IngestError::FormatMetadata { .. } => ErrorCode::FormatMetadata,
            IngestError::Io(_) => ErrorCode::PipelineError,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.code() {
            ErrorCode::EmptyFile => Severity::Low,
            ErrorCode::FieldTooLarge => Severity::Medium,
            ErrorCode::FormatDetectionFailed | ErrorCode::DetectionProcessError => {
                Severity::Medium
            }
            ErrorCode::InvalidJson | ErrorCode::InvalidJsonl => Severity::Medium,
            ErrorCode::UnsupportedFormat => Severity::High,
            ErrorCode::MemoryLimit => Severity::High,
            ErrorCode::SampleReadError => Severity::High,
            ErrorCode::PipelineError | ErrorCode::StreamingPipelineError => Severity::Critical,
            ErrorCode::ParseFailed => Severity::High,
            ErrorCode::FormatMetadata => Severity::High,
        }
    }

    pub fn category(&self) -> Category {
        match self.code() {
            ErrorCode::EmptyFile | ErrorCode::SampleReadError => Category::Io,
            ErrorCode::PipelineError | ErrorCode::StreamingPipelineError => Category::Io,
            ErrorCode::MemoryLimit => Category::Configuration,
            ErrorCode::FormatDetectionFailed
            | ErrorCode::DetectionProcessError
            | ErrorCode::UnsupportedFormat => Category::Validation,
            ErrorCode::FieldTooLarge
            | ErrorCode::ParseFailed
            | ErrorCode::InvalidJson
            | ErrorCode::InvalidJsonl
            | ErrorCode::FormatMetadata => Category::Parsing,
        }
    }
}

/// A remediation hint attached to a surfaced error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSuggestion {
    pub action: String,
    pub description: String,
    pub severity: Severity,
    pub command: Option<String>,
}

/// Consumed interface: produces remediation suggestions for specific error
/// codes. The core never invents suggestions outside this trait.
pub trait ErrorEnrichment: Send + Sync {
    fn suggestions(&self, error: &IngestError) -> Vec<ErrorSuggestion>;
}

/// Table-driven default enrichment, covering the taxonomy's most actionable
/// codes. Unmapped codes return no suggestions rather than a placeholder.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEnrichment;

impl ErrorEnrichment for DefaultEnrichment {
    fn suggestions(&self, error: &IngestError) -> Vec<ErrorSuggestion> {
        match error.code() {
            ErrorCode::UnsupportedFormat => vec![ErrorSuggestion {
                action: "force-format".into(),
                description: "No parser matched with sufficient confidence; pass an explicit \
                    format override if you know the file's layout."
                    .into(),
                severity: Severity::High,
                command: Some("--format <format>".into()),
            }],
            ErrorCode::FieldTooLarge => vec![ErrorSuggestion {
                action: "raise-max-field-size".into(),
                description: "A field exceeded max_field_size; raise the limit or switch to \
                    recovery mode to truncate instead of failing."
                    .into(),
                severity: Severity::Medium,
                command: Some("--max-field-size <bytes>".into()),
            }],
            ErrorCode::MemoryLimit => vec![ErrorSuggestion {
                action: "lower-memory-threshold".into(),
                description: "In-memory parsing exceeded the configured heap watermark; the \
                    driver will retry in streaming mode automatically."
                    .into(),
                severity: Severity::High,
                command: None,
            }],
            ErrorCode::FormatDetectionFailed => vec![ErrorSuggestion {
                action: "specify-delimiter".into(),
                description: "Dialect detection could not settle on a consistent delimiter; \
                    try specifying one explicitly."
                    .into(),
                severity: Severity::Medium,
                command: Some("--delimiter <char>".into()),
            }],
            ErrorCode::EmptyFile => vec![ErrorSuggestion {
                action: "check-input".into(),
                description: "The input file contained zero bytes.".into(),
                severity: Severity::Low,
                command: None,
            }],
            _ => Vec::new(),
        }
    }
}
