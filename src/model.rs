// Data model types shared across components (spec.md §3).

use crate::core::LineTerminator;
use crate::error::ParseError;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Encoding tag drawn from the closed set the Encoding Detector can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EncodingTag {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl EncodingTag {
    pub fn as_str(self) -> &'static str {
        match self {
            EncodingTag::Utf8 => "utf8",
            EncodingTag::Utf16Le => "utf16-le",
            EncodingTag::Utf16Be => "utf16-be",
        }
    }
}

/// Result of the Encoding Detector (component A). Immutable once returned.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectedEncoding {
    pub encoding: EncodingTag,
    pub confidence: f64,
    pub has_bom: bool,
    pub bom_length: usize,
}

impl DetectedEncoding {
    /// `utf16-be` is remapped to `utf16-le` for consumers that cannot
    /// distinguish; the original tag is preserved in `encoding` (spec.md §3,
    /// §9 Open Questions).
    pub fn effective_tag(&self) -> EncodingTag {
        match self.encoding {
            EncodingTag::Utf16Be => EncodingTag::Utf16Le,
            other => other,
        }
    }
}

/// Result of the Dialect Detector (component B). Immutable once returned.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectedDialect {
    pub delimiter: char,
    pub quote: char,
    pub line_terminator: LineTerminator,
    pub has_header: bool,
    pub delimiter_confidence: f64,
    pub quote_confidence: f64,
    pub line_terminator_confidence: f64,
    pub has_header_confidence: f64,
}

/// One emitted row. `index` is the row's position in the emitted sequence
/// after empty-line skipping and header removal — not a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub index: usize,
    pub data: Vec<String>,
    pub raw: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl ParsedRow {
    pub fn new(index: usize, data: Vec<String>) -> Self {
        ParsedRow {
            index,
            data,
            raw: None,
            metadata: None,
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

/// Format tag reported in `ParserStats.format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserFormat {
    DelimitedText,
    TabDelimitedText,
    Json,
    JsonLines,
    Workbook,
    Columnar,
}

impl ParserFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ParserFormat::DelimitedText => "delimited_text",
            ParserFormat::TabDelimitedText => "tab_delimited_text",
            ParserFormat::Json => "json",
            ParserFormat::JsonLines => "jsonl",
            ParserFormat::Workbook => "workbook",
            ParserFormat::Columnar => "columnar",
        }
    }
}

/// Mutated only by the parser driver that owns it; read-only to consumers.
#[derive(Debug, Clone)]
pub struct ParserStats {
    pub bytes_processed: u64,
    pub rows_processed: u64,
    pub errors: Vec<ParseError>,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub peak_memory_usage: Option<usize>,
    pub format: ParserFormat,
}

impl ParserStats {
    pub fn new(format: ParserFormat) -> Self {
        ParserStats {
            bytes_processed: 0,
            rows_processed: 0,
            errors: Vec::new(),
            start_time: Instant::now(),
            end_time: None,
            peak_memory_usage: None,
            format,
        }
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Instant::now());
        if let Some(peak) = crate::peak_allocated_bytes() {
            self.peak_memory_usage = Some(peak);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.end_time
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.start_time)
    }

    /// True once errors exceed 10% of processed rows after at least 10
    /// errors have accumulated (spec.md §7 propagation policy).
    pub fn error_rate_exceeded(&self) -> bool {
        self.errors.len() >= 10
            && self.rows_processed > 0
            && (self.errors.len() as f64) > 0.10 * (self.rows_processed as f64)
    }
}
