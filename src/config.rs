// ParserOptions, discriminated parse mode, and the consumed configuration
// provider interface (spec.md §3, §6).

use crate::core::LineTerminator;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the pipeline reacts to a malformed row (spec.md §3, §7, §9).
/// A sum type so a lenient-plus-recovery-strategies hybrid cannot be built.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParseMode {
    /// Abort on the first parse error.
    Strict,
    /// Record errors up to `max_errors` and continue.
    Lenient { max_errors: usize },
    /// Apply configured recovery strategies to specific error codes.
    Recovery { strategies: Vec<RecoveryStrategy> },
}

impl Default for ParseMode {
    fn default() -> Self {
        ParseMode::Lenient { max_errors: 100 }
    }
}

/// A single recovery action, keyed to the error code it applies to.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RecoveryStrategy {
    /// Drop the offending row entirely.
    SkipRow,
    /// Replace the offending field with a fixed substitute value.
    SubstituteValue(String),
    /// Truncate the offending field to the configured limit.
    TruncateField,
    /// Carry the previous row's value forward for the offending field.
    Interpolate,
}

/// Immutable configuration for a single parse. Created by the driver
/// constructor and never mutated thereafter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParserOptions {
    pub delimiter: char,
    pub quote: char,
    /// Defaults to `quote` (doubled-quote escaping) when not set explicitly.
    pub escape: char,
    pub encoding: Option<crate::model::EncodingTag>,
    pub has_header: bool,
    pub line_terminator: LineTerminator,
    pub skip_empty_lines: bool,
    pub max_rows: Option<usize>,
    pub chunk_size: usize,
    pub trim_fields: bool,
    pub max_field_size: usize,
    pub auto_detect: bool,
    pub sample_size: usize,
    /// Streaming-mode row batch size (spec.md §4.D: "accumulates rows into
    /// a batch of configurable size... when the batch fills, it is flushed
    /// to the caller and the local buffer is released").
    pub batch_size: usize,
    pub mode: ParseMode,
    /// Forced format override for the registry (spec.md §4.F step 1).
    pub format: Option<String>,
    /// Row-range selection, consumed by the columnar parser (spec.md §4.E).
    pub row_offset: usize,
    /// Sheet selection for the workbook parser, tried in this order: by
    /// name, by index, first non-empty sheet, else the first sheet
    /// (spec.md §4.E).
    pub sheet_name: Option<String>,
    pub sheet_index: Option<usize>,
}

impl ParserOptions {
    /// Build options from a `ConfigProvider`'s performance config, with
    /// spec-mandated defaults for everything the performance config does
    /// not cover. Explicit fields set afterwards via the builder methods
    /// take precedence over anything read here (spec.md §6: "reads these at
    /// driver construction and does not cache across calls").
    pub fn from_provider(provider: &dyn ConfigProvider) -> Self {
        let perf = provider.get_performance_config();
        ParserOptions {
            delimiter: ',',
            quote: '"',
            escape: '"',
            encoding: None,
            has_header: true,
            line_terminator: LineTerminator::Lf,
            skip_empty_lines: true,
            max_rows: perf.max_rows,
            chunk_size: perf.chunk_size,
            trim_fields: false,
            max_field_size: perf.max_field_size,
            auto_detect: true,
            sample_size: perf.sample_size,
            batch_size: perf.batch_size,
            mode: ParseMode::default(),
            format: None,
            row_offset: 0,
            sheet_name: None,
            sheet_index: None,
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_escape(mut self, escape: char) -> Self {
        self.escape = escape;
        self
    }

    pub fn with_mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_auto_detect(mut self, auto_detect: bool) -> Self {
        self.auto_detect = auto_detect;
        self
    }
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions::from_provider(&DefaultConfigProvider)
    }
}

/// Performance-tuning knobs the configuration provider supplies
/// (spec.md §6: `get_performance_config()`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerformanceConfig {
    pub max_rows: Option<usize>,
    pub chunk_size: usize,
    pub max_field_size: usize,
    pub sample_size: usize,
    pub batch_size: usize,
    pub memory_threshold_bytes: usize,
}

/// Streaming-mode switchover knob (spec.md §6: `get_streaming_config()`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamingConfig {
    pub memory_threshold_mb: usize,
}

/// Consumed interface: supplies performance and streaming configuration.
/// Read once at driver construction; never cached across calls.
pub trait ConfigProvider: Send + Sync {
    fn get_performance_config(&self) -> PerformanceConfig;
    fn get_streaming_config(&self) -> StreamingConfig;
}

/// Conservative engineering defaults (see DESIGN.md Open Question decisions
/// — spec.md names these fields but not their values).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConfigProvider;

impl ConfigProvider for DefaultConfigProvider {
    fn get_performance_config(&self) -> PerformanceConfig {
        PerformanceConfig {
            max_rows: None,
            chunk_size: 64 * 1024,
            max_field_size: 1024 * 1024,
            sample_size: 64 * 1024,
            batch_size: 1_000,
            memory_threshold_bytes: 512 * 1024 * 1024,
        }
    }

    fn get_streaming_config(&self) -> StreamingConfig {
        StreamingConfig {
            memory_threshold_mb: 256,
        }
    }
}
