// Columnar binary parser — Parquet-family footer-based schema format
// (spec.md §4.E).
//
// Built on `parquet`'s low-level `SerializedFileReader` (the crate's
// `default-features = false` keeps Arrow out of the dependency tree, in
// line with this crate carrying only what each format actually needs).
// `RowIter` borrows the reader for its lifetime, so unlike the delimited-
// text driver this parser materialises its rows into a `Vec` rather than
// threading a genuinely lazy iterator through a self-referential struct
// (documented as an Open Question decision in DESIGN.md).

use std::fs::File;
use std::path::Path;

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;

use crate::config::ParserOptions;
use crate::error::IngestError;
use crate::model::{ParsedRow, ParserFormat, ParserStats};
use crate::parsers::{BaseParser, DetectionResult, Parser};

pub struct ColumnarParser {
    base: BaseParser,
}

impl ColumnarParser {
    pub fn new() -> Self {
        ColumnarParser {
            base: BaseParser::new(ParserFormat::Columnar),
        }
    }
}

impl Default for ColumnarParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Integral-valued floats render without a fractional suffix or scientific
/// notation; everything else keeps Rust's default `Display` (spec.md §4.E).
fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.0}", v)
    } else {
        v.to_string()
    }
}

fn date_from_days(days: i32) -> String {
    chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days as i64)))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn timestamp_millis_to_iso(ms: i64) -> String {
    let secs = ms.div_euclid(1000);
    let nanos = (ms.rem_euclid(1000) * 1_000_000) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_default()
}

fn field_to_cell(field: &Field) -> String {
    match field {
        Field::Null => String::new(),
        Field::Float(v) => format_float(*v as f64),
        Field::Double(v) => format_float(*v),
        Field::Date(days) => date_from_days(*days),
        Field::TimestampMillis(ms) => timestamp_millis_to_iso(*ms),
        Field::TimestampMicros(us) => timestamp_millis_to_iso(us / 1000),
        other => other.to_string(),
    }
}

fn metadata_error(e: impl std::fmt::Display) -> IngestError {
    IngestError::FormatMetadata {
        format: "columnar".into(),
        message: e.to_string(),
    }
}

impl Parser for ColumnarParser {
    fn parse(
        &mut self,
        path: &Path,
        options: Option<ParserOptions>,
    ) -> Result<Box<dyn Iterator<Item = Result<ParsedRow, IngestError>>>, IngestError> {
        let options = options.unwrap_or_default();
        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file).map_err(metadata_error)?;

        let metadata = reader.metadata();
        let columns: Vec<String> = metadata
            .file_metadata()
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut rows = Vec::new();
        rows.push(ParsedRow::new(0, columns));

        let row_iter = reader.get_row_iter(None).map_err(metadata_error)?;

        let mut emitted = 0usize;
        for (source_index, row) in row_iter.enumerate() {
            if self.base.is_aborted() {
                break;
            }
            if source_index < options.row_offset {
                continue;
            }
            if let Some(max_rows) = options.max_rows {
                if emitted >= max_rows {
                    break;
                }
            }
            let row = row.map_err(metadata_error)?;
            let data: Vec<String> = row
                .get_column_iter()
                .map(|(_, field)| field_to_cell(field))
                .collect();
            emitted += 1;
            rows.push(ParsedRow::new(emitted, data));
        }

        self.base.update_stats(rows.len() as u64, 0);
        self.base.finish();
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn detect(&self, path: &Path) -> DetectionResult {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return DetectionResult::failed(self.format_name()),
        };
        match SerializedFileReader::new(file) {
            Ok(reader) => {
                let metadata = reader.metadata();
                let fmeta = metadata.file_metadata();
                DetectionResult::new(self.format_name(), 0.95)
                    .with_metadata("num_rows", fmeta.num_rows().to_string())
                    .with_metadata("row_groups", metadata.num_row_groups().to_string())
            }
            Err(_) => DetectionResult::failed(self.format_name()),
        }
    }

    fn get_stats(&self) -> ParserStats {
        self.base.get_stats()
    }

    fn abort(&mut self) {
        self.base.abort();
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["parquet"]
    }

    fn format_name(&self) -> &'static str {
        "columnar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_float_integral_has_no_decimal() {
        assert_eq!(format_float(100.0), "100");
        assert_eq!(format_float(3.5), "3.5");
    }

    #[test]
    fn test_date_from_days_epoch() {
        assert_eq!(date_from_days(0), "1970-01-01");
        assert_eq!(date_from_days(1), "1970-01-02");
    }

    #[test]
    fn test_detect_missing_file_fails_closed() {
        let parser = ColumnarParser::new();
        let result = parser.detect(Path::new("/nonexistent/tabular-ingest-test.parquet"));
        assert_eq!(result.confidence, 0.0);
    }
}
