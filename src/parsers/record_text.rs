// Record-oriented text parser — JSON array/object and JSON-Lines (spec.md §4.E).
//
// The line-by-line `serde_json::from_str` probe is grounded in the pack's
// JSONL readers (e.g. the zstd JSONL streamer in the retrieval pack); full-
// document parse is tried first since an exported array of objects is the
// common shape for tabular JSON.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use serde_json::Value;

use crate::config::{ParseMode, ParserOptions};
use crate::error::{ErrorCode, IngestError, ParseError};
use crate::model::{ParsedRow, ParserFormat};
use crate::parsers::{BaseParser, DetectionResult, Parser};

const DETECT_SAMPLE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordShape {
    Json,
    JsonLines,
}

fn read_sample(path: &Path, max_bytes: usize) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut buf = vec![0u8; max_bytes];
    let n = file.take(max_bytes as u64).read(&mut buf).ok()?;
    buf.truncate(n);
    String::from_utf8(buf).ok()
}

/// Classify a text sample: full-document JSON parse first, falling back to
/// a per-line JSON-Lines probe over the first 10 non-empty lines
/// (spec.md §4.E).
fn probe_shape(sample: &str) -> (RecordShape, f64) {
    if let Ok(value) = serde_json::from_str::<Value>(sample) {
        return match value {
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                (RecordShape::Json, 0.95)
            }
            Value::Object(_) => (RecordShape::Json, 0.9),
            _ => (RecordShape::Json, 0.3),
        };
    }

    let lines: Vec<&str> = sample.lines().filter(|l| !l.trim().is_empty()).take(10).collect();
    if lines.is_empty() {
        return (RecordShape::JsonLines, 0.0);
    }
    let parsed = lines
        .iter()
        .filter(|l| {
            serde_json::from_str::<Value>(l)
                .map(|v| v.is_object())
                .unwrap_or(false)
        })
        .count();
    let ratio = parsed as f64 / lines.len() as f64;
    if ratio >= 0.7 {
        (RecordShape::JsonLines, 0.9)
    } else {
        (RecordShape::JsonLines, ratio * 0.5)
    }
}

fn value_to_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Flattens a nested JSON object with `sep`-joined key paths. Arrays
/// serialise as a `;`-joined string of their stringified elements (best
/// effort, documented behaviour — spec.md §4.E).
fn flatten(value: &Value, prefix: &str, sep: &str, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}{sep}{key}")
                };
                flatten(val, &path, sep, out);
            }
        }
        Value::Array(items) => {
            let joined = items.iter().map(value_to_cell).collect::<Vec<_>>().join(";");
            out.insert(prefix.to_string(), joined);
        }
        other => {
            out.insert(prefix.to_string(), value_to_cell(other));
        }
    }
}

fn flatten_record(value: &Value, sep: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten(value, "", sep, &mut out);
    out
}

/// Handles both registrations spec.md §4.E lists under record-oriented
/// text: full JSON documents and newline-delimited JSON. `target` pins
/// which format this instance reports itself as to the registry; `parse`
/// re-derives the actual shape from file content rather than trusting the
/// registration, since detection already established the match.
pub struct RecordTextParser {
    base: BaseParser,
    target: RecordShape,
    flatten_separator: String,
}

impl RecordTextParser {
    pub fn json() -> Self {
        RecordTextParser {
            base: BaseParser::new(ParserFormat::Json),
            target: RecordShape::Json,
            flatten_separator: ".".to_string(),
        }
    }

    pub fn json_lines() -> Self {
        RecordTextParser {
            base: BaseParser::new(ParserFormat::JsonLines),
            target: RecordShape::JsonLines,
            flatten_separator: ".".to_string(),
        }
    }

    pub fn with_flatten_separator(mut self, sep: impl Into<String>) -> Self {
        self.flatten_separator = sep.into();
        self
    }

    fn parse_json_document(&self, text: &str) -> Result<Vec<Value>, IngestError> {
        let value: Value = serde_json::from_str(text).map_err(|e| IngestError::InvalidJson {
            offset: e.column(),
            message: e.to_string(),
        })?;
        Ok(match value {
            Value::Array(items) => items,
            other => vec![other],
        })
    }

    fn parse_json_lines(
        &mut self,
        text: &str,
        mode: &ParseMode,
    ) -> Result<Vec<Value>, IngestError> {
        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if self.base.is_aborted() {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) => records.push(value),
                Err(e) => match mode {
                    ParseMode::Strict => {
                        return Err(IngestError::InvalidJsonl {
                            line: idx + 1,
                            message: e.to_string(),
                        })
                    }
                    _ => self.base.add_error(ParseError::new(
                        idx + 1,
                        ErrorCode::InvalidJsonl,
                        e.to_string(),
                    )),
                },
            }
        }
        Ok(records)
    }
}

impl Parser for RecordTextParser {
    fn parse(
        &mut self,
        path: &Path,
        options: Option<ParserOptions>,
    ) -> Result<Box<dyn Iterator<Item = Result<ParsedRow, IngestError>>>, IngestError> {
        let options = options.unwrap_or_default();
        let text = fs::read_to_string(path)?;

        let records = match self.target {
            RecordShape::Json => self.parse_json_document(&text)?,
            RecordShape::JsonLines => self.parse_json_lines(&text, &options.mode)?,
        };

        if records.is_empty() {
            self.base.finish();
            return Ok(Box::new(std::iter::empty()));
        }

        let first = flatten_record(&records[0], &self.flatten_separator);
        let header: Vec<String> = first.keys().cloned().collect();

        let mut rows = Vec::with_capacity(records.len() + 1);
        rows.push(ParsedRow::new(0, header.clone()));

        for (i, record) in records.iter().enumerate() {
            if let Some(max_rows) = options.max_rows {
                if rows.len() >= max_rows {
                    break;
                }
            }
            let map = flatten_record(record, &self.flatten_separator);
            let mut data: Vec<String> = header
                .iter()
                .map(|h| map.get(h).cloned().unwrap_or_default())
                .collect();
            for cell in data.iter_mut() {
                if options.trim_fields {
                    *cell = cell.trim().to_string();
                }
                if cell.len() > options.max_field_size {
                    let limit = options.max_field_size.saturating_sub(3);
                    cell.truncate(limit);
                    cell.push_str("...");
                }
            }
            rows.push(ParsedRow::new(i + 1, data));
        }

        self.base
            .update_stats(rows.len() as u64, text.len() as u64);
        self.base.finish();
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn detect(&self, path: &Path) -> DetectionResult {
        let Some(sample) = read_sample(path, DETECT_SAMPLE_BYTES) else {
            return DetectionResult::failed(self.format_name());
        };
        let (shape, confidence) = probe_shape(&sample);
        if shape == self.target {
            DetectionResult::new(self.format_name(), confidence)
        } else {
            DetectionResult::failed(self.format_name())
        }
    }

    fn get_stats(&self) -> crate::model::ParserStats {
        self.base.get_stats()
    }

    fn abort(&mut self) {
        self.base.abort();
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        match self.target {
            RecordShape::Json => &["json"],
            RecordShape::JsonLines => &["jsonl", "ndjson"],
        }
    }

    fn format_name(&self) -> &'static str {
        match self.target {
            RecordShape::Json => "json",
            RecordShape::JsonLines => "jsonl",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "tabular_ingest_record_text_test_{}_{}",
            std::process::id(),
            name
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_probe_shape_array_of_objects() {
        let (shape, confidence) = probe_shape(r#"[{"a":1},{"a":2}]"#);
        assert_eq!(shape, RecordShape::Json);
        assert!(confidence >= 0.9);
    }

    #[test]
    fn test_probe_shape_jsonlines() {
        let (shape, confidence) = probe_shape("{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n");
        assert_eq!(shape, RecordShape::JsonLines);
        assert!(confidence >= 0.9);
    }

    #[test]
    fn test_flatten_nested_object_and_array() {
        let value: Value = serde_json::from_str(r#"{"a":{"b":1},"c":[1,2,3]}"#).unwrap();
        let flat = flatten_record(&value, ".");
        assert_eq!(flat.get("a.b"), Some(&"1".to_string()));
        assert_eq!(flat.get("c"), Some(&"1;2;3".to_string()));
    }

    #[test]
    fn test_parse_json_array_projects_missing_keys_as_empty() {
        let path = write_temp("array.json", r#"[{"a":1,"b":2},{"a":3}]"#);
        let mut parser = RecordTextParser::json();
        let rows: Vec<ParsedRow> = parser
            .parse(&path, None)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows.len(), 3); // header + 2 records
        assert_eq!(rows[0].data, vec!["a", "b"]);
        assert_eq!(rows[2].data, vec!["3", ""]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_parse_jsonlines_lenient_skips_bad_line() {
        let path = write_temp(
            "lines.jsonl",
            "{\"a\":1}\nnot json\n{\"a\":2}\n",
        );
        let mut parser = RecordTextParser::json_lines();
        let options = ParserOptions::default().with_mode(ParseMode::Lenient { max_errors: 10 });
        let rows: Vec<ParsedRow> = parser
            .parse(&path, Some(options))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows.len(), 3); // header + 2 good records
        assert_eq!(parser.get_stats().errors.len(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_parse_jsonlines_strict_aborts_on_bad_line() {
        let path = write_temp("lines_strict.jsonl", "{\"a\":1}\nnot json\n");
        let mut parser = RecordTextParser::json_lines();
        let options = ParserOptions::default().with_mode(ParseMode::Strict);
        let result = parser.parse(&path, Some(options));
        assert!(result.is_err());
        std::fs::remove_file(&path).ok();
    }
}
