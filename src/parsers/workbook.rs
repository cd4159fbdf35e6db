// Workbook parser — Office Open XML family and legacy `.xls` (spec.md §4.E).
//
// Built on `calamine`, which already resolves rich-text runs, formula
// cached results, and hyperlink display text down to a single cell value by
// the time a `Data` reaches this parser — there is nothing left for this
// module to do for those three cases beyond picking the right `Data`
// variant's string form.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::config::ParserOptions;
use crate::error::IngestError;
use crate::model::{ParsedRow, ParserFormat, ParserStats};
use crate::parsers::{BaseParser, DetectionResult, Parser};

pub struct WorkbookParser {
    base: BaseParser,
}

impl WorkbookParser {
    pub fn new() -> Self {
        WorkbookParser {
            base: BaseParser::new(ParserFormat::Workbook),
        }
    }
}

impl Default for WorkbookParser {
    fn default() -> Self {
        Self::new()
    }
}

fn metadata_error(e: impl std::fmt::Display) -> IngestError {
    IngestError::FormatMetadata {
        format: "workbook".into(),
        message: e.to_string(),
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{:.0}", f)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERROR:{e:?}"),
    }
}

/// By name, then by index, then the first non-empty sheet, else the first
/// sheet at all (spec.md §4.E).
fn select_sheet(
    workbook: &mut calamine::Sheets<std::io::BufReader<std::fs::File>>,
    options: &ParserOptions,
) -> Result<String, IngestError> {
    let sheet_names = workbook.sheet_names().to_owned();
    if sheet_names.is_empty() {
        return Err(IngestError::FormatMetadata {
            format: "workbook".into(),
            message: "workbook contains no sheets".into(),
        });
    }

    if let Some(name) = &options.sheet_name {
        if sheet_names.iter().any(|n| n == name) {
            return Ok(name.clone());
        }
    }
    if let Some(idx) = options.sheet_index {
        if let Some(name) = sheet_names.get(idx) {
            return Ok(name.clone());
        }
    }
    for name in &sheet_names {
        if let Ok(range) = workbook.worksheet_range(name) {
            if range.rows().next().is_some() {
                return Ok(name.clone());
            }
        }
    }
    Ok(sheet_names[0].clone())
}

impl Parser for WorkbookParser {
    fn parse(
        &mut self,
        path: &Path,
        options: Option<ParserOptions>,
    ) -> Result<Box<dyn Iterator<Item = Result<ParsedRow, IngestError>>>, IngestError> {
        let options = options.unwrap_or_default();
        let mut workbook = open_workbook_auto(path).map_err(metadata_error)?;
        let sheet_name = select_sheet(&mut workbook, &options)?;
        let range = workbook.worksheet_range(&sheet_name).map_err(metadata_error)?;

        let raw_rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        let header_width = raw_rows.first().map(Vec::len).unwrap_or(0);

        let mut rows = Vec::with_capacity(raw_rows.len());
        for (i, mut row) in raw_rows.into_iter().enumerate() {
            if self.base.is_aborted() {
                break;
            }
            match row.len().cmp(&header_width) {
                std::cmp::Ordering::Less => row.resize(header_width, String::new()),
                std::cmp::Ordering::Greater => row.truncate(header_width),
                std::cmp::Ordering::Equal => {}
            }
            rows.push(ParsedRow::new(i, row));
            if let Some(max_rows) = options.max_rows {
                if rows.len() >= max_rows {
                    break;
                }
            }
        }

        self.base.update_stats(rows.len() as u64, 0);
        self.base.finish();
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn detect(&self, path: &Path) -> DetectionResult {
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_lowercase().as_str(), "xlsx" | "xlsm" | "xls"))
            .unwrap_or(false);
        if !ext_ok {
            return DetectionResult::failed(self.format_name());
        }
        match open_workbook_auto(path) {
            Ok(workbook) => {
                let names = workbook.sheet_names();
                if names.is_empty() {
                    DetectionResult::new(self.format_name(), 0.4)
                } else {
                    DetectionResult::new(self.format_name(), 0.9)
                        .with_metadata("sheets", names.len().to_string())
                }
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
        &["xlsx", "xlsm", "xls"]
    }

    fn format_name(&self) -> &'static str {
        "workbook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_to_string_integral_float() {
        assert_eq!(cell_to_string(&Data::Float(42.0)), "42");
        assert_eq!(cell_to_string(&Data::Float(4.5)), "4.5");
    }

    #[test]
    fn test_cell_to_string_bool_and_empty() {
        assert_eq!(cell_to_string(&Data::Bool(true)), "true");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }

    #[test]
    fn test_detect_rejects_wrong_extension() {
        let parser = WorkbookParser::new();
        let result = parser.detect(Path::new("data.csv"));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_detect_missing_file_fails_closed() {
        let parser = WorkbookParser::new();
        let result = parser.detect(Path::new("/nonexistent/tabular-ingest-test.xlsx"));
        assert_eq!(result.confidence, 0.0);
    }
}
