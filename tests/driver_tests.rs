// End-to-end tests for the streaming parser driver (spec.md §4.D, §8).

use std::io::Write;

use tabular_ingest::config::{ConfigProvider, ParseMode, ParserOptions, PerformanceConfig, StreamingConfig};
use tabular_ingest::driver::ParserDriver;
use tabular_ingest::model::ParsedRow;

fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "tabular_ingest_driver_itest_{}_{}",
        std::process::id(),
        name
    ));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

struct TinyStreamingThreshold;

impl ConfigProvider for TinyStreamingThreshold {
    fn get_performance_config(&self) -> PerformanceConfig {
        PerformanceConfig {
            max_rows: None,
            chunk_size: 8,
            max_field_size: 1024 * 1024,
            sample_size: 64,
            batch_size: 10,
            memory_threshold_bytes: 512 * 1024 * 1024,
        }
    }

    fn get_streaming_config(&self) -> StreamingConfig {
        // Any file bigger than 0 MB forces the streaming path.
        StreamingConfig { memory_threshold_mb: 0 }
    }
}

#[test]
fn test_parse_small_csv_in_memory_with_header() {
    let path = write_temp("small.csv", "name,age\nAda,36\nGrace,85\n");
    let options = ParserOptions::default();
    let mut driver = ParserDriver::new(options, &tabular_ingest::config::DefaultConfigProvider);
    let stream = driver.parse(&path).unwrap();
    let rows: Vec<ParsedRow> = stream.map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].data, vec!["Ada", "36"]);
    assert_eq!(rows[1].data, vec!["Grace", "85"]);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_parse_forces_streaming_mode_past_threshold() {
    let mut contents = String::from("a,b,c\n");
    for i in 0..500 {
        contents.push_str(&format!("{i},{i},{i}\n"));
    }
    let path = write_temp("forced_streaming.csv", &contents);
    let options = ParserOptions::default();
    let mut driver = ParserDriver::new(options, &TinyStreamingThreshold);
    let stream = driver.parse(&path).unwrap();
    let rows: Vec<ParsedRow> = stream.map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 500);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_quoted_fields_with_embedded_delimiter_and_newline() {
    let path = write_temp(
        "quoted.csv",
        "name,note\n\"Doe, Jane\",\"multi\nline\"\nBob,plain\n",
    );
    let options = ParserOptions::default();
    let mut driver = ParserDriver::new(options, &tabular_ingest::config::DefaultConfigProvider);
    let stream = driver.parse(&path).unwrap();
    let rows: Vec<ParsedRow> = stream.map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].data[0], "Doe, Jane");
    assert_eq!(rows[0].data[1], "multi\nline");
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_strict_mode_surfaces_field_too_large_error() {
    let path = write_temp("strict.csv", "a,b\nabcdefghij,2\n");
    let mut options = ParserOptions::default()
        .with_mode(ParseMode::Strict)
        .with_auto_detect(false);
    options.max_field_size = 4;
    let mut driver = ParserDriver::new(options, &tabular_ingest::config::DefaultConfigProvider);
    let mut stream = driver.parse(&path).unwrap();
    let first = stream.next().unwrap();
    let err = first.unwrap_err();
    assert_eq!(err.code(), tabular_ingest::error::ErrorCode::FieldTooLarge);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_lenient_mode_truncates_oversized_field_and_continues() {
    let path = write_temp("lenient.csv", "a,b\nabcdefghij,2\nok,3\n");
    let mut options = ParserOptions::default()
        .with_mode(ParseMode::Lenient { max_errors: 10 })
        .with_auto_detect(false);
    options.max_field_size = 4;
    let mut driver = ParserDriver::new(options, &tabular_ingest::config::DefaultConfigProvider);
    let stream = driver.parse(&path).unwrap();
    let rows: Vec<ParsedRow> = stream.map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].data[0].len() <= 4);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_create_stream_drives_rows_from_pushed_chunks() {
    let options = ParserOptions::default().with_auto_detect(false);
    let driver = ParserDriver::new(options, &tabular_ingest::config::DefaultConfigProvider);
    let mut chunk_stream = driver.create_stream();

    let mut rows: Vec<ParsedRow> = Vec::new();
    rows.extend(chunk_stream.push_chunk(b"a,b\n1,").unwrap());
    rows.extend(chunk_stream.push_chunk(b"2\n3,4\n").unwrap());
    rows.extend(chunk_stream.finish().unwrap());

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].data, vec!["a", "b"]);
    assert_eq!(rows[1].data, vec!["1", "2"]);
    assert_eq!(rows[2].data, vec!["3", "4"]);
}

#[test]
fn test_create_stream_abort_stops_emission() {
    let options = ParserOptions::default().with_auto_detect(false);
    let driver = ParserDriver::new(options, &tabular_ingest::config::DefaultConfigProvider);
    let mut chunk_stream = driver.create_stream();

    let rows = chunk_stream.push_chunk(b"a,b\n1,2\n").unwrap();
    assert_eq!(rows.len(), 1);
    chunk_stream.abort();
    let rows = chunk_stream.push_chunk(b"3,4\n").unwrap();
    assert!(rows.is_empty());
    let rows = chunk_stream.finish().unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_max_rows_limits_output() {
    let path = write_temp("maxrows.csv", "a,b\n1,2\n3,4\n5,6\n7,8\n");
    let mut options = ParserOptions::default();
    options.max_rows = Some(2);
    let mut driver = ParserDriver::new(options, &tabular_ingest::config::DefaultConfigProvider);
    let stream = driver.parse(&path).unwrap();
    let rows: Vec<ParsedRow> = stream.map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    std::fs::remove_file(&path).ok();
}
