// Standalone benchmark for the parsing state machine and the streaming
// driver's in-memory path.
//
// Run: cargo bench --bench parse_bench
//
// Compares the bare `StateMachine` (no encoding/dialect detection, no row
// post-processing) against `ParserDriver::parse_string` (the full pipeline)
// across clean, quoted, and wide inputs at a few sizes.

use std::time::{Duration, Instant};

use tabular_ingest::config::{DefaultConfigProvider, ParserOptions};
use tabular_ingest::driver::ParserDriver;
use tabular_ingest::state_machine::StateMachine;

fn generate_clean_csv(num_rows: usize, fields_per_row: usize) -> String {
    let mut out = String::new();
    for i in 0..num_rows {
        for j in 0..fields_per_row {
            if j > 0 {
                out.push(',');
            }
            out.push_str(&format!("field_{i}_{j}"));
        }
        out.push('\n');
    }
    out
}

fn generate_quoted_csv(num_rows: usize, fields_per_row: usize) -> String {
    let mut out = String::new();
    for i in 0..num_rows {
        for j in 0..fields_per_row {
            if j > 0 {
                out.push(',');
            }
            match j % 3 {
                0 => out.push_str(&format!("\"has,comma_{i}\"")),
                1 => out.push_str(&format!("\"has\"\"quote_{i}\"")),
                _ => out.push_str(&format!("plain_{i}_{j}")),
            }
        }
        out.push('\n');
    }
    out
}

fn generate_wide_csv(num_rows: usize, fields_per_row: usize) -> String {
    let mut out = String::new();
    for i in 0..num_rows {
        for j in 0..fields_per_row {
            if j > 0 {
                out.push(',');
            }
            out.push_str(&format!("v{i}_{j}"));
        }
        out.push('\n');
    }
    out
}

struct BenchResult {
    name: String,
    iterations: u64,
    total_time: Duration,
    input_bytes: usize,
}

impl BenchResult {
    fn avg_ns(&self) -> f64 {
        self.total_time.as_nanos() as f64 / self.iterations as f64
    }

    fn throughput_mb_s(&self) -> f64 {
        let bytes_per_iter = self.input_bytes as f64;
        let secs_per_iter = self.avg_ns() / 1_000_000_000.0;
        bytes_per_iter / secs_per_iter / 1_000_000.0
    }
}

fn bench_fn<F: FnMut()>(
    name: &str,
    input_bytes: usize,
    mut f: F,
    warmup_secs: f64,
    bench_secs: f64,
) -> BenchResult {
    let warmup_deadline = Instant::now() + Duration::from_secs_f64(warmup_secs);
    while Instant::now() < warmup_deadline {
        f();
    }

    let mut iterations: u64 = 0;
    let start = Instant::now();
    let deadline = start + Duration::from_secs_f64(bench_secs);
    while Instant::now() < deadline {
        f();
        iterations += 1;
    }
    let total_time = start.elapsed();

    BenchResult {
        name: name.to_string(),
        iterations,
        total_time,
        input_bytes,
    }
}

fn print_results(results: &[BenchResult]) {
    let max_name_len = results.iter().map(|r| r.name.len()).max().unwrap_or(0);
    let fastest_ns = results.iter().map(|r| r.avg_ns()).fold(f64::MAX, f64::min);

    for r in results {
        let avg = r.avg_ns();
        let speedup = avg / fastest_ns;
        let marker = if (speedup - 1.0).abs() < 0.01 { " (fastest)" } else { "" };
        println!(
            "  {:<width$}  {:>10.2} µs/iter  {:>8.1} MB/s  {:>6.2}x{}",
            r.name,
            avg / 1000.0,
            r.throughput_mb_s(),
            speedup,
            marker,
            width = max_name_len,
        );
    }
}

fn run_suite(label: &str, text: &str, warmup: f64, time: f64) {
    println!("\n--- {label} ({} bytes) ---", text.len());

    let results = vec![
        bench_fn(
            "StateMachine (raw, no detection)",
            text.len(),
            || {
                let mut sm = StateMachine::new(',', '"', '"', 1024 * 1024);
                let _ = sm.feed(text);
                let _ = sm.finalize();
            },
            warmup,
            time,
        ),
        bench_fn(
            "ParserDriver::parse_string (full pipeline)",
            text.len(),
            || {
                let options = ParserOptions::default().with_auto_detect(false);
                let mut driver = ParserDriver::new(options, &DefaultConfigProvider);
                let _ = driver.parse_string(text);
            },
            warmup,
            time,
        ),
    ];

    print_results(&results);
}

fn main() {
    println!("=== tabular-ingest parse benchmark ===");
    let warmup = 0.5;
    let time = 2.0;

    for &rows in &[1_000usize, 10_000, 100_000] {
        let clean = generate_clean_csv(rows, 10);
        run_suite(&format!("{rows} rows x 10 fields (clean)"), &clean, warmup, time);

        let quoted = generate_quoted_csv(rows, 10);
        run_suite(&format!("{rows} rows x 10 fields (quoted)"), &quoted, warmup, time);
    }

    let wide = generate_wide_csv(10_000, 100);
    run_suite("10,000 rows x 100 fields (wide)", &wide, warmup, time);

    println!("\n=== Done ===");
}
