// Component B — Dialect Detector (spec.md §4.B).

use crate::core::LineTerminator;
use crate::model::DetectedDialect;

const DELIMITER_CANDIDATES: [char; 5] = [',', '\t', ';', '|', ':'];
const QUOTE_CANDIDATES: [char; 3] = ['"', '\'', '`'];
const HEADER_VOCAB: [&str; 12] = [
    "name",
    "id",
    "type",
    "date",
    "time",
    "value",
    "count",
    "amount",
    "price",
    "total",
    "status",
    "description",
];

/// Infer delimiter, quote, line terminator, and header presence from a
/// decoded text sample of up to ~1 MiB.
pub fn detect_dialect(sample: &str) -> DetectedDialect {
    let lines: Vec<&str> = sample.lines().take(100).collect();

    let (line_terminator, line_terminator_confidence) = detect_line_terminator(sample);

    if lines.len() < 2 {
        return DetectedDialect {
            delimiter: ',',
            quote: '"',
            line_terminator,
            has_header: false,
            delimiter_confidence: 0.5,
            quote_confidence: 0.5,
            line_terminator_confidence,
            has_header_confidence: 0.0,
        };
    }

    let non_empty: Vec<&str> = lines.iter().copied().filter(|l| !l.is_empty()).collect();

    let (delimiter, delimiter_confidence) = detect_delimiter(&non_empty);
    let (quote, quote_confidence) = detect_quote(&non_empty, delimiter);
    let (has_header, has_header_confidence) = detect_header(&non_empty, delimiter, quote);

    DetectedDialect {
        delimiter,
        quote,
        line_terminator,
        has_header,
        delimiter_confidence,
        quote_confidence,
        line_terminator_confidence,
        has_header_confidence,
    }
}

fn detect_line_terminator(sample: &str) -> (LineTerminator, f64) {
    let bytes = sample.as_bytes();
    let mut crlf = 0usize;
    let mut lone_lf = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            if i > 0 && bytes[i - 1] == b'\r' {
                crlf += 1;
            } else {
                lone_lf += 1;
            }
        }
        i += 1;
    }
    let total = crlf + lone_lf;
    if total == 0 {
        return (LineTerminator::Lf, 0.5);
    }
    if crlf > lone_lf {
        (LineTerminator::Crlf, crlf as f64 / total as f64)
    } else {
        // Ties resolve to LF.
        (LineTerminator::Lf, lone_lf.max(crlf) as f64 / total as f64)
    }
}

fn naive_field_count(line: &str, delimiter: char) -> usize {
    line.matches(delimiter).count() + 1
}

/// Consistency score for a single candidate delimiter: zero variance with
/// mean >= 2 scores highest, a +0.10 bonus for wide rows (capped at 0.98),
/// and the whole thing halved when the mean is below 2 (spec.md §4.B step 3).
fn consistency_score(counts: &[usize]) -> (f64, f64) {
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<usize>() as f64 / n;
    let variance = counts
        .iter()
        .map(|&c| {
            let d = c as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;

    let mut score = if variance == 0.0 && mean >= 2.0 {
        0.95
    } else if variance < 0.25 {
        0.85
    } else if variance < 1.0 {
        0.70
    } else if mean >= 2.0 {
        0.60
    } else {
        0.30
    };

    if mean >= 3.0 {
        score = (score + 0.10_f64).min(0.98);
    }
    if mean < 2.0 {
        score *= 0.5;
    }

    (score, mean)
}

fn detect_delimiter(lines: &[&str]) -> (char, f64) {
    let sample: Vec<&str> = lines.iter().copied().take(20).collect();
    if sample.is_empty() {
        return (',', 0.5);
    }

    // (delimiter, raw consistency score, tie-break rank)
    let mut best: Option<(char, f64, f64)> = None;

    for &delim in DELIMITER_CANDIDATES.iter() {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| naive_field_count(line, delim))
            .collect();
        let (score, mean) = consistency_score(&counts);
        let ranked = score + (0.1 * (mean + 1.0).ln()).min(0.3);

        // Stable: the earlier-listed candidate wins exact ties, so only
        // replace the incumbent on a strictly greater rank.
        let replace = match &best {
            None => true,
            Some((_, _, best_ranked)) => ranked > *best_ranked,
        };
        if replace {
            best = Some((delim, score, ranked));
        }
    }

    let (winner, score, _) = best.unwrap_or((',', 0.5, 0.5));
    (winner, score)
}

fn detect_quote(lines: &[&str], delimiter: char) -> (char, f64) {
    let sample: Vec<&str> = lines.iter().copied().take(10).collect();
    if sample.is_empty() {
        return ('"', 0.1);
    }

    let mut best: Option<(char, f64)> = None;

    for &q in QUOTE_CANDIDATES.iter() {
        let mut quoted = 0usize;
        let mut proper_pairs = 0usize;
        let mut total_fields = 0usize;

        for line in &sample {
            for field in line.split(delimiter) {
                total_fields += 1;
                let trimmed = field.trim();
                if trimmed.starts_with(q) && trimmed.ends_with(q) && trimmed.chars().count() >= 2 {
                    quoted += 1;
                    proper_pairs += 1;
                } else if trimmed.starts_with(q) || trimmed.ends_with(q) {
                    quoted += 1;
                }
            }
        }

        if total_fields == 0 {
            continue;
        }

        // Primary ratio per spec.md §4.B: fields whose trimmed form both
        // starts and ends with the candidate quote char. `quoted` (loose,
        // one-sided matches included) is kept only as an auxiliary signal
        // for the weakest tier, so a malformed single-quote field can't
        // inflate the main score.
        let ratio = proper_pairs as f64 / total_fields as f64;

        let score = if ratio > 0.3 {
            0.9
        } else if ratio > 0.1 {
            0.7
        } else if quoted > 0 {
            0.5
        } else {
            0.1
        };

        let replace = match &best {
            None => true,
            Some((_, best_score)) => score > *best_score,
        };
        if replace {
            best = Some((q, score));
        }
    }

    best.unwrap_or(('"', 0.1))
}

fn split_respecting_quotes(line: &str, delimiter: char, quote: char) -> Vec<String> {
    // Naive split is adequate for header-shape comparison; full quote
    // handling belongs to the state machine (component C). Strip a single
    // layer of surrounding quote characters so shape checks below see the
    // cell's logical content.
    line.split(delimiter)
        .map(|f| {
            let t = f.trim();
            if t.len() >= 2 && t.starts_with(quote) && t.ends_with(quote) {
                t[quote.len_utf8()..t.len() - quote.len_utf8()].to_string()
            } else {
                t.to_string()
            }
        })
        .collect()
}

fn looks_like_header_cell(cell: &str, below: &str) -> bool {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 50 {
        return false;
    }
    if !trimmed.chars().any(|c| c.is_alphabetic()) {
        return false;
    }

    let below_trimmed = below.trim();
    let below_is_numeric = !below_trimmed.is_empty() && below_trimmed.parse::<f64>().is_ok();
    let this_is_numeric = trimmed.parse::<f64>().is_ok();
    if this_is_numeric && below_is_numeric {
        return false;
    }

    if HEADER_VOCAB.contains(&trimmed.to_lowercase().as_str()) {
        return true;
    }

    is_identifier_shaped(trimmed)
}

fn is_identifier_shaped(s: &str) -> bool {
    let all_word_chars = s
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == ' ');
    if !all_word_chars {
        return false;
    }
    let has_letter = s.chars().any(|c| c.is_alphabetic());
    has_letter
}

fn detect_header(lines: &[&str], delimiter: char, quote: char) -> (bool, f64) {
    if lines.len() < 2 {
        return (false, 0.0);
    }

    let first = split_respecting_quotes(lines[0], delimiter, quote);
    let second = split_respecting_quotes(lines[1], delimiter, quote);
    let n = first.len();
    if n == 0 {
        return (false, 0.0);
    }

    let empty = String::new();
    let matched = first
        .iter()
        .enumerate()
        .filter(|(i, cell)| {
            let below = second.get(*i).unwrap_or(&empty);
            looks_like_header_cell(cell, below)
        })
        .count();

    let r = matched as f64 / n as f64;

    let relax = if n > 10 {
        (0.02 * (n as f64 - 10.0)).min(0.3)
    } else {
        0.0
    };

    if r > 0.7 - relax {
        (true, 0.9)
    } else if r > 0.5 - relax {
        (true, 0.7)
    } else if r > 0.3 - relax {
        (true, 0.5)
    } else {
        (false, 1.0 - r)
    }
}
