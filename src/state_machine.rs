// Component C — Parsing State Machine (spec.md §4.C).
//
// A stateful transformer that consumes characters incrementally and emits
// completed rows. Invocable repeatedly on successive chunks; the same
// instance preserves partial state between invocations. `finalize()` flushes
// any residual row. Grounded on the teacher's `strategy/streaming.rs`
// `process_buffer` loop (byte-by-byte scan with an `in_quotes` flag), but
// restructured into the six named states spec.md requires.

use crate::config::ParseMode;
use crate::error::{ErrorCode, ParseError};

/// The six transient states of the machine (spec.md §3, §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    FieldStart,
    InField,
    InQuotedField,
    QuoteInQuotedField,
    FieldEnd,
    RowEnd,
}

/// A row-and-column cursor, tracked purely for error reporting.
#[derive(Debug, Clone, Copy, Default)]
struct Position {
    row: usize,
    column: usize,
}

/// Byte-code-driven state machine converting a character stream into rows
/// of fields, honoring quoting and escaping.
pub struct StateMachine {
    state: State,
    delimiter: char,
    quote: char,
    escape: char,
    max_field_size: usize,
    trim_fields: bool,
    mode: ParseMode,

    field: String,
    row: Vec<String>,
    completed_rows: Vec<Vec<String>>,
    errors: Vec<ParseError>,
    pos: Position,
    /// Set when `InQuotedField --escape--> append next char verbatim` needs
    /// to consume the character immediately following an escape.
    escape_next_verbatim: bool,
    /// True once the current field has already recorded a `FieldTooLarge`
    /// error, so a long run of overflow chars records only one.
    oversized_in_current_field: bool,
}

impl StateMachine {
    pub fn new(delimiter: char, quote: char, escape: char, max_field_size: usize) -> Self {
        StateMachine {
            state: State::FieldStart,
            delimiter,
            quote,
            escape,
            max_field_size,
            trim_fields: false,
            mode: ParseMode::default(),
            field: String::new(),
            row: Vec::new(),
            completed_rows: Vec::new(),
            errors: Vec::new(),
            pos: Position::default(),
            escape_next_verbatim: false,
            oversized_in_current_field: false,
        }
    }

    pub fn with_trim_fields(mut self, trim: bool) -> Self {
        self.trim_fields = trim;
        self
    }

    pub fn with_mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Drain accumulated lenient/recovery-mode errors (strict-mode errors are
    /// returned directly from `feed`, never accumulated here).
    pub fn take_errors(&mut self) -> Vec<ParseError> {
        std::mem::take(&mut self.errors)
    }

    /// Feed a chunk of already-decoded text. Returns the rows completed by
    /// this call (drains the internal completed-row queue).
    pub fn feed(&mut self, text: &str) -> Result<Vec<Vec<String>>, ParseError> {
        for ch in text.chars() {
            self.step(ch)?;
        }
        Ok(std::mem::take(&mut self.completed_rows))
    }

    /// Flush any non-empty accumulator and any in-progress row. Returns the
    /// residual row, if any.
    pub fn finalize(&mut self) -> Option<Vec<String>> {
        let has_partial_field = !self.field.is_empty() || self.state != State::FieldStart;
        let has_partial_row = !self.row.is_empty();

        if has_partial_field || has_partial_row {
            self.finish_field();
            let row = std::mem::take(&mut self.row);
            self.state = State::FieldStart;
            Some(row)
        } else {
            None
        }
    }

    fn finish_field(&mut self) {
        let value = if self.trim_fields {
            self.field.trim().to_string()
        } else {
            std::mem::take(&mut self.field)
        };
        self.field.clear();
        self.row.push(value);
        self.oversized_in_current_field = false;
    }

    fn emit_row(&mut self) {
        let row = std::mem::take(&mut self.row);
        self.completed_rows.push(row);
        self.pos.row += 1;
        self.pos.column = 0;
    }

    fn push_char(&mut self, ch: char) -> Result<(), ParseError> {
        if self.field.len() + ch.len_utf8() > self.max_field_size {
            return self.handle_oversized_field(Some(ch));
        }
        self.field.push(ch);
        Ok(())
    }

    /// Size enforcement: strict raises, recovery truncates silently (error
    /// still recorded for stats but mode-specific behaviour is the caller's
    /// concern — here we model "recorded and continues" for both
    /// non-strict modes, matching spec.md §4.C / §7).
    fn handle_oversized_field(&mut self, overflow_char: Option<char>) -> Result<(), ParseError> {
        let err = ParseError::new(
            self.pos.row,
            ErrorCode::FieldTooLarge,
            format!(
                "field exceeds max_field_size ({} bytes)",
                self.max_field_size
            ),
        )
        .with_column(self.pos.column);

        match &self.mode {
            ParseMode::Strict => {
                // Reset to FieldStart, emit the partial field (per spec.md
                // §4.C error-recovery), and surface the error to the caller.
                self.finish_field();
                self.state = State::FieldStart;
                Err(err)
            }
            ParseMode::Lenient { .. } | ParseMode::Recovery { .. } => {
                if !self.oversized_in_current_field {
                    self.errors.push(err);
                    self.oversized_in_current_field = true;
                }
                // Truncate: drop the overflowing char, keep going.
                let _ = overflow_char;
                Ok(())
            }
        }
    }

    fn step(&mut self, ch: char) -> Result<(), ParseError> {
        self.pos.column += 1;
        match self.state {
            State::FieldStart => self.on_field_start(ch)?,
            State::InField => self.on_in_field(ch)?,
            State::InQuotedField => self.on_in_quoted_field(ch)?,
            State::QuoteInQuotedField => self.on_quote_in_quoted_field(ch),
            State::FieldEnd => self.on_field_end(ch),
            State::RowEnd => self.on_row_end(ch)?,
        }
        Ok(())
    }

    fn on_field_start(&mut self, ch: char) -> Result<(), ParseError> {
        if ch == self.quote {
            self.state = State::InQuotedField;
        } else if ch == self.delimiter {
            self.finish_field();
            self.state = State::FieldStart;
        } else if ch == '\n' {
            self.finish_field();
            self.emit_row();
            self.state = State::FieldStart;
        } else if ch == '\r' {
            self.finish_field();
            self.state = State::RowEnd;
        } else {
            self.push_char(ch)?;
            self.state = State::InField;
        }
        Ok(())
    }

    fn on_in_field(&mut self, ch: char) -> Result<(), ParseError> {
        if ch == self.delimiter {
            self.finish_field();
            self.state = State::FieldStart;
        } else if ch == '\n' {
            self.finish_field();
            self.emit_row();
            self.state = State::FieldStart;
        } else if ch == '\r' {
            self.finish_field();
            self.state = State::RowEnd;
        } else {
            self.push_char(ch)?;
        }
        Ok(())
    }

    fn on_in_quoted_field(&mut self, ch: char) -> Result<(), ParseError> {
        if self.escape_next_verbatim {
            self.escape_next_verbatim = false;
            self.push_char(ch)?;
            return Ok(());
        }
        if ch == self.quote {
            self.state = State::QuoteInQuotedField;
        } else if ch == self.escape && self.escape != self.quote {
            // A distinct escape char (not the doubled-quote convention):
            // append the next char verbatim.
            self.escape_next_verbatim = true;
        } else {
            self.push_char(ch)?;
        }
        Ok(())
    }

    fn on_quote_in_quoted_field(&mut self, ch: char) {
        if ch == self.quote {
            // Doubled-quote collapse: append one quote, stay quoted.
            let _ = self.push_char(self.quote);
            self.state = State::InQuotedField;
        } else if ch == self.delimiter {
            self.finish_field();
            self.state = State::FieldStart;
        } else if ch == '\n' {
            self.finish_field();
            self.emit_row();
            self.state = State::FieldStart;
        } else if ch == '\r' {
            self.finish_field();
            self.state = State::RowEnd;
        } else {
            // Tolerant of stray content after a close-quote.
            self.state = State::FieldEnd;
        }
    }

    fn on_field_end(&mut self, ch: char) {
        if ch == self.delimiter {
            self.state = State::FieldStart;
        } else if ch == '\n' {
            self.emit_row();
            self.state = State::FieldStart;
        } else if ch == '\r' {
            self.state = State::RowEnd;
        }
        // else: remain in FieldEnd, silently absorbing stray trailing chars.
    }

    fn on_row_end(&mut self, ch: char) -> Result<(), ParseError> {
        if ch == '\n' {
            self.emit_row();
            self.state = State::FieldStart;
        } else {
            // Orphan CR treated as content: prepend CR, then include ch.
            self.push_char('\r')?;
            self.state = State::InField;
            self.push_char(ch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str, delimiter: char, quote: char, escape: char) -> Vec<Vec<String>> {
        let mut sm = StateMachine::new(delimiter, quote, escape, 1024 * 1024);
        let mut rows = sm.feed(input).unwrap();
        if let Some(last) = sm.finalize() {
            rows.push(last);
        }
        rows
    }

    #[test]
    fn test_simple_two_rows() {
        let rows = run("a,b,c\n1,2,3\n", ',', '"', '"');
        assert_eq!(
            rows,
            vec![
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                vec!["1".to_string(), "2".to_string(), "3".to_string()],
            ]
        );
    }

    #[test]
    fn test_quoted_field_with_comma() {
        let rows = run("a,\"b,c\",d\n", ',', '"', '"');
        assert_eq!(
            rows,
            vec![vec!["a".to_string(), "b,c".to_string(), "d".to_string()]]
        );
    }

    #[test]
    fn test_crlf_with_doubled_quote_escape() {
        let rows = run("col\r\n\"she said \"\"hi\"\"\"\r\n", ',', '"', '"');
        assert_eq!(
            rows,
            vec![
                vec!["col".to_string()],
                vec!["she said \"hi\"".to_string()],
            ]
        );
    }

    #[test]
    fn test_no_trailing_terminator_needs_finalize() {
        let mut sm = StateMachine::new(',', '"', '"', 1024);
        let mut rows = sm.feed("a,b,c").unwrap();
        assert!(rows.is_empty());
        rows.extend(sm.finalize());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unbalanced_quote_recovers_at_next_lf() {
        // An unterminated quoted field absorbs everything until EOF in this
        // single feed; recovery-at-next-LF is a driver-level concern when
        // rows are independently re-synced across a malformed row. Within a
        // single logical field, the state machine simply keeps accumulating
        // until closed or finalized.
        let mut sm = StateMachine::new(',', '"', '"', 1024);
        let rows = sm.feed("a,\"unterminated\nb,c\n").unwrap();
        // No quote-close seen, so the whole remainder (including the
        // embedded newline) is part of the quoted field; only the last
        // LF after the close would end the row. Since there is no close,
        // nothing completes within this feed.
        assert!(rows.is_empty());
        let residual = sm.finalize().unwrap();
        assert_eq!(residual[0], "a");
        assert!(residual[1].contains("unterminated"));
    }

    #[test]
    fn test_orphan_cr_treated_as_content() {
        let rows = run("a\rb,c\n", ',', '"', '"');
        // FieldStart -> CR -> RowEnd (finish empty field "a"? no: "a" is
        // consumed by on_field_start's `other` branch first, becoming
        // InField, then CR there finishes "a" and moves to RowEnd). RowEnd
        // sees 'b' (not LF): prepend CR then include 'b' -> field "\rb".
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "a");
        assert_eq!(rows[0][1], "\rb");
        assert_eq!(rows[0][2], "c");
    }

    #[test]
    fn test_field_too_large_strict() {
        let mut sm = StateMachine::new(',', '"', '"', 4).with_mode(ParseMode::Strict);
        let err = sm.feed("abcdef,g\n").unwrap_err();
        assert_eq!(err.code, ErrorCode::FieldTooLarge);
    }

    #[test]
    fn test_field_too_large_lenient_truncates() {
        let mut sm = StateMachine::new(',', '"', '"', 4)
            .with_mode(ParseMode::Lenient { max_errors: 10 });
        let mut rows = sm.feed("abcdef,g\n").unwrap();
        rows.extend(sm.finalize());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].len(), 4);
        assert_eq!(sm.errors().len(), 1);
    }

    #[test]
    fn test_trim_fields() {
        let mut sm = StateMachine::new(',', '"', '"', 1024).with_trim_fields(true);
        let mut rows = sm.feed(" a , b \n").unwrap();
        rows.extend(sm.finalize());
        assert_eq!(rows[0], vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_empty_fields_between_delimiters() {
        let rows = run("a,,b\n", ',', '"', '"');
        assert_eq!(rows[0], vec!["a", "", "b"]);
    }

    #[test]
    fn test_feed_across_chunks_preserves_quoted_state() {
        let mut sm = StateMachine::new(',', '"', '"', 1024);
        let mut rows = sm.feed("a,\"multi").unwrap();
        assert!(rows.is_empty());
        rows.extend(sm.feed("line\nfield\",b\n").unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "multiline\nfield");
        assert_eq!(rows[0][2], "b");
    }
}
