// Line-terminator handling, narrowed to the spec's closed set: LF or CRLF.
//
// Unlike the teacher's custom multi-pattern newline support, `DetectedDialect`
// only ever reports one of these two terminators, so there is nothing to sort
// or greedily match among — the ambiguity is only ever "is the byte before
// this LF a CR".

/// One of the two line terminators `DetectedDialect` can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineTerminator {
    Lf,
    Crlf,
}

impl LineTerminator {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineTerminator::Lf => b"\n",
            LineTerminator::Crlf => b"\r\n",
        }
    }
}

/// Find the last complete line terminator in `buf`, returning the byte
/// offset immediately *after* it (i.e. the split point between "safe to
/// feed" prefix and "retain for next chunk" suffix).
///
/// This is terminator-agnostic: it looks for the last `\n` and, if preceded
/// by `\r`, includes the `\r` in the prefix. That is correct regardless of
/// whether the dialect is LF or CRLF, since a CRLF-dialect file never emits
/// a bare trailing `\r` without the following `\n` except mid-field (handled
/// by the state machine, not by this chunk-boundary search).
pub fn last_terminator_end(buf: &[u8]) -> Option<usize> {
    let pos = memchr::memrchr(b'\n', buf)?;
    Some(pos + 1)
}
