// Component A — Encoding Detector (spec.md §4.A).

use crate::model::{DetectedEncoding, EncodingTag};

/// Classify a byte buffer as one of `{utf8, utf16-le, utf16-be}`, reporting
/// BOM offset and confidence. Never panics or returns an error; an
/// ambiguous buffer receives a low confidence with utf8 as the tie-break.
pub fn detect_encoding(buf: &[u8]) -> DetectedEncoding {
    if buf.is_empty() {
        return DetectedEncoding {
            encoding: EncodingTag::Utf8,
            confidence: 0.0,
            has_bom: false,
            bom_length: 0,
        };
    }

    if let Some(bom) = detect_bom(buf) {
        return bom;
    }

    let stats = ByteStats::collect(buf);

    if is_valid_utf8_structure(buf) {
        if let Some(detected) = utf8_confidence(&stats) {
            if detected.confidence >= 0.8 {
                return detected;
            }
            // Below the acceptance threshold: fall through to the UTF-16
            // probe in case this is actually UTF-16 with no BOM.
            if let Some(utf16) = utf16_probe(&stats) {
                return utf16;
            }
            return DetectedEncoding {
                encoding: EncodingTag::Utf8,
                confidence: 0.5,
                has_bom: false,
                bom_length: 0,
            };
        }
    }

    if let Some(utf16) = utf16_probe(&stats) {
        return utf16;
    }

    DetectedEncoding {
        encoding: EncodingTag::Utf8,
        confidence: 0.5,
        has_bom: false,
        bom_length: 0,
    }
}

fn detect_bom(buf: &[u8]) -> Option<DetectedEncoding> {
    if buf.len() >= 3 && buf[0] == 0xEF && buf[1] == 0xBB && buf[2] == 0xBF {
        return Some(DetectedEncoding {
            encoding: EncodingTag::Utf8,
            confidence: 1.0,
            has_bom: true,
            bom_length: 3,
        });
    }
    if buf.len() >= 2 && buf[0] == 0xFF && buf[1] == 0xFE {
        return Some(DetectedEncoding {
            encoding: EncodingTag::Utf16Le,
            confidence: 1.0,
            has_bom: true,
            bom_length: 2,
        });
    }
    if buf.len() >= 2 && buf[0] == 0xFE && buf[1] == 0xFF {
        return Some(DetectedEncoding {
            encoding: EncodingTag::Utf16Be,
            confidence: 1.0,
            has_bom: true,
            bom_length: 2,
        });
    }
    None
}

struct ByteStats {
    len: usize,
    null_count: usize,
    null_even: usize,
    null_odd: usize,
    printable_ascii: usize,
    control: usize,
    high: usize,
}

impl ByteStats {
    fn collect(buf: &[u8]) -> Self {
        let mut stats = ByteStats {
            len: buf.len(),
            null_count: 0,
            null_even: 0,
            null_odd: 0,
            printable_ascii: 0,
            control: 0,
            high: 0,
        };
        for (i, &b) in buf.iter().enumerate() {
            if b == 0 {
                stats.null_count += 1;
                if i % 2 == 0 {
                    stats.null_even += 1;
                } else {
                    stats.null_odd += 1;
                }
            } else if (0x20..=0x7E).contains(&b) {
                stats.printable_ascii += 1;
            } else if b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r' {
                stats.control += 1;
            } else if b >= 0x80 {
                stats.high += 1;
            }
        }
        stats
    }
}

/// Validate the UTF-8 leading/continuation byte structure for 1-4 byte
/// sequences (spec.md §4.A step 3). Uses `str::from_utf8` for correctness;
/// this is a structural validity check, not a confidence computation.
fn is_valid_utf8_structure(buf: &[u8]) -> bool {
    std::str::from_utf8(buf).is_ok()
}

fn utf8_confidence(stats: &ByteStats) -> Option<DetectedEncoding> {
    if stats.null_count > 0 {
        return Some(DetectedEncoding {
            encoding: EncodingTag::Utf8,
            confidence: 0.0,
            has_bom: false,
            bom_length: 0,
        });
    }

    let control_ratio = stats.control as f64 / stats.len as f64;
    if control_ratio > 0.10 {
        return Some(DetectedEncoding {
            encoding: EncodingTag::Utf8,
            confidence: 0.3,
            has_bom: false,
            bom_length: 0,
        });
    }

    let ascii_ratio = stats.printable_ascii as f64 / stats.len as f64;
    let high_ratio = stats.high as f64 / stats.len as f64;

    let confidence = if high_ratio == 0.0 && ascii_ratio > 0.95 {
        0.95
    } else if high_ratio < 0.05 {
        0.90
    } else if high_ratio < 0.30 {
        0.85
    } else {
        0.70_f64.max(0.85 - high_ratio)
    }
    .max(0.7);

    Some(DetectedEncoding {
        encoding: EncodingTag::Utf8,
        confidence,
        has_bom: false,
        bom_length: 0,
    })
}

fn utf16_probe(stats: &ByteStats) -> Option<DetectedEncoding> {
    let null_ratio = stats.null_count as f64 / stats.len as f64;
    if null_ratio < 0.20 {
        return None;
    }

    let even_ratio = stats.null_even as f64 / stats.null_count as f64;
    let odd_ratio = stats.null_odd as f64 / stats.null_count as f64;
    let confidence = (null_ratio * 2.0).min(0.9);

    if even_ratio >= 0.80 {
        Some(DetectedEncoding {
            encoding: EncodingTag::Utf16Le,
            confidence,
            has_bom: false,
            bom_length: 0,
        })
    } else if odd_ratio >= 0.80 {
        Some(DetectedEncoding {
            encoding: EncodingTag::Utf16Be,
            confidence,
            has_bom: false,
            bom_length: 0,
        })
    } else {
        None
    }
}

/// Decode `buf` to a `String` using the detected encoding, skipping the BOM
/// if one was found. Grounded in `encoding_rs`, the ecosystem's standard
/// decode-to-text crate (see DESIGN.md).
pub fn decode(buf: &[u8], detected: &DetectedEncoding) -> String {
    let body = &buf[detected.bom_length.min(buf.len())..];
    let encoding = match detected.encoding {
        EncodingTag::Utf8 => encoding_rs::UTF_8,
        EncodingTag::Utf16Le => encoding_rs::UTF_16LE,
        EncodingTag::Utf16Be => encoding_rs::UTF_16BE,
    };
    let (cow, _, _) = encoding.decode(body);
    cow.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer() {
        let d = detect_encoding(b"");
        assert_eq!(d.encoding, EncodingTag::Utf8);
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn test_utf8_bom() {
        let d = detect_encoding(&[0xEF, 0xBB, 0xBF, b'a', b'b']);
        assert_eq!(d.encoding, EncodingTag::Utf8);
        assert_eq!(d.confidence, 1.0);
        assert!(d.has_bom);
        assert_eq!(d.bom_length, 3);
    }

    #[test]
    fn test_utf16_le_bom() {
        let d = detect_encoding(&[0xFF, 0xFE, b'a', 0x00]);
        assert_eq!(d.encoding, EncodingTag::Utf16Le);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.bom_length, 2);
    }

    #[test]
    fn test_utf16_be_bom_preserves_tag() {
        let d = detect_encoding(&[0xFE, 0xFF, 0x00, b'a']);
        assert_eq!(d.encoding, EncodingTag::Utf16Be);
        assert_eq!(d.effective_tag(), EncodingTag::Utf16Le);
    }

    #[test]
    fn test_pure_ascii_high_confidence() {
        let d = detect_encoding(b"name,age\nAlice,30\nBob,25\n");
        assert_eq!(d.encoding, EncodingTag::Utf8);
        assert!(d.confidence >= 0.9);
        assert!(!d.has_bom);
    }

    #[test]
    fn test_null_bytes_reject_utf8() {
        // Mix of nulls at even positions simulating ASCII-range UTF-16LE.
        let mut buf = Vec::new();
        for b in b"hello world this is a longer sample of text" {
            buf.push(*b);
            buf.push(0x00);
        }
        let d = detect_encoding(&buf);
        assert_eq!(d.encoding, EncodingTag::Utf16Le);
    }

    #[test]
    fn test_utf16_be_no_bom() {
        let mut buf = Vec::new();
        for b in b"hello world this is a longer sample of text" {
            buf.push(0x00);
            buf.push(*b);
        }
        let d = detect_encoding(&buf);
        assert_eq!(d.encoding, EncodingTag::Utf16Be);
    }

    #[test]
    fn test_decode_roundtrip_ascii() {
        let d = detect_encoding(b"a,b,c\n");
        assert_eq!(decode(b"a,b,c\n", &d), "a,b,c\n");
    }

    #[test]
    fn test_decode_skips_bom() {
        let input: &[u8] = &[0xEF, 0xBB, 0xBF, b'h', b'i'];
        let d = detect_encoding(input);
        assert_eq!(decode(input, &d), "hi");
    }
}
