// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! NFKD-based text normalization.
//!
//! Two entry points: [`process`] keeps a byte-offset map back to the
//! original text plus line boundaries (used for both indexing titles and
//! scanning identify candidates); [`process_name`] isolates the last
//! alphabetic run of its input (used to pull a surname out of "C. A. R.
//! Hoare" regardless of punctuation or middle initials).

use crate::error::{Error, Result};
use unicode_normalization::char::decompose_compatible;

/// Maximum normalized title length accepted by the index pipeline.
pub const MAX_TITLE_LEN: usize = 1024;
/// Maximum normalized surname length ([`process_name`]'s output cap).
///
/// The 6-bit `name_len` slot field can represent at most 63; treat 63, not
/// the `MAX_NAME_LEN = 64` seen in some headers, as authoritative.
pub const MAX_NAME_LEN: usize = 63;
/// Maximum normalized length accepted by the identify pipeline.
pub const MAX_LOOKUP_TEXT_LEN: usize = 4096;

/// One contiguous alphabetic run of the normalized output, in output-byte
/// offsets, delimited by hard line breaks in the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub start: usize,
    pub end: usize,
}

/// Result of [`process`]: normalized bytes, a parallel offset map back to
/// the original text, and the line boundaries within the normalized bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub out: Vec<u8>,
    pub map: Vec<u32>,
    pub lines: Vec<Line>,
}

fn push_lowercased_alphabetic(c: char, buf: &mut Vec<u8>, max_len: usize) -> bool {
    let mut decomposed = Vec::with_capacity(4);
    decompose_compatible(c, |d| decomposed.push(d));

    let mut encode_buf = [0u8; 4];
    for d in decomposed {
        if !d.is_alphabetic() {
            continue;
        }
        for lower in d.to_lowercase() {
            let bytes = lower.encode_utf8(&mut encode_buf).as_bytes();
            if buf.len() + bytes.len() > max_len {
                return false;
            }
            buf.extend_from_slice(bytes);
        }
    }
    true
}

/// Normalizes `input`, emitting lowercase-NFKD bytes, an offset map back to
/// `input`, and the alphabetic-run line boundaries.
///
/// Output is truncated at a safe boundary (never mid-codepoint) once it
/// would exceed `max_len`; this is not an error, matching the C
/// implementation's "best effort, then stop" overflow handling.
pub fn process(input: &str, max_len: usize) -> Processed {
    let mut out = Vec::new();
    let mut map = Vec::new();
    let mut lines: Vec<Line> = Vec::new();
    let mut prev_new = true;

    'chars: for (byte_offset, c) in input.char_indices() {
        if c.is_alphabetic() {
            if prev_new {
                lines.push(Line {
                    start: out.len(),
                    end: out.len(),
                });
                prev_new = false;
            }

            let before = out.len();
            if !push_lowercased_alphabetic(c, &mut out, max_len) {
                out.truncate(before);
                break 'chars;
            }
            while map.len() < out.len() {
                map.push(byte_offset as u32);
            }
        } else if c == '\n' {
            if !prev_new {
                if let Some(last) = lines.last_mut() {
                    last.end = out.len() - 1;
                }
            }
            prev_new = true;
        }
        // Everything else (whitespace, punctuation, digits, symbols, marks) is dropped.
    }

    if !prev_new {
        if let Some(last) = lines.last_mut() {
            last.end = out.len() - 1;
        }
    }

    // A line started right before truncation cut off its only character
    // leaves a dangling empty entry; drop it.
    if let Some(last) = lines.last() {
        if last.start >= out.len() {
            lines.pop();
        }
    }

    Processed { out, map, lines }
}

/// Normalizes `input`, keeping only the final alphabetic run: any
/// non-alphabetic code point resets the output buffer. Used to isolate an
/// author's surname out of "Smith-Jones" or "C. A. R. Hoare".
///
/// Returns [`Error::NormalizationOverflow`] if the surviving run would
/// exceed [`MAX_NAME_LEN`] bytes.
pub fn process_name(input: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    for c in input.chars() {
        if c.is_alphabetic() {
            if !push_lowercased_alphabetic(c, &mut out, MAX_NAME_LEN) {
                return Err(Error::NormalizationOverflow);
            }
        } else {
            out.clear();
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_drops_punctuation_and_lowercases() {
        let p = process("Quicksort, by C. A. R. Hoare.", MAX_LOOKUP_TEXT_LEN);
        assert_eq!(p.out, b"quicksortbycarhoare");
    }

    #[test]
    fn process_map_points_back_to_original() {
        let p = process("Naïve", MAX_LOOKUP_TEXT_LEN);
        // 'n','a' map to themselves; the decomposed 'ï' (i + combining
        // diaeresis) contributes only its base 'i', still mapped to the
        // original multi-byte 'ï' offset.
        assert_eq!(p.out, b"naive");
        assert_eq!(p.map.len(), p.out.len());
        for &offset in &p.map {
            assert!((offset as usize) < "Naïve".len());
        }
    }

    #[test]
    fn process_splits_lines_on_line_feed() {
        let p = process("first line\nsecond line", MAX_LOOKUP_TEXT_LEN);
        assert_eq!(p.lines.len(), 2);
        let line0 = &p.out[p.lines[0].start..=p.lines[0].end];
        let line1 = &p.out[p.lines[1].start..=p.lines[1].end];
        assert_eq!(line0, b"firstline");
        assert_eq!(line1, b"secondline");
    }

    #[test]
    fn process_is_idempotent_on_alphabetic_input() {
        // Property 4.
        let p1 = process("hello world", MAX_LOOKUP_TEXT_LEN);
        let p2 = process(std::str::from_utf8(&p1.out).unwrap(), MAX_LOOKUP_TEXT_LEN);
        assert_eq!(p1.out, p2.out);
        assert!(p2.map.iter().enumerate().all(|(i, &m)| m as usize == i));
        assert_eq!(p2.lines.len(), 1);
    }

    #[test]
    fn process_truncates_at_safe_boundary() {
        let input = "a".repeat(10);
        let p = process(&input, 4);
        assert_eq!(p.out.len(), 4);
    }

    #[test]
    fn process_name_isolates_last_alphabetic_run() {
        // Property 5.
        let a = process_name("  Smith-Jones ").unwrap();
        let b = process_name("Smith Jones").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, b"jones");
    }

    #[test]
    fn process_name_strips_initials() {
        let n = process_name("C. A. R. Hoare").unwrap();
        assert_eq!(n, b"hoare");
    }

    #[test]
    fn process_name_overflow_is_an_error() {
        let too_long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            process_name(&too_long),
            Err(Error::NormalizationOverflow)
        ));
    }

    #[test]
    fn process_name_empty_input_is_empty() {
        assert_eq!(process_name("123, ---").unwrap(), Vec::<u8>::new());
    }
}
