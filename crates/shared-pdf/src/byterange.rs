//! Byte-range patching of a serialized placeholder signature
//!
//! Works purely on bytes: the placeholder `/Contents` hex string is found by
//! its run of `0` filler digits, and the nearby `/ByteRange` array is
//! rewritten in place without changing the file length.

use std::ops::Range;

use crate::error::PdfError;

/// Shortest run of `0` digits accepted as the contents placeholder
pub const MIN_PLACEHOLDER_RUN: usize = 1024;

/// How far from the filler run the `<` and `>` delimiters may sit
const DELIMITER_SCAN: usize = 16;

/// How far from the contents string `/ByteRange` is searched
const BYTE_RANGE_SCAN: usize = 4096;

const BYTE_RANGE_KEY: &[u8] = b"/ByteRange";

/// The `<...>` hex string reserved for the signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentsWindow {
    /// Offset of `<`
    pub start: usize,
    /// Offset just past `>`
    pub end: usize,
}

impl ContentsWindow {
    /// Number of hex digits between the delimiters
    pub fn digit_capacity(&self) -> usize {
        self.end - self.start - 2
    }
}

/// Outcome of a successful patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedByteRange {
    pub contents: ContentsWindow,
    /// `[0, excludeStart, excludeEnd, fileLength - excludeEnd]`
    pub byte_range: [usize; 4],
}

impl PatchedByteRange {
    /// The two spans covered by the signature
    pub fn signed_spans(&self) -> [Range<usize>; 2] {
        let [a, b, c, d] = self.byte_range;
        [a..a + b, c..c + d]
    }

    /// Concatenation of the signed spans of `bytes`
    pub fn signed_bytes(&self, bytes: &[u8]) -> Vec<u8> {
        let [first, second] = self.signed_spans();
        let mut out = Vec::with_capacity(first.len() + second.len());
        out.extend_from_slice(&bytes[first]);
        out.extend_from_slice(&bytes[second]);
        out
    }
}

/// Locates the reserved windows and writes the final `/ByteRange`
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteRangePatcher;

impl ByteRangePatcher {
    /// Patch `/ByteRange` in place
    ///
    /// All checks run before the first write, so on error `bytes` is untouched.
    pub fn patch(&self, bytes: &mut [u8]) -> Result<PatchedByteRange, PdfError> {
        let (contents, brackets) = locate_placeholder(bytes)?;

        let file_len = bytes.len();
        let byte_range = [
            0,
            contents.start,
            contents.end,
            file_len - contents.end,
        ];
        let rendered = format!(
            "[{} {} {} {}]",
            byte_range[0], byte_range[1], byte_range[2], byte_range[3]
        );

        let reserved = brackets.len();
        if rendered.len() > reserved {
            return Err(PdfError::ByteRangeOverflow { rendered, reserved });
        }

        let target = &mut bytes[brackets];
        target[..rendered.len()].copy_from_slice(rendered.as_bytes());
        for byte in target.iter_mut().skip(rendered.len()) {
            *byte = b' ';
        }

        tracing::debug!(
            contents_start = contents.start,
            contents_end = contents.end,
            file_len,
            "patched /ByteRange"
        );

        Ok(PatchedByteRange {
            contents,
            byte_range,
        })
    }
}

/// Find the `<` and `>` around the reserved `/Contents` filler
///
/// Same candidate walk as [`ByteRangePatcher::patch`], so a zero-filled hex
/// string elsewhere in the file is never mistaken for the placeholder.
pub fn locate_contents(bytes: &[u8]) -> Result<ContentsWindow, PdfError> {
    locate_placeholder(bytes).map(|(contents, _)| contents)
}

/// First filler run that is a hex string sharing an object with `/ByteRange`
///
/// Runs without a delimiter nearby, such as the zero padding of an already
/// embedded signature, and hex strings outside a signature dictionary, such
/// as `<00...> Tj` in a content stream, are skipped.
fn locate_placeholder(bytes: &[u8]) -> Result<(ContentsWindow, Range<usize>), PdfError> {
    let mut from = 0;
    let mut first_error = None;
    while let Some(run) = find_filler_run(bytes, from, MIN_PLACEHOLDER_RUN) {
        let candidate = window_around(bytes, &run).and_then(|contents| {
            locate_byte_range(bytes, &contents).map(|brackets| (contents, brackets))
        });
        match candidate {
            Ok(found) => return Ok(found),
            Err(e) => {
                tracing::debug!(offset = run.start, "skipping filler run: {}", e);
                first_error.get_or_insert(e);
                from = run.end;
            }
        }
    }
    Err(first_error.unwrap_or_else(|| {
        PdfError::PlaceholderNotFound("no reserved /Contents filler".to_string())
    }))
}

fn window_around(bytes: &[u8], run: &Range<usize>) -> Result<ContentsWindow, PdfError> {
    let back_limit = run.start.saturating_sub(DELIMITER_SCAN);
    let start = (back_limit..run.start)
        .rev()
        .find(|&i| bytes[i] == b'<')
        .ok_or_else(|| {
            PdfError::PlaceholderNotFound("missing '<' before contents filler".to_string())
        })?;

    let forward_limit = (run.end + DELIMITER_SCAN).min(bytes.len());
    let close = (run.end..forward_limit)
        .find(|&i| bytes[i] == b'>')
        .ok_or_else(|| {
            PdfError::PlaceholderNotFound("missing '>' after contents filler".to_string())
        })?;

    Ok(ContentsWindow {
        start,
        end: close + 1,
    })
}

/// Byte range of the `[ ... ]` placeholder array belonging to `contents`
fn locate_byte_range(bytes: &[u8], contents: &ContentsWindow) -> Result<Range<usize>, PdfError> {
    let before = contents.start.saturating_sub(BYTE_RANGE_SCAN)..contents.start;
    let after = contents.end..(contents.end + BYTE_RANGE_SCAN).min(bytes.len());

    let key = find_last(&bytes[before.clone()], BYTE_RANGE_KEY)
        .map(|i| before.start + i)
        .filter(|&i| same_object(&bytes[i..contents.start]))
        .or_else(|| {
            find_first(&bytes[after.clone()], BYTE_RANGE_KEY)
                .map(|i| after.start + i)
                .filter(|&i| same_object(&bytes[contents.end..i]))
        })
        .ok_or(PdfError::ByteRangeNotFound)?;

    let mut open = key + BYTE_RANGE_KEY.len();
    while open < bytes.len() && bytes[open].is_ascii_whitespace() {
        open += 1;
    }
    if bytes.get(open) != Some(&b'[') {
        return Err(PdfError::ByteRangeNotFound);
    }

    let close = bytes[open..]
        .iter()
        .take(BYTE_RANGE_SCAN)
        .position(|&b| b == b']')
        .map(|i| open + i)
        .ok_or(PdfError::ByteRangeNotFound)?;

    Ok(open..close + 1)
}

/// No object boundary lies between the key and the contents string
fn same_object(between: &[u8]) -> bool {
    find_first(between, b"endobj").is_none()
}

fn find_filler_run(bytes: &[u8], from: usize, min_len: usize) -> Option<Range<usize>> {
    let mut run_start = None;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match (b == b'0', run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                if i - start >= min_len {
                    return Some(start..i);
                }
                run_start = None;
            }
            _ => {}
        }
    }
    run_start
        .filter(|&start| bytes.len() - start >= min_len)
        .map(|start| start..bytes.len())
}

/// Find the last occurrence of a pattern in bytes
pub(crate) fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let len = needle.len();
    if len == 0 || len > haystack.len() {
        return None;
    }

    (0..=(haystack.len() - len))
        .rev()
        .find(|&i| &haystack[i..i + len] == needle)
}

pub(crate) fn find_first(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
