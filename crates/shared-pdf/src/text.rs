//! PDF text strings and dates

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use lopdf::{Object, StringFormat};

/// Escape special characters for PDF string literals
///
/// Non-ASCII characters become `?`, since standard 14 fonts cannot show them.
pub fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            _ if c.is_ascii() => c.to_string(),
            _ => "?".to_string(),
        })
        .collect()
}

/// Encode a text string: ASCII as a literal, anything else as UTF-16BE with BOM
pub fn encode_text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Decode a text string written by [`encode_text_string`] or another producer
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    // PDFDocEncoding agrees with Latin-1 for printable text
    bytes.iter().map(|&b| b as char).collect()
}

/// UCS-2 code units as a hex string operand, for `UniKS-UCS2-H` fonts
pub fn ucs2_hex(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 4 + 2);
    out.push('<');
    for unit in s.encode_utf16() {
        out.push_str(&format!("{:04X}", unit));
    }
    out.push('>');
    out
}

/// Format a PDF date string (`D:YYYYMMDDHHmmSS+00'00'`)
pub fn format_pdf_date(time: &DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

/// Parse a PDF date string; missing trailing fields default to their minimum
pub fn parse_pdf_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let s = s.strip_prefix("D:").unwrap_or(s);
    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() < 4 {
        return None;
    }

    let field = |start: usize, len: usize, default: u32| -> Option<u32> {
        match digits.get(start..start + len) {
            Some(part) => part.parse().ok(),
            None => Some(default),
        }
    };
    let year: i32 = digits[0..4].parse().ok()?;
    let month = field(4, 2, 1)?;
    let day = field(6, 2, 1)?;
    let hour = field(8, 2, 0)?;
    let minute = field(10, 2, 0)?;
    let second = field(12, 2, 0)?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    let offset = parse_offset(&s[digits.len()..])?;
    let local = offset.from_local_datetime(&naive).single()?;
    Some(local.with_timezone(&Utc))
}

fn parse_offset(rest: &str) -> Option<FixedOffset> {
    let mut chars = rest.chars();
    let sign = match chars.next() {
        None | Some('Z') => return FixedOffset::east_opt(0),
        Some('+') => 1,
        Some('-') => -1,
        Some(_) => return FixedOffset::east_opt(0),
    };
    let digits: String = chars.filter(char::is_ascii_digit).collect();
    let hours: i32 = digits.get(0..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: escaping parentheses produces matching escape sequences
        #[test]
        fn escape_parentheses_correct(s in ".*") {
            let escaped = escape_pdf_string(&s);
            prop_assert_eq!(s.matches('(').count(), escaped.matches("\\(").count());
            prop_assert_eq!(s.matches(')').count(), escaped.matches("\\)").count());
        }

        /// Property: escaped output is always ASCII
        #[test]
        fn escape_output_is_ascii(s in ".*") {
            prop_assert!(escape_pdf_string(&s).is_ascii());
        }

        /// Property: text strings decode back to the original
        #[test]
        fn text_string_round_trip(s in "\\PC{0,40}") {
            let Object::String(bytes, _) = encode_text_string(&s) else {
                panic!("expected string object");
            };
            prop_assert_eq!(decode_text_string(&bytes), s);
        }
    }
}
