//! Locating signed signature fields in an existing document

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Object, ObjectId};

use crate::error::PdfError;
use crate::parser::PdfDocument;
use crate::text::{decode_text_string, parse_pdf_date};

/// Field trees deeper than this are not followed
const MAX_FIELD_DEPTH: usize = 16;

/// A `/FT /Sig` field whose `/V` holds a signature dictionary
#[derive(Debug, Clone)]
pub struct SignatureField {
    pub name: String,
    /// 1-indexed page carrying the widget, if it is placed on one
    pub page_number: Option<u32>,
    pub field_id: ObjectId,
    pub signature: Dictionary,
}

/// All signed signature fields, widgets on pages first, in page order
pub fn find_signature_fields(doc: &PdfDocument) -> Vec<SignatureField> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    for (page_number, page_id) in doc.doc.get_pages() {
        let Ok(page) = doc.get_dict(page_id) else {
            continue;
        };
        let Some(annots) = page
            .get(b"Annots")
            .ok()
            .and_then(|obj| doc.resolve(obj).ok())
            .and_then(|obj| obj.as_array().ok())
        else {
            continue;
        };

        for annot in annots {
            let Ok(annot_id) = annot.as_reference() else {
                continue;
            };
            if let Some(field) = signature_field(doc, annot_id, Some(page_number)) {
                if seen.insert(field.field_id) {
                    found.push(field);
                }
            }
        }
    }

    for field_id in acroform_fields(doc) {
        if seen.contains(&field_id) {
            continue;
        }
        if let Some(field) = signature_field(doc, field_id, None) {
            seen.insert(field.field_id);
            found.push(field);
        }
    }

    tracing::debug!(count = found.len(), "located signature fields");
    found
}

fn signature_field(doc: &PdfDocument, id: ObjectId, page_number: Option<u32>) -> Option<SignatureField> {
    let dict = doc.get_dict(id).ok()?;
    let parent = dict
        .get(b"Parent")
        .and_then(Object::as_reference)
        .ok()
        .and_then(|parent_id| doc.get_dict(parent_id).ok());

    let field_type = inherited(dict, parent, b"FT")?.as_name().ok()?;
    if field_type != b"Sig" {
        return None;
    }

    let signature = doc
        .resolve(inherited(dict, parent, b"V")?)
        .ok()?
        .as_dict()
        .ok()?
        .clone();
    let name = match inherited(dict, parent, b"T") {
        Some(Object::String(bytes, _)) => decode_text_string(bytes),
        _ => String::new(),
    };

    Some(SignatureField {
        name,
        page_number,
        field_id: id,
        signature,
    })
}

/// Widgets may be merged with their field or be kids of it
fn inherited<'a>(
    dict: &'a Dictionary,
    parent: Option<&'a Dictionary>,
    key: &[u8],
) -> Option<&'a Object> {
    dict.get(key)
        .ok()
        .or_else(|| parent.and_then(|p| p.get(key).ok()))
}

/// Terminal fields reachable from the AcroForm `/Fields` tree
fn acroform_fields(doc: &PdfDocument) -> Vec<ObjectId> {
    let Some(fields) = doc
        .doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"AcroForm").ok())
        .and_then(|obj| doc.resolve(obj).ok())
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|form| form.get(b"Fields").ok())
        .and_then(|obj| doc.resolve(obj).ok())
        .and_then(|obj| obj.as_array().ok())
    else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut stack: Vec<(ObjectId, usize)> = fields
        .iter()
        .filter_map(|f| f.as_reference().ok())
        .map(|id| (id, 0))
        .collect();
    let mut visited = HashSet::new();

    while let Some((id, depth)) = stack.pop() {
        if !visited.insert(id) || depth > MAX_FIELD_DEPTH {
            continue;
        }
        match doc
            .get_dict(id)
            .ok()
            .and_then(|d| d.get(b"Kids").ok())
            .and_then(|obj| doc.resolve(obj).ok())
            .and_then(|obj| obj.as_array().ok())
        {
            Some(kids) => stack.extend(
                kids.iter()
                    .filter_map(|k| k.as_reference().ok())
                    .map(|kid| (kid, depth + 1)),
            ),
            None => out.push(id),
        }
    }
    out
}

/// The parts of a signature dictionary verification needs
#[derive(Debug, Clone)]
pub struct SignatureValue {
    /// Decoded `/Contents`, including any trailing zero padding
    pub contents: Vec<u8>,
    pub byte_range: [usize; 4],
    pub signer_name: Option<String>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub signing_time: Option<DateTime<Utc>>,
}

impl SignatureValue {
    pub fn from_dictionary(dict: &Dictionary) -> Result<Self, PdfError> {
        let contents = match dict.get(b"Contents") {
            Ok(Object::String(bytes, _)) => bytes.clone(),
            Ok(_) => {
                return Err(PdfError::MalformedSignature(
                    "/Contents is not a string".to_string(),
                ))
            }
            Err(_) => return Err(PdfError::MalformedSignature("missing /Contents".to_string())),
        };
        if contents.iter().all(|&b| b == 0) {
            return Err(PdfError::MalformedSignature(
                "/Contents holds no signature".to_string(),
            ));
        }

        let byte_range = parse_byte_range(dict)?;

        Ok(Self {
            contents,
            byte_range,
            signer_name: text_entry(dict, b"Name"),
            reason: text_entry(dict, b"Reason"),
            location: text_entry(dict, b"Location"),
            signing_time: text_entry(dict, b"M").and_then(|m| parse_pdf_date(&m)),
        })
    }

    /// Concatenate the two spans named by `/ByteRange`
    pub fn signed_bytes(&self, file: &[u8]) -> Result<Vec<u8>, PdfError> {
        let [a, b, c, d] = self.byte_range;
        let first_end = a.checked_add(b);
        let second_end = c.checked_add(d);
        match (first_end, second_end) {
            (Some(first_end), Some(second_end))
                if first_end <= c && second_end <= file.len() =>
            {
                let mut out = Vec::with_capacity(b + d);
                out.extend_from_slice(&file[a..first_end]);
                out.extend_from_slice(&file[c..second_end]);
                Ok(out)
            }
            _ => Err(PdfError::MalformedSignature(format!(
                "/ByteRange {:?} does not fit a {} byte file",
                self.byte_range,
                file.len()
            ))),
        }
    }

    /// Whether the signed spans cover the whole file apart from the contents
    pub fn covers_whole_file(&self, file_len: usize) -> bool {
        let [a, b, c, d] = self.byte_range;
        a == 0 && c.checked_add(d) == Some(file_len) && b <= c
    }
}

fn parse_byte_range(dict: &Dictionary) -> Result<[usize; 4], PdfError> {
    let values = dict
        .get(b"ByteRange")
        .and_then(Object::as_array)
        .map_err(|_| PdfError::MalformedSignature("missing /ByteRange".to_string()))?;
    if values.len() != 4 {
        return Err(PdfError::MalformedSignature(format!(
            "/ByteRange has {} entries, expected 4",
            values.len()
        )));
    }

    let mut out = [0usize; 4];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = value
            .as_i64()
            .ok()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| {
                PdfError::MalformedSignature("/ByteRange entries must be non-negative integers".to_string())
            })?;
    }
    Ok(out)
}

fn text_entry(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key) {
        Ok(Object::String(bytes, _)) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, StringFormat};
    use pretty_assertions::assert_eq;

    fn signature_dict(contents: Vec<u8>, range: Vec<Object>) -> Dictionary {
        dictionary! {
            "Type" => "Sig",
            "Contents" => Object::String(contents, StringFormat::Hexadecimal),
            "ByteRange" => range,
            "Reason" => Object::string_literal("test"),
            "Location" => Object::String(
                vec![0xFE, 0xFF, 0xC1, 0x1C, 0xC6, 0xB8],
                StringFormat::Hexadecimal,
            ),
            "M" => Object::string_literal("D:20240305140709+00'00'"),
        }
    }

    #[test]
    fn test_from_dictionary_reads_entries() {
        let dict = signature_dict(
            vec![0x30, 0x01, 0x00],
            vec![0.into(), 10.into(), 20.into(), 5.into()],
        );
        let value = SignatureValue::from_dictionary(&dict).unwrap();

        assert_eq!(value.byte_range, [0, 10, 20, 5]);
        assert_eq!(value.reason.as_deref(), Some("test"));
        assert_eq!(value.location.as_deref(), Some("서울"));
        assert!(value.signing_time.is_some());
        assert!(value.signer_name.is_none());
    }

    #[test]
    fn test_empty_contents_is_malformed() {
        let dict = signature_dict(vec![], vec![0.into(), 1.into(), 2.into(), 3.into()]);
        assert!(matches!(
            SignatureValue::from_dictionary(&dict),
            Err(PdfError::MalformedSignature(_))
        ));

        let dict = signature_dict(vec![0; 64], vec![0.into(), 1.into(), 2.into(), 3.into()]);
        assert!(matches!(
            SignatureValue::from_dictionary(&dict),
            Err(PdfError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_bad_byte_range_is_malformed() {
        let dict = signature_dict(vec![1], vec![0.into(), 1.into(), 2.into()]);
        assert!(SignatureValue::from_dictionary(&dict).is_err());

        let dict = signature_dict(vec![1], vec![0.into(), (-1).into(), 2.into(), 3.into()]);
        assert!(SignatureValue::from_dictionary(&dict).is_err());

        let mut dict = signature_dict(vec![1], vec![]);
        dict.remove(b"ByteRange");
        assert!(SignatureValue::from_dictionary(&dict).is_err());
    }

    #[test]
    fn test_signed_bytes_bounds() {
        let file = b"0123456789ABCDEF";
        let dict = signature_dict(vec![1], vec![0.into(), 4.into(), 10.into(), 6.into()]);
        let value = SignatureValue::from_dictionary(&dict).unwrap();
        assert_eq!(value.signed_bytes(file).unwrap(), b"0123ABCDEF".to_vec());
        assert!(value.covers_whole_file(file.len()));

        let dict = signature_dict(vec![1], vec![0.into(), 4.into(), 10.into(), 60.into()]);
        let value = SignatureValue::from_dictionary(&dict).unwrap();
        assert!(matches!(
            value.signed_bytes(file),
            Err(PdfError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_finds_nothing_in_unsigned_document() {
        let pdf = PdfDocument::from_bytes(&crate::parser::blank_pdf(2)).unwrap();
        assert!(find_signature_fields(&pdf).is_empty());
    }
}
