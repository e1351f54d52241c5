//! Placeholder signature injection
//!
//! Adds a signature widget, its `/V` signature dictionary with reserved
//! `/Contents` and `/ByteRange` entries, and an appearance stream to the
//! document, then serializes it. The reserved windows are later found again
//! purely from the serialized bytes.

use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use lopdf::{dictionary, Dictionary, Object, ObjectId, StringFormat};
use shared_types::PdfRect;

use crate::appearance::{AppearanceBuilder, AppearanceOptions};
use crate::error::PdfError;
use crate::parser::PdfDocument;
use crate::text::{decode_text_string, encode_text_string, format_pdf_date};

/// Bytes reserved for the CMS blob (twice as many hex digits on disk)
pub const DEFAULT_CONTENTS_RESERVATION: usize = 8192;

/// Fixed-width placeholder for the four `/ByteRange` integers
pub const BYTE_RANGE_PLACEHOLDER: i64 = 9_999_999_999;

/// Default stamp size in points
pub const DEFAULT_STAMP_SIZE: (f64, f64) = (150.0, 60.0);

/// Distance of the default stamp from the page's bottom-right corner
pub const DEFAULT_STAMP_MARGIN: f64 = 36.0;

/// Widget flags: Print | Locked
const WIDGET_FLAGS: i64 = 132;

/// SignaturesExist | AppendOnly
const SIG_FLAGS: i64 = 3;

#[derive(Debug, Clone, Copy)]
pub struct PlaceholderOptions {
    pub contents_size: usize,
}

impl Default for PlaceholderOptions {
    fn default() -> Self {
        Self {
            contents_size: DEFAULT_CONTENTS_RESERVATION,
        }
    }
}

/// What the signature dictionary and stamp describe
#[derive(Debug, Clone)]
pub struct SignatureDetails {
    pub signer_name: String,
    pub reason: String,
    pub location: String,
    pub signing_time: DateTime<Utc>,
    /// Image to draw instead of the text stamp
    pub stamp_image: Option<PathBuf>,
}

/// Serialized document carrying an unsigned placeholder
#[derive(Debug, Clone)]
pub struct PreparedSignature {
    pub bytes: Vec<u8>,
    pub field_name: String,
    /// 1-indexed page the widget was placed on
    pub page_number: u32,
    pub rect: PdfRect,
    pub signature_id: ObjectId,
}

#[derive(Debug, Clone, Default)]
pub struct SignaturePreparer {
    appearance: AppearanceBuilder,
    placeholder: PlaceholderOptions,
}

impl SignaturePreparer {
    pub fn new(appearance: AppearanceOptions, placeholder: PlaceholderOptions) -> Self {
        Self {
            appearance: AppearanceBuilder::new(appearance),
            placeholder,
        }
    }

    /// Insert the placeholder signature and serialize the document
    ///
    /// `page_index` is 0-based and clamped to the last page.
    pub fn prepare(
        &self,
        doc: &mut PdfDocument,
        page_index: usize,
        rect: Option<PdfRect>,
        details: &SignatureDetails,
    ) -> Result<PreparedSignature, PdfError> {
        let page_count = doc.page_count();
        if page_count == 0 {
            return Err(PdfError::Structure("document has no pages".to_string()));
        }
        if page_index >= page_count {
            tracing::warn!(page_index, page_count, "page index out of range, using last page");
        }
        let page_number = (page_index.min(page_count - 1) + 1) as u32;
        let page_id = doc
            .page_id(page_number)
            .ok_or_else(|| PdfError::Structure(format!("Page {} not found", page_number)))?;

        let rect = match rect {
            Some(rect) if !rect.is_empty() => rect,
            Some(_) => {
                return Err(PdfError::Structure(
                    "signature rectangle has no area".to_string(),
                ))
            }
            None => default_rect(&doc.page_media_box(page_number)?),
        };

        let signature_id = self.create_signature_dictionary(doc, details);
        let field_name = next_field_name(doc);

        let stamp_date = details
            .signing_time
            .with_timezone(&Local)
            .format("%Y.%m.%d %H:%M")
            .to_string();
        let appearance = self.appearance.build(
            &rect,
            &details.signer_name,
            &stamp_date,
            details.stamp_image.as_deref(),
        );
        let appearance_id = appearance.add_to(doc.doc_mut());

        let corners = rect.to_corners();
        let widget = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Sig",
            "Rect" => corners.iter().map(|&v| Object::Real(v as f32)).collect::<Vec<_>>(),
            "P" => Object::Reference(page_id),
            "F" => WIDGET_FLAGS,
            "T" => encode_text_string(&field_name),
            "V" => Object::Reference(signature_id),
            "AP" => dictionary! { "N" => Object::Reference(appearance_id) },
        };
        let widget_id = doc.doc_mut().add_object(widget);

        add_to_page_annots(doc, page_id, widget_id)?;
        add_to_acroform(doc, widget_id)?;

        let bytes = doc.save_to_bytes()?;
        tracing::info!(
            page = page_number,
            field = %field_name,
            len = bytes.len(),
            "prepared signature placeholder"
        );

        Ok(PreparedSignature {
            bytes,
            field_name,
            page_number,
            rect,
            signature_id,
        })
    }

    fn create_signature_dictionary(&self, doc: &mut PdfDocument, details: &SignatureDetails) -> ObjectId {
        let placeholder = BYTE_RANGE_PLACEHOLDER;
        let sig_dict = dictionary! {
            "Type" => "Sig",
            "Filter" => "Adobe.PPKLite",
            "SubFilter" => "adbe.pkcs7.detached",
            "ByteRange" => vec![
                Object::Integer(0),
                Object::Integer(placeholder),
                Object::Integer(placeholder),
                Object::Integer(placeholder),
            ],
            "Contents" => Object::String(
                vec![0; self.placeholder.contents_size],
                StringFormat::Hexadecimal,
            ),
            "M" => Object::string_literal(format_pdf_date(&details.signing_time)),
            "Name" => encode_text_string(&details.signer_name),
            "Reason" => encode_text_string(&details.reason),
            "Location" => encode_text_string(&details.location),
        };
        doc.doc_mut().add_object(sig_dict)
    }
}

/// Bottom-right corner of the page, inset by the default margin
pub fn default_rect(media_box: &PdfRect) -> PdfRect {
    let (width, height) = DEFAULT_STAMP_SIZE;
    PdfRect::new(
        media_box.x + media_box.width - DEFAULT_STAMP_MARGIN - width,
        media_box.y + DEFAULT_STAMP_MARGIN,
        width,
        height,
    )
}

/// `SignatureN` with the smallest N not already used by a form field
fn next_field_name(doc: &PdfDocument) -> String {
    let existing: Vec<String> = existing_field_names(doc);
    (1..)
        .map(|n| format!("Signature{}", n))
        .find(|name| !existing.contains(name))
        .unwrap_or_else(|| "Signature".to_string())
}

fn existing_field_names(doc: &PdfDocument) -> Vec<String> {
    let Some(fields) = acroform_dict(doc)
        .and_then(|form| form.get(b"Fields").ok())
        .and_then(|obj| doc.resolve(obj).ok())
        .and_then(|obj| obj.as_array().ok())
    else {
        return Vec::new();
    };

    fields
        .iter()
        .filter_map(|f| f.as_reference().ok())
        .filter_map(|id| doc.get_dict(id).ok())
        .filter_map(|field| match field.get(b"T") {
            Ok(Object::String(bytes, _)) => Some(decode_text_string(bytes)),
            _ => None,
        })
        .collect()
}

fn acroform_dict(doc: &PdfDocument) -> Option<&Dictionary> {
    let catalog = doc.doc.catalog().ok()?;
    let form = catalog.get(b"AcroForm").ok()?;
    doc.resolve(form).ok()?.as_dict().ok()
}

/// Add the widget to the page's `/Annots`, inline or referenced
fn add_to_page_annots(doc: &mut PdfDocument, page_id: ObjectId, widget_id: ObjectId) -> Result<(), PdfError> {
    let annots_ref = doc
        .get_dict(page_id)?
        .get(b"Annots")
        .and_then(Object::as_reference)
        .ok();

    if let Some(annots_id) = annots_ref {
        let annots = doc
            .doc_mut()
            .get_object_mut(annots_id)
            .and_then(Object::as_array_mut)
            .map_err(|_| PdfError::Structure("Annots reference is not an array".to_string()))?;
        annots.push(Object::Reference(widget_id));
        return Ok(());
    }

    let page = doc
        .doc_mut()
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| PdfError::Structure("Page is not a dictionary".to_string()))?;
    match page.get_mut(b"Annots") {
        Ok(Object::Array(annots)) => annots.push(Object::Reference(widget_id)),
        _ => page.set("Annots", vec![Object::Reference(widget_id)]),
    }
    Ok(())
}

/// Register the field in the AcroForm, creating the form when missing
fn add_to_acroform(doc: &mut PdfDocument, field_id: ObjectId) -> Result<(), PdfError> {
    let existing = {
        let catalog = doc
            .doc
            .catalog()
            .map_err(|e| PdfError::Structure(format!("Failed to get catalog: {}", e)))?;
        match catalog.get(b"AcroForm") {
            Ok(Object::Reference(id)) => Some(Some(*id)),
            Ok(Object::Dictionary(_)) => Some(None),
            _ => None,
        }
    };

    // Inline forms are addressed through the catalog
    let acroform_ref = match existing {
        Some(found) => found,
        None => {
            let acroform_id = doc.doc_mut().add_object(dictionary! {
                "Fields" => Vec::<Object>::new(),
                "SigFlags" => SIG_FLAGS,
            });
            doc.doc_mut()
                .catalog_mut()
                .map_err(|e| PdfError::Structure(format!("Failed to get catalog: {}", e)))?
                .set("AcroForm", Object::Reference(acroform_id));
            Some(acroform_id)
        }
    };

    // Fields may itself be an indirect array
    let fields_ref = match acroform_ref {
        Some(id) => doc.get_dict(id)?,
        None => acroform_dict(doc)
            .ok_or_else(|| PdfError::Structure("AcroForm is not a dictionary".to_string()))?,
    }
    .get(b"Fields")
    .and_then(Object::as_reference)
    .ok();

    if let Some(fields_id) = fields_ref {
        doc.doc_mut()
            .get_object_mut(fields_id)
            .and_then(Object::as_array_mut)
            .map_err(|_| PdfError::Structure("Fields reference is not an array".to_string()))?
            .push(Object::Reference(field_id));
    }

    let acroform = match acroform_ref {
        Some(id) => doc.doc_mut().get_object_mut(id).and_then(Object::as_dict_mut),
        None => doc
            .doc_mut()
            .catalog_mut()
            .and_then(|catalog| catalog.get_mut(b"AcroForm"))
            .and_then(Object::as_dict_mut),
    }
    .map_err(|_| PdfError::Structure("AcroForm is not a dictionary".to_string()))?;

    if fields_ref.is_none() {
        match acroform.get_mut(b"Fields") {
            Ok(Object::Array(fields)) => fields.push(Object::Reference(field_id)),
            _ => acroform.set("Fields", vec![Object::Reference(field_id)]),
        }
    }
    acroform.set("SigFlags", SIG_FLAGS);
    Ok(())
}
