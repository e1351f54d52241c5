//! PDF parsing and manipulation using lopdf

use lopdf::{Dictionary, Document, Object, ObjectId};
use shared_types::PdfRect;

use crate::error::PdfError;

/// US Letter, used when a page tree carries no MediaBox at all
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Wrapper around lopdf::Document with page geometry helpers
pub struct PdfDocument {
    pub(crate) doc: Document,
}

impl PdfDocument {
    /// Load a PDF from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let doc = Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
        Ok(Self { doc })
    }

    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    /// Get the number of pages
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Get page object ID for a given page number (1-indexed)
    pub fn page_id(&self, page_num: u32) -> Option<ObjectId> {
        self.doc.get_pages().get(&page_num).copied()
    }

    /// Get the page MediaBox, inheriting through `/Parent` if needed
    pub fn page_media_box(&self, page_num: u32) -> Result<PdfRect, PdfError> {
        let page_id = self
            .page_id(page_num)
            .ok_or_else(|| PdfError::Structure(format!("Page {} not found", page_num)))?;

        let mut current = Some(page_id);
        let mut depth = 0;
        while let Some(id) = current {
            let dict = self.get_dict(id)?;
            if let Ok(media_box) = dict.get(b"MediaBox") {
                return self.parse_rect(media_box);
            }

            depth += 1;
            if depth > 32 {
                break;
            }
            current = dict
                .get(b"Parent")
                .and_then(Object::as_reference)
                .ok();
        }

        Ok(PdfRect::from_corners(DEFAULT_MEDIA_BOX))
    }

    /// Resolve an object id to a dictionary
    pub fn get_dict(&self, id: ObjectId) -> Result<&Dictionary, PdfError> {
        self.doc
            .get_object(id)
            .and_then(Object::as_dict)
            .map_err(|e| PdfError::Structure(format!("object {:?}: {}", id, e)))
    }

    /// Follow a reference if `obj` is one
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object, PdfError> {
        match obj {
            Object::Reference(id) => self
                .doc
                .get_object(*id)
                .map_err(|e| PdfError::Structure(format!("dangling reference {:?}: {}", id, e))),
            other => Ok(other),
        }
    }

    /// Parse a PDF rectangle array
    fn parse_rect(&self, obj: &Object) -> Result<PdfRect, PdfError> {
        let arr = self
            .resolve(obj)?
            .as_array()
            .map_err(|_| PdfError::Structure("rectangle is not an array".to_string()))?;

        if arr.len() != 4 {
            return Err(PdfError::Structure(format!(
                "rectangle has {} elements, expected 4",
                arr.len()
            )));
        }

        let mut values = [0.0f64; 4];
        for (i, obj) in arr.iter().enumerate() {
            values[i] = self.extract_number(obj)?;
        }
        Ok(PdfRect::from_corners(values))
    }

    /// Extract a number from a PDF object
    fn extract_number(&self, obj: &Object) -> Result<f64, PdfError> {
        match self.resolve(obj)? {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(r) => Ok(*r as f64),
            _ => Err(PdfError::Structure(
                "expected number in rectangle".to_string(),
            )),
        }
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// Get mutable access to the internal document
    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Save the document to bytes
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, PdfError> {
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfError::Serialization(e.to_string()))?;
        Ok(buffer)
    }
}

/// Minimal multi-page document for tests
#[cfg(test)]
pub(crate) fn blank_pdf(pages: usize) -> Vec<u8> {
    use lopdf::dictionary;

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }))
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_bytes_valid_pdf() {
        let pdf = PdfDocument::from_bytes(&blank_pdf(3)).unwrap();
        assert_eq!(pdf.page_count(), 3);
        assert!(pdf.page_id(1).is_some());
        assert!(pdf.page_id(4).is_none());
    }

    #[test]
    fn test_from_bytes_html_fails() {
        let html_bytes = b"<!DOCTYPE html><html><head></head><body>Not a PDF</body></html>";
        let result = PdfDocument::from_bytes(html_bytes);
        assert!(matches!(result, Err(PdfError::Parse(_))));
    }

    #[test]
    fn test_from_bytes_empty_fails() {
        assert!(PdfDocument::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_media_box_direct() {
        let pdf = PdfDocument::from_bytes(&blank_pdf(1)).unwrap();
        assert_eq!(
            pdf.page_media_box(1).unwrap(),
            PdfRect::new(0.0, 0.0, 595.0, 842.0)
        );
    }

    #[test]
    fn test_media_box_inherited_from_parent() {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let pdf = PdfDocument::from_document(doc);
        assert_eq!(
            pdf.page_media_box(1).unwrap(),
            PdfRect::new(0.0, 0.0, 300.0, 400.0)
        );
    }

    #[test]
    fn test_missing_page_is_error() {
        let pdf = PdfDocument::from_bytes(&blank_pdf(1)).unwrap();
        assert!(matches!(pdf.page_media_box(2), Err(PdfError::Structure(_))));
    }

    #[test]
    fn test_extract_number() {
        let pdf = PdfDocument::from_document(Document::new());
        assert_eq!(pdf.extract_number(&Object::Integer(42)).unwrap(), 42.0);
        assert!((pdf.extract_number(&Object::Real(1.234)).unwrap() - 1.234).abs() < 0.001);
        assert!(pdf.extract_number(&Object::Null).is_err());
    }
}
