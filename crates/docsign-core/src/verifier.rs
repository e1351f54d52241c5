//! Signature verification
//!
//! Outcomes are always reported through [`SignatureValidationResult`]; only
//! reading the file itself can fail.

use std::path::Path;

use lopdf::Dictionary;
use shared_crypto::{CryptoError, ParsedSignature};
use shared_pdf::{find_signature_fields, PdfDocument, PdfError, SignatureValue};
use shared_types::SignatureValidationResult;

use crate::error::{DocSignError, Result};

const DOCUMENT_MODIFIED: &str = "document modified";

#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Verify one signature dictionary against the file it came from
    pub fn verify(&self, file_bytes: &[u8], signature: &Dictionary) -> SignatureValidationResult {
        let value = match SignatureValue::from_dictionary(signature) {
            Ok(value) => value,
            Err(e) => return SignatureValidationResult::invalid(e.to_string()),
        };

        let signed = match value.signed_bytes(file_bytes) {
            Ok(signed) => signed,
            Err(e) => return SignatureValidationResult::invalid(e.to_string()),
        };

        let parsed = match ParsedSignature::parse(&value.contents) {
            Ok(parsed) => parsed,
            Err(e) => return SignatureValidationResult::invalid(e.to_string()),
        };

        let mut result = match parsed.verify(&signed) {
            Ok(()) if value.covers_whole_file(file_bytes.len()) => {
                SignatureValidationResult::valid("signature is valid")
            }
            // Signature intact but bytes were appended after the signed revision
            Ok(()) => SignatureValidationResult::modified(
                "signature is valid but does not cover the whole document",
            ),
            Err(CryptoError::IntegrityMismatch(detail)) => {
                tracing::debug!(%detail, "integrity check failed");
                SignatureValidationResult::modified(DOCUMENT_MODIFIED)
            }
            Err(e) => SignatureValidationResult::invalid(e.to_string()),
        };

        result.signer_name = Some(parsed.signer().subject_cn().to_string());
        result.signing_time = value.signing_time.or_else(|| parsed.signing_time());
        result.reason = value.reason;
        result.location = value.location;

        tracing::info!(
            valid = result.is_valid,
            modified = result.is_document_modified,
            signer = parsed.signer().subject_cn(),
            "verified signature"
        );
        result
    }
}

/// Verify `signature` against in-memory file bytes
pub fn verify_bytes(file_bytes: &[u8], signature: &Dictionary) -> SignatureValidationResult {
    SignatureVerifier.verify(file_bytes, signature)
}

/// Read `path` and verify `signature` against it
pub fn verify_pdf(path: &Path, signature: &Dictionary) -> Result<SignatureValidationResult> {
    let bytes = std::fs::read(path).map_err(|e| DocSignError::io(path, e))?;
    Ok(verify_bytes(&bytes, signature))
}

/// A located field and its verification outcome
#[derive(Debug, Clone)]
pub struct FieldVerification {
    pub field_name: String,
    pub page_number: Option<u32>,
    pub result: SignatureValidationResult,
}

/// Verify every signed signature field in the document at `path`
pub fn verify_all(path: &Path) -> Result<Vec<FieldVerification>> {
    let bytes = std::fs::read(path).map_err(|e| DocSignError::io(path, e))?;
    verify_all_bytes(&bytes)
}

pub fn verify_all_bytes(file_bytes: &[u8]) -> Result<Vec<FieldVerification>> {
    let doc = PdfDocument::from_bytes(file_bytes)?;
    let fields = find_signature_fields(&doc);
    if fields.is_empty() {
        tracing::warn!("document carries no signed signature fields");
    }

    Ok(fields
        .into_iter()
        .map(|field| FieldVerification {
            result: SignatureVerifier.verify(file_bytes, &field.signature),
            field_name: field.name,
            page_number: field.page_number,
        })
        .collect())
}

/// Signature dictionary of the field called `field_name`
pub fn signature_dictionary(file_bytes: &[u8], field_name: &str) -> Result<Dictionary> {
    let doc = PdfDocument::from_bytes(file_bytes)?;
    find_signature_fields(&doc)
        .into_iter()
        .find(|field| field.name == field_name)
        .map(|field| field.signature)
        .ok_or_else(|| {
            PdfError::MalformedSignature(format!("no signed field named {}", field_name)).into()
        })
}
