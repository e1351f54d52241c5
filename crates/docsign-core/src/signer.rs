//! Signing pipeline: placeholder, byte range, CMS, embed

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use shared_crypto::sign_detached;
use shared_pdf::{
    embed_signature, ByteRangePatcher, ContentsWindow, PdfDocument, SignatureDetails,
    SignaturePreparer,
};
use shared_types::PdfRect;
use tempfile::NamedTempFile;

use crate::config::SignatureConfig;
use crate::error::{DocSignError, Result};

/// Produces and embeds detached CMS signatures
#[derive(Debug, Clone, Copy, Default)]
pub struct CmsSigner;

impl CmsSigner {
    /// Detached SignedData over the concatenated signed spans
    pub fn sign(&self, signed_bytes: &[u8], config: &SignatureConfig) -> Result<Vec<u8>> {
        let cms_der = sign_detached(signed_bytes, config.certificate(), config.private_key())?;
        tracing::debug!(
            signed_len = signed_bytes.len(),
            cms_len = cms_der.len(),
            algorithm = config.private_key().algorithm_name(),
            "built CMS signature"
        );
        Ok(cms_der)
    }

    /// Write `cms_der` into the reserved `/Contents` window
    ///
    /// The buffer keeps its length and is left untouched on error.
    pub fn embed(&self, buffer: &mut [u8], cms_der: &[u8], window: &ContentsWindow) -> Result<()> {
        embed_signature(buffer, window, cms_der)?;
        Ok(())
    }
}

/// A signed document and where its signature went
#[derive(Debug, Clone)]
pub struct SignedPdf {
    pub bytes: Vec<u8>,
    pub field_name: String,
    pub page_number: u32,
    pub rect: PdfRect,
    pub byte_range: [usize; 4],
}

/// Sign an in-memory PDF
///
/// `page_index` is 0-based and clamped to the last page. Without `rect` the
/// stamp goes to the page's bottom-right corner.
pub fn sign_pdf_bytes(
    pdf_bytes: &[u8],
    config: SignatureConfig,
    page_index: usize,
    rect: Option<PdfRect>,
) -> Result<SignedPdf> {
    let mut doc = PdfDocument::from_bytes(pdf_bytes)?;

    let details = SignatureDetails {
        signer_name: config.signer_name().to_string(),
        reason: config.reason.clone(),
        location: config.location.clone(),
        signing_time: Utc::now(),
        stamp_image: config.stamp_image().map(Path::to_path_buf),
    };
    let preparer = SignaturePreparer::new(config.appearance.clone(), config.placeholder);
    let prepared = preparer.prepare(&mut doc, page_index, rect, &details)?;

    let mut bytes = prepared.bytes;
    let prepared_len = bytes.len();
    let patched = ByteRangePatcher.patch(&mut bytes)?;
    let signed = patched.signed_bytes(&bytes);

    let signer = CmsSigner;
    let cms_der = signer.sign(&signed, &config)?;
    signer.embed(&mut bytes, &cms_der, &patched.contents)?;
    debug_assert_eq!(bytes.len(), prepared_len);

    tracing::info!(
        signer = config.signer_name(),
        field = %prepared.field_name,
        page = prepared.page_number,
        len = bytes.len(),
        "signed document"
    );

    Ok(SignedPdf {
        bytes,
        field_name: prepared.field_name,
        page_number: prepared.page_number,
        rect: prepared.rect,
        byte_range: patched.byte_range,
    })
}

/// Sign `source` and atomically write the result to `destination`
///
/// `source` is never modified, and `destination` is only replaced once the
/// whole signed document has been written and flushed.
pub fn sign_pdf(
    source: &Path,
    destination: &Path,
    config: SignatureConfig,
    page_index: usize,
    rect: Option<PdfRect>,
) -> Result<SignedPdf> {
    let input = std::fs::read(source).map_err(|e| DocSignError::io(source, e))?;
    let signed = sign_pdf_bytes(&input, config, page_index, rect)?;
    write_atomically(destination, &signed.bytes)?;
    tracing::info!(
        source = %source.display(),
        destination = %destination.display(),
        "wrote signed document"
    );
    Ok(signed)
}

fn write_atomically(destination: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| DocSignError::io(dir, e))?;
    temp.write_all(bytes)
        .map_err(|e| DocSignError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| DocSignError::io(temp.path(), e))?;
    temp.persist(destination)
        .map_err(|e| DocSignError::io(destination, e.error))?;
    sync_directory(dir)
}

/// Flush the directory entry created by a rename
#[cfg(unix)]
fn sync_directory(dir: &Path) -> Result<()> {
    std::fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| DocSignError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> Result<()> {
    Ok(())
}
