//! Writing the finished CMS blob into the reserved `/Contents` window

use crate::byterange::ContentsWindow;
use crate::error::PdfError;

/// Hex-encode `cms_der` into `window`, filling unused digits with `0`
///
/// Fails without touching `bytes` when the signature does not fit.
pub fn embed_signature(
    bytes: &mut [u8],
    window: &ContentsWindow,
    cms_der: &[u8],
) -> Result<(), PdfError> {
    if window.end > bytes.len()
        || window.end < window.start + 2
        || bytes[window.start] != b'<'
        || bytes[window.end - 1] != b'>'
    {
        return Err(PdfError::PlaceholderNotFound(format!(
            "no hex string at {}..{}",
            window.start, window.end
        )));
    }

    let sig_hex = hex::encode(cms_der);
    let capacity = window.digit_capacity();
    if sig_hex.len() > capacity {
        return Err(PdfError::SignatureTooLarge {
            actual: sig_hex.len(),
            capacity,
        });
    }

    let digits = &mut bytes[window.start + 1..window.end - 1];
    digits[..sig_hex.len()].copy_from_slice(sig_hex.as_bytes());
    for byte in digits.iter_mut().skip(sig_hex.len()) {
        *byte = b'0';
    }

    tracing::debug!(
        cms_len = cms_der.len(),
        capacity,
        "embedded signature into /Contents"
    );
    Ok(())
}
