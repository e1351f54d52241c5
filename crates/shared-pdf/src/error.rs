use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("PDF structure error: {0}")]
    Structure(String),

    #[error("Failed to serialize PDF: {0}")]
    Serialization(String),

    #[error("Signature placeholder not found: {0}")]
    PlaceholderNotFound(String),

    #[error("/ByteRange placeholder not found near the signature contents")]
    ByteRangeNotFound,

    #[error("Byte range {rendered} does not fit in {reserved} reserved bytes")]
    ByteRangeOverflow { rendered: String, reserved: usize },

    #[error("Signature too large: {actual} hex digits (max {capacity})")]
    SignatureTooLarge { actual: usize, capacity: usize },

    #[error("Malformed signature dictionary: {0}")]
    MalformedSignature(String),

    #[error("Failed to build signature appearance: {0}")]
    Appearance(String),
}
