//! Types shared between the signing crates and their hosts

pub mod types;
pub mod validation;

pub use types::PdfRect;
pub use validation::SignatureValidationResult;
