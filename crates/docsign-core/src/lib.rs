//! Document signing core logic
//!
//! This crate ties the PDF and crypto layers together: it reserves a
//! signature placeholder, patches `/ByteRange`, builds a detached CMS
//! signature with an NPKI key, and verifies embedded signatures.
//!
//! ```no_run
//! use std::path::Path;
//! use docsign_core::{sign_pdf, verify_all, CertificateStore, SignatureConfig};
//!
//! # fn main() -> Result<(), docsign_core::DocSignError> {
//! let store = CertificateStore::from_env();
//! let certificate = store.list_user_certificates().remove(0);
//! let config = SignatureConfig::unlock(&store, certificate, "password")?
//!     .with_reason("Approved")
//!     .with_location("Seoul");
//!
//! sign_pdf(Path::new("in.pdf"), Path::new("out.pdf"), config, 0, None)?;
//! for field in verify_all(Path::new("out.pdf"))? {
//!     println!("{}: {}", field.field_name, field.result.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod signer;
pub mod verifier;

pub use config::SignatureConfig;
pub use error::{DocSignError, Result};
pub use signer::{sign_pdf, sign_pdf_bytes, CmsSigner, SignedPdf};
pub use verifier::{
    signature_dictionary, verify_all, verify_all_bytes, verify_bytes, verify_pdf,
    FieldVerification, SignatureVerifier,
};

// Re-export types from shared crates
pub use shared_crypto::{Certificate, CertificateStore, CryptoError, PrivateKeyMaterial};
pub use shared_pdf::{AppearanceOptions, PdfError, PlaceholderOptions, StampFont};
pub use shared_types::{PdfRect, SignatureValidationResult};
