//! Shared cryptography utilities
//!
//! This crate provides certificate discovery, private key decryption and
//! detached CMS signatures for NPKI-style signing identities.

pub mod cert;
pub mod cms;
pub mod error;
pub mod keys;
pub mod store;

pub use cert::Certificate;
pub use crate::cms::{sign_detached, verify_detached, DigestAlgorithm, ParsedSignature};
pub use error::CryptoError;
pub use keys::PrivateKeyMaterial;
pub use store::CertificateStore;
