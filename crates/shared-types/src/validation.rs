//! Verification outcome reported to hosts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of verifying one embedded signature
///
/// Always produced, even when the signature could not be parsed; failures are
/// described by `message` rather than surfaced as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureValidationResult {
    pub is_valid: bool,
    /// Set only when the signed bytes no longer match the signature
    pub is_document_modified: bool,
    pub signer_name: Option<String>,
    pub signing_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub message: String,
}

impl SignatureValidationResult {
    pub fn valid(message: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            is_document_modified: false,
            signer_name: None,
            signing_time: None,
            reason: None,
            location: None,
            message: message.into(),
        }
    }

    /// A structural failure (malformed dictionary, unparseable CMS, ...)
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            ..Self::valid(message)
        }
    }

    /// The signature parsed but does not cover the current bytes
    pub fn modified(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            is_document_modified: true,
            ..Self::valid(message)
        }
    }
}
