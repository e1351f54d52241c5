//! Per-operation signing configuration

use std::path::{Path, PathBuf};

use shared_crypto::{Certificate, CertificateStore, CryptoError, PrivateKeyMaterial};
use shared_pdf::{AppearanceOptions, PlaceholderOptions, StampFont};

use crate::error::Result;

/// Everything one signing pass needs
///
/// Consumed by [`crate::sign_pdf`] so the unlocked key is dropped with it.
#[derive(Debug)]
pub struct SignatureConfig {
    certificate: Certificate,
    private_key: PrivateKeyMaterial,
    pub reason: String,
    pub location: String,
    pub use_visual_stamp: bool,
    pub stamp_image_path: Option<PathBuf>,
    pub appearance: AppearanceOptions,
    pub placeholder: PlaceholderOptions,
}

impl SignatureConfig {
    /// Pair a certificate with its decrypted key
    ///
    /// The stamp font follows the certificate's common name.
    pub fn new(certificate: Certificate, private_key: PrivateKeyMaterial) -> Result<Self> {
        if !private_key.matches_certificate(&certificate) {
            return Err(CryptoError::KeyMismatch(certificate.subject()).into());
        }

        let appearance = AppearanceOptions {
            font: StampFont::for_text(certificate.subject_cn()),
            ..AppearanceOptions::default()
        };

        Ok(Self {
            certificate,
            private_key,
            reason: String::new(),
            location: String::new(),
            use_visual_stamp: false,
            stamp_image_path: None,
            appearance,
            placeholder: PlaceholderOptions::default(),
        })
    }

    /// Decrypt the certificate's key from `store` and build a config
    pub fn unlock(store: &CertificateStore, certificate: Certificate, password: &str) -> Result<Self> {
        let private_key = store.decrypt_private_key(&certificate, password)?;
        Self::new(certificate, private_key)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Draw `path` as the visible stamp
    pub fn with_stamp_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.use_visual_stamp = true;
        self.stamp_image_path = Some(path.into());
        self
    }

    pub fn with_appearance(mut self, appearance: AppearanceOptions) -> Self {
        self.appearance = appearance;
        self
    }

    pub fn with_placeholder(mut self, placeholder: PlaceholderOptions) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn private_key(&self) -> &PrivateKeyMaterial {
        &self.private_key
    }

    /// Name written to `/Name` and the text stamp
    pub fn signer_name(&self) -> &str {
        self.certificate.subject_cn()
    }

    /// The stamp image to draw, if the visual stamp is enabled
    pub fn stamp_image(&self) -> Option<&Path> {
        if self.use_visual_stamp {
            self.stamp_image_path.as_deref()
        } else {
            None
        }
    }
}
