//! Decrypted private keys
//!
//! `signPri.key` holds a DER `EncryptedPrivateKeyInfo`. Decryption yields a
//! PKCS#8 key that is either RSA or ECDSA P-256.

use std::fmt;

use const_oid::db::rfc5912;
use der::Encode;
use const_oid::ObjectIdentifier;
use pkcs8::{pkcs5, EncryptedPrivateKeyInfo, PrivateKeyInfo};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::cert::Certificate;
use crate::error::CryptoError;

const AES_CBC_CIPHERS: [ObjectIdentifier; 3] = [
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.2"),
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.22"),
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.42"),
];

/// A decrypted signing key
///
/// Both variants zeroize their secret material on drop.
pub enum PrivateKeyMaterial {
    Rsa(RsaPrivateKey),
    EcP256(p256::SecretKey),
}

impl PrivateKeyMaterial {
    /// Decrypt a DER `EncryptedPrivateKeyInfo` with a password
    ///
    /// Only PBES2 with AES-CBC is decrypted. SEED and 3DES keys fail with an
    /// "unsupported key encryption" message, distinct from "wrong password".
    pub fn decrypt(encrypted_der: &[u8], password: &str) -> Result<Self, CryptoError> {
        let info = EncryptedPrivateKeyInfo::try_from(encrypted_der).map_err(|e| {
            CryptoError::Authentication(format!("unsupported key encryption scheme: {}", e))
        })?;

        let cipher = match &info.encryption_algorithm {
            pkcs5::EncryptionScheme::Pbes2(params) => params.encryption.oid(),
            other => other.oid(),
        };
        if !AES_CBC_CIPHERS.contains(&cipher) {
            return Err(CryptoError::Authentication(format!(
                "unsupported key encryption scheme {}",
                cipher
            )));
        }

        // PBES2 padding failures are the only signal for a wrong password
        let document = info
            .decrypt(password.as_bytes())
            .map_err(|_| CryptoError::Authentication("wrong password".to_string()))?;

        Self::from_pkcs8_der(document.as_bytes())
    }

    /// Decode an unencrypted PKCS#8 `PrivateKeyInfo`
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let info = PrivateKeyInfo::try_from(der)
            .map_err(|e| CryptoError::Authentication(format!("invalid PKCS#8 key: {}", e)))?;

        match info.algorithm.oid {
            rfc5912::RSA_ENCRYPTION => RsaPrivateKey::from_pkcs8_der(der)
                .map(Self::Rsa)
                .map_err(|e| CryptoError::Authentication(format!("invalid RSA key: {}", e))),
            rfc5912::ID_EC_PUBLIC_KEY => p256::SecretKey::from_pkcs8_der(der)
                .map(Self::EcP256)
                .map_err(|e| {
                    CryptoError::UnsupportedAlgorithm(format!("EC key is not P-256: {}", e))
                }),
            oid => Err(CryptoError::UnsupportedAlgorithm(format!(
                "private key algorithm {}",
                oid
            ))),
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::EcP256(_) => "ECDSA P-256",
        }
    }

    /// DER `SubjectPublicKeyInfo` of the matching public key
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        let document = match self {
            Self::Rsa(key) => RsaPublicKey::from(key).to_public_key_der(),
            Self::EcP256(key) => key.public_key().to_public_key_der(),
        }
        .map_err(|e| CryptoError::Signing(format!("failed to encode public key: {}", e)))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Whether this key is the private half of `certificate`
    pub fn matches_certificate(&self, certificate: &Certificate) -> bool {
        let Ok(ours) = self.public_key_der() else {
            return false;
        };
        certificate
            .x509()
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map(|theirs| theirs == ours)
            .unwrap_or(false)
    }
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyMaterial")
            .field("algorithm", &self.algorithm_name())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Read and decrypt the key file belonging to `certificate`
pub fn decrypt_private_key(
    certificate: &Certificate,
    password: &str,
) -> Result<PrivateKeyMaterial, CryptoError> {
    let key_path = certificate.key_path();
    let encrypted = std::fs::read(&key_path)?;
    let key = PrivateKeyMaterial::decrypt(&encrypted, password)?;
    tracing::debug!(
        subject = certificate.subject_cn(),
        algorithm = key.algorithm_name(),
        "decrypted private key"
    );
    Ok(key)
}
