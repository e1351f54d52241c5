use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    /// Wrong password, or a key file protected by a scheme we cannot decrypt
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to parse certificate: {0}")]
    CertificateParse(String),

    #[error("Signer certificate not found in signature")]
    CertificateNotFound,

    #[error("Signature does not match signed content: {0}")]
    IntegrityMismatch(String),

    #[error("Malformed CMS structure: {0}")]
    MalformedCms(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Private key does not belong to certificate {0}")]
    KeyMismatch(String),

    #[error("Failed to build signature: {0}")]
    Signing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
