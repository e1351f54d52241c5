use std::path::PathBuf;

use shared_crypto::CryptoError;
use shared_pdf::PdfError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocSignError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DocSignError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrong password or an undecryptable key file
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::Authentication(_)))
    }
}

pub type Result<T> = std::result::Result<T, DocSignError>;
