//! Discovery of NPKI certificate directories
//!
//! Real trees nest as `NPKI/<CA>/USER/<subject>/{signCert.der,signPri.key}`;
//! the scan looks for any directory holding both files.

use std::path::{Path, PathBuf};

use crate::cert::Certificate;
use crate::error::CryptoError;
use crate::keys::{self, PrivateKeyMaterial};

pub const CERT_FILE_NAME: &str = "signCert.der";
pub const KEY_FILE_NAME: &str = "signPri.key";

/// Environment variable overriding the NPKI root directory
pub const NPKI_HOME_ENV: &str = "NPKI_HOME";

/// How many directory levels below the root are searched
const MAX_SCAN_DEPTH: usize = 6;

/// Certificate store rooted at an NPKI directory
#[derive(Debug, Clone)]
pub struct CertificateStore {
    root: PathBuf,
}

impl CertificateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `NPKI_HOME`, falling back to the platform default
    pub fn from_env() -> Self {
        match std::env::var_os(NPKI_HOME_ENV) {
            Some(root) if !root.is_empty() => Self::new(root),
            _ => Self::new(Self::default_root()),
        }
    }

    /// Where NPKI client software keeps per-user certificates
    pub fn default_root() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        if cfg!(target_os = "windows") {
            home.join("AppData").join("LocalLow").join("NPKI")
        } else if cfg!(target_os = "macos") {
            home.join("Library").join("Preferences").join("NPKI")
        } else {
            home.join("NPKI")
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All loadable certificate/key pairs below the root
    ///
    /// A missing root yields an empty list. Directories that cannot be read
    /// and certificates that fail to parse are skipped.
    pub fn list_user_certificates(&self) -> Vec<Certificate> {
        let mut found = Vec::new();
        if !self.root.is_dir() {
            tracing::debug!(root = %self.root.display(), "NPKI root does not exist");
            return found;
        }
        scan_directory(&self.root, 0, &mut found);
        tracing::info!(
            root = %self.root.display(),
            count = found.len(),
            "listed user certificates"
        );
        found
    }

    /// Load the certificate in `dir` if both NPKI files are present
    pub fn load_certificate_from_path(dir: &Path) -> Option<Certificate> {
        let cert_path = dir.join(CERT_FILE_NAME);
        if !cert_path.is_file() || !dir.join(KEY_FILE_NAME).is_file() {
            return None;
        }

        let der = match std::fs::read(&cert_path) {
            Ok(der) => der,
            Err(e) => {
                tracing::warn!(path = %cert_path.display(), error = %e, "cannot read certificate");
                return None;
            }
        };

        match Certificate::from_der(&der, dir) {
            Ok(cert) => Some(cert),
            Err(e) => {
                tracing::warn!(path = %cert_path.display(), error = %e, "skipping certificate");
                None
            }
        }
    }

    /// Decrypt the private key belonging to `certificate`
    ///
    /// The password is only used for key derivation and is never retained.
    pub fn decrypt_private_key(
        &self,
        certificate: &Certificate,
        password: &str,
    ) -> Result<PrivateKeyMaterial, CryptoError> {
        keys::decrypt_private_key(certificate, password)
    }
}

fn scan_directory(dir: &Path, depth: usize, found: &mut Vec<Certificate>) {
    if let Some(cert) = CertificateStore::load_certificate_from_path(dir) {
        found.push(cert);
        return;
    }
    if depth >= MAX_SCAN_DEPTH {
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "cannot read directory");
            return;
        }
    };

    let mut children: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    children.sort();

    for child in children {
        scan_directory(&child, depth + 1, found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FIXTURE_ROOT: &str = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../docsign-core/tests/fixtures/NPKI"
    );

    #[test]
    fn test_lists_complete_pairs_only() {
        let store = CertificateStore::new(FIXTURE_ROOT);
        let certs = store.list_user_certificates();

        let mut dirs: Vec<String> = certs
            .iter()
            .map(|c| c.key_dir().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        dirs.sort();

        assert_eq!(
            dirs,
            vec!["ec-user", "expired-user", "legacy-user", "rsa-user"]
        );
    }

    #[test]
    fn test_missing_root_is_empty() {
        let store = CertificateStore::new("/definitely/not/an/npki/root");
        assert!(store.list_user_certificates().is_empty());
    }

    #[test]
    fn test_unparseable_certificate_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let user = root.path().join("CA").join("USER").join("broken");
        std::fs::create_dir_all(&user).unwrap();
        std::fs::write(user.join(CERT_FILE_NAME), b"garbage").unwrap();
        std::fs::write(user.join(KEY_FILE_NAME), b"garbage").unwrap();

        let store = CertificateStore::new(root.path());
        assert!(store.list_user_certificates().is_empty());
        assert!(CertificateStore::load_certificate_from_path(&user).is_none());
    }

    #[test]
    fn test_load_requires_key_file() {
        let dir = Path::new(FIXTURE_ROOT).join("TestCA/USER/incomplete-user");
        assert!(CertificateStore::load_certificate_from_path(&dir).is_none());

        let dir = Path::new(FIXTURE_ROOT).join("TestCA/USER/ec-user");
        let cert = CertificateStore::load_certificate_from_path(&dir).unwrap();
        assert_eq!(cert.subject_cn(), "Kim Test");
    }

    #[test]
    fn test_default_root_ends_with_npki() {
        assert!(CertificateStore::default_root().ends_with("NPKI"));
    }
}
