//! NPKI user certificates
//!
//! A [`Certificate`] is the parsed `signCert.der` of one certificate
//! directory, together with the directory it was loaded from so the matching
//! `signPri.key` can be found later.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use const_oid::db::rfc4519;
use der::{Decode, Tag, Tagged};
use x509_cert::name::Name;
use x509_cert::time::Time;

use crate::error::CryptoError;
use crate::store::{CERT_FILE_NAME, KEY_FILE_NAME};

/// A user certificate found on disk
#[derive(Debug, Clone)]
pub struct Certificate {
    subject_cn: String,
    issuer_cn: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    key_dir: PathBuf,
    x509: x509_cert::Certificate,
}

impl Certificate {
    /// Parse a DER certificate that lives in `key_dir`
    pub fn from_der(der: &[u8], key_dir: impl Into<PathBuf>) -> Result<Self, CryptoError> {
        let x509 = x509_cert::Certificate::from_der(der)
            .map_err(|e| CryptoError::CertificateParse(e.to_string()))?;
        Ok(Self::from_x509(x509, key_dir))
    }

    /// Wrap an already parsed certificate (e.g. one embedded in a CMS blob)
    pub fn from_x509(x509: x509_cert::Certificate, key_dir: impl Into<PathBuf>) -> Self {
        let tbs = &x509.tbs_certificate;
        Self {
            subject_cn: display_name(&tbs.subject),
            issuer_cn: display_name(&tbs.issuer),
            not_before: to_datetime(&tbs.validity.not_before),
            not_after: to_datetime(&tbs.validity.not_after),
            key_dir: key_dir.into(),
            x509,
        }
    }

    pub fn subject_cn(&self) -> &str {
        &self.subject_cn
    }

    pub fn issuer_cn(&self) -> &str {
        &self.issuer_cn
    }

    /// Full RFC 4514 subject string
    pub fn subject(&self) -> String {
        self.x509.tbs_certificate.subject.to_string()
    }

    pub fn serial_number_hex(&self) -> String {
        hex::encode(self.x509.tbs_certificate.serial_number.as_bytes())
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Directory holding `signCert.der` and `signPri.key`
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    pub fn cert_path(&self) -> PathBuf {
        self.key_dir.join(CERT_FILE_NAME)
    }

    pub fn key_path(&self) -> PathBuf {
        self.key_dir.join(KEY_FILE_NAME)
    }

    pub fn x509(&self) -> &x509_cert::Certificate {
        &self.x509
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.not_after
    }

    pub fn is_valid_at(&self, instant: DateTime<Utc>) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }
}

/// Common name of an X.509 name, if it carries one
pub fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .filter(|atv| atv.oid == rfc4519::CN)
        .find_map(|atv| decode_directory_string(atv.value.tag(), atv.value.value()))
}

/// CN when present, otherwise the whole distinguished name
pub fn display_name(name: &Name) -> String {
    common_name(name).unwrap_or_else(|| name.to_string())
}

fn decode_directory_string(tag: Tag, bytes: &[u8]) -> Option<String> {
    match tag {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(bytes).ok().map(str::to_string)
        }
        Tag::BmpString => {
            if bytes.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).ok()
        }
        _ => None,
    }
}

pub(crate) fn to_datetime(time: &Time) -> DateTime<Utc> {
    let secs = time.to_unix_duration().as_secs() as i64;
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const RSA_CERT: &[u8] =
        include_bytes!("../../docsign-core/tests/fixtures/NPKI/TestCA/USER/rsa-user/signCert.der");
    const EXPIRED_CERT: &[u8] = include_bytes!(
        "../../docsign-core/tests/fixtures/NPKI/TestCA/USER/expired-user/signCert.der"
    );

    #[test]
    fn test_parses_korean_subject_cn() {
        let cert = Certificate::from_der(RSA_CERT, "/tmp/rsa-user").unwrap();
        assert_eq!(cert.subject_cn(), "홍길동()0012345678901234");
        assert_eq!(cert.issuer_cn(), "TestCA Class 2");
        assert_eq!(cert.serial_number_hex(), "1001");
        assert!(cert.subject().contains("O=TestCA"));
    }

    #[test]
    fn test_key_paths_follow_directory() {
        let cert = Certificate::from_der(RSA_CERT, "/npki/user").unwrap();
        assert_eq!(cert.cert_path(), PathBuf::from("/npki/user/signCert.der"));
        assert_eq!(cert.key_path(), PathBuf::from("/npki/user/signPri.key"));
    }

    #[test]
    fn test_expired_certificate() {
        let cert = Certificate::from_der(EXPIRED_CERT, "/tmp/expired").unwrap();
        assert!(cert.is_expired());
        assert_eq!(
            cert.not_before(),
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            cert.not_after(),
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
        );
        assert!(cert.is_valid_at(Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap()));
        assert!(!cert.is_valid_at(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = Certificate::from_der(b"not a certificate", "/tmp").unwrap_err();
        assert!(matches!(err, CryptoError::CertificateParse(_)));
    }

    #[test]
    fn test_bmp_string_decoding() {
        let bytes = [0xD6, 0x4D, 0xAE, 0x38, 0xB3, 0xD9];
        assert_eq!(
            decode_directory_string(Tag::BmpString, &bytes).as_deref(),
            Some("홍길동")
        );
        assert_eq!(decode_directory_string(Tag::BmpString, &bytes[..3]), None);
    }
}
