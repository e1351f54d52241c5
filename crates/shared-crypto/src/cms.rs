//! Detached CMS (PKCS#7) SignedData for `adbe.pkcs7.detached`
//!
//! Signing produces a SignedData without encapsulated content carrying the
//! signer certificate and the content-type, message-digest and signing-time
//! signed attributes. Verification accepts the zero padding that follows the
//! DER blob inside a PDF `/Contents` string.

use chrono::{DateTime, Utc};
use cms::builder::{create_signing_time_attribute, SignedDataBuilder, SignerInfoBuilder};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::ContentInfo;
use cms::signed_data::{EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo};
use const_oid::db::{rfc5911, rfc5912};
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::asn1::OctetString;
use der::{Decode, Encode, SliceReader};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};
use signature::Keypair;
use spki::{
    AlgorithmIdentifierOwned, DynSignatureAlgorithmIdentifier, EncodePublicKey,
    SignatureBitStringEncoding,
};
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::time::Time;

use crate::cert::{self, Certificate};
use crate::error::CryptoError;
use crate::keys::PrivateKeyMaterial;

/// Digest algorithms accepted in SignerInfo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn from_oid(oid: ObjectIdentifier) -> Result<Self, CryptoError> {
        match oid {
            rfc5912::ID_SHA_256 => Ok(Self::Sha256),
            rfc5912::ID_SHA_384 => Ok(Self::Sha384),
            rfc5912::ID_SHA_512 => Ok(Self::Sha512),
            other => Err(CryptoError::UnsupportedAlgorithm(format!(
                "digest algorithm {}",
                other
            ))),
        }
    }

    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            Self::Sha256 => rfc5912::ID_SHA_256,
            Self::Sha384 => rfc5912::ID_SHA_384,
            Self::Sha512 => rfc5912::ID_SHA_512,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn pkcs1v15_scheme(&self) -> Pkcs1v15Sign {
        match self {
            Self::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
            Self::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
            Self::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        }
    }
}

/// Build a detached SignedData over `content`, returned as DER
pub fn sign_detached(
    content: &[u8],
    certificate: &Certificate,
    key: &PrivateKeyMaterial,
) -> Result<Vec<u8>, CryptoError> {
    let digest = Sha256::digest(content);

    let der = match key {
        PrivateKeyMaterial::Rsa(private_key) => {
            let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(private_key.clone());
            build_signed_data::<_, rsa::pkcs1v15::Signature>(&signer, certificate, &digest)?
        }
        PrivateKeyMaterial::EcP256(secret_key) => {
            let signer = p256::ecdsa::SigningKey::from(secret_key);
            build_signed_data::<_, p256::ecdsa::DerSignature>(&signer, certificate, &digest)?
        }
    };

    tracing::debug!(
        algorithm = key.algorithm_name(),
        cms_len = der.len(),
        "built detached CMS signature"
    );
    Ok(der)
}

fn build_signed_data<S, Sig>(
    signer: &S,
    certificate: &Certificate,
    digest: &[u8],
) -> Result<Vec<u8>, CryptoError>
where
    S: Keypair + DynSignatureAlgorithmIdentifier + signature::Signer<Sig>,
    S::VerifyingKey: EncodePublicKey,
    Sig: SignatureBitStringEncoding,
{
    let x509 = certificate.x509();
    let digest_algorithm = AlgorithmIdentifierOwned {
        oid: DigestAlgorithm::Sha256.oid(),
        parameters: None,
    };
    let content_info = EncapsulatedContentInfo {
        econtent_type: rfc5911::ID_DATA,
        econtent: None,
    };
    let sid = issuer_and_serial(x509);

    let mut signer_info = SignerInfoBuilder::new(
        signer,
        sid,
        digest_algorithm.clone(),
        &content_info,
        Some(digest),
    )
    .map_err(builder_error)?;
    signer_info
        .add_signed_attribute(create_signing_time_attribute().map_err(builder_error)?)
        .map_err(builder_error)?;

    let signed = SignedDataBuilder::new(&content_info)
        .add_digest_algorithm(digest_algorithm)
        .map_err(builder_error)?
        .add_certificate(CertificateChoices::Certificate(x509.clone()))
        .map_err(builder_error)?
        .add_signer_info::<S, Sig>(signer_info)
        .map_err(builder_error)?
        .build()
        .map_err(builder_error)?;

    signed
        .to_der()
        .map_err(|e| CryptoError::Signing(e.to_string()))
}

fn issuer_and_serial(x509: &x509_cert::Certificate) -> SignerIdentifier {
    SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
        issuer: x509.tbs_certificate.issuer.clone(),
        serial_number: x509.tbs_certificate.serial_number.clone(),
    })
}

fn builder_error(e: impl std::fmt::Debug) -> CryptoError {
    CryptoError::Signing(format!("{:?}", e))
}

/// One SignerInfo together with the certificate it names
#[derive(Debug, Clone)]
struct SignerEntry {
    certificate: Certificate,
    signer_info: SignerInfo,
    digest_algorithm: DigestAlgorithm,
}

impl SignerEntry {
    fn locate(signed_data: &SignedData, signer_info: &SignerInfo) -> Result<Self, CryptoError> {
        let certificate = find_signer_certificate(signed_data, &signer_info.sid)
            .ok_or(CryptoError::CertificateNotFound)?;
        Ok(Self {
            certificate: Certificate::from_x509(certificate, ""),
            signer_info: signer_info.clone(),
            digest_algorithm: DigestAlgorithm::from_oid(signer_info.digest_alg.oid)?,
        })
    }

    fn verify(&self, content: &[u8]) -> Result<(), CryptoError> {
        let content_digest = self.digest_algorithm.digest(content);

        let signed_message = match &self.signer_info.signed_attrs {
            Some(attrs) => {
                let message_digest = attrs
                    .iter()
                    .find(|attr| attr.oid == rfc5911::ID_MESSAGE_DIGEST)
                    .and_then(|attr| attr.values.iter().next())
                    .ok_or_else(|| {
                        CryptoError::MalformedCms("missing message-digest attribute".to_string())
                    })?
                    .decode_as::<OctetString>()
                    .map_err(malformed)?;

                if message_digest.as_bytes() != content_digest.as_slice() {
                    return Err(CryptoError::IntegrityMismatch(format!(
                        "message digest of {} does not match signed bytes",
                        self.certificate.subject_cn()
                    )));
                }
                attrs.to_der().map_err(malformed)?
            }
            None => content.to_vec(),
        };

        let hashed = self.digest_algorithm.digest(&signed_message);
        verify_with_certificate(
            self.certificate.x509(),
            &hashed,
            self.signer_info.signature.as_bytes(),
            self.digest_algorithm,
        )
    }
}

/// A parsed signature whose signer certificates have all been located
///
/// The first SignerInfo in the set is the primary signer reported to hosts;
/// verification covers every signer.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    primary: SignerEntry,
    co_signers: Vec<SignerEntry>,
    signing_time: Option<DateTime<Utc>>,
}

impl ParsedSignature {
    /// Parse DER SignedData, ignoring trailing bytes after the outer TLV
    ///
    /// Fails with `CertificateNotFound` when any signer's certificate is
    /// missing from the embedded set.
    pub fn parse(cms_der: &[u8]) -> Result<Self, CryptoError> {
        let mut reader = SliceReader::new(cms_der).map_err(malformed)?;
        let content_info = ContentInfo::decode(&mut reader).map_err(malformed)?;
        if content_info.content_type != rfc5911::ID_SIGNED_DATA {
            return Err(CryptoError::MalformedCms(format!(
                "content type {} is not signedData",
                content_info.content_type
            )));
        }

        let signed_data = content_info
            .content
            .decode_as::<SignedData>()
            .map_err(malformed)?;

        let mut entries = signed_data
            .signer_infos
            .0
            .iter()
            .map(|signer_info| SignerEntry::locate(&signed_data, signer_info))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter();
        let primary = entries
            .next()
            .ok_or_else(|| CryptoError::MalformedCms("no SignerInfo present".to_string()))?;
        let co_signers: Vec<SignerEntry> = entries.collect();
        if !co_signers.is_empty() {
            tracing::debug!(count = co_signers.len() + 1, "signature carries several signers");
        }

        Ok(Self {
            signing_time: signing_time_attribute(&primary.signer_info),
            primary,
            co_signers,
        })
    }

    /// Certificate of the primary signer
    pub fn signer(&self) -> &Certificate {
        &self.primary.certificate
    }

    /// Certificates of every signer, primary first
    pub fn signers(&self) -> impl Iterator<Item = &Certificate> + '_ {
        self.entries().map(|entry| &entry.certificate)
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.primary.digest_algorithm
    }

    /// Value of the primary signer's signing-time attribute, if present
    pub fn signing_time(&self) -> Option<DateTime<Utc>> {
        self.signing_time
    }

    /// Check every signer against the detached `content`
    pub fn verify(&self, content: &[u8]) -> Result<(), CryptoError> {
        self.entries().try_for_each(|entry| entry.verify(content))
    }

    fn entries(&self) -> impl Iterator<Item = &SignerEntry> + '_ {
        std::iter::once(&self.primary).chain(self.co_signers.iter())
    }
}

/// Parse `cms_der` and verify it against `content` in one step
pub fn verify_detached(cms_der: &[u8], content: &[u8]) -> Result<ParsedSignature, CryptoError> {
    let parsed = ParsedSignature::parse(cms_der)?;
    parsed.verify(content)?;
    Ok(parsed)
}

fn find_signer_certificate(
    signed_data: &SignedData,
    sid: &SignerIdentifier,
) -> Option<x509_cert::Certificate> {
    let certificates = signed_data.certificates.as_ref()?;
    certificates
        .0
        .iter()
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => Some(cert),
            _ => None,
        })
        .find(|cert| match sid {
            SignerIdentifier::IssuerAndSerialNumber(isn) => {
                cert.tbs_certificate.issuer == isn.issuer
                    && cert.tbs_certificate.serial_number == isn.serial_number
            }
            SignerIdentifier::SubjectKeyIdentifier(ski) => {
                subject_key_identifier(cert).as_ref() == Some(ski)
            }
        })
        .cloned()
}

fn subject_key_identifier(cert: &x509_cert::Certificate) -> Option<SubjectKeyIdentifier> {
    cert.tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == SubjectKeyIdentifier::OID)
        .and_then(|ext| SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes()).ok())
}

fn signing_time_attribute(signer_info: &SignerInfo) -> Option<DateTime<Utc>> {
    let attrs = signer_info.signed_attrs.as_ref()?;
    let value = attrs
        .iter()
        .find(|attr| attr.oid == rfc5911::ID_SIGNING_TIME)?
        .values
        .iter()
        .next()?;
    let time = Time::from_der(&value.to_der().ok()?).ok()?;
    Some(cert::to_datetime(&time))
}

fn verify_with_certificate(
    certificate: &x509_cert::Certificate,
    hashed: &[u8],
    signature: &[u8],
    digest_algorithm: DigestAlgorithm,
) -> Result<(), CryptoError> {
    let spki = &certificate.tbs_certificate.subject_public_key_info;
    let spki_der = spki.to_der().map_err(malformed)?;

    match spki.algorithm.oid {
        rfc5912::RSA_ENCRYPTION => {
            let public_key = RsaPublicKey::from_public_key_der(&spki_der)
                .map_err(|e| CryptoError::CertificateParse(e.to_string()))?;
            public_key
                .verify(digest_algorithm.pkcs1v15_scheme(), hashed, signature)
                .map_err(|_| {
                    CryptoError::IntegrityMismatch("RSA signature does not verify".to_string())
                })
        }
        rfc5912::ID_EC_PUBLIC_KEY => {
            use p256::ecdsa::signature::hazmat::PrehashVerifier;

            let verifying_key = p256::ecdsa::VerifyingKey::from_public_key_der(&spki_der)
                .map_err(|e| CryptoError::UnsupportedAlgorithm(e.to_string()))?;
            let signature = p256::ecdsa::Signature::from_der(signature).map_err(|e| {
                CryptoError::MalformedCms(format!("invalid ECDSA signature: {}", e))
            })?;
            verifying_key
                .verify_prehash(hashed, &signature)
                .map_err(|_| {
                    CryptoError::IntegrityMismatch("ECDSA signature does not verify".to_string())
                })
        }
        other => Err(CryptoError::UnsupportedAlgorithm(format!(
            "public key algorithm {}",
            other
        ))),
    }
}

fn malformed(e: der::Error) -> CryptoError {
    CryptoError::MalformedCms(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Any;
    use pretty_assertions::assert_eq;

    const USER_DIR: &str = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../docsign-core/tests/fixtures/NPKI/TestCA/USER"
    );

    fn identity(user: &str) -> (Certificate, PrivateKeyMaterial) {
        let dir = format!("{}/{}", USER_DIR, user);
        let cert_der = std::fs::read(format!("{}/signCert.der", dir)).unwrap();
        let key_der = std::fs::read(format!("{}/signPri.key", dir)).unwrap();
        (
            Certificate::from_der(&cert_der, &dir).unwrap(),
            PrivateKeyMaterial::decrypt(&key_der, "correct-horse").unwrap(),
        )
    }

    #[test]
    fn test_ec_sign_and_verify() {
        let (cert, key) = identity("ec-user");
        let content = b"%PDF-1.7 signed byte ranges";

        let der = sign_detached(content, &cert, &key).unwrap();
        let parsed = verify_detached(&der, content).unwrap();

        assert_eq!(parsed.signer().subject_cn(), "Kim Test");
        assert_eq!(parsed.digest_algorithm(), DigestAlgorithm::Sha256);
        assert!(parsed.signing_time().is_some());
    }

    #[test]
    fn test_rsa_sign_and_verify() {
        let (cert, key) = identity("rsa-user");
        let content = b"another document";

        let der = sign_detached(content, &cert, &key).unwrap();
        let parsed = verify_detached(&der, content).unwrap();
        assert_eq!(parsed.signer().serial_number_hex(), "1001");
    }

    #[test]
    fn test_trailing_padding_is_ignored() {
        let (cert, key) = identity("ec-user");
        let content = b"padded";

        let mut der = sign_detached(content, &cert, &key).unwrap();
        der.extend(std::iter::repeat(0u8).take(512));
        assert!(verify_detached(&der, content).is_ok());
    }

    #[test]
    fn test_modified_content_is_integrity_mismatch() {
        let (cert, key) = identity("ec-user");
        let der = sign_detached(b"original", &cert, &key).unwrap();

        let err = verify_detached(&der, b"tampered").unwrap_err();
        assert!(matches!(err, CryptoError::IntegrityMismatch(_)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = verify_detached(&[0x30, 0x03, 0x02, 0x01, 0x01], b"x").unwrap_err();
        assert!(matches!(err, CryptoError::MalformedCms(_)));

        let err = verify_detached(&[], b"x").unwrap_err();
        assert!(matches!(err, CryptoError::MalformedCms(_)));
    }

    #[test]
    fn test_missing_certificate_is_reported() {
        let (cert, key) = identity("ec-user");
        let der = sign_detached(b"content", &cert, &key).unwrap();

        let content_info = ContentInfo::from_der(&der).unwrap();
        let mut signed_data = content_info.content.decode_as::<SignedData>().unwrap();
        signed_data.certificates = None;
        let stripped = ContentInfo {
            content_type: content_info.content_type,
            content: Any::encode_from(&signed_data).unwrap(),
        }
        .to_der()
        .unwrap();

        let err = verify_detached(&stripped, b"content").unwrap_err();
        assert!(matches!(err, CryptoError::CertificateNotFound));
    }

    /// SignedData with an EC and an RSA signer; the RSA signer signs `rsa_content`
    fn co_signed(content: &[u8], rsa_content: &[u8], include_rsa_certificate: bool) -> Vec<u8> {
        let (ec_cert, ec_key) = identity("ec-user");
        let (rsa_cert, rsa_key) = identity("rsa-user");
        let ec_signer = match &ec_key {
            PrivateKeyMaterial::EcP256(secret) => p256::ecdsa::SigningKey::from(secret),
            other => panic!("unexpected key {}", other.algorithm_name()),
        };
        let rsa_signer = match &rsa_key {
            PrivateKeyMaterial::Rsa(private) => {
                rsa::pkcs1v15::SigningKey::<Sha256>::new(private.clone())
            }
            other => panic!("unexpected key {}", other.algorithm_name()),
        };

        let digest_algorithm = AlgorithmIdentifierOwned {
            oid: DigestAlgorithm::Sha256.oid(),
            parameters: None,
        };
        let content_info = EncapsulatedContentInfo {
            econtent_type: rfc5911::ID_DATA,
            econtent: None,
        };
        let ec_digest = Sha256::digest(content);
        let rsa_digest = Sha256::digest(rsa_content);

        let ec_info = SignerInfoBuilder::new(
            &ec_signer,
            issuer_and_serial(ec_cert.x509()),
            digest_algorithm.clone(),
            &content_info,
            Some(ec_digest.as_slice()),
        )
        .unwrap();
        let rsa_info = SignerInfoBuilder::new(
            &rsa_signer,
            issuer_and_serial(rsa_cert.x509()),
            digest_algorithm.clone(),
            &content_info,
            Some(rsa_digest.as_slice()),
        )
        .unwrap();

        let mut builder = SignedDataBuilder::new(&content_info);
        builder
            .add_digest_algorithm(digest_algorithm)
            .unwrap()
            .add_certificate(CertificateChoices::Certificate(ec_cert.x509().clone()))
            .unwrap();
        if include_rsa_certificate {
            builder
                .add_certificate(CertificateChoices::Certificate(rsa_cert.x509().clone()))
                .unwrap();
        }
        builder
            .add_signer_info::<_, p256::ecdsa::DerSignature>(ec_info)
            .unwrap()
            .add_signer_info::<_, rsa::pkcs1v15::Signature>(rsa_info)
            .unwrap();
        builder.build().unwrap().to_der().unwrap()
    }

    #[test]
    fn test_every_signer_is_verified() {
        let content = b"co-signed contract";
        let der = co_signed(content, content, true);

        let parsed = verify_detached(&der, content).unwrap();
        let mut serials: Vec<String> = parsed.signers().map(|c| c.serial_number_hex()).collect();
        serials.sort();
        assert_eq!(serials, vec!["1001".to_string(), "1002".to_string()]);
    }

    #[test]
    fn test_co_signer_over_other_content_is_integrity_mismatch() {
        let content = b"co-signed contract";
        let der = co_signed(content, b"a different contract", true);

        let parsed = ParsedSignature::parse(&der).unwrap();
        assert_eq!(parsed.signers().count(), 2);
        let err = parsed.verify(content).unwrap_err();
        assert!(matches!(err, CryptoError::IntegrityMismatch(_)));
    }

    #[test]
    fn test_co_signer_without_certificate_is_reported() {
        let content = b"co-signed contract";
        let der = co_signed(content, content, false);

        let err = verify_detached(&der, content).unwrap_err();
        assert!(matches!(err, CryptoError::CertificateNotFound));
    }

    #[test]
    fn test_digest_algorithm_oids() {
        for alg in [
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(DigestAlgorithm::from_oid(alg.oid()).unwrap(), alg);
        }
        assert_eq!(DigestAlgorithm::Sha384.digest(b"abc").len(), 48);
        assert!(DigestAlgorithm::from_oid(rfc5912::RSA_ENCRYPTION).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_digest_algorithm() -> impl Strategy<Value = DigestAlgorithm> {
        prop_oneof![
            Just(DigestAlgorithm::Sha256),
            Just(DigestAlgorithm::Sha384),
            Just(DigestAlgorithm::Sha512),
        ]
    }

    proptest! {
        #[test]
        fn prop_digest_length_is_fixed(alg in any_digest_algorithm(), data in prop::collection::vec(any::<u8>(), 0..256)) {
            let expected = match alg {
                DigestAlgorithm::Sha256 => 32,
                DigestAlgorithm::Sha384 => 48,
                DigestAlgorithm::Sha512 => 64,
            };
            let digest = alg.digest(&data);
            prop_assert_eq!(digest.len(), expected);
            prop_assert_eq!(digest, alg.digest(&data));
        }

        #[test]
        fn prop_oid_round_trips(alg in any_digest_algorithm()) {
            prop_assert_eq!(DigestAlgorithm::from_oid(alg.oid()).unwrap(), alg);
        }
    }
}
