pub(crate) mod der_reader;
pub mod extensions;
pub mod params;

use der::asn1::{Any, AnyRef};
use der::{Decode, Encode};
use extensions::{SubjectKeyIdentifier, ToAndFromX509Extension};
use time::OffsetDateTime;
use x509_cert::certificate::CertificateInner;
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{PkiError, Result};
use crate::issuer::{CertificateIssuer, Issuer, SelfIssuer};
use crate::key::{PrivateKey, PublicKey, describe_oid};
use crate::pem_utils::{self, CERTIFICATE_LABEL};
use crate::tbs_certificate::{CertificateTemplate, from_x509_time};

/// Represents the supported signature algorithms for certificates and CRLs.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRsa,
    /// ECDSA with SHA-256.
    EcdsaWithSha256,
    /// Pure Ed25519.
    Ed25519,
}

impl SignatureAlgorithm {
    /// Converts the algorithm into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA carries explicit NULL parameters; the others carry none
    /// (RFC 4055, RFC 5758, RFC 8410).
    pub fn to_algorithm_identifier(self) -> AlgorithmIdentifierOwned {
        match self {
            SignatureAlgorithm::Sha256WithRsa => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(Any::from(AnyRef::NULL)),
            },
            SignatureAlgorithm::EcdsaWithSha256 => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
            SignatureAlgorithm::Ed25519 => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc8410::ID_ED_25519,
                parameters: None,
            },
        }
    }

    pub fn from_algorithm_identifier(algorithm: &AlgorithmIdentifierOwned) -> Result<Self> {
        match algorithm.oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => {
                Ok(SignatureAlgorithm::Sha256WithRsa)
            }
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256 => Ok(SignatureAlgorithm::EcdsaWithSha256),
            const_oid::db::rfc8410::ID_ED_25519 => Ok(SignatureAlgorithm::Ed25519),
            other => Err(PkiError::UnsupportedKeyType(format!(
                "signature algorithm {other}"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha256WithRsa => "SHA256-RSA",
            SignatureAlgorithm::EcdsaWithSha256 => "ECDSA-SHA256",
            SignatureAlgorithm::Ed25519 => "Ed25519",
        }
    }

    /// Display name for any algorithm identifier; algorithms this crate
    /// cannot sign with are named by OID.
    pub fn describe(algorithm: &AlgorithmIdentifierOwned) -> String {
        match Self::from_algorithm_identifier(algorithm) {
            Ok(known) => known.name().to_string(),
            Err(_) => describe_oid(algorithm.oid),
        }
    }
}

/// Decodes `extension` as `E`, tagging failures with the extension name.
pub fn decode_extension<E: ToAndFromX509Extension>(extension: &Extension) -> Result<E> {
    E::from_x509_extension_value(extension.extn_value.as_bytes()).map_err(|source| {
        PkiError::Decode {
            extension: E::NAME,
            source,
        }
    })
}

/// Represents a signed X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| PkiError::Encoding(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        Ok(pem_utils::der_to_pem(&self.to_der()?, CERTIFICATE_LABEL))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der).map_err(|e| PkiError::parse("certificate", e))?;
        Ok(Self { inner })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::from_der(&pem_utils::pem_to_der(pem, CERTIFICATE_LABEL)?)
    }

    /// X.509 version number as printed (1, 2 or 3).
    pub fn version(&self) -> u8 {
        self.inner.tbs_certificate.version as u8 + 1
    }

    pub fn serial_number(&self) -> &SerialNumber {
        &self.inner.tbs_certificate.serial_number
    }

    pub fn issuer(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    pub fn subject(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub fn not_before(&self) -> Result<OffsetDateTime> {
        from_x509_time(&self.inner.tbs_certificate.validity.not_before)
    }

    pub fn not_after(&self) -> Result<OffsetDateTime> {
        from_x509_time(&self.inner.tbs_certificate.validity.not_after)
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_algorithm_identifier(&self.inner.signature_algorithm)
    }

    /// Raw signature bytes.
    pub fn signature(&self) -> &[u8] {
        self.inner.signature.raw_bytes()
    }

    pub fn extensions(&self) -> &[Extension] {
        self.inner
            .tbs_certificate
            .extensions
            .as_deref()
            .unwrap_or_default()
    }

    /// Finds and decodes the extension of type `E`, if present.
    pub fn find_extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        self.extensions()
            .iter()
            .find(|ext| ext.extn_id == E::OID)
            .map(decode_extension::<E>)
            .transpose()
    }

    pub fn subject_key_identifier(&self) -> Result<Option<Vec<u8>>> {
        Ok(self
            .find_extension::<SubjectKeyIdentifier>()?
            .map(|ski| ski.0))
    }

    /// Checks the signature over the TBS portion with `issuer_key`.
    pub fn verify_signature(&self, issuer_key: &PublicKey) -> Result<()> {
        let tbs = self.inner.tbs_certificate.to_der()?;
        issuer_key.verify(&tbs, self.signature())
    }
}

/// Signs `template` for `subject_key`.
///
/// Without an issuer certificate the template signs itself, so the issuer
/// name equals the subject name.
pub fn generate_certificate(
    template: &CertificateTemplate,
    subject_key: &PublicKey,
    issuer_cert: Option<&Certificate>,
    issuer_key: &PrivateKey,
) -> Result<Certificate> {
    match issuer_cert {
        None => SelfIssuer {
            name: template.subject.clone(),
            key: issuer_key,
        }
        .issue(template, subject_key),
        Some(cert) => CertificateIssuer {
            cert,
            key: issuer_key,
        }
        .issue(template, subject_key),
    }
}

/// An authority certificate together with its private key.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: PrivateKey,
}

impl CertificateWithPrivateKey {
    pub fn as_issuer(&self) -> CertificateIssuer<'_> {
        CertificateIssuer {
            cert: &self.cert,
            key: &self.key,
        }
    }
}
