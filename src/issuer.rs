use der::Encode;
use der::asn1::BitString;
use tracing::debug;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::error::{PkiError, Result};
use crate::key::{PrivateKey, PublicKey};
use crate::tbs_certificate::CertificateTemplate;

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and issue certificates.
pub trait Issuer {
    /// Returns the distinguished name placed in the issuer field.
    fn issuer_name(&self) -> Name;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &PrivateKey;

    /// Returns the key identifier to reference in issued certificates, if any.
    fn authority_key_identifier(&self) -> Result<Option<Vec<u8>>>;

    /// Signs `template` for `subject_public_key`.
    ///
    /// The signing key is not compared with the issuer certificate's public
    /// key; callers pass matching pairs.
    fn issue(
        &self,
        template: &CertificateTemplate,
        subject_public_key: &PublicKey,
    ) -> Result<Certificate> {
        let key = self.signing_key();
        let signature_algorithm = key.signature_algorithm().to_algorithm_identifier();

        let tbs_certificate = template.to_tbs_certificate_inner(
            self.issuer_name(),
            signature_algorithm.clone(),
            subject_public_key,
            self.authority_key_identifier()?,
        )?;

        let signature = key
            .sign(&tbs_certificate.to_der()?)
            .map_err(|e| PkiError::Signing(e.to_string()))?;

        let inner = CertificateInner {
            tbs_certificate,
            signature_algorithm,
            signature: BitString::from_bytes(&signature)?,
        };
        debug!(
            serial = %hex::encode(template.serial_number.as_bytes()),
            subject = %template.subject,
            "signed certificate"
        );
        Ok(Certificate { inner })
    }
}

/// Issuer for a root: the certificate names itself as issuer.
pub struct SelfIssuer<'a> {
    pub name: Name,
    pub key: &'a PrivateKey,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Name {
        self.name.clone()
    }

    fn signing_key(&self) -> &PrivateKey {
        self.key
    }

    fn authority_key_identifier(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Issuer backed by an existing authority certificate and its key.
pub struct CertificateIssuer<'a> {
    pub cert: &'a Certificate,
    pub key: &'a PrivateKey,
}

impl Issuer for CertificateIssuer<'_> {
    fn issuer_name(&self) -> Name {
        // The name of the issuer is the subject of its certificate
        self.cert.subject().clone()
    }

    fn signing_key(&self) -> &PrivateKey {
        self.key
    }

    fn authority_key_identifier(&self) -> Result<Option<Vec<u8>>> {
        self.cert.subject_key_identifier()
    }
}
