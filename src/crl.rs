//! Certificate revocation lists.
//!
//! A CRL is never edited on disk: the orchestrator loads it into a
//! [`CrlData`], appends an entry and signs the whole list again with
//! [`generate_crl`].

use der::asn1::BitString;
use der::{Decode, Encode};
use time::OffsetDateTime;
use tracing::debug;
use x509_cert::Version;
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::serial_number::SerialNumber;

use crate::cert::extensions::AuthorityKeyIdentifier;
use crate::cert::{Certificate, SignatureAlgorithm};
use crate::error::{PkiError, Result};
use crate::key::{PrivateKey, PublicKey};
use crate::pem_utils::{self, CRL_LABEL};
use crate::tbs_certificate::{from_x509_time, now_utc, to_extension, to_x509_time};

/// One entry of a revocation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedCertificate {
    pub serial_number: SerialNumber,
    pub revocation_date: OffsetDateTime,
}

/// The unsigned content of a CRL.
///
/// `expiration_date` is pinned to the issuing certificate's own `notAfter`
/// and is never moved by [`CrlData::add_revoked_certificate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlData {
    pub revoked_certificates: Vec<RevokedCertificate>,
    pub creation_date: OffsetDateTime,
    pub expiration_date: OffsetDateTime,
}

impl CrlData {
    /// An empty list created now that expires with `issuer`.
    pub fn new_for_issuer(issuer: &Certificate) -> Result<Self> {
        Ok(Self {
            revoked_certificates: Vec::new(),
            creation_date: now_utc()?,
            expiration_date: issuer.not_after()?,
        })
    }

    /// Appends an entry revoked at `revocation_date` and refreshes the
    /// creation date. Duplicate serials are kept.
    pub fn add_revoked_certificate(
        &mut self,
        serial_number: SerialNumber,
        revocation_date: OffsetDateTime,
    ) {
        self.revoked_certificates.push(RevokedCertificate {
            serial_number,
            revocation_date,
        });
        self.creation_date = revocation_date;
    }

    pub fn from_crl(crl: &Crl) -> Result<Self> {
        let tbs = &crl.inner.tbs_cert_list;
        let next_update = tbs
            .next_update
            .as_ref()
            .ok_or_else(|| PkiError::parse("crl", "missing nextUpdate"))?;

        let revoked_certificates = tbs
            .revoked_certificates
            .iter()
            .flatten()
            .map(|entry| {
                Ok(RevokedCertificate {
                    serial_number: entry.serial_number.clone(),
                    revocation_date: from_x509_time(&entry.revocation_date)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            revoked_certificates,
            creation_date: from_x509_time(&tbs.this_update)?,
            expiration_date: from_x509_time(next_update)?,
        })
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        Self::from_crl(&Crl::from_der(der)?)
    }
}

/// A signed X.509 v2 CRL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crl {
    pub inner: CertificateList,
}

impl Crl {
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_der()?)
    }

    pub fn to_pem(&self) -> Result<String> {
        Ok(pem_utils::der_to_pem(&self.to_der()?, CRL_LABEL))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateList::from_der(der).map_err(|e| PkiError::parse("crl", e))?;
        Ok(Self { inner })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::from_der(&pem_utils::pem_to_der(pem, CRL_LABEL)?)
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_algorithm_identifier(&self.inner.signature_algorithm)
    }

    pub fn signature(&self) -> &[u8] {
        self.inner.signature.raw_bytes()
    }

    pub fn verify_signature(&self, issuer_key: &PublicKey) -> Result<()> {
        let tbs = self.inner.tbs_cert_list.to_der()?;
        issuer_key.verify(&tbs, self.signature())
    }
}

/// Signs `data` as the CRL of `issuer_cert`.
pub fn generate_crl(
    issuer_cert: &Certificate,
    issuer_key: &PrivateKey,
    data: &CrlData,
) -> Result<Crl> {
    let signature_algorithm = issuer_key.signature_algorithm().to_algorithm_identifier();

    let revoked = data
        .revoked_certificates
        .iter()
        .map(|entry| {
            Ok(RevokedCert {
                serial_number: entry.serial_number.clone(),
                revocation_date: to_x509_time(entry.revocation_date)?,
                crl_entry_extensions: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let crl_extensions = match issuer_cert.subject_key_identifier()? {
        Some(key_identifier) => {
            let aki = AuthorityKeyIdentifier {
                key_identifier: Some(key_identifier),
            };
            Some(vec![to_extension(&aki, false)?])
        }
        None => None,
    };

    let tbs_cert_list = TbsCertList {
        version: Version::V2,
        signature: signature_algorithm.clone(),
        issuer: issuer_cert.subject().clone(),
        this_update: to_x509_time(data.creation_date)?,
        next_update: Some(to_x509_time(data.expiration_date)?),
        revoked_certificates: (!revoked.is_empty()).then_some(revoked),
        crl_extensions,
    };

    let signature = issuer_key
        .sign(&tbs_cert_list.to_der()?)
        .map_err(|e| PkiError::CrlSigning(e.to_string()))?;

    debug!(entries = data.revoked_certificates.len(), "signed crl");

    Ok(Crl {
        inner: CertificateList {
            tbs_cert_list,
            signature_algorithm,
            signature: BitString::from_bytes(&signature)?,
        },
    })
}
