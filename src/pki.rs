//! The certificate authority itself: ties keys, certificates and CRLs to a
//! store.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::cert::params::CertificateRequest;
use crate::cert::{Certificate, CertificateWithPrivateKey, generate_certificate};
use crate::config::PkiConfig;
use crate::crl::{Crl, CrlData, generate_crl};
use crate::error::{PkiError, Result};
use crate::issuer::Issuer;
use crate::key::{KeyContainer, PrivateKey};
use crate::passphrase::PassphraseReader;
use crate::store::{ArtifactKind, ArtifactStore, DirectoryStore};
use crate::tbs_certificate::{CertificateTemplate, now_utc};

/// Logical name of the root authority.
pub const ROOT_CA_NAME: &str = "root-ca";

/// An authority context: one store and the configuration that governs it.
///
/// Nothing is cached between calls; every operation loads what it needs.
pub struct Pki<S: ArtifactStore> {
    store: S,
    config: PkiConfig,
}

impl Pki<DirectoryStore> {
    /// Opens an initialized directory, reading its `cfg.json`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = DirectoryStore::new(path);
        let config = store.load_config()?;
        Ok(Self::new(store, config))
    }

    /// Creates the directory and its default configuration.
    pub fn initialize(path: impl Into<PathBuf>) -> Result<Self> {
        let store = DirectoryStore::new(path);
        let config = store.initialize()?;
        Ok(Self::new(store, config))
    }
}

impl<S: ArtifactStore> Pki<S> {
    pub fn new(store: S, config: PkiConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PkiConfig {
        &self.config
    }

    /// Creates the root authority: key, self-signed certificate and an empty
    /// CRL expiring with it.
    ///
    /// Everything is computed before the first write, so a signing failure
    /// leaves the store untouched.
    pub fn bootstrap_root(
        &self,
        request: &CertificateRequest,
        password: Option<&str>,
    ) -> Result<CertificateWithPrivateKey> {
        let mut request = request.clone();
        request.is_ca = true;

        let key = PrivateKey::generate()?;
        let template =
            CertificateTemplate::from_request(&request, self.config.extended_key_usage_policy)?;
        let cert = generate_certificate(&template, &key.public_key(), None, &key)?;
        let crl = generate_crl(&cert, &key, &CrlData::new_for_issuer(&cert)?)?;
        let container = KeyContainer::seal(&key, password)?;

        self.write_private_key(ROOT_CA_NAME, &container)?;
        self.write_certificate(ROOT_CA_NAME, &cert)?;
        self.write_crl(ROOT_CA_NAME, &crl, false)?;

        Ok(CertificateWithPrivateKey { cert, key })
    }

    /// Issues certificate `name` under `issuer_name`.
    ///
    /// `request` is completed from the configured defaults first. An
    /// authority certificate also gets an empty CRL so it can revoke later.
    pub fn issue(
        &self,
        name: &str,
        request: &CertificateRequest,
        issuer_name: &str,
        new_key_password: Option<&str>,
        passphrase: &dyn PassphraseReader,
    ) -> Result<Certificate> {
        let mut request = request.clone();
        request.update_from_defaults(&self.config.certificates);
        let template =
            CertificateTemplate::from_request(&request, self.config.extended_key_usage_policy)?;

        let issuer = self.load_authority(issuer_name, passphrase)?;

        let key = PrivateKey::generate()?;
        let cert = issuer.as_issuer().issue(&template, &key.public_key())?;
        let container = KeyContainer::seal(&key, new_key_password)?;

        self.write_private_key(name, &container)?;
        self.write_certificate(name, &cert)?;

        if request.is_ca {
            let crl = generate_crl(&cert, &key, &CrlData::new_for_issuer(&cert)?)?;
            self.write_crl(name, &crl, false)?;
        }

        Ok(cert)
    }

    /// Appends `cert_name` to the CRL of `issuer_name` and signs it again.
    pub fn revoke(
        &self,
        cert_name: &str,
        issuer_name: &str,
        passphrase: &dyn PassphraseReader,
    ) -> Result<CrlData> {
        let issuer = self.load_authority(issuer_name, passphrase)?;
        let cert = self.load_certificate(cert_name)?;
        let mut data = CrlData::from_crl(&self.load_crl(issuer_name)?)?;

        // The expiration stays pinned to the issuer certificate.
        data.add_revoked_certificate(cert.serial_number().clone(), now_utc()?);
        debug!(
            serial = %hex::encode(cert.serial_number().as_bytes()),
            issuer = issuer_name,
            "revoking certificate"
        );

        let crl = generate_crl(&issuer.cert, &issuer.key, &data)?;
        self.write_crl(issuer_name, &crl, true)?;
        Ok(data)
    }

    pub fn load_private_key(
        &self,
        name: &str,
        passphrase: &dyn PassphraseReader,
    ) -> Result<PrivateKey> {
        info!(artifact = name, "loading private key");
        let container = KeyContainer::from_pem(&self.store.read(ArtifactKind::PrivateKey, name)?)?;
        container.open(|| Ok(passphrase.read_passphrase(name)?))
    }

    pub fn load_certificate(&self, name: &str) -> Result<Certificate> {
        info!(artifact = name, "loading certificate");
        Certificate::from_pem(&self.store.read(ArtifactKind::Certificate, name)?)
    }

    pub fn load_crl(&self, name: &str) -> Result<Crl> {
        info!(artifact = name, "loading crl");
        Crl::from_pem(&self.store.read(ArtifactKind::Crl, name)?)
    }

    /// Loads an issuing authority. Authorities sign with P-256 keys only.
    pub fn load_authority(
        &self,
        name: &str,
        passphrase: &dyn PassphraseReader,
    ) -> Result<CertificateWithPrivateKey> {
        let cert = self.load_certificate(name)?;
        let key = self.load_private_key(name, passphrase)?;
        if !key.is_ecdsa_p256() {
            return Err(PkiError::UnsupportedKeyType(format!(
                "authority {name:?} must use an ECDSA P-256 key"
            )));
        }
        Ok(CertificateWithPrivateKey { cert, key })
    }

    fn write_private_key(&self, name: &str, container: &KeyContainer) -> Result<()> {
        info!(artifact = name, encrypted = container.is_encrypted(), "creating private key");
        self.store
            .write(ArtifactKind::PrivateKey, name, &container.to_pem())
    }

    fn write_certificate(&self, name: &str, cert: &Certificate) -> Result<()> {
        info!(
            artifact = name,
            serial = %hex::encode(cert.serial_number().as_bytes()),
            "creating certificate"
        );
        self.store
            .write(ArtifactKind::Certificate, name, &cert.to_pem()?)
    }

    fn write_crl(&self, name: &str, crl: &Crl, update: bool) -> Result<()> {
        if update {
            info!(artifact = name, "updating crl");
        } else {
            info!(artifact = name, "creating crl");
        }
        self.store.write(ArtifactKind::Crl, name, &crl.to_pem()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{BasicConstraints, ExtendedKeyUsage, KeyPurpose};
    use crate::cert::params::{ExtendedKeyUsagePolicy, Subject};
    use crate::passphrase::{MemoryPassphraseReader, NoPassphraseReader, PassphraseError};
    use crate::store::MemoryStore;

    fn pki() -> Pki<MemoryStore> {
        Pki::new(MemoryStore::new(), PkiConfig::default())
    }

    fn root_request() -> CertificateRequest {
        CertificateRequest::builder()
            .validity(3650)
            .subject(Subject::builder().common_name("Root").build())
            .build()
    }

    #[test]
    fn bootstrap_forces_ca_and_writes_all_artifacts() {
        let pki = pki();
        let root = pki.bootstrap_root(&root_request(), None).unwrap();

        let bc: BasicConstraints = root.cert.find_extension().unwrap().unwrap();
        assert!(bc.ca);
        for kind in [
            ArtifactKind::PrivateKey,
            ArtifactKind::Certificate,
            ArtifactKind::Crl,
        ] {
            assert!(pki.store().contains(kind, ROOT_CA_NAME));
        }

        let crl = CrlData::from_crl(&pki.load_crl(ROOT_CA_NAME).unwrap()).unwrap();
        assert!(crl.revoked_certificates.is_empty());
        assert_eq!(crl.expiration_date, root.cert.not_after().unwrap());
    }

    #[test]
    fn second_bootstrap_is_refused() {
        let pki = pki();
        pki.bootstrap_root(&root_request(), None).unwrap();
        assert!(matches!(
            pki.bootstrap_root(&root_request(), None),
            Err(PkiError::AlreadyExists(_))
        ));
    }

    #[test]
    fn password_is_only_read_for_encrypted_keys() {
        let pki = pki();
        pki.bootstrap_root(&root_request(), None).unwrap();
        pki.load_private_key(ROOT_CA_NAME, &NoPassphraseReader)
            .unwrap();

        let pki = self::pki();
        pki.bootstrap_root(&root_request(), Some("root-password"))
            .unwrap();
        assert!(matches!(
            pki.load_private_key(ROOT_CA_NAME, &NoPassphraseReader),
            Err(PkiError::Passphrase(PassphraseError::Unavailable(_)))
        ));
        assert!(matches!(
            pki.load_private_key(ROOT_CA_NAME, &MemoryPassphraseReader::new("wrong-password")),
            Err(PkiError::Decryption)
        ));
        pki.load_private_key(ROOT_CA_NAME, &MemoryPassphraseReader::new("root-password"))
            .unwrap();
    }

    #[test]
    fn issue_merges_defaults_and_applies_policy() {
        let mut config = PkiConfig::default();
        config.extended_key_usage_policy = ExtendedKeyUsagePolicy::AlwaysServerAuth;
        let pki = Pki::new(MemoryStore::new(), config);
        let root = pki.bootstrap_root(&root_request(), None).unwrap();

        let request = CertificateRequest::builder()
            .subject(Subject::builder().common_name("client").build())
            .is_client_certificate(true)
            .build();
        let cert = pki
            .issue("client", &request, ROOT_CA_NAME, None, &NoPassphraseReader)
            .unwrap();

        cert.verify_signature(&root.key.public_key()).unwrap();
        assert_eq!(
            cert.not_after().unwrap() - cert.not_before().unwrap(),
            time::Duration::days(365)
        );
        let eku: ExtendedKeyUsage = cert.find_extension().unwrap().unwrap();
        assert_eq!(eku.purposes, vec![KeyPurpose::ServerAuth]);
        assert!(!pki.store().contains(ArtifactKind::Crl, "client"));
        assert_eq!(pki.load_certificate("client").unwrap(), cert);
    }

    #[test]
    fn intermediate_authority_gets_its_own_crl() {
        let pki = pki();
        pki.bootstrap_root(&root_request(), None).unwrap();
        let request = CertificateRequest::builder()
            .subject(Subject::builder().common_name("Intermediate").build())
            .is_ca(true)
            .build();
        let intermediate = pki
            .issue("intermediate", &request, ROOT_CA_NAME, None, &NoPassphraseReader)
            .unwrap();

        let crl = pki.load_crl("intermediate").unwrap();
        crl.verify_signature(&intermediate.public_key().unwrap())
            .unwrap();

        let leaf = CertificateRequest::builder()
            .subject(Subject::builder().common_name("leaf").build())
            .build();
        pki.issue("leaf", &leaf, "intermediate", None, &NoPassphraseReader)
            .unwrap();
        let data = pki
            .revoke("leaf", "intermediate", &NoPassphraseReader)
            .unwrap();
        assert_eq!(data.revoked_certificates.len(), 1);
        assert!(
            CrlData::from_crl(&pki.load_crl(ROOT_CA_NAME).unwrap())
                .unwrap()
                .revoked_certificates
                .is_empty()
        );
    }

    #[test]
    fn revoke_appends_to_issuer_crl() {
        let pki = pki();
        let root = pki.bootstrap_root(&root_request(), None).unwrap();
        let expiration = root.cert.not_after().unwrap();
        let request = CertificateRequest::builder()
            .subject(Subject::builder().common_name("a").build())
            .build();
        let a = pki
            .issue("a", &request, ROOT_CA_NAME, None, &NoPassphraseReader)
            .unwrap();
        let b = pki
            .issue("b", &request, ROOT_CA_NAME, None, &NoPassphraseReader)
            .unwrap();

        pki.revoke("a", ROOT_CA_NAME, &NoPassphraseReader).unwrap();
        let data = pki.revoke("b", ROOT_CA_NAME, &NoPassphraseReader).unwrap();

        let stored = CrlData::from_crl(&pki.load_crl(ROOT_CA_NAME).unwrap()).unwrap();
        assert_eq!(stored, data);
        assert_eq!(stored.expiration_date, expiration);
        let serials: Vec<_> = stored
            .revoked_certificates
            .iter()
            .map(|entry| entry.serial_number.clone())
            .collect();
        assert_eq!(
            serials,
            vec![a.serial_number().clone(), b.serial_number().clone()]
        );
    }

    #[test]
    fn missing_issuer_is_not_found() {
        let pki = pki();
        let request = CertificateRequest::builder()
            .subject(Subject::builder().common_name("orphan").build())
            .build();
        assert!(matches!(
            pki.issue("orphan", &request, ROOT_CA_NAME, None, &NoPassphraseReader),
            Err(PkiError::NotFound(_))
        ));
        assert!(!pki.store().contains(ArtifactKind::PrivateKey, "orphan"));
    }
}
