#![allow(dead_code)]

use pkitool::cert::params::{CertificateRequest, Subject};
use pkitool::cert::{CertificateWithPrivateKey, generate_certificate};
use pkitool::config::PkiConfig;
use pkitool::key::PrivateKey;
use pkitool::pki::Pki;
use pkitool::store::{DirectoryStore, MemoryStore};
use pkitool::tbs_certificate::CertificateTemplate;
use tempfile::TempDir;

pub const ROOT_PASSWORD: &str = "root-password";

pub fn root_request() -> CertificateRequest {
    CertificateRequest::builder()
        .validity(3650)
        .subject(
            Subject::builder()
                .common_name("myca.local")
                .organization("My CA")
                .build(),
        )
        .is_ca(true)
        .build()
}

pub fn leaf_request(common_name: &str) -> CertificateRequest {
    CertificateRequest::builder()
        .subject(Subject::builder().common_name(common_name).build())
        .build()
}

/// A root authority built without any store.
pub fn generate_ca_cert() -> CertificateWithPrivateKey {
    let key = PrivateKey::generate().unwrap();
    let template =
        CertificateTemplate::from_request(&root_request(), Default::default()).unwrap();
    let cert = generate_certificate(&template, &key.public_key(), None, &key).unwrap();
    CertificateWithPrivateKey { cert, key }
}

pub fn memory_pki() -> Pki<MemoryStore> {
    Pki::new(MemoryStore::new(), PkiConfig::default())
}

/// An initialized directory with an encrypted root. The directory is removed
/// when the returned guard drops.
pub fn directory_pki() -> (TempDir, Pki<DirectoryStore>) {
    let dir = TempDir::new().unwrap();
    let pki = Pki::initialize(dir.path().join("pki")).unwrap();
    pki.bootstrap_root(&root_request(), Some(ROOT_PASSWORD))
        .unwrap();
    (dir, pki)
}
