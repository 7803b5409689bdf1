//! # pkitool - A Small File-Backed Certificate Authority
//!
//! pkitool manages a private public key infrastructure stored in a plain
//! directory. It is built entirely with rustcrypto libraries: keys, X.509
//! certificates and CRLs are produced without OpenSSL or ring.
//!
//! ## Features
//!
//! - **Root bootstrap**: a self-signed ECDSA P-256 authority and its empty CRL
//! - **Issuance**: server, client and intermediate authority certificates
//! - **Revocation**: append-only CRLs that are signed again on every change
//! - **Encrypted keys**: PKCS#8 with PBES2 when a password is given; legacy
//!   `Proc-Type: 4,ENCRYPTED` PEM keys are refused with a conversion hint
//! - **Inspection**: human-readable dumps of certificates and CRLs
//!
//! ## Directory Layout
//!
//! ```text
//! cfg.json                    defaults merged into every request
//! private-keys/<name>.key     PKCS#8, encrypted or not
//! certificates/<name>.cert    X.509 certificate
//! certificates/<issuer>.crl   CRL of an issuing authority
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pkitool::cert::params::{CertificateRequest, Subject};
//! use pkitool::passphrase::NoPassphraseReader;
//! use pkitool::pki::{Pki, ROOT_CA_NAME};
//!
//! # fn main() -> Result<(), pkitool::error::PkiError> {
//! let pki = Pki::initialize("/tmp/pki")?;
//!
//! let root = CertificateRequest::builder()
//!     .validity(3650)
//!     .subject(Subject::builder().common_name("Example Root").build())
//!     .build();
//! pki.bootstrap_root(&root, None)?;
//!
//! // Subject, SAN and validity fall back to cfg.json.
//! let server = CertificateRequest::builder()
//!     .subject(Subject::builder().common_name("www.example.com").build())
//!     .build();
//! pki.issue("www", &server, ROOT_CA_NAME, None, &NoPassphraseReader)?;
//!
//! pki.revoke("www", ROOT_CA_NAME, &NoPassphraseReader)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`pki`]: The authority operations over a store
//! - [`key`]: Key generation and the PKCS#8 key container
//! - [`cert`]: Certificate encoding, extensions and request parameters
//! - [`crl`]: Revocation lists
//! - [`issuer`]: Signing of certificate templates
//! - [`store`]: Persistence of artifacts by name
//! - [`config`]: The `cfg.json` document
//! - [`passphrase`]: Reading private key passwords
//! - [`printer`]: Text rendering of certificates and CRLs
//! - [`error`]: Error types

pub mod cert;
pub mod config;
pub mod crl;
pub mod error;
pub mod issuer;
pub mod key;
pub mod passphrase;
pub mod pem_utils;
pub mod pki;
pub mod printer;
pub mod store;
pub mod tbs_certificate;
