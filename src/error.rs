use std::path::PathBuf;

use thiserror::Error;

use crate::cert::extensions::ExtensionDecodeError;
use crate::passphrase::PassphraseError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PkiError>;

/// Represents errors that can occur while operating the certificate authority.
///
/// Every failure is fatal to the operation that produced it; nothing in this
/// crate retries.
#[derive(Debug, Error)]
pub enum PkiError {
    /// The random source failed while generating a private key.
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// The random source failed while generating a serial number.
    #[error("Serial number generation error: {0}")]
    SerialGeneration(String),

    /// The key material is of a type this system cannot operate on.
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// A stored artifact could not be parsed.
    #[error("Failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    /// Wrong password or corrupted encrypted container.
    #[error("Cannot decrypt private key")]
    Decryption,

    /// A private key could not be encrypted.
    #[error("Cannot encrypt private key: {0}")]
    Encryption(String),

    /// The certificate template could not be assembled.
    #[error("Cannot build certificate template: {0}")]
    TemplateBuild(String),

    /// The signature over a certificate could not be produced.
    #[error("Cannot sign certificate: {0}")]
    Signing(String),

    /// The signature over a revocation list could not be produced.
    #[error("Cannot sign crl: {0}")]
    CrlSigning(String),

    /// A signature did not verify against the supplied public key.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// A certificate extension payload is malformed.
    #[error("Cannot decode {extension} extension: {source}")]
    Decode {
        extension: &'static str,
        #[source]
        source: ExtensionDecodeError,
    },

    /// Refused to overwrite an existing artifact.
    #[error("{0:?} already exists")]
    AlreadyExists(PathBuf),

    /// A required artifact does not exist.
    #[error("{0:?} does not exist")]
    NotFound(PathBuf),

    /// Underlying I/O failure.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rendering to the output stream failed.
    #[error("Cannot write output: {0}")]
    Output(#[source] std::io::Error),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    Encoding(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The configuration file is missing fields or malformed.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A password could not be obtained.
    #[error(transparent)]
    Passphrase(#[from] PassphraseError),
}

impl PkiError {
    pub(crate) fn parse(what: &'static str, reason: impl ToString) -> Self {
        PkiError::Parse {
            what,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PkiError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<der::Error> for PkiError {
    /// Converts a `der::Error` into a `PkiError`.
    fn from(err: der::Error) -> Self {
        PkiError::Encoding(err.to_string())
    }
}

impl From<pem::PemError> for PkiError {
    fn from(err: pem::PemError) -> Self {
        PkiError::parse("pem block", err)
    }
}

impl From<pkcs8::Error> for PkiError {
    fn from(err: pkcs8::Error) -> Self {
        PkiError::parse("private key", err)
    }
}
