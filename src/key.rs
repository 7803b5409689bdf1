use std::fmt;

use const_oid::ObjectIdentifier;
use const_oid::db::{rfc5912, rfc8410};
use der::Encode;
use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use p256::NistP256;
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use pkcs8::der::zeroize::Zeroize;
use pkcs8::pkcs5::pbes2;
use pkcs8::spki::{DecodePublicKey, EncodePublicKey};
use pkcs8::{
    DecodePrivateKey, EncodePrivateKey, EncryptedPrivateKeyInfo, PrivateKeyInfo, SecretDocument,
};
use rand_core::RngCore;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::error::{PkiError, Result};
use crate::pem_utils::{self, ENCRYPTED_PRIVATE_KEY_LABEL, PRIVATE_KEY_LABEL};

type EcdsaDerSignature = ecdsa::der::Signature<NistP256>;

const PBKDF2_ITERATIONS: u32 = 100_000;

/// Private key material this system can sign with.
///
/// Only [`PrivateKey::EcdsaP256`] keys are ever generated here; the other two
/// variants exist so that keys created by other tools can be loaded.
#[derive(Clone)]
pub enum PrivateKey {
    EcdsaP256(P256SigningKey),
    Rsa(Box<RsaPrivateKey>),
    Ed25519(Ed25519SigningKey),
}

/// Public half of a [`PrivateKey`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    EcdsaP256(P256VerifyingKey),
    Rsa(RsaPublicKey),
    Ed25519(Ed25519VerifyingKey),
}

impl PrivateKey {
    /// Generate a fresh ECDSA P-256 key from the operating system's random source.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; 32];
        rand_core::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| PkiError::KeyGeneration(e.to_string()))?;
        let key = P256SigningKey::from_slice(&bytes);
        bytes.zeroize();
        let key = key.map_err(|e| PkiError::KeyGeneration(e.to_string()))?;
        Ok(PrivateKey::EcdsaP256(key))
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::EcdsaP256(signing_key) => PublicKey::EcdsaP256(*signing_key.verifying_key()),
            PrivateKey::Rsa(private) => PublicKey::Rsa(private.to_public_key()),
            PrivateKey::Ed25519(signing_key) => PublicKey::Ed25519(signing_key.verifying_key()),
        }
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            PrivateKey::EcdsaP256(_) => SignatureAlgorithm::EcdsaWithSha256,
            PrivateKey::Rsa(_) => SignatureAlgorithm::Sha256WithRsa,
            PrivateKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    pub fn is_ecdsa_p256(&self) -> bool {
        matches!(self, PrivateKey::EcdsaP256(_))
    }

    /// Signs `data`, returning the signature in the encoding X.509 expects for
    /// the key's algorithm (DER `Ecdsa-Sig-Value` for ECDSA, raw bytes otherwise).
    pub fn sign(&self, data: &[u8]) -> std::result::Result<Vec<u8>, rsa::signature::Error> {
        match self {
            PrivateKey::EcdsaP256(signing_key) => {
                let signature: EcdsaDerSignature = signing_key.try_sign(data)?;
                Ok(signature.to_vec())
            }
            PrivateKey::Rsa(private) => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new((**private).clone());
                Ok(signing_key.try_sign(data)?.to_vec())
            }
            PrivateKey::Ed25519(signing_key) => Ok(signing_key.try_sign(data)?.to_bytes().to_vec()),
        }
    }

    /// Encodes the key as an unencrypted PKCS#8 `PrivateKeyInfo`.
    pub fn to_pkcs8_der(&self) -> Result<SecretDocument> {
        let doc = match self {
            PrivateKey::EcdsaP256(signing_key) => signing_key.to_pkcs8_der(),
            PrivateKey::Rsa(private) => private.to_pkcs8_der(),
            PrivateKey::Ed25519(signing_key) => signing_key.to_pkcs8_der(),
        };
        doc.map_err(|e| PkiError::Encoding(e.to_string()))
    }

    /// Decodes a PKCS#8 `PrivateKeyInfo`, dispatching on its algorithm.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info =
            PrivateKeyInfo::try_from(der).map_err(|e| PkiError::parse("private key", e))?;
        match info.algorithm.oid {
            rfc5912::ID_EC_PUBLIC_KEY => {
                let curve = info
                    .algorithm
                    .parameters_oid()
                    .map_err(|e| PkiError::parse("private key", e))?;
                if curve != rfc5912::SECP_256_R_1 {
                    return Err(PkiError::UnsupportedKeyType(format!(
                        "elliptic curve {curve}"
                    )));
                }
                P256SigningKey::from_pkcs8_der(der)
                    .map(PrivateKey::EcdsaP256)
                    .map_err(|e| PkiError::parse("private key", e))
            }
            rfc5912::RSA_ENCRYPTION => RsaPrivateKey::from_pkcs8_der(der)
                .map(|key| PrivateKey::Rsa(Box::new(key)))
                .map_err(|e| PkiError::parse("private key", e)),
            rfc8410::ID_ED_25519 => Ed25519SigningKey::from_pkcs8_der(der)
                .map(PrivateKey::Ed25519)
                .map_err(|e| PkiError::parse("private key", e)),
            other => Err(PkiError::UnsupportedKeyType(describe_oid(other))),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public key", &self.public_key())
            .field("private key", &"omitted for security")
            .finish()
    }
}

impl PublicKey {
    /// Encodes the key as a `SubjectPublicKeyInfo`.
    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let der = match self {
            PublicKey::EcdsaP256(verifying_key) => verifying_key.to_public_key_der(),
            PublicKey::Rsa(public) => public.to_public_key_der(),
            PublicKey::Ed25519(verifying_key) => verifying_key.to_public_key_der(),
        }
        .map_err(|e| PkiError::Encoding(e.to_string()))?;
        Ok(der.decode_msg::<SubjectPublicKeyInfoOwned>()?)
    }

    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki.to_der()?;
        match spki.algorithm.oid {
            rfc5912::ID_EC_PUBLIC_KEY => P256VerifyingKey::from_public_key_der(&der)
                .map(PublicKey::EcdsaP256)
                .map_err(|e| PkiError::UnsupportedKeyType(format!("EC public key: {e}"))),
            rfc5912::RSA_ENCRYPTION => RsaPublicKey::from_public_key_der(&der)
                .map(PublicKey::Rsa)
                .map_err(|e| PkiError::parse("public key", e)),
            rfc8410::ID_ED_25519 => Ed25519VerifyingKey::from_public_key_der(&der)
                .map(PublicKey::Ed25519)
                .map_err(|e| PkiError::parse("public key", e)),
            other => Err(PkiError::UnsupportedKeyType(describe_oid(other))),
        }
    }

    /// SHA-1 over the subject public key bits (RFC 5280, 4.2.1.2, method 1).
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        let spki = self.to_spki()?;
        let digest = <Sha1 as sha1::Digest>::digest(spki.subject_public_key.raw_bytes());
        Ok(digest.to_vec())
    }

    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let verified = match self {
            PublicKey::EcdsaP256(verifying_key) => EcdsaDerSignature::from_bytes(signature)
                .and_then(|sig| verifying_key.verify(data, &sig)),
            PublicKey::Rsa(public) => {
                let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public.clone());
                rsa::pkcs1v15::Signature::try_from(signature)
                    .and_then(|sig| verifying_key.verify(data, &sig))
            }
            PublicKey::Ed25519(verifying_key) => ed25519_dalek::Signature::from_slice(signature)
                .and_then(|sig| verifying_key.verify(data, &sig)),
        };
        verified.map_err(|_| PkiError::SignatureVerification)
    }

    /// Human readable algorithm description.
    pub fn algorithm_name(&self) -> String {
        match self {
            PublicKey::EcdsaP256(_) => "ECDSA P-256".to_string(),
            PublicKey::Rsa(public) => format!("RSA {} bit", public.size() * 8),
            PublicKey::Ed25519(_) => "Ed25519".to_string(),
        }
    }
}

/// A private key as it sits at rest: a plain or password-encrypted PKCS#8 document.
pub enum KeyContainer {
    Plain(SecretDocument),
    Encrypted(SecretDocument),
}

impl KeyContainer {
    /// Serializes `key`, encrypting it with PBES2 (PBKDF2-SHA256, AES-256-CBC)
    /// when a password is given.
    pub fn seal(key: &PrivateKey, password: Option<&str>) -> Result<Self> {
        let plain = key.to_pkcs8_der()?;
        let Some(password) = password else {
            return Ok(KeyContainer::Plain(plain));
        };

        let info = PrivateKeyInfo::try_from(plain.as_bytes())
            .map_err(|e| PkiError::Encryption(e.to_string()))?;

        let mut salt = [0u8; 16];
        let mut iv = [0u8; 16];
        rand_core::OsRng
            .try_fill_bytes(&mut salt)
            .and_then(|_| rand_core::OsRng.try_fill_bytes(&mut iv))
            .map_err(|e| PkiError::Encryption(e.to_string()))?;

        let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(PBKDF2_ITERATIONS, &salt, &iv)
            .map_err(|e| PkiError::Encryption(e.to_string()))?;
        let encrypted = info
            .encrypt_with_params(params, password)
            .map_err(|e| PkiError::Encryption(e.to_string()))?;
        Ok(KeyContainer::Encrypted(encrypted))
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, KeyContainer::Encrypted(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            KeyContainer::Plain(doc) | KeyContainer::Encrypted(doc) => doc.as_bytes(),
        }
    }

    pub fn to_pem(&self) -> String {
        let label = match self {
            KeyContainer::Plain(_) => PRIVATE_KEY_LABEL,
            KeyContainer::Encrypted(_) => ENCRYPTED_PRIVATE_KEY_LABEL,
        };
        pem_utils::der_to_pem(self.as_bytes(), label)
    }

    /// Reads an armored container; the label decides whether it is encrypted.
    ///
    /// Blocks carrying the legacy OpenSSL `Proc-Type: 4,ENCRYPTED` header are
    /// rejected; they must be converted to encrypted PKCS#8 first.
    pub fn from_pem(pem: &str) -> Result<Self> {
        if pem_utils::has_legacy_encryption(pem)? {
            return Err(PkiError::parse(
                "private key",
                "legacy PEM encryption (Proc-Type/DEK-Info) is not supported, \
                 convert the key with `openssl pkcs8 -topk8`",
            ));
        }
        let (label, der) = pem_utils::parse_pem(pem)?;
        let doc = SecretDocument::try_from(der.as_slice())
            .map_err(|e| PkiError::parse("private key", e))?;
        match label.as_str() {
            PRIVATE_KEY_LABEL => Ok(KeyContainer::Plain(doc)),
            ENCRYPTED_PRIVATE_KEY_LABEL => Ok(KeyContainer::Encrypted(doc)),
            other => Err(PkiError::parse(
                "private key",
                format!("unexpected PEM label {other:?}"),
            )),
        }
    }

    /// Returns the plaintext PKCS#8 document, calling `passphrase` only when
    /// the container is encrypted.
    pub fn decrypt<F>(&self, passphrase: F) -> Result<SecretDocument>
    where
        F: FnOnce() -> Result<String>,
    {
        let encrypted = match self {
            KeyContainer::Plain(doc) => return Ok(doc.clone()),
            KeyContainer::Encrypted(doc) => doc,
        };
        let info = EncryptedPrivateKeyInfo::try_from(encrypted.as_bytes())
            .map_err(|e| PkiError::parse("encrypted private key", e))?;
        let mut password = passphrase()?;
        let plain = info.decrypt(&password);
        password.zeroize();
        let plain = plain.map_err(|_| PkiError::Decryption)?;
        // A wrong password can still yield valid padding; the result must be a PrivateKeyInfo.
        PrivateKeyInfo::try_from(plain.as_bytes()).map_err(|_| PkiError::Decryption)?;
        Ok(plain)
    }

    pub fn open<F>(&self, passphrase: F) -> Result<PrivateKey>
    where
        F: FnOnce() -> Result<String>,
    {
        let plain = self.decrypt(passphrase)?;
        PrivateKey::from_pkcs8_der(plain.as_bytes())
    }
}

/// The registered name of `oid` followed by its dotted form, when known.
pub(crate) fn describe_oid(oid: ObjectIdentifier) -> String {
    match const_oid::db::DB.by_oid(&oid) {
        Some(name) => format!("{name} ({oid})"),
        None => oid.to_string(),
    }
}
