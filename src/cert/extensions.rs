use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use const_oid::AssociatedOid;
use der::{
    Encode,
    asn1::{Ia5String, OctetString},
    flagset::FlagSet,
    oid::ObjectIdentifier,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
use x509_cert::ext::pkix::KeyUsages;
use x509_cert::ext::pkix::name::GeneralName;

use super::der_reader::{Class, DerReader, TAG_OCTET_STRING};
use crate::error::PkiError;

/// Why an extension payload could not be decoded.
///
/// Decoding never produces a partial result: any of these aborts the whole
/// extension.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtensionDecodeError {
    #[error("truncated data")]
    Truncated,
    #[error("invalid length encoding")]
    InvalidLength,
    #[error("indefinite length encoding")]
    IndefiniteLength,
    #[error("non-minimal tag encoding")]
    NonMinimalTag,
    #[error("tag number too large")]
    TagTooLarge,
    #[error("unexpected tag {found}, expected {expected}")]
    UnexpectedTag { expected: u32, found: u32 },
    #[error("invalid trailing data")]
    TrailingData,
    #[error("invalid boolean")]
    InvalidBoolean,
    #[error("invalid integer encoding")]
    InvalidInteger,
    #[error("integer too large")]
    IntegerTooLarge,
    #[error("invalid bit string")]
    InvalidBitString,
    #[error("invalid object identifier")]
    InvalidObjectIdentifier,
    #[error("invalid string data")]
    InvalidString,
    #[error("invalid uri {0:?}")]
    InvalidUri(String),
    #[error("invalid ip address data: {0}")]
    InvalidIpAddress(String),
    #[error("unknown tag {0}")]
    UnknownTag(u32),
}

type DecodeResult<T> = std::result::Result<T, ExtensionDecodeError>;

/// Trait for converting to and from X.509 extensions.
///
/// Encoding goes through the `x509-cert` types; decoding is done by hand with
/// [`DerReader`] so that untrusted payloads are checked byte by byte.
///
/// # Example
/// ```
/// use pkitool::cert::extensions::{BasicConstraints, ToAndFromX509Extension};
/// let bc = BasicConstraints { ca: true, path_len_constraint: 0 };
/// let encoded = bc.to_x509_extension_value().unwrap();
/// let decoded = BasicConstraints::from_x509_extension_value(&encoded).unwrap();
/// assert_eq!(bc, decoded);
/// ```
pub trait ToAndFromX509Extension: Sized {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Name used in error messages and printed output.
    const NAME: &'static str;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> DecodeResult<Self>;
}

/// Represents the Key Usage extension (RFC 5280, 4.2.1.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsage {
    pub digital_signature: bool,
    pub non_repudiation: bool,
    pub key_encipherment: bool,
    pub data_encipherment: bool,
    pub key_agreement: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
    pub encipher_only: bool,
    pub decipher_only: bool,
}

impl KeyUsage {
    /// Key usage for issued certificates: key encipherment and digital
    /// signature, plus certificate and CRL signing for authorities.
    pub fn for_certificate(is_ca: bool) -> Self {
        Self {
            digital_signature: true,
            key_encipherment: true,
            key_cert_sign: is_ca,
            crl_sign: is_ca,
            ..Self::default()
        }
    }

    fn bits(&self) -> [(bool, &'static str, KeyUsages); 9] {
        [
            (self.digital_signature, "digitalSignature", KeyUsages::DigitalSignature),
            (self.non_repudiation, "nonRepudiation", KeyUsages::NonRepudiation),
            (self.key_encipherment, "keyEncipherment", KeyUsages::KeyEncipherment),
            (self.data_encipherment, "dataEncipherment", KeyUsages::DataEncipherment),
            (self.key_agreement, "keyAgreement", KeyUsages::KeyAgreement),
            (self.key_cert_sign, "keyCertSign", KeyUsages::KeyCertSign),
            (self.crl_sign, "cRLSign", KeyUsages::CRLSign),
            (self.encipher_only, "encipherOnly", KeyUsages::EncipherOnly),
            (self.decipher_only, "decipherOnly", KeyUsages::DecipherOnly),
        ]
    }

    /// Names of the usages that are set, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        self.bits()
            .into_iter()
            .filter(|(set, _, _)| *set)
            .map(|(_, name, _)| name)
            .collect()
    }
}

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;
    const NAME: &'static str = "key usage";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let flags = self
            .bits()
            .into_iter()
            .filter(|(set, _, _)| *set)
            .fold(FlagSet::<KeyUsages>::default(), |acc, (_, _, flag)| {
                acc | flag
            });
        Ok(X509KeyUsage(flags).to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> DecodeResult<Self> {
        let mut reader = DerReader::new(extension);
        let (_, bytes) = reader.read_bit_string()?;
        reader.finish()?;

        // Bit 0 is the most significant bit of the first byte.
        let bit = |n: usize| bytes.get(n / 8).is_some_and(|b| b & (0x80u8 >> (n % 8)) != 0);
        Ok(Self {
            digital_signature: bit(0),
            non_repudiation: bit(1),
            key_encipherment: bit(2),
            data_encipherment: bit(3),
            key_agreement: bit(4),
            key_cert_sign: bit(5),
            crl_sign: bit(6),
            encipher_only: bit(7),
            decipher_only: bit(8),
        })
    }
}

const ID_KP_IPSEC_END_SYSTEM: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.5");
const ID_KP_IPSEC_TUNNEL: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.6");
const ID_KP_IPSEC_USER: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.7");

/// A purpose listed in the Extended Key Usage extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    IpsecEndSystem,
    IpsecTunnel,
    IpsecUser,
    TimeStamping,
    OcspSigning,
    /// Any purpose outside the table above, kept as-is.
    Other(ObjectIdentifier),
}

impl KeyPurpose {
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            KeyPurpose::ServerAuth => const_oid::db::rfc5912::ID_KP_SERVER_AUTH,
            KeyPurpose::ClientAuth => const_oid::db::rfc5912::ID_KP_CLIENT_AUTH,
            KeyPurpose::CodeSigning => const_oid::db::rfc5912::ID_KP_CODE_SIGNING,
            KeyPurpose::EmailProtection => const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION,
            KeyPurpose::IpsecEndSystem => ID_KP_IPSEC_END_SYSTEM,
            KeyPurpose::IpsecTunnel => ID_KP_IPSEC_TUNNEL,
            KeyPurpose::IpsecUser => ID_KP_IPSEC_USER,
            KeyPurpose::TimeStamping => const_oid::db::rfc5912::ID_KP_TIME_STAMPING,
            KeyPurpose::OcspSigning => const_oid::db::rfc5912::ID_KP_OCSP_SIGNING,
            KeyPurpose::Other(oid) => *oid,
        }
    }

    pub fn from_oid(oid: ObjectIdentifier) -> Self {
        match oid {
            const_oid::db::rfc5912::ID_KP_SERVER_AUTH => KeyPurpose::ServerAuth,
            const_oid::db::rfc5912::ID_KP_CLIENT_AUTH => KeyPurpose::ClientAuth,
            const_oid::db::rfc5912::ID_KP_CODE_SIGNING => KeyPurpose::CodeSigning,
            const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION => KeyPurpose::EmailProtection,
            ID_KP_IPSEC_END_SYSTEM => KeyPurpose::IpsecEndSystem,
            ID_KP_IPSEC_TUNNEL => KeyPurpose::IpsecTunnel,
            ID_KP_IPSEC_USER => KeyPurpose::IpsecUser,
            const_oid::db::rfc5912::ID_KP_TIME_STAMPING => KeyPurpose::TimeStamping,
            const_oid::db::rfc5912::ID_KP_OCSP_SIGNING => KeyPurpose::OcspSigning,
            other => KeyPurpose::Other(other),
        }
    }
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyPurpose::ServerAuth => "serverAuth",
            KeyPurpose::ClientAuth => "clientAuth",
            KeyPurpose::CodeSigning => "codeSigning",
            KeyPurpose::EmailProtection => "emailProtection",
            KeyPurpose::IpsecEndSystem => "IPSECEndSystem",
            KeyPurpose::IpsecTunnel => "IPSECTunnel",
            KeyPurpose::IpsecUser => "IPSECUser",
            KeyPurpose::TimeStamping => "timeStamping",
            KeyPurpose::OcspSigning => "OCSPSigning",
            KeyPurpose::Other(oid) => return write!(f, "{oid}"),
        };
        f.write_str(name)
    }
}

/// Represents the Extended Key Usage extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedKeyUsage {
    pub purposes: Vec<KeyPurpose>,
}

impl ToAndFromX509Extension for ExtendedKeyUsage {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::ExtendedKeyUsage::OID;
    const NAME: &'static str = "extended key usage";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let oids: Vec<ObjectIdentifier> = self.purposes.iter().map(KeyPurpose::oid).collect();
        Ok(x509_cert::ext::pkix::ExtendedKeyUsage(oids).to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> DecodeResult<Self> {
        let mut outer = DerReader::new(extension);
        let mut seq = outer.read_sequence()?;
        outer.finish()?;

        let mut purposes = Vec::new();
        while !seq.is_empty() {
            purposes.push(KeyPurpose::from_oid(seq.read_oid()?));
        }
        Ok(Self { purposes })
    }
}

/// Represents the Basic Constraints extension.
///
/// `path_len_constraint` is [`BasicConstraints::UNCONSTRAINED_PATH_LEN`] when
/// the field is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraints {
    pub ca: bool,
    pub path_len_constraint: i64,
}

impl BasicConstraints {
    pub const UNCONSTRAINED_PATH_LEN: i64 = -1;

    pub fn new(ca: bool) -> Self {
        Self {
            ca,
            path_len_constraint: Self::UNCONSTRAINED_PATH_LEN,
        }
    }
}

impl Default for BasicConstraints {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ToAndFromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::BasicConstraints::OID;
    const NAME: &'static str = "basic constraints";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let path_len_constraint = match self.path_len_constraint {
            n if n < 0 => None,
            n => Some(u8::try_from(n).map_err(|_| {
                PkiError::InvalidInput(format!("path length constraint {n} is too large"))
            })?),
        };
        let bc = x509_cert::ext::pkix::BasicConstraints {
            ca: self.ca,
            path_len_constraint,
        };
        Ok(bc.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> DecodeResult<Self> {
        let mut outer = DerReader::new(extension);
        let mut seq = outer.read_sequence()?;
        outer.finish()?;

        let mut bc = Self::default();
        if seq.next_is(false, super::der_reader::TAG_BOOLEAN) {
            bc.ca = seq.read_boolean()?;
        }
        if seq.next_is(false, super::der_reader::TAG_INTEGER) {
            bc.path_len_constraint = seq.read_integer()?;
        }
        seq.finish()?;
        Ok(bc)
    }
}

/// Represents the Subject Alternative Name (SAN) extension.
///
/// The four lists keep their own order; no validation of DNS names or email
/// addresses is performed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubjectAltName {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<Url>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<IpAddr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub email_addresses: Vec<String>,
}

impl SubjectAltName {
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
            && self.dns_names.is_empty()
            && self.ip_addresses.is_empty()
            && self.email_addresses.is_empty()
    }

    fn general_names(&self) -> Result<Vec<GeneralName>, PkiError> {
        let ia5 = |value: &str| {
            Ia5String::new(value).map_err(|e| {
                PkiError::TemplateBuild(format!("invalid subject alternative name {value:?}: {e}"))
            })
        };

        let mut names = Vec::new();
        for name in &self.dns_names {
            names.push(GeneralName::DnsName(ia5(name)?));
        }
        for address in &self.email_addresses {
            names.push(GeneralName::Rfc822Name(ia5(address)?));
        }
        for address in &self.ip_addresses {
            let octets = match address {
                IpAddr::V4(v4) => v4.octets().to_vec(),
                IpAddr::V6(v6) => v6.octets().to_vec(),
            };
            names.push(GeneralName::IpAddress(OctetString::new(octets)?));
        }
        for uri in &self.uris {
            names.push(GeneralName::UniformResourceIdentifier(ia5(uri.as_str())?));
        }
        Ok(names)
    }
}

/// The `GeneralName` choices a SAN entry may use here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SanTag {
    Email,
    Dns,
    Uri,
    IpAddress,
}

impl TryFrom<u32> for SanTag {
    type Error = ExtensionDecodeError;

    fn try_from(tag: u32) -> DecodeResult<Self> {
        match tag {
            1 => Ok(SanTag::Email),
            2 => Ok(SanTag::Dns),
            6 => Ok(SanTag::Uri),
            7 => Ok(SanTag::IpAddress),
            other => Err(ExtensionDecodeError::UnknownTag(other)),
        }
    }
}

fn decode_ip_address(bytes: &[u8]) -> DecodeResult<IpAddr> {
    if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
        return Ok(IpAddr::V4(Ipv4Addr::from(v4)));
    }
    if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
        return Ok(IpAddr::V6(Ipv6Addr::from(v6)));
    }
    Err(ExtensionDecodeError::InvalidIpAddress(hex::encode(bytes)))
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;
    const NAME: &'static str = "subject alternative name";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let san = x509_cert::ext::pkix::SubjectAltName(self.general_names()?);
        Ok(san.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> DecodeResult<Self> {
        let mut outer = DerReader::new(extension);
        let mut seq = outer.read_sequence()?;
        outer.finish()?;

        let mut san = Self::default();
        while !seq.is_empty() {
            let entry = seq.read_tlv()?;
            if entry.class != Class::ContextSpecific {
                return Err(ExtensionDecodeError::UnknownTag(entry.number));
            }
            let tag = SanTag::try_from(entry.number)?;
            if entry.constructed {
                return Err(ExtensionDecodeError::InvalidString);
            }
            match tag {
                SanTag::Email => san.email_addresses.push(decode_string(entry.value)?),
                SanTag::Dns => san.dns_names.push(decode_string(entry.value)?),
                SanTag::Uri => {
                    let text = decode_string(entry.value)?;
                    let uri =
                        Url::parse(&text).map_err(|_| ExtensionDecodeError::InvalidUri(text))?;
                    san.uris.push(uri);
                }
                SanTag::IpAddress => san.ip_addresses.push(decode_ip_address(entry.value)?),
            }
        }
        Ok(san)
    }
}

fn decode_string(bytes: &[u8]) -> DecodeResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| ExtensionDecodeError::InvalidString)
}

/// Represents the Subject Key Identifier extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectKeyIdentifier(pub Vec<u8>);

impl ToAndFromX509Extension for SubjectKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectKeyIdentifier::OID;
    const NAME: &'static str = "subject key identifier";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier(OctetString::new(self.0.clone())?);
        Ok(ski.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> DecodeResult<Self> {
        let mut reader = DerReader::new(extension);
        let id = reader.read_universal(false, TAG_OCTET_STRING)?;
        reader.finish()?;
        Ok(Self(id.to_vec()))
    }
}

/// Represents the Authority Key Identifier extension.
///
/// Only the key identifier form is produced; the issuer name and serial
/// alternatives are accepted but not retained when decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityKeyIdentifier {
    pub key_identifier: Option<Vec<u8>>,
}

impl ToAndFromX509Extension for AuthorityKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::AuthorityKeyIdentifier::OID;
    const NAME: &'static str = "authority key identifier";

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let key_identifier = self
            .key_identifier
            .as_ref()
            .map(|id| OctetString::new(id.clone()))
            .transpose()?;
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier {
            key_identifier,
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };
        Ok(aki.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> DecodeResult<Self> {
        let mut outer = DerReader::new(extension);
        let mut seq = outer.read_sequence()?;
        outer.finish()?;

        let mut aki = Self::default();
        while !seq.is_empty() {
            let field = seq.read_tlv()?;
            match (field.class, field.constructed, field.number) {
                (Class::ContextSpecific, false, 0) => aki.key_identifier = Some(field.value.to_vec()),
                (Class::ContextSpecific, true, 1) | (Class::ContextSpecific, false, 2) => {}
                (_, _, found) => {
                    return Err(ExtensionDecodeError::UnexpectedTag { expected: 0, found });
                }
            }
        }
        Ok(aki)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn key_usage_bits_decode() {
        let decoded = KeyUsage::from_x509_extension_value(&[0x03, 0x02, 0x02, 0x84]).unwrap();
        assert_eq!(
            decoded,
            KeyUsage {
                digital_signature: true,
                key_cert_sign: true,
                ..KeyUsage::default()
            }
        );
        assert_eq!(decoded.names(), vec!["digitalSignature", "keyCertSign"]);
    }

    #[test]
    fn key_usage_encoding_decoding() {
        let original = KeyUsage {
            digital_signature: true,
            key_cert_sign: true,
            ..KeyUsage::default()
        };
        let encoded = original.to_x509_extension_value().unwrap();
        assert_eq!(KeyUsage::from_x509_extension_value(&encoded).unwrap(), original);

        let ca = KeyUsage::for_certificate(true);
        let encoded = ca.to_x509_extension_value().unwrap();
        assert_eq!(
            KeyUsage::from_x509_extension_value(&encoded).unwrap().names(),
            vec!["digitalSignature", "keyEncipherment", "keyCertSign", "cRLSign"]
        );
    }

    #[test]
    fn key_usage_decipher_only_spans_second_byte() {
        let decoded =
            KeyUsage::from_x509_extension_value(&[0x03, 0x03, 0x07, 0x80, 0x80]).unwrap();
        assert!(decoded.digital_signature);
        assert!(decoded.decipher_only);
        assert!(!decoded.encipher_only);
    }

    #[test]
    fn key_usage_rejects_trailing_data() {
        assert_eq!(
            KeyUsage::from_x509_extension_value(&[0x03, 0x02, 0x02, 0x84, 0x00]),
            Err(ExtensionDecodeError::TrailingData)
        );
    }

    #[test]
    fn extended_key_usage_names_and_unknown_oids() {
        let original = ExtendedKeyUsage {
            purposes: vec![
                KeyPurpose::ServerAuth,
                KeyPurpose::IpsecTunnel,
                KeyPurpose::OcspSigning,
                KeyPurpose::Other(ObjectIdentifier::new_unwrap("1.2.3.4.5")),
            ],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = ExtendedKeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(decoded, original);

        let names: Vec<String> = decoded.purposes.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["serverAuth", "IPSECTunnel", "OCSPSigning", "1.2.3.4.5"]);
    }

    #[test]
    fn extended_key_usage_rejects_non_oid_members() {
        assert_eq!(
            ExtendedKeyUsage::from_x509_extension_value(&[0x30, 0x03, 0x02, 0x01, 0x01]),
            Err(ExtensionDecodeError::UnexpectedTag {
                expected: 0x06,
                found: 0x02
            })
        );
    }

    #[test]
    fn basic_constraints_path_len_default() {
        // SEQUENCE { BOOLEAN TRUE }
        let absent = BasicConstraints::from_x509_extension_value(&[0x30, 0x03, 0x01, 0x01, 0xff])
            .unwrap();
        assert_eq!(absent.path_len_constraint, BasicConstraints::UNCONSTRAINED_PATH_LEN);
        assert!(absent.ca);

        // SEQUENCE { BOOLEAN TRUE, INTEGER 0 }
        let zero = BasicConstraints::from_x509_extension_value(&[
            0x30, 0x06, 0x01, 0x01, 0xff, 0x02, 0x01, 0x00,
        ])
        .unwrap();
        assert_eq!(zero.path_len_constraint, 0);

        let empty = BasicConstraints::from_x509_extension_value(&[0x30, 0x00]).unwrap();
        assert_eq!(empty, BasicConstraints::default());
    }

    #[test]
    fn basic_constraints_encoding_decoding() {
        for original in [
            BasicConstraints::new(true),
            BasicConstraints::new(false),
            BasicConstraints {
                ca: true,
                path_len_constraint: 3,
            },
        ] {
            let encoded = original.to_x509_extension_value().unwrap();
            assert_eq!(
                BasicConstraints::from_x509_extension_value(&encoded).unwrap(),
                original
            );
        }
    }

    #[test]
    fn basic_constraints_rejects_out_of_order_fields() {
        // SEQUENCE { INTEGER 0, BOOLEAN TRUE }
        assert_eq!(
            BasicConstraints::from_x509_extension_value(&[
                0x30, 0x06, 0x02, 0x01, 0x00, 0x01, 0x01, 0xff
            ]),
            Err(ExtensionDecodeError::TrailingData)
        );
    }

    #[test]
    fn subject_alt_name_round_trip_keeps_order() {
        let original = SubjectAltName {
            dns_names: vec!["a.test".to_string()],
            ip_addresses: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            ..SubjectAltName::default()
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(decoded.dns_names, vec!["a.test"]);
        assert_eq!(decoded.ip_addresses, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        assert!(decoded.uris.is_empty());
        assert!(decoded.email_addresses.is_empty());
    }

    #[test]
    fn subject_alt_name_all_kinds() {
        let original = SubjectAltName {
            uris: vec![Url::parse("https://example.com/ca").unwrap()],
            dns_names: vec!["b.test".to_string(), "a.test".to_string(), "b.test".to_string()],
            ip_addresses: vec![IpAddr::V6(Ipv6Addr::LOCALHOST), IpAddr::V4(Ipv4Addr::LOCALHOST)],
            email_addresses: vec!["ops@example.com".to_string()],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        assert_eq!(SubjectAltName::from_x509_extension_value(&encoded).unwrap(), original);
    }

    #[test]
    fn subject_alt_name_unknown_tag() {
        assert_eq!(
            SubjectAltName::from_x509_extension_value(&[0x30, 0x03, 0x9f, 0x63, 0x00]),
            Err(ExtensionDecodeError::UnknownTag(99))
        );
        // otherName is not one of the supported choices either
        assert_eq!(
            SubjectAltName::from_x509_extension_value(&[0x30, 0x02, 0xa0, 0x00]),
            Err(ExtensionDecodeError::UnknownTag(0))
        );
    }

    #[test]
    fn subject_alt_name_bad_ip_and_uri() {
        assert_eq!(
            SubjectAltName::from_x509_extension_value(&[0x30, 0x05, 0x87, 0x03, 1, 2, 3]),
            Err(ExtensionDecodeError::InvalidIpAddress("010203".to_string()))
        );
        let mut bad_uri = vec![0x30, 0x0c, 0x86, 0x0a];
        bad_uri.extend_from_slice(b"not a uri!");
        assert!(matches!(
            SubjectAltName::from_x509_extension_value(&bad_uri),
            Err(ExtensionDecodeError::InvalidUri(_))
        ));
    }

    #[test]
    fn subject_alt_name_rejects_trailing_data() {
        assert_eq!(
            SubjectAltName::from_x509_extension_value(&[0x30, 0x00, 0x00]),
            Err(ExtensionDecodeError::TrailingData)
        );
    }

    #[test]
    fn subject_alt_name_rejects_non_ascii_at_encode_time() {
        let san = SubjectAltName {
            dns_names: vec!["bücher.test".to_string()],
            ..SubjectAltName::default()
        };
        assert!(matches!(
            san.to_x509_extension_value(),
            Err(PkiError::TemplateBuild(_))
        ));
    }

    #[test]
    fn key_identifiers_round_trip() {
        let ski = SubjectKeyIdentifier(vec![1, 2, 3, 4]);
        let encoded = ski.to_x509_extension_value().unwrap();
        assert_eq!(SubjectKeyIdentifier::from_x509_extension_value(&encoded).unwrap(), ski);

        let aki = AuthorityKeyIdentifier {
            key_identifier: Some(vec![5, 6, 7]),
        };
        let encoded = aki.to_x509_extension_value().unwrap();
        assert_eq!(AuthorityKeyIdentifier::from_x509_extension_value(&encoded).unwrap(), aki);
    }

    #[test]
    fn garbage_never_panics() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..5000 {
            let len = rng.random_range(0..48);
            let mut data = vec![0u8; len];
            rng.fill(&mut data[..]);
            if rng.random_bool(0.5) && !data.is_empty() {
                data[0] = 0x30;
            }
            let _ = KeyUsage::from_x509_extension_value(&data);
            let _ = ExtendedKeyUsage::from_x509_extension_value(&data);
            let _ = BasicConstraints::from_x509_extension_value(&data);
            let _ = SubjectAltName::from_x509_extension_value(&data);
            let _ = SubjectKeyIdentifier::from_x509_extension_value(&data);
            let _ = AuthorityKeyIdentifier::from_x509_extension_value(&data);
        }
    }

    #[test]
    fn every_truncation_is_an_error() {
        let san = SubjectAltName {
            uris: vec![Url::parse("spiffe://cluster/ns/default").unwrap()],
            dns_names: vec!["a.test".to_string()],
            ip_addresses: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))],
            email_addresses: vec!["a@b.test".to_string()],
        };
        let encoded = san.to_x509_extension_value().unwrap();
        for cut in 0..encoded.len() {
            assert!(SubjectAltName::from_x509_extension_value(&encoded[..cut]).is_err());
        }
    }
}
