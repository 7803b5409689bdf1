use bon::Builder;
use const_oid::ObjectIdentifier;
use der::Tag;
use der::Tagged;
use der::asn1::{Any, Ia5StringRef, PrintableStringRef, SetOfVec, TeletexStringRef, Utf8StringRef};
use serde::{Deserialize, Serialize};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

pub use crate::cert::extensions::{KeyPurpose, SubjectAltName};
use crate::error::{PkiError, Result};

const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const PROVINCE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const STREET_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.9");
const POSTAL_CODE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.17");
const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Largest accepted validity, in days.
pub const MAX_VALIDITY_DAYS: u32 = i32::MAX as u32;

/// Distinguished name of a certificate subject.
///
/// Empty fields are absent: they are never emitted in the encoded name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[builder(on(String, into))]
pub struct Subject {
    #[builder(default)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[builder(default)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub organization: String,
    #[builder(default)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub organizational_unit: String,
    #[builder(default)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub locality: String,
    #[builder(default)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub province: String,
    #[builder(default)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub street_address: String,
    #[builder(default)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub postal_code: String,
    #[builder(default)]
    pub common_name: String,
}

impl Subject {
    fn attributes(&self) -> [(ObjectIdentifier, &str); 8] {
        [
            (COUNTRY, self.country.as_str()),
            (PROVINCE, self.province.as_str()),
            (LOCALITY, self.locality.as_str()),
            (STREET_ADDRESS, self.street_address.as_str()),
            (POSTAL_CODE, self.postal_code.as_str()),
            (ORGANIZATION, self.organization.as_str()),
            (ORGANIZATIONAL_UNIT, self.organizational_unit.as_str()),
            (COMMON_NAME, self.common_name.as_str()),
        ]
    }

    fn field_mut(&mut self, oid: ObjectIdentifier) -> Option<&mut String> {
        match oid {
            COUNTRY => Some(&mut self.country),
            PROVINCE => Some(&mut self.province),
            LOCALITY => Some(&mut self.locality),
            STREET_ADDRESS => Some(&mut self.street_address),
            POSTAL_CODE => Some(&mut self.postal_code),
            ORGANIZATION => Some(&mut self.organization),
            ORGANIZATIONAL_UNIT => Some(&mut self.organizational_unit),
            COMMON_NAME => Some(&mut self.common_name),
            _ => None,
        }
    }

    /// Converts the subject to an X.509 name, one attribute per RDN.
    pub fn to_name(&self) -> Result<Name> {
        if self.common_name.is_empty() {
            return Err(PkiError::InvalidInput("missing common name".to_string()));
        }

        let mut rdns = Vec::new();
        for (oid, value) in self.attributes() {
            if value.is_empty() {
                continue;
            }
            // PrintableString when the alphabet allows it, UTF8String otherwise.
            let value = match PrintableStringRef::new(value) {
                Ok(printable) => Any::encode_from(&printable)?,
                Err(_) => Any::encode_from(&Utf8StringRef::new(value)?)?,
            };
            let atv = AttributeTypeAndValue { oid, value };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Recovers the structured fields from an X.509 name.
    ///
    /// Attributes other than the eight known ones are ignored.
    pub fn from_name(name: &Name) -> Result<Self> {
        let mut subject = Subject::default();
        for atv in name.0.iter().flat_map(|rdn| rdn.0.iter()) {
            if let Some(field) = subject.field_mut(atv.oid) {
                *field = attribute_string(&atv.value)
                    .ok_or_else(|| PkiError::parse("name", format!("attribute {}", atv.oid)))?;
            }
        }
        Ok(subject)
    }
}

fn attribute_string(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::PrintableString => value
            .decode_as::<PrintableStringRef<'_>>()
            .ok()
            .map(|s| s.to_string()),
        Tag::Utf8String => value.decode_as::<String>().ok(),
        Tag::Ia5String => value
            .decode_as::<Ia5StringRef<'_>>()
            .ok()
            .map(|s| s.to_string()),
        Tag::TeletexString => value
            .decode_as::<TeletexStringRef<'_>>()
            .ok()
            .map(|s| s.to_string()),
        _ => None,
    }
}

/// Input for one certificate issuance.
///
/// A zero `validity` means "unset" and is filled from the configured defaults
/// by [`CertificateRequest::update_from_defaults`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertificateRequest {
    /// Validity in days.
    #[builder(default)]
    pub validity: u32,
    #[builder(default)]
    pub subject: Subject,
    #[builder(default)]
    pub san: SubjectAltName,
    #[builder(default)]
    #[serde(rename = "isCA", skip_serializing_if = "std::ops::Not::not")]
    pub is_ca: bool,
    #[builder(default)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_client_certificate: bool,
}

impl CertificateRequest {
    /// Fills every unset field from `defaults`; values already present win.
    pub fn update_from_defaults(&mut self, defaults: &CertificateRequest) {
        if self.validity == 0 {
            self.validity = defaults.validity;
        }

        let subject = &mut self.subject;
        let fallback = &defaults.subject;
        for (field, default) in [
            (&mut subject.country, &fallback.country),
            (&mut subject.organization, &fallback.organization),
            (&mut subject.organizational_unit, &fallback.organizational_unit),
            (&mut subject.locality, &fallback.locality),
            (&mut subject.province, &fallback.province),
            (&mut subject.street_address, &fallback.street_address),
            (&mut subject.postal_code, &fallback.postal_code),
            (&mut subject.common_name, &fallback.common_name),
        ] {
            if field.is_empty() {
                field.clone_from(default);
            }
        }

        let san = &mut self.san;
        if san.uris.is_empty() {
            san.uris.clone_from(&defaults.san.uris);
        }
        if san.dns_names.is_empty() {
            san.dns_names.clone_from(&defaults.san.dns_names);
        }
        if san.ip_addresses.is_empty() {
            san.ip_addresses.clone_from(&defaults.san.ip_addresses);
        }
        if san.email_addresses.is_empty() {
            san.email_addresses.clone_from(&defaults.san.email_addresses);
        }
    }

    /// Checks the invariants issuance relies on.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_VALIDITY_DAYS).contains(&self.validity) {
            return Err(PkiError::InvalidInput(format!(
                "validity must be between 1 and {MAX_VALIDITY_DAYS} days, got {}",
                self.validity
            )));
        }
        if self.subject.common_name.is_empty() {
            return Err(PkiError::InvalidInput("missing common name".to_string()));
        }
        Ok(())
    }
}

/// Which extended key usage leaf certificates receive.
///
/// Authority certificates never carry the extension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtendedKeyUsagePolicy {
    /// `serverAuth` on every leaf, whatever the client flag says.
    AlwaysServerAuth,
    /// `serverAuth` on server leaves, no extension on client leaves.
    ServerUnlessClient,
    /// `serverAuth` on server leaves, `clientAuth` on client leaves.
    #[default]
    ByClientFlag,
}

impl ExtendedKeyUsagePolicy {
    /// The purposes to list for `request`; empty means "omit the extension".
    pub fn purposes(&self, request: &CertificateRequest) -> Vec<KeyPurpose> {
        if request.is_ca {
            return Vec::new();
        }
        match (self, request.is_client_certificate) {
            (ExtendedKeyUsagePolicy::AlwaysServerAuth, _) => vec![KeyPurpose::ServerAuth],
            (_, false) => vec![KeyPurpose::ServerAuth],
            (ExtendedKeyUsagePolicy::ServerUnlessClient, true) => Vec::new(),
            (ExtendedKeyUsagePolicy::ByClientFlag, true) => vec![KeyPurpose::ClientAuth],
        }
    }
}
