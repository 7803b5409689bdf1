use std::time::Duration as StdDuration;

use der::asn1::{GeneralizedTime, OctetString, UtcTime};
use rand::TryRngCore;
use time::{Duration, OffsetDateTime};
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::{Time, Validity};

use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName,
    SubjectKeyIdentifier, ToAndFromX509Extension,
};
use crate::cert::params::{CertificateRequest, ExtendedKeyUsagePolicy};
use crate::error::{PkiError, Result};
use crate::key::PublicKey;

/// Length of generated serial numbers, in bytes (128 bits).
pub const SERIAL_NUMBER_LEN: usize = 16;

/// Represents the "To Be Signed" (TBS) portion of a certificate before an
/// issuer is chosen.
///
/// # Fields
/// * `serial_number` - Random, non-zero, 128-bit serial.
/// * `subject` - The subject distinguished name.
/// * `not_before` - Start of validity, whole seconds, UTC.
/// * `not_after` - `not_before` plus the requested number of days.
/// * `key_usage`, `extended_key_usage`, `basic_constraints`, `san` - the
///   extensions the certificate will carry.
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    pub serial_number: SerialNumber,
    pub subject: Name,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub key_usage: KeyUsage,
    pub extended_key_usage: ExtendedKeyUsage,
    pub basic_constraints: BasicConstraints,
    pub san: SubjectAltName,
}

impl CertificateTemplate {
    /// Builds a template valid from now for `request.validity` days.
    pub fn from_request(
        request: &CertificateRequest,
        policy: ExtendedKeyUsagePolicy,
    ) -> Result<Self> {
        request.validate()?;

        let serial_number = generate_serial_number()?;
        let not_before = now_utc()?;
        let not_after = not_before
            .checked_add(Duration::days(i64::from(request.validity)))
            .ok_or_else(|| {
                PkiError::TemplateBuild(format!(
                    "a validity of {} days is out of range",
                    request.validity
                ))
            })?;

        Ok(Self {
            serial_number,
            subject: request.subject.to_name()?,
            not_before,
            not_after,
            key_usage: KeyUsage::for_certificate(request.is_ca),
            extended_key_usage: ExtendedKeyUsage {
                purposes: policy.purposes(request),
            },
            basic_constraints: BasicConstraints::new(request.is_ca),
            san: request.san.clone(),
        })
    }

    fn extensions(
        &self,
        subject_public_key: &PublicKey,
        authority_key_id: Option<Vec<u8>>,
    ) -> Result<Vec<Extension>> {
        let mut extensions = vec![
            to_extension(&self.basic_constraints, true)?,
            to_extension(&self.key_usage, true)?,
        ];
        if !self.extended_key_usage.purposes.is_empty() {
            extensions.push(to_extension(&self.extended_key_usage, false)?);
        }
        if !self.san.is_empty() {
            extensions.push(to_extension(&self.san, false)?);
        }
        if self.basic_constraints.ca {
            let ski = SubjectKeyIdentifier(subject_public_key.key_identifier()?);
            extensions.push(to_extension(&ski, false)?);
        }
        if let Some(key_identifier) = authority_key_id {
            let aki = AuthorityKeyIdentifier {
                key_identifier: Some(key_identifier),
            };
            extensions.push(to_extension(&aki, false)?);
        }
        Ok(extensions)
    }

    /// Converts the template into a `TbsCertificateInner` for DER encoding.
    pub fn to_tbs_certificate_inner(
        &self,
        issuer: Name,
        signature: AlgorithmIdentifierOwned,
        subject_public_key: &PublicKey,
        authority_key_id: Option<Vec<u8>>,
    ) -> Result<TbsCertificateInner> {
        let validity = Validity {
            not_before: to_x509_time(self.not_before)?,
            not_after: to_x509_time(self.not_after)?,
        };

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number: self.serial_number.clone(),
            signature,
            issuer,
            validity,
            subject: self.subject.clone(),
            subject_public_key_info: subject_public_key.to_spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(self.extensions(subject_public_key, authority_key_id)?),
        })
    }
}

pub(crate) fn to_extension<E: ToAndFromX509Extension>(
    value: &E,
    critical: bool,
) -> Result<Extension> {
    Ok(Extension {
        extn_id: E::OID,
        critical,
        extn_value: OctetString::new(value.to_x509_extension_value()?)?,
    })
}

/// Draws a random, positive, non-zero 128-bit serial number from the OS.
pub fn generate_serial_number() -> Result<SerialNumber> {
    let mut bytes = [0u8; SERIAL_NUMBER_LEN];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| PkiError::SerialGeneration(e.to_string()))?;
    if bytes.iter().all(|b| *b == 0) {
        return Err(PkiError::SerialGeneration(
            "random source returned zero".to_string(),
        ));
    }
    SerialNumber::new(&bytes).map_err(|e| PkiError::SerialGeneration(e.to_string()))
}

/// Current UTC time truncated to whole seconds, the precision X.509 keeps.
pub(crate) fn now_utc() -> Result<OffsetDateTime> {
    let now = OffsetDateTime::now_utc();
    OffsetDateTime::from_unix_timestamp(now.unix_timestamp())
        .map_err(|e| PkiError::TemplateBuild(e.to_string()))
}

/// UTCTime through 2049, GeneralizedTime from 2050 on (RFC 5280, 4.1.2.5).
pub(crate) fn to_x509_time(value: OffsetDateTime) -> Result<Time> {
    let seconds = u64::try_from(value.unix_timestamp())
        .map_err(|_| PkiError::TemplateBuild(format!("{value} is before 1970")))?;
    let date_time = der::DateTime::from_unix_duration(StdDuration::from_secs(seconds))
        .map_err(|e| PkiError::TemplateBuild(format!("{value} cannot be encoded: {e}")))?;
    if date_time.year() < 2050 {
        let utc = UtcTime::from_date_time(date_time)
            .map_err(|e| PkiError::TemplateBuild(e.to_string()))?;
        Ok(Time::UtcTime(utc))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(date_time)))
    }
}

pub(crate) fn from_x509_time(value: &Time) -> Result<OffsetDateTime> {
    let seconds = i64::try_from(value.to_unix_duration().as_secs())
        .map_err(|e| PkiError::parse("time", e))?;
    OffsetDateTime::from_unix_timestamp(seconds).map_err(|e| PkiError::parse("time", e))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use time::macros::datetime;

    use super::*;
    use crate::cert::extensions::KeyPurpose;
    use crate::cert::params::Subject;

    fn request(validity: u32) -> CertificateRequest {
        CertificateRequest::builder()
            .validity(validity)
            .subject(Subject::builder().common_name("leaf.test").build())
            .build()
    }

    #[test]
    fn validity_window_is_exact() {
        let template =
            CertificateTemplate::from_request(&request(90), ExtendedKeyUsagePolicy::default())
                .unwrap();
        assert_eq!(template.not_after - template.not_before, Duration::days(90));
        assert_eq!(template.not_before.nanosecond(), 0);
    }

    #[test]
    fn overflowing_validity_is_template_error() {
        let result = CertificateTemplate::from_request(
            &request(i32::MAX as u32),
            ExtendedKeyUsagePolicy::default(),
        );
        assert!(matches!(result, Err(PkiError::TemplateBuild(_))));
    }

    #[test]
    fn zero_validity_is_rejected() {
        let result =
            CertificateTemplate::from_request(&request(0), ExtendedKeyUsagePolicy::default());
        assert!(matches!(result, Err(PkiError::InvalidInput(_))));
    }

    #[test]
    fn ca_and_leaf_profiles() {
        let mut ca_request = request(10);
        ca_request.is_ca = true;
        let ca = CertificateTemplate::from_request(&ca_request, ExtendedKeyUsagePolicy::default())
            .unwrap();
        assert!(ca.basic_constraints.ca);
        assert_eq!(
            ca.basic_constraints.path_len_constraint,
            BasicConstraints::UNCONSTRAINED_PATH_LEN
        );
        assert!(ca.key_usage.key_cert_sign && ca.key_usage.crl_sign);
        assert!(ca.extended_key_usage.purposes.is_empty());

        let leaf =
            CertificateTemplate::from_request(&request(10), ExtendedKeyUsagePolicy::default())
                .unwrap();
        assert!(!leaf.basic_constraints.ca);
        assert!(leaf.key_usage.digital_signature && leaf.key_usage.key_encipherment);
        assert!(!leaf.key_usage.key_cert_sign);
        assert_eq!(leaf.extended_key_usage.purposes, vec![KeyPurpose::ServerAuth]);
    }

    #[test]
    fn serial_numbers_are_unique_and_non_zero() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let serial = generate_serial_number().unwrap();
            assert!(serial.as_bytes().iter().any(|b| *b != 0));
            assert!(seen.insert(serial.as_bytes().to_vec()));
        }
    }

    #[test]
    fn time_encoding_switches_at_2050() {
        let before = to_x509_time(datetime!(2049-12-31 23:59:59 UTC)).unwrap();
        assert!(matches!(before, Time::UtcTime(_)));
        let after = to_x509_time(datetime!(2050-01-01 00:00:00 UTC)).unwrap();
        assert!(matches!(after, Time::GeneralTime(_)));

        assert_eq!(
            from_x509_time(&after).unwrap(),
            datetime!(2050-01-01 00:00:00 UTC)
        );
        assert!(to_x509_time(datetime!(1969-12-31 23:59:59 UTC)).is_err());
    }
}
