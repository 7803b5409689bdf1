//! Human-readable rendering of certificates and CRLs.

use std::fmt::Display;
use std::io::{self, Write};

use const_oid::ObjectIdentifier;
use const_oid::db::rfc5912::ID_EC_PUBLIC_KEY;
use rsa::traits::PublicKeyParts;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};
use x509_cert::ext::Extension;

use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName,
    SubjectKeyIdentifier, ToAndFromX509Extension,
};
use crate::cert::{Certificate, SignatureAlgorithm, decode_extension};
use crate::crl::{Crl, CrlData};
use crate::error::{PkiError, Result};
use crate::key::{PublicKey, describe_oid};

const INDENT_WIDTH: usize = 4;
const HEX_BYTES_PER_LINE: usize = 16;

/// Writes indented lines; the first write error is kept and every later
/// call becomes a no-op.
pub struct Printer<W: Write> {
    writer: W,
    indent: usize,
    error: Option<io::Error>,
}

impl<W: Write> Printer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            indent: 0,
            error: None,
        }
    }

    pub fn line(&mut self, text: impl Display) {
        if self.error.is_some() {
            return;
        }
        let indent = self.indent * INDENT_WIDTH;
        if let Err(e) = writeln!(self.writer, "{:indent$}{text}", "") {
            self.error = Some(e);
        }
    }

    pub fn with_indent(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    /// Formats `data` as hex one level deeper than the current line, 16
    /// bytes per line. The result starts with a newline so it can follow a
    /// label.
    pub fn hex(&self, data: &[u8]) -> String {
        let indent = " ".repeat((self.indent + 1) * INDENT_WIDTH);
        let mut out = String::with_capacity(data.len() * 3 + indent.len());
        for (i, byte) in data.iter().enumerate() {
            if i % HEX_BYTES_PER_LINE == 0 {
                out.push('\n');
                out.push_str(&indent);
            } else {
                out.push(' ');
            }
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    pub fn finish(self) -> Result<W> {
        match self.error {
            Some(e) => Err(PkiError::Output(e)),
            None => Ok(self.writer),
        }
    }
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&Rfc3339)
        .map_err(|e| PkiError::Encoding(e.to_string()))
}

pub fn print_certificate<W: Write>(writer: W, cert: &Certificate) -> Result<W> {
    let mut p = Printer::new(writer);
    let mut result = Ok(());

    p.line("Data:");
    p.with_indent(|p| result = print_certificate_data(p, cert));
    result?;

    let algorithm = SignatureAlgorithm::describe(&cert.inner.signature_algorithm);
    print_signature(&mut p, &algorithm, cert.signature());
    p.finish()
}

fn print_signature<W: Write>(p: &mut Printer<W>, algorithm: &str, signature: &[u8]) {
    p.line("Signature:");
    p.with_indent(|p| {
        let data = p.hex(signature);
        p.line(format!("Algorithm: {algorithm}"));
        p.line(format!("Data: {data}"));
    });
}

fn print_certificate_data<W: Write>(p: &mut Printer<W>, cert: &Certificate) -> Result<()> {
    p.line(format!("Version: {}", cert.version()));
    let serial = p.hex(cert.serial_number().as_bytes());
    p.line(format!("Serial number: {serial}"));
    p.line(format!("Issuer: {}", cert.issuer()));

    let not_before = rfc3339(cert.not_before()?)?;
    let not_after = rfc3339(cert.not_after()?)?;
    p.line("Validity:");
    p.with_indent(|p| {
        p.line(format!("Not before: {not_before}"));
        p.line(format!("Not after:  {not_after}"));
    });

    p.line(format!("Subject: {}", cert.subject()));

    let spki = &cert.inner.tbs_certificate.subject_public_key_info;
    let public_key = match cert.public_key() {
        Ok(key) => Some(key),
        Err(PkiError::UnsupportedKeyType(reason)) => {
            debug!(%reason, "printing public key without decoding it");
            None
        }
        Err(e) => return Err(e),
    };
    let spki_der = der::Encode::to_der(spki)?;
    p.line("Public key:");
    p.with_indent(|p| {
        match &public_key {
            Some(PublicKey::EcdsaP256(_)) => {
                p.line("Algorithm: ECDSA");
                p.line("ECDSA curve: P-256");
            }
            Some(PublicKey::Rsa(key)) => {
                p.line("Algorithm: RSA");
                p.line(format!("Size: {} bits", key.size() * 8));
            }
            Some(PublicKey::Ed25519(_)) => p.line("Algorithm: Ed25519"),
            None if spki.algorithm.oid == ID_EC_PUBLIC_KEY => {
                p.line("Algorithm: ECDSA");
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .and_then(|params| params.decode_as::<ObjectIdentifier>().ok());
                match curve {
                    Some(curve) => p.line(format!("ECDSA curve: {}", describe_oid(curve))),
                    None => p.line("ECDSA curve: unknown"),
                }
            }
            None => p.line(format!(
                "Algorithm: {} (unsupported)",
                describe_oid(spki.algorithm.oid)
            )),
        }
        let data = p.hex(&spki_der);
        p.line(format!("Data: {data}"));
    });

    let mut result = Ok(());
    p.line("Extensions:");
    p.with_indent(|p| {
        result = cert
            .extensions()
            .iter()
            .try_for_each(|ext| print_extension(p, ext))
    });
    result
}

fn extension_header<W: Write>(p: &mut Printer<W>, ext: &Extension, name: impl Display) {
    let critical = if ext.critical { " (critical)" } else { "" };
    p.line(format!("{name}{critical}:"));
}

fn print_raw_extension<W: Write>(p: &mut Printer<W>, ext: &Extension, name: impl Display) {
    extension_header(p, ext, name);
    p.with_indent(|p| {
        let data = p.hex(ext.extn_value.as_bytes());
        p.line(format!("Non-decoded data: {data}"));
    });
}

/// Decodes `E`; a malformed critical extension is an error, a malformed
/// non-critical one is rendered raw.
fn print_known<W: Write, E: ToAndFromX509Extension>(
    p: &mut Printer<W>,
    ext: &Extension,
    title: &str,
    body: impl FnOnce(&mut Printer<W>, E),
) -> Result<()> {
    match decode_extension::<E>(ext) {
        Ok(value) => {
            extension_header(p, ext, title);
            p.with_indent(|p| body(p, value));
            Ok(())
        }
        Err(e) if !ext.critical => {
            warn!(extension = E::NAME, error = %e, "cannot decode extension");
            print_raw_extension(p, ext, title);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn print_extension<W: Write>(p: &mut Printer<W>, ext: &Extension) -> Result<()> {
    match ext.extn_id {
        KeyUsage::OID => print_known(p, ext, "Key usage", |p, usage: KeyUsage| {
            for name in usage.names() {
                p.line(name);
            }
        }),
        SubjectAltName::OID => print_known(p, ext, "Subject alt name", print_san),
        BasicConstraints::OID => {
            print_known(p, ext, "Basic constraints", |p, bc: BasicConstraints| {
                p.line(format!("CA: {}", bc.ca));
                if bc.path_len_constraint != BasicConstraints::UNCONSTRAINED_PATH_LEN {
                    p.line(format!("Path length constraint: {}", bc.path_len_constraint));
                }
            })
        }
        ExtendedKeyUsage::OID => {
            print_known(p, ext, "Extended key usage", |p, eku: ExtendedKeyUsage| {
                for purpose in eku.purposes {
                    p.line(purpose);
                }
            })
        }
        SubjectKeyIdentifier::OID => print_known(
            p,
            ext,
            "Subject key identifier",
            |p, ski: SubjectKeyIdentifier| {
                let data = p.hex(&ski.0);
                p.line(format!("Key identifier: {data}"));
            },
        ),
        AuthorityKeyIdentifier::OID => print_known(
            p,
            ext,
            "Authority key identifier",
            |p, aki: AuthorityKeyIdentifier| {
                if let Some(key_identifier) = aki.key_identifier {
                    let data = p.hex(&key_identifier);
                    p.line(format!("Key identifier: {data}"));
                }
            },
        ),
        other => {
            print_raw_extension(p, ext, other);
            Ok(())
        }
    }
}

fn print_san<W: Write>(p: &mut Printer<W>, san: SubjectAltName) {
    p.line("URIs:");
    p.with_indent(|p| san.uris.iter().for_each(|uri| p.line(uri)));
    p.line("DNS names:");
    p.with_indent(|p| san.dns_names.iter().for_each(|name| p.line(name)));
    p.line("IP addresses:");
    p.with_indent(|p| san.ip_addresses.iter().for_each(|ip| p.line(ip)));
    p.line("Email addresses:");
    p.with_indent(|p| san.email_addresses.iter().for_each(|email| p.line(email)));
}

pub fn print_crl<W: Write>(writer: W, crl: &Crl) -> Result<W> {
    let data = CrlData::from_crl(crl)?;
    let tbs = &crl.inner.tbs_cert_list;
    let creation = rfc3339(data.creation_date)?;
    let expiration = rfc3339(data.expiration_date)?;
    let revoked = data
        .revoked_certificates
        .iter()
        .map(|entry| Ok((entry.serial_number.as_bytes(), rfc3339(entry.revocation_date)?)))
        .collect::<Result<Vec<_>>>()?;
    let algorithm = SignatureAlgorithm::describe(&crl.inner.signature_algorithm);

    let mut p = Printer::new(writer);
    p.line("Data:");
    p.with_indent(|p| {
        p.line(format!("Version: {}", tbs.version as u8 + 1));
        p.line(format!("Issuer: {}", tbs.issuer));
        p.line(format!("Creation date: {creation}"));
        p.line(format!("Expiration date: {expiration}"));
        p.line("Revoked certificates:");
        p.with_indent(|p| {
            for (serial, date) in &revoked {
                let serial = p.hex(serial);
                p.line(format!("Serial number: {serial}"));
                p.with_indent(|p| p.line(format!("Revocation date: {date}")));
            }
        });
    });
    print_signature(&mut p, &algorithm, crl.signature());
    p.finish()
}
