use crate::error::{PkiError, Result};

pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
pub const ENCRYPTED_PRIVATE_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";
pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const CRL_LABEL: &str = "X509 CRL";

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Parse a single PEM block, returning its label and DER contents.
pub fn parse_pem(pem_str: &str) -> Result<(String, Vec<u8>)> {
    let pem = pem::parse(pem_str)?;
    Ok((pem.tag().to_string(), pem.contents().to_vec()))
}

/// Whether the block is encrypted with the pre-PKCS#8 OpenSSL scheme, which
/// marks it with a `Proc-Type: 4,ENCRYPTED` header.
pub fn has_legacy_encryption(pem_str: &str) -> Result<bool> {
    let pem = pem::parse(pem_str)?;
    Ok(pem
        .headers()
        .get("Proc-Type")
        .is_some_and(|value| value.ends_with("ENCRYPTED")))
}

/// Convert a PEM‑encoded string to DER‑encoded bytes, checking the label.
pub fn pem_to_der(pem_str: &str, expected_label: &'static str) -> Result<Vec<u8>> {
    let (label, der) = parse_pem(pem_str)?;
    if label != expected_label {
        return Err(PkiError::parse(
            expected_label,
            format!("unexpected PEM label {label:?}"),
        ));
    }
    Ok(der)
}
