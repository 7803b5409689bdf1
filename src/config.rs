//! `cfg.json`, the per-directory configuration.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cert::params::{CertificateRequest, ExtendedKeyUsagePolicy, Subject, SubjectAltName};
use crate::error::{PkiError, Result};

pub const CONFIG_FILE_NAME: &str = "cfg.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkiConfig {
    /// Defaults merged into every issuance request.
    pub certificates: CertificateRequest,
    #[serde(default)]
    pub extended_key_usage_policy: ExtendedKeyUsagePolicy,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            certificates: CertificateRequest::builder()
                .validity(365)
                .subject(Subject::builder().common_name("localhost").build())
                .san(SubjectAltName {
                    dns_names: vec!["localhost".to_string()],
                    ip_addresses: vec![
                        IpAddr::V4(Ipv4Addr::LOCALHOST),
                        IpAddr::V6(Ipv6Addr::LOCALHOST),
                    ],
                    ..SubjectAltName::default()
                })
                .build(),
            extended_key_usage_policy: ExtendedKeyUsagePolicy::default(),
        }
    }
}

impl PkiConfig {
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| PkiError::Config(e.to_string()))
    }

    /// Pretty-printed with a two-space indent and a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut json =
            serde_json::to_string_pretty(self).map_err(|e| PkiError::Config(e.to_string()))?;
        json.push('\n');
        Ok(json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PkiError::NotFound(path.to_owned()),
            _ => PkiError::io(path, e),
        })?;
        Self::from_json(&data).map_err(|e| match e {
            PkiError::Config(reason) => PkiError::Config(format!("{}: {reason}", path.display())),
            other => other,
        })
    }
}
