//! Persistence of keys, certificates and CRLs by logical name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{CONFIG_FILE_NAME, PkiConfig};
use crate::error::{PkiError, Result};

pub const PRIVATE_KEYS_DIR: &str = "private-keys";
pub const CERTIFICATES_DIR: &str = "certificates";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    PrivateKey,
    Certificate,
    /// Keyed by the name of the issuing authority.
    Crl,
}

impl ArtifactKind {
    /// CRLs are rewritten in place; keys and certificates are never overwritten.
    pub fn is_replaceable(self) -> bool {
        matches!(self, ArtifactKind::Crl)
    }

    fn is_sensitive(self) -> bool {
        matches!(self, ArtifactKind::PrivateKey)
    }
}

/// Raw storage of armored artifacts.
pub trait ArtifactStore {
    fn read(&self, kind: ArtifactKind, name: &str) -> Result<String>;

    /// Stores `data`, failing with [`PkiError::AlreadyExists`] when a
    /// non-replaceable artifact of that name is already present.
    fn write(&self, kind: ArtifactKind, name: &str, data: &str) -> Result<()>;
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains('\0')
    {
        return Err(PkiError::InvalidInput(format!("invalid artifact name {name:?}")));
    }
    Ok(())
}

/// The on-disk layout:
///
/// ```text
/// <root>/cfg.json
/// <root>/private-keys/<name>.key
/// <root>/certificates/<name>.cert
/// <root>/certificates/<issuer>.crl
/// ```
#[derive(Clone, Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn path(&self, kind: ArtifactKind, name: &str) -> PathBuf {
        let (dir, extension) = match kind {
            ArtifactKind::PrivateKey => (PRIVATE_KEYS_DIR, "key"),
            ArtifactKind::Certificate => (CERTIFICATES_DIR, "cert"),
            ArtifactKind::Crl => (CERTIFICATES_DIR, "crl"),
        };
        self.root.join(dir).join(format!("{name}.{extension}"))
    }

    /// Creates the directory if needed and writes the default configuration.
    /// An existing directory must be empty.
    pub fn initialize(&self) -> Result<PkiConfig> {
        info!(path = %self.root.display(), "initializing pki");

        fs::create_dir_all(&self.root).map_err(|e| PkiError::io(&self.root, e))?;
        let mut entries = fs::read_dir(&self.root).map_err(|e| PkiError::io(&self.root, e))?;
        if entries.next().is_some() {
            return Err(PkiError::InvalidInput(format!(
                "{} is not empty",
                self.root.display()
            )));
        }

        let config = PkiConfig::default();
        let path = self.config_path();
        info!(path = %path.display(), "creating default configuration file");
        write_file(&path, config.to_json()?.as_bytes(), WriteMode::CreateNew, false)?;
        Ok(config)
    }

    pub fn load_config(&self) -> Result<PkiConfig> {
        PkiConfig::load(&self.config_path())
    }
}

impl ArtifactStore for DirectoryStore {
    fn read(&self, kind: ArtifactKind, name: &str) -> Result<String> {
        validate_name(name)?;
        let path = self.path(kind, name);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PkiError::NotFound(path.clone()),
            _ => PkiError::io(&path, e),
        })
    }

    fn write(&self, kind: ArtifactKind, name: &str, data: &str) -> Result<()> {
        validate_name(name)?;
        let mode = if kind.is_replaceable() {
            WriteMode::Replace
        } else {
            WriteMode::CreateNew
        };
        write_file(&self.path(kind, name), data.as_bytes(), mode, kind.is_sensitive())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    CreateNew,
    Replace,
}

fn open_file(path: &Path, mode: WriteMode) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    match mode {
        WriteMode::CreateNew => options.create_new(true),
        WriteMode::Replace => options.create(true).truncate(true),
    };
    options.open(path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => PkiError::AlreadyExists(path.to_owned()),
        _ => PkiError::io(path, e),
    })
}

fn write_file(path: &Path, data: &[u8], mode: WriteMode, sensitive: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PkiError::io(parent, e))?;
    }

    let mut file = open_file(path, mode)?;

    if sensitive {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(PermissionsExt::from_mode(0o600))
                .map_err(|e| PkiError::io(path, e))?;
        }
    }

    file.write_all(data).map_err(|e| PkiError::io(path, e))?;
    file.sync_all().map_err(|e| PkiError::io(path, e))
}

/// Keeps artifacts in memory with the same overwrite rules as
/// [`DirectoryStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: RefCell<HashMap<(ArtifactKind, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, kind: ArtifactKind, name: &str) -> bool {
        self.artifacts
            .borrow()
            .contains_key(&(kind, name.to_string()))
    }
}

impl ArtifactStore for MemoryStore {
    fn read(&self, kind: ArtifactKind, name: &str) -> Result<String> {
        self.artifacts
            .borrow()
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| PkiError::NotFound(PathBuf::from(name)))
    }

    fn write(&self, kind: ArtifactKind, name: &str, data: &str) -> Result<()> {
        validate_name(name)?;
        let mut artifacts = self.artifacts.borrow_mut();
        let key = (kind, name.to_string());
        if !kind.is_replaceable() && artifacts.contains_key(&key) {
            return Err(PkiError::AlreadyExists(PathBuf::from(name)));
        }
        artifacts.insert(key, data.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn layout_follows_artifact_kind() {
        let store = DirectoryStore::new("/pki");
        assert_eq!(
            store.path(ArtifactKind::PrivateKey, "root-ca"),
            PathBuf::from("/pki/private-keys/root-ca.key")
        );
        assert_eq!(
            store.path(ArtifactKind::Certificate, "web"),
            PathBuf::from("/pki/certificates/web.cert")
        );
        assert_eq!(
            store.path(ArtifactKind::Crl, "root-ca"),
            PathBuf::from("/pki/certificates/root-ca.crl")
        );
        assert_eq!(store.config_path(), PathBuf::from("/pki/cfg.json"));
    }

    #[test]
    fn keys_and_certificates_are_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());

        for kind in [ArtifactKind::PrivateKey, ArtifactKind::Certificate] {
            store.write(kind, "web", "first").unwrap();
            let result = store.write(kind, "web", "second");
            assert!(
                matches!(result, Err(PkiError::AlreadyExists(ref p)) if *p == store.path(kind, "web"))
            );
            assert_eq!(store.read(kind, "web").unwrap(), "first");
        }
    }

    #[test]
    fn crls_are_replaced() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());
        store.write(ArtifactKind::Crl, "root-ca", "a longer first version").unwrap();
        store.write(ArtifactKind::Crl, "root-ca", "second").unwrap();
        assert_eq!(store.read(ArtifactKind::Crl, "root-ca").unwrap(), "second");
    }

    #[cfg(unix)]
    #[test]
    fn private_keys_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());
        store.write(ArtifactKind::PrivateKey, "root-ca", "secret").unwrap();
        let metadata = fs::metadata(store.path(ArtifactKind::PrivateKey, "root-ca")).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(matches!(
            store.read(ArtifactKind::Certificate, "nope"),
            Err(PkiError::NotFound(_))
        ));
    }

    #[test]
    fn names_cannot_escape_the_directory() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());
        for name in ["", "../x", "a/b", ".hidden"] {
            assert!(matches!(
                store.write(ArtifactKind::Certificate, name, "x"),
                Err(PkiError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn initialize_refuses_non_empty_directory() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path().join("pki"));
        let config = store.initialize().unwrap();
        assert_eq!(store.load_config().unwrap(), config);

        assert!(matches!(store.initialize(), Err(PkiError::InvalidInput(_))));
    }

    #[test]
    fn memory_store_has_the_same_rules() {
        let store = MemoryStore::new();
        store.write(ArtifactKind::Certificate, "a", "1").unwrap();
        assert!(matches!(
            store.write(ArtifactKind::Certificate, "a", "2"),
            Err(PkiError::AlreadyExists(_))
        ));
        store.write(ArtifactKind::Crl, "a", "1").unwrap();
        store.write(ArtifactKind::Crl, "a", "2").unwrap();
        assert_eq!(store.read(ArtifactKind::Crl, "a").unwrap(), "2");
        assert!(store.contains(ArtifactKind::Certificate, "a"));
        assert!(!store.contains(ArtifactKind::PrivateKey, "a"));
    }
}
