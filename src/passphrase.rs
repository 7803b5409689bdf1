//! Password sources for private keys.
//!
//! Readers are only consulted when a key actually needs a password: opening
//! an encrypted key, or creating a key the user wants encrypted.

use thiserror::Error;

/// Bounds OpenSSL accepts for PEM pass phrases, in bytes.
pub const MIN_PASSPHRASE_LEN: usize = 4;
pub const MAX_PASSPHRASE_LEN: usize = 1023;

pub const CONFIRM_PASSPHRASE_PROMPT: &str = "confirmation: ";

pub trait PassphraseReader {
    /// Returns the password for the private key called `key_name`.
    fn read_passphrase(&self, key_name: &str) -> Result<String, PassphraseError>;
}

impl<F> PassphraseReader for F
where
    F: Fn(&str) -> Result<String, PassphraseError>,
{
    fn read_passphrase(&self, key_name: &str) -> Result<String, PassphraseError> {
        self(key_name)
    }
}

fn key_prompt(key_name: &str) -> String {
    format!("private key password ({key_name}): ")
}

/// Prompts on the terminal for the password of an existing key.
pub struct PromptPassphraseReader;

impl PassphraseReader for PromptPassphraseReader {
    fn read_passphrase(&self, key_name: &str) -> Result<String, PassphraseError> {
        rpassword::prompt_password(key_prompt(key_name))
            .map_err(|_| PassphraseError::PromptError)
    }
}

/// Prompts twice for the password of a key about to be created.
pub struct PromptNewPassphraseReader;

impl PassphraseReader for PromptNewPassphraseReader {
    fn read_passphrase(&self, key_name: &str) -> Result<String, PassphraseError> {
        let first_entry = rpassword::prompt_password(key_prompt(key_name))
            .map_err(|_| PassphraseError::PromptError)?;
        if first_entry.is_empty() {
            return Ok(first_entry);
        }
        let second_entry = rpassword::prompt_password(CONFIRM_PASSPHRASE_PROMPT)
            .map_err(|_| PassphraseError::PromptError)?;
        if first_entry != second_entry {
            Err(PassphraseError::ConfirmationMismatch)
        } else {
            Ok(first_entry)
        }
    }
}

/// Hands out a fixed password, for tests and non-interactive callers.
#[derive(Clone)]
pub struct MemoryPassphraseReader {
    pub passphrase: String,
}

impl MemoryPassphraseReader {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }
}

impl PassphraseReader for MemoryPassphraseReader {
    fn read_passphrase(&self, _key_name: &str) -> Result<String, PassphraseError> {
        Ok(self.passphrase.clone())
    }
}

/// Fails on every call; for keys that are known to be stored in clear.
pub struct NoPassphraseReader;

impl PassphraseReader for NoPassphraseReader {
    fn read_passphrase(&self, key_name: &str) -> Result<String, PassphraseError> {
        Err(PassphraseError::Unavailable(key_name.to_string()))
    }
}

/// Reads the password for a new key. An empty answer means the key is
/// stored unencrypted.
pub fn read_new_key_passphrase(
    reader: &dyn PassphraseReader,
    key_name: &str,
) -> Result<Option<String>, PassphraseError> {
    let passphrase = reader.read_passphrase(key_name)?;
    if passphrase.is_empty() {
        return Ok(None);
    }
    validate_new_passphrase(&passphrase)?;
    Ok(Some(passphrase))
}

pub fn validate_new_passphrase(passphrase: &str) -> Result<(), PassphraseError> {
    if passphrase.len() < MIN_PASSPHRASE_LEN {
        return Err(PassphraseError::TooShort(MIN_PASSPHRASE_LEN));
    }
    if passphrase.len() > MAX_PASSPHRASE_LEN {
        return Err(PassphraseError::TooLong(MAX_PASSPHRASE_LEN));
    }
    Ok(())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PassphraseError {
    #[error("could not prompt for password")]
    PromptError,
    #[error("password mismatch")]
    ConfirmationMismatch,
    #[error("password too short (min: {0} bytes)")]
    TooShort(usize),
    #[error("password too long (max: {0} bytes)")]
    TooLong(usize),
    #[error("no password available for private key {0:?}")]
    Unavailable(String),
}
