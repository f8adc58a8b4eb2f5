//! Credential storage and encryption for federation peers.
//!
//! Peer passwords are sealed with AES-256-GCM under a per-install random
//! key persisted next to the database. The key file replaced an older
//! scheme that derived the key from the database path; that key was
//! predictable from the filesystem, so on first load under the new
//! scheme every stored password that still decrypts with the legacy key
//! is re-encrypted under the random one.

use crate::error::{BeadsError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::{rngs::OsRng, RngCore};
use rusqlite::params;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::sqlite::BeadStore;

/// Filename for the random encryption key stored alongside the database.
pub const CREDENTIAL_KEY_FILE: &str = ".beads-credential-key";

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Encrypt plaintext using AES-256-GCM with the given key.
///
/// Output layout is `nonce || ciphertext || tag` with a fresh random
/// nonce per call. Empty input produces empty output without error.
///
/// # Errors
///
/// Returns `Crypto` when the key length is wrong or sealing fails.
pub fn encrypt_with_key(plaintext: &str, key: &[u8]) -> Result<Vec<u8>> {
    if plaintext.is_empty() {
        return Ok(Vec::new());
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| BeadsError::Crypto("encryption key must be 32 bytes".to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| BeadsError::Crypto("encryption failed".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `nonce || ciphertext || tag` using AES-256-GCM.
///
/// Empty input produces empty output without error.
///
/// # Errors
///
/// Returns `Crypto` on truncated input, tag mismatch, or a wrong key.
pub fn decrypt_with_key(encrypted: &[u8], key: &[u8]) -> Result<String> {
    if encrypted.is_empty() {
        return Ok(String::new());
    }
    if encrypted.len() < NONCE_LEN {
        return Err(BeadsError::Crypto("ciphertext too short".to_string()));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| BeadsError::Crypto("decryption key must be 32 bytes".to_string()))?;

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| BeadsError::Crypto("decryption failed (wrong key or corrupt data)".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|_| BeadsError::Crypto("decrypted payload is not valid UTF-8".to_string()))
}

/// Derive the old predictable key from the database directory path.
///
/// Used only during migration from the old key derivation scheme.
#[must_use]
pub fn legacy_encryption_key(db_dir: &Path) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(db_dir.to_string_lossy().as_bytes());
    hasher.update(b"beads-federation-key-v1");
    hasher.finalize().to_vec()
}

impl BeadStore {
    /// Load or generate the credential encryption key.
    ///
    /// If `<db_dir>/.beads-credential-key` exists and is exactly 32
    /// bytes, it is loaded. Otherwise a new random key is generated, any
    /// passwords still encrypted under the legacy path-derived key are
    /// migrated, and the new key is written with owner-only permissions.
    /// In-memory stores have no filesystem home, so credential
    /// encryption is unavailable there and this is a no-op.
    ///
    /// # Errors
    ///
    /// `KeyIo` when the key file or its directory cannot be written.
    pub fn init_credential_key(&mut self) -> Result<()> {
        if self.credential_key.is_some() {
            return Ok(());
        }
        let Some(db_dir) = self.db_dir.clone() else {
            return Ok(());
        };

        let key_path = db_dir.join(CREDENTIAL_KEY_FILE);

        if let Ok(existing) = fs::read(&key_path) {
            if existing.len() == KEY_LEN {
                self.credential_key = Some(existing);
                return Ok(());
            }
        }

        let mut key = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);

        self.migrate_credential_keys(&db_dir, &key)?;

        fs::create_dir_all(&db_dir).map_err(|err| BeadsError::KeyIo {
            path: db_dir.clone(),
            reason: err.to_string(),
        })?;
        restrict_dir_permissions(&db_dir);

        fs::write(&key_path, &key).map_err(|err| BeadsError::KeyIo {
            path: key_path.clone(),
            reason: err.to_string(),
        })?;
        restrict_key_permissions(&key_path).map_err(|err| BeadsError::KeyIo {
            path: key_path,
            reason: err.to_string(),
        })?;

        self.credential_key = Some(key);
        Ok(())
    }

    /// Re-encrypt stored peer passwords from the legacy path-derived key
    /// to `new_key`.
    ///
    /// Each row is updated independently; rows that fail to decrypt with
    /// the legacy key already use a different scheme and are left
    /// untouched.
    fn migrate_credential_keys(&mut self, db_dir: &Path, new_key: &[u8]) -> Result<()> {
        let old_key = legacy_encryption_key(db_dir);

        let rows: Vec<(String, Vec<u8>)> = {
            let Ok(mut stmt) = self.conn.prepare(
                "SELECT name, password_encrypted FROM federation_peers
                 WHERE password_encrypted IS NOT NULL AND LENGTH(password_encrypted) > 0",
            ) else {
                // Table may not exist yet (fresh install)
                return Ok(());
            };
            let mapped = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            let mut collected = Vec::new();
            for row in mapped {
                collected.push(row?);
            }
            collected
        };

        for (name, encrypted) in rows {
            let Ok(plaintext) = decrypt_with_key(&encrypted, &old_key) else {
                continue;
            };
            let reencrypted = encrypt_with_key(&plaintext, new_key)?;
            self.conn.execute(
                "UPDATE federation_peers SET password_encrypted = ?1 WHERE name = ?2",
                params![reencrypted, name],
            )?;
            debug!(peer = %name, "migrated peer password to per-install key");
        }

        Ok(())
    }

    /// Encrypt a peer password with the store's credential key.
    ///
    /// Empty passwords are stored as NULL ciphertext.
    ///
    /// # Errors
    ///
    /// `Crypto` when the key is not initialized.
    pub(crate) fn encrypt_password(&self, password: &str) -> Result<Option<Vec<u8>>> {
        if password.is_empty() {
            return Ok(None);
        }
        let key = self
            .credential_key
            .as_deref()
            .ok_or_else(|| BeadsError::Crypto("credential key not initialized".to_string()))?;
        encrypt_with_key(password, key).map(Some)
    }

    /// Decrypt a stored peer password with the store's credential key.
    ///
    /// # Errors
    ///
    /// `Crypto` when the key is not initialized or the payload is bad.
    pub(crate) fn decrypt_password(&self, encrypted: &[u8]) -> Result<String> {
        if encrypted.is_empty() {
            return Ok(String::new());
        }
        let key = self
            .credential_key
            .as_deref()
            .ok_or_else(|| BeadsError::Crypto("credential key not initialized".to_string()))?;
        decrypt_with_key(encrypted, key)
    }
}

#[cfg(unix)]
fn restrict_key_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_key_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn restrict_dir_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o700));
}

#[cfg(not(unix))]
fn restrict_dir_permissions(_path: &Path) {}
