//! Federation peer registry and credential-scoped remote operations.
//!
//! The underlying engine reads sync credentials from process-wide
//! environment variables, so every federation primitive runs under a
//! process-global mutex: a concurrent sync to a different peer must not
//! inherit this call's `REMOTE_USER`/`REMOTE_PASSWORD`, and a call with
//! no credentials of its own must not inherit someone else's.

use crate::error::{BeadsError, Result};
use crate::model::FederationPeer;
use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::{params, OptionalExtension};
use std::env;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::{debug, warn};

use super::remote::is_already_exists;
use super::sqlite::BeadStore;

/// Environment variable the engine reads the sync username from.
pub const REMOTE_USER_ENV: &str = "REMOTE_USER";
/// Environment variable the engine reads the sync password from.
pub const REMOTE_PASSWORD_ENV: &str = "REMOTE_PASSWORD";

/// Maximum peer name length.
const MAX_PEER_NAME_LEN: usize = 64;

/// Serializes access to the credential environment variables.
static FEDERATION_ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Validate that a peer name is safe for use as a remote name.
///
/// # Errors
///
/// `Validation` when the name is empty, too long, or contains characters
/// outside `[A-Za-z][A-Za-z0-9_-]*`.
pub fn validate_peer_name(name: &str) -> Result<()> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new("^[a-zA-Z][a-zA-Z0-9_-]*$").expect("peer name pattern is valid")
    });

    if name.is_empty() {
        return Err(BeadsError::validation("peer_name", "cannot be empty"));
    }
    if name.len() > MAX_PEER_NAME_LEN {
        return Err(BeadsError::validation(
            "peer_name",
            format!("too long (max {MAX_PEER_NAME_LEN} characters)"),
        ));
    }
    if !re.is_match(name) {
        return Err(BeadsError::validation(
            "peer_name",
            "must start with a letter and contain only alphanumerics, hyphens, and underscores",
        ));
    }
    Ok(())
}

/// Whether a peer URL uses SSH transport.
///
/// True for `ssh://`, `git+ssh://`, and scp-style `user@host:path`
/// forms; false for HTTP(S), object stores, `file://`, and plain paths.
#[must_use]
pub fn is_ssh_url(url: &str) -> bool {
    if url.starts_with("ssh://") || url.starts_with("git+ssh://") {
        return true;
    }
    // Any other explicit scheme is not SSH
    if url.contains("://") {
        return false;
    }
    // scp-style: user@host:path
    if let Some(at) = url.find('@') {
        let rest = &url[at + 1..];
        if rest.contains(':') && !url[..at].contains('/') {
            return true;
        }
    }
    false
}

/// Quote a string for the engine's shell-facing CLI.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Unsets the credential environment variables when dropped, so the
/// variables are cleared on every exit path including panics. The
/// federation mutex must be held for the guard's whole lifetime.
struct CredentialEnvGuard;

impl CredentialEnvGuard {
    fn set(username: Option<&str>, password: Option<&str>) -> Self {
        if let Some(username) = username {
            env::set_var(REMOTE_USER_ENV, username);
        }
        if let Some(password) = password {
            env::set_var(REMOTE_PASSWORD_ENV, password);
        }
        Self
    }
}

impl Drop for CredentialEnvGuard {
    fn drop(&mut self) {
        env::remove_var(REMOTE_USER_ENV);
        env::remove_var(REMOTE_PASSWORD_ENV);
    }
}

impl BeadStore {
    /// Add or update a federation peer.
    ///
    /// Validates the peer name, encrypts the password (empty password is
    /// stored as NULL), upserts the row, and registers the remote with
    /// the engine, ignoring "already exists".
    ///
    /// # Errors
    ///
    /// Validation, crypto, database, or remote errors (other than
    /// "already exists") propagate.
    pub fn add_federation_peer(&mut self, peer: &FederationPeer) -> Result<()> {
        validate_peer_name(&peer.name)?;
        self.init_credential_key()?;

        let encrypted = match peer.password.as_deref() {
            Some(password) => self.encrypt_password(password)?,
            None => None,
        };

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO federation_peers
                 (name, remote_url, username, password_encrypted, sovereignty, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(name) DO UPDATE SET
                 remote_url = excluded.remote_url,
                 username = excluded.username,
                 password_encrypted = excluded.password_encrypted,
                 sovereignty = excluded.sovereignty,
                 updated_at = excluded.updated_at",
            params![
                peer.name,
                peer.remote_url,
                peer.username,
                encrypted,
                peer.sovereignty,
                now,
            ],
        )?;

        if let Err(err) = self.remotes.add_remote(&peer.name, &peer.remote_url) {
            if !is_already_exists(&err) {
                return Err(BeadsError::Remote {
                    peer: peer.name.clone(),
                    message: err.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get a federation peer by name, with its password decrypted.
    ///
    /// # Errors
    ///
    /// `NotFound` when the peer does not exist; crypto errors when the
    /// stored password cannot be decrypted.
    pub fn get_federation_peer(&mut self, name: &str) -> Result<FederationPeer> {
        self.init_credential_key()?;

        let row = self
            .conn
            .query_row(
                "SELECT name, remote_url, username, password_encrypted, sovereignty,
                        last_sync, created_at, updated_at
                 FROM federation_peers WHERE name = ?1",
                params![name],
                peer_row,
            )
            .optional()?;

        let (mut peer, encrypted) =
            row.ok_or_else(|| BeadsError::not_found(format!("federation peer {name}")))?;

        if let Some(encrypted) = encrypted {
            let password = self.decrypt_password(&encrypted)?;
            if !password.is_empty() {
                peer.password = Some(password);
            }
        }

        Ok(peer)
    }

    /// All federation peers ordered by name, passwords decrypted.
    ///
    /// # Errors
    ///
    /// Database or crypto errors propagate.
    pub fn list_federation_peers(&mut self) -> Result<Vec<FederationPeer>> {
        self.init_credential_key()?;

        let rows: Vec<(FederationPeer, Option<Vec<u8>>)> = {
            let mut stmt = self.conn.prepare(
                "SELECT name, remote_url, username, password_encrypted, sovereignty,
                        last_sync, created_at, updated_at
                 FROM federation_peers ORDER BY name",
            )?;
            let mapped = stmt.query_map([], peer_row)?;
            let mut collected = Vec::new();
            for row in mapped {
                collected.push(row?);
            }
            collected
        };

        let mut peers = Vec::new();
        for (mut peer, encrypted) in rows {
            if let Some(encrypted) = encrypted {
                let password = self.decrypt_password(&encrypted)?;
                if !password.is_empty() {
                    peer.password = Some(password);
                }
            }
            peers.push(peer);
        }
        Ok(peers)
    }

    /// Remove a federation peer and best-effort remove its remote.
    ///
    /// Removing an unknown peer is not an error; the remote may still be
    /// registered from an earlier install.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub fn remove_federation_peer(&mut self, name: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM federation_peers WHERE name = ?1",
            params![name],
        )?;

        if let Err(err) = self.remotes.remove_remote(name) {
            debug!(peer = %name, error = %err, "remote removal skipped");
        }

        Ok(())
    }

    /// Run `f` with the peer's credentials exported to the environment.
    ///
    /// The federation mutex is taken unconditionally, even when the peer
    /// has no credentials, so the call cannot inherit variables set by a
    /// concurrent sync. On success the peer's `last_sync` is updated
    /// best-effort.
    ///
    /// # Errors
    ///
    /// Peer lookup failures and `f`'s own error propagate.
    pub fn with_peer_credentials<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let peer = self.get_federation_peer(name)?;

        let _lock = FEDERATION_ENV_MUTEX
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let has_credentials = peer.username.is_some() || peer.password.is_some();
        let _env_guard = has_credentials
            .then(|| CredentialEnvGuard::set(peer.username.as_deref(), peer.password.as_deref()));

        let result = f();

        if result.is_ok() {
            if let Err(err) = self.update_peer_last_sync(name) {
                warn!(peer = %name, error = %err, "failed to update last_sync");
            }
        }

        result
    }

    fn update_peer_last_sync(&mut self, name: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE federation_peers SET last_sync = ?1 WHERE name = ?2",
            params![Utc::now().to_rfc3339(), name],
        )?;
        Ok(())
    }
}

type PeerRow = (FederationPeer, Option<Vec<u8>>);

fn peer_row(row: &rusqlite::Row) -> rusqlite::Result<PeerRow> {
    fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
        value.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
    }

    let last_sync: Option<String> = row.get(5)?;
    let created_at: Option<String> = row.get(6)?;
    let updated_at: Option<String> = row.get(7)?;

    let peer = FederationPeer {
        name: row.get(0)?,
        remote_url: row.get(1)?,
        username: row.get::<_, Option<String>>(2)?.filter(|s| !s.is_empty()),
        password: None,
        sovereignty: row.get(4)?,
        last_sync: parse_ts(last_sync),
        created_at: parse_ts(created_at).unwrap_or_else(Utc::now),
        updated_at: parse_ts(updated_at).unwrap_or_else(Utc::now),
    };
    let encrypted: Option<Vec<u8>> = row.get(3)?;
    Ok((peer, encrypted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_store() -> (TempDir, BeadStore) {
        let dir = TempDir::new().unwrap();
        let store = BeadStore::open(&dir.path().join("beads.db")).unwrap();
        (dir, store)
    }

    fn make_peer(name: &str) -> FederationPeer {
        FederationPeer {
            name: name.to_string(),
            remote_url: format!("https://hub.example.com/{name}"),
            username: Some("syncer".to_string()),
            password: Some("s3cret".to_string()),
            sovereignty: "open".to_string(),
            ..FederationPeer::default()
        }
    }

    #[test]
    fn test_validate_peer_name() {
        assert!(validate_peer_name("rustytown").is_ok());
        assert!(validate_peer_name("Peer-1_a").is_ok());
        assert!(validate_peer_name("").is_err());
        assert!(validate_peer_name("1peer").is_err());
        assert!(validate_peer_name("bad name").is_err());
        assert!(validate_peer_name("bad;name").is_err());
        assert!(validate_peer_name(&"x".repeat(65)).is_err());
        assert!(validate_peer_name(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn test_is_ssh_url() {
        let cases = [
            ("git+ssh://git@github.com/org/repo.git", true),
            ("ssh://git@github.com/org/repo.git", true),
            ("git@github.com:org/repo.git", true),
            ("git+ssh://github.com/org/repo", true),
            ("ssh://user@host:2222/path", true),
            ("git@bitbucket.org:team/repo.git", true),
            ("https://hub.example.com/org/repo", false),
            ("http://localhost:50051/repo", false),
            ("s3://bucket/db", false),
            ("gs://bucket/db", false),
            ("file:///local/path", false),
            ("/absolute/local/path", false),
            ("", false),
        ];
        for (url, want) in cases {
            assert_eq!(is_ssh_url(url), want, "is_ssh_url({url:?})");
        }
    }

    #[test]
    fn test_shell_quote() {
        let cases = [
            ("simple", "'simple'"),
            ("has space", "'has space'"),
            ("semi;colon", "'semi;colon'"),
            ("pipe|char", "'pipe|char'"),
            ("$(cmd)", "'$(cmd)'"),
            ("`cmd`", "'`cmd`'"),
            ("it's", "'it'\\''s'"),
            ("", "''"),
        ];
        for (input, want) in cases {
            assert_eq!(shell_quote(input), want, "shell_quote({input:?})");
        }
    }

    #[test]
    fn test_add_get_roundtrip_decrypts_password() {
        let (_dir, mut store) = file_store();
        store.add_federation_peer(&make_peer("upstream")).unwrap();

        let peer = store.get_federation_peer("upstream").unwrap();
        assert_eq!(peer.name, "upstream");
        assert_eq!(peer.username.as_deref(), Some("syncer"));
        assert_eq!(peer.password.as_deref(), Some("s3cret"));
        assert_eq!(peer.sovereignty, "open");
        assert!(peer.last_sync.is_none());

        // The stored ciphertext is not the plaintext
        let stored: Vec<u8> = store
            .conn
            .query_row(
                "SELECT password_encrypted FROM federation_peers WHERE name = 'upstream'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_ne!(stored, b"s3cret");
    }

    #[test]
    fn test_empty_password_stored_as_null() {
        let (_dir, mut store) = file_store();
        let mut peer = make_peer("anon");
        peer.username = None;
        peer.password = None;
        store.add_federation_peer(&peer).unwrap();

        let stored: Option<Vec<u8>> = store
            .conn
            .query_row(
                "SELECT password_encrypted FROM federation_peers WHERE name = 'anon'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(stored.is_none());

        let fetched = store.get_federation_peer("anon").unwrap();
        assert!(fetched.password.is_none());
    }

    #[test]
    fn test_add_twice_upserts_and_ignores_existing_remote() {
        let (_dir, mut store) = file_store();
        store.add_federation_peer(&make_peer("twice")).unwrap();

        let mut updated = make_peer("twice");
        updated.remote_url = "https://hub.example.com/elsewhere".to_string();
        updated.password = Some("rotated".to_string());
        store.add_federation_peer(&updated).unwrap();

        let peer = store.get_federation_peer("twice").unwrap();
        assert_eq!(peer.remote_url, "https://hub.example.com/elsewhere");
        assert_eq!(peer.password.as_deref(), Some("rotated"));

        let peers = store.list_federation_peers().unwrap();
        assert_eq!(peers.len(), 1);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let (_dir, mut store) = file_store();
        let mut peer = make_peer("ok");
        peer.name = "not ok".to_string();
        assert!(matches!(
            store.add_federation_peer(&peer),
            Err(BeadsError::Validation { .. })
        ));
    }

    #[test]
    fn test_get_missing_peer_not_found() {
        let (_dir, mut store) = file_store();
        assert!(matches!(
            store.get_federation_peer("ghost"),
            Err(BeadsError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_ordered_by_name() {
        let (_dir, mut store) = file_store();
        store.add_federation_peer(&make_peer("zeta")).unwrap();
        store.add_federation_peer(&make_peer("alpha")).unwrap();

        let names: Vec<String> = store
            .list_federation_peers()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_remove_peer_and_remote() {
        let (_dir, mut store) = file_store();
        store.add_federation_peer(&make_peer("doomed")).unwrap();
        store.remove_federation_peer("doomed").unwrap();
        assert!(store.get_federation_peer("doomed").is_err());

        // Removing again is not an error
        store.remove_federation_peer("doomed").unwrap();
    }

    /// Environment lifecycle lives in one test: every set/unset happens
    /// under the federation mutex, so splitting these assertions across
    /// tests would let a parallel runner observe another test's vars.
    #[test]
    fn test_with_peer_credentials_env_lifecycle() {
        let (_dir, mut store) = file_store();
        store.add_federation_peer(&make_peer("creds")).unwrap();

        let mut anon = make_peer("anon");
        anon.username = None;
        anon.password = None;
        store.add_federation_peer(&anon).unwrap();

        // Credentials visible inside f, gone after
        store
            .with_peer_credentials("creds", || {
                assert_eq!(env::var(REMOTE_USER_ENV).as_deref(), Ok("syncer"));
                assert_eq!(env::var(REMOTE_PASSWORD_ENV).as_deref(), Ok("s3cret"));
                Ok(())
            })
            .unwrap();
        assert!(env::var_os(REMOTE_USER_ENV).is_none());
        assert!(env::var_os(REMOTE_PASSWORD_ENV).is_none());

        // A peer without credentials sets nothing but still runs under
        // the mutex
        store
            .with_peer_credentials("anon", || {
                assert!(env::var_os(REMOTE_USER_ENV).is_none());
                assert!(env::var_os(REMOTE_PASSWORD_ENV).is_none());
                Ok(())
            })
            .unwrap();

        // The environment is restored even when f fails
        let err = store.with_peer_credentials("creds", || {
            Err(BeadsError::Remote {
                peer: "creds".to_string(),
                message: "connection refused".to_string(),
            })
        });
        assert!(err.is_err());
        assert!(env::var_os(REMOTE_USER_ENV).is_none());
        assert!(env::var_os(REMOTE_PASSWORD_ENV).is_none());

        // last_sync updated on the successful call only
        let synced = store.get_federation_peer("creds").unwrap();
        assert!(synced.last_sync.is_some());
    }

    #[test]
    fn test_with_peer_credentials_unknown_peer_propagates() {
        let (_dir, mut store) = file_store();
        let result = store.with_peer_credentials("ghost", || Ok(()));
        assert!(matches!(result, Err(BeadsError::NotFound { .. })));
    }
}
