//! The opaque interface to the underlying versioned engine.
//!
//! The engine's branch/merge machinery is not implemented here; the store
//! only consumes remote registration, commit, and fetch/push. Credentials
//! for these primitives travel through process environment variables and
//! are scoped by the federation manager.

use crate::error::{BeadsError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Commit messages the engine reports when the working set is clean.
/// Treated as success everywhere.
const NOTHING_TO_COMMIT: &str = "nothing to commit";

/// Remote-sync primitives of the underlying versioned engine.
pub trait RemoteEngine: Send {
    /// Register a named remote. Implementations surface "already exists"
    /// as an error; callers decide whether to ignore it.
    fn add_remote(&self, name: &str, url: &str) -> Result<()>;

    /// Remove a named remote.
    fn remove_remote(&self, name: &str) -> Result<()>;

    /// Commit the pending change-set with the given message.
    ///
    /// A clean working set is not an error; implementations normalize
    /// "nothing to commit" to `Ok`.
    fn commit(&self, message: &str) -> Result<()>;

    /// Fetch from a named remote.
    fn fetch(&self, remote: &str) -> Result<()>;

    /// Push to a named remote.
    fn push(&self, remote: &str) -> Result<()>;
}

/// Whether an engine error means the remote is already registered.
#[must_use]
pub fn is_already_exists(err: &BeadsError) -> bool {
    err.to_string().contains("already exists")
}

/// Whether an engine message means there was nothing to commit.
#[must_use]
pub fn is_nothing_to_commit(message: &str) -> bool {
    message.contains(NOTHING_TO_COMMIT)
}

/// In-process remote registry.
///
/// Backs the sqlite backend, where the relational store has no native
/// versioning: remotes are tracked for the federation manager and commits
/// are accepted unconditionally. A server-backed engine implements the
/// same trait over its SQL procedures.
#[derive(Debug, Default)]
pub struct LocalRemotes {
    inner: Mutex<HashMap<String, String>>,
}

impl LocalRemotes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a registered remote's URL.
    #[must_use]
    pub fn remote_url(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of all registered remotes, sorted.
    #[must_use]
    pub fn remote_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl RemoteEngine for LocalRemotes {
    fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        let mut remotes = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if remotes.contains_key(name) {
            return Err(BeadsError::Remote {
                peer: name.to_string(),
                message: format!("remote '{name}' already exists"),
            });
        }
        remotes.insert(name.to_string(), url.to_string());
        Ok(())
    }

    fn remove_remote(&self, name: &str) -> Result<()> {
        let mut remotes = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if remotes.remove(name).is_none() {
            return Err(BeadsError::Remote {
                peer: name.to_string(),
                message: format!("remote '{name}' not found"),
            });
        }
        Ok(())
    }

    fn commit(&self, _message: &str) -> Result<()> {
        // The embedded backend commits through the relational layer; the
        // versioned change-set is a server-side concept.
        Ok(())
    }

    fn fetch(&self, remote: &str) -> Result<()> {
        let remotes = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if remotes.contains_key(remote) {
            Ok(())
        } else {
            Err(BeadsError::Remote {
                peer: remote.to_string(),
                message: format!("remote '{remote}' not found"),
            })
        }
    }

    fn push(&self, remote: &str) -> Result<()> {
        let remotes = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if remotes.contains_key(remote) {
            Ok(())
        } else {
            Err(BeadsError::Remote {
                peer: remote.to_string(),
                message: format!("remote '{remote}' not found"),
            })
        }
    }
}
