//! Configuration for `beadstore`.
//!
//! The only configuration file the engine itself reads is
//! `<repo>/.beads/metadata.json`; everything else (CLI overrides,
//! environment) belongs to the consumer.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default local database filename (sqlite backend only).
const DEFAULT_DB_FILENAME: &str = "beads.db";
/// Default server-side database name (dolt backend).
const DEFAULT_DOLT_DATABASE: &str = "beads";
/// The JSONL export reconciled by the staleness tracker.
pub const JSONL_EXPORT_FILENAME: &str = "issues.jsonl";

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    #[default]
    Dolt,
}

/// Startup metadata describing which database backs this workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    /// Local database filename, sqlite backend only.
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub backend: Backend,
    /// Server-side database name, dolt backend only.
    #[serde(default)]
    pub dolt_database: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            database: DEFAULT_DB_FILENAME.to_string(),
            backend: Backend::default(),
            dolt_database: DEFAULT_DOLT_DATABASE.to_string(),
        }
    }
}

impl Metadata {
    /// Load metadata.json from the beads directory.
    ///
    /// A missing file yields the defaults; empty fields are backfilled.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(beads_dir: &Path) -> Result<Self> {
        let path = beads_dir.join("metadata.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)?;
        let mut metadata: Self = serde_json::from_str(&contents)?;

        if metadata.database.trim().is_empty() {
            metadata.database = DEFAULT_DB_FILENAME.to_string();
        }
        if metadata.dolt_database.trim().is_empty() {
            metadata.dolt_database = DEFAULT_DOLT_DATABASE.to_string();
        }

        Ok(metadata)
    }

    /// Persist metadata.json into the beads directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, beads_dir: &Path) -> Result<()> {
        fs::create_dir_all(beads_dir)?;
        let path = beads_dir.join("metadata.json");
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

/// Discover the active `.beads` directory by walking up from `start`
/// (or the current directory when `start` is `None`).
#[must_use]
pub fn discover_beads_dir(start: Option<&Path>) -> Option<PathBuf> {
    let origin = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir().ok()?,
    };

    let mut current = origin.as_path();
    loop {
        let candidate = current.join(".beads");
        if candidate.is_dir() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_metadata_defaults() {
        let dir = TempDir::new().unwrap();
        let metadata = Metadata::load(dir.path()).unwrap();
        assert_eq!(metadata.database, "beads.db");
        assert_eq!(metadata.backend, Backend::Dolt);
        assert_eq!(metadata.dolt_database, "beads");
    }

    #[test]
    fn test_load_backfills_empty_fields() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("metadata.json"),
            r#"{"database": "", "backend": "sqlite"}"#,
        )
        .unwrap();
        let metadata = Metadata::load(dir.path()).unwrap();
        assert_eq!(metadata.database, "beads.db");
        assert_eq!(metadata.backend, Backend::Sqlite);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let beads_dir = dir.path().join(".beads");
        let metadata = Metadata {
            database: "local.db".to_string(),
            backend: Backend::Sqlite,
            dolt_database: "town".to_string(),
        };
        metadata.save(&beads_dir).unwrap();
        let loaded = Metadata::load(&beads_dir).unwrap();
        assert_eq!(loaded, metadata);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("metadata.json"), "{not json").unwrap();
        assert!(Metadata::load(dir.path()).is_err());
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = TempDir::new().unwrap();
        let beads = dir.path().join(".beads");
        fs::create_dir_all(&beads).unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();

        let found = discover_beads_dir(Some(&nested)).unwrap();
        assert_eq!(found.canonicalize().unwrap(), beads.canonicalize().unwrap());
    }

    #[test]
    fn test_discover_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(discover_beads_dir(Some(dir.path())).is_none());
    }
}
