//! Staleness tracking between the database and the JSONL export.
//!
//! The store coexists with an optional `issues.jsonl` export that other
//! tools (and git merges) may rewrite. The reserved metadata key
//! `last_import_time` records when the database was last reconciled with
//! that file; a newer file mtime means the export changed underneath the
//! database and read paths should refuse to serve stale data.

use crate::config::JSONL_EXPORT_FILENAME;
use crate::error::{BeadsError, Result};
use crate::storage::BeadStore;
use crate::util::time::parse_import_timestamp;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::warn;

/// Reserved metadata key for the last reconciliation instant.
pub const LAST_IMPORT_TIME_KEY: &str = "last_import_time";

/// Check that the database is not stale relative to `issues.jsonl`.
///
/// Passes (returns `Ok`) when the export file does not exist, when no
/// `last_import_time` is recorded, or when the recorded instant is at or
/// after the file's mtime. An unparsable timestamp is advisory: it logs
/// a warning and passes.
///
/// # Errors
///
/// `Stale` when the export was modified after the last reconciliation.
pub fn check_database_freshness(store: &BeadStore, beads_dir: &Path) -> Result<()> {
    let jsonl_path = beads_dir.join(JSONL_EXPORT_FILENAME);
    if !jsonl_path.exists() {
        return Ok(());
    }

    let Some(last_import) = store.get_metadata(LAST_IMPORT_TIME_KEY)? else {
        return Ok(());
    };

    let Some(import_time) = parse_import_timestamp(&last_import) else {
        warn!(
            value = %last_import,
            "unparsable last_import_time metadata, skipping freshness check"
        );
        return Ok(());
    };

    let mtime = fs::metadata(&jsonl_path)?.modified()?;
    let import_sys_time = SystemTime::from(import_time);

    if mtime > import_sys_time {
        return Err(BeadsError::Stale(format!(
            "{} was modified after the last import; run an import to reconcile",
            jsonl_path.display()
        )));
    }

    Ok(())
}

/// Record that the database was just reconciled with `issues.jsonl`.
///
/// A no-op when the export file does not exist; failures are advisory
/// and logged rather than surfaced, so a metadata hiccup cannot fail the
/// write path that called this.
pub fn refresh_last_import_time(store: &mut BeadStore, beads_dir: &Path) {
    let jsonl_path = beads_dir.join(JSONL_EXPORT_FILENAME);
    if !jsonl_path.exists() {
        return;
    }

    let now = Utc::now().to_rfc3339();
    if let Err(err) = store.set_metadata(LAST_IMPORT_TIME_KEY, &now) {
        warn!(error = %err, "failed to refresh last_import_time");
    }
}

/// Whether a command reads issue data and should run the freshness
/// check first. Write commands skip the check: they reconcile instead.
#[must_use]
pub fn is_read_only_command(cmd: &str) -> bool {
    matches!(
        cmd,
        "list"
            | "show"
            | "ready"
            | "stats"
            | "search"
            | "duplicates"
            | "blocked"
            | "count"
            | "graph"
            | "comments"
    )
}
