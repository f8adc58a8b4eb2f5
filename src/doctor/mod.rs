//! Read-only integrity checks.
//!
//! Doctor checks never propagate failures: an internal error becomes a
//! check result with a descriptive message, so one broken subsystem
//! cannot hide the rest of the report.

mod version;

pub use version::{
    check_metadata_version_tracking, compare_versions, is_valid_semver, parse_version_parts,
    truncate_id,
};

use crate::storage::BeadStore;
use crate::util::id::is_hash_id;
use rusqlite::OptionalExtension;
use serde::Serialize;
use std::path::Path;

/// Check result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

/// A single doctor check result.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub category: String,
}

impl DoctorCheck {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        status: CheckStatus,
        message: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            category: category.into(),
        }
    }
}

/// Audit issue IDs: hash-based vs sequential.
#[must_use]
pub fn check_id_format(store: Option<&BeadStore>) -> DoctorCheck {
    let name = "Issue IDs";
    let category = "integrity";

    let Some(store) = store else {
        return DoctorCheck::new(name, CheckStatus::Warning, "N/A (no database)", category);
    };

    let Ok(ids) = store.get_all_ids() else {
        return DoctorCheck::new(
            name,
            CheckStatus::Warning,
            "N/A (unable to query issues)",
            category,
        );
    };

    let hash_count = ids.iter().filter(|id| is_hash_id(id)).count();
    let sequential_count = ids.len() - hash_count;

    DoctorCheck::new(
        name,
        CheckStatus::Ok,
        format!("{hash_count} hash-based, {sequential_count} sequential"),
        category,
    )
}

/// Run cycle detection over the blocks subgraph.
#[must_use]
pub fn check_dependency_cycles(store: Option<&BeadStore>) -> DoctorCheck {
    let name = "Dependency Cycles";
    let category = "integrity";

    let Some(store) = store else {
        return DoctorCheck::new(name, CheckStatus::Ok, "N/A (no database)", category);
    };

    match store.detect_all_cycles() {
        Ok(cycles) if cycles.is_empty() => {
            DoctorCheck::new(name, CheckStatus::Ok, "No dependency cycles", category)
        }
        Ok(cycles) => DoctorCheck::new(
            name,
            CheckStatus::Error,
            format!("{} dependency cycle(s) detected", cycles.len()),
            category,
        ),
        Err(_) => DoctorCheck::new(
            name,
            CheckStatus::Warning,
            "N/A (unable to query dependencies)",
            category,
        ),
    }
}

/// Detect duplicate open issues.
///
/// Issues are grouped by `(title, description, design,
/// acceptance_criteria)`; closed issues never count. In gastown mode
/// duplicate totals under `threshold` are tolerated (wisp-heavy
/// workflows generate routine near-duplicates).
#[must_use]
pub fn check_duplicate_issues(
    store: Option<&BeadStore>,
    gastown: bool,
    threshold: i64,
) -> DoctorCheck {
    let name = "Duplicate Issues";
    let category = "integrity";

    let Some(store) = store else {
        return DoctorCheck::new(name, CheckStatus::Warning, "N/A (no database)", category);
    };

    let result = store
        .conn
        .query_row(
            "SELECT COUNT(*), SUM(cnt - 1) FROM (
                 SELECT COUNT(*) AS cnt FROM issues
                 WHERE status != 'closed'
                 GROUP BY title, description, design, acceptance_criteria
                 HAVING COUNT(*) > 1
             )",
            [],
            |row| {
                // SUM over the empty set is NULL; read it as zero
                let groups: i64 = row.get(0)?;
                let dups: Option<i64> = row.get(1)?;
                Ok((groups, dups.unwrap_or(0)))
            },
        )
        .optional();

    let Ok(Some((groups, dups))) = result else {
        return DoctorCheck::new(
            name,
            CheckStatus::Warning,
            "N/A (unable to query issues)",
            category,
        );
    };

    if dups == 0 {
        return DoctorCheck::new(name, CheckStatus::Ok, "No duplicate issues", category);
    }

    if gastown && dups < threshold {
        return DoctorCheck::new(
            name,
            CheckStatus::Ok,
            format!("{dups} duplicate(s) detected (within gastown threshold of {threshold})"),
            category,
        );
    }

    DoctorCheck::new(
        name,
        CheckStatus::Warning,
        format!("{dups} duplicate issue(s) in {groups} group(s)"),
        category,
    )
}

/// Flag blocking edges from hierarchical children to their own parent.
///
/// A child whose `blocks` edge points at its parent deadlocks the
/// molecule: the parent waits for the child, the child waits for the
/// parent. Structural `parent-child` edges are ignored.
#[must_use]
pub fn check_child_parent_dependencies(store: Option<&BeadStore>) -> DoctorCheck {
    let name = "Child-Parent Dependencies";
    let category = "integrity";

    let Some(store) = store else {
        return DoctorCheck::new(name, CheckStatus::Ok, "N/A (no database)", category);
    };

    let count: Result<i64, _> = store.conn.query_row(
        "SELECT COUNT(*) FROM dependencies
         WHERE type = 'blocks' AND issue_id LIKE depends_on_id || '.%'",
        [],
        |row| row.get(0),
    );

    match count {
        Ok(0) => DoctorCheck::new(
            name,
            CheckStatus::Ok,
            "No child\u{2192}parent dependencies",
            category,
        ),
        Ok(n) => DoctorCheck::new(
            name,
            CheckStatus::Warning,
            format!("{n} child\u{2192}parent blocking dependencies (deadlock risk)"),
            category,
        ),
        Err(_) => DoctorCheck::new(
            name,
            CheckStatus::Warning,
            "N/A (unable to query dependencies)",
            category,
        ),
    }
}

/// Warn about a legacy deletions manifest.
#[must_use]
pub fn check_deletions_manifest(beads_dir: &Path) -> DoctorCheck {
    let name = "Deletions Manifest";
    let category = "sync";

    if beads_dir.join("deletions.jsonl").exists() {
        DoctorCheck::new(
            name,
            CheckStatus::Warning,
            "Legacy deletions.jsonl present; tombstones now live in the database",
            category,
        )
    } else {
        DoctorCheck::new(name, CheckStatus::Ok, "No legacy deletions manifest", category)
    }
}

/// Display a truncated repo identifier.
#[must_use]
pub fn check_repo_fingerprint(store: Option<&BeadStore>) -> DoctorCheck {
    let name = "Repo Fingerprint";
    let category = "database";

    let fingerprint = store.and_then(|store| store.get_metadata("repo_id").ok().flatten());

    match fingerprint {
        Some(id) => DoctorCheck::new(
            name,
            CheckStatus::Ok,
            format!("Repo {}", truncate_id(&id)),
            category,
        ),
        None => DoctorCheck::new(name, CheckStatus::Ok, "N/A (no database)", category),
    }
}

/// Git conflict markers cannot occur under the versioned SQL backend.
#[must_use]
pub fn check_git_conflicts() -> DoctorCheck {
    DoctorCheck::new(
        "Git Conflicts",
        CheckStatus::Ok,
        "N/A (Dolt backend handles conflicts natively)",
        "sync",
    )
}

/// Run the full read-only check suite.
#[must_use]
pub fn run_checks(
    store: Option<&BeadStore>,
    beads_dir: &Path,
    current_version: &str,
    gastown: bool,
    gastown_threshold: i64,
) -> Vec<DoctorCheck> {
    vec![
        check_id_format(store),
        check_dependency_cycles(store),
        check_duplicate_issues(store, gastown, gastown_threshold),
        check_child_parent_dependencies(store),
        check_deletions_manifest(beads_dir),
        check_repo_fingerprint(store),
        check_metadata_version_tracking(beads_dir, current_version),
        check_git_conflicts(),
    ]
}
