//! Version utilities and the version-tracking check.

use std::fs;
use std::path::Path;

use super::{CheckStatus, DoctorCheck};

/// Name of the version tracking file inside `.beads/`.
const LOCAL_VERSION_FILE: &str = ".local_version";

/// Minor-version lag before the tracked version counts as very old.
const MINOR_LAG_THRESHOLD: i64 = 10;

/// Parse the leading numeric dot-separated components of a version.
///
/// Stops at the first component that is not a plain number; an empty
/// string yields an empty vector.
#[must_use]
pub fn parse_version_parts(version: &str) -> Vec<i64> {
    let mut parts = Vec::new();
    for component in version.split('.') {
        match component.parse::<i64>() {
            Ok(n) if !component.is_empty() => parts.push(n),
            _ => break,
        }
    }
    parts
}

/// Compare two versions component-wise as integers.
///
/// Missing components are treated as 0, so `1.0` equals `1.0.0`.
/// Returns -1, 0, or 1.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> i32 {
    let parts_a = parse_version_parts(a);
    let parts_b = parse_version_parts(b);
    let len = parts_a.len().max(parts_b.len());

    for i in 0..len {
        let x = parts_a.get(i).copied().unwrap_or(0);
        let y = parts_b.get(i).copied().unwrap_or(0);
        if x < y {
            return -1;
        }
        if x > y {
            return 1;
        }
    }
    0
}

/// Whether a string is a valid 1-3 component numeric version.
#[must_use]
pub fn is_valid_semver(version: &str) -> bool {
    if version.is_empty() {
        return false;
    }
    let components: Vec<&str> = version.split('.').collect();
    if components.is_empty() || components.len() > 3 {
        return false;
    }
    components
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_digit()))
}

/// Truncate an identifier to at most 8 characters for display.
///
/// Safe on short and empty input.
#[must_use]
pub fn truncate_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Check the `.local_version` tracking file against the running version.
///
/// Warns when the file is missing, empty, or malformed, and when the
/// tracked version is ten or more minor versions behind or on a
/// different major. Never panics on versions with fewer than three
/// components.
#[must_use]
pub fn check_metadata_version_tracking(beads_dir: &Path, current: &str) -> DoctorCheck {
    let name = "Version Tracking";
    let category = "version";
    let path = beads_dir.join(LOCAL_VERSION_FILE);

    let Ok(contents) = fs::read_to_string(&path) else {
        return DoctorCheck::new(
            name,
            CheckStatus::Warning,
            "Version tracking not initialized",
            category,
        );
    };

    let stored = contents.trim();
    if stored.is_empty() {
        return DoctorCheck::new(
            name,
            CheckStatus::Warning,
            ".local_version file is empty",
            category,
        );
    }

    if !is_valid_semver(stored) {
        return DoctorCheck::new(
            name,
            CheckStatus::Warning,
            format!("Invalid version format: {stored}"),
            category,
        );
    }

    let stored_parts = parse_version_parts(stored);
    let current_parts = parse_version_parts(current);
    let part = |parts: &[i64], i: usize| parts.get(i).copied().unwrap_or(0);

    let major_differs = part(&stored_parts, 0) != part(&current_parts, 0);
    let minor_lag = part(&current_parts, 1) - part(&stored_parts, 1);

    if major_differs || minor_lag >= MINOR_LAG_THRESHOLD {
        return DoctorCheck::new(
            name,
            CheckStatus::Warning,
            format!("Local version {stored} is very old (current {current})"),
            category,
        );
    }

    DoctorCheck::new(
        name,
        CheckStatus::Ok,
        format!("Version tracking active ({stored})"),
        category,
    )
}
