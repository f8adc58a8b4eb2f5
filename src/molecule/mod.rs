//! Molecule engine.
//!
//! A molecule is a parent-child rooted tree: the root is the ancestor
//! with no parent-child parent. When every child of a root closes, the
//! root is eligible to auto-close; roots left open with all children
//! closed are "stale" and surfaced for cleanup.

use crate::error::Result;
use crate::model::{BlockedIssue, StaleMolecule, Status};
use crate::storage::BeadStore;
use std::collections::HashMap;
use tracing::debug;

/// Close reason recorded when a molecule root auto-closes.
pub const AUTO_CLOSE_REASON: &str = "auto-closed: all children complete";

/// Options for [`find_stale_molecules`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StaleMoleculeFilters {
    /// Keep only roots that block at least one non-closed issue.
    pub blocking_only: bool,
    /// Keep only roots with no assignee.
    pub unassigned_only: bool,
    /// Also report roots that themselves have a parent-child parent.
    pub include_submolecules: bool,
}

/// Auto-close the molecule containing `changed_id` when complete.
///
/// Walks parent-child edges upward from `changed_id` to the molecule
/// root; no parent means no molecule and the call is a no-op, as is an
/// already-closed root. When every parent-child child of the root is
/// closed, the root is closed with [`AUTO_CLOSE_REASON`] and a
/// `status_changed` event.
///
/// Advisory: idempotent, safe to call from any status-change path, and
/// swallows every error so a failure here cannot poison the status
/// change that triggered it.
pub fn auto_close_completed_molecule(
    store: &mut BeadStore,
    changed_id: &str,
    actor: &str,
    session: &str,
) {
    if let Err(err) = try_auto_close(store, changed_id, actor, session) {
        debug!(issue_id = %changed_id, error = %err, "molecule auto-close skipped");
    }
}

fn try_auto_close(
    store: &mut BeadStore,
    changed_id: &str,
    actor: &str,
    session: &str,
) -> Result<()> {
    let Some(root_id) = resolve_molecule_root(store, changed_id)? else {
        return Ok(());
    };

    let Some(root) = store.get_issue(&root_id)? else {
        return Ok(());
    };
    if root.status == Status::Closed {
        return Ok(());
    }

    let children = store.get_children(&root_id)?;
    if children.is_empty() {
        return Ok(());
    }
    if children.iter().any(|child| child.status != Status::Closed) {
        return Ok(());
    }

    store.close_issue(&root_id, AUTO_CLOSE_REASON, actor, session)?;
    debug!(root_id = %root_id, "molecule auto-closed");
    Ok(())
}

/// Walk parent-child edges upward to the molecule root.
///
/// Returns `None` when `changed_id` has no parent-child parent. The
/// walk is bounded to tolerate accidental parent cycles.
fn resolve_molecule_root(store: &BeadStore, changed_id: &str) -> Result<Option<String>> {
    const MAX_DEPTH: usize = 64;

    let Some(mut current) = store.get_parent_id(changed_id)? else {
        return Ok(None);
    };

    for _ in 0..MAX_DEPTH {
        match store.get_parent_id(&current)? {
            Some(parent) if parent != current => current = parent,
            _ => break,
        }
    }

    Ok(Some(current))
}

/// Find open molecule roots whose parent-child children are all closed.
///
/// # Errors
///
/// Returns an error if the underlying queries fail.
pub fn find_stale_molecules(
    store: &BeadStore,
    filters: StaleMoleculeFilters,
) -> Result<Vec<StaleMolecule>> {
    let mut stale = Vec::new();

    for issue in store.list_issues(&crate::storage::ListFilters::default())? {
        if issue.status == Status::Closed {
            continue;
        }

        if !filters.include_submolecules && store.get_parent_id(&issue.id)?.is_some() {
            continue;
        }

        let children = store.get_children(&issue.id)?;
        if children.is_empty() {
            continue;
        }
        let closed_children = children
            .iter()
            .filter(|child| child.status == Status::Closed)
            .count();
        if closed_children < children.len() {
            continue;
        }

        if filters.unassigned_only && issue.assignee.is_some() {
            continue;
        }

        let blocking_count = store.blocking_count(&issue.id)?;
        if filters.blocking_only && blocking_count == 0 {
            continue;
        }

        stale.push(StaleMolecule {
            total_children: children.len(),
            closed_children,
            blocking_count,
            issue,
        });
    }

    Ok(stale)
}

/// Invert the blocked-by relation: for each blocked issue, map every
/// blocker to the list of issues it blocks.
#[must_use]
pub fn build_blocking_map(blocked: &[BlockedIssue]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for entry in blocked {
        for blocker in &entry.blocked_by {
            map.entry(blocker.clone())
                .or_default()
                .push(entry.issue.id.clone());
        }
    }
    map
}
