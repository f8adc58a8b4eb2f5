//! ID rename cascades.
//!
//! The `id` column is the primary key of the issues/wisps relations and
//! many satellite tables reference it, so referential-integrity
//! enforcement is suspended for the duration of the cascade. The
//! enforcement toggle is a connection-scoped setting: rollback does not
//! restore it, and SQLite ignores the pragma while a transaction is
//! pending, so the toggle brackets the transaction and is re-enabled on
//! every exit path.

use crate::error::{BeadsError, Result};
use crate::model::Issue;
use rusqlite::{params, Transaction};

use super::sqlite::BeadStore;

impl BeadStore {
    /// Rename an issue or wisp and every reference to it, atomically.
    ///
    /// The old ID is classified by probing the wisps relation. For a
    /// regular issue the cascade touches both namespaces, because wisps
    /// may reference permanent issues; for a wisp only the wisp-side
    /// tables are rewritten. A `renamed` event with
    /// `(old_value, new_value) = (old_id, new_id)` lands in the events
    /// table of the renamed record's namespace.
    ///
    /// # Errors
    ///
    /// `NotFound` when `old_id` matches no row; any database error rolls
    /// the cascade back with enforcement restored.
    pub fn update_issue_id(
        &mut self,
        old_id: &str,
        new_id: &str,
        issue: &Issue,
        actor: &str,
    ) -> Result<()> {
        let is_wisp = self.is_wisp(old_id)?;

        self.conn.pragma_update(None, "foreign_keys", "OFF")?;

        let outcome = (|| -> Result<()> {
            let tx = self.conn.transaction()?;
            if is_wisp {
                rename_wisp(&tx, old_id, new_id, issue, actor)?;
            } else {
                rename_issue(&tx, old_id, new_id, issue, actor)?;
            }
            tx.commit()?;
            Ok(())
        })();

        // Restore enforcement whether the cascade committed or not.
        let restore = self.conn.pragma_update(None, "foreign_keys", "ON");

        outcome?;
        restore?;
        Ok(())
    }

    /// Rewrite the prefix of every dependency row whose `issue_id` or
    /// `depends_on_id` starts with `old_prefix`, preserving the suffix.
    ///
    /// Migration helper; not atomic with other renames.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn rename_dependency_prefix(&mut self, old_prefix: &str, new_prefix: &str) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "UPDATE dependencies
             SET issue_id = ?1 || substr(issue_id, length(?2) + 1)
             WHERE issue_id LIKE ?2 || '%'",
            params![new_prefix, old_prefix],
        )?;

        tx.execute(
            "UPDATE dependencies
             SET depends_on_id = ?1 || substr(depends_on_id, length(?2) + 1)
             WHERE depends_on_id LIKE ?2 || '%'",
            params![new_prefix, old_prefix],
        )?;

        tx.commit()?;
        Ok(())
    }
}

/// Rename a regular issue and every reference in both namespaces.
fn rename_issue(
    tx: &Transaction<'_>,
    old_id: &str,
    new_id: &str,
    issue: &Issue,
    actor: &str,
) -> Result<()> {
    let affected = tx.execute(
        "UPDATE issues
         SET id = ?1, title = ?2, description = ?3, design = ?4,
             acceptance_criteria = ?5, notes = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            new_id,
            issue.title,
            issue.description.as_deref().unwrap_or(""),
            issue.design.as_deref().unwrap_or(""),
            issue.acceptance_criteria.as_deref().unwrap_or(""),
            issue.notes.as_deref().unwrap_or(""),
            chrono::Utc::now().to_rfc3339(),
            old_id,
        ],
    )?;
    if affected == 0 {
        return Err(BeadsError::not_found(format!("issue {old_id}")));
    }

    tx.execute(
        "UPDATE dependencies SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE dependencies SET depends_on_id = ?1 WHERE depends_on_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE events SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE labels SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE comments SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE issue_snapshots SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE compaction_snapshots SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE child_counters SET parent_id = ?1 WHERE parent_id = ?2",
        params![new_id, old_id],
    )?;

    // Wisps may reference permanent issues
    tx.execute(
        "UPDATE wisp_dependencies SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE wisp_dependencies SET depends_on_id = ?1 WHERE depends_on_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE wisp_events SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE wisp_labels SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE wisp_comments SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;

    tx.execute(
        "INSERT INTO events (issue_id, event_type, actor, old_value, new_value, created_at)
         VALUES (?1, 'renamed', ?2, ?3, ?1, ?4)",
        params![new_id, actor, old_id, chrono::Utc::now().to_rfc3339()],
    )?;

    Ok(())
}

/// Rename a wisp and its wisp-side references.
fn rename_wisp(
    tx: &Transaction<'_>,
    old_id: &str,
    new_id: &str,
    issue: &Issue,
    actor: &str,
) -> Result<()> {
    let affected = tx.execute(
        "UPDATE wisps
         SET id = ?1, title = ?2, description = ?3, design = ?4,
             acceptance_criteria = ?5, notes = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            new_id,
            issue.title,
            issue.description.as_deref().unwrap_or(""),
            issue.design.as_deref().unwrap_or(""),
            issue.acceptance_criteria.as_deref().unwrap_or(""),
            issue.notes.as_deref().unwrap_or(""),
            chrono::Utc::now().to_rfc3339(),
            old_id,
        ],
    )?;
    if affected == 0 {
        return Err(BeadsError::not_found(format!("wisp {old_id}")));
    }

    tx.execute(
        "UPDATE wisp_dependencies SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE wisp_dependencies SET depends_on_id = ?1 WHERE depends_on_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE wisp_events SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE wisp_labels SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;
    tx.execute(
        "UPDATE wisp_comments SET issue_id = ?1 WHERE issue_id = ?2",
        params![new_id, old_id],
    )?;

    tx.execute(
        "INSERT INTO wisp_events (issue_id, event_type, actor, old_value, new_value, created_at)
         VALUES (?1, 'renamed', ?2, ?3, ?1, ?4)",
        params![new_id, actor, old_id, chrono::Utc::now().to_rfc3339()],
    )?;

    Ok(())
}
