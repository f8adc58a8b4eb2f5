//! Ephemeral wisps.
//!
//! Wisps share the issue attribute surface but live in a parallel table
//! set (`wisps`, `wisp_dependencies`, `wisp_events`, `wisp_labels`,
//! `wisp_comments`) so they can be burned in bulk without touching the
//! permanent namespace. Cross-references between a wisp and a permanent
//! issue are allowed in either direction.

use crate::error::{BeadsError, Result};
use crate::model::{BurnResult, Dependency, Event, EventType, Issue};
use crate::storage::events::{self, EventTable};
use crate::storage::sqlite::{insert_issue_row, issue_from_row, BeadStore, ISSUE_COLUMNS};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

impl BeadStore {
    /// Create a wisp, assigning an ID when the wisp has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (e.g. ID collision).
    pub fn create_wisp(&mut self, wisp: &mut Issue, actor: &str) -> Result<()> {
        if wisp.id.is_empty() {
            wisp.id = self.generate_wisp_id(wisp)?;
        } else if self.id_exists(&wisp.id)? {
            // An ID has exactly one representation across issues and wisps
            return Err(BeadsError::validation(
                "id",
                format!("{} already exists", wisp.id),
            ));
        }

        let tx = self.conn.transaction()?;
        insert_issue_row(&tx, "wisps", wisp)?;
        events::insert_event(
            &tx,
            EventTable::Wisps,
            &wisp.id,
            &EventType::Created,
            actor,
            None,
            None,
        )?;
        tx.commit()?;
        Ok(())
    }

    fn generate_wisp_id(&self, wisp: &Issue) -> Result<String> {
        let prefix = self
            .get_config("issue_prefix")?
            .unwrap_or_else(|| "bd".to_string());
        let generator =
            crate::util::id::IdGenerator::new(crate::util::id::IdConfig::with_prefix(prefix));
        let count = self.count_issues()?;
        Ok(generator.generate(
            &wisp.title,
            wisp.created_by.as_deref(),
            wisp.created_at,
            count,
            |candidate| self.id_exists(candidate).unwrap_or(false),
        ))
    }

    /// Whether an ID names a row in the wisps relation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn is_wisp(&self, id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM wisps WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get a wisp by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_wisp(&self, id: &str) -> Result<Option<Issue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM wisps WHERE id = ?1");
        let wisp = self
            .conn
            .query_row(&sql, params![id], issue_from_row)
            .optional()?;
        Ok(wisp)
    }

    /// Add a dependency edge in the wisp namespace. Either endpoint may
    /// be a permanent issue.
    ///
    /// # Errors
    ///
    /// Returns `SelfDependency` on self-loops, or a database error.
    pub fn add_wisp_dependency(&mut self, dep: &Dependency, actor: &str) -> Result<()> {
        if dep.issue_id == dep.depends_on_id {
            return Err(BeadsError::SelfDependency {
                id: dep.issue_id.clone(),
            });
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO wisp_dependencies (issue_id, depends_on_id, type, created_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                dep.issue_id,
                dep.depends_on_id,
                dep.dep_type.as_str(),
                dep.created_at.to_rfc3339(),
                dep.created_by,
            ],
        )?;
        events::insert_event(
            &tx,
            EventTable::Wisps,
            &dep.issue_id,
            &EventType::DepAdded,
            actor,
            None,
            Some(&dep.depends_on_id),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Add a label in the wisp namespace. Returns false when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub fn add_wisp_label(&mut self, wisp_id: &str, label: &str, actor: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let affected = tx.execute(
            "INSERT OR IGNORE INTO wisp_labels (issue_id, label) VALUES (?1, ?2)",
            params![wisp_id, label],
        )?;
        if affected > 0 {
            events::insert_event(
                &tx,
                EventTable::Wisps,
                wisp_id,
                &EventType::LabelAdded,
                actor,
                None,
                Some(label),
            )?;
        }
        tx.commit()?;
        Ok(affected > 0)
    }

    /// Labels on a wisp, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_wisp_labels(&self, wisp_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label FROM wisp_labels WHERE issue_id = ?1 ORDER BY label")?;
        let rows = stmt.query_map(params![wisp_id], |row| row.get::<_, String>(0))?;
        let mut labels = Vec::new();
        for row in rows {
            labels.push(row?);
        }
        Ok(labels)
    }

    /// Add a comment in the wisp namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub fn add_wisp_comment(&mut self, wisp_id: &str, author: &str, text: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO wisp_comments (issue_id, author, text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![wisp_id, author, text, chrono::Utc::now().to_rfc3339()],
        )?;
        events::insert_event(
            &tx,
            EventTable::Wisps,
            wisp_id,
            &EventType::CommentAdded,
            author,
            None,
            None,
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Events for a wisp, newest first. `limit` of 0 means no limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_wisp_events(&self, wisp_id: &str, limit: usize) -> Result<Vec<Event>> {
        events::get_events(&self.conn, EventTable::Wisps, wisp_id, limit)
    }

    /// Burn wisps: bulk-delete each listed wisp and its satellite rows.
    ///
    /// IDs that do not name a wisp are skipped; deletion continues past
    /// failures so valid IDs are removed regardless of earlier invalid
    /// ones. Each wisp is deleted in its own transaction, so aborting
    /// between rows leaves prior deletions committed.
    ///
    /// # Errors
    ///
    /// Returns an error only when a transaction cannot be started at all.
    pub fn burn_wisps(&mut self, ids: &[String]) -> Result<BurnResult> {
        let mut result = BurnResult::default();

        for id in ids {
            match self.burn_single_wisp(id) {
                Ok(true) => {
                    result.deleted_count += 1;
                    result.deleted_ids.push(id.clone());
                }
                Ok(false) => {
                    debug!(wisp_id = %id, "burn target is not a wisp, skipping");
                }
                Err(err) => {
                    debug!(wisp_id = %id, error = %err, "failed to burn wisp, continuing");
                }
            }
        }

        Ok(result)
    }

    fn burn_single_wisp(&mut self, id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM wisps WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Ok(false);
        }
        tx.execute(
            "DELETE FROM wisp_dependencies WHERE issue_id = ?1 OR depends_on_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM wisp_events WHERE issue_id = ?1", params![id])?;
        tx.execute("DELETE FROM wisp_labels WHERE issue_id = ?1", params![id])?;
        tx.execute("DELETE FROM wisp_comments WHERE issue_id = ?1", params![id])?;
        tx.commit()?;
        Ok(true)
    }
}
