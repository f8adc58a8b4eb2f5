//! The relational store.
//!
//! `BeadStore` owns the connection, the opaque versioned-engine handle,
//! and the credential key. Mutations run through the `mutate` protocol:
//! a single transaction that buffers audit events and writes them before
//! commit, so row changes and their events are observed atomically.

use crate::error::{BeadsError, Result};
use crate::model::{
    BlockedIssue, Comment, Dependency, DependencyType, Event, EventType, Issue, IssueType,
    Priority, Status,
};
use crate::storage::events::{self, EventTable};
use crate::storage::remote::{is_nothing_to_commit, LocalRemotes, RemoteEngine};
use crate::storage::schema::apply_schema;
use crate::util::id::{child_id, IdConfig, IdGenerator};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SQLite-backed storage engine.
pub struct BeadStore {
    pub(crate) conn: Connection,
    /// Directory holding the database file; `None` for in-memory stores.
    /// The credential key file lives here.
    pub(crate) db_dir: Option<PathBuf>,
    /// AES-256 key for peer passwords, loaded lazily.
    pub(crate) credential_key: Option<Vec<u8>>,
    pub(crate) remotes: Box<dyn RemoteEngine>,
}

impl std::fmt::Debug for BeadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeadStore")
            .field("db_dir", &self.db_dir)
            .field("has_credential_key", &self.credential_key.is_some())
            .finish_non_exhaustive()
    }
}

/// Context for a mutation operation, buffering audit events.
pub struct MutationContext {
    pub op_name: String,
    pub actor: String,
    pub events: Vec<Event>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event with old and new values.
    pub fn record_event(
        &mut self,
        event_type: EventType,
        issue_id: &str,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(Event {
            id: 0, // DB assigns the rowid
            issue_id: issue_id.to_string(),
            event_type,
            actor: self.actor.clone(),
            old_value,
            new_value,
            created_at: Utc::now(),
        });
    }
}

impl BeadStore {
    /// Open a store at the given database file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema
    /// application fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open with an optional busy timeout (ms).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema
    /// application fails.
    pub fn open_with_timeout(path: &Path, lock_timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        if let Some(timeout) = lock_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        }
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            db_dir: path.parent().map(Path::to_path_buf),
            credential_key: None,
            remotes: Box::new(LocalRemotes::new()),
        })
    }

    /// Open an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            db_dir: None,
            credential_key: None,
            remotes: Box::new(LocalRemotes::new()),
        })
    }

    /// Replace the versioned-engine handle.
    pub fn set_remote_engine(&mut self, engine: Box<dyn RemoteEngine>) {
        self.remotes = engine;
    }

    /// Access the versioned-engine handle.
    #[must_use]
    pub fn remote_engine(&self) -> &dyn RemoteEngine {
        self.remotes.as_ref()
    }

    /// Commit the pending change-set on the underlying engine.
    ///
    /// "Nothing to commit" is success.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the commit for any other
    /// reason.
    pub fn commit(&self, message: &str) -> Result<()> {
        match self.remotes.commit(message) {
            Ok(()) => Ok(()),
            Err(err) if is_nothing_to_commit(&err.to_string()) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Execute a mutation: run the closure inside a transaction, then
    /// flush its buffered events before commit.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; the transaction is rolled back.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in ctx.events {
            tx.execute(
                "INSERT INTO events (issue_id, event_type, actor, old_value, new_value, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.issue_id,
                    event.event_type.as_str(),
                    event.actor,
                    event.old_value,
                    event.new_value,
                    event.created_at.to_rfc3339()
                ],
            )?;
        }

        tx.commit()?;

        Ok(result)
    }

    // ===== Issue CRUD =====

    /// Create a new issue, assigning an ID when the issue has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (e.g. ID collision).
    pub fn create_issue(&mut self, issue: &mut Issue, actor: &str) -> Result<()> {
        if issue.id.is_empty() {
            issue.id = self.generate_issue_id(issue)?;
        } else if self.id_exists(&issue.id)? {
            // An ID has exactly one representation across issues and wisps
            return Err(BeadsError::validation(
                "id",
                format!("{} already exists", issue.id),
            ));
        }

        let issue_ref = &*issue;
        self.mutate("create_issue", actor, |tx, ctx| {
            insert_issue_row(tx, "issues", issue_ref)?;
            ctx.record_event(EventType::Created, &issue_ref.id, None, None);
            Ok(())
        })
    }

    fn generate_issue_id(&self, issue: &Issue) -> Result<String> {
        let prefix = self
            .get_config("issue_prefix")?
            .unwrap_or_else(|| "bd".to_string());
        let generator = IdGenerator::new(IdConfig::with_prefix(prefix));
        let count = self.count_issues()?;
        Ok(generator.generate(
            &issue.title,
            issue.created_by.as_deref(),
            issue.created_at,
            count,
            |candidate| self.id_exists(candidate).unwrap_or(false),
        ))
    }

    /// Get an issue by ID, consulting the issues relation first and the
    /// wisps relation second.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        for table in ["issues", "wisps"] {
            let sql = format!("SELECT {ISSUE_COLUMNS} FROM {table} WHERE id = ?1");
            let issue = self
                .conn
                .query_row(&sql, params![id], issue_from_row)
                .optional()?;
            if issue.is_some() {
                return Ok(issue);
            }
        }
        Ok(None)
    }

    /// Update an issue's fields.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the issue doesn't exist.
    pub fn update_issue(&mut self, id: &str, updates: &IssueUpdate, actor: &str) -> Result<Issue> {
        let issue = self
            .get_issue(id)?
            .ok_or_else(|| BeadsError::not_found(format!("issue {id}")))?;

        if updates.is_empty() {
            return Ok(issue);
        }

        self.mutate("update_issue", actor, |tx, ctx| {
            let mut set_clauses: Vec<String> = vec![];
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![];

            let mut add_update = |field: &str, val: Box<dyn rusqlite::ToSql>| {
                set_clauses.push(format!("{field} = ?"));
                params_vec.push(val);
            };

            if let Some(ref title) = updates.title {
                add_update("title", Box::new(title.clone()));
            }
            if let Some(ref val) = updates.description {
                add_update(
                    "description",
                    Box::new(val.as_deref().unwrap_or("").to_string()),
                );
            }
            if let Some(ref val) = updates.design {
                add_update("design", Box::new(val.as_deref().unwrap_or("").to_string()));
            }
            if let Some(ref val) = updates.acceptance_criteria {
                add_update(
                    "acceptance_criteria",
                    Box::new(val.as_deref().unwrap_or("").to_string()),
                );
            }
            if let Some(ref val) = updates.notes {
                add_update("notes", Box::new(val.as_deref().unwrap_or("").to_string()));
            }
            if let Some(ref status) = updates.status {
                add_update("status", Box::new(status.as_str().to_string()));
                if *status != issue.status {
                    ctx.record_event(
                        EventType::StatusChanged,
                        id,
                        Some(issue.status.as_str().to_string()),
                        Some(status.as_str().to_string()),
                    );
                }
            }
            if let Some(priority) = updates.priority {
                add_update("priority", Box::new(priority.0));
            }
            if let Some(ref issue_type) = updates.issue_type {
                add_update("issue_type", Box::new(issue_type.as_str().to_string()));
            }
            if let Some(ref assignee_opt) = updates.assignee {
                add_update("assignee", Box::new(assignee_opt.clone()));
            }
            if let Some(ref val) = updates.close_reason {
                add_update(
                    "close_reason",
                    Box::new(val.as_deref().unwrap_or("").to_string()),
                );
            }
            if let Some(ref val) = updates.closed_by_session {
                add_update(
                    "closed_by_session",
                    Box::new(val.as_deref().unwrap_or("").to_string()),
                );
            }
            if let Some(ref val) = updates.closed_at {
                add_update("closed_at", Box::new(val.map(|d| d.to_rfc3339())));
            }

            set_clauses.push("updated_at = ?".to_string());
            params_vec.push(Box::new(Utc::now().to_rfc3339()));

            let sql = format!("UPDATE issues SET {} WHERE id = ?", set_clauses.join(", "));
            params_vec.push(Box::new(id.to_string()));

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(AsRef::as_ref).collect();
            tx.execute(&sql, params_refs.as_slice())?;

            Ok(())
        })?;

        self.get_issue(id)?
            .ok_or_else(|| BeadsError::not_found(format!("issue {id}")))
    }

    /// Close an issue: set status, closure metadata, and emit
    /// `status_changed` + `closed` events.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the issue doesn't exist.
    pub fn close_issue(
        &mut self,
        id: &str,
        reason: &str,
        actor: &str,
        session: &str,
    ) -> Result<()> {
        let issue = self
            .get_issue(id)?
            .ok_or_else(|| BeadsError::not_found(format!("issue {id}")))?;

        if issue.status == Status::Closed {
            return Ok(());
        }

        let old_status = issue.status.as_str().to_string();
        self.mutate("close_issue", actor, |tx, ctx| {
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "UPDATE issues
                 SET status = 'closed', closed_at = ?1, close_reason = ?2,
                     closed_by_session = ?3, updated_at = ?1
                 WHERE id = ?4",
                params![now, reason, session, id],
            )?;
            ctx.record_event(
                EventType::StatusChanged,
                id,
                Some(old_status),
                Some("closed".to_string()),
            );
            ctx.record_event(EventType::Closed, id, None, Some(reason.to_string()));
            Ok(())
        })
    }

    /// List issues matching the given filters, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_issues(&self, filters: &ListFilters) -> Result<Vec<Issue>> {
        let mut sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(ref status) = filters.status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }
        if filters.unassigned_only {
            sql.push_str(" AND (assignee IS NULL OR assignee = '')");
        } else if let Some(ref assignee) = filters.assignee {
            sql.push_str(" AND assignee = ?");
            params_vec.push(Box::new(assignee.clone()));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filters.limit {
            sql.push_str(" LIMIT ?");
            params_vec.push(Box::new(limit as i64));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(AsRef::as_ref).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), issue_from_row)?;

        let mut issues = Vec::new();
        for row in rows {
            issues.push(row?);
        }
        Ok(issues)
    }

    /// Check whether an ID exists in either namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn id_exists(&self, id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM issues WHERE id = ?1)
                  + (SELECT COUNT(*) FROM wisps WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Count permanent issues.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn count_issues(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| BeadsError::Transaction(e.to_string()))
    }

    /// All IDs across both namespaces, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_all_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM issues UNION SELECT id FROM wisps ORDER BY 1")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    // ===== Hierarchical IDs =====

    /// Allocate the next child ID for a parent by atomically incrementing
    /// its child counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be read or advanced.
    pub fn next_child_id(&mut self, parent_id: &str) -> Result<String> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO child_counters (parent_id, next_child_number) VALUES (?1, 1)
             ON CONFLICT(parent_id) DO NOTHING",
            params![parent_id],
        )?;
        let n: u32 = tx.query_row(
            "SELECT next_child_number FROM child_counters WHERE parent_id = ?1",
            params![parent_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE child_counters SET next_child_number = next_child_number + 1
             WHERE parent_id = ?1",
            params![parent_id],
        )?;
        tx.commit()?;
        Ok(child_id(parent_id, n))
    }

    // ===== Dependencies =====

    /// Add a dependency edge.
    ///
    /// Self-loops are rejected. For `blocks` edges the new edge is
    /// rejected when the target can already reach the source along
    /// `blocks` edges (cycle).
    ///
    /// # Errors
    ///
    /// `SelfDependency`, `Cycle`, or a validation error on duplicates.
    pub fn add_dependency(&mut self, dep: &Dependency, actor: &str) -> Result<()> {
        if dep.issue_id == dep.depends_on_id {
            return Err(BeadsError::SelfDependency {
                id: dep.issue_id.clone(),
            });
        }

        if self.dependency_exists(&dep.issue_id, &dep.depends_on_id)? {
            return Err(BeadsError::validation(
                "dependency",
                format!("{} -> {} already exists", dep.issue_id, dep.depends_on_id),
            ));
        }

        if dep.dep_type == DependencyType::Blocks
            && self.would_create_cycle(&dep.issue_id, &dep.depends_on_id)?
        {
            return Err(BeadsError::Cycle {
                path: format!("{} -> {}", dep.issue_id, dep.depends_on_id),
            });
        }

        self.mutate("add_dependency", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO dependencies (issue_id, depends_on_id, type, created_at, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    dep.issue_id,
                    dep.depends_on_id,
                    dep.dep_type.as_str(),
                    dep.created_at.to_rfc3339(),
                    dep.created_by,
                ],
            )?;
            ctx.record_event(
                EventType::DepAdded,
                &dep.issue_id,
                None,
                Some(dep.depends_on_id.clone()),
            );
            Ok(())
        })
    }

    /// Remove a dependency edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub fn remove_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        actor: &str,
    ) -> Result<bool> {
        self.mutate("remove_dependency", actor, |tx, ctx| {
            let affected = tx.execute(
                "DELETE FROM dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
                params![issue_id, depends_on_id],
            )?;
            if affected > 0 {
                ctx.record_event(
                    EventType::DepRemoved,
                    issue_id,
                    Some(depends_on_id.to_string()),
                    None,
                );
            }
            Ok(affected > 0)
        })
    }

    /// Whether an edge exists between two issues.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn dependency_exists(&self, issue_id: &str, depends_on_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
            params![issue_id, depends_on_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Out-edges of an issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_id, depends_on_id, type, created_at, created_by
             FROM dependencies WHERE issue_id = ?1 ORDER BY depends_on_id",
        )?;
        let rows = stmt.query_map(params![issue_id], dependency_from_row)?;
        let mut deps = Vec::new();
        for row in rows {
            deps.push(row?);
        }
        Ok(deps)
    }

    /// Out-neighbors of an issue together with their full issue records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dependencies_with_metadata(
        &self,
        issue_id: &str,
    ) -> Result<Vec<(Issue, DependencyType)>> {
        let sql = format!(
            "SELECT {}, d.type FROM dependencies d
             JOIN issues i ON i.id = d.depends_on_id
             WHERE d.issue_id = ?1
             ORDER BY i.id",
            prefixed_issue_columns("i")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![issue_id], |row| {
            let issue = issue_from_row(row)?;
            let dep_type_str: String = row.get(ISSUE_COLUMN_COUNT)?;
            Ok((issue, dep_type_str))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (issue, dep_type_str) = row?;
            let dep_type = dep_type_str
                .parse::<DependencyType>()
                .unwrap_or(DependencyType::Custom(dep_type_str));
            result.push((issue, dep_type));
        }
        Ok(result)
    }

    /// The parent-child parent of an issue, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_parent_id(&self, issue_id: &str) -> Result<Option<String>> {
        let parent = self
            .conn
            .query_row(
                "SELECT depends_on_id FROM dependencies
                 WHERE issue_id = ?1 AND type = 'parent-child'
                 ORDER BY depends_on_id LIMIT 1",
                params![issue_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(parent)
    }

    /// Parent-child children of an issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_children(&self, parent_id: &str) -> Result<Vec<Issue>> {
        let sql = format!(
            "SELECT {} FROM issues i
             JOIN dependencies d ON d.issue_id = i.id
             WHERE d.depends_on_id = ?1 AND d.type = 'parent-child'
             ORDER BY i.id",
            prefixed_issue_columns("i")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![parent_id], issue_from_row)?;
        let mut children = Vec::new();
        for row in rows {
            children.push(row?);
        }
        Ok(children)
    }

    /// Every open issue together with the IDs blocking it.
    ///
    /// An issue is blocked when it has a `blocks` out-edge whose target
    /// is not closed (unknown targets count as blocking).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_blocked_issues(&self) -> Result<Vec<BlockedIssue>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.issue_id, d.depends_on_id
             FROM dependencies d
             JOIN issues i ON i.id = d.issue_id
             WHERE d.type = 'blocks'
               AND i.status != 'closed'
               AND NOT EXISTS (
                   SELECT 1 FROM issues b WHERE b.id = d.depends_on_id AND b.status = 'closed'
               )
             ORDER BY d.issue_id, d.depends_on_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut blockers_by_issue: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (issue_id, blocker) = row?;
            blockers_by_issue.entry(issue_id).or_default().push(blocker);
        }

        let mut blocked = Vec::new();
        let mut ids: Vec<String> = blockers_by_issue.keys().cloned().collect();
        ids.sort();
        for id in ids {
            let Some(issue) = self.get_issue(&id)? else {
                continue;
            };
            let blocked_by = blockers_by_issue.remove(&id).unwrap_or_default();
            blocked.push(BlockedIssue {
                blocked_by_count: blocked_by.len(),
                blocked_by,
                issue,
            });
        }
        Ok(blocked)
    }

    /// How many non-closed issues this issue blocks via `blocks` edges.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn blocking_count(&self, id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dependencies d
             JOIN issues i ON i.id = d.issue_id
             WHERE d.depends_on_id = ?1 AND d.type = 'blocks' AND i.status != 'closed'",
            params![id],
            |row| row.get(0),
        )?;
        usize::try_from(count).map_err(|e| BeadsError::Transaction(e.to_string()))
    }

    /// Whether adding `issue_id -> depends_on_id` would close a cycle in
    /// the `blocks` subgraph: true when `issue_id` is reachable from
    /// `depends_on_id` along `blocks` edges.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn would_create_cycle(&self, issue_id: &str, depends_on_id: &str) -> Result<bool> {
        let exists: bool = self
            .conn
            .query_row(
                r"
                WITH RECURSIVE transitive_deps(id) AS (
                    SELECT depends_on_id FROM dependencies
                    WHERE issue_id = ?1 AND type = 'blocks'
                    UNION
                    SELECT d.depends_on_id
                    FROM dependencies d
                    JOIN transitive_deps td ON d.issue_id = td.id
                    WHERE d.type = 'blocks'
                )
                SELECT 1 FROM transitive_deps WHERE id = ?2 LIMIT 1
                ",
                params![depends_on_id, issue_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        Ok(exists)
    }

    /// Detect all cycles in the `blocks` subgraph.
    ///
    /// Iterative DFS to avoid stack overflow on deep graphs.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn detect_all_cycles(&self) -> Result<Vec<Vec<String>>> {
        use std::collections::HashSet;

        let mut graph: HashMap<String, Vec<String>> = HashMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT issue_id, depends_on_id FROM dependencies WHERE type = 'blocks'")?;
        let edges = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for edge in edges {
            let (from, to) = edge?;
            graph.entry(from).or_default().push(to);
        }

        let mut cycles = Vec::new();
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();
        let mut stack: Vec<(String, usize)> = Vec::new();

        let mut keys: Vec<_> = graph.keys().cloned().collect();
        keys.sort();

        for node in keys {
            if visited.contains(&node) {
                continue;
            }

            stack.push((node.clone(), 0));
            visited.insert(node.clone());
            rec_stack.insert(node.clone());
            path.push(node);

            while let Some((u, idx)) = stack.last_mut() {
                let neighbors = graph.get(u);

                if let Some(neighbors) = neighbors {
                    if *idx < neighbors.len() {
                        let v = &neighbors[*idx];
                        *idx += 1;

                        if rec_stack.contains(v) {
                            if let Some(start_pos) = path.iter().position(|x| x == v) {
                                let mut cycle = path[start_pos..].to_vec();
                                cycle.push(v.clone());
                                cycles.push(cycle);
                            }
                        } else if !visited.contains(v) {
                            visited.insert(v.clone());
                            rec_stack.insert(v.clone());
                            path.push(v.clone());
                            stack.push((v.clone(), 0));
                        }
                        continue;
                    }
                }

                rec_stack.remove(u);
                path.pop();
                stack.pop();
            }
        }

        Ok(cycles)
    }

    // ===== Labels =====

    /// Add a label to an issue. Returns false when already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub fn add_label(&mut self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        self.mutate("add_label", actor, |tx, ctx| {
            let affected = tx.execute(
                "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?1, ?2)",
                params![issue_id, label],
            )?;
            if affected > 0 {
                ctx.record_event(EventType::LabelAdded, issue_id, None, Some(label.to_string()));
            }
            Ok(affected > 0)
        })
    }

    /// Remove a label from an issue. Returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub fn remove_label(&mut self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        self.mutate("remove_label", actor, |tx, ctx| {
            let affected = tx.execute(
                "DELETE FROM labels WHERE issue_id = ?1 AND label = ?2",
                params![issue_id, label],
            )?;
            if affected > 0 {
                ctx.record_event(
                    EventType::LabelRemoved,
                    issue_id,
                    Some(label.to_string()),
                    None,
                );
            }
            Ok(affected > 0)
        })
    }

    /// Labels on an issue, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label FROM labels WHERE issue_id = ?1 ORDER BY label")?;
        let rows = stmt.query_map(params![issue_id], |row| row.get::<_, String>(0))?;
        let mut labels = Vec::new();
        for row in rows {
            labels.push(row?);
        }
        Ok(labels)
    }

    // ===== Comments =====

    /// Add a comment, emitting a `comment_added` event.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub fn add_comment(&mut self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        let created_at = Utc::now();
        let id = self.mutate("add_comment", author, |tx, ctx| {
            tx.execute(
                "INSERT INTO comments (issue_id, author, text, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![issue_id, author, text, created_at.to_rfc3339()],
            )?;
            let id = tx.last_insert_rowid();
            ctx.record_event(EventType::CommentAdded, issue_id, None, None);
            Ok(id)
        })?;

        Ok(Comment {
            id,
            issue_id: issue_id.to_string(),
            author: author.to_string(),
            body: text.to_string(),
            created_at,
        })
    }

    /// Comments on an issue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, issue_id, author, text, created_at
             FROM comments WHERE issue_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![issue_id], |row| {
            let created_at_str: String = row.get(4)?;
            let created_at = DateTime::parse_from_rfc3339(&created_at_str)
                .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));
            Ok(Comment {
                id: row.get(0)?,
                issue_id: row.get(1)?,
                author: row.get(2)?,
                body: row.get(3)?,
                created_at,
            })
        })?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    // ===== Events =====

    /// Events for an issue, newest first. `limit` of 0 means no limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_events(&self, issue_id: &str, limit: usize) -> Result<Vec<Event>> {
        events::get_events(&self.conn, EventTable::Issues, issue_id, limit)
    }

    // ===== Metadata / config =====

    /// Read a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Delete a metadata value. Returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub fn delete_metadata(&mut self, key: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM metadata WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// Read a config value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a config value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

/// Filters for `list_issues`.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub status: Option<Status>,
    pub assignee: Option<String>,
    pub unassigned_only: bool,
    pub limit: Option<usize>,
}

/// Field updates for `update_issue`. Outer `None` means "leave as is";
/// inner `None` clears the field.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub design: Option<Option<String>>,
    pub acceptance_criteria: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub issue_type: Option<IssueType>,
    pub assignee: Option<Option<String>>,
    pub close_reason: Option<Option<String>>,
    pub closed_at: Option<Option<DateTime<Utc>>>,
    pub closed_by_session: Option<Option<String>>,
}

impl IssueUpdate {
    /// Whether no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.design.is_none()
            && self.acceptance_criteria.is_none()
            && self.notes.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.issue_type.is_none()
            && self.assignee.is_none()
            && self.close_reason.is_none()
            && self.closed_at.is_none()
            && self.closed_by_session.is_none()
    }
}

// ===== Row mapping =====

/// Column list shared by the issues and wisps relations.
pub(crate) const ISSUE_COLUMNS: &str = "id, title, description, design, acceptance_criteria, notes, \
     status, priority, issue_type, assignee, created_at, created_by, updated_at, \
     closed_at, close_reason, closed_by_session";

pub(crate) const ISSUE_COLUMN_COUNT: usize = 16;

pub(crate) fn prefixed_issue_columns(alias: &str) -> String {
    ISSUE_COLUMNS
        .split(", ")
        .map(|col| format!("{alias}.{col}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn empty_to_none(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.is_empty())
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

pub(crate) fn issue_from_row(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
    let status_str: String = row.get(6)?;
    let issue_type_str: String = row.get(8)?;
    let created_at_str: String = row.get(10)?;
    let updated_at_str: String = row.get(12)?;
    let closed_at_str: Option<String> = row.get(13)?;

    Ok(Issue {
        id: row.get(0)?,
        title: row.get(1)?,
        description: empty_to_none(row.get(2)?),
        design: empty_to_none(row.get(3)?),
        acceptance_criteria: empty_to_none(row.get(4)?),
        notes: empty_to_none(row.get(5)?),
        status: status_str
            .parse::<Status>()
            .unwrap_or(Status::Custom(status_str)),
        priority: Priority(row.get(7)?),
        issue_type: issue_type_str
            .parse::<IssueType>()
            .unwrap_or(IssueType::Custom(issue_type_str)),
        assignee: empty_to_none(row.get(9)?),
        created_at: parse_timestamp(&created_at_str),
        created_by: empty_to_none(row.get(11)?),
        updated_at: parse_timestamp(&updated_at_str),
        closed_at: closed_at_str.as_deref().map(parse_timestamp),
        close_reason: empty_to_none(row.get(14)?),
        closed_by_session: empty_to_none(row.get(15)?),
    })
}

fn dependency_from_row(row: &rusqlite::Row) -> rusqlite::Result<Dependency> {
    let dep_type_str: String = row.get(2)?;
    let created_at_str: String = row.get(3)?;
    Ok(Dependency {
        issue_id: row.get(0)?,
        depends_on_id: row.get(1)?,
        dep_type: dep_type_str
            .parse::<DependencyType>()
            .unwrap_or(DependencyType::Custom(dep_type_str)),
        created_at: parse_timestamp(&created_at_str),
        created_by: row.get(4)?,
    })
}

/// Insert an issue (or wisp) row into the named table.
///
/// `table` must be one of the two fixed namespace tables; caller input
/// never reaches this parameter.
pub(crate) fn insert_issue_row(conn: &Connection, table: &str, issue: &Issue) -> Result<()> {
    debug_assert!(table == "issues" || table == "wisps");
    let sql = format!(
        "INSERT INTO {table} (
            id, title, description, design, acceptance_criteria, notes,
            status, priority, issue_type, assignee, created_at, created_by,
            updated_at, closed_at, close_reason, closed_by_session
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
    );
    conn.execute(
        &sql,
        params![
            issue.id,
            issue.title,
            issue.description.as_deref().unwrap_or(""),
            issue.design.as_deref().unwrap_or(""),
            issue.acceptance_criteria.as_deref().unwrap_or(""),
            issue.notes.as_deref().unwrap_or(""),
            issue.status.as_str(),
            issue.priority.0,
            issue.issue_type.as_str(),
            issue.assignee,
            issue.created_at.to_rfc3339(),
            issue.created_by.as_deref().unwrap_or(""),
            issue.updated_at.to_rfc3339(),
            issue.closed_at.map(|dt| dt.to_rfc3339()),
            issue.close_reason.as_deref().unwrap_or(""),
            issue.closed_by_session.as_deref().unwrap_or(""),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_issue(title: &str) -> Issue {
        Issue {
            title: title.to_string(),
            ..Issue::default()
        }
    }

    fn store_with_issue(title: &str) -> (BeadStore, String) {
        let mut store = BeadStore::open_memory().unwrap();
        let mut issue = make_issue(title);
        store.create_issue(&mut issue, "test").unwrap();
        (store, issue.id)
    }

    #[test]
    fn test_create_assigns_hash_id_and_created_event() {
        let (store, id) = store_with_issue("First issue");
        assert!(id.starts_with("bd-"));

        let events = store.get_events(&id, 0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Created);
    }

    #[test]
    fn test_create_respects_preset_id() {
        let mut store = BeadStore::open_memory().unwrap();
        let mut issue = make_issue("Preset");
        issue.id = "bd-preset1".to_string();
        store.create_issue(&mut issue, "test").unwrap();
        assert!(store.get_issue("bd-preset1").unwrap().is_some());
    }

    #[test]
    fn test_create_duplicate_id_fails() {
        let mut store = BeadStore::open_memory().unwrap();
        let mut a = make_issue("A");
        a.id = "bd-dup1".to_string();
        store.create_issue(&mut a, "test").unwrap();

        let mut b = make_issue("B");
        b.id = "bd-dup1".to_string();
        assert!(store.create_issue(&mut b, "test").is_err());
    }

    #[test]
    fn test_get_issue_not_found_returns_none() {
        let store = BeadStore::open_memory().unwrap();
        assert!(store.get_issue("bd-nope").unwrap().is_none());
    }

    #[test]
    fn test_update_issue_changes_fields_and_events() {
        let (mut store, id) = store_with_issue("Before");
        let updates = IssueUpdate {
            title: Some("After".to_string()),
            status: Some(Status::InProgress),
            assignee: Some(Some("alice".to_string())),
            ..IssueUpdate::default()
        };
        let updated = store.update_issue(&id, &updates, "test").unwrap();
        assert_eq!(updated.title, "After");
        assert_eq!(updated.status, Status::InProgress);
        assert_eq!(updated.assignee.as_deref(), Some("alice"));

        let events = store.get_events(&id, 0).unwrap();
        assert!(events
            .iter()
            .any(|e| e.event_type == EventType::StatusChanged
                && e.old_value.as_deref() == Some("open")
                && e.new_value.as_deref() == Some("in_progress")));
    }

    #[test]
    fn test_update_issue_not_found() {
        let mut store = BeadStore::open_memory().unwrap();
        let updates = IssueUpdate {
            title: Some("x".to_string()),
            ..IssueUpdate::default()
        };
        assert!(matches!(
            store.update_issue("bd-ghost", &updates, "test"),
            Err(BeadsError::NotFound { .. })
        ));
    }

    #[test]
    fn test_close_issue_sets_metadata_and_events() {
        let (mut store, id) = store_with_issue("To close");
        store.close_issue(&id, "done", "test", "sess-1").unwrap();

        let issue = store.get_issue(&id).unwrap().unwrap();
        assert_eq!(issue.status, Status::Closed);
        assert!(issue.closed_at.is_some());
        assert_eq!(issue.close_reason.as_deref(), Some("done"));
        assert_eq!(issue.closed_by_session.as_deref(), Some("sess-1"));

        let events = store.get_events(&id, 0).unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::Closed));
        assert!(events
            .iter()
            .any(|e| e.event_type == EventType::StatusChanged));
    }

    #[test]
    fn test_close_issue_idempotent() {
        let (mut store, id) = store_with_issue("Close twice");
        store.close_issue(&id, "done", "test", "s").unwrap();
        let events_before = store.get_events(&id, 0).unwrap().len();
        store.close_issue(&id, "done again", "test", "s").unwrap();
        assert_eq!(store.get_events(&id, 0).unwrap().len(), events_before);
    }

    #[test]
    fn test_list_issues_filters() {
        let mut store = BeadStore::open_memory().unwrap();
        let mut open_issue = make_issue("Open one");
        store.create_issue(&mut open_issue, "test").unwrap();
        let mut assigned = make_issue("Assigned one");
        assigned.assignee = Some("bob".to_string());
        store.create_issue(&mut assigned, "test").unwrap();
        let mut closed = make_issue("Closed one");
        store.create_issue(&mut closed, "test").unwrap();
        store.close_issue(&closed.id, "done", "test", "s").unwrap();

        let open = store
            .list_issues(&ListFilters {
                status: Some(Status::Open),
                ..ListFilters::default()
            })
            .unwrap();
        assert_eq!(open.len(), 2);

        let bobs = store
            .list_issues(&ListFilters {
                assignee: Some("bob".to_string()),
                ..ListFilters::default()
            })
            .unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].id, assigned.id);

        let unassigned = store
            .list_issues(&ListFilters {
                unassigned_only: true,
                status: Some(Status::Open),
                ..ListFilters::default()
            })
            .unwrap();
        assert_eq!(unassigned.len(), 1);
    }

    #[test]
    fn test_next_child_id_increments() {
        let (mut store, id) = store_with_issue("Parent");
        assert_eq!(store.next_child_id(&id).unwrap(), format!("{id}.1"));
        assert_eq!(store.next_child_id(&id).unwrap(), format!("{id}.2"));
        assert_eq!(store.next_child_id(&id).unwrap(), format!("{id}.3"));
    }

    #[test]
    fn test_add_dependency_self_loop_rejected() {
        let (mut store, id) = store_with_issue("Selfish");
        let dep = Dependency::new(id.clone(), id, DependencyType::Blocks);
        assert!(matches!(
            store.add_dependency(&dep, "test"),
            Err(BeadsError::SelfDependency { .. })
        ));
    }

    #[test]
    fn test_add_dependency_cycle_rejected() {
        let mut store = BeadStore::open_memory().unwrap();
        let mut a = make_issue("A");
        let mut b = make_issue("B");
        let mut c = make_issue("C");
        store.create_issue(&mut a, "test").unwrap();
        store.create_issue(&mut b, "test").unwrap();
        store.create_issue(&mut c, "test").unwrap();

        store
            .add_dependency(
                &Dependency::new(a.id.clone(), b.id.clone(), DependencyType::Blocks),
                "test",
            )
            .unwrap();
        store
            .add_dependency(
                &Dependency::new(b.id.clone(), c.id.clone(), DependencyType::Blocks),
                "test",
            )
            .unwrap();

        // c -> a would close the loop
        let err = store
            .add_dependency(
                &Dependency::new(c.id.clone(), a.id.clone(), DependencyType::Blocks),
                "test",
            )
            .unwrap_err();
        assert!(matches!(err, BeadsError::Cycle { .. }));
    }

    #[test]
    fn test_parent_child_cycle_not_checked() {
        // Only the blocks subgraph is cycle-checked
        let mut store = BeadStore::open_memory().unwrap();
        let mut a = make_issue("A");
        let mut b = make_issue("B");
        store.create_issue(&mut a, "test").unwrap();
        store.create_issue(&mut b, "test").unwrap();

        store
            .add_dependency(
                &Dependency::new(a.id.clone(), b.id.clone(), DependencyType::ParentChild),
                "test",
            )
            .unwrap();
        store
            .add_dependency(
                &Dependency::new(b.id.clone(), a.id.clone(), DependencyType::ParentChild),
                "test",
            )
            .unwrap();
    }

    #[test]
    fn test_duplicate_dependency_rejected() {
        let mut store = BeadStore::open_memory().unwrap();
        let mut a = make_issue("A");
        let mut b = make_issue("B");
        store.create_issue(&mut a, "test").unwrap();
        store.create_issue(&mut b, "test").unwrap();

        let dep = Dependency::new(a.id.clone(), b.id.clone(), DependencyType::Related);
        store.add_dependency(&dep, "test").unwrap();
        assert!(store.add_dependency(&dep, "test").is_err());
    }

    #[test]
    fn test_remove_dependency_emits_event() {
        let mut store = BeadStore::open_memory().unwrap();
        let mut a = make_issue("A");
        let mut b = make_issue("B");
        store.create_issue(&mut a, "test").unwrap();
        store.create_issue(&mut b, "test").unwrap();

        let dep = Dependency::new(a.id.clone(), b.id.clone(), DependencyType::Blocks);
        store.add_dependency(&dep, "test").unwrap();
        assert!(store.remove_dependency(&a.id, &b.id, "test").unwrap());
        assert!(!store.remove_dependency(&a.id, &b.id, "test").unwrap());

        let events = store.get_events(&a.id, 0).unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::DepAdded));
        assert!(events.iter().any(|e| e.event_type == EventType::DepRemoved));
    }

    #[test]
    fn test_get_dependencies_with_metadata() {
        let mut store = BeadStore::open_memory().unwrap();
        let mut a = make_issue("A");
        let mut b = make_issue("B");
        store.create_issue(&mut a, "test").unwrap();
        store.create_issue(&mut b, "test").unwrap();
        store
            .add_dependency(
                &Dependency::new(a.id.clone(), b.id.clone(), DependencyType::ParentChild),
                "test",
            )
            .unwrap();

        let deps = store.get_dependencies_with_metadata(&a.id).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].0.id, b.id);
        assert_eq!(deps[0].1, DependencyType::ParentChild);
    }

    #[test]
    fn test_blocked_issues_and_blocking_count() {
        let mut store = BeadStore::open_memory().unwrap();
        let mut blocker = make_issue("Blocker");
        let mut blocked = make_issue("Blocked");
        store.create_issue(&mut blocker, "test").unwrap();
        store.create_issue(&mut blocked, "test").unwrap();
        store
            .add_dependency(
                &Dependency::new(blocked.id.clone(), blocker.id.clone(), DependencyType::Blocks),
                "test",
            )
            .unwrap();

        let result = store.get_blocked_issues().unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].issue.id, blocked.id);
        assert_eq!(result[0].blocked_by, vec![blocker.id.clone()]);
        assert_eq!(result[0].blocked_by_count, 1);

        assert_eq!(store.blocking_count(&blocker.id).unwrap(), 1);

        // Closing the blocker unblocks
        store.close_issue(&blocker.id, "done", "test", "s").unwrap();
        assert!(store.get_blocked_issues().unwrap().is_empty());
        assert_eq!(store.blocking_count(&blocker.id).unwrap(), 1);

        // Closing the blocked issue zeroes the blocking count
        store.close_issue(&blocked.id, "done", "test", "s").unwrap();
        assert_eq!(store.blocking_count(&blocker.id).unwrap(), 0);
    }

    #[test]
    fn test_labels_roundtrip() {
        let (mut store, id) = store_with_issue("Labeled");
        assert!(store.add_label(&id, "backend", "test").unwrap());
        assert!(store.add_label(&id, "urgent", "test").unwrap());
        assert!(!store.add_label(&id, "urgent", "test").unwrap());

        assert_eq!(store.get_labels(&id).unwrap(), vec!["backend", "urgent"]);

        assert!(store.remove_label(&id, "backend", "test").unwrap());
        assert_eq!(store.get_labels(&id).unwrap(), vec!["urgent"]);
    }

    #[test]
    fn test_comments_roundtrip() {
        let (mut store, id) = store_with_issue("Commented");
        store.add_comment(&id, "alice", "first").unwrap();
        store.add_comment(&id, "bob", "second").unwrap();

        let comments = store.get_comments(&id).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].body, "first");
        assert_eq!(comments[1].author, "bob");

        let events = store.get_events(&id, 0).unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.event_type == EventType::CommentAdded)
                .count(),
            2
        );
    }

    #[test]
    fn test_metadata_and_config() {
        let mut store = BeadStore::open_memory().unwrap();
        assert!(store.get_metadata("last_import_time").unwrap().is_none());
        store
            .set_metadata("last_import_time", "2026-01-01T00:00:00Z")
            .unwrap();
        assert_eq!(
            store.get_metadata("last_import_time").unwrap().as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
        store.set_metadata("last_import_time", "override").unwrap();
        assert_eq!(
            store.get_metadata("last_import_time").unwrap().as_deref(),
            Some("override")
        );
        assert!(store.delete_metadata("last_import_time").unwrap());
        assert!(!store.delete_metadata("last_import_time").unwrap());

        store.set_config("issue_prefix", "gt").unwrap();
        assert_eq!(
            store.get_config("issue_prefix").unwrap().as_deref(),
            Some("gt")
        );
    }

    #[test]
    fn test_config_prefix_drives_id_generation() {
        let mut store = BeadStore::open_memory().unwrap();
        store.set_config("issue_prefix", "gt").unwrap();
        let mut issue = make_issue("Prefixed");
        store.create_issue(&mut issue, "test").unwrap();
        assert!(issue.id.starts_with("gt-"));
    }

    #[test]
    fn test_transaction_rollback_on_error() {
        let mut store = BeadStore::open_memory().unwrap();
        let result: Result<()> = store.mutate("failing_op", "test", |tx, _ctx| {
            tx.execute(
                "INSERT INTO issues (id, title, status, priority, issue_type, created_at, updated_at)
                 VALUES ('bd-roll1', 'Rolls back', 'open', 2, 'task',
                         '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                [],
            )?;
            Err(BeadsError::Transaction("forced failure".to_string()))
        });
        assert!(result.is_err());
        assert!(store.get_issue("bd-roll1").unwrap().is_none());
    }

    #[test]
    fn test_commit_nothing_to_commit_is_ok() {
        let (store, _id) = store_with_issue("Committed");
        store.commit("post-create metadata").unwrap();
    }
}
