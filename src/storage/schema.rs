//! Database schema definitions.
//!
//! Issues and wisps live in parallel table sets. Wisps are append-heavy
//! and bulk-deleted ("burned"); isolating them keeps the hot issues table
//! small and makes truncation cheap. The rename cascade pays the cost of
//! touching both namespaces.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the beads database.
pub const SCHEMA_SQL: &str = r"
    -- Issues (permanent)
    CREATE TABLE IF NOT EXISTS issues (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        design TEXT NOT NULL DEFAULT '',
        acceptance_criteria TEXT NOT NULL DEFAULT '',
        notes TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        priority INTEGER NOT NULL,
        issue_type TEXT NOT NULL,
        assignee TEXT,
        created_at TEXT NOT NULL,
        created_by TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL,
        closed_at TEXT,
        close_reason TEXT NOT NULL DEFAULT '',
        closed_by_session TEXT NOT NULL DEFAULT '',
        CHECK (length(title) >= 1 AND length(title) <= 500),
        CHECK (priority >= 0 AND priority <= 3)
    );

    CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
    CREATE INDEX IF NOT EXISTS idx_issues_priority ON issues(priority);
    CREATE INDEX IF NOT EXISTS idx_issues_issue_type ON issues(issue_type);
    CREATE INDEX IF NOT EXISTS idx_issues_assignee ON issues(assignee);
    CREATE INDEX IF NOT EXISTS idx_issues_updated_at ON issues(updated_at);

    -- Wisps (ephemeral): same attribute surface, parallel namespace
    CREATE TABLE IF NOT EXISTS wisps (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        design TEXT NOT NULL DEFAULT '',
        acceptance_criteria TEXT NOT NULL DEFAULT '',
        notes TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        priority INTEGER NOT NULL,
        issue_type TEXT NOT NULL,
        assignee TEXT,
        created_at TEXT NOT NULL,
        created_by TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL,
        closed_at TEXT,
        close_reason TEXT NOT NULL DEFAULT '',
        closed_by_session TEXT NOT NULL DEFAULT '',
        CHECK (length(title) >= 1 AND length(title) <= 500),
        CHECK (priority >= 0 AND priority <= 3)
    );

    CREATE INDEX IF NOT EXISTS idx_wisps_status ON wisps(status);

    -- Dependencies
    CREATE TABLE IF NOT EXISTS dependencies (
        issue_id TEXT NOT NULL,
        depends_on_id TEXT NOT NULL,
        type TEXT NOT NULL,
        created_at TEXT NOT NULL,
        created_by TEXT,
        PRIMARY KEY (issue_id, depends_on_id)
    );
    CREATE INDEX IF NOT EXISTS idx_dependencies_issue_id ON dependencies(issue_id);
    CREATE INDEX IF NOT EXISTS idx_dependencies_depends_on_id ON dependencies(depends_on_id);
    CREATE INDEX IF NOT EXISTS idx_dependencies_type ON dependencies(type);

    CREATE TABLE IF NOT EXISTS wisp_dependencies (
        issue_id TEXT NOT NULL,
        depends_on_id TEXT NOT NULL,
        type TEXT NOT NULL,
        created_at TEXT NOT NULL,
        created_by TEXT,
        PRIMARY KEY (issue_id, depends_on_id)
    );
    CREATE INDEX IF NOT EXISTS idx_wisp_dependencies_issue_id ON wisp_dependencies(issue_id);
    CREATE INDEX IF NOT EXISTS idx_wisp_dependencies_depends_on_id ON wisp_dependencies(depends_on_id);

    -- Labels
    CREATE TABLE IF NOT EXISTS labels (
        issue_id TEXT NOT NULL,
        label TEXT NOT NULL,
        PRIMARY KEY (issue_id, label),
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_labels_label ON labels(label);

    CREATE TABLE IF NOT EXISTS wisp_labels (
        issue_id TEXT NOT NULL,
        label TEXT NOT NULL,
        PRIMARY KEY (issue_id, label)
    );

    -- Comments
    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        author TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_comments_issue_id ON comments(issue_id);

    CREATE TABLE IF NOT EXISTS wisp_comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        author TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_wisp_comments_issue_id ON wisp_comments(issue_id);

    -- Events (audit, append-only)
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        actor TEXT NOT NULL,
        old_value TEXT,
        new_value TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_events_issue_id ON events(issue_id);
    CREATE INDEX IF NOT EXISTS idx_events_event_type ON events(event_type);
    CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);

    CREATE TABLE IF NOT EXISTS wisp_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        actor TEXT NOT NULL,
        old_value TEXT,
        new_value TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_wisp_events_issue_id ON wisp_events(issue_id);

    -- Snapshots (referenced by the rename cascade)
    CREATE TABLE IF NOT EXISTS issue_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        snapshot TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_issue_snapshots_issue_id ON issue_snapshots(issue_id);

    CREATE TABLE IF NOT EXISTS compaction_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        snapshot TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_compaction_snapshots_issue_id ON compaction_snapshots(issue_id);

    -- Child counters for hierarchical ID assignment
    CREATE TABLE IF NOT EXISTS child_counters (
        parent_id TEXT PRIMARY KEY,
        next_child_number INTEGER NOT NULL DEFAULT 1
    );

    -- Config (runtime)
    CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- Metadata (reserved keys include last_import_time)
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- Federation peers
    CREATE TABLE IF NOT EXISTS federation_peers (
        name TEXT PRIMARY KEY,
        remote_url TEXT NOT NULL,
        username TEXT,
        password_encrypted BLOB,
        sovereignty TEXT NOT NULL DEFAULT '',
        last_sync TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    );
";

/// Apply the schema to the database.
///
/// Uses `execute_batch` to run the entire DDL script; idempotent because
/// all statements use `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // WAL for concurrent readers
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // Referential integrity on by default; the rename cascade suspends it
    conn.pragma_update(None, "foreign_keys", "ON")?;

    Ok(())
}
