//! Audit event storage.
//!
//! Events are append-only and exist in both namespaces: `events` for
//! permanent issues, `wisp_events` for wisps. Insertion happens inside
//! the same transaction as the mutation that produced the event.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::model::{Event, EventType};

/// Which event namespace a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTable {
    Issues,
    Wisps,
}

impl EventTable {
    /// The backing table name. Fixed strings only; never interpolate
    /// caller input into SQL.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Issues => "events",
            Self::Wisps => "wisp_events",
        }
    }
}

/// Insert an event within a transaction (or any connection-like handle).
///
/// # Errors
///
/// Returns an error if the database insert fails.
pub fn insert_event(
    conn: &Connection,
    table: EventTable,
    issue_id: &str,
    event_type: &EventType,
    actor: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
) -> Result<i64> {
    let now = Utc::now();
    let sql = format!(
        "INSERT INTO {} (issue_id, event_type, actor, old_value, new_value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        table.table_name()
    );
    conn.execute(
        &sql,
        params![
            issue_id,
            event_type.as_str(),
            actor,
            old_value,
            new_value,
            now.to_rfc3339(),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Get events for an issue, newest first.
///
/// `limit` of 0 means no limit.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_events(
    conn: &Connection,
    table: EventTable,
    issue_id: &str,
    limit: usize,
) -> Result<Vec<Event>> {
    let base = format!(
        "SELECT id, issue_id, event_type, actor, old_value, new_value, created_at
         FROM {}
         WHERE issue_id = ?1
         ORDER BY created_at DESC, id DESC",
        table.table_name()
    );

    let mut events = Vec::new();
    if limit > 0 {
        let sql = format!("{base} LIMIT ?2");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![issue_id, limit], event_from_row)?;
        for row in rows {
            events.push(row?);
        }
    } else {
        let mut stmt = conn.prepare(&base)?;
        let rows = stmt.query_map(params![issue_id], event_from_row)?;
        for row in rows {
            events.push(row?);
        }
    }

    Ok(events)
}

/// Count events of a given type for an issue.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_events_of_type(
    conn: &Connection,
    table: EventTable,
    issue_id: &str,
    event_type: &EventType,
) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE issue_id = ?1 AND event_type = ?2",
        table.table_name()
    );
    let count: i64 = conn.query_row(&sql, params![issue_id, event_type.as_str()], |row| {
        row.get(0)
    })?;
    Ok(count)
}

fn event_from_row(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    let created_at_str: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

    let event_type_str: String = row.get(2)?;

    Ok(Event {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        event_type: EventType::parse(&event_type_str),
        actor: row.get(3)?,
        old_value: row.get(4)?,
        new_value: row.get(5)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO issues (id, title, status, priority, issue_type, created_at, updated_at)
             VALUES ('bd-test1', 'Test', 'open', 2, 'task', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_insert_and_get_events() {
        let conn = setup();
        insert_event(
            &conn,
            EventTable::Issues,
            "bd-test1",
            &EventType::Created,
            "alice",
            None,
            None,
        )
        .unwrap();
        insert_event(
            &conn,
            EventTable::Issues,
            "bd-test1",
            &EventType::StatusChanged,
            "alice",
            Some("open"),
            Some("closed"),
        )
        .unwrap();

        let events = get_events(&conn, EventTable::Issues, "bd-test1", 0).unwrap();
        assert_eq!(events.len(), 2);
        // Newest first
        assert_eq!(events[0].event_type, EventType::StatusChanged);
        assert_eq!(events[0].old_value.as_deref(), Some("open"));
        assert_eq!(events[1].event_type, EventType::Created);
    }

    #[test]
    fn test_get_events_with_limit() {
        let conn = setup();
        for _ in 0..5 {
            insert_event(
                &conn,
                EventTable::Issues,
                "bd-test1",
                &EventType::Created,
                "bob",
                None,
                None,
            )
            .unwrap();
        }
        let events = get_events(&conn, EventTable::Issues, "bd-test1", 3).unwrap();
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_wisp_events_are_separate() {
        let conn = setup();
        insert_event(
            &conn,
            EventTable::Wisps,
            "bd-wisp1",
            &EventType::Created,
            "carol",
            None,
            None,
        )
        .unwrap();

        let wisp_events = get_events(&conn, EventTable::Wisps, "bd-wisp1", 0).unwrap();
        assert_eq!(wisp_events.len(), 1);
        let issue_events = get_events(&conn, EventTable::Issues, "bd-wisp1", 0).unwrap();
        assert!(issue_events.is_empty());
    }

    #[test]
    fn test_count_events_of_type() {
        let conn = setup();
        insert_event(
            &conn,
            EventTable::Issues,
            "bd-test1",
            &EventType::Renamed,
            "dave",
            Some("bd-old"),
            Some("bd-test1"),
        )
        .unwrap();
        let count =
            count_events_of_type(&conn, EventTable::Issues, "bd-test1", &EventType::Renamed)
                .unwrap();
        assert_eq!(count, 1);
    }
}
