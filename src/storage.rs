//! # Storage Layer
//!
//! The persistence seams of notilog and their SQLite implementations.
//!
//! ```text
//!        EventStore<E>                     NotificationService<E>
//!             │                                     │
//!             ▼                                     ▼
//!   ┌───────────────────┐               ┌────────────────────┐
//!   │  EventRepository  │               │  CursorRepository  │
//!   └─────────┬─────────┘               └──────────┬─────────┘
//!             │                                    │
//!   SqliteEventRepository              SqliteCursorRepository
//!             │                                    │
//!             └──────────── Arc<Database> ─────────┘
//! ```
//!
//! Any engine can stand behind the traits as long as it keeps the id
//! guarantee: ids handed out by `append` strictly increase in commit order
//! and are never reused. Gaps are fine.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::schema::Database;
use crate::types::{EventId, EventRecord, NewEventRecord, PublishCursor};

// =============================================================================
// Repository Traits
// =============================================================================

/// Durable, append-only storage for event records.
pub trait EventRepository: Send + Sync {
    /// Persists a record and returns it with its assigned id.
    ///
    /// Implementations must assign ids atomically: concurrent appends never
    /// receive the same id, and ids never decrease in commit order.
    fn append(&self, record: NewEventRecord) -> Result<EventRecord>;

    /// All records with `event_id > after`, ascending.
    fn since(&self, after: EventId) -> Result<Vec<EventRecord>>;

    /// At most `limit` records with `event_id > after`, ascending.
    ///
    /// The default loads everything after `after` and truncates.
    fn since_limited(&self, after: EventId, limit: usize) -> Result<Vec<EventRecord>> {
        let mut records = self.since(after)?;
        records.truncate(limit);
        Ok(records)
    }

    /// All records with `low <= event_id <= high`, ascending.
    fn between(&self, low: EventId, high: EventId) -> Result<Vec<EventRecord>>;

    /// The highest assigned id, or [`EventId::NONE`] if nothing is stored.
    fn last_id(&self) -> Result<EventId>;
}

/// Storage for per-channel publish cursors.
pub trait CursorRepository: Send + Sync {
    /// Looks up the cursor for `channel`.
    fn find_by_channel(&self, channel: &str) -> Result<Option<PublishCursor>>;

    /// Inserts a new cursor or updates the existing row for its channel.
    ///
    /// Returns the cursor with its row id filled in.
    fn save(&self, cursor: PublishCursor) -> Result<PublishCursor>;
}

// =============================================================================
// SQLite Event Repository
// =============================================================================

/// [`EventRepository`] backed by the `stored_events` table.
#[derive(Debug, Clone)]
pub struct SqliteEventRepository {
    db: Arc<Database>,
}

impl SqliteEventRepository {
    /// Creates a repository over a shared database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

const SELECT_EVENTS: &str =
    "SELECT event_id, event_type, body, occurred_on_ms, version FROM stored_events";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let event_id: i64 = row.get(0)?;
    let occurred_on_ms: i64 = row.get(3)?;
    let version: i64 = row.get(4)?;

    Ok(EventRecord {
        event_id: EventId::from_raw(event_id as u64),
        event_type: row.get(1)?,
        body: row.get(2)?,
        occurred_on_ms: occurred_on_ms as u64,
        version: version as u32,
    })
}

impl EventRepository for SqliteEventRepository {
    fn append(&self, record: NewEventRecord) -> Result<EventRecord> {
        let conn = self.db.lock()?;

        conn.execute(
            "INSERT INTO stored_events (event_type, body, occurred_on_ms, version)
             VALUES (?, ?, ?, ?)",
            params![
                record.event_type,
                record.body,
                record.occurred_on_ms as i64,
                record.version as i64,
            ],
        )?;

        // Read under the same lock, so no other insert can interleave.
        let event_id = EventId::from_raw(conn.last_insert_rowid() as u64);
        Ok(record.with_id(event_id))
    }

    fn since(&self, after: EventId) -> Result<Vec<EventRecord>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_EVENTS} WHERE event_id > ? ORDER BY event_id"
        ))?;

        let records = stmt
            .query_map([after.as_raw() as i64], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn since_limited(&self, after: EventId, limit: usize) -> Result<Vec<EventRecord>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_EVENTS} WHERE event_id > ? ORDER BY event_id LIMIT ?"
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![after.as_raw() as i64, limit], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn between(&self, low: EventId, high: EventId) -> Result<Vec<EventRecord>> {
        if low > high {
            return Ok(Vec::new());
        }

        let conn = self.db.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_EVENTS} WHERE event_id >= ? AND event_id <= ? ORDER BY event_id"
        ))?;

        let records = stmt
            .query_map(
                params![low.as_raw() as i64, high.as_raw() as i64],
                event_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn last_id(&self) -> Result<EventId> {
        let conn = self.db.lock()?;
        // AUTOINCREMENT high-water mark. Stays put when tail rows are removed.
        let seq: Option<i64> = conn
            .query_row(
                "SELECT seq FROM sqlite_sequence WHERE name = 'stored_events'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match seq {
            Some(id) if id > 0 => EventId::from_raw(id as u64),
            _ => EventId::NONE,
        })
    }
}

// =============================================================================
// SQLite Cursor Repository
// =============================================================================

/// [`CursorRepository`] backed by the `publish_cursors` table.
#[derive(Debug, Clone)]
pub struct SqliteCursorRepository {
    db: Arc<Database>,
}

impl SqliteCursorRepository {
    /// Creates a repository over a shared database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl CursorRepository for SqliteCursorRepository {
    fn find_by_channel(&self, channel: &str) -> Result<Option<PublishCursor>> {
        let conn = self.db.lock()?;

        let cursor = conn
            .query_row(
                "SELECT cursor_id, channel, last_published_id, updated_ms
                 FROM publish_cursors WHERE channel = ?",
                [channel],
                |row| {
                    let last_published_id: i64 = row.get(2)?;
                    let updated_ms: i64 = row.get(3)?;
                    Ok(PublishCursor {
                        cursor_id: Some(row.get(0)?),
                        channel: row.get(1)?,
                        last_published_id: EventId::from_raw(last_published_id as u64),
                        updated_ms: updated_ms as u64,
                    })
                },
            )
            .optional()?;

        Ok(cursor)
    }

    fn save(&self, mut cursor: PublishCursor) -> Result<PublishCursor> {
        let conn = self.db.lock()?;

        // Upsert keyed by channel: a second service instance that raced us
        // to create the row updates it instead of failing on UNIQUE. The
        // stored position never moves backwards.
        let (cursor_id, last_published_id): (i64, i64) = conn.query_row(
            "INSERT INTO publish_cursors (channel, last_published_id, updated_ms)
             VALUES (?, ?, ?)
             ON CONFLICT(channel) DO UPDATE SET
                 last_published_id = MAX(last_published_id, excluded.last_published_id),
                 updated_ms = excluded.updated_ms
             RETURNING cursor_id, last_published_id",
            params![
                cursor.channel,
                cursor.last_published_id.as_raw() as i64,
                cursor.updated_ms as i64,
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        cursor.cursor_id = Some(cursor_id);
        cursor.last_published_id = EventId::from_raw(last_published_id as u64);
        Ok(cursor)
    }
}

// =============================================================================
// Tests
// =============================================================================
