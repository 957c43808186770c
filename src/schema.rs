//! # SQLite Schema for notilog
//!
//! This module defines the database schema and handles initialization.
//!
//! ## Table Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         Schema Overview                           │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                                                                   │
//! │  stored_events                    publish_cursors                 │
//! │  ┌────────────────────┐           ┌──────────────────────┐        │
//! │  │ event_id (PK, AI)  │◄ ─ ─ ─ ─ ─│ last_published_id    │        │
//! │  │ event_type         │           │ channel (UNIQUE)     │        │
//! │  │ body               │           │ cursor_id (PK, AI)   │        │
//! │  │ occurred_on_ms     │           │ updated_ms           │        │
//! │  │ version            │           └──────────────────────┘        │
//! │  └────────────────────┘                                           │
//! │                                                                   │
//! │  notilog_metadata (key, value)                                    │
//! │                                                                   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why AUTOINCREMENT?
//!
//! A plain `INTEGER PRIMARY KEY` may reuse the highest rowid after a delete.
//! `AUTOINCREMENT` keeps the high-water mark in `sqlite_sequence`, so an id
//! is never handed out twice. Notification-log pages rely on this: a window
//! that has been archived must never gain or lose members.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};

use crate::{Error, Result};

// =============================================================================
// Schema Version
// =============================================================================

/// Current schema version. Increment when making breaking schema changes.
const SCHEMA_VERSION: i32 = 1;

// =============================================================================
// DDL Statements
// =============================================================================

/// The `stored_events` table is the append-only event log.
///
/// # Columns
///
/// - `event_id`: Sequence id, strictly increasing, never reused
/// - `event_type`: Tag selecting the decoder for `body`
/// - `body`: Serialized event (JSON text)
/// - `occurred_on_ms`: When the domain event happened (Unix milliseconds)
/// - `version`: Schema version of the body
const CREATE_STORED_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS stored_events (
    event_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type     TEXT NOT NULL,
    body           TEXT NOT NULL,
    occurred_on_ms INTEGER NOT NULL,
    version        INTEGER NOT NULL
)
"#;

/// The `publish_cursors` table holds one row per output channel.
///
/// `channel` is UNIQUE: two rows for the same channel would let two
/// publishers disagree about what was already sent.
const CREATE_PUBLISH_CURSORS: &str = r#"
CREATE TABLE IF NOT EXISTS publish_cursors (
    cursor_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    channel           TEXT NOT NULL UNIQUE,
    last_published_id INTEGER NOT NULL,
    updated_ms        INTEGER NOT NULL
)
"#;

/// Metadata table for schema versioning.
const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS notilog_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

// =============================================================================
// Database Wrapper
// =============================================================================

/// A SQLite connection with the notilog schema, shared by the repositories.
///
/// # Sharing
///
/// The connection sits behind a mutex so one `Arc<Database>` can back both
/// the event repository and the cursor repository. This also matters for
/// in-memory databases, which exist only inside the connection that created
/// them.
///
/// Holding the mutex for the duration of an insert is what makes id
/// assignment atomic with respect to concurrent appends in this process.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens a database file, creating and initializing it if necessary.
    ///
    /// # Errors
    ///
    /// - `Error::Sqlite` if the file can't be opened or created
    /// - `Error::Schema` if the schema version doesn't match
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use notilog::Database;
    ///
    /// let db = Database::open("events.db")?;
    /// # Ok::<(), notilog::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory database for testing.
    ///
    /// ```rust
    /// use notilog::Database;
    ///
    /// let db = Database::open_in_memory()?;
    /// # Ok::<(), notilog::Error>(())
    /// ```
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        initialize(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Locks the connection for exclusive use.
    ///
    /// # Errors
    ///
    /// `Error::Internal` if a previous holder panicked mid-operation.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("database connection mutex poisoned".to_string()))
    }
}

/// Sets pragmas, creates tables, and checks the schema version.
///
/// Every statement uses IF NOT EXISTS, so this is safe on an existing file.
fn initialize(conn: &mut Connection) -> Result<()> {
    // WAL: readers see a consistent snapshot while a write is in progress.
    conn.execute_batch("PRAGMA journal_mode = WAL")?;
    conn.execute_batch("PRAGMA synchronous = NORMAL")?;

    conn.execute_batch(CREATE_METADATA)?;
    conn.execute_batch(CREATE_STORED_EVENTS)?;
    conn.execute_batch(CREATE_PUBLISH_CURSORS)?;

    verify_or_set_version(conn)
}

/// Verifies the schema version, or sets it if this is a new database.
fn verify_or_set_version(conn: &Connection) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM notilog_metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO notilog_metadata (key, value) VALUES ('schema_version', ?)",
                [SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(v) if v == SCHEMA_VERSION.to_string() => {}
        Some(v) => {
            return Err(Error::Schema(format!(
                "schema version mismatch: database has version {v}, but this notilog version requires {SCHEMA_VERSION}"
            )));
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
