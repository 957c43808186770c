//! # Domain Types for notilog
//!
//! The core value types shared by the store, the notification log, and the
//! publisher: sequence ids, stored event records, and publish cursors.
//!
//! ## Invariants
//!
//! - [`EventId`]: strictly increasing, never reused, starts at 1. Zero is the
//!   sentinel for "nothing yet" (empty store, fresh cursor).
//! - [`EventRecord`]: immutable once persisted.
//! - [`PublishCursor`]: `last_published_id` only ever moves forward, and only
//!   after a successful publish.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Sequence Ids
// =============================================================================

/// The sequence id assigned to a stored event.
///
/// # Invariants
///
/// - Strictly increases with each event appended
/// - Never reused, even if a row were ever removed
/// - Starts at 1; [`EventId::NONE`] (0) means "no event"
///
/// Gaps are tolerated (a rolled-back insert may burn an id), decreases and
/// duplicates are not.
///
/// # Example
///
/// ```rust
/// use notilog::EventId;
///
/// let first = EventId::FIRST;
/// assert_eq!(first.next().as_raw(), 2);
/// assert!(EventId::NONE < first);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    /// Sentinel meaning "no event": the last id of an empty store, or the
    /// position of a cursor that has never published.
    pub const NONE: EventId = EventId(0);

    /// The first id the store hands out.
    pub const FIRST: EventId = EventId(1);

    /// Creates an EventId from a raw value.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw u64 value.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Returns the next id.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true for the [`EventId::NONE`] sentinel.
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// =============================================================================
// Event Records
// =============================================================================

/// An event ready to be persisted, before the repository assigns its id.
///
/// This is the "input" form handed to an
/// [`EventRepository`](crate::storage::EventRepository). Keeping it separate
/// from [`EventRecord`] means a record without an id cannot be mistaken for a
/// stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEventRecord {
    /// Tag selecting the decoder for `body`.
    pub event_type: String,

    /// Serialized payload. Opaque to the store.
    pub body: String,

    /// When the domain event happened (Unix milliseconds).
    pub occurred_on_ms: u64,

    /// Schema version of the payload.
    pub version: u32,
}

impl NewEventRecord {
    /// Attaches the id assigned by the repository.
    pub fn with_id(self, event_id: EventId) -> EventRecord {
        EventRecord {
            event_id,
            event_type: self.event_type,
            body: self.body,
            occurred_on_ms: self.occurred_on_ms,
            version: self.version,
        }
    }
}

/// A persisted event: the durable form every notification is rebuilt from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Sequence id assigned at append time.
    pub event_id: EventId,

    /// Tag selecting the decoder for `body`.
    pub event_type: String,

    /// Serialized payload.
    pub body: String,

    /// When the domain event happened (Unix milliseconds).
    pub occurred_on_ms: u64,

    /// Schema version of the payload.
    pub version: u32,
}

// =============================================================================
// Publish Cursors
// =============================================================================

/// Per-channel bookmark of the highest id handed to that channel's transport.
///
/// # Lifecycle
///
/// 1. Created in memory at id [`EventId::NONE`] the first time a channel is
///    published to (`cursor_id` is `None` until saved)
/// 2. Saved only after the publisher reports success
/// 3. Never moves backwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCursor {
    /// Row id, assigned by the cursor repository on first save.
    pub cursor_id: Option<i64>,

    /// Channel name, unique across cursors.
    pub channel: String,

    /// Highest id successfully published to this channel.
    pub last_published_id: EventId,

    /// When the cursor was last saved (Unix milliseconds, 0 if never).
    pub updated_ms: u64,
}

impl PublishCursor {
    /// Creates an unsaved cursor positioned before the first event.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            cursor_id: None,
            channel: channel.into(),
            last_published_id: EventId::NONE,
            updated_ms: 0,
        }
    }

    /// Returns true if the cursor has not been persisted yet.
    pub fn is_new(&self) -> bool {
        self.cursor_id.is_none()
    }
}

// =============================================================================
// Tests
// =============================================================================
