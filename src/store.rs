//! # Event Store
//!
//! [`EventStore`] is the write entry point for domain events and the read
//! side's source of truth. It serializes events through an [`EventCodec`],
//! hands the resulting records to an [`EventRepository`] for id assignment,
//! and decodes records back into domain values.
//!
//! ```text
//!   domain event ──► encode ──► NewEventRecord ──► repository.append ──► EventRecord (id)
//!                                                                            │
//!   E ◄── codec.decode(event_type, body) ◄───────── since / between ◄────────┘
//! ```
//!
//! The store itself does no locking. Atomic, monotonic id assignment is the
//! repository's job.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::codec::{DomainEvent, EventCodec};
use crate::error::{Error, Result};
use crate::storage::EventRepository;
use crate::types::{EventId, EventRecord, NewEventRecord};

/// Append-only event store decoding records into values of `E`.
pub struct EventStore<E> {
    repository: Arc<dyn EventRepository>,
    codec: EventCodec<E>,
}

impl<E> EventStore<E> {
    /// Creates a store over `repository`, decoding with `codec`.
    pub fn new(repository: Arc<dyn EventRepository>, codec: EventCodec<E>) -> Self {
        Self { repository, codec }
    }

    /// Serializes and persists a domain event.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the event is absent (see
    ///   [`DomainEvent::is_absent`]) or has an empty type tag
    /// - [`Error::Encode`] if serialization fails
    /// - Whatever the repository reports on persistence failure
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let stored = store.append(&OrderPlaced { order_id: "o-1".into(), occurred_on_ms: now })?;
    /// println!("stored as #{}", stored.event_id);
    /// ```
    pub fn append<T>(&self, event: &T) -> Result<EventRecord>
    where
        T: DomainEvent + Serialize + ?Sized,
    {
        if event.is_absent() {
            return Err(Error::InvalidArgument(
                "cannot append an absent event".to_string(),
            ));
        }

        let event_type = event.event_type();
        if event_type.is_empty() {
            return Err(Error::InvalidArgument(
                "event type tag must not be empty".to_string(),
            ));
        }

        let body = self.codec.encode(Some(event))?;
        let record = self.repository.append(NewEventRecord {
            event_type: event_type.to_string(),
            body,
            occurred_on_ms: event.occurred_on_ms(),
            version: event.event_version(),
        })?;

        tracing::debug!(
            event_id = record.event_id.as_raw(),
            event_type = %record.event_type,
            "appended event"
        );

        Ok(record)
    }

    /// All records stored after `after`, ascending. Pass [`EventId::NONE`]
    /// to read from the beginning.
    pub fn since(&self, after: EventId) -> Result<Vec<EventRecord>> {
        self.repository.since(after)
    }

    /// At most `limit` records stored after `after`, ascending.
    pub fn since_limited(&self, after: EventId, limit: usize) -> Result<Vec<EventRecord>> {
        self.repository.since_limited(after, limit)
    }

    /// All records with ids in `low..=high`, ascending.
    pub fn between(&self, low: EventId, high: EventId) -> Result<Vec<EventRecord>> {
        self.repository.between(low, high)
    }

    /// The highest assigned id, or [`EventId::NONE`] for an empty store.
    pub fn last_id(&self) -> Result<EventId> {
        self.repository.last_id()
    }

    /// Decodes a stored record back into its domain value.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownEventType`] if the record's tag has no decoder
    /// - [`Error::Decode`] if the body does not parse
    pub fn decode(&self, record: &EventRecord) -> Result<E> {
        self.codec
            .decode(&record.event_type, &record.body)
            .map_err(|e| {
                tracing::error!(
                    event_id = record.event_id.as_raw(),
                    event_type = %record.event_type,
                    error = %e,
                    "failed to decode stored event"
                );
                e
            })
    }

    /// The codec used for encoding and decoding.
    pub fn codec(&self) -> &EventCodec<E> {
        &self.codec
    }
}

impl<E> fmt::Debug for EventStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Database;
    use crate::storage::SqliteEventRepository;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counted {
        n: u64,
        occurred_on_ms: u64,
    }

    impl DomainEvent for Counted {
        fn event_type(&self) -> &str {
            "Counted"
        }

        fn occurred_on_ms(&self) -> u64 {
            self.occurred_on_ms
        }

        fn event_version(&self) -> u32 {
            2
        }
    }

    #[derive(Serialize)]
    struct Untagged {
        n: u8,
    }

    impl DomainEvent for Untagged {
        fn event_type(&self) -> &str {
            ""
        }

        fn occurred_on_ms(&self) -> u64 {
            0
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Reindexed;

    impl DomainEvent for Reindexed {
        fn event_type(&self) -> &str {
            "Reindexed"
        }

        fn occurred_on_ms(&self) -> u64 {
            7
        }
    }

    fn store() -> EventStore<Counted> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let repository = Arc::new(SqliteEventRepository::new(db));
        EventStore::new(repository, EventCodec::new().with::<Counted>("Counted"))
    }

    fn counted(n: u64) -> Counted {
        Counted {
            n,
            occurred_on_ms: 1_700_000_000_000 + n,
        }
    }

    #[test]
    fn test_append_builds_record_from_event() {
        let store = store();
        let record = store.append(&counted(1)).unwrap();

        assert_eq!(record.event_id, EventId::FIRST);
        assert_eq!(record.event_type, "Counted");
        assert_eq!(record.body, r#"{"n":1,"occurred_on_ms":1700000000001}"#);
        assert_eq!(record.occurred_on_ms, 1_700_000_000_001);
        assert_eq!(record.version, 2);
    }

    #[test]
    fn test_append_rejects_absent_event() {
        let store = store();
        let err = store.append(&None::<Counted>).unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(store.last_id().unwrap(), EventId::NONE, "nothing persisted");
    }

    #[test]
    fn test_append_fieldless_event() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store: EventStore<Reindexed> = EventStore::new(
            Arc::new(SqliteEventRepository::new(db)),
            EventCodec::new().with::<Reindexed>("Reindexed"),
        );

        let record = store.append(&Reindexed).unwrap();
        assert_eq!(record.event_type, "Reindexed");
        assert_eq!(record.body, "null");
        assert_eq!(store.decode(&record).unwrap(), Reindexed);

        let wrapped = store.append(&Some(Reindexed)).unwrap();
        assert_eq!(wrapped.event_id.as_raw(), 2);
        assert!(store.append(&None::<Reindexed>).is_err());
    }

    #[test]
    fn test_append_present_optional_event() {
        let store = store();
        let record = store.append(&Some(counted(4))).unwrap();
        assert_eq!(record.event_type, "Counted");
        assert_eq!(store.decode(&record).unwrap(), counted(4));
    }

    #[test]
    fn test_append_rejects_empty_type_tag() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store: EventStore<Counted> = EventStore::new(
            Arc::new(SqliteEventRepository::new(db)),
            EventCodec::new(),
        );

        let err = store.append(&Untagged { n: 1 }).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref msg) if msg.contains("type tag")));
    }

    #[test]
    fn test_ids_are_one_to_n_in_append_order() {
        let store = store();
        let ids: Vec<u64> = (1..=10)
            .map(|n| store.append(&counted(n)).unwrap().event_id.as_raw())
            .collect();

        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        assert_eq!(store.last_id().unwrap().as_raw(), 10);
    }

    #[test]
    fn test_since_and_between_decode_in_order() {
        let store = store();
        for n in 1..=7 {
            store.append(&counted(n)).unwrap();
        }

        let all: Vec<Counted> = store
            .since(EventId::NONE)
            .unwrap()
            .iter()
            .map(|r| store.decode(r).unwrap())
            .collect();
        assert_eq!(all, (1..=7).map(counted).collect::<Vec<_>>());

        let after_five = store.since(EventId::from_raw(5)).unwrap();
        assert_eq!(after_five.len(), 2);
        assert_eq!(after_five[0].event_id.as_raw(), 6);

        let middle = store
            .between(EventId::from_raw(2), EventId::from_raw(4))
            .unwrap();
        assert_eq!(
            middle.iter().map(|r| r.event_id.as_raw()).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        let store = store();
        let record = EventRecord {
            event_id: EventId::from_raw(99),
            event_type: "Vanished".to_string(),
            body: "{}".to_string(),
            occurred_on_ms: 0,
            version: 1,
        };

        assert!(matches!(
            store.decode(&record),
            Err(Error::UnknownEventType { ref event_type }) if event_type == "Vanished"
        ));
    }

    #[test]
    fn test_decode_corrupt_body() {
        let store = store();
        let record = EventRecord {
            event_id: EventId::from_raw(1),
            event_type: "Counted".to_string(),
            body: "not json".to_string(),
            occurred_on_ms: 0,
            version: 1,
        };

        assert!(matches!(store.decode(&record), Err(Error::Decode { .. })));
    }
}
