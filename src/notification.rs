//! Read-side notifications and their boundary JSON form.
//!
//! A [`Notification`] is a stored record with its body decoded back into
//! the domain value. It exists only while a page is being built or a batch
//! is being published; it is never persisted.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::store::EventStore;
use crate::types::{EventId, EventRecord};

/// A decoded event as consumers see it.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification<E> {
    /// Tag the event was stored under.
    pub event_type: String,
    /// Id of the underlying stored record.
    pub stored_event_id: EventId,
    /// When the event happened (Unix milliseconds).
    pub occurred_on_ms: u64,
    /// Schema version of the stored body.
    pub version: u32,
    /// The decoded domain event.
    pub event: E,
}

impl<E: Serialize> Notification<E> {
    /// Renders the notification as the document handed across process
    /// boundaries:
    ///
    /// ```text
    /// {
    ///   "notificationId": 12,
    ///   "typeName": "OrderPlaced",
    ///   "occurredOn": 1700000000000,
    ///   "version": 1,
    ///   "event": { ... }
    /// }
    /// ```
    ///
    /// Read it back with [`NotificationReader`](crate::NotificationReader).
    pub fn to_json(&self) -> Result<Value> {
        let event = serde_json::to_value(&self.event).map_err(Error::Encode)?;
        Ok(json!({
            "notificationId": self.stored_event_id.as_raw(),
            "typeName": self.event_type,
            "occurredOn": self.occurred_on_ms,
            "version": self.version,
            "event": event,
        }))
    }
}

/// Rebuilds notifications from stored records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFactory;

impl NotificationFactory {
    /// Decodes one record into a notification.
    ///
    /// # Errors
    ///
    /// Whatever [`EventStore::decode`] reports. Nothing is skipped.
    pub fn notification_from<E>(store: &EventStore<E>, record: &EventRecord) -> Result<Notification<E>> {
        Ok(Notification {
            event_type: record.event_type.clone(),
            stored_event_id: record.event_id,
            occurred_on_ms: record.occurred_on_ms,
            version: record.version,
            event: store.decode(record)?,
        })
    }

    /// Decodes records in order. Fails on the first record that does not
    /// decode.
    pub fn notifications_from<E>(
        store: &EventStore<E>,
        records: &[EventRecord],
    ) -> Result<Vec<Notification<E>>> {
        records
            .iter()
            .map(|record| Self::notification_from(store, record))
            .collect()
    }
}
