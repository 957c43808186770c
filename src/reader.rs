//! # Notification Reader
//!
//! Consumers on the far side of a channel usually don't share the
//! producer's event types. [`NotificationReader`] gives them typed access to
//! the boundary document produced by
//! [`Notification::to_json`](crate::Notification::to_json) without defining
//! any of those types.
//!
//! ## Paths
//!
//! Event fields are addressed with dotted paths. Each segment descends one
//! object key; a segment that parses as an integer also indexes into arrays.
//!
//! ```text
//!   {"event": {"order": {"id": "o-1", "lines": [{"sku": "A"}]}}}
//!
//!   "order.id"           → "o-1"
//!   "order.lines.0.sku"  → "A"
//!   "order.missing"      → None
//! ```

use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};

/// Typed accessors over one notification document.
///
/// # Example
///
/// ```rust
/// use notilog::NotificationReader;
///
/// let reader: NotificationReader = r#"{
///     "notificationId": 7,
///     "typeName": "OrderPlaced",
///     "occurredOn": 1700000000000,
///     "version": 1,
///     "event": {"order": {"id": "o-1", "total": 250, "paid": true}}
/// }"#.parse()?;
///
/// assert_eq!(reader.notification_id(), Some(7));
/// assert_eq!(reader.type_name(), Some("OrderPlaced"));
/// assert_eq!(reader.event_string_value("order.id"), Some("o-1"));
/// assert_eq!(reader.event_i64_value("order.total"), Some(250));
/// assert_eq!(reader.event_bool_value("order.paid"), Some(true));
/// # Ok::<(), notilog::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationReader {
    document: Value,
}

impl NotificationReader {
    /// Wraps an already-parsed document.
    pub fn new(document: Value) -> Self {
        Self { document }
    }

    pub fn notification_id(&self) -> Option<u64> {
        self.document.get("notificationId").and_then(Value::as_u64)
    }

    pub fn type_name(&self) -> Option<&str> {
        self.document.get("typeName").and_then(Value::as_str)
    }

    pub fn occurred_on_ms(&self) -> Option<u64> {
        self.document.get("occurredOn").and_then(Value::as_u64)
    }

    pub fn version(&self) -> Option<u32> {
        self.document
            .get("version")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// The raw `event` payload.
    pub fn event(&self) -> Option<&Value> {
        self.document.get("event")
    }

    /// The value at `path` inside the event payload. An empty path returns
    /// the payload itself.
    pub fn event_value(&self, path: &str) -> Option<&Value> {
        let event = self.event()?;
        if path.is_empty() {
            return Some(event);
        }
        path.split('.').try_fold(event, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    pub fn event_string_value(&self, path: &str) -> Option<&str> {
        self.event_value(path).and_then(Value::as_str)
    }

    pub fn event_i64_value(&self, path: &str) -> Option<i64> {
        self.event_value(path).and_then(Value::as_i64)
    }

    pub fn event_bool_value(&self, path: &str) -> Option<bool> {
        self.event_value(path).and_then(Value::as_bool)
    }

    /// The whole document.
    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl FromStr for NotificationReader {
    type Err = Error;

    /// Parses a document from JSON text.
    ///
    /// Fails with [`Error::InvalidArgument`] if the text is not JSON or not
    /// an object.
    fn from_str(text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)
            .map_err(|e| Error::InvalidArgument(format!("notification is not valid JSON: {e}")))?;
        if !document.is_object() {
            return Err(Error::InvalidArgument(
                "notification document must be a JSON object".to_string(),
            ));
        }
        Ok(Self { document })
    }
}
