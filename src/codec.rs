//! # Event Encoding and Decoding
//!
//! This module turns domain events into stored bodies and back. Encoding is
//! plain JSON via `serde_json`. Decoding goes through an explicit registry
//! that maps each type tag to a decode function, populated at startup by
//! whatever part of the application knows every event shape.
//!
//! ## Why a Registry?
//!
//! A stored record only carries a string tag. Something has to map that tag
//! to a concrete type. Doing it with an explicit table means an unknown tag
//! is a plain lookup miss ([`Error::UnknownEventType`]) that can be reported
//! with the offending tag, rather than a runtime loader failure.
//!
//! ```text
//!   "OrderPlaced"  ──►  |body| serde_json::from_str::<OrderPlaced>(body).map(Into::into)
//!   "OrderShipped" ──►  |body| serde_json::from_str::<OrderShipped>(body).map(Into::into)
//! ```
//!
//! ## Absent Events
//!
//! Encoding `None` yields [`NULL_SENTINEL`]. The store rejects absent events
//! through [`DomainEvent::is_absent`] before encoding, so a present event
//! whose body happens to be `null` (a unit struct) still appends.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

// =============================================================================
// Domain Event Contract
// =============================================================================

/// The body an absent event encodes to.
pub const NULL_SENTINEL: &str = "null";

/// Metadata every appendable domain event exposes.
///
/// The store takes the type tag, occurrence time and version from here and
/// serializes the event itself as the record body.
///
/// # Example
///
/// ```rust
/// use notilog::DomainEvent;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct OrderPlaced {
///     order_id: String,
///     occurred_on_ms: u64,
/// }
///
/// impl DomainEvent for OrderPlaced {
///     fn event_type(&self) -> &str {
///         "OrderPlaced"
///     }
///
///     fn occurred_on_ms(&self) -> u64 {
///         self.occurred_on_ms
///     }
/// }
/// ```
pub trait DomainEvent {
    /// Tag identifying how to decode the stored body.
    fn event_type(&self) -> &str;

    /// When the event happened (Unix milliseconds).
    fn occurred_on_ms(&self) -> u64;

    /// Schema version of this event's shape.
    fn event_version(&self) -> u32 {
        1
    }

    /// True when there is no event to store. Only wrappers such as
    /// `Option<T>` ever report absence.
    fn is_absent(&self) -> bool {
        false
    }
}

/// An optional event is the event when present. When absent it has no tag
/// and the store refuses to append it.
impl<T: DomainEvent> DomainEvent for Option<T> {
    fn event_type(&self) -> &str {
        self.as_ref().map_or("", DomainEvent::event_type)
    }

    fn occurred_on_ms(&self) -> u64 {
        self.as_ref().map_or(0, DomainEvent::occurred_on_ms)
    }

    fn event_version(&self) -> u32 {
        self.as_ref().map_or(0, DomainEvent::event_version)
    }

    fn is_absent(&self) -> bool {
        self.as_ref().map_or(true, DomainEvent::is_absent)
    }
}

// =============================================================================
// Codec
// =============================================================================

type DecodeFn<E> = Box<dyn Fn(&str) -> serde_json::Result<E> + Send + Sync>;

/// JSON encoder plus a type-tag → decoder registry producing values of `E`.
///
/// `E` is usually an enum over every event the application stores, with a
/// `From` impl per variant payload.
///
/// # Example
///
/// ```rust
/// use notilog::EventCodec;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Deposited { amount: u64 }
///
/// #[derive(Debug)]
/// enum AccountEvent { Deposited(Deposited) }
///
/// impl From<Deposited> for AccountEvent {
///     fn from(e: Deposited) -> Self { AccountEvent::Deposited(e) }
/// }
///
/// let codec = EventCodec::<AccountEvent>::new().with::<Deposited>("Deposited");
/// let event = codec.decode("Deposited", r#"{"amount":5}"#)?;
/// assert!(matches!(event, AccountEvent::Deposited(Deposited { amount: 5 })));
/// # Ok::<(), notilog::Error>(())
/// ```
pub struct EventCodec<E> {
    decoders: HashMap<String, DecodeFn<E>>,
}

impl<E: 'static> EventCodec<E> {
    /// Creates a codec with no decoders registered.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers `T` as the shape stored under `event_type`.
    ///
    /// Re-registering a tag replaces the previous decoder.
    pub fn register<T>(&mut self, event_type: impl Into<String>) -> &mut Self
    where
        T: DeserializeOwned + Into<E> + 'static,
    {
        self.register_with(event_type, |body| {
            serde_json::from_str::<T>(body).map(Into::into)
        })
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T>(mut self, event_type: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Into<E> + 'static,
    {
        self.register::<T>(event_type);
        self
    }

    /// Registers a custom decode function for `event_type`.
    ///
    /// Use this when a tag needs more than a straight deserialize, e.g. to
    /// upcast an old payload version.
    pub fn register_with<F>(&mut self, event_type: impl Into<String>, decode: F) -> &mut Self
    where
        F: Fn(&str) -> serde_json::Result<E> + Send + Sync + 'static,
    {
        self.decoders.insert(event_type.into(), Box::new(decode));
        self
    }
}

impl<E> EventCodec<E> {
    /// Returns true if a decoder exists for `event_type`.
    pub fn is_registered(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Returns every registered tag, sorted.
    pub fn event_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Serializes an event, or returns [`NULL_SENTINEL`] for `None`.
    pub fn encode<T>(&self, event: Option<&T>) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        match event {
            Some(event) => serde_json::to_string(event).map_err(Error::Encode),
            None => Ok(NULL_SENTINEL.to_string()),
        }
    }

    /// Decodes `body` with the decoder registered for `event_type`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownEventType`] if no decoder is registered for the tag
    /// - [`Error::Decode`] if the decoder rejects the body
    pub fn decode(&self, event_type: &str, body: &str) -> Result<E> {
        let decoder = self
            .decoders
            .get(event_type)
            .ok_or_else(|| Error::UnknownEventType {
                event_type: event_type.to_string(),
            })?;

        decoder(body).map_err(|source| Error::Decode {
            event_type: event_type.to_string(),
            source,
        })
    }
}

impl<E: 'static> Default for EventCodec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventCodec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCodec")
            .field("event_types", &self.event_types())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
