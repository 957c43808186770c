//! # notilog - Event Store and Notification Log
//!
//! notilog stores domain events durably and lets other systems consume the
//! complete, ordered history reliably, even when producers and consumers
//! crash, restart, or run at different speeds. It provides:
//!
//! - **Append-only event store**: every event gets a permanent, strictly
//!   increasing id that is never reused
//! - **Notification log**: fixed-width, linked pages of decoded events that
//!   become immutable (archived) once full
//! - **At-least-once publishing**: a per-channel cursor that only advances
//!   after the transport confirms delivery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     NotificationService                         │
//! │         (log pages on read, cursor-driven publishing)           │
//! └───────┬───────────────────────┬──────────────────────┬──────────┘
//!         │                       │                      │
//!         ▼                       ▼                      ▼
//! ┌───────────────┐     ┌───────────────────┐   ┌─────────────────────┐
//! │  EventStore   │     │ CursorRepository  │   │NotificationPublisher│
//! │ (+EventCodec) │     │  (per channel)    │   │  (external wire)    │
//! └───────┬───────┘     └─────────┬─────────┘   └─────────────────────┘
//!         │                       │
//!         ▼                       ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   SQLite (stored_events, publish_cursors)       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **Monotonic ids**: event ids strictly increase and are never reused
//! 2. **Archived pages are immutable**: once a page's upper bound is at or
//!    below the last id, its contents never change
//! 3. **No lost notifications**: a channel cursor only moves past events the
//!    publisher accepted
//! 4. **No skipped records**: an undecodable record fails the read instead
//!    of leaving a hole
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use notilog::*;
//!
//! let db = Arc::new(Database::open("events.db")?);
//! let store = Arc::new(EventStore::new(
//!     Arc::new(SqliteEventRepository::new(db.clone())),
//!     EventCodec::new().with::<OrderPlaced>("OrderPlaced"),
//! ));
//! let service = Arc::new(NotificationService::new(
//!     store.clone(),
//!     Arc::new(SqliteCursorRepository::new(db)),
//!     Arc::new(SystemClock),
//!     ServiceConfig::from_env()?,
//! )?);
//!
//! store.append(&OrderPlaced { order_id: "o-1".into(), occurred_on_ms: 0 })?;
//! let page = service.current_notification_log(20)?;
//! ```
//!
//! ## Module Organization
//!
//! - [`error`]: Error enum and `Result` alias
//! - [`schema`]: SQLite DDL and database initialization
//! - [`types`]: Event ids, records, publish cursors
//! - [`storage`]: Repository traits and their SQLite implementations
//! - [`codec`]: JSON encoding and the type-tag decoder registry
//! - [`store`]: The event store
//! - [`window`]: Notification log window ids
//! - [`notification`]: Decoded notifications and their JSON form
//! - [`log`]: Notification log pages
//! - [`reader`]: Typed access to notification JSON documents
//! - [`publisher`]: Publisher contract and the in-process broadcast publisher
//! - [`service`]: The notification service and its configuration
//! - [`clock`]: Injectable time source

pub mod error;

/// SQLite schema definitions and database initialization.
pub mod schema;

/// Domain types: event ids, stored records, and publish cursors.
pub mod types;

/// Repository traits for events and cursors, backed by SQLite.
pub mod storage;

/// Event encoding and the decoder registry.
pub mod codec;

pub mod store;

/// Window ids identifying notification log pages.
pub mod window;

pub mod notification;

pub mod log;

pub mod reader;

/// Shipping notifications to channels.
///
/// See [`publisher::NotificationPublisher`] for the contract and
/// [`publisher::BroadcastPublisher`] for the in-process implementation.
pub mod publisher;

pub mod service;

pub mod clock;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{DomainEvent, EventCodec, NULL_SENTINEL};
pub use error::{Error, Result};
pub use log::NotificationLog;
pub use notification::{Notification, NotificationFactory};
pub use publisher::{BroadcastPublisher, ChannelSubscription, NotificationPublisher, TransportError};
pub use reader::NotificationReader;
pub use schema::Database;
pub use service::{NotificationService, ServiceConfig};
pub use storage::{CursorRepository, EventRepository, SqliteCursorRepository, SqliteEventRepository};
pub use store::EventStore;
pub use types::{EventId, EventRecord, NewEventRecord, PublishCursor};
pub use window::WindowId;

// Implementors of NotificationPublisher need the same macro.
pub use async_trait::async_trait;
