//! # Notification Service
//!
//! The service sits between the event store and everything downstream. It
//! serves two paths:
//!
//! ## Read Path: Notification Log Pages
//!
//! Consumers pull fixed-width pages by [`WindowId`]. The current page is
//! derived from the store's last id; every other page is reached by
//! following `next`/`previous` links.
//!
//! ```text
//!   consumer ──► current_notification_log(5) ──► "11,15" (3 items, not archived)
//!            ──► notification_log("6,10")     ──► "6,10"  (5 items, archived)
//! ```
//!
//! ## Push Path: Channel Publishing
//!
//! ```text
//!   ┌─────────────────────── per-channel lock held ───────────────────────┐
//!   │                                                                     │
//!   │  cursor = cursors[channel] or new(0)                                │
//!   │  pending = decode(store.since(cursor))          (spawn_blocking)    │
//!   │  publisher.publish(pending, channel)            (with timeout)      │
//!   │  cursor = pending.last; cursors.save(cursor)    (Ok only)           │
//!   │                                                                     │
//!   └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cursor only moves after the publisher succeeds. A crash or failure
//! between shipping and saving means the batch is shipped again, never
//! lost. Consumers dedupe by `stored_event_id`.
//!
//! Publishes to one channel are serialized by an async mutex; different
//! channels proceed independently.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::log::NotificationLog;
use crate::notification::{Notification, NotificationFactory};
use crate::publisher::NotificationPublisher;
use crate::storage::CursorRepository;
use crate::store::EventStore;
use crate::types::{EventId, PublishCursor};
use crate::window::WindowId;

// =============================================================================
// Configuration
// =============================================================================

/// Default page width for [`NotificationService::current_notification_log_default`].
pub const DEFAULT_BATCH_SIZE: u64 = 20;

/// Default upper bound on one publisher call.
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 30_000;

/// Default delay between runs of a spawned channel publisher.
pub const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 5_000;

const ENV_BATCH_SIZE: &str = "NOTILOG_BATCH_SIZE";
const ENV_PUBLISH_TIMEOUT_MS: &str = "NOTILOG_PUBLISH_TIMEOUT_MS";
const ENV_PUBLISH_INTERVAL_MS: &str = "NOTILOG_PUBLISH_INTERVAL_MS";
const ENV_MAX_PUBLISH_BATCH: &str = "NOTILOG_MAX_PUBLISH_BATCH";

/// Configuration for [`NotificationService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Page width used when the caller does not pick one.
    pub default_batch_size: u64,

    /// Upper bound on a single publisher call. Elapsing counts as a failed
    /// publish.
    pub publish_timeout: Duration,

    /// Delay between runs of a task started by
    /// [`NotificationService::spawn_channel_publisher`].
    pub publish_interval: Duration,

    /// Ship at most this many notifications per publish call. `None` ships
    /// everything pending.
    pub max_publish_batch: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_batch_size: DEFAULT_BATCH_SIZE,
            publish_timeout: Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS),
            publish_interval: Duration::from_millis(DEFAULT_PUBLISH_INTERVAL_MS),
            max_publish_batch: None,
        }
    }
}

impl ServiceConfig {
    pub fn with_default_batch_size(mut self, batch_size: u64) -> Self {
        self.default_batch_size = batch_size;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }

    pub fn with_max_publish_batch(mut self, max: usize) -> Self {
        self.max_publish_batch = Some(max);
        self
    }

    /// Reads overrides from the environment, falling back to defaults for
    /// unset variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `NOTILOG_BATCH_SIZE` | `default_batch_size` |
    /// | `NOTILOG_PUBLISH_TIMEOUT_MS` | `publish_timeout` |
    /// | `NOTILOG_PUBLISH_INTERVAL_MS` | `publish_interval` |
    /// | `NOTILOG_MAX_PUBLISH_BATCH` | `max_publish_batch` |
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if a variable is set but unparseable, or
    /// the resulting config fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = parse_var::<u64>(&lookup, ENV_BATCH_SIZE)? {
            config.default_batch_size = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, ENV_PUBLISH_TIMEOUT_MS)? {
            config.publish_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, ENV_PUBLISH_INTERVAL_MS)? {
            config.publish_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<usize>(&lookup, ENV_MAX_PUBLISH_BATCH)? {
            config.max_publish_batch = Some(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] on a zero batch size, timeout, interval,
    /// or publish batch limit.
    pub fn validate(&self) -> Result<()> {
        if self.default_batch_size == 0 {
            return Err(Error::InvalidArgument("default batch size must be positive".to_string()));
        }
        if self.publish_timeout.is_zero() {
            return Err(Error::InvalidArgument("publish timeout must be positive".to_string()));
        }
        if self.publish_interval.is_zero() {
            return Err(Error::InvalidArgument("publish interval must be positive".to_string()));
        }
        if self.max_publish_batch == Some(0) {
            return Err(Error::InvalidArgument("max publish batch must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidArgument(format!("{key}: cannot parse '{raw}'"))),
    }
}

// =============================================================================
// Service
// =============================================================================

/// Serves notification log pages and publishes unsent notifications to
/// channels.
///
/// One publish lock per channel name is kept for the life of the service.
/// Channel names are expected to be a small, fixed set.
pub struct NotificationService<E> {
    store: Arc<EventStore<E>>,
    cursors: Arc<dyn CursorRepository>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
    channel_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<E> NotificationService<E> {
    /// Creates a service.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `config` fails validation.
    pub fn new(
        store: Arc<EventStore<E>>,
        cursors: Arc<dyn CursorRepository>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            cursors,
            clock,
            config,
            channel_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<EventStore<E>> {
        &self.store
    }

    /// The window holding the most recent event, paged by `batch_size`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `batch_size` is zero.
    pub fn current_notification_log_id(&self, batch_size: u64) -> Result<WindowId> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be positive".to_string()));
        }
        WindowId::current(self.store.last_id()?, batch_size)
    }

    /// The page holding the most recent event.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// // 13 events stored
    /// let page = service.current_notification_log(5)?;
    /// assert_eq!(page.id().to_string(), "11,15");
    /// assert_eq!(page.len(), 3);
    /// assert!(!page.is_archived());
    /// ```
    pub fn current_notification_log(&self, batch_size: u64) -> Result<NotificationLog<E>> {
        let id = self.current_notification_log_id(batch_size)?;
        self.notification_log(&id)
    }

    /// [`current_notification_log`](Self::current_notification_log) with the
    /// configured default batch size.
    pub fn current_notification_log_default(&self) -> Result<NotificationLog<E>> {
        self.current_notification_log(self.config.default_batch_size)
    }

    /// Materializes the page for `id`.
    ///
    /// The last id is read before the page contents, and the contents are
    /// clamped to it. A page reported archived therefore always holds every
    /// event in its window.
    pub fn notification_log(&self, id: &WindowId) -> Result<NotificationLog<E>> {
        let last = self.store.last_id()?;
        let last_raw = i64::try_from(last.as_raw()).unwrap_or(i64::MAX);

        let low = id.low().max(1);
        let high = id.high().min(last_raw);
        let records = if high < low {
            Vec::new()
        } else {
            // Both bounds are >= 1 here.
            self.store
                .between(EventId::from_raw(low as u64), EventId::from_raw(high as u64))?
        };
        let notifications = NotificationFactory::notifications_from(&*self.store, &records)?;

        let archived = id.high() <= last_raw;
        let next = (id.high() < last_raw).then(|| id.next());
        let previous = (id.low() > 1).then(|| id.previous());

        tracing::debug!(
            window = %id,
            count = notifications.len(),
            archived,
            "read notification log page"
        );

        Ok(NotificationLog::new(*id, next, previous, notifications, archived))
    }

    fn channel_lock(&self, channel: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .channel_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(channel.to_string()).or_default())
    }
}

impl<E> NotificationService<E>
where
    E: Send + Sync + 'static,
{
    /// Publishes every notification not yet delivered to `channel`, then
    /// advances the channel's cursor.
    ///
    /// Returns the number of notifications shipped. A channel that is
    /// already caught up returns `Ok(0)` without calling the publisher.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an empty channel name
    /// - [`Error::Transport`] if the publisher fails
    /// - [`Error::PublishTimeout`] if it exceeds `publish_timeout`
    /// - Decode and storage errors from reading the pending records
    ///
    /// The cursor is untouched on every error path.
    pub async fn publish_notifications<P>(&self, channel: &str, publisher: &P) -> Result<usize>
    where
        P: NotificationPublisher<E> + ?Sized,
    {
        if channel.trim().is_empty() {
            return Err(Error::InvalidArgument("channel name must not be empty".to_string()));
        }

        let lock = self.channel_lock(channel);
        let _guard = lock.lock().await;

        let (mut cursor, pending) = self.load_pending(channel).await?;
        let Some(last_shipped) = pending.last().map(|n| n.stored_event_id) else {
            tracing::debug!(
                channel,
                last_published_id = cursor.last_published_id.as_raw(),
                "channel is caught up"
            );
            return Ok(0);
        };

        let timeout = self.config.publish_timeout;
        match tokio::time::timeout(timeout, publisher.publish(&pending, channel)).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                tracing::warn!(channel, count = pending.len(), error = %source, "publish failed");
                return Err(Error::Transport {
                    channel: channel.to_string(),
                    source,
                });
            }
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(channel, count = pending.len(), timeout_ms, "publish timed out");
                return Err(Error::PublishTimeout {
                    channel: channel.to_string(),
                    timeout_ms,
                });
            }
        }

        cursor.last_published_id = last_shipped;
        cursor.updated_ms = self.clock.now_ms();
        let cursors = Arc::clone(&self.cursors);
        let cursor = tokio::task::spawn_blocking(move || cursors.save(cursor))
            .await
            .map_err(|e| Error::Internal(format!("cursor save task failed: {e}")))??;

        tracing::info!(
            channel,
            count = pending.len(),
            last_published_id = cursor.last_published_id.as_raw(),
            "advanced publish cursor"
        );

        Ok(pending.len())
    }

    /// Reads the channel cursor and decodes everything after it.
    async fn load_pending(&self, channel: &str) -> Result<(PublishCursor, Vec<Notification<E>>)> {
        let store = Arc::clone(&self.store);
        let cursors = Arc::clone(&self.cursors);
        let channel = channel.to_string();
        let limit = self.config.max_publish_batch;

        tokio::task::spawn_blocking(move || -> Result<(PublishCursor, Vec<Notification<E>>)> {
            let cursor = cursors
                .find_by_channel(&channel)?
                .unwrap_or_else(|| PublishCursor::new(channel));
            let records = match limit {
                Some(limit) => store.since_limited(cursor.last_published_id, limit)?,
                None => store.since(cursor.last_published_id)?,
            };
            let pending = NotificationFactory::notifications_from(&*store, &records)?;
            Ok((cursor, pending))
        })
        .await
        .map_err(|e| Error::Internal(format!("pending read task failed: {e}")))?
    }

    /// Starts a task that publishes `channel` every `publish_interval`.
    ///
    /// Failures are logged and retried on the next tick; the cursor makes
    /// every retry pick up where the last success left off. Abort the
    /// returned handle to stop the task.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let task = service.spawn_channel_publisher("orders", publisher.clone());
    /// // ...
    /// task.abort();
    /// ```
    pub fn spawn_channel_publisher(
        self: &Arc<Self>,
        channel: impl Into<String>,
        publisher: Arc<dyn NotificationPublisher<E>>,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let channel = channel.into();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.config.publish_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                match service.publish_notifications(&channel, publisher.as_ref()).await {
                    Ok(_) => {}
                    Err(e) if e.is_retryable() => {
                        // Already logged at warn by publish_notifications.
                    }
                    Err(e) => {
                        tracing::error!(channel = %channel, error = %e, "channel publisher run failed");
                    }
                }
            }
        })
    }
}

impl<E> fmt::Debug for NotificationService<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationService")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
