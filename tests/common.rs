#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notilog::{
    async_trait, Database, DomainEvent, EventCodec, EventRecord, EventStore, FixedClock,
    Notification, NotificationPublisher, NotificationService, ServiceConfig,
    SqliteCursorRepository, SqliteEventRepository, TransportError,
};
use serde::{Deserialize, Serialize};

pub const START_MS: u64 = 1_700_000_000_000;

// =============================================================================
// Test Domain
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: String,
    pub total_cents: i64,
    pub occurred_on_ms: u64,
}

impl DomainEvent for OrderPlaced {
    fn event_type(&self) -> &str {
        "OrderPlaced"
    }

    fn occurred_on_ms(&self) -> u64 {
        self.occurred_on_ms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: String,
    pub carrier: String,
    pub occurred_on_ms: u64,
}

impl DomainEvent for OrderShipped {
    fn event_type(&self) -> &str {
        "OrderShipped"
    }

    fn occurred_on_ms(&self) -> u64 {
        self.occurred_on_ms
    }

    fn event_version(&self) -> u32 {
        2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OrderEvent {
    Placed(OrderPlaced),
    Shipped(OrderShipped),
}

impl From<OrderPlaced> for OrderEvent {
    fn from(e: OrderPlaced) -> Self {
        OrderEvent::Placed(e)
    }
}

impl From<OrderShipped> for OrderEvent {
    fn from(e: OrderShipped) -> Self {
        OrderEvent::Shipped(e)
    }
}

pub fn codec() -> EventCodec<OrderEvent> {
    EventCodec::new()
        .with::<OrderPlaced>("OrderPlaced")
        .with::<OrderShipped>("OrderShipped")
}

pub fn placed(n: u64) -> OrderPlaced {
    OrderPlaced {
        order_id: format!("order-{n}"),
        total_cents: (n as i64) * 100,
        occurred_on_ms: START_MS + n,
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub struct Harness {
    pub db: Arc<Database>,
    pub store: Arc<EventStore<OrderEvent>>,
    pub events: Arc<SqliteEventRepository>,
    pub cursors: Arc<SqliteCursorRepository>,
    pub clock: Arc<FixedClock>,
    pub service: Arc<NotificationService<OrderEvent>>,
}

impl Harness {
    pub fn in_memory(config: ServiceConfig) -> Self {
        Self::from_db(Database::open_in_memory().expect("open in-memory db"), config)
    }

    pub fn at(path: &Path, config: ServiceConfig) -> Self {
        Self::from_db(Database::open(path).expect("open db file"), config)
    }

    fn from_db(db: Database, config: ServiceConfig) -> Self {
        let db = Arc::new(db);
        let events = Arc::new(SqliteEventRepository::new(db.clone()));
        let cursors = Arc::new(SqliteCursorRepository::new(db.clone()));
        let clock = Arc::new(FixedClock::new(START_MS));
        let store = Arc::new(EventStore::new(events.clone(), codec()));
        let service = Arc::new(
            NotificationService::new(store.clone(), cursors.clone(), clock.clone(), config)
                .expect("valid config"),
        );
        Self {
            db,
            store,
            events,
            cursors,
            clock,
            service,
        }
    }

    /// Appends `OrderPlaced` events numbered `from..=to`.
    pub fn append_placed(&self, from: u64, to: u64) -> Vec<EventRecord> {
        (from..=to)
            .map(|n| self.store.append(&placed(n)).expect("append"))
            .collect()
    }
}

pub fn create_temp_db_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let _ = Database::open(&path).expect("initialize database");
    (dir, path)
}

pub fn ids<E>(notifications: &[Notification<E>]) -> Vec<u64> {
    notifications
        .iter()
        .map(|n| n.stored_event_id.as_raw())
        .collect()
}

pub async fn eventually<T>(
    timeout: Duration,
    interval: Duration,
    mut f: impl FnMut() -> Option<T>,
) -> T {
    let start = std::time::Instant::now();
    loop {
        if let Some(v) = f() {
            return v;
        }
        if start.elapsed() > timeout {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(interval).await;
    }
}

// =============================================================================
// Publishers
// =============================================================================

/// Records every successful batch; fails the first `fail_times` calls.
#[derive(Default)]
pub struct RecordingPublisher {
    fail_remaining: AtomicUsize,
    delivered_before_failure: usize,
    attempts: AtomicUsize,
    delay: Option<Duration>,
    batches: Mutex<Vec<(String, Vec<u64>)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: usize) -> Self {
        Self {
            fail_remaining: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    /// Fails `times` times, each time after the first `delivered` ids of
    /// the batch already reached the channel.
    pub fn failing_after(delivered: usize, times: usize) -> Self {
        Self {
            fail_remaining: AtomicUsize::new(times),
            delivered_before_failure: delivered,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<(String, Vec<u64>)> {
        self.batches.lock().unwrap().clone()
    }

    /// Every id delivered to `channel`, in delivery order, duplicates kept.
    pub fn delivered(&self, channel: &str) -> Vec<u64> {
        self.batches()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .flat_map(|(_, ids)| ids)
            .collect()
    }
}

#[async_trait]
impl NotificationPublisher<OrderEvent> for RecordingPublisher {
    async fn publish(
        &self,
        notifications: &[Notification<OrderEvent>],
        channel: &str,
    ) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            let shipped = notifications.len().min(self.delivered_before_failure);
            if shipped > 0 {
                self.batches
                    .lock()
                    .unwrap()
                    .push((channel.to_string(), ids(&notifications[..shipped])));
            }
            return Err(TransportError::new("broker unavailable"));
        }

        self.batches
            .lock()
            .unwrap()
            .push((channel.to_string(), ids(notifications)));
        Ok(())
    }
}
