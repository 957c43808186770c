//! # Notification Publishing
//!
//! The service hands each batch of pending notifications to a
//! [`NotificationPublisher`]. The publisher owns the wire: a message broker,
//! a webhook, an in-process channel. The service owns the cursor. It only
//! advances a channel's cursor after `publish` returns `Ok`, so a publisher
//! that reports failure will see the same notifications again on the next
//! attempt.
//!
//! ```text
//!   NotificationService ──publish(batch, "orders")──► NotificationPublisher
//!          │                                                 │
//!          │◄──────────── Ok(()) / Err(TransportError) ──────┘
//!          ▼
//!   advance cursor (Ok only)
//! ```
//!
//! [`BroadcastPublisher`] is the in-process implementation: one tokio
//! broadcast channel per channel name, read through [`ChannelSubscription`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::notification::Notification;

/// Default per-channel buffer of [`BroadcastPublisher`].
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

// =============================================================================
// Publisher Contract
// =============================================================================

/// Failure reported by a publisher's transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Ships notifications to a named channel.
///
/// Implementations must either deliver the whole batch, in order, or return
/// an error. Partial delivery followed by an error is acceptable: the batch
/// is re-sent and consumers dedupe by `stored_event_id`.
#[async_trait]
pub trait NotificationPublisher<E: Send + Sync>: Send + Sync {
    async fn publish(
        &self,
        notifications: &[Notification<E>],
        channel: &str,
    ) -> std::result::Result<(), TransportError>;
}

// =============================================================================
// In-Process Broadcast
// =============================================================================

/// Publisher fanning notifications out to in-process subscribers.
///
/// Channels are created on first use by either side. Publishing to a
/// channel nobody is subscribed to fails with a [`TransportError`], so the
/// cursor stays put until a consumer shows up.
///
/// # Example
///
/// ```rust,ignore
/// let publisher = Arc::new(BroadcastPublisher::<OrderEvent>::new());
/// let mut orders = publisher.subscribe("orders");
///
/// service.publish_notifications("orders", publisher.as_ref()).await?;
///
/// while let Some(Ok(n)) = orders.try_next() {
///     println!("#{} {}", n.stored_event_id, n.event_type);
/// }
/// ```
pub struct BroadcastPublisher<E> {
    channels: Mutex<HashMap<String, broadcast::Sender<Notification<E>>>>,
    capacity: usize,
}

impl<E: Clone> BroadcastPublisher<E> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    /// Creates a publisher whose channels buffer up to `capacity`
    /// notifications per subscriber before the slowest one lags.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribes to `channel`, receiving everything published after this
    /// call.
    pub fn subscribe(&self, channel: &str) -> ChannelSubscription<E> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let receiver = match channels.get(channel) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(self.capacity);
                channels.insert(channel.to_string(), sender);
                receiver
            }
        };
        ChannelSubscription::new(receiver)
    }

    /// Number of live subscribers on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self, channel: &str) -> Option<broadcast::Sender<Notification<E>>> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
    }
}

impl<E: Clone> Default for BroadcastPublisher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for BroadcastPublisher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels: Vec<String> = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("BroadcastPublisher")
            .field("channels", &channels)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[async_trait]
impl<E> NotificationPublisher<E> for BroadcastPublisher<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn publish(
        &self,
        notifications: &[Notification<E>],
        channel: &str,
    ) -> std::result::Result<(), TransportError> {
        let no_subscribers = || TransportError::new(format!("no subscribers on channel '{channel}'"));

        let sender = self.sender(channel).ok_or_else(no_subscribers)?;
        if sender.receiver_count() == 0 {
            return Err(no_subscribers());
        }

        for notification in notifications {
            // Fails only if every receiver dropped since the check above.
            sender
                .send(notification.clone())
                .map_err(|_| no_subscribers())?;
        }
        Ok(())
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Receiving end of one [`BroadcastPublisher`] channel.
///
/// # Backpressure
///
/// A subscriber that falls more than the channel capacity behind gets
/// [`Error::SubscriptionLagged`] with the number of notifications it
/// missed, then resumes from the oldest one still buffered. Catch up by
/// reading the notification log from the last `stored_event_id` seen.
pub struct ChannelSubscription<E> {
    receiver: broadcast::Receiver<Notification<E>>,
}

impl<E: Clone> ChannelSubscription<E> {
    fn new(receiver: broadcast::Receiver<Notification<E>>) -> Self {
        Self { receiver }
    }

    /// Waits for the next notification.
    ///
    /// # Returns
    ///
    /// - `Some(Ok(n))` - Next notification
    /// - `Some(Err(Error::SubscriptionLagged(n)))` - `n` notifications were missed
    /// - `None` - Publisher dropped
    pub async fn next(&mut self) -> Option<Result<Notification<E>>> {
        match self.receiver.recv().await {
            Ok(notification) => Some(Ok(notification)),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(Err(Error::SubscriptionLagged(n))),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Like [`next`](Self::next) but returns `None` instead of waiting.
    pub fn try_next(&mut self) -> Option<Result<Notification<E>>> {
        match self.receiver.try_recv() {
            Ok(notification) => Some(Ok(notification)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Some(Err(Error::SubscriptionLagged(n)))
            }
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                None
            }
        }
    }

    /// Number of notifications buffered but not yet received.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone + Send + 'static> ChannelSubscription<E> {
    /// Converts the subscription into a [`Stream`] that ends when the
    /// publisher is dropped.
    pub fn into_stream(self) -> impl Stream<Item = Result<Notification<E>>> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            let item = subscription.next().await?;
            Some((item, subscription))
        })
    }
}

impl<E> fmt::Debug for ChannelSubscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSubscription")
            .field("buffered", &self.receiver.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventId;
    use futures::StreamExt;

    fn note(id: u64) -> Notification<String> {
        Notification {
            event_type: "Noted".to_string(),
            stored_event_id: EventId::from_raw(id),
            occurred_on_ms: 0,
            version: 1,
            event: format!("event-{id}"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let publisher = BroadcastPublisher::<String>::new();

        let err = publisher.publish(&[note(1)], "orders").await.unwrap_err();
        assert!(err.message().contains("orders"));

        // Channel exists but every subscriber left.
        drop(publisher.subscribe("orders"));
        assert!(publisher.publish(&[note(1)], "orders").await.is_err());
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let publisher = BroadcastPublisher::<String>::new();
        let mut a = publisher.subscribe("orders");
        let mut b = publisher.subscribe("orders");
        assert_eq!(publisher.subscriber_count("orders"), 2);

        publisher
            .publish(&[note(1), note(2), note(3)], "orders")
            .await
            .unwrap();

        for sub in [&mut a, &mut b] {
            let ids: Vec<u64> = (0..3)
                .map(|_| sub.try_next().unwrap().unwrap().stored_event_id.as_raw())
                .collect();
            assert_eq!(ids, vec![1, 2, 3]);
            assert!(sub.try_next().is_none());
        }
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let publisher = BroadcastPublisher::<String>::new();
        let mut orders = publisher.subscribe("orders");
        let mut billing = publisher.subscribe("billing");

        publisher.publish(&[note(7)], "billing").await.unwrap();

        assert!(orders.try_next().is_none());
        assert_eq!(billing.len(), 1);
        let got = billing.next().await.unwrap().unwrap();
        assert_eq!(got.event, "event-7");
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let publisher = BroadcastPublisher::<String>::with_capacity(2);
        let mut sub = publisher.subscribe("orders");

        publisher
            .publish(&[note(1), note(2), note(3), note(4)], "orders")
            .await
            .unwrap();

        assert!(matches!(sub.try_next(), Some(Err(Error::SubscriptionLagged(2)))));
        assert_eq!(sub.try_next().unwrap().unwrap().stored_event_id.as_raw(), 3);
    }

    #[tokio::test]
    async fn test_stream_ends_when_publisher_dropped() {
        let publisher = BroadcastPublisher::<String>::new();
        let sub = publisher.subscribe("orders");
        publisher.publish(&[note(1), note(2)], "orders").await.unwrap();
        drop(publisher);

        let received: Vec<u64> = sub
            .into_stream()
            .map(|r| r.unwrap().stored_event_id.as_raw())
            .collect()
            .await;
        assert_eq!(received, vec![1, 2]);
    }
}
