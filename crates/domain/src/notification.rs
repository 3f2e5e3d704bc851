//! Post-commit notifications about order lifecycle changes.
//!
//! Submission is synchronous and never blocks the request path. Delivery is
//! best effort and at most once: a notification that cannot be queued is
//! logged and dropped.

use std::sync::{Arc, Mutex};

use common::{Money, OrderId, UserId};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A message emitted after an order transaction commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Notification {
    OrderPlaced {
        order_id: OrderId,
        order_number: String,
        user_id: UserId,
        total_price: Money,
    },
    OrderConfirmed {
        order_id: OrderId,
        order_number: String,
        user_id: UserId,
    },
    PaymentFailed {
        order_id: OrderId,
        order_number: String,
        user_id: UserId,
    },
}

impl Notification {
    pub fn order_id(&self) -> OrderId {
        match self {
            Notification::OrderPlaced { order_id, .. }
            | Notification::OrderConfirmed { order_id, .. }
            | Notification::PaymentFailed { order_id, .. } => *order_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::OrderPlaced { .. } => "OrderPlaced",
            Notification::OrderConfirmed { .. } => "OrderConfirmed",
            Notification::PaymentFailed { .. } => "PaymentFailed",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification queue is closed")]
    Closed,
}

/// Accepts notifications for asynchronous delivery.
pub trait Notifier: Send + Sync {
    fn submit(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Submits `notification`, logging instead of failing when it is rejected.
pub(crate) fn dispatch(notifier: &dyn Notifier, notification: Notification) {
    let kind = notification.kind();
    let order_id = notification.order_id();
    if let Err(err) = notifier.submit(notification) {
        tracing::warn!(%order_id, kind, error = %err, "notification dropped");
        metrics::counter!("notifications_dropped_total").increment(1);
    }
}

/// Queues notifications into a bounded channel drained by a background worker.
#[derive(Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    /// Spawns the delivery worker on the current runtime.
    ///
    /// The worker exits once every `ChannelNotifier` clone has been dropped
    /// and the queue is drained.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Notification>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                match serde_json::to_string(&notification) {
                    Ok(payload) => tracing::info!(
                        order_id = %notification.order_id(),
                        kind = notification.kind(),
                        %payload,
                        "notification delivered"
                    ),
                    Err(err) => tracing::warn!(error = %err, "failed to encode notification"),
                }
            }
            tracing::debug!("notification worker stopped");
        });
        (Self { sender }, worker)
    }
}

impl Notifier for ChannelNotifier {
    fn submit(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sender.try_send(notification).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn submit(&self, _notification: Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Keeps submitted notifications in memory for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything submitted so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn submit(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
        Ok(())
    }
}
