//! Post-commit order notifications.
//!
//! Checkout pushes the order id onto a bounded queue after its transaction
//! commits. A background worker picks ids off the queue, re-reads the order
//! from the store and hands it to a [`Notifier`], retrying a bounded number
//! of times.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use domain::Order;
use store::Store;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Failure reported by a notifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// Worth retrying.
    #[error("Transient notification failure: {0}")]
    Transient(String),

    #[error("Permanent notification failure: {0}")]
    Permanent(String),
}

/// Failure to hand a task to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("Notification queue is full")]
    Full,

    #[error("Notification queue is closed")]
    Closed,
}

/// Sends order confirmations to the outside world.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), NotifyError>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %order.id(),
            client_id = %order.client_id(),
            total = %order.total(),
            "order confirmation sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<OrderId>,
    attempts: u32,
    transient_failures: u32,
    permanent_failure: bool,
}

/// Notifier that records what it was asked to send, for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` sends with a transient error.
    pub fn fail_transiently(&self, count: u32) {
        self.lock().transient_failures = count;
    }

    /// Fails every send with a permanent error.
    pub fn fail_permanently(&self) {
        self.lock().permanent_failure = true;
    }

    /// Orders a confirmation was sent for, in send order.
    pub fn sent(&self) -> Vec<OrderId> {
        self.lock().sent.clone()
    }

    /// Number of send attempts, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryNotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), NotifyError> {
        let mut state = self.lock();
        state.attempts += 1;

        if state.permanent_failure {
            return Err(NotifyError::Permanent("recipient rejected".to_string()));
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(NotifyError::Transient("mail relay unavailable".to_string()));
        }

        state.sent.push(order.id());
        Ok(())
    }
}

/// How often and how far apart delivery is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}

/// Producer side of the notification queue.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<OrderId>,
}

impl NotificationQueue {
    /// Queues a confirmation without waiting for room.
    pub fn enqueue(&self, order_id: OrderId) -> Result<(), EnqueueError> {
        self.sender.try_send(order_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Re-reads orders and sends their confirmations with retries.
pub struct NotificationDispatcher<S: Store, N: Notifier> {
    store: S,
    notifier: Arc<N>,
    policy: RetryPolicy,
}

impl<S: Store, N: Notifier> NotificationDispatcher<S, N> {
    pub fn new(store: S, notifier: Arc<N>, policy: RetryPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    /// Delivers one confirmation. Returns true if it was sent.
    ///
    /// Missing orders and transient failures are retried up to
    /// `max_retries` times; permanent failures stop at once.
    #[tracing::instrument(skip(self))]
    pub async fn deliver(&self, order_id: OrderId) -> bool {
        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.policy.backoff).await;
            }

            let order = match self.store.get_order(order_id).await {
                Ok(Some(order)) => order,
                Ok(None) => {
                    tracing::warn!(attempt, "order not visible yet, will retry");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "failed to load order, will retry");
                    continue;
                }
            };

            match self.notifier.send_order_confirmation(&order).await {
                Ok(()) => {
                    metrics::counter!("notifications_sent_total").increment(1);
                    return true;
                }
                Err(NotifyError::Transient(reason)) => {
                    tracing::warn!(attempt, %reason, "notification failed, will retry");
                }
                Err(NotifyError::Permanent(reason)) => {
                    metrics::counter!("notifications_failed_total").increment(1);
                    tracing::error!(%reason, "notification failed permanently");
                    return false;
                }
            }
        }

        metrics::counter!("notifications_failed_total").increment(1);
        tracing::error!(
            retries = self.policy.max_retries,
            "notification retries exhausted"
        );
        false
    }
}

/// Starts the notification worker.
///
/// Returns the queue producers push to and the worker's handle. The worker
/// stops once every [`NotificationQueue`] clone is dropped and in-flight
/// deliveries finish.
pub fn spawn_notification_worker<S, N>(
    store: S,
    notifier: Arc<N>,
    policy: RetryPolicy,
    capacity: usize,
) -> (NotificationQueue, JoinHandle<()>)
where
    S: Store,
    N: Notifier,
{
    let (sender, mut receiver) = mpsc::channel(capacity.max(1));
    let dispatcher = Arc::new(NotificationDispatcher::new(store, notifier, policy));

    let handle = tokio::spawn(async move {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                next = receiver.recv() => match next {
                    Some(order_id) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        tasks.spawn(async move { dispatcher.deliver(order_id).await });
                    }
                    None => break,
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}
        tracing::debug!("notification worker stopped");
    });

    (NotificationQueue { sender }, handle)
}
