//! # In-Memory Queue Gateway
//!
//! Thread-safe in-memory broker for testing and local development.
//!
//! ## Features
//!
//! - **Peek-lock**: received messages become invisible for the lock duration
//!   and reappear if they are not settled before it expires
//! - **Dead-letter store**: dead-lettered messages are kept per queue together
//!   with their reason and description
//! - **Delivery counting**: every receive increments the message's delivery count
//! - **Lock ownership**: acknowledge, abandon and dead-letter fail once the
//!   caller's lock has expired or the message has been delivered again

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::config::ProcessorConfig;
use crate::messaging::errors::MessagingError;
use crate::messaging::gateway::QueueGateway;
use crate::messaging::message::{Message, MessageId};

/// Default peek-lock duration (five minutes)
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(300);

/// A message stored in a queue with its lock state
#[derive(Debug, Clone)]
struct StoredMessage {
    message: Message,
    /// When the message becomes visible again (None = visible now)
    locked_until: Option<DateTime<Utc>>,
}

/// A dead-lettered message with the settlement details
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetteredMessage {
    pub message: Message,
    pub reason: String,
    pub description: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Per-queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub message_count: u64,
    pub locked_count: u64,
    pub dead_letter_count: u64,
    pub total_sent: u64,
    pub total_received: u64,
    pub total_acknowledged: u64,
    pub total_abandoned: u64,
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    messages: VecDeque<StoredMessage>,
    dead_letters: Vec<DeadLetteredMessage>,
    total_sent: u64,
    total_received: u64,
    total_acknowledged: u64,
    total_abandoned: u64,
}

impl InMemoryQueue {
    /// Position of a message whose lock the caller still holds
    ///
    /// The lock is held when it has not expired and the message has not been
    /// delivered again since the caller received it.
    fn held_position(
        &self,
        queue_name: &str,
        message: &Message,
        operation: &str,
    ) -> Result<usize, MessagingError> {
        let pos = self
            .messages
            .iter()
            .position(|m| m.message.id == message.id)
            .ok_or_else(|| MessagingError::message_not_found(message.id.as_str()))?;

        let stored = &self.messages[pos];
        let now = Utc::now();
        let held = stored.message.delivery_count == message.delivery_count
            && stored.locked_until.is_some_and(|until| until > now);

        if !held {
            return Err(MessagingError::queue_operation(
                queue_name,
                operation,
                format!(
                    "lock lost on message {} (held delivery {}, current delivery {})",
                    message.id, message.delivery_count, stored.message.delivery_count
                ),
            ));
        }

        Ok(pos)
    }

    /// Remove a locked message from the queue, returning it
    fn take_held(
        &mut self,
        queue_name: &str,
        message: &Message,
        operation: &str,
    ) -> Result<Message, MessagingError> {
        let pos = self.held_position(queue_name, message, operation)?;

        self.messages
            .remove(pos)
            .map(|m| m.message)
            .ok_or_else(|| MessagingError::message_not_found(message.id.as_str()))
    }
}

/// In-memory gateway bound to one receive queue
///
/// `send` accepts any destination; destinations are created on first use, so
/// messages sent to the receive queue are delivered back to this gateway.
///
/// # Example
///
/// ```rust
/// use queue_processors::messaging::{InMemoryQueueGateway, Message, QueueGateway};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = InMemoryQueueGateway::new("orders");
/// gateway.send(Message::new().with_property("Name", "widget"), "orders").await?;
///
/// let received = gateway.receive(Duration::ZERO).await?.expect("message");
/// gateway.acknowledge(&received).await?;
/// assert_eq!(gateway.queue_length("orders"), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryQueueGateway {
    queue_name: String,
    lock_duration: Duration,
    queues: Mutex<HashMap<String, InMemoryQueue>>,
    arrivals: Notify,
}

impl InMemoryQueueGateway {
    /// Create a gateway receiving from `queue_name` with the default lock duration
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self::with_lock_duration(queue_name, DEFAULT_LOCK_DURATION)
    }

    /// Create a gateway with an explicit peek-lock duration
    pub fn with_lock_duration(queue_name: impl Into<String>, lock_duration: Duration) -> Self {
        let queue_name = queue_name.into();
        let mut queues = HashMap::new();
        queues.insert(queue_name.clone(), InMemoryQueue::default());
        Self {
            queue_name,
            lock_duration,
            queues: Mutex::new(queues),
            arrivals: Notify::new(),
        }
    }

    /// Create a gateway for the configured queue and peek-lock duration
    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::with_lock_duration(&config.queue_name, config.lock_duration())
    }

    /// Peek-lock duration applied to received messages
    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    /// Number of messages in a queue, locked or not (for testing)
    pub fn queue_length(&self, queue_name: &str) -> usize {
        self.queues
            .lock()
            .get(queue_name)
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    /// Snapshot of every message in a queue, locked or not (for testing)
    pub fn messages(&self, queue_name: &str) -> Vec<Message> {
        self.queues
            .lock()
            .get(queue_name)
            .map(|q| q.messages.iter().map(|m| m.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Snapshot of a queue's dead-letter store (for testing)
    pub fn dead_letters(&self, queue_name: &str) -> Vec<DeadLetteredMessage> {
        self.queues
            .lock()
            .get(queue_name)
            .map(|q| q.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Counters for a queue
    pub fn stats(&self, queue_name: &str) -> Option<QueueStats> {
        let now = Utc::now();
        self.queues.lock().get(queue_name).map(|q| QueueStats {
            message_count: q.messages.len() as u64,
            locked_count: q
                .messages
                .iter()
                .filter(|m| m.locked_until.is_some_and(|until| until > now))
                .count() as u64,
            dead_letter_count: q.dead_letters.len() as u64,
            total_sent: q.total_sent,
            total_received: q.total_received,
            total_acknowledged: q.total_acknowledged,
            total_abandoned: q.total_abandoned,
        })
    }

    fn try_receive(&self) -> Result<Option<Message>, MessagingError> {
        let lock_duration = chrono::Duration::from_std(self.lock_duration)
            .map_err(|e| MessagingError::internal(format!("invalid lock duration: {e}")))?;

        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(&self.queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(&self.queue_name))?;

        let now = Utc::now();
        let next = queue
            .messages
            .iter_mut()
            .find(|m| m.locked_until.map_or(true, |until| until <= now));

        let Some(stored) = next else {
            return Ok(None);
        };

        stored.locked_until = Some(now + lock_duration);
        stored.message.delivery_count += 1;
        let received = stored.message.clone();
        queue.total_received += 1;

        Ok(Some(received))
    }
}

#[async_trait]
impl QueueGateway for InMemoryQueueGateway {
    async fn receive(&self, poll_timeout: Duration) -> Result<Option<Message>, MessagingError> {
        // Register for arrivals before looking, so a concurrent send is not missed
        let arrival = self.arrivals.notified();
        tokio::pin!(arrival);
        arrival.as_mut().enable();

        if let Some(message) = self.try_receive()? {
            return Ok(Some(message));
        }

        if poll_timeout.is_zero() {
            return Ok(None);
        }

        let _ = tokio::time::timeout(poll_timeout, arrival).await;
        self.try_receive()
    }

    async fn acknowledge(&self, message: &Message) -> Result<(), MessagingError> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(&self.queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(&self.queue_name))?;

        queue.take_held(&self.queue_name, message, "acknowledge")?;
        queue.total_acknowledged += 1;

        debug!(queue = %self.queue_name, message_id = %message.id, "Message acknowledged");
        Ok(())
    }

    async fn abandon(&self, message: &Message) -> Result<(), MessagingError> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(&self.queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(&self.queue_name))?;

        let pos = queue.held_position(&self.queue_name, message, "abandon")?;
        queue.messages[pos].locked_until = None;
        queue.total_abandoned += 1;
        drop(queues);

        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn dead_letter(
        &self,
        message: &Message,
        reason: &str,
        description: &str,
    ) -> Result<(), MessagingError> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(&self.queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(&self.queue_name))?;

        let removed = queue.take_held(&self.queue_name, message, "dead_letter")?;
        queue.dead_letters.push(DeadLetteredMessage {
            message: removed,
            reason: reason.to_string(),
            description: description.to_string(),
            dead_lettered_at: Utc::now(),
        });

        debug!(
            queue = %self.queue_name,
            message_id = %message.id,
            reason = %reason,
            "Message dead-lettered"
        );
        Ok(())
    }

    async fn send(&self, message: Message, destination: &str) -> Result<MessageId, MessagingError> {
        let id = message.id.clone();
        {
            let mut queues = self.queues.lock();
            let queue = queues.entry(destination.to_string()).or_default();
            queue.messages.push_back(StoredMessage {
                message: Message {
                    delivery_count: 0,
                    enqueued_at: Utc::now(),
                    ..message
                },
                locked_until: None,
            });
            queue.total_sent += 1;
        }

        self.arrivals.notify_waiters();
        Ok(id)
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> InMemoryQueueGateway {
        InMemoryQueueGateway::new("orders")
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let gateway = gateway();
        let sent_id = gateway
            .send(Message::new().with_property("Name", "widget"), "orders")
            .await
            .unwrap();

        let received = gateway.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(received.id, sent_id);
        assert_eq!(received.delivery_count, 1);
        assert_eq!(received.property("Name").and_then(|v| v.as_str()), Some("widget"));
    }

    #[tokio::test]
    async fn test_idle_receive_returns_none() {
        let gateway = gateway();
        let received = gateway.receive(Duration::from_millis(10)).await.unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_received_message_is_locked() {
        let gateway = gateway();
        gateway.send(Message::new(), "orders").await.unwrap();

        assert!(gateway.receive(Duration::ZERO).await.unwrap().is_some());
        assert!(gateway.receive(Duration::ZERO).await.unwrap().is_none());
        assert_eq!(gateway.stats("orders").unwrap().locked_count, 1);
    }

    #[tokio::test]
    async fn test_lock_expiry_redelivers() {
        let gateway = InMemoryQueueGateway::with_lock_duration("orders", Duration::from_millis(20));
        gateway.send(Message::new(), "orders").await.unwrap();

        let first = gateway.receive(Duration::ZERO).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = gateway.receive(Duration::ZERO).await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.delivery_count, 2);
    }

    #[tokio::test]
    async fn test_acknowledge_removes_message() {
        let gateway = gateway();
        gateway.send(Message::new(), "orders").await.unwrap();
        let received = gateway.receive(Duration::ZERO).await.unwrap().unwrap();

        gateway.acknowledge(&received).await.unwrap();

        assert_eq!(gateway.queue_length("orders"), 0);
        assert!(gateway.acknowledge(&received).await.is_err());
    }

    #[tokio::test]
    async fn test_abandon_makes_message_visible() {
        let gateway = gateway();
        gateway.send(Message::new(), "orders").await.unwrap();
        let received = gateway.receive(Duration::ZERO).await.unwrap().unwrap();

        gateway.abandon(&received).await.unwrap();

        let again = gateway.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(again.id, received.id);
        assert_eq!(again.delivery_count, 2);
        assert_eq!(gateway.stats("orders").unwrap().total_abandoned, 1);
    }

    #[tokio::test]
    async fn test_dead_letter_moves_message() {
        let gateway = gateway();
        gateway.send(Message::new(), "orders").await.unwrap();
        let received = gateway.receive(Duration::ZERO).await.unwrap().unwrap();

        gateway
            .dead_letter(&received, "bad payload", "token-1")
            .await
            .unwrap();

        assert_eq!(gateway.queue_length("orders"), 0);
        let dead = gateway.dead_letters("orders");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message.id, received.id);
        assert_eq!(dead[0].reason, "bad payload");
        assert_eq!(dead[0].description, "token-1");
    }

    #[tokio::test]
    async fn test_send_to_other_destination_creates_queue() {
        let gateway = gateway();
        gateway.send(Message::new(), "ERRORS").await.unwrap();

        assert_eq!(gateway.queue_length("ERRORS"), 1);
        assert_eq!(gateway.queue_length("orders"), 0);
        assert!(gateway.receive(Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_receive_wakes_on_send() {
        let gateway = std::sync::Arc::new(gateway());
        let sender = gateway.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.send(Message::new(), "orders").await.unwrap();
        });

        let received = gateway.receive(Duration::from_secs(2)).await.unwrap();
        handle.await.unwrap();
        assert!(received.is_some());
    }

    #[test]
    fn test_from_config_uses_queue_and_lock_duration() {
        let config = ProcessorConfig {
            lock_duration_seconds: 45,
            ..ProcessorConfig::for_queue("invoices")
        };

        let gateway = InMemoryQueueGateway::from_config(&config);

        assert_eq!(gateway.queue_name(), "invoices");
        assert_eq!(gateway.lock_duration(), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_settling_after_lock_expiry_fails() {
        let gateway = InMemoryQueueGateway::with_lock_duration("orders", Duration::from_millis(20));
        gateway.send(Message::new(), "orders").await.unwrap();
        let received = gateway.receive(Duration::ZERO).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        let err = gateway.acknowledge(&received).await.unwrap_err();
        assert!(matches!(err, MessagingError::QueueOperation { .. }));
        assert!(!err.is_transient());
        assert!(gateway.abandon(&received).await.is_err());
        assert_eq!(gateway.queue_length("orders"), 1);
    }

    #[tokio::test]
    async fn test_stale_holder_cannot_settle_redelivered_message() {
        let gateway = InMemoryQueueGateway::with_lock_duration("orders", Duration::from_millis(20));
        gateway.send(Message::new(), "orders").await.unwrap();

        let stale = gateway.receive(Duration::ZERO).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let current = gateway.receive(Duration::ZERO).await.unwrap().unwrap();

        assert!(gateway.dead_letter(&stale, "late", "").await.is_err());
        assert!(gateway.acknowledge(&stale).await.is_err());
        assert!(gateway.dead_letters("orders").is_empty());

        gateway.acknowledge(&current).await.unwrap();
        assert_eq!(gateway.queue_length("orders"), 0);
    }
}
