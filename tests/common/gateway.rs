//! Scripted gateway: an in-memory broker with failure injection and a log of
//! every primitive called on it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use queue_processors::messaging::DeadLetteredMessage;
use queue_processors::{InMemoryQueueGateway, Message, MessageId, MessagingError, QueueGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Receive,
    Acknowledge,
    Abandon,
    DeadLetter,
    Send,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Receive,
    Acknowledge(MessageId),
    Abandon(MessageId),
    DeadLetter {
        message_id: MessageId,
        reason: String,
        description: String,
    },
    Send {
        destination: String,
    },
}

impl GatewayCall {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Receive => Operation::Receive,
            Self::Acknowledge(_) => Operation::Acknowledge,
            Self::Abandon(_) => Operation::Abandon,
            Self::DeadLetter { .. } => Operation::DeadLetter,
            Self::Send { .. } => Operation::Send,
        }
    }
}

pub struct ScriptedGateway {
    inner: InMemoryQueueGateway,
    calls: Mutex<Vec<GatewayCall>>,
    scripted_failures: Mutex<HashMap<Operation, VecDeque<MessagingError>>>,
    always_failing: Mutex<HashSet<Operation>>,
    send_delay: Mutex<Option<Duration>>,
    sends_in_flight: AtomicUsize,
    max_sends_in_flight: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(queue_name: &str) -> Arc<Self> {
        Self::with_lock_duration(queue_name, Duration::from_secs(300))
    }

    pub fn with_lock_duration(queue_name: &str, lock_duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryQueueGateway::with_lock_duration(queue_name, lock_duration),
            calls: Mutex::new(Vec::new()),
            scripted_failures: Mutex::new(HashMap::new()),
            always_failing: Mutex::new(HashSet::new()),
            send_delay: Mutex::new(None),
            sends_in_flight: AtomicUsize::new(0),
            max_sends_in_flight: AtomicUsize::new(0),
        })
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: MessagingError) {
        self.scripted_failures
            .lock()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Make every call of `operation` fail
    pub fn fail_always(&self, operation: Operation) {
        self.always_failing.lock().insert(operation);
    }

    /// Hold every send for `delay` before delivering it
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = Some(delay);
    }

    /// Put a message on a queue without going through the script
    pub async fn enqueue(&self, message: Message) -> MessageId {
        let queue = self.inner.queue_name().to_string();
        self.inner.send(message, &queue).await.unwrap()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Terminal actions attempted on received messages
    pub fn settlement_attempts(&self) -> usize {
        self.count(Operation::Acknowledge)
            + self.count(Operation::Abandon)
            + self.count(Operation::DeadLetter)
    }

    pub fn messages(&self, queue_name: &str) -> Vec<Message> {
        self.inner.messages(queue_name)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetteredMessage> {
        self.inner.dead_letters(self.inner.queue_name())
    }

    pub fn inner(&self) -> &InMemoryQueueGateway {
        &self.inner
    }

    pub fn max_sends_in_flight(&self) -> usize {
        self.max_sends_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: GatewayCall) -> Result<(), MessagingError> {
        let operation = call.operation();
        self.calls.lock().push(call);

        if self.always_failing.lock().contains(&operation) {
            return Err(MessagingError::connection(format!(
                "scripted failure: {operation:?}"
            )));
        }

        match self
            .scripted_failures
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl QueueGateway for ScriptedGateway {
    async fn receive(&self, poll_timeout: Duration) -> Result<Option<Message>, MessagingError> {
        self.record(GatewayCall::Receive)?;
        self.inner.receive(poll_timeout).await
    }

    async fn acknowledge(&self, message: &Message) -> Result<(), MessagingError> {
        self.record(GatewayCall::Acknowledge(message.id.clone()))?;
        self.inner.acknowledge(message).await
    }

    async fn abandon(&self, message: &Message) -> Result<(), MessagingError> {
        self.record(GatewayCall::Abandon(message.id.clone()))?;
        self.inner.abandon(message).await
    }

    async fn dead_letter(
        &self,
        message: &Message,
        reason: &str,
        description: &str,
    ) -> Result<(), MessagingError> {
        self.record(GatewayCall::DeadLetter {
            message_id: message.id.clone(),
            reason: reason.to_string(),
            description: description.to_string(),
        })?;
        self.inner.dead_letter(message, reason, description).await
    }

    async fn send(&self, message: Message, destination: &str) -> Result<MessageId, MessagingError> {
        self.record(GatewayCall::Send {
            destination: destination.to_string(),
        })?;

        let in_flight = self.sends_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_sends_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.inner.send(message, destination).await;
        self.sends_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn queue_name(&self) -> &str {
        self.inner.queue_name()
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}
