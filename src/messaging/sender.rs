//! # Channel Senders
//!
//! One owned sender per destination, guarded so that only one send is in
//! flight per channel at a time. Processors in the same process share senders
//! through a [`SenderRegistry`], which keeps channel ordering intact under
//! concurrent consumers and prevents interleaved writes on transports whose
//! send is not atomic.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::errors::MessagingResult;
use super::gateway::QueueGateway;
use super::message::{Message, MessageId};

/// Serialized sender bound to a single destination
pub struct ChannelSender {
    destination: String,
    gateway: Arc<dyn QueueGateway>,
    in_flight: Mutex<()>,
}

impl std::fmt::Debug for ChannelSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSender")
            .field("destination", &self.destination)
            .field("provider", &self.gateway.provider_name())
            .finish()
    }
}

impl ChannelSender {
    /// Create a sender for `destination` over the given gateway
    pub fn new(gateway: Arc<dyn QueueGateway>, destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            gateway,
            in_flight: Mutex::new(()),
        }
    }

    /// Destination this sender writes to
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Send a message, waiting for any in-flight send on this channel first
    pub async fn send(&self, message: Message) -> MessagingResult<MessageId> {
        let _guard = self.in_flight.lock().await;

        debug!(
            destination = %self.destination,
            message_id = %message.id,
            property_count = message.properties.len(),
            "Sending message"
        );

        self.gateway.send(message, &self.destination).await
    }
}

/// Process-wide registry of channel senders, one per destination
#[derive(Debug, Default)]
pub struct SenderRegistry {
    senders: DashMap<String, Arc<ChannelSender>>,
}

impl SenderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the sender for `destination`, creating it over `gateway` on first use
    ///
    /// Later callers get the existing sender regardless of the gateway they
    /// pass, so every processor writing to a destination shares one lock.
    pub fn sender_for(
        &self,
        gateway: &Arc<dyn QueueGateway>,
        destination: &str,
    ) -> Arc<ChannelSender> {
        self.senders
            .entry(destination.to_string())
            .or_insert_with(|| Arc::new(ChannelSender::new(Arc::clone(gateway), destination)))
            .value()
            .clone()
    }

    /// Number of registered destinations
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Whether no sender has been created yet
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
