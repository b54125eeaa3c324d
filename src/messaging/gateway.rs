//! # Queue Gateway Trait
//!
//! Broker-agnostic receive/settle/send primitives consumed by the message
//! lifecycle. Broker implementations own connection management, provisioning
//! and the at-least-once guarantee; the lifecycle only decides which primitive
//! to call.

use std::time::Duration;

use async_trait::async_trait;

use super::errors::MessagingError;
use super::message::{Message, MessageId};

/// Core queue gateway trait
///
/// A gateway is bound to one receive queue (peek-lock semantics: a received
/// message stays invisible to other consumers until it is settled or its lock
/// expires). `send` may target any destination the gateway can reach,
/// including the error channel.
///
/// Failures that leave the message untouched because the broker could not be
/// reached must be reported with a transient [`MessagingError`]
/// (see [`MessagingError::is_transient`]).
#[async_trait]
pub trait QueueGateway: Send + Sync + 'static {
    /// Receive the next visible message, waiting at most `poll_timeout`
    ///
    /// Returns `Ok(None)` when the queue is idle.
    async fn receive(&self, poll_timeout: Duration) -> Result<Option<Message>, MessagingError>;

    /// Complete the message: remove it from the queue
    async fn acknowledge(&self, message: &Message) -> Result<(), MessagingError>;

    /// Release the message lock so it is redelivered immediately
    async fn abandon(&self, message: &Message) -> Result<(), MessagingError>;

    /// Move the message to the dead-letter side channel
    async fn dead_letter(
        &self,
        message: &Message,
        reason: &str,
        description: &str,
    ) -> Result<(), MessagingError>;

    /// Hand a message to the broker for delivery to `destination`
    ///
    /// Success means only "accepted for delivery". Returns the id of the
    /// message as accepted by the broker.
    async fn send(&self, message: Message, destination: &str) -> Result<MessageId, MessagingError>;

    /// Name of the queue this gateway receives from, for logging
    fn queue_name(&self) -> &str;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
