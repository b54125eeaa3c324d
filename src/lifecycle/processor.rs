//! # Queue Processor
//!
//! Drives one message per pass through receive → decode → process → resolve.
//!
//! | Handler result | Terminal action |
//! |---|---|
//! | `Ok(Complete)` | acknowledge |
//! | `Ok(ReprocessLater)` | none, redelivered after lock expiry |
//! | `Ok(ReprocessImmediately)` | abandon |
//! | `Ok(Broken(cause))` | report, then dead-letter with the correlation token |
//! | `Err(Transient)` | none |
//! | `Err(Unexpected)` | report, then dead-letter |
//!
//! A decode failure is escalated like an unexpected error. When reporting or
//! dead-lettering fails the [`FALLBACK_CASCADE`] takes over; `execute()` itself
//! never fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::cascade::{FallbackStep, LifecycleError, FALLBACK_CASCADE};
use super::outcome::{HandlerError, PassOutcome, ProcessOutcome, TerminalAction};
use super::states::LifecycleState;
use crate::codec::{self, MessageParams};
use crate::config::ProcessorConfig;
use crate::error::QueueProcessorError;
use crate::logging::log_message_operation;
use crate::messaging::{
    ChannelSender, Message, MessageId, PropertyValue, QueueGateway, SenderRegistry,
};
use crate::reporting::{ErrorReporter, ProcessingError};

/// User processing logic for one parameter type
///
/// ```rust
/// use async_trait::async_trait;
/// use queue_processors::{HandlerError, MessageHandler, ProcessOutcome, ProcessingError};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct ResizeImage {
///     image_id: String,
///     width: u32,
/// }
///
/// struct Resizer;
///
/// #[async_trait]
/// impl MessageHandler for Resizer {
///     type Params = ResizeImage;
///
///     async fn process_message(
///         &self,
///         params: ResizeImage,
///     ) -> Result<ProcessOutcome, HandlerError> {
///         if params.width == 0 {
///             return Ok(ProcessOutcome::broken(
///                 ProcessingError::new("zero width").with_data("ImageId", &params.image_id),
///             ));
///         }
///         Ok(ProcessOutcome::Complete)
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Parameter record decoded from each message
    type Params: MessageParams;

    /// Process one decoded message
    async fn process_message(&self, params: Self::Params) -> Result<ProcessOutcome, HandlerError>;
}

/// Current lifecycle state of the message in flight, with transition logging
struct MessageTrace<'a> {
    message_id: &'a MessageId,
    queue: &'a str,
    state: LifecycleState,
}

impl<'a> MessageTrace<'a> {
    fn received(message_id: &'a MessageId, queue: &'a str) -> Self {
        debug!(
            message_id = %message_id,
            queue = %queue,
            state = %LifecycleState::Received,
            "Message received"
        );
        Self {
            message_id,
            queue,
            state: LifecycleState::Received,
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        if !self.state.can_transition_to(next) {
            warn!(
                message_id = %self.message_id,
                from_state = %self.state,
                to_state = %next,
                "Unexpected lifecycle transition"
            );
        }

        debug!(
            message_id = %self.message_id,
            queue = %self.queue,
            from_state = %self.state,
            state = %next,
            "Lifecycle transition"
        );
        self.state = next;
    }

    fn resolve(&mut self, action: TerminalAction) {
        if self.state.is_terminal() {
            warn!(message_id = %self.message_id, action = %action, "Message already resolved");
            return;
        }
        self.transition(LifecycleState::Resolved);
        log_message_operation(
            "resolve",
            self.queue,
            Some(self.message_id),
            &action.to_string(),
            None,
        );
    }
}

/// Escalation of one failed message, carrying the correlation token once a
/// report has been accepted so that retries never report twice
struct Escalation<'a> {
    message: &'a Message,
    cause: &'a ProcessingError,
    token: Option<MessageId>,
}

/// Generic at-least-once consumer for one queue and one handler
pub struct QueueProcessor<H: MessageHandler> {
    handler: H,
    gateway: Arc<dyn QueueGateway>,
    reporter: ErrorReporter,
    send_channel: Arc<ChannelSender>,
    receive_timeout: Duration,
    discriminator_key: String,
}

impl<H: MessageHandler> std::fmt::Debug for QueueProcessor<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProcessor")
            .field("queue", &self.gateway.queue_name())
            .field("error_channel", &self.reporter.error_channel())
            .field("send_channel", &self.send_channel.destination())
            .field("receive_timeout", &self.receive_timeout)
            .finish()
    }
}

impl<H: MessageHandler> QueueProcessor<H> {
    /// Create a processor receiving from `gateway`
    ///
    /// The send channel (the configured queue) and the error channel come from
    /// `senders`, so processors built from one registry share them.
    pub fn new(
        handler: H,
        gateway: Arc<dyn QueueGateway>,
        config: &ProcessorConfig,
        senders: &SenderRegistry,
    ) -> Self {
        let error_channel = senders.sender_for(&gateway, &config.error_queue_name);
        let send_channel = senders.sender_for(&gateway, &config.queue_name);

        Self {
            handler,
            reporter: ErrorReporter::new(error_channel),
            send_channel,
            gateway,
            receive_timeout: config.receive_timeout(),
            discriminator_key: config.discriminator_key.clone(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn queue_name(&self) -> &str {
        self.gateway.queue_name()
    }

    /// Run one pass: receive at most one message and resolve it
    pub async fn execute(&self) -> PassOutcome {
        let queue = self.gateway.queue_name();

        let message = match self.gateway.receive(self.receive_timeout).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(queue = %queue, "No message available");
                return PassOutcome::Idle;
            }
            Err(err) if err.is_transient() => {
                warn!(queue = %queue, error = %err, "Receive failed; broker unreachable");
                return PassOutcome::ReceiveFailed { transient: true };
            }
            Err(err) => {
                error!(queue = %queue, error = %err, "Receive failed");
                return PassOutcome::ReceiveFailed { transient: false };
            }
        };

        let mut trace = MessageTrace::received(&message.id, queue);
        trace.transition(LifecycleState::Decoding);

        let params = match codec::decode::<H::Params>(&message.properties) {
            Ok(params) => params,
            Err(err) => {
                warn!(message_id = %message.id, error = %err, "Message parameters could not be decoded");
                let cause = ProcessingError::new(format!("Invalid message parameters: {err}"))
                    .with_source(err);
                return self.terminate(&mut trace, &message, cause).await;
            }
        };

        trace.transition(LifecycleState::Processing);
        let result = self.handler.process_message(params).await;
        let outcome = match &result {
            Ok(outcome) => outcome.label(),
            Err(err) if err.is_transient() => "transient_error",
            Err(_) => "unexpected_error",
        };
        debug!(message_id = %message.id, outcome, "Handler returned");

        self.resolve(&mut trace, &message, result).await
    }

    async fn resolve(
        &self,
        trace: &mut MessageTrace<'_>,
        message: &Message,
        result: Result<ProcessOutcome, HandlerError>,
    ) -> PassOutcome {
        match result {
            Ok(ProcessOutcome::Complete) => {
                trace.transition(LifecycleState::Completing);
                let action = match self.gateway.acknowledge(message).await {
                    Ok(()) => TerminalAction::Acknowledged,
                    Err(err) => {
                        error!(
                            message_id = %message.id,
                            error = %err,
                            "Acknowledge failed; message will be redelivered"
                        );
                        TerminalAction::LeftForRedelivery
                    }
                };
                trace.resolve(action);
                PassOutcome::resolved(&message.id, action)
            }
            Ok(ProcessOutcome::ReprocessLater) => {
                trace.transition(LifecycleState::Retrying);
                debug!(message_id = %message.id, "Reprocess requested; leaving message for redelivery");
                trace.resolve(TerminalAction::LeftForRedelivery);
                PassOutcome::resolved(&message.id, TerminalAction::LeftForRedelivery)
            }
            Ok(ProcessOutcome::ReprocessImmediately) => {
                trace.transition(LifecycleState::Retrying);
                let action = match self.gateway.abandon(message).await {
                    Ok(()) => TerminalAction::Abandoned,
                    Err(err) => {
                        warn!(
                            message_id = %message.id,
                            error = %err,
                            "Abandon failed; message will be redelivered after lock expiry"
                        );
                        TerminalAction::LeftForRedelivery
                    }
                };
                trace.resolve(action);
                PassOutcome::resolved(&message.id, action)
            }
            Ok(ProcessOutcome::Broken(cause)) => self.terminate(trace, message, cause).await,
            Err(HandlerError::Transient { message: reason }) => {
                trace.transition(LifecycleState::Retrying);
                info!(
                    message_id = %message.id,
                    reason = %reason,
                    "Transient failure; leaving message for redelivery"
                );
                trace.resolve(TerminalAction::LeftForRedelivery);
                PassOutcome::resolved(&message.id, TerminalAction::LeftForRedelivery)
            }
            Err(HandlerError::Unexpected(err)) => {
                warn!(message_id = %message.id, error = %err, "Unexpected processing error");
                self.terminate(trace, message, ProcessingError::from(err)).await
            }
        }
    }

    /// Escalate-then-terminate, falling back through the cascade on failure
    async fn terminate(
        &self,
        trace: &mut MessageTrace<'_>,
        message: &Message,
        cause: ProcessingError,
    ) -> PassOutcome {
        trace.transition(LifecycleState::Terminating);

        let mut escalation = Escalation {
            message,
            cause: &cause,
            token: None,
        };

        let action = match self.escalate_then_dead_letter(&mut escalation).await {
            Ok(()) => TerminalAction::DeadLettered,
            Err(err) => {
                warn!(
                    message_id = %message.id,
                    error = %err,
                    "Escalation failed; entering fallback cascade"
                );
                self.run_fallback_cascade(&mut escalation).await
            }
        };

        trace.resolve(action);
        PassOutcome::Resolved {
            message_id: message.id.clone(),
            action,
            correlation_token: escalation.token,
        }
    }

    /// Report the failure (unless already reported) and dead-letter the message
    /// with the correlation token as its description
    async fn escalate_then_dead_letter(
        &self,
        escalation: &mut Escalation<'_>,
    ) -> Result<(), LifecycleError> {
        let message = escalation.message;

        let token = match &escalation.token {
            Some(token) => token.clone(),
            None => {
                let token = self
                    .reporter
                    .report(message, escalation.cause)
                    .await
                    .map_err(|e| LifecycleError::report(&message.id, e))?;
                escalation.token = Some(token.clone());
                token
            }
        };

        self.gateway
            .dead_letter(message, escalation.cause.message(), token.as_str())
            .await
            .map_err(|e| LifecycleError::dead_letter(&message.id, e))?;

        info!(
            message_id = %message.id,
            correlation_token = %token,
            reason = %escalation.cause.message(),
            "☠️ Message dead-lettered"
        );
        Ok(())
    }

    /// Walk the fallback cascade until a step succeeds
    async fn run_fallback_cascade(&self, escalation: &mut Escalation<'_>) -> TerminalAction {
        for step in FALLBACK_CASCADE {
            match self.attempt_fallback(step, escalation).await {
                Ok(()) => {
                    info!(
                        message_id = %escalation.message.id,
                        step = %step,
                        "Fallback step succeeded"
                    );
                    return step.resulting_action();
                }
                Err(err) => {
                    warn!(
                        message_id = %escalation.message.id,
                        step = %step,
                        error = %err,
                        "Fallback step failed"
                    );
                }
            }
        }

        TerminalAction::LeftForRedelivery
    }

    async fn attempt_fallback(
        &self,
        step: FallbackStep,
        escalation: &mut Escalation<'_>,
    ) -> Result<(), LifecycleError> {
        let message = escalation.message;

        match step {
            FallbackStep::RetryEscalation => self.escalate_then_dead_letter(escalation).await,
            FallbackStep::ForceDeadLetter => {
                let description = escalation
                    .token
                    .as_ref()
                    .map(MessageId::as_str)
                    .unwrap_or_default();
                self.gateway
                    .dead_letter(message, escalation.cause.message(), description)
                    .await
                    .map_err(|e| LifecycleError::dead_letter(&message.id, e))
            }
            FallbackStep::Abandon => self
                .gateway
                .abandon(message)
                .await
                .map_err(|e| LifecycleError::abandon(&message.id, e)),
            FallbackStep::GiveUp => {
                error!(
                    message_id = %message.id,
                    queue = %self.gateway.queue_name(),
                    reason = %escalation.cause.message(),
                    "❌ Every fallback failed; message stays locked until the broker expires it"
                );
                Ok(())
            }
        }
    }

    /// Encode `params`, tag them with `destination` and send them on this
    /// processor's queue
    ///
    /// Returns once the broker has accepted the message.
    pub async fn send(
        &self,
        params: &H::Params,
        destination: &str,
    ) -> Result<MessageId, QueueProcessorError> {
        let mut properties = codec::encode(params)?;
        properties.insert(
            self.discriminator_key.clone(),
            PropertyValue::from(destination),
        );

        let id = self
            .send_channel
            .send(Message::with_properties(properties))
            .await?;

        debug!(
            message_id = %id,
            queue = %self.send_channel.destination(),
            destination = %destination,
            "Message sent"
        );
        Ok(id)
    }
}
