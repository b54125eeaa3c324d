//! # Fallback Cascade
//!
//! When reporting a failed message or dead-lettering it fails, the processor
//! walks [`FALLBACK_CASCADE`] in order until one step succeeds. Each step's
//! failure is logged and swallowed, so a pass always ends with the message
//! either settled or left to the broker's lock expiry.

use std::fmt;

use thiserror::Error;

use super::outcome::TerminalAction;
use crate::messaging::{MessageId, MessagingError};

/// Failures on the escalation path
///
/// Absorbed by the cascade; never returned from a pass.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Failed to report message {message_id} to the error channel: {source}")]
    Report {
        message_id: MessageId,
        #[source]
        source: MessagingError,
    },

    #[error("Failed to dead-letter message {message_id}: {source}")]
    DeadLetter {
        message_id: MessageId,
        #[source]
        source: MessagingError,
    },

    #[error("Failed to abandon message {message_id}: {source}")]
    Abandon {
        message_id: MessageId,
        #[source]
        source: MessagingError,
    },
}

impl LifecycleError {
    pub fn report(message_id: &MessageId, source: MessagingError) -> Self {
        Self::Report {
            message_id: message_id.clone(),
            source,
        }
    }

    pub fn dead_letter(message_id: &MessageId, source: MessagingError) -> Self {
        Self::DeadLetter {
            message_id: message_id.clone(),
            source,
        }
    }

    pub fn abandon(message_id: &MessageId, source: MessagingError) -> Self {
        Self::Abandon {
            message_id: message_id.clone(),
            source,
        }
    }
}

/// One fallback after a failed escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackStep {
    /// Report and dead-letter again, reusing a correlation token already obtained
    RetryEscalation,
    /// Dead-letter without reporting
    ForceDeadLetter,
    /// Release the lock so the message is redelivered now
    Abandon,
    /// Leave the message locked until the broker expires the lock
    GiveUp,
}

/// Fallback steps in the order they are attempted
pub const FALLBACK_CASCADE: [FallbackStep; 4] = [
    FallbackStep::RetryEscalation,
    FallbackStep::ForceDeadLetter,
    FallbackStep::Abandon,
    FallbackStep::GiveUp,
];

impl FallbackStep {
    /// Terminal action in effect when this step succeeds
    pub fn resulting_action(&self) -> TerminalAction {
        match self {
            Self::RetryEscalation | Self::ForceDeadLetter => TerminalAction::DeadLettered,
            Self::Abandon => TerminalAction::Abandoned,
            Self::GiveUp => TerminalAction::LeftForRedelivery,
        }
    }

    /// Whether this step can fail
    pub fn is_fallible(&self) -> bool {
        !matches!(self, Self::GiveUp)
    }
}

impl fmt::Display for FallbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryEscalation => write!(f, "retry_escalation"),
            Self::ForceDeadLetter => write!(f, "force_dead_letter"),
            Self::Abandon => write!(f, "abandon"),
            Self::GiveUp => write!(f, "give_up"),
        }
    }
}
