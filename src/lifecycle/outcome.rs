//! Handler results and the outcome of a processing pass.

use std::fmt;

use thiserror::Error;

use crate::messaging::errors::is_transient_io_kind;
use crate::messaging::{MessageId, MessagingError};
use crate::reporting::ProcessingError;

/// What the handler decided about a message
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Processing succeeded; the message is acknowledged
    Complete,
    /// Leave the message locked; the broker redelivers it after the lock expires
    ReprocessLater,
    /// Release the lock now so the message is redelivered right away
    ReprocessImmediately,
    /// The message can never be processed; report it and dead-letter it
    Broken(ProcessingError),
}

impl ProcessOutcome {
    pub fn broken(cause: impl Into<ProcessingError>) -> Self {
        Self::Broken(cause.into())
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::ReprocessLater => "reprocess_later",
            Self::ReprocessImmediately => "reprocess_immediately",
            Self::Broken(_) => "broken",
        }
    }
}

impl From<ProcessingError> for ProcessOutcome {
    fn from(cause: ProcessingError) -> Self {
        Self::Broken(cause)
    }
}

/// Handler failures that are not a decision about the message
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A dependency was unreachable; the message is left for redelivery
    #[error("Transient failure: {message}")]
    Transient { message: String },

    /// Anything else; the message is escalated like a broken one
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn unexpected(err: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected(err.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Connectivity failures inside a handler are transient; any other I/O
/// failure (missing file, bad data, permissions) is unexpected
impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        if is_transient_io_kind(err.kind()) {
            Self::transient(err.to_string())
        } else {
            Self::Unexpected(err.into())
        }
    }
}

/// Gateway failures keep their classification
impl From<MessagingError> for HandlerError {
    fn from(err: MessagingError) -> Self {
        if err.is_transient() {
            Self::transient(err.to_string())
        } else {
            Self::Unexpected(err.into())
        }
    }
}

/// Terminal action taken on a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalAction {
    Acknowledged,
    Abandoned,
    DeadLettered,
    /// No action; the message is redelivered once its lock expires
    LeftForRedelivery,
}

impl fmt::Display for TerminalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acknowledged => write!(f, "acknowledged"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::DeadLettered => write!(f, "dead_lettered"),
            Self::LeftForRedelivery => write!(f, "left_for_redelivery"),
        }
    }
}

/// Result of one `execute()` pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing was waiting on the queue
    Idle,
    /// Receiving failed; nothing was received
    ReceiveFailed { transient: bool },
    /// A message was received and resolved
    Resolved {
        message_id: MessageId,
        action: TerminalAction,
        /// Error-channel message id, when the message was escalated
        correlation_token: Option<MessageId>,
    },
}

impl PassOutcome {
    pub(crate) fn resolved(message_id: &MessageId, action: TerminalAction) -> Self {
        Self::Resolved {
            message_id: message_id.clone(),
            action,
            correlation_token: None,
        }
    }

    /// Whether a message was received in this pass
    pub fn received_message(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    pub fn action(&self) -> Option<TerminalAction> {
        match self {
            Self::Resolved { action, .. } => Some(*action),
            _ => None,
        }
    }
}
