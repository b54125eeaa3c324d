use std::fmt;

/// Per-message lifecycle states
///
/// Held only for the duration of one pass; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Message taken from the queue under a peek-lock
    Received,
    /// Property map being mapped into the parameter record
    Decoding,
    /// Handler running
    Processing,
    /// Acknowledging after success
    Completing,
    /// Giving the message back for redelivery
    Retrying,
    /// Escalating and dead-lettering
    Terminating,
    /// The pass is done with the message
    Resolved,
}

impl LifecycleState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved)
    }

    /// Whether `next` may follow this state
    pub fn can_transition_to(&self, next: Self) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Received, Decoding)
                | (Decoding, Processing)
                | (Decoding, Terminating)
                | (Processing, Completing)
                | (Processing, Retrying)
                | (Processing, Terminating)
                | (Processing, Resolved)
                | (Completing, Resolved)
                | (Retrying, Resolved)
                | (Terminating, Resolved)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Decoding => write!(f, "decoding"),
            Self::Processing => write!(f, "processing"),
            Self::Completing => write!(f, "completing"),
            Self::Retrying => write!(f, "retrying"),
            Self::Terminating => write!(f, "terminating"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}
