//! # Message Lifecycle
//!
//! The per-message state machine: receive, decode, process and resolve the
//! message to exactly one terminal action, with a fallback cascade guarding
//! the escalation path.

pub mod cascade;
pub mod outcome;
pub mod processor;
pub mod states;

pub use cascade::{FallbackStep, LifecycleError, FALLBACK_CASCADE};
pub use outcome::{HandlerError, PassOutcome, ProcessOutcome, TerminalAction};
pub use processor::{MessageHandler, QueueProcessor};
pub use states::LifecycleState;
