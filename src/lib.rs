#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Queue Processors
//!
//! Generic at-least-once message-queue consumer.
//!
//! ## Overview
//!
//! A [`QueueProcessor`] receives one message per pass, decodes its property
//! map into a typed parameter record, hands the record to a user
//! [`MessageHandler`] and resolves the message to a single terminal action:
//!
//! - **Complete**: acknowledge
//! - **ReprocessLater** or a transient failure: leave it for redelivery after
//!   the broker's lock expires
//! - **ReprocessImmediately**: abandon so it is redelivered now
//! - **Broken**, an unexpected error or undecodable parameters: report a
//!   diagnostic record to the error channel, then dead-letter the message with
//!   the report's id as the correlation token
//!
//! When the escalation path itself fails, an ordered fallback cascade (retry,
//! force dead-letter, abandon, give up) guarantees that no pass leaves a
//! message stuck beyond the broker's own lock expiry.
//!
//! ## Module Organization
//!
//! - [`codec`] - Typed parameter record ↔ message property map
//! - [`reporting`] - Diagnostic records and error-channel escalation
//! - [`lifecycle`] - The per-message state machine and fallback cascade
//! - [`messaging`] - Gateway trait, message envelope, senders, in-memory broker
//! - [`worker`] - Worker loops and scale-out
//! - [`config`] - Layered processor configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use queue_processors::{
//!     HandlerError, InMemoryQueueGateway, MessageHandler, PassOutcome, ProcessOutcome,
//!     ProcessorConfig, QueueProcessor, SenderRegistry, TerminalAction,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! #[serde(rename_all = "PascalCase")]
//! struct Welcome {
//!     email: String,
//! }
//!
//! struct WelcomeMailer;
//!
//! #[async_trait]
//! impl MessageHandler for WelcomeMailer {
//!     type Params = Welcome;
//!
//!     async fn process_message(&self, params: Welcome) -> Result<ProcessOutcome, HandlerError> {
//!         println!("sending welcome mail to {}", params.email);
//!         Ok(ProcessOutcome::Complete)
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let config = ProcessorConfig {
//!     receive_timeout_ms: 10,
//!     ..ProcessorConfig::for_queue("signups")
//! };
//! let gateway = Arc::new(InMemoryQueueGateway::new("signups"));
//! let processor = QueueProcessor::new(WelcomeMailer, gateway, &config, &SenderRegistry::new());
//!
//! processor
//!     .send(&Welcome { email: "ada@example.com".into() }, "welcome")
//!     .await?;
//!
//! let pass = processor.execute().await;
//! assert_eq!(pass.action(), Some(TerminalAction::Acknowledged));
//! assert_eq!(processor.execute().await, PassOutcome::Idle);
//! # Ok::<(), queue_processors::QueueProcessorError>(())
//! # }).unwrap();
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod reporting;
pub mod worker;

pub use codec::{CodecError, MessageParams};
pub use config::{ConfigurationError, ProcessorConfig};
pub use error::{QueueProcessorError, Result};
pub use lifecycle::{
    FallbackStep, HandlerError, LifecycleError, LifecycleState, MessageHandler, PassOutcome,
    ProcessOutcome, QueueProcessor, TerminalAction, FALLBACK_CASCADE,
};
pub use logging::init_structured_logging;
pub use messaging::{
    ChannelSender, InMemoryQueueGateway, Message, MessageId, MessagingError, PropertyMap,
    PropertyValue, QueueGateway, SenderRegistry,
};
pub use reporting::{DiagnosticRecord, ErrorReporter, ProcessingError};
pub use worker::{
    join_workers, spawn_configured_workers, spawn_workers, ProcessorWorker, WorkerStats,
};
