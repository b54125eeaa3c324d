//! # Messaging Module
//!
//! Broker-neutral messaging primitives for the queue processor.
//!
//! ## Module Structure
//!
//! - `errors` - Gateway error types and transient classification
//! - `message` - Message envelope and property values
//! - `gateway` - The `QueueGateway` trait implemented per broker
//! - `sender` - Serialized per-destination senders and their registry
//! - `providers` - Bundled gateway implementations (in-memory)

pub mod errors;
pub mod gateway;
pub mod message;
pub mod providers;
pub mod sender;

pub use errors::{MessagingError, MessagingResult};
pub use gateway::QueueGateway;
pub use message::{Message, MessageId, PropertyMap, PropertyValue};
pub use providers::{DeadLetteredMessage, InMemoryQueueGateway, QueueStats};
pub use sender::{ChannelSender, SenderRegistry};
