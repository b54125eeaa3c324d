//! # Queue Gateway Providers
//!
//! Bundled `QueueGateway` implementations. Broker-backed gateways live with
//! the applications that own the broker connection.

pub mod in_memory;

pub use in_memory::{DeadLetteredMessage, InMemoryQueueGateway, QueueStats, DEFAULT_LOCK_DURATION};
