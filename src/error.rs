//! # Crate Errors
//!
//! Top-level error type gathering the per-concern errors. The lifecycle never
//! surfaces errors from a pass; this type covers setup (configuration, logging)
//! and the operations callers invoke directly, such as sending.

use thiserror::Error;

use crate::codec::CodecError;
use crate::config::ConfigurationError;
use crate::messaging::MessagingError;

#[derive(Error, Debug)]
pub enum QueueProcessorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl QueueProcessorError {
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker(message.into())
    }
}

pub type Result<T> = std::result::Result<T, QueueProcessorError>;
