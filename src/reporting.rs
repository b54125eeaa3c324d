//! # Error Reporting
//!
//! Escalation of a failed message to the error channel. A [`DiagnosticRecord`]
//! captures the original message id, the cause's structured data, a JSON
//! snapshot of the original property map and, when available, the cause's
//! inner error chain. The record travels as the property map of a new message;
//! that message's id is the correlation token written into the dead-letter
//! description of the original.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::messaging::{ChannelSender, Message, MessageId, MessagingResult, PropertyMap, PropertyValue};

/// Error-channel field holding the original message id
pub const FIELD_MESSAGE_ID: &str = "message_id";

/// Error-channel field holding the JSON snapshot of the original property map
pub const FIELD_MESSAGE_PROPERTIES: &str = "message_properties";

/// Error-channel field holding the JSON inner error chain
pub const FIELD_INNER_EXCEPTION: &str = "inner_exception";

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Cause of a permanent processing failure
///
/// Carries a human-readable message (used as the dead-letter reason), a
/// string map of structured data copied verbatim into the diagnostic record,
/// and an optional inner cause.
#[derive(Debug)]
pub struct ProcessingError {
    message: String,
    data: BTreeMap<String, String>,
    source: Option<BoxError>,
}

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: BTreeMap::new(),
            source: None,
        }
    }

    /// Attach a structured data entry, builder style
    pub fn with_data(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.data.insert(key.into(), value.to_string());
        self
    }

    /// Attach the inner cause, builder style
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for ProcessingError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// An unexpected error becomes a processing error whose message is the
/// outermost context and whose inner cause is the rest of the chain.
impl From<anyhow::Error> for ProcessingError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ProcessingError>() {
            Ok(processing) => return processing,
            Err(err) => err,
        };

        let inner = err
            .chain()
            .skip(1)
            .map(|cause| cause.to_string())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .fold(None, |source, message| {
                Some(CapturedCause {
                    message,
                    source: source.map(Box::new),
                })
            });

        Self {
            message: err.to_string(),
            data: BTreeMap::new(),
            source: inner.map(|cause| Box::new(cause) as BoxError),
        }
    }
}

/// Snapshot of one link of a borrowed error chain
#[derive(Debug)]
struct CapturedCause {
    message: String,
    source: Option<Box<CapturedCause>>,
}

impl fmt::Display for CapturedCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for CapturedCause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

#[derive(Serialize)]
struct InnerCause {
    message: String,
    debug: String,
}

/// Diagnostic context for one escalation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticRecord {
    pub message_id: MessageId,
    pub data: BTreeMap<String, String>,
    pub message_properties: String,
    pub inner_exception: Option<String>,
}

impl DiagnosticRecord {
    /// Capture the diagnostic context of `cause` for `original`
    pub fn build(original: &Message, cause: &ProcessingError) -> MessagingResult<Self> {
        Ok(Self {
            message_id: original.id.clone(),
            data: cause.data.clone(),
            message_properties: serde_json::to_string(&original.properties)?,
            inner_exception: serialize_inner_cause(cause),
        })
    }

    /// Build the error-channel message carrying this record
    ///
    /// Structured data is copied first; a data key that collides with one of
    /// the reserved fields is overwritten by the reserved value.
    pub fn into_message(self) -> Message {
        let mut properties: PropertyMap = self
            .data
            .into_iter()
            .map(|(key, value)| (key, PropertyValue::String(value)))
            .collect();

        for reserved in [FIELD_MESSAGE_ID, FIELD_MESSAGE_PROPERTIES, FIELD_INNER_EXCEPTION] {
            if properties.remove(reserved).is_some() {
                warn!(
                    message_id = %self.message_id,
                    field = reserved,
                    "Structured error data uses a reserved field name; value replaced"
                );
            }
        }

        properties.insert(
            FIELD_MESSAGE_ID.to_string(),
            PropertyValue::String(self.message_id.0),
        );
        properties.insert(
            FIELD_MESSAGE_PROPERTIES.to_string(),
            PropertyValue::String(self.message_properties),
        );
        if let Some(inner) = self.inner_exception {
            properties.insert(FIELD_INNER_EXCEPTION.to_string(), PropertyValue::String(inner));
        }

        Message::with_properties(properties)
    }
}

/// Serialize the inner error chain of `cause`, if it has one
///
/// Best effort: a chain that cannot be serialized is left out of the record.
fn serialize_inner_cause(cause: &ProcessingError) -> Option<String> {
    let mut chain = Vec::new();
    let mut next = cause.source();
    while let Some(err) = next {
        chain.push(InnerCause {
            message: err.to_string(),
            debug: format!("{err:?}"),
        });
        next = err.source();
    }

    if chain.is_empty() {
        return None;
    }

    match serde_json::to_string(&chain) {
        Ok(json) => Some(json),
        Err(e) => {
            debug!(error = %e, "Inner cause could not be serialized; omitted from diagnostic record");
            None
        }
    }
}

/// Forwards diagnostic records to the error channel
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    channel: Arc<ChannelSender>,
}

impl ErrorReporter {
    pub fn new(channel: Arc<ChannelSender>) -> Self {
        Self { channel }
    }

    /// Destination the reports are sent to
    pub fn error_channel(&self) -> &str {
        self.channel.destination()
    }

    /// Report `cause` for `original` and return the correlation token
    ///
    /// The token is the id of the error-channel message. A send failure is
    /// returned to the caller; nothing is retried here.
    pub async fn report(
        &self,
        original: &Message,
        cause: &ProcessingError,
    ) -> MessagingResult<MessageId> {
        let record = DiagnosticRecord::build(original, cause)?;
        let token = self.channel.send(record.into_message()).await?;

        info!(
            message_id = %original.id,
            error_channel = %self.channel.destination(),
            correlation_token = %token,
            reason = %cause.message(),
            "🚨 Failure reported to error channel"
        );

        Ok(token)
    }
}
