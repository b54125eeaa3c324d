#![allow(dead_code)]

pub mod gateway;
pub mod strategies;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queue_processors::{
    HandlerError, Message, MessageHandler, ProcessOutcome, ProcessorConfig, QueueGateway,
    QueueProcessor, SenderRegistry,
};
use serde::{Deserialize, Serialize};

pub use gateway::{GatewayCall, Operation, ScriptedGateway};

pub const QUEUE: &str = "orders";
pub const ERRORS: &str = "ERRORS";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderParams {
    pub order_id: String,
    pub customer_id: i64,
    pub quantity: u32,
    pub unit_price: f64,
    pub rush: bool,
    pub requested_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl OrderParams {
    pub fn new(order_id: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            quantity: 1,
            ..Self::default()
        }
    }
}

type Script = dyn Fn(&OrderParams) -> Result<ProcessOutcome, HandlerError> + Send + Sync;

/// Handler that answers every message with the result of a closure
pub struct ScriptedHandler {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new(
        script: impl Fn(&OrderParams) -> Result<ProcessOutcome, HandlerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn completing() -> Self {
        Self::new(|_| Ok(ProcessOutcome::Complete))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    type Params = OrderParams;

    async fn process_message(&self, params: OrderParams) -> Result<ProcessOutcome, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(&params)
    }
}

pub fn test_config() -> ProcessorConfig {
    queue_processors::init_structured_logging();
    ProcessorConfig {
        receive_timeout_ms: 20,
        idle_backoff_ms: 5,
        ..ProcessorConfig::for_queue(QUEUE)
    }
}

pub fn processor_with<G: QueueGateway>(
    handler: ScriptedHandler,
    gateway: &Arc<G>,
    senders: &SenderRegistry,
) -> QueueProcessor<ScriptedHandler> {
    let gateway: Arc<dyn QueueGateway> = gateway.clone();
    QueueProcessor::new(handler, gateway, &test_config(), senders)
}

pub fn processor<G: QueueGateway>(
    handler: ScriptedHandler,
    gateway: &Arc<G>,
) -> QueueProcessor<ScriptedHandler> {
    processor_with(handler, gateway, &SenderRegistry::new())
}

pub fn order_message(order_id: &str) -> Message {
    Message::new()
        .with_property("OrderId", order_id)
        .with_property("Quantity", 2_i64)
        .with_property("MessageName", QUEUE)
}
