//! # Processor Workers
//!
//! Long-running loops around [`QueueProcessor::execute`]. A worker runs one
//! pass at a time, backs off after passes that found nothing to do, and stops
//! between passes once the shutdown signal flips to `true`. Scaling out means
//! running more workers, each with its own processor and receive handle.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use queue_processors::{
//!     join_workers, spawn_configured_workers, InMemoryQueueGateway, MessageHandler,
//!     ProcessorConfig, QueueProcessor, SenderRegistry,
//! };
//! use tokio::sync::watch;
//!
//! # async fn example<H: MessageHandler>(
//! #     make_handler: impl Fn() -> H,
//! # ) -> Result<(), queue_processors::QueueProcessorError> {
//! let config = ProcessorConfig {
//!     worker_count: 4,
//!     ..ProcessorConfig::for_queue("orders")
//! };
//! let gateway = Arc::new(InMemoryQueueGateway::from_config(&config));
//! let senders = SenderRegistry::new();
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let handles = spawn_configured_workers(&config, &shutdown_rx, |_| {
//!     QueueProcessor::new(make_handler(), gateway.clone(), &config, &senders)
//! });
//!
//! shutdown_tx.send(true).ok();
//! let totals = join_workers(handles).await?;
//! println!("{totals:?}");
//! # Ok::<(), queue_processors::QueueProcessorError>(())
//! # }
//! ```

use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ProcessorConfig;
use crate::error::{QueueProcessorError, Result};
use crate::lifecycle::{MessageHandler, PassOutcome, QueueProcessor, TerminalAction};

/// Counters of pass outcomes for one worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub passes: u64,
    pub idle_passes: u64,
    pub receive_failures: u64,
    pub acknowledged: u64,
    pub abandoned: u64,
    pub dead_lettered: u64,
    pub left_for_redelivery: u64,
    /// Messages reported to the error channel
    pub escalated: u64,
}

impl WorkerStats {
    pub fn record(&mut self, pass: &PassOutcome) {
        self.passes += 1;
        match pass {
            PassOutcome::Idle => self.idle_passes += 1,
            PassOutcome::ReceiveFailed { .. } => self.receive_failures += 1,
            PassOutcome::Resolved {
                action,
                correlation_token,
                ..
            } => {
                match action {
                    TerminalAction::Acknowledged => self.acknowledged += 1,
                    TerminalAction::Abandoned => self.abandoned += 1,
                    TerminalAction::DeadLettered => self.dead_lettered += 1,
                    TerminalAction::LeftForRedelivery => self.left_for_redelivery += 1,
                }
                if correlation_token.is_some() {
                    self.escalated += 1;
                }
            }
        }
    }

    /// Add another worker's counters to these
    pub fn merge(&mut self, other: &WorkerStats) {
        self.passes += other.passes;
        self.idle_passes += other.idle_passes;
        self.receive_failures += other.receive_failures;
        self.acknowledged += other.acknowledged;
        self.abandoned += other.abandoned;
        self.dead_lettered += other.dead_lettered;
        self.left_for_redelivery += other.left_for_redelivery;
        self.escalated += other.escalated;
    }

    /// Passes that received a message
    pub fn messages_handled(&self) -> u64 {
        self.passes - self.idle_passes - self.receive_failures
    }
}

/// Loop running one processor until shutdown
pub struct ProcessorWorker<H: MessageHandler> {
    worker_id: usize,
    processor: QueueProcessor<H>,
    idle_backoff: Duration,
    shutdown: watch::Receiver<bool>,
    stats: WorkerStats,
}

impl<H: MessageHandler> ProcessorWorker<H> {
    pub fn new(
        worker_id: usize,
        processor: QueueProcessor<H>,
        idle_backoff: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            worker_id,
            processor,
            idle_backoff,
            shutdown,
            stats: WorkerStats::default(),
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    fn is_shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run passes until shutdown is requested, returning the final counters
    pub async fn run(mut self) -> WorkerStats {
        info!(
            worker_id = self.worker_id,
            queue = %self.processor.queue_name(),
            "🚀 Processor worker started"
        );

        while !self.is_shutdown_requested() {
            let pass = self.processor.execute().await;
            self.stats.record(&pass);

            let back_off = matches!(pass, PassOutcome::Idle | PassOutcome::ReceiveFailed { .. });
            if back_off && sleep_with_shutdown(self.idle_backoff, &mut self.shutdown).await {
                break;
            }
        }

        info!(
            worker_id = self.worker_id,
            queue = %self.processor.queue_name(),
            passes = self.stats.passes,
            messages_handled = self.stats.messages_handled(),
            dead_lettered = self.stats.dead_lettered,
            "🛑 Processor worker stopped"
        );
        self.stats
    }
}

/// Sleep for `delay` unless shutdown is requested first
///
/// Returns `true` when the worker should stop. A dropped shutdown sender
/// counts as a shutdown request.
async fn sleep_with_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Spawn `count` independent workers, each with a processor from `make_processor`
///
/// `make_processor` receives the worker id. Each handle resolves to that
/// worker's counters once it has stopped.
pub fn spawn_workers<H, F>(
    count: usize,
    idle_backoff: Duration,
    shutdown: &watch::Receiver<bool>,
    mut make_processor: F,
) -> Vec<JoinHandle<WorkerStats>>
where
    H: MessageHandler,
    F: FnMut(usize) -> QueueProcessor<H>,
{
    debug!(count, idle_backoff_ms = idle_backoff.as_millis() as u64, "Spawning processor workers");

    (0..count)
        .map(|worker_id| {
            let worker = ProcessorWorker::new(
                worker_id,
                make_processor(worker_id),
                idle_backoff,
                shutdown.clone(),
            );
            tokio::spawn(worker.run())
        })
        .collect()
}

/// Spawn `config.worker_count` workers backing off for `config.idle_backoff()`
pub fn spawn_configured_workers<H, F>(
    config: &ProcessorConfig,
    shutdown: &watch::Receiver<bool>,
    make_processor: F,
) -> Vec<JoinHandle<WorkerStats>>
where
    H: MessageHandler,
    F: FnMut(usize) -> QueueProcessor<H>,
{
    spawn_workers(
        config.worker_count,
        config.idle_backoff(),
        shutdown,
        make_processor,
    )
}

/// Wait for every worker to stop and add up their counters
///
/// Fails if any worker panicked or was cancelled.
pub async fn join_workers(handles: Vec<JoinHandle<WorkerStats>>) -> Result<WorkerStats> {
    let mut total = WorkerStats::default();

    for joined in join_all(handles).await {
        let stats =
            joined.map_err(|e| QueueProcessorError::worker(format!("worker task failed: {e}")))?;
        total.merge(&stats);
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MessageId;

    #[test]
    fn test_stats_record_every_outcome() {
        let mut stats = WorkerStats::default();
        let id = MessageId::new("m-1");

        stats.record(&PassOutcome::Idle);
        stats.record(&PassOutcome::ReceiveFailed { transient: true });
        stats.record(&PassOutcome::Resolved {
            message_id: id.clone(),
            action: TerminalAction::Acknowledged,
            correlation_token: None,
        });
        stats.record(&PassOutcome::Resolved {
            message_id: id,
            action: TerminalAction::DeadLettered,
            correlation_token: Some(MessageId::new("err-1")),
        });

        assert_eq!(stats.passes, 4);
        assert_eq!(stats.idle_passes, 1);
        assert_eq!(stats.receive_failures, 1);
        assert_eq!(stats.acknowledged, 1);
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(stats.escalated, 1);
        assert_eq!(stats.messages_handled(), 2);
    }

    #[test]
    fn test_stats_merge() {
        let mut total = WorkerStats {
            passes: 2,
            acknowledged: 1,
            ..WorkerStats::default()
        };
        total.merge(&WorkerStats {
            passes: 3,
            acknowledged: 2,
            idle_passes: 1,
            ..WorkerStats::default()
        });

        assert_eq!(total.passes, 5);
        assert_eq!(total.acknowledged, 3);
        assert_eq!(total.idle_passes, 1);
    }

    #[tokio::test]
    async fn test_sleep_with_shutdown_wakes_on_signal() {
        let (tx, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            sleep_with_shutdown(Duration::from_secs(30), &mut rx).await
        });
        tx.send(true).unwrap();

        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_sleep_with_shutdown_times_out() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!sleep_with_shutdown(Duration::from_millis(5), &mut rx).await);
    }
}
