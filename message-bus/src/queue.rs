//! In-process work queue
//!
//! At-least-once delivery within one process:
//! - Bounded channel; `submit` waits for capacity and acks on enqueue
//! - Up to `max_concurrent` handler executions at a time
//! - Transient failures are redelivered with exponential backoff
//! - Permanent failures, and transient ones after `max_deliver` attempts,
//!   go to the dead-letter sink
//!
//! Pending redeliveries are dropped on shutdown.

use crate::{
    dlq::{DeadLetterSink, DlqEntry},
    error::HandlerError,
    handler::{handle_within, MessageHandler, Submitter},
    message::Message,
    metrics::{
        outcome_label, MESSAGE_PROCESS_DURATION, MESSAGE_PROCESS_TOTAL, MESSAGE_REDELIVERY_TOTAL,
        MESSAGE_SUBMIT_TOTAL,
    },
    Error, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Work queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Channel capacity
    pub capacity: usize,

    /// Max concurrent handler executions
    pub max_concurrent: usize,

    /// Max delivery attempts per task
    pub max_deliver: u32,

    /// Handler deadline (milliseconds); expiry counts as a transient failure
    pub handler_timeout_ms: u64,

    /// First redelivery delay (milliseconds)
    pub initial_backoff_ms: u64,

    /// Redelivery delay cap (milliseconds)
    pub max_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_concurrent: 10,
            max_deliver: 5,
            handler_timeout_ms: 30_000,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
        }
    }
}

impl QueueConfig {
    /// Delay before delivery attempt `attempt + 1`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

#[derive(Debug)]
struct Delivery {
    message: Message,
    attempt: u32,
}

struct Worker {
    handler: Arc<dyn MessageHandler>,
    dead_letters: Arc<dyn DeadLetterSink>,
    config: QueueConfig,
    redeliver: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
}

/// In-process at-least-once queue
pub struct WorkQueue {
    tx: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("max_concurrent", &self.max_concurrent)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl WorkQueue {
    /// Start the queue; deliveries go to `handler`
    ///
    /// Must be called within a tokio runtime.
    pub fn start(
        handler: Arc<dyn MessageHandler>,
        dead_letters: Arc<dyn DeadLetterSink>,
        config: QueueConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let cancel = CancellationToken::new();
        let max_concurrent = config.max_concurrent.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));

        let worker = Arc::new(Worker {
            handler,
            dead_letters,
            config,
            redeliver: tx.clone(),
            cancel: cancel.clone(),
        });

        let dispatcher = tokio::spawn(
            dispatch(rx, worker, Arc::clone(&semaphore), cancel.clone())
                .instrument(tracing::info_span!("work_queue")),
        );

        info!(max_concurrent, "Work queue started");

        Arc::new(Self {
            tx,
            cancel,
            semaphore,
            max_concurrent,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Stop accepting tasks and wait for in-flight handlers
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.await {
                error!("Work queue dispatcher failed: {}", e);
            }
        }

        // Every permit back means no handler is running
        let _ = self.semaphore.acquire_many(self.max_concurrent as u32).await;

        info!("Work queue stopped");
    }

    /// Token cancelled on shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[async_trait]
impl Submitter for WorkQueue {
    async fn submit(&self, message: Message) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Closed);
        }

        let message_type = message.type_name.clone();
        let result = self
            .tx
            .send(Delivery {
                message,
                attempt: 1,
            })
            .await
            .map_err(|_| Error::Closed);

        let status = if result.is_ok() { "success" } else { "error" };
        MESSAGE_SUBMIT_TOTAL
            .with_label_values(&[message_type.as_str(), status])
            .inc();

        result
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<Delivery>,
    worker: Arc<Worker>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => break,
            delivery = rx.recv() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            worker.process(delivery).await;
            drop(permit);
        });
    }

    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(dropped, "Work queue stopped with undelivered tasks");
    }
}

impl Worker {
    async fn process(self: Arc<Self>, delivery: Delivery) {
        let Delivery { message, attempt } = delivery;
        let message_type = message.type_name.as_str();

        let span = tracing::debug_span!(
            "deliver",
            message_id = %message.id,
            message_type,
            attempt
        );

        let start = Instant::now();
        let timeout = Duration::from_millis(self.config.handler_timeout_ms);
        let result = handle_within(self.handler.as_ref(), &message, timeout)
            .instrument(span)
            .await;

        MESSAGE_PROCESS_DURATION
            .with_label_values(&[message_type])
            .observe(start.elapsed().as_secs_f64());
        MESSAGE_PROCESS_TOTAL
            .with_label_values(&[message_type, outcome_label(&result)])
            .inc();

        match result {
            Ok(()) => debug!(message_id = %message.id, attempt, "Task handled"),
            Err(HandlerError::Transient(reason)) if attempt < self.config.max_deliver => {
                let delay = self.config.backoff(attempt);
                warn!(
                    message_id = %message.id,
                    attempt,
                    ?delay,
                    %reason,
                    "Task failed, redelivering"
                );
                MESSAGE_REDELIVERY_TOTAL
                    .with_label_values(&[message_type])
                    .inc();
                self.redeliver_later(message, attempt + 1, delay);
            }
            Err(e) => {
                let entry = DlqEntry::new(message, e.reason(), attempt, !e.is_transient());
                if let Err(err) = self.dead_letters.dead_letter(entry).await {
                    error!("Failed to dead-letter task: {}", err);
                }
            }
        }
    }

    fn redeliver_later(&self, message: Message, attempt: u32, delay: Duration) {
        let tx = self.redeliver.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(message_id = %message.id, "Redelivery dropped on shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    if tx.send(Delivery { message, attempt }).await.is_err() {
                        warn!("Redelivery dropped, queue closed");
                    }
                }
            }
        });
    }
}
