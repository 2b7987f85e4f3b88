//! EventRecorder - bounded asynchronous event writer
//!
//! Producers hand events to a bounded queue and return as soon as there is
//! room; a single writer task drains the queue in FIFO order. A full queue
//! makes producers wait (backpressure) instead of growing memory. Storage
//! failures are logged by the writer and never reach the producer.

use super::traits::EventStoreTrait;
use crate::error::{Error, Result};
use crate::event::{EventType, NewEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

enum WriteOp {
    Append(NewEvent),
    Flush(oneshot::Sender<()>),
}

/// Counters kept by the writer task
#[derive(Debug, Default)]
struct WriterStats {
    written: AtomicU64,
    failed: AtomicU64,
}

/// Event recorder feeding a single writer task
pub struct EventRecorder {
    tx: mpsc::Sender<WriteOp>,
    writer: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<WriterStats>,
}

impl EventRecorder {
    /// Spawn the writer task over `store` with a queue of `capacity` events
    pub fn spawn(store: Arc<dyn EventStoreTrait>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(WriterStats::default());
        let writer = tokio::spawn(run_writer(store, rx, stats.clone()));
        Self {
            tx,
            writer: Mutex::new(Some(writer)),
            stats,
        }
    }

    /// Queue an event stamped with the current time
    pub async fn record(&self, session_id: &str, event_type: EventType, data: &[u8]) -> Result<()> {
        self.enqueue(NewEvent::new(session_id, event_type, data)).await
    }

    /// Queue a prepared event
    pub async fn enqueue(&self, event: NewEvent) -> Result<()> {
        self.tx
            .send(WriteOp::Append(event))
            .await
            .map_err(|_| Error::QueueClosed)
    }

    /// Wait until every event queued before this call has been handled
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriteOp::Flush(ack_tx))
            .await
            .map_err(|_| Error::QueueClosed)?;
        ack_rx.await.map_err(|_| Error::QueueClosed)
    }

    /// Events written successfully so far
    #[must_use]
    pub fn written(&self) -> u64 {
        self.stats.written.load(Ordering::Relaxed)
    }

    /// Events the backend rejected so far
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    /// Drain the queue and stop the writer task
    pub async fn shutdown(&self) {
        if let Err(e) = self.flush().await {
            debug!("Event writer already stopped: {}", e);
        }
        if let Some(writer) = self.writer.lock().await.take() {
            writer.abort();
            let _ = writer.await;
        }
        info!(
            written = self.written(),
            failed = self.failed(),
            "Event writer stopped"
        );
    }
}

async fn run_writer(
    store: Arc<dyn EventStoreTrait>,
    mut rx: mpsc::Receiver<WriteOp>,
    stats: Arc<WriterStats>,
) {
    debug!(backend = store.name(), "Event writer started");
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Append(event) => match store.append(&event).await {
                Ok(_) => {
                    stats.written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        session_id = %event.session_id,
                        event_type = %event.event_type,
                        "Failed to record event: {}",
                        e
                    );
                }
            },
            WriteOp::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
