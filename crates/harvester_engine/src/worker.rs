use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_error, engine_warn};
use harvester_core::ResolvedRecord;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::collab::RecordSink;
use crate::pending::PendingLedger;

/// Hand-off point between the item pipeline and the persistence worker.
pub type PersistenceQueue = mpsc::UnboundedSender<ResolvedRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSettings {
    /// Flush once this many records are buffered.
    pub batch_size: usize,
    /// Flush a non-empty buffer this long after the previous flush.
    pub flush_interval: Duration,
    /// How long one queue poll waits before re-checking the stop signal.
    pub poll: Duration,
}

#[derive(Debug, Default)]
struct WriterStats {
    saved: AtomicUsize,
    failed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterTotals {
    pub saved: usize,
    pub failed: usize,
}

/// Background task draining the persistence queue into the sink.
///
/// A confirmed save removes the record's label from the pending ledger; a
/// refused or failed save leaves it there for the next run.
pub struct PersistenceWorker {
    queue: PersistenceQueue,
    stop: CancellationToken,
    stats: Arc<WriterStats>,
    handle: JoinHandle<()>,
}

impl PersistenceWorker {
    pub fn spawn(
        sink: Arc<dyn RecordSink>,
        ledger: Arc<PendingLedger>,
        settings: WriterSettings,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let stats = Arc::new(WriterStats::default());
        let handle = tokio::spawn(run_writer(
            rx,
            sink,
            ledger,
            settings,
            stop.clone(),
            stats.clone(),
        ));
        Self {
            queue,
            stop,
            stats,
            handle,
        }
    }

    pub fn queue(&self) -> PersistenceQueue {
        self.queue.clone()
    }

    /// Signals the worker to stop once the queue is drained and waits for it.
    ///
    /// With `grace` set, waits at most that long; records still queued after
    /// that are dropped (their labels stay in the pending ledger).
    pub async fn stop(self, grace: Option<Duration>) -> WriterTotals {
        self.stop.cancel();
        drop(self.queue);
        let mut handle = self.handle;
        let joined = match grace {
            None => Some((&mut handle).await),
            Some(grace) => match timeout(grace, &mut handle).await {
                Ok(result) => Some(result),
                Err(_) => {
                    engine_warn!(
                        "Persistence worker still busy after {:.1}s grace period, abandoning queue",
                        grace.as_secs_f64()
                    );
                    handle.abort();
                    None
                }
            },
        };
        if let Some(Err(err)) = joined {
            engine_error!("Persistence worker ended abnormally: {}", err);
        }
        WriterTotals {
            saved: self.stats.saved.load(Ordering::SeqCst),
            failed: self.stats.failed.load(Ordering::SeqCst),
        }
    }
}

async fn run_writer(
    mut rx: mpsc::UnboundedReceiver<ResolvedRecord>,
    sink: Arc<dyn RecordSink>,
    ledger: Arc<PendingLedger>,
    settings: WriterSettings,
    stop: CancellationToken,
    stats: Arc<WriterStats>,
) {
    let batch_size = settings.batch_size.max(1);
    let mut buffer: Vec<ResolvedRecord> = Vec::with_capacity(batch_size);
    let mut last_flush = Instant::now();
    let mut closed = false;
    engine_debug!("Persistence worker started");

    loop {
        if (stop.is_cancelled() || closed) && buffer.is_empty() && rx.is_empty() {
            break;
        }

        if !closed {
            match timeout(settings.poll, rx.recv()).await {
                Ok(Some(record)) => buffer.push(record),
                Ok(None) => closed = true,
                Err(_) => {}
            }
        }

        let stopping = stop.is_cancelled() || closed;
        if stopping {
            while buffer.len() < batch_size {
                match rx.try_recv() {
                    Ok(record) => buffer.push(record),
                    Err(_) => break,
                }
            }
        }

        let should_flush = buffer.len() >= batch_size
            || (!buffer.is_empty() && last_flush.elapsed() >= settings.flush_interval)
            || (stopping && !buffer.is_empty());
        if should_flush {
            flush(&mut buffer, sink.as_ref(), &ledger, &stats).await;
            last_flush = Instant::now();
        }
    }

    engine_debug!("Persistence worker finished");
}

async fn flush(
    buffer: &mut Vec<ResolvedRecord>,
    sink: &dyn RecordSink,
    ledger: &PendingLedger,
    stats: &WriterStats,
) {
    engine_debug!("Flushing {} records to sink", buffer.len());
    for record in buffer.drain(..) {
        match sink.save(&record).await {
            Ok(true) => {
                stats.saved.fetch_add(1, Ordering::SeqCst);
                if let Err(err) = ledger.remove(&record.label) {
                    engine_error!(
                        "Failed to clear {:?} from pending ledger: {}",
                        record.label,
                        err
                    );
                }
            }
            Ok(false) => {
                stats.failed.fetch_add(1, Ordering::SeqCst);
                engine_warn!("Sink refused record {:?}", record.label);
            }
            Err(err) => {
                stats.failed.fetch_add(1, Ordering::SeqCst);
                engine_error!("Sink failed on record {:?}: {}", record.label, err);
            }
        }
    }
}
