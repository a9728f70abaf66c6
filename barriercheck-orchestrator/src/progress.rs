//! Single-writer progress publisher
//!
//! One background task per job owns every `analysis_jobs` write for that
//! job. Progress deltas are coalesced so that bursts of module
//! completions produce at most one store write per second; status
//! transitions flush immediately, and the terminal write is the task's
//! last act before it exits. Percent is monotonic: a stale lower value
//! arriving late is ignored.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error};

use barriercheck_core::domain::AuditJob;

use crate::store::{with_retries, AnalysisStore};

/// Minimum spacing between coalesced progress writes.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

enum Signal {
    /// Coalesced write, at most one per second
    Progress,
    /// Write now (status changes)
    Flush,
    /// Write now, then exit
    Terminal,
}

/// Handle to a job's single writer.
///
/// The shared state cell is mutated by the registry under its mutex; the
/// publisher task only ever snapshots it for writing.
pub struct ProgressPublisher {
    state: Arc<Mutex<AuditJob>>,
    tx: mpsc::Sender<Signal>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressPublisher {
    /// Spawn the writer task and persist the initial row immediately.
    pub fn spawn(store: Arc<dyn AnalysisStore>, job: AuditJob) -> Arc<Self> {
        let state = Arc::new(Mutex::new(job));
        // Small mailbox: signals carry no payload, the state cell does.
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(writer_loop(store, state.clone(), rx));

        let publisher = Arc::new(Self {
            state,
            tx,
            task: Mutex::new(Some(task)),
        });
        publisher.request_flush();
        publisher
    }

    /// Access the shared job state cell.
    pub fn state(&self) -> &Arc<Mutex<AuditJob>> {
        &self.state
    }

    /// Request a coalesced progress write.
    pub fn request_progress(&self) {
        // A full mailbox means a write is already queued.
        let _ = self.tx.try_send(Signal::Progress);
    }

    /// Request an immediate write (non-terminal status change).
    pub fn request_flush(&self) {
        let _ = self.tx.try_send(Signal::Flush);
    }

    /// Write the terminal snapshot and wait for the task to finish.
    ///
    /// After this returns, no further write for the job will ever be
    /// issued by this publisher.
    pub async fn finish(&self) {
        let _ = self.tx.send(Signal::Terminal).await;
        let task = self.task.lock().expect("publisher task mutex").take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Progress publisher task failed");
            }
        }
    }
}

async fn writer_loop(
    store: Arc<dyn AnalysisStore>,
    state: Arc<Mutex<AuditJob>>,
    mut rx: mpsc::Receiver<Signal>,
) {
    let mut last_write: Option<Instant> = None;
    let mut dirty = false;

    loop {
        let next_allowed = last_write.map(|t| t + FLUSH_INTERVAL);

        let signal = if dirty {
            // A coalesced write is pending; wake up when it becomes due.
            let deadline = next_allowed.unwrap_or_else(Instant::now);
            tokio::select! {
                s = rx.recv() => s,
                _ = tokio::time::sleep_until(deadline) => {
                    write_snapshot(&store, &state).await;
                    last_write = Some(Instant::now());
                    dirty = false;
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match signal {
            Some(Signal::Progress) => {
                let due = next_allowed.map(|t| Instant::now() >= t).unwrap_or(true);
                if due {
                    write_snapshot(&store, &state).await;
                    last_write = Some(Instant::now());
                    dirty = false;
                } else {
                    dirty = true;
                }
            }
            Some(Signal::Flush) => {
                write_snapshot(&store, &state).await;
                last_write = Some(Instant::now());
                dirty = false;
            }
            Some(Signal::Terminal) => {
                write_snapshot(&store, &state).await;
                debug!("Progress publisher exiting after terminal write");
                return;
            }
            None => {
                if dirty {
                    write_snapshot(&store, &state).await;
                }
                return;
            }
        }
    }
}

async fn write_snapshot(store: &Arc<dyn AnalysisStore>, state: &Arc<Mutex<AuditJob>>) {
    let snapshot = state.lock().expect("job state mutex").clone();
    if let Err(e) = with_retries(|| {
        let store = store.clone();
        let snapshot = snapshot.clone();
        async move { store.upsert_job(&snapshot).await }
    })
    .await
    {
        error!(job_id = %snapshot.id, error = %e, "Persisting job progress failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreError};
    use async_trait::async_trait;
    use barriercheck_core::domain::{FinalReport, JobStatus, ModuleResult, PlanTier};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Store wrapper counting job writes.
    struct CountingStore {
        inner: InMemoryStore,
        job_writes: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisStore for CountingStore {
        async fn upsert_job(&self, job: &AuditJob) -> Result<(), StoreError> {
            self.job_writes.fetch_add(1, Ordering::SeqCst);
            self.inner.upsert_job(job).await
        }
        async fn get_job(&self, job_id: Uuid) -> Result<Option<AuditJob>, StoreError> {
            self.inner.get_job(job_id).await
        }
        async fn list_running_jobs(&self) -> Result<Vec<AuditJob>, StoreError> {
            self.inner.list_running_jobs().await
        }
        async fn upsert_module_result(&self, r: &ModuleResult) -> Result<(), StoreError> {
            self.inner.upsert_module_result(r).await
        }
        async fn list_module_results(&self, id: Uuid) -> Result<Vec<ModuleResult>, StoreError> {
            self.inner.list_module_results(id).await
        }
        async fn upsert_final_report(&self, r: &FinalReport) -> Result<(), StoreError> {
            self.inner.upsert_final_report(r).await
        }
        async fn get_final_report(&self, id: Uuid) -> Result<Option<FinalReport>, StoreError> {
            self.inner.get_final_report(id).await
        }
    }

    #[tokio::test]
    async fn burst_of_progress_updates_is_coalesced() {
        let store = Arc::new(CountingStore {
            inner: InMemoryStore::new(),
            job_writes: AtomicUsize::new(0),
        });
        let job = AuditJob::new("https://example.com", PlanTier::Basic, None);
        let job_id = job.id;

        let publisher = ProgressPublisher::spawn(store.clone(), job);
        // Let the initial flush land.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let baseline = store.job_writes.load(Ordering::SeqCst);

        for percent in 21..=80u8 {
            {
                let mut state = publisher.state().lock().unwrap();
                state.progress = percent;
            }
            publisher.request_progress();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Sixty updates inside well under a second: at most one extra
        // write beyond the pending coalesced one.
        let after_burst = store.job_writes.load(Ordering::SeqCst);
        assert!(
            after_burst - baseline <= 2,
            "expected coalescing, saw {} writes",
            after_burst - baseline
        );

        {
            let mut state = publisher.state().lock().unwrap();
            state.status = JobStatus::Completed;
            state.progress = 100;
        }
        publisher.finish().await;

        let stored = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.progress, 100);
    }

    #[tokio::test]
    async fn terminal_write_is_last() {
        let store = Arc::new(CountingStore {
            inner: InMemoryStore::new(),
            job_writes: AtomicUsize::new(0),
        });
        let job = AuditJob::new("https://example.com", PlanTier::Basic, None);

        let publisher = ProgressPublisher::spawn(store.clone(), job);
        {
            let mut state = publisher.state().lock().unwrap();
            state.status = JobStatus::Failed;
            state.error = Some("CrawlFatal: dns".to_string());
        }
        publisher.finish().await;

        let writes_after_finish = store.job_writes.load(Ordering::SeqCst);
        publisher.request_progress();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.job_writes.load(Ordering::SeqCst), writes_after_finish);
    }
}
