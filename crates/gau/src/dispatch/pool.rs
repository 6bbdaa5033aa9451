use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::WorkerError;
use crate::mirror::{MirrorSynchronizer, SyncReport};
use crate::whitelist::MirrorTarget;

/// One accepted sync request: a source and the targets it had at lookup time.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub id: String,
    pub source: String,
    pub targets: Vec<MirrorTarget>,
    pub queued_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn new(source: impl Into<String>, targets: Vec<MirrorTarget>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            targets,
            queued_at: Utc::now(),
        }
    }
}

/// Fixed set of sync workers fed by a bounded queue.
///
/// Submitting never waits: when the queue is full the job is refused.
pub struct SyncPool {
    job_sender: Mutex<Option<mpsc::Sender<SyncJob>>>,
    report_sender: broadcast::Sender<Arc<SyncReport>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
    capacity: usize,
}

impl SyncPool {
    /// Spawns `worker_count` workers on the current tokio runtime.
    pub fn new(synchronizer: Arc<MirrorSynchronizer>, worker_count: usize, capacity: usize) -> Self {
        let worker_count = worker_count.max(1);
        let capacity = capacity.max(1);
        let (job_sender, job_receiver) = mpsc::channel::<SyncJob>(capacity);
        let (report_sender, _) = broadcast::channel(capacity.max(16));
        let job_receiver = Arc::new(tokio::sync::Mutex::new(job_receiver));

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&job_receiver),
                    Arc::clone(&synchronizer),
                    report_sender.clone(),
                ))
            })
            .collect();

        info!(
            "Started {} sync workers (queue capacity {})",
            worker_count, capacity
        );

        Self {
            job_sender: Mutex::new(Some(job_sender)),
            report_sender,
            workers: Mutex::new(workers),
            shutdown: AtomicBool::new(false),
            capacity,
        }
    }

    pub fn submit(&self, job: SyncJob) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        let sender = self
            .job_sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = sender.as_ref().ok_or(WorkerError::ChannelClosed)?;

        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => {
                debug!("Queue full, refusing sync of {}", job.source);
                WorkerError::QueueFull {
                    capacity: self.capacity,
                }
            }
            TrySendError::Closed(_) => WorkerError::ChannelClosed,
        })
    }

    /// Reports of finished syncs, for whoever wants to observe outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SyncReport>> {
        self.report_sender.subscribe()
    }

    /// Stops accepting jobs. Jobs already queued still run.
    pub fn shutdown(&self) {
        info!("Shutting down sync pool...");
        self.shutdown.store(true, Ordering::Relaxed);
        // Dropping the sender lets workers exit once the queue is drained
        self.job_sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    /// Shuts down and waits for every worker to finish its remaining jobs.
    pub async fn wait(&self) {
        self.shutdown();

        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("Sync worker {} panicked: {}", i, e);
            } else {
                debug!("Sync worker {} finished", i);
            }
        }

        info!("All sync workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

async fn run_worker(
    worker_id: usize,
    job_receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<SyncJob>>>,
    synchronizer: Arc<MirrorSynchronizer>,
    report_sender: broadcast::Sender<Arc<SyncReport>>,
) {
    debug!("Sync worker {} started", worker_id);

    loop {
        let job = job_receiver.lock().await.recv().await;
        let Some(job) = job else {
            debug!("Sync worker {} job channel closed", worker_id);
            break;
        };

        debug!(
            "Sync worker {} running job {} for {} (queued {})",
            worker_id,
            job.id,
            job.source,
            job.queued_at.to_rfc3339()
        );

        let report = synchronizer.sync_source(&job.source, &job.targets).await;
        // No receivers is fine
        let _ = report_sender.send(Arc::new(report));
    }

    debug!("Sync worker {} stopped", worker_id);
}
