//! Supervised pipeline worker
//!
//! Runs are dispatched as explicit `PipelineTask`s onto a bounded queue. A
//! dispatcher hands each task to its own tokio task under a concurrency
//! semaphore and supervises it through its `JoinHandle`:
//! - retryable failures are re-queued after a backoff until `max_attempts`
//! - duplicate dispatches for an in-flight submission are dropped
//! - a panicked run is recorded as `failed:internal` and not retried

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::{ErrorKind, PipelineError};
use crate::pipeline::Pipeline;
use crate::survey::{DocumentId, SubmissionStatus};

// =============================================================================
// Run lock
// =============================================================================

/// In-memory set of submission identifiers with a run in flight.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    in_flight: Arc<DashMap<String, Instant>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `submission_id`; `None` if another run holds it.
    pub fn try_claim(&self, submission_id: &str) -> Option<RunClaim> {
        match self.in_flight.entry(submission_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(RunClaim {
                    submission_id: submission_id.to_string(),
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
        }
    }

    pub fn is_running(&self, submission_id: &str) -> bool {
        self.in_flight.contains_key(submission_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

/// Held for the duration of a run; releases the claim on drop.
#[derive(Debug)]
pub struct RunClaim {
    submission_id: String,
    in_flight: Arc<DashMap<String, Instant>>,
}

impl RunClaim {
    pub fn submission_id(&self) -> &str {
        &self.submission_id
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        if let Some((_, claimed_at)) = self.in_flight.remove(&self.submission_id) {
            debug!(
                submission_id = %self.submission_id,
                held_ms = claimed_at.elapsed().as_millis() as u64,
                "run claim released"
            );
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

/// A queued pipeline run. `attempt` starts at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTask {
    pub document_id: DocumentId,
    pub attempt: u32,
}

impl PipelineTask {
    pub fn first(document_id: DocumentId) -> Self {
        Self {
            document_id,
            attempt: 1,
        }
    }
}

/// Configuration for the pipeline worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Runs allowed in flight at once
    pub concurrency: usize,
    /// Attempts per submission, including the first
    pub max_attempts: u32,
    /// Delay before a failed run is re-queued
    pub retry_backoff: Duration,
    /// Maximum queued tasks
    pub queue_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 3,
            retry_backoff: Duration::from_secs(5),
            queue_size: 1000,
        }
    }
}

/// Queue front-end for supervised pipeline runs.
pub struct PipelineWorker {
    task_tx: mpsc::Sender<PipelineTask>,
    active: Arc<AtomicUsize>,
    concurrency: usize,
}

impl PipelineWorker {
    /// Start the dispatcher. Must be called inside a tokio runtime.
    pub fn start(pipeline: Arc<Pipeline>, config: WorkerConfig) -> Self {
        let (task_tx, task_rx) = mpsc::channel(config.queue_size.max(1));
        let active = Arc::new(AtomicUsize::new(0));
        let concurrency = config.concurrency.max(1);

        info!(
            concurrency,
            max_attempts = config.max_attempts,
            "starting pipeline worker"
        );

        tokio::spawn(dispatch_loop(
            pipeline,
            task_rx,
            task_tx.downgrade(),
            Arc::new(Semaphore::new(concurrency)),
            config,
            Arc::clone(&active),
        ));

        Self {
            task_tx,
            active,
            concurrency,
        }
    }

    /// Queue a first attempt for `document_id`.
    pub async fn dispatch(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.task_tx
            .send(PipelineTask::first(document_id))
            .await
            .map_err(|_| PipelineError::QueueClosed)
    }

    /// Runs currently executing.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Free queue slots.
    pub fn queue_capacity(&self) -> usize {
        self.task_tx.capacity()
    }
}

async fn dispatch_loop(
    pipeline: Arc<Pipeline>,
    mut task_rx: mpsc::Receiver<PipelineTask>,
    retry_tx: mpsc::WeakSender<PipelineTask>,
    semaphore: Arc<Semaphore>,
    config: WorkerConfig,
    active: Arc<AtomicUsize>,
) {
    while let Some(task) = task_rx.recv().await {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        active.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(supervise(
            Arc::clone(&pipeline),
            task,
            permit,
            retry_tx.clone(),
            config.clone(),
            Arc::clone(&active),
        ));
    }
    info!("pipeline worker shutting down (queue closed)");
}

async fn supervise(
    pipeline: Arc<Pipeline>,
    task: PipelineTask,
    permit: OwnedSemaphorePermit,
    retry_tx: mpsc::WeakSender<PipelineTask>,
    config: WorkerConfig,
    active: Arc<AtomicUsize>,
) {
    let run_pipeline = Arc::clone(&pipeline);
    let document_id = task.document_id.clone();
    let handle = tokio::spawn(async move { run_pipeline.run(&document_id).await });
    let outcome = handle.await;

    drop(permit);
    active.fetch_sub(1, Ordering::Relaxed);

    let err = match outcome {
        Ok(Ok(report)) => {
            debug!(
                document_id = %task.document_id,
                attempt = task.attempt,
                completion = ?report.completion,
                "supervised run finished"
            );
            return;
        }
        Ok(Err(err)) => err,
        Err(join_err) => {
            error!(
                document_id = %task.document_id,
                attempt = task.attempt,
                error = %join_err,
                "pipeline run panicked"
            );
            record_panic(&pipeline, &task.document_id).await;
            return;
        }
    };

    match err {
        PipelineError::AlreadyRunning(submission_id) => {
            info!(%submission_id, "duplicate dispatch dropped, run already in flight");
        }
        err if err.is_retryable() && task.attempt < config.max_attempts => {
            warn!(
                document_id = %task.document_id,
                attempt = task.attempt,
                max_attempts = config.max_attempts,
                error = %err,
                "retryable failure, re-queueing"
            );
            schedule_retry(&pipeline, task, retry_tx, config.retry_backoff).await;
        }
        err => {
            error!(
                document_id = %task.document_id,
                attempt = task.attempt,
                kind = %err.kind(),
                error = %err,
                "pipeline run failed permanently"
            );
        }
    }
}

/// Mark a panicked run failed unless it already reached a terminal status.
async fn record_panic(pipeline: &Pipeline, document_id: &DocumentId) {
    let store = pipeline.store();
    match store.load_submission(document_id).await {
        Ok(submission) if submission.status != SubmissionStatus::Running => {}
        Ok(_) => {
            let status = SubmissionStatus::Failed(ErrorKind::Internal);
            if let Err(e) = store.set_status(document_id, status).await {
                error!(document_id = %document_id, error = %e, "failed to record panicked run");
            }
        }
        Err(e) => error!(document_id = %document_id, error = %e, "failed to load panicked run"),
    }
}

async fn schedule_retry(
    pipeline: &Pipeline,
    task: PipelineTask,
    retry_tx: mpsc::WeakSender<PipelineTask>,
    backoff: Duration,
) {
    // retry_count counts re-admitted runs, so it equals the failed attempt number
    if let Err(e) = pipeline
        .store()
        .record_retry(&task.document_id, task.attempt)
        .await
    {
        error!(document_id = %task.document_id, error = %e, "failed to record retry");
    }

    tokio::time::sleep(backoff).await;

    let next = PipelineTask {
        document_id: task.document_id,
        attempt: task.attempt + 1,
    };
    match retry_tx.upgrade() {
        Some(tx) => {
            if tx.send(next).await.is_err() {
                warn!("retry dropped, worker queue closed");
            }
        }
        None => warn!("retry dropped, worker shut down"),
    }
}

/// Periodically retry undelivered notifications.
pub fn spawn_redelivery_task(
    pipeline: Arc<Pipeline>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = pipeline.redeliver_pending().await {
                warn!(error = %e, "redelivery sweep failed");
            }
        }
    })
}

/// Run `recover_pending_runs` in the background.
///
/// `dispatch` waits for queue space, so a backlog larger than the queue
/// would otherwise hold up whatever awaits the sweep.
pub fn spawn_recovery_task(
    pipeline: Arc<Pipeline>,
    worker: Arc<PipelineWorker>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = recover_pending_runs(&pipeline, &worker).await {
            warn!(error = %e, "recovery sweep failed");
        }
    })
}

/// Re-dispatch submissions a previous process left `pending` or `running`.
pub async fn recover_pending_runs(
    pipeline: &Pipeline,
    worker: &PipelineWorker,
) -> Result<usize, PipelineError> {
    let unfinished = pipeline.store().unfinished_runs().await?;
    let count = unfinished.len();
    for submission in unfinished {
        worker.dispatch(submission.document_id).await?;
    }
    if count > 0 {
        info!(count, "re-dispatched unfinished pipeline runs");
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        CompletionRequest, CompletionResponse, Generator, GeneratorConfig, LlmBackend, LlmError,
        MockBackend, MockReply,
    };
    use async_trait::async_trait;
    use crate::notifier::LogNotifier;
    use crate::pipeline::PipelineConfig;
    use crate::store::{MemoryStore, SubmissionStore};
    use crate::survey::{QuestionCatalog, SubmissionForm, SubmissionStatus};

    struct PanickingBackend;

    #[async_trait]
    impl LlmBackend for PanickingBackend {
        fn id(&self) -> &str {
            "panicking"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn complete(&self, _: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            panic!("backend blew up");
        }
    }

    fn pipeline(backend: Arc<dyn LlmBackend>, store: Arc<MemoryStore>) -> Arc<Pipeline> {
        let catalog = QuestionCatalog::from_texts(["Email", "Rating?"]).unwrap();
        Arc::new(Pipeline::new(
            Arc::new(catalog),
            store,
            Arc::new(LogNotifier),
            Generator::new(backend.clone(), GeneratorConfig::stage()),
            Generator::new(backend, GeneratorConfig::synthesis()),
            PipelineConfig {
                sentiment_enabled: false,
                ..Default::default()
            },
        ))
    }

    fn form(submission_id: &str) -> SubmissionForm {
        SubmissionForm {
            form_id: "f".into(),
            submission_id: submission_id.into(),
            webhook_url: "https://example.test".into(),
            pretty: "Email: a@b.com, Rating?: Easy".into(),
        }
    }

    async fn wait_for_status(
        store: &MemoryStore,
        id: &DocumentId,
        want: SubmissionStatus,
    ) -> bool {
        for _ in 0..200 {
            if store.load_submission(id).await.map(|s| s.status).ok() == Some(want) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn test_run_guard_is_exclusive_until_drop() {
        let guard = RunGuard::new();
        let claim = guard.try_claim("s1").unwrap();
        assert_eq!(claim.submission_id(), "s1");
        assert!(guard.try_claim("s1").is_none());
        assert!(guard.try_claim("s2").is_some());
        assert!(guard.is_running("s1"));

        drop(claim);
        assert!(!guard.is_running("s1"));
        assert!(guard.try_claim("s1").is_some());
    }

    #[tokio::test]
    async fn test_dispatched_run_completes() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MockBackend::default().with_response("text"));
        let pipeline = pipeline(backend, store.clone());
        let worker = PipelineWorker::start(pipeline.clone(), WorkerConfig::default());

        let submission = pipeline.ingest(&form("s1")).await.unwrap();
        worker.dispatch(submission.document_id.clone()).await.unwrap();

        assert!(wait_for_status(&store, &submission.document_id, SubmissionStatus::Completed).await);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried_until_max_attempts() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MockBackend::default().with_available(false));
        let pipeline = pipeline(backend.clone(), store.clone());
        let worker = PipelineWorker::start(
            pipeline.clone(),
            WorkerConfig {
                max_attempts: 2,
                retry_backoff: Duration::from_millis(10),
                ..Default::default()
            },
        );

        let submission = pipeline.ingest(&form("s1")).await.unwrap();
        worker.dispatch(submission.document_id.clone()).await.unwrap();

        for _ in 0..200 {
            if backend.call_count() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(
            wait_for_status(
                &store,
                &submission.document_id,
                SubmissionStatus::Failed(ErrorKind::Generation)
            )
            .await
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Acknowledge fails once per attempt; nothing runs after the second
        assert_eq!(backend.call_count(), 2);
        let reloaded = store.load_submission(&submission.document_id).await.unwrap();
        assert_eq!(reloaded.retry_count, 1);
    }

    #[tokio::test]
    async fn test_panicked_run_is_marked_failed() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(Arc::new(PanickingBackend), store.clone());
        let worker = PipelineWorker::start(pipeline.clone(), WorkerConfig::default());

        let submission = pipeline.ingest(&form("s1")).await.unwrap();
        worker.dispatch(submission.document_id.clone()).await.unwrap();

        assert!(
            wait_for_status(
                &store,
                &submission.document_id,
                SubmissionStatus::Failed(ErrorKind::Internal)
            )
            .await
        );
        let reloaded = store.load_submission(&submission.document_id).await.unwrap();
        assert_eq!(reloaded.retry_count, 0);
        assert!(!pipeline.run_guard().is_running("s1"));
    }

    #[tokio::test]
    async fn test_recover_pending_runs_dispatches_unfinished() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MockBackend::default().with_response("text"));
        let pipeline = pipeline(backend, store.clone());

        let first = pipeline.ingest(&form("s1")).await.unwrap();
        let second = pipeline.ingest(&form("s2")).await.unwrap();
        store
            .set_status(&second.document_id, SubmissionStatus::Running)
            .await
            .unwrap();

        let worker = PipelineWorker::start(pipeline.clone(), WorkerConfig::default());
        let count = recover_pending_runs(&pipeline, &worker).await.unwrap();
        assert_eq!(count, 2);

        assert!(wait_for_status(&store, &first.document_id, SubmissionStatus::Completed).await);
        assert!(wait_for_status(&store, &second.document_id, SubmissionStatus::Completed).await);
    }

    #[tokio::test]
    async fn test_recovery_task_drains_backlog_larger_than_queue() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(
            MockBackend::default()
                .on("", MockReply::Delayed(Duration::from_millis(5), "text".into())),
        );
        let pipeline = pipeline(backend, store.clone());

        let mut ids = Vec::new();
        for i in 0..4 {
            let submission = pipeline.ingest(&form(&format!("s{i}"))).await.unwrap();
            ids.push(submission.document_id);
        }

        let worker = Arc::new(PipelineWorker::start(
            pipeline.clone(),
            WorkerConfig {
                concurrency: 1,
                queue_size: 1,
                ..Default::default()
            },
        ));
        let handle = spawn_recovery_task(pipeline.clone(), worker);

        for id in &ids {
            assert!(wait_for_status(&store, id, SubmissionStatus::Completed).await);
        }
        handle.await.unwrap();
    }
}
