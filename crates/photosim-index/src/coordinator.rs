//! Indexing coordinator. Runs one sequential, cancellable job at a time.
//!
//! Each photo goes through preprocess → embed → upsert before the next one
//! starts. A photo that fails to preprocess or embed is logged and skipped;
//! a storage failure aborts the rest of the job. The job loop runs on the
//! tokio blocking pool and reports progress over an unbounded channel that
//! closes when the job ends.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationToken;
use crate::types::*;
use photosim_core::{Error, Result};
use photosim_infer::{EmbedderBackend, ImagePreprocessor};
use photosim_store::SqliteStore;

/// Result of a `start` request.
pub enum StartOutcome {
    Started(JobHandle),
    /// Another job is running; nothing was queued or changed.
    AlreadyRunning,
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

/// Caller's side of a running job.
pub struct JobHandle {
    /// Progress notifications; the channel closes when the job ends.
    pub progress: mpsc::UnboundedReceiver<Progress>,
    token: CancellationToken,
    task: JoinHandle<Result<JobReport>>,
}

impl JobHandle {
    /// Token of this job; cancelling it stops the job at the next photo boundary.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the job to end.
    pub async fn wait(self) -> Result<JobReport> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Indexing task failed: {}", e)))?
    }
}

/// Mutable job slot guarded by the coordinator.
struct JobState {
    phase: JobPhase,
    total: usize,
    completed: usize,
    skipped: usize,
    token: Option<CancellationToken>,
    last_report: Option<JobReport>,
}

impl JobState {
    fn idle() -> Self {
        Self {
            phase: JobPhase::Idle,
            total: 0,
            completed: 0,
            skipped: 0,
            token: None,
            last_report: None,
        }
    }
}

/// Drives indexing jobs against a shared store.
pub struct IndexingCoordinator {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn EmbedderBackend>,
    preprocessor: Arc<dyn ImagePreprocessor>,
    state: Arc<Mutex<JobState>>,
}

impl IndexingCoordinator {
    pub fn new(
        store: Arc<SqliteStore>,
        embedder: Arc<dyn EmbedderBackend>,
        preprocessor: Arc<dyn ImagePreprocessor>,
    ) -> Self {
        Self {
            store,
            embedder,
            preprocessor,
            state: Arc::new(Mutex::new(JobState::idle())),
        }
    }

    /// Start indexing `candidates` in order with a fresh cancellation token.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, candidates: Vec<PhotoRef>) -> Result<StartOutcome> {
        self.start_with_token(candidates, CancellationToken::new())
    }

    /// Start indexing with a caller-supplied token (e.g. wired to Ctrl-C).
    pub fn start_with_token(
        &self,
        candidates: Vec<PhotoRef>,
        token: CancellationToken,
    ) -> Result<StartOutcome> {
        if let Some(pos) = candidates.iter().position(|c| c.id.is_empty()) {
            return Err(Error::InvalidInput(format!(
                "candidate {} ({}) has no id",
                pos, candidates[pos].location
            )));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("Indexing requires a tokio runtime: {}", e)))?;

        let total = candidates.len();
        {
            let mut state = self.state.lock();
            if state.phase == JobPhase::Running {
                info!(
                    "Indexing already running ({}/{}), ignoring new request for {} photos",
                    state.completed, state.total, total
                );
                return Ok(StartOutcome::AlreadyRunning);
            }
            token.reset();
            state.phase = JobPhase::Running;
            state.total = total;
            state.completed = 0;
            state.skipped = 0;
            state.token = Some(token.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let runner = JobRunner {
            store: self.store.clone(),
            embedder: self.embedder.clone(),
            preprocessor: self.preprocessor.clone(),
            state: self.state.clone(),
            token: token.clone(),
            tx,
            total,
        };

        info!("Indexing job started: {} photos", total);
        let task = runtime.spawn_blocking(move || runner.run(candidates));

        Ok(StartOutcome::Started(JobHandle {
            progress: rx,
            token,
            task,
        }))
    }

    /// Ask the running job to stop at its next photo boundary.
    /// Returns false if no job is running.
    pub fn request_cancel(&self) -> bool {
        let state = self.state.lock();
        match (&state.phase, &state.token) {
            (JobPhase::Running, Some(token)) => {
                info!(
                    "Cancellation requested at {}/{}",
                    state.completed, state.total
                );
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().phase == JobPhase::Running
    }

    /// Snapshot of the current job slot.
    pub fn status(&self) -> JobStatus {
        let state = self.state.lock();
        JobStatus {
            phase: state.phase,
            total: state.total,
            completed: state.completed,
            skipped: state.skipped,
            cancel_requested: state.token.as_ref().is_some_and(|t| t.is_cancelled()),
        }
    }

    /// Report of the most recently finished job.
    pub fn last_report(&self) -> Option<JobReport> {
        self.state.lock().last_report.clone()
    }
}

/// Owns everything a job needs on the blocking pool.
struct JobRunner {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn EmbedderBackend>,
    preprocessor: Arc<dyn ImagePreprocessor>,
    state: Arc<Mutex<JobState>>,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<Progress>,
    total: usize,
}

impl JobRunner {
    fn run(self, candidates: Vec<PhotoRef>) -> Result<JobReport> {
        let _reset = ResetOnUnwind(self.state.clone());

        let outcome = self.drain(&candidates);
        let cancelled = matches!(outcome, Ok(true));
        let report = self.finish(cancelled);

        match outcome {
            Ok(_) => {
                info!(
                    "Indexing job finished: {}/{} indexed, {} skipped{}",
                    report.completed,
                    report.total,
                    report.skipped,
                    if report.cancelled { " (cancelled)" } else { "" }
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    "Indexing job aborted after {}/{}: {}",
                    report.completed, report.total, e
                );
                Err(e)
            }
        }
    }

    /// Process candidates in order. Returns whether the job was cancelled.
    fn drain(&self, candidates: &[PhotoRef]) -> Result<bool> {
        for photo in candidates {
            if self.token.is_cancelled() {
                return Ok(true);
            }

            match self.index_one(photo) {
                Ok(()) => {
                    let completed = {
                        let mut state = self.state.lock();
                        state.completed += 1;
                        state.completed
                    };
                    let _ = self.tx.send(Progress {
                        completed,
                        total: self.total,
                        finished: false,
                    });
                }
                Err(e) if e.is_storage() => return Err(e),
                Err(e) => {
                    warn!("Indexing failed for {} ({}): {}", photo.id, photo.location, e);
                    self.state.lock().skipped += 1;
                }
            }

            if self.token.is_cancelled() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn index_one(&self, photo: &PhotoRef) -> Result<()> {
        let image = self.preprocessor.prepare(&photo.location)?;
        let embedding = self.embedder.embed(&image)?;
        self.store.upsert(&photo.id, &photo.location, &embedding)?;
        debug!("Indexed {} → {}", photo.id, photo.location);
        Ok(())
    }

    /// Record the report, return the slot to Idle and emit the final notification.
    fn finish(&self, cancelled: bool) -> JobReport {
        let report = {
            let mut state = self.state.lock();
            let report = JobReport {
                phase: JobPhase::Completed,
                total: state.total,
                completed: state.completed,
                skipped: state.skipped,
                cancelled,
            };
            // Before the slot reopens: the next job may reuse this token.
            self.token.reset();
            state.phase = JobPhase::Idle;
            state.total = 0;
            state.completed = 0;
            state.skipped = 0;
            state.token = None;
            state.last_report = Some(report.clone());
            report
        };

        let _ = self.tx.send(Progress {
            completed: report.completed,
            total: report.total,
            finished: true,
        });
        report
    }
}

/// Restores Idle if a backend panics mid-job.
struct ResetOnUnwind(Arc<Mutex<JobState>>);

impl Drop for ResetOnUnwind {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.0.lock();
            state.phase = JobPhase::Idle;
            state.token = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use photosim_infer::PreparedImage;
    use std::sync::mpsc as std_mpsc;
    use tempfile::TempDir;

    type Hook = Box<dyn Fn(&str) + Send + Sync>;

    /// Maps "pN" to a 1x1 image whose red channel is N; runs an optional hook first.
    struct FakePreprocessor {
        hook: Option<Hook>,
    }

    impl FakePreprocessor {
        fn plain() -> Self {
            Self { hook: None }
        }

        fn with_hook(hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
            Self {
                hook: Some(Box::new(hook)),
            }
        }
    }

    impl ImagePreprocessor for FakePreprocessor {
        fn prepare(&self, location: &str) -> Result<PreparedImage> {
            if let Some(hook) = &self.hook {
                hook(location);
            }
            let n: u8 = location
                .trim_start_matches('p')
                .parse()
                .map_err(|_| Error::Embedding(format!("bad location {}", location)))?;
            PreparedImage::new(1, 1, vec![n, 0, 0])
        }
    }

    /// Embeds pN as [N, 1]; fails for the listed photo numbers.
    struct FakeEmbedder {
        fail_on: Vec<u8>,
    }

    impl EmbedderBackend for FakeEmbedder {
        fn embed(&self, image: &PreparedImage) -> Result<Array1<f32>> {
            let n = image.rgb[0];
            if self.fail_on.contains(&n) {
                return Err(Error::Embedding(format!("inference failed for p{}", n)));
            }
            Ok(array![n as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "fake"
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn candidates(n: u8) -> Vec<PhotoRef> {
        (1..=n)
            .map(|i| PhotoRef::new(format!("id{}", i), format!("p{}", i)))
            .collect()
    }

    fn setup(
        preprocessor: FakePreprocessor,
        fail_on: Vec<u8>,
    ) -> (IndexingCoordinator, Arc<SqliteStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path(), "fake").unwrap());
        let coordinator = IndexingCoordinator::new(
            store.clone(),
            Arc::new(FakeEmbedder { fail_on }),
            Arc::new(preprocessor),
        );
        (coordinator, store, dir)
    }

    async fn run_to_end(outcome: StartOutcome) -> (Vec<Progress>, Result<JobReport>) {
        let mut handle = match outcome {
            StartOutcome::Started(h) => h,
            StartOutcome::AlreadyRunning => panic!("job did not start"),
        };
        let mut seen = Vec::new();
        while let Some(p) = handle.progress.recv().await {
            seen.push(p);
        }
        (seen, handle.wait().await)
    }

    fn sorted_ids(store: &SqliteStore) -> Vec<String> {
        let mut ids: Vec<String> = store.get_indexed_ids().unwrap().into_iter().collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_indexes_all_in_order() {
        let (coordinator, store, _dir) = setup(FakePreprocessor::plain(), vec![]);

        let (progress, report) = run_to_end(coordinator.start(candidates(3)).unwrap()).await;
        let report = report.unwrap();

        assert_eq!(report.completed, 3);
        assert_eq!(report.total, 3);
        assert_eq!(report.phase, JobPhase::Completed);
        assert!(report.all_succeeded() && !report.cancelled);

        let counts: Vec<usize> = progress.iter().map(|p| p.completed).collect();
        assert_eq!(counts, vec![1, 2, 3, 3]);
        assert!(progress.last().unwrap().finished);
        assert!(progress[..3].iter().all(|p| !p.finished && p.total == 3));

        assert_eq!(sorted_ids(&store), vec!["id1", "id2", "id3"]);
        assert_eq!(store.get("id2").unwrap().unwrap().embedding, array![2.0, 1.0]);
        assert_eq!(coordinator.status().phase, JobPhase::Idle);
        assert_eq!(coordinator.last_report(), Some(report));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_processed_prefix() {
        let token = CancellationToken::new();
        let hook_token = token.clone();
        // Requested while p2 is mid-flight; honoured once p2 is stored.
        let preprocessor = FakePreprocessor::with_hook(move |loc| {
            if loc == "p2" {
                hook_token.cancel();
            }
        });
        let (coordinator, store, _dir) = setup(preprocessor, vec![]);

        let outcome = coordinator
            .start_with_token(candidates(5), token.clone())
            .unwrap();
        let (progress, report) = run_to_end(outcome).await;
        let report = report.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.phase, JobPhase::Completed);
        assert_eq!((report.completed, report.total), (2, 5));
        assert_eq!(sorted_ids(&store), vec!["id1", "id2"]);

        let last = progress.last().unwrap();
        assert!(last.finished);
        assert_eq!((last.completed, last.total), (2, 5));

        let status = coordinator.status();
        assert_eq!(status.phase, JobPhase::Idle);
        assert!(!status.cancel_requested);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_reused_token_keeps_new_cancellation() {
        let token = CancellationToken::new();
        let hook_token = token.clone();
        let (entered_tx, entered_rx) = std_mpsc::channel::<()>();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let entered_tx = std::sync::Mutex::new(entered_tx);
        let release_rx = std::sync::Mutex::new(release_rx);
        let preprocessor = FakePreprocessor::with_hook(move |loc| match loc {
            "p1" => hook_token.cancel(),
            "p4" => {
                let _ = entered_tx.lock().unwrap().send(());
                let _ = release_rx.lock().unwrap().recv();
            }
            _ => {}
        });
        let (coordinator, store, _dir) = setup(preprocessor, vec![]);

        let first = match coordinator
            .start_with_token(candidates(3), token.clone())
            .unwrap()
        {
            StartOutcome::Started(h) => h,
            StartOutcome::AlreadyRunning => panic!("job did not start"),
        };
        while coordinator.is_running() {
            tokio::task::yield_now().await;
        }
        // Once the slot is idle the old cancellation is already cleared.
        assert!(!token.is_cancelled());
        assert!(first.wait().await.unwrap().cancelled);

        let second_batch = (4..=6)
            .map(|i| PhotoRef::new(format!("id{}", i), format!("p{}", i)))
            .collect();
        let outcome = coordinator
            .start_with_token(second_batch, token.clone())
            .unwrap();
        entered_rx.recv().unwrap();
        token.cancel();
        release_tx.send(()).unwrap();

        let (_, report) = run_to_end(outcome).await;
        let report = report.unwrap();
        assert!(report.cancelled);
        assert_eq!((report.completed, report.total), (1, 3));
        assert_eq!(sorted_ids(&store), vec!["id1", "id4"]);
    }

    #[tokio::test]
    async fn test_failed_item_is_skipped() {
        let (coordinator, store, _dir) = setup(FakePreprocessor::plain(), vec![3]);

        let (progress, report) = run_to_end(coordinator.start(candidates(5)).unwrap()).await;
        let report = report.unwrap();

        assert_eq!(report.completed, 4);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total, 5);
        assert!(!report.all_succeeded());
        assert_eq!(sorted_ids(&store), vec!["id1", "id2", "id4", "id5"]);

        let counts: Vec<usize> = progress.iter().map(|p| p.completed).collect();
        assert!(counts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*counts.last().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_preprocess_failure_is_skipped() {
        let (coordinator, store, _dir) = setup(FakePreprocessor::plain(), vec![]);
        let photos = vec![
            PhotoRef::new("a", "p1"),
            PhotoRef::new("b", "missing.jpg"),
            PhotoRef::new("c", "p3"),
        ];

        let (_, report) = run_to_end(coordinator.start(photos).unwrap()).await;
        let report = report.unwrap();
        assert_eq!((report.completed, report.skipped), (2, 1));
        assert_eq!(sorted_ids(&store), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_running() {
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let preprocessor = FakePreprocessor::with_hook(move |loc| {
            if loc == "p1" {
                let _ = release_rx.lock().unwrap().recv();
            }
        });
        let (coordinator, store, _dir) = setup(preprocessor, vec![]);

        let first = coordinator.start(candidates(3)).unwrap();
        assert!(first.is_started());
        assert!(coordinator.is_running());

        let second = coordinator.start(candidates(5)).unwrap();
        assert!(matches!(second, StartOutcome::AlreadyRunning));

        let status = coordinator.status();
        assert_eq!(status.phase, JobPhase::Running);
        assert_eq!(status.total, 3);
        assert_eq!(status.completed, 0);

        release_tx.send(()).unwrap();
        let (_, report) = run_to_end(first).await;
        assert_eq!(report.unwrap().completed, 3);
        assert_eq!(store.count().unwrap(), 3);

        // Slot is free again
        let (_, again) = run_to_end(coordinator.start(candidates(1)).unwrap()).await;
        assert_eq!(again.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_request_cancel_through_coordinator() {
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let preprocessor = FakePreprocessor::with_hook(move |loc| {
            if loc == "p1" {
                let _ = release_rx.lock().unwrap().recv();
            }
        });
        let (coordinator, store, _dir) = setup(preprocessor, vec![]);
        assert!(!coordinator.request_cancel());

        let outcome = coordinator.start(candidates(4)).unwrap();
        assert!(coordinator.request_cancel());
        assert!(coordinator.status().cancel_requested);
        release_tx.send(()).unwrap();

        let (_, report) = run_to_end(outcome).await;
        let report = report.unwrap();
        assert!(report.cancelled);
        // The request landed before p1 or while it was in flight
        assert!(report.completed <= 1);
        assert_eq!(store.count().unwrap() as usize, report.completed);
    }

    #[tokio::test]
    async fn test_empty_id_rejected_before_work() {
        let (coordinator, store, _dir) = setup(FakePreprocessor::plain(), vec![]);
        let photos = vec![PhotoRef::new("a", "p1"), PhotoRef::new("", "p2")];

        assert!(matches!(
            coordinator.start(photos),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(coordinator.status().phase, JobPhase::Idle);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_candidate_list_completes() {
        let (coordinator, _store, _dir) = setup(FakePreprocessor::plain(), vec![]);

        let (progress, report) = run_to_end(coordinator.start(Vec::new()).unwrap()).await;
        let report = report.unwrap();
        assert_eq!((report.completed, report.total), (0, 0));
        assert_eq!(
            progress,
            vec![Progress {
                completed: 0,
                total: 0,
                finished: true
            }]
        );
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_job() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path(), "fake").unwrap());
        let db_path = store.db_path().to_path_buf();
        let preprocessor = FakePreprocessor::with_hook(move |loc| {
            if loc == "p2" {
                let conn = rusqlite::Connection::open(&db_path).unwrap();
                conn.execute_batch("DROP TABLE images;").unwrap();
            }
        });
        let coordinator = IndexingCoordinator::new(
            store.clone(),
            Arc::new(FakeEmbedder { fail_on: vec![] }),
            Arc::new(preprocessor),
        );

        let (progress, result) = run_to_end(coordinator.start(candidates(4)).unwrap()).await;

        assert!(matches!(result, Err(Error::Storage(_))));
        let last = progress.last().unwrap();
        assert!(last.finished);
        assert_eq!(last.completed, 1);
        assert_eq!(coordinator.status().phase, JobPhase::Idle);
        assert_eq!(coordinator.last_report().unwrap().completed, 1);
    }

    #[test]
    fn test_start_outside_runtime_fails_cleanly() {
        let (coordinator, _store, _dir) = setup(FakePreprocessor::plain(), vec![]);
        assert!(matches!(
            coordinator.start(candidates(1)),
            Err(Error::Internal(_))
        ));
        assert_eq!(coordinator.status().phase, JobPhase::Idle);
    }
}
