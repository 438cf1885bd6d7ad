//! Download Scheduler - Main coordinator
//!
//! The `DownloadScheduler` owns every job, a bounded admission queue, and
//! the event channel. Each attempt at a job runs as its own task:
//!
//! 1. wait for a slot (priority order, abandoned on cancellation)
//! 2. `Searching`: coalesced provider search, bounded by time and count
//! 3. rank candidates, pick the best, `Queued`
//! 4. `Downloading`: transfer with monotonic progress events
//! 5. verify size, reconcile the file on disk, `Completed`, persist
//!
//! Any failure on the way lands on the job as `Failed`; a panic inside an
//! attempt fails only that job. Exactly one `Finished` event is sent per
//! attempt, after its slot has been released.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::admission::AdmissionQueue;
use crate::coalesce::SingleFlight;
use crate::config::EngineConfig;
use crate::error::{EngineError, ProviderErrorKind, Result, StorageErrorKind};
use crate::job::{is_plain_file_name, DownloadJob, StateChange};
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::provider::{ProgressCallback, SearchFilters, SearchProvider};
use crate::ranking::{factors, RankingStrategy, Ranker, ScoredCandidate, ScoringWeights};
use crate::resolver::{LibraryResolver, ResolvedFile};
use crate::storage::{LibraryEntry, LibraryStore};
use crate::types::{
    Candidate, EnqueueOptions, JobEvent, JobId, JobPriority, JobState, SchedulerStats, TrackQuery,
};

/// How long `shutdown` waits for each attempt task to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Control block shared between a running attempt and the job map
struct AttemptCtl {
    attempt: u64,
    token: CancellationToken,
    /// State a user action ended the attempt with
    outcome: Mutex<Option<JobState>>,
}

impl AttemptCtl {
    fn stop(&self, outcome: JobState) {
        *self.outcome.lock() = Some(outcome);
        self.token.cancel();
    }
}

struct AttemptHandle {
    ctl: Arc<AttemptCtl>,
    task: JoinHandle<()>,
}

impl AttemptHandle {
    fn is_live(&self) -> bool {
        !self.ctl.token.is_cancelled()
    }
}

/// Internal representation of a managed job
struct ManagedJob {
    job: DownloadJob,
    /// Number of the most recent attempt
    attempt: u64,
    handle: Option<AttemptHandle>,
}

/// The download scheduler
pub struct DownloadScheduler {
    /// Weak self-reference for spawning attempt tasks from `&self` methods
    self_ref: Weak<Self>,

    config: EngineConfig,

    provider: Arc<dyn SearchProvider>,

    /// Library bookkeeping, if configured
    store: Option<Arc<dyn LibraryStore>>,

    jobs: RwLock<HashMap<JobId, ManagedJob>>,

    admission: Arc<AdmissionQueue>,

    /// In-flight searches keyed by track identity
    searches: SingleFlight<String, Result<Vec<Candidate>>>,

    ranker: Ranker,

    event_tx: broadcast::Sender<JobEvent>,

    /// Whether `start` is in effect
    running: AtomicBool,

    shutdown: CancellationToken,
}

impl DownloadScheduler {
    /// Obtain a strong `Arc<Self>` reference for spawning attempt tasks.
    fn arc(&self) -> Result<Arc<Self>> {
        self.self_ref.upgrade().ok_or(EngineError::Shutdown)
    }

    /// Create a scheduler without persistence
    pub fn new(config: EngineConfig, provider: Arc<dyn SearchProvider>) -> Result<Arc<Self>> {
        Self::build(config, provider, None)
    }

    /// Create a scheduler that records outcomes in `store`
    pub fn with_store(
        config: EngineConfig,
        provider: Arc<dyn SearchProvider>,
        store: Arc<dyn LibraryStore>,
    ) -> Result<Arc<Self>> {
        Self::build(config, provider, Some(store))
    }

    fn build(
        config: EngineConfig,
        provider: Arc<dyn SearchProvider>,
        store: Option<Arc<dyn LibraryStore>>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let admission = AdmissionQueue::new(config.max_concurrent_downloads);
        let ranker = Ranker::new(config.effective_weights());

        Ok(Arc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            config,
            provider,
            store,
            jobs: RwLock::new(HashMap::new()),
            admission,
            searches: SingleFlight::new(),
            ranker,
            event_tx,
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }))
    }

    /// Add a track. The job starts right away if the scheduler is running.
    pub fn enqueue(&self, track: TrackQuery, options: EnqueueOptions) -> Result<JobId> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::Shutdown);
        }
        if track.artist.trim().is_empty() && track.title.trim().is_empty() {
            return Err(EngineError::invalid_input(
                "track",
                "artist and title cannot both be empty",
            ));
        }
        if let Some(name) = options.filename.as_deref() {
            if !is_plain_file_name(name) {
                return Err(EngineError::invalid_input(
                    "filename",
                    format!("'{}' is not a plain file name", name),
                ));
            }
        }

        let save_dir = options
            .save_dir
            .unwrap_or_else(|| self.config.download_dir.clone());
        let job = DownloadJob::new(track, options.priority, save_dir).with_filename(options.filename);
        let id = job.id;

        debug!("Enqueued job {} for '{}'", id.short(), job.track.display_name());

        let mut jobs = self.jobs.write();
        jobs.insert(
            id,
            ManagedJob {
                job,
                attempt: 0,
                handle: None,
            },
        );
        let _ = self.event_tx.send(JobEvent::Added { id });

        if self.is_running() {
            let scheduler = self.arc()?;
            if let Some(managed) = jobs.get_mut(&id) {
                scheduler.spawn_attempt(managed);
            }
        }

        Ok(id)
    }

    /// Start draining pending jobs. Runs until `ctx` is cancelled, which
    /// cancels every unfinished job.
    pub fn start(&self, ctx: CancellationToken) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::Shutdown);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::InvalidState {
                action: "start",
                current_state: "running".to_string(),
            });
        }
        let scheduler = self.arc()?;

        let weak = self.self_ref.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = ctx.cancelled() => {
                    if let Some(scheduler) = weak.upgrade() {
                        info!("Scheduler context cancelled, stopping all jobs");
                        scheduler.running.store(false, Ordering::SeqCst);
                        scheduler.cancel_all();
                    }
                }
                _ = shutdown.cancelled() => {}
            }
        });

        let mut jobs = self.jobs.write();
        for managed in jobs.values_mut() {
            if managed.job.state == JobState::Pending
                && !managed.handle.as_ref().is_some_and(AttemptHandle::is_live)
            {
                scheduler.spawn_attempt(managed);
            }
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cancel every unfinished job. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut jobs = self.jobs.write();
        let mut cancelled = 0;
        for managed in jobs.values_mut() {
            if let Some(change) = managed.job.cancel() {
                self.emit_change(managed.job.id, change, None);
                if let Some(handle) = &managed.handle {
                    handle.ctl.stop(JobState::Cancelled);
                }
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Snapshot of a job
    pub fn get_job(&self, id: JobId) -> Option<DownloadJob> {
        self.jobs.read().get(&id).map(|m| m.job.clone())
    }

    /// All jobs, oldest first
    pub fn list(&self) -> Vec<DownloadJob> {
        let mut jobs: Vec<_> = self.jobs.read().values().map(|m| m.job.clone()).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Cancel a job. Returns false when the job was already terminal.
    pub fn cancel(&self, id: JobId) -> Result<bool> {
        self.user_transition(id, DownloadJob::cancel, |handle| {
            handle.ctl.stop(JobState::Cancelled)
        })
    }

    /// Pause a searching, queued or downloading job, aborting its attempt.
    /// Returns false when the job cannot be paused.
    pub fn pause(&self, id: JobId) -> Result<bool> {
        self.user_transition(id, DownloadJob::pause, |handle| {
            handle.ctl.stop(JobState::Paused)
        })
    }

    /// Move a paused job back to `Pending`
    pub fn resume(&self, id: JobId) -> Result<bool> {
        let resumed = self.user_transition(id, DownloadJob::resume, |_| {})?;
        if resumed {
            self.respawn(id)?;
        }
        Ok(resumed)
    }

    /// Start a fresh attempt for a failed or cancelled job
    pub fn hard_retry(&self, id: JobId) -> Result<bool> {
        let retried = self.user_transition(id, DownloadJob::hard_retry, |_| {})?;
        if retried {
            self.respawn(id)?;
        }
        Ok(retried)
    }

    /// Drop a job from the scheduler, cancelling it first if unfinished
    pub fn remove(&self, id: JobId) -> Result<DownloadJob> {
        let mut jobs = self.jobs.write();
        let mut managed = jobs
            .remove(&id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if let Some(change) = managed.job.cancel() {
            self.emit_change(id, change, None);
        }
        if let Some(handle) = &managed.handle {
            handle.ctl.stop(JobState::Cancelled);
        }
        let _ = self.event_tx.send(JobEvent::Removed { id });
        Ok(managed.job)
    }

    /// Place in line for a job waiting on a slot (1-indexed)
    pub fn queue_position(&self, id: JobId) -> Option<usize> {
        self.admission.queue_position(id)
    }

    pub fn stats(&self) -> SchedulerStats {
        let jobs = self.jobs.read();
        let mut stats = SchedulerStats::default();
        for managed in jobs.values() {
            match managed.job.state {
                JobState::Pending => stats.pending += 1,
                JobState::Searching => stats.searching += 1,
                JobState::Queued => stats.queued += 1,
                JobState::Downloading => {
                    stats.downloading += 1;
                    stats.download_speed += managed.job.speed;
                }
                JobState::Paused => stats.paused += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }
        stats.slots_in_use = self.admission.active_count();
        stats.slots_waiting = self.admission.waiting_count();
        stats
    }

    /// Highest number of attempts that held a slot at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.admission.peak_active()
    }

    /// Subscribe to job events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Switch to a weight preset. Affects rankings started after the call.
    pub fn set_strategy(&self, strategy: RankingStrategy) {
        info!("Ranking strategy set to {}", strategy);
        self.ranker.set_strategy(strategy);
    }

    /// Use custom weights. Affects rankings started after the call.
    pub fn set_weights(&self, weights: ScoringWeights) -> Result<()> {
        self.ranker.set_weights(weights)
    }

    pub fn weights(&self) -> ScoringWeights {
        self.ranker.weights()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Look up what the store knows about a track
    pub async fn library_entry(&self, track: &TrackQuery) -> Result<Option<LibraryEntry>> {
        match &self.store {
            Some(store) => store.find_by_identity(&track.identity_hash()).await,
            None => Ok(None),
        }
    }

    /// Search the local library for a file matching `track`
    pub async fn resolve_existing(&self, track: &TrackQuery) -> Result<Option<ResolvedFile>> {
        let resolver =
            LibraryResolver::from_config(self.config.library_root_or_default(), &self.config.library);
        let track = track.clone();
        tokio::task::spawn_blocking(move || resolver.resolve_track(&track)).await?
    }

    /// Graceful shutdown: cancel everything and wait for attempts to end
    pub async fn shutdown(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.cancel_all();
        self.shutdown.cancel();

        let tasks: Vec<_> = {
            let mut jobs = self.jobs.write();
            jobs.values_mut()
                .filter_map(|m| m.handle.take())
                .map(|h| h.task)
                .collect()
        };
        for task in tasks {
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, task).await;
        }
        Ok(())
    }

    fn user_transition<F, H>(&self, id: JobId, step: F, on_handle: H) -> Result<bool>
    where
        F: FnOnce(&mut DownloadJob) -> Option<StateChange>,
        H: FnOnce(&AttemptHandle),
    {
        let mut jobs = self.jobs.write();
        let managed = jobs
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let Some(change) = step(&mut managed.job) else {
            debug!(
                "Ignoring transition for job {} in state {}",
                id.short(),
                managed.job.state
            );
            return Ok(false);
        };
        self.emit_change(id, change, None);
        if let Some(handle) = &managed.handle {
            on_handle(handle);
        }
        Ok(true)
    }

    fn respawn(&self, id: JobId) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        let scheduler = self.arc()?;
        let mut jobs = self.jobs.write();
        if let Some(managed) = jobs.get_mut(&id) {
            if managed.job.state == JobState::Pending
                && !managed.handle.as_ref().is_some_and(AttemptHandle::is_live)
            {
                scheduler.spawn_attempt(managed);
            }
        }
        Ok(())
    }

    /// Start a new attempt task. Caller holds the job map lock.
    fn spawn_attempt(self: &Arc<Self>, managed: &mut ManagedJob) {
        managed.attempt += 1;
        let ctl = Arc::new(AttemptCtl {
            attempt: managed.attempt,
            token: self.shutdown.child_token(),
            outcome: Mutex::new(None),
        });

        let scheduler = Arc::clone(self);
        let id = managed.job.id;
        let priority = managed.job.priority;
        let task_ctl = Arc::clone(&ctl);
        let task = tokio::spawn(async move {
            scheduler.drive_attempt(id, priority, task_ctl).await;
        });

        managed.handle = Some(AttemptHandle { ctl, task });
    }

    async fn drive_attempt(self: Arc<Self>, id: JobId, priority: JobPriority, ctl: Arc<AttemptCtl>) {
        let result = AssertUnwindSafe(self.run_attempt(id, priority, Arc::clone(&ctl)))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(())) | Ok(Err(EngineError::Cancelled)) => {}
            Ok(Err(e)) => self.fail_attempt(id, &ctl, &e).await,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Attempt for job {} panicked: {}", id.short(), message);
                let err = EngineError::Internal(format!("attempt panicked: {}", message));
                self.fail_attempt(id, &ctl, &err).await;
            }
        }

        self.finish_attempt(id, &ctl);
    }

    async fn run_attempt(
        self: &Arc<Self>,
        id: JobId,
        priority: JobPriority,
        ctl: Arc<AttemptCtl>,
    ) -> Result<()> {
        let _permit = tokio::select! {
            permit = self.admission.acquire(id, priority) => permit,
            _ = ctl.token.cancelled() => return Err(EngineError::Cancelled),
        };

        let job = self.advance(id, &ctl, DownloadJob::begin_search)?;
        let track = job.track;

        let best = self.search_and_rank(&track, &ctl.token).await?;
        let candidate = best.candidate.clone();
        {
            let mut jobs = self.jobs.write();
            let managed = self.current(&mut jobs, id, &ctl)?;
            let change = managed
                .job
                .select_candidate(candidate.clone())
                .ok_or(EngineError::Cancelled)?;
            let _ = self.event_tx.send(JobEvent::CandidateSelected {
                id,
                filename: candidate.filename.clone(),
                peer: candidate.peer.clone(),
                score: best.score,
            });
            self.emit_change(id, change, None);
        }
        debug!(
            "Job {} selected '{}' from {} (score {:.3})",
            id.short(),
            candidate.filename,
            candidate.peer,
            best.score
        );

        let job = self.advance(id, &ctl, DownloadJob::start_transfer)?;
        let target = job.target_path()?;

        tokio::fs::create_dir_all(&job.save_dir)
            .await
            .map_err(|e| EngineError::storage(StorageErrorKind::Io, &job.save_dir, e.to_string()))?;

        let on_progress = self.progress_callback(id, &ctl);
        let written = tokio::select! {
            result = self.provider.transfer(&candidate, &target, on_progress) => result?,
            _ = ctl.token.cancelled() => {
                debug!("Aborting transfer for job {}", id.short());
                self.provider.cancel(&candidate).await;
                return Err(EngineError::Cancelled);
            }
        };

        if self.config.verify_size {
            if let Some(expected) = candidate.size {
                if expected != written {
                    return Err(EngineError::SizeMismatch {
                        expected,
                        actual: written,
                    });
                }
            }
        }

        let destination = self.reconcile(&job.save_dir, &target).await;

        let job = self.advance(id, &ctl, |job| job.complete(destination.clone()))?;
        info!(
            "Job {} completed: {}",
            id.short(),
            destination.display()
        );

        if let Some(store) = &self.store {
            let entry = LibraryEntry::downloaded(&job.track, destination);
            if let Err(e) = store.upsert(&entry).await {
                warn!("Failed to record job {} in library store: {}", id.short(), e);
            }
        }

        Ok(())
    }

    /// Search (coalesced per track identity) and return the best candidate
    async fn search_and_rank(
        &self,
        track: &TrackQuery,
        token: &CancellationToken,
    ) -> Result<ScoredCandidate> {
        let provider = Arc::clone(&self.provider);
        let query = track.clone();
        let filters = self.config.search.filters.clone();
        let timeout = self.config.search.timeout();
        let max_results = self.config.search.max_results;

        let search = self.searches.run(track.identity_hash(), move || async move {
            collect_candidates(provider, query, filters, timeout, max_results).await
        });
        let candidates = tokio::select! {
            result = search => result?,
            _ = token.cancelled() => return Err(EngineError::Cancelled),
        };

        let floor = self.config.min_string_similarity;
        let plausible: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| factors::string_similarity(track, c) >= floor)
            .collect();

        let min_score = self.config.min_candidate_score;
        self.ranker
            .rank(track, plausible)
            .into_iter()
            .find(|scored| scored.score >= min_score)
            .ok_or_else(|| EngineError::NoCandidates {
                query: track.display_name(),
            })
    }

    fn progress_callback(self: &Arc<Self>, id: JobId, ctl: &Arc<AttemptCtl>) -> ProgressCallback {
        let interval = Duration::from_millis(self.config.progress_interval_ms);
        let tracker = Mutex::new(ProgressTracker::new(interval));
        let scheduler = Arc::downgrade(self);
        let ctl = Arc::clone(ctl);
        Arc::new(move |bytes: u64, total: Option<u64>| {
            let update = tracker.lock().observe(bytes, total);
            if let (Some(update), Some(scheduler)) = (update, scheduler.upgrade()) {
                scheduler.record_progress(id, &ctl, update);
            }
        })
    }

    fn record_progress(&self, id: JobId, ctl: &AttemptCtl, update: ProgressUpdate) {
        let mut jobs = self.jobs.write();
        let Ok(managed) = self.current(&mut jobs, id, ctl) else {
            return;
        };
        let job = &mut managed.job;
        if job.record_progress(update.bytes_transferred, update.total_size, update.speed) {
            let _ = self.event_tx.send(JobEvent::Progress {
                id,
                fraction: job.progress,
                bytes_transferred: job.bytes_transferred,
                speed: job.speed,
            });
        }
    }

    /// Find the written file, falling back to the requested path
    async fn reconcile(&self, save_dir: &Path, target: &Path) -> PathBuf {
        let resolver = LibraryResolver::from_config(save_dir, &self.config.library);
        let expected = target.to_path_buf();
        let result = tokio::task::spawn_blocking(move || resolver.reconcile(&expected)).await;
        match result {
            Ok(Ok(Some(path))) => path,
            Ok(Ok(None)) => {
                warn!("Transferred file not found at {}", target.display());
                target.to_path_buf()
            }
            Ok(Err(e)) => {
                warn!("Could not reconcile {}: {}", target.display(), e);
                target.to_path_buf()
            }
            Err(e) => {
                warn!("Reconcile task failed for {}: {}", target.display(), e);
                target.to_path_buf()
            }
        }
    }

    async fn fail_attempt(&self, id: JobId, ctl: &AttemptCtl, err: &EngineError) {
        let message = err.to_string();
        let track = {
            let mut jobs = self.jobs.write();
            let Ok(managed) = self.current(&mut jobs, id, ctl) else {
                return;
            };
            let Some(change) = managed.job.fail(message.clone()) else {
                return;
            };
            self.emit_change(id, change, Some(message.clone()));
            managed.job.track.clone()
        };

        warn!(
            "Job {} failed ({}, retryable: {}): {}",
            id.short(),
            err.kind_name(),
            err.is_retryable(),
            message
        );

        if let Some(store) = &self.store {
            if let Err(e) = store.upsert(&LibraryEntry::failed(&track, message)).await {
                warn!("Failed to record job {} in library store: {}", id.short(), e);
            }
        }
    }

    fn finish_attempt(&self, id: JobId, ctl: &AttemptCtl) {
        let current = {
            let mut jobs = self.jobs.write();
            jobs.get_mut(&id).map(|managed| {
                if managed.attempt == ctl.attempt {
                    managed.handle = None;
                }
                managed.job.state
            })
        };
        let state = ctl
            .outcome
            .lock()
            .take()
            .or(current)
            .unwrap_or(JobState::Cancelled);
        let _ = self.event_tx.send(JobEvent::Finished { id, state });
    }

    /// Apply a scheduler-driven step to the job if `ctl` is still its live
    /// attempt. Returns the updated job.
    fn advance<F>(&self, id: JobId, ctl: &AttemptCtl, step: F) -> Result<DownloadJob>
    where
        F: FnOnce(&mut DownloadJob) -> Option<StateChange>,
    {
        let mut jobs = self.jobs.write();
        let managed = self.current(&mut jobs, id, ctl)?;
        let change = step(&mut managed.job).ok_or(EngineError::Cancelled)?;
        self.emit_change(id, change, None);
        Ok(managed.job.clone())
    }

    fn current<'a>(
        &self,
        jobs: &'a mut HashMap<JobId, ManagedJob>,
        id: JobId,
        ctl: &AttemptCtl,
    ) -> Result<&'a mut ManagedJob> {
        match jobs.get_mut(&id) {
            Some(managed) if managed.attempt == ctl.attempt && !ctl.token.is_cancelled() => {
                Ok(managed)
            }
            _ => Err(EngineError::Cancelled),
        }
    }

    /// Caller holds the job map lock, so events follow state order
    fn emit_change(&self, id: JobId, change: StateChange, error: Option<String>) {
        debug!("Job {}: {} -> {}", id.short(), change.old, change.new);
        let _ = self.event_tx.send(JobEvent::StateChanged {
            id,
            old_state: change.old,
            new_state: change.new,
            error,
        });
    }
}

impl Drop for DownloadScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Drain a provider search into a vector, honoring the time budget, the
/// result cap and the filters
async fn collect_candidates(
    provider: Arc<dyn SearchProvider>,
    query: TrackQuery,
    filters: SearchFilters,
    timeout: Duration,
    max_results: usize,
) -> Result<Vec<Candidate>> {
    let deadline = tokio::time::Instant::now() + timeout;
    let timed_out = || {
        EngineError::provider(
            ProviderErrorKind::SearchTimeout,
            format!("search for '{}' timed out", query.display_name()),
        )
    };

    let mut stream = tokio::time::timeout_at(deadline, provider.search(&query, &filters))
        .await
        .map_err(|_| timed_out())??;

    let mut found = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(Ok(candidate))) => {
                if filters.accepts(&candidate) {
                    found.push(candidate);
                    if found.len() >= max_results {
                        break;
                    }
                }
            }
            Ok(Some(Err(e))) => {
                if found.is_empty() {
                    return Err(e);
                }
                warn!("Search stream for '{}' ended early: {}", query.display_name(), e);
                break;
            }
            Ok(None) => break,
            Err(_) => {
                if found.is_empty() {
                    return Err(timed_out());
                }
                debug!(
                    "Search for '{}' hit its time budget with {} results",
                    query.display_name(),
                    found.len()
                );
                break;
            }
        }
    }
    Ok(found)
}
