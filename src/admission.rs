//! Admission queue for job attempts
//!
//! Bounds how many jobs are past `Pending` at once. Waiters are admitted
//! by priority (Critical > High > Normal > Low), FIFO within a level.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::protocol::{JobId, JobPriority};

/// Entry in the waiting heap
#[derive(Debug, Clone, Eq, PartialEq)]
struct QueueEntry {
    id: JobId,
    priority: JobPriority,
    /// Sequence number for FIFO ordering within same priority
    sequence: u64,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first, then lower sequence (earlier) first
        match self.priority.cmp(&other.priority) {
            std::cmp::Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A held concurrency slot. Dropping it frees the slot.
pub struct SlotPermit {
    permit: Option<OwnedSemaphorePermit>,
    id: JobId,
    queue: Arc<AdmissionQueue>,
}

impl SlotPermit {
    pub fn job_id(&self) -> JobId {
        self.id
    }
}

impl std::fmt::Debug for SlotPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPermit").field("id", &self.id).finish()
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.queue.inner.lock().active.remove(&self.id);
        // The semaphore permit has to be back before anyone is woken
        drop(self.permit.take());
        self.queue.notify.notify_waiters();
    }
}

/// Removes a waiter whose `acquire` future was dropped before admission
struct WaitGuard<'a> {
    queue: &'a AdmissionQueue,
    id: JobId,
    armed: bool,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.remove_waiting(self.id);
            // The head of the line may have changed
            self.queue.notify.notify_waiters();
        }
    }
}

struct AdmissionInner {
    waiting: BinaryHeap<QueueEntry>,
    active: HashMap<JobId, JobPriority>,
    peak_active: usize,
}

/// Bounded, priority-ordered slot pool
pub struct AdmissionQueue {
    limit: usize,
    semaphore: Arc<Semaphore>,
    inner: Mutex<AdmissionInner>,
    sequence: AtomicU64,
    notify: Notify,
}

impl AdmissionQueue {
    /// Create a queue admitting at most `limit` jobs at once
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            inner: Mutex::new(AdmissionInner {
                waiting: BinaryHeap::new(),
                active: HashMap::new(),
                peak_active: 0,
            }),
            sequence: AtomicU64::new(0),
            notify: Notify::new(),
        })
    }

    /// Wait for a slot.
    ///
    /// Resolves once a slot is free and this job is at the head of the
    /// waiting line. Dropping the returned future gives up the place in
    /// line.
    pub async fn acquire(self: &Arc<Self>, id: JobId, priority: JobPriority) -> SlotPermit {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().waiting.push(QueueEntry {
            id,
            priority,
            sequence,
        });
        let mut guard = WaitGuard {
            queue: self,
            id,
            armed: true,
        };

        loop {
            // Register interest before checking so a release between the
            // check and the await is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(permit) = self.try_admit_head(id, priority) {
                guard.armed = false;
                // Another slot may still be free for the next in line
                self.notify.notify_waiters();
                return permit;
            }

            notified.await;
        }
    }

    fn try_admit_head(self: &Arc<Self>, id: JobId, priority: JobPriority) -> Option<SlotPermit> {
        let mut inner = self.inner.lock();
        if inner.waiting.peek().map(|e| e.id) != Some(id) {
            return None;
        }
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        inner.waiting.pop();
        inner.active.insert(id, priority);
        inner.peak_active = inner.peak_active.max(inner.active.len());
        Some(SlotPermit {
            permit: Some(permit),
            id,
            queue: Arc::clone(self),
        })
    }

    fn remove_waiting(&self, id: JobId) {
        let mut inner = self.inner.lock();
        inner.waiting.retain(|e| e.id != id);
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Jobs currently holding a slot
    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Jobs waiting for a slot
    pub fn waiting_count(&self) -> usize {
        self.inner.lock().waiting.len()
    }

    /// Highest number of simultaneously held slots so far
    pub fn peak_active(&self) -> usize {
        self.inner.lock().peak_active
    }

    /// Position in line for a waiting job (1-indexed, None if not waiting)
    pub fn queue_position(&self, id: JobId) -> Option<usize> {
        let inner = self.inner.lock();
        let mut sorted: Vec<_> = inner.waiting.iter().collect();
        sorted.sort_by(|a, b| b.cmp(a));
        sorted.iter().position(|e| e.id == id).map(|p| p + 1)
    }

    pub fn stats(&self) -> AdmissionStats {
        let inner = self.inner.lock();
        let mut waiting_by_priority = HashMap::new();
        for entry in inner.waiting.iter() {
            *waiting_by_priority.entry(entry.priority).or_insert(0) += 1;
        }
        AdmissionStats {
            limit: self.limit,
            active: inner.active.len(),
            waiting: inner.waiting.len(),
            peak_active: inner.peak_active,
            waiting_by_priority,
        }
    }
}

/// Snapshot of the admission queue
#[derive(Debug, Clone)]
pub struct AdmissionStats {
    pub limit: usize,
    pub active: usize,
    pub waiting: usize,
    pub peak_active: usize,
    pub waiting_by_priority: HashMap<JobPriority, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_queue_entry_ordering() {
        let normal_late = QueueEntry {
            id: JobId::new(),
            priority: JobPriority::Normal,
            sequence: 1,
        };
        let high = QueueEntry {
            id: JobId::new(),
            priority: JobPriority::High,
            sequence: 2,
        };
        let normal_early = QueueEntry {
            id: JobId::new(),
            priority: JobPriority::Normal,
            sequence: 0,
        };

        assert!(high > normal_late);
        assert!(normal_early > normal_late);
    }

    #[tokio::test]
    async fn test_admission_basic() {
        let queue = AdmissionQueue::new(2);

        let permit1 = queue.acquire(JobId::new(), JobPriority::Normal).await;
        let permit2 = queue.acquire(JobId::new(), JobPriority::Normal).await;
        assert_eq!(queue.active_count(), 2);
        assert_eq!(queue.peak_active(), 2);

        drop(permit1);
        drop(permit2);
        assert_eq!(queue.active_count(), 0);
        assert_eq!(queue.peak_active(), 2);
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let queue = AdmissionQueue::new(1);
        let id_low = JobId::new();
        let id_high = JobId::new();

        let first = queue.acquire(JobId::new(), JobPriority::Normal).await;

        let q = queue.clone();
        let low_handle = tokio::spawn(async move { q.acquire(id_low, JobPriority::Low).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let q = queue.clone();
        let high_handle = tokio::spawn(async move { q.acquire(id_high, JobPriority::High).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(queue.waiting_count(), 2);
        assert_eq!(queue.queue_position(id_high), Some(1));
        assert_eq!(queue.queue_position(id_low), Some(2));

        drop(first);

        let high_permit = tokio::time::timeout(Duration::from_millis(200), high_handle)
            .await
            .expect("timeout")
            .expect("join error");
        assert_eq!(high_permit.job_id(), id_high);
        assert_eq!(queue.waiting_count(), 1);

        drop(high_permit);

        let low_permit = tokio::time::timeout(Duration::from_millis(200), low_handle)
            .await
            .expect("timeout")
            .expect("join error");
        assert_eq!(low_permit.job_id(), id_low);
        assert_eq!(queue.waiting_count(), 0);
    }

    #[tokio::test]
    async fn test_fifo_within_priority() {
        let queue = AdmissionQueue::new(1);
        let holder = queue.acquire(JobId::new(), JobPriority::Normal).await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for i in 0..3 {
            let q = queue.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let _permit = q.acquire(JobId::new(), JobPriority::Normal).await;
                let _ = tx.send(i);
                tokio::time::sleep(Duration::from_millis(5)).await;
            });
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        drop(holder);
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(rx.recv().await.expect("admitted"));
        }
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_leaves_line() {
        let queue = AdmissionQueue::new(1);
        let holder = queue.acquire(JobId::new(), JobPriority::Normal).await;

        let abandoned = JobId::new();
        let result = tokio::time::timeout(
            Duration::from_millis(20),
            queue.acquire(abandoned, JobPriority::Critical),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(queue.waiting_count(), 0);
        assert_eq!(queue.queue_position(abandoned), None);

        let q = queue.clone();
        let next = tokio::spawn(async move { q.acquire(JobId::new(), JobPriority::Low).await });
        drop(holder);
        let permit = tokio::time::timeout(Duration::from_millis(200), next)
            .await
            .expect("timeout")
            .expect("join error");
        assert_eq!(queue.active_count(), 1);
        drop(permit);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_peak_never_exceeds_limit() {
        let queue = AdmissionQueue::new(3);
        let mut handles = Vec::new();
        for i in 0..24 {
            let q = queue.clone();
            let priority = match i % 3 {
                0 => JobPriority::Low,
                1 => JobPriority::Normal,
                _ => JobPriority::High,
            };
            handles.push(tokio::spawn(async move {
                let _permit = q.acquire(JobId::new(), priority).await;
                assert!(q.active_count() <= 3);
                tokio::time::sleep(Duration::from_millis(2)).await;
            }));
        }
        for handle in handles {
            handle.await.expect("task panicked");
        }
        assert!(queue.peak_active() <= 3);
        assert!(queue.peak_active() >= 1);
        let stats = queue.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.waiting, 0);
    }
}
