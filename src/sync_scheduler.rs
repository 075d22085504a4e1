// src/sync_scheduler.rs - Background sync of local changes to the backend
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use log::{debug, error, info, trace, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Duration, MissedTickBehavior};

use crate::{Category, Note, NoteBackend, NutsError, Result, SelectorId};

/// A change that has to reach the backend
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOp {
    SaveNote(Note),
    DeleteNote(String),
    RenameSelector { id: SelectorId, name: String },
    SaveCategory(Category),
    DeleteCategory(i64),
}

/// The entity an op writes to. Ops with the same key collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncKey {
    Note(String),
    Selector(SelectorId),
    Category(i64),
}

impl SyncOp {
    pub fn key(&self) -> SyncKey {
        match self {
            SyncOp::SaveNote(note) => SyncKey::Note(note.id.clone()),
            SyncOp::DeleteNote(id) => SyncKey::Note(id.clone()),
            SyncOp::RenameSelector { id, .. } => SyncKey::Selector(*id),
            SyncOp::SaveCategory(category) => SyncKey::Category(category.id),
            SyncOp::DeleteCategory(id) => SyncKey::Category(*id),
        }
    }

    fn apply(&self, backend: &dyn NoteBackend) -> Result<()> {
        match self {
            SyncOp::SaveNote(note) => backend.save_note(note),
            SyncOp::DeleteNote(id) => backend.delete_note(id),
            SyncOp::RenameSelector { id, name } => backend.save_selector_name(*id, name),
            SyncOp::SaveCategory(category) => backend.save_category(category),
            SyncOp::DeleteCategory(id) => backend.delete_category(*id),
        }
    }
}

#[derive(Debug)]
enum SyncCommand {
    /// Queue an op, replacing any pending op for the same entity
    Push(SyncOp),
    /// Apply everything pending now and report back
    FlushNow(oneshot::Sender<SyncReport>),
    /// Flush, then stop the worker
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    /// Whether the worker is running
    pub is_running: bool,
    /// When pending ops were last applied
    pub last_sync_time: Option<chrono::DateTime<Utc>>,
    /// Ops applied successfully since start
    pub synced: u64,
    /// Ops the backend rejected since start; they are not retried
    pub failed: u64,
    /// Ops waiting for the next flush
    pub pending: usize,
}

/// Outcome of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: usize,
    pub failed: usize,
}

/// Pending ops, one per entity, in first-queued order
#[derive(Default)]
struct SyncQueue {
    pending: HashMap<SyncKey, SyncOp>,
    order: Vec<SyncKey>,
}

impl SyncQueue {
    fn push(&mut self, op: SyncOp) {
        let key = op.key();
        if self.pending.insert(key.clone(), op).is_some() {
            trace!("Collapsed pending sync op for {:?}", key);
        } else {
            self.order.push(key);
        }
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn drain(&mut self) -> Vec<SyncOp> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .collect()
    }
}

fn lock_status(status: &Mutex<SyncStatus>) -> std::sync::MutexGuard<'_, SyncStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Applies everything queued. Backend calls run on the blocking pool.
async fn flush(
    queue: &mut SyncQueue,
    backend: &Arc<dyn NoteBackend>,
    status: &Mutex<SyncStatus>,
) -> SyncReport {
    let ops = queue.drain();
    let attempted = ops.len();
    let mut report = SyncReport::default();

    if attempted > 0 {
        let backend = Arc::clone(backend);
        let outcome = task::spawn_blocking(move || {
            ops.into_iter()
                .map(|op| (op.key(), op.apply(backend.as_ref())))
                .collect::<Vec<_>>()
        })
        .await;

        match outcome {
            Ok(results) => {
                for (key, result) in results {
                    match result {
                        Ok(()) => report.applied += 1,
                        Err(e) => {
                            error!("Sync of {:?} failed: {}", key, e);
                            report.failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Sync flush of {} ops panicked: {}", attempted, e);
                report.failed = attempted;
            }
        }
    }

    let mut status = lock_status(status);
    status.synced += report.applied as u64;
    status.failed += report.failed as u64;
    status.pending = queue.len();
    if attempted > 0 {
        status.last_sync_time = Some(Utc::now());
        debug!(
            "Sync flush applied {} ops, {} failed",
            report.applied, report.failed
        );
    }
    report
}

/// Cheap, cloneable sender the note store uses to queue changes.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    command_tx: mpsc::UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    /// Queues `op` without waiting. A stopped worker only produces a warning.
    pub fn enqueue(&self, op: SyncOp) {
        if let Err(e) = self.command_tx.send(SyncCommand::Push(op)) {
            warn!("Sync worker is not running, dropping {:?}", e.0);
        }
    }
}

pub struct SyncScheduler {
    /// Destination of all ops
    backend: Arc<dyn NoteBackend>,

    /// How often pending ops are flushed
    interval: Duration,

    /// Channel to send commands to the worker task
    command_tx: Option<mpsc::UnboundedSender<SyncCommand>>,

    /// Handle to the worker task
    worker_task: Option<JoinHandle<()>>,

    /// Shared with the worker task
    status: Arc<Mutex<SyncStatus>>,
}

impl SyncScheduler {
    /// Create a new scheduler; nothing runs until `start`
    pub fn new(backend: Arc<dyn NoteBackend>, interval: Duration) -> Self {
        info!("Initializing sync scheduler with interval {:?}", interval);
        Self {
            backend,
            interval: interval.max(Duration::from_millis(1)),
            command_tx: None,
            worker_task: None,
            status: Arc::new(Mutex::new(SyncStatus::default())),
        }
    }

    /// Starts the worker task and returns a handle for queuing ops.
    ///
    /// Must be called inside a tokio runtime. Starting twice returns a handle
    /// to the running worker.
    pub fn start(&mut self) -> SyncHandle {
        if let Some(handle) = self.handle() {
            debug!("Sync scheduler already running");
            return handle;
        }

        info!("Starting sync scheduler...");
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let backend = Arc::clone(&self.backend);
        let status = Arc::clone(&self.status);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut queue = SyncQueue::default();
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // Initial tick

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !queue.is_empty() {
                            flush(&mut queue, &backend, &status).await;
                        }
                    }
                    cmd = command_rx.recv() => match cmd {
                        Some(SyncCommand::Push(op)) => {
                            queue.push(op);
                            lock_status(&status).pending = queue.len();
                        }
                        Some(SyncCommand::FlushNow(reply)) => {
                            let report = flush(&mut queue, &backend, &status).await;
                            if reply.send(report).is_err() {
                                debug!("Flush requester went away before the report");
                            }
                        }
                        Some(SyncCommand::Stop) | None => {
                            info!("Sync scheduler stopping...");
                            flush(&mut queue, &backend, &status).await;
                            break;
                        }
                    }
                }
            }

            lock_status(&status).is_running = false;
        });

        lock_status(&self.status).is_running = true;
        self.worker_task = Some(task);
        self.command_tx = Some(command_tx.clone());

        SyncHandle { command_tx }
    }

    /// Handle to the running worker, if any
    pub fn handle(&self) -> Option<SyncHandle> {
        self.command_tx
            .as_ref()
            .filter(|_| self.worker_task.is_some())
            .map(|command_tx| SyncHandle {
                command_tx: command_tx.clone(),
            })
    }

    /// Applies every pending op now instead of waiting for the next tick
    pub async fn flush_now(&self) -> Result<SyncReport> {
        let command_tx = self.command_tx.as_ref().ok_or_else(|| NutsError::SyncFailed {
            message: "Sync scheduler is not running".to_string(),
        })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        command_tx
            .send(SyncCommand::FlushNow(reply_tx))
            .map_err(|e| NutsError::SyncFailed {
                message: format!("Failed to send flush command: {}", e),
            })?;

        reply_rx.await.map_err(|e| NutsError::SyncFailed {
            message: format!("Sync worker dropped the flush: {}", e),
        })
    }

    /// Flushes pending ops and stops the worker if it's running
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.worker_task.take() {
            if let Some(command_tx) = self.command_tx.take() {
                if let Err(e) = command_tx.send(SyncCommand::Stop) {
                    error!("Failed to send stop command to sync scheduler: {}", e);
                }
            }

            if let Err(e) = task.await {
                let error_msg = format!("Failed to stop sync scheduler: {}", e);
                error!("{}", error_msg);
                return Err(NutsError::SyncFailed { message: error_msg });
            }

            info!("Sync scheduler stopped");
        } else {
            debug!("Sync scheduler is not running");
        }

        Ok(())
    }

    /// Get the current status of the sync scheduler
    pub fn status(&self) -> SyncStatus {
        lock_status(&self.status).clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc as std_mpsc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::MemoryBackend;

    fn note(title: &str) -> Note {
        Note::new(title.into(), String::new(), vec![])
    }

    /// Rejects every write, counting attempts
    #[derive(Default)]
    struct BrokenBackend {
        attempts: AtomicUsize,
    }

    impl NoteBackend for BrokenBackend {
        fn load_notes(&self) -> Result<Vec<Note>> {
            Ok(Vec::new())
        }

        fn save_note(&self, _note: &Note) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NutsError::SyncFailed {
                message: "backend offline".into(),
            })
        }

        fn delete_note(&self, _note_id: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NutsError::SyncFailed {
                message: "backend offline".into(),
            })
        }

        fn load_selector_names(&self) -> Result<HashMap<SelectorId, String>> {
            Ok(HashMap::new())
        }

        fn save_selector_name(&self, _id: SelectorId, _name: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NutsError::SyncFailed {
                message: "backend offline".into(),
            })
        }

        fn load_categories(&self) -> Result<Vec<Category>> {
            Ok(Vec::new())
        }

        fn save_category(&self, _category: &Category) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NutsError::SyncFailed {
                message: "backend offline".into(),
            })
        }

        fn delete_category(&self, _id: i64) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NutsError::SyncFailed {
                message: "backend offline".into(),
            })
        }
    }

    /// Holds every note save until the test lets it through
    struct GatedBackend {
        inner: MemoryBackend,
        gate: Mutex<std_mpsc::Receiver<()>>,
    }

    impl NoteBackend for GatedBackend {
        fn load_notes(&self) -> Result<Vec<Note>> {
            self.inner.load_notes()
        }

        fn save_note(&self, note: &Note) -> Result<()> {
            let gate = self.gate.lock().unwrap();
            gate.recv_timeout(std::time::Duration::from_secs(5))
                .map_err(|e| NutsError::SyncFailed {
                    message: e.to_string(),
                })?;
            self.inner.save_note(note)
        }

        fn delete_note(&self, note_id: &str) -> Result<()> {
            self.inner.delete_note(note_id)
        }

        fn load_selector_names(&self) -> Result<HashMap<SelectorId, String>> {
            self.inner.load_selector_names()
        }

        fn save_selector_name(&self, id: SelectorId, name: &str) -> Result<()> {
            self.inner.save_selector_name(id, name)
        }

        fn load_categories(&self) -> Result<Vec<Category>> {
            self.inner.load_categories()
        }

        fn save_category(&self, category: &Category) -> Result<()> {
            self.inner.save_category(category)
        }

        fn delete_category(&self, id: i64) -> Result<()> {
            self.inner.delete_category(id)
        }
    }

    #[test]
    fn queue_keeps_last_write_per_entity() {
        let mut queue = SyncQueue::default();
        let mut a = note("a");
        let b = note("b");
        queue.push(SyncOp::SaveNote(a.clone()));
        queue.push(SyncOp::SaveNote(b.clone()));
        a.content = "edited".into();
        queue.push(SyncOp::SaveNote(a.clone()));
        queue.push(SyncOp::DeleteNote(b.id.clone()));

        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.drain(),
            vec![SyncOp::SaveNote(a), SyncOp::DeleteNote(b.id)]
        );
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn category_ops_collapse_per_category() {
        let mut queue = SyncQueue::default();
        let mut tree = crate::CategoryTree::new();
        let work = tree.create(crate::CategoryDraft::new("Work", "#112233")).unwrap();
        queue.push(SyncOp::SaveCategory(work.clone()));
        queue.push(SyncOp::DeleteCategory(work.id));
        queue.push(SyncOp::SaveNote(note("a")));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain()[0], SyncOp::DeleteCategory(work.id));
    }

    #[tokio::test]
    async fn slow_backend_does_not_block_the_runtime() {
        let (go_tx, go_rx) = std_mpsc::channel();
        let backend = Arc::new(GatedBackend {
            inner: MemoryBackend::new(),
            gate: Mutex::new(go_rx),
        });
        let mut scheduler = SyncScheduler::new(backend.clone(), Duration::from_secs(3600));
        let handle = scheduler.start();
        handle.enqueue(SyncOp::SaveNote(note("a")));

        let flushing = tokio::spawn(async move {
            let report = scheduler.flush_now().await;
            (scheduler, report)
        });

        // only runs while the save is pending if the save is off this thread
        time::sleep(Duration::from_millis(50)).await;
        go_tx.send(()).unwrap();

        let (mut scheduler, report) = flushing.await.unwrap();
        assert_eq!(report.unwrap(), SyncReport { applied: 1, failed: 0 });
        assert_eq!(backend.inner.note_count(), 1);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn flush_now_applies_pending_ops() {
        let backend = Arc::new(MemoryBackend::new());
        let mut scheduler = SyncScheduler::new(backend.clone(), Duration::from_secs(3600));
        let handle = scheduler.start();

        let saved = note("a");
        handle.enqueue(SyncOp::SaveNote(saved.clone()));
        handle.enqueue(SyncOp::RenameSelector {
            id: SelectorId::new(4).unwrap(),
            name: "Ideas".into(),
        });

        let report = scheduler.flush_now().await.unwrap();
        assert_eq!(report, SyncReport { applied: 2, failed: 0 });
        assert_eq!(backend.note(&saved.id), Some(saved));
        assert_eq!(
            backend.load_selector_names().unwrap()[&SelectorId::new(4).unwrap()],
            "Ideas"
        );

        let status = scheduler.status();
        assert!(status.is_running);
        assert_eq!(status.synced, 2);
        assert_eq!(status.pending, 0);
        assert!(status.last_sync_time.is_some());

        scheduler.stop().await.unwrap();
        assert!(!scheduler.status().is_running);
    }

    #[tokio::test]
    async fn collapsed_ops_reach_the_backend_once() {
        let backend = Arc::new(MemoryBackend::new());
        let mut scheduler = SyncScheduler::new(backend.clone(), Duration::from_secs(3600));
        let handle = scheduler.start();

        let mut a = note("a");
        for i in 0..5 {
            a.content = format!("v{}", i);
            handle.enqueue(SyncOp::SaveNote(a.clone()));
        }

        let report = scheduler.flush_now().await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(backend.note(&a.id).unwrap().content, "v4");
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_flushes_pending_ops() {
        let backend = Arc::new(MemoryBackend::new());
        let mut scheduler = SyncScheduler::new(backend.clone(), Duration::from_secs(3600));
        let handle = scheduler.start();

        handle.enqueue(SyncOp::SaveNote(note("a")));
        scheduler.stop().await.unwrap();

        assert_eq!(backend.note_count(), 1);
        assert!(scheduler.handle().is_none());
    }

    #[tokio::test]
    async fn interval_flushes_without_being_asked() {
        let backend = Arc::new(MemoryBackend::new());
        let mut scheduler = SyncScheduler::new(backend.clone(), Duration::from_millis(10));
        let handle = scheduler.start();

        handle.enqueue(SyncOp::SaveNote(note("a")));
        for _ in 0..100 {
            if backend.note_count() == 1 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(backend.note_count(), 1);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failures_are_counted_not_raised() {
        let backend = Arc::new(BrokenBackend::default());
        let mut scheduler = SyncScheduler::new(backend.clone(), Duration::from_secs(3600));
        let handle = scheduler.start();

        handle.enqueue(SyncOp::SaveNote(note("a")));
        handle.enqueue(SyncOp::DeleteNote("gone".into()));

        let report = scheduler.flush_now().await.unwrap();
        assert_eq!(report, SyncReport { applied: 0, failed: 2 });
        assert_eq!(scheduler.status().failed, 2);

        // nothing is retried on the next flush
        let report = scheduler.flush_now().await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn enqueue_after_stop_is_harmless() {
        let backend = Arc::new(MemoryBackend::new());
        let mut scheduler = SyncScheduler::new(backend.clone(), Duration::from_secs(3600));
        let handle = scheduler.start();
        scheduler.stop().await.unwrap();

        handle.enqueue(SyncOp::SaveNote(note("late")));
        assert_eq!(backend.note_count(), 0);
        assert!(scheduler.flush_now().await.is_err());
    }
}
