//! Batch image analysis on a background thread.

use anyhow::{anyhow, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use super::{BackgroundTaskManager, TaskId, TaskProgress, TaskType, TaskUpdate};
use crate::db::{Database, Media};
use crate::vision::{Analyzer, MediaAnalysis};

/// Per-media locks so the same item is never analyzed and saved by two
/// workers at once. Entries only live while some worker holds a handle.
#[derive(Default)]
pub struct MediaLocks {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl MediaLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for one media item. Hold its guard across analyze and
    /// save, then hand the handle back with [`MediaLocks::release`].
    pub fn for_media(&self, media_id: i64) -> Result<Arc<Mutex<()>>> {
        Ok(self.table()?.entry(media_id).or_default().clone())
    }

    /// Return a handle; the entry is dropped once no other worker holds one.
    pub fn release(&self, media_id: i64, handle: Arc<Mutex<()>>) -> Result<()> {
        let mut locks = self.table()?;
        // The table and `handle` are the last two owners.
        if Arc::strong_count(&handle) == 2 {
            locks.remove(&media_id);
        }
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> Result<usize> {
        Ok(self.table()?.len())
    }

    fn table(&self) -> Result<std::sync::MutexGuard<'_, HashMap<i64, Arc<Mutex<()>>>>> {
        self.locks.lock().map_err(|_| anyhow!("media lock table poisoned"))
    }
}

pub struct AnalysisWorker {
    db: Arc<Database>,
    analyzer: Arc<Analyzer>,
    locks: Arc<MediaLocks>,
    ai_tag_count: usize,
}

impl AnalysisWorker {
    pub fn new(db: Arc<Database>, analyzer: Arc<Analyzer>, locks: Arc<MediaLocks>, ai_tag_count: usize) -> Self {
        Self {
            db,
            analyzer,
            locks,
            ai_tag_count,
        }
    }

    /// Analyze one item and replace its stored analysis.
    pub fn analyze_one(&self, media: &Media) -> Result<MediaAnalysis> {
        let handle = self.locks.for_media(media.id)?;
        let result = self.analyze_locked(media, &handle);
        self.locks.release(media.id, handle)?;
        result
    }

    fn analyze_locked(&self, media: &Media, lock: &Mutex<()>) -> Result<MediaAnalysis> {
        let _guard = lock.lock().map_err(|_| anyhow!("media lock poisoned"))?;

        let analysis = self.analyzer.analyze_path(Path::new(&media.path));
        if let Some(error) = &analysis.error {
            tracing::warn!(media_id = media.id, path = %media.path, error = %error, "Analysis incomplete");
        }
        self.db.save_analysis(media.id, &analysis, self.ai_tag_count)?;
        Ok(analysis)
    }

    /// Analyze a batch in parallel, reporting through `tx`. Cancellation is
    /// checked before each item.
    pub fn process_batch_cancellable(&self, media: &[Media], tx: mpsc::Sender<TaskUpdate>, cancel_flag: Arc<AtomicBool>) {
        let total = media.len();
        let done = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let _ = tx.send(TaskUpdate::Started { total });
        tracing::info!(total, backend = self.analyzer.backend(), "Analysis batch started");

        media.par_iter().for_each_with(tx.clone(), |tx, item| {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }

            if let Err(e) = self.analyze_one(item) {
                failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(media_id = item.id, path = %item.path, error = %e, "Analysis failed");
            }

            let current = done.fetch_add(1, Ordering::SeqCst) + 1;
            let name = Path::new(&item.path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| item.path.clone());
            let _ = tx.send(TaskUpdate::Progress(TaskProgress::new(current, total).with_item(name)));
        });

        if cancel_flag.load(Ordering::SeqCst) {
            tracing::info!(analyzed = done.load(Ordering::SeqCst), total, "Analysis batch cancelled");
            let _ = tx.send(TaskUpdate::Cancelled);
            return;
        }

        let processed = done.load(Ordering::SeqCst);
        let failed = failed.load(Ordering::SeqCst);
        tracing::info!(processed, failed, "Analysis batch finished");

        let message = if failed > 0 {
            format!("{} analyzed, {} failed", processed - failed, failed)
        } else {
            format!("{} images analyzed", processed)
        };
        let _ = tx.send(TaskUpdate::Completed { message });
    }

    /// Register an analysis task and run the batch on a new thread.
    pub fn spawn(self: Arc<Self>, manager: &mut BackgroundTaskManager, media: Vec<Media>) -> TaskId {
        let (task_id, tx, cancel_flag) = manager.register_task(TaskType::Analysis);
        std::thread::spawn(move || {
            self.process_batch_cancellable(&media, tx, cancel_flag);
        });
        task_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::db::MediaKind;
    use crate::vision::HeuristicClassifier;
    use chrono::Utc;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    fn setup(dir: &Path, count: usize) -> (Arc<Database>, Vec<Media>) {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        for i in 0..count {
            let path = dir.join(format!("img{}.png", i));
            let shade = (i * 40) as u8;
            RgbImage::from_pixel(32, 32, Rgb([shade, 120, 200])).save(&path).unwrap();
            db.insert_media("alice", MediaKind::Image, &path.to_string_lossy(), Utc::now())
                .unwrap();
        }
        let media = db.images_to_analyze(Some("alice"), false).unwrap();
        (Arc::new(db), media)
    }

    fn worker(db: &Arc<Database>) -> AnalysisWorker {
        worker_with_locks(db, Arc::new(MediaLocks::new()))
    }

    fn worker_with_locks(db: &Arc<Database>, locks: Arc<MediaLocks>) -> AnalysisWorker {
        let analyzer = Analyzer::new(Arc::new(HeuristicClassifier), &AnalysisConfig::default()).unwrap();
        AnalysisWorker::new(db.clone(), Arc::new(analyzer), locks, 5)
    }

    fn drain(rx: &mpsc::Receiver<TaskUpdate>) -> Vec<TaskUpdate> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_batch_saves_every_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let (db, media) = setup(dir.path(), 3);
        let (tx, rx) = mpsc::channel();

        worker(&db).process_batch_cancellable(&media, tx, Arc::new(AtomicBool::new(false)));

        let updates = drain(&rx);
        assert!(matches!(updates.first(), Some(TaskUpdate::Started { total: 3 })));
        assert_eq!(updates.iter().filter(|u| matches!(u, TaskUpdate::Progress(_))).count(), 3);
        assert!(matches!(updates.last(), Some(TaskUpdate::Completed { .. })));

        assert!(db.images_to_analyze(Some("alice"), false).unwrap().is_empty());
        for item in &media {
            assert_eq!(db.analyses_for_media(item.id).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_reanalysis_keeps_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let (db, media) = setup(dir.path(), 1);
        let worker = worker(&db);

        worker.analyze_one(&media[0]).unwrap();
        worker.analyze_one(&media[0]).unwrap();
        assert_eq!(db.analyses_for_media(media[0].id).unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_reanalysis_of_same_media() {
        let dir = tempfile::tempdir().unwrap();
        let (db, media) = setup(dir.path(), 1);
        let same: Vec<Media> = std::iter::repeat(media[0].clone()).take(8).collect();
        let (tx, _rx) = mpsc::channel();
        let locks = Arc::new(MediaLocks::new());

        worker_with_locks(&db, locks.clone()).process_batch_cancellable(&same, tx, Arc::new(AtomicBool::new(false)));
        assert_eq!(db.analyses_for_media(media[0].id).unwrap().len(), 1);
        assert_eq!(locks.len().unwrap(), 0);
    }

    #[test]
    fn test_missing_file_is_saved_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let (db, _) = setup(dir.path(), 0);
        let missing: PathBuf = dir.path().join("gone.jpg");
        let id = db
            .insert_media("alice", MediaKind::Image, &missing.to_string_lossy(), Utc::now())
            .unwrap()
            .unwrap();
        let media = db.get_media(id).unwrap().unwrap();

        let analysis = worker(&db).analyze_one(&media).unwrap();
        assert!(analysis.error.is_some());
        assert_eq!(db.analyses_for_media(id).unwrap().len(), 1);
    }

    #[test]
    fn test_cancelled_batch_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (db, media) = setup(dir.path(), 2);
        let (tx, rx) = mpsc::channel();

        worker(&db).process_batch_cancellable(&media, tx, Arc::new(AtomicBool::new(true)));

        assert!(matches!(drain(&rx).last(), Some(TaskUpdate::Cancelled)));
        assert_eq!(db.images_to_analyze(Some("alice"), false).unwrap().len(), 2);
    }

    #[test]
    fn test_spawned_task_completes() {
        let dir = tempfile::tempdir().unwrap();
        let (db, media) = setup(dir.path(), 2);
        let mut manager = BackgroundTaskManager::new();

        let id = Arc::new(worker(&db)).spawn(&mut manager, media);

        let finished = manager.wait(&AtomicBool::new(false), |_| {});
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, id);
        assert!(finished[0].is_success());
        assert_eq!(finished[0].message, "2 images analyzed");
    }

    #[test]
    fn test_media_locks_are_shared_per_id() {
        let locks = MediaLocks::new();
        let a = locks.for_media(1).unwrap();
        let b = locks.for_media(1).unwrap();
        let c = locks.for_media(2).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.len().unwrap(), 2);

        // Still held through `b`.
        locks.release(1, a).unwrap();
        assert_eq!(locks.len().unwrap(), 2);
        locks.release(1, b).unwrap();
        locks.release(2, c).unwrap();
        assert_eq!(locks.len().unwrap(), 0);
    }

    #[test]
    fn test_lock_entries_released_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (db, media) = setup(dir.path(), 1);
        let locks = Arc::new(MediaLocks::new());
        let worker = worker_with_locks(&db, locks.clone());

        worker.analyze_one(&media[0]).unwrap();
        db.delete_media(media[0].id).unwrap();
        assert!(worker.analyze_one(&media[0]).is_err());
        assert_eq!(locks.len().unwrap(), 0);
    }
}
