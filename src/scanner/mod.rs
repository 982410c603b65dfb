//! Import of media files from disk into the library.

pub mod discovery;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use crate::config::ScannerConfig;
use crate::db::Database;
use crate::tasks::{BackgroundTaskManager, TaskId, TaskProgress, TaskType, TaskUpdate};

pub use discovery::{discover_media, media_kind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub total_found: usize,
    pub new: usize,
    /// Already in the library for this owner.
    pub existing: usize,
    pub failed: usize,
}

pub struct Importer {
    config: ScannerConfig,
}

impl Importer {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Register every media file under `directory` for `owner`. Upload time
    /// is the file's modification time.
    pub fn import_directory(
        &self,
        directory: &Path,
        owner: &str,
        db: &Database,
        progress_tx: Option<&mpsc::Sender<TaskUpdate>>,
        cancel_flag: Option<&AtomicBool>,
    ) -> Result<ImportResult> {
        let files = discover_media(directory, &self.config)?;
        let total = files.len();
        let mut result = ImportResult {
            total_found: total,
            ..Default::default()
        };

        if let Some(tx) = progress_tx {
            let _ = tx.send(TaskUpdate::Started { total });
        }

        for (index, (path, kind)) in files.iter().enumerate() {
            if cancel_flag.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                tracing::info!(imported = result.new, total, "Import cancelled");
                return Ok(result);
            }

            if let Some(tx) = progress_tx {
                let _ = tx.send(TaskUpdate::Progress(
                    TaskProgress::new(index + 1, total).with_item(path.to_string_lossy()),
                ));
            }

            let uploaded_at = match modified_at(path) {
                Ok(time) => time,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    result.failed += 1;
                    continue;
                }
            };

            let path_str = path.to_string_lossy();
            match db.insert_media(owner, *kind, &path_str, uploaded_at)? {
                Some(media_id) => {
                    tracing::debug!(media_id, path = %path_str, kind = kind.as_str(), "Media imported");
                    result.new += 1;
                }
                None => result.existing += 1,
            }
        }

        tracing::info!(
            dir = %directory.display(),
            owner,
            new = result.new,
            existing = result.existing,
            failed = result.failed,
            "Import finished"
        );
        Ok(result)
    }

    /// Import with cancellation support via TaskUpdate protocol.
    pub fn import_cancellable(
        &self,
        directory: &Path,
        owner: &str,
        db: &Database,
        tx: mpsc::Sender<TaskUpdate>,
        cancel_flag: Arc<AtomicBool>,
    ) {
        match self.import_directory(directory, owner, db, Some(&tx), Some(cancel_flag.as_ref())) {
            Ok(_) if cancel_flag.load(Ordering::SeqCst) => {
                let _ = tx.send(TaskUpdate::Cancelled);
            }
            Ok(result) => {
                let _ = tx.send(TaskUpdate::Completed {
                    message: format!(
                        "{} new, {} already imported, {} failed",
                        result.new, result.existing, result.failed
                    ),
                });
            }
            Err(e) => {
                let _ = tx.send(TaskUpdate::Failed {
                    error: format!("{:#}", e),
                });
            }
        }
    }

    /// Register an import task and run it on a new thread.
    pub fn spawn(
        self,
        manager: &mut BackgroundTaskManager,
        db: Arc<Database>,
        directory: &Path,
        owner: &str,
    ) -> TaskId {
        let (task_id, tx, cancel_flag) = manager.register_task(TaskType::Import);
        let directory = directory.to_path_buf();
        let owner = owner.to_string();

        std::thread::spawn(move || {
            self.import_cancellable(&directory, &owner, &db, tx, cancel_flag);
        });
        task_id
    }
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read metadata of {}", path.display()))?;
    Ok(DateTime::<Utc>::from(modified))
}
