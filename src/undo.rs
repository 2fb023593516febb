//! Undo functionality for reverting a sort run.
//!
//! Files are moved back to the places they were sorted from, based on the
//! history stored in the target directory. Deleted files cannot be restored.

use crate::file_organizer::{
    Operation, OperationLog, OrganizeError, OrganizeResult, copy_then_remove,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Represents the result of an undo operation.
#[derive(Debug, Default)]
pub struct UndoReport {
    /// Number of files successfully restored.
    pub restored_files: usize,
    /// Files that could not be restored, with the reason.
    pub failed_restores: Vec<(PathBuf, String)>,
    /// Files that were no longer at their sorted location.
    pub skipped_files: Vec<(PathBuf, String)>,
    /// Files that were in the way at an original location and got renamed.
    pub backups: Vec<PathBuf>,
}

impl UndoReport {
    /// Returns the total number of operations processed.
    pub fn total_processed(&self) -> usize {
        self.restored_files + self.failed_restores.len() + self.skipped_files.len()
    }

    /// Returns true if the undo was completely successful.
    pub fn is_complete_success(&self) -> bool {
        self.failed_restores.is_empty() && self.skipped_files.is_empty()
    }
}

enum RestoreError {
    Missing(PathBuf),
    Failed(PathBuf, String),
}

/// Manages undo operations for sort runs.
pub struct UndoManager;

impl UndoManager {
    /// Undoes the most recent sort into `target_dir`.
    ///
    /// Moves are reversed last-in first-out. A file that now sits at an
    /// original location is renamed to `name.bak.<timestamp>` first; a sorted
    /// file that has disappeared is skipped. The history is removed only when
    /// every file came back.
    ///
    /// # Errors
    ///
    /// Fails when `target_dir` does not exist or holds no readable history.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bowlsort::undo::UndoManager;
    /// use std::path::Path;
    ///
    /// let result = UndoManager::undo(Path::new("/archive"));
    /// match result {
    ///     Ok(report) => println!("Restored {} files", report.restored_files),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo(target_dir: &Path) -> OrganizeResult<UndoReport> {
        if !target_dir.exists() {
            return Err(OrganizeError::InvalidBasePath {
                path: target_dir.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "target directory does not exist",
                ),
            });
        }

        let log = OperationLog::load(target_dir)?.ok_or_else(|| {
            OrganizeError::InvalidHistoryFormat {
                reason: "No previous sort found to undo".to_string(),
            }
        })?;
        info!(timestamp = %log.timestamp, operations = log.operations.len(), "undoing sort run");

        let mut report = UndoReport::default();
        for operation in log.operations.iter().rev() {
            match Self::restore_file(operation, &mut report.backups) {
                Ok(()) => report.restored_files += 1,
                Err(RestoreError::Missing(path)) => {
                    warn!(path = %path.display(), "sorted file not found, skipping");
                    report
                        .skipped_files
                        .push((path, "File not found at expected location".to_string()));
                }
                Err(RestoreError::Failed(path, reason)) => {
                    warn!(path = %path.display(), %reason, "restore failed");
                    report.failed_restores.push((path, reason));
                }
            }
        }

        if report.is_complete_success()
            && let Err(e) = OperationLog::delete(target_dir)
        {
            warn!(error = %e, "could not delete history file");
        }

        Ok(report)
    }

    fn restore_file(operation: &Operation, backups: &mut Vec<PathBuf>) -> Result<(), RestoreError> {
        if !operation.new_path.exists() {
            return Err(RestoreError::Missing(operation.new_path.clone()));
        }

        if operation.original_path.exists() {
            let backup_path = Self::generate_backup_path(&operation.original_path);
            fs::rename(&operation.original_path, &backup_path).map_err(|e| {
                RestoreError::Failed(
                    operation.original_path.clone(),
                    format!("Could not backup conflicting file: {}", e),
                )
            })?;
            debug!(backup = %backup_path.display(), "backed up conflicting file");
            backups.push(backup_path);
        }

        // The source subdirectory may have been pruned after sorting.
        if let Some(parent) = operation.original_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                RestoreError::Failed(
                    parent.to_path_buf(),
                    format!("Could not recreate directory: {}", e),
                )
            })?;
        }

        if fs::rename(&operation.new_path, &operation.original_path).is_err() {
            copy_then_remove(&operation.new_path, &operation.original_path).map_err(|e| {
                RestoreError::Failed(
                    operation.new_path.clone(),
                    format!("Failed to restore file: {}", e),
                )
            })?;
        }

        Ok(())
    }

    /// Generates a backup path for a file by appending a timestamp.
    ///
    /// Example: `file.pdf` becomes `file.pdf.bak.20251109-143052`
    fn generate_backup_path(original_path: &Path) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let filename = original_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");

        let backup_name = format!("{}.bak.{}", filename, timestamp);

        match original_path.parent() {
            Some(parent) => parent.join(backup_name),
            None => PathBuf::from(backup_name),
        }
    }
}
