//! Moving files into bowls.
//!
//! This module creates bowl directories, moves files without clobbering
//! existing ones and keeps the history of a run so it can be undone.

use crate::sanitize::split_extension;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Name of the history file kept in the target directory.
pub const HISTORY_FILE_NAME: &str = ".bowlsort_history.json";

/// Represents a single file move.
///
/// This struct records the original and new paths of a file that was moved
/// during a sort run, enabling undo functionality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// The original path of the file before sorting.
    pub original_path: PathBuf,
    /// The new path of the file after sorting.
    pub new_path: PathBuf,
    /// The bowl the file was moved to; empty for the target root or an
    /// in-place rename.
    #[serde(default)]
    pub bowl: String,
}

impl Operation {
    /// True when the file already was where it should go.
    pub fn is_noop(&self) -> bool {
        self.original_path == self.new_path
    }
}

/// Represents a complete run of file operations.
///
/// This is persisted to disk to enable undo functionality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLog {
    /// RFC 3339 timestamp of when the run started.
    pub timestamp: String,
    /// The target directory of the run.
    pub base_path: PathBuf,
    /// All moves performed in this run, in order.
    pub operations: Vec<Operation>,
}

impl OperationLog {
    /// Creates a new operation log for a given base path.
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            base_path,
            operations: Vec::new(),
        }
    }

    /// Adds an operation to this log. No-op moves are not recorded.
    pub fn add_operation(&mut self, operation: Operation) {
        if !operation.is_noop() {
            self.operations.push(operation);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the path to the history file for this base path.
    pub fn history_file_path(base_path: &Path) -> PathBuf {
        base_path.join(HISTORY_FILE_NAME)
    }

    /// Saves this log to disk in JSON format.
    pub fn save(&self, base_path: &Path) -> OrganizeResult<()> {
        let history_path = Self::history_file_path(base_path);
        let json_string = serde_json::to_string_pretty(self).map_err(|e| {
            OrganizeError::HistoryWriteFailed {
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("JSON serialization failed: {}", e),
                ),
            }
        })?;

        fs::write(&history_path, json_string)
            .map_err(|e| OrganizeError::HistoryWriteFailed { source: e })?;
        debug!(path = %history_path.display(), operations = self.operations.len(), "history saved");

        Ok(())
    }

    /// Loads the most recent operation log from disk.
    pub fn load(base_path: &Path) -> OrganizeResult<Option<Self>> {
        let history_path = Self::history_file_path(base_path);

        if !history_path.exists() {
            return Ok(None);
        }

        let json_string = fs::read_to_string(&history_path)
            .map_err(|e| OrganizeError::HistoryReadFailed { source: e })?;

        let log = serde_json::from_str(&json_string).map_err(|e| {
            OrganizeError::InvalidHistoryFormat {
                reason: format!("JSON parse error: {}", e),
            }
        })?;
        Ok(Some(log))
    }

    /// Deletes the history file for a given base path.
    pub fn delete(base_path: &Path) -> OrganizeResult<()> {
        let history_path = Self::history_file_path(base_path);
        if history_path.exists() {
            fs::remove_file(&history_path)
                .map_err(|e| OrganizeError::HistoryWriteFailed { source: e })?;
        }
        Ok(())
    }
}

/// Errors that can occur while moving or deleting files.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// Failed to create a bowl directory.
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The target directory of an undo does not exist.
    #[error("Invalid base path {}: {source}", .path.display())]
    InvalidBasePath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The file to move is gone.
    #[error("Source file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),
    /// Neither rename nor copy succeeded.
    #[error("Failed to move {} to {}: {reason}", .from.display(), .to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        reason: io::Error,
    },
    /// Failed to delete a file or directory.
    #[error("Failed to delete {}: {source}", .path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failed to write history file.
    #[error("Failed to write history file: {source}")]
    HistoryWriteFailed { source: io::Error },
    /// Failed to read history file.
    #[error("Failed to read history file: {source}")]
    HistoryReadFailed { source: io::Error },
    /// History file has invalid format.
    #[error("Invalid history file format: {reason}")]
    InvalidHistoryFormat { reason: String },
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// How a move treats existing files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveOptions {
    /// Replace an existing destination instead of picking `name_N.ext`.
    pub overwrite: bool,
    /// Plan the move without touching the filesystem.
    pub dry_run: bool,
}

/// Moves, deletes and prunes files.
pub struct FileOrganizer;

impl FileOrganizer {
    /// Moves `source` to `dest_dir/name` and returns the operation.
    ///
    /// The destination directory is created when missing. If the file already
    /// is at the destination nothing happens and a no-op operation is
    /// returned, which makes re-running a sort harmless. An existing file at
    /// the destination is kept unless `overwrite` is set: the name gets a
    /// `_1`, `_2`, ... suffix instead. When `rename` fails (for example across
    /// devices) the file is copied and the original removed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bowlsort::file_organizer::{FileOrganizer, MoveOptions};
    /// use std::path::Path;
    ///
    /// let result = FileOrganizer::move_file(
    ///     Path::new("/scans/inbox/scan_0042.pdf"),
    ///     Path::new("/archive/Finance/Tax"),
    ///     "Tax notice 2024.pdf",
    ///     MoveOptions::default(),
    /// );
    ///
    /// match result {
    ///     Ok(op) => println!("Moved {} to {}", op.original_path.display(), op.new_path.display()),
    ///     Err(e) => eprintln!("Sorting failed: {}", e),
    /// }
    /// ```
    pub fn move_file(
        source: &Path,
        dest_dir: &Path,
        name: &str,
        options: MoveOptions,
    ) -> OrganizeResult<Operation> {
        Self::move_file_avoiding(source, dest_dir, name, options, &HashSet::new())
    }

    /// Like [`FileOrganizer::move_file`], but paths in `claimed` count as
    /// taken. A sort run passes the destinations it already used, so a dry
    /// run plans the same `_N` suffixes a real run would write.
    pub fn move_file_avoiding(
        source: &Path,
        dest_dir: &Path,
        name: &str,
        options: MoveOptions,
        claimed: &HashSet<PathBuf>,
    ) -> OrganizeResult<Operation> {
        if !source.is_file() {
            return Err(OrganizeError::SourceMissing(source.to_path_buf()));
        }

        let mut destination = dest_dir.join(name);
        if same_file(source, &destination) {
            debug!(path = %source.display(), "already in place");
            return Ok(Operation {
                original_path: source.to_path_buf(),
                new_path: source.to_path_buf(),
                bowl: String::new(),
            });
        }

        if !options.dry_run && !dest_dir.exists() {
            fs::create_dir_all(dest_dir).map_err(|e| OrganizeError::DirectoryCreationFailed {
                path: dest_dir.to_path_buf(),
                source: e,
            })?;
        }

        let taken = |path: &Path| path.exists() || claimed.contains(path);
        if taken(destination.as_path()) && !options.overwrite {
            destination = Self::free_path_with(dest_dir, name, taken);
        }

        let operation = Operation {
            original_path: source.to_path_buf(),
            new_path: destination.clone(),
            bowl: String::new(),
        };
        if options.dry_run {
            return Ok(operation);
        }

        if let Err(rename_error) = fs::rename(source, &destination) {
            debug!(error = %rename_error, "rename failed, falling back to copy");
            copy_then_remove(source, &destination)?;
        }

        Ok(operation)
    }

    /// First `stem_N.ext` in `dir` that does not exist yet.
    pub fn next_free_path(dir: &Path, name: &str) -> PathBuf {
        Self::free_path_with(dir, name, |path| path.exists())
    }

    fn free_path_with(dir: &Path, name: &str, taken: impl Fn(&Path) -> bool) -> PathBuf {
        let (stem, ext) = split_extension(name);
        (1..)
            .map(|i| dir.join(format!("{}_{}{}", stem, i, ext)))
            .find(|candidate| !taken(candidate.as_path()))
            .unwrap_or_else(|| dir.join(name))
    }

    /// Deletes a single file.
    pub fn delete_file(path: &Path, dry_run: bool) -> OrganizeResult<()> {
        if dry_run {
            return Ok(());
        }
        fs::remove_file(path).map_err(|e| OrganizeError::DeleteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Removes empty directories below `root`, deepest first. `root` itself
    /// is never removed, and neither is anything inside `keep` (the target
    /// tree when it lives inside the source). A directory that only contains
    /// directories removed in the same pass counts as empty, also in dry-run
    /// mode.
    pub fn remove_empty_dirs(
        root: &Path,
        keep: Option<&Path>,
        dry_run: bool,
    ) -> OrganizeResult<Vec<PathBuf>> {
        let keep = keep.and_then(|k| fs::canonicalize(k).ok());
        let mut removed: HashSet<PathBuf> = HashSet::new();
        let mut order = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_entry(|e| {
                keep.as_deref().is_none_or(|k| {
                    fs::canonicalize(e.path()).map_or(true, |p| p != k)
                })
            });

        for entry in walker
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            let dir = entry.path();
            let is_empty = match fs::read_dir(dir) {
                Ok(mut children) => {
                    children.all(|child| child.is_ok_and(|c| removed.contains(&c.path())))
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "cannot read directory");
                    false
                }
            };
            if !is_empty {
                continue;
            }

            if !dry_run {
                fs::remove_dir(dir).map_err(|e| OrganizeError::DeleteFailed {
                    path: dir.to_path_buf(),
                    source: e,
                })?;
            }
            debug!(path = %dir.display(), dry_run, "removed empty directory");
            removed.insert(dir.to_path_buf());
            order.push(dir.to_path_buf());
        }

        Ok(order)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

pub(crate) fn copy_then_remove(source: &Path, destination: &Path) -> OrganizeResult<()> {
    let failure = |e: io::Error| OrganizeError::FileMoveFailure {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        reason: e,
    };

    fs::copy(source, destination).map_err(failure)?;
    if let Err(e) = fs::remove_file(source) {
        // Leave exactly one copy behind.
        let _ = fs::remove_file(destination);
        return Err(failure(e));
    }
    Ok(())
}
