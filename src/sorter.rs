//! The sort pipeline.
//!
//! A run prepares the bowl directories, collects the files below the source
//! directory, purges unwanted files, routes every sortable file to a bowl and
//! moves it there while recording the history for undo:
//!
//! - PDFs are matched against `[BOWLS]` by their cleaned name.
//! - When `[BOWLS_EMAIL]` is configured, every other sortable file is named
//!   after its mail header and matched against the email bowls.
//! - When `[BOWLS_GPS]` is configured, JPEGs are matched by where they were
//!   taken.
//! - Everything else is matched against `[BOWLS]`.

use crate::config::SortConfig;
use crate::file_organizer::{
    FileOrganizer, HISTORY_FILE_NAME, MoveOptions, Operation, OperationLog, OrganizeError,
};
use crate::gps::read_image_coordinates;
use crate::mail::MailHeader;
use crate::sanitize::{clean_file_string, split_extension};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File written by [`Sorter::write_directory_listing`].
pub const DIRECTORY_LISTING_FILE: &str = "filter-examples.txt";

/// Appended to the stem of photos without a GPS position.
pub const NO_GPS_TAG: &str = "_nogps";

/// Label used in reports for files moved to the target directory itself.
pub const TARGET_ROOT_LABEL: &str = "(target)";

// How far below a subdirectory sortable files make it eligible for purging.
const PURGE_DEPTH: usize = 2;

#[derive(Debug, Error)]
pub enum SortError {
    #[error("Source directory does not exist: {}", .0.display())]
    SourceMissing(PathBuf),
    #[error("File to sort does not exist: {}", .0.display())]
    FileMissing(PathBuf),
    #[error(transparent)]
    Organize(#[from] OrganizeError),
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type SortResult<T> = Result<T, SortError>;

/// Per-run switches from the command line.
#[derive(Debug, Clone, Default)]
pub struct SortOptions {
    /// Plan everything, touch nothing.
    pub dry_run: bool,
    /// Sort only this file instead of walking the source directory.
    pub single: Option<PathBuf>,
    /// Remove empty source subdirectories afterwards.
    pub prune_empty: bool,
}

/// What kind of file a task is, by extension or, failing that, by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Mail,
    Jpeg,
    Other,
}

impl FileKind {
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Self::Pdf,
            "eml" | "msg" => Self::Mail,
            "jpg" | "jpeg" => Self::Jpeg,
            _ => match infer::get_from_path(path) {
                Ok(Some(kind)) => match kind.mime_type() {
                    "application/pdf" => Self::Pdf,
                    "image/jpeg" => Self::Jpeg,
                    "message/rfc822" => Self::Mail,
                    _ => Self::Other,
                },
                _ => Self::Other,
            },
        }
    }
}

/// A sortable file found in the source tree.
#[derive(Debug, Clone)]
pub struct FileTask {
    pub path: PathBuf,
    /// Directory the file was found in.
    pub dir: PathBuf,
    pub file_name: String,
    pub kind: FileKind,
    /// Sortable files in `dir`, this one included.
    pub siblings: usize,
    /// False for files directly in the source directory and in single mode.
    pub in_subdir: bool,
}

impl FileTask {
    /// A lone file in a subdirectory is named after that directory.
    pub fn is_lone_in_subdir(&self) -> bool {
        self.in_subdir && self.siblings == 1
    }
}

/// Where a task should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Move into a bowl (`None` is the target directory itself).
    Move {
        bowl: Option<String>,
        file_name: String,
    },
    /// Rename without moving, as done for photos without a position.
    RenameInPlace { file_name: String },
    /// Leave the file alone.
    Leave { reason: String },
}

/// What happened to one task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Moved(Operation),
    Renamed(Operation),
    /// The file already had its final name and place.
    InPlace,
    Left(String),
    Failed(String),
}

/// Progress notifications for a run.
#[derive(Debug, Clone)]
pub enum SortEvent {
    Started { total: usize },
    Processed { path: PathBuf, outcome: TaskOutcome },
    Finished,
}

/// Summary of a sort run.
#[derive(Debug, Default)]
pub struct SortReport {
    /// Moved file count per bowl.
    pub moved: BTreeMap<String, usize>,
    pub operations: Vec<Operation>,
    pub renamed: Vec<Operation>,
    pub in_place: usize,
    pub deleted: Vec<PathBuf>,
    pub left: Vec<(PathBuf, String)>,
    /// Files that do not match `ftype_sort`.
    pub unsupported: usize,
    pub failed: Vec<(PathBuf, String)>,
    pub pruned: Vec<PathBuf>,
    pub history_saved: bool,
}

impl SortReport {
    pub fn total_moved(&self) -> usize {
        self.operations.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Runs the sort pipeline for one configuration.
pub struct Sorter {
    config: SortConfig,
    options: SortOptions,
    project: String,
}

impl Sorter {
    pub fn new(config: SortConfig, options: SortOptions) -> Self {
        let project = config.project_name();
        Self {
            config,
            options,
            project,
        }
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    pub fn options(&self) -> &SortOptions {
        &self.options
    }

    /// Creates the target directory and every `[BOWLS]` directory.
    pub fn prepare(&self) -> SortResult<()> {
        if self.options.dry_run {
            return Ok(());
        }
        let target = &self.config.target_dir;
        let dirs = std::iter::once(target.clone())
            .chain(self.config.bowls.iter().map(|b| bowl_dir(target, &b.name)));
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|e| OrganizeError::DirectoryCreationFailed {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// All files to consider: the single file, or every file below the
    /// source directory except the target tree and bowlsort's own files.
    pub fn collect(&self) -> SortResult<Vec<PathBuf>> {
        if let Some(single) = &self.options.single {
            if !single.is_file() {
                return Err(SortError::FileMissing(single.clone()));
            }
            return Ok(vec![single.clone()]);
        }

        let source = &self.config.source_dir;
        if !source.is_dir() {
            return Err(SortError::SourceMissing(source.clone()));
        }
        let target = fs::canonicalize(&self.config.target_dir).ok();

        let files = WalkDir::new(source)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.depth() > 0 && e.file_type().is_dir() && is_same_dir(e.path(), target.as_deref()))
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.file_name() != HISTORY_FILE_NAME && e.file_name() != DIRECTORY_LISTING_FILE)
            .map(|e| e.into_path())
            .collect();
        Ok(files)
    }

    /// Files to delete before sorting.
    ///
    /// Only subdirectories of the source that hold a sortable file within two
    /// levels are cleaned. There, files with an `ftype_delete` suffix go, and
    /// sortable files whose name carries a `trash` or `trash_nocase` entry.
    pub fn purge_candidates(&self, files: &[PathBuf]) -> Vec<PathBuf> {
        let root = self.config.source_dir.as_path();
        let scope = |file: &Path| -> Vec<PathBuf> {
            file.ancestors()
                .skip(1)
                .take(PURGE_DEPTH + 1)
                .take_while(|dir| *dir != root && dir.starts_with(root))
                .map(Path::to_path_buf)
                .collect()
        };

        let eligible: HashSet<PathBuf> = files
            .iter()
            .filter(|f| self.config.is_sortable(&file_name_of(f)))
            .flat_map(|f| scope(f.as_path()))
            .collect();

        files
            .iter()
            .filter(|f| {
                let name = file_name_of(f);
                let unwanted = self.config.is_deletable(&name)
                    || (self.config.is_sortable(&name) && self.config.is_trash(&name));
                unwanted && scope(f.as_path()).iter().any(|dir| eligible.contains(dir))
            })
            .cloned()
            .collect()
    }

    /// Builds tasks for the sortable files.
    pub fn tasks(&self, files: Vec<PathBuf>) -> Vec<FileTask> {
        let sortable: Vec<PathBuf> = files
            .into_iter()
            .filter(|f| self.config.is_sortable(&file_name_of(f)))
            .collect();

        let mut per_dir: HashMap<PathBuf, usize> = HashMap::new();
        for file in &sortable {
            *per_dir.entry(parent_of(file)).or_insert(0) += 1;
        }

        let single = self.options.single.is_some();
        sortable
            .into_iter()
            .map(|path| {
                let dir = parent_of(&path);
                FileTask {
                    file_name: file_name_of(&path),
                    kind: FileKind::detect(&path),
                    siblings: per_dir.get(&dir).copied().unwrap_or(1),
                    in_subdir: !single && dir != self.config.source_dir,
                    path,
                    dir,
                }
            })
            .collect()
    }

    /// Decides where a task goes.
    pub fn route(&self, task: &FileTask) -> Route {
        if task.kind == FileKind::Pdf {
            let name = if task.is_lone_in_subdir() {
                self.clean_with_dir(task)
            } else {
                self.config.cleaner.clean_file_name(&task.file_name, None)
            };
            return self.name_route(name, task);
        }

        if !self.config.email_bowls.is_empty() {
            return self.mail_route(task);
        }

        if !self.config.gps_bowls.is_empty() && task.kind == FileKind::Jpeg {
            return self.gps_route(task);
        }

        let name = if task.is_lone_in_subdir() {
            self.clean_with_dir(task)
        } else {
            clean_file_string(&task.file_name)
        };
        self.name_route(name, task)
    }

    fn clean_with_dir(&self, task: &FileTask) -> String {
        let dir = task.dir.to_string_lossy();
        self.config.cleaner.clean_file_name(&task.file_name, Some(&dir))
    }

    fn name_route(&self, name: String, task: &FileTask) -> Route {
        let file_name = non_empty(name, task);
        let bowl = self.config.bowls.resolve(&file_name).map(|b| b.name.clone());
        debug!(file = %task.file_name, ?bowl, "name route");
        Route::Move { bowl, file_name }
    }

    fn mail_route(&self, task: &FileTask) -> Route {
        let (_, ext) = split_extension(&task.file_name);
        let header = if task.kind == FileKind::Mail {
            match MailHeader::read(&task.path) {
                Ok(header) => header,
                Err(e) => {
                    warn!(path = %task.path.display(), error = %e, "cannot read mail, using file name");
                    None
                }
            }
        } else {
            None
        };

        let raw = match header {
            Some(header) => header.file_name(&self.project, ext),
            None => task.file_name.clone(),
        };
        let file_name = non_empty(self.config.cleaner.clean_file_name(&raw, None), task);
        let bowl = self
            .config
            .email_bowls
            .resolve(&file_name)
            .map(|b| b.name.clone());
        debug!(file = %task.file_name, ?bowl, "mail route");
        Route::Move { bowl, file_name }
    }

    fn gps_route(&self, task: &FileTask) -> Route {
        let moved_unmatched = self.config.settings.gps_moved_unmatched;

        if task.file_name.to_lowercase().contains(NO_GPS_TAG) {
            if moved_unmatched {
                return self.name_route(clean_file_string(&task.file_name), task);
            }
            return Route::Leave {
                reason: "photo has no GPS position".to_string(),
            };
        }

        let cleaned = non_empty(self.config.cleaner.clean_file_name(&task.file_name, None), task);
        match read_image_coordinates(&task.path) {
            Err(e) => Route::Leave {
                reason: e.to_string(),
            },
            Ok(None) => {
                let (stem, ext) = split_extension(&cleaned);
                let tagged = format!("{}{}{}", stem, NO_GPS_TAG, ext);
                info!(file = %task.file_name, "photo has no GPS position");
                if moved_unmatched {
                    self.name_route(tagged, task)
                } else {
                    Route::RenameInPlace { file_name: tagged }
                }
            }
            Ok(Some(position)) => match self.config.gps_bowls.resolve(Some(position)) {
                Some(bowl) => {
                    debug!(file = %task.file_name, %position, bowl = %bowl.name, "GPS route");
                    Route::Move {
                        bowl: Some(bowl.name.clone()),
                        file_name: cleaned,
                    }
                }
                None if moved_unmatched => self.name_route(cleaned, task),
                None => Route::Leave {
                    reason: format!("no GPS bowl near {}", position),
                },
            },
        }
    }

    /// Routes and moves one task.
    ///
    /// `claimed` holds the destinations earlier tasks of the run went to;
    /// the destination of this task is added to it.
    pub fn apply(&self, task: &FileTask, claimed: &mut HashSet<PathBuf>) -> TaskOutcome {
        let options = MoveOptions {
            overwrite: self.config.settings.overwrite,
            dry_run: self.options.dry_run,
        };

        let (dest, file_name, bowl) = match self.route(task) {
            Route::Move { bowl, file_name } => {
                let dest = match &bowl {
                    Some(name) => bowl_dir(&self.config.target_dir, name),
                    None => self.config.target_dir.clone(),
                };
                (dest, file_name, Some(bowl.unwrap_or_default()))
            }
            Route::RenameInPlace { file_name } => (task.dir.clone(), file_name, None),
            Route::Leave { reason } => return TaskOutcome::Left(reason),
        };

        match FileOrganizer::move_file_avoiding(&task.path, &dest, &file_name, options, claimed) {
            Ok(op) if op.is_noop() => TaskOutcome::InPlace,
            Ok(mut op) => {
                claimed.insert(op.new_path.clone());
                match bowl {
                    Some(bowl) => {
                        op.bowl = bowl;
                        TaskOutcome::Moved(op)
                    }
                    None => TaskOutcome::Renamed(op),
                }
            }
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }

    pub fn run(&self) -> SortResult<SortReport> {
        self.run_with(|_| {})
    }

    /// Runs the whole pipeline, reporting progress to `observer`.
    ///
    /// A failure on one file is recorded in the report and never stops the
    /// run. Errors are returned only for problems that affect the whole run.
    pub fn run_with<F>(&self, mut observer: F) -> SortResult<SortReport>
    where
        F: FnMut(&SortEvent),
    {
        let dry_run = self.options.dry_run;
        let target = &self.config.target_dir;
        info!(
            source = %self.config.source_dir.display(),
            target = %target.display(),
            dry_run,
            "starting sort"
        );

        let files = self.collect()?;
        self.prepare()?;
        let mut report = SortReport::default();

        let deleted: HashSet<PathBuf> = if self.options.single.is_some() {
            HashSet::new()
        } else {
            let mut deleted = HashSet::new();
            for path in self.purge_candidates(&files) {
                match FileOrganizer::delete_file(&path, dry_run) {
                    Ok(()) => {
                        info!(path = %path.display(), dry_run, "deleted");
                        report.deleted.push(path.clone());
                        deleted.insert(path);
                    }
                    Err(e) => report.failed.push((path, e.to_string())),
                }
            }
            deleted
        };

        let total_files = files.len() - deleted.len();
        let tasks = self.tasks(files.into_iter().filter(|f| !deleted.contains(f)).collect());
        report.unsupported = total_files - tasks.len();
        observer(&SortEvent::Started { total: tasks.len() });

        let mut log = OperationLog::new(target.clone());
        let mut claimed = HashSet::new();
        for task in &tasks {
            let outcome = self.apply(task, &mut claimed);
            match &outcome {
                TaskOutcome::Moved(op) => {
                    let label = if op.bowl.is_empty() {
                        TARGET_ROOT_LABEL.to_string()
                    } else {
                        op.bowl.clone()
                    };
                    info!(from = %op.original_path.display(), to = %op.new_path.display(), "moved");
                    *report.moved.entry(label).or_insert(0) += 1;
                    report.operations.push(op.clone());
                    log.add_operation(op.clone());
                }
                TaskOutcome::Renamed(op) => {
                    info!(from = %op.original_path.display(), to = %op.new_path.display(), "renamed");
                    report.renamed.push(op.clone());
                    log.add_operation(op.clone());
                }
                TaskOutcome::InPlace => report.in_place += 1,
                TaskOutcome::Left(reason) => {
                    info!(path = %task.path.display(), %reason, "left in place");
                    report.left.push((task.path.clone(), reason.clone()));
                }
                TaskOutcome::Failed(error) => {
                    warn!(path = %task.path.display(), %error, "failed to sort");
                    report.failed.push((task.path.clone(), error.clone()));
                }
            }
            observer(&SortEvent::Processed {
                path: task.path.clone(),
                outcome,
            });
        }

        if !dry_run && !log.is_empty() {
            match log.save(target) {
                Ok(()) => report.history_saved = true,
                Err(e) => warn!(error = %e, "could not save history, undo will not be available"),
            }
        }

        if self.options.prune_empty && self.options.single.is_none() {
            report.pruned = FileOrganizer::remove_empty_dirs(
                &self.config.source_dir,
                Some(target.as_path()),
                dry_run,
            )?;
        }

        observer(&SortEvent::Finished);
        Ok(report)
    }

    /// Writes `filter-examples.txt` into the target directory, listing every
    /// existing subdirectory relative to it, deepest entries first.
    pub fn write_directory_listing(&self) -> SortResult<(PathBuf, usize)> {
        let target = &self.config.target_dir;
        if !target.is_dir() {
            return Err(SortError::Io {
                path: target.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "target directory does not exist"),
            });
        }

        let mut names: Vec<String> = WalkDir::new(target)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(target)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        names.reverse();

        let path = target.join(DIRECTORY_LISTING_FILE);
        let mut content = names.join("\n");
        if !names.is_empty() {
            content.push('\n');
        }
        fs::write(&path, content).map_err(|e| SortError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok((path, names.len()))
    }
}

fn is_same_dir(path: &Path, target: Option<&Path>) -> bool {
    target.is_some_and(|t| fs::canonicalize(path).is_ok_and(|p| p == t))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// Only plain components are joined, so a bowl can never leave the target.
fn bowl_dir(target: &Path, bowl: &str) -> PathBuf {
    let mut dir = target.to_path_buf();
    dir.extend(
        Path::new(bowl)
            .components()
            .filter(|c| matches!(c, Component::Normal(_))),
    );
    dir
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

// Cleaning can strip a name down to nothing; keep the original then.
fn non_empty(name: String, task: &FileTask) -> String {
    let (stem, _) = split_extension(&name);
    if stem.trim().is_empty() {
        task.file_name.clone()
    } else {
        name
    }
}
