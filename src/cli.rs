//! Command-line interface module for bowlsort.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Sort orchestration and reporting
//! - Undo operation handling
//! - Rule inspection (`dirs`, `route`)

use crate::config::SortConfig;
use crate::file_organizer::Operation;
use crate::gps::Coordinate;
use crate::output::{OutputFormatter, files_word};
use crate::sorter::{SortEvent, SortOptions, SortReport, Sorter, TARGET_ROOT_LABEL};
use crate::undo::UndoManager;
use clap::{ArgAction, Parser, Subcommand};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};

/// bowlsort - sort incoming files into bowls using INI rules
#[derive(Parser, Debug)]
#[command(name = "bowlsort")]
#[command(about = "Sort scanned mail, photos and documents into bowls using INI rules")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to ./bowlsort.ini, then ~/.config/bowlsort/config.ini)
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: SortCommand,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            _ => "debug",
        }
    }
}

/// Represents a CLI command to execute.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SortCommand {
    /// Sort the source directory into the bowls
    Sort {
        /// Show what would happen without moving or deleting anything
        #[arg(long)]
        dry_run: bool,
        /// Sort only this file
        #[arg(long, value_name = "FILE")]
        single: Option<PathBuf>,
        /// Remove empty source subdirectories afterwards
        #[arg(long)]
        prune_empty: bool,
    },
    /// Undo the previous sort run
    Undo,
    /// Write filter-examples.txt listing the target's directories
    Dirs,
    /// Show which bowl a file name or position resolves to
    Route {
        /// File name to match
        name: String,
        /// Match against [BOWLS_EMAIL] instead of [BOWLS]
        #[arg(long)]
        email: bool,
        /// Also resolve a position against [BOWLS_GPS]
        #[arg(long, value_name = "LAT,LON", allow_hyphen_values = true)]
        gps: Option<String>,
    },
}

/// Runs the CLI application with the given command.
///
/// # Examples
///
/// ```no_run
/// use bowlsort::cli::{run_cli, SortCommand};
/// use std::path::Path;
///
/// let command = SortCommand::Sort { dry_run: true, single: None, prune_empty: false };
/// match run_cli(command, Some(Path::new("bowlsort.ini"))) {
///     Ok(()) => println!("Operation completed successfully"),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli(command: SortCommand, config_path: Option<&Path>) -> Result<(), String> {
    let config = SortConfig::load(config_path)
        .map_err(|e| format!("Error loading configuration: {}", e))?;
    for warning in config.validate() {
        OutputFormatter::warning(&warning);
    }

    match command {
        SortCommand::Sort {
            dry_run,
            single,
            prune_empty,
        } => sort_files(
            config,
            SortOptions {
                dry_run,
                single,
                prune_empty,
            },
        ),
        SortCommand::Undo => undo_sort(&config.target_dir),
        SortCommand::Dirs => write_dirs(config),
        SortCommand::Route { name, email, gps } => show_route(&config, &name, email, gps.as_deref()),
    }
}

/// Sorts the source directory and prints what happened.
pub fn sort_files(config: SortConfig, options: SortOptions) -> Result<(), String> {
    let dry_run = options.dry_run;
    OutputFormatter::info(&format!(
        "Sorting {} into {}",
        config.source_dir.display(),
        config.target_dir.display()
    ));
    if dry_run {
        OutputFormatter::dry_run_notice("No files will be moved, renamed or deleted.");
    }

    let sorter = Sorter::new(config, options);
    let mut progress: Option<ProgressBar> = None;
    let report = sorter
        .run_with(|event| match event {
            SortEvent::Started { total } => {
                progress = Some(OutputFormatter::create_progress_bar(*total as u64, *total > 1));
            }
            SortEvent::Processed { path, .. } => {
                if let Some(pb) = &progress {
                    pb.set_message(
                        path.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    );
                    pb.inc(1);
                }
            }
            SortEvent::Finished => {
                if let Some(pb) = progress.take() {
                    pb.finish_and_clear();
                }
            }
        })
        .map_err(|e| format!("Error: {}", e))?;

    print_report(&report, &sorter.config().target_dir, dry_run);
    Ok(())
}

fn print_report(report: &SortReport, target: &Path, dry_run: bool) {
    let (move_verb, delete_verb) = if dry_run {
        ("Would move", "Would delete")
    } else {
        ("Moved", "Deleted")
    };

    if !report.deleted.is_empty() {
        OutputFormatter::header("Removed from source:");
        for path in &report.deleted {
            OutputFormatter::plain(&format!(" - {} {}", delete_verb, path.display()));
        }
    }

    if !report.operations.is_empty() {
        OutputFormatter::header("Sorted:");
        for op in &report.operations {
            OutputFormatter::success(&format!("{} {}", move_verb, describe_move(op, target)));
        }
    }

    for op in &report.renamed {
        OutputFormatter::warning(&format!(
            "No GPS position, renamed in place: {}",
            op.new_path.file_name().unwrap_or_default().to_string_lossy()
        ));
    }
    for (path, reason) in &report.left {
        OutputFormatter::warning(&format!("Left {}: {}", path.display(), reason));
    }
    for (path, reason) in &report.failed {
        OutputFormatter::error(&format!("{}: {}", path.display(), reason));
    }

    if report.total_moved() > 0 {
        OutputFormatter::summary_table(&report.moved, report.total_moved());
    } else {
        OutputFormatter::plain("\nNo files to sort.");
    }
    for line in count_lines(report) {
        OutputFormatter::plain(&line);
    }

    if dry_run {
        OutputFormatter::success("Dry run complete. No files were modified.");
        OutputFormatter::plain("Run 'bowlsort sort' (without --dry-run) to sort the files.");
    } else if report.history_saved {
        OutputFormatter::success("Sorting complete!");
        OutputFormatter::plain("History saved. Use 'bowlsort undo' to revert the moves.");
    }

    if report.has_failures() {
        OutputFormatter::error("Some files could not be sorted. Please review errors above.");
    }
}

/// Counts for files that were neither moved nor failed.
fn count_lines(report: &SortReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.unsupported > 0 {
        lines.push(format!(
            "{} {} not sorted (type not listed in ftype_sort)",
            report.unsupported,
            files_word(report.unsupported)
        ));
    }
    if report.in_place > 0 {
        lines.push(format!(
            "{} {} already in place",
            report.in_place,
            files_word(report.in_place)
        ));
    }
    if !report.pruned.is_empty() {
        lines.push(format!(
            "Removed {} empty {}",
            report.pruned.len(),
            if report.pruned.len() == 1 { "directory" } else { "directories" }
        ));
    }
    lines
}

/// `file.pdf → Finance/Tax/New name.pdf`, relative to the target directory.
fn describe_move(op: &Operation, target: &Path) -> String {
    let from = op
        .original_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy();
    let to = op.new_path.strip_prefix(target).unwrap_or(&op.new_path);
    format!("{} → {}", from, to.display())
}

/// Undoes the previous sort run.
fn undo_sort(target_dir: &Path) -> Result<(), String> {
    OutputFormatter::info("Undoing previous sort...");

    let report = UndoManager::undo(target_dir).map_err(|e| format!("Error: {}", e))?;
    OutputFormatter::success(&format!(
        "Undo complete! Restored {} {}",
        report.restored_files,
        files_word(report.restored_files)
    ));

    for backup in &report.backups {
        OutputFormatter::warning(&format!("Existing file backed up as {}", backup.display()));
    }

    if !report.skipped_files.is_empty() {
        OutputFormatter::warning(&format!("Skipped: {}", report.skipped_files.len()));
        for (path, reason) in &report.skipped_files {
            OutputFormatter::plain(&format!("    - {}: {}", path.display(), reason));
        }
    }

    if !report.failed_restores.is_empty() {
        OutputFormatter::error(&format!("Failed: {}", report.failed_restores.len()));
        for (path, reason) in &report.failed_restores {
            OutputFormatter::error(&format!("    - {}: {}", path.display(), reason));
        }
    }

    if !report.is_complete_success() {
        OutputFormatter::warning("History file was NOT deleted. Fix the issues and try again.");
    }

    Ok(())
}

fn write_dirs(config: SortConfig) -> Result<(), String> {
    let sorter = Sorter::new(config, SortOptions::default());
    let (path, count) = sorter
        .write_directory_listing()
        .map_err(|e| format!("Error: {}", e))?;
    OutputFormatter::success(&format!(
        "Listed {} {} in {}",
        count,
        if count == 1 { "directory" } else { "directories" },
        path.display()
    ));
    Ok(())
}

/// The cleaned name and the bowl it resolves to.
pub fn resolve_name(config: &SortConfig, name: &str, email: bool) -> (String, Option<String>) {
    let cleaned = config.cleaner.clean_file_name(name, None);
    let table = if email {
        &config.email_bowls
    } else {
        &config.bowls
    };
    let bowl = table.resolve(&cleaned).map(|b| b.name.clone());
    (cleaned, bowl)
}

/// The GPS bowl a `"lat,lon"` position resolves to.
pub fn resolve_position(config: &SortConfig, position: &str) -> Result<Option<String>, String> {
    let position: Coordinate = position.parse().map_err(|e| format!("Error: {}", e))?;
    Ok(config
        .gps_bowls
        .resolve(Some(position))
        .map(|b| b.name.clone()))
}

fn show_route(
    config: &SortConfig,
    name: &str,
    email: bool,
    gps: Option<&str>,
) -> Result<(), String> {
    let (cleaned, bowl) = resolve_name(config, name, email);
    OutputFormatter::plain(&format!(
        "{} → {} → {}",
        name,
        cleaned,
        bowl.as_deref().unwrap_or(TARGET_ROOT_LABEL)
    ));

    if let Some(position) = gps {
        let bowl = resolve_position(config, position)?;
        match bowl {
            Some(bowl) => OutputFormatter::plain(&format!("{} → {}", position, bowl)),
            None => OutputFormatter::warning(&format!("{}: no GPS bowl in range", position)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SortConfig {
        SortConfig::from_ini_str(
            "[TABLE]\nsourcedir = /in\ntargetdir = /out\nftype_sort = .pdf\nclean = SCAN_\n\
             [BOWLS]\nTax = Steuer\nInbox = !DEFAULT\n\
             [BOWLS_EMAIL]\nMail/Bank = sparkasse\n\
             [BOWLS_GPS]\nHome;3 = 52.1159,11.6037\n",
        )
        .unwrap()
    }

    #[test]
    fn test_parse_sort_command() {
        let cli = Cli::try_parse_from([
            "bowlsort",
            "--config",
            "rules.ini",
            "sort",
            "--dry-run",
            "--single",
            "scan.pdf",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("rules.ini")));
        assert_eq!(
            cli.command,
            SortCommand::Sort {
                dry_run: true,
                single: Some(PathBuf::from("scan.pdf")),
                prune_empty: false
            }
        );
    }

    #[test]
    fn test_log_filter_levels() {
        let quiet = Cli::try_parse_from(["bowlsort", "-q", "undo"]).unwrap();
        let verbose = Cli::try_parse_from(["bowlsort", "undo", "-vv"]).unwrap();
        let normal = Cli::try_parse_from(["bowlsort", "dirs"]).unwrap();

        assert_eq!(quiet.log_filter(), "error");
        assert_eq!(verbose.log_filter(), "debug");
        assert_eq!(normal.log_filter(), "warn");
        assert!(Cli::try_parse_from(["bowlsort", "-q", "-v", "undo"]).is_err());
    }

    #[test]
    fn test_route_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from(["bowlsort", "route", "x.jpg", "--gps", "-33.9,18.4"]).unwrap();
        assert!(matches!(cli.command, SortCommand::Route { gps: Some(ref g), .. } if g == "-33.9,18.4"));
    }

    #[test]
    fn test_resolve_name() {
        let config = config();
        assert_eq!(
            resolve_name(&config, "SCAN_Steuer.pdf", false),
            ("Steuer.pdf".to_string(), Some("Tax".to_string()))
        );
        assert_eq!(resolve_name(&config, "holiday.pdf", false).1.as_deref(), Some("Inbox"));
        assert_eq!(resolve_name(&config, "a_sparkasse.eml", true).1.as_deref(), Some("Mail/Bank"));
    }

    #[test]
    fn test_resolve_position() {
        let config = config();
        assert_eq!(
            resolve_position(&config, "52.12, 11.61").unwrap().as_deref(),
            Some("Home")
        );
        assert_eq!(resolve_position(&config, "48.1,11.5").unwrap(), None);
        assert!(resolve_position(&config, "north").is_err());
    }

    #[test]
    fn test_count_lines_report_unsorted_types() {
        let report = SortReport {
            unsupported: 2,
            in_place: 1,
            ..SortReport::default()
        };
        assert_eq!(
            count_lines(&report),
            vec![
                "2 files not sorted (type not listed in ftype_sort)".to_string(),
                "1 file already in place".to_string(),
            ]
        );
        assert!(count_lines(&SortReport::default()).is_empty());
    }
}
