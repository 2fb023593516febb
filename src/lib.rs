//! bowlsort - sort incoming files into bowls
//!
//! This library sorts the files of a source directory into destination
//! directories ("bowls") below a target directory. The rules live in an INI
//! file: bowls are matched on cleaned file names, on mail headers or on the
//! GPS position of photos. Every run is recorded so it can be undone.

pub mod bowls;
pub mod cli;
pub mod config;
pub mod file_organizer;
pub mod gps;
pub mod ini;
pub mod mail;
pub mod output;
pub mod sanitize;
pub mod sorter;
pub mod undo;

pub use bowls::BowlTable;
pub use config::{ConfigError, SortConfig};
pub use file_organizer::FileOrganizer;
pub use gps::GpsBowlTable;
pub use sorter::{SortOptions, SortReport, Sorter};
pub use undo::{UndoManager, UndoReport};

pub use cli::{Cli, SortCommand, run_cli};
