//! Sort configuration loaded from an INI file.
//!
//! The file describes where files come from, where the bowls live, which
//! file types take part and how names are cleaned:
//!
//! ```ini
//! [TABLE]
//! sourcedir = /home/me/scans
//! targetdir = /home/me/archive
//! ftype_sort = .pdf,.eml,.jpg
//! ftype_delete = .txt,.xml
//! clean = SCAN_
//! clean_nocase = copy of
//! trash = DRAFT
//! trash_nocase = thumbs
//!
//! [SETTINGS]
//! overwrite = false
//! gps_moved_unmatched = true
//!
//! [ITEMS]
//! gps_default_distancekm = 2,5
//!
//! [REPLACEMENTS]
//! Rechnung = Invoice
//!
//! [BOWLS]
//! Finance/Tax = Finanzamt,Steuer
//! Inbox = !DEFAULT
//! ```

use crate::bowls::BowlTable;
use crate::gps::{DEFAULT_DISTANCE_KM, GpsBowlTable, GpsError, parse_decimal};
use crate::ini::{Ini, IniError};
use crate::sanitize::{NameCleaner, normalize_separators};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// File name looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = "bowlsort.ini";

/// Errors that can occur while loading a sort configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly given configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// No configuration file was given and none was discovered.
    #[error(
        "No configuration found: pass --config or create ./bowlsort.ini or ~/.config/bowlsort/config.ini"
    )]
    NoConfigFound,
    /// The INI text could not be parsed.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(#[from] IniError),
    /// A required key is absent or empty.
    #[error("Missing required key '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },
    /// A key holds a value of the wrong shape.
    #[error("Invalid value '{value}' for '{key}' in section [{section}]: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
    /// A `[BOWLS_GPS]` entry cannot be used.
    #[error("Invalid GPS bowl: {0}")]
    Gps(#[from] GpsError),
    /// A cleanup entry could not be compiled.
    #[error("Invalid cleanup pattern: {0}")]
    Pattern(#[from] regex::Error),
    /// IO error while reading the configuration.
    #[error("IO error reading configuration {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// `[SETTINGS]` switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Replace an existing destination instead of adding a `_N` suffix.
    pub overwrite: bool,
    /// Photos without a GPS fix or GPS bowl continue to the name bowls.
    pub gps_moved_unmatched: bool,
    /// Convert Arabic-Indic digits while cleaning names.
    pub convert_numerals: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overwrite: false,
            gps_moved_unmatched: false,
            convert_numerals: true,
        }
    }
}

/// Everything a sort run needs, resolved from the INI file.
#[derive(Debug, Clone)]
pub struct SortConfig {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    /// Lowercased suffixes of the files to sort.
    pub sort_types: Vec<String>,
    /// Lowercased suffixes deleted from sortable subdirectories.
    pub delete_types: Vec<String>,
    pub trash: Vec<String>,
    /// Lowercased.
    pub trash_nocase: Vec<String>,
    pub cleaner: NameCleaner,
    pub settings: Settings,
    pub bowls: BowlTable,
    pub email_bowls: BowlTable,
    pub gps_bowls: GpsBowlTable,
    warnings: Vec<String>,
}

impl SortConfig {
    /// Load the configuration.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `bowlsort.ini` in the current directory
    /// 3. Look for `~/.config/bowlsort/config.ini` in home directory
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigFound`] when nothing is found, or the
    /// error of the file that was picked.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("bowlsort")
                .join("config.ini");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Err(ConfigError::NoConfigFound)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::Io` if file cannot be read.
    /// Returns any error of [`SortConfig::from_ini_str`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(path = %path.display(), "loading configuration");
        Self::from_ini_str(&content)
    }

    /// Builds a configuration from INI text.
    ///
    /// # Errors
    ///
    /// Fails on malformed INI, a missing `[TABLE]` key, an unparsable
    /// boolean, distance or GPS radius.
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let ini = Ini::parse(text)?;
        let mut warnings = Vec::new();

        let source_dir = PathBuf::from(normalize_separators(required(&ini, "TABLE", "sourcedir")?));
        let target_dir = PathBuf::from(normalize_separators(required(&ini, "TABLE", "targetdir")?));
        let sort_types = lowercase(split_list(required(&ini, "TABLE", "ftype_sort")?));
        let delete_types = lowercase(split_list(optional(&ini, "TABLE", "ftype_delete")));
        let clean = split_list(optional(&ini, "TABLE", "clean"));
        let clean_nocase = split_list(optional(&ini, "TABLE", "clean_nocase"));
        let trash = split_list(optional(&ini, "TABLE", "trash"));
        let trash_nocase = lowercase(split_list(optional(&ini, "TABLE", "trash_nocase")));

        let defaults = Settings::default();
        let settings = Settings {
            overwrite: boolean(&ini, "SETTINGS", "overwrite", defaults.overwrite)?,
            gps_moved_unmatched: boolean(
                &ini,
                "SETTINGS",
                "gps_moved_unmatched",
                defaults.gps_moved_unmatched,
            )?,
            convert_numerals: boolean(
                &ini,
                "SETTINGS",
                "convert_numerals",
                defaults.convert_numerals,
            )?,
        };

        let default_distance_km = match ini.get("ITEMS", "gps_default_distancekm") {
            Some(raw) if !raw.trim().is_empty() => parse_decimal(raw)
                .filter(|v| *v >= 0.0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    section: "ITEMS".to_string(),
                    key: "gps_default_distancekm".to_string(),
                    value: raw.to_string(),
                    reason: "expected a non-negative number of kilometres".to_string(),
                })?,
            _ => DEFAULT_DISTANCE_KM,
        };

        let replacements: Vec<(String, String)> = ini
            .section("REPLACEMENTS")
            .map(|s| s.entries().map(|(k, v)| (k.to_string(), v.to_string())).collect())
            .unwrap_or_default();

        let cleaner = NameCleaner::new(
            &clean,
            &clean_nocase,
            &replacements,
            settings.convert_numerals,
        )?;

        let bowls = BowlTable::from_entries(section_entries(&ini, "BOWLS"), &mut warnings);
        let email_bowls =
            BowlTable::from_entries(section_entries(&ini, "BOWLS_EMAIL"), &mut warnings);
        let gps_bowls = GpsBowlTable::from_entries(
            section_entries(&ini, "BOWLS_GPS"),
            default_distance_km,
            &mut warnings,
        )?;

        if sort_types.is_empty() {
            warnings.push("[TABLE] ftype_sort lists no file types; nothing will be sorted".into());
        }

        debug!(
            bowls = bowls.len(),
            email_bowls = email_bowls.len(),
            gps_bowls = gps_bowls.iter().count(),
            "configuration parsed"
        );

        Ok(Self {
            source_dir,
            target_dir,
            sort_types,
            delete_types,
            trash,
            trash_nocase,
            cleaner,
            settings,
            bowls,
            email_bowls,
            gps_bowls,
            warnings,
        })
    }

    /// Non-fatal problems: parse warnings plus bowls that can never match
    /// and competing defaults.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.warnings.clone();
        warnings.extend(self.bowls.lint("BOWLS"));
        warnings.extend(self.email_bowls.lint("BOWLS_EMAIL"));
        warnings.extend(self.gps_bowls.lint());
        if self.target_dir == self.source_dir {
            warnings.push("[TABLE] sourcedir and targetdir are the same directory".to_string());
        }
        warnings
    }

    /// Returns true if the file name ends with one of the `ftype_sort` suffixes.
    pub fn is_sortable(&self, file_name: &str) -> bool {
        has_suffix(file_name, &self.sort_types)
    }

    /// Returns true if the file name ends with one of the `ftype_delete` suffixes.
    pub fn is_deletable(&self, file_name: &str) -> bool {
        has_suffix(file_name, &self.delete_types)
    }

    /// Returns true if the name contains a `trash` entry (case-sensitive) or a
    /// `trash_nocase` entry (case-insensitive).
    pub fn is_trash(&self, file_name: &str) -> bool {
        if self.trash.iter().any(|t| file_name.contains(t.as_str())) {
            return true;
        }
        let lower = file_name.to_lowercase();
        self.trash_nocase.iter().any(|t| lower.contains(t.as_str()))
    }

    /// The target directory's base name, used in mail file names.
    pub fn project_name(&self) -> String {
        self.target_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn has_suffix(file_name: &str, suffixes: &[String]) -> bool {
    let lower = file_name.to_lowercase();
    suffixes.iter().any(|s| lower.ends_with(s.as_str()))
}

fn required<'a>(ini: &'a Ini, section: &str, key: &str) -> Result<&'a str> {
    ini.get(section, key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn optional<'a>(ini: &'a Ini, section: &str, key: &str) -> &'a str {
    ini.get(section, key).unwrap_or_default()
}

fn boolean(ini: &Ini, section: &str, key: &str, default: bool) -> Result<bool> {
    let Some(raw) = ini.get(section, key).map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected true/false, yes/no, on/off or 1/0".to_string(),
        }),
    }
}

fn section_entries<'a>(ini: &'a Ini, name: &str) -> Vec<(&'a str, &'a str)> {
    ini.section(name)
        .map(|s| s.entries().collect())
        .unwrap_or_default()
}

/// Splits a comma list (continuation lines count as separators too).
fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn lowercase(values: Vec<String>) -> Vec<String> {
    values.into_iter().map(|v| v.to_lowercase()).collect()
}
