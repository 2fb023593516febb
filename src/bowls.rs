//! Name-based bowl matching.
//!
//! A bowl is a destination directory under the target directory. Each bowl
//! lists substrings; a file goes into the first bowl (in declaration order)
//! whose substring occurs in its cleaned name. A bowl whose list contains
//! `!DEFAULT` catches everything no other bowl claimed.
//!
//! # Examples
//!
//! ```
//! use bowlsort::bowls::BowlTable;
//!
//! let table = BowlTable::from_entries(
//!     [("Finance/Tax", "Finanzamt,Steuer"), ("Inbox", "!DEFAULT")],
//!     &mut Vec::new(),
//! );
//! assert_eq!(table.resolve("2024_Finanzamt_Bescheid.pdf").unwrap().name, "Finance/Tax");
//! assert_eq!(table.resolve("holiday.pdf").unwrap().name, "Inbox");
//! ```

use crate::sanitize::{escapes_target, relative_bowl_path};

/// Marker placed in a criteria list to declare the fallback bowl.
pub const DEFAULT_MARKER: &str = "!DEFAULT";

/// A named destination with its substring criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bowl {
    /// Directory path relative to the target directory, `/`-separated.
    pub name: String,
    /// Substrings, trimmed, in declaration order. Never contains empty entries.
    pub criteria: Vec<String>,
    /// True when the criteria list carries [`DEFAULT_MARKER`].
    pub is_default: bool,
}

impl Bowl {
    /// Parses a bowl from its INI key and comma-separated criteria list.
    ///
    /// Continuation lines are separators too, and a comma closing a line
    /// that continues is allowed. Other empty entries (`a,,b` or a trailing
    /// comma) are dropped and reported in `warnings`, since an empty
    /// substring would match every file. A name that would leave the target
    /// directory is made relative and reported.
    pub fn parse(name: &str, criteria: &str, warnings: &mut Vec<String>) -> Self {
        let name = bowl_name(name, warnings);
        let is_default = criteria.contains(DEFAULT_MARKER);

        let mut parsed = Vec::new();
        if !is_default {
            let lines: Vec<&str> = criteria
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            let last = lines.len().saturating_sub(1);
            let mut has_empty = false;
            for (i, line) in lines.iter().copied().enumerate() {
                let line = if i < last {
                    line.strip_suffix(',').unwrap_or(line)
                } else {
                    line
                };
                for entry in line.split(',').map(str::trim) {
                    if entry.is_empty() {
                        has_empty = true;
                    } else {
                        parsed.push(entry.to_string());
                    }
                }
            }
            if has_empty {
                warnings.push(format!(
                    "bowl '{}' has an empty criteria entry in '{}'",
                    name, criteria
                ));
            }
        }

        Self {
            name,
            criteria: parsed,
            is_default,
        }
    }

    /// Returns true if any criterion occurs in `candidate` (case-sensitive).
    ///
    /// Default bowls never match on their own criteria.
    pub fn matches(&self, candidate: &str) -> bool {
        !self.is_default && self.criteria.iter().any(|c| candidate.contains(c.as_str()))
    }
}

/// The ordered bowls of one INI section (`BOWLS` or `BOWLS_EMAIL`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BowlTable {
    bowls: Vec<Bowl>,
}

impl BowlTable {
    /// Builds a table from `(bowl name, criteria list)` pairs in file order.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
        warnings: &mut Vec<String>,
    ) -> Self {
        let bowls = entries
            .into_iter()
            .map(|(name, criteria)| Bowl::parse(name, criteria, warnings))
            .collect();
        Self { bowls }
    }

    /// Finds the bowl for a cleaned file name.
    ///
    /// The first non-default bowl with a matching criterion wins. Without a
    /// match the default bowl is used (the last one declared, if several are).
    /// `None` means the file belongs in the target directory itself.
    pub fn resolve(&self, name: &str) -> Option<&Bowl> {
        self.bowls
            .iter()
            .find(|bowl| bowl.matches(name))
            .or_else(|| self.default_bowl())
    }

    /// The fallback bowl, if one is declared.
    pub fn default_bowl(&self) -> Option<&Bowl> {
        self.bowls.iter().rev().find(|bowl| bowl.is_default)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bowl> {
        self.bowls.iter()
    }

    pub fn len(&self) -> usize {
        self.bowls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bowls.is_empty()
    }

    /// Structural problems worth a warning: bowls that can never match and
    /// competing default bowls.
    pub fn lint(&self, section: &str) -> Vec<String> {
        let mut warnings: Vec<String> = self
            .bowls
            .iter()
            .filter(|b| !b.is_default && b.criteria.is_empty())
            .map(|b| format!("[{}] bowl '{}' has no criteria and never matches", section, b.name))
            .collect();

        let defaults: Vec<&str> = self
            .bowls
            .iter()
            .filter(|b| b.is_default)
            .map(|b| b.name.as_str())
            .collect();
        if defaults.len() > 1 {
            warnings.push(format!(
                "[{}] several default bowls ({}); '{}' is used",
                section,
                defaults.join(", "),
                defaults[defaults.len() - 1]
            ));
        }
        warnings
    }
}

/// Bowl names are paths below the target directory, never above it.
pub(crate) fn bowl_name(raw: &str, warnings: &mut Vec<String>) -> String {
    let name = relative_bowl_path(raw);
    if escapes_target(raw) {
        warnings.push(format!(
            "bowl '{}' points outside the target directory; using '{}'",
            raw.trim(),
            name
        ));
    }
    name
}
