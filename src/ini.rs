//! Ordered INI reader.
//!
//! Sort rules are written in the classic ConfigParser dialect:
//!
//! ```ini
//! [TABLE]
//! sourcedir = /home/me/scans
//! targetdir = /home/me/archive
//!
//! ; a comment
//! [BOWLS_GPS]
//! Holidays/Harz;5 = 51.80,10.61; 51.75,10.55
//! ```
//!
//! Sections and keys keep their order and their case, since bowl precedence is
//! the order of declaration. Only full lines are comments: `;` inside a key or
//! value is ordinary text.

use thiserror::Error;

/// Errors produced while reading INI text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IniError {
    /// A `key = value` line appeared before the first `[SECTION]` header.
    #[error("line {line}: '{text}' is outside of any section")]
    MissingSection { line: usize, text: String },
    /// A non-comment line that is neither a header nor a key/value pair.
    #[error("line {line}: expected 'key = value', found '{text}'")]
    MalformedLine { line: usize, text: String },
    /// A `[` without the closing `]`.
    #[error("line {line}: unterminated section header '{text}'")]
    BadSectionHeader { line: usize, text: String },
}

/// One `[NAME]` block with its entries in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    /// The section name as written between the brackets.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a key (case-sensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over `(key, value)` pairs in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // A repeated key overwrites the value but keeps its first position.
    fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    fn append_line(&mut self, key: &str, line: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            if !entry.1.is_empty() {
                entry.1.push('\n');
            }
            entry.1.push_str(line);
        }
    }
}

/// A parsed INI document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ini {
    sections: Vec<Section>,
}

impl Ini {
    /// Parses INI text.
    ///
    /// Indented lines continue the value of the previous key. A section header
    /// that appears twice is merged into the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns an [`IniError`] naming the first offending line.
    pub fn parse(text: &str) -> Result<Self, IniError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut ini = Ini::default();
        let mut current: Option<usize> = None;
        let mut last_key: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() {
                last_key = None;
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let indented = raw.starts_with(|c: char| c.is_whitespace());
            if indented
                && let (Some(section), Some(key)) = (current, last_key.as_deref())
            {
                ini.sections[section].append_line(key, trimmed);
                continue;
            }

            if let Some(header) = trimmed.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .ok_or_else(|| IniError::BadSectionHeader {
                        line: line_no,
                        text: trimmed.to_string(),
                    })?
                    .trim();
                current = Some(ini.section_index_or_insert(name));
                last_key = None;
                continue;
            }

            let Some(split_at) = trimmed.find(['=', ':']) else {
                return Err(IniError::MalformedLine {
                    line: line_no,
                    text: trimmed.to_string(),
                });
            };
            let key = trimmed[..split_at].trim();
            let value = trimmed[split_at + 1..].trim();
            if key.is_empty() {
                return Err(IniError::MalformedLine {
                    line: line_no,
                    text: trimmed.to_string(),
                });
            }

            let section = current.ok_or_else(|| IniError::MissingSection {
                line: line_no,
                text: trimmed.to_string(),
            })?;
            ini.sections[section].set(key, value);
            last_key = Some(key.to_string());
        }

        Ok(ini)
    }

    fn section_index_or_insert(&mut self, name: &str) -> usize {
        if let Some(pos) = self.sections.iter().position(|s| s.name == name) {
            return pos;
        }
        self.sections.push(Section::new(name));
        self.sections.len() - 1
    }

    /// Returns the named section, if present.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Shorthand for `section(section)?.get(key)`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?.get(key)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections_and_keys_in_order() {
        let ini = Ini::parse(
            "[TABLE]\nsourcedir = /in\ntargetdir=/out\n\n[BOWLS]\nZeta = z\nAlpha = a\n",
        )
        .unwrap();

        assert_eq!(ini.get("TABLE", "sourcedir"), Some("/in"));
        assert_eq!(ini.get("TABLE", "targetdir"), Some("/out"));

        let keys: Vec<_> = ini.section("BOWLS").unwrap().entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_keys_keep_case_and_semicolons() {
        let ini = Ini::parse("[BOWLS_GPS]\nHarz Trip;2,5 = 51.8,10.6; 51.7,10.5\n").unwrap();
        let section = ini.section("BOWLS_GPS").unwrap();

        assert_eq!(section.get("Harz Trip;2,5"), Some("51.8,10.6; 51.7,10.5"));
        assert_eq!(section.get("harz trip;2,5"), None);
    }

    #[test]
    fn test_comments_and_colon_delimiter() {
        let ini = Ini::parse("# top\n[A]\n; note\nkey: value = with equals\n").unwrap();
        assert_eq!(ini.get("A", "key"), Some("value = with equals"));
    }

    #[test]
    fn test_windows_paths_are_kept_verbatim() {
        let ini = Ini::parse("[TABLE]\nsourcedir = P:\\scans\\inbox\n").unwrap();
        assert_eq!(ini.get("TABLE", "sourcedir"), Some("P:\\scans\\inbox"));
    }

    #[test]
    fn test_continuation_lines() {
        let ini = Ini::parse("[BOWLS]\nTax = invoice,\n  receipt\nOther = x\n").unwrap();
        assert_eq!(ini.get("BOWLS", "Tax"), Some("invoice,\nreceipt"));
        assert_eq!(ini.get("BOWLS", "Other"), Some("x"));
    }

    #[test]
    fn test_duplicate_key_keeps_first_position() {
        let ini = Ini::parse("[B]\none = 1\ntwo = 2\none = 3\n").unwrap();
        let entries: Vec<_> = ini.section("B").unwrap().entries().collect();
        assert_eq!(entries, vec![("one", "3"), ("two", "2")]);
    }

    #[test]
    fn test_repeated_section_is_merged() {
        let ini = Ini::parse("[A]\nx = 1\n[B]\n[A]\ny = 2\n").unwrap();
        assert_eq!(ini.sections().count(), 2);
        assert_eq!(ini.section("A").unwrap().len(), 2);
    }

    #[test]
    fn test_empty_value_is_allowed() {
        let ini = Ini::parse("[TABLE]\nclean =\n").unwrap();
        assert_eq!(ini.get("TABLE", "clean"), Some(""));
    }

    #[test]
    fn test_errors_report_line_numbers() {
        assert_eq!(
            Ini::parse("key = value\n"),
            Err(IniError::MissingSection {
                line: 1,
                text: "key = value".to_string()
            })
        );
        assert!(matches!(
            Ini::parse("[A]\njust words\n"),
            Err(IniError::MalformedLine { line: 2, .. })
        ));
        assert!(matches!(
            Ini::parse("[A\n"),
            Err(IniError::BadSectionHeader { line: 1, .. })
        ));
        assert!(matches!(
            Ini::parse("[A]\n = orphan\n"),
            Err(IniError::MalformedLine { line: 2, .. })
        ));
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let ini = Ini::parse("\u{feff}[TABLE]\na = b\n").unwrap();
        assert_eq!(ini.get("TABLE", "a"), Some("b"));
    }
}
