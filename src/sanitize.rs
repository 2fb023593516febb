//! Filename cleanup.
//!
//! Incoming files carry scanner prefixes, vendor noise and characters that are
//! not allowed on every filesystem. The helpers here turn such a name into the
//! name a file will have inside its bowl.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Characters removed from every file stem.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static pattern is valid"));

/// Escapes a configured string so it can be used as a literal regex pattern.
pub fn escape_pattern(text: &str) -> String {
    regex::escape(text)
}

/// Converts Arabic-Indic and extended Arabic-Indic digits to ASCII digits.
///
/// Phone cameras with an Arabic locale write names like `IMG_٢٠٢٥٠٥٠٥.jpg`.
///
/// ```
/// use bowlsort::sanitize::convert_numerals;
/// assert_eq!(convert_numerals("IMG_٢٠٢٥.jpg"), "IMG_2025.jpg");
/// assert_eq!(convert_numerals("۱۲۳"), "123");
/// ```
pub fn convert_numerals(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            _ => c,
        })
        .collect()
}

/// Splits a name into stem and extension (including the dot).
///
/// Only the last path component is considered and leading dots do not start
/// an extension, so `.bashrc` has none and `a/b.c/d` has none either.
pub fn split_extension(name: &str) -> (&str, &str) {
    let base_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let base = &name[base_start..];
    let leading_dots = base.len() - base.trim_start_matches('.').len();

    match base.rfind('.') {
        Some(dot) if dot >= leading_dots => name.split_at(base_start + dot),
        _ => (name, ""),
    }
}

/// Normalises a configured path: backslashes become slashes and repeated
/// separators collapse. A leading `//` (UNC share) is kept.
pub fn normalize_separators(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let unc = unified.starts_with("//");
    let mut out = String::with_capacity(unified.len());
    let mut prev_slash = false;
    for c in unified.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        out.push(c);
    }
    if unc {
        out.insert(0, '/');
    }
    out
}

/// A bowl name as a path relative to the target directory.
///
/// Separators are normalised; empty, `.` and `..` parts are dropped, so the
/// result never starts at the filesystem root or climbs out of the target.
///
/// ```
/// use bowlsort::sanitize::relative_bowl_path;
/// assert_eq!(relative_bowl_path("\\Finance\\Tax\\"), "Finance/Tax");
/// assert_eq!(relative_bowl_path("../Photos/./Home"), "Photos/Home");
/// ```
pub fn relative_bowl_path(name: &str) -> String {
    normalize_separators(name)
        .split('/')
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect::<Vec<_>>()
        .join("/")
}

/// True when a configured bowl name would leave the target directory if
/// used as is: it is absolute or has a `..` part.
pub fn escapes_target(name: &str) -> bool {
    let normalized = normalize_separators(name);
    normalized.starts_with('/') || normalized.split('/').any(|part| part.trim() == "..")
}

/// Removes characters that produce invalid file names and tidies whitespace.
///
/// ```
/// use bowlsort::sanitize::clean_file_string;
/// assert_eq!(clean_file_string("scan  <draft>?.pdf"), "scan draft.pdf");
/// assert_eq!(clean_file_string("filename."), "filename");
/// ```
pub fn clean_file_string(name: &str) -> String {
    let name = name.trim();
    let (stem, ext) = split_extension(name);
    // A lone trailing dot is not an extension worth keeping.
    let ext = if ext == "." { "" } else { ext.trim() };

    format!("{}{}", clean_stem(stem), ext)
}

fn clean_stem(stem: &str) -> String {
    let stem: String = stem.chars().filter(|c| !INVALID_CHARS.contains(c)).collect();
    let stem = WHITESPACE_RUN.replace_all(stem.trim(), " ");
    stem.trim_end_matches('.').trim().to_string()
}

/// The configured cleanup rules applied to every sorted file name.
#[derive(Debug, Clone, Default)]
pub struct NameCleaner {
    remove: Vec<String>,
    remove_nocase: Vec<Regex>,
    replacements: Vec<(String, String)>,
    convert_numerals: bool,
}

impl NameCleaner {
    /// Builds a cleaner. Empty entries in any list are ignored.
    ///
    /// # Errors
    ///
    /// Returns the regex error if a case-insensitive pattern cannot be compiled
    /// (only possible for pathologically large entries).
    pub fn new(
        remove: &[String],
        remove_nocase: &[String],
        replacements: &[(String, String)],
        convert_numerals: bool,
    ) -> Result<Self, regex::Error> {
        let remove_nocase = remove_nocase
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| {
                RegexBuilder::new(&escape_pattern(s))
                    .case_insensitive(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            remove: remove.iter().filter(|s| !s.is_empty()).cloned().collect(),
            remove_nocase,
            replacements: replacements
                .iter()
                .filter(|(from, _)| !from.is_empty())
                .cloned()
                .collect(),
            convert_numerals,
        })
    }

    /// Cleans `file`, optionally naming it after the directory it was found in.
    ///
    /// The stem is taken from `subdir`'s last component when given, otherwise
    /// from `file`; the extension always comes from `file`. Rules run in the
    /// order numerals, case-sensitive removals, case-insensitive removals,
    /// replacements, and finally the character cleanup of
    /// [`clean_file_string`].
    pub fn clean_file_name(&self, file: &str, subdir: Option<&str>) -> String {
        let (file_stem, ext) = split_extension(file);
        let mut stem = match subdir {
            Some(dir) => {
                let dir = dir.trim_end_matches(['/', '\\']);
                dir.rsplit(['/', '\\']).next().unwrap_or(dir).to_string()
            }
            None => file_stem.to_string(),
        };

        if self.convert_numerals {
            stem = convert_numerals(&stem);
        }
        for needle in &self.remove {
            stem = stem.replace(needle.as_str(), "");
        }
        for pattern in &self.remove_nocase {
            stem = pattern.replace_all(&stem, "").into_owned();
        }
        for (from, to) in &self.replacements {
            stem = stem.replace(from.as_str(), to);
        }

        format!("{}{}", clean_stem(&stem), ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cleaner(remove: &[&str], nocase: &[&str], replacements: &[(&str, &str)]) -> NameCleaner {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let replacements: Vec<_> = replacements
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        NameCleaner::new(&owned(remove), &owned(nocase), &replacements, true).unwrap()
    }

    #[test]
    fn test_escape_pattern() {
        assert_eq!(escape_pattern("file.txt"), r"file\.txt");
        assert_eq!(escape_pattern("[test]"), r"\[test\]");
        assert_eq!(escape_pattern("simple"), "simple");
        assert_eq!(escape_pattern(""), "");
    }

    #[rstest]
    #[case("٢٠٢٥٠٥٠٥_١٠٠١٣٧", "20250505_100137")]
    #[case("IMG_٢٠٢٥.jpg", "IMG_2025.jpg")]
    #[case("٠١٢٣٤٥٦٧٨٩", "0123456789")]
    #[case("۰۱۲۳۴۵۶۷۸۹", "0123456789")]
    #[case("test123", "test123")]
    #[case("", "")]
    fn test_convert_numerals(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(convert_numerals(input), expected);
    }

    #[rstest]
    #[case("report.pdf", ("report", ".pdf"))]
    #[case("archive.tar.gz", ("archive.tar", ".gz"))]
    #[case(".bashrc", (".bashrc", ""))]
    #[case("..hidden.txt", ("..hidden", ".txt"))]
    #[case("noext", ("noext", ""))]
    #[case("dir.d/noext", ("dir.d/noext", ""))]
    #[case("trailing.", ("trailing", "."))]
    fn test_split_extension(#[case] input: &str, #[case] expected: (&str, &str)) {
        assert_eq!(split_extension(input), expected);
    }

    #[rstest]
    #[case("file<>:\"/\\|?*name.txt", "filename.txt")]
    #[case("file   name.txt", "file name.txt")]
    #[case("filename.", "filename")]
    #[case("  filename  .txt  ", "filename.txt")]
    #[case("filename", "filename")]
    #[case("", "")]
    #[case("my.file.name.txt", "my.file.name.txt")]
    #[case("Invoice 2024..pdf", "Invoice 2024.pdf")]
    fn test_clean_file_string(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(clean_file_string(input), expected);
    }

    #[rstest]
    #[case("C:\\scans\\\\inbox", "C:/scans/inbox")]
    #[case("/home//me///docs", "/home/me/docs")]
    #[case("\\\\nas\\share", "//nas/share")]
    #[case("Finance\\Tax", "Finance/Tax")]
    fn test_normalize_separators(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_separators(input), expected);
    }

    #[rstest]
    #[case("Finance/Tax", "Finance/Tax", false)]
    #[case("\\Finance", "Finance", true)]
    #[case("/Finance//Tax/", "Finance/Tax", true)]
    #[case("Photos/../../etc", "Photos/etc", true)]
    #[case("./Inbox", "Inbox", false)]
    fn test_relative_bowl_path(#[case] input: &str, #[case] expected: &str, #[case] escapes: bool) {
        assert_eq!(relative_bowl_path(input), expected);
        assert_eq!(escapes_target(input), escapes);
    }

    #[test]
    fn test_clean_file_name_basic() {
        assert_eq!(cleaner(&[], &[], &[]).clean_file_name("test.txt", None), "test.txt");
        assert_eq!(cleaner(&[], &[], &[]).clean_file_name("", None), "");
    }

    #[test]
    fn test_clean_file_name_numerals_can_be_disabled() {
        let keep = NameCleaner::new(&[], &[], &[], false).unwrap();
        assert_eq!(keep.clean_file_name("test١٢٣.txt", None), "test١٢٣.txt");
        assert_eq!(
            cleaner(&[], &[], &[]).clean_file_name("test١٢٣.txt", None),
            "test123.txt"
        );
    }

    #[test]
    fn test_clean_file_name_removals() {
        assert_eq!(
            cleaner(&["ABC"], &[], &[]).clean_file_name("testABCtest.txt", None),
            "testtest.txt"
        );
        assert_eq!(
            cleaner(&["abc"], &[], &[]).clean_file_name("testABCtest.txt", None),
            "testABCtest.txt"
        );
        assert_eq!(
            cleaner(&[], &["abc"], &[]).clean_file_name("testABCtest.txt", None),
            "testtest.txt"
        );
        // Regex metacharacters in entries are literal.
        assert_eq!(
            cleaner(&[], &["[scan].v1"], &[]).clean_file_name("Letter [SCAN].V1.pdf", None),
            "Letter.pdf"
        );
    }

    #[test]
    fn test_clean_file_name_replacements_in_order() {
        let c = cleaner(&[], &[], &[("test", "demo"), ("old", "new"), ("demo_new", "final")]);
        assert_eq!(c.clean_file_name("test_old.txt", None), "final.txt");
    }

    #[test]
    fn test_clean_file_name_from_subdirectory() {
        let c = cleaner(&[], &[], &[]);
        assert_eq!(c.clean_file_name("test.txt", Some("subdir١٢٣")), "subdir123.txt");
        assert_eq!(
            c.clean_file_name("x.pdf", Some("/in/Contract Smith/")),
            "Contract Smith.pdf"
        );
    }

    #[test]
    fn test_clean_file_name_all_features() {
        let c = cleaner(&["ABC"], &[], &[("test", "demo")]);
        assert_eq!(
            c.clean_file_name("test<>:\"\\|?*١٢٣ABC.txt", None),
            "demo123.txt"
        );
    }

    #[test]
    fn test_clean_file_name_cleans_dotted_stems() {
        let c = cleaner(&[], &[], &[]);
        assert_eq!(
            c.clean_file_name("Re: v1.2: notes?.eml", None),
            "Re v1.2 notes.eml"
        );
    }

    #[test]
    fn test_clean_file_name_keeps_last_extension_only() {
        let c = cleaner(&[], &[], &[]);
        assert_eq!(c.clean_file_name("test.tar.gz", None), "test.tar.gz");
    }
}
