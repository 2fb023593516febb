//! Mail header extraction for `[BOWLS_EMAIL]` sorting.
//!
//! Saved mails are renamed to `DATE_SENDER_PROJECT_SUBJECT.ext` before they are
//! matched against the email bowls, so criteria can target senders and
//! subjects alike.

use chrono::NaiveDate;
use mail_parser::MessageParser;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static LEADING_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}\s*").expect("static pattern is valid"));

static EMAIL_DOMAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@[\w.-]+\.[a-zA-Z]{1,8}").expect("static pattern is valid"));

/// Returns true if `text` contains an address part with a domain and TLD.
///
/// ```
/// use bowlsort::mail::is_valid_email_address;
/// assert!(is_valid_email_address("billing@example.com"));
/// assert!(!is_valid_email_address("billing@localhost"));
/// ```
pub fn is_valid_email_address(text: &str) -> bool {
    EMAIL_DOMAIN.is_match(text)
}

/// Removes a `YYYY-MM-DD` prefix that mail clients or earlier runs put in
/// front of a subject.
pub fn strip_leading_date(subject: &str) -> &str {
    match LEADING_DATE.find(subject) {
        Some(m) => subject[m.end()..].trim(),
        None => subject.trim(),
    }
}

/// The header fields used to name a mail file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailHeader {
    pub date: Option<NaiveDate>,
    pub sender: String,
    pub subject: String,
}

impl MailHeader {
    /// Parses RFC 5322 message bytes.
    ///
    /// Returns `None` when the bytes do not look like a mail (no date, sender
    /// or subject header).
    pub fn from_eml_bytes(raw: &[u8]) -> Option<Self> {
        let message = MessageParser::default().parse(raw)?;

        let date = message.date().and_then(|d| {
            NaiveDate::from_ymd_opt(i32::from(d.year), u32::from(d.month), u32::from(d.day))
        });

        let sender = message
            .from()
            .and_then(|addr| addr.first())
            .and_then(|a| {
                a.address()
                    .filter(|address| is_valid_email_address(address))
                    .or_else(|| a.name())
            })
            .unwrap_or_default()
            .to_string();

        let subject = message.subject().unwrap_or_default().to_string();

        if date.is_none() && sender.is_empty() && subject.is_empty() {
            return None;
        }
        Some(Self {
            date,
            sender,
            subject,
        })
    }

    /// Reads the header of a saved mail.
    ///
    /// Only `.eml` files are decoded; other formats (such as Outlook `.msg`)
    /// yield `Ok(None)` so the caller falls back to the file name.
    pub fn read(path: &Path) -> std::io::Result<Option<Self>> {
        let is_eml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"));
        if !is_eml {
            return Ok(None);
        }
        let raw = fs::read(path)?;
        Ok(Self::from_eml_bytes(&raw))
    }

    /// Builds `DATE_SENDER_PROJECT_SUBJECT<extension>`.
    ///
    /// `extension` includes its dot. Missing parts stay empty so the field
    /// positions are stable.
    pub fn file_name(&self, project: &str, extension: &str) -> String {
        let date = self
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        format!(
            "{}_{}_{}_{}{}",
            date,
            self.sender,
            project,
            strip_leading_date(&self.subject),
            extension
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &[u8] = b"From: Stadtwerke Billing <billing@stadtwerke.example.com>\r\n\
To: me@example.org\r\n\
Subject: 2024-03-01 Invoice March\r\n\
Date: Fri, 01 Mar 2024 09:15:00 +0100\r\n\
\r\n\
Please find attached your invoice.\r\n";

    #[test]
    fn test_header_from_eml_bytes() {
        let header = MailHeader::from_eml_bytes(SAMPLE).expect("sample should parse");

        assert_eq!(header.date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(header.sender, "billing@stadtwerke.example.com");
        assert_eq!(header.subject, "2024-03-01 Invoice March");
    }

    #[test]
    fn test_file_name_strips_subject_date() {
        let header = MailHeader::from_eml_bytes(SAMPLE).unwrap();
        assert_eq!(
            header.file_name("Renovation", ".eml"),
            "2024-03-01_billing@stadtwerke.example.com_Renovation_Invoice March.eml"
        );
    }

    #[test]
    fn test_file_name_with_missing_parts() {
        let header = MailHeader {
            date: None,
            sender: String::new(),
            subject: "Hello".to_string(),
        };
        assert_eq!(header.file_name("P", ".eml"), "__P_Hello.eml");
    }

    #[test]
    fn test_sender_without_address_uses_display_name() {
        let raw = b"From: Front Desk\r\nSubject: Visitor\r\n\r\nbody\r\n";
        let header = MailHeader::from_eml_bytes(raw).unwrap();
        assert_eq!(header.subject, "Visitor");
        assert!(header.date.is_none());
    }

    #[test]
    fn test_strip_leading_date() {
        assert_eq!(strip_leading_date("2024-01-31   Statement"), "Statement");
        assert_eq!(strip_leading_date("Statement 2024-01-31"), "Statement 2024-01-31");
        assert_eq!(strip_leading_date(""), "");
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email_address("a.b-c@mail.example.de"));
        assert!(is_valid_email_address("Name <x@y.org>"));
        assert!(!is_valid_email_address("no address"));
        assert!(!is_valid_email_address("x@y"));
    }

    #[test]
    fn test_read_only_decodes_eml() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let eml = temp_dir.path().join("mail.EML");
        let msg = temp_dir.path().join("mail.msg");
        fs::write(&eml, SAMPLE).expect("Failed to write eml");
        fs::write(&msg, SAMPLE).expect("Failed to write msg");

        assert!(MailHeader::read(&eml).unwrap().is_some());
        assert!(MailHeader::read(&msg).unwrap().is_none());
        assert!(MailHeader::read(&temp_dir.path().join("missing.eml")).is_err());
    }
}
