//! Archived feed-article messages.
//!
//! Thunderbird (and similar readers) archive RSS/Atom articles as `.eml`
//! files. This module turns those files into [`Message`] values:
//!
//! - [`eml`] - MIME parsing of a single message
//! - [`loader`] - input kind detection and recursive directory traversal

mod eml;
mod loader;

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

pub use loader::{collect_eml_files, read_message, InputKind};

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse EML: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error("program argument should be a directory or file with extension '.eml' or '.json': '{}'", .0.display())]
    UnsupportedInput(PathBuf),
}

/// The fields of a parsed message the entry builder consumes.
///
/// String fields are empty when the header or part is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub sender: String,
    pub html: String,
    pub text: String,
    /// `Message-ID` without angle brackets
    pub message_id: String,
    /// `Content-Base`, the article URL set by Thunderbird
    pub content_base: String,
    /// `Date` header, the article publication date
    pub date: Option<DateTime<Utc>>,
    /// Date of the most recent `Received` header
    pub received_date: Option<DateTime<Utc>>,
    pub keywords: Vec<String>,
}
