use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{Message, MessageError};

/// What the positional input path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A single `.eml` file
    Eml,
    /// A directory searched recursively for `.eml` files
    Directory,
    /// A JSON dump of previously built entries
    Json,
}

impl InputKind {
    pub fn detect(path: &Path) -> Result<Self, MessageError> {
        let metadata = std::fs::metadata(path)?;
        if metadata.is_dir() {
            return Ok(InputKind::Directory);
        }

        if has_extension(path, "eml") {
            Ok(InputKind::Eml)
        } else if has_extension(path, "json") {
            Ok(InputKind::Json)
        } else {
            Err(MessageError::UnsupportedInput(path.to_path_buf()))
        }
    }

    /// Whether building entries from this input needs a user and a feed.
    pub fn needs_feed(&self) -> bool {
        matches!(self, InputKind::Eml | InputKind::Directory)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Recursively collect `.eml` files under `dir`, sorted by path.
///
/// Unreadable directory entries are logged and skipped.
pub fn collect_eml_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for item in WalkDir::new(dir).sort_by_file_name() {
        match item {
            Ok(entry) => {
                if entry.file_type().is_file() && has_extension(entry.path(), "eml") {
                    files.push(entry.into_path());
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                    error = %e,
                    "FS error, skipping"
                );
            }
        }
    }

    files
}

/// Read and parse one `.eml` file.
pub fn read_message(path: &Path) -> Result<Message, MessageError> {
    let raw = std::fs::read(path)?;
    Message::parse(&raw)
}
