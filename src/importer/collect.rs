use std::path::{Path, PathBuf};

use crate::entry::EntryBuilder;
use crate::message::{collect_eml_files, read_message, InputKind};
use crate::model::Entry;

/// A progress line is logged after this many files.
pub const PROGRESS_EVERY: usize = 1000;

/// Per-run message counters. Ignored messages are never failures.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub read: usize,
    pub built: usize,
    pub ignored: usize,
    pub failed: usize,
}

/// Build entries from a single `.eml` file or every `.eml` under a
/// directory. Bad messages are logged (unless `quiet`) and skipped.
pub fn build_entries(
    path: &Path,
    kind: InputKind,
    builder: &EntryBuilder<'_>,
    quiet: bool,
) -> (Vec<Entry>, ImportStats) {
    let files: Vec<PathBuf> = match kind {
        InputKind::Directory => collect_eml_files(path),
        _ => vec![path.to_path_buf()],
    };
    let total = files.len();

    let mut entries = Vec::with_capacity(total);
    let mut stats = ImportStats::default();

    for file in &files {
        stats.read += 1;

        match read_message(file) {
            Ok(message) => match builder.build(&message) {
                Ok(entry) => {
                    entries.push(entry);
                    stats.built += 1;
                }
                Err(e) if e.is_silent() => stats.ignored += 1,
                Err(e) => {
                    stats.failed += 1;
                    if !quiet {
                        tracing::warn!(path = %file.display(), error = %e, "Skipping message");
                    }
                }
            },
            Err(e) => {
                stats.failed += 1;
                if !quiet {
                    tracing::warn!(path = %file.display(), error = %e, "Cannot read message");
                }
            }
        }

        if stats.read % PROGRESS_EVERY == 0 {
            tracing::info!(processed = stats.read, total, "Processed files");
        }
    }

    (entries, stats)
}

/// Keep dumped entries that carry an identity hash. Entries without one are
/// logged (unless `quiet`) and counted as failures.
pub fn keep_identified(dumped: Vec<Entry>, quiet: bool) -> (Vec<Entry>, ImportStats) {
    let mut stats = ImportStats {
        read: dumped.len(),
        ..Default::default()
    };

    let entries: Vec<Entry> = dumped
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            if entry.hash.is_empty() {
                stats.failed += 1;
                if !quiet {
                    tracing::warn!(index, url = %entry.url, "Skipping entry without identity hash");
                }
                None
            } else {
                Some(entry)
            }
        })
        .collect();

    stats.built = entries.len();
    (entries, stats)
}
