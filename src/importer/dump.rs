use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use crate::model::Entry;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("cannot access dump file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid entry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read a JSON array of entries written by [`write_entries`].
pub fn load_entries(path: &Path) -> Result<Vec<Entry>, DumpError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_entries(path: &Path, entries: &[Entry]) -> Result<(), DumpError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, entries)?;
    writer.flush()?;
    Ok(())
}
