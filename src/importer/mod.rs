//! Run orchestration: load → build → mark read → dump → remove → upsert.
//!
//! Stage lines go to stdout; diagnostics go through `tracing`.

mod collect;
mod dump;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::entry::{EntryBuilder, FeedAssignment};
use crate::feed::{FeedIndex, FeedResolver};
use crate::message::InputKind;
use crate::model::{mark_all_read, Entry};
use crate::storage::Database;
use crate::sync::{BatchSynchronizer, RetryPolicy, SyncReport};

pub use collect::{build_entries, keep_identified, ImportStats, PROGRESS_EVERY};
pub use dump::{load_entries, write_entries, DumpError};

/// Where entries come from and what to do with them.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub input: PathBuf,
    pub kind: InputKind,
    /// Owner of the built entries; required for EML input
    pub username: Option<String>,
    /// Every EML entry goes to this feed
    pub feed_url: Option<String>,
    /// Per-entry feed rules; takes precedence over `feed_url`
    pub feed_map: Option<PathBuf>,
    pub mark_read: bool,
    /// Overwrite entries already stored with the same hash
    pub update: bool,
    /// Delete matching stored entries before inserting
    pub remove: bool,
    /// Build (and optionally dump) without touching the store
    pub dry_run: bool,
    pub quiet: bool,
    pub dump: Option<PathBuf>,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

/// What a run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub stats: ImportStats,
    pub removed: u64,
    pub sync: SyncReport,
}

pub struct Importer<'db> {
    db: &'db Database,
    options: ImportOptions,
    progress_tx: Option<mpsc::Sender<(usize, usize)>>,
}

impl<'db> Importer<'db> {
    pub fn new(db: &'db Database, options: ImportOptions) -> Self {
        Self {
            db,
            options,
            progress_tx: None,
        }
    }

    /// Forward store progress `(processed, total)` to `progress_tx`.
    pub fn with_progress(mut self, progress_tx: mpsc::Sender<(usize, usize)>) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    pub async fn run(self) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();

        println!("Loading entries...");
        let (mut entries, stats) = self.load().await.context("unable to load entries")?;
        summary.stats = stats;
        println!("Loading entries completed.");
        println!("Loaded entries: {}", entries.len());
        tracing::info!(
            read = stats.read,
            built = stats.built,
            ignored = stats.ignored,
            failed = stats.failed,
            "Import statistics"
        );

        if self.options.mark_read {
            mark_all_read(&mut entries);
        }

        if let Some(path) = &self.options.dump {
            println!("Dumping to JSON...");
            write_entries(path, &entries)
                .with_context(|| format!("cannot dump entries to '{}'", path.display()))?;
            println!("Dumping to JSON completed.");
        }

        if self.options.dry_run {
            tracing::info!("Dry run, database left untouched");
            return Ok(summary);
        }

        let mut sync =
            BatchSynchronizer::new(self.db, self.options.batch_size, self.options.retry.clone());
        if let Some(tx) = &self.progress_tx {
            sync = sync.with_progress(tx.clone());
        }

        if self.options.remove {
            println!("Removal from DB...");
            summary.removed = sync
                .sync_delete(&entries)
                .await
                .context("cannot remove entries from database")?;
            println!("Removal from DB completed.");
            tracing::info!(removed = summary.removed, "Removed stored entries");
        }

        println!("Insertion into DB...");
        summary.sync = sync
            .sync_upsert(&mut entries, self.options.update)
            .await
            .context("cannot update entries in database")?;
        println!("Total inserted entries: {}", summary.sync.inserted);
        println!("Insertion into DB completed.");

        Ok(summary)
    }

    async fn load(&self) -> Result<(Vec<Entry>, ImportStats)> {
        let input = &self.options.input;

        if !self.options.kind.needs_feed() {
            let dumped = load_entries(input)
                .with_context(|| format!("cannot read entries from '{}'", input.display()))?;
            return Ok(keep_identified(dumped, self.options.quiet));
        }

        let username = self
            .options
            .username
            .as_deref()
            .context("a user name is required for EML input")?;
        let user = self
            .db
            .user_by_username(username)
            .await
            .with_context(|| format!("unable to retrieve user by name '{username}'"))?;
        let index = FeedIndex::load(self.db, &user)
            .await
            .context("cannot create feed index")?;
        let assignment = self.feed_assignment(&index)?;

        let builder = EntryBuilder::new(&user, &assignment);
        Ok(build_entries(
            input,
            self.options.kind,
            &builder,
            self.options.quiet,
        ))
    }

    fn feed_assignment(&self, index: &FeedIndex) -> Result<FeedAssignment> {
        if let Some(map) = &self.options.feed_map {
            let resolver = FeedResolver::load(map, index).context("cannot load feed map file")?;
            return Ok(FeedAssignment::Mapped(resolver));
        }

        let feed_url = self
            .options
            .feed_url
            .as_deref()
            .context("either a feed URL or a feed map is required for EML input")?;
        let feed = index
            .feed_by_url(feed_url)
            .cloned()
            .with_context(|| format!("cannot find feed with URL: {feed_url}"))?;
        Ok(FeedAssignment::Fixed(feed))
    }
}
