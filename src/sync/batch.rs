use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Range;
use thiserror::Error;
use tokio::sync::mpsc;

use super::retry::{retry, RetryPolicy};
use crate::model::Entry;
use crate::storage::{DatabaseError, EntryStore, EntryWrite};

/// Default number of entries per store call.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum SyncError {
    /// An entry without identity reached the synchronizer; nothing was written
    #[error("entry #{index} has an empty identity hash")]
    EmptyIdentity { index: usize },

    #[error("batch failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: DatabaseError,
    },
}

/// Outcome of an upsert run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries handed to the store in committed batches
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
}

/// Contiguous index ranges of at most `batch_size` covering `0..len`.
///
/// A zero batch size is treated as one.
pub fn partition(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let size = batch_size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Indices of `items` grouped by key, groups ordered by first appearance.
fn group_indices<T, K, F>(items: &[T], key: F) -> Vec<(K, Vec<usize>)>
where
    K: Eq + Hash + Copy,
    F: Fn(&T) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<usize>)> = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let k = key(item);
        match positions.get(&k) {
            Some(&pos) => groups[pos].1.push(i),
            None => {
                positions.insert(k, groups.len());
                groups.push((k, vec![i]));
            }
        }
    }

    groups
}

fn check_identities(entries: &[Entry]) -> Result<(), SyncError> {
    match entries.iter().position(|e| e.hash.is_empty()) {
        Some(index) => Err(SyncError::EmptyIdentity { index }),
        None => Ok(()),
    }
}

/// Applies entries to an [`EntryStore`] in bounded, independently retried
/// batches.
///
/// Batches committed before a failure stay committed; re-running the same
/// input is safe because the store reconciles by identity hash.
pub struct BatchSynchronizer<'s, S: EntryStore + ?Sized> {
    store: &'s S,
    batch_size: usize,
    policy: RetryPolicy,
    progress_tx: Option<mpsc::Sender<(usize, usize)>>,
}

impl<'s, S: EntryStore + ?Sized> BatchSynchronizer<'s, S> {
    pub fn new(store: &'s S, batch_size: usize, policy: RetryPolicy) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            policy,
            progress_tx: None,
        }
    }

    /// Report `(processed, total)` after every committed batch.
    pub fn with_progress(mut self, progress_tx: mpsc::Sender<(usize, usize)>) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    /// Insert new entries and, when `overwrite`, update existing ones.
    ///
    /// Entries are regrouped by `(user, feed)` in order of first appearance
    /// and each group is cut into batches. Store ids of written entries are
    /// copied back into `entries`.
    pub async fn sync_upsert(
        &self,
        entries: &mut [Entry],
        overwrite: bool,
    ) -> Result<SyncReport, SyncError> {
        check_identities(entries)?;

        let total = entries.len();
        let mut report = SyncReport::default();

        for ((user_id, feed_id), indices) in group_indices(entries, |e| (e.user_id, e.feed_id)) {
            for range in partition(indices.len(), self.batch_size) {
                let batch_indices = &indices[range];

                let writes = {
                    let batch: Vec<&Entry> = batch_indices.iter().map(|&i| &entries[i]).collect();
                    let batch = batch.as_slice();
                    let store = self.store;
                    retry("upsert entries", &self.policy, move || {
                        store.refresh_feed_entries(user_id, feed_id, batch, overwrite)
                    })
                    .await
                    .map_err(|source| SyncError::RetriesExhausted {
                        attempts: self.policy.attempts(),
                        source,
                    })?
                };

                for (&i, write) in batch_indices.iter().zip(&writes) {
                    if let Some(id) = write.id() {
                        entries[i].id = id;
                    }
                    match write {
                        EntryWrite::Inserted(_) => report.inserted += 1,
                        EntryWrite::Updated(_) => report.updated += 1,
                        EntryWrite::Unchanged => {}
                    }
                }

                report.processed += batch_indices.len();
                tracing::debug!(user_id, feed_id, processed = report.processed, total, "Batch committed");
                self.report_progress(report.processed, total).await;
            }
        }

        Ok(report)
    }

    /// Remove the store's copies of `entries`, matched by user and identity
    /// hash. Returns the number of rows removed.
    pub async fn sync_delete(&self, entries: &[Entry]) -> Result<u64, SyncError> {
        check_identities(entries)?;

        let total = entries.len();
        let mut processed = 0;
        let mut removed = 0;

        for (user_id, indices) in group_indices(entries, |e| e.user_id) {
            for range in partition(indices.len(), self.batch_size) {
                let batch_indices = &indices[range];
                let hashes: Vec<String> = batch_indices
                    .iter()
                    .map(|&i| entries[i].hash.clone())
                    .collect();
                let hashes = hashes.as_slice();
                let store = self.store;

                removed += retry("delete entries", &self.policy, move || {
                    store.delete_entries_by_hash(user_id, hashes)
                })
                .await
                .map_err(|source| SyncError::RetriesExhausted {
                    attempts: self.policy.attempts(),
                    source,
                })?;

                processed += batch_indices.len();
                self.report_progress(processed, total).await;
            }
        }

        Ok(removed)
    }

    async fn report_progress(&self, processed: usize, total: usize) {
        if let Some(tx) = &self.progress_tx {
            if tx.send((processed, total)).await.is_err() {
                tracing::debug!("Progress receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryStatus;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records calls and fails the first `failures` of them.
    #[derive(Default)]
    struct ScriptedStore {
        failures: AtomicU32,
        upserts: Mutex<Vec<(i64, i64, Vec<String>)>>,
        deletes: Mutex<Vec<(i64, Vec<String>)>>,
        next_id: AtomicU32,
    }

    impl ScriptedStore {
        fn failing(times: u32) -> Self {
            Self {
                failures: AtomicU32::new(times),
                ..Default::default()
            }
        }

        fn take_failure(&self) -> Result<(), DatabaseError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(DatabaseError::InstanceLocked);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl EntryStore for ScriptedStore {
        async fn refresh_feed_entries(
            &self,
            user_id: i64,
            feed_id: i64,
            entries: &[&Entry],
            _overwrite: bool,
        ) -> Result<Vec<EntryWrite>, DatabaseError> {
            self.take_failure()?;
            self.upserts.lock().unwrap().push((
                user_id,
                feed_id,
                entries.iter().map(|e| e.hash.clone()).collect(),
            ));
            Ok(entries
                .iter()
                .map(|_| EntryWrite::Inserted(i64::from(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)))
                .collect())
        }

        async fn delete_entries_by_hash(
            &self,
            user_id: i64,
            hashes: &[String],
        ) -> Result<u64, DatabaseError> {
            self.take_failure()?;
            self.deletes.lock().unwrap().push((user_id, hashes.to_vec()));
            Ok(hashes.len() as u64)
        }
    }

    fn entry(user_id: i64, feed_id: i64, hash: &str) -> Entry {
        let ts = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        Entry {
            id: 0,
            user_id,
            feed_id,
            hash: hash.to_string(),
            title: hash.to_string(),
            url: format!("https://example.com/{hash}"),
            author: String::new(),
            content: String::new(),
            published_at: ts,
            created_at: ts,
            changed_at: ts,
            status: EntryStatus::Unread,
            reading_time: 0,
            tags: Vec::new(),
            enclosures: Vec::new(),
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_secs(10))
    }

    #[test]
    fn test_partition_example() {
        assert_eq!(partition(2500, 1000), vec![0..1000, 1000..2000, 2000..2500]);
        assert_eq!(partition(0, 1000), Vec::<Range<usize>>::new());
        assert_eq!(partition(3, 0), vec![0..1, 1..2, 2..3]);
    }

    proptest! {
        #[test]
        fn prop_partition_covers_in_order(len in 0usize..5000, size in 1usize..1500) {
            let ranges = partition(len, size);
            prop_assert_eq!(ranges.len(), len.div_ceil(size));

            let mut next = 0;
            for r in &ranges {
                prop_assert_eq!(r.start, next);
                prop_assert!(r.end > r.start);
                prop_assert!(r.end - r.start <= size);
                next = r.end;
            }
            prop_assert_eq!(next, len);
        }
    }

    #[test]
    fn test_group_indices_keeps_first_appearance_order() {
        let items = [3, 1, 3, 2, 1];
        let groups = group_indices(&items, |&x| x);
        assert_eq!(
            groups,
            vec![(3, vec![0, 2]), (1, vec![1, 4]), (2, vec![3])]
        );
    }

    #[tokio::test]
    async fn test_upsert_batches_by_feed() {
        let store = ScriptedStore::default();
        let sync = BatchSynchronizer::new(&store, 2, fast_policy(1));
        let mut entries = vec![
            entry(1, 10, "a"),
            entry(1, 20, "b"),
            entry(1, 10, "c"),
            entry(1, 10, "d"),
        ];

        let report = sync.sync_upsert(&mut entries, false).await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                processed: 4,
                inserted: 4,
                updated: 0
            }
        );

        let calls = store.upserts.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                (1, 10, vec!["a".to_string(), "c".to_string()]),
                (1, 10, vec!["d".to_string()]),
                (1, 20, vec!["b".to_string()]),
            ]
        );
        assert!(entries.iter().all(|e| e.id > 0));
    }

    #[tokio::test]
    async fn test_empty_identity_rejected_before_any_write() {
        let store = ScriptedStore::default();
        let sync = BatchSynchronizer::new(&store, 10, fast_policy(1));
        let mut entries = vec![entry(1, 10, "a"), entry(1, 10, "")];

        let err = sync.sync_upsert(&mut entries, false).await.unwrap_err();
        assert!(matches!(err, SyncError::EmptyIdentity { index: 1 }));
        assert!(store.upserts.lock().unwrap().is_empty());

        let err = sync.sync_delete(&entries).await.unwrap_err();
        assert!(matches!(err, SyncError::EmptyIdentity { index: 1 }));
        assert!(store.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_retried_until_success() {
        let store = ScriptedStore::failing(2);
        let sync = BatchSynchronizer::new(&store, 10, fast_policy(3));
        let mut entries = vec![entry(1, 10, "a")];

        let report = sync.sync_upsert(&mut entries, false).await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(store.upserts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_keep_earlier_batches() {
        let store = ScriptedStore::default();
        let sync = BatchSynchronizer::new(&store, 1, fast_policy(2));
        let mut entries = vec![entry(1, 10, "a"), entry(1, 10, "b")];

        // First batch succeeds, then the store starts failing.
        sync.sync_upsert(&mut entries[..1], false).await.unwrap();
        store.failures.store(u32::MAX, Ordering::SeqCst);

        let err = sync.sync_upsert(&mut entries[1..], false).await.unwrap_err();
        match err {
            SyncError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(matches!(source, DatabaseError::InstanceLocked));
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(store.upserts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_batches_by_user() {
        let store = ScriptedStore::default();
        let sync = BatchSynchronizer::new(&store, 2, fast_policy(1));
        let entries = vec![
            entry(1, 10, "a"),
            entry(2, 30, "x"),
            entry(1, 20, "b"),
            entry(1, 10, "c"),
        ];

        let removed = sync.sync_delete(&entries).await.unwrap();
        assert_eq!(removed, 4);
        assert_eq!(
            store.deletes.lock().unwrap().clone(),
            vec![
                (1, vec!["a".to_string(), "b".to_string()]),
                (1, vec!["c".to_string()]),
                (2, vec!["x".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_progress_reported_per_batch() {
        let store = ScriptedStore::default();
        let (tx, mut rx) = mpsc::channel(16);
        let sync = BatchSynchronizer::new(&store, 2, fast_policy(1)).with_progress(tx);
        let mut entries: Vec<Entry> = (0..5).map(|i| entry(1, 10, &format!("h{i}"))).collect();

        sync.sync_upsert(&mut entries, false).await.unwrap();
        drop(sync);

        let mut seen = Vec::new();
        while let Some(update) = rx.recv().await {
            seen.push(update);
        }
        assert_eq!(seen, vec![(2, 5), (4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn test_empty_input_is_a_noop() {
        let store = ScriptedStore::default();
        let sync = BatchSynchronizer::new(&store, 10, fast_policy(1));
        let report = sync.sync_upsert(&mut [], true).await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(sync.sync_delete(&[]).await.unwrap(), 0);
    }
}
