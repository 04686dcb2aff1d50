use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{Feed, User};
use crate::storage::{Database, DatabaseError};

/// Feed-map token meaning "drop matching messages without a diagnostic".
pub const IGNORE_TOKEN: &str = "none";

#[derive(Debug, Error)]
pub enum FeedIndexError {
    #[error("cannot load feeds from DB: {0}")]
    Load(#[from] DatabaseError),
}

/// Immutable lookup of a user's feeds by URL and by id.
///
/// The URL map also holds the synthetic [`IGNORE_TOKEN`] key mapped to no
/// feed, so rule targets can be resolved with a single lookup.
#[derive(Debug, Clone, Default)]
pub struct FeedIndex {
    by_url: HashMap<String, Option<Arc<Feed>>>,
    by_id: HashMap<i64, Arc<Feed>>,
}

/// What a feed-map rule points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    Feed(Arc<Feed>),
    Ignore,
}

impl FeedIndex {
    /// Load every feed owned by `user`. Zero feeds is a valid, empty index.
    pub async fn load(db: &Database, user: &User) -> Result<Self, FeedIndexError> {
        let feeds = db.feeds(user.id).await?;
        tracing::debug!(user = %user.username, feeds = feeds.len(), "Loaded feed index");
        Ok(Self::from_feeds(feeds))
    }

    pub fn from_feeds(feeds: Vec<Feed>) -> Self {
        let mut by_url = HashMap::with_capacity(feeds.len() + 1);
        let mut by_id = HashMap::with_capacity(feeds.len());

        by_url.insert(IGNORE_TOKEN.to_string(), None);
        for feed in feeds {
            let feed = Arc::new(feed);
            by_url.insert(feed.feed_url.clone(), Some(Arc::clone(&feed)));
            by_id.insert(feed.id, feed);
        }

        Self { by_url, by_id }
    }

    pub fn feed_by_url(&self, feed_url: &str) -> Option<&Arc<Feed>> {
        self.by_url.get(feed_url).and_then(Option::as_ref)
    }

    pub fn feed_by_id(&self, feed_id: i64) -> Option<&Arc<Feed>> {
        self.by_id.get(&feed_id)
    }

    /// Resolve the right-hand side of a feed-map rule.
    pub fn rule_target(&self, value: &str) -> Option<RuleTarget> {
        match self.by_url.get(value)? {
            Some(feed) => Some(RuleTarget::Feed(Arc::clone(feed))),
            None => Some(RuleTarget::Ignore),
        }
    }

    /// Number of real feeds (the ignore token is not counted)
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
