use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

use super::content::{alternate_link, extract_body, sanitize, truncate_text};
use super::{reading_time, rewrite};
use crate::feed::{FeedResolver, Resolution};
use crate::message::Message;
use crate::model::{Entry, EntryStatus, Feed, User};

/// Suffix Thunderbird appends to the entry URL to form a Message-ID.
const MESSAGE_ID_SUFFIX: &str = "@localhost.localdomain";

/// Maximum title length, in characters, when falling back to the body.
const TITLE_FALLBACK_CHARS: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The feed map routes this URL to `none`
    #[error("entry ignored by feed map")]
    Ignored,

    #[error("cannot find feed for entry URL: {url}")]
    FeedNotFound { url: String },

    #[error("message has neither a Message-ID nor a URL")]
    MissingIdentity,
}

impl BuildError {
    /// Ignored entries are dropped without a diagnostic and are not counted
    /// as failures.
    pub fn is_silent(&self) -> bool {
        matches!(self, BuildError::Ignored)
    }
}

/// How built entries get their feed.
#[derive(Debug, Clone)]
pub enum FeedAssignment {
    /// Every entry goes to one feed
    Fixed(Arc<Feed>),
    /// Per-entry lookup through feed-map rules
    Mapped(FeedResolver),
}

impl FeedAssignment {
    fn feed_for(&self, url: &str) -> Result<Arc<Feed>, BuildError> {
        match self {
            FeedAssignment::Fixed(feed) => Ok(Arc::clone(feed)),
            FeedAssignment::Mapped(resolver) => match resolver.resolve(url) {
                Resolution::Feed(feed) => Ok(Arc::clone(feed)),
                Resolution::Ignore => Err(BuildError::Ignored),
                Resolution::NotFound => Err(BuildError::FeedNotFound {
                    url: url.to_string(),
                }),
            },
        }
    }
}

/// Turns parsed messages into entries owned by one user.
pub struct EntryBuilder<'a> {
    user: &'a User,
    assignment: &'a FeedAssignment,
}

impl<'a> EntryBuilder<'a> {
    pub fn new(user: &'a User, assignment: &'a FeedAssignment) -> Self {
        Self { user, assignment }
    }

    pub fn build(&self, message: &Message) -> Result<Entry, BuildError> {
        self.build_at(message, Utc::now())
    }

    /// Build with an explicit wall clock, used when the message carries no
    /// received date.
    pub fn build_at(&self, message: &Message, now: DateTime<Utc>) -> Result<Entry, BuildError> {
        let url = entry_url(message);
        let feed = self.assignment.feed_for(&url)?;

        let hash = entry_hash(message, &url);
        if hash.is_empty() {
            return Err(BuildError::MissingIdentity);
        }

        let created_at = message.received_date.unwrap_or(now);
        let published_at = message
            .date
            .map_or(created_at, |date| date.min(created_at));

        let body = if message.html.is_empty() {
            message.text.clone()
        } else {
            extract_body(&message.html)
        };
        let rewritten = rewrite::rewrite(&body, &feed.rewrite_rules);
        let content = sanitize(&url, &rewritten).trim().to_string();

        let title = entry_title(message, &content, &url);
        let reading_time = reading_time::estimate(&content, self.user);

        Ok(Entry {
            id: 0,
            user_id: self.user.id,
            feed_id: feed.id,
            hash,
            title,
            url,
            author: message.sender.clone(),
            content,
            published_at,
            created_at,
            changed_at: created_at,
            status: EntryStatus::Unread,
            reading_time,
            tags: message.keywords.clone(),
            enclosures: Vec::new(),
        })
    }
}

/// `Content-Base` when present, else the first alternate link in the HTML.
pub fn entry_url(message: &Message) -> String {
    let base = message.content_base.trim();
    if !base.is_empty() {
        return base.to_string();
    }
    alternate_link(&message.html).unwrap_or_default()
}

/// SHA-256 hex of the Message-ID (Thunderbird suffix removed), or of the URL
/// when there is no Message-ID. Empty when both are empty.
pub fn entry_hash(message: &Message, url: &str) -> String {
    let message_id = message.message_id.trim();
    let key = if message_id.is_empty() {
        url.trim()
    } else {
        message_id.strip_suffix(MESSAGE_ID_SUFFIX).unwrap_or(message_id)
    };

    if key.is_empty() {
        return String::new();
    }
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

fn entry_title(message: &Message, content: &str, url: &str) -> String {
    let subject = message.subject.trim();
    if !subject.is_empty() {
        return subject.to_string();
    }

    let excerpt = truncate_text(content, TITLE_FALLBACK_CHARS);
    if !excerpt.is_empty() {
        return excerpt;
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedIndex;
    use crate::model::{DEFAULT_CJK_READING_SPEED, DEFAULT_READING_SPEED};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn user() -> User {
        User {
            id: 3,
            username: "john".to_string(),
            default_reading_speed: DEFAULT_READING_SPEED,
            cjk_reading_speed: DEFAULT_CJK_READING_SPEED,
        }
    }

    fn feed(id: i64, url: &str, rewrite_rules: &str) -> Feed {
        Feed {
            id,
            user_id: 3,
            title: format!("Feed {id}"),
            feed_url: url.to_string(),
            rewrite_rules: rewrite_rules.to_string(),
        }
    }

    fn fixed() -> FeedAssignment {
        FeedAssignment::Fixed(Arc::new(feed(10, "https://xkcd.com/rss.xml", "")))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn message() -> Message {
        Message {
            subject: "Urban Planning".to_string(),
            sender: "Randall <r@xkcd.com>".to_string(),
            html: "<html><body><p>Comic</p></body></html>".to_string(),
            message_id: "https://xkcd.com/2468/@localhost.localdomain".to_string(),
            content_base: "https://xkcd.com/2468/".to_string(),
            keywords: vec!["comics".to_string()],
            ..Default::default()
        }
    }

    fn sha(value: &str) -> String {
        format!("{:x}", Sha256::digest(value.as_bytes()))
    }

    #[test]
    fn test_build_basic_entry() {
        let assignment = fixed();
        let user = user();
        let entry = EntryBuilder::new(&user, &assignment)
            .build_at(&message(), now())
            .unwrap();

        assert_eq!(entry.user_id, 3);
        assert_eq!(entry.feed_id, 10);
        assert_eq!(entry.title, "Urban Planning");
        assert_eq!(entry.url, "https://xkcd.com/2468/");
        assert_eq!(entry.author, "Randall <r@xkcd.com>");
        assert_eq!(entry.content, "<p>Comic</p>");
        assert_eq!(entry.status, EntryStatus::Unread);
        assert_eq!(entry.tags, vec!["comics".to_string()]);
        assert!(entry.enclosures.is_empty());
        assert_eq!(entry.reading_time, 1);
    }

    #[test]
    fn test_hash_strips_thunderbird_suffix() {
        let url = "https://mirror.example/unrelated";
        assert_eq!(entry_hash(&message(), url), sha("https://xkcd.com/2468/"));

        let mut other = message();
        other.message_id = "abc@example.org".to_string();
        assert_eq!(entry_hash(&other, url), sha("abc@example.org"));
    }

    proptest! {
        #[test]
        fn prop_hash_depends_only_on_message_id(
            content_base in "(https://[a-z]{1,12}\\.example/[a-z0-9/]{0,16})?",
            html in "[ -~]{0,120}",
            text in "[ -~]{0,120}",
        ) {
            let assignment = fixed();
            let user = user();
            let builder = EntryBuilder::new(&user, &assignment);

            let mut msg = message();
            msg.content_base = content_base;
            msg.html = html;
            msg.text = text;

            let entry = builder.build_at(&msg, now()).unwrap();
            prop_assert_eq!(entry.hash, sha("https://xkcd.com/2468/"));
        }

        #[test]
        fn prop_hash_without_message_id_is_url_hash(
            url in "https://[a-z]{1,12}\\.example/[a-z0-9/]{0,16}",
            html in "[ -~]{0,120}",
            text in "[ -~]{0,120}",
        ) {
            let assignment = fixed();
            let user = user();
            let builder = EntryBuilder::new(&user, &assignment);

            let mut msg = message();
            msg.message_id.clear();
            msg.content_base = url.clone();
            msg.html = html;
            msg.text = text;

            let entry = builder.build_at(&msg, now()).unwrap();
            prop_assert_eq!(entry.hash, sha(&url));
        }
    }

    #[test]
    fn test_hash_falls_back_to_url() {
        let mut msg = message();
        msg.message_id.clear();
        assert_eq!(entry_hash(&msg, "https://a.example/1"), sha("https://a.example/1"));
        assert_eq!(entry_hash(&msg, ""), "");
    }

    #[test]
    fn test_hash_is_stable_across_builds() {
        let assignment = fixed();
        let user = user();
        let builder = EntryBuilder::new(&user, &assignment);
        let first = builder.build_at(&message(), now()).unwrap();
        let second = builder
            .build_at(&message(), now() + Duration::days(30))
            .unwrap();
        assert_eq!(first.hash, second.hash);
        assert_eq!(first.hash.len(), 64);
    }

    #[test]
    fn test_url_falls_back_to_alternate_link() {
        let mut msg = message();
        msg.content_base.clear();
        msg.html = r#"<body><div class="feedEntryContent">x</div>
<div class="feedEntryLinks"><ul class="feedEntryAlternateLinks"><li><a href="https://b.example/post">p</a></li></ul></div></body>"#
            .to_string();
        assert_eq!(entry_url(&msg), "https://b.example/post");
    }

    #[test]
    fn test_missing_identity() {
        let mut msg = message();
        msg.message_id.clear();
        msg.content_base.clear();

        let assignment = fixed();
        let user = user();
        let err = EntryBuilder::new(&user, &assignment)
            .build_at(&msg, now())
            .unwrap_err();
        assert_eq!(err, BuildError::MissingIdentity);
        assert!(!err.is_silent());
    }

    #[test]
    fn test_title_fallback_uses_body_text() {
        let mut msg = message();
        msg.subject.clear();
        msg.html = "<body>Hello world this is a test</body>".to_string();

        let assignment = fixed();
        let user = user();
        let entry = EntryBuilder::new(&user, &assignment)
            .build_at(&msg, now())
            .unwrap();
        assert_eq!(entry.title, "Hello world this is a test");
    }

    #[test]
    fn test_title_fallback_truncates_to_100_chars() {
        let mut msg = message();
        msg.subject.clear();
        msg.html = format!("<body><p>{}</p></body>", "a".repeat(250));

        let assignment = fixed();
        let user = user();
        let entry = EntryBuilder::new(&user, &assignment)
            .build_at(&msg, now())
            .unwrap();
        assert_eq!(entry.title, "a".repeat(100));
    }

    #[test]
    fn test_title_falls_back_to_url_for_empty_body() {
        let mut msg = message();
        msg.subject.clear();
        msg.html.clear();

        let assignment = fixed();
        let user = user();
        let entry = EntryBuilder::new(&user, &assignment)
            .build_at(&msg, now())
            .unwrap();
        assert_eq!(entry.title, "https://xkcd.com/2468/");
    }

    #[test]
    fn test_plain_text_body_used_without_html() {
        let mut msg = message();
        msg.html.clear();
        msg.text = "Just text".to_string();

        let assignment = fixed();
        let user = user();
        let entry = EntryBuilder::new(&user, &assignment)
            .build_at(&msg, now())
            .unwrap();
        assert_eq!(entry.content, "Just text");
    }

    #[test]
    fn test_timestamps_use_received_date_and_clamp_publication() {
        let received = Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap();
        let mut msg = message();
        msg.received_date = Some(received);
        msg.date = Some(received + Duration::hours(5));

        let assignment = fixed();
        let user = user();
        let entry = EntryBuilder::new(&user, &assignment)
            .build_at(&msg, now())
            .unwrap();
        assert_eq!(entry.created_at, received);
        assert_eq!(entry.changed_at, received);
        assert_eq!(entry.published_at, received);

        msg.date = Some(received - Duration::days(1));
        let entry = EntryBuilder::new(&user, &assignment)
            .build_at(&msg, now())
            .unwrap();
        assert_eq!(entry.published_at, received - Duration::days(1));
    }

    #[test]
    fn test_timestamps_default_to_now() {
        let assignment = fixed();
        let user = user();
        let entry = EntryBuilder::new(&user, &assignment)
            .build_at(&message(), now())
            .unwrap();
        assert_eq!(entry.created_at, now());
        assert_eq!(entry.published_at, now());
        assert!(entry.published_at <= entry.created_at);
    }

    #[test]
    fn test_feed_rewrite_rules_applied() {
        let assignment = FeedAssignment::Fixed(Arc::new(feed(
            10,
            "https://xkcd.com/rss.xml",
            r#"replace("Comic"|"Strip")"#,
        )));
        let user = user();
        let entry = EntryBuilder::new(&user, &assignment)
            .build_at(&message(), now())
            .unwrap();
        assert_eq!(entry.content, "<p>Strip</p>");
    }

    #[test]
    fn test_mapped_assignment_outcomes() {
        let index = FeedIndex::from_feeds(vec![
            feed(10, "https://xkcd.com/rss.xml", ""),
            feed(11, "https://devblogs.microsoft.com/feed/", ""),
        ]);
        let map = "\
xkcd.com => https://xkcd.com/rss.xml
blogs.technet.com => none
";
        let resolver = FeedResolver::parse(map, &index).unwrap();
        let assignment = FeedAssignment::Mapped(resolver);
        let user = user();
        let builder = EntryBuilder::new(&user, &assignment);

        assert_eq!(builder.build_at(&message(), now()).unwrap().feed_id, 10);

        let mut ignored = message();
        ignored.content_base = "http://blogs.technet.com/x".to_string();
        let err = builder.build_at(&ignored, now()).unwrap_err();
        assert_eq!(err, BuildError::Ignored);
        assert!(err.is_silent());

        let mut unmapped = message();
        unmapped.content_base = "https://elsewhere.example/1".to_string();
        assert_eq!(
            builder.build_at(&unmapped, now()).unwrap_err(),
            BuildError::FeedNotFound {
                url: "https://elsewhere.example/1".to_string()
            }
        );
    }
}
