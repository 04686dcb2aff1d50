//! Entry building.
//!
//! - [`builder`] - message to entry conversion, identity hashing, timestamps
//! - [`content`] - body extraction, tag stripping, sanitizing
//! - [`rewrite`] - feed-scoped content rewrite rules
//! - [`reading_time`] - reading-time estimate

pub mod builder;
pub mod content;
pub mod reading_time;
pub mod rewrite;

pub use builder::{entry_hash, entry_url, BuildError, EntryBuilder, FeedAssignment};
