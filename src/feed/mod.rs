//! Feed lookup and routing of messages to feeds.
//!
//! - [`index`] - a user's feeds, looked up by URL or id
//! - [`resolver`] - the operator's feed map: ordered URL-substring rules that
//!   route an entry URL to a feed, to "ignore", or to nothing

mod index;
mod resolver;

pub use index::{FeedIndex, FeedIndexError, RuleTarget, IGNORE_TOKEN};
pub use resolver::{FeedResolver, FeedRule, Resolution, RuleLineError, RuleParseError};
