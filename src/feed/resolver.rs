use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::index::{FeedIndex, RuleTarget};
use crate::model::Feed;

const SEPARATOR: &str = "=>";

/// Why a single feed-map line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleLineError {
    #[error("expected exactly one => separator")]
    Separator,
    #[error("entry URL is missing")]
    EmptyPattern,
    #[error("feed URL is missing")]
    EmptyTarget,
    #[error("cannot find feed with URL: {0}")]
    UnknownFeed(String),
}

#[derive(Debug, Error)]
pub enum RuleParseError {
    #[error("cannot read feed map file: {0}")]
    Io(#[from] std::io::Error),

    /// `line` is 1-based
    #[error("wrong feed map line #{line}: {reason}: {text}")]
    Line {
        line: usize,
        text: String,
        reason: RuleLineError,
    },
}

/// One `substring => feed-url|none` mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRule {
    pub pattern: String,
    pub target: RuleTarget,
}

/// Outcome of resolving an entry URL against the feed map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    Feed(&'a Arc<Feed>),
    Ignore,
    NotFound,
}

/// Ordered URL-substring rules; the first rule whose pattern occurs in the
/// entry URL wins, so operators put more specific patterns first.
#[derive(Debug, Clone, Default)]
pub struct FeedResolver {
    rules: Vec<FeedRule>,
}

impl FeedResolver {
    /// Read and parse a feed-map file.
    pub fn load(path: &Path, index: &FeedIndex) -> Result<Self, RuleParseError> {
        let content = std::fs::read_to_string(path)?;
        let resolver = Self::parse(&content, index)?;
        tracing::info!(path = %path.display(), rules = resolver.rules.len(), "Loaded feed map");
        Ok(resolver)
    }

    /// Parse feed-map text. Any bad line rejects the whole map.
    pub fn parse(content: &str, index: &FeedIndex) -> Result<Self, RuleParseError> {
        let mut rules = Vec::new();

        for (i, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let rule = parse_rule(line, index).map_err(|reason| RuleParseError::Line {
                line: i + 1,
                text: raw.to_string(),
                reason,
            })?;
            rules.push(rule);
        }

        Ok(Self { rules })
    }

    pub fn resolve(&self, entry_url: &str) -> Resolution<'_> {
        let matched = self
            .rules
            .iter()
            .find(|rule| entry_url.contains(rule.pattern.as_str()));

        match matched {
            Some(FeedRule {
                target: RuleTarget::Feed(feed),
                ..
            }) => Resolution::Feed(feed),
            Some(FeedRule {
                target: RuleTarget::Ignore,
                ..
            }) => Resolution::Ignore,
            None => Resolution::NotFound,
        }
    }

    pub fn rules(&self) -> &[FeedRule] {
        &self.rules
    }
}

fn parse_rule(line: &str, index: &FeedIndex) -> Result<FeedRule, RuleLineError> {
    let parts: Vec<&str> = line.split(SEPARATOR).collect();
    let [pattern, target] = parts.as_slice() else {
        return Err(RuleLineError::Separator);
    };

    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(RuleLineError::EmptyPattern);
    }

    let target = target.trim();
    if target.is_empty() {
        return Err(RuleLineError::EmptyTarget);
    }

    let target = index
        .rule_target(target)
        .ok_or_else(|| RuleLineError::UnknownFeed(target.to_string()))?;

    Ok(FeedRule {
        pattern: pattern.to_string(),
        target,
    })
}
