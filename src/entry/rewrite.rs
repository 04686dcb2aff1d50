//! Feed-scoped content rewrite rules.
//!
//! A feed carries a comma separated rule list such as
//! `nl2br, replace("foo"|"bar")`. Rules run in order over the extracted
//! body before sanitizing. Unknown or malformed rules are skipped.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Turn newlines into `<br>`
    Nl2br,
    /// Wrap bare `http(s)://` URLs in anchors
    ConvertTextLinks,
    /// Regex substitution, `$1` style group references allowed
    Replace { pattern: String, replacement: String },
}

fn rule_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)([a-z_0-9]+)(?:\("((?:[^"\\]|\\.)*)"(?:\|"((?:[^"\\]|\\.)*)")?\))?"#)
            .expect("rewrite rule pattern is valid")
    })
}

fn text_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(^|[\s>(])(https?://[^\s<>"')]+)"#).expect("text link pattern is valid")
    })
}

/// Parse a rule list. Names are case-insensitive.
pub fn parse_rules(rules: &str) -> Vec<Rule> {
    let mut parsed = Vec::new();

    for caps in rule_re().captures_iter(rules) {
        let name = caps[1].to_ascii_lowercase();
        let arg = |i: usize| caps.get(i).map(|m| unescape(m.as_str()));

        match name.as_str() {
            "nl2br" => parsed.push(Rule::Nl2br),
            "convert_text_link" | "convert_text_links" => parsed.push(Rule::ConvertTextLinks),
            "replace" => match arg(2) {
                Some(pattern) if !pattern.is_empty() => parsed.push(Rule::Replace {
                    pattern,
                    replacement: arg(3).unwrap_or_default(),
                }),
                _ => tracing::debug!(rule = %name, "Rewrite rule without a pattern, skipping"),
            },
            other => tracing::debug!(rule = other, "Unknown rewrite rule, skipping"),
        }
    }

    parsed
}

/// Apply `rules` (the feed's raw rule string) to `content`.
pub fn rewrite(content: &str, rules: &str) -> String {
    if rules.trim().is_empty() {
        return content.to_string();
    }

    parse_rules(rules)
        .iter()
        .fold(content.to_string(), |acc, rule| apply(rule, &acc))
}

fn apply(rule: &Rule, content: &str) -> String {
    match rule {
        Rule::Nl2br => content.replace("\r\n", "\n").replace('\n', "<br>"),
        Rule::ConvertTextLinks => text_link_re()
            .replace_all(content, r#"${1}<a href="${2}">${2}</a>"#)
            .into_owned(),
        Rule::Replace {
            pattern,
            replacement,
        } => match Regex::new(pattern) {
            Ok(re) => re.replace_all(content, replacement.as_str()).into_owned(),
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Invalid replace rule, skipping");
                content.to_string()
            }
        },
    }
}

fn unescape(value: &str) -> String {
    value.replace("\\\"", "\"")
}
