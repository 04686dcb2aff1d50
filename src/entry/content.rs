//! HTML helpers for message bodies: region extraction, tag stripping,
//! truncation and sanitizing.

use ammonia::{Builder, UrlRelative};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use url::Url;

fn feed_entry_content_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)div\s+class="feedEntryContent">\s*(.*)</div>\s*<div\s+class="feedEntryLinks">"#)
            .expect("feed entry content pattern is valid")
    })
}

fn body_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<body(?:[^>]*)?>(.*)</body>").expect("body pattern is valid")
    })
}

fn alternate_links_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<ul\s+class="feedEntryAlternateLinks">\s*<li>\s*<a\s+href="([^"]+)""#)
            .expect("alternate links pattern is valid")
    })
}

fn hidden_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:script|style)\b[^>]*>.*?</(?:script|style)\s*>")
            .expect("hidden block pattern is valid")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"))
}

fn numeric_entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&#(?:([0-9]{1,7})|[xX]([0-9a-fA-F]{1,6}));").expect("entity pattern is valid")
    })
}

/// Innermost article region of an HTML body.
///
/// Tries the feed-reader content block, then `<body>...</body>`, and falls
/// back to the whole input.
pub fn extract_body(html: &str) -> String {
    for re in [feed_entry_content_re(), body_re()] {
        if let Some(m) = re.captures(html).and_then(|c| c.get(1)) {
            return m.as_str().trim().to_string();
        }
    }
    html.to_string()
}

/// First link of the `feedEntryAlternateLinks` list, if present.
pub fn alternate_link(html: &str) -> Option<String> {
    alternate_links_re()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|link| !link.is_empty())
}

/// Plain text of an HTML fragment: scripts and styles dropped, tags
/// removed, character references decoded.
pub fn strip_tags(html: &str) -> String {
    let visible = hidden_block_re().replace_all(html, "");
    let text = tag_re().replace_all(&visible, "");
    decode_entities(&text)
}

/// Plain text of `html` with whitespace collapsed, cut to `max_chars`
/// characters.
pub fn truncate_text(html: &str, max_chars: usize) -> String {
    let text = strip_tags(html);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}

/// Reduce HTML to a safe subset; relative links are resolved against
/// `base_url` when it is an absolute URL.
pub fn sanitize(base_url: &str, html: &str) -> String {
    let mut builder = Builder::default();
    if let Ok(base) = Url::parse(base_url) {
        builder.url_relative(UrlRelative::RewriteWithBase(base));
    }
    builder.clean(html).to_string()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let numeric = numeric_entity_re().replace_all(text, |caps: &Captures<'_>| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(dec), _) => dec.as_str().parse::<u32>().ok(),
            (None, Some(hex)) => u32::from_str_radix(hex.as_str(), 16).ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    // &amp; last so "&amp;lt;" decodes to "&lt;", not "<"
    numeric
        .replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const THUNDERBIRD_BODY: &str = r#"<html><head><title>t</title></head>
<body>
<table class="feedEntryHeader"></table>
<div class="feedEntryContent">
  <p>Article <b>text</b></p>
</div>
<div class="feedEntryLinks">
<ul class="feedEntryAlternateLinks">
  <li>  <a href="https://example.com/post/1">post</a></li>
</ul>
</div>
</body></html>"#;

    #[test]
    fn test_extract_prefers_feed_entry_content() {
        assert_eq!(extract_body(THUNDERBIRD_BODY), "<p>Article <b>text</b></p>");
    }

    #[test]
    fn test_extract_falls_back_to_body() {
        let html = "<html><body class=\"x\">\n  <p>Hi</p>\n</body></html>";
        assert_eq!(extract_body(html), "<p>Hi</p>");
    }

    #[test]
    fn test_extract_falls_back_to_raw() {
        assert_eq!(extract_body("<p>fragment</p>"), "<p>fragment</p>");
    }

    #[test]
    fn test_alternate_link() {
        assert_eq!(
            alternate_link(THUNDERBIRD_BODY).as_deref(),
            Some("https://example.com/post/1")
        );
        assert_eq!(alternate_link("<p>no links</p>"), None);
    }

    #[test]
    fn test_strip_tags_and_entities() {
        let html = "<p>Fish &amp; chips &lt;3 &#233;t&#xE9;</p><script>alert(1)</script>";
        assert_eq!(strip_tags(html), "Fish & chips <3 été");
    }

    #[test]
    fn test_strip_tags_keeps_escaped_entity_text() {
        assert_eq!(strip_tags("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_truncate_text_collapses_and_cuts() {
        let html = "<p>Hello   world</p>\n<p>again</p>";
        assert_eq!(truncate_text(html, 100), "Hello world again");
        assert_eq!(truncate_text("<b>abcdef</b>", 3), "abc");
        assert_eq!(truncate_text("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn test_sanitize_removes_scripts_and_resolves_links() {
        let html = r#"<p onclick="x()">Hi <a href="/post">link</a></p><script>bad()</script>"#;
        let clean = sanitize("https://example.com/blog/", html);
        assert!(!clean.contains("script"));
        assert!(!clean.contains("onclick"));
        assert!(clean.contains("https://example.com/post"));
    }

    #[test]
    fn test_sanitize_without_base_url() {
        let clean = sanitize("", "<p>plain</p>");
        assert_eq!(clean, "<p>plain</p>");
    }
}
