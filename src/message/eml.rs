use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use super::{Message, MessageError};

impl Message {
    /// Parse a raw RFC 822 message.
    ///
    /// The first non-attachment `text/html` and `text/plain` parts found in a
    /// depth-first walk of the MIME tree become `html` and `text`.
    pub fn parse(raw: &[u8]) -> Result<Self, MessageError> {
        let mail = mailparse::parse_mail(raw)?;
        let headers = &mail.headers;

        let header = |name: &str| {
            headers
                .get_first_value(name)
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let mut html = None;
        let mut text = None;
        collect_bodies(&mail, &mut html, &mut text);

        let keywords = headers
            .get_all_values("Keywords")
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Message {
            subject: header("Subject"),
            sender: header("From"),
            html: html.unwrap_or_default(),
            text: text.unwrap_or_default(),
            message_id: strip_angle_brackets(&header("Message-ID")).to_string(),
            content_base: header("Content-Base").trim_matches('"').to_string(),
            date: headers.get_first_value("Date").as_deref().and_then(parse_date),
            received_date: headers
                .get_all_values("Received")
                .iter()
                .find_map(|v| received_date(v)),
            keywords,
        })
    }
}

fn collect_bodies(part: &ParsedMail<'_>, html: &mut Option<String>, text: &mut Option<String>) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_bodies(sub, html, text);
        }
        return;
    }

    if part.get_content_disposition().disposition == DispositionType::Attachment {
        return;
    }

    let slot = match part.ctype.mimetype.to_ascii_lowercase().as_str() {
        "text/html" => html,
        "text/plain" => text,
        _ => return,
    };
    if slot.is_none() {
        match part.get_body() {
            Ok(body) => *slot = Some(body),
            Err(e) => tracing::debug!(error = %e, "Skipping undecodable body part"),
        }
    }
}

fn strip_angle_brackets(value: &str) -> &str {
    value
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let ts = mailparse::dateparse(value.trim()).ok()?;
    DateTime::from_timestamp(ts, 0)
}

/// `Received: by host; Tue, 01 Jun 2021 10:00:00 +0000` carries its date
/// after the last semicolon.
fn received_date(value: &str) -> Option<DateTime<Utc>> {
    value.rsplit(';').next().and_then(parse_date)
}
