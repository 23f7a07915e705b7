//! Conversion of IMAP responses and raw RFC 5322 messages into model types.

use async_imap::imap_proto::{Address, BodyStructure};
use async_imap::types::Fetch;
use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use tracing::debug;

use belegscanner_core::{
    Attachment, Error, MessageContent, MessageIdentity, MessageSummary, Result,
};

const NO_SUBJECT: &str = "(Kein Betreff)";
const UNKNOWN_SENDER: &str = "(Unbekannt)";

/// Decodes RFC 2047 encoded words in a header value.
pub(crate) fn decode_header_value(raw: &str) -> String {
    let line = format!("X: {raw}");
    mailparse::parse_header(line.as_bytes())
        .map_or_else(|_| raw.to_string(), |(header, _)| header.get_value())
}

/// Parses an RFC 2822 date, falling back to the current time.
pub(crate) fn parse_date(value: &str) -> DateTime<Utc> {
    mailparse::dateparse(value)
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Formats `mailbox@host`, or `None` if either half is missing.
pub(crate) fn format_address(mailbox: Option<&[u8]>, host: Option<&[u8]>) -> Option<String> {
    Some(format!("{}@{}", lossy(mailbox?), lossy(host?)))
}

fn first_address(addresses: Option<&Vec<Address<'_>>>) -> Option<String> {
    let address = addresses?.first()?;
    format_address(address.mailbox.as_deref(), address.host.as_deref())
}

/// Builds a listing record from a `(UID ENVELOPE BODYSTRUCTURE)` response.
///
/// Returns `None` for responses without a UID or envelope.
pub(crate) fn summary_from_fetch(mailbox: &str, fetch: &Fetch) -> Option<MessageSummary> {
    let uid = fetch.uid?;
    let envelope = fetch.envelope()?;

    let subject = envelope
        .subject
        .as_deref()
        .map(|s| decode_header_value(&lossy(s)))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());
    let sender =
        first_address(envelope.from.as_ref()).unwrap_or_else(|| UNKNOWN_SENDER.to_string());
    let date = envelope
        .date
        .as_deref()
        .map_or_else(Utc::now, |d| parse_date(&lossy(d)));
    // Multipart is taken as "may carry attachments"; the full walk happens on fetch
    let has_attachments = matches!(fetch.bodystructure(), Some(BodyStructure::Multipart { .. }));

    Some(MessageSummary {
        identity: MessageIdentity::new(mailbox, uid),
        sender,
        subject,
        date,
        has_attachments,
    })
}

#[derive(Default)]
struct Body {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

fn attachment_filename(part: &ParsedMail<'_>) -> Option<String> {
    let disposition = part.get_content_disposition();
    if disposition.disposition != DispositionType::Attachment {
        return None;
    }
    disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| decode_header_value(name))
}

fn collect_parts(part: &ParsedMail<'_>, body: &mut Body) -> Result<()> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(sub, body)?;
        }
        return Ok(());
    }

    if part.get_content_disposition().disposition == DispositionType::Attachment {
        let Some(filename) = attachment_filename(part) else {
            debug!("Skipping attachment without filename");
            return Ok(());
        };
        let data = part
            .get_body_raw()
            .map_err(|e| Error::Protocol(format!("Failed to decode attachment {filename}: {e}")))?;
        if !data.is_empty() {
            body.attachments
                .push(Attachment::new(filename, part.ctype.mimetype.clone(), data));
        }
        return Ok(());
    }

    match part.ctype.mimetype.as_str() {
        "text/plain" if body.text.is_none() => body.text = Some(decode_text(part)?),
        "text/html" if body.html.is_none() => body.html = Some(decode_text(part)?),
        _ => {}
    }
    Ok(())
}

fn decode_text(part: &ParsedMail<'_>) -> Result<String> {
    part.get_body()
        .map_err(|e| Error::Protocol(format!("Failed to decode body: {e}")))
}

/// Parses a complete message fetched with `BODY.PEEK[]`.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the message or one of its parts cannot
/// be decoded.
pub(crate) fn content_from_raw(identity: MessageIdentity, raw: &[u8]) -> Result<MessageContent> {
    let parsed = mailparse::parse_mail(raw)
        .map_err(|e| Error::Protocol(format!("Failed to parse message {identity}: {e}")))?;
    let headers = parsed.get_headers();

    let sender = headers.get_first_value("From").unwrap_or_default();
    let subject = headers.get_first_value("Subject").unwrap_or_default();
    let message_id = headers.get_first_value("Message-ID").unwrap_or_default();
    let date = headers
        .get_first_value("Date")
        .map_or_else(Utc::now, |d| parse_date(&d));

    let mut body = Body::default();
    if parsed.subparts.is_empty() {
        let text = decode_text(&parsed)?;
        if parsed.ctype.mimetype == "text/html" {
            body.html = Some(text);
        } else {
            body.text = Some(text);
        }
    } else {
        collect_parts(&parsed, &mut body)?;
    }

    Ok(MessageContent {
        identity,
        sender,
        subject,
        date,
        message_id,
        body_text: body.text.unwrap_or_default(),
        body_html: body.html,
        attachments: body.attachments,
    })
}
