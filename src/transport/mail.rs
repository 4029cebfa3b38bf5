//! Mail delivery: the payload travels as an attachment on a message
//! described by a `mailto:` endpoint URN.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;
use url::Url;

use super::{DispatchOptions, DispatchResponse, SmtpConfig, TransportError};

/// A fully resolved mail delivery, with relay defaults filled in for
/// every field the URN left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub from: String,
    pub reply_to: String,
    pub subject: String,
    pub body: String,
}

fn split_addresses(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `mailto:` URN against relay defaults. Recipients come from
/// the path plus any `to` query keys; `cc`, `bcc`, `subject`, `body`,
/// `from`, and `reply-to` keys override the defaults individually, so a
/// URN that only sets `cc` still gets the default subject and body.
pub fn parse_mailto(url: &Url, defaults: &SmtpConfig) -> Result<MailMessage, TransportError> {
    let mut message = MailMessage {
        to: split_addresses(url.path()),
        cc: Vec::new(),
        bcc: Vec::new(),
        from: defaults.default_from.clone(),
        reply_to: defaults.default_reply_to.clone(),
        subject: defaults.default_subject.clone(),
        body: defaults.default_body.clone(),
    };

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "to" => message.to.extend(split_addresses(&value)),
            "cc" => message.cc.extend(split_addresses(&value)),
            "bcc" => message.bcc.extend(split_addresses(&value)),
            "subject" => message.subject = value.into_owned(),
            "body" => message.body = value.into_owned(),
            "from" => message.from = value.into_owned(),
            "reply-to" => message.reply_to = value.into_owned(),
            _ => {}
        }
    }

    if message.to.is_empty() {
        return Err(TransportError::InvalidEndpoint {
            urn: url.to_string(),
            reason: "mailto endpoint has no recipient".to_string(),
        });
    }
    Ok(message)
}

pub(super) async fn send(
    url: &Url,
    payload: &str,
    smtp: &SmtpConfig,
    options: &DispatchOptions,
) -> Result<DispatchResponse, TransportError> {
    let mail = parse_mailto(url, smtp)?;

    let mut builder = Message::builder()
        .from(mail.from.parse::<Mailbox>()?)
        .reply_to(mail.reply_to.parse::<Mailbox>()?)
        .subject(mail.subject.clone());
    for to in &mail.to {
        builder = builder.to(to.parse::<Mailbox>()?);
    }
    for cc in &mail.cc {
        builder = builder.cc(cc.parse::<Mailbox>()?);
    }
    for bcc in &mail.bcc {
        builder = builder.bcc(bcc.parse::<Mailbox>()?);
    }

    let attachment_type =
        ContentType::parse(&options.content_type).unwrap_or(ContentType::TEXT_PLAIN);
    let message = builder.multipart(
        MultiPart::mixed()
            .singlepart(SinglePart::plain(mail.body.clone()))
            .singlepart(
                Attachment::new(options.file_name())
                    .body(payload.to_string(), attachment_type),
            ),
    )?;

    let transport: AsyncSmtpTransport<Tokio1Executor> =
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
            .port(smtp.port)
            .build();
    transport.send(message).await?;
    debug!(recipients = mail.to.len(), "mail delivery accepted by relay");
    Ok(DispatchResponse::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> SmtpConfig {
        SmtpConfig::default()
    }

    #[test]
    fn test_bare_mailto_gets_all_defaults() {
        let url = Url::parse("mailto:ops@example.com").unwrap();
        let mail = parse_mailto(&url, &defaults()).unwrap();
        assert_eq!(mail.to, vec!["ops@example.com"]);
        assert!(mail.cc.is_empty());
        assert_eq!(mail.subject, "Event data");
        assert_eq!(mail.body, "Event data attached.");
        assert_eq!(mail.from, "noreply@localhost");
    }

    #[test]
    fn test_cc_query_keeps_default_subject_and_body() {
        let url = Url::parse("mailto:user@x.com?cc=a@x.com,b@x.com").unwrap();
        let mail = parse_mailto(&url, &defaults()).unwrap();
        assert_eq!(mail.to, vec!["user@x.com"]);
        assert_eq!(mail.cc, vec!["a@x.com", "b@x.com"]);
        assert_eq!(mail.subject, "Event data");
        assert_eq!(mail.body, "Event data attached.");
    }

    #[test]
    fn test_query_overrides_apply_per_key() {
        let url = Url::parse(
            "mailto:user@x.com?subject=Shipment%20notice&bcc=audit@x.com&from=trace@x.com",
        )
        .unwrap();
        let mail = parse_mailto(&url, &defaults()).unwrap();
        assert_eq!(mail.subject, "Shipment notice");
        assert_eq!(mail.bcc, vec!["audit@x.com"]);
        assert_eq!(mail.from, "trace@x.com");
        // Body was not named, so the default stays.
        assert_eq!(mail.body, "Event data attached.");
    }

    #[test]
    fn test_to_query_extends_path_recipients() {
        let url = Url::parse("mailto:first@x.com?to=second@x.com").unwrap();
        let mail = parse_mailto(&url, &defaults()).unwrap();
        assert_eq!(mail.to, vec!["first@x.com", "second@x.com"]);
    }

    #[test]
    fn test_missing_recipient_is_rejected() {
        let url = Url::parse("mailto:?subject=No%20one").unwrap();
        assert!(matches!(
            parse_mailto(&url, &defaults()),
            Err(TransportError::InvalidEndpoint { .. })
        ));
    }
}
