//! Message kinds and their conversion into provider envelopes.

use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::email::Email;
use crate::envelope::{Envelope, EnvelopeAttachment};
use crate::error::DispatchError;
use crate::sanitize;

/// Something the dispatch worker knows how to send.
pub trait Dispatchable {
    /// Check the message before it is admitted.
    fn validate(&self) -> Result<(), DispatchError>;

    /// Render the sanitized provider envelope, using `default_from` when the
    /// message carries no sender.
    fn to_envelope(&self, default_from: &Address) -> Result<Envelope, DispatchError>;
}

impl Dispatchable for Email {
    fn validate(&self) -> Result<(), DispatchError> {
        if self.to.is_empty() {
            return Err(DispatchError::Validation(
                "at least one 'to' recipient is required".into(),
            ));
        }
        if self.subject.trim().is_empty() {
            return Err(DispatchError::Validation("subject is required".into()));
        }
        for addr in self.from.iter().chain(self.reply_to.iter()) {
            addr.validate()?;
        }
        for addr in self.all_recipients() {
            addr.validate()?;
        }
        for attachment in &self.attachments {
            attachment.validate()?;
        }
        Ok(())
    }

    fn to_envelope(&self, default_from: &Address) -> Result<Envelope, DispatchError> {
        let from = self.from.as_ref().unwrap_or(default_from);

        let attachments = self
            .attachments
            .iter()
            .map(|a| {
                Ok(EnvelopeAttachment {
                    filename: sanitize::strict(&a.filename),
                    content_type: sanitize::strict(&a.content_type()),
                    data: a.decode()?,
                })
            })
            .collect::<Result<Vec<_>, DispatchError>>()?;

        Ok(Envelope {
            from: header(from)?,
            to: headers(&self.to)?,
            cc: headers(&self.cc)?,
            bcc: headers(&self.bcc)?,
            reply_to: headers(&self.reply_to)?,
            subject: sanitize::strict(&self.subject),
            html_body: sanitize::body_preserving(&self.body),
            attachments,
        })
    }
}

fn header(addr: &Address) -> Result<String, DispatchError> {
    Ok(sanitize::strict(&addr.formatted_rfc5322_ascii()?))
}

fn headers(addrs: &[Address]) -> Result<Vec<String>, DispatchError> {
    addrs.iter().map(header).collect()
}

/// Discriminator stored in a record's `kind` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Email,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "Email",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Email" => Ok(Self::Email),
            other => Err(DispatchError::UnsupportedKind(other.to_string())),
        }
    }
}

/// A decoded message of any supported kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Email(Email),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Email(_) => MessageKind::Email,
        }
    }

    /// Decode stored content for the given kind.
    ///
    /// Content that fails to parse is a [`DispatchError::Validation`] so the
    /// worker treats it as permanent.
    pub fn decode(kind: MessageKind, content: &str) -> Result<Self, DispatchError> {
        match kind {
            MessageKind::Email => serde_json::from_str(content)
                .map(Self::Email)
                .map_err(|e| DispatchError::Validation(format!("undecodable email content: {e}"))),
        }
    }

    /// Serialize to the text stored in the record or carried inline on the queue.
    pub fn encode(&self) -> Result<String, DispatchError> {
        match self {
            Self::Email(email) => Ok(serde_json::to_string(email)?),
        }
    }
}

impl Dispatchable for Payload {
    fn validate(&self) -> Result<(), DispatchError> {
        match self {
            Self::Email(email) => email.validate(),
        }
    }

    fn to_envelope(&self, default_from: &Address) -> Result<Envelope, DispatchError> {
        match self {
            Self::Email(email) => email.to_envelope(default_from),
        }
    }
}

impl From<Email> for Payload {
    fn from(email: Email) -> Self {
        Self::Email(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::Attachment;

    fn default_from() -> Address {
        Address::with_name("App", "noreply@example.com")
    }

    #[test]
    fn test_validate_happy() {
        let email = Email::new()
            .to("x@example.com")
            .subject("Hi")
            .body("<p>hello</p>");
        assert!(email.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let no_to = Email::new().subject("Hi");
        assert!(matches!(no_to.validate(), Err(DispatchError::Validation(_))));

        let blank_subject = Email::new().to("x@example.com").subject("   ");
        assert!(matches!(blank_subject.validate(), Err(DispatchError::Validation(_))));

        let bad_cc = Email::new().to("x@example.com").cc("nope").subject("Hi");
        assert!(matches!(bad_cc.validate(), Err(DispatchError::Validation(_))));

        let bad_from = Email::new().from("nope").to("x@example.com").subject("Hi");
        assert!(bad_from.validate().is_err());

        let bad_attachment = Email::new()
            .to("x@example.com")
            .subject("Hi")
            .attachment(Attachment::new("a.txt", "text/plain", "!!!"));
        assert!(bad_attachment.validate().is_err());
    }

    #[test]
    fn test_envelope_uses_default_from() {
        let email = Email::new().to("x@example.com").subject("Hi");
        let envelope = email.to_envelope(&default_from()).unwrap();
        assert_eq!(envelope.from, "\"App\" <noreply@example.com>");

        let email = email.from("me@example.com");
        let envelope = email.to_envelope(&default_from()).unwrap();
        assert_eq!(envelope.from, "me@example.com");
    }

    #[test]
    fn test_envelope_sanitizes_headers_and_keeps_body_breaks() {
        let email = Email::new()
            .to(("Eve\r\nBcc: victim@example.com", "eve@example.com"))
            .subject("Hello\r\nX-Injected: 1")
            .body("<p>line one</p>\r\n<p>line two</p>\u{0}")
            .attachment(Attachment::new("evil\n.txt", "text/plain\r\n", "SGVs\nbG8="));

        let envelope = email.to_envelope(&default_from()).unwrap();

        assert!(!envelope.subject.contains('\n'));
        assert_eq!(envelope.subject, "Hello\\r\\nX-Injected: 1");
        assert!(!envelope.to[0].contains('\r'));
        assert!(envelope.to[0].contains("eve@example.com"));
        assert_eq!(envelope.html_body, "<p>line one</p>\r\n<p>line two</p>\\x00");
        assert_eq!(envelope.attachments[0].filename, "evil\\n.txt");
        assert_eq!(envelope.attachments[0].content_type, "text/plain\\r\\n");
        assert_eq!(envelope.attachments[0].data, b"Hello");
    }

    #[test]
    fn test_envelope_converts_domains_to_punycode() {
        let email = Email::new()
            .from(("Müller", "info@müller.de"))
            .to("user@例え.jp")
            .cc(("Ops", "ops@example.com"))
            .subject("Hi");

        let envelope = email.to_envelope(&default_from()).unwrap();
        assert_eq!(envelope.from, "\"Müller\" <info@xn--mller-kva.de>");
        assert_eq!(envelope.to, vec!["user@xn--r8jz45g.jp"]);
        assert_eq!(envelope.cc, vec!["\"Ops\" <ops@example.com>"]);
    }

    #[test]
    fn test_envelope_rejects_address_without_at() {
        let email = Email::new().to("nobody").subject("Hi");
        let err = email.to_envelope(&default_from()).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Email".parse::<MessageKind>().unwrap(), MessageKind::Email);
        let err = "Sms".parse::<MessageKind>().unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedKind(k) if k == "Sms"));
        assert!(!"email".parse::<MessageKind>().unwrap_err().is_retryable());
    }

    #[test]
    fn test_payload_decode_and_encode() {
        let payload = Payload::decode(
            MessageKind::Email,
            r#"{"to": ["x@example.com"], "subject": "Hi", "body": "b"}"#,
        )
        .unwrap();
        assert_eq!(payload.kind(), MessageKind::Email);

        let text = payload.encode().unwrap();
        assert_eq!(Payload::decode(MessageKind::Email, &text).unwrap(), payload);

        let err = Payload::decode(MessageKind::Email, "not json").unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }
}
