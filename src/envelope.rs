//! Provider-facing rendering of an outbound message.

use serde::{Deserialize, Serialize};

/// A sanitized, ready-to-send message.
///
/// Every header-bound string has already been through
/// [`sanitize::strict`](crate::sanitize::strict) and the body through
/// [`sanitize::body_preserving`](crate::sanitize::body_preserving), so a
/// provider adapter can copy fields verbatim into its request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender as `"Name" <email>` or `email`
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<EnvelopeAttachment>,
}

/// A decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeAttachment {
    pub filename: String,
    pub content_type: String,
    /// Raw bytes
    #[serde(with = "bytes_base64")]
    pub data: Vec<u8>,
}

impl Envelope {
    /// All recipients (to + cc + bcc).
    pub fn all_recipients(&self) -> Vec<&str> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(String::as_str)
            .collect()
    }

    /// Whether any recipient field contains `address`, ignoring case.
    pub fn is_addressed_to(&self, address: &str) -> bool {
        let needle = address.to_ascii_lowercase();
        self.all_recipients()
            .iter()
            .any(|r| r.to_ascii_lowercase().contains(&needle))
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

mod bytes_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(text)
            .map_err(serde::de::Error::custom)
    }
}
