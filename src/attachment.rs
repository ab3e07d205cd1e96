//! Email attachments as carried in a submission.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::sanitize;

/// An email attachment.
///
/// Attachments travel through the store and the queue as base64 text, exactly
/// as the client submitted them, and are only decoded when the provider
/// envelope is built.
///
/// ```
/// use hermes::Attachment;
///
/// let attachment = Attachment::from_bytes("report.pdf", b"PDF content");
/// assert_eq!(attachment.mime_type, "application/pdf");
/// assert_eq!(attachment.decode().unwrap(), b"PDF content");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Filename for the attachment
    pub filename: String,
    /// MIME content type (e.g., "application/pdf"). Guessed from the filename when empty.
    #[serde(default)]
    pub mime_type: String,
    /// Base64 encoded content
    pub base64_content: String,
}

impl Attachment {
    /// Create an attachment from base64 text.
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        base64_content: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            base64_content: base64_content.into(),
        }
    }

    /// Create an attachment from raw bytes.
    ///
    /// Content type is guessed from the filename extension.
    pub fn from_bytes(filename: impl Into<String>, data: impl AsRef<[u8]>) -> Self {
        let filename = filename.into();
        let mime_type = guess_mime(&filename);
        let base64_content = base64::engine::general_purpose::STANDARD.encode(data.as_ref());

        Self {
            filename,
            mime_type,
            base64_content,
        }
    }

    /// Set the content type explicitly.
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// The declared content type, or a guess from the filename.
    pub fn content_type(&self) -> String {
        if self.mime_type.trim().is_empty() {
            guess_mime(&self.filename)
        } else {
            self.mime_type.clone()
        }
    }

    /// Decode the content, ignoring characters outside the base64 alphabet.
    pub fn decode(&self) -> Result<Vec<u8>, DispatchError> {
        let cleaned = sanitize::clean_base64(&self.base64_content);
        if cleaned.is_empty() && !self.base64_content.trim().is_empty() {
            return Err(DispatchError::Validation(format!(
                "attachment '{}' has no base64 content",
                self.filename
            )));
        }
        base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .map_err(|e| {
                DispatchError::Validation(format!(
                    "attachment '{}' is not valid base64: {}",
                    self.filename, e
                ))
            })
    }

    /// Check that the attachment is named and decodes.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.filename.trim().is_empty() {
            return Err(DispatchError::Validation(
                "attachment filename is required".into(),
            ));
        }
        self.decode().map(|_| ())
    }
}

fn guess_mime(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}
