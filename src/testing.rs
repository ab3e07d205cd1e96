//! Testing utilities and assertion helpers.
//!
//! Assertions over what a [`LocalMailer`] captured, plus a few pipeline
//! checks (pacing gaps, header hygiene, record state).
//!
//! # Example
//!
//! ```rust,ignore
//! use hermes::providers::LocalMailer;
//! use hermes::testing::*;
//!
//! #[tokio::test]
//! async fn test_welcome_flow() {
//!     let mailer = LocalMailer::new();
//!
//!     // ... submit and run the worker ...
//!
//!     assert_email_sent(&mailer);
//!     assert_email_to(&mailer, "user@example.com");
//!     assert_email_subject_contains(&mailer, "Welcome");
//!     refute_email_to(&mailer, "admin@example.com");
//!
//!     // Regex matching
//!     assert_email_subject_matches(&mailer, r"Welcome.*!");
//!     assert_email_html_matches(&mailer, r"<h1>.*</h1>");
//! }
//! ```

use regex::Regex;
use std::time::Duration;

use crate::envelope::Envelope;
use crate::providers::{LocalMailer, SentEnvelope};
use crate::record::MessageState;
use crate::store::MessageStore;

// ============================================================================
// Helper Functions
// ============================================================================

/// Format a list of envelopes for error messages.
fn format_summary(sent: &[SentEnvelope]) -> String {
    if sent.is_empty() {
        return "  (no emails sent)".to_string();
    }

    sent.iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "  {}. To: [{}], From: {}, Subject: \"{}\"",
                i + 1,
                s.envelope.to.join(", "),
                s.envelope.from,
                s.envelope.subject
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn last_sent(mailer: &LocalMailer) -> SentEnvelope {
    mailer
        .last_envelope()
        .expect("Expected at least one email to be sent, but none were sent")
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("Invalid regex pattern")
}

fn preview(text: &str) -> &str {
    let mut end = text.len().min(500);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// Basic Assertions
// ============================================================================

/// Assert that at least one email was sent.
///
/// # Panics
///
/// Panics if no emails were sent.
pub fn assert_email_sent(mailer: &LocalMailer) {
    assert!(
        mailer.has_envelopes(),
        "Expected at least one email to be sent, but none were sent"
    );
}

/// Assert that no emails were sent and the provider was never called.
///
/// # Panics
///
/// Panics if any email was sent or any delivery was attempted.
pub fn assert_no_emails_sent(mailer: &LocalMailer) {
    let sent = mailer.envelopes();
    assert!(
        sent.is_empty() && mailer.deliver_calls() == 0,
        "Expected no emails to be sent, but {} were sent ({} delivery calls).\n\nEmails sent:\n{}",
        sent.len(),
        mailer.deliver_calls(),
        format_summary(&sent)
    );
}

/// Assert that exactly N emails were sent.
///
/// # Panics
///
/// Panics if the count doesn't match.
pub fn assert_email_count(mailer: &LocalMailer, expected: usize) {
    let sent = mailer.envelopes();
    assert!(
        sent.len() == expected,
        "Expected {} email(s) to be sent, but {} were sent.\n\nEmails sent:\n{}",
        expected,
        sent.len(),
        format_summary(&sent)
    );
}

/// Assert that an email was sent to a specific address (to, cc or bcc).
///
/// # Panics
///
/// Panics if no email was sent to the address.
pub fn assert_email_to(mailer: &LocalMailer, address: &str) {
    assert!(
        mailer.sent_to(address),
        "Expected an email to be sent to '{}'.\n\nEmails sent:\n{}",
        address,
        format_summary(&mailer.envelopes())
    );
}

/// Refute that an email was sent to a specific address.
///
/// # Panics
///
/// Panics if an email was sent to the address.
pub fn refute_email_to(mailer: &LocalMailer, address: &str) {
    let found = mailer.find(|e| e.is_addressed_to(address));
    if let Some(first) = found.first() {
        panic!(
            "Expected no email to be sent to '{}', but found one.\n\nMatching email:\n  Subject: \"{}\"\n  From: {}\n\nAll emails:\n{}",
            address,
            first.envelope.subject,
            first.envelope.from,
            format_summary(&mailer.envelopes())
        );
    }
}

/// Assert that an email with the exact subject was sent.
///
/// # Panics
///
/// Panics if no email with the subject was found.
pub fn assert_email_subject(mailer: &LocalMailer, subject: &str) {
    assert!(
        mailer.sent_with_subject(subject),
        "Expected an email with subject '{}'.\n\nEmails sent:\n{}",
        subject,
        format_summary(&mailer.envelopes())
    );
}

/// Assert that an email with subject containing text was sent.
///
/// # Panics
///
/// Panics if no matching email was found.
pub fn assert_email_subject_contains(mailer: &LocalMailer, text: &str) {
    let found = !mailer.find(|e| e.subject.contains(text)).is_empty();
    assert!(
        found,
        "Expected an email with subject containing '{}'.\n\nEmails sent:\n{}",
        text,
        format_summary(&mailer.envelopes())
    );
}

/// Assert that an email matching a predicate was sent.
///
/// # Panics
///
/// Panics if no matching email was found.
pub fn assert_email_matches<F>(mailer: &LocalMailer, predicate: F)
where
    F: Fn(&Envelope) -> bool,
{
    assert!(
        !mailer.find(predicate).is_empty(),
        "Expected an email matching the predicate, but none was found.\n\nEmails sent:\n{}",
        format_summary(&mailer.envelopes())
    );
}

/// Get the last email sent, or panic if none.
///
/// # Panics
///
/// Panics if no emails were sent.
pub fn get_last_email(mailer: &LocalMailer) -> SentEnvelope {
    last_sent(mailer)
}

/// Assert the last email was sent from an address (substring of the rendered sender).
///
/// # Panics
///
/// Panics if no email was sent or the sender doesn't match.
pub fn assert_email_from(mailer: &LocalMailer, from: &str) {
    let last = last_sent(mailer);
    assert!(
        last.envelope
            .from
            .to_ascii_lowercase()
            .contains(&from.to_ascii_lowercase()),
        "Expected last email from '{}', but was from '{}'.\n\nEmails sent:\n{}",
        from,
        last.envelope.from,
        format_summary(&mailer.envelopes())
    );
}

/// Assert the last email has HTML body containing text.
///
/// # Panics
///
/// Panics if no email was sent or the body doesn't contain the text.
pub fn assert_email_html_contains(mailer: &LocalMailer, text: &str) {
    let last = last_sent(mailer);
    let html = &last.envelope.html_body;
    assert!(
        html.contains(text),
        "Expected HTML body to contain '{}', but it didn't.\n\nLast email:\n{}\n\nHTML body (first 500 chars):\n{}",
        text,
        format_summary(std::slice::from_ref(&last)),
        preview(html)
    );
}

/// Assert the last email has an attachment with the given filename.
///
/// # Panics
///
/// Panics if no email was sent or no attachment with that name exists.
pub fn assert_email_has_attachment(mailer: &LocalMailer, filename: &str) {
    let last = last_sent(mailer);
    let names = last
        .envelope
        .attachments
        .iter()
        .map(|a| a.filename.as_str())
        .collect::<Vec<_>>();

    assert!(
        names.contains(&filename),
        "Expected email to have attachment '{}'.\n\nLast email:\n{}\n\nAttachments: [{}]",
        filename,
        format_summary(std::slice::from_ref(&last)),
        names.join(", ")
    );
}

// ============================================================================
// Regex Matching
// ============================================================================

/// Assert the last email subject matches a regex pattern.
///
/// # Panics
///
/// Panics if no email was sent or subject doesn't match.
pub fn assert_email_subject_matches(mailer: &LocalMailer, pattern: &str) {
    let last = last_sent(mailer);
    assert!(
        compile(pattern).is_match(&last.envelope.subject),
        "Expected subject to match pattern '{}', but was '{}'.\n\nLast email:\n{}",
        pattern,
        last.envelope.subject,
        format_summary(std::slice::from_ref(&last))
    );
}

/// Assert the last email HTML body matches a regex pattern.
///
/// # Panics
///
/// Panics if no email was sent or the body doesn't match.
pub fn assert_email_html_matches(mailer: &LocalMailer, pattern: &str) {
    let last = last_sent(mailer);
    let html = &last.envelope.html_body;
    assert!(
        compile(pattern).is_match(html),
        "Expected HTML body to match pattern '{}', but it didn't.\n\nLast email:\n{}\n\nHTML body (first 500 chars):\n{}",
        pattern,
        format_summary(std::slice::from_ref(&last)),
        preview(html)
    );
}

// ============================================================================
// Pipeline Assertions
// ============================================================================

/// Assert that no header-bound field of any sent email contains a raw CR or LF.
///
/// # Panics
///
/// Panics naming the first offending field.
pub fn assert_headers_clean(mailer: &LocalMailer) {
    for sent in mailer.envelopes() {
        let e = &sent.envelope;
        let fields = std::iter::once(("from", &e.from))
            .chain(std::iter::once(("subject", &e.subject)))
            .chain(e.to.iter().map(|v| ("to", v)))
            .chain(e.cc.iter().map(|v| ("cc", v)))
            .chain(e.bcc.iter().map(|v| ("bcc", v)))
            .chain(e.reply_to.iter().map(|v| ("reply_to", v)))
            .chain(e.attachments.iter().map(|a| ("attachment filename", &a.filename)))
            .chain(e.attachments.iter().map(|a| ("attachment content type", &a.content_type)));

        for (name, value) in fields {
            assert!(
                !value.contains(['\r', '\n']),
                "Expected {} to contain no raw line breaks, but got {:?}",
                name,
                value
            );
        }
    }
}

/// Assert consecutive sends were at least `min_gap` apart.
///
/// # Panics
///
/// Panics on the first gap that is too short.
pub fn assert_sends_spaced(mailer: &LocalMailer, min_gap: Duration) {
    for (i, gap) in mailer.send_gaps().into_iter().enumerate() {
        assert!(
            gap >= min_gap,
            "Expected sends {} and {} to be at least {:?} apart, but they were {:?} apart",
            i + 1,
            i + 2,
            min_gap,
            gap
        );
    }
}

/// Assert a stored record is in `expected` state.
///
/// # Panics
///
/// Panics if the record is missing, unreadable, or in another state.
pub async fn assert_record_state(store: &MessageStore, id: &str, expected: MessageState) {
    let record = store
        .get(id)
        .await
        .expect("Failed to read message store")
        .unwrap_or_else(|| panic!("Expected record '{}' to exist, but it was not found", id));
    assert!(
        record.state == expected,
        "Expected record '{}' to be {}, but it was {}",
        id,
        expected,
        record.state
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeAttachment;
    use crate::mailer::Mailer;

    fn welcome() -> Envelope {
        Envelope {
            from: "\"App\" <sender@example.com>".into(),
            to: vec!["recipient@example.com".into()],
            subject: "Welcome aboard!".into(),
            html_body: "<h1>Hello</h1>".into(),
            attachments: vec![EnvelopeAttachment {
                filename: "terms.pdf".into(),
                content_type: "application/pdf".into(),
                data: vec![1, 2, 3],
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_assertions() {
        let mailer = LocalMailer::new();
        mailer.deliver(&welcome()).await.unwrap();

        assert_email_sent(&mailer);
        assert_email_count(&mailer, 1);
        assert_email_to(&mailer, "recipient@example.com");
        assert_email_from(&mailer, "sender@example.com");
        assert_email_subject(&mailer, "Welcome aboard!");
        assert_email_subject_contains(&mailer, "Welcome");
        assert_email_subject_matches(&mailer, r"^Welcome.*!$");
        assert_email_html_contains(&mailer, "<h1>Hello</h1>");
        assert_email_html_matches(&mailer, r"<h1>\w+</h1>");
        assert_email_has_attachment(&mailer, "terms.pdf");
        assert_email_matches(&mailer, |e| e.has_attachments());
        assert_headers_clean(&mailer);
        refute_email_to(&mailer, "other@example.com");
        assert_eq!(get_last_email(&mailer).envelope.subject, "Welcome aboard!");
    }

    #[tokio::test]
    #[should_panic(expected = "Expected at least one email")]
    async fn test_assert_sent_fails_when_empty() {
        let mailer = LocalMailer::new();
        assert_email_sent(&mailer);
    }

    #[tokio::test]
    #[should_panic(expected = "Expected no emails")]
    async fn test_assert_no_emails_fails_on_failed_attempt() {
        let mailer = LocalMailer::new();
        mailer.set_failure("down");
        let _ = mailer.deliver(&welcome()).await;
        assert_no_emails_sent(&mailer);
    }

    #[tokio::test]
    #[should_panic(expected = "raw line breaks")]
    async fn test_headers_clean_catches_line_breaks() {
        let mailer = LocalMailer::new();
        let mut envelope = welcome();
        envelope.subject = "Hi\r\nBcc: x@example.com".into();
        mailer.deliver(&envelope).await.unwrap();
        assert_headers_clean(&mailer);
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let text = "é".repeat(400);
        assert!(preview(&text).len() <= 500);
    }
}
