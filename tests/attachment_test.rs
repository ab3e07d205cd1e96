//! Attachment tests.

use hermes::{Attachment, DispatchError};
use serde_json::json;

// ============================================================================
// Constructor Tests
// ============================================================================

#[test]
fn from_bytes_creates_attachment() {
    let attachment = Attachment::from_bytes("avatar.png", [0x89, b'P', b'N', b'G']);
    assert_eq!(attachment.filename, "avatar.png");
    assert_eq!(attachment.mime_type, "image/png");
    assert_eq!(attachment.base64_content, "iVBORw==");
}

#[test]
fn from_bytes_with_unknown_extension_uses_octet_stream() {
    let attachment = Attachment::from_bytes("data.qqqzzz", b"x");
    assert_eq!(attachment.mime_type, "application/octet-stream");
}

// ============================================================================
// Content Type Tests
// ============================================================================

#[test]
fn content_type_is_guessed_when_missing() {
    let attachment: Attachment = serde_json::from_value(json!({
        "filename": "invoice.pdf",
        "base64Content": "JVBERi0="
    }))
    .unwrap();
    assert!(attachment.mime_type.is_empty());
    assert_eq!(attachment.content_type(), "application/pdf");
}

#[test]
fn content_type_can_be_overridden() {
    let attachment = Attachment::from_bytes("data.txt", b"a,b").mime_type("text/csv");
    assert_eq!(attachment.content_type(), "text/csv");
}

// ============================================================================
// Decode Tests
// ============================================================================

#[test]
fn decode_ignores_line_wrapping_and_stray_characters() {
    let attachment = Attachment {
        filename: "note.txt".into(),
        mime_type: "text/plain".into(),
        base64_content: "SGVs\nbG8g\r\nV29y bGQ=\t".into(),
    };
    assert_eq!(attachment.decode().unwrap(), b"Hello World");
}

#[test]
fn decode_rejects_truncated_content() {
    let attachment = Attachment {
        filename: "note.txt".into(),
        mime_type: "text/plain".into(),
        base64_content: "SGVsbG".into(),
    };
    let err = attachment.decode().unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
    assert!(err.to_string().contains("note.txt"));
}

#[test]
fn validate_requires_filename() {
    let attachment = Attachment::from_bytes("  ", b"x");
    assert!(attachment.validate().is_err());
}

#[test]
fn serializes_with_camel_case_fields() {
    let value = serde_json::to_value(Attachment::from_bytes("a.txt", b"hi")).unwrap();
    assert_eq!(value["mimeType"], "text/plain");
    assert_eq!(value["base64Content"], "aGk=");
}
