//! Local adapter tests.

use hermes::providers::{LocalMailer, LOCAL_DEFAULT_QUOTA};
use hermes::{Address, DispatchError, Dispatchable, Email, Envelope, Mailer, SendQuota};

fn envelope(to: &str, subject: &str) -> Envelope {
    Email::new()
        .to(to)
        .subject(subject)
        .body("<p>Hello!</p>")
        .to_envelope(&Address::new("tony.stark@example.com"))
        .unwrap()
}

// ============================================================================
// Basic Delivery Tests
// ============================================================================

#[tokio::test]
async fn deliver_returns_ok() {
    let mailer = LocalMailer::new();

    let result = mailer
        .deliver(&envelope("steve.rogers@example.com", "Hello, Avengers!"))
        .await;
    assert!(result.is_ok());
    assert_eq!(result.unwrap().status, 200);
}

// ============================================================================
// Storage Tests
// ============================================================================

#[tokio::test]
async fn captures_sent_envelopes() {
    let mailer = LocalMailer::new();

    mailer
        .deliver(&envelope("steve.rogers@example.com", "Hello, Avengers!"))
        .await
        .unwrap();

    assert!(mailer.has_envelopes());
    assert_eq!(mailer.envelope_count(), 1);
    assert!(mailer.sent_to("steve.rogers@example.com"));
    assert!(mailer.sent_with_subject("Hello, Avengers!"));
    assert_eq!(mailer.last_envelope().unwrap().envelope.from, "tony.stark@example.com");
}

#[tokio::test]
async fn clones_share_captured_envelopes() {
    let mailer = LocalMailer::new();
    let handle = mailer.clone();

    mailer.deliver(&envelope("c@example.com", "Shared")).await.unwrap();
    assert_eq!(handle.envelope_count(), 1);
}

#[tokio::test]
async fn can_flush_envelopes() {
    let mailer = LocalMailer::new();

    mailer.deliver(&envelope("c@example.com", "Test 1")).await.unwrap();
    mailer.deliver(&envelope("c@example.com", "Test 2")).await.unwrap();

    let flushed = mailer.flush();
    assert_eq!(flushed.len(), 2);
    assert_eq!(flushed[0].envelope.subject, "Test 1");
    assert_eq!(mailer.envelope_count(), 0);
}

// ============================================================================
// Failure Simulation Tests
// ============================================================================

#[tokio::test]
async fn can_simulate_failure() {
    let mailer = LocalMailer::new();
    mailer.set_failure("connection refused");

    let result = mailer.deliver(&envelope("steve.rogers@example.com", "Test")).await;
    assert!(result.unwrap_err().to_string().contains("connection refused"));

    mailer.clear_failure();
    assert!(mailer.deliver(&envelope("steve.rogers@example.com", "Test")).await.is_ok());
    assert_eq!(mailer.deliver_calls(), 2);
    assert_eq!(mailer.envelope_count(), 1);
}

#[tokio::test]
async fn non_success_status_is_not_captured() {
    let mailer = LocalMailer::new();
    mailer.set_status(429);

    let result = mailer.deliver(&envelope("a@example.com", "Throttled")).await.unwrap();
    assert!(!result.is_success());
    assert!(!mailer.has_envelopes());
}

// ============================================================================
// Quota Tests
// ============================================================================

#[tokio::test]
async fn quota_is_scriptable() {
    let mailer = LocalMailer::new();
    assert_eq!(mailer.quota().await.unwrap(), LOCAL_DEFAULT_QUOTA);

    mailer.set_quota(SendQuota::new(2.0, 100.0, 40.0));
    assert_eq!(mailer.quota().await.unwrap().remaining().unwrap(), 60);

    mailer.set_quota_failure("throttled");
    assert!(matches!(
        mailer.quota().await,
        Err(DispatchError::Provider { provider: "local", .. })
    ));

    let limited = LocalMailer::with_quota(SendQuota::new(1.0, 1.0, 1.0));
    assert_eq!(limited.quota().await.unwrap().remaining().unwrap(), 0);
}

// ============================================================================
// Provider Name Test
// ============================================================================

#[test]
fn provider_name_returns_local() {
    let mailer = LocalMailer::new();
    assert_eq!(mailer.provider_name(), "local");
}
