//! Logger adapter tests.

use hermes::providers::LoggerMailer;
use hermes::{Address, Dispatchable, Email, Envelope, Mailer, SendQuota};

// ============================================================================
// Helper Functions
// ============================================================================

fn envelope(email: Email) -> Envelope {
    email
        .to_envelope(&Address::with_name("T Stark", "tony.stark@example.com"))
        .unwrap()
}

// ============================================================================
// Basic Delivery Tests
// ============================================================================

#[tokio::test]
async fn deliver_returns_ok() {
    let mailer = LoggerMailer::new();

    let email = Email::new()
        .to("steve.rogers@example.com")
        .subject("Hello, Avengers!")
        .body("<p>Hello!</p>");

    let delivery = mailer.deliver(&envelope(email)).await.unwrap();
    assert!(delivery.is_success());
    assert!(!delivery.message_id.is_empty());
}

#[tokio::test]
async fn deliver_with_all_fields_and_full_logging_returns_ok() {
    let mailer = LoggerMailer::full();

    let email = Email::new()
        .to("steve.rogers@example.com")
        .to(("Bruce Banner", "bruce.banner@example.com"))
        .cc("natasha.romanoff@example.com")
        .bcc("nick.fury@example.com")
        .reply_to("pepper.potts@example.com")
        .subject("Hello, Avengers!")
        .body("<h1>Hello</h1>");

    assert!(mailer.deliver(&envelope(email)).await.is_ok());
}

#[tokio::test]
async fn each_delivery_gets_its_own_id() {
    let mailer = LoggerMailer::default();
    let email = Email::new().to("c@example.com").subject("Test").body("x");

    let first = mailer.deliver(&envelope(email.clone())).await.unwrap();
    let second = mailer.deliver(&envelope(email)).await.unwrap();
    assert_ne!(first.message_id, second.message_id);
}

// ============================================================================
// Quota Tests
// ============================================================================

#[tokio::test]
async fn reports_default_quota() {
    let quota = LoggerMailer::new().quota().await.unwrap();
    assert_eq!(quota, SendQuota::new(14.0, 50_000.0, 0.0));
}

#[tokio::test]
async fn reports_configured_quota() {
    let mailer = LoggerMailer::new().log_full(true).with_quota(SendQuota::new(2.0, 10.0, 3.0));
    let quota = mailer.quota().await.unwrap();
    assert_eq!(quota.remaining().unwrap(), 7);
}

// ============================================================================
// Provider Name Test
// ============================================================================

#[test]
fn provider_name_returns_logger() {
    let mailer = LoggerMailer::new();
    assert_eq!(mailer.provider_name(), "logger");
    assert!(mailer.validate_config().is_ok());
}
