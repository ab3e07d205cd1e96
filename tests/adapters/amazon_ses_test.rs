//! Amazon SES adapter tests.
//!
//! Note: AWS Signature v4 depends on the current timestamp, so the exact
//! signature can't be asserted here. These tests verify paths, bodies,
//! signed header presence and response parsing.

use hermes::providers::AmazonSesMailer;
use hermes::{Address, Attachment, DispatchError, Dispatchable, Email, Envelope, Mailer};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helper Functions
// ============================================================================

fn mailer(server: &MockServer) -> AmazonSesMailer {
    AmazonSesMailer::new("us-east-1", "test_access", "test_secret").host(server.uri())
}

fn valid_envelope() -> Envelope {
    Email::new()
        .to("elaine.marley@triisland.gov")
        .subject("Mighty Pirate Newsletter")
        .body("<h1>Hello</h1>")
        .to_envelope(&Address::with_name("Guybrush", "guybrush.threepwood@pirates.grog"))
        .unwrap()
}

fn success_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "MessageId": "messageId" }))
}

fn account_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "DedicatedIpAutoWarmupEnabled": false,
        "EnforcementStatus": "HEALTHY",
        "ProductionAccessEnabled": true,
        "SendQuota": {
            "Max24HourSend": 50000.0,
            "MaxSendRate": 14.0,
            "SentLast24Hours": 1234.0
        },
        "SendingEnabled": true
    }))
}

// ============================================================================
// Quota Tests
// ============================================================================

#[tokio::test]
async fn quota_reads_send_quota() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/email/account"))
        .and(header_exists("authorization"))
        .and(header_exists("x-amz-date"))
        .respond_with(account_response())
        .expect(1)
        .mount(&server)
        .await;

    let quota = mailer(&server).quota().await.unwrap();
    assert_eq!(quota.max_send_rate, 14.0);
    assert_eq!(quota.max_24_hour_send, 50000.0);
    assert_eq!(quota.sent_last_24_hours, 1234.0);
    assert_eq!(quota.remaining().unwrap(), 48766);
}

#[tokio::test]
async fn quota_error_carries_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/email/account"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({ "message": "The security token included in the request is invalid." })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = mailer(&server).quota().await.unwrap_err();
    match err {
        DispatchError::Provider { provider, message, status } => {
            assert_eq!(provider, "amazon_ses");
            assert_eq!(status, Some(403));
            assert!(message.contains("security token"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn quota_with_malformed_body_is_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/email/account"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    assert!(mailer(&server).quota().await.is_err());
}

// ============================================================================
// Basic Delivery Tests
// ============================================================================

#[tokio::test]
async fn successful_delivery_returns_ok() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/email/outbound-emails"))
        .and(header("content-type", "application/json"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({
            "FromEmailAddress": "\"Guybrush\" <guybrush.threepwood@pirates.grog>",
            "Destination": { "ToAddresses": ["elaine.marley@triisland.gov"] },
            "Content": {
                "Simple": {
                    "Subject": { "Data": "Mighty Pirate Newsletter", "Charset": "UTF-8" },
                    "Body": { "Html": { "Data": "<h1>Hello</h1>", "Charset": "UTF-8" } }
                }
            }
        })))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    let delivery = mailer(&server).deliver(&valid_envelope()).await.unwrap();
    assert_eq!(delivery.message_id, "messageId");
    assert!(delivery.is_success());
}

#[tokio::test]
async fn deliver_with_all_fields_returns_ok() {
    let server = MockServer::start().await;

    let envelope = Email::new()
        .to("elaine.marley@triisland.gov")
        .cc("herman.toothrot@monkey.island")
        .bcc("lechuck@ghost.ship")
        .reply_to("stan@used.boats")
        .subject("Mighty Pirate Newsletter")
        .body("<h1>Hello</h1>")
        .attachment(Attachment::from_bytes("map.txt", b"X marks the spot"))
        .to_envelope(&Address::new("guybrush.threepwood@pirates.grog"))
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/v2/email/outbound-emails"))
        .and(body_partial_json(json!({
            "Destination": {
                "ToAddresses": ["elaine.marley@triisland.gov"],
                "CcAddresses": ["herman.toothrot@monkey.island"],
                "BccAddresses": ["lechuck@ghost.ship"]
            },
            "ReplyToAddresses": ["stan@used.boats"],
            "ConfigurationSetName": "transactional",
            "Content": {
                "Simple": {
                    "Attachments": [{
                        "FileName": "map.txt",
                        "ContentType": "text/plain",
                        "RawContent": "WCBtYXJrcyB0aGUgc3BvdA=="
                    }]
                }
            }
        })))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    let result = mailer(&server)
        .configuration_set_name("transactional")
        .deliver(&envelope)
        .await;
    assert!(result.is_ok());
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[tokio::test]
async fn api_error_parses_correctly() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/email/outbound-emails"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "message": "Email address is not verified." })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = mailer(&server).deliver(&valid_envelope()).await.unwrap_err();
    assert!(err.to_string().contains("Email address is not verified."));
    assert!(matches!(err, DispatchError::Provider { status: Some(400), .. }));
}

#[tokio::test]
async fn throttling_error_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/email/outbound-emails"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "Message": "Maximum sending rate exceeded." })))
        .mount(&server)
        .await;

    let err = mailer(&server).deliver(&valid_envelope()).await.unwrap_err();
    assert!(err.to_string().contains("Maximum sending rate exceeded."));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn empty_error_body_reports_unknown_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/email/outbound-emails"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = mailer(&server).deliver(&valid_envelope()).await.unwrap_err();
    assert!(err.to_string().contains("Unknown error"));
}

// ============================================================================
// Security Token Test (for IAM roles)
// ============================================================================

#[tokio::test]
async fn delivery_with_security_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/email/outbound-emails"))
        .and(header("x-amz-security-token", "temporary-session-token"))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    let result = mailer(&server)
        .session_token("temporary-session-token")
        .deliver(&valid_envelope())
        .await;
    assert!(result.is_ok());
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn provider_name_returns_amazon_ses() {
    let mailer = AmazonSesMailer::new("us-east-1", "test_access", "test_secret");
    assert_eq!(mailer.provider_name(), "amazon_ses");
    assert!(mailer.validate_config().is_ok());
}

#[test]
fn empty_credentials_fail_validation() {
    let mailer = AmazonSesMailer::new("us-east-1", "", "test_secret");
    assert!(matches!(
        mailer.validate_config(),
        Err(DispatchError::Configuration(_))
    ));
}
