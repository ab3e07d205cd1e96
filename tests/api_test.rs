//! HTTP submission endpoint tests.

#![cfg(feature = "axum")]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use hermes::api::submission_router;
use hermes::{MemoryQueue, MemoryStore, MessageState, MessageStore, Submitter};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const TABLE: &str = "HermesMessages";

fn setup() -> (axum::Router, MessageStore, Arc<MemoryQueue>) {
    let store = MemoryStore::shared();
    let queue = MemoryQueue::shared();
    let messages = MessageStore::new(store, TABLE);
    let app = submission_router(Submitter::tracked(messages.clone(), queue.clone()));
    (app, messages, queue)
}

fn post(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/messages")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn accepted_submission_returns_receipt() {
    let (app, messages, _) = setup();
    let body = json!({
        "to": ["alice@example.com"],
        "subject": "Welcome",
        "body": "<p>Hi Alice</p>"
    });

    let response = app.oneshot(post(body.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let receipt = json_body(response).await;
    let id = receipt["id"].as_str().unwrap();
    assert!(receipt["queueMessageId"].is_string());

    let record = messages.get(id).await.unwrap().unwrap();
    assert_eq!(record.state, MessageState::QueuedForSend);
}

#[tokio::test]
async fn invalid_email_is_bad_request() {
    let (app, _, queue) = setup();
    let body = json!({ "to": [], "subject": "Welcome", "body": "x" });

    let response = app.oneshot(post(body.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/problem+json"
    );

    let problem = json_body(response).await;
    assert_eq!(problem["status"], 400);
    assert_eq!(problem["title"], "Invalid email");
    assert!(queue.is_empty());
}

#[tokio::test]
async fn non_utf8_body_is_bad_request() {
    let (app, _, _) = setup();
    let response = app.oneshot(post(vec![0xff, 0xfe, 0x00])).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn infrastructure_failure_is_server_error() {
    let (app, _, queue) = setup();
    queue.set_failure("arn:aws:sqs:us-east-1:123456789012:hermes");
    let body = json!({ "to": ["alice@example.com"], "subject": "Welcome", "body": "x" });

    let response = app.oneshot(post(body.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let problem = json_body(response).await;
    assert_eq!(problem["status"], 500);
    assert!(!problem.to_string().contains("arn:aws"));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (app, _, _) = setup();
    let request = Request::builder()
        .uri("/nope")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
