use api_console_bridge::protocol::events::{
    EVENT_OAUTH2_ERROR, EVENT_OAUTH2_TOKEN_REQUESTED, EVENT_OAUTH2_TOKEN_RESPONSE,
};
use serde_json::json;

use super::support::{harness, token_message};

#[tokio::test]
async fn cancels_token_request_without_tracking_it() {
    let mut h = harness();
    let event = h.fire_token_request(h.target);

    assert!(event.default_prevented());
    assert_eq!(h.body_request_calls(), 0);
    assert!(h.bridge.pending_requests().is_empty());

    let posted = h.posted_with("api-console-oauth2");
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0]["detail"], json!({ "state": "test-state" }));
    h.stop().await;
}

#[tokio::test]
async fn token_request_forwards_extra_fields() {
    let mut h = harness();
    h.fire(
        h.target,
        EVENT_OAUTH2_TOKEN_REQUESTED,
        json!({
            "state": "s-1",
            "clientId": "console",
            "scopes": ["read", "write"]
        }),
    );

    let posted = h.posted_with("api-console-oauth2");
    assert_eq!(posted[0]["detail"]["clientId"], "console");
    assert_eq!(posted[0]["detail"]["scopes"], json!(["read", "write"]));
    h.stop().await;
}

#[tokio::test]
async fn token_response_event_carries_grant() {
    let mut h = harness();
    h.fire_token_request(h.target);

    h.extension_says(token_message(json!({
        "state": "test-state",
        "accessToken": "tokenValue",
        "tokenType": "bearer",
        "expiresIn": "3600",
        "tokenTime": 1234
    })));

    let events = h.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, EVENT_OAUTH2_TOKEN_RESPONSE);
    assert_eq!(
        events[0].1,
        json!({
            "state": "test-state",
            "accessToken": "tokenValue",
            "tokenType": "bearer",
            "expiresIn": 3600,
            "tokenTime": 1234
        })
    );
    h.stop().await;
}

#[tokio::test]
async fn token_failure_becomes_error_event() {
    let mut h = harness();
    h.fire_token_request(h.target);

    h.extension_says(token_message(json!({
        "error": true,
        "interactive": false,
        "message": "error",
        "state": "test-state"
    })));

    let events = h.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, EVENT_OAUTH2_ERROR);
    assert_eq!(
        events[0].1,
        json!({
            "state": "test-state",
            "message": "error",
            "interactive": false
        })
    );
    h.stop().await;
}

#[tokio::test]
async fn malformed_token_response_emits_nothing() {
    let mut h = harness();
    h.extension_says(token_message(json!({
        "state": "test-state",
        "expiresIn": "soon"
    })));
    assert!(h.drain_events().is_empty());
    h.stop().await;
}

#[tokio::test]
async fn token_request_from_outside_target_is_left_alone() {
    let mut h = harness();
    let event = h.fire_token_request(h.page.body());

    assert!(!event.default_prevented());
    assert!(h.posted_with("api-console-oauth2").is_empty());
    h.stop().await;
}

#[tokio::test]
async fn token_request_without_state_is_left_unhandled() {
    let mut h = harness();
    let event = h.fire(
        h.target,
        EVENT_OAUTH2_TOKEN_REQUESTED,
        json!({ "clientId": "console" }),
    );

    assert!(!event.default_prevented());
    assert!(h.posted_with("api-console-oauth2").is_empty());
    h.stop().await;
}

#[tokio::test]
async fn token_request_from_descendant_of_target_is_left_alone() {
    let mut h = harness();
    let login = h
        .page
        .create_element(h.target, "oauth-button")
        .expect("button should be created");

    let event = h.fire_token_request(login);

    assert!(!event.default_prevented());
    assert_eq!(h.body_request_calls(), 1);
    assert!(h.posted_with("api-console-oauth2").is_empty());
    h.stop().await;
}
