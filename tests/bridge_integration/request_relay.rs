use std::collections::HashSet;

use api_console_bridge::{
    application::config::{BridgeConfig, LoopbackConfig},
    protocol::events::{
        EVENT_ABORT_API_REQUEST, EVENT_API_REQUEST, EVENT_API_RESPONSE, EVENT_EXTENSION_INSTALLED,
    },
};
use serde_json::json;

use super::support::{harness, harness_with, request_detail, response_message};

#[tokio::test]
async fn cancels_request_event_on_bound_target() {
    let mut h = harness();
    let event = h.fire_request(h.target);

    assert!(event.default_prevented());
    assert!(event.propagation_stopped());
    assert!(h.bridge.pending_requests().contains("test-id"));

    let posted = h.posted_with("api-console-request");
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0]["detail"], request_detail());
    assert_eq!(posted[0]["api-console-page"], true);

    h.stop().await;
}

#[tokio::test]
async fn request_event_does_not_reach_listeners_above_target() {
    let h = harness();
    h.fire_request(h.target);
    assert_eq!(h.body_request_calls(), 0);
    h.stop().await;
}

#[tokio::test]
async fn response_event_carries_original_request_and_clears_pending() {
    let mut h = harness();
    h.fire_request(h.target);

    h.extension_says(response_message("test-id"));

    let events = h.drain_events();
    assert_eq!(events.len(), 1);
    let (name, detail) = &events[0];
    assert_eq!(name, EVENT_API_RESPONSE);
    assert_eq!(detail["id"], "test-id");
    assert_eq!(detail["request"], request_detail());
    assert!(detail["result"].is_object());
    assert_eq!(detail["result"]["logs"], json!([]));
    assert!(!h.bridge.pending_requests().contains("test-id"));

    h.stop().await;
}

#[tokio::test]
async fn response_for_unknown_id_is_dropped() {
    let mut h = harness();
    h.fire_request(h.target);

    h.extension_says(response_message("other-id"));

    assert!(h.drain_events().is_empty());
    assert!(h.bridge.pending_requests().contains("test-id"));
    h.stop().await;
}

#[tokio::test]
async fn second_response_for_same_id_is_dropped() {
    let mut h = harness();
    h.fire_request(h.target);

    h.extension_says(response_message("test-id"));
    h.extension_says(response_message("test-id"));

    let responses = h
        .drain_events()
        .into_iter()
        .filter(|(name, _)| name == EVENT_API_RESPONSE)
        .count();
    assert_eq!(responses, 1);
    h.stop().await;
}

#[tokio::test]
async fn response_without_extension_marker_is_ignored() {
    let mut h = harness();
    h.fire_request(h.target);

    let mut forged = response_message("test-id");
    forged["api-console-extension"] = json!(false);
    h.extension_says(forged);

    assert!(h.drain_events().is_empty());
    assert!(h.bridge.pending_requests().contains("test-id"));
    h.stop().await;
}

#[tokio::test]
async fn request_from_outside_target_is_left_alone() {
    let mut h = harness();
    let event = h.fire_request(h.page.document());

    assert!(!event.default_prevented());
    assert!(h.bridge.pending_requests().is_empty());
    assert!(h.posted_with("api-console-request").is_empty());
    h.stop().await;
}

#[tokio::test]
async fn request_from_descendant_of_target_is_left_alone() {
    let mut h = harness();
    let panel = h
        .page
        .create_element(h.target, "span")
        .expect("panel should be created");

    let event = h.fire_request(panel);

    assert!(!event.default_prevented());
    assert!(!event.propagation_stopped());
    assert_eq!(h.body_request_calls(), 1);
    assert!(h.bridge.pending_requests().is_empty());
    assert!(h.posted_with("api-console-request").is_empty());
    h.stop().await;
}

#[tokio::test]
async fn reused_id_keeps_latest_descriptor() {
    let h = harness();
    h.fire_request(h.target);
    let mut second = request_detail();
    second["url"] = json!("other.com");
    h.fire(h.target, EVENT_API_REQUEST, second);

    assert_eq!(h.bridge.pending_requests().len(), 1);
    assert_eq!(
        h.bridge
            .pending_requests()
            .get("test-id")
            .map(|descriptor| descriptor.url),
        Some("other.com".to_owned())
    );
    h.stop().await;
}

#[tokio::test]
async fn malformed_request_is_left_unhandled() {
    let mut h = harness();
    let event = h.fire(
        h.target,
        EVENT_API_REQUEST,
        json!({ "id": "no-url", "method": "GET" }),
    );

    assert!(!event.default_prevented());
    assert_eq!(h.body_request_calls(), 1);
    assert!(h.bridge.pending_requests().is_empty());
    assert!(h.posted_with("api-console-request").is_empty());
    h.stop().await;
}

#[tokio::test]
async fn abort_forgets_pending_request_and_notifies_extension() {
    let mut h = harness();
    h.fire_request(h.target);

    let event = h.fire(h.target, EVENT_ABORT_API_REQUEST, json!({ "id": "test-id" }));

    assert!(event.default_prevented());
    assert!(h.bridge.pending_requests().is_empty());
    let aborts = h.posted_with("api-console-request-abort");
    assert_eq!(aborts.len(), 1);
    assert_eq!(aborts[0]["detail"], json!({ "id": "test-id" }));

    h.extension_says(response_message("test-id"));
    assert!(h.drain_events().is_empty());
    h.stop().await;
}

#[tokio::test]
async fn burst_of_requests_is_answered_in_full() {
    const BURST: usize = 300;
    let mut h = harness_with(BridgeConfig::for_test(), Some(LoopbackConfig::default()));
    h.next_event(EVENT_EXTENSION_INSTALLED).await;

    for index in 0..BURST {
        let mut detail = request_detail();
        detail["id"] = json!(format!("burst-{index}"));
        assert!(
            h.fire(h.target, EVENT_API_REQUEST, detail)
                .default_prevented()
        );
    }
    assert_eq!(h.bridge.pending_requests().len(), BURST);

    let mut answered = HashSet::new();
    while answered.len() < BURST {
        let detail = h.next_event(EVENT_API_RESPONSE).await;
        answered.insert(detail["id"].as_str().unwrap_or_default().to_owned());
    }
    assert!(h.bridge.pending_requests().is_empty());
    h.stop().await;
}
