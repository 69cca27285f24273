use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use api_console_bridge::{
    application::config::{BridgeConfig, LoopbackConfig},
    bridge::ExtensionBridge,
    interfaces::{
        channel::{ChannelSubscription, ExtensionChannel, WindowChannel},
        dom::{CustomEvent, NodeId, Page},
        loopback::LoopbackExtension,
    },
    protocol::events::{
        EVENT_ABORT_API_REQUEST, EVENT_API_REQUEST, EVENT_API_RESPONSE, EVENT_EXTENSION_INSTALLED,
        EVENT_HAS_EXTENSION_CHANGED, EVENT_OAUTH2_ERROR, EVENT_OAUTH2_TOKEN_REQUESTED,
        EVENT_OAUTH2_TOKEN_RESPONSE,
    },
};
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub(crate) const WAIT: Duration = Duration::from_secs(2);

pub(crate) struct Harness {
    pub(crate) page: Page,
    pub(crate) channel: Arc<WindowChannel>,
    pub(crate) bridge: ExtensionBridge,
    pub(crate) target: NodeId,
    pub(crate) body_request_calls: Arc<AtomicUsize>,
    outbox: ChannelSubscription,
    events: UnboundedReceiver<(String, Value)>,
    loopback: Option<LoopbackExtension>,
}

pub(crate) fn harness() -> Harness {
    harness_with(BridgeConfig::for_test(), None)
}

/// Page with a `div` under `body` bound as the event target and an attached
/// bridge. Must run inside a tokio runtime.
pub(crate) fn harness_with(config: BridgeConfig, loopback: Option<LoopbackConfig>) -> Harness {
    let channel = Arc::new(WindowChannel::new());
    let outbox = channel.subscribe();
    let shared: Arc<dyn ExtensionChannel> = channel.clone();
    let loopback = loopback.map(|config| LoopbackExtension::spawn(Arc::clone(&shared), config));

    let page = Page::new();
    let target = page
        .create_element(page.body(), "div")
        .expect("event target should be created");
    let bridge =
        ExtensionBridge::new(page.clone(), shared, config).expect("bridge should be created");
    bridge
        .set_event_target(target)
        .expect("event target should bind");

    let (sender, events) = mpsc::unbounded_channel();
    for name in [
        EVENT_HAS_EXTENSION_CHANGED,
        EVENT_EXTENSION_INSTALLED,
        EVENT_API_RESPONSE,
        EVENT_OAUTH2_TOKEN_RESPONSE,
        EVENT_OAUTH2_ERROR,
    ] {
        let sender = sender.clone();
        page.add_event_listener(
            page.body(),
            name,
            Arc::new(move |event: &mut CustomEvent| {
                let _ = sender.send((event.name().to_owned(), event.detail().clone()));
            }),
        )
        .expect("body listener should register");
    }

    let body_request_calls = Arc::new(AtomicUsize::new(0));
    for name in [
        EVENT_API_REQUEST,
        EVENT_ABORT_API_REQUEST,
        EVENT_OAUTH2_TOKEN_REQUESTED,
    ] {
        let calls = Arc::clone(&body_request_calls);
        page.add_event_listener(
            page.body(),
            name,
            Arc::new(move |_: &mut CustomEvent| {
                calls.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .expect("body spy should register");
    }

    bridge.attach().expect("bridge should attach");

    Harness {
        page,
        channel,
        bridge,
        target,
        body_request_calls,
        outbox,
        events,
        loopback,
    }
}

pub(crate) fn request_detail() -> Value {
    json!({
        "headers": "content-type: application/test",
        "id": "test-id",
        "method": "GET",
        "payload": "--test--",
        "url": "domain.com"
    })
}

pub(crate) fn response_message(id: &str) -> Value {
    json!({
        "api-console-payload": "api-console-response",
        "api-console-extension": true,
        "api-console-data": {
            "logs": [],
            "data": {
                "id": id,
                "request": {},
                "response": {}
            }
        }
    })
}

pub(crate) fn token_message(data: Value) -> Value {
    json!({
        "api-console-payload": "api-console-oauth2-token-response",
        "api-console-extension": true,
        "api-console-data": data
    })
}

pub(crate) fn init_message() -> Value {
    json!({
        "api-console-payload": "init",
        "api-console-extension": true
    })
}

impl Harness {
    pub(crate) fn fire(&self, node: NodeId, name: &str, detail: Value) -> CustomEvent {
        let mut event = CustomEvent::new(name)
            .bubbling()
            .cancelable()
            .with_detail(detail);
        self.page
            .dispatch_event(node, &mut event)
            .expect("dispatch should succeed");
        event
    }

    pub(crate) fn fire_request(&self, node: NodeId) -> CustomEvent {
        self.fire(node, EVENT_API_REQUEST, request_detail())
    }

    pub(crate) fn fire_token_request(&self, node: NodeId) -> CustomEvent {
        self.fire(
            node,
            EVENT_OAUTH2_TOKEN_REQUESTED,
            json!({ "state": "test-state" }),
        )
    }

    /// Delivers a message as if the extension had posted it.
    pub(crate) fn extension_says(&self, message: Value) {
        self.bridge.handle_incoming_message(&message);
    }

    /// Everything posted on the window channel so far.
    pub(crate) fn posted(&mut self) -> Vec<Value> {
        let mut posted = Vec::new();
        while let Ok(message) = self.outbox.try_recv() {
            posted.push(message);
        }
        posted
    }

    /// Page messages posted so far with the given `payload` tag.
    pub(crate) fn posted_with(&mut self, payload: &str) -> Vec<Value> {
        self.posted()
            .into_iter()
            .filter(|message| message["payload"] == payload)
            .collect()
    }

    pub(crate) fn drain_events(&mut self) -> Vec<(String, Value)> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub(crate) async fn next_event(&mut self, name: &str) -> Value {
        let wait = async {
            while let Some((event, detail)) = self.events.recv().await {
                if event == name {
                    return detail;
                }
            }
            panic!("event stream closed before {name}");
        };
        tokio::time::timeout(WAIT, wait)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
    }

    pub(crate) fn body_request_calls(&self) -> usize {
        self.body_request_calls.load(Ordering::SeqCst)
    }

    pub(crate) async fn stop(mut self) {
        self.bridge.detach();
        if let Some(loopback) = self.loopback.take() {
            loopback.stop().await;
        }
    }
}
