use std::{future::Future, sync::Arc};

use serde_json::{Value, json};
use tokio::{sync::mpsc, time::Instant};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    application::config::{Args, RuntimeConfig},
    bridge::ExtensionBridge,
    domain::error::BridgeError,
    interfaces::{
        channel::{ExtensionChannel, WindowChannel},
        dom::{CustomEvent, NodeId, Page},
        loopback::LoopbackExtension,
    },
    protocol::events::{
        EVENT_API_REQUEST, EVENT_API_RESPONSE, EVENT_EXTENSION_INSTALLED,
        EVENT_HAS_EXTENSION_CHANGED, EVENT_OAUTH2_ERROR, EVENT_OAUTH2_TOKEN_REQUESTED,
        EVENT_OAUTH2_TOKEN_RESPONSE,
    },
};

const CONSOLE_TAG_NAME: &str = "api-console";

#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub extension_detected: bool,
    pub events: Vec<(String, Value)>,
    pub unanswered: Vec<String>,
}

pub async fn run(args: Args) -> Result<(), BridgeError> {
    let config = RuntimeConfig::from_args(args)
        .map_err(|error| BridgeError::InvalidConfig(format!("configuration error: {error}")))?;

    init_logging(&config.log_filter, config.json_logs)?;

    let report = run_session(config, shutdown_signal()).await?;
    for (name, detail) in &report.events {
        println!("{}", json!({ "event": name, "detail": detail }));
    }
    info!(
        "session finished extension_detected={} events={} unanswered={}",
        report.extension_detected,
        report.events.len(),
        report.unanswered.len()
    );
    Ok(())
}

/// Runs one console session: waits for the extension, fires the planned
/// requests from the console element and collects whatever the bridge emits
/// until every request is answered, the wait deadline passes or `shutdown`
/// resolves.
pub async fn run_session(
    config: RuntimeConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<SessionReport, BridgeError> {
    let channel: Arc<dyn ExtensionChannel> = Arc::new(WindowChannel::new());
    let loopback = config
        .loopback
        .clone()
        .map(|loopback| LoopbackExtension::spawn(Arc::clone(&channel), loopback));

    let page = Page::new();
    let console = page.create_element(page.body(), CONSOLE_TAG_NAME)?;
    let bridge = ExtensionBridge::new(page.clone(), Arc::clone(&channel), config.bridge.clone())?;
    bridge.set_event_target(console)?;

    let (sender, mut receiver) = mpsc::unbounded_channel::<(String, Value)>();
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
        )?;
    }
    drop(sender);

    info!(
        "starting console session loopback={} requests={} token_request={}",
        loopback.is_some(),
        config.session.urls.len(),
        config.session.oauth_state.is_some()
    );
    bridge.attach()?;

    let deadline = tokio::time::sleep_until(Instant::now() + config.session.wait);
    tokio::pin!(deadline);
    tokio::pin!(shutdown);

    let mut report = SessionReport::default();
    while !report.extension_detected {
        tokio::select! {
            () = &mut deadline => break,
            () = &mut shutdown => break,
            received = receiver.recv() => {
                let Some((name, detail)) = received else { break };
                report.extension_detected |= name == EVENT_EXTENSION_INSTALLED;
                report.events.push((name, detail));
            }
        }
    }

    if report.extension_detected {
        let mut expected = fire_planned_requests(&page, console, &config)?;
        while expected > 0 {
            tokio::select! {
                () = &mut deadline => break,
                () = &mut shutdown => break,
                received = receiver.recv() => {
                    let Some((name, detail)) = received else { break };
                    if is_reply_event(&name) {
                        expected -= 1;
                    }
                    report.events.push((name, detail));
                }
            }
        }
    } else {
        warn!("no api console extension detected, planned requests were not sent");
    }

    report.unanswered = bridge.pending_requests().ids();
    bridge.detach();
    if let Some(loopback) = loopback {
        loopback.stop().await;
    }
    Ok(report)
}

fn fire_planned_requests(
    page: &Page,
    console: NodeId,
    config: &RuntimeConfig,
) -> Result<usize, BridgeError> {
    let mut fired = 0usize;
    for url in &config.session.urls {
        let id = format!("request-{}", uuid::Uuid::new_v4());
        let mut event = CustomEvent::new(EVENT_API_REQUEST)
            .bubbling()
            .cancelable()
            .with_detail(json!({
                "id": id,
                "method": config.session.method,
                "url": url,
                "headers": "",
            }));
        page.dispatch_event(console, &mut event)?;
        if event.default_prevented() {
            fired += 1;
        } else {
            warn!("request was not taken by the bridge id={id} url={url}");
        }
    }

    if let Some(state) = &config.session.oauth_state {
        let mut event = CustomEvent::new(EVENT_OAUTH2_TOKEN_REQUESTED)
            .bubbling()
            .cancelable()
            .with_detail(json!({ "state": state }));
        page.dispatch_event(console, &mut event)?;
        if event.default_prevented() {
            fired += 1;
        } else {
            warn!("token request was not taken by the bridge state={state}");
        }
    }

    Ok(fired)
}

fn is_reply_event(name: &str) -> bool {
    matches!(
        name,
        EVENT_API_RESPONSE | EVENT_OAUTH2_TOKEN_RESPONSE | EVENT_OAUTH2_ERROR
    )
}

fn init_logging(filter: &str, json_logs: bool) -> Result<(), BridgeError> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json_logs {
        builder.json().try_init().map_err(|error| {
            BridgeError::Unavailable(format!("failed to initialize logger: {error}"))
        })?;
    } else {
        builder.compact().try_init().map_err(|error| {
            BridgeError::Unavailable(format!("failed to initialize logger: {error}"))
        })?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
