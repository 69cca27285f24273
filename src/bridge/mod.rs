mod dispatcher;
mod pending;
mod relay;

pub use pending::PendingRequests;

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    application::config::BridgeConfig,
    domain::error::BridgeError,
    interfaces::{
        channel::{ChannelSubscription, ExtensionChannel},
        dom::{CustomEvent, ListenerId, NodeId, Page},
    },
    protocol::{
        PageMessage,
        events::{EVENT_ABORT_API_REQUEST, EVENT_API_REQUEST, EVENT_OAUTH2_TOKEN_REQUESTED},
    },
};

pub const HOST_TAG_NAME: &str = "api-console-ext-comm";

type ConsoleHandler = fn(&ExtensionBridge, &mut CustomEvent);

/// Relays API console events to the API console extension and turns the
/// extension's replies back into DOM events.
///
/// The bridge owns a host element under `body`; every event it emits is
/// dispatched there and bubbles. Console events are observed on the bound
/// event target, `body` unless [`ExtensionBridge::set_event_target`] says
/// otherwise. Clones share the same bridge.
#[derive(Clone)]
pub struct ExtensionBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    page: Page,
    channel: Arc<dyn ExtensionChannel>,
    host: NodeId,
    event_target: Mutex<NodeId>,
    registrations: Mutex<Vec<ListenerId>>,
    pending: PendingRequests,
    has_extension: AtomicBool,
    pump: Mutex<Option<MessagePump>>,
}

struct MessagePump {
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl ExtensionBridge {
    pub fn new(
        page: Page,
        channel: Arc<dyn ExtensionChannel>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let host = page.create_element(page.body(), HOST_TAG_NAME)?;
        let event_target = page.body();

        Ok(Self {
            inner: Arc::new(BridgeInner {
                config,
                page,
                channel,
                host,
                event_target: Mutex::new(event_target),
                registrations: Mutex::new(Vec::new()),
                pending: PendingRequests::new(),
                has_extension: AtomicBool::new(false),
                pump: Mutex::new(None),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn page(&self) -> &Page {
        &self.inner.page
    }

    #[must_use]
    pub fn host(&self) -> NodeId {
        self.inner.host
    }

    #[must_use]
    pub fn event_target(&self) -> NodeId {
        *lock(&self.inner.event_target)
    }

    #[must_use]
    pub fn has_extension(&self) -> bool {
        self.inner.has_extension.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn pending_requests(&self) -> &PendingRequests {
        &self.inner.pending
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        lock(&self.inner.pump).is_some()
    }

    /// Starts observing console events on the bound target, starts listening
    /// on the window channel and probes for the extension. Must be called
    /// from within a tokio runtime. Attaching twice is a no-op.
    pub fn attach(&self) -> Result<(), BridgeError> {
        let mut pump = lock(&self.inner.pump);
        if pump.is_some() {
            debug!("extension bridge already attached host={}", self.inner.host);
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|error| {
            BridgeError::Unavailable(format!("attach requires a tokio runtime: {error}"))
        })?;

        // Subscribe before probing so the extension's reply cannot be missed.
        let receiver = self.inner.channel.subscribe();
        let target = self.event_target();
        {
            let mut registrations = lock(&self.inner.registrations);
            *registrations = self.observe_console_events(target)?;
        }

        let cancel = CancellationToken::new();
        let task = runtime.spawn(run_message_pump(
            Arc::downgrade(&self.inner),
            receiver,
            cancel.clone(),
            self.inner.config.pending_ttl.is_some(),
            self.inner.config.sweep_interval,
        ));
        *pump = Some(MessagePump {
            cancel,
            _task: task,
        });
        drop(pump);

        info!(
            "extension bridge attached host={} target={target}",
            self.inner.host
        );
        self.notify_extension();
        Ok(())
    }

    /// Stops observing console events and stops reading the window channel.
    /// Pending requests are kept.
    pub fn detach(&self) {
        let Some(pump) = lock(&self.inner.pump).take() else {
            return;
        };
        pump.cancel.cancel();

        let removed = self.unobserve_console_events();
        info!(
            "extension bridge detached host={} listeners_removed={removed} pending={}",
            self.inner.host,
            self.inner.pending.len()
        );
    }

    /// Moves console event observation to `node`. While attached, the new
    /// listeners are installed before the old ones are removed, under one lock.
    pub fn set_event_target(&self, node: NodeId) -> Result<(), BridgeError> {
        if !self.inner.page.contains(node) {
            return Err(BridgeError::UnknownNode(node.as_u64()));
        }

        let pump = lock(&self.inner.pump);
        let mut registrations = lock(&self.inner.registrations);
        let previous = self.event_target();
        if previous == node {
            return Ok(());
        }

        if pump.is_some() {
            let observed = self.observe_console_events(node)?;
            *lock(&self.inner.event_target) = node;
            for id in registrations.drain(..) {
                self.inner.page.remove_event_listener(id);
            }
            *registrations = observed;
        } else {
            *lock(&self.inner.event_target) = node;
        }

        debug!("event target changed from={previous} to={node}");
        Ok(())
    }

    /// Posts the installed probe; an installed extension answers with `init`.
    pub fn notify_extension(&self) {
        if let Err(error) = self.post(&PageMessage::InstalledProbe) {
            warn!("failed to probe for the extension: {error}");
        }
    }

    /// Drops pending requests older than the configured TTL. Does nothing when
    /// no TTL is configured.
    pub fn sweep_expired(&self, now: Instant) -> Vec<String> {
        let Some(ttl) = self.inner.config.pending_ttl else {
            return Vec::new();
        };
        let expired = self.inner.pending.sweep_expired(now, ttl);
        for id in &expired {
            warn!("pending request expired without a response id={id}");
        }
        expired
    }

    fn observe_console_events(&self, node: NodeId) -> Result<Vec<ListenerId>, BridgeError> {
        let handlers: [(&str, ConsoleHandler); 3] = [
            (EVENT_API_REQUEST, Self::handle_outgoing_request),
            (EVENT_ABORT_API_REQUEST, Self::handle_outgoing_abort),
            (EVENT_OAUTH2_TOKEN_REQUESTED, Self::handle_outgoing_token_request),
        ];

        let mut registered = Vec::with_capacity(handlers.len());
        for (event, handler) in handlers {
            let bridge = Arc::downgrade(&self.inner);
            let result = self.inner.page.add_event_listener(
                node,
                event,
                Arc::new(move |event: &mut CustomEvent| {
                    if let Some(inner) = bridge.upgrade() {
                        handler(&ExtensionBridge { inner }, event);
                    }
                }),
            );
            match result {
                Ok(id) => registered.push(id),
                Err(error) => {
                    for id in registered {
                        self.inner.page.remove_event_listener(id);
                    }
                    return Err(error);
                }
            }
        }
        Ok(registered)
    }

    fn unobserve_console_events(&self) -> usize {
        let mut registrations = lock(&self.inner.registrations);
        registrations
            .drain(..)
            .filter(|id| self.inner.page.remove_event_listener(*id))
            .count()
    }

    fn post(&self, message: &PageMessage) -> Result<(), BridgeError> {
        let value = message.to_value()?;
        self.inner.channel.post(value)
    }

    fn emit(&self, name: &str, detail: serde_json::Value) {
        let mut event = CustomEvent::new(name).bubbling().with_detail(detail);
        if let Err(error) = self.inner.page.dispatch_event(self.inner.host, &mut event) {
            warn!("failed to dispatch event={name}: {error}");
        }
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        let pump = self
            .pump
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pump) = pump {
            pump.cancel.cancel();
        }
        let registrations = self
            .registrations
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for id in registrations.drain(..) {
            self.page.remove_event_listener(id);
        }
    }
}

async fn run_message_pump(
    bridge: Weak<BridgeInner>,
    mut receiver: ChannelSubscription,
    cancel: CancellationToken,
    sweep_enabled: bool,
    sweep_interval: Duration,
) {
    let mut ticker = tokio::time::interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            received = receiver.recv() => {
                let Some(message) = received else {
                    debug!("window channel closed");
                    break;
                };
                let Some(inner) = bridge.upgrade() else {
                    break;
                };
                ExtensionBridge { inner }.handle_incoming_message(&message);
            }
            _ = ticker.tick(), if sweep_enabled => {
                let Some(inner) = bridge.upgrade() else {
                    break;
                };
                ExtensionBridge { inner }.sweep_expired(Instant::now());
            }
        }
    }

    debug!("extension bridge message pump stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
