use std::time::Instant;

use tracing::{debug, error, warn};

use super::ExtensionBridge;
use crate::{
    domain::models::{AbortRequest, RequestDescriptor, TokenRequest},
    interfaces::dom::CustomEvent,
    protocol::{PageMessage, parse_event_detail},
};

impl ExtensionBridge {
    /// `api-request` listener: takes the request away from every other
    /// consumer, remembers it by id and hands it to the extension.
    pub fn handle_outgoing_request(&self, event: &mut CustomEvent) {
        if !self.accepts(event) {
            return;
        }
        let descriptor = match parse_event_detail::<RequestDescriptor>(event.name(), event.detail())
        {
            Ok(descriptor) => descriptor,
            Err(error) => {
                warn!("leaving request event unhandled: {error}");
                return;
            }
        };

        event.prevent_default();
        event.stop_immediate_propagation();

        let id = descriptor.id.clone();
        if let Some(previous) = self
            .inner
            .pending
            .insert(descriptor.clone(), Instant::now())
        {
            warn!(
                "request id reused, replacing pending request id={id} previous_url={}",
                previous.descriptor.url
            );
        }

        debug!(
            "relaying request id={id} method={} url={}",
            descriptor.method, descriptor.url
        );
        if let Err(error) = self.post(&PageMessage::Request(descriptor)) {
            error!("failed to relay request id={id}: {error}");
            self.inner.pending.take(&id);
        }
    }

    /// `oauth2-token-requested` listener. Nothing is tracked locally; the
    /// extension echoes `state` back with the token.
    pub fn handle_outgoing_token_request(&self, event: &mut CustomEvent) {
        if !self.accepts(event) {
            return;
        }
        let request = match parse_event_detail::<TokenRequest>(event.name(), event.detail()) {
            Ok(request) => request,
            Err(error) => {
                warn!("leaving token request event unhandled: {error}");
                return;
            }
        };

        event.prevent_default();
        event.stop_immediate_propagation();

        debug!("relaying token request state={}", request.state);
        let state = request.state.clone();
        if let Err(error) = self.post(&PageMessage::OAuth2(request)) {
            error!("failed to relay token request state={state}: {error}");
        }
    }

    /// `abort-api-request` listener: forgets the pending request and tells the
    /// extension to stop working on it.
    pub fn handle_outgoing_abort(&self, event: &mut CustomEvent) {
        if !self.accepts(event) {
            return;
        }
        let abort = match parse_event_detail::<AbortRequest>(event.name(), event.detail()) {
            Ok(abort) => abort,
            Err(error) => {
                warn!("leaving abort event unhandled: {error}");
                return;
            }
        };

        event.prevent_default();
        event.stop_immediate_propagation();

        if self.inner.pending.take(&abort.id).is_none() {
            debug!("abort for a request that is not pending id={}", abort.id);
        }
        let id = abort.id.clone();
        if let Err(error) = self.post(&PageMessage::Abort(abort)) {
            error!("failed to relay abort id={id}: {error}");
        }
    }

    /// Only events fired on the bound target itself are taken. Events that
    /// bubble up from its descendants are left to the page, as are events
    /// still in flight on a node the bridge was rebound away from.
    fn accepts(&self, event: &CustomEvent) -> bool {
        let target = self.event_target();
        if event.target() != Some(target) || event.current_target() != Some(target) {
            debug!(
                "ignoring event={} not fired on the bound target target={target}",
                event.name()
            );
            return false;
        }
        if self.inner.config.require_presence && !self.has_extension() {
            debug!(
                "ignoring event={} until the extension is detected",
                event.name()
            );
            return false;
        }
        true
    }
}
