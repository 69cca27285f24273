use std::sync::atomic::Ordering;

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::ExtensionBridge;
use crate::{
    domain::models::{ApiResponseDetail, TokenOutcome},
    protocol::{
        ExtensionMessage, ExtensionResponse,
        events::{
            EVENT_API_RESPONSE, EVENT_EXTENSION_INSTALLED, EVENT_HAS_EXTENSION_CHANGED,
            EVENT_OAUTH2_ERROR, EVENT_OAUTH2_TOKEN_RESPONSE,
        },
        parse_extension_message,
    },
};

impl ExtensionBridge {
    /// Handles one value seen on the window channel. Anything not posted by
    /// the extension is ignored, as is everything received while detached.
    pub fn handle_incoming_message(&self, message: &Value) {
        if !self.is_attached() {
            debug!("bridge detached, ignoring window message");
            return;
        }

        let message = match parse_extension_message(message) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(error) => {
                warn!("rejected extension message: {error}");
                return;
            }
        };

        match message {
            ExtensionMessage::Init => self.extension_detected(),
            ExtensionMessage::Response(response) => self.response_ready(response),
            ExtensionMessage::TokenResponse(outcome) => self.token_ready(outcome),
        }
    }

    fn extension_detected(&self) {
        if self
            .inner
            .has_extension
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("extension already detected");
            return;
        }

        info!("api console extension detected host={}", self.inner.host);
        self.emit(EVENT_HAS_EXTENSION_CHANGED, json!({ "value": true }));
        self.emit(EVENT_EXTENSION_INSTALLED, Value::Null);
    }

    fn response_ready(&self, response: ExtensionResponse) {
        let Some(pending) = self.inner.pending.take(&response.id) else {
            debug!(
                "dropping response for a request that is not pending id={}",
                response.id
            );
            return;
        };

        let detail = ApiResponseDetail {
            id: response.id,
            request: pending.descriptor,
            result: response.result,
        };
        match serde_json::to_value(&detail) {
            Ok(value) => {
                debug!(
                    "response ready id={} elapsed_ms={}",
                    detail.id,
                    pending.submitted_at.elapsed().as_millis()
                );
                self.emit(EVENT_API_RESPONSE, value);
            }
            Err(error) => error!("failed to encode response id={}: {error}", detail.id),
        }
    }

    fn token_ready(&self, outcome: TokenOutcome) {
        match outcome {
            TokenOutcome::Granted(grant) => match serde_json::to_value(&grant) {
                Ok(value) => {
                    debug!("token ready state={}", grant.state);
                    self.emit(EVENT_OAUTH2_TOKEN_RESPONSE, value);
                }
                Err(error) => error!("failed to encode token state={}: {error}", grant.state),
            },
            TokenOutcome::Failed(failure) => {
                warn!(
                    "extension reported an OAuth2 error state={} interactive={}: {}",
                    failure.state.as_deref().unwrap_or("-"),
                    failure.interactive,
                    failure.message
                );
                self.emit(
                    EVENT_OAUTH2_ERROR,
                    json!({
                        "state": failure.state,
                        "message": failure.message,
                        "interactive": failure.interactive,
                    }),
                );
            }
        }
    }
}
