use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    application::config::LoopbackConfig,
    domain::models::{ExtensionResult, RequestDescriptor, TokenFailure, TokenOutcome, TokenRequest},
    interfaces::channel::ExtensionChannel,
    protocol::{
        EXTENSION_TOKEN_RESPONSE, ExtensionMessage, ExtensionResponse, PageMessage,
        parse_page_message,
    },
};

pub const LOOPBACK_ACCESS_TOKEN: &str = "tokenValue";
pub const LOOPBACK_TOKEN_TYPE: &str = "bearer";
pub const LOOPBACK_EXPIRES_IN: &str = "3600";
pub const LOOPBACK_TOKEN_ERROR_MESSAGE: &str = "error";

/// Stand-in for the extension's content script. It answers on the same window
/// channel the page uses, without executing anything: requests are echoed
/// back with an empty `200` response and token requests get a fixed grant.
pub struct LoopbackExtension {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LoopbackExtension {
    #[must_use]
    pub fn spawn(channel: Arc<dyn ExtensionChannel>, config: LoopbackConfig) -> Self {
        let receiver = channel.subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut receiver = receiver;
            loop {
                let received = tokio::select! {
                    () = token.cancelled() => break,
                    received = receiver.recv() => received,
                };
                let Some(message) = received else {
                    break;
                };

                let reply = match loopback_reply(&message, &config) {
                    Ok(Some(reply)) => reply,
                    Ok(None) => continue,
                    Err(error) => {
                        warn!("loopback extension could not answer: {error}");
                        continue;
                    }
                };

                let channel = Arc::clone(&channel);
                let latency = config.latency;
                tokio::spawn(async move {
                    tokio::time::sleep(latency).await;
                    if let Err(error) = channel.post(reply) {
                        warn!("loopback extension reply was not delivered: {error}");
                    }
                });
            }
            debug!("loopback extension stopped");
        });

        Self { cancel, task }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(error) = self.task.await {
            warn!("loopback extension task failed: {error}");
        }
    }
}

/// Builds the reply the loopback extension posts for `message`, if any.
pub fn loopback_reply(message: &Value, config: &LoopbackConfig) -> Result<Option<Value>, String> {
    let message = match parse_page_message(message) {
        Ok(Some(message)) => message,
        Ok(None) => return Ok(None),
        Err(error) => return Err(error.to_string()),
    };

    let reply = match message {
        PageMessage::InstalledProbe => ExtensionMessage::Init.to_value(),
        PageMessage::Request(descriptor) => request_reply(descriptor),
        PageMessage::OAuth2(request) => return Ok(Some(token_reply(request, config.token_error)?)),
        PageMessage::Abort(abort) => {
            debug!("loopback extension dropped aborted request id={}", abort.id);
            return Ok(None);
        }
    };
    reply.map(Some).map_err(|error| error.to_string())
}

fn request_reply(descriptor: RequestDescriptor) -> Result<Value, serde_json::Error> {
    let request = serde_json::to_value(&descriptor)?;
    ExtensionMessage::Response(ExtensionResponse {
        id: descriptor.id,
        result: ExtensionResult {
            logs: Vec::new(),
            request,
            response: json!({
                "status": 200,
                "statusText": "OK",
                "headers": "",
                "payload": "",
            }),
            extra: Map::new(),
        },
    })
    .to_value()
}

fn token_reply(request: TokenRequest, token_error: bool) -> Result<Value, String> {
    if token_error {
        return ExtensionMessage::TokenResponse(TokenOutcome::Failed(TokenFailure {
            state: Some(request.state),
            message: LOOPBACK_TOKEN_ERROR_MESSAGE.to_owned(),
            interactive: false,
        }))
        .to_value()
        .map_err(|error| error.to_string());
    }

    // expiresIn travels as a string here, like the query parameter it comes from.
    let token_time = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    Ok(json!({
        "api-console-payload": EXTENSION_TOKEN_RESPONSE,
        "api-console-extension": true,
        "api-console-data": {
            "state": request.state,
            "accessToken": LOOPBACK_ACCESS_TOKEN,
            "tokenType": LOOPBACK_TOKEN_TYPE,
            "expiresIn": LOOPBACK_EXPIRES_IN,
            "tokenTime": token_time,
        }
    }))
}
