mod errors;
pub mod events;
mod frames;

pub use errors::ProtocolError;
pub use frames::{
    ExtensionEnvelope, ExtensionMessage, ExtensionResponse, PageEnvelope, PageMessage,
};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::domain::models::{TokenFailure, TokenGrant, TokenOutcome};
use frames::ResponseData;

pub const PAGE_INSTALLED_PROBE: &str = "api-console-extension-installed";
pub const PAGE_REQUEST: &str = "api-console-request";
pub const PAGE_OAUTH2: &str = "api-console-oauth2";
pub const PAGE_REQUEST_ABORT: &str = "api-console-request-abort";

pub const EXTENSION_INIT: &str = "init";
pub const EXTENSION_RESPONSE: &str = "api-console-response";
pub const EXTENSION_TOKEN_RESPONSE: &str = "api-console-oauth2-token-response";

impl PageMessage {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::InstalledProbe => PAGE_INSTALLED_PROBE,
            Self::Request(_) => PAGE_REQUEST,
            Self::OAuth2(_) => PAGE_OAUTH2,
            Self::Abort(_) => PAGE_REQUEST_ABORT,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let detail = match self {
            Self::InstalledProbe => None,
            Self::Request(descriptor) => Some(serde_json::to_value(descriptor)?),
            Self::OAuth2(request) => Some(serde_json::to_value(request)?),
            Self::Abort(abort) => Some(serde_json::to_value(abort)?),
        };
        serde_json::to_value(PageEnvelope {
            payload: self.tag().to_owned(),
            detail,
            page: true,
        })
    }
}

impl ExtensionMessage {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Init => EXTENSION_INIT,
            Self::Response(_) => EXTENSION_RESPONSE,
            Self::TokenResponse(_) => EXTENSION_TOKEN_RESPONSE,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let data = match self {
            Self::Init => None,
            Self::Response(response) => Some(serde_json::to_value(ResponseData::from(response))?),
            Self::TokenResponse(TokenOutcome::Granted(grant)) => Some(serde_json::to_value(grant)?),
            Self::TokenResponse(TokenOutcome::Failed(failure)) => Some(json!({
                "error": true,
                "interactive": failure.interactive,
                "message": failure.message,
                "state": failure.state,
            })),
        };
        serde_json::to_value(ExtensionEnvelope {
            payload: self.tag().to_owned(),
            extension: true,
            data,
        })
    }
}

/// Interprets a value seen on the window channel as an extension message.
///
/// Returns `Ok(None)` for anything the bridge must ignore: values that are not
/// envelopes, envelopes without the extension marker, and unknown tags.
pub fn parse_extension_message(value: &Value) -> Result<Option<ExtensionMessage>, ProtocolError> {
    let Ok(envelope) = serde_json::from_value::<ExtensionEnvelope>(value.clone()) else {
        return Ok(None);
    };
    if !envelope.extension {
        return Ok(None);
    }

    match envelope.payload.as_str() {
        EXTENSION_INIT => Ok(Some(ExtensionMessage::Init)),
        EXTENSION_RESPONSE => {
            let data = require_data(&envelope)?;
            let response = serde_json::from_value::<ResponseData>(data)
                .map_err(|error| ProtocolError::malformed_data(&envelope.payload, error))?;
            Ok(Some(ExtensionMessage::Response(response.into())))
        }
        EXTENSION_TOKEN_RESPONSE => {
            let data = require_data(&envelope)?;
            let outcome = parse_token_outcome(&envelope.payload, data)?;
            Ok(Some(ExtensionMessage::TokenResponse(outcome)))
        }
        _ => Ok(None),
    }
}

/// Counterpart of [`parse_extension_message`] for the extension side.
pub fn parse_page_message(value: &Value) -> Result<Option<PageMessage>, ProtocolError> {
    let Ok(envelope) = serde_json::from_value::<PageEnvelope>(value.clone()) else {
        return Ok(None);
    };
    if !envelope.page {
        return Ok(None);
    }

    let payload = envelope.payload.as_str();
    let message = match payload {
        PAGE_INSTALLED_PROBE => PageMessage::InstalledProbe,
        PAGE_REQUEST => PageMessage::Request(page_detail(payload, envelope.detail)?),
        PAGE_OAUTH2 => PageMessage::OAuth2(page_detail(payload, envelope.detail)?),
        PAGE_REQUEST_ABORT => PageMessage::Abort(page_detail(payload, envelope.detail)?),
        _ => return Ok(None),
    };
    Ok(Some(message))
}

/// Reads the typed detail of a DOM event fired by the host page.
pub fn parse_event_detail<T: DeserializeOwned>(
    event: &str,
    detail: &Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value::<T>(detail.clone())
        .map_err(|error| ProtocolError::malformed_detail(event, error))
}

fn require_data(envelope: &ExtensionEnvelope) -> Result<Value, ProtocolError> {
    match &envelope.data {
        Some(data) if !data.is_null() => Ok(data.clone()),
        _ => Err(ProtocolError::MissingData {
            payload: envelope.payload.clone(),
        }),
    }
}

fn page_detail<T: DeserializeOwned>(
    payload: &str,
    detail: Option<Value>,
) -> Result<T, ProtocolError> {
    let detail = detail.ok_or_else(|| ProtocolError::MissingData {
        payload: payload.to_owned(),
    })?;
    serde_json::from_value::<T>(detail)
        .map_err(|error| ProtocolError::malformed_data(payload, error))
}

fn parse_token_outcome(payload: &str, data: Value) -> Result<TokenOutcome, ProtocolError> {
    if data.get("error").is_some_and(is_truthy) {
        let failure = serde_json::from_value::<TokenFailure>(data)
            .map_err(|error| ProtocolError::malformed_data(payload, error))?;
        return Ok(TokenOutcome::Failed(failure));
    }

    serde_json::from_value::<TokenGrant>(data)
        .map(TokenOutcome::Granted)
        .map_err(|error| ProtocolError::malformed_data(payload, error))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
