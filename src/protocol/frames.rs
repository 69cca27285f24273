use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::models::{
    AbortRequest, ExtensionResult, RequestDescriptor, TokenOutcome, TokenRequest,
};

/// Envelope the page posts on the window channel for the extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageEnvelope {
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    #[serde(rename = "api-console-page", default)]
    pub page: bool,
}

/// Envelope the extension's content script posts back on the window channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtensionEnvelope {
    #[serde(rename = "api-console-payload")]
    pub payload: String,
    #[serde(rename = "api-console-extension", default)]
    pub extension: bool,
    #[serde(
        rename = "api-console-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageMessage {
    InstalledProbe,
    Request(RequestDescriptor),
    OAuth2(TokenRequest),
    Abort(AbortRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionMessage {
    Init,
    Response(ExtensionResponse),
    TokenResponse(TokenOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionResponse {
    pub id: String,
    pub result: ExtensionResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ResponseData {
    #[serde(default)]
    pub logs: Vec<Value>,
    pub data: ResponseBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ResponseBody {
    pub id: String,
    #[serde(default)]
    pub request: Value,
    #[serde(default)]
    pub response: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<ResponseData> for ExtensionResponse {
    fn from(value: ResponseData) -> Self {
        Self {
            id: value.data.id,
            result: ExtensionResult {
                logs: value.logs,
                request: value.data.request,
                response: value.data.response,
                extra: value.data.extra,
            },
        }
    }
}

impl From<&ExtensionResponse> for ResponseData {
    fn from(value: &ExtensionResponse) -> Self {
        Self {
            logs: value.result.logs.clone(),
            data: ResponseBody {
                id: value.id.clone(),
                request: value.result.request.clone(),
                response: value.result.response.clone(),
                extra: value.result.extra.clone(),
            },
        }
    }
}
