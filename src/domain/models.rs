use std::time::Instant;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

/// Request descriptor carried by an `api-request` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    pub id: String,
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub descriptor: RequestDescriptor,
    pub submitted_at: Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AbortRequest {
    pub id: String,
}

/// Detail of an `oauth2-token-requested` event. Only `state` is interpreted;
/// everything else is forwarded to the extension untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenRequest {
    pub state: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub state: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "expires_in_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenFailure {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub interactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    Granted(TokenGrant),
    Failed(TokenFailure),
}

/// What the extension reports back for an executed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionResult {
    #[serde(default)]
    pub logs: Vec<Value>,
    #[serde(default)]
    pub request: Value,
    #[serde(default)]
    pub response: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponseDetail {
    pub id: String,
    pub request: RequestDescriptor,
    pub result: ExtensionResult,
}

// 2^64; every integral f64 below it converts to u64 exactly.
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

// OAuth2 implicit grants hand `expires_in` over as a query parameter, so the
// extension forwards it either as a number or as a numeric string. Fractional
// or out of range numbers are malformed.

fn expires_in_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|value| *value >= 0.0 && value.fract() == 0.0 && *value < U64_LIMIT)
                    .map(|value| value as u64)
            })
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid expiresIn: {number}"))),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<u64>()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid expiresIn: {text:?}")))
        }
        Some(other) => Err(de::Error::custom(format!("invalid expiresIn: {other}"))),
    }
}
