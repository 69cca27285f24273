// Events the host page fires at the bound event target.
pub const EVENT_API_REQUEST: &str = "api-request";
pub const EVENT_ABORT_API_REQUEST: &str = "abort-api-request";
pub const EVENT_OAUTH2_TOKEN_REQUESTED: &str = "oauth2-token-requested";

// Events the bridge fires from its host element.
pub const EVENT_HAS_EXTENSION_CHANGED: &str = "hasextension-changed";
pub const EVENT_EXTENSION_INSTALLED: &str = "api-console-extension-installed";
pub const EVENT_API_RESPONSE: &str = "api-response";
pub const EVENT_OAUTH2_TOKEN_RESPONSE: &str = "oauth2-token-response";
pub const EVENT_OAUTH2_ERROR: &str = "oauth2-error";

