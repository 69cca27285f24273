use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use serde::Deserialize;

const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5_000;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "api-console-bridge",
    version,
    about = "Relays API console requests and OAuth2 token requests to the API console extension"
)]
pub struct Args {
    #[arg(long, env = "API_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "API_BRIDGE_PENDING_TTL_MS")]
    pub pending_ttl_ms: Option<u64>,

    #[arg(long, env = "API_BRIDGE_SWEEP_INTERVAL_MS")]
    pub sweep_interval_ms: Option<u64>,

    #[arg(long, env = "API_BRIDGE_REQUIRE_PRESENCE")]
    pub require_presence: Option<bool>,

    #[arg(long, env = "API_BRIDGE_NO_LOOPBACK", default_value_t = false)]
    pub no_loopback: bool,

    #[arg(long, env = "API_BRIDGE_LOOPBACK_LATENCY_MS", default_value_t = 1)]
    pub loopback_latency_ms: u64,

    #[arg(long, env = "API_BRIDGE_LOOPBACK_TOKEN_ERROR", default_value_t = false)]
    pub loopback_token_error: bool,

    #[arg(long = "url")]
    pub urls: Vec<String>,

    #[arg(long, default_value = "GET")]
    pub method: String,

    #[arg(long)]
    pub oauth_state: Option<String>,

    #[arg(long, env = "API_BRIDGE_WAIT_MS", default_value_t = 2_000)]
    pub wait_ms: u64,

    #[arg(long, env = "RUST_LOG")]
    pub log_filter: Option<String>,

    #[arg(long, env = "API_BRIDGE_JSON_LOGS")]
    pub json_logs: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub bridge: FileBridgeSection,
    #[serde(default)]
    pub logging: FileLoggingSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileBridgeSection {
    pub pending_ttl_ms: Option<u64>,
    pub sweep_interval_ms: Option<u64>,
    pub require_presence: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingSection {
    pub filter: Option<String>,
    pub json: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|error| format!("failed to read {}: {error}", path.display()))?;
        toml::from_str::<Self>(&text)
            .map_err(|error| format!("failed to parse {}: {error}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// `None` keeps unanswered requests for the bridge's whole lifetime.
    pub pending_ttl: Option<Duration>,
    pub sweep_interval: Duration,
    pub require_presence: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pending_ttl: None,
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            require_presence: false,
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn for_test() -> Self {
        Self {
            sweep_interval: Duration::from_millis(50),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackConfig {
    pub latency: Duration,
    pub token_error: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(1),
            token_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    pub method: String,
    pub urls: Vec<String>,
    pub oauth_state: Option<String>,
    pub wait: Duration,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bridge: BridgeConfig,
    pub loopback: Option<LoopbackConfig>,
    pub session: SessionPlan,
    pub log_filter: String,
    pub json_logs: bool,
}

impl RuntimeConfig {
    pub fn from_args(args: Args) -> Result<Self, String> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    /// Command line and environment win over the file, the file wins over
    /// built-in defaults.
    pub fn resolve(args: Args, file: FileConfig) -> Result<Self, String> {
        let defaults = BridgeConfig::default();
        let pending_ttl_ms = args.pending_ttl_ms.or(file.bridge.pending_ttl_ms);
        let sweep_interval_ms = args
            .sweep_interval_ms
            .or(file.bridge.sweep_interval_ms)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_MS);

        if pending_ttl_ms == Some(0) {
            return Err("pending_ttl_ms must be greater than 0 when set".to_owned());
        }
        if sweep_interval_ms == 0 {
            return Err("sweep_interval_ms must be greater than 0".to_owned());
        }

        let method = args.method.trim().to_ascii_uppercase();
        if method.is_empty() {
            return Err("method must not be empty".to_owned());
        }
        let urls = args
            .urls
            .into_iter()
            .map(|url| url.trim().to_owned())
            .filter(|url| !url.is_empty())
            .collect();
        let oauth_state = args.oauth_state.and_then(|state| {
            let trimmed = state.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        });

        let loopback = (!args.no_loopback).then(|| LoopbackConfig {
            latency: Duration::from_millis(args.loopback_latency_ms),
            token_error: args.loopback_token_error,
        });

        Ok(Self {
            bridge: BridgeConfig {
                pending_ttl: pending_ttl_ms.map(Duration::from_millis),
                sweep_interval: Duration::from_millis(sweep_interval_ms),
                require_presence: args
                    .require_presence
                    .or(file.bridge.require_presence)
                    .unwrap_or(defaults.require_presence),
            },
            loopback,
            session: SessionPlan {
                method,
                urls,
                oauth_state,
                wait: Duration::from_millis(args.wait_ms),
            },
            log_filter: args
                .log_filter
                .or(file.logging.filter)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned()),
            json_logs: args.json_logs.or(file.logging.json).unwrap_or(false),
        })
    }
}
