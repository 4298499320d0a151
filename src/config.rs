// ===============================
// src/config.rs
// ===============================
use std::env;

use dotenvy::dotenv;

/// Where the investment options (fund list + limits) come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderMode {
    Mock,
    Http,
}

impl ProviderMode {
    pub fn from_env(key: &str, default_mode: ProviderMode) -> ProviderMode {
        match env::var(key).unwrap_or_default().to_ascii_lowercase().as_str() {
            "mock" => ProviderMode::Mock,
            "http" => ProviderMode::Http,
            _ => default_mode,
        }
    }

    pub fn default_url(&self) -> &'static str {
        match self {
            ProviderMode::Mock => "http://localhost:8080/isa/options", // unused in mock mode
            ProviderMode::Http => "http://localhost:8080/isa/options",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderMode::Mock => "mock",
            ProviderMode::Http => "http",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Args {
    // options provider
    pub provider_mode: ProviderMode,
    pub provider_url: String,
    pub mock_latency_ms: u64,

    // files/metrics
    pub history_file: String,
    pub record_file: Option<String>,
    pub metrics_port: u16,

    // form behaviour
    pub revert_secs: u64,
    pub max_selectable: usize,
}

/// Fallback contribution limits, used until the options payload arrives and
/// whenever a payload is unusable.
#[derive(Clone, Debug)]
pub struct Limits {
    pub default_min: f64,
    pub default_max: f64,
}

pub fn load() -> (Args, Limits) {
    // Read .env so HISTORY_FILE, OPTIONS_MODE, etc. are picked up
    let _ = dotenv();

    let provider_mode = ProviderMode::from_env("OPTIONS_MODE", ProviderMode::Mock);
    let provider_url = env::var("OPTIONS_URL")
        .unwrap_or_else(|_| provider_mode.default_url().to_string());
    let mock_latency_ms = env::var("MOCK_LATENCY_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(500);

    let history_file =
        env::var("HISTORY_FILE").unwrap_or_else(|_| "investments.json".to_string());
    let record_file = env::var("RECORD_FILE").ok();
    let metrics_port = env::var("METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);

    let revert_secs = env::var("REVERT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);
    let max_selectable = env::var("MAX_SELECTABLE")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|n: &usize| *n >= 1)
        .unwrap_or(1);

    let args = Args {
        provider_mode,
        provider_url,
        mock_latency_ms,
        history_file,
        record_file,
        metrics_port,
        revert_secs,
        max_selectable,
    };

    let default_min = env::var("MIN_INVESTMENT")
        .ok()
        .and_then(|x| x.parse().ok())
        .unwrap_or(25.0);
    let default_max = env::var("MAX_INVESTMENT")
        .ok()
        .and_then(|x| x.parse().ok())
        .unwrap_or(20_000.0);

    let limits = Limits { default_min, default_max };
    (args, limits)
}
