// ===============================
// src/provider.rs
// ===============================
//
// Options adapters:
// - run (mock mode) : resolves the fixed fund list + limits after a
//                     simulated API delay
// - run (http mode) : GETs OPTIONS_URL and retries with exponential
//                     backoff + jitter until a payload lands; the form
//                     stays disabled in the meantime
//
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio::{sync::mpsc, time::sleep};
use tracing::{error, info, warn};

use crate::config::ProviderMode;
use crate::domain::{Bounds, Fund, OptionsPayload};
use crate::metrics::OPTIONS_FETCH;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("options request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The payload the original mock endpoint serves.
pub fn mock_payload() -> OptionsPayload {
    OptionsPayload {
        available_funds: vec![
            Fund { id: "equities".into(), name: "Cushon Equities Fund".into() },
            Fund { id: "bonds".into(), name: "Cushon Bonds Fund".into() },
            Fund { id: "mixed".into(), name: "Cushon Mixed Fund".into() },
        ],
        min_investment: 25.0,
        max_investment: 20_000.0,
    }
}

/// Bounds sanity gate at ingest: non-finite or inverted limits fall back to
/// the configured defaults. The validator itself never checks this.
pub fn sanitize_bounds(min: f64, max: f64, defaults: Bounds) -> Bounds {
    if !min.is_finite() || !max.is_finite() || min > max {
        warn!(min, max, "unusable bounds in options payload, using defaults");
        return defaults;
    }
    Bounds { min, max }
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<OptionsPayload, FetchError> {
    let payload = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<OptionsPayload>()
        .await?;
    Ok(payload)
}

/// Fetches the investment options once and hands them to the controller.
pub async fn run(
    opts_tx: mpsc::Sender<OptionsPayload>,
    mode: ProviderMode,
    url: String,
    mock_latency_ms: u64,
) {
    match mode {
        ProviderMode::Mock => {
            sleep(Duration::from_millis(mock_latency_ms)).await; // simulated API delay
            OPTIONS_FETCH.with_label_values(&["ok"]).inc();
            let _ = opts_tx.send(mock_payload()).await;
        }
        ProviderMode::Http => {
            let client = reqwest::Client::new();
            let mut attempt: u32 = 0;
            loop {
                match fetch_once(&client, &url).await {
                    Ok(payload) => {
                        info!(funds = payload.available_funds.len(), %url, "options loaded");
                        OPTIONS_FETCH.with_label_values(&["ok"]).inc();
                        let _ = opts_tx.send(payload).await;
                        return;
                    }
                    Err(e) => {
                        error!(?e, %url, "options fetch failed");
                        OPTIONS_FETCH.with_label_values(&["error"]).inc();
                    }
                }

                // Exponential backoff + jitter
                attempt = attempt.saturating_add(1);
                let shift = attempt.min(6);
                let factor = 1u64 << shift;                  // 2,4,...,64
                let base_ms = 500u64.saturating_mul(factor); // 1s..32s
                let jitter = rand::thread_rng().gen_range(0..=250);
                sleep(Duration::from_millis(base_ms + jitter)).await;
            }
        }
    }
}
