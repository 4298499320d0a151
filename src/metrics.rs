// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Form lifecycle --------
pub static SUBMISSIONS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("submissions_total", "successful form submissions").unwrap());

pub static VALIDATION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "validation_failures_total",
            "submit attempts rejected by validation (label: field)",
        ),
        &["field"],
    )
    .unwrap()
});

pub static INPUT_REJECTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "input_rejects_total",
        "amount keystrokes rejected by the in-progress pattern",
    )
    .unwrap()
});

pub static REVERTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("reverts_total", "submitted-to-editing auto reverts").unwrap());

// -------- External collaborators --------
pub static OPTIONS_FETCH: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("options_fetch_total", "options fetch attempts (label: outcome)"),
        &["outcome"],
    )
    .unwrap()
});

pub static STORE_FAILURES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("store_failures_total", "history append failures").unwrap());

pub static HISTORY_RECORDS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("history_records", "records in the submission history").unwrap());

// ---- Config visibility ----
pub static CONFIG_PROVIDER_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_provider_mode", "options provider mode (label: mode)"),
        &["mode"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(SUBMISSIONS.clone())),
        REGISTRY.register(Box::new(VALIDATION_FAILURES.clone())),
        REGISTRY.register(Box::new(INPUT_REJECTS.clone())),
        REGISTRY.register(Box::new(REVERTS.clone())),
        REGISTRY.register(Box::new(OPTIONS_FETCH.clone())),
        REGISTRY.register(Box::new(STORE_FAILURES.clone())),
        REGISTRY.register(Box::new(HISTORY_RECORDS.clone())),
        REGISTRY.register(Box::new(CONFIG_PROVIDER_MODE.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics) — tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = TcpListener::bind(&addr)
            .unwrap_or_else(|e| panic!("metrics bind {} failed: {}", addr, e));
        eprintln!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => eprintln!("metrics accept error: {}", e),
            }
        }
    });
}
