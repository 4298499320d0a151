// ===============================
// src/main.rs
// ===============================
//
// ISA contribution form: an investment-entry form as a terminal program.
// Wires config, metrics, the options provider, the submission history store
// and an optional JSONL audit recorder around the form controller task,
// then drives the form from stdin:
//
//   funds            list the selectable funds
//   fund <id>        choose a fund
//   amount <text>    edit the amount field (keystroke-filtered)
//   submit           attempt the submission
//   history          show past submissions
//   quit             exit
//
mod config;
mod controller;
mod domain;
mod history;
mod metrics;
mod provider;
mod recorder;
mod validate;

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::domain::{AuditEvent, Bounds, FormEvent, FormSnapshot, OptionsPayload, Phase};

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt().with_env_filter("info").init();

    // ---- Load config & limits ----
    let (args, limits) = config::load();

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(args.metrics_port));

    let mode_str = args.provider_mode.label();
    info!(
        provider = %mode_str,
        options_url = %args.provider_url,
        history = %args.history_file,
        revert_secs = args.revert_secs,
        max_selectable = args.max_selectable,
        "startup config"
    );
    metrics::CONFIG_PROVIDER_MODE
        .with_label_values(&[mode_str])
        .set(1);

    // ---- Recorder (optional) ----
    let (rec_tx, rec_rx) = mpsc::channel::<AuditEvent>(1024);
    let rec_tx = if let Some(path) = args.record_file.clone() {
        tokio::spawn(recorder::run(rec_rx, path));
        Some(rec_tx)
    } else {
        None
    };

    // ---- History store + controller ----
    let store = history::FileStore::open(&args.history_file);
    let defaults = Bounds { min: limits.default_min, max: limits.default_max };
    let ctl = controller::FormController::new(
        store,
        defaults,
        args.max_selectable,
        Duration::from_secs(args.revert_secs),
    );
    info!(records = ctl.history_len(), "history loaded");

    // ---- Buses ----
    let (ev_tx, ev_rx) = mpsc::channel::<FormEvent>(64);
    let (opts_tx, opts_rx) = mpsc::channel::<OptionsPayload>(1);
    let (snap_tx, mut snap_rx) = watch::channel(FormSnapshot::default());

    // ---- Options fetch (one per mount) ----
    tokio::spawn(provider::run(
        opts_tx,
        args.provider_mode.clone(),
        args.provider_url.clone(),
        args.mock_latency_ms,
    ));

    // ---- Form controller ----
    tokio::spawn(controller::run(ctl, ev_rx, opts_rx, snap_tx, rec_tx));

    println!("Invest in a Cushon ISA");
    println!("commands: funds | fund <id> | amount <text> | submit | history | quit");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            changed = snap_rx.changed() => {
                if changed.is_err() { break; }
                render(&snap_rx.borrow());
            }

            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                let line = line.trim();
                let (cmd, arg) = match line.split_once(' ') {
                    Some((c, a)) => (c, a.trim()),
                    None => (line, ""),
                };
                match cmd {
                    "" => {}
                    "funds" => print_funds(&snap_rx.borrow()),
                    "fund" => {
                        let _ = ev_tx.send(FormEvent::SelectFund(arg.to_string())).await;
                    }
                    "amount" => {
                        let _ = ev_tx.send(FormEvent::AmountInput(arg.to_string())).await;
                    }
                    "submit" => {
                        let _ = ev_tx.send(FormEvent::Submit).await;
                    }
                    "history" => print_history(&snap_rx.borrow()),
                    "quit" | "exit" => break,
                    other => println!(
                        "unknown command {other:?} — funds | fund <id> | amount <text> | submit | history | quit"
                    ),
                }
            }
        }
    }
}

fn render(snap: &FormSnapshot) {
    match snap.phase {
        Phase::Submitted => {
            println!("Investment submitted successfully!");
            if let Some(last) = snap.history.last() {
                let names: Vec<&str> = last.funds.iter().map(|f| f.name.as_str()).collect();
                println!("  £{} into {}", last.amount, names.join(", "));
            }
        }
        Phase::Editing => {
            if !snap.options_loaded {
                println!("Loading investment options...");
                return;
            }
            let fund = snap
                .input
                .selection
                .iter()
                .filter(|id| !id.is_empty())
                .map(|id| {
                    snap.funds
                        .iter()
                        .find(|f| &f.id == id)
                        .map(|f| f.name.clone())
                        .unwrap_or_else(|| id.clone())
                })
                .collect::<Vec<_>>()
                .join(", ");
            let fund = if fund.is_empty() { "(none)".to_string() } else { fund };
            let amount = if snap.input.amount_text.is_empty() {
                "(empty)".to_string()
            } else {
                format!("£{}", snap.input.amount_text)
            };
            println!(
                "fund: {fund} | amount: {amount} | range {}–{}{}",
                domain::gbp_bound(snap.bounds.min),
                domain::gbp_bound(snap.bounds.max),
                if snap.can_submit { " | ready to submit" } else { "" },
            );
            if !snap.errors.fund.is_empty() {
                println!("  ! {}", snap.errors.fund);
            }
            if !snap.errors.amount.is_empty() {
                println!("  ! {}", snap.errors.amount);
            }
            if let Some(notice) = &snap.notice {
                println!("  ! {notice}");
            }
        }
    }
}

fn print_funds(snap: &FormSnapshot) {
    if !snap.options_loaded {
        println!("Loading investment options...");
        return;
    }
    for fund in &snap.funds {
        println!("  {:<10} {}", fund.id, fund.name);
    }
}

fn print_history(snap: &FormSnapshot) {
    if snap.history.is_empty() {
        println!("no investments yet");
        return;
    }
    for (i, rec) in snap.history.iter().enumerate() {
        let names: Vec<&str> = rec.funds.iter().map(|f| f.name.as_str()).collect();
        println!("  {}. £{} — {} — {}", i + 1, rec.amount, names.join(", "), rec.timestamp);
    }
}
