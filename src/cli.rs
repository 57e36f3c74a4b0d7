//! CLI subcommand implementations
//!
//! `status` and `health` talk to the control API of a running instance;
//! `config` prints the masked local configuration.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::Config;

/// Show bot state, positions, and strategy stats from a running instance
pub async fn status(config: &Config) -> Result<()> {
    let body = fetch_status(config).await?;

    println!("Bot state: {}", body["bot_state"].as_str().unwrap_or("unknown"));
    println!(
        "Capital: {:.4} SOL available / {:.4} SOL total",
        body["capital"]["available_sol"].as_f64().unwrap_or(0.0),
        body["capital"]["total_sol"].as_f64().unwrap_or(0.0),
    );

    let positions = body["positions"].as_array().cloned().unwrap_or_default();
    let open: Vec<&Value> = positions
        .iter()
        .filter(|p| matches!(p["state"].as_str(), Some("open") | Some("opening") | Some("closing")))
        .collect();
    println!("Open positions: {}", open.len());
    for p in open {
        println!(
            "  {} [{}] entry {:.10} now {:.10} ({})",
            p["mint"].as_str().unwrap_or("?"),
            p["strategy_tag"].as_str().unwrap_or("?"),
            p["entry_price"].as_f64().unwrap_or(0.0),
            p["current_price"].as_f64().unwrap_or(0.0),
            p["state"].as_str().unwrap_or("?"),
        );
    }

    if let Some(strategies) = body["strategies"].as_object() {
        println!("Strategies:");
        for (tag, s) in strategies {
            println!(
                "  {tag}: {} trades, {:.0}% win rate, {:+.4} SOL",
                s["trades"].as_u64().unwrap_or(0),
                s["win_rate"].as_f64().unwrap_or(0.0) * 100.0,
                s["total_pnl_sol"].as_f64().unwrap_or(0.0),
            );
        }
    }

    Ok(())
}

/// Show per-endpoint provider health from a running instance
pub async fn health(config: &Config) -> Result<()> {
    let body = fetch_status(config).await?;

    let providers = body["providers"].as_array().cloned().unwrap_or_default();
    println!("Providers ({}):", providers.len());
    for p in providers {
        println!(
            "  {} [{}] score {:.2}, {:.0}ms, {:.0}% success, {} consecutive failures",
            p["endpoint_url"].as_str().unwrap_or("?"),
            p["status"].as_str().unwrap_or("?"),
            p["score"].as_f64().unwrap_or(0.0),
            p["latency_ema_ms"].as_f64().unwrap_or(0.0),
            p["success_rate"].as_f64().unwrap_or(0.0) * 100.0,
            p["consecutive_failures"].as_u64().unwrap_or(0),
        );
    }

    let listeners = &body["listeners"];
    println!(
        "Listeners: {} in, {} out, {} dup, {} dropped, {} unparseable, {} gaps",
        listeners["events_in"].as_u64().unwrap_or(0),
        listeners["events_out"].as_u64().unwrap_or(0),
        listeners["duplicates"].as_u64().unwrap_or(0),
        listeners["dropped"].as_u64().unwrap_or(0),
        listeners["unparseable"].as_u64().unwrap_or(0),
        listeners["stream_gaps"].as_u64().unwrap_or(0),
    );

    let bundles = &body["bundles"];
    println!(
        "Bundles: {} submitted, {:.0}% landed",
        bundles["submitted"].as_u64().unwrap_or(0),
        bundles["land_rate"].as_f64().unwrap_or(0.0) * 100.0,
    );

    Ok(())
}

/// Print the masked configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

async fn fetch_status(config: &Config) -> Result<Value> {
    let url = format!("http://{}/status", config.api.bind);
    let response = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .with_context(|| format!("is the engine running? GET {url} failed"))?;
    response.json().await.context("unparseable status response")
}
