//! Control API
//!
//! The dashboard is an external collaborator; this is its pinned
//! interface: status snapshot, override endpoints, manual trades,
//! strategy override/reset, and a server-push event stream.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::info;

use crate::console::{ConsoleHandle, ControlState, EngineEvent, OverrideCommand};
use crate::error::Error;
use crate::execution::BundleStats;
use crate::listener::SharedMetrics;
use crate::position::{CapitalPool, Position};
use crate::rpc::FailoverClient;
use crate::strategy::StatsBook;

/// Shared read surface for the handlers
pub struct ApiState {
    pub control: Arc<ControlState>,
    pub console: ConsoleHandle,
    pub positions: Arc<DashMap<Pubkey, Position>>,
    pub stats: Arc<StatsBook>,
    pub capital: Arc<CapitalPool>,
    pub client: Arc<FailoverClient>,
    pub listener_metrics: SharedMetrics,
    pub bundle_stats: Arc<BundleStats>,
    pub events: broadcast::Sender<EngineEvent>,
    pub commands_processed: Arc<AtomicU64>,
    pub last_command: Arc<Mutex<Option<(String, chrono::DateTime<chrono::Utc>)>>>,
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/override/emergency_stop", post(emergency_stop))
        .route("/override/pause", post(pause))
        .route("/override/resume", post(resume))
        .route("/override/reset", post(reset))
        .route("/trade/buy", post(trade_buy))
        .route("/trade/sell", post(trade_sell))
        .route("/strategy/override", post(strategy_override))
        .route("/strategy/reset", post(strategy_reset))
        .route("/events", get(events))
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn serve(state: Arc<ApiState>, bind: &str) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| Error::Config(format!("API bind {bind}: {e}")))?;
    info!("control API listening on {bind}");
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| Error::Internal(format!("API server: {e}")))
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    let positions: Vec<Position> = state
        .positions
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    let strategies: HashMap<String, serde_json::Value> = state
        .stats
        .snapshot()
        .into_iter()
        .map(|(tag, stats)| {
            (
                tag,
                json!({
                    "trades": stats.trades,
                    "wins": stats.wins,
                    "losses": stats.losses,
                    "total_pnl_sol": stats.total_pnl_sol,
                    "win_rate": stats.win_rate(),
                    "avg_hold_secs": stats.avg_hold_secs(),
                    "avg_confidence": stats.avg_confidence(),
                }),
            )
        })
        .collect();

    let last_command = state
        .last_command
        .lock()
        .ok()
        .and_then(|g| g.clone())
        .map(|(name, at)| json!({"command": name, "at": at}));

    Json(json!({
        "bot_state": state.control.bot_state(),
        "capital": state.capital.snapshot(),
        "positions": positions,
        "strategies": strategies,
        "providers": state.client.health_summary().await,
        "listeners": state.listener_metrics.snapshot(),
        "bundles": state.bundle_stats.snapshot(),
        "console": {
            "commands_processed": state.commands_processed.load(Ordering::Relaxed),
            "last_command": last_command,
        },
    }))
}

fn submit(state: &ApiState, command: OverrideCommand) -> StatusCode {
    match state.console.submit(command) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(Error::CapacityExceeded(_)) => StatusCode::TOO_MANY_REQUESTS,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn emergency_stop(State(state): State<Arc<ApiState>>) -> StatusCode {
    submit(&state, OverrideCommand::EmergencyStop)
}

async fn pause(State(state): State<Arc<ApiState>>) -> StatusCode {
    submit(&state, OverrideCommand::Pause)
}

async fn resume(State(state): State<Arc<ApiState>>) -> StatusCode {
    submit(&state, OverrideCommand::Resume)
}

async fn reset(State(state): State<Arc<ApiState>>) -> StatusCode {
    submit(&state, OverrideCommand::Reset)
}

#[derive(Deserialize)]
struct BuyRequest {
    mint: String,
    size_sol: Option<f64>,
    slippage_bps: Option<u32>,
}

async fn trade_buy(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<BuyRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if request.mint.parse::<Pubkey>().is_err() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid mint address"})),
        );
    }

    let code = submit(
        &state,
        OverrideCommand::ManualBuy {
            mint: request.mint.clone(),
            size_sol: request.size_sol,
            slippage_bps: request.slippage_bps,
        },
    );

    match code {
        StatusCode::NO_CONTENT => (
            StatusCode::ACCEPTED,
            Json(json!({"accepted": true, "mint": request.mint})),
        ),
        other => (other, Json(json!({"error": "command not accepted"}))),
    }
}

#[derive(Deserialize)]
struct SellRequest {
    mint: String,
    slippage_bps: Option<u32>,
}

async fn trade_sell(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SellRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if request.mint.parse::<Pubkey>().is_err() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid mint address"})),
        );
    }

    let code = submit(
        &state,
        OverrideCommand::ManualSell {
            mint: request.mint.clone(),
            slippage_bps: request.slippage_bps,
        },
    );

    match code {
        StatusCode::NO_CONTENT => (
            StatusCode::ACCEPTED,
            Json(json!({"accepted": true, "mint": request.mint})),
        ),
        other => (other, Json(json!({"error": "command not accepted"}))),
    }
}

#[derive(Deserialize)]
struct StrategyOverrideRequest {
    params: HashMap<String, f64>,
}

async fn strategy_override(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<StrategyOverrideRequest>,
) -> StatusCode {
    submit(
        &state,
        OverrideCommand::StrategyOverride {
            params: request.params,
        },
    )
}

async fn strategy_reset(State(state): State<Arc<ApiState>>) -> StatusCode {
    submit(&state, OverrideCommand::StrategyReset)
}

/// Server-push stream: state changes, trades, alerts, health deltas
async fn events(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let rx = state.events.subscribe();

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = match serde_json::to_string(&event) {
                        Ok(d) => d,
                        Err(_) => continue,
                    };
                    return Some((
                        Ok::<_, std::convert::Infallible>(Event::default().data(data)),
                        rx,
                    ));
                }
                // A lagged observer skips ahead; it never blocks the engine
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategiesConfig;
    use crate::console::OverrideConsole;
    use crate::listener::ListenerMetrics;
    use crate::strategy::ParamStore;
    use tokio::sync::mpsc;

    fn api_state() -> Arc<ApiState> {
        let control = Arc::new(ControlState::new());
        let params = Arc::new(ParamStore::new(StrategiesConfig::default()));
        let (manager_tx, _manager_rx) = mpsc::channel(4);
        let (console, handle, events) =
            OverrideConsole::new(Arc::clone(&control), params, manager_tx, 0.1);
        let (commands_processed, last_command) = console.stats_handles();
        // The console task itself is not running in these tests
        std::mem::forget(console);

        let client = Arc::new(
            FailoverClient::new(&crate::config::Config::default().rpc).unwrap(),
        );

        Arc::new(ApiState {
            control,
            console: handle,
            positions: Arc::new(DashMap::new()),
            stats: Arc::new(StatsBook::new()),
            capital: Arc::new(CapitalPool::new(2.0)),
            client,
            listener_metrics: Arc::new(ListenerMetrics::default()),
            bundle_stats: Arc::new(BundleStats::default()),
            events,
            commands_processed,
            last_command,
        })
    }

    #[tokio::test]
    async fn test_status_shape() {
        let state = api_state();
        let response = status(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_override_returns_no_content() {
        let state = api_state();
        let code = pause(State(state)).await;
        assert_eq!(code, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_trade_buy_rejects_bad_mint() {
        let state = api_state();
        let (code, _) = trade_buy(
            State(state),
            Json(BuyRequest {
                mint: "not-a-mint".into(),
                size_sol: None,
                slippage_bps: None,
            }),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trade_buy_accepted() {
        let state = api_state();
        let (code, _) = trade_buy(
            State(state),
            Json(BuyRequest {
                mint: Pubkey::new_unique().to_string(),
                size_sol: Some(0.1),
                slippage_bps: None,
            }),
        )
        .await;
        assert_eq!(code, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_command_queue_overflow_is_429() {
        let state = api_state();
        // Fill the queue; the console task is not draining it
        let mut last = StatusCode::NO_CONTENT;
        for _ in 0..100 {
            last = pause(State(Arc::clone(&state))).await;
        }
        assert_eq!(last, StatusCode::TOO_MANY_REQUESTS);
    }
}
