//! Composition root
//!
//! Wallet, failover client, capital pool, blacklist, and configuration
//! are constructed once here and injected into every component. No
//! ambient lookups anywhere else.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::{self, ApiState};
use crate::config::Config;
use crate::console::{ControlState, OverrideConsole};
use crate::error::{Error, Result};
use crate::execution::{BundleClient, LiveExecutor, SigningService, TradeExecutor};
use crate::listener::{
    self, DedupWindow, FanIn, ListenerMetrics, SharedMetrics, TokenEvent,
};
use crate::position::{
    spawn_monitor, CapitalPool, ManagerCommand, PositionManager, SessionBlacklist,
};
use crate::rpc::FailoverClient;
use crate::strategy::{
    MarketDataHub, SignalAction, StatsBook, StrategyCombinator,
};
use crate::threat::{CreatorReputationStore, ThreatEngine};

/// Queue depth between adapters and the merge task
const RAW_EVENT_CAPACITY: usize = 256;

/// Queue depth into the position manager
const MANAGER_COMMAND_CAPACITY: usize = 128;

/// Queue depth for threat alerts
const ALERT_CAPACITY: usize = 64;

/// Run the engine until shutdown. The error, if any, maps to a process
/// exit code in main.
pub async fn run(config: Config, simulate: bool) -> Result<()> {
    let simulate = simulate || config.simulation.enabled;

    // ==================== Transport ====================
    let client = Arc::new(FailoverClient::new(&config.rpc)?);
    client.probe_now().await;
    if !client.any_reachable().await {
        return Err(Error::TransportExhausted {
            attempts: config
                .rpc
                .endpoints
                .iter()
                .map(|e| (e.url.clone(), "unreachable at startup".to_string()))
                .collect(),
        });
    }
    let _health_loop = client.spawn_health_loop();

    // ==================== Signing ====================
    let (signing_service, signer) = SigningService::from_env(config.execution.signing_rate_cap)?;
    tokio::spawn(signing_service.run());
    info!("wallet: {}", signer.pubkey());

    // ==================== Shared state ====================
    let capital = Arc::new(CapitalPool::new(config.capital.total_sol));
    let blacklist = Arc::new(SessionBlacklist::new(Vec::new()));
    let control = Arc::new(ControlState::new());
    let stats = Arc::new(StatsBook::new());
    let hub = Arc::new(MarketDataHub::new());
    let reputation =
        Arc::new(CreatorReputationStore::load(&config.threat.reputation_store_path).await?);

    // ==================== Listener fan-in ====================
    let metrics: SharedMetrics = Arc::new(ListenerMetrics::default());
    let (fan_tx, fan_in) = FanIn::new(config.listeners.channel_capacity, Arc::clone(&metrics));
    let dedup = DedupWindow::new(config.listeners.dedup_capacity);
    let observations = dedup.counts_handle();

    let (raw_tx, raw_rx) = mpsc::channel::<TokenEvent>(RAW_EVENT_CAPACITY);
    listener::spawn_merge_task(raw_rx, dedup, fan_tx, Arc::clone(&metrics));

    if config.listeners.tx_logs.enabled {
        listener::tx_logs::spawn(
            Arc::clone(&client),
            config.rpc.subscribe_reconnect_attempts,
            raw_tx.clone(),
            Arc::clone(&metrics),
        );
    }
    if config.listeners.block_feed.enabled {
        listener::block_feed::spawn(
            Arc::clone(&client),
            config.rpc.subscribe_reconnect_attempts,
            raw_tx.clone(),
            Arc::clone(&metrics),
        );
    }
    if config.listeners.sidecar.enabled {
        listener::sidecar::spawn(
            config.listeners.sidecar.clone(),
            config.rpc.subscribe_reconnect_attempts,
            raw_tx.clone(),
            Arc::clone(&metrics),
            config.strategies.whale_copy.wallets.clone(),
            Arc::clone(&hub),
        );
    }
    if config.listeners.listing_poll.enabled {
        listener::listing_poll::spawn(
            config.listeners.listing_poll.clone(),
            raw_tx.clone(),
            Arc::clone(&metrics),
        );
    }
    drop(raw_tx);

    // ==================== Threat engine ====================
    let (alert_tx, alert_rx) = mpsc::channel(ALERT_CAPACITY);
    let engine = Arc::new(ThreatEngine::new(
        config.threat.clone(),
        Arc::clone(&client),
        Arc::clone(&reputation),
        observations,
        alert_tx,
    ));
    info!("threat engine ready: {} heuristics", engine.heuristic_count());

    // ==================== Strategy combinator ====================
    let combinator = Arc::new(StrategyCombinator::new(
        config.strategies.clone(),
        config.capital.clone(),
        Arc::clone(&capital),
        Arc::clone(&stats),
        Arc::clone(&control),
    ));
    let params = combinator.params();

    // ==================== Execution ====================
    let bundler = BundleClient::new(config.execution.clone(), Arc::clone(&client))?;
    let bundle_stats = bundler.stats();
    let executor: Arc<dyn TradeExecutor> = Arc::new(LiveExecutor::new(
        Arc::clone(&client),
        signer,
        bundler,
        config.execution.clone(),
        simulate,
    ));

    // ==================== Console ====================
    let (manager_tx, manager_rx) = mpsc::channel(MANAGER_COMMAND_CAPACITY);
    let (console, console_handle, events) = OverrideConsole::new(
        Arc::clone(&control),
        Arc::clone(&params),
        manager_tx.clone(),
        config.strategies.snipe.base_size_sol,
    );
    let (commands_processed, last_command) = console.stats_handles();
    tokio::spawn(console.run());

    // ==================== Position manager ====================
    let manager = PositionManager::new(
        config.positions.clone(),
        config.execution.clone(),
        executor,
        Arc::clone(&capital),
        Arc::clone(&blacklist),
        Arc::clone(&stats),
        Arc::clone(&reputation),
        Arc::clone(&control),
        crate::strategy::default_registry(),
        Arc::clone(&params),
        Arc::clone(&hub),
        events.clone(),
    );
    let positions = manager.positions();
    let tracked = manager.tracked();
    tokio::spawn(manager.run(manager_rx, alert_rx));

    spawn_monitor(
        Arc::clone(&client),
        tracked,
        Arc::clone(&hub),
        config.positions.clone(),
    );

    // ==================== Control API ====================
    if config.api.enabled {
        let api_state = Arc::new(ApiState {
            control: Arc::clone(&control),
            console: console_handle,
            positions,
            stats: Arc::clone(&stats),
            capital: Arc::clone(&capital),
            client: Arc::clone(&client),
            listener_metrics: Arc::clone(&metrics),
            bundle_stats,
            events: events.clone(),
            commands_processed,
            last_command,
        });
        let bind = config.api.bind.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(api_state, &bind).await {
                error!("control API stopped: {e}");
            }
        });
    }

    // ==================== Decision pipeline ====================
    let pipeline = tokio::spawn(decision_pipeline(
        fan_in,
        engine,
        combinator,
        Arc::clone(&blacklist),
        Arc::clone(&hub),
        manager_tx,
    ));

    info!(
        "engine running{}",
        if simulate { " (simulation)" } else { "" }
    );

    // ==================== Shutdown ====================
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::Internal(format!("signal handler: {e}")))?;
    warn!("shutdown signal received");

    pipeline.abort();
    reputation.flush().await;
    client.shutdown();

    info!("clean shutdown complete");
    Ok(())
}

/// The per-event decision path: threat report, strategy aggregation,
/// pre-trade confirmation, intent emission.
async fn decision_pipeline(
    mut fan_in: FanIn,
    engine: Arc<ThreatEngine>,
    combinator: Arc<StrategyCombinator>,
    blacklist: Arc<SessionBlacklist>,
    hub: Arc<MarketDataHub>,
    manager_tx: mpsc::Sender<ManagerCommand>,
) {
    while let Some(event) = fan_in.recv().await {
        // Blacklisted mints never even get scored
        if blacklist.is_banned(&event.mint) {
            continue;
        }

        let report = engine.report(&event).await;
        let view = hub.view(&event.mint);

        let Some(intent) = combinator.decide(&event, &report, &view).await else {
            continue;
        };

        let intent = if intent.action == SignalAction::Buy {
            // Pre-trade confirmation: force a fresh report and re-veto.
            // The cached score may be up to a minute old; the mint may
            // have turned in that window.
            let fresh = engine.confirm(&event).await;
            if fresh.risk_level.vetoes_entry() {
                info!(
                    mint = %event.mint,
                    level = ?fresh.risk_level,
                    "pre-trade confirmation vetoed entry"
                );
                continue;
            }
            intent.with_event_context(event.bonding_curve, event.creator)
        } else {
            intent.with_event_context(event.bonding_curve, event.creator)
        };

        if manager_tx
            .send(ManagerCommand::Intent(intent))
            .await
            .is_err()
        {
            break;
        }
    }
}
