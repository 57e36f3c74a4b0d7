//! Position lifecycle manager
//!
//! One serialized task per mint drives OPENING → OPEN → CLOSING →
//! CLOSED (or FAILED). Across mints, tasks run concurrently with no
//! shared lock beyond the capital pool. Exits never give up: a close
//! that keeps failing keeps retrying with escalating slippage and
//! priority fees while alerting the operator.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::{ExecutionConfig, PositionConfig};
use crate::console::{ControlState, EngineEvent, TradeNotice};
use crate::error::Error;
use crate::execution::{Fill, TradeExecutor};
use crate::strategy::{
    MarketDataHub, ParamStore, PositionView, SignalAction, StatsBook, Strategy, TradeIntent,
};
use crate::threat::reputation::CreatorReputationStore;
use crate::threat::{AlertSeverity, ThreatAlert};

use super::blacklist::SessionBlacklist;
use super::capital::CapitalPool;
use super::state::{ExitTrigger, Position, PositionState};

/// Backoff ceiling for the never-give-up close loop
const CLOSE_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Cadence of the strategy-exit check while OPEN
const STRATEGY_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Commands into the manager's control loop
#[derive(Debug)]
pub enum ManagerCommand {
    Intent(TradeIntent),
    ClosePosition(Pubkey),
    EmergencyExitAll,
}

/// Messages into one mint's lifecycle task
#[derive(Debug, Clone, Copy)]
pub(crate) enum MintMsg {
    Price(f64),
    /// Forced close; true when it is an emergency path
    Close(bool),
}

/// Monitor-facing record of what to watch
#[derive(Clone)]
pub struct TrackedMint {
    pub bonding_curve: Option<Pubkey>,
    pub(crate) tx: mpsc::Sender<MintMsg>,
}

/// Everything a mint task needs, shared by Arc
struct ManagerShared {
    config: PositionConfig,
    exec_config: ExecutionConfig,
    executor: Arc<dyn TradeExecutor>,
    capital: Arc<CapitalPool>,
    blacklist: Arc<SessionBlacklist>,
    stats: Arc<StatsBook>,
    reputation: Arc<CreatorReputationStore>,
    control: Arc<ControlState>,
    registry: Vec<Arc<dyn Strategy>>,
    params: Arc<ParamStore>,
    hub: Arc<MarketDataHub>,
    events: broadcast::Sender<EngineEvent>,
    positions: Arc<DashMap<Pubkey, Position>>,
    tracked: Arc<DashMap<Pubkey, TrackedMint>>,
}

impl ManagerShared {
    fn publish(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// A corrupted capital book means nothing downstream can be trusted
    fn fatal_invariant(&self, e: &Error) -> ! {
        error!("FATAL: {e}");
        self.control.set_emergency(true);
        self.publish(EngineEvent::EmergencyStop);
        std::process::exit(10);
    }
}

/// The manager: owns the control loop, spawns per-mint tasks
pub struct PositionManager {
    shared: Arc<ManagerShared>,
}

impl PositionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PositionConfig,
        exec_config: ExecutionConfig,
        executor: Arc<dyn TradeExecutor>,
        capital: Arc<CapitalPool>,
        blacklist: Arc<SessionBlacklist>,
        stats: Arc<StatsBook>,
        reputation: Arc<CreatorReputationStore>,
        control: Arc<ControlState>,
        registry: Vec<Arc<dyn Strategy>>,
        params: Arc<ParamStore>,
        hub: Arc<MarketDataHub>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                config,
                exec_config,
                executor,
                capital,
                blacklist,
                stats,
                reputation,
                control,
                registry,
                params,
                hub,
                events,
                positions: Arc::new(DashMap::new()),
                tracked: Arc::new(DashMap::new()),
            }),
        }
    }

    /// Status view of all positions (terminal ones included)
    pub fn positions(&self) -> Arc<DashMap<Pubkey, Position>> {
        Arc::clone(&self.shared.positions)
    }

    /// What the price monitor should watch
    pub fn tracked(&self) -> Arc<DashMap<Pubkey, TrackedMint>> {
        Arc::clone(&self.shared.tracked)
    }

    /// Open, non-terminal position count
    pub fn open_count(&self) -> usize {
        self.shared
            .positions
            .iter()
            .filter(|p| !p.state.is_terminal())
            .count()
    }

    /// Drive commands and alerts until both channels close
    pub async fn run(
        self,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        mut alert_rx: mpsc::Receiver<ThreatAlert>,
    ) {
        info!("position manager started");
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                alert = alert_rx.recv() => if let Some(alert) = alert {
                    self.handle_alert(alert).await;
                },
            }
        }
        info!("position manager stopped");
    }

    async fn handle_command(&self, command: ManagerCommand) {
        match command {
            ManagerCommand::Intent(intent) => match intent.action {
                SignalAction::Buy => self.open_from_intent(intent).await,
                SignalAction::Sell => {
                    self.request_close(&intent.mint, false).await;
                }
                SignalAction::Hold => {}
            },
            ManagerCommand::ClosePosition(mint) => {
                // Operator closes ride the emergency path: no price logic
                self.request_close(&mint, true).await;
            }
            ManagerCommand::EmergencyExitAll => {
                let mints: Vec<Pubkey> =
                    self.shared.tracked.iter().map(|e| *e.key()).collect();
                warn!("emergency exit of {} open position(s)", mints.len());
                for mint in mints {
                    self.request_close(&mint, true).await;
                }
            }
        }
    }

    async fn handle_alert(&self, alert: ThreatAlert) {
        self.shared.publish(EngineEvent::Alert {
            mint: alert.mint.to_string(),
            severity: format!("{:?}", alert.severity),
            reason: alert.reason.clone(),
        });

        if alert.severity == AlertSeverity::Critical {
            if self.shared.tracked.contains_key(&alert.mint) {
                warn!(mint = %alert.mint, "critical threat alert, forcing exit");
                self.request_close(&alert.mint, true).await;
            }
        }
    }

    async fn request_close(&self, mint: &Pubkey, emergency: bool) {
        match self.shared.tracked.get(mint) {
            Some(entry) => {
                let _ = entry.tx.send(MintMsg::Close(emergency)).await;
            }
            None => debug!(mint = %mint, "close requested for unknown position"),
        }
    }

    /// Admission checks, capital reservation, and task spawn for a BUY
    async fn open_from_intent(&self, intent: TradeIntent) {
        let shared = &self.shared;
        let mint = intent.mint;

        // No BUY ever starts under emergency stop
        if shared.control.is_emergency() {
            debug!(%mint, "buy dropped: emergency stop");
            return;
        }
        if !intent.manual && !shared.control.allows_entries() {
            debug!(%mint, "buy dropped: entries paused");
            return;
        }

        // Automated intents respect the session blacklist
        if !intent.manual && shared.blacklist.is_banned(&mint) {
            info!(%mint, "buy dropped: mint blacklisted");
            return;
        }

        // At most one position per mint in a non-terminal state
        if shared.tracked.contains_key(&mint) {
            debug!(%mint, "buy dropped: position already active");
            return;
        }

        match shared.capital.debit(intent.size_sol) {
            Ok(()) => {}
            Err(e @ Error::InvariantViolation(_)) => shared.fatal_invariant(&e),
            Err(e) => {
                info!(%mint, "buy dropped: {e}");
                return;
            }
        }

        let (tx, rx) = mpsc::channel(32);
        shared.tracked.insert(
            mint,
            TrackedMint {
                bonding_curve: intent.bonding_curve,
                tx,
            },
        );

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            run_position(shared, intent, rx).await;
        });
    }
}

/// One mint's lifecycle, serialized on this task
async fn run_position(
    shared: Arc<ManagerShared>,
    intent: TradeIntent,
    mut rx: mpsc::Receiver<MintMsg>,
) {
    let mint = intent.mint;
    let committed = intent.size_sol;
    let strategy_tag = intent
        .contributors
        .first()
        .map(|(tag, _)| tag.clone())
        .unwrap_or_else(|| "manual".to_string());

    // OPENING
    shared.positions.insert(
        mint,
        Position {
            mint,
            strategy_tag: strategy_tag.clone(),
            entry_price: 0.0,
            entry_time: chrono::Utc::now(),
            quantity: 0,
            capital_committed_sol: committed,
            stop_loss_price: 0.0,
            take_profit_price: 0.0,
            max_hold_deadline: chrono::Utc::now(),
            trailing_high: 0.0,
            state: PositionState::Opening,
            current_price: 0.0,
            realized_pnl_sol: None,
            emergency_exited: false,
        },
    );

    let slippage = intent
        .slippage_bps
        .unwrap_or(shared.exec_config.buy_slippage_bps);
    let open_deadline = Duration::from_secs(shared.config.open_deadline_secs);

    let fill = open_with_probe(&shared, &intent, slippage, open_deadline).await;

    let fill = match fill {
        Some(fill) => fill,
        None => {
            // FAILED: release capital, blacklist, terminal state
            if let Err(e) = shared.capital.credit(committed, 0.0) {
                shared.fatal_invariant(&e);
            }
            shared.blacklist.ban(mint);
            shared.tracked.remove(&mint);
            if let Some(mut p) = shared.positions.get_mut(&mint) {
                p.state = PositionState::Failed;
            }
            info!(%mint, "position failed to open; mint blacklisted");
            return;
        }
    };

    let mut position = Position::from_fill(
        mint,
        strategy_tag.clone(),
        fill.price,
        fill.quantity,
        committed,
        &shared.config,
    );
    shared.positions.insert(mint, position.clone());
    shared.hub.record_price(mint, fill.price);
    info!(
        %mint,
        price = fill.price,
        quantity = fill.quantity,
        "position open"
    );
    shared.publish(EngineEvent::TradeExecuted(TradeNotice {
        mint: mint.to_string(),
        action: SignalAction::Buy,
        size_sol: fill.sol_amount,
        price: fill.price,
        pnl_sol: None,
        strategy_tag: strategy_tag.clone(),
    }));

    // OPEN: watch prices, commands, and the owning strategy
    let trigger = monitor_open(&shared, &mut position, &mut rx).await;

    position.state = PositionState::Closing;
    position.emergency_exited = matches!(trigger, ExitTrigger::Emergency);
    shared.positions.insert(mint, position.clone());
    info!(%mint, ?trigger, "position closing");

    // CLOSING: never give up
    let sell_fill = close_until_done(&shared, &intent, &position, &mut rx).await;

    // CLOSED: finalization must complete even under shutdown
    finalize(&shared, &intent, &mut position, sell_fill, trigger);
}

/// OPENING with the probe-then-decide deadline path
async fn open_with_probe(
    shared: &ManagerShared,
    intent: &TradeIntent,
    slippage: u32,
    deadline: Duration,
) -> Option<Fill> {
    let mint = intent.mint;
    let attempt = tokio::time::timeout(
        deadline,
        shared.executor.execute_buy(
            &mint,
            intent.bonding_curve.as_ref(),
            intent.size_sol,
            slippage,
        ),
    )
    .await;

    match attempt {
        Ok(Ok(fill)) => Some(fill),
        Ok(Err(e)) if e.is_definitive() => {
            warn!(%mint, "buy failed definitively: {e}");
            None
        }
        outcome => {
            // Timeout or transient failure: the chain may have filled us
            // anyway. Probe before deciding.
            if let Ok(Err(e)) = &outcome {
                warn!(%mint, "buy outcome unknown ({e}), probing holdings");
            } else {
                warn!(%mint, "buy deadline exceeded, probing holdings");
            }

            match shared.executor.probe_holding(&mint).await {
                Ok(quantity) if quantity > 0 => {
                    let price = intent.size_sol / (quantity as f64 / 1e6);
                    info!(%mint, quantity, "probe found holdings, treating as filled");
                    Some(Fill {
                        price,
                        quantity,
                        sol_amount: intent.size_sol,
                        signature: String::new(),
                    })
                }
                Ok(_) => None,
                Err(e) => {
                    warn!(%mint, "probe failed ({e}), treating open as failed");
                    None
                }
            }
        }
    }
}

/// OPEN loop: first matching trigger wins
async fn monitor_open(
    shared: &ManagerShared,
    position: &mut Position,
    rx: &mut mpsc::Receiver<MintMsg>,
) -> ExitTrigger {
    let mut strategy_tick = tokio::time::interval(STRATEGY_CHECK_INTERVAL);
    strategy_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut strategy_wants_out = false;

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(MintMsg::Price(price)) => {
                    position.observe_price(price);
                    if let Some(mut entry) = shared.positions.get_mut(&position.mint) {
                        entry.observe_price(price);
                    }
                }
                Some(MintMsg::Close(emergency)) => {
                    return if emergency {
                        ExitTrigger::Emergency
                    } else {
                        ExitTrigger::StrategyExit
                    };
                }
                None => return ExitTrigger::Emergency,
            },
            _ = strategy_tick.tick() => {
                strategy_wants_out = strategy_exit_check(shared, position).await;
            }
        }

        let emergency = shared.control.is_emergency();
        if let Some(trigger) = position.evaluate_exit(
            chrono::Utc::now(),
            emergency,
            strategy_wants_out,
            shared.config.trailing_stop_pct,
        ) {
            return trigger;
        }
    }
}

/// Ask the owning strategy whether it wants out
async fn strategy_exit_check(shared: &ManagerShared, position: &Position) -> bool {
    let Some(strategy) = shared
        .registry
        .iter()
        .find(|s| s.tag() == position.strategy_tag)
    else {
        return false; // manual positions have no owning strategy
    };

    let params = shared.params.read().await;
    let view = shared.hub.view(&position.mint);
    let position_view = PositionView {
        mint: position.mint,
        strategy_tag: position.strategy_tag.clone(),
        entry_price: position.entry_price,
        current_price: position.current_price,
        held_secs: position.held_secs(chrono::Utc::now()),
    };

    strategy.should_exit(&position_view, &view, &params).await
}

/// CLOSING loop: escalate, alert, retry forever
async fn close_until_done(
    shared: &ManagerShared,
    intent: &TradeIntent,
    position: &Position,
    rx: &mut mpsc::Receiver<MintMsg>,
) -> Fill {
    let base_slippage = intent
        .slippage_bps
        .unwrap_or(shared.exec_config.sell_slippage_bps);
    let mut escalation = 0u32;

    loop {
        // Drain pending messages so the channel never backs up mid-close
        while rx.try_recv().is_ok() {}

        match shared
            .executor
            .execute_sell(
                &position.mint,
                intent.bonding_curve.as_ref(),
                position.quantity,
                base_slippage,
                escalation,
            )
            .await
        {
            Ok(fill) => return fill,
            Err(e) => {
                escalation += 1;
                warn!(
                    mint = %position.mint,
                    escalation,
                    "exit attempt failed: {e}"
                );

                if escalation == shared.config.max_exit_retries {
                    shared.publish(EngineEvent::Alert {
                        mint: position.mint.to_string(),
                        severity: "Critical".to_string(),
                        reason: format!(
                            "position cannot close after {escalation} attempts, still retrying"
                        ),
                    });
                }

                let backoff = Duration::from_millis(500u64 << escalation.min(6))
                    .min(CLOSE_BACKOFF_CAP);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Terminal accounting. This path must complete: P&L, capital release,
/// stats, and reputation all happen before the task ends.
fn finalize(
    shared: &ManagerShared,
    intent: &TradeIntent,
    position: &mut Position,
    fill: Fill,
    trigger: ExitTrigger,
) {
    let pnl = fill.sol_amount - position.capital_committed_sol;
    let hold_secs = position.held_secs(chrono::Utc::now());

    position.state = PositionState::Closed;
    position.realized_pnl_sol = Some(pnl);
    position.current_price = fill.price;
    shared.positions.insert(position.mint, position.clone());
    shared.tracked.remove(&position.mint);

    if let Err(e) = shared.capital.credit(position.capital_committed_sol, pnl) {
        shared.fatal_invariant(&e);
    }

    if !intent.manual {
        shared
            .stats
            .record_close(&position.strategy_tag, pnl, hold_secs, intent.confidence);
    }

    if let Some(creator) = intent.creator {
        shared.reputation.record_outcome(
            &creator.to_string(),
            pnl > 0.0,
            position.emergency_exited,
        );
    }

    shared.hub.forget(&position.mint);
    shared.publish(EngineEvent::TradeExecuted(TradeNotice {
        mint: position.mint.to_string(),
        action: SignalAction::Sell,
        size_sol: fill.sol_amount,
        price: fill.price,
        pnl_sol: Some(pnl),
        strategy_tag: position.strategy_tag.clone(),
    }));

    info!(
        mint = %position.mint,
        pnl = format!("{pnl:+.4}"),
        ?trigger,
        hold_secs = format!("{hold_secs:.0}"),
        "position closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapitalConfig, StrategiesConfig};
    use crate::error::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scriptable executor: pops pre-programmed outcomes
    struct MockExecutor {
        buys: Mutex<VecDeque<Result<Fill>>>,
        sells: Mutex<VecDeque<Result<Fill>>>,
        probe_quantity: Mutex<u64>,
    }

    impl MockExecutor {
        fn new() -> Self {
            Self {
                buys: Mutex::new(VecDeque::new()),
                sells: Mutex::new(VecDeque::new()),
                probe_quantity: Mutex::new(0),
            }
        }

        fn push_buy(&self, outcome: Result<Fill>) {
            self.buys.lock().unwrap().push_back(outcome);
        }

        fn push_sell(&self, outcome: Result<Fill>) {
            self.sells.lock().unwrap().push_back(outcome);
        }

        fn fill(price: f64, quantity: u64, sol: f64) -> Fill {
            Fill {
                price,
                quantity,
                sol_amount: sol,
                signature: "mock".into(),
            }
        }
    }

    #[async_trait]
    impl TradeExecutor for MockExecutor {
        async fn execute_buy(
            &self,
            _mint: &Pubkey,
            _curve: Option<&Pubkey>,
            size_sol: f64,
            _slippage: u32,
        ) -> Result<Fill> {
            self.buys
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Self::fill(0.0001, (size_sol * 1e9) as u64, size_sol)))
        }

        async fn execute_sell(
            &self,
            _mint: &Pubkey,
            _curve: Option<&Pubkey>,
            quantity: u64,
            _slippage: u32,
            _escalation: u32,
        ) -> Result<Fill> {
            self.sells
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Self::fill(0.0001, quantity, 0.1)))
        }

        async fn probe_holding(&self, _mint: &Pubkey) -> Result<u64> {
            Ok(*self.probe_quantity.lock().unwrap())
        }
    }

    struct Fixture {
        manager: PositionManager,
        executor: Arc<MockExecutor>,
        capital: Arc<CapitalPool>,
        blacklist: Arc<SessionBlacklist>,
        control: Arc<ControlState>,
        positions: Arc<DashMap<Pubkey, Position>>,
        tracked: Arc<DashMap<Pubkey, TrackedMint>>,
        /// Held so the manager's alert channel stays open
        alert_tx: Option<mpsc::Sender<ThreatAlert>>,
    }

    fn fixture() -> Fixture {
        let executor = Arc::new(MockExecutor::new());
        let capital = Arc::new(CapitalPool::new(2.0));
        let blacklist = Arc::new(SessionBlacklist::new(vec![]));
        let control = Arc::new(ControlState::new());
        let (events, _) = broadcast::channel(64);

        let manager = PositionManager::new(
            PositionConfig::default(),
            ExecutionConfig::default(),
            executor.clone() as Arc<dyn TradeExecutor>,
            Arc::clone(&capital),
            Arc::clone(&blacklist),
            Arc::new(StatsBook::new()),
            Arc::new(CreatorReputationStore::in_memory()),
            Arc::clone(&control),
            crate::strategy::default_registry(),
            Arc::new(ParamStore::new(StrategiesConfig::default())),
            Arc::new(MarketDataHub::new()),
            events,
        );

        let positions = manager.positions();
        let tracked = manager.tracked();

        Fixture {
            manager,
            executor,
            capital,
            blacklist,
            control,
            positions,
            tracked,
            alert_tx: None,
        }
    }

    async fn start(fixture: &mut Fixture) -> mpsc::Sender<ManagerCommand> {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (alert_tx, alert_rx) = mpsc::channel::<ThreatAlert>(16);
        fixture.alert_tx = Some(alert_tx);

        let manager = PositionManager {
            shared: Arc::clone(&fixture.manager.shared),
        };
        tokio::spawn(manager.run(command_rx, alert_rx));
        command_tx
    }

    fn buy_intent(size: f64) -> TradeIntent {
        let mut intent = TradeIntent::new(Pubkey::new_unique(), SignalAction::Buy, size);
        intent.contributors.push(("snipe".into(), "test".into()));
        intent
    }

    async fn wait_for<F: Fn() -> bool>(predicate: F) {
        // Generous budget: the close-retry path backs off in seconds
        for _ in 0..800 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_buy_intent_opens_position() {
        let mut f = fixture();
        f.executor
            .push_buy(Ok(MockExecutor::fill(0.0001, 1_000_000, 0.1)));
        let tx = start(&mut f).await;

        let intent = buy_intent(0.1);
        let mint = intent.mint;
        tx.send(ManagerCommand::Intent(intent)).await.unwrap();

        wait_for(|| {
            f.positions
                .get(&mint)
                .map(|p| p.state == PositionState::Open)
                .unwrap_or(false)
        })
        .await;

        assert!((f.capital.available_sol() - 1.9).abs() < 1e-9);
        assert!(f.tracked.contains_key(&mint));
    }

    #[tokio::test]
    async fn test_one_position_per_mint() {
        let mut f = fixture();
        let tx = start(&mut f).await;

        let intent = buy_intent(0.1);
        let mint = intent.mint;
        let mut duplicate = buy_intent(0.3);
        duplicate.mint = mint;

        tx.send(ManagerCommand::Intent(intent)).await.unwrap();
        wait_for(|| f.tracked.contains_key(&mint)).await;
        tx.send(ManagerCommand::Intent(duplicate)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Only the first debit happened
        assert!((f.capital.available_sol() - 1.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_blacklisted_mint_rejected() {
        let mut f = fixture();
        let tx = start(&mut f).await;

        let intent = buy_intent(0.1);
        let mint = intent.mint;
        f.blacklist.ban(mint);

        tx.send(ManagerCommand::Intent(intent)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!f.tracked.contains_key(&mint));
        assert!((f.capital.available_sol() - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_buy_under_emergency_stop() {
        let mut f = fixture();
        f.control.set_emergency(true);
        let tx = start(&mut f).await;

        let mut intent = buy_intent(0.1);
        intent.manual = true; // even manual buys stop here
        let mint = intent.mint;

        tx.send(ManagerCommand::Intent(intent)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!f.tracked.contains_key(&mint));
        assert!((f.capital.available_sol() - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_definitive_open_failure_blacklists_and_releases() {
        let mut f = fixture();
        f.executor
            .push_buy(Err(Error::DefinitiveTransport("sig rejected".into())));
        let tx = start(&mut f).await;

        let intent = buy_intent(0.1);
        let mint = intent.mint;
        tx.send(ManagerCommand::Intent(intent)).await.unwrap();

        wait_for(|| {
            f.positions
                .get(&mint)
                .map(|p| p.state == PositionState::Failed)
                .unwrap_or(false)
        })
        .await;

        assert!(f.blacklist.is_banned(&mint));
        assert!((f.capital.available_sol() - 2.0).abs() < 1e-9);
        assert!(!f.tracked.contains_key(&mint));
    }

    #[tokio::test]
    async fn test_stop_loss_exit_books_loss() {
        let mut f = fixture();
        f.executor
            .push_buy(Ok(MockExecutor::fill(100.0, 1_000_000, 0.5)));
        // Exit proceeds: 0.35 SOL against 0.5 committed = -0.15
        f.executor
            .push_sell(Ok(MockExecutor::fill(70.0, 1_000_000, 0.35)));
        let tx = start(&mut f).await;

        let intent = buy_intent(0.5);
        let mint = intent.mint;
        tx.send(ManagerCommand::Intent(intent)).await.unwrap();
        wait_for(|| {
            f.positions
                .get(&mint)
                .map(|p| p.state == PositionState::Open)
                .unwrap_or(false)
        })
        .await;

        // Price collapses through the 20% stop
        let price_tx = f.tracked.get(&mint).unwrap().tx.clone();
        price_tx.send(MintMsg::Price(70.0)).await.unwrap();

        wait_for(|| {
            f.positions
                .get(&mint)
                .map(|p| p.state == PositionState::Closed)
                .unwrap_or(false)
        })
        .await;

        let position = f.positions.get(&mint).unwrap().clone();
        assert!((position.realized_pnl_sol.unwrap() + 0.15).abs() < 1e-9);
        // P2: available = total after release; total shrank by the loss
        let snap = f.capital.snapshot();
        assert!((snap.available_sol - 1.85).abs() < 1e-9);
        assert!((snap.total_sol - 1.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_emergency_exit_all_forces_closing() {
        let mut f = fixture();
        let tx = start(&mut f).await;

        let first = buy_intent(0.2);
        let second = buy_intent(0.2);
        let mints = [first.mint, second.mint];
        tx.send(ManagerCommand::Intent(first)).await.unwrap();
        tx.send(ManagerCommand::Intent(second)).await.unwrap();

        wait_for(|| {
            mints.iter().all(|m| {
                f.positions
                    .get(m)
                    .map(|p| p.state == PositionState::Open)
                    .unwrap_or(false)
            })
        })
        .await;

        tx.send(ManagerCommand::EmergencyExitAll).await.unwrap();

        wait_for(|| {
            mints.iter().all(|m| {
                f.positions
                    .get(m)
                    .map(|p| p.state == PositionState::Closed)
                    .unwrap_or(false)
            })
        })
        .await;

        for mint in &mints {
            assert!(f.positions.get(mint).unwrap().emergency_exited);
        }
    }

    #[tokio::test]
    async fn test_failed_sells_keep_retrying_until_success() {
        let mut f = fixture();
        f.executor
            .push_buy(Ok(MockExecutor::fill(100.0, 1_000_000, 0.2)));
        // Two transient failures, then success
        f.executor
            .push_sell(Err(Error::TransientTransport("relay down".into())));
        f.executor
            .push_sell(Err(Error::TransientTransport("relay down".into())));
        f.executor
            .push_sell(Ok(MockExecutor::fill(100.0, 1_000_000, 0.2)));
        let tx = start(&mut f).await;

        let intent = buy_intent(0.2);
        let mint = intent.mint;
        tx.send(ManagerCommand::Intent(intent)).await.unwrap();
        wait_for(|| f.tracked.contains_key(&mint)).await;

        tx.send(ManagerCommand::ClosePosition(mint)).await.unwrap();

        // Stays CLOSING through the failures, lands CLOSED eventually
        wait_for(|| {
            f.positions
                .get(&mint)
                .map(|p| p.state == PositionState::Closed)
                .unwrap_or(false)
        })
        .await;
    }

    #[tokio::test]
    async fn test_open_deadline_probe_finds_fill() {
        let mut f = fixture();
        f.executor
            .push_buy(Err(Error::TransientTransport("confirmation lost".into())));
        *f.executor.probe_quantity.lock().unwrap() = 2_000_000;
        let tx = start(&mut f).await;

        let intent = buy_intent(0.2);
        let mint = intent.mint;
        tx.send(ManagerCommand::Intent(intent)).await.unwrap();

        wait_for(|| {
            f.positions
                .get(&mint)
                .map(|p| p.state == PositionState::Open)
                .unwrap_or(false)
        })
        .await;

        let position = f.positions.get(&mint).unwrap().clone();
        assert_eq!(position.quantity, 2_000_000);
    }
}
