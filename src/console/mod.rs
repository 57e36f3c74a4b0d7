//! Override console - out-of-band control that pre-empts automation
//!
//! Commands arrive on one bounded channel and are applied in arrival
//! order on the control task, giving administrative changes a total
//! order. Observers get fire-and-forget notifications over a broadcast
//! bus; a lagging observer loses messages, never blocks the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::position::ManagerCommand;
use crate::strategy::{ParamStore, SignalAction, TradeIntent};

/// Command queue depth; a full queue is a 429 to the caller
const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Broadcast bus depth for observer notifications
const EVENT_BUS_CAPACITY: usize = 256;

/// Bot operational state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    Running,
    Paused,
    EmergencyStop,
}

/// Shared control flags read on every decision cycle.
///
/// Written only by the console task; everyone else reads.
pub struct ControlState {
    emergency: AtomicBool,
    paused: AtomicBool,
}

impl ControlState {
    pub fn new() -> Self {
        Self {
            emergency: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// New entries are allowed only when neither flag is set
    pub fn allows_entries(&self) -> bool {
        !self.is_emergency() && !self.is_paused()
    }

    pub fn set_emergency(&self, value: bool) {
        self.emergency.store(value, Ordering::SeqCst);
    }

    pub fn set_paused(&self, value: bool) {
        self.paused.store(value, Ordering::SeqCst);
    }

    pub fn bot_state(&self) -> BotState {
        if self.is_emergency() {
            BotState::EmergencyStop
        } else if self.is_paused() {
            BotState::Paused
        } else {
            BotState::Running
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

/// Manual override commands
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum OverrideCommand {
    EmergencyStop,
    Pause,
    Resume,
    Reset,
    ManualBuy {
        mint: String,
        size_sol: Option<f64>,
        slippage_bps: Option<u32>,
    },
    ManualSell {
        mint: String,
        slippage_bps: Option<u32>,
    },
    ClosePosition {
        mint: String,
    },
    StrategyOverride {
        params: HashMap<String, f64>,
    },
    StrategyReset,
}

/// A completed trade, for observers
#[derive(Debug, Clone, Serialize)]
pub struct TradeNotice {
    pub mint: String,
    pub action: SignalAction,
    pub size_sol: f64,
    pub price: f64,
    pub pnl_sol: Option<f64>,
    pub strategy_tag: String,
}

/// Fire-and-forget notifications on the observer bus
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum EngineEvent {
    StateChanged { state: BotState },
    EmergencyStop,
    TradeExecuted(TradeNotice),
    Alert { mint: String, severity: String, reason: String },
    ProviderHealthChanged { endpoint: String, status: String },
}

/// Submission handle given to the API and CLI
#[derive(Clone)]
pub struct ConsoleHandle {
    tx: mpsc::Sender<OverrideCommand>,
}

impl ConsoleHandle {
    /// Enqueue a command. A full queue surfaces CapacityExceeded, the
    /// transport layer maps it to 429.
    pub fn submit(&self, command: OverrideCommand) -> Result<()> {
        self.tx
            .try_send(command)
            .map_err(|_| Error::CapacityExceeded("override command queue".into()))
    }
}

/// Last-command bookkeeping surfaced in status
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsoleStats {
    pub commands_processed: u64,
    pub last_command: Option<String>,
    pub last_command_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The console task
pub struct OverrideConsole {
    control: Arc<ControlState>,
    params: Arc<ParamStore>,
    manager_tx: mpsc::Sender<ManagerCommand>,
    events: broadcast::Sender<EngineEvent>,
    command_rx: mpsc::Receiver<OverrideCommand>,
    default_buy_sol: f64,
    commands_processed: Arc<AtomicU64>,
    last_command: Arc<Mutex<Option<(String, chrono::DateTime<chrono::Utc>)>>>,
}

impl OverrideConsole {
    pub fn new(
        control: Arc<ControlState>,
        params: Arc<ParamStore>,
        manager_tx: mpsc::Sender<ManagerCommand>,
        default_buy_sol: f64,
    ) -> (Self, ConsoleHandle, broadcast::Sender<EngineEvent>) {
        let (tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        let console = Self {
            control,
            params,
            manager_tx,
            events: events.clone(),
            command_rx,
            default_buy_sol,
            commands_processed: Arc::new(AtomicU64::new(0)),
            last_command: Arc::new(Mutex::new(None)),
        };

        (console, ConsoleHandle { tx }, events)
    }

    /// Shared counters for the status snapshot
    pub fn stats_handles(
        &self,
    ) -> (
        Arc<AtomicU64>,
        Arc<Mutex<Option<(String, chrono::DateTime<chrono::Utc>)>>>,
    ) {
        (
            Arc::clone(&self.commands_processed),
            Arc::clone(&self.last_command),
        )
    }

    /// Drain and apply commands until every handle is dropped
    pub async fn run(mut self) {
        info!("override console started");
        while let Some(command) = self.command_rx.recv().await {
            self.apply(command).await;
        }
        info!("override console stopped");
    }

    async fn apply(&self, command: OverrideCommand) {
        let label = command_label(&command);
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_command.lock() {
            *last = Some((label.to_string(), chrono::Utc::now()));
        }

        match command {
            OverrideCommand::EmergencyStop => {
                // Idempotent: a second stop only re-logs
                let already = self.control.is_emergency();
                self.control.set_emergency(true);
                self.control.set_paused(true);
                warn!("EMERGENCY STOP {}", if already { "(already active)" } else { "activated" });

                if !already {
                    let _ = self
                        .manager_tx
                        .send(ManagerCommand::EmergencyExitAll)
                        .await;
                    self.publish(EngineEvent::EmergencyStop);
                    self.publish(EngineEvent::StateChanged {
                        state: BotState::EmergencyStop,
                    });
                }
            }
            OverrideCommand::Pause => {
                if self.control.is_emergency() {
                    warn!("cannot pause: emergency stop active, use reset first");
                    return;
                }
                self.control.set_paused(true);
                info!("bot paused");
                self.publish(EngineEvent::StateChanged {
                    state: BotState::Paused,
                });
            }
            OverrideCommand::Resume => {
                if self.control.is_emergency() {
                    warn!("cannot resume: emergency stop active, use reset first");
                    return;
                }
                self.control.set_paused(false);
                info!("bot resumed");
                self.publish(EngineEvent::StateChanged {
                    state: BotState::Running,
                });
            }
            OverrideCommand::Reset => {
                if !self.control.is_emergency() {
                    info!("no emergency stop to reset");
                    return;
                }
                self.control.set_emergency(false);
                self.control.set_paused(false);
                info!("emergency stop reset");
                self.publish(EngineEvent::StateChanged {
                    state: BotState::Running,
                });
            }
            OverrideCommand::ManualBuy {
                mint,
                size_sol,
                slippage_bps,
            } => {
                // Manual trades skip aggregation and veto, never the stop
                if self.control.is_emergency() {
                    warn!("manual buy rejected: emergency stop active");
                    return;
                }
                let Ok(mint) = mint.parse() else {
                    warn!("manual buy rejected: bad mint {mint}");
                    return;
                };
                let mut intent = TradeIntent::new(
                    mint,
                    SignalAction::Buy,
                    size_sol.unwrap_or(self.default_buy_sol),
                );
                intent.manual = true;
                intent.slippage_bps = slippage_bps;
                intent
                    .contributors
                    .push(("manual".into(), "operator buy".into()));
                let _ = self.manager_tx.send(ManagerCommand::Intent(intent)).await;
            }
            OverrideCommand::ManualSell { mint, slippage_bps } => {
                let Ok(mint) = mint.parse() else {
                    warn!("manual sell rejected: bad mint {mint}");
                    return;
                };
                let mut intent = TradeIntent::new(mint, SignalAction::Sell, 0.0);
                intent.manual = true;
                intent.slippage_bps = slippage_bps;
                intent
                    .contributors
                    .push(("manual".into(), "operator sell".into()));
                let _ = self.manager_tx.send(ManagerCommand::Intent(intent)).await;
            }
            OverrideCommand::ClosePosition { mint } => {
                let Ok(mint) = mint.parse() else {
                    warn!("close rejected: bad mint {mint}");
                    return;
                };
                let _ = self
                    .manager_tx
                    .send(ManagerCommand::ClosePosition(mint))
                    .await;
            }
            OverrideCommand::StrategyOverride { params } => {
                if let Err(e) = self.params.apply_override(&params).await {
                    warn!("strategy override rejected: {e}");
                }
            }
            OverrideCommand::StrategyReset => {
                if !self.params.reset().await {
                    info!("strategy reset: no override active");
                }
            }
        }
    }

    /// Fire-and-forget: observer failures are logged, never propagated
    fn publish(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            // No live observers; that is fine
        }
    }
}

fn command_label(command: &OverrideCommand) -> &'static str {
    match command {
        OverrideCommand::EmergencyStop => "emergency_stop",
        OverrideCommand::Pause => "pause",
        OverrideCommand::Resume => "resume",
        OverrideCommand::Reset => "reset",
        OverrideCommand::ManualBuy { .. } => "manual_buy",
        OverrideCommand::ManualSell { .. } => "manual_sell",
        OverrideCommand::ClosePosition { .. } => "close_position",
        OverrideCommand::StrategyOverride { .. } => "strategy_override",
        OverrideCommand::StrategyReset => "strategy_reset",
    }
}
