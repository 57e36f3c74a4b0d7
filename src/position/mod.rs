//! Position module - lifecycle, capital, and exit management
//!
//! Per-mint state machines drive entries to confirmed positions and
//! positions to closed books. Capital accounting and the session
//! blacklist live here because they are position-lifecycle state.

pub mod blacklist;
pub mod capital;
pub mod manager;
pub mod monitor;
pub mod state;

pub use blacklist::SessionBlacklist;
pub use capital::{CapitalPool, CapitalSnapshot};
pub use manager::{ManagerCommand, PositionManager, TrackedMint};
pub use monitor::spawn_monitor;
pub use state::{ExitTrigger, Position, PositionState};
