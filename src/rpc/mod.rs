//! RPC module - Multi-provider failover transport
//!
//! Exposes a single client over a pool of RPC endpoints. Each request is
//! routed to the best currently-healthy endpoint and retried on the
//! next-best on transient failure. A background loop scores endpoint
//! health; a shared blockhash cache avoids refetching within one block.

pub mod blockhash;
pub mod failover;
pub mod health;
pub mod subscription;

pub use blockhash::BlockhashCache;
pub use failover::{FailoverClient, HealthSummary, SignatureInfo, TxSummary};
pub use health::{ProviderHealth, ProviderStatus};
pub use subscription::{subscribe, StreamEvent, StreamSpec, SubscriptionHandle};
