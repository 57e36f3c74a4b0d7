//! Chain module - launchpad and token account parsing
//!
//! On-chain layouts for the curve launchpad and SPL mints, plus the
//! price math used by monitoring and execution. Layouts can change
//! upstream without notice; decode failures degrade to `Unknown`
//! heuristic outcomes rather than errors.

pub mod curve;
pub mod mint;
pub mod program;

pub use curve::CurveState;
pub use mint::MintSummary;
