//! # Tradelane Executor Crate
//!
//! Order execution and the per-position exit protocol.
//!
//! - `Executor`: market, stop and cancel, implemented by `LiveExecutor`
//!   (exchange) and `PaperExecutor` (dry run).
//! - `PositionLifecycle`: drives one position from its entry fill through
//!   the 1R / 1.5R / 2.5R stages and trailing stop to closure, keeping the
//!   resting stop order in step with the local stop.
//! - `PositionRegistry`: the engine's symbol -> position map.

// Declare the modules that constitute this crate.
pub mod error;
pub mod exchange;
pub mod lifecycle;
pub mod registry;

// Re-export the key components to provide a clean, public-facing API.
pub use error::ExecutorError;
pub use exchange::{Executor, LiveExecutor, PaperExecutor};
pub use lifecycle::{
    EntryPlan, LifecycleContext, MarketTick, Position, PositionLifecycle, PositionStatus,
    ProtectionFlags,
};
pub use registry::PositionRegistry;
