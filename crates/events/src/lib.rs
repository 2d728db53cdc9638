//! # Tradelane Events
//!
//! This crate defines the trade-lifecycle event stream the engine publishes to
//! its control panel and notification collaborators, plus the account snapshot
//! returned on demand.
//!
//! As a Layer 0 crate, it depends only on `core-types`.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{
    AccountSnapshot, EngineEvent, LogLevel, LogMessage, PositionClosed, PositionOpened,
    PositionSummary, SignalFound, StageTransition,
};
