pub mod enums;
pub mod error;
pub mod structs;
pub mod symbols;

// Re-export the core types to provide a clean public API.
pub use enums::{
    CloseReason, OrderSide, OrderType, ProtectionStage, Side, SignalTier, StrategyKind,
    StrengthGrade,
};
pub use error::CoreError;
pub use structs::{
    ExchangePosition, Execution, Kline, OrderRequest, SignalCandidate, SymbolFilters,
};
pub use symbols::{from_exchange_id, to_exchange_id};
