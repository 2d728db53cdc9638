//! Position sizing, the aggregate risk budget and venue precision rules.

pub mod error;
pub mod manager;
pub mod precision;

pub use error::RiskError;
pub use manager::{FixedFractionalRiskManager, PositionSize, RiskExposure};
pub use precision::{PrecisionAdapter, Rounded};

use core_types::Side;
use rust_decimal::Decimal;

/// The sizing and budgeting contract the engine depends on.
pub trait RiskManager: Send + Sync {
    /// Sizes a new position. Any `Err` means the candidate is dropped.
    fn size_position(
        &self,
        symbol: &str,
        balance: Decimal,
        entry_price: Decimal,
        stop_price: Decimal,
        tier_multiplier: Decimal,
    ) -> Result<PositionSize, RiskError>;

    /// True while the open risk of `exposures` stays within the configured
    /// fraction of `balance`.
    fn check_aggregate_risk(&self, exposures: &[RiskExposure], balance: Decimal) -> bool;

    /// Initial stop: `multiplier` ATRs beyond the structural extreme.
    fn calculate_stop_loss(&self, extreme: Decimal, atr: Decimal, side: Side, multiplier: Decimal) -> Decimal;
}
