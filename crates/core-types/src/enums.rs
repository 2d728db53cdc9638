use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side of the order
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    /// A resting stop that becomes a market order once the trigger price trades.
    StopMarket,
}

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// The order side that opens a position in this direction.
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// The order side that reduces or closes a position in this direction.
    pub fn exit_order_side(&self) -> OrderSide {
        self.entry_order_side().opposite()
    }

    /// Moves `base` by `distance` in the position's favorable direction.
    pub fn offset(&self, base: Decimal, distance: Decimal) -> Decimal {
        match self {
            Side::Long => base + distance,
            Side::Short => base - distance,
        }
    }

    /// Signed price movement from `from` to `to`, positive when it favors the position.
    pub fn favorable_move(&self, from: Decimal, to: Decimal) -> Decimal {
        match self {
            Side::Long => to - from,
            Side::Short => from - to,
        }
    }

    /// True when `candidate` is strictly more favorable to the position than `current`.
    pub fn is_more_favorable(&self, candidate: Decimal, current: Decimal) -> bool {
        self.favorable_move(current, candidate) > Decimal::ZERO
    }

    /// True when `price` has traded through `stop` against the position.
    pub fn is_stopped_out(&self, price: Decimal, stop: Decimal) -> bool {
        match self {
            Side::Long => price <= stop,
            Side::Short => price >= stop,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Volume-derived strength of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthGrade {
    Explosive,
    Strong,
    Moderate,
    Weak,
}

impl StrengthGrade {
    /// Grades a volume ratio against descending thresholds.
    pub fn from_volume_ratio(
        ratio: Decimal,
        explosive: Decimal,
        strong: Decimal,
        moderate: Decimal,
    ) -> Self {
        if ratio >= explosive {
            StrengthGrade::Explosive
        } else if ratio >= strong {
            StrengthGrade::Strong
        } else if ratio >= moderate {
            StrengthGrade::Moderate
        } else {
            StrengthGrade::Weak
        }
    }

    /// Points this grade contributes to the tier score.
    pub fn tier_points(&self) -> u8 {
        match self {
            StrengthGrade::Explosive | StrengthGrade::Strong => 2,
            StrengthGrade::Moderate => 1,
            StrengthGrade::Weak => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalTier {
    A,
    B,
    C,
}

impl fmt::Display for SignalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tier = match self {
            SignalTier::A => "A",
            SignalTier::B => "B",
            SignalTier::C => "C",
        };
        write!(f, "{tier}")
    }
}

/// The closed set of entry strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    VolumeBreakout,
    Reversal2B,
    EmaPullback,
}

impl StrategyKind {
    /// Lower value wins when several strategies fire on the same bar.
    pub fn priority(&self) -> u8 {
        match self {
            StrategyKind::VolumeBreakout => 1,
            StrategyKind::Reversal2B => 2,
            StrategyKind::EmaPullback => 3,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::VolumeBreakout => "volume breakout",
            StrategyKind::Reversal2B => "2B reversal",
            StrategyKind::EmaPullback => "EMA pullback",
        };
        write!(f, "{name}")
    }
}

/// Why a position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopHit,
    StructuralBreak,
    TimeExit,
    /// Partial closes consumed the whole position.
    Unwound,
    /// The exchange reported the symbol flat.
    ExchangeFlat,
    Manual,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::StopHit => "stop hit",
            CloseReason::StructuralBreak => "structural break",
            CloseReason::TimeExit => "time exit",
            CloseReason::Unwound => "fully unwound",
            CloseReason::ExchangeFlat => "closed on exchange",
            CloseReason::Manual => "manual close",
        };
        write!(f, "{reason}")
    }
}

/// Exit-protocol milestones reported on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionStage {
    OneR,
    FirstPartial,
    SecondPartial,
    /// 2.5R reached without the 1.5R partial; both partials taken at once.
    MergedPartial,
    Trailing,
}
