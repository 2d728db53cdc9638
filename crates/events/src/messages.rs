use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{CloseReason, ProtectionStage, Side, SignalTier, StrategyKind, StrengthGrade};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Enum representing the severity of a log message for structured logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A free-form operational message for the control panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// A candidate survived every gate and is about to be sized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalFound {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub strategy: StrategyKind,
    pub strength: StrengthGrade,
    pub tier: SignalTier,
    pub entry_price: Decimal,
    pub volume_ratio: Decimal,
    pub mtf_aligned: bool,
    pub market_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionOpened {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub tier: SignalTier,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub stage: ProtectionStage,
    pub price: Decimal,
    pub new_stop: Decimal,
    pub closed_quantity: Decimal,
    pub remaining_size: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionClosed {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub reason: CloseReason,
    /// Zero when the exchange closed the position on its own.
    pub price: Decimal,
    pub closed_quantity: Decimal,
}

/// One open position as shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Balance and open positions, rendered by the control panel on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub timestamp: DateTime<Utc>,
    pub balance: Decimal,
    pub positions: Vec<PositionSummary>,
}

impl AccountSnapshot {
    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The top-level event enum published by the engine.
///
/// Serialized with `#[serde(tag = "type", content = "payload")]`, e.g.
/// `{ "type": "PositionClosed", "payload": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    Log(LogMessage),
    SignalFound(SignalFound),
    PositionOpened(PositionOpened),
    StageTransition(StageTransition),
    PositionClosed(PositionClosed),
    AccountSnapshot(AccountSnapshot),
}

impl EngineEvent {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        EngineEvent::Log(LogMessage {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        })
    }

    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}
