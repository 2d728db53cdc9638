use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so a sparse `config.toml` only needs the values
/// that differ. A loaded `Config` is never mutated; a reload produces a new one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub indicators: IndicatorConfig,
    pub timeframes: TimeframeConfig,
    pub market_filter: MarketFilterConfig,
    pub dynamic_thresholds: DynamicThresholdConfig,
    pub volume: VolumeConfig,
    pub tiers: TierConfig,
    pub strategies: StrategyConfig,
    pub mtf: MtfConfig,
    pub exit: ExitConfig,
    pub scanner: ScannerConfig,
    pub engine: EngineConfig,
    pub telegram: TelegramConfig,
    pub logging: LoggingConfig,
}

/// API credentials for both exchange environments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub testnet: ApiKeys,
    pub production: ApiKeys,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub key: String,
    pub secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Spot,
    #[serde(alias = "future")]
    Futures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum TradingDirection {
    Long,
    Short,
    Both,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub mode: TradingMode,
    pub direction: TradingDirection,
    pub leverage: u8,
    /// Trade against the exchange testnet instead of production.
    pub testnet: bool,
    /// Simulate fills locally instead of sending orders.
    pub dry_run: bool,
    /// Keep a resting stop order on the exchange for every open position.
    pub hard_stop_orders: bool,
    /// The static symbol universe, e.g. `BTC/USDT`.
    pub symbols: Vec<String>,
    pub quote_asset: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Futures,
            direction: TradingDirection::Both,
            leverage: 5,
            testnet: true,
            dry_run: false,
            hard_stop_orders: true,
            symbols: vec![
                "BTC/USDT".to_string(),
                "ETH/USDT".to_string(),
                "SOL/USDT".to_string(),
            ],
            quote_asset: "USDT".to_string(),
        }
    }
}

/// Contains parameters for trade-level and portfolio-level risk.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// The fraction of the balance to risk on a single trade (e.g., 0.01 for 1%).
    pub risk_per_trade: Decimal,
    /// Ceiling on the open risk of all positions as a fraction of the balance.
    pub max_total_risk: Decimal,
    /// Cap on a single position's notional, as a fraction of balance before leverage.
    pub max_position_fraction: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: dec!(0.01),
            max_total_risk: dec!(0.05),
            max_position_fraction: dec!(0.3),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub lookback_period: usize,
    pub volume_ma_period: usize,
    pub atr_period: usize,
    /// Static stop-distance multiplier, used when dynamic thresholds are off.
    pub atr_multiplier: Decimal,
    pub trend_ema_period: usize,
    pub fast_ema_period: usize,
    pub slow_ema_period: usize,
    pub adx_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            lookback_period: 20,
            volume_ma_period: 20,
            atr_period: 14,
            atr_multiplier: dec!(1.5),
            trend_ema_period: 200,
            fast_ema_period: 10,
            slow_ema_period: 20,
            adx_period: 14,
        }
    }
}

/// Candle intervals and fetch sizes for the three timeframes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeframeConfig {
    pub trend: String,
    pub signal: String,
    pub mtf: String,
    pub trend_limit: u16,
    pub signal_limit: u16,
    pub mtf_limit: u16,
    /// Candles fetched per position while monitoring.
    pub monitor_limit: u16,
    pub min_trend_bars: usize,
    pub min_signal_bars: usize,
}

impl Default for TimeframeConfig {
    fn default() -> Self {
        Self {
            trend: "1d".to_string(),
            signal: "1h".to_string(),
            mtf: "4h".to_string(),
            trend_limit: 250,
            signal_limit: 100,
            mtf_limit: 100,
            monitor_limit: 50,
            min_trend_bars: 100,
            min_signal_bars: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketFilterConfig {
    pub enabled: bool,
    /// Static ADX acceptance threshold.
    pub adx_threshold: Decimal,
    /// ADX at or above this marks a strong market.
    pub adx_strong_threshold: Decimal,
    pub atr_spike_multiplier: Decimal,
    pub ema_entanglement_threshold: Decimal,
    pub entanglement_fast_period: usize,
    pub entanglement_slow_period: usize,
}

impl Default for MarketFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            adx_threshold: dec!(20),
            adx_strong_threshold: dec!(25),
            atr_spike_multiplier: dec!(2.0),
            ema_entanglement_threshold: dec!(0.02),
            entanglement_fast_period: 10,
            entanglement_slow_period: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DynamicThresholdConfig {
    pub enabled: bool,
    /// ADX threshold used while the trailing ADX mean is weak.
    pub adx_base_threshold: Decimal,
    /// ADX threshold used while the trailing ADX mean is already strong.
    pub adx_strong_regime_threshold: Decimal,
    pub weak_regime_mean: Decimal,
    pub strong_regime_mean: Decimal,
    pub atr_quiet_multiplier: Decimal,
    pub atr_normal_multiplier: Decimal,
    pub atr_volatile_multiplier: Decimal,
    pub quiet_ratio: Decimal,
    pub volatile_ratio: Decimal,
}

impl Default for DynamicThresholdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            adx_base_threshold: dec!(18),
            adx_strong_regime_threshold: dec!(25),
            weak_regime_mean: dec!(20),
            strong_regime_mean: dec!(30),
            atr_quiet_multiplier: dec!(1.2),
            atr_normal_multiplier: dec!(1.5),
            atr_volatile_multiplier: dec!(2.0),
            quiet_ratio: dec!(0.8),
            volatile_ratio: dec!(1.5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub grading_enabled: bool,
    pub explosive_threshold: Decimal,
    pub strong_threshold: Decimal,
    pub moderate_threshold: Decimal,
    /// Reversal candidates below this volume ratio are discarded.
    pub minimum_threshold: Decimal,
    pub accept_weak_signals: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            grading_enabled: true,
            explosive_threshold: dec!(2.5),
            strong_threshold: dec!(1.5),
            moderate_threshold: dec!(1.0),
            minimum_threshold: dec!(0.7),
            accept_weak_signals: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub enabled: bool,
    pub tier_a_multiplier: Decimal,
    pub tier_b_multiplier: Decimal,
    pub tier_c_multiplier: Decimal,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tier_a_multiplier: dec!(1.0),
            tier_b_multiplier: dec!(0.7),
            tier_c_multiplier: dec!(0.5),
        }
    }
}

/// Parameters for the three signal detectors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub reversal_enabled: bool,
    /// Maximum penetration beyond the broken level, in ATRs.
    pub reversal_max_depth_atr: Decimal,
    pub ema_pullback_enabled: bool,
    /// Distance to the fast EMA that counts as a touch, as a fraction of the EMA.
    pub pullback_threshold: Decimal,
    pub pullback_min_volume_ratio: Decimal,
    pub pullback_target_window: usize,
    pub volume_breakout_enabled: bool,
    pub breakout_volume_multiplier: Decimal,
    pub breakout_window: usize,
    /// ATR fraction added beyond the structural level for pullback and breakout stops.
    pub stop_buffer_atr: Decimal,
    pub min_bars: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            reversal_enabled: true,
            reversal_max_depth_atr: dec!(3),
            ema_pullback_enabled: true,
            pullback_threshold: dec!(0.02),
            pullback_min_volume_ratio: dec!(0.6),
            pullback_target_window: 20,
            volume_breakout_enabled: true,
            breakout_volume_multiplier: dec!(2.0),
            breakout_window: 9,
            stop_buffer_atr: dec!(0.5),
            min_bars: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MtfConfig {
    pub enabled: bool,
    pub fast_ema_period: usize,
    pub slow_ema_period: usize,
}

impl Default for MtfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fast_ema_period: 20,
            slow_ema_period: 50,
        }
    }
}

/// The exit protocol shared by every position regardless of tier.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    /// Percent of the open size closed at 1.5R.
    pub first_partial_pct: Decimal,
    /// Percent of the open size closed at 2.5R.
    pub second_partial_pct: Decimal,
    pub trailing_atr_multiplier: Decimal,
    pub max_hold_hours: i64,
    pub structure_break_enabled: bool,
    /// Fractional break beyond the swing extreme that counts as a structural break.
    pub structure_break_tolerance: Decimal,
    pub swing_window: usize,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            first_partial_pct: dec!(30),
            second_partial_pct: dec!(30),
            trailing_atr_multiplier: dec!(1.5),
            max_hold_hours: 24,
            structure_break_enabled: true,
            structure_break_tolerance: dec!(0.005),
            swing_window: 9,
        }
    }
}

/// The external scanner's candidate file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub enabled: bool,
    pub path: String,
    pub max_age_minutes: i64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "hot_symbols.json".to_string(),
            max_age_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poll_interval_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            max_retries: 3,
            retry_delay_secs: 5,
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Directory for daily-rolling log files. Empty disables file logging.
    pub directory: String,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
            file_prefix: "tradelane.log".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn keys(&self, testnet: bool) -> &ApiKeys {
        if testnet { &self.testnet } else { &self.production }
    }
}

impl TierConfig {
    pub fn multiplier(&self, tier: core_types::SignalTier) -> Decimal {
        match tier {
            core_types::SignalTier::A => self.tier_a_multiplier,
            core_types::SignalTier::B => self.tier_b_multiplier,
            core_types::SignalTier::C => self.tier_c_multiplier,
        }
    }
}
