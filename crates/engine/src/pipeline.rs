use configuration::{Config, TradingDirection, TradingMode};
use core_types::SignalCandidate;
use indicators::IndicatorFrame;
use rust_decimal::Decimal;
use strategies::{
    Detector, DynamicThresholdPolicy, MarketConditionFilter, MtfConfirmation, SignalTierClassifier,
    StrategyError, TierDecision, TierInputs, check_trend, create_detectors, detect_best,
    direction_allows,
};

/// A candidate that passed every gate, with what sizing needs to know.
#[derive(Debug, Clone)]
pub struct ApprovedSignal {
    pub candidate: SignalCandidate,
    pub market_reason: String,
    pub mtf_aligned: bool,
    pub tier: TierDecision,
    /// ATR multiple for the initial stop, from the current volatility regime.
    pub atr_multiplier: Decimal,
}

/// The per-symbol entry decision, built once per configuration snapshot.
///
/// Order of gates: market condition on the trend frame, detectors on the
/// signal frame, direction, trend agreement, then MTF and tiering.
pub struct SignalPipeline {
    filter: MarketConditionFilter,
    detectors: Vec<Detector>,
    mtf: MtfConfirmation,
    tiers: SignalTierClassifier,
    thresholds: DynamicThresholdPolicy,
    direction: TradingDirection,
    mode: TradingMode,
    trend_ema_period: usize,
}

impl SignalPipeline {
    pub fn new(config: &Config) -> Result<Self, StrategyError> {
        Ok(Self {
            filter: MarketConditionFilter::new(config),
            detectors: create_detectors(config)?,
            mtf: MtfConfirmation::new(&config.mtf),
            tiers: SignalTierClassifier::new(&config.tiers),
            thresholds: DynamicThresholdPolicy::new(config),
            direction: config.trading.direction,
            mode: config.trading.mode,
            trend_ema_period: config.indicators.trend_ema_period,
        })
    }

    pub fn wants_mtf(&self) -> bool {
        self.mtf.is_enabled()
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        trend: &IndicatorFrame,
        signal: &IndicatorFrame,
        mtf: Option<&IndicatorFrame>,
    ) -> Result<Option<ApprovedSignal>, StrategyError> {
        let condition = self.filter.evaluate(trend, symbol)?;
        if !condition.tradable {
            tracing::debug!(symbol, reason = %condition.reason, "Market filter rejected");
            return Ok(None);
        }

        let Some(candidate) = detect_best(&self.detectors, symbol, signal) else {
            return Ok(None);
        };

        if !direction_allows(self.direction, self.mode, candidate.side) {
            tracing::debug!(symbol, side = %candidate.side, "Direction not allowed");
            return Ok(None);
        }

        let (agrees, trend_desc) = check_trend(trend, candidate.side, self.trend_ema_period);
        if !agrees {
            tracing::info!(
                symbol,
                side = %candidate.side,
                strategy = %candidate.strategy,
                trend = trend_desc,
                "Candidate against the primary trend"
            );
            return Ok(None);
        }

        let alignment = self.mtf.check(mtf, candidate.side)?;
        let tier = self.tiers.classify(TierInputs {
            mtf_aligned: alignment.aligned,
            strong_market: condition.strong_market,
            strength: candidate.strength,
            candle_confirmed: candidate.candle_confirmed,
        });
        tracing::debug!(symbol, mtf = %alignment.reason, tier = %tier.tier, score = tier.score, "Candidate tiered");

        Ok(Some(ApprovedSignal {
            atr_multiplier: self.thresholds.atr_multiplier(signal),
            market_reason: condition.reason,
            mtf_aligned: alignment.aligned,
            tier,
            candidate,
        }))
    }
}
