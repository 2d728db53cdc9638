use crate::error::ExecutorError;
use crate::exchange::Executor;
use chrono::{DateTime, Duration, Utc};
use configuration::ExitConfig;
use core_types::{
    CloseReason, Kline, OrderRequest, ProtectionStage, Side, SignalTier, StrategyKind,
};
use events::{EngineEvent, PositionClosed, PositionOpened, StageTransition};
use risk::{PrecisionAdapter, RiskExposure};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

// R-multiples that trigger each stage, and where each stage moves the stop.
const ONE_R: Decimal = dec!(1.0);
const FIRST_PARTIAL_R: Decimal = dec!(1.5);
const SECOND_PARTIAL_R: Decimal = dec!(2.5);
const ONE_R_STOP: Decimal = dec!(0.3);
const FIRST_PARTIAL_STOP: Decimal = dec!(0.5);
const SECOND_PARTIAL_STOP: Decimal = dec!(1.5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionStatus {
    Active,
    Closed,
}

/// Exit-protocol milestones. Each only ever goes from false to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProtectionFlags {
    pub one_r: bool,
    pub first_partial: bool,
    pub second_partial: bool,
    pub trailing: bool,
}

impl ProtectionFlags {
    pub fn any(&self) -> bool {
        self.one_r || self.first_partial || self.second_partial || self.trailing
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub tier: SignalTier,
    pub strategy: StrategyKind,
    pub entry_price: Decimal,
    /// Fixed at entry; one R is the distance from here to the entry price.
    pub initial_stop: Decimal,
    /// The last stop known to be live (or the local stop without hard stop orders).
    pub current_stop: Decimal,
    pub original_size: Decimal,
    pub remaining_size: Decimal,
    pub entry_time: DateTime<Utc>,
    pub flags: ProtectionFlags,
    pub highest_price: Decimal,
    pub lowest_price: Decimal,
    pub last_atr: Option<Decimal>,
    pub stop_order_id: Option<String>,
    /// A stop that could not be placed yet; retried on the next monitor.
    pub pending_stop: Option<Decimal>,
    pub status: PositionStatus,
    pub close_reason: Option<CloseReason>,
}

impl Position {
    pub fn r_unit(&self) -> Decimal {
        (self.entry_price - self.initial_stop).abs()
    }

    /// Favorable move from entry in units of R. `None` when R is zero.
    pub fn r_multiple(&self, price: Decimal) -> Option<Decimal> {
        let r = self.r_unit();
        if r.is_zero() {
            return None;
        }
        Some(self.side.favorable_move(self.entry_price, price) / r)
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    pub fn exposure(&self) -> RiskExposure {
        RiskExposure {
            side: self.side,
            entry_price: self.entry_price,
            current_stop: self.current_stop,
            remaining_size: self.remaining_size,
        }
    }

    fn record(&mut self, price: Decimal, atr: Option<Decimal>) {
        self.highest_price = self.highest_price.max(price);
        self.lowest_price = self.lowest_price.min(price);
        if let Some(atr) = atr.filter(|a| *a > Decimal::ZERO) {
            self.last_atr = Some(atr);
        }
    }
}

/// What the monitor sees of the market on one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketTick {
    pub price: Decimal,
    pub atr: Option<Decimal>,
    /// Extremes of the recent completed bars, for the structural-break exit.
    pub swing_low: Option<Decimal>,
    pub swing_high: Option<Decimal>,
    pub at: DateTime<Utc>,
}

impl MarketTick {
    pub fn new(price: Decimal, atr: Option<Decimal>, at: DateTime<Utc>) -> Self {
        Self { price, atr, swing_low: None, swing_high: None, at }
    }

    /// Price from the newest bar; swing extremes from the `window` bars before it.
    /// With fewer than `window` completed bars there is no swing structure yet.
    pub fn from_klines(klines: &[Kline], atr: Option<Decimal>, window: usize, at: DateTime<Utc>) -> Option<Self> {
        let (current, completed) = klines.split_last()?;
        let mut tick = Self::new(current.close, atr, at);
        if window > 0 && completed.len() >= window {
            let swing = &completed[completed.len() - window..];
            tick.swing_low = swing.iter().map(|k| k.low).min();
            tick.swing_high = swing.iter().map(|k| k.high).max();
        }
        Some(tick)
    }
}

/// A sized, approved entry waiting to be executed.
#[derive(Debug, Clone)]
pub struct EntryPlan {
    pub symbol: String,
    pub side: Side,
    pub tier: SignalTier,
    pub strategy: StrategyKind,
    pub quantity: Decimal,
    pub reference_price: Decimal,
    pub stop_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// Collaborators and settings shared by every position.
#[derive(Clone)]
pub struct LifecycleContext {
    pub executor: Arc<dyn Executor>,
    pub precision: Arc<PrecisionAdapter>,
    pub events: broadcast::Sender<EngineEvent>,
    pub exit: ExitConfig,
    pub hard_stop_orders: bool,
}

enum PartialOutcome {
    Reduced(Decimal),
    /// The slice rounded to zero; no order was sent.
    Skipped,
    /// The slice covered the whole remainder and the position was closed.
    Unwound,
}

/// Drives one position from its entry fill to closure.
///
/// The state is `Active` until a full close, after which every call is a
/// no-op. Stops only move in the position's favor, and `current_stop` only
/// changes once the exchange has accepted the new stop order.
pub struct PositionLifecycle {
    position: Position,
    ctx: LifecycleContext,
}

impl PositionLifecycle {
    /// Sends the entry order and, once filled, rests the protective stop.
    ///
    /// Nothing is tracked when the entry fails. A failed stop placement does
    /// not undo the entry; the stop stays pending and is retried by `monitor`.
    pub async fn enter(plan: EntryPlan, ctx: LifecycleContext) -> Result<Self, ExecutorError> {
        if plan.quantity <= Decimal::ZERO {
            return Err(ExecutorError::InvalidQuantity { symbol: plan.symbol, quantity: plan.quantity });
        }
        let order = OrderRequest::market(
            &plan.symbol,
            plan.side.entry_order_side(),
            plan.quantity,
            false,
            plan.reference_price,
        );
        let fill = ctx.executor.execute(&order).await?;
        let entry_price = if fill.price > Decimal::ZERO { fill.price } else { plan.reference_price };

        let position = Position {
            symbol: plan.symbol,
            side: plan.side,
            tier: plan.tier,
            strategy: plan.strategy,
            entry_price,
            initial_stop: plan.stop_price,
            current_stop: plan.stop_price,
            original_size: fill.quantity,
            remaining_size: fill.quantity,
            entry_time: plan.opened_at,
            flags: ProtectionFlags::default(),
            highest_price: entry_price,
            lowest_price: entry_price,
            last_atr: None,
            stop_order_id: None,
            pending_stop: None,
            status: PositionStatus::Active,
            close_reason: None,
        };
        tracing::info!(
            symbol = %position.symbol,
            side = %position.side,
            tier = %position.tier,
            quantity = %position.original_size,
            entry = %entry_price,
            stop = %position.initial_stop,
            "Position opened"
        );

        let mut lifecycle = Self { position, ctx };
        lifecycle.emit(EngineEvent::PositionOpened(PositionOpened {
            timestamp: Utc::now(),
            symbol: lifecycle.position.symbol.clone(),
            side: lifecycle.position.side,
            tier: lifecycle.position.tier,
            entry_price,
            stop_price: lifecycle.position.initial_stop,
            quantity: lifecycle.position.original_size,
        }));
        if lifecycle.ctx.hard_stop_orders {
            let stop = lifecycle.position.initial_stop;
            lifecycle.sync_stop(stop).await;
        }
        Ok(lifecycle)
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn symbol(&self) -> &str {
        &self.position.symbol
    }

    pub fn is_active(&self) -> bool {
        self.position.is_active()
    }

    /// One pass of the exit protocol. Checks run in a fixed order and the
    /// first exit that fires ends the pass.
    pub async fn monitor(&mut self, tick: &MarketTick) -> Result<PositionStatus, ExecutorError> {
        if !self.is_active() {
            return Ok(PositionStatus::Closed);
        }
        self.position.record(tick.price, tick.atr);
        self.heal_stop().await;

        let price = tick.price;
        let side = self.position.side;

        if side.is_stopped_out(price, self.position.current_stop) {
            tracing::info!(symbol = %self.position.symbol, %price, stop = %self.position.current_stop, "Stop hit");
            self.close(CloseReason::StopHit, price).await?;
            return Ok(PositionStatus::Closed);
        }

        if self.ctx.exit.structure_break_enabled && self.structure_broken(tick) {
            tracing::info!(symbol = %self.position.symbol, %price, "Swing structure broken");
            self.close(CloseReason::StructuralBreak, price).await?;
            return Ok(PositionStatus::Closed);
        }

        let held = tick.at - self.position.entry_time;
        let expired = Duration::try_hours(self.ctx.exit.max_hold_hours).is_some_and(|limit| held >= limit);
        if expired && !self.position.flags.first_partial {
            tracing::info!(symbol = %self.position.symbol, hours = held.num_hours(), "Max hold time reached without progress");
            self.close(CloseReason::TimeExit, price).await?;
            return Ok(PositionStatus::Closed);
        }

        let Some(r) = self.position.r_multiple(price) else {
            return Ok(PositionStatus::Active);
        };
        let flags = self.position.flags;
        let exit = &self.ctx.exit;

        if !flags.second_partial && r >= SECOND_PARTIAL_R {
            // Gapping past 1.5R takes both slices at once.
            let merged = !flags.first_partial;
            let (stage, pct) = if merged {
                (ProtectionStage::MergedPartial, exit.first_partial_pct + exit.second_partial_pct)
            } else {
                (ProtectionStage::SecondPartial, exit.second_partial_pct)
            };
            if self.run_stage(stage, Some(pct), SECOND_PARTIAL_STOP, price).await? {
                return Ok(PositionStatus::Closed);
            }
            self.position.flags = ProtectionFlags { one_r: true, first_partial: true, second_partial: true, trailing: true };
        } else if !flags.first_partial && r >= FIRST_PARTIAL_R {
            let pct = exit.first_partial_pct;
            if self.run_stage(ProtectionStage::FirstPartial, Some(pct), FIRST_PARTIAL_STOP, price).await? {
                return Ok(PositionStatus::Closed);
            }
            self.position.flags.one_r = true;
            self.position.flags.first_partial = true;
        } else if !flags.one_r && r >= ONE_R {
            self.run_stage(ProtectionStage::OneR, None, ONE_R_STOP, price).await?;
            self.position.flags.one_r = true;
        }

        if self.position.flags.trailing {
            self.trail(price).await;
        }
        Ok(PositionStatus::Active)
    }

    /// Closes whatever remains at market. Closing a closed position does nothing.
    ///
    /// If the close order fails, the protective stop is put back and the
    /// position stays active.
    pub async fn close(&mut self, reason: CloseReason, price: Decimal) -> Result<(), ExecutorError> {
        if !self.is_active() {
            return Ok(());
        }
        let symbol = self.position.symbol.clone();

        if let Some(id) = self.position.stop_order_id.take() {
            if let Err(e) = self.ctx.executor.cancel(&symbol, &id).await {
                tracing::warn!(symbol = %symbol, order_id = %id, error = %e, "Could not cancel the resting stop before closing");
                self.position.stop_order_id = Some(id);
            }
        }

        let quantity = self.position.remaining_size;
        if quantity > Decimal::ZERO {
            let order = OrderRequest::market(&symbol, self.position.side.exit_order_side(), quantity, true, price);
            if let Err(e) = self.ctx.executor.execute(&order).await {
                tracing::error!(symbol = %symbol, %reason, error = %e, "Close order failed");
                if self.ctx.hard_stop_orders {
                    let stop = self.position.current_stop;
                    self.sync_stop(stop).await;
                }
                return Err(e);
            }
        }
        if let Some(id) = &self.position.stop_order_id {
            tracing::warn!(symbol = %symbol, order_id = %id, "Position closed with a stop order still resting");
        }
        self.finish(reason, price, quantity);
        Ok(())
    }

    /// Marks the position closed because the exchange reports it flat. No
    /// order is sent. Returns false if it was already closed.
    pub fn mark_closed_externally(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        let quantity = self.position.remaining_size;
        self.position.stop_order_id = None;
        self.finish(CloseReason::ExchangeFlat, Decimal::ZERO, quantity);
        true
    }

    fn finish(&mut self, reason: CloseReason, price: Decimal, closed_quantity: Decimal) {
        self.position.status = PositionStatus::Closed;
        self.position.close_reason = Some(reason);
        self.position.remaining_size = Decimal::ZERO;
        self.position.pending_stop = None;
        tracing::info!(symbol = %self.position.symbol, %reason, %price, "Position closed");
        self.emit(EngineEvent::PositionClosed(PositionClosed {
            timestamp: Utc::now(),
            symbol: self.position.symbol.clone(),
            side: self.position.side,
            reason,
            price,
            closed_quantity,
        }));
    }

    /// Takes the stage's partial (if any), then tightens the stop to
    /// `entry + stop_r * R`. Returns true if the partial closed the position.
    async fn run_stage(
        &mut self,
        stage: ProtectionStage,
        partial_pct: Option<Decimal>,
        stop_r: Decimal,
        price: Decimal,
    ) -> Result<bool, ExecutorError> {
        let mut closed_quantity = Decimal::ZERO;
        if let Some(pct) = partial_pct {
            match self.take_partial(pct, price).await? {
                PartialOutcome::Unwound => return Ok(true),
                PartialOutcome::Reduced(quantity) => closed_quantity = quantity,
                PartialOutcome::Skipped => {}
            }
        }

        let p = &self.position;
        let target = self.snap(p.side.offset(p.entry_price, p.r_unit() * stop_r));
        if p.side.is_more_favorable(target, p.current_stop) {
            self.sync_stop(target).await;
        } else if closed_quantity > Decimal::ZERO && self.ctx.hard_stop_orders {
            // Resize the resting stop to what is left.
            let stop = p.current_stop;
            self.sync_stop(stop).await;
        }

        tracing::info!(
            symbol = %self.position.symbol,
            ?stage,
            %price,
            stop = %self.position.current_stop,
            closed = %closed_quantity,
            remaining = %self.position.remaining_size,
            "Protection stage reached"
        );
        self.emit(EngineEvent::StageTransition(StageTransition {
            timestamp: Utc::now(),
            symbol: self.position.symbol.clone(),
            stage,
            price,
            new_stop: self.position.current_stop,
            closed_quantity,
            remaining_size: self.position.remaining_size,
        }));
        Ok(false)
    }

    /// Closes `pct` percent of what is still open.
    async fn take_partial(&mut self, pct: Decimal, price: Decimal) -> Result<PartialOutcome, ExecutorError> {
        let p = &self.position;
        let raw = (p.remaining_size * pct / Decimal::ONE_HUNDRED).min(p.remaining_size);
        let quantity = self.ctx.precision.round_down(&p.symbol, raw);
        if quantity <= Decimal::ZERO {
            tracing::info!(symbol = %p.symbol, %raw, "Partial close rounds to zero; no order sent");
            return Ok(PartialOutcome::Skipped);
        }
        if quantity >= p.remaining_size {
            self.close(CloseReason::Unwound, price).await?;
            return Ok(PartialOutcome::Unwound);
        }

        let order = OrderRequest::market(&p.symbol, p.side.exit_order_side(), quantity, true, price);
        let fill = self.ctx.executor.execute(&order).await?;
        let closed = fill.quantity.min(self.position.remaining_size);
        self.position.remaining_size -= closed;
        Ok(PartialOutcome::Reduced(closed))
    }

    async fn trail(&mut self, price: Decimal) {
        let Some(atr) = self.position.last_atr else {
            return;
        };
        let p = &self.position;
        let extreme = match p.side {
            Side::Long => p.highest_price,
            Side::Short => p.lowest_price,
        };
        let candidate = self.snap(p.side.offset(extreme, -(atr * self.ctx.exit.trailing_atr_multiplier)));
        if !p.side.is_more_favorable(candidate, p.current_stop) {
            return;
        }
        if self.sync_stop(candidate).await {
            tracing::debug!(symbol = %self.position.symbol, stop = %candidate, "Trailing stop advanced");
            self.emit(EngineEvent::StageTransition(StageTransition {
                timestamp: Utc::now(),
                symbol: self.position.symbol.clone(),
                stage: ProtectionStage::Trailing,
                price,
                new_stop: candidate,
                closed_quantity: Decimal::ZERO,
                remaining_size: self.position.remaining_size,
            }));
        }
    }

    fn structure_broken(&self, tick: &MarketTick) -> bool {
        let tolerance = self.ctx.exit.structure_break_tolerance;
        match self.position.side {
            Side::Long => tick.swing_low.is_some_and(|low| tick.price < low * (Decimal::ONE - tolerance)),
            Side::Short => tick.swing_high.is_some_and(|high| tick.price > high * (Decimal::ONE + tolerance)),
        }
    }

    /// Re-places a stop that is missing or failed to place earlier.
    async fn heal_stop(&mut self) {
        if !self.ctx.hard_stop_orders {
            return;
        }
        let p = &self.position;
        if p.pending_stop.is_none() && p.stop_order_id.is_some() {
            return;
        }
        let target = p.pending_stop.unwrap_or(p.current_stop);
        tracing::info!(symbol = %p.symbol, stop = %target, "Re-placing missing protective stop");
        self.sync_stop(target).await;
    }

    /// Cancel-then-place at `trigger` for the remaining size. `current_stop`
    /// moves only once the new order is accepted. Returns whether it moved.
    async fn sync_stop(&mut self, trigger: Decimal) -> bool {
        let trigger = self.snap(trigger);
        if !self.ctx.hard_stop_orders {
            self.position.current_stop = trigger;
            return true;
        }
        let symbol = self.position.symbol.clone();

        if let Some(id) = self.position.stop_order_id.take() {
            if let Err(e) = self.ctx.executor.cancel(&symbol, &id).await {
                tracing::warn!(symbol = %symbol, order_id = %id, error = %e, "Stop cancel failed; keeping the live stop");
                self.position.stop_order_id = Some(id);
                self.position.pending_stop = Some(trigger);
                return false;
            }
        }

        let order = OrderRequest::stop_market(
            &symbol,
            self.position.side.exit_order_side(),
            self.position.remaining_size,
            trigger,
        );
        match self.ctx.executor.place_stop(&order).await {
            Ok(id) => {
                self.position.stop_order_id = Some(id);
                self.position.current_stop = trigger;
                self.position.pending_stop = None;
                true
            }
            Err(e) => {
                tracing::warn!(symbol = %symbol, stop = %trigger, error = %e, "Stop placement failed; will retry next cycle");
                self.position.pending_stop = Some(trigger);
                false
            }
        }
    }

    fn snap(&self, price: Decimal) -> Decimal {
        self.ctx.precision.round_price(&self.position.symbol, price)
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is not an error.
        let _ = self.ctx.events.send(event);
    }
}
