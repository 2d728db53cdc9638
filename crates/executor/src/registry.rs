use crate::error::ExecutorError;
use crate::lifecycle::{Position, PositionLifecycle};
use core_types::to_exchange_id;
use risk::RiskExposure;
use std::collections::HashMap;

/// Open positions keyed by exchange id. Holds at most one per symbol.
#[derive(Default)]
pub struct PositionRegistry {
    positions: HashMap<String, PositionLifecycle>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// True if an active position exists for the symbol, in either notation.
    pub fn contains(&self, symbol: &str) -> bool {
        self.positions
            .get(&to_exchange_id(symbol))
            .is_some_and(PositionLifecycle::is_active)
    }

    pub fn insert(&mut self, lifecycle: PositionLifecycle) -> Result<(), ExecutorError> {
        let id = to_exchange_id(lifecycle.symbol());
        if self.positions.get(&id).is_some_and(PositionLifecycle::is_active) {
            return Err(ExecutorError::DuplicatePosition(lifecycle.symbol().to_string()));
        }
        self.positions.insert(id, lifecycle);
        Ok(())
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut PositionLifecycle> {
        self.positions.get_mut(&to_exchange_id(symbol))
    }

    /// Exchange ids of every tracked position.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.positions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionLifecycle> {
        self.positions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PositionLifecycle> {
        self.positions.values_mut()
    }

    /// What the active positions still put at risk, for the aggregate budget.
    pub fn exposures(&self) -> Vec<RiskExposure> {
        self.positions
            .values()
            .filter(|lc| lc.is_active())
            .map(|lc| lc.position().exposure())
            .collect()
    }

    /// Drops closed positions and returns their final state.
    pub fn prune_closed(&mut self) -> Vec<Position> {
        let closed: Vec<String> = self
            .positions
            .iter()
            .filter(|(_, lc)| !lc.is_active())
            .map(|(id, _)| id.clone())
            .collect();
        closed
            .into_iter()
            .filter_map(|id| self.positions.remove(&id))
            .map(|lc| lc.position().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperExecutor;
    use crate::lifecycle::{EntryPlan, LifecycleContext};
    use chrono::Utc;
    use configuration::{ExitConfig, TradingMode};
    use core_types::{Side, SignalTier, StrategyKind};
    use risk::PrecisionAdapter;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    async fn open(symbol: &str) -> PositionLifecycle {
        let (events, _) = broadcast::channel(16);
        let ctx = LifecycleContext {
            executor: Arc::new(PaperExecutor::new()),
            precision: Arc::new(PrecisionAdapter::new(TradingMode::Futures)),
            events,
            exit: ExitConfig::default(),
            hard_stop_orders: false,
        };
        let plan = EntryPlan {
            symbol: symbol.to_string(),
            side: Side::Long,
            tier: SignalTier::B,
            strategy: StrategyKind::Reversal2B,
            quantity: dec!(0.1),
            reference_price: dec!(100),
            stop_price: dec!(95),
            opened_at: Utc::now(),
        };
        PositionLifecycle::enter(plan, ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_one_position_per_symbol() {
        let mut registry = PositionRegistry::new();
        registry.insert(open("BTC/USDT").await).unwrap();
        assert!(registry.contains("BTCUSDT"));
        assert!(matches!(
            registry.insert(open("BTCUSDT").await),
            Err(ExecutorError::DuplicatePosition(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_slot_can_be_reused_and_pruned() {
        let mut registry = PositionRegistry::new();
        registry.insert(open("ETH/USDT").await).unwrap();
        registry.insert(open("SOL/USDT").await).unwrap();
        assert_eq!(registry.exposures().len(), 2);

        registry.get_mut("ETH/USDT").unwrap().mark_closed_externally();
        assert!(!registry.contains("ETH/USDT"));
        assert_eq!(registry.exposures().len(), 1);

        let pruned = registry.prune_closed();
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].symbol, "ETH/USDT");
        assert_eq!(registry.ids(), vec!["SOLUSDT".to_string()]);

        registry.insert(open("ETH/USDT").await).unwrap();
        assert_eq!(registry.len(), 2);
    }
}
