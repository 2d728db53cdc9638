use crate::error::EngineError;
use api_client::{ApiClient, RetryPolicy, with_retry};
use core_types::{ExchangePosition, to_exchange_id};
use executor::PositionRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// The "Source of Truth Auditor" for the live engine.
///
/// Compares the registry against the positions the exchange reports. The
/// exchange wins: a tracked position the exchange shows flat was closed
/// there (usually by the resting stop) and is closed locally without an order.
pub struct StateReconciler {
    api_client: Arc<dyn ApiClient>,
    retry: RetryPolicy,
    enabled: bool,
}

impl StateReconciler {
    /// `enabled` is false in dry-run and spot modes, where the exchange
    /// holds no position record to compare against.
    pub fn new(api_client: Arc<dyn ApiClient>, retry: RetryPolicy, enabled: bool) -> Self {
        Self { api_client, retry, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fetches the exchange's positions and applies them to the registry.
    /// Returns the symbols that were closed locally.
    pub async fn run(&self, registry: &mut PositionRegistry) -> Result<Vec<String>, EngineError> {
        if !self.enabled || registry.is_empty() {
            return Ok(Vec::new());
        }
        let live = with_retry(&self.retry, "get_open_positions", || {
            self.api_client.get_open_positions()
        })
        .await?;
        Ok(apply(registry, &live))
    }
}

/// Marks every active tracked position that is flat or absent on the
/// exchange as closed. Exchange positions the engine does not track are
/// reported and left alone.
pub fn apply(registry: &mut PositionRegistry, live: &[ExchangePosition]) -> Vec<String> {
    let live_by_id: HashMap<String, &ExchangePosition> = live
        .iter()
        .filter(|p| !p.is_flat())
        .map(|p| (to_exchange_id(&p.symbol), p))
        .collect();

    let mut closed = Vec::new();
    for id in registry.ids() {
        let Some(lifecycle) = registry.get_mut(&id) else { continue };
        if !lifecycle.is_active() {
            continue;
        }
        match live_by_id.get(&id) {
            Some(live_pos) => {
                let position = lifecycle.position();
                if live_pos.signed_size.abs() != position.remaining_size {
                    tracing::warn!(
                        symbol = %position.symbol,
                        local = %position.remaining_size,
                        exchange = %live_pos.signed_size,
                        "Size discrepancy between registry and exchange"
                    );
                }
            }
            None => {
                if lifecycle.mark_closed_externally() {
                    tracing::warn!(symbol = %lifecycle.symbol(), "Exchange reports flat; position closed locally");
                    closed.push(lifecycle.symbol().to_string());
                }
            }
        }
    }

    for (id, live_pos) in &live_by_id {
        if !registry.contains(id) {
            tracing::warn!(symbol = %id, size = %live_pos.signed_size, "Untracked exchange position");
        }
    }
    closed
}
