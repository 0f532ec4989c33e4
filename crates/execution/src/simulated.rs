// In crates/execution/src/simulated.rs

use crate::types::{OrderRequest, OrderResult, SimulationSettings};
use crate::{Error, Exchange, Result};
use async_trait::async_trait;

/// An exchange that fills every order immediately at the reference price,
/// adjusted by the configured slippage, and charges a flat commission.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExchange {
    settings: SimulationSettings,
}

impl SimulatedExchange {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    fn fill(&self, order: &OrderRequest, slippage_sign: f64) -> Result<OrderResult> {
        if !order.price.is_finite() || order.price <= 0.0 {
            return Err(Error::Rejected {
                instrument_id: order.instrument_id.clone(),
                reason: format!("invalid reference price {}", order.price),
            });
        }

        // --- 1. Calculate Execution Price with Slippage ---
        let execution_price = order.price * (1.0 + slippage_sign * self.settings.slippage_percent);

        // --- 2. Calculate Costs ---
        let notional = order.quantity as f64 * execution_price;
        let commission = notional * self.settings.commission_percent;

        Ok(OrderResult {
            quantity: order.quantity,
            notional,
            commission,
            time: order.time,
        })
    }
}

#[async_trait]
impl Exchange for SimulatedExchange {
    fn name(&self) -> &'static str {
        "SimulatedExchange"
    }

    async fn buy(&self, order: &OrderRequest) -> Result<OrderResult> {
        // Buying pushes the price up.
        let result = self.fill(order, 1.0)?;
        tracing::debug!(
            instrument = %order.instrument_id,
            quantity = result.quantity,
            notional = result.notional,
            commission = result.commission,
            "Simulated BUY filled."
        );
        Ok(result)
    }

    async fn sell(&self, order: &OrderRequest) -> Result<OrderResult> {
        let result = self.fill(order, -1.0)?;
        tracing::debug!(
            instrument = %order.instrument_id,
            quantity = result.quantity,
            notional = result.notional,
            commission = result.commission,
            "Simulated SELL filled."
        );
        Ok(result)
    }
}
