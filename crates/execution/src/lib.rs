// In crates/execution/src/lib.rs

use async_trait::async_trait;
pub mod error;
pub mod simulated;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use simulated::SimulatedExchange;
pub use types::{OrderRequest, OrderResult, SimulationSettings, ZeroQuantityPolicy};

/// The universal interface for order execution.
///
/// An `Exchange` takes an `OrderRequest` and reports how it was filled. It
/// could be a brokerage connection or a simulation policy that only models
/// commission and slippage.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// The name of the exchange (e.g., "SimulatedExchange").
    fn name(&self) -> &'static str;

    async fn buy(&self, order: &OrderRequest) -> Result<OrderResult>;

    async fn sell(&self, order: &OrderRequest) -> Result<OrderResult>;
}

#[async_trait]
impl<E: Exchange + ?Sized> Exchange for std::sync::Arc<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn buy(&self, order: &OrderRequest) -> Result<OrderResult> {
        (**self).buy(order).await
    }

    async fn sell(&self, order: &OrderRequest) -> Result<OrderResult> {
        (**self).sell(order).await
    }
}
