use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Buy request handed to the execution side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub token_mint_address: String,
    pub sol_amount: f64,
    pub slippage_bps: u16,
    pub created_at_ms: i64,
    pub priority_fee_lamports: Option<u64>,
}

#[derive(Debug)]
pub enum DispatchError {
    Rejected(String),
    Execution(String),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Rejected(msg) => write!(f, "Buy rejected: {}", msg),
            DispatchError::Execution(msg) => write!(f, "Buy execution failed: {}", msg),
        }
    }
}

impl std::error::Error for DispatchError {}

#[async_trait]
pub trait SignalDispatcher: Send + Sync {
    async fn execute_buy(&self, order: BuyOrder) -> Result<(), DispatchError>;
}

/// Dispatcher that records the buy it would place without submitting anything
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher;

#[async_trait]
impl SignalDispatcher for LogDispatcher {
    async fn execute_buy(&self, order: BuyOrder) -> Result<(), DispatchError> {
        if order.token_mint_address.is_empty() {
            return Err(DispatchError::Rejected("empty mint".to_string()));
        }

        log::info!(
            "🛒 Buy intent: mint={} sol={:.6} slippage={}bps priority_fee={} created_at={}",
            order.token_mint_address,
            order.sol_amount,
            order.slippage_bps,
            order
                .priority_fee_lamports
                .map(|fee| fee.to_string())
                .unwrap_or_else(|| "none".to_string()),
            order.created_at_ms
        );
        Ok(())
    }
}
