use crate::streamer_core::balance_extractor::{TokenBalanceEntry, TransactionEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token account index the mint is read from. Index 0 is the actor.
pub const TRADED_TOKEN_ACCOUNT_INDEX: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl From<TradeDirection> for &'static str {
    fn from(dir: TradeDirection) -> &'static str {
        match dir {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    MissingField(&'static str),
    InvalidAccountKey(usize),
    UnresolvedMint {
        signature: String,
        direction: TradeDirection,
    },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::MissingField(field) => write!(f, "Missing field: {}", field),
            DecodeError::InvalidAccountKey(len) => {
                write!(f, "Invalid account key: expected 32 bytes, got {}", len)
            }
            DecodeError::UnresolvedMint {
                signature,
                direction,
            } => write!(
                f,
                "No token balance at account index {} for {} {}",
                TRADED_TOKEN_ACCOUNT_INDEX, direction, signature
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decoded, classified view of one watched transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub direction: TradeDirection,
    pub actor_address: String,
    pub token_mint_address: String,
    pub sol_amount: f64,
    pub signature: String,
    pub observed_latency_ms: i64,
    pub event_timestamp: DateTime<Utc>,
}

impl TradeSignal {
    pub fn is_buy(&self) -> bool {
        self.direction == TradeDirection::Buy
    }
}

pub fn find_token_mint(balances: &[TokenBalanceEntry]) -> Option<String> {
    balances
        .iter()
        .find(|b| b.account_index == TRADED_TOKEN_ACCOUNT_INDEX)
        .map(|b| b.mint.clone())
}

/// Classify by the actor's SOL flow: SOL in means the actor sold a token,
/// anything else (including a fee-only decrease) is treated as a buy.
pub fn determine_trade_direction(sol_balance_change: f64) -> TradeDirection {
    if sol_balance_change > 0.0 {
        TradeDirection::Sell
    } else {
        TradeDirection::Buy
    }
}

/// Turn one transaction event into a trade signal.
///
/// A sell reads the mint from the pre-trade token balances (the account may
/// be closed afterwards), a buy from the post-trade balances. The event time
/// falls back to `now` when the update carries no timestamp, which reports a
/// latency of zero.
pub fn classify(event: &TransactionEvent, now: DateTime<Utc>) -> Result<TradeSignal, DecodeError> {
    let sol_balance_change = event.actor_sol_change()?;
    let direction = determine_trade_direction(sol_balance_change);

    let actor_address = event
        .account_keys
        .first()
        .cloned()
        .ok_or(DecodeError::MissingField("account_keys[0]"))?;

    let mint = match direction {
        TradeDirection::Sell => find_token_mint(&event.pre_token_balances),
        TradeDirection::Buy => find_token_mint(&event.post_token_balances),
    };
    let token_mint_address = mint.ok_or_else(|| DecodeError::UnresolvedMint {
        signature: event.signature.clone(),
        direction,
    })?;

    let event_timestamp = event.timestamp.unwrap_or(now);
    let observed_latency_ms = (now - event_timestamp).num_milliseconds();

    Ok(TradeSignal {
        direction,
        actor_address,
        token_mint_address,
        sol_amount: sol_balance_change.abs(),
        signature: event.signature.clone(),
        observed_latency_ms,
        event_timestamp,
    })
}
