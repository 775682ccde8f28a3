use crate::streamer_core::trade_detector::DecodeError;
use chrono::{DateTime, Utc};
use solana_pubkey::Pubkey;
use yellowstone_grpc_proto::prelude::{SubscribeUpdateTransaction, TokenBalance};

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalanceEntry {
    pub account_index: u32,
    pub mint: String,
}

impl From<&TokenBalance> for TokenBalanceEntry {
    fn from(balance: &TokenBalance) -> Self {
        Self {
            account_index: balance.account_index,
            mint: balance.mint.clone(),
        }
    }
}

/// Fields of one transaction update that the classifier reads
#[derive(Debug, Clone)]
pub struct TransactionEvent {
    pub signature: String,
    pub slot: u64,
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalanceEntry>,
    pub post_token_balances: Vec<TokenBalanceEntry>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransactionEvent {
    pub fn from_update(
        update: &SubscribeUpdateTransaction,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Self, DecodeError> {
        let info = update
            .transaction
            .as_ref()
            .ok_or(DecodeError::MissingField("transaction"))?;
        let meta = info.meta.as_ref().ok_or(DecodeError::MissingField("meta"))?;
        let message = info
            .transaction
            .as_ref()
            .and_then(|tx| tx.message.as_ref())
            .ok_or(DecodeError::MissingField("message"))?;

        let signature_bytes = if info.signature.is_empty() {
            info.transaction
                .as_ref()
                .and_then(|tx| tx.signatures.first())
                .map(|s| s.as_slice())
                .unwrap_or_default()
        } else {
            info.signature.as_slice()
        };
        if signature_bytes.is_empty() {
            return Err(DecodeError::MissingField("signature"));
        }

        let account_keys = build_full_account_keys(
            &message.account_keys,
            &meta.loaded_writable_addresses,
            &meta.loaded_readonly_addresses,
        )?;

        Ok(Self {
            signature: bs58::encode(signature_bytes).into_string(),
            slot: update.slot,
            account_keys,
            pre_balances: meta.pre_balances.clone(),
            post_balances: meta.post_balances.clone(),
            pre_token_balances: meta.pre_token_balances.iter().map(Into::into).collect(),
            post_token_balances: meta.post_token_balances.iter().map(Into::into).collect(),
            timestamp: created_at,
        })
    }

    /// SOL change of the fee payer (account index 0), in SOL
    pub fn actor_sol_change(&self) -> Result<f64, DecodeError> {
        let pre = *self
            .pre_balances
            .first()
            .ok_or(DecodeError::MissingField("pre_balances[0]"))?;
        let post = *self
            .post_balances
            .first()
            .ok_or(DecodeError::MissingField("post_balances[0]"))?;

        let raw_change = (post as i128) - (pre as i128);
        Ok(raw_change as f64 / LAMPORTS_PER_SOL)
    }
}

/// Static keys followed by address-lookup-table keys (writable, then
/// readonly), which is the order token balance `account_index` refers to.
pub fn build_full_account_keys(
    static_keys: &[Vec<u8>],
    loaded_writable: &[Vec<u8>],
    loaded_readonly: &[Vec<u8>],
) -> Result<Vec<String>, DecodeError> {
    static_keys
        .iter()
        .chain(loaded_writable.iter())
        .chain(loaded_readonly.iter())
        .map(|bytes| {
            Pubkey::try_from(bytes.as_slice())
                .map(|pk| pk.to_string())
                .map_err(|_| DecodeError::InvalidAccountKey(bytes.len()))
        })
        .collect()
}

/// Convert a protobuf timestamp (seconds + nanos) into a UTC instant
pub fn timestamp_from_parts(seconds: i64, nanos: i32) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(nanos).ok()?;
    DateTime::<Utc>::from_timestamp(seconds, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yellowstone_grpc_proto::prelude::{
        Message, SubscribeUpdateTransactionInfo, Transaction, TransactionStatusMeta,
    };

    fn key(byte: u8) -> Vec<u8> {
        vec![byte; 32]
    }

    fn update_with(meta: TransactionStatusMeta, keys: Vec<Vec<u8>>) -> SubscribeUpdateTransaction {
        SubscribeUpdateTransaction {
            transaction: Some(SubscribeUpdateTransactionInfo {
                signature: vec![7u8; 64],
                transaction: Some(Transaction {
                    message: Some(Message {
                        account_keys: keys,
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                meta: Some(meta),
                ..Default::default()
            }),
            slot: 42,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_update_reads_balances_and_keys() {
        let meta = TransactionStatusMeta {
            pre_balances: vec![1_000_000_000, 5],
            post_balances: vec![990_000_000, 5],
            loaded_writable_addresses: vec![key(9)],
            ..Default::default()
        };
        let update = update_with(meta, vec![key(1), key(2)]);

        let event = TransactionEvent::from_update(&update, None).unwrap();

        assert_eq!(event.slot, 42);
        assert_eq!(event.account_keys.len(), 3);
        assert_eq!(event.account_keys[0], Pubkey::from([1u8; 32]).to_string());
        assert_eq!(event.account_keys[2], Pubkey::from([9u8; 32]).to_string());
        assert_eq!(event.signature, bs58::encode(vec![7u8; 64]).into_string());
        assert!((event.actor_sol_change().unwrap() - (-0.01)).abs() < 1e-12);
    }

    #[test]
    fn test_missing_meta_is_an_error() {
        let mut update = update_with(TransactionStatusMeta::default(), vec![key(1)]);
        if let Some(info) = update.transaction.as_mut() {
            info.meta = None;
        }

        let result = TransactionEvent::from_update(&update, None);
        assert!(matches!(result, Err(DecodeError::MissingField("meta"))));
    }

    #[test]
    fn test_short_account_key_is_rejected() {
        let update = update_with(TransactionStatusMeta::default(), vec![vec![1u8; 31]]);

        let result = TransactionEvent::from_update(&update, None);
        assert!(matches!(result, Err(DecodeError::InvalidAccountKey(31))));
    }

    #[test]
    fn test_empty_balances_report_missing_field() {
        let update = update_with(TransactionStatusMeta::default(), vec![key(1)]);
        let event = TransactionEvent::from_update(&update, None).unwrap();

        assert!(matches!(
            event.actor_sol_change(),
            Err(DecodeError::MissingField("pre_balances[0]"))
        ));
    }

    #[test]
    fn test_timestamp_from_parts() {
        let ts = timestamp_from_parts(1_700_000_000, 500_000_000).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_500);
        assert!(timestamp_from_parts(0, -1).is_none());
    }
}
