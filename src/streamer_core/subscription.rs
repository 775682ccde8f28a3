//! Subscription filter construction
//!
//! Maps a watched-address snapshot into the Yellowstone `SubscribeRequest`
//! sent on the channel. The include list always mirrors the snapshot it was
//! built from; previous include lists are replaced, never merged.

use std::collections::{BTreeSet, HashMap};
use yellowstone_grpc_proto::geyser::{
    CommitmentLevel, SubscribeRequest, SubscribeRequestFilterTransactions, SubscribeRequestPing,
};

/// Key of the single transaction filter in the subscribe request
pub const WATCHLIST_FILTER_NAME: &str = "watchlist";

/// Id carried by every keepalive ping
pub const HEARTBEAT_PING_ID: i32 = 1;

#[derive(Debug)]
pub enum FilterError {
    EmptyRequiredProgram,
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::EmptyRequiredProgram => {
                write!(f, "Subscription filter requires a non-empty program address")
            }
        }
    }
}

impl std::error::Error for FilterError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilter {
    required_program: String,
    include: Vec<String>,
    exclude: Vec<String>,
    commitment: CommitmentLevel,
}

impl SubscriptionFilter {
    /// Build a filter for `addresses`.
    ///
    /// Duplicates are collapsed and the include list is sorted so that two
    /// snapshots with the same members produce equal filters.
    pub fn new<I, S>(
        required_program: &str,
        addresses: I,
        commitment: CommitmentLevel,
    ) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let required_program = required_program.trim();
        if required_program.is_empty() {
            return Err(FilterError::EmptyRequiredProgram);
        }

        let include: BTreeSet<String> = addresses
            .into_iter()
            .map(|address| -> String { address.into() })
            .filter(|address| !address.is_empty())
            .collect();

        Ok(Self {
            required_program: required_program.to_string(),
            include: include.into_iter().collect(),
            exclude: Vec::new(),
            commitment,
        })
    }

    pub fn required_program(&self) -> &str {
        &self.required_program
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn commitment(&self) -> CommitmentLevel {
        self.commitment
    }

    pub fn to_request(&self) -> SubscribeRequest {
        let transaction_filter = SubscribeRequestFilterTransactions {
            vote: None,
            failed: Some(false),
            account_include: self.include.clone(),
            account_exclude: self.exclude.clone(),
            account_required: vec![self.required_program.clone()],
            signature: None,
        };

        let mut transactions = HashMap::new();
        transactions.insert(WATCHLIST_FILTER_NAME.to_string(), transaction_filter);

        SubscribeRequest {
            transactions,
            commitment: Some(self.commitment as i32),
            ..Default::default()
        }
    }
}

/// Keepalive frame: a ping with no filter payload
pub fn ping_request(id: i32) -> SubscribeRequest {
    SubscribeRequest {
        ping: Some(SubscribeRequestPing { id }),
        ..Default::default()
    }
}

pub fn is_ping_request(request: &SubscribeRequest) -> bool {
    request.ping.is_some() && request.transactions.is_empty()
}
