use std::env;
use std::str::FromStr;
use std::time::Duration;

use solana_pubkey::Pubkey;
use yellowstone_grpc_proto::geyser::CommitmentLevel;

/// pump.fun bonding curve program
pub const PUMP_FUN_PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

pub const MAX_DECODING_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// What the session does after the server ends the stream cleanly.
///
/// Errors always reconnect. `ErrorOnly` parks the session in Closed on a
/// clean end until the next watchlist change or explicit setup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Always,
    ErrorOnly,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub geyser_url: String,
    pub x_token: Option<String>,
    pub commitment_level: CommitmentLevel,
    pub target_program_id: String,
    pub rust_log: String,
    pub watchlist_path: String,
    pub watchlist_reload_secs: u64,
    pub heartbeat_interval_ms: u64,
    pub reconnect_policy: ReconnectPolicy,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub buy_sol_amount: f64,
    pub slippage_bps: u16,
    pub priority_fee_lamports: Option<u64>,
    pub signal_log_path: Option<String>,
    pub output_max_size_mb: u64,
    pub output_max_rotations: u32,
}

/// Knobs the session manager needs, split out of `RuntimeConfig` so tests can
/// build a session without touching the environment.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub target_program_id: String,
    pub commitment_level: CommitmentLevel,
    pub heartbeat_interval: Duration,
    pub reconnect_policy: ReconnectPolicy,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub buy_sol_amount: f64,
    pub slippage_bps: u16,
    pub priority_fee_lamports: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            target_program_id: PUMP_FUN_PROGRAM_ID.to_string(),
            commitment_level: CommitmentLevel::Processed,
            heartbeat_interval: Duration::from_millis(5_000),
            reconnect_policy: ReconnectPolicy::Always,
            reconnect_initial_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            buy_sol_amount: 0.00001,
            slippage_bps: 1_000,
            priority_fee_lamports: None,
        }
    }
}

impl From<&RuntimeConfig> for SessionSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            target_program_id: config.target_program_id.clone(),
            commitment_level: config.commitment_level,
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            reconnect_policy: config.reconnect_policy,
            reconnect_initial_delay_ms: config.reconnect_initial_delay_ms,
            reconnect_max_delay_ms: config.reconnect_max_delay_ms,
            buy_sol_amount: config.buy_sol_amount,
            slippage_bps: config.slippage_bps,
            priority_fee_lamports: config.priority_fee_lamports,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn parse_commitment(value: &str) -> Option<CommitmentLevel> {
    match value.to_lowercase().as_str() {
        "processed" => Some(CommitmentLevel::Processed),
        "confirmed" => Some(CommitmentLevel::Confirmed),
        "finalized" => Some(CommitmentLevel::Finalized),
        _ => None,
    }
}

fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            log::warn!("Invalid {} '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let geyser_url = env::var("GEYSER_URL")
            .map_err(|_| ConfigError::MissingVariable("GEYSER_URL".to_string()))?;

        if !geyser_url.starts_with("http://") && !geyser_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "GEYSER_URL must start with http:// or https://".to_string(),
            ));
        }

        let x_token = env::var("X_TOKEN").ok().filter(|t| !t.is_empty());

        let commitment_str =
            env::var("COMMITMENT_LEVEL").unwrap_or_else(|_| "processed".to_string());
        let commitment_level = parse_commitment(&commitment_str).unwrap_or_else(|| {
            log::warn!(
                "Invalid COMMITMENT_LEVEL '{}', defaulting to Processed",
                commitment_str
            );
            CommitmentLevel::Processed
        });

        let target_program_id =
            env::var("TARGET_PROGRAM_ID").unwrap_or_else(|_| PUMP_FUN_PROGRAM_ID.to_string());
        validate_program_id(&target_program_id)?;

        let reconnect_policy = if parse_or("RECONNECT_ON_END", true) {
            ReconnectPolicy::Always
        } else {
            ReconnectPolicy::ErrorOnly
        };

        let heartbeat_interval_ms = parse_or("HEARTBEAT_INTERVAL_MS", 5_000u64);
        if heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "HEARTBEAT_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        let buy_sol_amount = parse_or("BUY_SOL_AMOUNT", 0.00001f64);
        if !buy_sol_amount.is_finite() || buy_sol_amount <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "BUY_SOL_AMOUNT must be a positive number".to_string(),
            ));
        }

        let priority_fee_lamports = env::var("PRIORITY_FEE_LAMPORTS")
            .ok()
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|_| {
                    ConfigError::InvalidValue(format!("PRIORITY_FEE_LAMPORTS '{}'", raw))
                })
            })
            .transpose()?;

        Ok(Self {
            geyser_url,
            x_token,
            commitment_level,
            target_program_id,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            watchlist_path: env::var("WATCHLIST_PATH")
                .unwrap_or_else(|_| "smart_wallets.json".to_string()),
            watchlist_reload_secs: parse_or("WATCHLIST_RELOAD_SECS", 5u64),
            heartbeat_interval_ms,
            reconnect_policy,
            reconnect_initial_delay_ms: parse_or("RECONNECT_INITIAL_DELAY_MS", 500u64),
            reconnect_max_delay_ms: parse_or("RECONNECT_MAX_DELAY_MS", 30_000u64),
            buy_sol_amount,
            slippage_bps: parse_or("SLIPPAGE_BPS", 1_000u16),
            priority_fee_lamports,
            signal_log_path: env::var("SIGNAL_LOG_PATH").ok().filter(|p| !p.is_empty()),
            output_max_size_mb: parse_or("OUTPUT_MAX_SIZE_MB", 100u64),
            output_max_rotations: parse_or("OUTPUT_MAX_ROTATIONS", 10u32),
        })
    }
}

pub fn validate_program_id(program_id: &str) -> Result<(), ConfigError> {
    if program_id.trim().is_empty() {
        return Err(ConfigError::InvalidValue(
            "TARGET_PROGRAM_ID cannot be empty".to_string(),
        ));
    }

    Pubkey::from_str(program_id).map_err(|_| {
        ConfigError::InvalidValue(format!(
            "TARGET_PROGRAM_ID must be a base58 pubkey, got '{}'",
            program_id
        ))
    })?;

    Ok(())
}
