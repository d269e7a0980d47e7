use std::time::Duration;

use crate::error::{AppError, Result};

pub const NFTPORT_API_URL: &str = "https://api.nftport.xyz/v0";
pub const ALCHEMY_NFT_API_URL: &str = "https://eth-mainnet.alchemyapi.io/nft/v2";
pub const ALCHEMY_RPC_URL: &str = "https://eth-mainnet.alchemyapi.io/v2";
pub const MORALIS_API_URL: &str = "https://deep-index.moralis.io/api/v2";

/// Per-request timeout (seconds). Large collections make some listing pages slow.
pub const REQUEST_TIMEOUT_SECS: u64 = 150;

/// Attempts per HTTP call, including the first one.
pub const RETRY_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff (milliseconds): base, 2*base, 4*base, ...
pub const RETRY_BACKOFF_MS: u64 = 500;

/// Upper bound on a single backoff sleep (milliseconds).
pub const RETRY_BACKOFF_MAX_MS: u64 = 60_000;

/// Safety cap on pages per (address, provider) walk.
pub const MAX_PAGES_PER_WALK: u64 = 1_000_000;

/// Number of shards the address list is split into.
pub const SHARD_COUNT: usize = 32;

/// Maximum number of shard workers running at once.
pub const MAX_WORKERS: usize = 32;

/// Delay between worker launches so providers don't see a burst at startup.
pub const WORKER_STAGGER_MS: u64 = 100;

/// Addresses read from the input file, at most.
pub const ADDRESS_LIMIT: usize = 10_000;

/// Transaction pass lookback (days).
pub const TX_LOOKBACK_DAYS: u64 = 30;

/// Channel capacity for completed records headed to the backup writer.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Progress log interval (seconds).
pub const PROGRESS_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// Collection coverage per contract address.
    Contracts,
    /// Ownership coverage per wallet address.
    Wallets,
}

impl CompareMode {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "contracts" | "contract" | "collections" => Ok(CompareMode::Contracts),
            "wallets" | "wallet" | "ownership" => Ok(CompareMode::Wallets),
            other => Err(AppError::Config(format!(
                "COMPARE_MODE must be `contracts` or `wallets`, got `{other}`"
            ))),
        }
    }
}

impl std::fmt::Display for CompareMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareMode::Contracts => write!(f, "contracts"),
            CompareMode::Wallets => write!(f, "wallets"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub nftport_api_key: Option<String>,
    pub nftport_url: String,
    pub alchemy_api_key: Option<String>,
    pub alchemy_nft_url: String,
    pub alchemy_rpc_url: String,
    pub moralis_api_key: Option<String>,
    pub moralis_url: String,
    /// QuickNode endpoints carry their token in the URL itself.
    pub quicknode_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: CompareMode,
    pub log_level: String,
    pub input_path: String,
    pub report_path: String,
    /// Append-only per-address backup (BACKUP_PATH). Truncated at run start.
    pub backup_path: String,
    pub shard_count: usize,
    pub max_workers: usize,
    pub worker_stagger: Duration,
    pub address_limit: usize,
    pub request_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub max_pages: u64,
    /// Run the sale-transaction pass in contract mode (ENABLE_TRANSACTIONS)
    pub enable_transactions: bool,
    pub tx_lookback_days: u64,
    /// Records newer than now - settle are not counted yet (TX_SETTLE_SECS)
    pub tx_settle_secs: u64,
    pub providers: ProviderCredentials,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let shard_count = parse_env("SHARD_COUNT", SHARD_COUNT)?;
        if shard_count == 0 {
            return Err(AppError::Config("SHARD_COUNT must be at least 1".to_string()));
        }
        let max_workers = parse_env("MAX_WORKERS", MAX_WORKERS)?;
        if max_workers == 0 {
            return Err(AppError::Config("MAX_WORKERS must be at least 1".to_string()));
        }
        let retry_attempts = parse_env("RETRY_ATTEMPTS", RETRY_ATTEMPTS)?.max(1);

        Ok(Self {
            mode: CompareMode::parse(
                &std::env::var("COMPARE_MODE").unwrap_or_else(|_| "contracts".to_string()),
            )?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            input_path: std::env::var("INPUT_PATH")
                .unwrap_or_else(|_| "top_collections.csv".to_string()),
            report_path: std::env::var("REPORT_PATH").unwrap_or_else(|_| "stats.md".to_string()),
            backup_path: std::env::var("BACKUP_PATH")
                .unwrap_or_else(|_| "stats_backup.txt".to_string()),
            shard_count,
            max_workers,
            worker_stagger: Duration::from_millis(parse_env("WORKER_STAGGER_MS", WORKER_STAGGER_MS)?),
            address_limit: parse_env("ADDRESS_LIMIT", ADDRESS_LIMIT)?,
            request_timeout: Duration::from_secs(parse_env(
                "REQUEST_TIMEOUT_SECS",
                REQUEST_TIMEOUT_SECS,
            )?),
            retry_attempts,
            retry_backoff: Duration::from_millis(parse_env("RETRY_BACKOFF_MS", RETRY_BACKOFF_MS)?),
            max_pages: parse_env("MAX_PAGES", MAX_PAGES_PER_WALK)?.max(1),
            enable_transactions: parse_bool_env("ENABLE_TRANSACTIONS", true),
            tx_lookback_days: parse_env("TX_LOOKBACK_DAYS", TX_LOOKBACK_DAYS)?,
            tx_settle_secs: parse_env("TX_SETTLE_SECS", 0u64)?,
            providers: ProviderCredentials {
                nftport_api_key: non_empty_env("NFTPORT_API_KEY"),
                nftport_url: std::env::var("NFTPORT_URL")
                    .unwrap_or_else(|_| NFTPORT_API_URL.to_string()),
                alchemy_api_key: non_empty_env("ALCHEMY_API_KEY"),
                alchemy_nft_url: std::env::var("ALCHEMY_NFT_URL")
                    .unwrap_or_else(|_| ALCHEMY_NFT_API_URL.to_string()),
                alchemy_rpc_url: std::env::var("ALCHEMY_RPC_URL")
                    .unwrap_or_else(|_| ALCHEMY_RPC_URL.to_string()),
                moralis_api_key: non_empty_env("MORALIS_API_KEY"),
                moralis_url: std::env::var("MORALIS_URL")
                    .unwrap_or_else(|_| MORALIS_API_URL.to_string()),
                quicknode_url: non_empty_env("QUICKNODE_URL"),
            },
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{name} must be a number, got `{raw}`"))),
        _ => Ok(default),
    }
}

fn parse_bool_env(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => !matches!(raw.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"),
        Err(_) => default,
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
