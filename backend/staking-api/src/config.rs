//! Application configuration loaded from environment variables.

use crate::errors::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Shared secret expected in the `x-admin-key` header
    pub admin_api_key: String,
    /// Deposit wallet for TRON (TRC-20 USDT) payments
    pub admin_wallet_trc20: Option<String>,
    /// Deposit wallet for Ethereum (ERC-20 USDT) payments
    pub admin_wallet_erc20: Option<String>,
    /// How often (in seconds) the sweeper refreshes due investments
    pub sweep_interval_secs: u64,
    /// Lifetime of a freshly issued session token
    pub session_ttl_hours: i64,
    /// Optional webhook receiving withdrawal / confirmation notifications
    pub notify_webhook_url: Option<String>,
    /// Enables the per-investment simulated clock endpoint
    pub allow_simulation: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the process
    /// environment in production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| -> Result<String> {
            lookup(key).ok_or_else(|| ApiError::Config(format!("Missing env var: {key}")))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./staking.db".to_string()),
            api_port: var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid API_PORT".to_string()))?,
            admin_api_key: var("ADMIN_API_KEY").map_err(|_| {
                ApiError::Config("ADMIN_API_KEY environment variable is required".to_string())
            })?,
            admin_wallet_trc20: optional("ADMIN_WALLET_TRC20"),
            admin_wallet_erc20: optional("ADMIN_WALLET_ERC20"),
            sweep_interval_secs: var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid SWEEP_INTERVAL_SECS".to_string()))?,
            session_ttl_hours: var("SESSION_TTL_HOURS")
                .unwrap_or_else(|_| "720".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid SESSION_TTL_HOURS".to_string()))?,
            notify_webhook_url: optional("NOTIFY_WEBHOOK_URL"),
            allow_simulation: parse_flag(
                &var("ALLOW_SIMULATION").unwrap_or_else(|_| "false".to_string()),
            )
            .ok_or_else(|| ApiError::Config("Invalid ALLOW_SIMULATION".to_string()))?,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
