//! Wallet addresses, transaction hashes and deposit networks.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::Config;
use crate::errors::{ApiError, Result};

static TRC20_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^T[A-Za-z1-9]{33}$").unwrap_or_else(|e| panic!("invalid TRC20 pattern: {e}"))
});

static ETH_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap_or_else(|e| panic!("invalid address pattern: {e}"))
});

static TX_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0x)?[0-9a-fA-F]{64}$").unwrap_or_else(|e| panic!("invalid hash pattern: {e}"))
});

/// USDT token contract on TRON.
pub const USDT_TRC20_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

/// USDT token contract on Ethereum.
pub const USDT_ERC20_CONTRACT: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";

/// USDT uses 6 decimals on both networks.
pub const USDT_DECIMALS: u32 = 6;

pub fn is_trc20_address(address: &str) -> bool {
    TRC20_ADDRESS.is_match(address)
}

pub fn is_eth_address(address: &str) -> bool {
    ETH_ADDRESS.is_match(address)
}

pub fn is_tx_hash(hash: &str) -> bool {
    TX_HASH.is_match(hash)
}

pub fn require_trc20(address: &str) -> Result<&str> {
    let address = address.trim();
    if is_trc20_address(address) {
        Ok(address)
    } else {
        Err(ApiError::bad_request(
            "Invalid TRC20 address format (must start with T and be 34 characters)",
        ))
    }
}

pub fn require_tx_hash(hash: &str) -> Result<String> {
    let hash = hash.trim();
    if is_tx_hash(hash) {
        Ok(hash.to_ascii_lowercase())
    } else {
        Err(ApiError::bad_request(
            "Invalid transaction hash (expected 64 hex characters, optionally 0x-prefixed)",
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Network {
    #[serde(rename = "TRON")]
    Tron,
    #[serde(rename = "ETHEREUM")]
    Ethereum,
}

impl Network {
    pub fn of_wallet(address: &str) -> Option<Network> {
        if is_trc20_address(address) {
            Some(Network::Tron)
        } else if is_eth_address(address) {
            Some(Network::Ethereum)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tron => "TRON",
            Self::Ethereum => "ETHEREUM",
        }
    }

    pub fn token_standard(self) -> &'static str {
        match self {
            Self::Tron => "TRC20",
            Self::Ethereum => "ERC20",
        }
    }

    pub fn usdt_contract(self) -> &'static str {
        match self {
            Self::Tron => USDT_TRC20_CONTRACT,
            Self::Ethereum => USDT_ERC20_CONTRACT,
        }
    }

    fn accepts(self, address: &str) -> bool {
        match self {
            Self::Tron => is_trc20_address(address),
            Self::Ethereum => is_eth_address(address),
        }
    }
}

/// Where a deposit from `user_wallet` has to be sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositRoute {
    pub network: Network,
    pub admin_wallet: String,
}

pub fn deposit_route(config: &Config, user_wallet: &str) -> Result<DepositRoute> {
    let network = Network::of_wallet(user_wallet.trim()).ok_or_else(|| {
        ApiError::bad_request("Invalid wallet address format. Use TRC20 (T...) or ERC20 (0x...)")
    })?;
    let configured = match network {
        Network::Tron => config.admin_wallet_trc20.as_deref(),
        Network::Ethereum => config.admin_wallet_erc20.as_deref(),
    };
    let admin_wallet = configured.ok_or_else(|| {
        ApiError::Unavailable(format!(
            "{} deposits are not configured",
            network.token_standard()
        ))
    })?;
    if !network.accepts(admin_wallet) {
        return Err(ApiError::Config(format!(
            "Configured {} admin wallet is not a valid address",
            network.token_standard()
        )));
    }
    Ok(DepositRoute {
        network,
        admin_wallet: admin_wallet.to_string(),
    })
}

/// Convert a USDT amount to the token's smallest unit.
pub fn to_smallest_units(amount: f64) -> u64 {
    (amount * 10f64.powi(USDT_DECIMALS as i32)).round().max(0.0) as u64
}

/// Payment instructions returned to the investor.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInstructions {
    pub network: Network,
    pub token: &'static str,
    pub token_contract: &'static str,
    pub to_address: String,
    pub amount: f64,
    pub amount_smallest_unit: String,
    pub decimals: u32,
}

impl PaymentInstructions {
    pub fn new(route: &DepositRoute, amount: f64) -> Self {
        PaymentInstructions {
            network: route.network,
            token: route.network.token_standard(),
            token_contract: route.network.usdt_contract(),
            to_address: route.admin_wallet.clone(),
            amount,
            amount_smallest_unit: to_smallest_units(amount).to_string(),
            decimals: USDT_DECIMALS,
        }
    }
}
