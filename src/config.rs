//! Engine configuration with validation and presets

use crate::common::traits::HouseEdgeSplitRatios;
use crate::common::types::{Address, Asset, BPS_DENOMINATOR};
use crate::randomness::{RandomnessConfig, DEFAULT_REFUND_COOLDOWN_SECS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Full configuration of a wagerpool node
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WagerConfig {
    pub engine: EngineConfig,
    pub randomness: RandomnessConfig,
    pub game: GameConfig,
    pub admin: AdminConfig,
    pub tokens: Vec<TokenEntry>,
    pub storage: StorageConfig,
    pub api: ApiConfig,
}

/// Limits and timings of the bet lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cap on item prizes attached to one bet
    pub max_item_prizes: usize,
    /// Wait between a randomness request and a permitted refund
    pub refund_cooldown_secs: u64,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_item_prizes: 10,
            refund_cooldown_secs: DEFAULT_REFUND_COOLDOWN_SECS,
            event_buffer: 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    CoinToss,
    Raffle,
}

/// Which game the engine runs
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub kind: GameKind,
    pub raffle_max_seats: usize,
    pub raffle_winners: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            kind: GameKind::Raffle,
            raffle_max_seats: 10,
            raffle_winners: 1,
        }
    }
}

/// Roles and fee destinations
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub admins: Vec<Address>,
    pub harvester: Option<Address>,
    pub treasury: Address,
    pub team: Address,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            admins: vec![Address::from_low_u64(0xad)],
            harvester: Some(Address::from_low_u64(0xd1)),
            treasury: Address::from_low_u64(0x7e),
            team: Address::from_low_u64(0x7a),
        }
    }
}

/// One `[[tokens]]` entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub asset: Asset,
    /// Zero keeps the asset registered but disabled for betting
    pub house_edge_bps: u16,
    pub callback_gas: u32,
    pub vrf_subscription_id: u64,
    #[serde(default)]
    pub split: HouseEdgeSplitRatios,
}

impl TokenEntry {
    pub fn native(house_edge_bps: u16) -> Self {
        Self {
            asset: Asset::Native,
            house_edge_bps,
            callback_gas: 250_000,
            vrf_subscription_id: 1,
            split: HouseEdgeSplitRatios {
                treasury: 3000,
                team: 1000,
                initiator: 500,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

/// RocksDB persistence of the ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub compression_type: CompressionType,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            data_directory: "./DB/wagerpool_data".to_string(),
            write_buffer_size_mb: 128,
            compression_type: CompressionType::Lz4,
        }
    }
}

/// HTTP read surface
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// `*` allows any origin; empty blocks cross-origin requests
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Reported by `/health`
    pub node_id: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            node_id: "wagerpool-node".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl WagerConfig {
    /// Local setup: native asset enabled, in-memory ledger, permissive CORS
    pub fn development() -> Self {
        Self {
            tokens: vec![TokenEntry::native(200)],
            ..Default::default()
        }
    }

    /// Persistent setup with a locked-down API
    pub fn production() -> Self {
        Self {
            tokens: vec![TokenEntry::native(200)],
            storage: StorageConfig {
                enabled: true,
                write_buffer_size_mb: 256,
                ..Default::default()
            },
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                allowed_origins: vec![],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.engine.refund_cooldown_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "engine.refund_cooldown_secs must be > 0".to_string(),
            ));
        }
        if self.engine.event_buffer == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "engine.event_buffer must be > 0".to_string(),
            ));
        }

        self.randomness
            .validate()
            .map_err(|e| ConfigValidationError::InvalidValue(e.to_string()))?;

        if self.game.kind == GameKind::Raffle {
            if self.game.raffle_max_seats < 2 {
                return Err(ConfigValidationError::InvalidValue(
                    "game.raffle_max_seats must be >= 2".to_string(),
                ));
            }
            if self.game.raffle_winners == 0 {
                return Err(ConfigValidationError::InvalidValue(
                    "game.raffle_winners must be > 0".to_string(),
                ));
            }
        }

        if self.admin.admins.is_empty() {
            return Err(ConfigValidationError::MissingRequired("admin.admins".to_string()));
        }
        if self.admin.admins.iter().any(Address::is_zero)
            || self.admin.harvester.map_or(false, |h| h.is_zero())
        {
            return Err(ConfigValidationError::InvalidValue(
                "admin roles cannot use the zero address".to_string(),
            ));
        }
        if self.admin.treasury.is_zero() || self.admin.team.is_zero() {
            return Err(ConfigValidationError::MissingRequired(
                "admin.treasury and admin.team".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for token in &self.tokens {
            if !seen.insert(token.asset) {
                return Err(ConfigValidationError::LogicalInconsistency(format!(
                    "asset {} configured twice",
                    token.asset
                )));
            }
            if token.house_edge_bps as u128 > BPS_DENOMINATOR {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "house edge of {} exceeds 10000 bps",
                    token.asset
                )));
            }
            if token.split.total() as u128 > BPS_DENOMINATOR {
                return Err(ConfigValidationError::LogicalInconsistency(format!(
                    "fee split of {} exceeds 10000 bps",
                    token.asset
                )));
            }
            if token.house_edge_bps > 0 && token.callback_gas == 0 {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "callback_gas of {} must be > 0",
                    token.asset
                )));
            }
        }

        if self.api.port == 0 {
            return Err(ConfigValidationError::InvalidValue("api.port cannot be zero".to_string()));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Configuration logical inconsistency: {0}")]
    LogicalInconsistency(String),
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
