//! Token registry backed by the `[[tokens]]` and `[admin]` configuration

use crate::common::traits::{TokenRegistry, TokenSettings};
use crate::common::types::{Address, Asset};
use crate::config::{AdminConfig, TokenEntry};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct StaticTokenRegistry {
    tokens: BTreeMap<Asset, TokenSettings>,
    treasury: Address,
    team: Address,
}

impl StaticTokenRegistry {
    pub fn new(treasury: Address, team: Address) -> Self {
        Self {
            tokens: BTreeMap::new(),
            treasury,
            team,
        }
    }

    pub fn from_config(tokens: &[TokenEntry], admin: &AdminConfig) -> Self {
        tokens.iter().fold(Self::new(admin.treasury, admin.team), |registry, entry| {
            registry.with_token(
                entry.asset,
                TokenSettings {
                    vrf_subscription_id: entry.vrf_subscription_id,
                    split: entry.split,
                },
            )
        })
    }

    pub fn with_token(mut self, asset: Asset, settings: TokenSettings) -> Self {
        self.tokens.insert(asset, settings);
        self
    }
}

impl TokenRegistry for StaticTokenRegistry {
    fn token_settings(&self, asset: &Asset) -> Option<TokenSettings> {
        self.tokens.get(asset).copied()
    }

    fn treasury_and_team(&self) -> (Address, Address) {
        (self.treasury, self.team)
    }

    fn list_assets(&self) -> Vec<Asset> {
        self.tokens.keys().copied().collect()
    }
}
