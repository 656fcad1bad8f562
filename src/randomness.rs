//! Randomness Coordinator
//!
//! Issues at most one request per bet and keeps the correlation table that
//! routes an oracle response back to the bet it belongs to. Entries are
//! consumed exactly once; a response for an unknown or already consumed
//! handle is not finalizable.

use crate::bets::Bet;
use crate::common::traits::{RandomnessOracle, RandomnessRequest};
use crate::common::types::{Amount, BetId, RequestId};
use crate::errors::{ConfigurationError, WagerError, WagerResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum wait between a request and a refund of the bet
pub const DEFAULT_REFUND_COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Settings shared by every randomness request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomnessConfig {
    pub confirmations: u16,
    /// Key commitment the oracle signs with
    #[serde(with = "hex::serde")]
    pub key_hash: [u8; 32],
    /// Gas the oracle spends outside the callback, used to price requests
    pub gas_after_calculation: u32,
    /// Native units charged per unit of gas; zero makes requests free
    pub fee_per_gas: u64,
}

impl Default for RandomnessConfig {
    fn default() -> Self {
        Self {
            confirmations: 3,
            key_hash: [0x5a; 32],
            gas_after_calculation: 30_000,
            fee_per_gas: 0,
        }
    }
}

impl RandomnessConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.confirmations == 0 || self.confirmations > 200 {
            return Err(ConfigurationError::InvalidValue {
                field: "randomness.confirmations".to_string(),
                value: self.confirmations.to_string(),
                reason: "must be between 1 and 200".to_string(),
            });
        }
        if self.key_hash == [0u8; 32] {
            return Err(ConfigurationError::MissingRequired("randomness.key_hash".to_string()));
        }
        Ok(())
    }

    /// Native cost of one request with the given callback budget
    pub fn request_cost(&self, callback_gas: u32) -> Amount {
        (callback_gas as Amount + self.gas_after_calculation as Amount).saturating_mul(self.fee_per_gas as Amount)
    }
}

/// Correlation table between oracle handles and bets
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RandomnessCoordinator {
    config: RandomnessConfig,
    /// Handles still waiting for a response
    requests: BTreeMap<RequestId, BetId>,
    /// Handles that were answered or abandoned by a refund; rebuilt from
    /// the bet records on restore
    #[serde(skip)]
    settled: BTreeMap<RequestId, BetId>,
}

impl RandomnessCoordinator {
    pub fn new(config: RandomnessConfig) -> Self {
        Self {
            config,
            requests: BTreeMap::new(),
            settled: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &RandomnessConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RandomnessConfig) {
        self.config = config;
    }

    /// Asks the oracle for one random word on behalf of `bet` and records
    /// the handle. A bet that already holds a handle is refused.
    pub fn request(
        &mut self,
        oracle: &dyn RandomnessOracle,
        bet: &Bet,
        subscription_id: u64,
        callback_gas: u32,
    ) -> WagerResult<RequestId> {
        if bet.request_id.is_some() {
            return Err(WagerError::Oracle(format!(
                "bet {} already has an outstanding request",
                bet.id
            )));
        }

        let request_id = oracle.request_random(RandomnessRequest {
            key_hash: self.config.key_hash,
            subscription_id,
            confirmations: self.config.confirmations,
            callback_gas,
            num_words: 1,
        })?;

        if self.requests.contains_key(&request_id) || self.settled.contains_key(&request_id) {
            return Err(WagerError::Oracle(format!(
                "oracle reused request handle {}",
                request_id
            )));
        }
        self.requests.insert(request_id, bet.id);

        tracing::debug!(bet_id = bet.id, request_id, callback_gas, "randomness requested");
        Ok(request_id)
    }

    /// Bet a handle belongs to, without consuming it
    pub fn bet_for(&self, request_id: RequestId) -> Option<BetId> {
        self.requests.get(&request_id).copied()
    }

    /// Retires an outstanding handle; returns the bet it pointed to
    pub fn consume(&mut self, request_id: RequestId) -> Option<BetId> {
        let bet_id = self.requests.remove(&request_id)?;
        self.settled.insert(request_id, bet_id);
        Some(bet_id)
    }

    /// Records a handle retired before a restart
    pub fn retire(&mut self, request_id: RequestId, bet_id: BetId) {
        self.requests.remove(&request_id);
        self.settled.insert(request_id, bet_id);
    }

    /// Bet of a handle that was already retired
    pub fn settled_bet(&self, request_id: RequestId) -> Option<BetId> {
        self.settled.get(&request_id).copied()
    }

    pub fn outstanding(&self) -> usize {
        self.requests.len()
    }

    /// Highest handle ever recorded, outstanding or retired
    pub fn last_request_id(&self) -> RequestId {
        let outstanding = self.requests.keys().next_back().copied().unwrap_or(0);
        let retired = self.settled.keys().next_back().copied().unwrap_or(0);
        outstanding.max(retired)
    }
}

/// Whether a bet waiting on randomness may be refunded at `now`
pub fn is_timed_out(bet: &Bet, now: u64, cooldown_secs: u64) -> bool {
    match bet.requested_at {
        Some(requested_at) if bet.is_in_flight() => now >= requested_at.saturating_add(cooldown_secs),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Address, Asset};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingOracle {
        next: AtomicU64,
        seen: Mutex<Vec<RandomnessRequest>>,
    }

    impl RandomnessOracle for RecordingOracle {
        fn request_random(&self, request: RandomnessRequest) -> WagerResult<RequestId> {
            self.seen.lock().unwrap().push(request);
            Ok(self.next.fetch_add(1, Ordering::SeqCst) + 100)
        }
    }

    fn bet(id: BetId) -> Bet {
        Bet {
            id,
            asset: Asset::Native,
            resolved: false,
            canceled: false,
            refunded: false,
            house_edge: 200,
            opponents: vec![],
            seats: vec![Address::from_low_u64(1), Address::from_low_u64(2)],
            request_id: None,
            requested_at: None,
            amount: 10,
            pot: 20,
            payout: 0,
            created_at: 0,
        }
    }

    #[test]
    fn test_request_carries_config_and_budget() {
        let oracle = RecordingOracle::default();
        let mut coordinator = RandomnessCoordinator::new(RandomnessConfig::default());

        let request_id = coordinator.request(&oracle, &bet(4), 77, 250_000).unwrap();
        assert_eq!(coordinator.bet_for(request_id), Some(4));

        let seen = oracle.seen.lock().unwrap();
        assert_eq!(seen[0].callback_gas, 250_000);
        assert_eq!(seen[0].subscription_id, 77);
        assert_eq!(seen[0].num_words, 1);
        assert_eq!(seen[0].key_hash, RandomnessConfig::default().key_hash);
    }

    #[test]
    fn test_consume_is_single_shot() {
        let oracle = RecordingOracle::default();
        let mut coordinator = RandomnessCoordinator::default();
        let request_id = coordinator.request(&oracle, &bet(1), 0, 100_000).unwrap();

        assert_eq!(coordinator.consume(request_id), Some(1));
        assert_eq!(coordinator.consume(request_id), None);
        assert_eq!(coordinator.bet_for(request_id), None);
        assert_eq!(coordinator.settled_bet(request_id), Some(1));
        assert_eq!(coordinator.outstanding(), 0);
    }

    #[test]
    fn test_last_request_id_spans_retired_handles() {
        let oracle = RecordingOracle::default();
        let mut coordinator = RandomnessCoordinator::default();
        assert_eq!(coordinator.last_request_id(), 0);

        let first = coordinator.request(&oracle, &bet(1), 0, 100_000).unwrap();
        let second = coordinator.request(&oracle, &bet(2), 0, 100_000).unwrap();
        coordinator.consume(second);
        assert_eq!(coordinator.last_request_id(), second);
        assert!(first < second);
    }

    #[test]
    fn test_second_request_for_same_bet_refused() {
        let oracle = RecordingOracle::default();
        let mut coordinator = RandomnessCoordinator::default();
        let mut launched = bet(1);
        launched.request_id = Some(1);
        assert!(coordinator.request(&oracle, &launched, 0, 100_000).is_err());
        assert!(oracle.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_timeout_window() {
        let mut launched = bet(1);
        launched.request_id = Some(3);
        launched.requested_at = Some(1_000);

        assert!(!is_timed_out(&launched, 1_000 + DEFAULT_REFUND_COOLDOWN_SECS - 1, DEFAULT_REFUND_COOLDOWN_SECS));
        assert!(is_timed_out(&launched, 1_000 + DEFAULT_REFUND_COOLDOWN_SECS, DEFAULT_REFUND_COOLDOWN_SECS));

        launched.resolved = true;
        assert!(!is_timed_out(&launched, u64::MAX, DEFAULT_REFUND_COOLDOWN_SECS));
    }

    #[test]
    fn test_request_cost() {
        let config = RandomnessConfig {
            fee_per_gas: 2,
            gas_after_calculation: 10,
            ..Default::default()
        };
        assert_eq!(config.request_cost(90), 200);
        assert_eq!(RandomnessConfig::default().request_cost(90), 0);
    }
}
