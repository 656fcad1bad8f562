//! Payout Ledger
//!
//! Pull-based balances per (user, asset). Allocations only ever add; a
//! claim takes the whole balance out in one step before any transfer runs.

use crate::common::types::{Address, Amount, Asset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PayoutLedger {
    balances: BTreeMap<Address, BTreeMap<Asset, Amount>>,
}

impl PayoutLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, user: Address, asset: Asset, amount: Amount) {
        if amount == 0 {
            return;
        }
        *self.balances.entry(user).or_default().entry(asset).or_insert(0) += amount;
    }

    pub fn balance(&self, user: &Address, asset: &Asset) -> Amount {
        self.balances
            .get(user)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(0)
    }

    /// Reads and clears a balance
    pub fn take(&mut self, user: &Address, asset: &Asset) -> Amount {
        let Some(assets) = self.balances.get_mut(user) else {
            return 0;
        };
        let amount = assets.remove(asset).unwrap_or(0);
        if assets.is_empty() {
            self.balances.remove(user);
        }
        amount
    }

    /// Non-zero balances of a user
    pub fn balances_of(&self, user: &Address) -> Vec<(Asset, Amount)> {
        self.balances
            .get(user)
            .map(|assets| assets.iter().map(|(asset, amount)| (*asset, *amount)).collect())
            .unwrap_or_default()
    }

    /// Sum owed to everyone in one asset
    pub fn total_owed(&self, asset: &Asset) -> Amount {
        self.balances
            .values()
            .filter_map(|assets| assets.get(asset))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_accumulates() {
        let mut ledger = PayoutLedger::new();
        let user = Address::from_low_u64(1);
        ledger.credit(user, Asset::Native, 10);
        ledger.credit(user, Asset::Native, 5);
        ledger.credit(user, Asset::Native, 0);
        assert_eq!(ledger.balance(&user, &Asset::Native), 15);
    }

    #[test]
    fn test_take_clears_balance() {
        let mut ledger = PayoutLedger::new();
        let user = Address::from_low_u64(1);
        let token = Asset::Token(Address::from_low_u64(50));
        ledger.credit(user, Asset::Native, 10);
        ledger.credit(user, token, 3);

        assert_eq!(ledger.take(&user, &Asset::Native), 10);
        assert_eq!(ledger.take(&user, &Asset::Native), 0);
        assert_eq!(ledger.balances_of(&user), vec![(token, 3)]);
    }

    #[test]
    fn test_total_owed() {
        let mut ledger = PayoutLedger::new();
        ledger.credit(Address::from_low_u64(1), Asset::Native, 10);
        ledger.credit(Address::from_low_u64(2), Asset::Native, 7);
        assert_eq!(ledger.total_owed(&Asset::Native), 17);
    }
}
