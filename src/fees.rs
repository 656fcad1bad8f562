//! Fee Allocator
//!
//! Splits the house edge skimmed at resolution between the treasury, team,
//! initiator and dividend buckets. Treasury, team and initiator shares are
//! rounded down; dividends take whatever is left so rounding never loses
//! value.

use crate::common::traits::HouseEdgeSplitRatios;
use crate::common::types::{apply_bps, Address, Amount, Asset};
use crate::payouts::PayoutLedger;
use serde::{Deserialize, Serialize};

/// Accumulated house edge waiting to be withdrawn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseEdgeSplit {
    pub dividend: Amount,
    pub treasury: Amount,
    pub team: Amount,
}

/// Engine-side state of one asset
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Zero disables betting with the asset
    pub house_edge: u16,
    pub callback_gas: u32,
    /// Native value collected to reimburse randomness requests
    pub vrf_fees: Amount,
    pub split: HouseEdgeSplit,
}

impl TokenConfig {
    pub fn new(house_edge: u16, callback_gas: u32) -> Self {
        Self {
            house_edge,
            callback_gas,
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.house_edge > 0
    }
}

/// Result of splitting one fee
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeShares {
    pub treasury: Amount,
    pub team: Amount,
    pub initiator: Amount,
    pub dividend: Amount,
}

impl FeeShares {
    pub fn total(&self) -> Amount {
        self.treasury + self.team + self.initiator + self.dividend
    }
}

/// House edge owed on a pot
pub fn house_edge_fee(pot: Amount, house_edge: u16) -> Amount {
    apply_bps(pot, house_edge)
}

/// Splits `fee` by `ratios`; the dividend is the remainder
pub fn split_fee(fee: Amount, ratios: &HouseEdgeSplitRatios) -> FeeShares {
    let treasury = apply_bps(fee, ratios.treasury);
    let team = apply_bps(fee, ratios.team);
    let initiator = apply_bps(fee, ratios.initiator);
    let dividend = fee.saturating_sub(treasury + team + initiator);
    FeeShares {
        treasury,
        team,
        initiator,
        dividend,
    }
}

pub struct FeeAllocator;

impl FeeAllocator {
    /// Splits `fee` and books it: buckets on the token config, the
    /// initiator's share straight into the payout ledger.
    pub fn allocate(
        token: &mut TokenConfig,
        payouts: &mut PayoutLedger,
        asset: Asset,
        fee: Amount,
        ratios: &HouseEdgeSplitRatios,
        initiator: Address,
    ) -> FeeShares {
        let shares = split_fee(fee, ratios);

        token.split.dividend += shares.dividend;
        if shares.treasury != 0 {
            token.split.treasury += shares.treasury;
        }
        if shares.team != 0 {
            token.split.team += shares.team;
        }
        if shares.initiator != 0 {
            payouts.credit(initiator, asset, shares.initiator);
        }

        tracing::debug!(
            %asset,
            fee,
            treasury = shares.treasury,
            team = shares.team,
            initiator = shares.initiator,
            dividend = shares.dividend,
            "house edge allocated"
        );
        shares
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratios() -> HouseEdgeSplitRatios {
        HouseEdgeSplitRatios {
            treasury: 3000,
            team: 1000,
            initiator: 500,
        }
    }

    #[test]
    fn test_worked_example_rounding_goes_to_dividend() {
        let fee = house_edge_fee(200, 200);
        assert_eq!(fee, 4);

        let shares = split_fee(fee, &ratios());
        assert_eq!(shares.treasury, 1);
        assert_eq!(shares.team, 0);
        assert_eq!(shares.initiator, 0);
        assert_eq!(shares.dividend, 3);
        assert_eq!(shares.total(), fee);
    }

    #[test]
    fn test_allocate_books_buckets_and_initiator() {
        let mut token = TokenConfig::new(200, 100_000);
        let mut payouts = PayoutLedger::default();
        let initiator = Address::from_low_u64(1);

        let shares = FeeAllocator::allocate(&mut token, &mut payouts, Asset::Native, 10_000, &ratios(), initiator);

        assert_eq!(shares.treasury, 3_000);
        assert_eq!(shares.team, 1_000);
        assert_eq!(shares.initiator, 500);
        assert_eq!(shares.dividend, 5_500);
        assert_eq!(token.split, HouseEdgeSplit { dividend: 5_500, treasury: 3_000, team: 1_000 });
        assert_eq!(payouts.balance(&initiator, &Asset::Native), 500);
    }

    #[test]
    fn test_zero_ratios_send_everything_to_dividends() {
        let shares = split_fee(999, &HouseEdgeSplitRatios::default());
        assert_eq!(shares.dividend, 999);
        assert_eq!(shares.total(), 999);
    }

    #[test]
    fn test_shares_always_sum_to_fee() {
        for fee in [0u128, 1, 3, 7, 19, 101, 9_999, 123_457] {
            assert_eq!(split_fee(fee, &ratios()).total(), fee);
        }
    }
}
