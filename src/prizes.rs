//! Prize Distributor
//!
//! Turns a resolved pot into per-winner shares and assigns every item prize
//! to a seat drawn from the oracle output. Item draws are independent of the
//! fungible winners: each `(lot, item)` slot hashes the random value with
//! its own indices and picks a seat slot, so buying more seats buys more
//! chances.

use crate::bets::PrizeLot;
use crate::common::types::{Address, Amount, BetId, RandomValue};
use crate::fees::house_edge_fee;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Fungible outcome of a resolution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotSettlement {
    pub fee: Amount,
    pub payout: Amount,
    pub per_winner: Amount,
    pub winners: Vec<Address>,
}

impl PotSettlement {
    /// Left in escrow by the integer split between winners
    pub fn dust(&self) -> Amount {
        self.payout - self.per_winner * self.winners.len() as Amount
    }
}

/// Takes the house edge off `pot` and splits the rest evenly
pub fn settle_pot(pot: Amount, house_edge: u16, winners: Vec<Address>) -> PotSettlement {
    let fee = house_edge_fee(pot, house_edge);
    let payout = pot - fee;
    let per_winner = if winners.is_empty() {
        0
    } else {
        payout / winners.len() as Amount
    };
    PotSettlement {
        fee,
        payout,
        per_winner,
        winners,
    }
}

/// Uniform draw from the first 16 bytes of a digest
fn draw(digest: &[u8], modulus: usize) -> usize {
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    (u128::from_be_bytes(head) % modulus as u128) as usize
}

/// Seat slot for a single-winner draw straight from the oracle output
pub fn seat_index(random: &RandomValue, seat_count: usize) -> usize {
    if seat_count == 0 {
        return 0;
    }
    draw(random, seat_count)
}

/// Seat slot for the `round`-th of several winner draws. Round zero is the
/// plain [`seat_index`] draw.
pub fn winner_index(random: &RandomValue, round: usize, seat_count: usize) -> usize {
    if round == 0 {
        return seat_index(random, seat_count);
    }
    if seat_count == 0 {
        return 0;
    }
    let mut hasher = Sha256::new();
    hasher.update(random);
    hasher.update(b"winner");
    hasher.update((round as u64).to_be_bytes());
    draw(&hasher.finalize(), seat_count)
}

/// Seat slot that receives item `item_index` of lot `lot_index`
pub fn item_winner_index(random: &RandomValue, lot_index: usize, item_index: usize, seat_count: usize) -> usize {
    if seat_count == 0 {
        return 0;
    }
    let mut hasher = Sha256::new();
    hasher.update(random);
    hasher.update((lot_index as u64).to_be_bytes());
    hasher.update((item_index as u64).to_be_bytes());
    draw(&hasher.finalize(), seat_count)
}

/// Fills every lot's destinations from independent draws over `seats`
pub fn assign_items(lots: &mut [PrizeLot], seats: &[Address], random: &RandomValue) {
    for (lot_index, lot) in lots.iter_mut().enumerate() {
        lot.to = (0..lot.token_ids.len())
            .map(|item_index| seats[item_winner_index(random, lot_index, item_index, seats.len())])
            .collect();
    }
}

/// Sends every item back to one address (cancel and refund paths)
pub fn return_items(lots: &mut [PrizeLot], to: Address) {
    for lot in lots.iter_mut() {
        lot.assign_all(to);
    }
}

/// An item leaving escrow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTransfer {
    pub bet_id: BetId,
    pub collection: Address,
    pub item_id: u64,
    pub to: Address,
}

/// Claimed flags per (bet, collection, item)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ItemClaims {
    claimed: BTreeSet<(BetId, Address, u64)>,
}

impl ItemClaims {
    /// Marks the item claimed; `false` if it already was
    pub fn mark(&mut self, bet_id: BetId, collection: Address, item_id: u64) -> bool {
        self.claimed.insert((bet_id, collection, item_id))
    }

    pub fn unmark(&mut self, bet_id: BetId, collection: Address, item_id: u64) {
        self.claimed.remove(&(bet_id, collection, item_id));
    }

    pub fn is_claimed(&self, bet_id: BetId, collection: Address, item_id: u64) -> bool {
        self.claimed.contains(&(bet_id, collection, item_id))
    }

    /// Delivered items of one bet
    pub fn claimed_in(&self, bet_id: BetId) -> Vec<(Address, u64)> {
        self.claimed
            .range((bet_id, Address::ZERO, 0)..=(bet_id, Address([0xff; 20]), u64::MAX))
            .map(|(_, collection, item_id)| (*collection, *item_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bets::ItemPrize;

    fn seats(n: u64) -> Vec<Address> {
        (1..=n).map(Address::from_low_u64).collect()
    }

    #[test]
    fn test_settle_pot_single_winner() {
        let settlement = settle_pot(200, 200, vec![Address::from_low_u64(1)]);
        assert_eq!(settlement.fee, 4);
        assert_eq!(settlement.payout, 196);
        assert_eq!(settlement.per_winner, 196);
        assert_eq!(settlement.dust(), 0);
    }

    #[test]
    fn test_settle_pot_dust_bounded_by_winner_count() {
        let settlement = settle_pot(1_000, 250, seats(3));
        assert_eq!(settlement.fee, 25);
        assert_eq!(settlement.payout, 975);
        assert_eq!(settlement.per_winner, 325);
        assert!(settlement.dust() <= 2);

        let settlement = settle_pot(1_001, 0, seats(4));
        assert_eq!(settlement.per_winner, 250);
        assert_eq!(settlement.dust(), 1);
    }

    #[test]
    fn test_item_draws_are_deterministic() {
        let random = [7u8; 32];
        let a = item_winner_index(&random, 0, 3, 5);
        let b = item_winner_index(&random, 0, 3, 5);
        assert_eq!(a, b);
        assert!(a < 5);
    }

    #[test]
    fn test_item_draws_depend_on_indices() {
        let random = [42u8; 32];
        let draws: BTreeSet<usize> = (0..64)
            .map(|item| item_winner_index(&random, 0, item, 1_000))
            .collect();
        assert!(draws.len() > 1);
    }

    #[test]
    fn test_assign_items_fills_destinations_in_order() {
        let mut lots = vec![
            PrizeLot::new(ItemPrize { collection: Address::from_low_u64(90), token_ids: vec![1, 2, 3] }),
            PrizeLot::new(ItemPrize { collection: Address::from_low_u64(91), token_ids: vec![8] }),
        ];
        let players = seats(4);
        let random = [3u8; 32];
        assign_items(&mut lots, &players, &random);

        assert_eq!(lots[0].to.len(), 3);
        assert_eq!(lots[1].to.len(), 1);
        for (item_index, to) in lots[0].to.iter().enumerate() {
            assert_eq!(*to, players[item_winner_index(&random, 0, item_index, 4)]);
        }
    }

    #[test]
    fn test_single_seat_wins_every_item() {
        let mut lots = vec![PrizeLot::new(ItemPrize {
            collection: Address::from_low_u64(90),
            token_ids: vec![1, 2],
        })];
        let only = Address::from_low_u64(5);
        assign_items(&mut lots, &[only], &[9u8; 32]);
        assert_eq!(lots[0].to, vec![only, only]);
    }

    #[test]
    fn test_item_claims_are_idempotent() {
        let mut claims = ItemClaims::default();
        let collection = Address::from_low_u64(90);
        assert!(claims.mark(1, collection, 5));
        assert!(!claims.mark(1, collection, 5));
        assert!(claims.mark(2, collection, 5));
        assert!(claims.mark(1, Address::from_low_u64(91), 2));
        assert_eq!(claims.claimed_in(1), vec![(collection, 5), (Address::from_low_u64(91), 2)]);
        claims.unmark(1, collection, 5);
        assert!(!claims.is_claimed(1, collection, 5));
        assert_eq!(claims.claimed_in(2), vec![(collection, 5)]);
    }
}
