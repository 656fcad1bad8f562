//! Bet Ledger records
//!
//! Bets and their item-prize lots are kept for their whole lifetime so that
//! claims and historical lookups keep working after resolution.

use crate::common::types::{Address, Amount, Asset, BetId, RequestId};
use crate::errors::BetError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Largest id the ledger will hand out (24-bit counter)
pub const MAX_BET_ID: BetId = (1 << 24) - 1;

/// One game instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub asset: Asset,
    pub resolved: bool,
    pub canceled: bool,
    /// Set when the pot went back to the seats after a randomness timeout
    #[serde(default)]
    pub refunded: bool,
    /// House edge in bps, fixed when the bet was created
    pub house_edge: u16,
    /// Empty means anyone may join
    pub opponents: Vec<Address>,
    /// One entry per bought seat
    pub seats: Vec<Address>,
    pub request_id: Option<RequestId>,
    pub requested_at: Option<u64>,
    /// Buy-in per seat
    pub amount: Amount,
    pub pot: Amount,
    pub payout: Amount,
    pub created_at: u64,
}

/// Coarse lifecycle position of a bet
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Open,
    AwaitingRandomness,
    Resolved,
    Refunded,
    Canceled,
}

impl Bet {
    pub fn is_restricted(&self) -> bool {
        !self.opponents.is_empty()
    }

    pub fn is_opponent(&self, address: &Address) -> bool {
        self.opponents.contains(address)
    }

    /// Unresolved and no randomness request issued yet
    pub fn is_open(&self) -> bool {
        !self.resolved && self.request_id.is_none()
    }

    pub fn is_in_flight(&self) -> bool {
        !self.resolved && self.request_id.is_some()
    }

    /// Occupant of the first seat, i.e. the creator
    pub fn initiator(&self) -> Address {
        self.seats.first().copied().unwrap_or(Address::ZERO)
    }

    pub fn status(&self) -> BetStatus {
        if self.canceled {
            BetStatus::Canceled
        } else if self.refunded {
            BetStatus::Refunded
        } else if self.resolved {
            BetStatus::Resolved
        } else if self.request_id.is_some() {
            BetStatus::AwaitingRandomness
        } else {
            BetStatus::Open
        }
    }
}

/// Requested item prizes from one collection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPrize {
    pub collection: Address,
    pub token_ids: Vec<u64>,
}

/// Item prizes attached to a bet and where each one ends up.
/// `to[i]` is the destination of `token_ids[i]` once the bet terminates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeLot {
    pub collection: Address,
    pub token_ids: Vec<u64>,
    pub to: Vec<Address>,
}

impl PrizeLot {
    pub fn new(prize: ItemPrize) -> Self {
        Self {
            collection: prize.collection,
            token_ids: prize.token_ids,
            to: Vec::new(),
        }
    }

    /// Sends every item of the lot to one address
    pub fn assign_all(&mut self, to: Address) {
        self.to = vec![to; self.token_ids.len()];
    }

    pub fn destination(&self, item_id: u64) -> Option<Address> {
        let index = self.token_ids.iter().position(|id| *id == item_id)?;
        self.to.get(index).copied()
    }
}

/// Keyed store of bets, lots and opponent participation. Only the id
/// counter and open guest lists serialize; bets and lots are persisted as
/// per-bet records.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BetLedger {
    #[serde(skip)]
    bets: BTreeMap<BetId, Bet>,
    #[serde(skip)]
    lots: BTreeMap<BetId, Vec<PrizeLot>>,
    opponents_played: BTreeMap<BetId, BTreeSet<Address>>,
    last_id: BetId,
}

impl BetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next created bet will receive
    pub fn next_id(&self) -> Result<BetId, BetError> {
        if self.last_id >= MAX_BET_ID {
            return Err(BetError::BetIdsExhausted);
        }
        Ok(self.last_id + 1)
    }

    pub fn last_id(&self) -> BetId {
        self.last_id
    }

    /// Stores a freshly created bet with its lots
    pub fn insert(&mut self, bet: Bet, lots: Vec<PrizeLot>) {
        self.last_id = self.last_id.max(bet.id);
        self.lots.insert(bet.id, lots);
        self.bets.insert(bet.id, bet);
    }

    /// Replaces an existing bet record
    pub fn put(&mut self, bet: Bet) {
        self.bets.insert(bet.id, bet);
    }

    pub fn get(&self, id: BetId) -> Option<&Bet> {
        self.bets.get(&id)
    }

    /// Working copy of a bet that has not been resolved
    pub fn unresolved(&self, id: BetId) -> Result<Bet, BetError> {
        self.bets
            .get(&id)
            .filter(|bet| !bet.resolved)
            .cloned()
            .ok_or(BetError::NotPendingBet(id))
    }

    /// Working copy of a bet that is still taking seats
    pub fn open(&self, id: BetId) -> Result<Bet, BetError> {
        self.bets
            .get(&id)
            .filter(|bet| bet.is_open())
            .cloned()
            .ok_or(BetError::NotPendingBet(id))
    }

    pub fn lots(&self, id: BetId) -> &[PrizeLot] {
        self.lots.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_lots(&mut self, id: BetId, lots: Vec<PrizeLot>) {
        self.lots.insert(id, lots);
    }

    pub fn has_played(&self, id: BetId, address: &Address) -> bool {
        self.opponents_played
            .get(&id)
            .map_or(false, |played| played.contains(address))
    }

    pub fn mark_played(&mut self, id: BetId, address: Address) {
        self.opponents_played.entry(id).or_default().insert(address);
    }

    /// Whether every listed opponent has played once `extra` is counted too
    pub fn all_opponents_played(&self, bet: &Bet, extra: &Address) -> bool {
        bet.opponents
            .iter()
            .all(|opponent| opponent == extra || self.has_played(bet.id, opponent))
    }

    pub fn clear_played(&mut self, id: BetId) {
        self.opponents_played.remove(&id);
    }

    /// Bets waiting on randomness, in id order
    pub fn in_flight(&self) -> impl Iterator<Item = &Bet> {
        self.bets.values().filter(|bet| bet.is_in_flight())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bet> {
        self.bets.values()
    }

    /// Up to `limit` bets, newest first
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &Bet> {
        self.bets.values().rev().take(limit)
    }

    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }
}

/// Total number of items across lots
pub fn item_count(prizes: &[ItemPrize]) -> usize {
    prizes.iter().map(|p| p.token_ids.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(id: BetId) -> Bet {
        Bet {
            id,
            asset: Asset::Native,
            resolved: false,
            canceled: false,
            refunded: false,
            house_edge: 200,
            opponents: vec![],
            seats: vec![Address::from_low_u64(1)],
            request_id: None,
            requested_at: None,
            amount: 100,
            pot: 100,
            payout: 0,
            created_at: 0,
        }
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut ledger = BetLedger::new();
        assert_eq!(ledger.next_id().unwrap(), 1);
        ledger.insert(bet(1), vec![]);
        assert_eq!(ledger.next_id().unwrap(), 2);
        assert!(ledger.get(0).is_none());
    }

    #[test]
    fn test_id_capacity_is_enforced() {
        let mut ledger = BetLedger::new();
        ledger.insert(bet(MAX_BET_ID), vec![]);
        assert_eq!(ledger.next_id(), Err(BetError::BetIdsExhausted));
    }

    #[test]
    fn test_open_rejects_in_flight_and_resolved() {
        let mut ledger = BetLedger::new();
        let mut in_flight = bet(1);
        in_flight.request_id = Some(9);
        ledger.insert(in_flight, vec![]);
        let mut resolved = bet(2);
        resolved.resolved = true;
        ledger.insert(resolved, vec![]);

        assert_eq!(ledger.open(1), Err(BetError::NotPendingBet(1)));
        assert_eq!(ledger.open(2), Err(BetError::NotPendingBet(2)));
        assert_eq!(ledger.open(3), Err(BetError::NotPendingBet(3)));
        assert!(ledger.unresolved(1).is_ok());
    }

    #[test]
    fn test_opponent_tracking() {
        let mut ledger = BetLedger::new();
        let alice = Address::from_low_u64(10);
        let bob = Address::from_low_u64(11);
        let mut restricted = bet(1);
        restricted.opponents = vec![alice, bob];
        ledger.insert(restricted.clone(), vec![]);

        assert!(!ledger.all_opponents_played(&restricted, &alice));
        ledger.mark_played(1, bob);
        assert!(ledger.all_opponents_played(&restricted, &alice));

        ledger.clear_played(1);
        assert!(!ledger.has_played(1, &bob));
    }

    #[test]
    fn test_prize_lot_destinations() {
        let mut lot = PrizeLot::new(ItemPrize {
            collection: Address::from_low_u64(99),
            token_ids: vec![5, 6],
        });
        assert_eq!(lot.destination(5), None);
        lot.assign_all(Address::from_low_u64(1));
        assert_eq!(lot.destination(6), Some(Address::from_low_u64(1)));
        assert_eq!(lot.destination(7), None);
    }
}
