use super::GameRules;
use crate::bets::Bet;
use crate::common::types::{Address, RandomValue};
use crate::prizes::seat_index;

/// Heads-up game: two seats, the oracle output picks one of them
#[derive(Debug, Clone, Copy, Default)]
pub struct CoinToss;

impl GameRules for CoinToss {
    fn name(&self) -> &'static str {
        "coin_toss"
    }

    fn max_seats(&self, _bet: &Bet) -> usize {
        2
    }

    fn winners(&self, bet: &Bet, random: &RandomValue) -> Vec<Address> {
        if bet.seats.is_empty() {
            return Vec::new();
        }
        vec![bet.seats[seat_index(random, bet.seats.len())]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Asset;

    fn two_seat_bet() -> Bet {
        Bet {
            id: 1,
            asset: Asset::Native,
            resolved: false,
            canceled: false,
            refunded: false,
            house_edge: 200,
            opponents: vec![],
            seats: vec![Address::from_low_u64(1), Address::from_low_u64(2)],
            request_id: Some(1),
            requested_at: Some(0),
            amount: 100,
            pot: 200,
            payout: 0,
            created_at: 0,
        }
    }

    #[test]
    fn test_winner_follows_parity_of_output() {
        let bet = two_seat_bet();
        let mut even = [0u8; 32];
        even[15] = 2;
        let mut odd = [0u8; 32];
        odd[15] = 3;

        assert_eq!(CoinToss.winners(&bet, &even), vec![Address::from_low_u64(1)]);
        assert_eq!(CoinToss.winners(&bet, &odd), vec![Address::from_low_u64(2)]);
    }

    #[test]
    fn test_seat_policy() {
        let bet = two_seat_bet();
        assert_eq!(CoinToss.min_seats(), 2);
        assert_eq!(CoinToss.max_seats(&bet), 2);
        assert!(CoinToss.is_ready(&bet));
    }
}
