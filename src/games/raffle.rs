use super::GameRules;
use crate::bets::Bet;
use crate::common::types::{Address, RandomValue};
use crate::prizes::winner_index;

/// Open-table draw: anyone buys seats up to `max_seats`; each of the
/// `winner_count` draws picks a seat slot, so every seat is one ticket.
#[derive(Debug, Clone, Copy)]
pub struct Raffle {
    max_seats: usize,
    winner_count: usize,
}

impl Raffle {
    pub fn new(max_seats: usize, winner_count: usize) -> Self {
        Self {
            max_seats: max_seats.max(2),
            winner_count: winner_count.max(1),
        }
    }
}

impl Default for Raffle {
    fn default() -> Self {
        Self::new(10, 1)
    }
}

impl GameRules for Raffle {
    fn name(&self) -> &'static str {
        "raffle"
    }

    fn max_seats(&self, bet: &Bet) -> usize {
        // A restricted table never needs more seats than its guest list plus the host
        if bet.is_restricted() {
            self.max_seats.max(bet.opponents.len() + 1)
        } else {
            self.max_seats
        }
    }

    fn winners(&self, bet: &Bet, random: &RandomValue) -> Vec<Address> {
        if bet.seats.is_empty() {
            return Vec::new();
        }
        (0..self.winner_count)
            .map(|round| bet.seats[winner_index(random, round, bet.seats.len())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Asset;

    fn bet_with_seats(seats: Vec<Address>) -> Bet {
        Bet {
            id: 1,
            asset: Asset::Native,
            resolved: false,
            canceled: false,
            refunded: false,
            house_edge: 200,
            opponents: vec![],
            seats,
            request_id: None,
            requested_at: None,
            amount: 10,
            pot: 0,
            payout: 0,
            created_at: 0,
        }
    }

    #[test]
    fn test_minimums_are_clamped() {
        let raffle = Raffle::new(0, 0);
        let bet = bet_with_seats(vec![Address::from_low_u64(1)]);
        assert_eq!(raffle.max_seats(&bet), 2);
        assert_eq!(raffle.winners(&bet, &[1u8; 32]).len(), 1);
    }

    #[test]
    fn test_winners_are_seat_occupants() {
        let seats: Vec<Address> = (1..=6).map(Address::from_low_u64).collect();
        let bet = bet_with_seats(seats.clone());
        let raffle = Raffle::new(10, 3);

        let winners = raffle.winners(&bet, &[11u8; 32]);
        assert_eq!(winners.len(), 3);
        assert!(winners.iter().all(|w| seats.contains(w)));
    }

    #[test]
    fn test_not_ready_below_minimum() {
        let raffle = Raffle::default();
        assert!(!raffle.is_ready(&bet_with_seats(vec![Address::from_low_u64(1)])));
        assert!(raffle.is_ready(&bet_with_seats(vec![Address::from_low_u64(1), Address::from_low_u64(2)])));
    }

    #[test]
    fn test_restricted_table_fits_guest_list() {
        let raffle = Raffle::new(2, 1);
        let mut bet = bet_with_seats(vec![Address::from_low_u64(1)]);
        bet.opponents = (2..=5).map(Address::from_low_u64).collect();
        assert_eq!(raffle.max_seats(&bet), 5);
    }
}
