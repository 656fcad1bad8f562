//! Engine counters, rendered in Prometheus text format

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct EngineMetrics {
    started: Instant,
    pub bets_created: AtomicU64,
    pub seats_joined: AtomicU64,
    pub bets_launched: AtomicU64,
    pub bets_resolved: AtomicU64,
    pub bets_canceled: AtomicU64,
    pub bets_refunded: AtomicU64,
    pub claims_total: AtomicU64,
    pub item_claims_total: AtomicU64,
    pub failed_transitions: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub bets_created: u64,
    pub seats_joined: u64,
    pub bets_launched: u64,
    pub bets_resolved: u64,
    pub bets_canceled: u64,
    pub bets_refunded: u64,
    pub claims_total: u64,
    pub item_claims_total: u64,
    pub failed_transitions: u64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            bets_created: AtomicU64::new(0),
            seats_joined: AtomicU64::new(0),
            bets_launched: AtomicU64::new(0),
            bets_resolved: AtomicU64::new(0),
            bets_canceled: AtomicU64::new(0),
            bets_refunded: AtomicU64::new(0),
            claims_total: AtomicU64::new(0),
            item_claims_total: AtomicU64::new(0),
            failed_transitions: AtomicU64::new(0),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_seconds: self.started.elapsed().as_secs(),
            bets_created: self.bets_created.load(Ordering::Relaxed),
            seats_joined: self.seats_joined.load(Ordering::Relaxed),
            bets_launched: self.bets_launched.load(Ordering::Relaxed),
            bets_resolved: self.bets_resolved.load(Ordering::Relaxed),
            bets_canceled: self.bets_canceled.load(Ordering::Relaxed),
            bets_refunded: self.bets_refunded.load(Ordering::Relaxed),
            claims_total: self.claims_total.load(Ordering::Relaxed),
            item_claims_total: self.item_claims_total.load(Ordering::Relaxed),
            failed_transitions: self.failed_transitions.load(Ordering::Relaxed),
        }
    }

    pub fn to_prometheus_format(&self) -> String {
        let s = self.snapshot();
        let counters = [
            ("bets_created_total", "Bets opened", s.bets_created),
            ("seats_joined_total", "Seats bought by joiners", s.seats_joined),
            ("bets_launched_total", "Randomness requests issued", s.bets_launched),
            ("bets_resolved_total", "Bets resolved by the oracle", s.bets_resolved),
            ("bets_canceled_total", "Single-seat bets canceled", s.bets_canceled),
            ("bets_refunded_total", "Timed out bets refunded", s.bets_refunded),
            ("claims_total", "Successful payout claims", s.claims_total),
            ("item_claims_total", "Item prizes delivered", s.item_claims_total),
            ("failed_transitions_total", "Transitions rolled back on error", s.failed_transitions),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP wagerpool_{name} {help}\n# TYPE wagerpool_{name} counter\nwagerpool_{name} {value}\n\n"
            ));
        }
        output.push_str(&format!(
            "# HELP wagerpool_uptime_seconds Seconds since the engine started\n\
             # TYPE wagerpool_uptime_seconds gauge\n\
             wagerpool_uptime_seconds {}\n",
            s.uptime_seconds
        ));
        output
    }
}
