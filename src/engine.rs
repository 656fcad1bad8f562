//! Wager engine
//!
//! Every mutating entry point runs as one serialized transition over the
//! [`LedgerState`]. A transition validates first, pulls assets into escrow
//! while recording receipts, and writes to the state only after its last
//! fallible step; on error the receipts are paid back and nothing else has
//! changed. Outbound transfers (claims and withdrawals) clear the balance in
//! one transition, move the asset outside it, and restore the balance if the
//! transfer fails.

use crate::bets::{item_count, Bet, BetLedger, ItemPrize, PrizeLot};
use crate::common::traits::{AssetTransfer, Clock, RandomnessFulfillment, RandomnessOracle, TokenRegistry};
use crate::common::types::{Address, Amount, Asset, BetId, CallContext, RandomValue, RequestId, BPS_DENOMINATOR};
use crate::config::WagerConfig;
use crate::errors::{BetError, ConfigurationError, TransferError, WagerResult};
use crate::events::WagerEvent;
use crate::fees::{FeeAllocator, TokenConfig};
use crate::games::GameRules;
use crate::guard::TransitionGuard;
use crate::metrics::EngineMetrics;
use crate::payouts::PayoutLedger;
use crate::prizes::{assign_items, return_items, settle_pot, ItemClaims, ItemTransfer};
use crate::randomness::{is_timed_out, RandomnessConfig, RandomnessCoordinator};
use crate::storage::{BetRecord, LedgerStorage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Roles and switches
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdminState {
    pub paused: bool,
    pub admins: BTreeSet<Address>,
    pub harvester: Option<Address>,
    pub max_item_prizes: usize,
}

impl AdminState {
    pub fn is_admin(&self, address: &Address) -> bool {
        self.admins.contains(address)
    }
}

/// Everything the engine owns
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub bets: BetLedger,
    pub randomness: RandomnessCoordinator,
    pub tokens: BTreeMap<Asset, TokenConfig>,
    pub payouts: PayoutLedger,
    /// Persisted with the bet records
    #[serde(skip)]
    pub item_claims: ItemClaims,
    pub admin: AdminState,
}

impl LedgerState {
    pub fn from_config(config: &WagerConfig) -> Self {
        Self {
            bets: BetLedger::new(),
            randomness: RandomnessCoordinator::new(config.randomness.clone()),
            tokens: config
                .tokens
                .iter()
                .map(|entry| (entry.asset, TokenConfig::new(entry.house_edge_bps, entry.callback_gas)))
                .collect(),
            payouts: PayoutLedger::new(),
            item_claims: ItemClaims::default(),
            admin: AdminState {
                paused: false,
                admins: config.admin.admins.iter().copied().collect(),
                harvester: config.admin.harvester,
                max_item_prizes: config.engine.max_item_prizes,
            },
        }
    }

    /// Puts an archived bet back, together with its retired handle and
    /// delivered items
    fn restore_record(&mut self, record: BetRecord) {
        let bet = record.bet;
        if let (true, Some(request_id)) = (bet.resolved, bet.request_id) {
            self.randomness.retire(request_id, bet.id);
        }
        for (collection, item_id) in record.claimed_items {
            self.item_claims.mark(bet.id, collection, item_id);
        }
        self.bets.insert(bet, record.lots);
    }

    /// Value the escrow must hold in `asset` for every pot, balance and
    /// bucket the ledger still owes. Randomness fees count as native.
    pub fn escrowed(&self, asset: &Asset) -> Amount {
        let pots: Amount = self
            .bets
            .iter()
            .filter(|bet| !bet.resolved && bet.asset == *asset)
            .map(|bet| bet.pot)
            .sum();
        let buckets = self
            .tokens
            .get(asset)
            .map_or(0, |token| token.split.treasury + token.split.team + token.split.dividend);
        let vrf_fees: Amount = match asset {
            Asset::Native => self.tokens.values().map(|token| token.vrf_fees).sum(),
            Asset::Token(_) => 0,
        };
        pots + buckets + vrf_fees + self.payouts.total_owed(asset)
    }

    fn token(&self, asset: &Asset) -> Result<TokenConfig, BetError> {
        self.tokens.get(asset).copied().ok_or(BetError::ForbiddenAsset(*asset))
    }

    fn ensure_admin(&self, caller: &Address) -> Result<(), BetError> {
        if self.admin.is_admin(caller) {
            Ok(())
        } else {
            Err(BetError::AccessDenied(*caller))
        }
    }

    fn ensure_running(&self) -> Result<(), BetError> {
        if self.admin.paused {
            Err(BetError::Paused)
        } else {
            Ok(())
        }
    }
}

/// Parameters of a new bet
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBet {
    pub asset: Asset,
    /// Buy-in per seat
    pub amount: Amount,
    /// Empty for an open table
    #[serde(default)]
    pub opponents: Vec<Address>,
    #[serde(default)]
    pub items: Vec<ItemPrize>,
}

/// External services the engine calls into
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn TokenRegistry>,
    pub oracle: Arc<dyn RandomnessOracle>,
    pub transfers: Arc<dyn AssetTransfer>,
    pub clock: Arc<dyn Clock>,
}

/// Asset pulled into escrow during the current transition
enum Receipt {
    Native { from: Address, amount: Amount },
    Token { token: Address, from: Address, received: Amount },
    Item { collection: Address, from: Address, item_id: u64 },
}

#[derive(Default)]
struct Receipts(Vec<Receipt>);

impl Receipts {
    /// Hands everything back, newest first
    fn unwind(self, transfers: &dyn AssetTransfer) {
        for receipt in self.0.into_iter().rev() {
            let result = match &receipt {
                Receipt::Native { from, amount } => transfers.send_native(from, *amount),
                Receipt::Token { token, from, received } => transfers.send_token(token, from, *received),
                Receipt::Item { collection, from, item_id } => transfers.send_item(collection, from, *item_id),
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to return collected asset during rollback");
            }
        }
    }
}

/// Result of a committed transition
struct Outcome<T> {
    value: T,
    touched: Vec<BetId>,
    events: Vec<WagerEvent>,
}

impl<T> Outcome<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            touched: Vec::new(),
            events: Vec::new(),
        }
    }

    fn touching(mut self, bet_id: BetId) -> Self {
        self.touched.push(bet_id);
        self
    }

    fn event(mut self, event: WagerEvent) -> Self {
        self.events.push(event);
        self
    }
}

pub struct WagerEngine {
    guard: TransitionGuard<LedgerState>,
    game: Arc<dyn GameRules>,
    registry: Arc<dyn TokenRegistry>,
    oracle: Arc<dyn RandomnessOracle>,
    transfers: Arc<dyn AssetTransfer>,
    clock: Arc<dyn Clock>,
    storage: Option<LedgerStorage>,
    events: broadcast::Sender<WagerEvent>,
    metrics: EngineMetrics,
    refund_cooldown_secs: u64,
}

impl WagerEngine {
    /// Fresh engine with the ledger seeded from `config`
    pub fn new(config: &WagerConfig, game: Arc<dyn GameRules>, collaborators: Collaborators) -> Self {
        Self::with_state(config, game, collaborators, LedgerState::from_config(config))
    }

    fn with_state(
        config: &WagerConfig,
        game: Arc<dyn GameRules>,
        collaborators: Collaborators,
        state: LedgerState,
    ) -> Self {
        let (events, _) = broadcast::channel(config.engine.event_buffer.max(1));
        Self {
            guard: TransitionGuard::new(state),
            game,
            registry: collaborators.registry,
            oracle: collaborators.oracle,
            transfers: collaborators.transfers,
            clock: collaborators.clock,
            storage: None,
            events,
            metrics: EngineMetrics::new(),
            refund_cooldown_secs: config.engine.refund_cooldown_secs,
        }
    }

    /// Rebuilds the engine from the ledger header and bet records in
    /// `storage`, or starts fresh when there is none. Later transitions are persisted there.
    pub fn restore(
        config: &WagerConfig,
        game: Arc<dyn GameRules>,
        collaborators: Collaborators,
        storage: LedgerStorage,
    ) -> WagerResult<Self> {
        let state = match storage.load_snapshot::<LedgerState>()? {
            Some(mut state) => {
                for record in storage.all_bets()? {
                    state.restore_record(record);
                }
                tracing::info!(
                    last_bet_id = state.bets.last_id(),
                    bets = state.bets.len(),
                    outstanding_requests = state.randomness.outstanding(),
                    "ledger restored from snapshot"
                );
                state
            }
            None => LedgerState::from_config(config),
        };
        let mut engine = Self::with_state(config, game, collaborators, state);
        engine.storage = Some(storage);
        Ok(engine)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WagerEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn game(&self) -> &dyn GameRules {
        self.game.as_ref()
    }

    /// Runs `f` as one transition. `f` must not write to the state before
    /// its last fallible step.
    fn transition<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut LedgerState, &mut Receipts) -> WagerResult<Outcome<T>>,
    ) -> WagerResult<T> {
        let mut state = self.guard.enter()?;
        let mut receipts = Receipts::default();

        match f(&mut *state, &mut receipts) {
            Ok(outcome) => {
                self.persist(&state, &outcome.touched);
                for event in outcome.events {
                    // No subscribers is fine
                    let _ = self.events.send(event);
                }
                Ok(outcome.value)
            }
            Err(e) => {
                receipts.unwind(self.transfers.as_ref());
                EngineMetrics::incr(&self.metrics.failed_transitions);
                tracing::debug!(op, error = %e, "transition rolled back");
                Err(e)
            }
        }
    }

    /// Clears a balance in one transition, moves the asset outside it and
    /// puts the balance back if the move fails
    fn pay_out<T>(
        &self,
        op: &'static str,
        touched: &[BetId],
        take: impl FnOnce(&mut LedgerState) -> WagerResult<Option<T>>,
        send: impl FnOnce(&T) -> Result<(), TransferError>,
        restore: impl FnOnce(&mut LedgerState, &T),
    ) -> WagerResult<Option<T>> {
        let taken = {
            let mut state = self.guard.enter()?;
            let taken = take(&mut *state)?;
            if taken.is_some() {
                self.persist(&state, touched);
            }
            taken
        };
        let Some(taken) = taken else {
            return Ok(None);
        };

        if let Err(e) = send(&taken) {
            tracing::warn!(op, error = %e, "outbound transfer failed, balance restored");
            let mut state = self.guard.enter()?;
            restore(&mut *state, &taken);
            self.persist(&state, touched);
            EngineMetrics::incr(&self.metrics.failed_transitions);
            return Err(e.into());
        }
        Ok(Some(taken))
    }

    fn persist(&self, state: &LedgerState, touched: &[BetId]) {
        let Some(storage) = &self.storage else {
            return;
        };
        let now = self.clock.now();
        let records: Vec<BetRecord> = touched
            .iter()
            .filter_map(|id| state.bets.get(*id))
            .map(|bet| BetRecord {
                bet: bet.clone(),
                lots: state.bets.lots(bet.id).to_vec(),
                claimed_items: state.item_claims.claimed_in(bet.id),
                status: bet.status(),
                updated_at: now,
            })
            .collect();

        if let Err(e) = storage.save(state, &records) {
            tracing::error!(error = %e, "failed to persist ledger snapshot");
        }
    }

    fn send(&self, asset: &Asset, to: &Address, amount: Amount) -> Result<(), TransferError> {
        match asset {
            Asset::Native => self.transfers.send_native(to, amount),
            Asset::Token(token) => self.transfers.send_token(token, to, amount),
        }
    }

    /// Checks the attached native value and pulls it into escrow
    fn collect_value(&self, receipts: &mut Receipts, ctx: &CallContext, expected: Amount) -> WagerResult<()> {
        if ctx.value != expected {
            return Err(BetError::WrongBetAmount {
                expected,
                actual: ctx.value,
            }
            .into());
        }
        if expected > 0 {
            self.transfers.collect_native(&ctx.caller, expected)?;
            receipts.0.push(Receipt::Native {
                from: ctx.caller,
                amount: expected,
            });
        }
        Ok(())
    }

    /// Pulls `amount` of a token and returns what escrow actually received
    fn collect_token(&self, receipts: &mut Receipts, token: &Address, from: &Address, amount: Amount) -> WagerResult<Amount> {
        let before = self.transfers.escrow_token_balance(token);
        self.transfers.collect_token(token, from, amount)?;
        let received = self.transfers.escrow_token_balance(token).saturating_sub(before);
        receipts.0.push(Receipt::Token {
            token: *token,
            from: *from,
            received,
        });
        Ok(received)
    }

    /// Collects a buy-in plus `extra_native` of attached value; returns the
    /// amount added to the pot
    fn collect_buy_in(
        &self,
        receipts: &mut Receipts,
        ctx: &CallContext,
        asset: &Asset,
        buy_in: Amount,
        extra_native: Amount,
    ) -> WagerResult<Amount> {
        match asset {
            Asset::Native => {
                let expected = buy_in.checked_add(extra_native).ok_or(BetError::WrongBetAmount {
                    expected: Amount::MAX,
                    actual: ctx.value,
                })?;
                self.collect_value(receipts, ctx, expected)?;
                Ok(buy_in)
            }
            Asset::Token(token) => {
                self.collect_value(receipts, ctx, extra_native)?;
                if buy_in == 0 {
                    return Ok(0);
                }
                self.collect_token(receipts, token, &ctx.caller, buy_in)
            }
        }
    }

    /// Native cost of launching a bet in `asset`
    fn launch_cost(state: &LedgerState, asset: &Asset) -> Result<Amount, BetError> {
        let token = state.token(asset)?;
        Ok(state.randomness.config().request_cost(token.callback_gas))
    }

    /// Issues the randomness request of `bet`. Writes only to the
    /// correlation table, and only on success.
    fn request_randomness(&self, state: &mut LedgerState, bet: &mut Bet) -> WagerResult<RequestId> {
        let token = state.token(&bet.asset)?;
        let settings = self
            .registry
            .token_settings(&bet.asset)
            .ok_or(BetError::ForbiddenAsset(bet.asset))?;

        let request_id = state.randomness.request(
            self.oracle.as_ref(),
            bet,
            settings.vrf_subscription_id,
            token.callback_gas,
        )?;
        bet.request_id = Some(request_id);
        bet.requested_at = Some(self.clock.now());
        Ok(request_id)
    }

    fn launched_event(bet: &Bet) -> Option<WagerEvent> {
        Some(WagerEvent::RandomnessRequested {
            bet_id: bet.id,
            request_id: bet.request_id?,
            requested_at: bet.requested_at?,
        })
    }

    // ----- Bet Ledger -----

    /// Opens a bet with the caller in the first seat
    pub fn create_bet(&self, ctx: CallContext, new_bet: NewBet) -> WagerResult<BetId> {
        self.transition("create_bet", |state, receipts| {
            state.ensure_running()?;
            let token = state.token(&new_bet.asset)?;
            if !token.is_enabled() {
                return Err(BetError::ForbiddenAsset(new_bet.asset).into());
            }

            let bet_id = state.bets.next_id()?;

            let mut seen = BTreeSet::new();
            for opponent in &new_bet.opponents {
                if opponent.is_zero() {
                    return Err(BetError::InvalidAddress.into());
                }
                if *opponent == ctx.caller || !seen.insert(*opponent) {
                    return Err(BetError::InvalidOpponent {
                        bet_id,
                        address: *opponent,
                    }
                    .into());
                }
            }

            let count = item_count(&new_bet.items);
            if count > state.admin.max_item_prizes {
                return Err(BetError::TooManyItems {
                    count,
                    max: state.admin.max_item_prizes,
                }
                .into());
            }
            if new_bet.items.iter().any(|prize| prize.collection.is_zero()) {
                return Err(BetError::InvalidAddress.into());
            }

            let mut bet = Bet {
                id: bet_id,
                asset: new_bet.asset,
                resolved: false,
                canceled: false,
                refunded: false,
                house_edge: token.house_edge,
                opponents: new_bet.opponents,
                seats: vec![ctx.caller],
                request_id: None,
                requested_at: None,
                amount: new_bet.amount,
                pot: 0,
                payout: 0,
                created_at: self.clock.now(),
            };

            let max_seats = self.game.max_seats(&bet);
            if bet.opponents.len() + 1 > max_seats {
                return Err(BetError::TooManySeats {
                    bet_id,
                    current: 1,
                    requested: bet.opponents.len(),
                    max: max_seats,
                }
                .into());
            }

            bet.pot = self.collect_buy_in(receipts, &ctx, &bet.asset, bet.amount, 0)?;

            for prize in &new_bet.items {
                for item_id in &prize.token_ids {
                    self.transfers.collect_item(&prize.collection, &ctx.caller, *item_id)?;
                    receipts.0.push(Receipt::Item {
                        collection: prize.collection,
                        from: ctx.caller,
                        item_id: *item_id,
                    });
                }
            }

            let lots = new_bet.items.into_iter().map(PrizeLot::new).collect();
            let event = WagerEvent::BetCreated {
                bet_id,
                asset: bet.asset,
                initiator: ctx.caller,
                amount: bet.amount,
                opponents: bet.opponents.clone(),
                item_count: count,
            };
            tracing::info!(bet_id, asset = %bet.asset, amount = bet.amount, items = count, "bet created");
            state.bets.insert(bet, lots);

            EngineMetrics::incr(&self.metrics.bets_created);
            Ok(Outcome::new(bet_id).touching(bet_id).event(event))
        })
    }

    /// Buys `seat_count` seats; launches the bet when the table is full or
    /// every listed opponent has played. Returns the request handle if the
    /// join launched the bet.
    pub fn join_seats(&self, ctx: CallContext, bet_id: BetId, seat_count: usize) -> WagerResult<Option<RequestId>> {
        self.transition("join_seats", |state, receipts| {
            state.ensure_running()?;
            let mut bet = state.bets.open(bet_id)?;
            if seat_count == 0 {
                return Err(BetError::InvalidSeatCount.into());
            }

            let current = bet.seats.len();
            let max = self.game.max_seats(&bet);
            let total = current
                .checked_add(seat_count)
                .filter(|total| *total <= max)
                .ok_or(BetError::TooManySeats {
                    bet_id,
                    current,
                    requested: seat_count,
                    max,
                })?;

            if bet.is_restricted()
                && (!bet.is_opponent(&ctx.caller) || state.bets.has_played(bet_id, &ctx.caller))
            {
                return Err(BetError::InvalidOpponent {
                    bet_id,
                    address: ctx.caller,
                }
                .into());
            }

            let launches = total == max
                || (bet.is_restricted() && state.bets.all_opponents_played(&bet, &ctx.caller));
            let launch_cost = if launches {
                Self::launch_cost(state, &bet.asset)?
            } else {
                0
            };

            let buy_in = bet
                .amount
                .checked_mul(seat_count as Amount)
                .ok_or(BetError::WrongBetAmount {
                    expected: Amount::MAX,
                    actual: ctx.value,
                })?;
            let received = self.collect_buy_in(receipts, &ctx, &bet.asset, buy_in, launch_cost)?;

            bet.seats.extend(std::iter::repeat(ctx.caller).take(seat_count));
            bet.pot += received;

            let mut outcome = Outcome::new(None).touching(bet_id).event(WagerEvent::SeatsJoined {
                bet_id,
                player: ctx.caller,
                seats: seat_count,
                received,
            });

            if launches && self.game.is_ready(&bet) {
                let request_id = self.request_randomness(state, &mut bet)?;
                if let Some(token) = state.tokens.get_mut(&bet.asset) {
                    token.vrf_fees += launch_cost;
                }
                outcome.value = Some(request_id);
                if let Some(event) = Self::launched_event(&bet) {
                    outcome = outcome.event(event);
                }
                EngineMetrics::incr(&self.metrics.bets_launched);
                tracing::info!(bet_id, request_id, seats = bet.seats.len(), pot = bet.pot, "bet launched");
            } else if launches {
                return Err(BetError::NotFulfilled(bet_id).into());
            }

            if bet.is_restricted() {
                state.bets.mark_played(bet_id, ctx.caller);
            }
            tracing::debug!(bet_id, player = %ctx.caller, seat_count, received, "seats joined");
            state.bets.put(bet);

            EngineMetrics::add(&self.metrics.seats_joined, seat_count as u64);
            Ok(outcome)
        })
    }

    /// Requests randomness for a bet that has enough seats
    pub fn launch(&self, ctx: CallContext, bet_id: BetId) -> WagerResult<RequestId> {
        self.transition("launch", |state, receipts| {
            state.ensure_running()?;
            let mut bet = state.bets.open(bet_id)?;

            let required = self.game.min_seats().max(2);
            if bet.seats.len() < required {
                return Err(BetError::WrongSeatsNumber {
                    bet_id,
                    seats: bet.seats.len(),
                    required,
                }
                .into());
            }
            if !self.game.is_ready(&bet) {
                return Err(BetError::NotFulfilled(bet_id).into());
            }

            let cost = Self::launch_cost(state, &bet.asset)?;
            self.collect_value(receipts, &ctx, cost)?;

            let request_id = self.request_randomness(state, &mut bet)?;
            if let Some(token) = state.tokens.get_mut(&bet.asset) {
                token.vrf_fees += cost;
            }

            let mut outcome = Outcome::new(request_id).touching(bet_id);
            if let Some(event) = Self::launched_event(&bet) {
                outcome = outcome.event(event);
            }
            tracing::info!(bet_id, request_id, seats = bet.seats.len(), pot = bet.pot, "bet launched");
            state.bets.put(bet);

            EngineMetrics::incr(&self.metrics.bets_launched);
            Ok(outcome)
        })
    }

    /// Closes a bet nobody joined; the pot and items go back to the creator
    pub fn cancel(&self, ctx: CallContext, bet_id: BetId) -> WagerResult<()> {
        self.transition("cancel", |state, _| {
            let mut bet = state.bets.unresolved(bet_id)?;
            if bet.seats.len() != 1 || bet.is_in_flight() {
                return Err(BetError::NotFulfilled(bet_id).into());
            }
            let initiator = bet.initiator();
            if ctx.caller != initiator && !state.admin.is_admin(&ctx.caller) {
                return Err(BetError::AccessDenied(ctx.caller).into());
            }

            bet.resolved = true;
            bet.canceled = true;
            bet.payout = bet.pot;
            state.payouts.credit(initiator, bet.asset, bet.pot);

            let mut lots = state.bets.lots(bet_id).to_vec();
            return_items(&mut lots, initiator);
            state.bets.set_lots(bet_id, lots);
            state.bets.clear_played(bet_id);

            let event = WagerEvent::BetCanceled {
                bet_id,
                by: ctx.caller,
                pot: bet.pot,
            };
            tracing::info!(bet_id, by = %ctx.caller, pot = bet.pot, "bet canceled");
            state.bets.put(bet);

            EngineMetrics::incr(&self.metrics.bets_canceled);
            Ok(Outcome::new(()).touching(bet_id).event(event))
        })
    }

    /// Returns the pot of a bet whose randomness never arrived
    pub fn refund(&self, ctx: CallContext, bet_id: BetId) -> WagerResult<()> {
        self.transition("refund", |state, _| {
            let mut bet = state.bets.unresolved(bet_id)?;
            let now = self.clock.now();
            if bet.seats.len() < 2 || !is_timed_out(&bet, now, self.refund_cooldown_secs) {
                return Err(BetError::NotFulfilled(bet_id).into());
            }
            let initiator = bet.initiator();
            if ctx.caller != initiator && !state.admin.is_admin(&ctx.caller) {
                return Err(BetError::AccessDenied(ctx.caller).into());
            }

            let per_seat = bet.pot / bet.seats.len() as Amount;
            for seat in &bet.seats {
                state.payouts.credit(*seat, bet.asset, per_seat);
            }
            bet.resolved = true;
            bet.refunded = true;
            bet.payout = per_seat * bet.seats.len() as Amount;

            if let Some(request_id) = bet.request_id {
                state.randomness.consume(request_id);
            }
            let mut lots = state.bets.lots(bet_id).to_vec();
            return_items(&mut lots, initiator);
            state.bets.set_lots(bet_id, lots);
            state.bets.clear_played(bet_id);

            let event = WagerEvent::BetRefunded {
                bet_id,
                by: ctx.caller,
                per_seat,
            };
            tracing::info!(bet_id, by = %ctx.caller, per_seat, seats = bet.seats.len(), "bet refunded");
            state.bets.put(bet);

            EngineMetrics::incr(&self.metrics.bets_refunded);
            Ok(Outcome::new(()).touching(bet_id).event(event))
        })
    }

    // ----- Randomness Coordinator -----

    /// Resolves the bet behind `request_id` with the oracle output
    pub fn on_random_fulfilled(&self, request_id: RequestId, random: RandomValue) -> WagerResult<()> {
        self.transition("on_random_fulfilled", |state, _| {
            let bet_id = match state.randomness.bet_for(request_id) {
                Some(bet_id) => bet_id,
                None => {
                    return Err(match state.randomness.settled_bet(request_id) {
                        Some(bet_id) => BetError::NotPendingBet(bet_id),
                        None => BetError::UnknownRequest(request_id),
                    }
                    .into())
                }
            };
            let mut bet = state.bets.unresolved(bet_id)?;
            let token = state.token(&bet.asset)?;

            let winners = self.game.winners(&bet, &random);
            let settlement = settle_pot(bet.pot, bet.house_edge, winners);
            let Some(settings) = self.registry.token_settings(&bet.asset) else {
                tracing::warn!(bet_id, asset = %bet.asset, "registry has no split for asset, fulfillment refused");
                return Err(BetError::ForbiddenAsset(bet.asset).into());
            };
            let ratios = settings.split;

            // Nothing below can fail
            state.randomness.consume(request_id);

            let mut token = token;
            let shares = FeeAllocator::allocate(
                &mut token,
                &mut state.payouts,
                bet.asset,
                settlement.fee,
                &ratios,
                bet.initiator(),
            );
            state.tokens.insert(bet.asset, token);

            for winner in &settlement.winners {
                state.payouts.credit(*winner, bet.asset, settlement.per_winner);
            }

            let mut lots = state.bets.lots(bet_id).to_vec();
            assign_items(&mut lots, &bet.seats, &random);
            state.bets.set_lots(bet_id, lots);
            state.bets.clear_played(bet_id);

            bet.resolved = true;
            bet.payout = settlement.payout;

            tracing::info!(
                bet_id,
                request_id,
                winners = settlement.winners.len(),
                payout = settlement.payout,
                fee = settlement.fee,
                dust = settlement.dust(),
                "bet resolved"
            );
            let outcome = Outcome::new(())
                .touching(bet_id)
                .event(WagerEvent::BetResolved {
                    bet_id,
                    random,
                    winners: settlement.winners.clone(),
                    payout: settlement.payout,
                    fee: settlement.fee,
                })
                .event(WagerEvent::HouseEdgeDistributed {
                    bet_id,
                    asset: bet.asset,
                    shares,
                });
            state.bets.put(bet);

            EngineMetrics::incr(&self.metrics.bets_resolved);
            Ok(outcome)
        })
    }

    /// Feeds oracle responses into the engine until the channel closes
    pub async fn run_fulfillments(self: Arc<Self>, mut fulfillments: mpsc::UnboundedReceiver<RandomnessFulfillment>) {
        while let Some(fulfillment) = fulfillments.recv().await {
            if let Err(e) = self.on_random_fulfilled(fulfillment.request_id, fulfillment.random) {
                tracing::warn!(request_id = fulfillment.request_id, error = %e, "fulfillment not applied");
            }
        }
        tracing::info!("fulfillment channel closed");
    }

    // ----- Payout Ledger -----

    /// Pays out everything `user` is owed in `asset`. Anyone may trigger
    /// it; the funds only go to `user`.
    pub fn claim(&self, user: Address, asset: Asset) -> WagerResult<Amount> {
        let claimed = self.pay_out(
            "claim",
            &[],
            |state| {
                let amount = state.payouts.take(&user, &asset);
                Ok((amount > 0).then_some(amount))
            },
            |amount| self.send(&asset, &user, *amount),
            |state, amount| state.payouts.credit(user, asset, *amount),
        )?;

        let Some(amount) = claimed else {
            return Ok(0);
        };
        EngineMetrics::incr(&self.metrics.claims_total);
        tracing::info!(%user, %asset, amount, "payout claimed");
        let _ = self.events.send(WagerEvent::PayoutClaimed { user, asset, amount });
        Ok(amount)
    }

    /// Claims every asset the engine knows about; returns the non-zero ones
    pub fn claim_all(&self, user: Address) -> WagerResult<Vec<(Asset, Amount)>> {
        let mut assets: BTreeSet<Asset> = self.registry.list_assets().into_iter().collect();
        self.guard.read(|state| {
            assets.extend(state.tokens.keys().copied());
            assets.extend(state.payouts.balances_of(&user).into_iter().map(|(asset, _)| asset));
        })?;

        let mut claimed = Vec::new();
        for asset in assets {
            let amount = self.claim(user, asset)?;
            if amount > 0 {
                claimed.push((asset, amount));
            }
        }
        Ok(claimed)
    }

    /// Delivers one item prize of a terminated bet. `None` if it was
    /// already delivered.
    pub fn claim_item(&self, bet_id: BetId, lot_index: usize, item_id: u64) -> WagerResult<Option<ItemTransfer>> {
        let transfer = self.pay_out(
            "claim_item",
            &[bet_id],
            |state| {
                let bet = state.bets.get(bet_id).ok_or(BetError::UnknownBet(bet_id))?;
                if !bet.resolved {
                    return Err(BetError::NotPendingBet(bet_id).into());
                }
                let unknown = BetError::UnknownItem {
                    bet_id,
                    lot_index,
                    item_id,
                };
                let lot = state.bets.lots(bet_id).get(lot_index).ok_or(unknown.clone())?;
                let to = lot.destination(item_id).ok_or(unknown)?;
                let collection = lot.collection;

                if !state.item_claims.mark(bet_id, collection, item_id) {
                    return Ok(None);
                }
                Ok(Some(ItemTransfer {
                    bet_id,
                    collection,
                    item_id,
                    to,
                }))
            },
            |transfer| self.transfers.send_item(&transfer.collection, &transfer.to, transfer.item_id),
            |state, transfer| state.item_claims.unmark(transfer.bet_id, transfer.collection, transfer.item_id),
        )?;

        if let Some(transfer) = &transfer {
            EngineMetrics::incr(&self.metrics.item_claims_total);
            tracing::info!(bet_id, collection = %transfer.collection, item_id, to = %transfer.to, "item claimed");
            let _ = self.events.send(WagerEvent::ItemClaimed {
                bet_id,
                collection: transfer.collection,
                item_id,
                to: transfer.to,
            });
        }
        Ok(transfer)
    }

    /// Delivers every undelivered item of a bet
    pub fn claim_all_items(&self, bet_id: BetId) -> WagerResult<Vec<ItemTransfer>> {
        let lots = self.prize_lots(bet_id)?;
        let mut delivered = Vec::new();
        for (lot_index, lot) in lots.iter().enumerate() {
            for item_id in &lot.token_ids {
                if let Some(transfer) = self.claim_item(bet_id, lot_index, *item_id)? {
                    delivered.push(transfer);
                }
            }
        }
        Ok(delivered)
    }

    /// Sends the treasury and team buckets of `asset` to their destinations
    pub fn withdraw_house_edge(&self, asset: Asset) -> WagerResult<(Amount, Amount)> {
        let (treasury, team) = self.registry.treasury_and_team();
        if treasury.is_zero() || team.is_zero() {
            return Err(BetError::InvalidAddress.into());
        }

        let treasury_amount = self
            .pay_out(
                "withdraw_treasury",
                &[],
                |state| {
                    let token = state.tokens.get_mut(&asset).ok_or(BetError::ForbiddenAsset(asset))?;
                    let amount = std::mem::take(&mut token.split.treasury);
                    Ok((amount > 0).then_some(amount))
                },
                |amount| self.send(&asset, &treasury, *amount),
                |state, amount| {
                    if let Some(token) = state.tokens.get_mut(&asset) {
                        token.split.treasury += *amount;
                    }
                },
            )?
            .unwrap_or(0);

        let team_amount = self
            .pay_out(
                "withdraw_team",
                &[],
                |state| {
                    let token = state.tokens.get_mut(&asset).ok_or(BetError::ForbiddenAsset(asset))?;
                    let amount = std::mem::take(&mut token.split.team);
                    Ok((amount > 0).then_some(amount))
                },
                |amount| self.send(&asset, &team, *amount),
                |state, amount| {
                    if let Some(token) = state.tokens.get_mut(&asset) {
                        token.split.team += *amount;
                    }
                },
            )?
            .unwrap_or(0);

        tracing::info!(%asset, treasury = treasury_amount, team = team_amount, "house edge withdrawn");
        let _ = self.events.send(WagerEvent::HouseEdgeWithdrawn {
            asset,
            treasury: treasury_amount,
            team: team_amount,
        });
        Ok((treasury_amount, team_amount))
    }

    /// Sends the dividend bucket of `asset` to the harvester
    pub fn harvest_dividends(&self, ctx: CallContext, asset: Asset) -> WagerResult<Amount> {
        let harvested = self.pay_out(
            "harvest_dividends",
            &[],
            |state| {
                if state.admin.harvester != Some(ctx.caller) {
                    return Err(BetError::AccessDenied(ctx.caller).into());
                }
                let token = state.tokens.get_mut(&asset).ok_or(BetError::ForbiddenAsset(asset))?;
                let amount = std::mem::take(&mut token.split.dividend);
                Ok((amount > 0).then_some(amount))
            },
            |amount| self.send(&asset, &ctx.caller, *amount),
            |state, amount| {
                if let Some(token) = state.tokens.get_mut(&asset) {
                    token.split.dividend += *amount;
                }
            },
        )?
        .unwrap_or(0);

        if harvested > 0 {
            tracing::info!(%asset, amount = harvested, "dividends harvested");
            let _ = self.events.send(WagerEvent::DividendsHarvested {
                asset,
                to: ctx.caller,
                amount: harvested,
            });
        }
        Ok(harvested)
    }

    /// Sends the native randomness fees collected for `asset` to the treasury
    pub fn withdraw_randomness_fees(&self, ctx: CallContext, asset: Asset) -> WagerResult<Amount> {
        let (treasury, _) = self.registry.treasury_and_team();
        if treasury.is_zero() {
            return Err(BetError::InvalidAddress.into());
        }

        let withdrawn = self
            .pay_out(
                "withdraw_randomness_fees",
                &[],
                |state| {
                    state.ensure_admin(&ctx.caller)?;
                    let token = state.tokens.get_mut(&asset).ok_or(BetError::ForbiddenAsset(asset))?;
                    let amount = std::mem::take(&mut token.vrf_fees);
                    Ok((amount > 0).then_some(amount))
                },
                |amount| self.transfers.send_native(&treasury, *amount),
                |state, amount| {
                    if let Some(token) = state.tokens.get_mut(&asset) {
                        token.vrf_fees += *amount;
                    }
                },
            )?
            .unwrap_or(0);

        if withdrawn > 0 {
            let _ = self.events.send(WagerEvent::RandomnessFeesWithdrawn {
                asset,
                to: treasury,
                amount: withdrawn,
            });
        }
        Ok(withdrawn)
    }

    // ----- Administration -----

    fn admin_transition(
        &self,
        op: &'static str,
        ctx: CallContext,
        f: impl FnOnce(&mut LedgerState) -> WagerResult<Option<WagerEvent>>,
    ) -> WagerResult<()> {
        self.transition(op, |state, _| {
            state.ensure_admin(&ctx.caller)?;
            let event = f(state)?;
            tracing::info!(op, by = %ctx.caller, "admin setting changed");
            let outcome = Outcome::new(());
            Ok(match event {
                Some(event) => outcome.event(event),
                None => outcome,
            })
        })
    }

    pub fn pause(&self, ctx: CallContext) -> WagerResult<()> {
        self.admin_transition("pause", ctx, |state| {
            state.admin.paused = true;
            Ok(Some(WagerEvent::Paused))
        })
    }

    pub fn unpause(&self, ctx: CallContext) -> WagerResult<()> {
        self.admin_transition("unpause", ctx, |state| {
            state.admin.paused = false;
            Ok(Some(WagerEvent::Unpaused))
        })
    }

    /// Sets the house edge for new bets; zero disables the asset
    pub fn set_house_edge(&self, ctx: CallContext, asset: Asset, house_edge: u16) -> WagerResult<()> {
        self.admin_transition("set_house_edge", ctx, |state| {
            if house_edge as u128 > BPS_DENOMINATOR {
                return Err(ConfigurationError::InvalidValue {
                    field: "house_edge".to_string(),
                    value: house_edge.to_string(),
                    reason: "cannot exceed 10000 bps".to_string(),
                }
                .into());
            }
            state.tokens.entry(asset).or_default().house_edge = house_edge;
            Ok(None)
        })
    }

    pub fn set_callback_gas(&self, ctx: CallContext, asset: Asset, callback_gas: u32) -> WagerResult<()> {
        self.admin_transition("set_callback_gas", ctx, |state| {
            if callback_gas == 0 {
                return Err(ConfigurationError::InvalidValue {
                    field: "callback_gas".to_string(),
                    value: "0".to_string(),
                    reason: "must be > 0".to_string(),
                }
                .into());
            }
            state.tokens.entry(asset).or_default().callback_gas = callback_gas;
            Ok(None)
        })
    }

    pub fn set_harvester(&self, ctx: CallContext, harvester: Address) -> WagerResult<()> {
        self.admin_transition("set_harvester", ctx, |state| {
            if harvester.is_zero() {
                return Err(BetError::InvalidAddress.into());
            }
            state.admin.harvester = Some(harvester);
            Ok(None)
        })
    }

    pub fn set_max_item_prizes(&self, ctx: CallContext, max_item_prizes: usize) -> WagerResult<()> {
        self.admin_transition("set_max_item_prizes", ctx, |state| {
            state.admin.max_item_prizes = max_item_prizes;
            Ok(None)
        })
    }

    pub fn set_randomness_config(&self, ctx: CallContext, config: RandomnessConfig) -> WagerResult<()> {
        self.admin_transition("set_randomness_config", ctx, |state| {
            config.validate()?;
            state.randomness.set_config(config);
            Ok(None)
        })
    }

    /// Grants or revokes the administrator role
    pub fn set_admin(&self, ctx: CallContext, address: Address, enabled: bool) -> WagerResult<()> {
        self.admin_transition("set_admin", ctx, |state| {
            if address.is_zero() {
                return Err(BetError::InvalidAddress.into());
            }
            if enabled {
                state.admin.admins.insert(address);
            } else {
                let last = state.admin.admins.len() == 1 && state.admin.is_admin(&address);
                if last {
                    return Err(ConfigurationError::MissingRequired("administrator".to_string()).into());
                }
                state.admin.admins.remove(&address);
            }
            Ok(None)
        })
    }

    // ----- Read surface -----

    pub fn bet(&self, bet_id: BetId) -> WagerResult<Bet> {
        self.guard
            .read(|state| state.bets.get(bet_id).cloned())?
            .ok_or_else(|| BetError::UnknownBet(bet_id).into())
    }

    /// Up to `limit` bets, newest first
    pub fn recent_bets(&self, limit: usize) -> WagerResult<Vec<Bet>> {
        Ok(self.guard.read(|state| state.bets.recent(limit).cloned().collect())?)
    }

    pub fn prize_lots(&self, bet_id: BetId) -> WagerResult<Vec<PrizeLot>> {
        self.guard
            .read(|state| state.bets.get(bet_id).map(|_| state.bets.lots(bet_id).to_vec()))?
            .ok_or_else(|| BetError::UnknownBet(bet_id).into())
    }

    /// Seat capacity of a bet under the running game
    pub fn max_seats(&self, bet_id: BetId) -> WagerResult<usize> {
        let bet = self.bet(bet_id)?;
        Ok(self.game.max_seats(&bet))
    }

    pub fn last_bet_id(&self) -> WagerResult<BetId> {
        Ok(self.guard.read(|state| state.bets.last_id())?)
    }

    pub fn randomness_config(&self) -> WagerResult<RandomnessConfig> {
        Ok(self.guard.read(|state| state.randomness.config().clone())?)
    }

    pub fn token_config(&self, asset: &Asset) -> WagerResult<TokenConfig> {
        Ok(self.guard.read(|state| state.token(asset))??)
    }

    pub fn payout_balance(&self, user: &Address, asset: &Asset) -> WagerResult<Amount> {
        Ok(self.guard.read(|state| state.payouts.balance(user, asset))?)
    }

    pub fn payout_balances(&self, user: &Address) -> WagerResult<Vec<(Asset, Amount)>> {
        Ok(self.guard.read(|state| state.payouts.balances_of(user))?)
    }

    pub fn is_item_claimed(&self, bet_id: BetId, collection: &Address, item_id: u64) -> WagerResult<bool> {
        Ok(self
            .guard
            .read(|state| state.item_claims.is_claimed(bet_id, *collection, item_id))?)
    }

    /// In-flight bets whose refund window has opened
    pub fn refundable_bets(&self) -> WagerResult<Vec<BetId>> {
        let now = self.clock.now();
        Ok(self.guard.read(|state| {
            state
                .bets
                .in_flight()
                .filter(|bet| bet.seats.len() >= 2 && is_timed_out(bet, now, self.refund_cooldown_secs))
                .map(|bet| bet.id)
                .collect()
        })?)
    }

    /// Highest randomness handle the ledger has seen
    pub fn last_request_id(&self) -> WagerResult<RequestId> {
        Ok(self.guard.read(|state| state.randomness.last_request_id())?)
    }

    pub fn is_paused(&self) -> WagerResult<bool> {
        Ok(self.guard.read(|state| state.admin.paused)?)
    }

    /// Copy of the whole ledger
    pub fn snapshot(&self) -> WagerResult<LedgerState> {
        Ok(self.guard.read(LedgerState::clone)?)
    }
}
