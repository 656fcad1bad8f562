//! Ledger persistence across restarts
//!
//! A bet launched before a restart must still resolve afterwards, its
//! retired handle must stay retired, and the bet archive must list it.

use std::sync::Arc;
use tempfile::TempDir;
use wagerpool::{
    bank::InMemoryBank,
    common::traits::ManualClock,
    config::WagerConfig,
    engine::{Collaborators, NewBet, WagerEngine},
    games::{CoinToss, VrfOracle},
    registry::StaticTokenRegistry,
    storage::LedgerStorage,
    Address, Asset, BetError, BetStatus, CallContext, ItemPrize,
};

fn addr(n: u64) -> Address {
    Address::from_low_u64(n)
}

fn open_engine(dir: &TempDir, bank: Arc<InMemoryBank>, oracle: Arc<VrfOracle>) -> WagerEngine {
    let config = WagerConfig::development();
    let storage = LedgerStorage::open_path(dir.path()).unwrap();
    let collaborators = Collaborators {
        registry: Arc::new(StaticTokenRegistry::from_config(&config.tokens, &config.admin)),
        oracle,
        transfers: bank,
        clock: Arc::new(ManualClock::new(1_700_000_000)),
    };
    WagerEngine::restore(&config, Arc::new(CoinToss), collaborators, storage).unwrap()
}

#[test]
fn test_ledger_survives_restart() {
    let dir = TempDir::new().unwrap();
    let bank = Arc::new(InMemoryBank::new(addr(0xe5c)));
    bank.mint_native(addr(1), 1_000);
    bank.mint_native(addr(2), 1_000);

    // Phase 1: launch a bet, then shut down before the oracle answers
    let first_oracle = Arc::new(VrfOracle::from_seed(&[9u8; 32]).unwrap());
    let (bet_id, request_id) = {
        let engine = open_engine(&dir, bank.clone(), first_oracle.clone());
        let bet_id = engine
            .create_bet(
                CallContext::new(addr(1)).with_value(100),
                NewBet {
                    asset: Asset::Native,
                    amount: 100,
                    ..Default::default()
                },
            )
            .unwrap();
        let request_id = engine
            .join_seats(CallContext::new(addr(2)).with_value(100), bet_id, 1)
            .unwrap()
            .unwrap();
        (bet_id, request_id)
    };
    let bundle = first_oracle.fulfill(request_id).unwrap();

    // Phase 2: restore and deliver the answer
    let second_oracle = Arc::new(VrfOracle::from_seed(&[9u8; 32]).unwrap());
    {
        let engine = open_engine(&dir, bank.clone(), second_oracle.clone());
        assert_eq!(engine.last_bet_id().unwrap(), bet_id);
        assert_eq!(engine.last_request_id().unwrap(), request_id);

        let bet = engine.bet(bet_id).unwrap();
        assert_eq!(bet.pot, 200);
        assert_eq!(bet.request_id, Some(request_id));

        engine.on_random_fulfilled(request_id, bundle.output).unwrap();
        assert!(engine.bet(bet_id).unwrap().resolved);

        // Next launch must not reuse the retired handle
        second_oracle.resume_after(engine.last_request_id().unwrap());
        let next = engine
            .create_bet(
                CallContext::new(addr(1)).with_value(100),
                NewBet {
                    asset: Asset::Native,
                    amount: 100,
                    ..Default::default()
                },
            )
            .unwrap();
        let next_request = engine
            .join_seats(CallContext::new(addr(2)).with_value(100), next, 1)
            .unwrap()
            .unwrap();
        assert!(next_request > request_id);
    }

    // Phase 3: the retired handle stays retired, the archive lists both bets
    {
        let engine = open_engine(&dir, bank.clone(), Arc::new(VrfOracle::new_random()));
        let err = engine.on_random_fulfilled(request_id, bundle.output).unwrap_err();
        assert_eq!(err.bet_error(), Some(&BetError::NotPendingBet(bet_id)));

        let owed: u128 = [addr(1), addr(2)]
            .iter()
            .map(|p| engine.payout_balance(p, &Asset::Native).unwrap())
            .sum();
        assert_eq!(owed, 196);
    }

    let storage = LedgerStorage::open_path(dir.path()).unwrap();
    let records = storage.recent_bets(10).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].bet.id, bet_id + 1);
    assert_eq!(records[0].status, BetStatus::AwaitingRandomness);
    assert_eq!(records[1].status, BetStatus::Resolved);
    assert_eq!(storage.load_bet(bet_id).unwrap().unwrap().bet.payout, 196);
}

#[test]
fn test_fresh_directory_starts_from_config() {
    let dir = TempDir::new().unwrap();
    let bank = Arc::new(InMemoryBank::new(addr(0xe5c)));
    let engine = open_engine(&dir, bank, Arc::new(VrfOracle::new_random()));

    assert_eq!(engine.last_bet_id().unwrap(), 0);
    assert!(!engine.is_paused().unwrap());
    assert_eq!(engine.token_config(&Asset::Native).unwrap().house_edge, 200);
}

#[test]
fn test_bets_and_delivered_items_rebuilt_from_records() {
    let dir = TempDir::new().unwrap();
    let bank = Arc::new(InMemoryBank::new(addr(0xe5c)));
    let collection = addr(0xc0);
    bank.mint_native(addr(1), 1_000);
    bank.mint_native(addr(2), 1_000);
    bank.mint_item(collection, 1, addr(1));
    bank.mint_item(collection, 2, addr(1));

    let oracle = Arc::new(VrfOracle::from_seed(&[4u8; 32]).unwrap());
    let (bet_id, delivered) = {
        let engine = open_engine(&dir, bank.clone(), oracle.clone());
        let bet_id = engine
            .create_bet(
                CallContext::new(addr(1)).with_value(10),
                NewBet {
                    asset: Asset::Native,
                    amount: 10,
                    items: vec![ItemPrize {
                        collection,
                        token_ids: vec![1, 2],
                    }],
                    ..Default::default()
                },
            )
            .unwrap();
        engine
            .join_seats(CallContext::new(addr(2)).with_value(10), bet_id, 1)
            .unwrap();
        for bundle in oracle.fulfill_all() {
            engine.on_random_fulfilled(bundle.request_id, bundle.output).unwrap();
        }
        let delivered = engine.claim_item(bet_id, 0, 1).unwrap().unwrap();
        (bet_id, delivered)
    };

    let header_len = {
        let storage = LedgerStorage::open_path(dir.path()).unwrap();
        let header: serde_json::Value = storage.load_snapshot().unwrap().unwrap();
        assert!(header["bets"].get("bets").is_none());
        assert_eq!(storage.load_bet(bet_id).unwrap().unwrap().claimed_items, vec![(collection, 1)]);
        serde_json::to_vec(&header).unwrap().len()
    };

    let engine = open_engine(&dir, bank.clone(), Arc::new(VrfOracle::new_random()));
    let bet = engine.bet(bet_id).unwrap();
    assert!(bet.resolved);
    assert_eq!(engine.prize_lots(bet_id).unwrap()[0].to.len(), 2);
    assert!(engine.is_item_claimed(bet_id, &collection, 1).unwrap());
    assert_eq!(engine.claim_item(bet_id, 0, 1).unwrap(), None);
    assert_eq!(bank.item_owner(&collection, 1), Some(delivered.to));

    let second = engine.claim_item(bet_id, 0, 2).unwrap().unwrap();
    assert_eq!(bank.item_owner(&collection, 2), Some(second.to));

    // More bets leave the header size alone
    for _ in 0..5 {
        engine
            .create_bet(
                CallContext::new(addr(2)).with_value(10),
                NewBet {
                    asset: Asset::Native,
                    amount: 10,
                    ..Default::default()
                },
            )
            .unwrap();
    }
    drop(engine);
    let storage = LedgerStorage::open_path(dir.path()).unwrap();
    let header: serde_json::Value = storage.load_snapshot().unwrap().unwrap();
    assert!(serde_json::to_vec(&header).unwrap().len() <= header_len + 16);
    assert_eq!(storage.all_bets().unwrap().len(), 6);
}
