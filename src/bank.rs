//! In-memory asset transfer substrate
//!
//! Holds native balances, token balances and item ownership for every
//! account plus the engine's escrow account. Tokens may charge a transfer
//! fee (in bps of the amount moved, burned), and recipients can be set to
//! reject incoming transfers.

use crate::common::traits::AssetTransfer;
use crate::common::types::{apply_bps, Address, Amount, Asset};
use crate::errors::TransferError;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Books {
    native: HashMap<Address, Amount>,
    tokens: HashMap<(Address, Address), Amount>,
    items: HashMap<(Address, u64), Address>,
    transfer_fee_bps: HashMap<Address, u16>,
    rejecting: HashSet<Address>,
}

impl Books {
    fn debit(&mut self, asset: Asset, holder: &Address, amount: Amount) -> Result<(), TransferError> {
        let balance = match asset {
            Asset::Native => self.native.entry(*holder).or_insert(0),
            Asset::Token(token) => self.tokens.entry((token, *holder)).or_insert(0),
        };
        if *balance < amount {
            return Err(TransferError::InsufficientBalance {
                holder: *holder,
                asset,
                needed: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        Ok(())
    }

    fn credit(&mut self, asset: Asset, holder: &Address, amount: Amount) {
        let balance = match asset {
            Asset::Native => self.native.entry(*holder).or_insert(0),
            Asset::Token(token) => self.tokens.entry((token, *holder)).or_insert(0),
        };
        *balance += amount;
    }

    fn check_recipient(&self, to: &Address) -> Result<(), TransferError> {
        if self.rejecting.contains(to) {
            return Err(TransferError::Rejected(*to));
        }
        Ok(())
    }

    fn move_token(&mut self, token: &Address, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
        self.check_recipient(to)?;
        let fee = self
            .transfer_fee_bps
            .get(token)
            .map_or(0, |bps| apply_bps(amount, *bps));
        self.debit(Asset::Token(*token), from, amount)?;
        self.credit(Asset::Token(*token), to, amount - fee);
        Ok(())
    }

    fn move_item(&mut self, collection: &Address, from: &Address, to: &Address, item_id: u64) -> Result<(), TransferError> {
        self.check_recipient(to)?;
        match self.items.get_mut(&(*collection, item_id)) {
            Some(owner) if owner == from => {
                *owner = *to;
                Ok(())
            }
            _ => Err(TransferError::ItemNotOwned {
                collection: *collection,
                item_id,
                holder: *from,
            }),
        }
    }
}

pub struct InMemoryBank {
    escrow: Address,
    books: Mutex<Books>,
}

impl InMemoryBank {
    /// Bank whose escrow account is `escrow`
    pub fn new(escrow: Address) -> Self {
        Self {
            escrow,
            books: Mutex::new(Books::default()),
        }
    }

    fn books(&self) -> MutexGuard<'_, Books> {
        self.books.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn escrow(&self) -> Address {
        self.escrow
    }

    pub fn mint_native(&self, to: Address, amount: Amount) {
        self.books().credit(Asset::Native, &to, amount);
    }

    pub fn mint_token(&self, token: Address, to: Address, amount: Amount) {
        self.books().credit(Asset::Token(token), &to, amount);
    }

    pub fn mint_item(&self, collection: Address, item_id: u64, to: Address) {
        self.books().items.insert((collection, item_id), to);
    }

    /// Makes every transfer of `token` burn `bps` of the amount
    pub fn set_transfer_fee(&self, token: Address, bps: u16) {
        self.books().transfer_fee_bps.insert(token, bps);
    }

    pub fn set_rejecting(&self, address: Address, rejecting: bool) {
        let mut books = self.books();
        if rejecting {
            books.rejecting.insert(address);
        } else {
            books.rejecting.remove(&address);
        }
    }

    pub fn balance(&self, holder: &Address, asset: &Asset) -> Amount {
        let books = self.books();
        match asset {
            Asset::Native => books.native.get(holder).copied().unwrap_or(0),
            Asset::Token(token) => books.tokens.get(&(*token, *holder)).copied().unwrap_or(0),
        }
    }

    pub fn item_owner(&self, collection: &Address, item_id: u64) -> Option<Address> {
        self.books().items.get(&(*collection, item_id)).copied()
    }
}

impl AssetTransfer for InMemoryBank {
    fn collect_native(&self, from: &Address, amount: Amount) -> Result<(), TransferError> {
        let mut books = self.books();
        books.debit(Asset::Native, from, amount)?;
        books.credit(Asset::Native, &self.escrow, amount);
        Ok(())
    }

    fn send_native(&self, to: &Address, amount: Amount) -> Result<(), TransferError> {
        let mut books = self.books();
        books.check_recipient(to)?;
        books.debit(Asset::Native, &self.escrow, amount)?;
        books.credit(Asset::Native, to, amount);
        Ok(())
    }

    fn escrow_token_balance(&self, token: &Address) -> Amount {
        self.balance(&self.escrow, &Asset::Token(*token))
    }

    fn collect_token(&self, token: &Address, from: &Address, amount: Amount) -> Result<(), TransferError> {
        self.books().move_token(token, from, &self.escrow, amount)
    }

    fn send_token(&self, token: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
        self.books().move_token(token, &self.escrow, to, amount)
    }

    fn collect_item(&self, collection: &Address, from: &Address, item_id: u64) -> Result<(), TransferError> {
        self.books().move_item(collection, from, &self.escrow, item_id)
    }

    fn send_item(&self, collection: &Address, to: &Address, item_id: u64) -> Result<(), TransferError> {
        self.books().move_item(collection, &self.escrow, to, item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn test_native_through_escrow() {
        let bank = InMemoryBank::new(addr(1000));
        bank.mint_native(addr(1), 50);

        bank.collect_native(&addr(1), 30).unwrap();
        assert_eq!(bank.balance(&addr(1000), &Asset::Native), 30);

        bank.send_native(&addr(2), 10).unwrap();
        assert_eq!(bank.balance(&addr(2), &Asset::Native), 10);

        let err = bank.collect_native(&addr(1), 21).unwrap_err();
        assert!(matches!(err, TransferError::InsufficientBalance { available: 20, .. }));
    }

    #[test]
    fn test_fee_on_transfer_token() {
        let bank = InMemoryBank::new(addr(1000));
        let token = addr(77);
        bank.mint_token(token, addr(1), 1_000);
        bank.set_transfer_fee(token, 100);

        bank.collect_token(&token, &addr(1), 1_000).unwrap();
        assert_eq!(bank.escrow_token_balance(&token), 990);
        assert_eq!(bank.balance(&addr(1), &Asset::Token(token)), 0);
    }

    #[test]
    fn test_items_move_only_from_owner() {
        let bank = InMemoryBank::new(addr(1000));
        let collection = addr(90);
        bank.mint_item(collection, 7, addr(1));

        assert!(bank.collect_item(&collection, &addr(2), 7).is_err());
        bank.collect_item(&collection, &addr(1), 7).unwrap();
        assert_eq!(bank.item_owner(&collection, 7), Some(addr(1000)));

        bank.send_item(&collection, &addr(3), 7).unwrap();
        assert_eq!(bank.item_owner(&collection, 7), Some(addr(3)));
    }

    #[test]
    fn test_rejecting_recipient() {
        let bank = InMemoryBank::new(addr(1000));
        bank.mint_native(addr(1000), 10);
        bank.set_rejecting(addr(4), true);

        assert_eq!(bank.send_native(&addr(4), 5), Err(TransferError::Rejected(addr(4))));
        assert_eq!(bank.balance(&addr(1000), &Asset::Native), 10);

        bank.set_rejecting(addr(4), false);
        bank.send_native(&addr(4), 5).unwrap();
    }
}
