//! Shared value types
//!
//! Addresses, assets and the identifiers that flow between the ledger, the
//! randomness coordinator and the transfer substrate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Denominator for every basis-point rate in the engine
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Bet identifier. `0` never names a bet.
pub type BetId = u32;

/// Handle returned by the randomness oracle for one request
pub type RequestId = u64;

/// Asset amount in the smallest unit of the asset
pub type Amount = u128;

/// Raw 32-byte output of the randomness oracle
pub type RandomValue = [u8; 32];

/// 20-byte account address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Address whose low 8 bytes hold `n` (handy for fixtures and simulations)
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Address(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| format!("Invalid address hex '{}': {}", s, e))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| format!("Address must be 20 bytes: '{}'", s))?;
        Ok(Address(array))
    }
}

impl TryFrom<String> for Address {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// Asset a bet is denominated in.
///
/// The zero address is the reserved identifier for the native asset, so
/// parsing it yields [`Asset::Native`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Asset {
    Native,
    Token(Address),
}

impl Asset {
    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }
}

impl Default for Asset {
    fn default() -> Self {
        Asset::Native
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Token(address) => write!(f, "{}", address),
        }
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("native") {
            return Ok(Asset::Native);
        }
        let address: Address = s.parse()?;
        if address.is_zero() {
            Ok(Asset::Native)
        } else {
            Ok(Asset::Token(address))
        }
    }
}

impl TryFrom<String> for Asset {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Asset> for String {
    fn from(asset: Asset) -> Self {
        asset.to_string()
    }
}

/// Identity and attached native value of whoever invokes a mutating call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    /// Native value sent along with the call
    pub value: Amount,
}

impl CallContext {
    pub fn new(caller: Address) -> Self {
        Self { caller, value: 0 }
    }

    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

/// `amount * bps / 10000`, rounded down
pub fn apply_bps(amount: Amount, bps: u16) -> Amount {
    amount.saturating_mul(bps as Amount) / BPS_DENOMINATOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip_through_string() {
        let address = Address::from_low_u64(0xbeef);
        let text = address.to_string();
        assert_eq!(text, "0x000000000000000000000000000000000000beef");
        assert_eq!(text.parse::<Address>().unwrap(), address);
    }

    #[test]
    fn test_zero_address_parses_as_native() {
        let asset: Asset = "0x0000000000000000000000000000000000000000".parse().unwrap();
        assert_eq!(asset, Asset::Native);
        assert_eq!("native".parse::<Asset>().unwrap(), Asset::Native);
    }

    #[test]
    fn test_asset_serializes_as_string() {
        let asset = Asset::Token(Address::from_low_u64(7));
        let json = serde_json::to_string(&asset).unwrap();
        assert_eq!(json, "\"0x0000000000000000000000000000000000000007\"");
        let back: Asset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, asset);
    }

    #[test]
    fn test_invalid_address_rejected() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("not-hex".parse::<Address>().is_err());
    }

    #[test]
    fn test_apply_bps_rounds_down() {
        assert_eq!(apply_bps(200, 200), 4);
        assert_eq!(apply_bps(4, 3000), 1);
        assert_eq!(apply_bps(4, 1000), 0);
    }
}
