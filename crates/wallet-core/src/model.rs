use crate::config::Rules;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::fmt;

pub type Amount = u64;
pub type Height = u64;
pub type Timestamp = u64;

pub const MAX_HEIGHT: Height = u64::MAX;

/// Correlates all messages and FSM state for one transfer. Generated by the
/// sender, shared with the receiver inside every envelope.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId([u8; 16]);

impl TxId {
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        TxId(bytes)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        TxId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The chain tip the wallet last reconciled against. Exactly one persists
/// in the keychain; `Default` is the pre-sync zero state.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize,
)]
pub struct SystemStateId {
    pub height: Height,
    pub hash: [u8; 32],
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum CoinStatus {
    Unconfirmed = 0,
    Unspent = 1,
    Locked = 2,
    Spent = 3,
}

impl fmt::Display for CoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoinStatus::Unconfirmed => "unconfirmed",
            CoinStatus::Unspent => "unspent",
            CoinStatus::Locked => "locked",
            CoinStatus::Spent => "spent",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyType {
    Regular = 0,
    Coinbase = 1,
    Commission = 2,
}

/// A tracked UTXO owned by this wallet.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Coin {
    /// Local identifier, assigned by the keychain on first store. Zero
    /// means "not yet assigned".
    pub id: u64,
    pub amount: Amount,
    pub status: CoinStatus,
    pub key_type: KeyType,
    pub create_height: Height,
    pub maturity: Height,
    pub confirm_height: Height,
    pub confirm_hash: [u8; 32],
    pub locked_height: Height,
    pub create_tx_id: Option<TxId>,
    pub spent_tx_id: Option<TxId>,
}

impl Coin {
    pub fn new(
        amount: Amount,
        status: CoinStatus,
        create_height: Height,
        maturity: Height,
        key_type: KeyType,
    ) -> Self {
        Coin {
            id: 0,
            amount,
            status,
            key_type,
            create_height,
            maturity,
            confirm_height: 0,
            confirm_hash: [0u8; 32],
            locked_height: 0,
            create_tx_id: None,
            spent_tx_id: None,
        }
    }
}

/// Public keypair identifier issued by the key store (33-byte compressed
/// point).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletId(#[serde(with = "BigArray")] pub [u8; 33]);

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub const DURATION_FOREVER: u64 = u64::MAX;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct WalletAddress {
    pub wallet_id: WalletId,
    pub label: String,
    pub create_time: Timestamp,
    pub duration: u64,
    pub own: bool,
}

impl WalletAddress {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        if self.duration == DURATION_FOREVER {
            return false;
        }
        self.create_time.saturating_add(self.duration) < now
    }
}

/// Renders an amount as whole coins plus the sub-unit remainder.
#[derive(Clone, Copy, Debug)]
pub struct PrintableAmount(pub Amount);

impl fmt::Display for PrintableAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coin = Rules::default().coin;
        let whole = self.0 / coin;
        let rest = self.0 % coin;
        if whole > 0 {
            write!(f, "{whole} coins")?;
            if rest > 0 {
                write!(f, " {rest} grains")?;
            }
            Ok(())
        } else {
            write!(f, "{rest} grains")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_id_orders_by_height_then_hash() {
        let a = SystemStateId {
            height: 5,
            hash: [9u8; 32],
        };
        let b = SystemStateId {
            height: 6,
            hash: [0u8; 32],
        };
        assert!(b > a);
        let c = SystemStateId {
            height: 5,
            hash: [10u8; 32],
        };
        assert!(c > a);
    }

    #[test]
    fn address_expiry() {
        let addr = WalletAddress {
            wallet_id: WalletId([0u8; 33]),
            label: "default".into(),
            create_time: 100,
            duration: DURATION_FOREVER,
            own: true,
        };
        assert!(!addr.is_expired(u64::MAX));

        let short = WalletAddress {
            duration: 10,
            ..addr
        };
        assert!(!short.is_expired(110));
        assert!(short.is_expired(111));
    }

    #[test]
    fn printable_amount_splits_units() {
        let coin = Rules::default().coin;
        assert_eq!(format!("{}", PrintableAmount(0)), "0 grains");
        assert_eq!(format!("{}", PrintableAmount(42)), "42 grains");
        assert_eq!(format!("{}", PrintableAmount(3 * coin)), "3 coins");
        assert_eq!(
            format!("{}", PrintableAmount(2 * coin + 7)),
            "2 coins 7 grains"
        );
    }
}
