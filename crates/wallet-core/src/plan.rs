//! Input selection for outgoing transfers.

use crate::error::{Result, WalletError};
use crate::keychain::Keychain;
use crate::model::{Amount, Coin, CoinStatus};

#[derive(Clone, Debug)]
pub struct SelectionResult {
    pub coins: Vec<Coin>,
    pub total: Amount,
    pub change: Amount,
}

/// Sum of all Unspent coins.
pub fn available_balance(keychain: &Keychain) -> Amount {
    let mut total: Amount = 0;
    keychain.visit(|coin| {
        if coin.status == CoinStatus::Unspent {
            total = total.saturating_add(coin.amount);
        }
        true
    });
    total
}

/// Greedy largest-first selection over Unspent coins until `requested` is
/// covered.
pub fn select_coins(keychain: &Keychain, requested: Amount) -> Result<SelectionResult> {
    let mut unspent = Vec::new();
    keychain.visit(|coin| {
        if coin.status == CoinStatus::Unspent {
            unspent.push(coin.clone());
        }
        true
    });
    unspent.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.id.cmp(&b.id)));

    let mut total: Amount = 0;
    let mut coins = Vec::new();
    for coin in unspent.iter() {
        total = total.saturating_add(coin.amount);
        coins.push(coin.clone());
        if total >= requested {
            break;
        }
    }
    if total < requested {
        return Err(WalletError::InsufficientFunds {
            available: unspent.iter().map(|c| c.amount).sum(),
            requested,
        });
    }

    Ok(SelectionResult {
        coins,
        total,
        change: total - requested,
    })
}
