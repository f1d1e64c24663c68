use crate::model::{Amount, Height};
use serde::{Deserialize, Serialize};

/// Fixed protocol schedule. There is no dynamic fee estimation; transfers
/// pay `fee` and miners collect emission plus accumulated fees.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Rules {
    /// Base units per whole coin (display only).
    pub coin: Amount,
    /// Block reward credited to the miner of each block.
    pub coinbase_emission: Amount,
    /// Blocks a coinbase output stays immature.
    pub maturity_coinbase: Height,
    /// Flat fee charged on every transfer.
    pub fee: Amount,
}

impl Default for Rules {
    fn default() -> Self {
        Rules {
            coin: 1_000_000,
            coinbase_emission: 40 * 1_000_000,
            maturity_coinbase: 60,
            fee: 1,
        }
    }
}
