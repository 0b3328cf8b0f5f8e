use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use serde_with::DisplayFromStr;
use solana_program::pubkey::Pubkey;

/// Lending market groups Reserves which are all priced in one quote currency. Identity of the
/// market is fixed at creation.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LendingMarket {
    /// Authority allowed to add reserves to the market.
    #[serde_as(as = "DisplayFromStr")]
    pub owner: Pubkey,

    /// Mint of the token all reserve prices are quoted against (e.g. USDC).
    #[serde_as(as = "DisplayFromStr")]
    pub quote_currency: Pubkey,
}

impl LendingMarket {
    pub fn new(owner: Pubkey, quote_currency: Pubkey) -> Self {
        Self {
            owner,
            quote_currency,
        }
    }
}
