//! Helper functions for finding derived addresses to entities.
use solana_program::pubkey::Pubkey;

/// Lending market authority owns reserve supplies and collateral mints of all Reserves in the
/// market. Derived from the market address alone.
pub fn find_lending_market_authority(program_id: &Pubkey, lending_market: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[lending_market.as_ref()], program_id)
}
