//! Parsing of textual CLI input in to typed values.
//!
//! Both functions are usable as `structopt` `try_from_str` parsers, so malformed input is
//! rejected while arguments are parsed, before any RPC work.
use std::str::FromStr;

use solana_program::pubkey::Pubkey;

use crate::error::LendingError;
use crate::LendingResult;

/// Parse base58 account address.
pub fn parse_identity(input: &str) -> LendingResult<Pubkey> {
    Pubkey::from_str(input).map_err(|source| LendingError::InvalidIdentity {
        input: input.to_string(),
        source,
    })
}

/// Parse liquidity amount in token base units. Negative and fractional values are rejected.
pub fn parse_amount(input: &str) -> LendingResult<u64> {
    input
        .trim()
        .parse::<u64>()
        .map_err(|_| LendingError::InvalidAmount(input.to_string()))
}
