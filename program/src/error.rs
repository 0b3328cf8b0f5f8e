use solana_program::pubkey::ParsePubkeyError;
use thiserror::Error;

use crate::state::reserve::ConfigInvariant;

/// Errors detected locally, before any request reaches the lending program. Failures reported
/// by the program itself (authorization, duplicate accounts, balances) never pass through here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LendingError {
    #[error("invalid identity {input:?}: {source}")]
    InvalidIdentity {
        input: String,
        source: ParsePubkeyError,
    },

    #[error("invalid amount {0:?}: expected non-negative integer")]
    InvalidAmount(String),

    #[error("invalid config: invariant {} violated, {}", .0.index(), .0)]
    InvalidConfig(ConfigInvariant),
}
