pub mod error;
pub mod instruction;
pub mod parse;
pub mod state;

pub mod pda;

pub use parse::{parse_amount, parse_identity};

// Address the token-lending program is deployed at on mainnet. Every builder takes `program_id`
// explicitly so the CLI can target other deployments (devnet, local validator).
pub use lending_id::ID as TOKEN_LENDING_ID;
mod lending_id {
    solana_program::declare_id!("LendZqTs7gn5CTSJU1jWKhKuVpjJGom45nnwPb2AMTi");
}

pub type LendingResult<T> = std::result::Result<T, error::LendingError>;
