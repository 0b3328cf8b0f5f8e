//! Instructions of the token-lending program and builders producing ready to sign
//! [Instruction]s out of the locally validated state types.
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::instruction::{AccountMeta, Instruction};
use solana_program::pubkey::Pubkey;
use solana_program::sysvar;

use crate::pda::find_lending_market_authority;
use crate::state::{LendingMarket, Reserve, ReserveConfig};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum LendingInstruction {
    // 0
    /// Initializes a new lending market.
    ///
    /// Accounts expected by this instruction:
    ///
    ///   0. `[writable]` Lending market account. Uninitialized, owned by the program.
    ///   1. `[]` Quote currency SPL Token mint.
    ///   2. `[]` Rent sysvar.
    ///   3. `[]` Token program id.
    InitLendingMarket {
        /// Owner authority which can add new reserves
        owner: Pubkey,
        /// Currency market prices are quoted in
        quote_currency: Pubkey,
    },

    // 1
    /// Initializes a new lending market reserve and deposits initial liquidity in to it.
    ///
    /// Accounts expected by this instruction:
    ///
    ///   0. `[writable]` Source liquidity token account. $authority can transfer $liquidity_amount.
    ///   1. `[writable]` Destination collateral token account. Uninitialized.
    ///   2. `[writable]` Reserve account. Uninitialized.
    ///   3. `[]` Reserve liquidity SPL Token mint.
    ///   4. `[writable]` Reserve liquidity supply SPL Token account. Uninitialized.
    ///   5. `[writable]` Reserve collateral SPL Token mint. Uninitialized.
    ///   6. `[writable]` Reserve collateral fees receiver. Uninitialized.
    ///   7. `[]` Lending market account.
    ///   8. `[signer]` Lending market owner.
    ///   9. `[]` Derived lending market authority.
    ///   10. `[signer]` User transfer authority ($authority).
    ///   11. `[]` Clock sysvar.
    ///   12. `[]` Rent sysvar.
    ///   13. `[]` Token program id.
    ///   14. `[optional]` Price oracle account.
    InitReserve {
        /// Initial amount of liquidity to deposit in to the new reserve
        liquidity_amount: u64,
        /// Reserve configuration values
        config: ReserveConfig,
    },
}

///[LendingInstruction::InitLendingMarket] Builder struct
pub struct InitLendingMarket {
    /// Current program ID
    pub program_id: Pubkey,
    /// Lending market account to initialize. Must be created (allocated) in the same transaction.
    pub lending_market: Pubkey,
    pub market: LendingMarket,
}

impl InitLendingMarket {
    #[track_caller]
    pub fn into_instruction(self) -> Instruction {
        let Self {
            program_id,
            lending_market,
            market,
        } = self;

        let accounts = vec![
            AccountMeta::new(lending_market, false),
            AccountMeta::new_readonly(market.quote_currency, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
            AccountMeta::new_readonly(spl_token::ID, false),
        ];

        let ix = LendingInstruction::InitLendingMarket {
            owner: market.owner,
            quote_currency: market.quote_currency,
        };
        Instruction::new_with_borsh(program_id, &ix, accounts)
    }
}

/// Accounts InitReserve operates on besides the ones known from [Reserve] itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveAccounts {
    /// Reserve account to initialize
    pub reserve: Pubkey,
    /// Token account which receives collateral tokens minted for initial liquidity
    pub destination_collateral: Pubkey,
    /// Mint of the reserve liquidity. Must match the mint of `Reserve::liquidity_source`.
    pub liquidity_mint: Pubkey,
    pub liquidity_supply: Pubkey,
    pub collateral_mint: Pubkey,
    /// Collateral fees receiver
    pub collateral_supply: Pubkey,
    pub lending_market_owner: Pubkey,
    /// Delegate approved to move `liquidity_amount` out of the source account
    pub user_transfer_authority: Pubkey,
}

///[LendingInstruction::InitReserve] Builder struct
pub struct InitReserve {
    /// Current program ID
    pub program_id: Pubkey,
    pub accounts: ReserveAccounts,
    /// Validated reserve
    pub reserve: Reserve,
}

impl InitReserve {
    #[track_caller]
    pub fn into_instruction(self) -> Instruction {
        let Self {
            program_id,
            accounts,
            reserve,
        } = self;

        let (lending_market_authority, _bump) =
            find_lending_market_authority(&program_id, &reserve.market);

        let mut account_metas = vec![
            AccountMeta::new(reserve.liquidity_source, false),
            AccountMeta::new(accounts.destination_collateral, false),
            AccountMeta::new(accounts.reserve, false),
            AccountMeta::new_readonly(accounts.liquidity_mint, false),
            AccountMeta::new(accounts.liquidity_supply, false),
            AccountMeta::new(accounts.collateral_mint, false),
            AccountMeta::new(accounts.collateral_supply, false),
            AccountMeta::new_readonly(reserve.market, false),
            AccountMeta::new_readonly(accounts.lending_market_owner, true),
            AccountMeta::new_readonly(lending_market_authority, false),
            AccountMeta::new_readonly(accounts.user_transfer_authority, true),
            AccountMeta::new_readonly(sysvar::clock::ID, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
            AccountMeta::new_readonly(spl_token::ID, false),
        ];

        if let Some(oracle) = reserve.oracle {
            account_metas.push(AccountMeta::new_readonly(oracle, false));
        }

        let ix = LendingInstruction::InitReserve {
            liquidity_amount: reserve.liquidity_amount,
            config: reserve.config,
        };
        Instruction::new_with_borsh(program_id, &ix, account_metas)
    }
}
