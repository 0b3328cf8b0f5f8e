use std::fmt;
use std::fmt::Display;

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_with::serde_as;
use serde_with::DisplayFromStr;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_client::rpc_response::RpcSimulateTransactionResult;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::native_token::Sol;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::signers::Signers;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use spl_token::state::{Account as TokenAccount, Mint};
use tracing::info;

use token_lending::instruction::{InitLendingMarket, InitReserve, ReserveAccounts};
use token_lending::state::{
    LendingMarket, Reserve, ReserveConfig, LENDING_MARKET_LEN, RESERVE_LEN, SCALE,
};

pub struct App {
    pub rpc: RpcClient,
    pub authority: Keypair,
    pub program_id: Pubkey,
    pub priority_fee: Option<u64>,
    pub dry_run: bool,
}

impl App {
    /// Builds message with fresh blockhash. Priority fee IX is appended when configured.
    pub async fn prepare_message(&self, mut ixs: Vec<Instruction>) -> Result<Message> {
        if let Some(priority_fee) = self.priority_fee {
            let priority_fee_ix = ComputeBudgetInstruction::set_compute_unit_price(priority_fee);
            ixs.push(priority_fee_ix);
        }
        let blockhash = self.rpc.get_latest_blockhash().await?;

        Ok(Message::new_with_blockhash(
            ixs.as_ref(),
            Some(&self.authority.pubkey()),
            &blockhash,
        ))
    }

    /// Signs and sends prepared message. In dry run mode the transaction is only simulated and
    /// `None` is returned.
    pub async fn send_message(
        &self,
        message: Message,
        signers: &(impl Signers + ?Sized),
    ) -> Result<Option<Signature>> {
        let tx = sign_message(message, signers)?;

        if self.dry_run {
            let result = self.rpc.simulate_transaction(&tx).await?.value;
            if let Some(logs) = result.logs.clone() {
                println!("{}", Logs(logs));
            }
            println!("Units consumed: {:?}", result.units_consumed);

            return match result.err {
                Some(err) => Err(anyhow!("simulation failed: {}", err)),
                None => Ok(None),
            };
        }

        let signature = self
            .rpc
            .send_and_confirm_transaction_with_spinner(&tx)
            .await
            .map_err(with_logs)?;

        println!("Signature: {}", signature);
        Ok(Some(signature))
    }

    /// Fails when authority can't cover rent of created accounts plus fees.
    pub async fn check_payer_balance(&self, required_balance: u64) -> Result<()> {
        let payer = self.authority.pubkey();
        let balance = self.rpc.get_balance(&payer).await?;
        if balance < required_balance {
            Err(anyhow!(
                "Fee payer, {}, has insufficient balance: {} required, {} available",
                payer,
                Sol(required_balance),
                Sol(balance)
            ))
        } else {
            Ok(())
        }
    }

    /// Returns created market with its address. `None` in dry run mode: nothing was created.
    pub async fn create_market(
        &self,
        market: LendingMarket,
    ) -> Result<Option<(Pubkey, LendingMarket)>> {
        let market_keypair = Keypair::new();
        info!("creating lending market {}", market_keypair.pubkey());

        let market_balance = self
            .rpc
            .get_minimum_balance_for_rent_exemption(LENDING_MARKET_LEN)
            .await?;

        let create_ix = system_instruction::create_account(
            &self.authority.pubkey(),
            &market_keypair.pubkey(),
            market_balance,
            LENDING_MARKET_LEN as u64,
            &self.program_id,
        );

        let ix = InitLendingMarket {
            program_id: self.program_id,
            lending_market: market_keypair.pubkey(),
            market,
        }
        .into_instruction();

        let message = self.prepare_message(vec![create_ix, ix]).await?;
        let fee = self.rpc.get_fee_for_message(&message).await?;
        self.check_payer_balance(market_balance + fee).await?;

        if self
            .send_message(message, &[&self.authority, &market_keypair][..])
            .await?
            .is_none()
        {
            return Ok(None);
        }

        println!("Created lending market: {}", market_keypair.pubkey());
        println!("Owner          : {}", market.owner);
        println!("Quote currency : {}", market.quote_currency);

        Ok(Some((market_keypair.pubkey(), market)))
    }

    /// Creates all accounts Reserve needs and initializes it with liquidity taken from `source`.
    /// Authority must be both the lending market owner and the owner of `source`. `None` in dry
    /// run mode.
    pub async fn add_reserve(
        &self,
        market: Pubkey,
        source: Pubkey,
        amount: u64,
        oracle: Option<Pubkey>,
        config: ReserveConfig,
    ) -> Result<Option<(Pubkey, Reserve)>> {
        // Nothing is sent until the config is known to be valid.
        let reserve = Reserve::new(market, source, amount, oracle, config)?;

        let source_data = self.rpc.get_account_data(&source).await?;
        let source_account = TokenAccount::unpack(&source_data)
            .map_err(|err| anyhow!("unpacking source token account {}: {}", source, err))?;

        let reserve_keypair = Keypair::new();
        let collateral_mint_keypair = Keypair::new();
        let collateral_supply_keypair = Keypair::new();
        let liquidity_supply_keypair = Keypair::new();
        let user_collateral_keypair = Keypair::new();
        let user_transfer_authority_keypair = Keypair::new();

        info!(
            "adding reserve {} for mint {} to market {}",
            reserve_keypair.pubkey(),
            source_account.mint,
            market
        );

        let reserve_balance = self
            .rpc
            .get_minimum_balance_for_rent_exemption(RESERVE_LEN)
            .await?;
        let collateral_mint_balance = self
            .rpc
            .get_minimum_balance_for_rent_exemption(Mint::LEN)
            .await?;
        let token_account_balance = self
            .rpc
            .get_minimum_balance_for_rent_exemption(TokenAccount::LEN)
            .await?;

        let payer = self.authority.pubkey();
        let create_token_account = |keypair: &Keypair| {
            system_instruction::create_account(
                &payer,
                &keypair.pubkey(),
                token_account_balance,
                TokenAccount::LEN as u64,
                &spl_token::ID,
            )
        };

        let create_ixs = vec![
            system_instruction::create_account(
                &payer,
                &reserve_keypair.pubkey(),
                reserve_balance,
                RESERVE_LEN as u64,
                &self.program_id,
            ),
            system_instruction::create_account(
                &payer,
                &collateral_mint_keypair.pubkey(),
                collateral_mint_balance,
                Mint::LEN as u64,
                &spl_token::ID,
            ),
            create_token_account(&collateral_supply_keypair),
            create_token_account(&liquidity_supply_keypair),
            create_token_account(&user_collateral_keypair),
        ];

        let init_ix = InitReserve {
            program_id: self.program_id,
            accounts: ReserveAccounts {
                reserve: reserve_keypair.pubkey(),
                destination_collateral: user_collateral_keypair.pubkey(),
                liquidity_mint: source_account.mint,
                liquidity_supply: liquidity_supply_keypair.pubkey(),
                collateral_mint: collateral_mint_keypair.pubkey(),
                collateral_supply: collateral_supply_keypair.pubkey(),
                lending_market_owner: payer,
                user_transfer_authority: user_transfer_authority_keypair.pubkey(),
            },
            reserve,
        }
        .into_instruction();

        let init_ixs = vec![
            spl_token::instruction::approve(
                &spl_token::ID,
                &source,
                &user_transfer_authority_keypair.pubkey(),
                &payer,
                &[],
                amount,
            )?,
            init_ix,
            spl_token::instruction::revoke(&spl_token::ID, &source, &payer, &[])?,
        ];

        // Too many accounts for one TX: allocate first, then initialize.
        let create_message = self.prepare_message(create_ixs).await?;
        let init_fee_message = self.prepare_message(init_ixs.clone()).await?;

        let fees = self.rpc.get_fee_for_message(&create_message).await?
            + self.rpc.get_fee_for_message(&init_fee_message).await?;
        self.check_payer_balance(
            reserve_balance + collateral_mint_balance + 3 * token_account_balance + fees,
        )
        .await?;

        self.send_message(
            create_message,
            &[
                &self.authority,
                &reserve_keypair,
                &collateral_mint_keypair,
                &collateral_supply_keypair,
                &liquidity_supply_keypair,
                &user_collateral_keypair,
            ][..],
        )
        .await?;

        if self.dry_run {
            println!("InitReserve is not simulated: it needs accounts created by the first TX");
            return Ok(None);
        }

        // Fresh blockhash: confirming the first TX may outlive the one fetched above.
        let init_message = self.prepare_message(init_ixs).await?;
        self.send_message(
            init_message,
            &[&self.authority, &user_transfer_authority_keypair][..],
        )
        .await?;

        println!("Created reserve: {}", reserve_keypair.pubkey());
        print_reserve(&reserve);

        Ok(Some((reserve_keypair.pubkey(), reserve)))
    }
}

/// Signs message with its own blockhash. Any number of signers may be passed as a slice.
pub fn sign_message(message: Message, signers: &(impl Signers + ?Sized)) -> Result<Transaction> {
    let blockhash = message.recent_blockhash;
    let mut tx = Transaction::new_unsigned(message);
    tx.try_sign(signers, blockhash)?;
    Ok(tx)
}

/// Borrow fee WAD shown as percents
pub fn borrow_fee_percent(borrow_fee_wad: u64) -> Decimal {
    // WAD is 100% so dropping two digits of scale yields percents
    Decimal::from_i128_with_scale(borrow_fee_wad as i128, SCALE - 2).normalize()
}

fn print_reserve(reserve: &Reserve) {
    let config = &reserve.config;
    println!("Lending market           : {}", reserve.market);
    println!("Liquidity source         : {}", reserve.liquidity_source);
    println!("Liquidity amount         : {}", reserve.liquidity_amount);
    match reserve.oracle {
        Some(oracle) => println!("Oracle                   : {}", oracle),
        None => println!("Oracle                   : none"),
    }
    println!(
        "Optimal utilization rate : {}%",
        config.optimal_utilization_rate
    );
    println!("Loan to value ratio      : {}%", config.loan_to_value_ratio);
    println!("Liquidation bonus        : {}%", config.liquidation_bonus);
    println!("Liquidation threshold    : {}%", config.liquidation_threshold);
    println!(
        "Borrow rate min/opt/max  : {}% / {}% / {}%",
        config.min_borrow_rate, config.optimal_borrow_rate, config.max_borrow_rate
    );
    println!(
        "Borrow fee               : {}%",
        borrow_fee_percent(config.fees.borrow_fee_wad)
    );
    println!(
        "Host fee                 : {}%",
        config.fees.host_fee_percentage
    );
}

#[serde_as]
#[derive(Serialize)]
struct Created<'a, T: Serialize> {
    #[serde_as(as = "DisplayFromStr")]
    address: Pubkey,
    #[serde(flatten)]
    entity: &'a T,
}

/// Created entity together with its account address as JSON. `None` when nothing was created,
/// i.e. in dry run mode.
pub fn created_json<T: Serialize>(created: &Option<(Pubkey, T)>) -> Result<Option<String>> {
    let Some((address, entity)) = created else {
        return Ok(None);
    };
    let created = Created {
        address: *address,
        entity,
    };
    Ok(Some(serde_json::to_string_pretty(&created)?))
}

struct Logs(Vec<String>);

impl Display for Logs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\nLogs:")?;

        for (i, log) in self.0.iter().enumerate() {
            writeln!(f, "    {:>3}: {}", i + 1, log)?;
        }
        Ok(())
    }
}

/// Program errors are passed as is. Preflight logs are attached when RPC returned them.
pub fn with_logs(mut error: ClientError) -> anyhow::Error {
    let logs = match error.kind {
        ClientErrorKind::RpcError(RpcError::RpcResponseError {
            data:
                RpcResponseErrorData::SendTransactionPreflightFailure(RpcSimulateTransactionResult {
                    ref mut logs,
                    ..
                }),
            ..
        }) => logs.take().map(Logs),
        _ => None,
    };

    if let Some(logs) = logs {
        anyhow::Error::from(error).context(logs)
    } else {
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use serde_json::json;
    use solana_client::rpc_request::RpcRequest;
    use solana_sdk::hash::Hash;
    use token_lending::state::{ReserveFees, PERCENT_SCALER, WAD};
    use token_lending::TOKEN_LENDING_ID;

    fn mock_app(mocks: HashMap<RpcRequest, serde_json::Value>) -> App {
        App {
            rpc: RpcClient::new_mock_with_mocks("succeeds".to_string(), mocks),
            authority: Keypair::new(),
            program_id: TOKEN_LENDING_ID,
            priority_fee: Some(7),
            dry_run: true,
        }
    }

    #[tokio::test]
    async fn each_message_gets_fresh_blockhash() {
        let first = Hash::new_unique();
        // Mocked response is consumed by the first request
        let app = mock_app(HashMap::from([(
            RpcRequest::GetLatestBlockhash,
            json!({
                "context": { "slot": 1 },
                "value": { "blockhash": first.to_string(), "lastValidBlockHeight": 100 },
            }),
        )]));
        let ix = system_instruction::transfer(&app.authority.pubkey(), &Pubkey::new_unique(), 1);

        let create_message = app.prepare_message(vec![ix.clone()]).await.expect("message");
        let init_message = app.prepare_message(vec![ix]).await.expect("message");

        assert_eq!(create_message.recent_blockhash, first);
        assert_ne!(init_message.recent_blockhash, first);
        // Transfer + priority fee
        assert_eq!(create_message.instructions.len(), 2);
    }

    #[test]
    fn sign_with_six_signers() {
        let payer = Keypair::new();
        let accounts: Vec<Keypair> = (0..5).map(|_| Keypair::new()).collect();
        let ixs: Vec<Instruction> = accounts
            .iter()
            .map(|account| {
                system_instruction::create_account(
                    &payer.pubkey(),
                    &account.pubkey(),
                    1,
                    TokenAccount::LEN as u64,
                    &spl_token::ID,
                )
            })
            .collect();
        let message = Message::new_with_blockhash(&ixs, Some(&payer.pubkey()), &Hash::new_unique());

        let tx = sign_message(
            message,
            &[
                &payer,
                &accounts[0],
                &accounts[1],
                &accounts[2],
                &accounts[3],
                &accounts[4],
            ][..],
        )
        .expect("signing");

        assert!(tx.is_signed());
        assert_eq!(tx.signatures.len(), 6);
    }

    #[test]
    fn borrow_fee_as_percent() {
        assert_eq!(borrow_fee_percent(0), Decimal::ZERO);
        assert_eq!(borrow_fee_percent(WAD), Decimal::from(100));
        assert_eq!(borrow_fee_percent(PERCENT_SCALER), Decimal::ONE);
        assert_eq!(
            borrow_fee_percent(ReserveFees::default().borrow_fee_wad).to_string(),
            "0.1"
        );
        // 1 bp
        assert_eq!(
            borrow_fee_percent(100_000_000_000_000).to_string(),
            "0.01"
        );
    }

    #[test]
    fn json_has_address_and_fields() {
        let address = Pubkey::new_unique();
        let market = LendingMarket::new(Pubkey::new_unique(), Pubkey::new_unique());
        let created = Created {
            address,
            entity: &market,
        };

        let json = serde_json::to_value(&created).expect("to json");
        assert_eq!(json["address"], address.to_string());
        assert_eq!(json["owner"], market.owner.to_string());
        assert_eq!(json["quote_currency"], market.quote_currency.to_string());
    }

    #[test]
    fn no_json_when_nothing_created() {
        let simulated: Option<(Pubkey, LendingMarket)> = None;
        assert_eq!(created_json(&simulated).expect("json"), None);

        let address = Pubkey::new_unique();
        let market = LendingMarket::new(Pubkey::new_unique(), Pubkey::new_unique());
        let json = created_json(&Some((address, market)))
            .expect("json")
            .expect("created");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["address"], address.to_string());
    }

    #[test]
    fn logs_are_numbered() {
        let logs = Logs(vec!["Program log: one".to_string(), "Program log: two".to_string()]);
        assert_eq!(
            logs.to_string(),
            "\nLogs:\n      1: Program log: one\n      2: Program log: two\n"
        );
    }
}
