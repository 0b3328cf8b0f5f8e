use std::process::exit;

use anyhow::{anyhow, Result};
use serde::Serialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::read_keypair_file;
use structopt::StructOpt;

use lending::app::{created_json, App};
use token_lending::state::{LendingMarket, ReserveConfig, ReserveConfigInput};
use token_lending::{parse_amount, parse_identity, LendingResult, TOKEN_LENDING_ID};

#[derive(StructOpt, Debug)]
#[structopt(rename_all = "kebab-case")]
struct LendingArgs {
    /// Configuration file to use. Defaults to the Solana CLI config.
    #[structopt(long, short = "C")]
    config: Option<String>,

    /// URL of RPC Solana interface. Default from the configuration file.
    #[structopt(long, short, env = "SOLANA_RPC")]
    pub url: Option<String>,

    /// Keypair to use for signing instructions. Pays for created accounts and acts as lending
    /// market owner when adding reserves. Default from the configuration file.
    #[structopt(long, short = "k")]
    pub authority: Option<String>,

    /// Token-lending program to send instructions to.
    #[structopt(long, default_value = "LendZqTs7gn5CTSJU1jWKhKuVpjJGom45nnwPb2AMTi", parse(try_from_str = parse_identity))]
    pub program_id: Pubkey,

    /// Priority fee in microlamports.
    #[structopt(long)]
    priority_fee: Option<u64>,

    /// Simulate transactions instead of executing them.
    #[structopt(long)]
    dry_run: bool,

    /// Print created entity as JSON after the command succeeds.
    #[structopt(long)]
    json: bool,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt, Debug)]
#[structopt(rename_all = "kebab-case")]
enum Command {
    /// Create a new lending market
    CreateMarket {
        /// Owner required to sign when adding reserves to the lending market
        #[structopt(long, parse(try_from_str = parse_identity))]
        owner: Pubkey,
        /// SPL Token mint that reserve currency prices are quoted against
        #[structopt(long, parse(try_from_str = parse_identity))]
        quote: Pubkey,
    },
    /// Add a reserve to a lending market. Must be called with lending market owner authority.
    AddReserve {
        /// Lending market address
        #[structopt(long, parse(try_from_str = parse_identity))]
        market: Pubkey,
        /// SPL Token account holding initial reserve liquidity. Its mint becomes the reserve
        /// liquidity mint.
        #[structopt(long, parse(try_from_str = parse_identity))]
        source: Pubkey,
        /// Initial amount of liquidity (in smallest units) to deposit
        #[structopt(long, parse(try_from_str = parse_amount))]
        amount: u64,
        /// Price oracle account for the reserve liquidity
        #[structopt(long, parse(try_from_str = parse_identity))]
        oracle: Option<Pubkey>,
        #[structopt(flatten)]
        config: ReserveConfigArgs,
    },
}

/// Percentages are parsed wide: out of range values are reported as config violations.
#[derive(StructOpt, Debug)]
#[structopt(rename_all = "kebab-case")]
struct ReserveConfigArgs {
    /// Optimal utilization rate, %
    #[structopt(long, default_value = "80")]
    optimal_utilization_rate: u64,
    /// Target ratio of the value of borrows to deposits, %
    #[structopt(long, default_value = "50")]
    loan_to_value_ratio: u64,
    /// Bonus a liquidator gets when repaying part of an unhealthy obligation, %
    #[structopt(long, default_value = "5")]
    liquidation_bonus: u64,
    /// Loan to value ratio at which an obligation can be liquidated, %
    #[structopt(long, default_value = "55")]
    liquidation_threshold: u64,
    /// Min borrow APY, %
    #[structopt(long, default_value = "0")]
    min_borrow_rate: u64,
    /// Optimal (utilization) borrow APY, %
    #[structopt(long, default_value = "4")]
    optimal_borrow_rate: u64,
    /// Max borrow APY, %
    #[structopt(long, default_value = "30")]
    max_borrow_rate: u64,
    /// Fee assessed on borrow as WAD fraction (10^18 = 100%). Default is 0.1%
    #[structopt(long, default_value = "1000000000000000")]
    borrow_fee_wad: u64,
    /// Part of the borrow fee which goes to the host, %
    #[structopt(long, default_value = "20")]
    host_fee_percentage: u64,
}

impl ReserveConfigArgs {
    fn into_config(self) -> LendingResult<ReserveConfig> {
        ReserveConfig::try_from(ReserveConfigInput {
            optimal_utilization_rate: self.optimal_utilization_rate,
            loan_to_value_ratio: self.loan_to_value_ratio,
            liquidation_bonus: self.liquidation_bonus,
            liquidation_threshold: self.liquidation_threshold,
            min_borrow_rate: self.min_borrow_rate,
            optimal_borrow_rate: self.optimal_borrow_rate,
            max_borrow_rate: self.max_borrow_rate,
            borrow_fee_wad: self.borrow_fee_wad,
            host_fee_percentage: self.host_fee_percentage,
        })
    }
}

impl LendingArgs {
    /// RPC URL and authority keypair path. Explicit flags win over the configuration file.
    fn connection(&self) -> Result<(String, String)> {
        let cli_config = match &self.config {
            Some(path) => solana_cli_config::Config::load(path)
                .map_err(|err| anyhow!("loading config {}: {}", path, err))?,
            None => (*solana_cli_config::CONFIG_FILE)
                .as_ref()
                .and_then(|path| solana_cli_config::Config::load(path).ok())
                .unwrap_or_default(),
        };

        let url = self.url.clone().unwrap_or(cli_config.json_rpc_url);
        let authority = self.authority.clone().unwrap_or(cli_config.keypair_path);
        Ok((url, authority))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let opt: LendingArgs = LendingArgs::from_args();

    let (url, authority) = match opt.connection() {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("{:#}", err);
            exit(1);
        }
    };

    let keypair = match read_keypair_file(&authority) {
        Ok(keypair) => keypair,
        Err(err) => {
            eprintln!("{:#}", anyhow!("reading authority keypair {}: {}", authority, err));
            exit(1);
        }
    };
    let client = RpcClient::new_with_commitment(url, CommitmentConfig::confirmed());

    let app = App {
        rpc: client,
        authority: keypair,
        program_id: opt.program_id,
        priority_fee: opt.priority_fee,
        dry_run: opt.dry_run,
    };

    if opt.program_id != TOKEN_LENDING_ID {
        tracing::info!("using custom token-lending program {}", opt.program_id);
    }

    if let Err(err) = run(&app, opt.cmd, opt.json).await {
        eprintln!("Error: {:?}", err);
        exit(1);
    }
}

async fn run(app: &App, cmd: Command, json: bool) -> Result<()> {
    match cmd {
        Command::CreateMarket { owner, quote } => {
            let created = app.create_market(LendingMarket::new(owner, quote)).await?;
            print_created(&created, json)
        }
        Command::AddReserve {
            market,
            source,
            amount,
            oracle,
            config,
        } => {
            let config = config.into_config()?;
            let created = app.add_reserve(market, source, amount, oracle, config).await?;
            print_created(&created, json)
        }
    }
}

fn print_created<T: Serialize>(created: &Option<(Pubkey, T)>, json: bool) -> Result<()> {
    if !json {
        return Ok(());
    }

    match created_json(created)? {
        Some(output) => println!("{}", output),
        None => tracing::info!("dry run: nothing created, JSON output skipped"),
    }
    Ok(())
}
