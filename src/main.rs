//! txflow CLI Application
//!
//! Fee preflight, the operation table, and simulated transaction workflows.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use txflow::cli;
use txflow::config::Config;

#[derive(Parser)]
#[command(name = "txflow")]
#[command(version = "0.1.0")]
#[command(about = "Transaction workflow engine: preflight, sign, send, confirm", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a balance against the fees of an operation
    Preflight {
        /// Payer balance in base units
        #[arg(short, long)]
        balance: u64,

        /// Amount moved by the operation, in base units
        #[arg(short, long, default_value = "0")]
        amount: u64,

        /// Network fee override
        #[arg(long)]
        network_fee: Option<u64>,

        /// Flat protocol fee override
        #[arg(long)]
        flat_fee: Option<u64>,

        /// Percentage fee override, in basis points
        #[arg(long)]
        percent_fee_bps: Option<u64>,
    },

    /// List every operation and its post-confirmation effects
    Operations,

    /// Write the default configuration file
    InitConfig {
        /// Output file path
        #[arg(short, long, default_value = "txflow.json")]
        output: PathBuf,
    },

    /// Run a workflow against the in-memory ledger
    Simulate {
        #[command(subcommand)]
        action: SimulateCommands,
    },
}

#[derive(Subcommand)]
enum SimulateCommands {
    /// Transfer from a funded wallet
    Transfer {
        /// Recipient address
        #[arg(short, long, default_value = "bob")]
        to: String,

        /// Amount in base units
        #[arg(short, long, default_value = "100000000")]
        amount: u64,
    },

    /// Create a 3-owner multisig, propose a transfer, vote and execute
    Proposal {
        /// Approvals required
        #[arg(short, long, default_value = "2")]
        threshold: u8,

        /// Amount in base units
        #[arg(short, long, default_value = "100000000")]
        amount: u64,
    },

    /// Transfer whose confirmation never arrives
    Timeout {
        /// Amount in base units
        #[arg(short, long, default_value = "100000000")]
        amount: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_filter.as_str()),
    )
    .init();

    match cli.command {
        Commands::Preflight {
            balance,
            amount,
            network_fee,
            flat_fee,
            percent_fee_bps,
        } => {
            let mut fees = config.fees;
            if let Some(fee) = network_fee {
                fees.network_fee = fee;
            }
            if let Some(fee) = flat_fee {
                fees.flat_fee = fee;
            }
            if let Some(bps) = percent_fee_bps {
                fees.percent_fee_bps = bps;
            }
            cli::cmd_preflight(balance, &fees, amount)?;
        }

        Commands::Operations => {
            cli::cmd_operations()?;
        }

        Commands::InitConfig { output } => {
            cli::cmd_write_config(&output)?;
        }

        Commands::Simulate { action } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                match action {
                    SimulateCommands::Transfer { to, amount } => {
                        cli::cmd_simulate_transfer(&config, &to, amount).await
                    }
                    SimulateCommands::Proposal { threshold, amount } => {
                        cli::cmd_simulate_proposal(&config, threshold, amount).await
                    }
                    SimulateCommands::Timeout { amount } => {
                        cli::cmd_simulate_timeout(&config, amount).await
                    }
                }
            })?;
        }
    }

    Ok(())
}
