use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

use restaking_relay::types::{KeyTag, ValidatorSet};
use restaking_relay::{FixtureClient, Relay, RelayConfig};

#[derive(Parser)]
#[command(name = "restaking-relay")]
#[command(about = "Validator set derivation and quorum tracking for a restaking relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured log level
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the validator set of an epoch and print it as JSON
    Derive {
        /// Chain fixture (JSON)
        #[arg(short, long)]
        fixture: PathBuf,

        /// Epoch to derive, defaults to the current one
        #[arg(short, long)]
        epoch: Option<u64>,
    },

    /// Check whether a key may commit the header of an epoch at a given time
    Committer {
        /// Chain fixture (JSON)
        #[arg(short, long)]
        fixture: PathBuf,

        #[arg(short, long)]
        epoch: u64,

        /// Key tag the key is registered under
        #[arg(long)]
        key_tag: u8,

        /// Key payload as hex
        #[arg(long)]
        key: String,

        /// Unix timestamp to evaluate
        #[arg(long)]
        time: u64,
    },

    /// Write the default configuration to a file
    InitConfig {
        #[arg(short, long, default_value = "relay.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::default(),
    };

    // Initialize logging
    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Derive { fixture, epoch } => {
            let relay = relay_from_fixture(&fixture, &config)?;
            let epoch = match epoch {
                Some(epoch) => epoch,
                None => relay.current_epoch().await?,
            };

            let set = relay.validator_set(epoch).await?;
            print_validator_set(&set)?;
        }

        Commands::Committer {
            fixture,
            epoch,
            key_tag,
            key,
            time,
        } => {
            let relay = relay_from_fixture(&fixture, &config)?;
            let key = hex::decode(key.trim_start_matches("0x")).context("Invalid key hex")?;

            let set = relay.validator_set(epoch).await?;
            let key_tag = KeyTag(key_tag);
            if key_tag != set.required_key_tag {
                anyhow::bail!(
                    "Committers of epoch {} are identified by key tag {}, not {}",
                    epoch,
                    set.required_key_tag,
                    key_tag
                );
            }

            let active = relay.is_active_committer(epoch, &key, time).await?;
            info!(epoch, time, active, "Checked committer");
            println!("{active}");
        }

        Commands::InitConfig { output } => {
            config.to_file(&output)?;
            info!("Wrote configuration to {}", output.display());
        }
    }

    Ok(())
}

fn relay_from_fixture(path: &Path, config: &RelayConfig) -> Result<Relay> {
    let client = Arc::new(FixtureClient::from_file(path)?);
    Ok(Relay::new(client.clone(), config).with_external_client(client))
}

fn print_validator_set(set: &ValidatorSet) -> Result<()> {
    let header = set.header();
    let output = serde_json::json!({
        "headerHash": format!("{:?}", header.hash()),
        "validatorsRoot": format!("{:?}", header.validators_root),
        "totalVotingPower": header.total_voting_power,
        "validatorSet": set,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
