//! Mintwarden - on-chain trading and risk-intelligence engine
//!
//! # WARNING
//! - This engine trades with real money. Only fund it with what you can
//!   afford to lose.
//! - Most freshly launched tokens go to zero.
//! - MEV competition means other bots may outbid you.

use clap::{Parser, Subcommand};
use tracing::error;

use mintwarden::config::Config;
use mintwarden::error::Error;

/// Exit codes: 0 clean, 1 config, 2 wallet/signing, 3 transport, 10 invariant
fn exit_code(e: &Error) -> i32 {
    match e {
        Error::Config(_) | Error::MissingEnvVar(_) => 1,
        Error::InvalidKeypair(_) | Error::InsecureKeypair(_) => 2,
        Error::TransportExhausted { .. } => 3,
        Error::InvariantViolation(_) => 10,
        _ => 1,
    }
}

/// On-chain trading and risk-intelligence engine
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "warden.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine
    Start {
        /// Log intents instead of submitting transactions
        #[arg(long)]
        simulate: bool,
    },

    /// Show positions and P&L from a running instance
    Status,

    /// Show current configuration (secrets masked)
    Config,

    /// Show provider health and pipeline counters
    Health,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mintwarden=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Start { simulate } => match mintwarden::app::run(config, simulate).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("engine stopped: {e}");
                std::process::exit(exit_code(&e));
            }
        },
        Commands::Status => mintwarden::cli::status(&config).await,
        Commands::Config => mintwarden::cli::show_config(&config),
        Commands::Health => mintwarden::cli::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {e:#}");
        std::process::exit(1);
    }
}
