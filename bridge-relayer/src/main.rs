//! Bridge Relayer
//!
//! Moves attested transfers from source chains to destination chains:
//! source events become requests, signer nodes attest them, and the relayer
//! account submits the attested call to the destination bridge contract.
//!
//! ## Security Requirements
//!
//! The relayer cannot forge transfers; destination contracts only accept calls
//! carrying M valid signer attestations. Its own key only pays for gas.

use anyhow::Result;
use tracing::info;

use bridge_relayer::config::{Config, CONFIG_PATH_ENV};
use bridge_relayer::{CryptoService, RelayerService};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

/// Main application entry point.
///
/// This function:
/// 1. Initializes logging and tracing
/// 2. Loads configuration from TOML file
/// 3. Loads the relayer account key and the signer API secret
/// 4. Runs watchers, aggregator, retention sweep and status API until Ctrl-C
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging for debugging and monitoring
    tracing_subscriber::fmt::init();

    info!("Starting Bridge Relayer");

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("Bridge Relayer");
        println!();
        println!("Usage: bridge-relayer [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --config <path>   Use custom config file path");
        println!("  --help, -h        Show this help message");
        println!();
        println!("Environment variables:");
        println!("  RELAYER_CONFIG_PATH    Path to config file (default: config/relayer.toml)");
        println!("  RELAYER__<SECTION>__<KEY>    Override a config value, e.g. RELAYER__API__PORT");
        return Ok(());
    }

    let mut config_path = None;
    let mut i = 1; // Skip program name
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            config_path = Some(args[i + 1].clone());
            i += 1;
        }
        i += 1;
    }

    if let Some(path) = config_path {
        std::env::set_var(CONFIG_PATH_ENV, &path);
        info!("Using custom config: {}", path);
    }

    let config = Config::load()?;
    info!(
        "Configuration loaded: {}-of-{} signers, {} chain(s)",
        config.relayer.threshold,
        config.relayer.total_signers,
        config.chains.len()
    );

    let crypto = CryptoService::new(&config)?;
    let service = RelayerService::new(config, crypto)?;

    service.run().await
}
