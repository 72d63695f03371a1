//! Bridge Signer Node
//!
//! Holds one participant's secp256k1 key and signs bridge transfer attestations
//! for the relayer, after independently verifying each claimed source event.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: This service holds a signing key of the bridge's M-of-N set.
//! Run each signer under separate operators and key management.

use anyhow::Result;
use tracing::info;

use bridge_signer::config::{Config, CONFIG_PATH_ENV};
use bridge_signer::{ApiServer, CryptoService, SigningService, SourceVerifier};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

/// Main application entry point.
///
/// This function:
/// 1. Initializes logging and tracing
/// 2. Loads configuration from TOML file
/// 3. Loads the signing key and the shared API secret
/// 4. Serves the signer API until shutdown
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging for debugging and monitoring
    tracing_subscriber::fmt::init();

    info!("Starting Bridge Signer Node");

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("Bridge Signer Node");
        println!();
        println!("Usage: bridge-signer [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --config <path>   Use custom config file path");
        println!("  --help, -h        Show this help message");
        println!();
        println!("Environment variables:");
        println!("  SIGNER_CONFIG_PATH    Path to config file (default: config/signer.toml)");
        println!("  SIGNER__<SECTION>__<KEY>    Override a config value, e.g. SIGNER__API__PORT");
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
        "Configuration loaded: signer index {}, {} source chain(s)",
        config.signer.index,
        config.source_chains.len()
    );

    let crypto = CryptoService::new(&config)?;
    let verifier = SourceVerifier::new(&config)?;
    let auth_token = config.signer.get_auth_token()?;

    let service = SigningService::new(config.signer.index, crypto, verifier);
    let server = ApiServer::new(config, service, auth_token);

    // Serve until the process is stopped
    server.run().await
}
