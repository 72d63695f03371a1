//! Get Relayer Account Address
//!
//! Reads the relayer configuration and prints the Ethereum address of the
//! relayer account. Fund this address on every destination chain.

use anyhow::Result;
use bridge_relayer::config::Config;
use bridge_relayer::crypto::CryptoService;

fn main() -> Result<()> {
    let config = Config::load()?;
    let crypto = CryptoService::new(&config)?;

    println!("{}", crypto.get_ethereum_address());

    Ok(())
}
