use std::path::PathBuf;
use std::str::FromStr;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use vault_client::config;
use vault_client::core::session::Session;
use vault_client::execution::evm_client::build_services;
use vault_client::logging;

const USAGE: &str = "usage: vault-client [status | deposit <amount> | borrow <amount> | approve [<amount>]]";

#[derive(Debug)]
enum Command {
    Status,
    Deposit(String),
    Borrow(String),
    Approve(Option<Decimal>),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    let command = parse_command(std::env::args().skip(1))?;

    let config_dir = std::env::var("VAULT_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));
    let config = config::load_config(&config_dir)?;

    // Hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.app.logging)?;

    info!(
        chain_id = config.network.chain_id,
        chain_name = %config.network.chain_name,
        resilient_mode = config.transactions.resilient_mode,
        interest_accessor = config.network.vault.interest_accessor.method_name(),
        "vault client starting"
    );

    let signer = init_signer()?;
    let services = build_services(&config, signer).context("failed to build vault services")?;
    let mut session = Session::new(&config, services);

    match session.connect().await {
        Ok(address) => info!(%address, "session connected"),
        Err(e) => {
            warn!(error = %e, "no wallet provider, falling back to watch-only session");
            match watch_address()? {
                Some(address) => session.observe(address).await,
                None => warn!("VAULT_USER_ADDRESS not set, showing empty view"),
            }
        }
    }

    let is_write = !matches!(command, Command::Status);
    let tx_hash = match command {
        Command::Status => None,
        Command::Deposit(amount) => {
            session.set_deposit_amount(&amount)?;
            session.deposit().await.ok().map(|o| o.confirmation.tx_hash)
        }
        Command::Borrow(amount) => {
            session.set_borrow_amount(&amount)?;
            session.borrow().await.ok().map(|o| o.confirmation.tx_hash)
        }
        Command::Approve(amount) => session
            .approve(amount)
            .await
            .ok()
            .map(|o| o.confirmation.tx_hash),
    };

    let report = json!({
        "view": session.view(),
        "tx_hash": tx_hash,
        "deposit_value_estimate": session.deposit_value_estimate().map(|v| v.to_string()),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render position view")?
    );

    if is_write && tx_hash.is_none() {
        anyhow::bail!(
            "{}",
            session.view().error.clone().unwrap_or_else(|| "workflow failed".into())
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Initialization helpers
// ---------------------------------------------------------------------------

fn parse_command(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let command = match args.next().as_deref() {
        None | Some("status") => Command::Status,
        Some("deposit") => Command::Deposit(args.next().context(USAGE)?),
        Some("borrow") => Command::Borrow(args.next().context(USAGE)?),
        Some("approve") => Command::Approve(
            args.next()
                .map(|a| Decimal::from_str(&a).context("failed to parse approve amount"))
                .transpose()?,
        ),
        Some(other) => anyhow::bail!("unknown command '{other}'\n{USAGE}"),
    };
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument '{extra}'\n{USAGE}");
    }
    Ok(command)
}

/// Signer from `VAULT_PRIVATE_KEY`. Without one the session is read-only.
fn init_signer() -> Result<Option<PrivateKeySigner>> {
    match std::env::var("VAULT_PRIVATE_KEY")
        .ok()
        .filter(|v| !v.is_empty())
    {
        Some(key) => {
            let key = key.strip_prefix("0x").unwrap_or(&key);
            let signer = key
                .parse::<PrivateKeySigner>()
                .context("failed to parse VAULT_PRIVATE_KEY")?;
            info!(signer = %signer.address(), "signer loaded");
            Ok(Some(signer))
        }
        None => {
            info!("no private key set, running read-only");
            Ok(None)
        }
    }
}

fn watch_address() -> Result<Option<Address>> {
    std::env::var("VAULT_USER_ADDRESS")
        .ok()
        .filter(|v| !v.is_empty())
        .map(|addr| {
            addr.parse::<Address>()
                .context("failed to parse VAULT_USER_ADDRESS")
        })
        .transpose()
}
