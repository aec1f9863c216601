pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Load and merge all config JSON files into a single [`ClientConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   networks/<active_network>.json
///   gateway.json
///   transactions.json
/// ```
///
/// # Environment variable overrides
///
/// | Env Var                   | Config Field                          |
/// |---------------------------|---------------------------------------|
/// | `VAULT_NETWORK_ID`        | `app.active_network`                  |
/// | `VAULT_RPC_URL`           | `network.rpc.http_url`                |
/// | `VAULT_ADDRESS`           | `network.contracts.vault`             |
/// | `VAULT_COLLATERAL_TOKEN`  | `network.contracts.collateral_token`  |
/// | `VAULT_PRICE_FEED`        | `network.contracts.price_feed`        |
/// | `VAULT_RESILIENT_MODE`    | `transactions.resilient_mode`         |
/// | `VAULT_MAX_ATTEMPTS`      | `gateway.max_attempts`                |
/// | `VAULT_LOG_LEVEL`         | `app.logging.level`                   |
pub fn load_config(config_dir: &Path) -> Result<ClientConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let mut app: AppConfig =
        serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    // The network file is chosen before the remaining overrides are applied.
    if let Some(id) = env_parse::<u64>("VAULT_NETWORK_ID") {
        info!(id, "env override: VAULT_NETWORK_ID");
        app.active_network = id;
    }

    let network_file = format!("networks/{}.json", app.active_network);
    let network: NetworkConfig = serde_json::from_str(&read(&network_file)?)
        .with_context(|| format!("parsing {network_file}"))?;

    let gateway: GatewayConfig =
        serde_json::from_str(&read("gateway.json")?).context("parsing gateway.json")?;

    let transactions: TransactionConfig = serde_json::from_str(&read("transactions.json")?)
        .context("parsing transactions.json")?;

    let mut config = ClientConfig {
        app,
        network,
        gateway,
        transactions,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides to the loaded config.
///
/// Only non-empty env vars take effect. Parse failures are skipped and the
/// JSON value remains.
fn apply_env_overrides(config: &mut ClientConfig) {
    // -- Network -------------------------------------------------------------
    if let Some(val) = env_string("VAULT_RPC_URL") {
        info!("env override: VAULT_RPC_URL");
        config.network.rpc.http_url = val;
    }

    // -- Contracts -----------------------------------------------------------
    if let Some(val) = env_string("VAULT_ADDRESS") {
        info!("env override: VAULT_ADDRESS");
        config.network.contracts.vault = val;
    }

    if let Some(val) = env_string("VAULT_COLLATERAL_TOKEN") {
        info!("env override: VAULT_COLLATERAL_TOKEN");
        config.network.contracts.collateral_token = val;
    }

    if let Some(val) = env_string("VAULT_PRICE_FEED") {
        info!("env override: VAULT_PRICE_FEED");
        config.network.contracts.price_feed = val;
    }

    // -- Gateway / transactions ---------------------------------------------
    if let Some(val) = env_bool("VAULT_RESILIENT_MODE") {
        info!(resilient_mode = val, "env override: VAULT_RESILIENT_MODE");
        config.transactions.resilient_mode = val;
    }

    if let Some(val) = env_parse::<u32>("VAULT_MAX_ATTEMPTS") {
        info!(val, "env override: VAULT_MAX_ATTEMPTS");
        config.gateway.max_attempts = val;
    }

    // -- Logging -------------------------------------------------------------
    if let Some(val) = env_string("VAULT_LOG_LEVEL") {
        config.app.logging.level = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var as a bool (`true`, `1`, `yes` → true).
fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Read a non-empty env var and parse it as `T`. Unparseable values are
/// logged and skipped.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}
