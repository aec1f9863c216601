use alloy::primitives::Address;
use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::ClientConfig;

/// Validate invariants across the merged config that serde alone cannot enforce.
///
/// Collects every violation before failing. Called automatically by
/// [`super::load_config`].
pub fn validate_config(config: &ClientConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    validate_logging_config(config, &mut errors);
    validate_network_config(config, &mut errors);
    validate_gateway_config(config, &mut errors);
    validate_transaction_config(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

// ---------------------------------------------------------------------------
// Logging config
// ---------------------------------------------------------------------------

fn validate_logging_config(config: &ClientConfig, errors: &mut Vec<String>) {
    let logging = &config.app.logging;
    if logging.log_dir.is_empty() {
        errors.push("app.logging: log_dir is empty".into());
    }
    if logging.file_name.is_empty() {
        errors.push("app.logging: file_name is empty".into());
    }
    if logging.level.parse::<tracing::Level>().is_err() {
        errors.push(format!(
            "app.logging: unknown level '{}' (expected trace, debug, info, warn or error)",
            logging.level
        ));
    }
}

// ---------------------------------------------------------------------------
// Network config
// ---------------------------------------------------------------------------

fn validate_network_config(config: &ClientConfig, errors: &mut Vec<String>) {
    let network = &config.network;

    if network.chain_id == 0 {
        errors.push("network: chain_id must be non-zero".into());
    }

    if network.chain_id != config.app.active_network {
        errors.push(format!(
            "network: chain_id ({}) does not match active_network ({})",
            network.chain_id, config.app.active_network
        ));
    }

    if network.rpc.http_url.is_empty() {
        errors.push("network.rpc: http_url is empty".into());
    }

    let contract_addrs = [
        ("collateral_token", &network.contracts.collateral_token),
        ("vault", &network.contracts.vault),
        ("price_feed", &network.contracts.price_feed),
    ];

    for (name, addr) in &contract_addrs {
        if let Err(e) = validate_address(addr) {
            errors.push(format!("network.contracts.{name}: {e}"));
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway config
// ---------------------------------------------------------------------------

fn validate_gateway_config(config: &ClientConfig, errors: &mut Vec<String>) {
    let gateway = &config.gateway;

    if gateway.max_attempts == 0 {
        errors.push("gateway: max_attempts must be >= 1".into());
    }

    if gateway.receipt_poll_interval_ms == 0 {
        errors.push("gateway: receipt_poll_interval_ms must be > 0".into());
    }

    if gateway.max_receipt_poll_failures == 0 {
        errors.push("gateway: max_receipt_poll_failures must be >= 1".into());
    }
}

// ---------------------------------------------------------------------------
// Transaction config
// ---------------------------------------------------------------------------

fn validate_transaction_config(config: &ClientConfig, errors: &mut Vec<String>) {
    let tx = &config.transactions;

    if tx.gas_estimate_buffer < dec!(1) {
        errors.push(format!(
            "transactions: gas_estimate_buffer ({}) must be >= 1",
            tx.gas_estimate_buffer
        ));
    }

    if tx.fallback_gas_limit == 0 {
        errors.push("transactions: fallback_gas_limit must be > 0".into());
    }

    if tx.approve_gas_limit == 0 {
        errors.push("transactions: approve_gas_limit must be > 0".into());
    }

    if tx.manual_approve_amount <= Decimal::ZERO {
        errors.push(format!(
            "transactions: manual_approve_amount ({}) must be > 0",
            tx.manual_approve_amount
        ));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_address(addr: &str) -> Result<(), String> {
    if addr.is_empty() {
        return Err("address is empty".into());
    }
    let parsed: Address = addr
        .parse()
        .map_err(|e| format!("invalid address '{addr}': {e}"))?;
    if parsed == Address::ZERO {
        return Err("zero address".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn valid_config() -> ClientConfig {
        ClientConfig {
            app: AppConfig {
                active_network: 80002,
                logging: LoggingConfig::default(),
            },
            network: NetworkConfig {
                chain_id: 80002,
                chain_name: "Polygon Amoy Testnet".into(),
                rpc: RpcConfig {
                    http_url: "https://rpc-amoy.polygon.technology".into(),
                },
                contracts: ContractsConfig {
                    collateral_token: "0x96e64aA4ea2F6c04847dc9665f2d6Adddf490742".into(),
                    vault: "0x5942eD733d2bc9bDCBcBF505c45375209842dfa1".into(),
                    price_feed: "0x133Fd791668cCAE4cdF4e7d43B09445D2f33b4af".into(),
                },
                vault: VaultConfig::default(),
            },
            gateway: GatewayConfig::default(),
            transactions: TransactionConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut c = valid_config();
        c.gateway.max_attempts = 0;
        let err = validate_config(&c).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_mismatched_network_rejected() {
        let mut c = valid_config();
        c.network.chain_id = 31337;
        let err = validate_config(&c).unwrap_err();
        assert!(err.to_string().contains("does not match active_network"));
    }

    #[test]
    fn test_gas_buffer_below_one_rejected() {
        let mut c = valid_config();
        c.transactions.gas_estimate_buffer = dec!(0.9);
        let err = validate_config(&c).unwrap_err();
        assert!(err.to_string().contains("gas_estimate_buffer"));
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let mut c = valid_config();
        c.app.logging.level = "verbose".into();
        let err = validate_config(&c).unwrap_err();
        assert!(err.to_string().contains("unknown level 'verbose'"));

        c.app.logging.level = "DEBUG".into();
        assert!(validate_config(&c).is_ok());
    }

    #[test]
    fn test_errors_are_collected() {
        let mut c = valid_config();
        c.network.contracts.vault = String::new();
        c.network.contracts.price_feed = "0x0000000000000000000000000000000000000000".into();
        c.network.rpc.http_url = String::new();
        let err = validate_config(&c).unwrap_err().to_string();
        assert!(err.contains("3 errors"), "got: {err}");
        assert!(err.contains("contracts.vault: address is empty"));
        assert!(err.contains("contracts.price_feed: zero address"));
    }
}
