pub mod contracts;
pub mod evm_client;
pub mod remote;
pub mod tx_submitter;

pub use remote::{
    CollateralToken, Confirmation, Connectivity, PriceOracle, TxHandle, VaultService,
    VaultServices,
};
