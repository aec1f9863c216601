pub mod gateway;
pub mod network_guard;
pub mod orchestrator;
pub mod risk;
pub mod session;
pub mod snapshot;
