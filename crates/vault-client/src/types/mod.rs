pub mod account;
pub mod position;
pub mod wad;

pub use account::{AccountState, AllowanceState};
pub use position::{MarketPrice, PendingInterest, PositionDiff, PositionSnapshot};
pub use wad::Wad;
