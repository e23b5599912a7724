//! Domain Layer - Core types and exit arithmetic for the listing sniper
//!
//! Pure logic with no network access. Everything that talks to the chain
//! goes through the ports layer.
//!
//! - `listing`: decoding of launchpad `LiquidityAdded` events
//! - `position`: open positions and stop-loss / take-profit math
//! - `position_persistence`: crash recovery snapshots
//! - `units`: exact decimal to on-chain unit conversion
//! - `wallet`: buying wallets and their fixed buy amounts

pub mod listing;
pub mod position;
pub mod position_persistence;
pub mod units;
pub mod wallet;

pub use listing::{EventDecodeError, ListingEvent};
pub use position::{drop_percent, take_profit_amount, Position, PositionKey};
pub use position_persistence::{PersistError, PersistedPosition, PositionSnapshot, RecoveryStatus};
pub use units::{format_units, one_unit, to_base_units, UnitsError, NATIVE_DECIMALS};
pub use wallet::WalletInfo;
