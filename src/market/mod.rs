//! Market parameter cache and shared market types.

pub mod directory;
pub mod types;

pub use directory::{MarketDirectory, MarketKey};
pub use types::{FundingProfile, MarketParams, OpenInterestSnapshot, Side, Venue, VenueKind};
