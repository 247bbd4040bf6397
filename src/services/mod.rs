//! Ledger service implementations.

pub mod pins;
pub mod query;
pub mod redemption;

pub use pins::PinAllocator;
pub use query::LedgerQuery;
pub use redemption::RedemptionEngine;
