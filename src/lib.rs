//! Tally - Points Ledger & Redemption Engine
//!
//! Maintains an authoritative per-user point balance derived from an
//! append-only history of earn/use events, and atomically converts
//! balance debits into fixed-denomination reward vouchers with unique
//! pin codes.

pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
