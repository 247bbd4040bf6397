//! Voucher pin allocation.

use std::collections::HashSet;

use rand::Rng;
use tracing::warn;

use crate::config::PinConfig;
use crate::error::{EngineError, Result};
use crate::storage::LedgerStore;

/// Generate one candidate pin in the fixed display format
/// `DDDD-DDDD-DDDD-DDDD`, each group drawn from 1000..=9999 so no
/// group is ever zero-padded.
///
/// Pins function as bearer tokens, so candidates come from the OS-seeded
/// thread-local CSPRNG, never a seeded generator.
fn generate_pin() -> String {
    let mut rng = rand::rng();
    format!(
        "{}-{}-{}-{}",
        rng.random_range(1000..=9999),
        rng.random_range(1000..=9999),
        rng.random_range(1000..=9999),
        rng.random_range(1000..=9999),
    )
}

/// Produces voucher codes that are unique across the entire system.
pub struct PinAllocator {
    max_attempts: u32,
}

impl Default for PinAllocator {
    fn default() -> Self {
        Self::with_config(&PinConfig::default())
    }
}

impl PinAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &PinConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
        }
    }

    /// Per-code generation attempts before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Allocate `quantity` codes, each checked against the persisted set
    /// and against the batch itself before being accepted. Non-positive
    /// quantities yield an empty batch.
    ///
    /// The code space (9000^4 combinations) makes collisions astronomically
    /// unlikely; the retry cap bounds the loop anyway and surfaces
    /// `PinAllocationExhausted` when exceeded.
    pub async fn allocate(&self, store: &dyn LedgerStore, quantity: i64) -> Result<Vec<String>> {
        if quantity <= 0 {
            return Ok(Vec::new());
        }

        let mut pins = Vec::with_capacity(quantity as usize);
        let mut batch: HashSet<String> = HashSet::with_capacity(quantity as usize);

        for _ in 0..quantity {
            let mut attempt = 0;
            let pin = loop {
                attempt += 1;
                if attempt > self.max_attempts {
                    return Err(EngineError::PinAllocationExhausted {
                        attempts: self.max_attempts,
                    });
                }

                let candidate = generate_pin();
                if batch.contains(&candidate) || store.pin_exists(&candidate).await? {
                    warn!(attempt, "pin collision, regenerating");
                    continue;
                }
                break candidate;
            };

            batch.insert(pin.clone());
            pins.push(pin);
        }

        Ok(pins)
    }
}
