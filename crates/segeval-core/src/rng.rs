//! Deterministic RNG wrapper used to build presentation orders.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Deterministic RNG handle used for every randomized decision in a session.
///
/// A thin wrapper around `StdRng` seeded with `seed_from_u64`. Two handles
/// created from the same seed emit the same stream for a given `rand` release,
/// which is what makes a presentation order reconstructible for audit.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
}

impl RngHandle {
    /// Creates a new RNG handle from a master seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RngCore for RngHandle {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}
