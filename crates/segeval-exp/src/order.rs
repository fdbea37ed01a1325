use rand::seq::SliceRandom;
use segeval_core::errors::EvalError;
use segeval_core::{RngHandle, Seed, Slot, METHOD_COUNT};
use serde::{Deserialize, Serialize};

use crate::hash::stable_hash_string;

/// Randomized, blinded sequence of (method, sequence) slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationOrder {
    seed: Seed,
    sequence_count: usize,
    slots: Vec<Slot>,
}

impl PresentationOrder {
    pub fn seed(&self) -> Seed {
        self.seed
    }

    pub fn sequence_count(&self) -> usize {
        self.sequence_count
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Slot> {
        self.slots.get(index).copied()
    }

    /// Stable digest of the seed and slot sequence, recorded for audit.
    pub fn hash(&self) -> Result<String, EvalError> {
        stable_hash_string(self)
    }
}

/// Derives the presentation order for `sequence_count` volumes.
///
/// The sequence indices are shuffled, crossed with every method, and the
/// resulting pairs are shuffled again from the same generator stream. The
/// output is a permutation of `0..METHOD_COUNT x 0..sequence_count` and is
/// identical for identical inputs.
pub fn generate_order(seed: Seed, sequence_count: usize) -> PresentationOrder {
    let mut rng = RngHandle::from_seed(seed.value());

    let mut sequences: Vec<usize> = (0..sequence_count).collect();
    sequences.shuffle(&mut rng);

    let mut slots: Vec<Slot> = (0..METHOD_COUNT)
        .flat_map(|method| {
            sequences
                .iter()
                .map(move |&sequence| Slot::new(method, sequence))
        })
        .collect();
    slots.shuffle(&mut rng);

    PresentationOrder {
        seed,
        sequence_count,
        slots,
    }
}
