#![deny(missing_docs)]
#![doc = "Core value types, errors and seeding policy shared by the segeval crates."]

pub mod errors;
pub mod provenance;
pub mod rng;
mod types;

pub use errors::{ErrorInfo, EvalError};
pub use provenance::{SchemaVersion, SessionProvenance};
pub use rng::RngHandle;
pub use types::{Score, Scores, Seed, Slot, METHOD_COUNT, QUESTION_COUNT, RANDOM_SEED_MAX};
