//! Provenance and schema descriptors for session artifacts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic version describing the schema of serialized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version incremented for breaking changes.
    pub major: u32,
    /// Minor version incremented for additive changes.
    pub minor: u32,
    /// Patch version incremented for bug fixes and documentation updates.
    pub patch: u32,
}

impl SchemaVersion {
    /// Creates a new schema version descriptor.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether a payload written under `other` can be read under `self`.
    pub fn is_compatible_with(&self, other: &SchemaVersion) -> bool {
        self.major == other.major
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Provenance recorded next to a score export so the session can be audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionProvenance {
    /// Schema version of the provenance payload itself.
    pub schema_version: SchemaVersion,
    /// Seed the presentation order was derived from.
    pub seed: u64,
    /// Number of volumes per directory.
    pub sequence_count: usize,
    /// Hash of the presentation order.
    pub order_hash: String,
    /// Hash of the sorted file listings for all five directories.
    pub listing_hash: String,
    /// RFC 3339 timestamp recording when the session was first started.
    pub created_at: String,
    /// Version map for all tools involved in the session.
    pub tool_versions: BTreeMap<String, String>,
}
