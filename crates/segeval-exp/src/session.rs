use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use segeval_core::errors::{ErrorInfo, EvalError};
use segeval_core::{SchemaVersion, SessionProvenance};

use crate::hash::stable_hash_string;
use crate::indexer::FileSet;
use crate::order::PresentationOrder;
use crate::serde::{from_json_slice, to_canonical_json_bytes};

/// Schema of the provenance sidecar written next to the score table.
pub const PROVENANCE_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Location of the provenance sidecar for a score table.
pub fn sidecar_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".session.json");
    output.with_file_name(name)
}

/// Describes the session about to start.
pub fn build_provenance(
    order: &PresentationOrder,
    files: &FileSet,
) -> Result<SessionProvenance, EvalError> {
    let mut tool_versions = BTreeMap::new();
    tool_versions.insert(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    Ok(SessionProvenance {
        schema_version: PROVENANCE_SCHEMA,
        seed: order.seed().value(),
        sequence_count: order.sequence_count(),
        order_hash: order.hash()?,
        listing_hash: stable_hash_string(&listing_names(files))?,
        created_at: Utc::now().to_rfc3339(),
        tool_versions,
    })
}

/// Reads a sidecar, returning `None` when there is none yet.
pub fn load_provenance(path: &Path) -> Result<Option<SessionProvenance>, EvalError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path).map_err(|err| {
        EvalError::Store(
            ErrorInfo::new("session.read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    from_json_slice(&bytes).map(Some)
}

/// Writes a sidecar, creating its directory when needed.
pub fn store_provenance(path: &Path, provenance: &SessionProvenance) -> Result<(), EvalError> {
    let bytes = to_canonical_json_bytes(provenance)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            EvalError::Store(
                ErrorInfo::new("session.write", err.to_string())
                    .with_context("path", parent.display().to_string()),
            )
        })?;
    }
    fs::write(path, bytes).map_err(|err| {
        EvalError::Store(
            ErrorInfo::new("session.write", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })
}

/// Checks that a recorded session describes the same order and file listings.
pub fn check_resumable(
    recorded: &SessionProvenance,
    current: &SessionProvenance,
) -> Result<(), EvalError> {
    if !PROVENANCE_SCHEMA.is_compatible_with(&recorded.schema_version) {
        return Err(mismatch(
            ErrorInfo::new("store.resume-mismatch", "incompatible session schema")
                .with_context("field", "schema_version"),
        ));
    }
    if recorded.order_hash != current.order_hash {
        return Err(mismatch(
            ErrorInfo::new(
                "store.resume-mismatch",
                "presentation order differs from recorded session",
            )
            .with_context("field", "order_hash")
            .with_context("recorded_seed", recorded.seed.to_string())
            .with_context("current_seed", current.seed.to_string()),
        ));
    }
    if recorded.listing_hash != current.listing_hash {
        return Err(mismatch(
            ErrorInfo::new(
                "store.resume-mismatch",
                "dataset files changed since the session was recorded",
            )
            .with_context("field", "listing_hash"),
        ));
    }
    Ok(())
}

fn listing_names(files: &FileSet) -> Vec<&[String]> {
    std::iter::once(files.volumes.files.as_slice())
        .chain(files.methods.iter().map(|listing| listing.files.as_slice()))
        .collect()
}

fn mismatch(info: ErrorInfo) -> EvalError {
    EvalError::Store(
        info.with_hint("use the seed and directories of the recorded session, or disable resume"),
    )
}
