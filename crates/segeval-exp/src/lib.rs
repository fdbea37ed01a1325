//! Experiment sequencing, navigation and score persistence for blinded
//! segmentation evaluation.

mod collab;
mod config;
mod controller;
mod cursor;
mod hash;
mod indexer;
mod order;
mod serde;
mod session;
mod store;

pub use collab::{
    AutoConfirm, Collaborators, Confirmer, DatasetHandle, DatasetKind, DatasetLoader,
    DisplaySurface, FileProbeLoader, NoSurfaces, SurfaceBuilder, TracingDisplay,
};
pub use config::{ConfigField, ExperimentConfig};
pub use controller::{
    ConfigObserver, ExperimentController, NavigationOutcome, Progress, SlotView, StartReport,
};
pub use cursor::{EvaluationCursor, Navigation, Step};
pub use hash::stable_hash_string;
pub use indexer::{
    is_recognized, list_files, validate_consistency, FileListing, FileSet, ListingStatus,
    RECOGNIZED_EXTENSIONS,
};
pub use order::{generate_order, PresentationOrder};
pub use session::{
    build_provenance, check_resumable, load_provenance, sidecar_path, store_provenance,
    PROVENANCE_SCHEMA,
};
pub use store::{ScoreRecord, ScoreStore, COLUMNS, EXPORT_ERROR_CODE, UNSET_SCORE, UNSET_TEXT};

pub use crate::serde::{from_json_slice, to_canonical_json_bytes};
