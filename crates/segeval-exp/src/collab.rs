//! Interfaces to the host application: dataset loading, surface
//! reconstruction, display and confirmation prompts.
//!
//! The controller only talks to these traits. Headless implementations are
//! provided for command-line sessions and tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use segeval_core::errors::{ErrorInfo, EvalError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::controller::SlotView;
use crate::cursor::Navigation;

/// Opaque identifier of a dataset held by a [`DatasetLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetHandle(u64);

impl DatasetHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// What a loaded file represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetKind {
    Volume,
    Segmentation,
}

/// Retrieves volumes and segmentations from disk.
pub trait DatasetLoader {
    /// Loads the file at `path`. May take a long time; runs to completion.
    fn load(&mut self, path: &Path, kind: DatasetKind) -> Result<DatasetHandle, EvalError>;

    /// Releases a dataset previously returned by [`DatasetLoader::load`].
    fn unload(&mut self, handle: DatasetHandle);
}

/// Builds a closed-surface representation for a loaded segmentation.
pub trait SurfaceBuilder {
    fn build_closed_surface(&mut self, segmentation: DatasetHandle);
}

/// Interactive surface showing the current dataset.
pub trait DisplaySurface {
    /// Toggles the busy indicator around dataset loads.
    fn set_busy(&mut self, busy: bool);

    fn show(&mut self, view: &SlotView, volume: DatasetHandle, segmentation: DatasetHandle);

    fn clear(&mut self);
}

/// Yes/no prompt issued before leaving the current slot.
pub trait Confirmer {
    fn confirm(&mut self, navigation: Navigation, question: &str) -> bool;
}

/// The set of host services an [`crate::ExperimentController`] drives.
pub struct Collaborators {
    pub loader: Box<dyn DatasetLoader>,
    pub surfaces: Box<dyn SurfaceBuilder>,
    pub display: Box<dyn DisplaySurface>,
    pub confirmer: Box<dyn Confirmer>,
}

impl Collaborators {
    /// File-probing loader, no surfaces, log-only display, automatic "yes".
    pub fn headless() -> Self {
        Self {
            loader: Box::new(FileProbeLoader::default()),
            surfaces: Box::new(NoSurfaces),
            display: Box::new(TracingDisplay),
            confirmer: Box::new(AutoConfirm(true)),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Loader that checks each file is present and readable and hands out handles.
#[derive(Debug, Default)]
pub struct FileProbeLoader {
    next: u64,
    open: BTreeMap<DatasetHandle, PathBuf>,
}

impl DatasetLoader for FileProbeLoader {
    fn load(&mut self, path: &Path, kind: DatasetKind) -> Result<DatasetHandle, EvalError> {
        let metadata = fs::metadata(path).map_err(|err| {
            EvalError::Dataset(
                ErrorInfo::new("dataset.load", "failed to open dataset")
                    .with_context("path", path.display().to_string())
                    .with_context("kind", format!("{kind:?}"))
                    .with_hint(err.to_string()),
            )
        })?;
        if !metadata.is_file() {
            return Err(EvalError::Dataset(
                ErrorInfo::new("dataset.load", "dataset path is not a file")
                    .with_context("path", path.display().to_string()),
            ));
        }
        self.next += 1;
        let handle = DatasetHandle::from_raw(self.next);
        self.open.insert(handle, path.to_path_buf());
        debug!(handle = handle.as_raw(), ?kind, bytes = metadata.len(), "dataset probed");
        Ok(handle)
    }

    fn unload(&mut self, handle: DatasetHandle) {
        self.open.remove(&handle);
    }
}

/// Surface builder that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSurfaces;

impl SurfaceBuilder for NoSurfaces {
    fn build_closed_surface(&mut self, _segmentation: DatasetHandle) {}
}

/// Display that reports the blinded slot view through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDisplay;

impl DisplaySurface for TracingDisplay {
    fn set_busy(&mut self, busy: bool) {
        debug!(busy, "display busy state");
    }

    fn show(&mut self, view: &SlotView, _volume: DatasetHandle, _segmentation: DatasetHandle) {
        info!(
            evaluation = view.evaluation,
            total = view.total,
            volume = %view.volume_file,
            "showing dataset"
        );
    }

    fn clear(&mut self) {
        debug!("display cleared");
    }
}

/// Confirmer that always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirmer for AutoConfirm {
    fn confirm(&mut self, _navigation: Navigation, _question: &str) -> bool {
        self.0
    }
}
