//! Directory listings for volumes and per-method segmentations.

use std::path::{Path, PathBuf};

use segeval_core::errors::{ErrorInfo, EvalError};
use segeval_core::{Slot, METHOD_COUNT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File name suffixes recognised as volumes or segmentations.
pub const RECOGNIZED_EXTENSIONS: [&str; 5] = [".nii.gz", ".nii", ".dcm", ".nrrd", ".seg.nrrd"];

/// Outcome of looking up a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    Found,
    DirectoryNotFound,
}

/// Sorted, filtered file names of one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub directory: PathBuf,
    pub status: ListingStatus,
    pub files: Vec<String>,
}

impl FileListing {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Full path of the `index`-th file.
    pub fn path_of(&self, index: usize) -> Option<PathBuf> {
        self.files.get(index).map(|name| self.directory.join(name))
    }
}

/// Whether `name` ends with one of [`RECOGNIZED_EXTENSIONS`].
pub fn is_recognized(name: &str) -> bool {
    RECOGNIZED_EXTENSIONS
        .iter()
        .any(|extension| name.ends_with(extension))
}

/// Lists recognised files directly inside `dir`, sorted by name.
///
/// A missing directory yields an empty listing with
/// [`ListingStatus::DirectoryNotFound`] rather than an error; the consistency
/// check decides whether the experiment may proceed.
pub fn list_files(dir: &Path) -> FileListing {
    if !dir.is_dir() {
        warn!(directory = %dir.display(), "directory does not exist");
        return FileListing {
            directory: dir.to_path_buf(),
            status: ListingStatus::DirectoryNotFound,
            files: Vec::new(),
        };
    }

    let mut files: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(directory = %dir.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| match entry.file_name().to_str() {
            Some(name) => Some(name.to_owned()),
            None => {
                debug!(path = %entry.path().display(), "skipping non UTF-8 file name");
                None
            }
        })
        .filter(|name| is_recognized(name))
        .collect();
    files.sort();

    debug!(directory = %dir.display(), files = files.len(), "indexed directory");
    FileListing {
        directory: dir.to_path_buf(),
        status: ListingStatus::Found,
        files,
    }
}

/// True iff the volume listing and all method listings have the same length.
pub fn validate_consistency(volumes: &[String], methods: [&[String]; METHOD_COUNT]) -> bool {
    methods.iter().all(|files| files.len() == volumes.len())
}

/// Listings for the volumes directory and the four method directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    pub volumes: FileListing,
    pub methods: [FileListing; METHOD_COUNT],
}

impl FileSet {
    /// Indexes all five directories.
    pub fn index(volumes_dir: &Path, method_dirs: &[PathBuf; METHOD_COUNT]) -> Self {
        Self {
            volumes: list_files(volumes_dir),
            methods: [
                list_files(&method_dirs[0]),
                list_files(&method_dirs[1]),
                list_files(&method_dirs[2]),
                list_files(&method_dirs[3]),
            ],
        }
    }

    pub fn is_consistent(&self) -> bool {
        validate_consistency(
            &self.volumes.files,
            [
                self.methods[0].files.as_slice(),
                self.methods[1].files.as_slice(),
                self.methods[2].files.as_slice(),
                self.methods[3].files.as_slice(),
            ],
        )
    }

    /// Number of volumes, once the listings are consistent and non-empty.
    pub fn sequence_count(&self) -> Result<usize, EvalError> {
        let missing: Vec<&FileListing> = self
            .listings()
            .filter(|listing| listing.status == ListingStatus::DirectoryNotFound)
            .collect();
        if let Some(first) = missing.first() {
            return Err(EvalError::Config(
                ErrorInfo::new("config.directory-not-found", "directory does not exist")
                    .with_context("path", first.directory.display().to_string())
                    .with_context("missing", missing.len().to_string()),
            ));
        }
        if !self.is_consistent() {
            let mut info = ErrorInfo::new(
                "config.count-mismatch",
                "number of files in volume and method directories must be equal",
            )
            .with_context("volumes", self.volumes.len().to_string());
            for (method, listing) in self.methods.iter().enumerate() {
                info = info.with_context(format!("method{}", method + 1), listing.len().to_string());
            }
            return Err(EvalError::Config(info));
        }
        if self.volumes.is_empty() {
            return Err(EvalError::Config(
                ErrorInfo::new("config.empty", "no recognised dataset files found")
                    .with_context("path", self.volumes.directory.display().to_string())
                    .with_hint(format!(
                        "expected files ending in one of {}",
                        RECOGNIZED_EXTENSIONS.join(", ")
                    )),
            ));
        }
        Ok(self.volumes.len())
    }

    pub fn volume_name(&self, sequence: usize) -> Option<&str> {
        self.volumes.files.get(sequence).map(String::as_str)
    }

    pub fn segmentation_name(&self, slot: Slot) -> Option<&str> {
        self.methods
            .get(slot.method)?
            .files
            .get(slot.sequence)
            .map(String::as_str)
    }

    pub fn volume_path(&self, sequence: usize) -> Option<PathBuf> {
        self.volumes.path_of(sequence)
    }

    pub fn segmentation_path(&self, slot: Slot) -> Option<PathBuf> {
        self.methods.get(slot.method)?.path_of(slot.sequence)
    }

    fn listings(&self) -> impl Iterator<Item = &FileListing> {
        std::iter::once(&self.volumes).chain(self.methods.iter())
    }
}
