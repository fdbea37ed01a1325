//! Score table keyed by presentation-order slot, with CSV export and resume.

use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use segeval_core::errors::{ErrorInfo, EvalError};
use segeval_core::{Scores, Slot, METHOD_COUNT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Integer written for a score column of a slot that has not been scored.
pub const UNSET_SCORE: i64 = -1;

/// Text written for a file column of a slot that has not been scored.
pub const UNSET_TEXT: &str = "N/A";

/// Error code raised when the table could not be written to its export path.
pub const EXPORT_ERROR_CODE: &str = "store.export";

/// Column headers of the exported table, in order.
pub const COLUMNS: [&str; 8] = [
    "Sequence",
    "Method",
    "VolumeFile",
    "SegmentationFile",
    "Q1",
    "Q2",
    "Q3",
    "Q4",
];

/// Scores and file identities recorded for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub slot: Slot,
    pub volume_file: String,
    pub segmentation_file: String,
    pub scores: Scores,
}

/// On-disk row shape. Unscored rows carry the sentinels in every column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ScoreRow {
    #[serde(rename = "Sequence")]
    sequence: i64,
    #[serde(rename = "Method")]
    method: i64,
    #[serde(rename = "VolumeFile")]
    volume_file: String,
    #[serde(rename = "SegmentationFile")]
    segmentation_file: String,
    #[serde(rename = "Q1")]
    q1: i64,
    #[serde(rename = "Q2")]
    q2: i64,
    #[serde(rename = "Q3")]
    q3: i64,
    #[serde(rename = "Q4")]
    q4: i64,
}

impl ScoreRow {
    fn unset() -> Self {
        Self {
            sequence: UNSET_SCORE,
            method: UNSET_SCORE,
            volume_file: UNSET_TEXT.to_string(),
            segmentation_file: UNSET_TEXT.to_string(),
            q1: UNSET_SCORE,
            q2: UNSET_SCORE,
            q3: UNSET_SCORE,
            q4: UNSET_SCORE,
        }
    }

    fn from_record(record: Option<&ScoreRecord>) -> Self {
        let Some(record) = record else {
            return Self::unset();
        };
        let [q1, q2, q3, q4] = record.scores.values();
        Self {
            sequence: record.slot.sequence as i64,
            method: record.slot.method as i64,
            volume_file: record.volume_file.clone(),
            segmentation_file: record.segmentation_file.clone(),
            q1,
            q2,
            q3,
            q4,
        }
    }

    fn into_record(self, row: usize) -> Result<Option<ScoreRecord>, EvalError> {
        let values = [self.q1, self.q2, self.q3, self.q4];
        let unset = values.iter().filter(|&&value| value == UNSET_SCORE).count();
        if unset == values.len() {
            return Ok(None);
        }
        if unset > 0 {
            return Err(corrupt_row(row, "row is partially scored"));
        }
        let sequence = usize::try_from(self.sequence)
            .map_err(|_| corrupt_row(row, "negative sequence index on a scored row"))?;
        let method = usize::try_from(self.method)
            .ok()
            .filter(|&method| method < METHOD_COUNT)
            .ok_or_else(|| corrupt_row(row, "method index out of range"))?;
        let scores = Scores::from_values(values).map_err(|err| {
            EvalError::Store(
                ErrorInfo::new("store.corrupt-row", err.info().message.clone())
                    .with_context("row", row.to_string()),
            )
        })?;
        Ok(Some(ScoreRecord {
            slot: Slot::new(method, sequence),
            volume_file: self.volume_file,
            segmentation_file: self.segmentation_file,
            scores,
        }))
    }
}

fn corrupt_row(row: usize, message: &str) -> EvalError {
    EvalError::Store(
        ErrorInfo::new("store.corrupt-row", message).with_context("row", row.to_string()),
    )
}

/// One row per presentation-order slot; `None` means not yet scored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScoreStore {
    rows: Vec<Option<ScoreRecord>>,
    export_path: Option<PathBuf>,
}

impl ScoreStore {
    /// Allocates `row_count` unscored rows.
    pub fn initialize(row_count: usize) -> Self {
        Self {
            rows: vec![None; row_count],
            export_path: None,
        }
    }

    /// Exports the table to `path` after every save.
    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    pub fn export_path(&self) -> Option<&Path> {
        self.export_path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows holding a saved record.
    pub fn scored_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_some()).count()
    }

    /// Overwrites row `index` and exports the table.
    ///
    /// The in-memory row is updated before the export runs, so an export
    /// failure is returned to the caller without losing the record.
    pub fn save(&mut self, index: usize, record: ScoreRecord) -> Result<(), EvalError> {
        let row_count = self.rows.len();
        let row = self.rows.get_mut(index).ok_or_else(|| {
            EvalError::Store(
                ErrorInfo::new("store.index", "row index out of range")
                    .with_context("index", index.to_string())
                    .with_context("rows", row_count.to_string()),
            )
        })?;
        debug!(index, sequence = record.slot.sequence, method = record.slot.method, "saving scores");
        *row = Some(record);
        match &self.export_path {
            Some(path) => self.export_csv(path),
            None => Ok(()),
        }
    }

    /// Returns the saved record at `index`, or `None` when it was never scored.
    pub fn load(&self, index: usize) -> Option<&ScoreRecord> {
        self.rows.get(index).and_then(Option::as_ref)
    }

    /// Iterates over every row in slot order.
    pub fn rows(&self) -> impl Iterator<Item = Option<&ScoreRecord>> {
        self.rows.iter().map(Option::as_ref)
    }

    /// Writes the whole table to `path`.
    ///
    /// Rows go to a sibling temporary file first and replace `path` by rename,
    /// so readers never observe a half-written table.
    pub fn export_csv(&self, path: &Path) -> Result<(), EvalError> {
        ensure_parent(path)?;
        let staging = staging_path(path);
        let mut writer = WriterBuilder::new()
            .has_headers(true)
            .from_path(&staging)
            .map_err(|err| wrap_csv(EXPORT_ERROR_CODE, path, err))?;
        for row in &self.rows {
            writer
                .serialize(ScoreRow::from_record(row.as_ref()))
                .map_err(|err| wrap_csv(EXPORT_ERROR_CODE, path, err))?;
        }
        writer
            .flush()
            .map_err(|err| wrap_csv(EXPORT_ERROR_CODE, path, err.into()))?;
        drop(writer);
        fs::rename(&staging, path).map_err(|err| {
            let _ = fs::remove_file(&staging);
            EvalError::Store(
                ErrorInfo::new(EXPORT_ERROR_CODE, "failed to replace score table")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        info!(path = %path.display(), rows = self.rows.len(), scored = self.scored_count(), "exported scores");
        Ok(())
    }

    /// Rebuilds a store from a previously exported table.
    ///
    /// The table must hold exactly `expected_rows` rows; a different count
    /// means it belongs to another experiment layout.
    pub fn read_csv(path: &Path, expected_rows: usize) -> Result<Self, EvalError> {
        let store = Self::open_csv(path)?;
        if store.len() != expected_rows {
            return Err(EvalError::Store(
                ErrorInfo::new("store.row-count", "score table row count does not match experiment")
                    .with_context("path", path.display().to_string())
                    .with_context("expected", expected_rows.to_string())
                    .with_context("found", store.len().to_string()),
            ));
        }
        Ok(store)
    }

    /// Reads an exported table of any length, for reporting.
    pub fn open_csv(path: &Path) -> Result<Self, EvalError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|err| wrap_csv("store.read", path, err))?;
        let headers = reader
            .headers()
            .map_err(|err| wrap_csv("store.read", path, err))?
            .clone();
        if headers.iter().ne(COLUMNS.iter().copied()) {
            return Err(EvalError::Store(
                ErrorInfo::new("store.columns", "unexpected score table columns")
                    .with_context("path", path.display().to_string())
                    .with_context("found", headers.iter().collect::<Vec<_>>().join(",")),
            ));
        }
        let mut rows = Vec::new();
        for (index, row) in reader.deserialize::<ScoreRow>().enumerate() {
            let row = row.map_err(|err| wrap_csv("store.read", path, err))?;
            rows.push(row.into_record(index)?);
        }
        Ok(Self {
            rows,
            export_path: None,
        })
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scores.csv".to_string());
    path.with_file_name(format!(".{name}.partial"))
}

fn ensure_parent(path: &Path) -> Result<(), EvalError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            EvalError::Store(
                ErrorInfo::new(EXPORT_ERROR_CODE, "failed to create output directory")
                    .with_context("path", parent.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?
    }
    Ok(())
}

fn wrap_csv(code: &str, path: &Path, err: csv::Error) -> EvalError {
    EvalError::Store(
        ErrorInfo::new(code, "CSV score table failure")
            .with_context("path", path.display().to_string())
            .with_hint(err.to_string()),
    )
}
