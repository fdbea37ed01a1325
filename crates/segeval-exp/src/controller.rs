//! Experiment workflow: initialize, start, navigate, save.
//!
//! The controller owns the file listings, the presentation order, the cursor
//! and the score table for one run. Every navigation that moves the cursor
//! saves the current slot, releases the displayed dataset, moves, and then
//! loads the dataset and any saved scores of the new slot. All of it runs on
//! the caller's thread.

use segeval_core::errors::{ErrorInfo, EvalError};
use segeval_core::{Score, Scores, Seed, METHOD_COUNT, QUESTION_COUNT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collab::{Collaborators, DatasetHandle, DatasetKind};
use crate::config::ExperimentConfig;
use crate::cursor::{EvaluationCursor, Navigation, Step};
use crate::indexer::FileSet;
use crate::order::{generate_order, PresentationOrder};
use crate::session::{
    build_provenance, check_resumable, load_provenance, sidecar_path, store_provenance,
};
use crate::store::{ScoreRecord, ScoreStore, EXPORT_ERROR_CODE};

/// Callback notified after every configuration change with the new `can_start()`.
pub type ConfigObserver = Box<dyn FnMut(&ExperimentConfig, bool)>;

/// What the evaluator may see about the current slot. The method is withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    pub index: usize,
    /// One-based evaluation number.
    pub evaluation: usize,
    pub total: usize,
    pub volume_file: String,
    /// Whether scores were saved for this slot before.
    pub scored: bool,
}

/// Progress counters of a running experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub current_evaluation: usize,
    pub total_evaluations: usize,
    pub fraction: f64,
    pub scored: usize,
}

/// Result of a navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The cursor moved. `export_error` holds a failed export of the slot that
    /// was left; its scores are still in the in-memory table.
    Moved {
        from: usize,
        to: usize,
        export_error: Option<EvalError>,
    },
    AlreadyFirst,
    AlreadyLast,
    /// The evaluator answered "no" to the confirmation prompt.
    Declined,
}

/// Summary of a successful start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReport {
    pub seed: Seed,
    pub total_evaluations: usize,
    /// Whether scores were reloaded from an existing table.
    pub resumed: bool,
    pub scored: usize,
}

/// Listings and empty table produced by `initialize`.
#[derive(Debug, Clone)]
struct Prepared {
    files: FileSet,
    store: ScoreStore,
}

#[derive(Debug, Clone, Copy)]
struct LoadedDataset {
    volume: DatasetHandle,
    segmentation: DatasetHandle,
}

#[derive(Debug)]
struct Session {
    files: FileSet,
    order: PresentationOrder,
    cursor: EvaluationCursor,
    store: ScoreStore,
    current: Option<LoadedDataset>,
    draft: Scores,
}

impl Session {
    fn view(&self, index: usize) -> Option<SlotView> {
        let slot = self.order.get(index)?;
        Some(SlotView {
            index,
            evaluation: index + 1,
            total: self.order.len(),
            volume_file: self.files.volume_name(slot.sequence)?.to_string(),
            scored: self.store.load(index).is_some(),
        })
    }

    fn record_for_current(&self) -> Result<ScoreRecord, EvalError> {
        let index = self.cursor.index();
        let slot = self
            .order
            .get(index)
            .ok_or_else(|| slot_error("current slot is outside the presentation order", index))?;
        let volume_file = self
            .files
            .volume_name(slot.sequence)
            .ok_or_else(|| slot_error("volume listing does not cover slot", index))?;
        let segmentation_file = self
            .files
            .segmentation_name(slot)
            .ok_or_else(|| slot_error("segmentation listing does not cover slot", index))?;
        Ok(ScoreRecord {
            slot,
            volume_file: volume_file.to_string(),
            segmentation_file: segmentation_file.to_string(),
            scores: self.draft,
        })
    }

    /// Writes the draft into the table at the cursor. The row is updated even
    /// when the export that follows fails.
    fn save_current(&mut self) -> Result<(), EvalError> {
        let record = self.record_for_current()?;
        self.store.save(self.cursor.index(), record)
    }

    fn restore_draft(&mut self) {
        self.draft = self
            .store
            .load(self.cursor.index())
            .map(|record| record.scores)
            .unwrap_or_default();
    }

    fn release(&mut self, collaborators: &mut Collaborators) {
        if let Some(dataset) = self.current.take() {
            collaborators.display.clear();
            collaborators.loader.unload(dataset.segmentation);
            collaborators.loader.unload(dataset.volume);
        }
    }

    /// Loads the dataset of the slot under the cursor and shows it.
    fn load_current(&mut self, collaborators: &mut Collaborators) -> Result<(), EvalError> {
        let index = self.cursor.index();
        let slot = self
            .order
            .get(index)
            .ok_or_else(|| slot_error("current slot is outside the presentation order", index))?;
        let volume_path = self
            .files
            .volume_path(slot.sequence)
            .ok_or_else(|| slot_error("volume listing does not cover slot", index))?;
        let segmentation_path = self
            .files
            .segmentation_path(slot)
            .ok_or_else(|| slot_error("segmentation listing does not cover slot", index))?;

        collaborators.display.set_busy(true);
        let loaded = collaborators
            .loader
            .load(&volume_path, DatasetKind::Volume)
            .and_then(|volume| {
                match collaborators
                    .loader
                    .load(&segmentation_path, DatasetKind::Segmentation)
                {
                    Ok(segmentation) => Ok(LoadedDataset {
                        volume,
                        segmentation,
                    }),
                    Err(err) => {
                        collaborators.loader.unload(volume);
                        Err(err)
                    }
                }
            });
        if let Ok(dataset) = &loaded {
            collaborators
                .surfaces
                .build_closed_surface(dataset.segmentation);
        }
        collaborators.display.set_busy(false);

        let dataset = loaded?;
        self.current = Some(dataset);
        if let Some(view) = self.view(index) {
            collaborators
                .display
                .show(&view, dataset.volume, dataset.segmentation);
        }
        debug!(index, method = slot.method, sequence = slot.sequence, "dataset loaded");
        Ok(())
    }

    fn progress(&self) -> Progress {
        Progress {
            current_evaluation: self.cursor.current_evaluation(),
            total_evaluations: self.cursor.total_evaluations(),
            fraction: self.cursor.progress_fraction(),
            scored: self.store.scored_count(),
        }
    }
}

fn slot_error(message: &str, index: usize) -> EvalError {
    EvalError::Navigation(ErrorInfo::new("navigation.slot", message).with_context("index", index.to_string()))
}

fn not_started() -> EvalError {
    EvalError::Navigation(
        ErrorInfo::new("navigation.not-started", "no experiment is running")
            .with_hint("initialize and start the experiment first"),
    )
}

/// Drives one blinded evaluation experiment.
pub struct ExperimentController {
    config: ExperimentConfig,
    collaborators: Collaborators,
    observers: Vec<ConfigObserver>,
    prepared: Option<Prepared>,
    session: Option<Session>,
}

impl std::fmt::Debug for ExperimentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentController")
            .field("config", &self.config)
            .field("initialized", &self.prepared.is_some())
            .field("started", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl ExperimentController {
    pub fn new(config: ExperimentConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            observers: Vec::new(),
            prepared: None,
            session: None,
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Registers a callback run after every configuration change.
    pub fn subscribe(&mut self, observer: ConfigObserver) {
        self.observers.push(observer);
    }

    /// Applies `change` to the configuration and notifies observers.
    pub fn update_config(&mut self, change: impl FnOnce(&mut ExperimentConfig)) {
        change(&mut self.config);
        let can_start = self.config.can_start();
        for observer in &mut self.observers {
            observer(&self.config, can_start);
        }
    }

    /// Parses `text` as the order seed. An invalid seed leaves the configuration unchanged.
    pub fn set_seed_text(&mut self, text: &str) -> Result<Seed, EvalError> {
        let seed = Seed::parse(text)?;
        self.update_config(|config| config.seed = Some(seed));
        Ok(seed)
    }

    /// Replaces the configured seed with a fresh random one.
    pub fn regenerate_seed(&mut self) -> Seed {
        let seed = Seed::random();
        self.update_config(|config| config.seed = Some(seed));
        seed
    }

    /// True when every required configuration entry is set.
    pub fn can_start(&self) -> bool {
        self.config.can_start()
    }

    pub fn is_initialized(&self) -> bool {
        self.prepared.is_some() || self.session.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    /// Indexes the five directories and allocates an empty score table.
    ///
    /// Returns the number of evaluations. On failure the previous experiment,
    /// if any, is left untouched.
    pub fn initialize(&mut self) -> Result<usize, EvalError> {
        let files = FileSet::index(&self.config.volumes_dir, &self.config.method_dirs);
        let sequence_count = files.sequence_count().map_err(|err| {
            warn!(code = err.code(), "experiment initialization rejected");
            err
        })?;
        let store = ScoreStore::initialize(sequence_count * METHOD_COUNT);
        let total = store.len();

        self.teardown();
        self.prepared = Some(Prepared { files, store });
        info!(sequences = sequence_count, evaluations = total, "experiment initialized");
        Ok(total)
    }

    /// Builds the presentation order for `seed` and shows the first slot.
    ///
    /// With `resume` enabled and an existing score table at the output path,
    /// saved scores are reloaded after checking they belong to this order.
    pub fn start(&mut self, seed: Seed) -> Result<StartReport, EvalError> {
        let prepared = self.prepared.as_ref().ok_or_else(|| {
            EvalError::Config(
                ErrorInfo::new("config.not-initialized", "experiment was not initialized")
                    .with_hint("call initialize before start"),
            )
        })?;
        let sequence_count = prepared.files.sequence_count()?;
        let order = generate_order(seed, sequence_count);
        let cursor = EvaluationCursor::new(order.len())?;
        let output = self.config.output_file.clone();
        let sidecar = sidecar_path(&output);
        let provenance = build_provenance(&order, &prepared.files)?;

        let resumed = self.config.resume && output.is_file();
        let (store, provenance) = if resumed {
            let store = ScoreStore::read_csv(&output, order.len())?;
            verify_against_order(&store, &order, &prepared.files)?;
            let provenance = match load_provenance(&sidecar)? {
                Some(recorded) => {
                    check_resumable(&recorded, &provenance)?;
                    recorded
                }
                None => provenance,
            };
            (store, provenance)
        } else {
            (prepared.store.clone(), provenance)
        };
        let store = store.with_export_path(&output);

        let Some(prepared) = self.prepared.take() else {
            return Err(not_started());
        };
        let mut session = Session {
            files: prepared.files.clone(),
            order,
            cursor,
            store,
            current: None,
            draft: Scores::default(),
        };
        session.restore_draft();
        if let Err(err) = session.load_current(&mut self.collaborators) {
            warn!(code = err.code(), "first dataset failed to load, start aborted");
            self.prepared = Some(prepared);
            return Err(err);
        }

        if !resumed {
            if let Err(err) = session.store.export_csv(&output) {
                warn!(error = %err, "initial score table not written");
            }
        }
        if let Err(err) = store_provenance(&sidecar, &provenance) {
            warn!(error = %err, "session provenance not written");
        }

        let report = StartReport {
            seed,
            total_evaluations: session.order.len(),
            resumed,
            scored: session.store.scored_count(),
        };
        info!(
            seed = %seed,
            evaluations = report.total_evaluations,
            resumed,
            scored = report.scored,
            "experiment started"
        );
        self.session = Some(session);
        Ok(report)
    }

    /// Initializes and starts with the configured seed.
    pub fn launch(&mut self) -> Result<StartReport, EvalError> {
        self.config.ensure_complete()?;
        let seed = self.config.seed.ok_or_else(|| {
            EvalError::Config(ErrorInfo::new("config.seed", "no seed configured"))
        })?;
        self.initialize()?;
        self.start(seed)
    }

    /// Sets the answer to question `question` (1 to 4) for the current slot.
    pub fn set_score(&mut self, question: usize, value: i64) -> Result<(), EvalError> {
        let session = self.session.as_mut().ok_or_else(not_started)?;
        if !(1..=QUESTION_COUNT).contains(&question) {
            return Err(EvalError::Config(
                ErrorInfo::new("score.question", "question must be between 1 and 4")
                    .with_context("question", question.to_string()),
            ));
        }
        let score = Score::new(value)?;
        session.draft.set(question - 1, score)
    }

    /// Sets all four answers for the current slot. Nothing changes if any is invalid.
    pub fn set_scores(&mut self, values: [i64; QUESTION_COUNT]) -> Result<(), EvalError> {
        let session = self.session.as_mut().ok_or_else(not_started)?;
        session.draft = Scores::from_values(values)?;
        Ok(())
    }

    /// Answers currently entered for the slot under the cursor.
    pub fn draft_scores(&self) -> Option<Scores> {
        self.session.as_ref().map(|session| session.draft)
    }

    /// Saves the current answers and exports the table.
    pub fn save(&mut self) -> Result<(), EvalError> {
        let session = self.session.as_mut().ok_or_else(not_started)?;
        session.save_current()?;
        info!(evaluation = session.cursor.current_evaluation(), "scores saved");
        Ok(())
    }

    pub fn first(&mut self) -> Result<NavigationOutcome, EvalError> {
        self.navigate(Navigation::First)
    }

    pub fn previous(&mut self) -> Result<NavigationOutcome, EvalError> {
        self.navigate(Navigation::Previous)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<NavigationOutcome, EvalError> {
        self.navigate(Navigation::Next)
    }

    pub fn last(&mut self) -> Result<NavigationOutcome, EvalError> {
        self.navigate(Navigation::Last)
    }

    /// Save current, release, move, load new.
    ///
    /// Loads run to completion inside this call, so a second request cannot
    /// arrive while one is in flight.
    ///
    /// If the new dataset cannot be loaded the cursor returns to the slot it
    /// left and that slot's dataset is loaded again.
    pub fn navigate(&mut self, navigation: Navigation) -> Result<NavigationOutcome, EvalError> {
        let Self {
            config,
            collaborators,
            session,
            ..
        } = self;
        let session = session.as_mut().ok_or_else(not_started)?;

        let step = session.cursor.plan(navigation);
        let (from, to) = match step {
            Step::Move { from, to } => (from, to),
            Step::AlreadyFirst => {
                info!(request = navigation.label(), "already at the first evaluation");
                return Ok(NavigationOutcome::AlreadyFirst);
            }
            Step::AlreadyLast => {
                info!(request = navigation.label(), "already at the last evaluation");
                return Ok(NavigationOutcome::AlreadyLast);
            }
        };

        if config.confirm_navigation && navigation.needs_confirmation() {
            let question = format!(
                "Leave evaluation {} of {} and go to evaluation {}?",
                from + 1,
                session.cursor.total_evaluations(),
                to + 1
            );
            if !collaborators.confirmer.confirm(navigation, &question) {
                info!(request = navigation.label(), "navigation declined");
                return Ok(NavigationOutcome::Declined);
            }
        }

        let export_error = match session.save_current() {
            Ok(()) => None,
            Err(err) if err.code() == EXPORT_ERROR_CODE => {
                warn!(error = %err, "scores kept in memory, export failed");
                Some(err)
            }
            Err(err) => return Err(err),
        };

        session.release(collaborators);
        session.cursor.apply(step);
        if let Err(err) = session.load_current(collaborators) {
            warn!(code = err.code(), to = to + 1, "dataset failed to load, staying on current evaluation");
            session.cursor.apply(Step::Move { from: to, to: from });
            if let Err(reload) = session.load_current(collaborators) {
                warn!(code = reload.code(), "previous dataset could not be reloaded");
            }
            return Err(err);
        }
        session.restore_draft();

        info!(
            from = from + 1,
            to = to + 1,
            total = session.cursor.total_evaluations(),
            "moved to evaluation"
        );
        Ok(NavigationOutcome::Moved {
            from,
            to,
            export_error,
        })
    }

    pub fn is_first(&self) -> Option<bool> {
        self.session.as_ref().map(|session| session.cursor.is_first())
    }

    pub fn is_last(&self) -> Option<bool> {
        self.session.as_ref().map(|session| session.cursor.is_last())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.cursor.index())
    }

    /// Number of evaluation slots once the experiment is initialized.
    pub fn total_evaluations(&self) -> Option<usize> {
        match (&self.session, &self.prepared) {
            (Some(session), _) => Some(session.order.len()),
            (None, Some(prepared)) => Some(prepared.store.len()),
            (None, None) => None,
        }
    }

    pub fn progress(&self) -> Option<Progress> {
        self.session.as_ref().map(Session::progress)
    }

    /// Blinded description of the current slot.
    pub fn current_view(&self) -> Option<SlotView> {
        let session = self.session.as_ref()?;
        session.view(session.cursor.index())
    }

    /// Saved record of slot `index`, `None` when unscored or not started.
    pub fn record(&self, index: usize) -> Option<&ScoreRecord> {
        self.session.as_ref()?.store.load(index)
    }

    /// The presentation order of the running experiment, for audit.
    pub fn order(&self) -> Option<&PresentationOrder> {
        self.session.as_ref().map(|session| &session.order)
    }

    pub fn store(&self) -> Option<&ScoreStore> {
        self.session.as_ref().map(|session| &session.store)
    }

    /// Releases the current dataset and discards the running experiment.
    ///
    /// Call when the host leaves the module or closes its scene.
    pub fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.release(&mut self.collaborators);
            info!(scored = session.store.scored_count(), "experiment closed");
        }
        self.prepared = None;
    }
}

impl Drop for ExperimentController {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.release(&mut self.collaborators);
        }
    }
}

/// Confirms that every saved row of a reloaded table belongs to `order`.
fn verify_against_order(
    store: &ScoreStore,
    order: &PresentationOrder,
    files: &FileSet,
) -> Result<(), EvalError> {
    for (index, row) in store.rows().enumerate() {
        let Some(record) = row else {
            continue;
        };
        let expected = order.get(index);
        let names_match = files.volume_name(record.slot.sequence) == Some(record.volume_file.as_str())
            && files.segmentation_name(record.slot) == Some(record.segmentation_file.as_str());
        if expected != Some(record.slot) || !names_match {
            return Err(EvalError::Store(
                ErrorInfo::new(
                    "store.resume-mismatch",
                    "saved scores do not match the presentation order",
                )
                .with_context("row", index.to_string())
                .with_hint("use the seed and directories of the recorded session, or disable resume"),
            ));
        }
    }
    Ok(())
}
