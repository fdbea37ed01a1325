use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use segeval_core::errors::{ErrorInfo, EvalError};
use segeval_core::{Seed, Slot};
use segeval_exp::{
    sidecar_path, Collaborators, Confirmer, DatasetHandle, DatasetKind, DatasetLoader,
    DisplaySurface, ExperimentConfig, ExperimentController, Navigation, NavigationOutcome,
    ScoreStore, SlotView, SurfaceBuilder, EXPORT_ERROR_CODE,
};
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct Log {
    next_handle: u64,
    loads: Vec<(PathBuf, DatasetKind)>,
    open: BTreeSet<DatasetHandle>,
    failing: BTreeSet<PathBuf>,
    surfaces: Vec<DatasetHandle>,
    busy: Vec<bool>,
    shown: Vec<SlotView>,
    cleared: usize,
    asked: Vec<Navigation>,
    answers: VecDeque<bool>,
}

type Shared = Rc<RefCell<Log>>;

struct FakeLoader(Shared);

impl DatasetLoader for FakeLoader {
    fn load(&mut self, path: &Path, kind: DatasetKind) -> Result<DatasetHandle, EvalError> {
        let mut log = self.0.borrow_mut();
        log.loads.push((path.to_path_buf(), kind));
        if log.failing.contains(path) {
            return Err(EvalError::Dataset(
                ErrorInfo::new("dataset.load", "unreadable")
                    .with_context("path", path.display().to_string()),
            ));
        }
        log.next_handle += 1;
        let handle = DatasetHandle::from_raw(log.next_handle);
        log.open.insert(handle);
        Ok(handle)
    }

    fn unload(&mut self, handle: DatasetHandle) {
        self.0.borrow_mut().open.remove(&handle);
    }
}

struct FakeSurfaces(Shared);

impl SurfaceBuilder for FakeSurfaces {
    fn build_closed_surface(&mut self, segmentation: DatasetHandle) {
        self.0.borrow_mut().surfaces.push(segmentation);
    }
}

struct FakeDisplay(Shared);

impl DisplaySurface for FakeDisplay {
    fn set_busy(&mut self, busy: bool) {
        self.0.borrow_mut().busy.push(busy);
    }

    fn show(&mut self, view: &SlotView, _volume: DatasetHandle, _segmentation: DatasetHandle) {
        self.0.borrow_mut().shown.push(view.clone());
    }

    fn clear(&mut self) {
        self.0.borrow_mut().cleared += 1;
    }
}

struct FakeConfirmer(Shared);

impl Confirmer for FakeConfirmer {
    fn confirm(&mut self, navigation: Navigation, _question: &str) -> bool {
        let mut log = self.0.borrow_mut();
        log.asked.push(navigation);
        log.answers.pop_front().unwrap_or(true)
    }
}

fn collaborators(log: &Shared) -> Collaborators {
    Collaborators {
        loader: Box::new(FakeLoader(log.clone())),
        surfaces: Box::new(FakeSurfaces(log.clone())),
        display: Box::new(FakeDisplay(log.clone())),
        confirmer: Box::new(FakeConfirmer(log.clone())),
    }
}

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    config: ExperimentConfig,
}

impl Fixture {
    fn new(count: usize) -> Self {
        let temp = tempdir().expect("tmp dir");
        let root = temp.path().to_path_buf();
        let volumes = root.join("volumes");
        let method_dirs = [1, 2, 3, 4].map(|method| root.join(format!("m{method}")));
        fs::create_dir_all(&volumes).expect("volumes dir");
        for dir in &method_dirs {
            fs::create_dir_all(dir).expect("method dir");
        }
        for sequence in 0..count {
            fs::write(volumes.join(format!("case{sequence}.nii.gz")), b"vol").expect("volume");
            for (method, dir) in method_dirs.iter().enumerate() {
                fs::write(dir.join(format!("case{sequence}_m{method}.nrrd")), b"seg")
                    .expect("segmentation");
            }
        }
        let config = ExperimentConfig {
            volumes_dir: volumes,
            method_dirs,
            output_file: root.join("out").join("scores.csv"),
            seed: Some(Seed::new(42)),
            ..ExperimentConfig::default()
        };
        Self {
            _temp: temp,
            root,
            config,
        }
    }

    fn segmentation_path(&self, slot: Slot) -> PathBuf {
        self.root
            .join(format!("m{}", slot.method + 1))
            .join(format!("case{}_m{}.nrrd", slot.sequence, slot.method))
    }

    fn started(&self, log: &Shared) -> ExperimentController {
        let mut controller = ExperimentController::new(self.config.clone(), collaborators(log));
        controller.launch().expect("launch");
        controller
    }
}

fn moved(outcome: NavigationOutcome) -> bool {
    matches!(outcome, NavigationOutcome::Moved { export_error: None, .. })
}

#[test]
fn scores_saved_at_last_slot_survive_a_round_trip() {
    let fixture = Fixture::new(3);
    let log = Shared::default();
    let mut controller = ExperimentController::new(fixture.config.clone(), collaborators(&log));

    assert_eq!(controller.initialize().expect("initialize"), 12);
    let report = controller.start(Seed::new(42)).expect("start");
    assert_eq!(report.total_evaluations, 12);
    assert!(!report.resumed);
    assert_eq!(controller.current_index(), Some(0));

    for _ in 0..11 {
        assert!(moved(controller.next().expect("next")));
    }
    assert_eq!(controller.is_last(), Some(true));
    assert_eq!(controller.next().expect("next"), NavigationOutcome::AlreadyLast);

    controller.set_scores([3, 4, 2, 5]).expect("scores");
    controller.save().expect("save");
    assert_eq!(
        controller.first().expect("first"),
        NavigationOutcome::Moved {
            from: 11,
            to: 0,
            export_error: None
        }
    );
    for _ in 0..11 {
        controller.next().expect("next");
    }

    assert_eq!(controller.current_index(), Some(11));
    let draft = controller.draft_scores().expect("draft");
    assert_eq!(draft.values(), [3, 4, 2, 5]);
    let record = controller.record(11).expect("record");
    assert_eq!(Some(record.slot), controller.order().and_then(|order| order.get(11)));

    let table = ScoreStore::read_csv(&fixture.config.output_file, 12).expect("read table");
    assert_eq!(table.load(11).map(|r| r.scores.values()), Some([3, 4, 2, 5]));
    assert!(sidecar_path(&fixture.config.output_file).is_file());
}

#[test]
fn same_seed_gives_same_order_across_controllers() {
    let fixture = Fixture::new(3);
    let log = Shared::default();
    let first = fixture.started(&log);
    let slots = first.order().expect("order").slots().to_vec();
    drop(first);

    let mut config = fixture.config.clone();
    config.resume = false;
    let mut second = ExperimentController::new(config, collaborators(&log));
    second.launch().expect("launch");
    assert_eq!(second.order().expect("order").slots(), slots.as_slice());
}

#[test]
fn moving_saves_the_slot_being_left() {
    let fixture = Fixture::new(2);
    let log = Shared::default();
    let mut controller = fixture.started(&log);

    controller.set_score(2, 4).expect("q2");
    assert!(moved(controller.next().expect("next")));
    let saved = controller.record(0).expect("row 0 saved");
    assert_eq!(saved.scores.values(), [1, 4, 1, 1]);
    assert_eq!(controller.draft_scores().map(|s| s.values()), Some([1, 1, 1, 1]));

    assert!(moved(controller.previous().expect("previous")));
    assert_eq!(controller.draft_scores().map(|s| s.values()), Some([1, 4, 1, 1]));
    assert_eq!(controller.progress().map(|p| p.scored), Some(2));
}

#[test]
fn boundary_requests_do_not_save_or_reload() {
    let fixture = Fixture::new(1);
    let log = Shared::default();
    let mut controller = fixture.started(&log);
    let loads = log.borrow().loads.len();

    assert_eq!(controller.previous().expect("previous"), NavigationOutcome::AlreadyFirst);
    assert_eq!(controller.first().expect("first"), NavigationOutcome::AlreadyFirst);
    controller.last().expect("last");
    assert_eq!(controller.last().expect("last"), NavigationOutcome::AlreadyLast);
    assert_eq!(controller.next().expect("next"), NavigationOutcome::AlreadyLast);
    assert_eq!(log.borrow().loads.len(), loads + 2);
    assert_eq!(controller.progress().map(|p| p.scored), Some(1));
    assert_eq!(controller.store().and_then(|store| store.load(3)), None);
}

#[test]
fn declined_confirmation_keeps_position_and_scores() {
    let fixture = Fixture::new(2);
    let log = Shared::default();
    let mut controller = fixture.started(&log);
    controller.set_scores([5, 5, 5, 5]).expect("scores");

    log.borrow_mut().answers.push_back(false);
    assert_eq!(controller.next().expect("next"), NavigationOutcome::Declined);
    assert_eq!(controller.current_index(), Some(0));
    assert_eq!(controller.record(0), None);
    assert_eq!(controller.draft_scores().map(|s| s.values()), Some([5, 5, 5, 5]));

    controller.next().expect("next");
    controller.previous().expect("previous");
    assert_eq!(
        log.borrow().asked,
        vec![Navigation::Next, Navigation::Next],
        "previous does not ask"
    );
}

#[test]
fn confirmation_can_be_disabled() {
    let mut fixture = Fixture::new(2);
    fixture.config.confirm_navigation = false;
    let log = Shared::default();
    let mut controller = fixture.started(&log);
    controller.last().expect("last");
    controller.first().expect("first");
    assert!(log.borrow().asked.is_empty());
}

#[test]
fn datasets_are_released_before_the_next_load() {
    let fixture = Fixture::new(2);
    let log = Shared::default();
    let mut controller = fixture.started(&log);
    assert_eq!(log.borrow().open.len(), 2);
    assert_eq!(log.borrow().surfaces.len(), 1);

    controller.next().expect("next");
    controller.next().expect("next");
    {
        let log = log.borrow();
        assert_eq!(log.open.len(), 2);
        assert_eq!(log.cleared, 2);
        assert_eq!(log.busy, vec![true, false, true, false, true, false]);
        let kinds: Vec<DatasetKind> = log.loads.iter().map(|(_, kind)| *kind).collect();
        assert_eq!(kinds.len(), 6);
        assert!(kinds
            .chunks(2)
            .all(|pair| pair == [DatasetKind::Volume, DatasetKind::Segmentation]));
    }

    drop(controller);
    assert!(log.borrow().open.is_empty());
}

#[test]
fn shown_view_is_blinded() {
    let fixture = Fixture::new(2);
    let log = Shared::default();
    let controller = fixture.started(&log);
    let view = log.borrow().shown.last().cloned().expect("shown");
    assert_eq!(view.evaluation, 1);
    assert_eq!(view.total, 8);
    let slot = controller.order().and_then(|order| order.get(0)).expect("slot");
    assert_eq!(view.volume_file, format!("case{}.nii.gz", slot.sequence));
    let text = serde_json::to_string(&view).expect("json");
    assert!(!text.contains("_m"), "view leaks the method: {text}");
}

#[test]
fn failed_load_rolls_back_to_previous_slot() {
    let fixture = Fixture::new(2);
    let log = Shared::default();
    let mut controller = fixture.started(&log);
    let target = controller.order().and_then(|order| order.get(1)).expect("slot");
    log.borrow_mut()
        .failing
        .insert(fixture.segmentation_path(target));

    let err = controller.next().expect_err("load fails");
    assert_eq!(err.code(), "dataset.load");
    assert_eq!(controller.current_index(), Some(0));
    assert!(controller.record(0).is_some(), "left slot was saved");
    assert_eq!(log.borrow().open.len(), 2, "previous dataset reloaded");
    assert_eq!(log.borrow().busy.last(), Some(&false));

    log.borrow_mut().failing.clear();
    assert!(moved(controller.next().expect("retry")));
    assert_eq!(controller.current_index(), Some(1));
}

#[test]
fn failed_first_load_aborts_start() {
    let fixture = Fixture::new(1);
    let log = Shared::default();
    for method in 0..4 {
        log.borrow_mut()
            .failing
            .insert(fixture.segmentation_path(Slot::new(method, 0)));
    }
    let mut controller = ExperimentController::new(fixture.config.clone(), collaborators(&log));
    controller.initialize().expect("initialize");
    let err = controller.start(Seed::new(42)).expect_err("start");
    assert_eq!(err.code(), "dataset.load");
    assert!(!controller.is_started());
    assert!(controller.is_initialized());
    assert!(log.borrow().open.is_empty());

    log.borrow_mut().failing.clear();
    controller.start(Seed::new(42)).expect("start after fix");
    assert!(controller.is_started());
}

#[test]
fn export_failure_is_reported_but_navigation_proceeds() {
    let mut fixture = Fixture::new(2);
    let blocker = fixture.root.join("blocker");
    fs::write(&blocker, b"file").expect("blocker");
    fixture.config.output_file = blocker.join("scores.csv");
    let log = Shared::default();
    let mut controller = fixture.started(&log);

    controller.set_scores([2, 3, 4, 5]).expect("scores");
    match controller.next().expect("next") {
        NavigationOutcome::Moved {
            from: 0,
            to: 1,
            export_error: Some(err),
        } => assert_eq!(err.code(), EXPORT_ERROR_CODE),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(controller.record(0).map(|r| r.scores.values()), Some([2, 3, 4, 5]));

    let err = controller.save().expect_err("explicit save reports export failure");
    assert_eq!(err.code(), EXPORT_ERROR_CODE);
}

#[test]
fn score_input_is_validated() {
    let fixture = Fixture::new(1);
    let log = Shared::default();
    let mut controller = fixture.started(&log);

    assert_eq!(controller.set_score(0, 3).expect_err("q0").code(), "score.question");
    assert_eq!(controller.set_score(5, 3).expect_err("q5").code(), "score.question");
    assert_eq!(controller.set_score(1, 6).expect_err("high").code(), "score.out-of-range");
    assert_eq!(controller.set_score(1, 0).expect_err("low").code(), "score.out-of-range");
    assert!(controller.set_scores([1, 2, 3, 7]).is_err());
    assert_eq!(controller.draft_scores().map(|s| s.values()), Some([1, 1, 1, 1]));
}

#[test]
fn operations_require_a_running_experiment() {
    let fixture = Fixture::new(1);
    let log = Shared::default();
    let mut controller = ExperimentController::new(fixture.config.clone(), collaborators(&log));

    assert_eq!(controller.next().expect_err("next").code(), "navigation.not-started");
    assert_eq!(controller.save().expect_err("save").code(), "navigation.not-started");
    assert_eq!(
        controller.start(Seed::new(1)).expect_err("start").code(),
        "config.not-initialized"
    );
    assert_eq!(controller.progress(), None);
    assert_eq!(controller.total_evaluations(), None);
    controller.initialize().expect("initialize");
    assert_eq!(controller.total_evaluations(), Some(4));
}

#[test]
fn failed_initialize_keeps_the_running_experiment() {
    let fixture = Fixture::new(2);
    let log = Shared::default();
    let mut controller = fixture.started(&log);
    controller.next().expect("next");

    let missing = fixture.root.join("missing");
    controller.update_config(|config| config.method_dirs[2] = missing);
    let err = controller.initialize().expect_err("missing dir");
    assert_eq!(err.code(), "config.directory-not-found");
    assert!(controller.is_started());
    assert_eq!(controller.current_index(), Some(1));
}

#[test]
fn observers_see_every_config_change() {
    let fixture = Fixture::new(1);
    let log = Shared::default();
    let mut config = fixture.config.clone();
    config.seed = None;
    let mut controller = ExperimentController::new(config, collaborators(&log));
    let seen: Rc<RefCell<Vec<bool>>> = Rc::default();
    let sink = seen.clone();
    controller.subscribe(Box::new(move |_config: &ExperimentConfig, can_start: bool| {
        sink.borrow_mut().push(can_start)
    }));

    assert!(!controller.can_start());
    let err = controller.set_seed_text("12a").expect_err("bad seed");
    assert_eq!(err.code(), "config.seed");
    assert!(seen.borrow().is_empty());
    assert_eq!(controller.config().seed, None);

    assert_eq!(controller.set_seed_text(" 0042 ").expect("seed"), Seed::new(42));
    let seed = controller.regenerate_seed();
    assert!(seed.value() <= segeval_core::RANDOM_SEED_MAX);
    controller.update_config(|config| config.output_file = PathBuf::new());
    assert_eq!(*seen.borrow(), vec![true, true, false]);
}

#[test]
fn launch_lists_missing_configuration() {
    let log = Shared::default();
    let mut controller = ExperimentController::new(ExperimentConfig::default(), collaborators(&log));
    let err = controller.launch().expect_err("incomplete");
    assert_eq!(err.code(), "config.incomplete");
    assert!(log.borrow().loads.is_empty());
}

#[test]
fn progress_tracks_the_cursor() {
    let fixture = Fixture::new(1);
    let log = Shared::default();
    let mut controller = fixture.started(&log);
    let progress = controller.progress().expect("progress");
    assert_eq!(progress.current_evaluation, 1);
    assert_eq!(progress.total_evaluations, 4);
    assert!((progress.fraction - 0.25).abs() < 1e-12);

    controller.last().expect("last");
    let progress = controller.progress().expect("progress");
    assert_eq!(progress.current_evaluation, 4);
    assert_eq!(progress.scored, 1);
    assert_eq!(controller.current_view().map(|view| view.evaluation), Some(4));
}

#[test]
fn teardown_releases_and_forgets_the_experiment() {
    let fixture = Fixture::new(1);
    let log = Shared::default();
    let mut controller = fixture.started(&log);
    controller.teardown();
    assert!(!controller.is_started());
    assert!(!controller.is_initialized());
    assert!(log.borrow().open.is_empty());
    assert_eq!(controller.next().expect_err("next").code(), "navigation.not-started");
}
