use std::sync::atomic::Ordering;
use std::time::Duration;

use live_detect::ingest::{CameraSource, CaptureProfile};
use live_detect::overlay::{DrawOp, HIGH_COLOR, LABEL_TEXT_COLOR};
use live_detect::{
    AppState, BoundingBox, Clock, Control, ControlOutcome, CycleOutcome, Detection,
    DetectorAdapter, DetectorBackend, FilterState, FrameLoop, LoopState, ManualClock,
    RecordingSurface, ScriptedBackend, Session,
};

const FRAME_MS: f64 = 1000.0 / 30.0;

fn det(label: &str, score: f32) -> Detection {
    Detection::new(label, score, BoundingBox::new(100.0, 80.0, 60.0, 40.0))
}

fn open(device: &str, adapter: DetectorAdapter) -> Session<RecordingSurface> {
    let camera = CameraSource::acquire(device, &CaptureProfile::default()).ok();
    Session::new(
        camera,
        adapter,
        FrameLoop::default(),
        RecordingSurface::new(),
        AppState::new(FilterState::default()),
    )
}

fn run(session: &mut Session<RecordingSurface>, clock: &ManualClock, ticks: usize) -> Vec<CycleOutcome> {
    let mut outcomes = Vec::new();
    for _ in 0..ticks {
        if let Some(outcome) = session.pump(clock.now_ms()) {
            outcomes.push(outcome);
        }
        clock.advance(FRAME_MS + 1.0);
    }
    outcomes
}

#[test]
fn filters_apply_to_published_detections() {
    let backend = ScriptedBackend::fixed(vec![
        det("person", 0.9),
        det("car", 0.4),
        det("dog", 0.95),
    ]);
    let clock = ManualClock::new(0.0);
    let mut session = open(
        "stub://cam?width=1280&height=720&fps=30",
        DetectorAdapter::ready(Box::new(backend)),
    );

    session.apply(Control::ToggleClass("person".into()), clock.now_ms());
    session.apply(Control::ToggleClass("car".into()), clock.now_ms());
    session.apply(Control::SetThreshold(0.5), clock.now_ms());
    session.apply(Control::Toggle, clock.now_ms());

    let outcomes = run(&mut session, &clock, 1);
    assert_eq!(outcomes, vec![CycleOutcome::Published { detections: 1 }]);
    assert_eq!(session.state().published.detections, vec![det("person", 0.9)]);

    // Overlay: box, label background, label text, in that order after the clear.
    let ops = session.surface().ops();
    let clear = ops
        .iter()
        .rposition(|op| matches!(op, DrawOp::Clear))
        .expect("clear");
    match &ops[clear + 1..] {
        [DrawOp::StrokeRect { color, .. }, DrawOp::FillRect { rect, color: bg }, DrawOp::FillText { text, color: fg, .. }] =>
        {
            assert_eq!(*color, HIGH_COLOR);
            assert_eq!(*bg, HIGH_COLOR);
            assert_eq!(*fg, LABEL_TEXT_COLOR);
            assert_eq!(text, "person 90%");
            assert_eq!(rect.y, 56.0);
            assert_eq!(rect.height, 24.0);
        }
        other => panic!("unexpected draw ops: {other:?}"),
    }
}

#[test]
fn toggling_off_stops_draws_and_publishes() {
    let clock = ManualClock::new(0.0);
    let mut session = open(
        "stub://cam?width=1280&height=720&fps=30",
        DetectorAdapter::ready(Box::new(ScriptedBackend::scene(3))),
    );
    session.apply(Control::Toggle, clock.now_ms());
    let outcomes = run(&mut session, &clock, 5);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, CycleOutcome::Published { .. })));

    session.apply(Control::Toggle, clock.now_ms());
    assert_eq!(session.loop_state(), LoopState::Idle);
    let ops_before = session.surface().ops().len();
    let updates_before = session.state().published.updates;

    assert!(run(&mut session, &clock, 20).is_empty());
    assert_eq!(session.surface().ops().len(), ops_before);
    assert_eq!(session.state().published.updates, updates_before);

    session.apply(Control::Toggle, clock.now_ms());
    assert!(!run(&mut session, &clock, 2).is_empty());
    assert!(session.state().published.updates > updates_before);
}

#[test]
fn camera_denial_leaves_toggle_inert() {
    let backend = ScriptedBackend::fixed(vec![det("person", 0.9)]);
    let calls = backend.call_counter();
    let clock = ManualClock::new(0.0);
    let mut session = open("stub://denied", DetectorAdapter::ready(Box::new(backend)));

    assert!(!session.has_camera());
    assert_eq!(session.apply(Control::Toggle, 0.0), ControlOutcome::Ignored);
    assert_eq!(session.loop_state(), LoopState::Idle);
    assert!(run(&mut session, &clock, 30).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.state().published.updates, 0);
}

#[test]
fn detection_waits_for_model_then_runs() {
    let (release, gate) = std::sync::mpsc::channel::<()>();
    let adapter = DetectorAdapter::spawn(Box::new(move || {
        gate.recv_timeout(Duration::from_secs(5)).ok();
        Ok(Box::new(ScriptedBackend::fixed(vec![det("cat", 0.7)])) as Box<dyn DetectorBackend>)
    }));
    let clock = ManualClock::new(0.0);
    let mut session = open("stub://cam?width=1280&height=720&fps=30", adapter);

    session.apply(Control::Toggle, clock.now_ms());
    assert_eq!(session.loop_state(), LoopState::WaitingForModel);
    let outcomes = run(&mut session, &clock, 3);
    assert!(outcomes.iter().all(|o| *o == CycleOutcome::WaitingForModel));

    release.send(()).unwrap();
    session.adapter_mut().wait(Duration::from_secs(5));
    let outcomes = run(&mut session, &clock, 2);
    assert_eq!(session.loop_state(), LoopState::Running);
    assert!(outcomes.contains(&CycleOutcome::Published { detections: 1 }));
}

#[test]
fn failed_model_never_runs_inference() {
    let clock = ManualClock::new(0.0);
    let mut session = open(
        "stub://cam?width=1280&height=720&fps=30",
        DetectorAdapter::failed("weights missing"),
    );
    session.apply(Control::Toggle, clock.now_ms());
    assert_eq!(session.loop_state(), LoopState::WaitingForModel);
    let outcomes = run(&mut session, &clock, 10);
    assert!(outcomes.iter().all(|o| *o == CycleOutcome::WaitingForModel));
    assert_eq!(session.state().published.updates, 0);
}

#[test]
fn shutdown_releases_camera_and_cancels_schedule() {
    let clock = ManualClock::new(0.0);
    let camera = CameraSource::acquire("stub://cam", &CaptureProfile::default()).unwrap();
    let released = camera.release_flag();
    let mut session = Session::new(
        Some(camera),
        DetectorAdapter::ready(Box::new(ScriptedBackend::scene(1))),
        FrameLoop::default(),
        RecordingSurface::new(),
        AppState::default(),
    );
    session.apply(Control::Toggle, clock.now_ms());
    run(&mut session, &clock, 3);

    session.shutdown();
    assert!(released.load(Ordering::SeqCst));
    let updates = session.state().published.updates;
    assert!(run(&mut session, &clock, 10).is_empty());
    assert_eq!(session.state().published.updates, updates);
}

#[test]
fn dropping_session_releases_camera() {
    let camera = CameraSource::acquire("stub://cam", &CaptureProfile::default()).unwrap();
    let released = camera.release_flag();
    let session = Session::new(
        Some(camera),
        DetectorAdapter::ready(Box::new(ScriptedBackend::scene(1))),
        FrameLoop::default(),
        RecordingSurface::new(),
        AppState::default(),
    );
    drop(session);
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn category_toggle_round_trips_through_controls() {
    let clock = ManualClock::new(0.0);
    let mut session = open(
        "stub://cam",
        DetectorAdapter::ready(Box::new(ScriptedBackend::scene(9))),
    );
    session.apply(Control::ToggleClass("person".into()), clock.now_ms());
    let before = session.state().controls.filter.clone();

    let animals: Control = "category animals".parse().unwrap();
    session.apply(animals.clone(), clock.now_ms());
    assert!(session.state().controls.filter.classes.is_allowed("dog"));
    session.apply(animals, clock.now_ms());
    assert_eq!(session.state().controls.filter, before);
}
