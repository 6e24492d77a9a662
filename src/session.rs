//! One live detection session.
//!
//! Owns the camera stream, the detector adapter, the frame loop, the overlay
//! surface and the state container. Control commands mutate `Controls`; any
//! change to what the loop captured restarts it. `shutdown()` (or drop)
//! cancels the pending cycle and releases the camera.

use std::path::Path;

use anyhow::Result;

use crate::config::LiveDetectConfig;
use crate::controls::Control;
use crate::detect::{vocabulary, BackendRegistry, DetectorAdapter, ModelState};
use crate::ingest::{CameraSource, CameraStats, CameraStream};
use crate::overlay::{OverlayRenderer, RgbaCanvas, Surface};
use crate::pipeline::{CycleOutcome, FrameLoop, LoopInputs, LoopState};
use crate::state::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    /// Accepted but without effect (e.g. toggling with no camera).
    Ignored,
    Quit,
}

pub struct Session<S: Surface> {
    camera: Option<CameraStream>,
    adapter: DetectorAdapter,
    frame_loop: FrameLoop,
    surface: S,
    state: AppState,
    closed: bool,
}

impl<S: Surface> Session<S> {
    pub fn new(
        camera: Option<CameraStream>,
        adapter: DetectorAdapter,
        frame_loop: FrameLoop,
        surface: S,
        state: AppState,
    ) -> Self {
        let mut session = Self {
            camera,
            adapter,
            frame_loop,
            surface,
            state,
            closed: false,
        };
        session.sync(0.0);
        session
    }

    /// Build a session from config: acquire the camera and start loading the
    /// configured backend. Both failures degrade instead of aborting.
    pub fn open(config: &LiveDetectConfig, registry: &BackendRegistry, surface: S) -> Self {
        let camera = match CameraSource::acquire(&config.camera.device, &config.camera.profile) {
            Ok(stream) => Some(stream),
            Err(err) => {
                log::error!("Session: camera unavailable: {:#}", err);
                None
            }
        };
        let adapter = match registry.loader(&config.detector) {
            Ok(loader) => DetectorAdapter::spawn(loader),
            Err(err) => DetectorAdapter::failed(format!("{err:#}")),
        };
        let frame_loop = FrameLoop::new(OverlayRenderer::new(config.render.line_width))
            .with_max_candidates(config.detector.max_candidates);
        let state = AppState::new(config.filter.initial_state());
        Self::new(camera, adapter, frame_loop, surface, state)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn loop_state(&self) -> LoopState {
        self.frame_loop.state()
    }

    pub fn model_state(&self) -> &ModelState {
        self.adapter.state()
    }

    pub fn adapter_mut(&mut self) -> &mut DetectorAdapter {
        &mut self.adapter
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn has_camera(&self) -> bool {
        self.camera.as_ref().is_some_and(CameraStream::is_active)
    }

    pub fn camera_stats(&self) -> Option<CameraStats> {
        self.camera.as_ref().map(CameraStream::stats)
    }

    /// Nominal camera frame interval, used by callers to pace `pump`.
    pub fn frame_interval_ms(&self) -> Option<f64> {
        let fps = self.camera.as_ref()?.negotiated().fps;
        (fps > 0).then(|| 1000.0 / fps as f64)
    }

    pub fn apply(&mut self, control: Control, now_ms: f64) -> ControlOutcome {
        if self.closed {
            return ControlOutcome::Ignored;
        }
        let has_camera = self.has_camera();
        let controls = &mut self.state.controls;
        let outcome = match control {
            Control::Quit => return ControlOutcome::Quit,
            Control::Toggle | Control::SetDetecting(_) if !has_camera => {
                log::warn!("Session: no camera stream, detection toggle ignored");
                ControlOutcome::Ignored
            }
            Control::Toggle => {
                controls.detecting = !controls.detecting;
                ControlOutcome::Applied
            }
            Control::SetDetecting(on) => {
                controls.detecting = on;
                ControlOutcome::Applied
            }
            Control::SetThreshold(value) => {
                controls.filter.set_threshold(value);
                ControlOutcome::Applied
            }
            Control::ThresholdUp => {
                controls.filter.threshold = controls.filter.threshold.step_up();
                ControlOutcome::Applied
            }
            Control::ThresholdDown => {
                controls.filter.threshold = controls.filter.threshold.step_down();
                ControlOutcome::Applied
            }
            Control::ToggleClass(label) => {
                controls.filter.classes.toggle_class(&label);
                ControlOutcome::Applied
            }
            Control::ToggleCategory(name) => match vocabulary::category(name) {
                Some(labels) => {
                    controls.filter.classes.toggle_category(labels);
                    ControlOutcome::Applied
                }
                None => ControlOutcome::Ignored,
            },
            Control::SelectAll => {
                controls.filter.classes.select_all();
                ControlOutcome::Applied
            }
            Control::ClearAll => {
                controls.filter.classes.clear_all();
                ControlOutcome::Applied
            }
        };
        self.sync(now_ms);
        outcome
    }

    /// Fire the pending cycle, if any. Also picks up model readiness.
    pub fn pump(&mut self, now_ms: f64) -> Option<CycleOutcome> {
        if self.closed {
            return None;
        }
        self.adapter.poll();
        self.sync(now_ms);
        let request = self.frame_loop.take_due()?;
        Some(self.frame_loop.on_frame(
            request,
            now_ms,
            self.camera.as_mut(),
            &mut self.adapter,
            &mut self.surface,
            &mut self.state.published,
        ))
    }

    /// Cancel the schedule and release the camera. Idempotent.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.frame_loop.stop();
        if let Some(camera) = self.camera.as_mut() {
            camera.stop();
        }
        log::info!("Session: closed");
    }

    fn inputs(&self) -> LoopInputs {
        LoopInputs {
            detecting: self.state.controls.detecting,
            camera_available: self.has_camera(),
            model_ready: self.adapter.is_ready(),
            filter: self.state.controls.filter.clone(),
        }
    }

    fn sync(&mut self, now_ms: f64) {
        let inputs = self.inputs();
        if &inputs != self.frame_loop.inputs() {
            self.frame_loop.restart(inputs, now_ms);
        }
    }
}

impl Session<RgbaCanvas> {
    /// Save the last processed frame with its overlay as PNG.
    pub fn snapshot(&self, path: &Path) -> Result<()> {
        self.surface.save_png(self.frame_loop.last_frame(), path)
    }
}

impl<S: Surface> Drop for Session<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection, ScriptedBackend};
    use crate::filter::FilterState;
    use crate::ingest::CaptureProfile;
    use crate::overlay::RecordingSurface;
    use std::sync::atomic::Ordering;

    fn session(backend: ScriptedBackend, device: &str) -> Session<RecordingSurface> {
        let camera = CameraSource::acquire(device, &CaptureProfile::default()).ok();
        Session::new(
            camera,
            DetectorAdapter::ready(Box::new(backend)),
            FrameLoop::default(),
            RecordingSurface::new(),
            AppState::new(FilterState::default()),
        )
    }

    fn det(label: &str, score: f32) -> Detection {
        Detection::new(label, score, BoundingBox::new(5.0, 30.0, 10.0, 10.0))
    }

    #[test]
    fn starts_idle_and_runs_after_toggle() {
        let mut session = session(ScriptedBackend::fixed(vec![det("dog", 0.7)]), "stub://cam");
        assert_eq!(session.loop_state(), LoopState::Idle);
        assert_eq!(session.pump(0.0), None);

        assert_eq!(session.apply(Control::Toggle, 0.0), ControlOutcome::Applied);
        assert_eq!(session.loop_state(), LoopState::Running);
        assert_eq!(
            session.pump(1.0),
            Some(CycleOutcome::Published { detections: 1 })
        );
        assert_eq!(session.state().stats().per_class, vec![("dog".to_string(), 1)]);
    }

    #[test]
    fn filter_change_restarts_with_new_snapshot() {
        let mut session = session(ScriptedBackend::fixed(vec![det("dog", 0.7)]), "stub://cam");
        session.apply(Control::Toggle, 0.0);
        let generation = session.frame_loop.scheduler().generation();

        session.apply(Control::SetThreshold(0.8), 1.0);
        assert!(session.frame_loop.scheduler().generation() > generation);
        assert_eq!(session.frame_loop.inputs().filter.threshold.value(), 0.8);
        assert_eq!(
            session.pump(2.0),
            Some(CycleOutcome::Published { detections: 0 })
        );
    }

    #[test]
    fn toggle_is_ignored_without_camera() {
        let backend = ScriptedBackend::fixed(vec![det("dog", 0.9)]);
        let calls = backend.call_counter();
        let mut session = session(backend, "stub://denied");
        assert!(!session.has_camera());
        assert_eq!(session.apply(Control::Toggle, 0.0), ControlOutcome::Ignored);
        assert!(!session.state().controls.detecting);
        for t in 0..10 {
            assert_eq!(session.pump(t as f64 * 16.0), None);
        }
        assert_eq!(session.loop_state(), LoopState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn quit_is_reported_and_shutdown_is_final() {
        let mut session = session(ScriptedBackend::fixed(vec![]), "stub://cam");
        assert_eq!(session.apply(Control::Quit, 0.0), ControlOutcome::Quit);
        session.apply(Control::Toggle, 0.0);
        session.shutdown();
        session.shutdown();
        assert!(!session.has_camera());
        assert_eq!(session.pump(100.0), None);
        assert_eq!(session.apply(Control::Toggle, 200.0), ControlOutcome::Ignored);
    }

    #[test]
    fn frame_interval_follows_negotiated_fps() {
        let session = session(ScriptedBackend::fixed(vec![]), "stub://cam?fps=50");
        assert_eq!(session.frame_interval_ms(), Some(20.0));
    }
}
