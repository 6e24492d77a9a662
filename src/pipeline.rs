//! Frame processing loop.
//!
//! A single-threaded, restartable task. At most one `FrameRequest` is pending
//! at any time; every restart bumps the scheduler generation so a request
//! captured before the restart is dropped when it fires. A cycle only
//! schedules its successor after it has drawn and published, so cycles never
//! overlap and slow inference throttles the loop.

use crate::detect::DetectorAdapter;
use crate::error::PipelineError;
use crate::filter::{detector_min_score, FilterState};
use crate::fps::FpsMeter;
use crate::frame::Frame;
use crate::ingest::CameraStream;
use crate::overlay::{OverlayRenderer, Surface};
use crate::state::Published;

/// Candidate cap passed to the detector on every cycle.
pub const MAX_CANDIDATES: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Not detecting; nothing scheduled.
    Idle,
    Running,
    /// Detection requested but the model is not ready; cycles are no-ops.
    WaitingForModel,
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRequest {
    pub id: u64,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct FrameScheduler {
    generation: u64,
    next_id: u64,
    pending: Option<FrameRequest>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending(&self) -> Option<FrameRequest> {
        self.pending
    }

    /// Replace any pending request with a fresh one in the current generation.
    pub fn schedule(&mut self) -> FrameRequest {
        let request = FrameRequest {
            id: self.next_id,
            generation: self.generation,
        };
        self.next_id += 1;
        self.pending = Some(request);
        request
    }

    /// Drop the pending request and invalidate every request issued so far.
    pub fn cancel(&mut self) -> Option<FrameRequest> {
        self.generation += 1;
        self.pending.take()
    }

    /// Hand the pending request to the caller for execution.
    pub fn take_due(&mut self) -> Option<FrameRequest> {
        self.pending.take()
    }

    pub fn is_current(&self, request: &FrameRequest) -> bool {
        request.generation == self.generation
    }
}

// ----------------------------------------------------------------------------
// Loop
// ----------------------------------------------------------------------------

/// Values the loop captures at restart and reads for every cycle until the
/// next restart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoopInputs {
    pub detecting: bool,
    pub camera_available: bool,
    pub model_ready: bool,
    pub filter: FilterState,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// Request from an earlier generation; ignored.
    Stale,
    /// Loop is idle or stopped; nothing rescheduled.
    Idle,
    WaitingForModel,
    /// Model became ready; the next cycle runs detection.
    Promoted,
    /// No fresh frame yet.
    FrameNotReady,
    /// Inference failed; nothing published this cycle.
    InferenceFailed(String),
    Published { detections: usize },
}

pub struct FrameLoop {
    state: LoopState,
    scheduler: FrameScheduler,
    inputs: LoopInputs,
    fps: FpsMeter,
    renderer: OverlayRenderer,
    max_candidates: usize,
    last_frame: Option<Frame>,
    cycles: u64,
    stopped: bool,
}

impl FrameLoop {
    pub fn new(renderer: OverlayRenderer) -> Self {
        Self {
            state: LoopState::Idle,
            scheduler: FrameScheduler::new(),
            inputs: LoopInputs::default(),
            fps: FpsMeter::new(),
            renderer,
            max_candidates: MAX_CANDIDATES,
            last_frame: None,
            cycles: 0,
            stopped: false,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn inputs(&self) -> &LoopInputs {
        &self.inputs
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Frame processed by the most recent completed cycle.
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Cycles that reached the publish step.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Cancel the current schedule and start over from `inputs`.
    pub fn restart(&mut self, inputs: LoopInputs, now_ms: f64) -> LoopState {
        self.scheduler.cancel();
        if self.stopped {
            log::debug!("FrameLoop: restart after stop ignored");
            return self.state;
        }

        let next = if !inputs.detecting || !inputs.camera_available {
            LoopState::Idle
        } else if inputs.model_ready {
            LoopState::Running
        } else {
            LoopState::WaitingForModel
        };
        if next == LoopState::Running && self.state != LoopState::Running {
            self.fps.rebase(now_ms);
        }
        if next != self.state {
            log::info!("FrameLoop: {:?} -> {:?}", self.state, next);
        }
        if inputs.detecting && !inputs.camera_available {
            log::warn!("FrameLoop: no camera stream; detection stays off");
        }

        self.state = next;
        self.inputs = inputs;
        if self.state != LoopState::Idle {
            self.scheduler.schedule();
        }
        self.state
    }

    pub fn set_detecting(&mut self, detecting: bool, now_ms: f64) -> LoopState {
        let mut inputs = self.inputs.clone();
        inputs.detecting = detecting;
        self.restart(inputs, now_ms)
    }

    pub fn toggle(&mut self, now_ms: f64) -> LoopState {
        self.set_detecting(!self.inputs.detecting, now_ms)
    }

    /// Pending request ready to fire, if any.
    pub fn take_due(&mut self) -> Option<FrameRequest> {
        self.scheduler.take_due()
    }

    /// Execute one scheduled cycle.
    pub fn on_frame<S: Surface + ?Sized>(
        &mut self,
        request: FrameRequest,
        now_ms: f64,
        camera: Option<&mut CameraStream>,
        adapter: &mut DetectorAdapter,
        surface: &mut S,
        published: &mut Published,
    ) -> CycleOutcome {
        if !self.scheduler.is_current(&request) {
            log::debug!(
                "FrameLoop: dropping stale request {} (generation {}, current {})",
                request.id,
                request.generation,
                self.scheduler.generation()
            );
            return CycleOutcome::Stale;
        }
        if self.stopped || self.state == LoopState::Idle {
            return CycleOutcome::Idle;
        }

        let outcome = match self.state {
            LoopState::WaitingForModel => {
                if adapter.is_ready() {
                    log::info!("FrameLoop: model ready, starting detection");
                    self.state = LoopState::Running;
                    self.inputs.model_ready = true;
                    self.fps.rebase(now_ms);
                    CycleOutcome::Promoted
                } else {
                    CycleOutcome::WaitingForModel
                }
            }
            _ => self.run_cycle(now_ms, camera, adapter, surface, published),
        };

        self.scheduler.schedule();
        outcome
    }

    fn run_cycle<S: Surface + ?Sized>(
        &mut self,
        now_ms: f64,
        camera: Option<&mut CameraStream>,
        adapter: &mut DetectorAdapter,
        surface: &mut S,
        published: &mut Published,
    ) -> CycleOutcome {
        let Ok(frame) = read_frame(camera, now_ms) else {
            return CycleOutcome::FrameNotReady;
        };

        let filter = &self.inputs.filter;
        let candidates = match adapter.infer(
            &frame,
            self.max_candidates,
            detector_min_score(filter.threshold),
        ) {
            Ok(candidates) => candidates,
            Err(err) => {
                log::warn!("FrameLoop: inference failed on frame {}: {:#}", frame.sequence, err);
                return CycleOutcome::InferenceFailed(format!("{err:#}"));
            }
        };
        let detections = filter.apply(candidates);

        self.renderer
            .render(surface, frame.width, frame.height, &detections);
        let count = detections.len();
        published.publish_detections(detections);
        if let Some(mean) = self.fps.tick(now_ms) {
            published.fps = mean;
        }

        self.cycles += 1;
        self.last_frame = Some(frame);
        CycleOutcome::Published { detections: count }
    }

    /// Teardown: cancel the pending request; no cycle fires afterwards.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        let cancelled = self.scheduler.cancel();
        self.stopped = true;
        self.state = LoopState::Idle;
        log::info!(
            "FrameLoop: stopped after {} cycles{}",
            self.cycles,
            if cancelled.is_some() {
                " (pending request cancelled)"
            } else {
                ""
            }
        );
    }
}

fn read_frame(camera: Option<&mut CameraStream>, now_ms: f64) -> Result<Frame, PipelineError> {
    let camera = camera.ok_or(PipelineError::FrameNotReady)?;
    match camera.poll_frame(now_ms) {
        Ok(Some(frame)) => Ok(frame),
        Ok(None) => Err(PipelineError::FrameNotReady),
        Err(err) => {
            log::warn!("FrameLoop: frame read failed: {:#}", err);
            Err(PipelineError::FrameNotReady)
        }
    }
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new(OverlayRenderer::default())
    }
}
