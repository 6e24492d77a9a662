//! live-detect
//!
//! Real-time object detection over a live camera feed.
//!
//! # Architecture
//!
//! A single-threaded frame loop pulls frames from a camera, runs them through
//! a pluggable detector, filters the candidates and paints overlays:
//!
//! 1. **Camera**: scoped acquisition; the device is released on every exit path.
//! 2. **Detector**: loaded once in the background, then queried per frame.
//! 3. **Filter**: class allow-list, then confidence threshold.
//! 4. **Overlay**: full clear and redraw every cycle, boxes banded by score.
//! 5. **Publish**: detections plus a windowed FPS mean for the dashboard.
//!
//! The loop is an explicit restartable task: changing any captured input
//! cancels the pending cycle and schedules a fresh one.
//!
//! # Module Structure
//!
//! - `ingest`: camera sources (synthetic `stub://`, V4L2)
//! - `detect`: detector backends, registry and the async-loading adapter
//! - `filter`, `fps`, `overlay`: per-cycle processing stages
//! - `pipeline`: frame scheduler and loop state machine
//! - `session`, `state`, `controls`, `ui`: presentation shell

pub mod clock;
pub mod config;
pub mod controls;
pub mod detect;
pub mod error;
pub mod filter;
pub mod fps;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod ui;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LiveDetectConfig;
pub use controls::Control;
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectorAdapter, DetectorBackend, ModelState,
    ScriptedBackend,
};
pub use error::PipelineError;
pub use filter::{apply_filters, ClassFilter, ConfidenceThreshold, FilterState};
pub use fps::{FpsMeter, FpsWindow};
pub use frame::Frame;
pub use ingest::{CameraSource, CameraStream, CaptureProfile};
pub use overlay::{OverlayRenderer, RecordingSurface, RgbaCanvas, Surface};
pub use pipeline::{CycleOutcome, FrameLoop, FrameRequest, FrameScheduler, LoopState};
pub use session::{ControlOutcome, Session};
pub use state::{AppState, DetectionStats};
