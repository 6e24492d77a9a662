//! Frame ingestion.
//!
//! - Synthetic `stub://` cameras (tests, demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every source hands out RGB24 `Frame`s and releases its device when the
//! owning `CameraStream` stops or drops.

pub mod camera;
#[cfg(any(feature = "ingest-v4l2", test))]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use camera::{CameraSource, CameraStats, CameraStream, CaptureProfile, Facing, Resolution};
