//! Camera acquisition.
//!
//! `CameraSource::acquire` negotiates a capture profile with a device and
//! returns a `CameraStream`. Devices named `stub://...` are synthetic; anything
//! else is opened through V4L2 (feature `ingest-v4l2`).
//!
//! A `CameraStream` is a scoped acquisition: hardware is released by `stop()`
//! or, failing that, on drop. There is no automatic retry after a failed
//! acquisition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::error::PipelineError;
use crate::frame::{rgb_len, Frame};

#[cfg(feature = "ingest-v4l2")]
use super::v4l2::DeviceStream;

// ----------------------------------------------------------------------------
// Capture profile
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Facing {
    User,
    Environment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Requested capture constraints: an ideal target plus a floor below which
/// the device is rejected.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureProfile {
    pub ideal: Resolution,
    pub min: Resolution,
    pub facing: Facing,
    pub ideal_aspect: f32,
}

impl Default for CaptureProfile {
    fn default() -> Self {
        Self {
            ideal: Resolution {
                width: 1920,
                height: 1080,
                fps: 60,
            },
            min: Resolution {
                width: 1280,
                height: 720,
                fps: 30,
            },
            facing: Facing::User,
            ideal_aspect: 16.0 / 9.0,
        }
    }
}

impl CaptureProfile {
    /// Accept the negotiated format only if it meets the minimum.
    pub fn check(&self, negotiated: Resolution) -> std::result::Result<(), PipelineError> {
        if negotiated.width < self.min.width
            || negotiated.height < self.min.height
            || negotiated.fps < self.min.fps
        {
            return Err(PipelineError::CameraAccess(format!(
                "device offers {}x{}@{}, minimum is {}x{}@{}",
                negotiated.width,
                negotiated.height,
                negotiated.fps,
                self.min.width,
                self.min.height,
                self.min.fps
            )));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Source + stream
// ----------------------------------------------------------------------------

pub struct CameraSource;

impl CameraSource {
    /// Open `device` with `profile`. Failures are `PipelineError::CameraAccess`.
    pub fn acquire(device: &str, profile: &CaptureProfile) -> Result<CameraStream> {
        log::info!(
            "CameraSource: requesting {} at {}x{}@{} (min {}x{}@{}, facing {:?})",
            device,
            profile.ideal.width,
            profile.ideal.height,
            profile.ideal.fps,
            profile.min.width,
            profile.min.height,
            profile.min.fps,
            profile.facing
        );
        let backend = if let Some(locator) = device.strip_prefix("stub://") {
            StreamBackend::Synthetic(SyntheticStream::open(locator, profile)?)
        } else {
            open_device(device, profile)?
        };
        let negotiated = backend.negotiated();
        profile.check(negotiated)?;
        log::info!(
            "CameraSource: streaming {} at {}x{}@{}",
            device,
            negotiated.width,
            negotiated.height,
            negotiated.fps
        );
        Ok(CameraStream {
            backend: Some(backend),
            device: device.to_string(),
            negotiated,
            frames_delivered: 0,
            released: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(device: &str, profile: &CaptureProfile) -> Result<StreamBackend> {
    let stream = DeviceStream::open(device, profile)
        .map_err(|err| PipelineError::CameraAccess(format!("{device}: {err:#}")))?;
    Ok(StreamBackend::Device(stream))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(device: &str, _profile: &CaptureProfile) -> Result<StreamBackend> {
    Err(PipelineError::CameraAccess(format!(
        "{device}: camera capture requires the ingest-v4l2 feature"
    ))
    .into())
}

enum StreamBackend {
    Synthetic(SyntheticStream),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceStream),
}

impl StreamBackend {
    fn negotiated(&self) -> Resolution {
        match self {
            StreamBackend::Synthetic(stream) => stream.resolution,
            #[cfg(feature = "ingest-v4l2")]
            StreamBackend::Device(stream) => stream.negotiated(),
        }
    }

    fn poll(&mut self, now_ms: f64) -> Result<Option<Frame>> {
        match self {
            StreamBackend::Synthetic(stream) => stream.poll(now_ms),
            #[cfg(feature = "ingest-v4l2")]
            StreamBackend::Device(stream) => stream.next_frame().map(Some),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CameraStats {
    pub device: String,
    pub frames_delivered: u64,
    pub active: bool,
}

/// Live camera stream. Dropping it stops every underlying track.
pub struct CameraStream {
    backend: Option<StreamBackend>,
    device: String,
    negotiated: Resolution,
    frames_delivered: u64,
    released: Arc<AtomicBool>,
}

impl CameraStream {
    /// Next frame if the source has decoded one since the last call.
    /// `Ok(None)` is the transient "not ready yet" case.
    pub fn poll_frame(&mut self, now_ms: f64) -> Result<Option<Frame>> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(None);
        };
        let frame = backend.poll(now_ms)?;
        if frame.is_some() {
            self.frames_delivered += 1;
        }
        Ok(frame)
    }

    pub fn negotiated(&self) -> Resolution {
        self.negotiated
    }

    pub fn is_active(&self) -> bool {
        self.backend.is_some()
    }

    /// Flag flipped once the hardware has been released; stays readable after
    /// the stream is dropped.
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }

    pub fn stats(&self) -> CameraStats {
        CameraStats {
            device: self.device.clone(),
            frames_delivered: self.frames_delivered,
            active: self.is_active(),
        }
    }

    /// Release the device. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(backend) = self.backend.take() {
            drop(backend);
            self.released.store(true, Ordering::SeqCst);
            log::info!(
                "CameraSource: released {} after {} frames",
                self.device,
                self.frames_delivered
            );
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

/// Synthetic stream configured through the stub URL:
/// `stub://name?width=1280&height=720&fps=30&warmup=2`.
/// `stub://denied` simulates a refused permission prompt.
struct SyntheticStream {
    resolution: Resolution,
    /// Frame intervals to wait before the first frame is available.
    warmup: u32,
    next_due_ms: Option<f64>,
    sequence: u64,
}

impl SyntheticStream {
    fn open(locator: &str, profile: &CaptureProfile) -> Result<Self> {
        let (name, query) = locator.split_once('?').unwrap_or((locator, ""));
        if name == "denied" {
            return Err(
                PipelineError::CameraAccess("permission denied for stub://denied".into()).into(),
            );
        }

        let mut resolution = profile.ideal;
        let mut warmup = 0;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let parsed: u32 = value.parse().map_err(|_| {
                PipelineError::CameraAccess(format!("invalid stub parameter '{pair}'"))
            })?;
            match key {
                "width" => resolution.width = parsed,
                "height" => resolution.height = parsed,
                "fps" => resolution.fps = parsed,
                "warmup" => warmup = parsed,
                _ => {
                    return Err(PipelineError::CameraAccess(format!(
                        "unknown stub parameter '{key}'"
                    ))
                    .into())
                }
            }
        }
        if resolution.fps == 0 {
            return Err(PipelineError::CameraAccess("stub fps must be >= 1".into()).into());
        }
        log::info!("CameraSource: synthetic stream '{}'", name);
        Ok(Self {
            resolution,
            warmup,
            next_due_ms: None,
            sequence: 0,
        })
    }

    fn interval_ms(&self) -> f64 {
        1000.0 / self.resolution.fps as f64
    }

    fn poll(&mut self, now_ms: f64) -> Result<Option<Frame>> {
        let due = *self
            .next_due_ms
            .get_or_insert(now_ms + self.warmup as f64 * self.interval_ms());
        if now_ms < due {
            return Ok(None);
        }
        // Skip intervals missed by a slow consumer rather than bursting.
        let mut next = due + self.interval_ms();
        if next <= now_ms {
            next = now_ms + self.interval_ms();
        }
        self.next_due_ms = Some(next);
        self.sequence += 1;

        let len = rgb_len(self.resolution.width, self.resolution.height)?;
        let level = (self.sequence % 200) as u8 + 28;
        let frame = Frame::new(
            vec![level; len],
            self.resolution.width,
            self.resolution.height,
            self.sequence,
        )?;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access_error(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::CameraAccess(_))
        )
    }

    #[test]
    fn synthetic_stream_uses_ideal_profile() -> Result<()> {
        let stream = CameraSource::acquire("stub://front", &CaptureProfile::default())?;
        assert_eq!(
            stream.negotiated(),
            Resolution {
                width: 1920,
                height: 1080,
                fps: 60
            }
        );
        assert!(stream.is_active());
        Ok(())
    }

    #[test]
    fn denied_permission_is_camera_access_error() {
        let err = CameraSource::acquire("stub://denied", &CaptureProfile::default())
            .err()
            .expect("denied");
        assert!(access_error(&err));
    }

    #[test]
    fn below_minimum_profile_is_rejected() {
        let err = CameraSource::acquire(
            "stub://webcam?width=640&height=480",
            &CaptureProfile::default(),
        )
        .err()
        .expect("too small");
        assert!(access_error(&err));
        assert!(err.to_string().contains("minimum"));
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn real_devices_need_the_v4l2_feature() {
        let err = CameraSource::acquire("/dev/video0", &CaptureProfile::default())
            .err()
            .expect("no v4l2");
        assert!(access_error(&err));
    }

    #[test]
    fn frames_arrive_after_warmup_at_stream_rate() -> Result<()> {
        let mut stream = CameraSource::acquire(
            "stub://cam?width=1280&height=720&fps=50&warmup=1",
            &CaptureProfile::default(),
        )?;
        assert!(stream.poll_frame(0.0)?.is_none());
        assert!(stream.poll_frame(10.0)?.is_none());
        let frame = stream.poll_frame(20.0)?.expect("first frame");
        assert_eq!(frame.dimensions(), (1280, 720));
        assert_eq!(frame.sequence, 1);
        assert!(stream.poll_frame(30.0)?.is_none());
        assert!(stream.poll_frame(40.0)?.is_some());
        assert_eq!(stream.stats().frames_delivered, 2);
        Ok(())
    }

    #[test]
    fn stop_releases_once_and_drop_releases() -> Result<()> {
        let mut stream = CameraSource::acquire("stub://cam", &CaptureProfile::default())?;
        let released = stream.release_flag();
        stream.stop();
        stream.stop();
        assert!(released.load(Ordering::SeqCst));
        assert!(!stream.is_active());
        assert!(stream.poll_frame(1000.0)?.is_none());

        let stream = CameraSource::acquire("stub://cam", &CaptureProfile::default())?;
        let released = stream.release_flag();
        drop(stream);
        assert!(released.load(Ordering::SeqCst));
        Ok(())
    }
}
