//! V4L2 capture backend.
//!
//! Opens a local device node, negotiates the closest format to the capture
//! profile's ideal and streams frames through memory-mapped buffers. Frames
//! are converted to RGB24 before they leave this module.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::camera::{CaptureProfile, Resolution};
use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::frame::Frame;

const PREFERRED_FOURCCS: [&[u8; 4]; 3] = [b"MJPG", b"YUYV", b"RGB3"];
const CAPTURE_BUFFERS: u32 = 4;

pub(crate) struct DeviceStream {
    device_path: String,
    state: DeviceState,
    format: PixelFormat,
    negotiated: Resolution,
    sequence: u64,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceStream {
    pub(crate) fn open(path: &str, profile: &CaptureProfile) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device =
            v4l::Device::with_path(path).with_context(|| format!("open v4l2 device {}", path))?;

        let mut negotiated_format = None;
        for fourcc in PREFERRED_FOURCCS {
            let mut format = device.format().context("read v4l2 format")?;
            format.width = profile.ideal.width;
            format.height = profile.ideal.height;
            format.fourcc = v4l::FourCC::new(fourcc);
            match device.set_format(&format) {
                Ok(applied) => {
                    if PixelFormat::from_fourcc(&applied.fourcc.repr).is_some() {
                        negotiated_format = Some(applied);
                        break;
                    }
                }
                Err(err) => {
                    log::warn!(
                        "CameraSource: {} rejected {}: {}",
                        path,
                        String::from_utf8_lossy(fourcc),
                        err
                    );
                }
            }
        }
        let format =
            negotiated_format.ok_or_else(|| anyhow!("no supported pixel format on {}", path))?;
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr)
            .ok_or_else(|| anyhow!("unsupported pixel format {}", format.fourcc))?;

        let params = v4l::video::capture::Parameters::with_fps(profile.ideal.fps);
        let fps = match device.set_params(&params) {
            Ok(applied) => fps_from_interval(applied.interval),
            Err(err) => {
                log::warn!("CameraSource: failed to set fps on {}: {}", path, err);
                device
                    .params()
                    .map(|p| fps_from_interval(p.interval))
                    .unwrap_or(0)
            }
        };

        let aspect = format.width as f32 / format.height.max(1) as f32;
        if (aspect - profile.ideal_aspect).abs() > 0.01 {
            log::debug!(
                "CameraSource: {} aspect {:.3} differs from ideal {:.3}",
                path,
                aspect,
                profile.ideal_aspect
            );
        }

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, CAPTURE_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        Ok(Self {
            device_path: path.to_string(),
            state,
            format: pixel_format,
            negotiated: Resolution {
                width: format.width,
                height: format.height,
                fps,
            },
            sequence: 0,
        })
    }

    pub(crate) fn negotiated(&self) -> Resolution {
        self.negotiated
    }

    /// Blocks until the driver hands over the next buffer.
    pub(crate) fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.negotiated.width, self.negotiated.height, self.format);
        let device_path = &self.device_path;
        let rgb = self.state.with_stream_mut(|stream| -> Result<Vec<u8>> {
            let (buf, meta) = stream
                .next()
                .with_context(|| format!("capture frame from {}", device_path))?;
            let used = (meta.bytesused as usize).min(buf.len());
            let used = if used == 0 { buf.len() } else { used };
            normalize_to_rgb(&buf[..used], width, height, format)
        })?;

        self.sequence += 1;
        Frame::new(rgb, width, height, self.sequence)
    }
}

fn fps_from_interval(interval: v4l::Fraction) -> u32 {
    if interval.numerator == 0 {
        return 0;
    }
    interval.denominator / interval.numerator
}
