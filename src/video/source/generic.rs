//! Plain V4L2 camera source

use tracing::{info, warn};

use super::claims::{DeviceClaim, DeviceClaims};
use super::v4l2::V4l2Stream;
use super::FrameSource;
use crate::error::{AppError, Result};
use crate::video::capture::CaptureConfig;
use crate::video::format::Resolution;
use crate::video::frame::RawFrame;

/// Single-view camera opened through V4L2
pub struct GenericCameraSource {
    config: CaptureConfig,
    device_id: String,
    claims: DeviceClaims,
    claim: Option<DeviceClaim>,
    stream: Option<V4l2Stream>,
    sequence: u64,
}

impl GenericCameraSource {
    pub fn new(config: CaptureConfig, claims: DeviceClaims) -> Self {
        let device_id = config.device_path().display().to_string();
        Self {
            config,
            device_id,
            claims,
            claim: None,
            stream: None,
            sequence: 0,
        }
    }
}

impl FrameSource for GenericCameraSource {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let claim = self.claims.claim(&self.device_id)?;
        let stream = V4l2Stream::open(
            self.config.device_path(),
            self.config.resolution,
            self.config.format,
            self.config.fps,
            self.config.buffer_count,
            self.config.timeout(),
        )
        .map_err(|e| AppError::device_unavailable(&self.device_id, e))?;

        info!(
            "Camera {} opened at {} {}",
            self.device_id,
            stream.resolution(),
            stream.format()
        );
        self.claim = Some(claim);
        self.stream = Some(stream);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AppError::read_failure(&self.device_id, "device not open"))?;

        let data = stream
            .next_frame()
            .map_err(|e| AppError::read_failure(&self.device_id, e))?;

        self.sequence += 1;
        Ok(RawFrame::new(
            data,
            stream.resolution(),
            stream.format(),
            self.sequence,
        ))
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            info!("Camera {} released", self.device_id);
        } else if self.claim.is_some() {
            warn!("Camera {} claim held without stream", self.device_id);
        }
        self.claim = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn output_resolution(&self) -> Resolution {
        self.config.resolution
    }

    fn fps(&self) -> u32 {
        self.config.fps.max(1)
    }
}
