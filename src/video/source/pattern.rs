//! Synthetic colour-bar source for running without hardware

use bytes::Bytes;
use std::time::{Duration, Instant};
use tracing::info;

use super::claims::{DeviceClaim, DeviceClaims};
use super::FrameSource;
use crate::error::{AppError, Result};
use crate::video::capture::CaptureConfig;
use crate::video::format::{PixelFormat, Resolution};
use crate::video::frame::RawFrame;

/// BGR colour bars: white, yellow, cyan, green, magenta, red, blue, black
const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [0, 255, 255],
    [255, 255, 0],
    [0, 255, 0],
    [255, 0, 255],
    [0, 0, 255],
    [255, 0, 0],
    [0, 0, 0],
];

/// Scrolling colour bars in BGR24, paced at the configured frame rate
pub struct TestPatternSource {
    resolution: Resolution,
    fps: u32,
    device_id: String,
    claims: DeviceClaims,
    claim: Option<DeviceClaim>,
    sequence: u64,
    last_read: Option<Instant>,
}

impl TestPatternSource {
    pub fn new(config: CaptureConfig, claims: DeviceClaims) -> Self {
        Self {
            resolution: config.resolution,
            fps: config.fps.max(1),
            device_id: format!("test-pattern:{}", config.device),
            claims,
            claim: None,
            sequence: 0,
            last_read: None,
        }
    }

    fn render(&self) -> Vec<u8> {
        let width = self.resolution.width as usize;
        let height = self.resolution.height as usize;
        let bar_width = (width / BARS.len()).max(1);
        let shift = self.sequence as usize;

        let mut row = Vec::with_capacity(width * 3);
        for x in 0..width {
            let bar = ((x + shift) / bar_width) % BARS.len();
            row.extend_from_slice(&BARS[bar]);
        }

        let mut data = Vec::with_capacity(row.len() * height);
        for _ in 0..height {
            data.extend_from_slice(&row);
        }
        data
    }

    fn pace(&mut self) {
        let interval = Duration::from_micros(1_000_000 / self.fps as u64);
        if let Some(last) = self.last_read {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_read = Some(Instant::now());
    }
}

impl FrameSource for TestPatternSource {
    fn open(&mut self) -> Result<()> {
        if self.claim.is_none() {
            self.claim = Some(self.claims.claim(&self.device_id)?);
            info!("Test pattern {} opened at {}", self.device_id, self.resolution);
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame> {
        if self.claim.is_none() {
            return Err(AppError::read_failure(&self.device_id, "device not open"));
        }
        self.pace();
        self.sequence += 1;
        Ok(RawFrame::new(
            Bytes::from(self.render()),
            self.resolution,
            PixelFormat::Bgr24,
            self.sequence,
        ))
    }

    fn release(&mut self) {
        if self.claim.take().is_some() {
            info!("Test pattern {} released", self.device_id);
        }
        self.last_read = None;
    }

    fn is_open(&self) -> bool {
        self.claim.is_some()
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn output_resolution(&self) -> Resolution {
        self.resolution
    }

    fn fps(&self) -> u32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(claims: &DeviceClaims) -> TestPatternSource {
        let config = CaptureConfig::default().with_resolution(16, 4).with_fps(1000);
        TestPatternSource::new(config, claims.clone())
    }

    #[test]
    fn test_frames_are_complete_and_scroll() {
        let claims = DeviceClaims::new();
        let mut source = source(&claims);
        source.open().unwrap();

        let first = source.read_frame().unwrap();
        let second = source.read_frame().unwrap();
        assert!(first.is_complete());
        assert_eq!(first.format, PixelFormat::Bgr24);
        assert_eq!(second.sequence, first.sequence + 1);
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn test_second_open_is_unavailable() {
        let claims = DeviceClaims::new();
        let mut a = source(&claims);
        let mut b = source(&claims);
        a.open().unwrap();
        assert!(matches!(b.open(), Err(AppError::DeviceUnavailable { .. })));
        a.release();
        b.open().unwrap();
    }

    #[test]
    fn test_read_after_release_fails() {
        let claims = DeviceClaims::new();
        let mut source = source(&claims);
        source.open().unwrap();
        source.release();
        source.release();
        assert!(matches!(source.read_frame(), Err(AppError::ReadFailure { .. })));
        assert!(claims.is_empty());
    }
}
