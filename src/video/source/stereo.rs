//! Side-by-side stereo camera source
//!
//! ZED-style stereo cameras enumerate as a UVC device that delivers both
//! eyes packed next to each other in one YUYV frame. The camera only
//! supports a fixed set of modes, so resolution and frame rate come from
//! [`StereoMode`] rather than free-form settings.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::claims::{DeviceClaim, DeviceClaims};
use super::v4l2::V4l2Stream;
use super::FrameSource;
use crate::error::{AppError, Result};
use crate::video::capture::CaptureConfig;
use crate::video::convert::crop_columns;
use crate::video::format::{PixelFormat, Resolution};
use crate::video::frame::{FrameLayout, RawFrame};

/// Fixed capture modes of the stereo camera (per-eye size)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoMode {
    Hd2k,
    Hd1080,
    Hd720,
    Vga,
}

impl StereoMode {
    /// Resolution of a single eye
    pub fn eye_resolution(&self) -> Resolution {
        match self {
            StereoMode::Hd2k => Resolution::new(2208, 1242),
            StereoMode::Hd1080 => Resolution::HD1080,
            StereoMode::Hd720 => Resolution::HD720,
            StereoMode::Vga => Resolution::new(672, 376),
        }
    }

    /// Resolution of the packed side-by-side frame
    pub fn frame_resolution(&self) -> Resolution {
        self.eye_resolution().side_by_side()
    }

    /// Frame rates the camera offers in this mode
    pub fn supported_fps(&self) -> &'static [u32] {
        match self {
            StereoMode::Hd2k => &[15],
            StereoMode::Hd1080 => &[30, 15],
            StereoMode::Hd720 => &[60, 30, 15],
            StereoMode::Vga => &[100, 60, 30, 15],
        }
    }

    /// Highest supported rate not above `fps` (lowest supported if none)
    pub fn clamp_fps(&self, fps: u32) -> u32 {
        let supported = self.supported_fps();
        supported
            .iter()
            .copied()
            .find(|&f| f <= fps)
            .unwrap_or(supported[supported.len() - 1])
    }
}

/// Which eye(s) the source yields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoView {
    /// Full side-by-side frame
    Both,
    Left,
    Right,
}

impl StereoView {
    pub fn output_resolution(&self, mode: StereoMode) -> Resolution {
        match self {
            StereoView::Both => mode.frame_resolution(),
            StereoView::Left | StereoView::Right => mode.eye_resolution(),
        }
    }
}

/// Stereo camera opened through V4L2 in side-by-side mode
pub struct StereoDepthCameraSource {
    config: CaptureConfig,
    mode: StereoMode,
    view: StereoView,
    fps: u32,
    device_id: String,
    claims: DeviceClaims,
    claim: Option<DeviceClaim>,
    stream: Option<V4l2Stream>,
    sequence: u64,
}

impl StereoDepthCameraSource {
    pub fn new(config: CaptureConfig, claims: DeviceClaims) -> Result<Self> {
        let mode = config.stereo.mode;
        let fps = mode.clamp_fps(config.fps);
        if fps != config.fps {
            warn!(
                "Stereo mode {:?} does not support {}fps, using {}fps",
                mode, config.fps, fps
            );
        }
        if mode.eye_resolution().width % 2 != 0 {
            return Err(AppError::Config(format!(
                "Stereo mode {:?} has an odd eye width",
                mode
            )));
        }

        let device_id = config.device_path().display().to_string();
        Ok(Self {
            view: config.stereo.view,
            config,
            mode,
            fps,
            device_id,
            claims,
            claim: None,
            stream: None,
            sequence: 0,
        })
    }

    /// Cut the configured eye out of a packed frame
    fn select_view(&self, data: Bytes, format: PixelFormat) -> Bytes {
        let eye = self.mode.eye_resolution();
        let full = self.mode.frame_resolution();
        let offset = match self.view {
            StereoView::Both => return data,
            StereoView::Left => 0,
            StereoView::Right => eye.width,
        };
        Bytes::from(crop_columns(
            &data,
            full.width,
            full.height,
            format.bytes_per_pixel(),
            offset,
            eye.width,
        ))
    }
}

impl FrameSource for StereoDepthCameraSource {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let claim = self.claims.claim(&self.device_id)?;
        let stream = V4l2Stream::open(
            self.config.device_path(),
            self.mode.frame_resolution(),
            PixelFormat::Yuyv,
            self.fps,
            self.config.buffer_count,
            self.config.timeout(),
        )
        .map_err(|e| AppError::device_unavailable(&self.device_id, e))?;

        info!(
            "Stereo camera {} opened in {:?} @ {}fps ({:?} view)",
            self.device_id, self.mode, self.fps, self.view
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
        let format = stream.format();

        self.sequence += 1;
        let layout = match self.view {
            StereoView::Both => FrameLayout::SideBySide,
            StereoView::Left | StereoView::Right => FrameLayout::Mono,
        };
        let data = self.select_view(data, format);
        Ok(RawFrame::new(data, self.output_resolution(), format, self.sequence).with_layout(layout))
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            info!("Stereo camera {} released", self.device_id);
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
        self.view.output_resolution(self.mode)
    }

    fn fps(&self) -> u32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::capture::{SourceKind, StereoConfig};

    fn stereo_config(view: StereoView, fps: u32) -> CaptureConfig {
        CaptureConfig {
            source: SourceKind::Stereo,
            fps,
            stereo: StereoConfig {
                mode: StereoMode::Hd720,
                view,
            },
            ..CaptureConfig::for_device("/dev/zed")
        }
    }

    #[test]
    fn test_mode_resolutions() {
        assert_eq!(StereoMode::Hd720.frame_resolution(), Resolution::new(2560, 720));
        assert_eq!(StereoMode::Vga.eye_resolution(), Resolution::new(672, 376));
    }

    #[test]
    fn test_clamp_fps() {
        assert_eq!(StereoMode::Hd720.clamp_fps(75), 60);
        assert_eq!(StereoMode::Hd720.clamp_fps(45), 30);
        assert_eq!(StereoMode::Hd2k.clamp_fps(60), 15);
        assert_eq!(StereoMode::Hd1080.clamp_fps(5), 15);
    }

    #[test]
    fn test_view_output_resolution() {
        let source = StereoDepthCameraSource::new(stereo_config(StereoView::Left, 60), DeviceClaims::new()).unwrap();
        assert_eq!(source.output_resolution(), Resolution::HD720);
        assert_eq!(source.fps(), 60);

        let source = StereoDepthCameraSource::new(stereo_config(StereoView::Both, 75), DeviceClaims::new()).unwrap();
        assert_eq!(source.output_resolution(), Resolution::new(2560, 720));
        assert_eq!(source.fps(), 60);
    }

    #[test]
    fn test_select_right_eye() {
        let source = StereoDepthCameraSource::new(stereo_config(StereoView::Right, 60), DeviceClaims::new()).unwrap();
        let full = StereoMode::Hd720.frame_resolution();
        let eye = StereoMode::Hd720.eye_resolution();
        let bpp = PixelFormat::Yuyv.bytes_per_pixel();

        // Left half zeros, right half 0xFF
        let row: Vec<u8> = (0..full.width as usize * bpp)
            .map(|i| if i < eye.width as usize * bpp { 0 } else { 0xFF })
            .collect();
        let data: Vec<u8> = row.iter().copied().cycle().take(row.len() * full.height as usize).collect();

        let out = source.select_view(Bytes::from(data), PixelFormat::Yuyv);
        assert_eq!(out.len(), PixelFormat::Yuyv.frame_size(eye));
        assert!(out.iter().all(|&b| b == 0xFF));
    }
}
