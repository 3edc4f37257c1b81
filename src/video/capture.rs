//! Capture configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::convert::TimestampPolicy;
use super::format::{PixelFormat, Resolution};
use super::source::stereo::{StereoMode, StereoView};

/// Default number of capture buffers
const DEFAULT_BUFFER_COUNT: u32 = 2;
/// Default capture timeout in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Which [`FrameSource`](super::source::FrameSource) implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Plain UVC/V4L2 camera
    #[default]
    Generic,
    /// Side-by-side stereo camera (ZED-style UVC)
    Stereo,
    /// Synthetic colour bars, no hardware
    TestPattern,
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "generic" | "camera" => Ok(SourceKind::Generic),
            "stereo" | "zed" => Ok(SourceKind::Stereo),
            "test_pattern" | "pattern" => Ok(SourceKind::TestPattern),
            _ => Err(format!("Unknown source kind: {}", s)),
        }
    }
}

/// What the feed does when a read fails again after one recovery cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Surface `ReadFailure`; the session terminates
    #[default]
    Propagate,
    /// Deliver a black frame of the configured resolution and keep streaming
    BlankFrame,
}

/// Stereo camera settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoConfig {
    pub mode: StereoMode,
    pub view: StereoView,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            mode: StereoMode::Hd720,
            view: StereoView::Both,
        }
    }
}

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Source implementation
    pub source: SourceKind,
    /// Device index ("0") or path ("/dev/video0")
    pub device: String,
    /// Requested resolution (generic and test pattern sources)
    pub resolution: Resolution,
    /// Requested frame rate
    pub fps: u32,
    /// Requested pixel format (generic source)
    pub format: PixelFormat,
    /// Stereo camera settings
    pub stereo: StereoConfig,
    /// Behaviour after a failed recovery cycle
    pub recovery: RecoveryPolicy,
    /// Timestamp assignment
    pub timestamps: TimestampPolicy,
    /// Number of capture buffers
    pub buffer_count: u32,
    /// Per-read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Generic,
            device: "0".to_string(),
            resolution: Resolution::HD1080,
            fps: 30,
            format: PixelFormat::Yuyv,
            stereo: StereoConfig::default(),
            recovery: RecoveryPolicy::Propagate,
            timestamps: TimestampPolicy::TransportAssigned,
            buffer_count: DEFAULT_BUFFER_COUNT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl CaptureConfig {
    /// Create config for a specific device
    pub fn for_device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set resolution
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Resolution::new(width, height);
        self
    }

    /// Set frame rate
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_source(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve `device` into a V4L2 node path
    pub fn device_path(&self) -> PathBuf {
        match self.device.parse::<u32>() {
            Ok(index) => PathBuf::from(format!("/dev/video{}", index)),
            Err(_) => PathBuf::from(&self.device),
        }
    }

    /// Resolution of frames a source built from this config delivers
    pub fn output_resolution(&self) -> Resolution {
        match self.source {
            SourceKind::Stereo => self.stereo.view.output_resolution(self.stereo.mode),
            SourceKind::Generic | SourceKind::TestPattern => self.resolution,
        }
    }

    /// Effective frame rate
    pub fn effective_fps(&self) -> u32 {
        match self.source {
            SourceKind::Stereo => self.stereo.mode.clamp_fps(self.fps),
            SourceKind::Generic | SourceKind::TestPattern => self.fps.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path() {
        assert_eq!(CaptureConfig::for_device("2").device_path(), PathBuf::from("/dev/video2"));
        assert_eq!(
            CaptureConfig::for_device("/dev/v4l/by-id/cam").device_path(),
            PathBuf::from("/dev/v4l/by-id/cam")
        );
    }

    #[test]
    fn test_output_resolution_follows_source() {
        let config = CaptureConfig::default().with_resolution(640, 480);
        assert_eq!(config.output_resolution(), Resolution::VGA);

        let stereo = config.with_source(SourceKind::Stereo);
        assert_eq!(stereo.output_resolution(), Resolution::new(2560, 720));
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("test-pattern".parse::<SourceKind>(), Ok(SourceKind::TestPattern));
        assert_eq!("ZED".parse::<SourceKind>(), Ok(SourceKind::Stereo));
        assert!("foo".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_recovery_policy_serde() {
        let policy: RecoveryPolicy = serde_json::from_str("\"blank_frame\"").unwrap();
        assert_eq!(policy, RecoveryPolicy::BlankFrame);
        assert_eq!(RecoveryPolicy::default(), RecoveryPolicy::Propagate);
    }
}
