//! Video frame data structures

use bytes::Bytes;
use std::fmt;
use std::time::{Duration, Instant};

use super::format::{PixelFormat, Resolution};

/// How the views are arranged inside a raw buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// Single view
    Mono,
    /// Left and right eye packed next to each other
    SideBySide,
}

/// A frame as delivered by the capture device
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Device-native pixel data
    pub data: Bytes,
    /// Frame resolution (full buffer, both eyes for side-by-side)
    pub resolution: Resolution,
    /// Native pixel format
    pub format: PixelFormat,
    /// View arrangement
    pub layout: FrameLayout,
    /// Frame sequence number from the source
    pub sequence: u64,
    /// Timestamp when frame was captured
    pub capture_ts: Instant,
}

impl RawFrame {
    pub fn new(data: Bytes, resolution: Resolution, format: PixelFormat, sequence: u64) -> Self {
        Self {
            data,
            resolution,
            format,
            layout: FrameLayout::Mono,
            sequence,
            capture_ts: Instant::now(),
        }
    }

    pub fn with_layout(mut self, layout: FrameLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Whether the buffer holds exactly one full frame
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.format.frame_size(self.resolution)
    }
}

/// Rational time base (seconds per tick = num / den)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    /// 90 kHz RTP video clock
    pub const RTP_VIDEO: TimeBase = TimeBase { num: 1, den: 90_000 };

    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// One tick per frame at the given rate
    pub fn from_fps(fps: u32) -> Self {
        Self::new(1, fps.max(1))
    }

    /// Duration of `ticks` in this time base
    pub fn to_duration(&self, ticks: i64) -> Duration {
        let ticks = ticks.max(0) as u128;
        let nanos = ticks * self.num as u128 * 1_000_000_000 / self.den.max(1) as u128;
        Duration::from_nanos(nanos as u64)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Packed RGB24 frame ready for the transport
#[derive(Debug, Clone)]
pub struct CanonicalFrame {
    data: Bytes,
    /// Frame resolution
    pub resolution: Resolution,
    /// Presentation timestamp in `time_base` units, `None` when the
    /// transport assigns timing on ingestion
    pub pts: Option<i64>,
    /// Time base of `pts`
    pub time_base: TimeBase,
    /// Substituted black frame
    pub blank: bool,
    /// Source sequence number
    pub sequence: u64,
    /// Timestamp when the underlying frame was captured
    pub capture_ts: Instant,
}

impl CanonicalFrame {
    pub fn new(data: Bytes, resolution: Resolution, sequence: u64, capture_ts: Instant) -> Self {
        debug_assert_eq!(data.len(), PixelFormat::Rgb24.frame_size(resolution));
        Self {
            data,
            resolution,
            pts: None,
            time_base: TimeBase::RTP_VIDEO,
            blank: false,
            sequence,
            capture_ts,
        }
    }

    /// All-black frame of the given resolution
    pub fn blank(resolution: Resolution) -> Self {
        let data = Bytes::from(vec![0u8; PixelFormat::Rgb24.frame_size(resolution)]);
        Self {
            blank: true,
            ..Self::new(data, resolution, 0, Instant::now())
        }
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_frame() {
        let frame = CanonicalFrame::blank(Resolution::VGA);
        assert!(frame.blank);
        assert_eq!(frame.len(), 640 * 480 * 3);
        assert!(frame.data().iter().all(|&b| b == 0));
        assert_eq!(frame.pts, None);
    }

    #[test]
    fn test_time_base() {
        let tb = TimeBase::from_fps(30);
        assert_eq!(tb, TimeBase::new(1, 30));
        assert_eq!(tb.to_duration(30), Duration::from_secs(1));
        assert_eq!(TimeBase::RTP_VIDEO.to_duration(90_000), Duration::from_secs(1));
    }

    #[test]
    fn test_raw_frame_completeness() {
        let res = Resolution::new(4, 2);
        let full = RawFrame::new(Bytes::from(vec![0u8; 24]), res, PixelFormat::Bgr24, 0);
        assert!(full.is_complete());
        let short = RawFrame::new(Bytes::from(vec![0u8; 10]), res, PixelFormat::Bgr24, 0);
        assert!(!short.is_complete());
    }
}
