//! Pixel format conversion and frame adaptation
//!
//! Turns device-native [`RawFrame`]s into packed RGB24 [`CanonicalFrame`]s
//! and stamps presentation timestamps.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::format::PixelFormat;
use super::frame::{CanonicalFrame, RawFrame, TimeBase};

/// How presentation timestamps are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Leave `pts` empty; the transport times frames on ingestion
    #[default]
    TransportAssigned,
    /// Stamp `pts` as a frame counter in a `1/fps` time base
    FixedTimeBase,
}

/// Converts raw frames to the canonical representation.
///
/// The timestamp policy is fixed at construction so one feed never mixes
/// transport-assigned and explicit timing.
#[derive(Debug)]
pub struct FrameAdapter {
    policy: TimestampPolicy,
    time_base: TimeBase,
    next_pts: i64,
}

impl FrameAdapter {
    pub fn new(policy: TimestampPolicy, fps: u32) -> Self {
        let time_base = match policy {
            TimestampPolicy::TransportAssigned => TimeBase::RTP_VIDEO,
            TimestampPolicy::FixedTimeBase => TimeBase::from_fps(fps),
        };
        Self {
            policy,
            time_base,
            next_pts: 0,
        }
    }

    pub fn policy(&self) -> TimestampPolicy {
        self.policy
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Convert a raw frame to RGB24 and assign timing
    pub fn adapt(&mut self, raw: RawFrame) -> CanonicalFrame {
        let rgb = to_rgb24(&raw.data, raw.format);
        let frame = CanonicalFrame::new(Bytes::from(rgb), raw.resolution, raw.sequence, raw.capture_ts);
        self.stamp(frame)
    }

    /// Assign timing to an already canonical frame (used for blank frames)
    pub fn stamp(&mut self, mut frame: CanonicalFrame) -> CanonicalFrame {
        frame.time_base = self.time_base;
        frame.pts = match self.policy {
            TimestampPolicy::TransportAssigned => None,
            TimestampPolicy::FixedTimeBase => {
                let pts = self.next_pts;
                self.next_pts += 1;
                Some(pts)
            }
        };
        frame
    }
}

/// Convert any supported packed format to RGB24
pub fn to_rgb24(data: &[u8], format: PixelFormat) -> Vec<u8> {
    match format {
        PixelFormat::Rgb24 => data.to_vec(),
        PixelFormat::Bgr24 => bgr24_to_rgb24(data),
        PixelFormat::Bgra32 => bgra32_to_rgb24(data),
        PixelFormat::Yuyv => yuyv_to_rgb24(data),
    }
}

pub fn bgr24_to_rgb24(bgr: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(bgr.len());
    for px in bgr.chunks_exact(3) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    rgb
}

pub fn bgra32_to_rgb24(bgra: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(bgra.len() / 4 * 3);
    for px in bgra.chunks_exact(4) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    rgb
}

/// YUYV 4:2:2 to RGB24 (BT.601, limited range)
pub fn yuyv_to_rgb24(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);
    for quad in yuyv.chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    rgb
}

#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    ]
}

/// Copy the columns `[x_offset, x_offset + width)` out of a packed buffer
pub fn crop_columns(data: &[u8], full_width: u32, height: u32, bpp: usize, x_offset: u32, width: u32) -> Vec<u8> {
    let row_bytes = full_width as usize * bpp;
    let start = x_offset as usize * bpp;
    let len = width as usize * bpp;
    let mut out = Vec::with_capacity(len * height as usize);
    for row in data.chunks_exact(row_bytes).take(height as usize) {
        out.extend_from_slice(&row[start..start + len]);
    }
    out
}
