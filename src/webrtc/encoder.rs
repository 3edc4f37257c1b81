//! H.264 encoding for the media pump
//!
//! The openh264 encoder is owned by a dedicated thread; the async side
//! hands it canonical frames and awaits the access unit.

use bytes::Bytes;
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::video::{CanonicalFrame, Resolution};

/// Encoded access unit (Annex B)
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Bytes,
    pub keyframe: bool,
    pub sequence: u64,
}

/// Convert packed RGB24 to I420, BT.601 limited range.
///
/// `width` and `height` must be even; extra source columns/rows beyond them
/// are ignored via `stride`.
pub fn rgb_to_yuv420(rgb: &[u8], stride: usize, width: usize, height: usize) -> Vec<u8> {
    let y_size = width * height;
    let uv_size = (width / 2) * (height / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..height {
        for x in 0..width {
            let idx = y * stride + x * 3;
            let r = rgb[idx] as i32;
            let g = rgb[idx + 1] as i32;
            let b = rgb[idx + 2] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * width + x] = y_val.clamp(0, 255) as u8;

            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * (width / 2) + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}

/// Largest even size not above `resolution`
pub fn encodable_resolution(resolution: Resolution) -> Resolution {
    Resolution::new(resolution.width & !1, resolution.height & !1)
}

/// Synchronous H.264 encoder
pub struct H264Encoder {
    encoder: Encoder,
    frame_count: u64,
}

impl H264Encoder {
    pub fn new() -> Result<Self> {
        let encoder = Encoder::new()
            .map_err(|e| AppError::Encoding(format!("Failed to create H.264 encoder: {}", e)))?;
        Ok(Self {
            encoder,
            frame_count: 0,
        })
    }

    pub fn encode(&mut self, frame: &CanonicalFrame, force_keyframe: bool) -> Result<EncodedFrame> {
        let target = encodable_resolution(frame.resolution);
        if target.width < 16 || target.height < 16 {
            return Err(AppError::Encoding(format!(
                "Frame too small to encode: {}",
                frame.resolution
            )));
        }

        let stride = frame.width() as usize * 3;
        let yuv = rgb_to_yuv420(
            frame.data(),
            stride,
            target.width as usize,
            target.height as usize,
        );
        let buffer = YUVBuffer::from_vec(yuv, target.width as usize, target.height as usize);

        if force_keyframe || self.frame_count == 0 {
            self.encoder.force_intra_frame();
        }

        let bitstream = self
            .encoder
            .encode(&buffer)
            .map_err(|e| AppError::Encoding(format!("H.264 encoding failed: {}", e)))?;
        self.frame_count += 1;

        Ok(EncodedFrame {
            keyframe: matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I),
            data: Bytes::from(bitstream.to_vec()),
            sequence: frame.sequence,
        })
    }
}

struct EncodeRequest {
    frame: CanonicalFrame,
    force_keyframe: bool,
    reply: oneshot::Sender<Result<EncodedFrame>>,
}

/// Encoder running on its own thread
pub struct EncoderWorker {
    tx: mpsc::Sender<EncodeRequest>,
}

impl EncoderWorker {
    pub fn spawn(name: &str) -> Result<Self> {
        let (tx, mut rx) = mpsc::channel::<EncodeRequest>(1);
        let thread_name = format!("h264-{}", name);

        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut encoder = match H264Encoder::new() {
                    Ok(encoder) => encoder,
                    Err(e) => {
                        warn!("{}: {}", thread_name, e);
                        while let Some(req) = rx.blocking_recv() {
                            let _ = req
                                .reply
                                .send(Err(AppError::Encoding(e.to_string())));
                        }
                        return;
                    }
                };
                info!("Encoder thread {} started", thread_name);

                while let Some(req) = rx.blocking_recv() {
                    let result = encoder.encode(&req.frame, req.force_keyframe);
                    let _ = req.reply.send(result);
                }
                debug!("Encoder thread {} stopped", thread_name);
            })
            .map_err(|e| AppError::Internal(format!("Failed to spawn encoder thread: {}", e)))?;

        Ok(Self { tx })
    }

    pub async fn encode(&self, frame: CanonicalFrame, force_keyframe: bool) -> Result<EncodedFrame> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EncodeRequest {
                frame,
                force_keyframe,
                reply,
            })
            .await
            .map_err(|_| AppError::Encoding("Encoder thread stopped".into()))?;
        rx.await
            .map_err(|_| AppError::Encoding("Encoder thread dropped request".into()))?
    }
}
