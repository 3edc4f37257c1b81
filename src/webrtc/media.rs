//! Media pump: feed -> encoder -> track

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::encoder::EncoderWorker;
use super::transport::TransportEvent;
use crate::error::AppError;
use crate::utils::LogThrottler;
use crate::video::{CanonicalFrame, VideoFeed};

/// Set by the RTCP reader when the peer asks for a keyframe
pub type KeyframeRequest = Arc<AtomicBool>;

/// Sample duration for a frame: explicit time base when stamped,
/// otherwise one frame interval at the feed rate
pub fn frame_duration(frame: &CanonicalFrame, fps: u32) -> Duration {
    match frame.pts {
        Some(_) => frame.time_base.to_duration(1),
        None => Duration::from_secs(1) / fps.max(1),
    }
}

/// Pulls the feed until cancelled, encodes every frame and writes it to
/// `track`. A feed error other than `SessionClosed` is reported as
/// [`TransportEvent::MediaFailed`] and stops the pump.
pub fn spawn_media_pump(
    session_id: String,
    feed: Arc<VideoFeed>,
    track: Arc<TrackLocalStaticSample>,
    events: mpsc::Sender<TransportEvent>,
    keyframe_request: KeyframeRequest,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let encoder = match EncoderWorker::spawn(&session_id[..8.min(session_id.len())]) {
            Ok(encoder) => encoder,
            Err(e) => {
                error!("Session {} cannot start encoder: {}", session_id, e);
                let _ = events.send(TransportEvent::MediaFailed(e.to_string())).await;
                return;
            }
        };
        let throttler = LogThrottler::default();
        let fps = feed.fps();
        let mut frames_sent: u64 = 0;
        info!("Media pump started for session {}", session_id);

        while !cancel.is_cancelled() {
            let frame = match feed.next_frame().await {
                Ok(frame) => frame,
                Err(AppError::SessionClosed) => break,
                Err(e) => {
                    error!("Session {} media failed: {}", session_id, e);
                    let _ = events.send(TransportEvent::MediaFailed(e.to_string())).await;
                    break;
                }
            };

            let duration = frame_duration(&frame, fps);
            let force_keyframe = keyframe_request.swap(false, Ordering::AcqRel);
            let encoded = match encoder.encode(frame, force_keyframe).await {
                Ok(encoded) => encoded,
                Err(e) => {
                    error!("Session {} encoder failed: {}", session_id, e);
                    let _ = events.send(TransportEvent::MediaFailed(e.to_string())).await;
                    break;
                }
            };
            if encoded.data.is_empty() {
                continue;
            }

            let sample = Sample {
                data: encoded.data,
                duration,
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                crate::warn_throttled!(
                    throttler,
                    "write_sample",
                    "Session {} write sample failed: {}",
                    session_id,
                    e
                );
            } else {
                frames_sent += 1;
            }
        }

        debug!(
            "Media pump stopped for session {} after {} frames",
            session_id, frames_sent
        );
    })
}
