//! Video feed: the bridge between a capture source and a session
//!
//! A [`VideoFeed`] exclusively owns one [`FrameSource`] and turns each pull
//! into exactly one device read followed by adaptation. Nothing is buffered
//! between pulls. Reads run on the blocking pool and are serialized by the
//! feed's mutex, so a device never sees concurrent reads.
//!
//! Failure handling on a pull:
//!
//! ```text
//! read ──ok──> adapt ──> frame
//!   │
//!   └─ReadFailure─> release + reopen + read ──ok──> adapt ──> frame
//!                        │
//!                        └─fail─> Propagate:  ReadFailure
//!                                 BlankFrame: black frame (configured resolution)
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::capture::RecoveryPolicy;
use super::convert::{FrameAdapter, TimestampPolicy};
use super::format::Resolution;
use super::frame::CanonicalFrame;
use super::source::FrameSource;
use crate::error::{AppError, Result};
use crate::utils::LogThrottler;

/// Feed counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    /// Frames handed to the caller, blank frames included
    pub frames_delivered: u64,
    /// Recovery cycles attempted
    pub recoveries: u64,
    /// Blank frames substituted after failed recovery
    pub blank_frames: u64,
}

#[derive(Default)]
struct FeedCounters {
    frames_delivered: AtomicU64,
    recoveries: AtomicU64,
    blank_frames: AtomicU64,
}

/// Source and adapter, moved onto the blocking pool for each pull
struct FeedState {
    source: Box<dyn FrameSource>,
    adapter: FrameAdapter,
}

impl FeedState {
    fn pull(&mut self, recover: bool) -> Result<CanonicalFrame> {
        if recover {
            self.source.release();
            self.source.open()?;
        }
        let raw = self.source.read_frame()?;
        Ok(self.adapter.adapt(raw))
    }
}

/// Pull-based frame feed owned by one session
pub struct VideoFeed {
    state: Mutex<Option<FeedState>>,
    device_id: String,
    resolution: Resolution,
    fps: u32,
    recovery: RecoveryPolicy,
    cancel: CancellationToken,
    released: AtomicBool,
    counters: FeedCounters,
    throttler: LogThrottler,
}

impl VideoFeed {
    /// Open `source` and wrap it in a feed.
    ///
    /// On failure the source is released before the error is returned.
    pub async fn attach(
        source: Box<dyn FrameSource>,
        recovery: RecoveryPolicy,
        timestamps: TimestampPolicy,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (source, result) = tokio::task::spawn_blocking(move || {
            let mut source = source;
            let result = source.open();
            if result.is_err() {
                source.release();
            }
            (source, result)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Capture open task failed: {}", e)))?;
        result?;

        let device_id = source.device_id().to_string();
        let resolution = source.output_resolution();
        let fps = source.fps();
        info!(
            "Video feed attached to {} ({} @ {}fps, recovery {:?}, timestamps {:?})",
            device_id, resolution, fps, recovery, timestamps
        );

        Ok(Self {
            state: Mutex::new(Some(FeedState {
                source,
                adapter: FrameAdapter::new(timestamps, fps),
            })),
            device_id,
            resolution,
            fps,
            recovery,
            cancel,
            released: AtomicBool::new(false),
            counters: FeedCounters::default(),
            throttler: LogThrottler::default(),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Resolution of every frame this feed delivers
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        self.recovery
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.is_released()
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            frames_delivered: self.counters.frames_delivered.load(Ordering::Relaxed),
            recoveries: self.counters.recoveries.load(Ordering::Relaxed),
            blank_frames: self.counters.blank_frames.load(Ordering::Relaxed),
        }
    }

    /// Pull the next frame: exactly one device read, plus at most one
    /// recovery cycle on `ReadFailure`.
    ///
    /// Returns `SessionClosed` once the owning session is cancelled or the
    /// feed has been released.
    pub async fn next_frame(&self) -> Result<CanonicalFrame> {
        if self.is_stopped() {
            return Err(AppError::SessionClosed);
        }

        let mut guard = self.state.lock().await;
        let state = guard.take().ok_or(AppError::SessionClosed)?;

        let (state, result) = Self::pull_blocking(state, false).await?;
        let first_error = match result {
            Ok(frame) => {
                *guard = Some(state);
                return Ok(self.deliver(frame));
            }
            Err(e @ AppError::ReadFailure { .. }) => e,
            Err(e) => {
                *guard = Some(state);
                return Err(e);
            }
        };

        if self.is_stopped() {
            *guard = Some(state);
            return Err(AppError::SessionClosed);
        }

        crate::warn_throttled!(
            self.throttler,
            "read_failure",
            "{}, attempting recovery",
            first_error
        );
        self.counters.recoveries.fetch_add(1, Ordering::Relaxed);

        let (mut state, result) = Self::pull_blocking(state, true).await?;
        let outcome = match result {
            Ok(frame) => {
                self.throttler.clear("read_failure");
                debug!("Capture {} recovered", self.device_id);
                Ok(self.deliver(frame))
            }
            Err(e) => {
                let e = match e {
                    e @ AppError::ReadFailure { .. } => e,
                    other => AppError::read_failure(&self.device_id, other),
                };
                match self.recovery {
                    RecoveryPolicy::Propagate => {
                        warn!("Capture {} recovery failed: {}", self.device_id, e);
                        Err(e)
                    }
                    RecoveryPolicy::BlankFrame => {
                        crate::warn_throttled!(
                            self.throttler,
                            "blank_frame",
                            "Capture {} recovery failed, substituting blank frames: {}",
                            self.device_id,
                            e
                        );
                        self.counters.blank_frames.fetch_add(1, Ordering::Relaxed);
                        let blank = state.adapter.stamp(CanonicalFrame::blank(self.resolution));
                        Ok(self.deliver(blank))
                    }
                }
            }
        };
        *guard = Some(state);
        outcome
    }

    async fn pull_blocking(
        mut state: FeedState,
        recover: bool,
    ) -> Result<(FeedState, Result<CanonicalFrame>)> {
        tokio::task::spawn_blocking(move || {
            let result = state.pull(recover);
            (state, result)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Capture read task failed: {}", e)))
    }

    fn deliver(&self, frame: CanonicalFrame) -> CanonicalFrame {
        self.counters.frames_delivered.fetch_add(1, Ordering::Relaxed);
        frame
    }

    /// Release the capture device. Idempotent.
    ///
    /// Waits for an in-flight read to finish; later pulls return
    /// `SessionClosed`.
    pub async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        let state = self.state.lock().await.take();
        if let Some(mut state) = state {
            state.source.release();
            info!("Video feed released {}", self.device_id);
        }
    }
}

impl Drop for VideoFeed {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.get_mut().take() {
            state.source.release();
            debug!("Video feed {} released on drop", self.device_id);
        }
    }
}
