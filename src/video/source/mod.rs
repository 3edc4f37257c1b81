//! Capture device sources
//!
//! Every camera variant implements [`FrameSource`]; everything above this
//! module (feed, session, transport) is written against the trait only.
//!
//! ```text
//! SourceFactory ──create──> Box<dyn FrameSource>
//!                              ├── GenericCameraSource      (V4L2, mono)
//!                              ├── StereoDepthCameraSource  (V4L2, side-by-side)
//!                              └── TestPatternSource        (synthetic)
//! ```

pub mod claims;
pub mod generic;
pub mod pattern;
pub mod stereo;
pub mod v4l2;

pub use claims::{DeviceClaim, DeviceClaims};
pub use generic::GenericCameraSource;
pub use pattern::TestPatternSource;
pub use stereo::{StereoDepthCameraSource, StereoMode, StereoView};

use super::capture::{CaptureConfig, SourceKind};
use super::format::Resolution;
use super::frame::RawFrame;
use crate::error::Result;

/// A capture device producing raw frames on demand.
///
/// Calls are blocking and must not be issued concurrently against one
/// instance; [`VideoFeed`](super::feed::VideoFeed) serializes them.
pub trait FrameSource: Send {
    /// Acquire the device. Fails with `DeviceUnavailable`.
    fn open(&mut self) -> Result<()>;

    /// Read one frame. Fails with `ReadFailure`, including when not open.
    fn read_frame(&mut self) -> Result<RawFrame>;

    /// Release the device. Idempotent and safe after a failed open.
    fn release(&mut self);

    fn is_open(&self) -> bool;

    /// Identifier used for claims and logging
    fn device_id(&self) -> &str;

    /// Resolution of frames returned by `read_frame`
    fn output_resolution(&self) -> Resolution;

    /// Configured frame rate
    fn fps(&self) -> u32;
}

/// Builds unopened sources for new sessions
pub trait SourceFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn FrameSource>>;
}

/// Factory building the source variant selected by [`CaptureConfig`]
pub struct CaptureSourceFactory {
    config: CaptureConfig,
    claims: DeviceClaims,
}

impl CaptureSourceFactory {
    pub fn new(config: CaptureConfig, claims: DeviceClaims) -> Self {
        Self { config, claims }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn claims(&self) -> &DeviceClaims {
        &self.claims
    }
}

impl SourceFactory for CaptureSourceFactory {
    fn create(&self) -> Result<Box<dyn FrameSource>> {
        let config = self.config.clone();
        let claims = self.claims.clone();
        Ok(match config.source {
            SourceKind::Generic => Box::new(GenericCameraSource::new(config, claims)),
            SourceKind::Stereo => Box::new(StereoDepthCameraSource::new(config, claims)?),
            SourceKind::TestPattern => Box::new(TestPatternSource::new(config, claims)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_configured_variant() {
        let claims = DeviceClaims::new();
        let config = CaptureConfig::default()
            .with_source(SourceKind::TestPattern)
            .with_resolution(320, 240);
        let factory = CaptureSourceFactory::new(config, claims.clone());

        let mut source = factory.create().unwrap();
        assert!(!source.is_open());
        assert_eq!(source.output_resolution(), Resolution::new(320, 240));

        source.open().unwrap();
        assert!(claims.is_claimed(source.device_id()));
        source.release();
        assert!(claims.is_empty());
    }
}
