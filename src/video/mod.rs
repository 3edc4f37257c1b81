//! Video capture and frame adaptation
//!
//! This module provides the capture sources, pixel conversion to the
//! canonical RGB24 representation, and the pull-based [`VideoFeed`] a
//! session hands to its transport.

pub mod capture;
pub mod convert;
pub mod feed;
pub mod format;
pub mod frame;
pub mod source;

pub use capture::{CaptureConfig, RecoveryPolicy, SourceKind, StereoConfig};
pub use convert::{FrameAdapter, TimestampPolicy};
pub use feed::{FeedStats, VideoFeed};
pub use format::{PixelFormat, Resolution};
pub use frame::{CanonicalFrame, FrameLayout, RawFrame, TimeBase};
pub use source::{
    CaptureSourceFactory, DeviceClaims, FrameSource, SourceFactory, StereoMode, StereoView,
};
