use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::video::{CaptureConfig, SourceKind};
use crate::webrtc::WebRtcConfig;

/// Maximum concurrent sessions
const DEFAULT_MAX_SESSIONS: usize = 8;
/// Per-session close timeout used by shutdown (ms)
const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 5000;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Video capture settings
    pub capture: CaptureConfig,
    /// WebRTC transport settings
    pub webrtc: WebRtcConfig,
    /// Session lifecycle settings
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        if capture.fps == 0 {
            return Err(AppError::Config("capture.fps must be positive".into()));
        }
        if capture.source != SourceKind::Stereo
            && (capture.resolution.width == 0 || capture.resolution.height == 0)
        {
            return Err(AppError::Config(format!(
                "Invalid capture resolution {}",
                capture.resolution
            )));
        }
        if capture.buffer_count == 0 {
            return Err(AppError::Config("capture.buffer_count must be positive".into()));
        }
        if capture.device.is_empty() {
            return Err(AppError::Config("capture.device must not be empty".into()));
        }

        self.webrtc.validate()?;

        if self.session.max_sessions == 0 {
            return Err(AppError::Config("session.max_sessions must be positive".into()));
        }
        Ok(())
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum concurrent sessions
    pub max_sessions: usize,
    /// Upper bound for closing one session at shutdown (ms)
    pub close_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}
