//! WebRTC configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, Result};

/// H.264 MIME type; the only codec the media pump can produce
pub const MIME_TYPE_H264: &str = "video/H264";

/// WebRTC configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
    /// Video codecs offered in the answer, most preferred first
    pub codecs: Vec<CodecPreference>,
    /// Upper bound on ICE gathering before the answer is returned (ms)
    pub ice_gathering_timeout_ms: u64,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            // Host candidates are enough on a LAN; configure STUN/TURN for remote peers
            stun_servers: vec![],
            turn_servers: vec![],
            codecs: CodecPreference::defaults(),
            ice_gathering_timeout_ms: 5000,
        }
    }
}

impl WebRtcConfig {
    pub fn ice_gathering_timeout(&self) -> Duration {
        Duration::from_millis(self.ice_gathering_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.codecs.is_empty() {
            return Err(AppError::Config("webrtc.codecs must not be empty".into()));
        }
        for codec in &self.codecs {
            if !codec.mime_type.eq_ignore_ascii_case(MIME_TYPE_H264) {
                return Err(AppError::Config(format!(
                    "Unsupported codec {}: only {} can be encoded",
                    codec.mime_type, MIME_TYPE_H264
                )));
            }
        }
        for turn in &self.turn_servers {
            if turn.urls.is_empty() {
                return Err(AppError::Config("TURN server without URLs".into()));
            }
        }
        Ok(())
    }
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServer {
    /// TURN server URLs (e.g. "turn:turn.example.com:3478?transport=udp")
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}

/// One codec entry registered with the media engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecPreference {
    pub mime_type: String,
    #[serde(default = "default_clock_rate")]
    pub clock_rate: u32,
    #[serde(default)]
    pub sdp_fmtp_line: String,
    pub payload_type: u8,
}

fn default_clock_rate() -> u32 {
    90_000
}

impl CodecPreference {
    pub fn h264(sdp_fmtp_line: impl Into<String>, payload_type: u8) -> Self {
        Self {
            mime_type: MIME_TYPE_H264.to_string(),
            clock_rate: default_clock_rate(),
            sdp_fmtp_line: sdp_fmtp_line.into(),
            payload_type,
        }
    }

    /// Constrained baseline with packetization-mode 1, then plain baseline
    /// with packetization-mode 0 for peers that cannot fragment
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::h264(
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f",
                125,
            ),
            Self::h264(
                "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42001f",
                127,
            ),
        ]
    }
}
