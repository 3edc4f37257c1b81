//! Signaling payloads exchanged with the remote peer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Description type as carried in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
            SdpType::Pranswer => write!(f, "pranswer"),
            SdpType::Rollback => write!(f, "rollback"),
        }
    }
}

/// `{ "sdp": "...", "type": "offer" | "answer" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// SDP content
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }

    /// Number of `a=candidate:` lines embedded in the SDP
    pub fn candidate_count(&self) -> usize {
        self.sdp.matches("a=candidate:").count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let desc: SessionDescription =
            serde_json::from_str(r#"{"sdp":"v=0\r\n","type":"offer"}"#).unwrap();
        assert!(desc.is_offer());

        let json = serde_json::to_value(SessionDescription::answer("v=0")).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["sdp"], "v=0");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<SessionDescription, _> =
            serde_json::from_str(r#"{"sdp":"v=0","type":"bogus"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_candidate_count() {
        let desc = SessionDescription::answer("v=0\r\na=candidate:1 1 udp 1 10.0.0.1 5000 typ host\r\n");
        assert_eq!(desc.candidate_count(), 1);
    }
}
