//! Transport seam between sessions and the negotiation engine
//!
//! Sessions only talk to [`PeerTransport`]; the webrtc-rs backed
//! implementation lives in [`super::peer`]. Connection-state notifications
//! are delivered over the channel returned by [`TransportFactory::create`],
//! one receiver per session.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::signaling::SessionDescription;
use crate::error::Result;
use crate::video::VideoFeed;

/// Capacity of the per-session event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Connection state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::New => write!(f, "new"),
            TransportState::Connecting => write!(f, "connecting"),
            TransportState::Connected => write!(f, "connected"),
            TransportState::Disconnected => write!(f, "disconnected"),
            TransportState::Failed => write!(f, "failed"),
            TransportState::Closed => write!(f, "closed"),
        }
    }
}

/// Notification from a transport to its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    StateChanged(TransportState),
    /// The media path gave up (feed error after recovery)
    MediaFailed(String),
}

/// One peer connection
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attach the feed the transport pulls frames from
    async fn add_video_source(&self, feed: Arc<VideoFeed>) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Current local description as it should be sent to the peer
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Close the connection and stop pulling frames. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Builds a transport for a new session
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        session_id: &str,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::Receiver<TransportEvent>)>;
}
