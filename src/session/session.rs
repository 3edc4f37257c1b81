//! A single peer session

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{transition, ConnectionState, SessionEvent};
use crate::error::{AppError, Result};
use crate::video::{FeedStats, VideoFeed};
use crate::webrtc::{PeerTransport, SessionDescription, TransportEvent, TransportState};

/// Session summary for listings
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub state: ConnectionState,
    pub device: String,
    pub feed: FeedStats,
}

/// Wrap anything that is not already a capture or negotiation error
fn negotiation_error(e: AppError) -> AppError {
    match e {
        e @ (AppError::Negotiation(_)
        | AppError::DeviceUnavailable { .. }
        | AppError::ReadFailure { .. }) => e,
        other => AppError::Negotiation(other.to_string()),
    }
}

/// Map a transport notification onto the state machine
pub fn session_event(event: &TransportEvent) -> Option<SessionEvent> {
    match event {
        TransportEvent::StateChanged(TransportState::Connected) => {
            Some(SessionEvent::TransportConnected)
        }
        TransportEvent::StateChanged(TransportState::Failed) | TransportEvent::MediaFailed(_) => {
            Some(SessionEvent::Failure)
        }
        TransportEvent::StateChanged(TransportState::Closed) => Some(SessionEvent::Closed),
        TransportEvent::StateChanged(
            TransportState::New | TransportState::Connecting | TransportState::Disconnected,
        ) => None,
    }
}

/// One peer connection with its video feed
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    feed: Arc<VideoFeed>,
    transport: Arc<dyn PeerTransport>,
    state: watch::Sender<ConnectionState>,
    local_description: Mutex<Option<SessionDescription>>,
    remote_description: Mutex<Option<SessionDescription>>,
    cancel: CancellationToken,
    teardown: tokio::sync::Mutex<bool>,
}

impl Session {
    pub fn new(
        id: String,
        feed: Arc<VideoFeed>,
        transport: Arc<dyn PeerTransport>,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::New);
        Self {
            id,
            created_at: Utc::now(),
            feed,
            transport,
            state,
            local_description: Mutex::new(None),
            remote_description: Mutex::new(None),
            cancel,
            teardown: tokio::sync::Mutex::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn feed(&self) -> &Arc<VideoFeed> {
        &self.feed
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.lock().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote_description.lock().clone()
    }

    /// Resolves once teardown has started
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            created_at: self.created_at,
            state: self.state(),
            device: self.feed.device_id().to_string(),
            feed: self.feed.stats(),
        }
    }

    /// Apply `event`; returns the new state if it changed
    pub fn apply(&self, event: SessionEvent) -> Option<ConnectionState> {
        let mut next = None;
        self.state.send_if_modified(|state| match transition(*state, event) {
            Some(new_state) => {
                debug!("Session {} {} -> {}", self.id, state, new_state);
                *state = new_state;
                next = Some(new_state);
                true
            }
            None => false,
        });
        next
    }

    /// Run the offer/answer exchange and return the answer to send back.
    ///
    /// On error the session is left in `Failed`; the caller tears it down.
    pub async fn negotiate(&self, offer: SessionDescription) -> Result<SessionDescription> {
        self.apply(SessionEvent::RemoteDescription);
        match self.exchange(offer).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                self.apply(SessionEvent::Failure);
                Err(negotiation_error(e))
            }
        }
    }

    async fn exchange(&self, offer: SessionDescription) -> Result<SessionDescription> {
        self.transport.add_video_source(self.feed.clone()).await?;

        *self.remote_description.lock() = Some(offer.clone());
        self.transport.set_remote_description(offer).await?;

        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(answer.clone()).await?;

        let local = self.transport.local_description().await.unwrap_or(answer);
        *self.local_description.lock() = Some(local.clone());
        Ok(local)
    }

    /// Tear down: stop the pump, release the device, close the transport.
    /// Idempotent; a concurrent second call waits for the first.
    ///
    /// The device is released before the transport close is awaited, so a
    /// close abandoned on timeout still frees the camera.
    pub async fn close(&self) {
        let mut done = self.teardown.lock().await;
        if *done {
            return;
        }

        self.cancel.cancel();
        self.feed.release().await;
        if let Err(e) = self.transport.close().await {
            warn!("Session {} transport close failed: {}", self.id, e);
        }
        self.apply(SessionEvent::Closed);

        *done = true;
        info!("Session {} closed", self.id);
    }
}
