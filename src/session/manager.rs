//! Session creation and teardown
//!
//! `create_session` is all-or-nothing: the session is registered only
//! after the device is open and the answer exists. Any earlier failure
//! closes the transport and releases the device before returning.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::SessionRegistry;
use super::session::{session_event, Session, SessionInfo};
use super::state::{ConnectionState, SessionEvent};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::video::{RecoveryPolicy, SourceFactory, TimestampPolicy, VideoFeed};
use crate::webrtc::{SessionDescription, TransportEvent, TransportFactory};

/// Per-session policies applied by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionManagerConfig {
    pub recovery: RecoveryPolicy,
    pub timestamps: TimestampPolicy,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            recovery: RecoveryPolicy::Propagate,
            timestamps: TimestampPolicy::TransportAssigned,
        }
    }
}

impl From<&AppConfig> for SessionManagerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            recovery: config.capture.recovery,
            timestamps: config.capture.timestamps,
        }
    }
}

/// Creates, tracks and closes sessions
pub struct SessionManager {
    config: SessionManagerConfig,
    sources: Arc<dyn SourceFactory>,
    transports: Arc<dyn TransportFactory>,
    registry: Arc<SessionRegistry>,
}

impl SessionManager {
    pub fn new(
        config: SessionManagerConfig,
        sources: Arc<dyn SourceFactory>,
        transports: Arc<dyn TransportFactory>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            config,
            sources,
            transports,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Handle an offer and return the answer.
    ///
    /// Capture errors surface unchanged; transport errors as `Negotiation`.
    pub async fn create_session(&self, offer: SessionDescription) -> Result<SessionDescription> {
        if !offer.is_offer() {
            return Err(AppError::Negotiation(format!(
                "Expected an offer, got {}",
                offer.sdp_type
            )));
        }

        // Early out before touching the device; `add` enforces the limit
        if self.registry.is_full().await {
            return Err(AppError::Negotiation(format!(
                "Maximum sessions ({}) reached",
                self.registry.max_sessions()
            )));
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();

        let source = self.sources.create()?;
        let feed = Arc::new(
            VideoFeed::attach(
                source,
                self.config.recovery,
                self.config.timestamps,
                cancel.clone(),
            )
            .await?,
        );

        let (transport, events) = match self.transports.create(&session_id).await {
            Ok(created) => created,
            Err(e) => {
                feed.release().await;
                return Err(match e {
                    e @ AppError::Negotiation(_) => e,
                    other => AppError::Negotiation(other.to_string()),
                });
            }
        };

        let session = Arc::new(Session::new(session_id.clone(), feed, transport, cancel));
        let answer = match session.negotiate(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Session {} negotiation failed: {}", session_id, e);
                session.close().await;
                return Err(e);
            }
        };

        if let Err(e) = self.registry.add(session.clone()).await {
            session.close().await;
            return Err(e);
        }

        tokio::spawn(run_session_events(
            session.clone(),
            events,
            self.registry.clone(),
        ));

        info!(
            "Session {} created on {} ({} candidates)",
            session_id,
            session.feed().device_id(),
            answer.candidate_count()
        );
        Ok(answer)
    }

    /// Close one session. Unknown or already closed ids are a no-op.
    /// Returns whether a live session was closed.
    pub async fn close(&self, session_id: &str) -> bool {
        match self.registry.remove(session_id).await {
            Some(session) => {
                session.close().await;
                true
            }
            None => {
                debug!("Close for unknown session {}", session_id);
                false
            }
        }
    }

    pub async fn close_all(&self) -> usize {
        self.registry.close_all().await
    }

    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    pub async fn get_session(&self, session_id: &str) -> Option<SessionInfo> {
        self.registry.get(session_id).await.map(|s| s.info())
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.registry
            .sessions()
            .await
            .iter()
            .map(|s| s.info())
            .collect()
    }

    /// Watch a live session's state
    pub async fn subscribe(&self, session_id: &str) -> Option<watch::Receiver<ConnectionState>> {
        self.registry.get(session_id).await.map(|s| s.subscribe())
    }

    /// Resolves once the session reaches `Closed`, or at once if it is not
    /// registered
    pub async fn wait_closed(&self, session_id: &str) {
        if let Some(mut state) = self.subscribe(session_id).await {
            let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
        }
    }
}

/// Single consumer of one session's transport events.
///
/// Events are applied in arrival order. Failure or a closed transport
/// deregisters the session and tears it down.
async fn run_session_events(
    session: Arc<Session>,
    mut events: mpsc::Receiver<TransportEvent>,
    registry: Arc<SessionRegistry>,
) {
    loop {
        let event = tokio::select! {
            _ = session.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        debug!("Session {} event: {:?}", session.id(), event);
        let teardown = match session_event(&event) {
            Some(SessionEvent::Failure) => {
                if let Some(state) = session.apply(SessionEvent::Failure) {
                    warn!("Session {} is {} after {:?}", session.id(), state, event);
                }
                true
            }
            Some(SessionEvent::Closed) => true,
            Some(other) => {
                session.apply(other);
                false
            }
            None => false,
        };

        if teardown {
            registry.remove(session.id()).await;
            session.close().await;
            break;
        }
    }
    debug!("Session {} event consumer stopped", session.id());
}
