//! Process-wide set of live sessions

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::session::Session;
use crate::error::{AppError, Result};

/// Live sessions keyed by id.
///
/// Empty at startup; [`close_all`](Self::close_all) at shutdown.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    close_timeout: Duration,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Registry without a session limit
    pub fn new(close_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            close_timeout,
            max_sessions: usize::MAX,
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub async fn is_full(&self) -> bool {
        self.sessions.read().await.len() >= self.max_sessions
    }

    /// Register `session`. The limit is checked under the write lock, so
    /// concurrent adds never exceed it.
    pub async fn add(&self, session: Arc<Session>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(AppError::Negotiation(format!(
                "Maximum sessions ({}) reached",
                self.max_sessions
            )));
        }
        if sessions.contains_key(session.id()) {
            return Err(AppError::Internal(format!(
                "Session {} already registered",
                session.id()
            )));
        }
        debug!("Registering session {}", session.id());
        sessions.insert(session.id().to_string(), session);
        Ok(())
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Remove every session and close them concurrently.
    ///
    /// Each close is bounded by the close timeout; a close that hangs is
    /// abandoned without holding up the rest. Returns the number of
    /// sessions removed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };
        let count = drained.len();
        if count == 0 {
            return 0;
        }

        info!("Closing {} sessions", count);
        let timeout = self.close_timeout;
        let closes = drained.into_iter().map(|session| async move {
            if tokio::time::timeout(timeout, session.close()).await.is_err() {
                warn!(
                    "Session {} did not close within {:?}, abandoning",
                    session.id(),
                    timeout
                );
            }
        });
        join_all(closes).await;

        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransportFactory, ScriptedSource, SourceProbe};
    use crate::video::{RecoveryPolicy, Resolution, TimestampPolicy, VideoFeed};
    use crate::webrtc::TransportFactory;
    use std::time::Instant;
    use tokio_util::sync::CancellationToken;

    async fn session(id: &str, factory: &MockTransportFactory) -> (Arc<Session>, Arc<SourceProbe>) {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(Resolution::new(4, 4));
        let probe = source.probe();
        let feed = VideoFeed::attach(
            Box::new(source),
            RecoveryPolicy::Propagate,
            TimestampPolicy::TransportAssigned,
            cancel.clone(),
        )
        .await
        .unwrap();
        let (transport, _events) = factory.create(id).await.unwrap();
        (
            Arc::new(Session::new(id.to_string(), Arc::new(feed), transport, cancel)),
            probe,
        )
    }

    #[tokio::test]
    async fn test_close_all_empty() {
        let registry = SessionRegistry::new(Duration::from_secs(1));
        assert_eq!(registry.close_all().await, 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_remove() {
        let factory = MockTransportFactory::new();
        let registry = SessionRegistry::new(Duration::from_secs(1));
        let (s, _) = session("a", &factory).await;

        registry.add(s.clone()).await.unwrap();
        assert!(registry.add(s.clone()).await.is_err());
        assert_eq!(registry.ids().await, vec!["a".to_string()]);
        assert!(registry.get("a").await.is_some());

        assert!(registry.remove("a").await.is_some());
        assert!(registry.remove("a").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_close_all_releases_every_source() {
        let factory = MockTransportFactory::new();
        let registry = SessionRegistry::new(Duration::from_secs(1));
        let mut probes = vec![];
        for i in 0..5 {
            let (s, probe) = session(&format!("s{}", i), &factory).await;
            registry.add(s).await.unwrap();
            probes.push(probe);
        }

        assert_eq!(registry.close_all().await, 5);
        assert_eq!(registry.len().await, 0);
        for probe in probes {
            assert_eq!(probe.releases(), 1);
            assert!(!probe.is_open());
        }
    }

    #[tokio::test]
    async fn test_hung_close_does_not_block_others() {
        let registry = SessionRegistry::new(Duration::from_millis(100));

        let hung = MockTransportFactory::new().with_close_delay(Duration::from_secs(30));
        let (stuck, stuck_probe) = session("stuck", &hung).await;
        registry.add(stuck).await.unwrap();

        let factory = MockTransportFactory::new();
        let (ok, probe) = session("ok", &factory).await;
        registry.add(ok).await.unwrap();

        let started = Instant::now();
        assert_eq!(registry.close_all().await, 2);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(registry.is_empty().await);
        assert_eq!(probe.releases(), 1);

        // The abandoned close still freed its device
        assert_eq!(stuck_probe.releases(), 1);
        assert!(!stuck_probe.is_open());
    }

    #[tokio::test]
    async fn test_limit_holds_for_concurrent_adds() {
        let factory = MockTransportFactory::new();
        let registry = SessionRegistry::new(Duration::from_secs(1)).with_max_sessions(1);
        let (a, _) = session("a", &factory).await;
        let (b, _) = session("b", &factory).await;

        let (first, second) = tokio::join!(registry.add(a), registry.add(b));
        assert!(first.is_ok() ^ second.is_ok());
        assert!(matches!(
            first.err().or(second.err()),
            Some(AppError::Negotiation(_))
        ));
        assert_eq!(registry.len().await, 1);
        assert!(registry.is_full().await);
    }
}
