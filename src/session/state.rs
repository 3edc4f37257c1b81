//! Session connection state machine

use serde::Serialize;
use std::fmt;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Negotiating => write!(f, "negotiating"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Inputs driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Remote description received
    RemoteDescription,
    /// Transport reports the connection is up
    TransportConnected,
    /// Negotiation, transport or media failure
    Failure,
    /// Teardown finished
    Closed,
}

/// Next state for `event`, or `None` if the event does not apply in `state`
pub fn transition(state: ConnectionState, event: SessionEvent) -> Option<ConnectionState> {
    use ConnectionState::*;

    match (state, event) {
        (New, SessionEvent::RemoteDescription) => Some(Negotiating),
        (Negotiating, SessionEvent::TransportConnected) => Some(Connected),
        (Negotiating | Connected, SessionEvent::Failure) => Some(Failed),
        (Closed, _) => None,
        (_, SessionEvent::Closed) => Some(Closed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_happy_path() {
        let s = transition(New, SessionEvent::RemoteDescription).unwrap();
        assert_eq!(s, Negotiating);
        let s = transition(s, SessionEvent::TransportConnected).unwrap();
        assert_eq!(s, Connected);
        assert_eq!(transition(s, SessionEvent::Closed), Some(Closed));
    }

    #[test]
    fn test_failure_paths() {
        assert_eq!(transition(Negotiating, SessionEvent::Failure), Some(Failed));
        assert_eq!(transition(Connected, SessionEvent::Failure), Some(Failed));
        assert_eq!(transition(Failed, SessionEvent::Closed), Some(Closed));
        assert_eq!(transition(New, SessionEvent::Failure), None);
    }

    #[test]
    fn test_closed_is_terminal() {
        for event in [
            SessionEvent::RemoteDescription,
            SessionEvent::TransportConnected,
            SessionEvent::Failure,
            SessionEvent::Closed,
        ] {
            assert_eq!(transition(Closed, event), None);
        }
        assert!(Closed.is_terminal());
    }

    #[test]
    fn test_out_of_order_events_ignored() {
        assert_eq!(transition(New, SessionEvent::TransportConnected), None);
        assert_eq!(transition(Connected, SessionEvent::TransportConnected), None);
        assert_eq!(transition(Failed, SessionEvent::TransportConnected), None);
        assert_eq!(transition(Connected, SessionEvent::RemoteDescription), None);
    }
}
