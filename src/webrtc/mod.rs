//! WebRTC transport
//!
//! ```text
//! SessionManager
//!     │ TransportFactory::create
//!     ▼
//! RtcTransport ── on Connected ──> media pump
//!     │                              VideoFeed::next_frame
//!     │                              EncoderWorker (openh264)
//!     │                              TrackLocalStaticSample::write_sample
//!     └── TransportEvent ──> per-session consumer task
//! ```

pub mod config;
pub mod encoder;
pub mod media;
pub mod peer;
pub mod signaling;
pub mod transport;

pub use config::{CodecPreference, TurnServer, WebRtcConfig};
pub use peer::{RtcTransport, RtcTransportFactory};
pub use signaling::{SdpType, SessionDescription};
pub use transport::{PeerTransport, TransportEvent, TransportFactory, TransportState};
