//! Session lifecycle
//!
//! ```text
//! offer ──> SessionManager::create_session
//!              ├── SourceFactory::create + VideoFeed::attach
//!              ├── TransportFactory::create
//!              ├── Session::negotiate ──> answer
//!              └── SessionRegistry::add + event consumer task
//! ```

pub mod manager;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod session;
pub mod state;

pub use manager::{SessionManager, SessionManagerConfig};
pub use registry::SessionRegistry;
pub use session::{Session, SessionInfo};
pub use state::{ConnectionState, SessionEvent};
