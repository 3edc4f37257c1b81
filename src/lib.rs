//! camrtc - serve a local camera to browsers over WebRTC
//!
//! Each accepted offer becomes a session owning one capture device feed,
//! one peer connection and one H.264 track.

pub mod config;
pub mod error;
pub mod session;
pub mod utils;
pub mod video;
pub mod webrtc;

#[cfg(test)]
pub mod testing;

pub use error::{AppError, Result};
