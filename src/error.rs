use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Capture device could not be claimed or opened
    #[error("Device unavailable [{device}]: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    /// Device returned no usable frame
    #[error("Read failure [{device}]: {reason}")]
    ReadFailure { device: String, reason: String },

    /// Any failure reported by the transport-negotiation layer
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn device_unavailable(device: impl Into<String>, reason: impl ToString) -> Self {
        Self::DeviceUnavailable {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read_failure(device: impl Into<String>, reason: impl ToString) -> Self {
        Self::ReadFailure {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error originates from the capture layer
    pub fn is_capture_error(&self) -> bool {
        matches!(
            self,
            AppError::DeviceUnavailable { .. } | AppError::ReadFailure { .. }
        )
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
