//! Exclusive device ownership

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};

/// Table of capture devices currently held by an open source.
///
/// Cloning shares the table. One instance is created at process start and
/// handed to every source factory.
#[derive(Debug, Clone, Default)]
pub struct DeviceClaims {
    held: Arc<Mutex<HashSet<String>>>,
}

impl DeviceClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `device`, failing with `DeviceUnavailable` if it is held
    pub fn claim(&self, device: &str) -> Result<DeviceClaim> {
        let mut held = self.held.lock();
        if !held.insert(device.to_string()) {
            return Err(AppError::device_unavailable(
                device,
                "device is already claimed by another session",
            ));
        }
        debug!("Claimed capture device {}", device);
        Ok(DeviceClaim {
            device: device.to_string(),
            held: self.held.clone(),
        })
    }

    pub fn is_claimed(&self, device: &str) -> bool {
        self.held.lock().contains(device)
    }

    /// Number of devices currently held
    pub fn len(&self) -> usize {
        self.held.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.lock().is_empty()
    }
}

/// Held claim; dropping it frees the device
#[derive(Debug)]
pub struct DeviceClaim {
    device: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl DeviceClaim {
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        self.held.lock().remove(&self.device);
        debug!("Released capture device {}", self.device);
    }
}
