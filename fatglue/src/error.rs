//! Error types for the drive layer

use core::fmt;

/// Result type for drive operations
pub type Result<T> = core::result::Result<T, DriveError>;

/// Errors surfaced by the drive resilience core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveError {
    /// Volume id outside the registry or not registered
    InvalidVolume,

    /// Transfer still short after every retry, or a control request failed
    IoError,

    /// Volume lock not granted before its deadline
    TimedOut,

    /// Lock released by a context that does not hold it
    NotOwner,
}

impl fmt::Display for DriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVolume => write!(f, "Invalid or unregistered volume"),
            Self::IoError => write!(f, "I/O error on block device"),
            Self::TimedOut => write!(f, "Timed out waiting for volume lock"),
            Self::NotOwner => write!(f, "Volume lock not held by caller"),
        }
    }
}

/// Raw failure code reported by a device driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError(pub i32);

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device error: {}", self.0)
    }
}

impl From<DeviceError> for DriveError {
    fn from(_: DeviceError) -> Self {
        DriveError::IoError
    }
}
