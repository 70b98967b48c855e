//! Media device error types and handling
//!
//! This module defines the error types used throughout the media device layer,
//! covering permission, enumeration and acquisition failures reported by a
//! [`MediaPlatform`](crate::capture::MediaPlatform).

use thiserror::Error;

/// Main error type for media device operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message
        message: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Capture permission was refused by the user or the platform
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Device enumeration failed
    #[error("Device enumeration failed: {reason}")]
    DeviceEnumerationFailed {
        /// Failure reason
        reason: String,
    },

    /// Device not found error
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// Device is held by another process
    #[error("Device busy: {device_id}")]
    DeviceBusy {
        /// Device identifier
        device_id: String,
    },

    /// A capture stream could not be acquired
    #[error("Device acquisition failed{}: {reason}", for_device(.device_id))]
    DeviceAcquisitionFailed {
        /// Device the acquisition targeted, if any
        device_id: Option<String>,
        /// Failure reason
        reason: String,
    },

    /// The platform handed back a stream without any track
    #[error("Stream {stream_id} carries no tracks")]
    NoTracks {
        /// Stream identifier
        stream_id: String,
    },

    /// Error reported by a native device library
    #[error("Platform error: {library} - {message}")]
    Platform {
        /// Library name
        library: String,
        /// Error message
        message: String,
    },
}

fn for_device(device_id: &Option<String>) -> String {
    device_id
        .as_deref()
        .map(|id| format!(" for {}", id))
        .unwrap_or_default()
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        MediaError::Io {
            message: err.to_string(),
        }
    }
}

impl MediaError {
    /// Check if error is recoverable by trying the same operation again later
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Io { .. } => true,
            MediaError::DeviceBusy { .. } => true,
            MediaError::DeviceAcquisitionFailed { .. } => true,
            MediaError::NoTracks { .. } => true,
            MediaError::PermissionDenied { .. } => false,
            MediaError::DeviceNotFound { .. } => false,
            MediaError::InvalidConfiguration { .. } => false,
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Io { .. } => ErrorCategory::System,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::PermissionDenied { .. } => ErrorCategory::Permission,
            MediaError::DeviceEnumerationFailed { .. } => ErrorCategory::Device,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::DeviceBusy { .. } => ErrorCategory::Device,
            MediaError::DeviceAcquisitionFailed { .. } => ErrorCategory::Device,
            MediaError::NoTracks { .. } => ErrorCategory::Device,
            MediaError::Platform { .. } => ErrorCategory::Platform,
        }
    }

    /// Fold any capture failure into [`MediaError::DeviceAcquisitionFailed`]
    ///
    /// Permission revocation, unplugged and busy devices all surface to the
    /// user the same way once permission was granted earlier.
    pub fn into_acquisition_failure(self, device_id: Option<&str>) -> MediaError {
        match self {
            err @ MediaError::DeviceAcquisitionFailed { .. } => err,
            other => MediaError::DeviceAcquisitionFailed {
                device_id: device_id.map(str::to_string),
                reason: other.to_string(),
            },
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// System-level errors (I/O)
    System,
    /// Configuration and parameter errors
    Configuration,
    /// Capture permission errors
    Permission,
    /// Device and hardware errors
    Device,
    /// Native library errors
    Platform,
}

/// Helper trait for converting native library errors
pub trait IntoMediaError {
    /// Wrap `self` into a [`MediaError::Platform`] with the given context
    fn into_media_error(self, library: &str, context: &str) -> MediaError;
}

impl<E: std::fmt::Display> IntoMediaError for E {
    fn into_media_error(self, library: &str, context: &str) -> MediaError {
        MediaError::Platform {
            library: library.to_string(),
            message: format!("{}: {}", context, self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let denied = MediaError::PermissionDenied {
            operation: "camera".to_string(),
        };
        assert_eq!(denied.category(), ErrorCategory::Permission);
        assert!(!denied.is_recoverable());

        let busy = MediaError::DeviceBusy {
            device_id: "cam-0".to_string(),
        };
        assert_eq!(busy.category(), ErrorCategory::Device);
        assert!(busy.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = MediaError::DeviceAcquisitionFailed {
            device_id: Some("cam-0".to_string()),
            reason: "unplugged".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Device acquisition failed for cam-0: unplugged"
        );

        let anonymous = MediaError::DeviceAcquisitionFailed {
            device_id: None,
            reason: "busy".to_string(),
        };
        assert_eq!(anonymous.to_string(), "Device acquisition failed: busy");
    }

    #[test]
    fn test_into_acquisition_failure() {
        let err = MediaError::DeviceNotFound {
            device_id: "cam-1".to_string(),
        }
        .into_acquisition_failure(Some("cam-1"));

        match err {
            MediaError::DeviceAcquisitionFailed { device_id, reason } => {
                assert_eq!(device_id.as_deref(), Some("cam-1"));
                assert!(reason.contains("Device not found"));
            }
            other => panic!("Expected DeviceAcquisitionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let media_error = MediaError::from(io_error);

        match media_error {
            MediaError::Io { .. } => (),
            _ => panic!("Expected Io error variant"),
        }
    }
}
