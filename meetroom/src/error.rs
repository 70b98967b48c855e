//! Error types for meetroom

use crate::join::ValidationError;
use meetroom_media::MediaError;
use thiserror::Error;

/// Main error type for setup session operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// Media device error
    #[error(transparent)]
    Media(#[from] MediaError),

    /// Join form validation failed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The session already joined a room or was disposed
    #[error("Setup session is closed")]
    SessionClosed,

    /// The preview controller task is no longer running
    #[error("Preview controller is no longer running")]
    ControllerUnavailable,

    /// Invalid configuration
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Reason the configuration was rejected
        reason: String,
    },

    /// Diagnostics tooling failed
    #[cfg(feature = "diagnostics")]
    #[error(transparent)]
    Diagnostics(#[from] meetroom_diagnostics::DiagnosticsError),
}

impl SetupError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            SetupError::Media(MediaError::PermissionDenied { .. }) => {
                "PERMISSION_DENIED".to_string()
            }
            SetupError::Media(MediaError::DeviceEnumerationFailed { .. }) => {
                "DEVICE_ENUMERATION_FAILED".to_string()
            }
            SetupError::Media(MediaError::DeviceNotFound { .. }) => "DEVICE_NOT_FOUND".to_string(),
            SetupError::Media(_) => "MEDIA_ERROR".to_string(),
            SetupError::Validation(ValidationError::EmptyUserName) => {
                "EMPTY_USER_NAME".to_string()
            }
            SetupError::Validation(ValidationError::EmptyRoomName) => {
                "EMPTY_ROOM_NAME".to_string()
            }
            SetupError::SessionClosed => "SESSION_CLOSED".to_string(),
            SetupError::ControllerUnavailable => "CONTROLLER_UNAVAILABLE".to_string(),
            SetupError::Config { .. } => "INVALID_CONFIGURATION".to_string(),
            #[cfg(feature = "diagnostics")]
            SetupError::Diagnostics(_) => "DIAGNOSTICS_ERROR".to_string(),
        }
    }

    /// Check if the session can keep going after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SetupError::SessionClosed | SetupError::ControllerUnavailable
        )
    }
}
