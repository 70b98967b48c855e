//! Join validation and the handoff to the call screen

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Reasons a join attempt is rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    /// The trimmed user name is empty
    #[error("Please enter your name")]
    EmptyUserName,
    /// The trimmed room name is empty
    #[error("Please enter a room name")]
    EmptyRoomName,
}

/// Validated configuration handed from setup to the call screen
///
/// Only [`attempt_join`] constructs one; it cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomJoinConfig {
    user_name: String,
    room_name: String,
    camera_enabled: bool,
    mic_enabled: bool,
}

impl RoomJoinConfig {
    /// Trimmed, non-empty user name
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Trimmed, non-empty room name
    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    /// Whether the user joins with the camera on
    pub fn camera_enabled(&self) -> bool {
        self.camera_enabled
    }

    /// Whether the user joins with the microphone on
    pub fn mic_enabled(&self) -> bool {
        self.mic_enabled
    }
}

/// Validate the setup form and build the join configuration
///
/// Both names are trimmed. An empty user name is reported before an empty
/// room name.
///
/// # Example
/// ```rust
/// use meetroom::{attempt_join, ValidationError};
///
/// let config = attempt_join("  Alice  ", "  Room1  ", true, false)?;
/// assert_eq!(config.user_name(), "Alice");
/// assert_eq!(config.room_name(), "Room1");
///
/// assert_eq!(
///     attempt_join("  ", "room1", true, true),
///     Err(ValidationError::EmptyUserName)
/// );
/// # Ok::<(), ValidationError>(())
/// ```
pub fn attempt_join(
    user_name: &str,
    room_name: &str,
    camera_enabled: bool,
    mic_enabled: bool,
) -> Result<RoomJoinConfig, ValidationError> {
    let user_name = user_name.trim();
    if user_name.is_empty() {
        return Err(ValidationError::EmptyUserName);
    }
    let room_name = room_name.trim();
    if room_name.is_empty() {
        return Err(ValidationError::EmptyRoomName);
    }

    info!(
        user = user_name,
        room = room_name,
        camera_enabled,
        mic_enabled,
        "Join request validated"
    );
    Ok(RoomJoinConfig {
        user_name: user_name.to_string(),
        room_name: room_name.to_string(),
        camera_enabled,
        mic_enabled,
    })
}

/// Receiver of the finished setup, typically the call screen
pub trait JoinHandler: Send {
    /// Called exactly once with the validated configuration
    fn on_join_room(&mut self, config: RoomJoinConfig);
}

impl<F> JoinHandler for F
where
    F: FnMut(RoomJoinConfig) + Send,
{
    fn on_join_room(&mut self, config: RoomJoinConfig) {
        self(config)
    }
}
