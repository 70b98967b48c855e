//! # meetroom - Pre-join Device Setup
//!
//! meetroom drives the setup screen shown before entering a meeting room. It
//! lists the local cameras, microphones and speakers, keeps a live camera
//! preview in step with the user's choices, validates the join form and hands
//! the result to the call screen.
//!
//! ## Key Features
//!
//! - **One preview at a time**: the old stream is always released before a new
//!   camera is opened, and a disposed session holds no hardware
//! - **Permission aware**: a refused permission leaves an empty, usable screen
//! - **Event driven**: notices and preview changes arrive on a broadcast stream
//! - **Pluggable platform**: scripted devices for tests, native devices with the
//!   `native` feature
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meetroom::{RoomJoinConfig, ScriptedPlatform, SetupConfig, SetupSession, VideoSurface};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = SetupSession::mount(
//!         Arc::new(ScriptedPlatform::laptop()),
//!         Arc::new(VideoSurface::new()),
//!         SetupConfig::default(),
//!     )
//!     .await?;
//!
//!     session.select_camera("cam-b")?;
//!     session.set_user_name("Alice")?;
//!     session.set_room_name("standup")?;
//!
//!     let mut on_join = |config: RoomJoinConfig| {
//!         println!("Joining {} as {}", config.room_name(), config.user_name());
//!     };
//!     session.join(&mut on_join).await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export media types for easy access
#[cfg(feature = "native")]
pub use meetroom_media::NativePlatform;
pub use meetroom_media::{
    CaptureConstraints, DeviceDescriptor, DeviceInventory, DeviceKind, DeviceSelection,
    MediaError, MediaPlatform, MediaStream, MediaTrack, RenderTarget, ScriptedPlatform,
    TrackKind, VideoResolution, VideoSurface,
};

#[cfg(feature = "diagnostics")]
pub use meetroom_diagnostics::{DebugLogger, HandleAudit, HandleReport};

// Public API modules
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod join;
pub mod session;

// Re-export main API types
pub use config::SetupConfig;
pub use controller::{ControllerOptions, PreviewSnapshot, PreviewState, StreamController};
pub use error::SetupError;
pub use event::{EventFilter, EventStream, FilteredEventStream, Notice, SetupEvent};
pub use join::{attempt_join, JoinHandler, RoomJoinConfig, ValidationError};
pub use session::{CaptureState, SetupSession};

/// Install the tracing subscriber selected by `config.debug_logging`
///
/// `RUST_LOG` takes precedence when set. Calling this more than once is
/// harmless.
#[cfg(feature = "diagnostics")]
pub fn init_logging(config: &SetupConfig) -> Result<(), SetupError> {
    DebugLogger::init_logging(config.debug_logging)?;
    Ok(())
}
