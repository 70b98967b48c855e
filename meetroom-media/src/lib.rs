//! # meetroom media
//!
//! Local media devices for meetroom: the device platform boundary, device
//! inventory and selection, capture streams and tracks, and render targets.
//! This crate owns no lifecycle policy; it supplies the pieces the setup
//! session's stream controller sequences.

#![warn(clippy::all)]

pub mod capture;
pub mod devices;
pub mod error;
pub mod inventory;
pub mod render;
pub mod tracks;

// Re-export main types
#[cfg(feature = "native")]
pub use capture::NativePlatform;
pub use capture::{
    scripted::CaptureGate, stop_stream, CaptureConstraints, MediaPlatform, PlatformCall,
    ScriptedPlatform, TrackEndings, VideoConstraint, VideoResolution,
};
pub use devices::{DeviceDescriptor, DeviceInventory, DeviceKind, DeviceSelection};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use inventory::{enumerate_inventory, request_permission_and_enumerate};
pub use render::{RenderTarget, SurfaceStats, VideoSurface};
pub use tracks::{MediaStream, MediaTrack, TrackKind, TrackReadyState};
