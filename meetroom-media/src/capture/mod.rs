//! Device platform boundary
//!
//! The media layer never talks to hardware directly. Everything goes through a
//! [`MediaPlatform`], which grants capture streams, lists devices and releases
//! tracks. [`ScriptedPlatform`] is an in-memory backend for tests, demos and
//! headless environments; [`NativePlatform`] (feature `native`) talks to real
//! cameras and audio endpoints.

#[cfg(feature = "native")]
pub mod native;
pub mod scripted;

#[cfg(feature = "native")]
pub use native::NativePlatform;
pub use scripted::{PlatformCall, ScriptedPlatform};

use crate::devices::DeviceDescriptor;
use crate::error::MediaResult;
use crate::tracks::MediaStream;
use crate::tracks::MediaTrack;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Video resolution information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoResolution {
    pub width: u32,
    pub height: u32,
}

impl VideoResolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const HD: Self = Self::new(1280, 720);
    pub const VGA: Self = Self::new(640, 480);
}

/// Which camera a capture request wants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoConstraint {
    /// No video
    Disabled,
    /// Any camera the platform picks
    Any,
    /// A specific camera
    Device(String),
}

impl VideoConstraint {
    /// Check whether video is requested at all
    pub fn is_requested(&self) -> bool {
        !matches!(self, VideoConstraint::Disabled)
    }

    /// Requested device id, if pinned
    pub fn device_id(&self) -> Option<&str> {
        match self {
            VideoConstraint::Device(id) => Some(id),
            _ => None,
        }
    }
}

/// Constraints for one capture request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub video: VideoConstraint,
    pub audio: bool,
    /// Ideal resolution; platforms may pick the closest supported mode
    pub resolution: Option<VideoResolution>,
}

impl CaptureConstraints {
    /// Combined audio and video request used to unlock device labels
    pub fn permission_probe() -> Self {
        Self {
            video: VideoConstraint::Any,
            audio: true,
            resolution: None,
        }
    }

    /// Video-only preview of the given camera, or any camera when unset
    pub fn camera_preview(device_id: Option<&str>, resolution: Option<VideoResolution>) -> Self {
        let video = match device_id {
            Some(id) if !id.is_empty() => VideoConstraint::Device(id.to_string()),
            _ => VideoConstraint::Any,
        };
        Self {
            video,
            audio: false,
            resolution,
        }
    }
}

/// Receiver of ids of tracks the hardware ended on its own
pub type TrackEndings = broadcast::Receiver<String>;

/// Platform service that owns real capture hardware
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Acquire a new capture stream matching `constraints`
    async fn request_capture(&self, constraints: &CaptureConstraints) -> MediaResult<MediaStream>;

    /// List every capture and render endpoint
    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceDescriptor>>;

    /// Release the hardware handle behind `track`
    ///
    /// Must complete synchronously: once it returns the device is free.
    fn stop_track(&self, track: &MediaTrack);

    /// Subscribe to ids of tracks the hardware ended on its own
    ///
    /// A camera being unplugged is the usual cause. Tracks released through
    /// [`MediaPlatform::stop_track`] are not reported. Backends that cannot
    /// observe this return `None`.
    fn track_endings(&self) -> Option<TrackEndings> {
        None
    }

    /// Backend name for logs
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<P: MediaPlatform + ?Sized> MediaPlatform for Arc<P> {
    async fn request_capture(&self, constraints: &CaptureConstraints) -> MediaResult<MediaStream> {
        (**self).request_capture(constraints).await
    }

    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceDescriptor>> {
        (**self).enumerate_devices().await
    }

    fn stop_track(&self, track: &MediaTrack) {
        (**self).stop_track(track)
    }

    fn track_endings(&self) -> Option<TrackEndings> {
        (**self).track_endings()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Stop every still-live track of `stream`
///
/// Returns the number of tracks released.
pub fn stop_stream(platform: &dyn MediaPlatform, stream: &MediaStream) -> usize {
    let mut released = 0;
    for track in stream.tracks().iter().filter(|t| t.is_live()) {
        platform.stop_track(track);
        released += 1;
    }
    debug!(
        stream_id = stream.id(),
        released,
        platform = platform.name(),
        "Stopped stream tracks"
    );
    released
}
