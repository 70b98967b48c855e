//! Permission probe and device enumeration

use crate::capture::{stop_stream, CaptureConstraints, MediaPlatform};
use crate::devices::DeviceInventory;
use crate::error::{MediaError, MediaResult};
use tracing::{info, warn};

/// Unlock device labels, then enumerate and partition every device
///
/// A combined audio and video probe stream is requested first and all of its
/// tracks are stopped before enumeration runs, so the probe never outlives
/// this call. Calling again simply produces a fresh inventory.
///
/// # Errors
///
/// [`MediaError::PermissionDenied`] if the probe is refused or fails for any
/// other reason, [`MediaError::DeviceEnumerationFailed`] if listing devices
/// fails.
pub async fn request_permission_and_enumerate(
    platform: &dyn MediaPlatform,
) -> MediaResult<DeviceInventory> {
    let probe = platform
        .request_capture(&CaptureConstraints::permission_probe())
        .await
        .map_err(|e| {
            warn!(error = %e, platform = platform.name(), "Permission probe failed");
            match e {
                denied @ MediaError::PermissionDenied { .. } => denied,
                other => MediaError::PermissionDenied {
                    operation: format!("camera and microphone access ({})", other),
                },
            }
        })?;
    stop_stream(platform, &probe);

    enumerate_inventory(platform).await
}

/// Enumerate and partition every device without probing for permission
///
/// Used once labels are already unlocked, so a live preview never has to
/// share its camera with a probe stream.
///
/// # Errors
///
/// [`MediaError::DeviceEnumerationFailed`] if listing devices fails.
pub async fn enumerate_inventory(platform: &dyn MediaPlatform) -> MediaResult<DeviceInventory> {
    let devices = platform.enumerate_devices().await.map_err(|e| match e {
        failed @ MediaError::DeviceEnumerationFailed { .. } => failed,
        other => MediaError::DeviceEnumerationFailed {
            reason: other.to_string(),
        },
    })?;
    let inventory = DeviceInventory::from_devices(devices);

    info!(
        cameras = inventory.cameras().len(),
        microphones = inventory.microphones().len(),
        speakers = inventory.speakers().len(),
        "Devices enumerated"
    );
    Ok(inventory)
}
