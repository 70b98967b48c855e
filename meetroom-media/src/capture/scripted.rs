//! In-memory platform with scriptable failures
//!
//! Stands in for real hardware in tests, demos and headless environments.
//! Every call is recorded in order so callers can verify sequencing, and
//! capture requests can be held open to simulate slow devices.

use super::{CaptureConstraints, MediaPlatform, TrackEndings, VideoConstraint};
use crate::devices::{DeviceDescriptor, DeviceKind};
use crate::error::{MediaError, MediaResult};
use crate::tracks::{MediaStream, MediaTrack, TrackKind};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, warn};

/// A call observed by the scripted platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    EnumerateDevices,
    RequestCapture { constraints: CaptureConstraints },
    CaptureGranted { stream_id: String, device_ids: Vec<String> },
    CaptureFailed { reason: String },
    StopTrack { track_id: String, stream_id: String },
}

impl PlatformCall {
    pub fn is_request(&self) -> bool {
        matches!(self, PlatformCall::RequestCapture { .. })
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, PlatformCall::StopTrack { .. })
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    devices: Vec<DeviceDescriptor>,
    permission_denied: bool,
    permission_granted: bool,
    enumeration_failure: Option<String>,
    queued_failures: VecDeque<MediaError>,
    busy: HashSet<String>,
    empty_streams: bool,
    hold: Option<Arc<Semaphore>>,
    live: HashMap<String, MediaTrack>,
    calls: Vec<PlatformCall>,
}

const ENDINGS_CAPACITY: usize = 16;

/// Scriptable in-memory [`MediaPlatform`]
#[derive(Debug, Clone)]
pub struct ScriptedPlatform {
    state: Arc<RwLock<ScriptState>>,
    next_id: Arc<AtomicU64>,
    endings: broadcast::Sender<String>,
}

impl Default for ScriptedPlatform {
    fn default() -> Self {
        let (endings, _) = broadcast::channel(ENDINGS_CAPACITY);
        Self {
            state: Arc::default(),
            next_id: Arc::default(),
            endings,
        }
    }
}

/// Handle controlling held capture requests
#[derive(Debug, Clone)]
pub struct CaptureGate {
    semaphore: Arc<Semaphore>,
}

impl CaptureGate {
    /// Let `n` held requests complete
    pub fn release(&self, n: usize) {
        self.semaphore.add_permits(n);
    }

    /// Let every current and future request through
    pub fn open(&self) {
        self.semaphore.close();
    }
}

impl ScriptedPlatform {
    /// Platform with no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform exposing the given devices
    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        let platform = Self::new();
        platform.set_devices(devices);
        platform
    }

    /// Two cameras, one microphone, one speaker
    pub fn laptop() -> Self {
        Self::with_devices(vec![
            DeviceDescriptor::new("cam-a", DeviceKind::Camera, "Integrated Camera"),
            DeviceDescriptor::new("mic-1", DeviceKind::Microphone, "Built-in Microphone"),
            DeviceDescriptor::new("cam-b", DeviceKind::Camera, "USB Webcam"),
            DeviceDescriptor::new("spk-1", DeviceKind::Speaker, "Built-in Speakers"),
        ])
    }

    /// Replace the device list
    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        self.state.write().devices = devices;
    }

    /// Refuse every capture request with [`MediaError::PermissionDenied`]
    pub fn deny_permission(&self) {
        self.state.write().permission_denied = true;
    }

    /// Accept capture requests again
    pub fn grant_permission(&self) {
        self.state.write().permission_denied = false;
    }

    /// Make the next enumeration calls fail
    pub fn fail_enumeration(&self, reason: impl Into<String>) {
        self.state.write().enumeration_failure = Some(reason.into());
    }

    /// Fail the next capture request with `error`
    pub fn fail_next_capture(&self, error: MediaError) {
        self.state.write().queued_failures.push_back(error);
    }

    /// Mark a device as held by another process
    pub fn set_busy(&self, device_id: &str, busy: bool) {
        let mut state = self.state.write();
        if busy {
            state.busy.insert(device_id.to_string());
        } else {
            state.busy.remove(device_id);
        }
    }

    /// Hand back streams without tracks
    pub fn grant_empty_streams(&self, enabled: bool) {
        self.state.write().empty_streams = enabled;
    }

    /// Hold capture requests until released through the returned gate
    pub fn hold_captures(&self) -> CaptureGate {
        let semaphore = Arc::new(Semaphore::new(0));
        self.state.write().hold = Some(semaphore.clone());
        CaptureGate { semaphore }
    }

    /// Remove a device; its live tracks end as the hardware disappears
    ///
    /// Ended track ids are published to [`MediaPlatform::track_endings`]
    /// subscribers and returned.
    pub fn unplug(&self, device_id: &str) -> Vec<String> {
        let ended: Vec<String> = {
            let mut state = self.state.write();
            state.devices.retain(|d| d.id != device_id);

            let ended: Vec<String> = state
                .live
                .values()
                .filter(|t| t.device_id() == device_id)
                .map(|t| t.id().to_string())
                .collect();
            for track_id in &ended {
                if let Some(track) = state.live.remove(track_id) {
                    track.mark_ended();
                }
            }
            ended
        };
        warn!(device_id, ended = ended.len(), "Device unplugged");
        for track_id in &ended {
            // Nobody listening is fine
            let _ = self.endings.send(track_id.clone());
        }
        ended
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.read().calls.clone()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state.write().calls.clear();
    }

    /// Number of capture requests issued so far
    pub fn request_count(&self) -> usize {
        self.state.read().calls.iter().filter(|c| c.is_request()).count()
    }

    /// Number of tracks still holding a hardware handle
    pub fn live_track_count(&self) -> usize {
        self.state.read().live.len()
    }

    /// Tracks still holding a hardware handle
    pub fn live_tracks(&self) -> Vec<MediaTrack> {
        self.state.read().live.values().cloned().collect()
    }

    /// Wait until at least `n` capture requests were issued
    pub async fn wait_for_requests(&self, n: usize) {
        while self.request_count() < n {
            tokio::task::yield_now().await;
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", prefix, id)
    }

    fn resolve_device(
        state: &ScriptState,
        kind: DeviceKind,
        pinned: Option<&str>,
    ) -> MediaResult<String> {
        let device = match pinned {
            Some(id) => state.devices.iter().find(|d| d.kind == kind && d.id == id),
            None => state.devices.iter().find(|d| d.kind == kind),
        };
        let device = device.ok_or_else(|| MediaError::DeviceNotFound {
            device_id: pinned
                .map(str::to_string)
                .unwrap_or_else(|| format!("default {}", kind.as_str().to_lowercase())),
        })?;
        if state.busy.contains(&device.id) {
            return Err(MediaError::DeviceBusy {
                device_id: device.id.clone(),
            });
        }
        Ok(device.id.clone())
    }

    fn grant(&self, constraints: &CaptureConstraints) -> MediaResult<MediaStream> {
        let mut state = self.state.write();

        if state.permission_denied {
            return Err(MediaError::PermissionDenied {
                operation: "capture".to_string(),
            });
        }
        if let Some(error) = state.queued_failures.pop_front() {
            return Err(error);
        }

        let mut sources = Vec::new();
        match &constraints.video {
            VideoConstraint::Disabled => {}
            VideoConstraint::Any => {
                sources.push((TrackKind::Video, Self::resolve_device(&state, DeviceKind::Camera, None)?))
            }
            VideoConstraint::Device(id) => sources.push((
                TrackKind::Video,
                Self::resolve_device(&state, DeviceKind::Camera, Some(id))?,
            )),
        }
        if constraints.audio {
            sources.push((
                TrackKind::Audio,
                Self::resolve_device(&state, DeviceKind::Microphone, None)?,
            ));
        }
        if sources.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "capture request asks for neither audio nor video".to_string(),
            });
        }

        let stream_id = self.next_id("stream");
        let tracks: Vec<MediaTrack> = if state.empty_streams {
            Vec::new()
        } else {
            sources
                .iter()
                .map(|(kind, device_id)| {
                    MediaTrack::new(self.next_id("track"), stream_id.clone(), *kind, device_id.clone())
                })
                .collect()
        };

        for track in &tracks {
            state.live.insert(track.id().to_string(), track.clone());
        }
        state.permission_granted = true;
        state.calls.push(PlatformCall::CaptureGranted {
            stream_id: stream_id.clone(),
            device_ids: sources.into_iter().map(|(_, id)| id).collect(),
        });

        Ok(MediaStream::new(stream_id, tracks))
    }
}

#[async_trait]
impl MediaPlatform for ScriptedPlatform {
    async fn request_capture(&self, constraints: &CaptureConstraints) -> MediaResult<MediaStream> {
        let hold = {
            let mut state = self.state.write();
            state.calls.push(PlatformCall::RequestCapture {
                constraints: constraints.clone(),
            });
            state.hold.clone()
        };

        if let Some(semaphore) = hold {
            // A closed gate lets everything through
            if let Ok(permit) = semaphore.acquire().await {
                permit.forget();
            }
        }

        let result = self.grant(constraints);
        match &result {
            Ok(stream) => info!(
                stream_id = stream.id(),
                tracks = stream.tracks().len(),
                "Scripted capture granted"
            ),
            Err(e) => {
                debug!(error = %e, "Scripted capture refused");
                self.state.write().calls.push(PlatformCall::CaptureFailed {
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceDescriptor>> {
        let mut state = self.state.write();
        state.calls.push(PlatformCall::EnumerateDevices);

        if let Some(reason) = &state.enumeration_failure {
            return Err(MediaError::DeviceEnumerationFailed {
                reason: reason.clone(),
            });
        }

        let granted = state.permission_granted;
        Ok(state
            .devices
            .iter()
            .map(|d| {
                let mut device = d.clone();
                if !granted {
                    device.label.clear();
                }
                device
            })
            .collect())
    }

    fn stop_track(&self, track: &MediaTrack) {
        let mut state = self.state.write();
        state.calls.push(PlatformCall::StopTrack {
            track_id: track.id().to_string(),
            stream_id: track.stream_id().to_string(),
        });
        state.live.remove(track.id());
        track.mark_ended();
    }

    fn track_endings(&self) -> Option<TrackEndings> {
        Some(self.endings.subscribe())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::stop_stream;

    #[tokio::test]
    async fn test_labels_hidden_until_capture_granted() {
        let platform = ScriptedPlatform::laptop();

        let before = platform.enumerate_devices().await.unwrap();
        assert!(before.iter().all(|d| d.label.is_empty()));

        let probe = platform
            .request_capture(&CaptureConstraints::permission_probe())
            .await
            .unwrap();
        stop_stream(&platform, &probe);

        let after = platform.enumerate_devices().await.unwrap();
        assert_eq!(after[0].label, "Integrated Camera");
    }

    #[tokio::test]
    async fn test_capture_pins_requested_camera() {
        let platform = ScriptedPlatform::laptop();
        let mut endings = platform.track_endings().unwrap();
        let stream = platform
            .request_capture(&CaptureConstraints::camera_preview(Some("cam-b"), None))
            .await
            .unwrap();

        assert_eq!(stream.tracks().len(), 1);
        assert_eq!(stream.tracks()[0].device_id(), "cam-b");
        assert_eq!(stream.tracks()[0].kind(), TrackKind::Video);
        assert_eq!(platform.live_track_count(), 1);

        stop_stream(&platform, &stream);
        assert_eq!(platform.live_track_count(), 0);
        assert!(stream.is_inactive());
        // Released on request, not lost
        assert!(endings.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let platform = ScriptedPlatform::laptop();

        platform.set_busy("cam-a", true);
        let busy = platform
            .request_capture(&CaptureConstraints::camera_preview(Some("cam-a"), None))
            .await;
        assert_eq!(
            busy.unwrap_err(),
            MediaError::DeviceBusy {
                device_id: "cam-a".to_string()
            }
        );

        let missing = platform
            .request_capture(&CaptureConstraints::camera_preview(Some("cam-z"), None))
            .await;
        assert!(matches!(missing, Err(MediaError::DeviceNotFound { .. })));

        platform.deny_permission();
        let denied = platform
            .request_capture(&CaptureConstraints::permission_probe())
            .await;
        assert!(matches!(denied, Err(MediaError::PermissionDenied { .. })));
        assert_eq!(platform.live_track_count(), 0);
    }

    #[tokio::test]
    async fn test_unplug_ends_live_tracks() {
        let platform = ScriptedPlatform::laptop();
        let stream = platform
            .request_capture(&CaptureConstraints::camera_preview(Some("cam-a"), None))
            .await
            .unwrap();

        let mut endings = platform.track_endings().unwrap();

        let ended = platform.unplug("cam-a");
        assert_eq!(ended, vec![stream.tracks()[0].id().to_string()]);
        assert!(stream.is_inactive());
        assert_eq!(endings.try_recv().unwrap(), stream.tracks()[0].id());
        assert!(platform
            .enumerate_devices()
            .await
            .unwrap()
            .iter()
            .all(|d| d.id != "cam-a"));
    }

    #[tokio::test]
    async fn test_held_capture_waits_for_gate() {
        let platform = ScriptedPlatform::laptop();
        let gate = platform.hold_captures();

        let worker = platform.clone();
        let pending = tokio::spawn(async move {
            worker
                .request_capture(&CaptureConstraints::camera_preview(None, None))
                .await
        });

        platform.wait_for_requests(1).await;
        assert_eq!(platform.live_track_count(), 0);

        gate.release(1);
        let stream = pending.await.unwrap().unwrap();
        assert!(stream.has_video());
    }
}
