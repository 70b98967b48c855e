//! Setup screen session
//!
//! A [`SetupSession`] holds everything the setup screen shows: the device
//! inventory, the selection per device kind, camera and microphone intent,
//! and the join form. It owns the [`StreamController`] driving the camera
//! preview and hands the finished configuration to a [`JoinHandler`].

use crate::config::SetupConfig;
use crate::controller::{ControllerOptions, PreviewSnapshot, StreamController};
use crate::error::SetupError;
use crate::event::{EventStream, Notice, SetupEvent};
use crate::join::{attempt_join, JoinHandler, RoomJoinConfig};
use meetroom_media::{
    enumerate_inventory, request_permission_and_enumerate, DeviceInventory, DeviceKind, DeviceSelection,
    MediaPlatform, RenderTarget,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[cfg(feature = "diagnostics")]
use meetroom_diagnostics::{AuditedPlatform, HandleAudit, HandleReport};

/// Camera and microphone intent
///
/// Independent of whether a stream exists. The microphone flag only travels
/// into the join configuration; the preview never captures audio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureState {
    /// Camera intent
    pub camera_enabled: bool,
    /// Microphone intent
    pub mic_enabled: bool,
}

/// State behind the setup screen
pub struct SetupSession {
    id: String,
    platform: Arc<dyn MediaPlatform>,
    controller: StreamController,
    events: broadcast::Sender<SetupEvent>,
    mount_events: Mutex<Option<broadcast::Receiver<SetupEvent>>>,
    config: SetupConfig,
    inventory: DeviceInventory,
    selection: DeviceSelection,
    capture: CaptureState,
    user_name: String,
    room_name: String,
    enumerated: bool,
    finished: bool,
    #[cfg(feature = "diagnostics")]
    audit: Option<HandleAudit>,
}

impl SetupSession {
    /// Mount the setup screen
    ///
    /// Enumerates devices once, then applies the configured initial intent.
    /// When permission is refused the session still mounts, with an empty
    /// inventory, both toggles off and a [`Notice::PermissionDenied`]
    /// published. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SetupError::Config`] if `config` is invalid.
    pub async fn mount(
        platform: Arc<dyn MediaPlatform>,
        target: Arc<dyn RenderTarget>,
        config: SetupConfig,
    ) -> Result<Self, SetupError> {
        config.validate()?;

        #[cfg(feature = "diagnostics")]
        let (platform, audit) = if config.audit_handles {
            let audited = AuditedPlatform::new(platform);
            let audit = audited.audit();
            (Arc::new(audited) as Arc<dyn MediaPlatform>, Some(audit))
        } else {
            (platform, None)
        };

        let (events, mount_events) = broadcast::channel(config.event_buffer);
        let controller = StreamController::spawn(
            platform.clone(),
            target,
            ControllerOptions {
                resolution: config.preview_resolution,
                camera_enabled: false,
                selected_camera: None,
            },
            events.clone(),
        );

        let mut session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            platform,
            controller,
            events,
            mount_events: Mutex::new(Some(mount_events)),
            config,
            inventory: DeviceInventory::empty(),
            selection: DeviceSelection::default(),
            capture: CaptureState::default(),
            user_name: String::new(),
            room_name: String::new(),
            enumerated: false,
            finished: false,
            #[cfg(feature = "diagnostics")]
            audit,
        };

        info!(
            session_id = %session.id,
            platform = session.platform.name(),
            "Mounting setup screen"
        );
        if session.initialize_devices().await.is_ok() {
            session.set_capture(CaptureState {
                camera_enabled: session.config.initial_camera_enabled,
                mic_enabled: session.config.initial_mic_enabled,
            })?;
        }
        Ok(session)
    }

    /// Request permission and (re)populate the device inventory
    ///
    /// The first success seeds every selection with the first device of its
    /// kind; later calls keep selections that are still present and skip the
    /// permission probe, so a live preview keeps its camera. On failure
    /// the inventory is emptied, both toggles are turned off and
    /// [`Notice::PermissionDenied`] is published.
    pub async fn initialize_devices(&mut self) -> Result<&DeviceInventory, SetupError> {
        self.ensure_open()?;

        let platform = self.platform.as_ref();
        let result = if self.enumerated {
            enumerate_inventory(platform).await
        } else {
            request_permission_and_enumerate(platform).await
        };
        match result {
            Ok(inventory) => {
                let changed = if self.enumerated {
                    self.selection.reconcile_with(&inventory)
                } else {
                    let seeded = DeviceSelection::seed_from(&inventory);
                    let changed = DeviceKind::ALL
                        .into_iter()
                        .filter(|kind| seeded.get(*kind) != self.selection.get(*kind))
                        .collect();
                    self.selection = seeded;
                    changed
                };
                self.inventory = inventory;
                self.enumerated = true;

                self.emit(SetupEvent::DevicesEnumerated {
                    cameras: self.inventory.cameras().len(),
                    microphones: self.inventory.microphones().len(),
                    speakers: self.inventory.speakers().len(),
                });
                for kind in changed {
                    self.selection_changed(kind)?;
                }
                Ok(&self.inventory)
            }
            Err(e) => {
                warn!(error = %e, "Device access failed");
                self.inventory = DeviceInventory::empty();
                self.selection = DeviceSelection::default();
                self.enumerated = false;
                self.controller.select_camera(None)?;
                self.set_capture(CaptureState::default())?;
                self.notify(Notice::PermissionDenied);
                Err(e.into())
            }
        }
    }

    /// Turn the camera preview on or off
    pub fn set_camera_enabled(&mut self, enabled: bool) -> Result<(), SetupError> {
        self.ensure_open()?;
        self.set_capture(CaptureState {
            camera_enabled: enabled,
            ..self.capture
        })
    }

    /// Flip camera intent, returning the new value
    pub fn toggle_camera(&mut self) -> Result<bool, SetupError> {
        let enabled = !self.capture.camera_enabled;
        self.set_camera_enabled(enabled)?;
        Ok(enabled)
    }

    /// Set microphone intent
    ///
    /// Only recorded for the join configuration.
    pub fn set_mic_enabled(&mut self, enabled: bool) -> Result<(), SetupError> {
        self.ensure_open()?;
        self.set_capture(CaptureState {
            mic_enabled: enabled,
            ..self.capture
        })
    }

    /// Flip microphone intent, returning the new value
    pub fn toggle_mic(&mut self) -> Result<bool, SetupError> {
        let enabled = !self.capture.mic_enabled;
        self.set_mic_enabled(enabled)?;
        Ok(enabled)
    }

    /// Select a device of any kind
    ///
    /// # Errors
    ///
    /// [`meetroom_media::MediaError::DeviceNotFound`] if `device_id` is not in
    /// the current inventory.
    pub fn select_device(&mut self, kind: DeviceKind, device_id: &str) -> Result<(), SetupError> {
        self.ensure_open()?;
        if self.selection.select(&self.inventory, kind, device_id)? {
            self.selection_changed(kind)?;
        }
        Ok(())
    }

    /// Select the camera used for the preview
    pub fn select_camera(&mut self, device_id: &str) -> Result<(), SetupError> {
        self.select_device(DeviceKind::Camera, device_id)
    }

    /// Select the microphone
    pub fn select_microphone(&mut self, device_id: &str) -> Result<(), SetupError> {
        self.select_device(DeviceKind::Microphone, device_id)
    }

    /// Select the speaker
    pub fn select_speaker(&mut self, device_id: &str) -> Result<(), SetupError> {
        self.select_device(DeviceKind::Speaker, device_id)
    }

    /// Update the user name field
    pub fn set_user_name(&mut self, user_name: impl Into<String>) -> Result<(), SetupError> {
        self.ensure_open()?;
        self.user_name = user_name.into();
        Ok(())
    }

    /// Update the room name field
    pub fn set_room_name(&mut self, room_name: impl Into<String>) -> Result<(), SetupError> {
        self.ensure_open()?;
        self.room_name = room_name.into();
        Ok(())
    }

    /// Forward a track-ended signal from the platform
    pub fn on_track_ended(&self, track_id: &str) -> Result<(), SetupError> {
        self.ensure_open()?;
        self.controller.notify_track_ended(track_id)
    }

    /// Validate the form and hand over to the call screen
    ///
    /// On a validation failure the matching notice is published and the
    /// session stays usable. On success the preview is torn down,
    /// [`SetupEvent::Joined`] is published, `handler` is called once and the
    /// session closes.
    pub async fn join<H>(&mut self, handler: &mut H) -> Result<RoomJoinConfig, SetupError>
    where
        H: JoinHandler + ?Sized,
    {
        self.ensure_open()?;

        let config = match attempt_join(
            &self.user_name,
            &self.room_name,
            self.capture.camera_enabled,
            self.capture.mic_enabled,
        ) {
            Ok(config) => config,
            Err(e) => {
                debug!(error = %e, "Join rejected");
                self.notify(Notice::from(e));
                return Err(e.into());
            }
        };

        self.finished = true;
        let snapshot = self.controller.dispose().await?;
        debug!(state = %snapshot.state, "Preview torn down for join");

        self.emit(SetupEvent::Joined(config.clone()));
        handler.on_join_room(config.clone());
        info!(
            session_id = %self.id,
            user = config.user_name(),
            room = config.room_name(),
            "Setup finished"
        );
        Ok(config)
    }

    /// Close the session and release the preview
    pub async fn dispose(mut self) -> Result<PreviewSnapshot, SetupError> {
        self.finished = true;
        self.controller.dispose().await
    }

    /// Settled view of the camera preview
    pub async fn preview(&self) -> Result<PreviewSnapshot, SetupError> {
        self.controller.snapshot().await
    }

    /// Subscribe to session events
    ///
    /// The first subscriber also receives the events published while the
    /// session was mounting.
    pub fn subscribe(&self) -> EventStream {
        let receiver = self
            .mount_events
            .lock()
            .take()
            .unwrap_or_else(|| self.events.subscribe());
        EventStream::new(receiver)
    }

    /// Current device inventory
    pub fn inventory(&self) -> &DeviceInventory {
        &self.inventory
    }

    /// Current device selection
    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }

    /// Camera and microphone intent
    pub fn capture_state(&self) -> CaptureState {
        self.capture
    }

    /// User name as typed
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Room name as typed
    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    /// Unique session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Session configuration
    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    /// Whether the session joined a room or was disposed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Handle ledger, when `audit_handles` is set
    #[cfg(feature = "diagnostics")]
    pub fn handle_audit(&self) -> Option<&HandleAudit> {
        self.audit.as_ref()
    }

    /// Snapshot of the handle ledger, when `audit_handles` is set
    #[cfg(feature = "diagnostics")]
    pub fn handle_report(&self) -> Option<HandleReport> {
        self.audit.as_ref().map(HandleAudit::report)
    }

    fn set_capture(&mut self, capture: CaptureState) -> Result<(), SetupError> {
        if capture == self.capture {
            return Ok(());
        }
        if capture.camera_enabled != self.capture.camera_enabled {
            self.controller.set_camera_enabled(capture.camera_enabled)?;
        }
        self.capture = capture;
        debug!(
            camera_enabled = capture.camera_enabled,
            mic_enabled = capture.mic_enabled,
            "Capture intent changed"
        );
        self.emit(SetupEvent::CaptureChanged {
            camera_enabled: capture.camera_enabled,
            mic_enabled: capture.mic_enabled,
        });
        Ok(())
    }

    fn selection_changed(&mut self, kind: DeviceKind) -> Result<(), SetupError> {
        let device_id = self.selection.get(kind).map(str::to_string);
        if kind == DeviceKind::Camera {
            self.controller.select_camera(device_id.clone())?;
        }
        debug!(kind = %kind, device_id = ?device_id, "Selection changed");
        self.emit(SetupEvent::SelectionChanged { kind, device_id });
        Ok(())
    }

    fn notify(&self, notice: Notice) {
        info!(notice = notice.kind(), "{}", notice);
        self.emit(SetupEvent::Notice(notice));
    }

    fn emit(&self, event: SetupEvent) {
        let _ = self.events.send(event);
    }

    fn ensure_open(&self) -> Result<(), SetupError> {
        if self.finished {
            return Err(SetupError::SessionClosed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for SetupSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupSession")
            .field("id", &self.id)
            .field("platform", &self.platform.name())
            .field("inventory", &self.inventory)
            .field("selection", &self.selection)
            .field("capture", &self.capture)
            .field("user_name", &self.user_name)
            .field("room_name", &self.room_name)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetroom_media::{ScriptedPlatform, VideoSurface};

    async fn mount_laptop() -> (SetupSession, ScriptedPlatform, VideoSurface) {
        let platform = ScriptedPlatform::laptop();
        let surface = VideoSurface::new();
        let session = SetupSession::mount(
            Arc::new(platform.clone()),
            Arc::new(surface.clone()),
            SetupConfig::default(),
        )
        .await
        .unwrap();
        (session, platform, surface)
    }

    #[tokio::test]
    async fn test_mount_seeds_selection_and_starts_preview() {
        let (session, _platform, surface) = mount_laptop().await;

        assert_eq!(session.selection().camera(), Some("cam-a"));
        assert_eq!(session.selection().microphone(), Some("mic-1"));
        assert_eq!(session.selection().speaker(), Some("spk-1"));
        assert_eq!(
            session.capture_state(),
            CaptureState {
                camera_enabled: true,
                mic_enabled: true
            }
        );

        let preview = session.preview().await.unwrap();
        assert!(preview.is_live());
        assert_eq!(preview.active_camera.as_deref(), Some("cam-a"));
        assert!(surface.is_attached());
    }

    #[tokio::test]
    async fn test_toggles() {
        let (mut session, platform, surface) = mount_laptop().await;

        assert!(!session.toggle_camera().unwrap());
        assert!(!session.toggle_mic().unwrap());
        let preview = session.preview().await.unwrap();
        assert!(!preview.is_live());
        assert!(!surface.is_attached());
        assert_eq!(platform.live_track_count(), 0);

        assert!(session.toggle_camera().unwrap());
        assert!(session.preview().await.unwrap().is_live());
    }

    #[tokio::test]
    async fn test_unknown_device_rejected() {
        let (mut session, _platform, _surface) = mount_laptop().await;
        let err = session.select_camera("cam-z").unwrap_err();
        assert_eq!(err.error_code(), "DEVICE_NOT_FOUND");
        assert_eq!(session.selection().camera(), Some("cam-a"));
    }

    #[tokio::test]
    async fn test_closed_after_dispose_of_controller() {
        let (session, platform, _surface) = mount_laptop().await;
        let snapshot = session.dispose().await.unwrap();
        assert!(snapshot.disposed);
        assert_eq!(platform.live_track_count(), 0);
    }
}
