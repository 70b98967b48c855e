//! Camera preview lifecycle
//!
//! [`StreamController`] is a handle to a task that exclusively owns the
//! preview stream. Every input travels through one command queue, so
//! acquisitions and releases are strictly ordered: the previous stream's
//! tracks are stopped before a new capture is requested, and at most one
//! capture request is ever in flight.
//!
//! Each input that changes the camera intent bumps a generation counter. When
//! a capture completes under an older generation than the current one, the
//! stream is stopped without being attached and the controller reconciles
//! against the latest intent.
//!
//! Tracks the platform reports as ended on its own are fed into the same
//! queue, so an unplugged camera clears the preview without any caller help.

use crate::error::SetupError;
use crate::event::{Notice, SetupEvent};
use meetroom_media::{
    stop_stream, CaptureConstraints, MediaError, MediaPlatform, MediaResult, MediaStream,
    RenderTarget, TrackEndings, VideoResolution,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Preview lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PreviewState {
    /// No stream
    Idle,
    /// A capture request is in flight
    Starting,
    /// A stream is attached to the render target
    Live,
    /// The stream is being released
    Stopping,
}

impl std::fmt::Display for PreviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PreviewState::Idle => "idle",
            PreviewState::Starting => "starting",
            PreviewState::Live => "live",
            PreviewState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Settled view of the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewSnapshot {
    /// Lifecycle state
    pub state: PreviewState,
    /// Camera intent
    pub camera_enabled: bool,
    /// Camera the next acquisition targets
    pub selected_camera: Option<String>,
    /// Stream attached to the render target
    pub active_stream_id: Option<String>,
    /// Camera the attached stream was requested from
    pub active_camera: Option<String>,
    /// Live tracks in the attached stream
    pub live_tracks: usize,
    /// Input generation the snapshot reflects
    pub generation: u64,
    /// Whether the controller tore down for good
    pub disposed: bool,
}

impl PreviewSnapshot {
    /// Check if a preview is attached
    pub fn is_live(&self) -> bool {
        self.state == PreviewState::Live && self.active_stream_id.is_some()
    }
}

/// Controller settings
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Ideal preview resolution
    pub resolution: Option<VideoResolution>,
    /// Camera intent at spawn
    pub camera_enabled: bool,
    /// Camera selection at spawn
    pub selected_camera: Option<String>,
}

#[derive(Debug)]
enum Command {
    SetCameraEnabled(bool),
    SelectCamera(Option<String>),
    TrackEnded(String),
    Snapshot(oneshot::Sender<PreviewSnapshot>),
    Dispose(Option<oneshot::Sender<PreviewSnapshot>>),
}

/// Handle to the preview task
///
/// Dropping the handle disposes the preview.
#[derive(Debug)]
pub struct StreamController {
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl StreamController {
    /// Spawn the preview task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        platform: Arc<dyn MediaPlatform>,
        target: Arc<dyn RenderTarget>,
        options: ControllerOptions,
        events: broadcast::Sender<SetupEvent>,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        if let Some(endings) = platform.track_endings() {
            tokio::spawn(forward_track_endings(endings, commands.clone()));
        }
        let actor = ControllerActor {
            platform,
            target,
            events,
            resolution: options.resolution,
            state: PreviewState::Idle,
            camera_enabled: options.camera_enabled,
            selected_camera: options.selected_camera,
            active: None,
            active_camera: None,
            generation: 1,
            applied_generation: 0,
            queries: Vec::new(),
            dispose_replies: Vec::new(),
            disposed: false,
        };
        let task = tokio::spawn(actor.run(receiver));
        Self {
            commands,
            task: Some(task),
        }
    }

    /// Turn the camera preview on or off
    pub fn set_camera_enabled(&self, enabled: bool) -> Result<(), SetupError> {
        self.send(Command::SetCameraEnabled(enabled))
    }

    /// Point the preview at another camera
    pub fn select_camera(&self, device_id: Option<String>) -> Result<(), SetupError> {
        self.send(Command::SelectCamera(device_id))
    }

    /// Report that a track ended outside the controller's control
    pub fn notify_track_ended(&self, track_id: impl Into<String>) -> Result<(), SetupError> {
        self.send(Command::TrackEnded(track_id.into()))
    }

    /// Wait until every earlier command is processed and report the state
    pub async fn snapshot(&self) -> Result<PreviewSnapshot, SetupError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| SetupError::ControllerUnavailable)
    }

    /// Release the preview and stop the task
    ///
    /// Returns the final snapshot. A second call fails with
    /// [`SetupError::ControllerUnavailable`].
    pub async fn dispose(&mut self) -> Result<PreviewSnapshot, SetupError> {
        let task = self.task.take().ok_or(SetupError::ControllerUnavailable)?;
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Dispose(Some(tx)))
            .map_err(|_| SetupError::ControllerUnavailable)?;
        let snapshot = rx.await.map_err(|_| SetupError::ControllerUnavailable)?;
        if let Err(e) = task.await {
            warn!(error = %e, "Preview task did not exit cleanly");
        }
        Ok(snapshot)
    }

    /// Whether the task is still accepting commands
    pub fn is_running(&self) -> bool {
        self.task.is_some() && !self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<(), SetupError> {
        if self.task.is_none() {
            return Err(SetupError::ControllerUnavailable);
        }
        self.commands
            .send(command)
            .map_err(|_| SetupError::ControllerUnavailable)
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        if self.task.take().is_some() {
            // The task finishes the teardown on its own
            let _ = self.commands.send(Command::Dispose(None));
        }
    }
}

/// Relay platform track endings into the command queue until the actor exits
async fn forward_track_endings(
    mut endings: TrackEndings,
    commands: mpsc::UnboundedSender<Command>,
) {
    loop {
        tokio::select! {
            _ = commands.closed() => break,
            ended = endings.recv() => match ended {
                Ok(track_id) => {
                    if commands.send(Command::TrackEnded(track_id)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed track endings from the platform");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

struct ControllerActor {
    platform: Arc<dyn MediaPlatform>,
    target: Arc<dyn RenderTarget>,
    events: broadcast::Sender<SetupEvent>,
    resolution: Option<VideoResolution>,
    state: PreviewState,
    camera_enabled: bool,
    selected_camera: Option<String>,
    active: Option<MediaStream>,
    active_camera: Option<String>,
    generation: u64,
    applied_generation: u64,
    queries: Vec<oneshot::Sender<PreviewSnapshot>>,
    dispose_replies: Vec<oneshot::Sender<PreviewSnapshot>>,
    disposed: bool,
}

impl ControllerActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!(platform = self.platform.name(), "Preview controller started");
        let mut open = true;

        // Initial intent counts as a change
        self.reconcile(&mut commands, &mut open).await;
        self.answer_queries();

        while !self.disposed && open {
            match commands.recv().await {
                Some(command) => self.absorb(command),
                None => break,
            }
            // Coalesce a burst into one reconciliation
            while let Ok(command) = commands.try_recv() {
                self.absorb(command);
            }
            if self.disposed {
                break;
            }
            self.reconcile(&mut commands, &mut open).await;
            self.answer_queries();
        }

        self.teardown();
    }

    fn absorb(&mut self, command: Command) {
        match command {
            Command::SetCameraEnabled(enabled) => {
                if enabled != self.camera_enabled {
                    self.camera_enabled = enabled;
                    self.generation += 1;
                    debug!(enabled, generation = self.generation, "Camera intent changed");
                }
            }
            Command::SelectCamera(device_id) => {
                if device_id != self.selected_camera {
                    self.selected_camera = device_id;
                    self.generation += 1;
                    debug!(
                        device_id = ?self.selected_camera,
                        generation = self.generation,
                        "Camera selection changed"
                    );
                }
            }
            Command::TrackEnded(track_id) => self.on_track_ended(&track_id),
            Command::Snapshot(reply) => self.queries.push(reply),
            Command::Dispose(reply) => {
                self.disposed = true;
                self.dispose_replies.extend(reply);
            }
        }
    }

    async fn reconcile(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        open: &mut bool,
    ) {
        while self.generation != self.applied_generation && !self.disposed {
            let generation = self.generation;

            if !self.camera_enabled {
                self.stop_preview();
                self.applied_generation = generation;
                continue;
            }

            // Stop before start
            self.release_active();
            self.transition(PreviewState::Starting);

            let device_id = self.selected_camera.clone();
            let constraints = CaptureConstraints::camera_preview(device_id.as_deref(), self.resolution);
            let platform = self.platform.clone();
            let acquisition = async move { platform.request_capture(&constraints).await };
            tokio::pin!(acquisition);
            info!(device_id = ?device_id, generation, "Requesting camera preview");

            let result: MediaResult<MediaStream> = loop {
                tokio::select! {
                    biased;
                    result = &mut acquisition => break result,
                    command = commands.recv(), if *open => match command {
                        Some(command) => self.absorb(command),
                        None => {
                            *open = false;
                            self.disposed = true;
                        }
                    },
                }
            };
            self.applied_generation = generation;

            if self.disposed || self.generation != generation {
                match result {
                    Ok(stream) => {
                        let stopped = stop_stream(self.platform.as_ref(), &stream);
                        info!(
                            stream_id = stream.id(),
                            stopped,
                            "Discarding stale preview stream"
                        );
                    }
                    Err(e) => debug!(error = %e, "Stale preview request failed"),
                }
                self.transition(PreviewState::Idle);
                continue;
            }

            match result {
                Ok(stream) if stream.is_inactive() => {
                    stop_stream(self.platform.as_ref(), &stream);
                    let error = MediaError::NoTracks {
                        stream_id: stream.id().to_string(),
                    };
                    self.fail(device_id, error);
                }
                Ok(stream) => {
                    self.target.attach(&stream);
                    info!(
                        stream_id = stream.id(),
                        device_id = ?device_id,
                        tracks = stream.tracks().len(),
                        "Camera preview live"
                    );
                    self.emit(SetupEvent::PreviewStarted {
                        stream_id: stream.id().to_string(),
                        device_id: device_id.clone(),
                    });
                    self.active = Some(stream);
                    self.active_camera = device_id;
                    self.transition(PreviewState::Live);
                }
                Err(e) => self.fail(device_id, e),
            }
        }
    }

    fn fail(&mut self, device_id: Option<String>, error: MediaError) {
        let error = error.into_acquisition_failure(device_id.as_deref());
        warn!(error = %error, "Camera preview failed");
        self.transition(PreviewState::Idle);
        self.emit(SetupEvent::Notice(Notice::DeviceAcquisitionFailed {
            device_id,
            reason: error.to_string(),
        }));
    }

    fn on_track_ended(&mut self, track_id: &str) {
        let Some(stream) = self.active.as_ref() else {
            debug!(track_id, "Ended track is not part of the preview");
            return;
        };
        let Some(track) = stream.track(track_id) else {
            debug!(track_id, "Ended track is not part of the preview");
            return;
        };
        if track.is_live() {
            self.platform.stop_track(track);
        }
        if !stream.is_inactive() {
            return;
        }

        let stream_id = stream.id().to_string();
        warn!(stream_id = %stream_id, track_id, "Preview lost its last track");
        self.active = None;
        let device_id = self.active_camera.take();
        self.target.detach();
        self.transition(PreviewState::Idle);
        self.emit(SetupEvent::PreviewStopped { stream_id });
        self.emit(SetupEvent::Notice(Notice::DeviceAcquisitionFailed {
            device_id,
            reason: "Camera track ended".to_string(),
        }));
    }

    fn stop_preview(&mut self) {
        if self.active.is_none() && self.state == PreviewState::Idle {
            return;
        }
        self.transition(PreviewState::Stopping);
        if !self.release_active() {
            self.target.detach();
        }
        self.transition(PreviewState::Idle);
    }

    /// Stop every track of the active stream and clear the target
    fn release_active(&mut self) -> bool {
        let Some(stream) = self.active.take() else {
            return false;
        };
        self.active_camera = None;
        let stopped = stop_stream(self.platform.as_ref(), &stream);
        self.target.detach();
        info!(stream_id = stream.id(), stopped, "Camera preview released");
        self.emit(SetupEvent::PreviewStopped {
            stream_id: stream.id().to_string(),
        });
        true
    }

    fn teardown(&mut self) {
        self.disposed = true;
        if !self.release_active() {
            self.target.detach();
        }
        self.transition(PreviewState::Idle);
        info!("Preview controller disposed");

        let snapshot = self.snapshot();
        for reply in self.queries.drain(..).chain(self.dispose_replies.drain(..)) {
            let _ = reply.send(snapshot.clone());
        }
    }

    fn answer_queries(&mut self) {
        if self.queries.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for reply in self.queries.drain(..) {
            let _ = reply.send(snapshot.clone());
        }
    }

    fn snapshot(&self) -> PreviewSnapshot {
        PreviewSnapshot {
            state: self.state,
            camera_enabled: self.camera_enabled,
            selected_camera: self.selected_camera.clone(),
            active_stream_id: self.active.as_ref().map(|s| s.id().to_string()),
            active_camera: self.active_camera.clone(),
            live_tracks: self.active.as_ref().map_or(0, |s| s.live_track_count()),
            generation: self.generation,
            disposed: self.disposed,
        }
    }

    fn transition(&mut self, to: PreviewState) {
        if self.state != to {
            debug!(from = %self.state, to = %to, "Preview state");
            self.state = to;
        }
    }

    fn emit(&self, event: SetupEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
