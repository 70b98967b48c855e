//! Capture tracks and the streams that group them

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Audio samples
    Audio,
    /// Video frames
    Video,
}

/// Lifecycle of a hardware capture track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackReadyState {
    /// The track holds a hardware handle
    Live,
    /// The handle was released; a track never goes back to live
    Ended,
}

/// A single hardware capture track
///
/// Clones share the ready state, so any clone observes the track ending.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    stream_id: String,
    kind: TrackKind,
    device_id: String,
    state: Arc<RwLock<TrackReadyState>>,
}

impl MediaTrack {
    /// Create a live track
    pub fn new(
        id: impl Into<String>,
        stream_id: impl Into<String>,
        kind: TrackKind,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            device_id: device_id.into(),
            state: Arc::new(RwLock::new(TrackReadyState::Live)),
        }
    }

    /// Get track ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the owning stream ID
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Get track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Device the track captures from
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Current ready state
    pub fn ready_state(&self) -> TrackReadyState {
        *self.state.read()
    }

    /// Check if the track still holds its hardware handle
    pub fn is_live(&self) -> bool {
        self.ready_state() == TrackReadyState::Live
    }

    /// Mark the track ended
    ///
    /// Called by platforms once the hardware handle is released. Returns
    /// `false` if the track had already ended.
    pub fn mark_ended(&self) -> bool {
        let mut state = self.state.write();
        let was_live = *state == TrackReadyState::Live;
        *state = TrackReadyState::Ended;
        was_live
    }
}

/// A group of tracks acquired by one capture request
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    /// Create a stream from its tracks
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All tracks, live or ended
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Video tracks
    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    /// Audio tracks
    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    /// Check if any video track is attached
    pub fn has_video(&self) -> bool {
        self.video_tracks().next().is_some()
    }

    /// Number of tracks still holding a hardware handle
    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    /// A stream without live tracks is equivalent to no stream
    pub fn is_inactive(&self) -> bool {
        self.live_track_count() == 0
    }

    /// Find a track by id
    pub fn track(&self, track_id: &str) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.id() == track_id)
    }
}
