//! Hardware handle auditing
//!
//! [`AuditedPlatform`] wraps any [`MediaPlatform`] and keeps a ledger of every
//! track it hands out. The ledger answers two questions: how many capture
//! handles are live right now, and how many streams were ever live at the same
//! time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meetroom_media::{
    CaptureConstraints, DeviceDescriptor, MediaPlatform, MediaResult, MediaStream, MediaTrack,
    TrackEndings,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::DiagnosticsError;

/// Snapshot of the handle ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleReport {
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
    /// Streams granted by the platform
    pub streams_acquired: u64,
    /// Capture requests the platform refused
    pub acquisitions_failed: u64,
    /// Tracks granted by the platform
    pub tracks_acquired: u64,
    /// Tracks released through `stop_track`
    pub tracks_stopped: u64,
    /// Tracks that ended without `stop_track` (device removed)
    pub tracks_ended_externally: u64,
    /// Ids of tracks still holding a handle
    pub live_tracks: Vec<String>,
    /// Ids of streams with at least one live track
    pub live_streams: Vec<String>,
    /// Highest number of simultaneously live streams
    pub peak_live_streams: usize,
}

impl HandleReport {
    /// Check that no capture handle is held
    pub fn is_clean(&self) -> bool {
        self.live_tracks.is_empty()
    }

    /// Serialize the report as pretty JSON
    pub fn to_json(&self) -> Result<String, DiagnosticsError> {
        serde_json::to_string_pretty(self).map_err(|e| DiagnosticsError::Report {
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct Ledger {
    tracks: HashMap<String, MediaTrack>,
    streams_acquired: u64,
    acquisitions_failed: u64,
    tracks_acquired: u64,
    tracks_stopped: u64,
    tracks_ended_externally: u64,
    peak_live_streams: usize,
}

impl Ledger {
    fn prune_ended(&mut self) {
        let before = self.tracks.len();
        self.tracks.retain(|_, track| track.is_live());
        self.tracks_ended_externally += (before - self.tracks.len()) as u64;
    }

    fn live_streams(&self) -> BTreeSet<String> {
        self.tracks
            .values()
            .map(|t| t.stream_id().to_string())
            .collect()
    }
}

/// Shared view of the handle ledger
#[derive(Debug, Clone, Default)]
pub struct HandleAudit {
    ledger: Arc<RwLock<Ledger>>,
}

impl HandleAudit {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracks currently holding a handle
    pub fn live_track_count(&self) -> usize {
        let mut ledger = self.ledger.write();
        ledger.prune_ended();
        ledger.tracks.len()
    }

    /// Number of streams with at least one live track
    pub fn live_stream_count(&self) -> usize {
        let mut ledger = self.ledger.write();
        ledger.prune_ended();
        ledger.live_streams().len()
    }

    /// Highest number of simultaneously live streams observed
    pub fn peak_live_streams(&self) -> usize {
        self.ledger.read().peak_live_streams
    }

    /// Take a snapshot of the ledger
    pub fn report(&self) -> HandleReport {
        let mut ledger = self.ledger.write();
        ledger.prune_ended();
        let mut live_tracks: Vec<String> = ledger.tracks.keys().cloned().collect();
        live_tracks.sort();

        HandleReport {
            generated_at: Utc::now(),
            streams_acquired: ledger.streams_acquired,
            acquisitions_failed: ledger.acquisitions_failed,
            tracks_acquired: ledger.tracks_acquired,
            tracks_stopped: ledger.tracks_stopped,
            tracks_ended_externally: ledger.tracks_ended_externally,
            live_tracks,
            live_streams: ledger.live_streams().into_iter().collect(),
            peak_live_streams: ledger.peak_live_streams,
        }
    }

    fn record_grant(&self, stream: &MediaStream) {
        let mut ledger = self.ledger.write();
        ledger.prune_ended();
        ledger.streams_acquired += 1;
        for track in stream.tracks() {
            ledger.tracks_acquired += 1;
            ledger.tracks.insert(track.id().to_string(), track.clone());
        }
        let live_streams = ledger.live_streams().len();
        if live_streams > ledger.peak_live_streams {
            ledger.peak_live_streams = live_streams;
        }
        if live_streams > 1 {
            warn!(live_streams, stream_id = stream.id(), "Overlapping capture streams");
        }
    }

    fn record_failure(&self) {
        self.ledger.write().acquisitions_failed += 1;
    }

    fn record_stop(&self, track: &MediaTrack) {
        let mut ledger = self.ledger.write();
        if ledger.tracks.remove(track.id()).is_some() {
            ledger.tracks_stopped += 1;
        }
    }
}

/// [`MediaPlatform`] decorator feeding a [`HandleAudit`]
#[derive(Debug)]
pub struct AuditedPlatform<P> {
    inner: P,
    audit: HandleAudit,
}

impl<P: MediaPlatform> AuditedPlatform<P> {
    /// Wrap `inner`
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            audit: HandleAudit::new(),
        }
    }

    /// Shared ledger handle
    pub fn audit(&self) -> HandleAudit {
        self.audit.clone()
    }

    /// Wrapped platform
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: MediaPlatform> MediaPlatform for AuditedPlatform<P> {
    async fn request_capture(&self, constraints: &CaptureConstraints) -> MediaResult<MediaStream> {
        let result = self.inner.request_capture(constraints).await;
        match &result {
            Ok(stream) => self.audit.record_grant(stream),
            Err(_) => self.audit.record_failure(),
        }
        result
    }

    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceDescriptor>> {
        self.inner.enumerate_devices().await
    }

    fn stop_track(&self, track: &MediaTrack) {
        self.inner.stop_track(track);
        self.audit.record_stop(track);
        debug!(track_id = track.id(), "Audited track release");
    }

    fn track_endings(&self) -> Option<TrackEndings> {
        self.inner.track_endings()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
