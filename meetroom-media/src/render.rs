//! Render targets for live previews
//!
//! A render target is the surface a preview is projected onto. Attach sets its
//! source to a live stream, detach clears it. There is no other contract.

use crate::tracks::MediaStream;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Surface that displays a stream's video
pub trait RenderTarget: Send + Sync {
    /// Set the surface's source to `stream`
    fn attach(&self, stream: &MediaStream);

    /// Clear the surface's source
    fn detach(&self);
}

impl<T: RenderTarget + ?Sized> RenderTarget for Arc<T> {
    fn attach(&self, stream: &MediaStream) {
        (**self).attach(stream)
    }

    fn detach(&self) {
        (**self).detach()
    }
}

/// Render target statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    /// Number of attach calls
    pub attaches: u64,
    /// Number of detach calls
    pub detaches: u64,
}

#[derive(Debug, Default)]
struct SurfaceInner {
    source: Option<MediaStream>,
    stats: SurfaceStats,
}

/// In-memory video surface
///
/// Cheap to clone; clones observe the same source.
#[derive(Debug, Clone, Default)]
pub struct VideoSurface {
    inner: Arc<RwLock<SurfaceInner>>,
}

impl VideoSurface {
    /// Create an empty surface
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently displayed stream
    pub fn source(&self) -> Option<MediaStream> {
        self.inner.read().source.clone()
    }

    /// Id of the currently displayed stream
    pub fn source_id(&self) -> Option<String> {
        self.inner.read().source.as_ref().map(|s| s.id().to_string())
    }

    /// Check if a stream is attached
    pub fn is_attached(&self) -> bool {
        self.inner.read().source.is_some()
    }

    /// Attach/detach counters
    pub fn stats(&self) -> SurfaceStats {
        self.inner.read().stats.clone()
    }
}

impl RenderTarget for VideoSurface {
    fn attach(&self, stream: &MediaStream) {
        let mut inner = self.inner.write();
        debug!(stream_id = stream.id(), "Attaching stream to surface");
        inner.source = Some(stream.clone());
        inner.stats.attaches += 1;
    }

    fn detach(&self) {
        let mut inner = self.inner.write();
        if let Some(previous) = inner.source.take() {
            debug!(stream_id = previous.id(), "Detaching stream from surface");
        }
        inner.stats.detaches += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracks::{MediaTrack, TrackKind};

    #[test]
    fn test_attach_and_detach() {
        let surface = VideoSurface::new();
        let observer = surface.clone();
        let stream = MediaStream::new(
            "s1",
            vec![MediaTrack::new("t1", "s1", TrackKind::Video, "cam-a")],
        );

        surface.attach(&stream);
        assert_eq!(observer.source_id().as_deref(), Some("s1"));

        surface.detach();
        assert!(!observer.is_attached());
        assert_eq!(
            observer.stats(),
            SurfaceStats {
                attaches: 1,
                detaches: 1
            }
        );
    }
}
