//! Event system for setup screen notices and preview changes

use crate::join::{RoomJoinConfig, ValidationError};
use futures::stream::{self, Stream};
use meetroom_media::DeviceKind;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

/// User-facing notices
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Notice {
    /// Permission probe or enumeration failed
    PermissionDenied,
    /// The camera preview could not be started or was lost
    DeviceAcquisitionFailed {
        /// Camera that was requested, `None` for the default camera
        device_id: Option<String>,
        /// Underlying failure
        reason: String,
    },
    /// Join attempted with a blank user name
    EmptyUserName,
    /// Join attempted with a blank room name
    EmptyRoomName,
}

impl Notice {
    /// Default wording shown to the user
    pub fn message(&self) -> &'static str {
        match self {
            Notice::PermissionDenied => "Failed to access camera and microphone",
            Notice::DeviceAcquisitionFailed { .. } => "Failed to start camera",
            Notice::EmptyUserName => "Please enter your name",
            Notice::EmptyRoomName => "Please enter a room name",
        }
    }

    /// Stable identifier for the notice kind
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::PermissionDenied => "permission_denied",
            Notice::DeviceAcquisitionFailed { .. } => "device_acquisition_failed",
            Notice::EmptyUserName => "empty_user_name",
            Notice::EmptyRoomName => "empty_room_name",
        }
    }
}

impl From<ValidationError> for Notice {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::EmptyUserName => Notice::EmptyUserName,
            ValidationError::EmptyRoomName => Notice::EmptyRoomName,
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Events published by a setup session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SetupEvent {
    /// The device inventory was replaced
    DevicesEnumerated {
        /// Number of cameras
        cameras: usize,
        /// Number of microphones
        microphones: usize,
        /// Number of speakers
        speakers: usize,
    },
    /// The selected device of one kind changed
    SelectionChanged {
        /// Device kind
        kind: DeviceKind,
        /// New selection
        device_id: Option<String>,
    },
    /// Camera or microphone intent changed
    CaptureChanged {
        /// Camera intent
        camera_enabled: bool,
        /// Microphone intent
        mic_enabled: bool,
    },
    /// A preview stream was attached to the render target
    PreviewStarted {
        /// Stream id
        stream_id: String,
        /// Camera the stream was requested from, `None` for the default camera
        device_id: Option<String>,
    },
    /// The preview stream was released
    PreviewStopped {
        /// Stream id
        stream_id: String,
    },
    /// A user-facing notice
    Notice(Notice),
    /// Setup finished and the call screen took over
    Joined(RoomJoinConfig),
}

impl SetupEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SetupEvent::DevicesEnumerated { .. } => "devices_enumerated",
            SetupEvent::SelectionChanged { .. } => "selection_changed",
            SetupEvent::CaptureChanged { .. } => "capture_changed",
            SetupEvent::PreviewStarted { .. } => "preview_started",
            SetupEvent::PreviewStopped { .. } => "preview_stopped",
            SetupEvent::Notice(_) => "notice",
            SetupEvent::Joined(_) => "joined",
        }
    }

    /// Check if this is a device-related event
    pub fn is_device_event(&self) -> bool {
        matches!(
            self,
            SetupEvent::DevicesEnumerated { .. }
                | SetupEvent::SelectionChanged { .. }
                | SetupEvent::CaptureChanged { .. }
        )
    }

    /// Check if this is a preview-related event
    pub fn is_preview_event(&self) -> bool {
        matches!(
            self,
            SetupEvent::PreviewStarted { .. } | SetupEvent::PreviewStopped { .. }
        )
    }

    /// Check if this is a notice
    pub fn is_notice(&self) -> bool {
        matches!(self, SetupEvent::Notice(_))
    }

    /// Borrow the notice, if this is one
    pub fn notice(&self) -> Option<&Notice> {
        match self {
            SetupEvent::Notice(notice) => Some(notice),
            _ => None,
        }
    }
}

/// Stream of setup events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<SetupEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: broadcast::Receiver<SetupEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event, `None` once the session is gone
    ///
    /// Events dropped because the subscriber fell behind are skipped.
    pub async fn next(&mut self) -> Option<SetupEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Option<SetupEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    /// Collect every event already queued
    pub fn drain(&mut self) -> Vec<SetupEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Adapt into a [`futures::Stream`]
    pub fn into_stream(self) -> impl Stream<Item = SetupEvent> + Send + Unpin {
        Box::pin(stream::unfold(self, |mut events| async move {
            events.next().await.map(|event| (event, events))
        }))
    }

    /// Narrow this stream with `filter`
    pub fn filtered(self, filter: EventFilter) -> FilteredEventStream {
        FilteredEventStream {
            inner: self,
            filter,
        }
    }
}

/// Event filter for selective event processing
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Whether to include device events
    pub include_device_events: bool,
    /// Whether to include preview events
    pub include_preview_events: bool,
    /// Whether to include notices
    pub include_notices: bool,
    /// Whether to include the join event
    pub include_join_events: bool,
    /// Specific event types to include (if specified, overrides other filters)
    pub specific_event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a filter that includes all events
    pub fn all() -> Self {
        Self {
            include_device_events: true,
            include_preview_events: true,
            include_notices: true,
            include_join_events: true,
            specific_event_types: None,
        }
    }

    /// Create a filter that includes only notices
    pub fn notices_only() -> Self {
        Self {
            include_device_events: false,
            include_preview_events: false,
            include_notices: true,
            include_join_events: false,
            specific_event_types: None,
        }
    }

    /// Create a filter that includes only preview events
    pub fn preview_only() -> Self {
        Self {
            include_device_events: false,
            include_preview_events: true,
            include_notices: false,
            include_join_events: false,
            specific_event_types: None,
        }
    }

    /// Create a filter for specific event types
    pub fn specific_types(event_types: Vec<String>) -> Self {
        Self {
            include_device_events: false,
            include_preview_events: false,
            include_notices: false,
            include_join_events: false,
            specific_event_types: Some(event_types),
        }
    }

    /// Check if an event should be included
    pub fn should_include(&self, event: &SetupEvent) -> bool {
        if let Some(ref types) = self.specific_event_types {
            return types.iter().any(|t| t == event.event_type());
        }
        match event {
            SetupEvent::Notice(_) => self.include_notices,
            SetupEvent::Joined(_) => self.include_join_events,
            e if e.is_preview_event() => self.include_preview_events,
            _ => self.include_device_events,
        }
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Event stream that only yields events passing a filter
#[derive(Debug)]
pub struct FilteredEventStream {
    inner: EventStream,
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Get the next matching event
    pub async fn next(&mut self) -> Option<SetupEvent> {
        while let Some(event) = self.inner.next().await {
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Try to get the next matching event without blocking
    pub fn try_next(&mut self) -> Option<SetupEvent> {
        while let Some(event) = self.inner.try_next() {
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
        None
    }
}
