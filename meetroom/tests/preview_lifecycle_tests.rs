//! Integration tests for the camera preview lifecycle
//!
//! These tests drive a full setup session against the scripted platform and
//! check ordering through the platform's call log.

use meetroom::*;
use meetroom_media::{PlatformCall, VideoConstraint};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// HELPERS
// ============================================================================

async fn mount(platform: &ScriptedPlatform, surface: &VideoSurface, config: SetupConfig) -> SetupSession {
    SetupSession::mount(
        Arc::new(platform.clone()),
        Arc::new(surface.clone()),
        config,
    )
    .await
    .unwrap()
}

fn camera_off() -> SetupConfig {
    SetupConfig {
        initial_camera_enabled: false,
        ..SetupConfig::default()
    }
}

fn notices(events: &mut EventStream) -> Vec<Notice> {
    events
        .drain()
        .into_iter()
        .filter_map(|event| event.notice().cloned())
        .collect()
}

async fn let_actor_run() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// ORDERING TESTS
// ============================================================================

#[tokio::test]
async fn test_default_camera_is_first_discovered() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let session = mount(&platform, &surface, SetupConfig::default()).await;

    assert_eq!(session.selection().camera(), Some("cam-a"));
    let preview = session.preview().await.unwrap();
    assert_eq!(preview.active_camera.as_deref(), Some("cam-a"));
    assert_eq!(surface.stats().attaches, 1);
}

#[tokio::test]
async fn test_select_camera_stops_once_then_starts_once() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, SetupConfig::default()).await;
    let before = session.preview().await.unwrap();
    platform.clear_calls();

    session.select_camera("cam-b").unwrap();
    let after = session.preview().await.unwrap();

    let calls = platform.calls();
    assert_eq!(calls.len(), 3, "unexpected calls: {:?}", calls);
    assert!(matches!(
        &calls[0],
        PlatformCall::StopTrack { stream_id, .. } if Some(stream_id) == before.active_stream_id.as_ref()
    ));
    assert!(matches!(
        &calls[1],
        PlatformCall::RequestCapture { constraints }
            if constraints.video == VideoConstraint::Device("cam-b".to_string())
    ));
    assert!(matches!(
        &calls[2],
        PlatformCall::CaptureGranted { device_ids, .. } if device_ids == &vec!["cam-b".to_string()]
    ));

    assert_eq!(after.active_camera.as_deref(), Some("cam-b"));
    assert_eq!(surface.source_id(), after.active_stream_id);
    assert_eq!(platform.live_track_count(), 1);
}

#[tokio::test]
async fn test_selection_while_disabled_does_not_acquire() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, camera_off()).await;
    let requests = platform.request_count();

    session.select_camera("cam-b").unwrap();
    session.preview().await.unwrap();
    assert_eq!(platform.request_count(), requests);

    session.set_camera_enabled(true).unwrap();
    let preview = session.preview().await.unwrap();
    assert_eq!(preview.active_camera.as_deref(), Some("cam-b"));
}

#[tokio::test]
async fn test_every_disable_detaches_and_stops() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, SetupConfig::default()).await;

    for _ in 0..3 {
        assert!(session.preview().await.unwrap().is_live());
        let live = platform.live_tracks();
        assert_eq!(live.len(), 1);

        session.set_camera_enabled(false).unwrap();
        let preview = session.preview().await.unwrap();
        assert_eq!(preview.state, PreviewState::Idle);
        assert!(!surface.is_attached());
        assert!(live.iter().all(|track| !track.is_live()));
        assert_eq!(platform.live_track_count(), 0);

        session.set_camera_enabled(true).unwrap();
    }
}

#[tokio::test]
async fn test_mic_flag_never_adds_audio_to_preview() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, SetupConfig::default()).await;

    session.toggle_mic().unwrap();
    session.toggle_mic().unwrap();
    session.select_camera("cam-b").unwrap();
    session.preview().await.unwrap();

    assert!(session.capture_state().mic_enabled);
    let source = surface.source().unwrap();
    assert!(source.tracks().iter().all(|t| t.kind() == TrackKind::Video));

    // Only the permission probe asks for audio
    let audio_requests = platform
        .calls()
        .iter()
        .filter(|call| matches!(call, PlatformCall::RequestCapture { constraints } if constraints.audio))
        .count();
    assert_eq!(audio_requests, 1);
}

// ============================================================================
// STALE COMPLETION TESTS
// ============================================================================

#[tokio::test]
async fn test_stale_acquisition_is_never_attached() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, camera_off()).await;

    let gate = platform.hold_captures();
    session.set_camera_enabled(true).unwrap();
    // Probe plus the preview request
    platform.wait_for_requests(2).await;

    session.select_camera("cam-b").unwrap();
    let_actor_run().await;
    gate.open();

    let preview = session.preview().await.unwrap();
    assert_eq!(preview.active_camera.as_deref(), Some("cam-b"));
    assert_eq!(surface.stats().attaches, 1);
    assert_eq!(platform.live_track_count(), 1);

    // The cam-a stream was released before cam-b was requested
    let calls = platform.calls();
    let granted_a = calls
        .iter()
        .position(|c| matches!(c, PlatformCall::CaptureGranted { device_ids, .. } if device_ids == &vec!["cam-a".to_string()]))
        .unwrap();
    let stop_a = calls.iter().skip(granted_a).position(|c| c.is_stop()).unwrap() + granted_a;
    let request_b = calls
        .iter()
        .position(|c| matches!(c, PlatformCall::RequestCapture { constraints } if constraints.video == VideoConstraint::Device("cam-b".to_string())))
        .unwrap();
    assert!(stop_a < request_b);
}

#[tokio::test]
async fn test_queries_wait_for_quiescence() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, camera_off()).await;

    let gate = platform.hold_captures();
    session.set_camera_enabled(true).unwrap();
    platform.wait_for_requests(2).await;

    let mut query = tokio_test::task::spawn(session.preview());
    tokio_test::assert_pending!(query.poll());
    let_actor_run().await;
    tokio_test::assert_pending!(query.poll());

    gate.open();
    let preview = query.await.unwrap();
    assert!(preview.is_live());
}

#[tokio::test]
async fn test_enable_then_disable_during_acquisition() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, camera_off()).await;

    let gate = platform.hold_captures();
    session.set_camera_enabled(true).unwrap();
    platform.wait_for_requests(2).await;
    session.set_camera_enabled(false).unwrap();
    let_actor_run().await;
    gate.open();

    let preview = session.preview().await.unwrap();
    assert_eq!(preview.state, PreviewState::Idle);
    assert!(!preview.camera_enabled);
    assert_eq!(surface.stats().attaches, 0);
    assert_eq!(platform.live_track_count(), 0);
}

// ============================================================================
// FAILURE TESTS
// ============================================================================

#[tokio::test]
async fn test_permission_denied_leaves_empty_inert_screen() {
    let platform = ScriptedPlatform::laptop();
    platform.deny_permission();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, SetupConfig::default()).await;
    let mut events = session.subscribe();

    assert!(session.inventory().cameras().is_empty());
    assert!(session.inventory().microphones().is_empty());
    assert!(session.inventory().speakers().is_empty());
    assert_eq!(session.capture_state(), CaptureState::default());
    assert_eq!(session.selection().camera(), None);
    assert!(!platform.calls().contains(&PlatformCall::EnumerateDevices));

    session.preview().await.unwrap();
    assert_eq!(notices(&mut events), vec![Notice::PermissionDenied]);
    assert_eq!(platform.request_count(), 1);

    // Turning the camera on anyway fails without a retry loop
    session.set_camera_enabled(true).unwrap();
    let preview = session.preview().await.unwrap();
    assert_eq!(preview.state, PreviewState::Idle);
    assert!(matches!(
        notices(&mut events).as_slice(),
        [Notice::DeviceAcquisitionFailed { device_id: None, .. }]
    ));
    assert_eq!(platform.request_count(), 2);
}

#[tokio::test]
async fn test_enumeration_failure_surfaces_as_denied_notice() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, camera_off()).await;
    let mut events = session.subscribe();
    events.drain();

    platform.fail_enumeration("device service crashed");
    let err = session.initialize_devices().await.unwrap_err();
    assert_eq!(err.error_code(), "DEVICE_ENUMERATION_FAILED");
    assert!(session.inventory().is_empty());
    assert_eq!(notices(&mut events), vec![Notice::PermissionDenied]);
}

#[tokio::test]
async fn test_busy_camera_reports_device() {
    let platform = ScriptedPlatform::laptop();
    platform.set_busy("cam-b", true);
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, SetupConfig::default()).await;
    let mut events = session.subscribe();

    session.select_camera("cam-b").unwrap();
    let preview = session.preview().await.unwrap();

    assert_eq!(preview.state, PreviewState::Idle);
    assert!(preview.camera_enabled);
    assert!(!surface.is_attached());
    assert_eq!(platform.live_track_count(), 0);
    assert!(notices(&mut events).iter().any(|n| matches!(
        n,
        Notice::DeviceAcquisitionFailed { device_id: Some(id), reason }
            if id == "cam-b" && reason.contains("Device busy")
    )));
}

#[tokio::test]
async fn test_zero_track_stream_is_nulled() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, camera_off()).await;
    let mut events = session.subscribe();

    platform.grant_empty_streams(true);
    session.set_camera_enabled(true).unwrap();
    let preview = session.preview().await.unwrap();

    assert_eq!(preview.active_stream_id, None);
    assert_eq!(preview.state, PreviewState::Idle);
    assert!(!surface.is_attached());
    assert!(notices(&mut events).iter().any(|n| matches!(
        n,
        Notice::DeviceAcquisitionFailed { reason, .. } if reason.contains("no tracks")
    )));
}

#[tokio::test]
async fn test_unplugged_camera_nulls_stream() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, SetupConfig::default()).await;
    session.preview().await.unwrap();
    let mut events = session.subscribe();
    events.drain();

    // Only the hardware acts; the platform reports the ending itself
    platform.unplug("cam-a");
    let notice = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Some(SetupEvent::Notice(notice)) = events.next().await {
                break notice;
            }
        }
    })
    .await
    .unwrap();
    assert!(matches!(
        notice,
        Notice::DeviceAcquisitionFailed { device_id: Some(ref id), .. } if id == "cam-a"
    ));

    let preview = session.preview().await.unwrap();
    assert_eq!(preview.state, PreviewState::Idle);
    assert_eq!(preview.active_stream_id, None);
    assert!(preview.camera_enabled);
    assert!(!surface.is_attached());

    // Re-enumerating moves the selection to the remaining camera
    session.initialize_devices().await.unwrap();
    assert_eq!(session.selection().camera(), Some("cam-b"));
    let preview = session.preview().await.unwrap();
    assert_eq!(preview.active_camera.as_deref(), Some("cam-b"));
}

#[tokio::test]
async fn test_reported_track_end_is_idempotent() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let session = mount(&platform, &surface, SetupConfig::default()).await;
    session.preview().await.unwrap();
    let mut events = session.subscribe();
    events.drain();

    let track_id = platform.live_tracks()[0].id().to_string();
    session.on_track_ended(&track_id).unwrap();
    session.on_track_ended(&track_id).unwrap();
    session.on_track_ended("track-unknown").unwrap();

    let preview = session.preview().await.unwrap();
    assert_eq!(preview.active_stream_id, None);
    assert_eq!(platform.live_track_count(), 0);
    assert_eq!(notices(&mut events).len(), 1);
}

// ============================================================================
// DISPOSAL TESTS
// ============================================================================

#[tokio::test]
async fn test_dispose_while_live() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let session = mount(&platform, &surface, SetupConfig::default()).await;
    session.preview().await.unwrap();

    let snapshot = session.dispose().await.unwrap();
    assert!(snapshot.disposed);
    assert_eq!(snapshot.state, PreviewState::Idle);
    assert_eq!(platform.live_track_count(), 0);
    assert!(!surface.is_attached());
}

#[tokio::test]
async fn test_dispose_while_starting() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session = mount(&platform, &surface, camera_off()).await;

    let gate = platform.hold_captures();
    session.set_camera_enabled(true).unwrap();
    platform.wait_for_requests(2).await;

    let (snapshot, _) = tokio::join!(session.dispose(), async {
        let_actor_run().await;
        gate.open();
    });
    assert!(snapshot.unwrap().disposed);
    assert_eq!(platform.live_track_count(), 0);
    assert!(!surface.is_attached());
}

#[tokio::test]
async fn test_drop_releases_preview() {
    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let session = mount(&platform, &surface, SetupConfig::default()).await;
    session.preview().await.unwrap();
    assert_eq!(platform.live_track_count(), 1);

    drop(session);
    tokio::time::timeout(Duration::from_secs(1), async {
        while platform.live_track_count() > 0 || surface.is_attached() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}
