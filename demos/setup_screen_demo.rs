//! Setup screen walkthrough
//!
//! Mounts a setup session on the scripted laptop devices, switches cameras,
//! toggles the microphone, trips both join notices and finally joins.
//!
//! Run with `cargo run -p meetroom --example setup_screen_demo`.

use futures::StreamExt;
use meetroom::{
    init_logging, RoomJoinConfig, ScriptedPlatform, SetupConfig, SetupError, SetupSession,
    VideoSurface,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), SetupError> {
    let config = SetupConfig {
        audit_handles: true,
        ..SetupConfig::default()
    };
    init_logging(&config)?;

    let platform = ScriptedPlatform::laptop();
    let surface = VideoSurface::new();
    let mut session =
        SetupSession::mount(Arc::new(platform), Arc::new(surface.clone()), config).await?;

    let mut events = session.subscribe().into_stream();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            println!("event: {} {:?}", event.event_type(), event);
        }
    });

    for camera in session.inventory().cameras() {
        println!("camera: {} ({})", camera.display_label(), camera.id);
    }
    for microphone in session.inventory().microphones() {
        println!("microphone: {} ({})", microphone.display_label(), microphone.id);
    }

    session.select_camera("cam-b")?;
    session.toggle_mic()?;
    println!("preview: {:?}", session.preview().await?);

    let mut on_join = |config: RoomJoinConfig| {
        println!(
            "joining '{}' as '{}' (camera: {}, mic: {})",
            config.room_name(),
            config.user_name(),
            config.camera_enabled(),
            config.mic_enabled()
        );
    };

    if let Err(e) = session.join(&mut on_join).await {
        println!("join rejected: {}", e);
    }
    session.set_user_name("Alice")?;
    if let Err(e) = session.join(&mut on_join).await {
        println!("join rejected: {}", e);
    }
    session.set_room_name("standup")?;
    session.join(&mut on_join).await?;

    println!("surface attached after join: {}", surface.is_attached());
    if let Some(report) = session.handle_report() {
        println!("{}", report.to_json()?);
    }

    // Closing the session ends the event stream
    drop(session);
    if let Err(e) = printer.await {
        println!("event printer failed: {}", e);
    }
    Ok(())
}
