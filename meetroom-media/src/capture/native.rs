//! Native device backend
//!
//! Cameras come from `nokhwa`, microphones and speakers from `cpal`. Neither
//! library hands out `Send` capture handles, so every live track owns a worker
//! thread that keeps the device open until it is told to stop. A camera worker
//! that keeps failing to read frames assumes the device is gone, ends its
//! track and reports it through [`MediaPlatform::track_endings`].

use super::{CaptureConstraints, MediaPlatform, TrackEndings, VideoConstraint};
use crate::devices::{DeviceDescriptor, DeviceKind};
use crate::error::{IntoMediaError, MediaError, MediaResult};
use crate::tracks::{MediaStream, MediaTrack, TrackKind};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

const CAMERA_PREFIX: &str = "video:";
const MIC_PREFIX: &str = "audioinput:";
const SPEAKER_PREFIX: &str = "audiooutput:";
const STOP_ACK_TIMEOUT: Duration = Duration::from_secs(2);
const FRAME_INTERVAL: Duration = Duration::from_millis(33);
/// Consecutive failed reads before a camera counts as unplugged
const MAX_FRAME_FAILURES: u32 = 15;
const ENDINGS_CAPACITY: usize = 16;

type StopRequest = std_mpsc::Sender<()>;

struct Worker {
    stop: std_mpsc::Sender<StopRequest>,
}

/// [`MediaPlatform`] backed by the operating system's capture devices
pub struct NativePlatform {
    workers: Mutex<HashMap<String, Worker>>,
    endings: broadcast::Sender<String>,
}

impl NativePlatform {
    /// Create the native backend
    pub fn new() -> Self {
        let (endings, _) = broadcast::channel(ENDINGS_CAPACITY);
        Self {
            workers: Mutex::new(HashMap::new()),
            endings,
        }
    }

    fn list_devices() -> MediaResult<Vec<DeviceDescriptor>> {
        let mut devices = Vec::new();

        let cameras = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| MediaError::DeviceEnumerationFailed {
                reason: format!("camera query failed: {}", e),
            })?;
        for info in cameras {
            devices.push(DeviceDescriptor::new(
                format!("{}{}", CAMERA_PREFIX, info.index()),
                DeviceKind::Camera,
                info.human_name(),
            ));
        }

        let host = cpal::default_host();
        let inputs = host
            .input_devices()
            .map_err(|e| MediaError::DeviceEnumerationFailed {
                reason: format!("Failed to enumerate input devices: {}", e),
            })?;
        for device in inputs {
            let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
            devices.push(DeviceDescriptor::new(
                format!("{}{}", MIC_PREFIX, name),
                DeviceKind::Microphone,
                name,
            ));
        }

        let outputs = host
            .output_devices()
            .map_err(|e| MediaError::DeviceEnumerationFailed {
                reason: format!("Failed to enumerate output devices: {}", e),
            })?;
        for device in outputs {
            let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
            devices.push(DeviceDescriptor::new(
                format!("{}{}", SPEAKER_PREFIX, name),
                DeviceKind::Speaker,
                name,
            ));
        }

        Ok(devices)
    }

    fn camera_index(constraint: &VideoConstraint) -> MediaResult<CameraIndex> {
        match constraint {
            VideoConstraint::Device(id) => {
                let raw = id
                    .strip_prefix(CAMERA_PREFIX)
                    .ok_or_else(|| MediaError::DeviceNotFound {
                        device_id: id.clone(),
                    })?;
                Ok(match raw.parse::<u32>() {
                    Ok(index) => CameraIndex::Index(index),
                    Err(_) => CameraIndex::String(raw.to_string()),
                })
            }
            _ => Ok(CameraIndex::Index(0)),
        }
    }

    async fn open_camera(
        index: CameraIndex,
        track: MediaTrack,
        endings: broadcast::Sender<String>,
    ) -> MediaResult<std_mpsc::Sender<StopRequest>> {
        let (ready_tx, ready_rx) = oneshot::channel::<MediaResult<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<StopRequest>();

        std::thread::spawn(move || {
            let requested =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let mut camera = match Camera::new(index.clone(), requested) {
                Ok(camera) => camera,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into_media_error("nokhwa", "open camera")));
                    return;
                }
            };
            if let Err(e) = camera.open_stream() {
                let _ = ready_tx.send(Err(e.into_media_error("nokhwa", "start camera stream")));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            debug!(camera = %index, "Camera worker running");

            // Drain frames so the driver keeps streaming until asked to stop
            let mut failures = 0;
            let ack = loop {
                match stop_rx.recv_timeout(FRAME_INTERVAL) {
                    Ok(ack) => break Some(ack),
                    Err(std_mpsc::RecvTimeoutError::Disconnected) => break None,
                    Err(std_mpsc::RecvTimeoutError::Timeout) => match camera.frame() {
                        Ok(_) => failures = 0,
                        Err(e) => {
                            failures += 1;
                            if failures < MAX_FRAME_FAILURES {
                                continue;
                            }
                            warn!(camera = %index, error = %e, "Camera stopped delivering frames");
                            if track.mark_ended() {
                                let _ = endings.send(track.id().to_string());
                            }
                            break None;
                        }
                    },
                }
            };
            if let Err(e) = camera.stop_stream() {
                warn!(camera = %index, error = %e, "Failed to stop camera stream");
            }
            drop(camera);
            if let Some(ack) = ack {
                let _ = ack.send(());
            }
        });

        ready_rx.await.map_err(|_| MediaError::DeviceAcquisitionFailed {
            device_id: None,
            reason: "camera worker exited before reporting".to_string(),
        })??;
        Ok(stop_tx)
    }

    async fn open_microphone() -> MediaResult<(String, std_mpsc::Sender<StopRequest>)> {
        let (ready_tx, ready_rx) = oneshot::channel::<MediaResult<String>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<StopRequest>();

        std::thread::spawn(move || {
            let opened = (|| -> MediaResult<(String, cpal::Stream)> {
                let host = cpal::default_host();
                let device = host
                    .default_input_device()
                    .ok_or_else(|| MediaError::DeviceNotFound {
                        device_id: "default microphone".to_string(),
                    })?;
                let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
                let config = device
                    .default_input_config()
                    .map_err(|e| e.into_media_error("cpal", "query input config"))?;
                let stream = device
                    .build_input_stream_raw(
                        &config.config(),
                        config.sample_format(),
                        |_data: &cpal::Data, _: &cpal::InputCallbackInfo| {},
                        |err| warn!(error = %err, "Microphone stream error"),
                        None,
                    )
                    .map_err(|e| e.into_media_error("cpal", "build input stream"))?;
                stream
                    .play()
                    .map_err(|e| e.into_media_error("cpal", "start input stream"))?;
                Ok((format!("{}{}", MIC_PREFIX, name), stream))
            })();

            let stream = match opened {
                Ok((device_id, stream)) => {
                    let _ = ready_tx.send(Ok(device_id));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let ack = stop_rx.recv().ok();
            drop(stream);
            if let Some(ack) = ack {
                let _ = ack.send(());
            }
        });

        let device_id = ready_rx.await.map_err(|_| MediaError::DeviceAcquisitionFailed {
            device_id: None,
            reason: "microphone worker exited before reporting".to_string(),
        })??;
        Ok((device_id, stop_tx))
    }

    fn release_workers(&self, track_ids: &[String]) {
        let mut workers = self.workers.lock();
        for id in track_ids {
            if let Some(worker) = workers.remove(id) {
                let (ack_tx, _ack_rx) = std_mpsc::channel();
                let _ = worker.stop.send(ack_tx);
            }
        }
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaPlatform for NativePlatform {
    async fn request_capture(&self, constraints: &CaptureConstraints) -> MediaResult<MediaStream> {
        let stream_id = uuid::Uuid::new_v4().to_string();
        let mut tracks = Vec::new();

        if constraints.video.is_requested() {
            if let Some(resolution) = constraints.resolution {
                debug!(
                    width = resolution.width,
                    height = resolution.height,
                    "Native cameras open at their highest frame rate; ideal resolution is advisory"
                );
            }
            let index = Self::camera_index(&constraints.video)?;
            let device_id = format!("{}{}", CAMERA_PREFIX, index);
            let track = MediaTrack::new(
                uuid::Uuid::new_v4().to_string(),
                stream_id.clone(),
                TrackKind::Video,
                device_id,
            );
            let stop = Self::open_camera(index, track.clone(), self.endings.clone()).await?;
            self.workers
                .lock()
                .insert(track.id().to_string(), Worker { stop });
            tracks.push(track);
        }

        if constraints.audio {
            match Self::open_microphone().await {
                Ok((device_id, stop)) => {
                    let track = MediaTrack::new(
                        uuid::Uuid::new_v4().to_string(),
                        stream_id.clone(),
                        TrackKind::Audio,
                        device_id,
                    );
                    self.workers
                        .lock()
                        .insert(track.id().to_string(), Worker { stop });
                    tracks.push(track);
                }
                Err(e) => {
                    // Do not leave the camera open when the request as a whole fails
                    let opened: Vec<String> = tracks.iter().map(|t| t.id().to_string()).collect();
                    self.release_workers(&opened);
                    for track in &tracks {
                        track.mark_ended();
                    }
                    return Err(e);
                }
            }
        }

        info!(stream_id = %stream_id, tracks = tracks.len(), "Native capture started");
        Ok(MediaStream::new(stream_id, tracks))
    }

    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceDescriptor>> {
        tokio::task::spawn_blocking(Self::list_devices)
            .await
            .map_err(|e| MediaError::DeviceEnumerationFailed {
                reason: format!("enumeration task failed: {}", e),
            })?
    }

    /// Blocks until the worker confirms the device is closed
    ///
    /// On a multi-threaded runtime the wait runs under
    /// [`tokio::task::block_in_place`]; on a current-thread runtime it blocks
    /// the runtime thread for up to two seconds.
    fn stop_track(&self, track: &MediaTrack) {
        let worker = self.workers.lock().remove(track.id());
        if let Some(worker) = worker {
            let (ack_tx, ack_rx) = std_mpsc::channel();
            if worker.stop.send(ack_tx).is_ok() && !wait_for_release(&ack_rx) {
                warn!(track_id = track.id(), "Capture worker did not confirm release");
            }
        }
        track.mark_ended();
    }

    fn track_endings(&self) -> Option<TrackEndings> {
        Some(self.endings.subscribe())
    }

    fn name(&self) -> &str {
        "native"
    }
}

fn wait_for_release(ack: &std_mpsc::Receiver<()>) -> bool {
    let wait = || ack.recv_timeout(STOP_ACK_TIMEOUT).is_ok();
    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
            tokio::task::block_in_place(wait)
        }
        _ => wait(),
    }
}
