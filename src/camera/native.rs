//! Hardware camera backend built on nokhwa.
//!
//! The camera is opened inside a background thread that keeps the latest
//! decoded frame in a shared buffer. Stopping the track signals the thread
//! and joins it, which releases the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;
use tokio::sync::oneshot;

use super::controller::FIRST_FRAME_TIMEOUT;
use super::device::{MediaDevices, MediaStream, MediaStreamTrack};
use super::types::{
    CameraInfo, Frame, FrameFormat, MediaError, MediaStreamConstraints, Resolution, TrackKind,
};

/// Camera devices reachable through the platform's native API.
#[derive(Debug, Clone, Default)]
pub struct NativeDevices {
    device_index: u32,
    fps: u32,
}

impl NativeDevices {
    pub fn new(device_index: u32) -> Self {
        Self {
            device_index,
            fps: 30,
        }
    }
}

#[async_trait]
impl MediaDevices for NativeDevices {
    async fn get_user_media(
        &self,
        constraints: &MediaStreamConstraints,
    ) -> Result<MediaStream, MediaError> {
        let video = constraints.video.as_ref().ok_or(MediaError::NotFound)?;

        let devices = self.enumerate_devices()?;
        if !devices.iter().any(|d| d.index == self.device_index) {
            return Err(MediaError::NotFound);
        }
        let label = devices
            .iter()
            .find(|d| d.index == self.device_index)
            .map(|d| d.name.clone())
            .unwrap_or_default();

        let buffer = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let (info_tx, info_rx) = oneshot::channel();

        let index = CameraIndex::Index(self.device_index);
        let ideal = video.ideal;
        let fps = self.fps;
        let thread_buffer = Arc::clone(&buffer);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            run_capture_loop(index, ideal, fps, thread_buffer, thread_stop, info_tx);
        });

        match info_rx.await {
            Ok(Ok(resolution)) => {
                log::info!("Native camera streaming at {}", resolution);
                let track = NativeVideoTrack {
                    label,
                    buffer,
                    stop,
                    thread: Mutex::new(Some(handle)),
                };
                Ok(MediaStream::new(vec![Arc::new(track)]))
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                let _ = handle.join();
                Err(MediaError::Other(
                    "capture thread terminated unexpectedly".to_string(),
                ))
            }
        }
    }

    fn enumerate_devices(&self) -> Result<Vec<CameraInfo>, MediaError> {
        let devices =
            nokhwa::query(ApiBackend::Auto).map_err(|e| MediaError::Other(e.to_string()))?;
        Ok(devices
            .into_iter()
            .map(|d| CameraInfo {
                index: d.index().as_index().unwrap_or(0),
                name: d.human_name(),
                description: d.description().to_string(),
            })
            .collect())
    }
}

/// Video track fed by the background capture thread.
pub struct NativeVideoTrack {
    label: String,
    buffer: Arc<Mutex<Option<Frame>>>,
    stop: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MediaStreamTrack for NativeVideoTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn is_live(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self.thread.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        if let Ok(mut buf) = self.buffer.lock() {
            *buf = None;
        }
    }

    fn latest_frame(&self) -> Option<Frame> {
        if !self.is_live() {
            return None;
        }
        self.buffer.lock().ok()?.clone()
    }
}

impl Drop for NativeVideoTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture_loop(
    index: CameraIndex,
    ideal: Resolution,
    fps: u32,
    buffer: Arc<Mutex<Option<Frame>>>,
    stop: Arc<AtomicBool>,
    info_tx: oneshot::Sender<Result<Resolution, MediaError>>,
) {
    let mut camera = match open_camera_with_fallback(&index, ideal, fps) {
        Ok(cam) => cam,
        Err(e) => {
            let _ = info_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = info_tx.send(Err(classify(&e.to_string())));
        return;
    }

    // Report readiness only once a frame is in the buffer
    let mut info_tx = Some(info_tx);
    let started = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        if let Ok(raw) = camera.frame() {
            if let Some(frame) = convert_to_rgb(&raw) {
                let resolution = frame.resolution();
                if let Ok(mut buf) = buffer.lock() {
                    *buf = Some(frame);
                }
                if let Some(tx) = info_tx.take() {
                    let _ = tx.send(Ok(resolution));
                }
            }
        }
        if info_tx.is_some() && started.elapsed() >= FIRST_FRAME_TIMEOUT {
            if let Some(tx) = info_tx.take() {
                let _ = tx.send(Err(MediaError::NotReadable(
                    "no frame received from camera".to_string(),
                )));
            }
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    let _ = camera.stop_stream();
}

fn open_camera_with_fallback(
    index: &CameraIndex,
    ideal: Resolution,
    fps: u32,
) -> Result<Camera, MediaError> {
    let closest = |format| {
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            nokhwa::utils::Resolution::new(ideal.width, ideal.height),
            format,
            fps,
        )))
    };
    let attempts = vec![
        closest(NokhwaFrameFormat::NV12),
        closest(NokhwaFrameFormat::MJPEG),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
    ];

    let mut last_error = String::from("no camera format accepted");
    for requested in attempts {
        match Camera::new(index.clone(), requested) {
            Ok(cam) => return Ok(cam),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(classify(&last_error))
}

/// Map a backend error message onto the media error taxonomy.
fn classify(message: &str) -> MediaError {
    let msg = message.to_lowercase();
    if msg.contains("permission") || msg.contains("denied") || msg.contains("authorization") {
        MediaError::NotAllowed
    } else if msg.contains("busy") || msg.contains("in use") {
        MediaError::NotReadable(message.to_string())
    } else if msg.contains("not found") || msg.contains("no device") {
        MediaError::NotFound
    } else {
        MediaError::Other(message.to_string())
    }
}

fn convert_to_rgb(buffer: &nokhwa::Buffer) -> Option<Frame> {
    let decoded = buffer.decode_image::<RgbFormat>().ok()?;
    let resolution = buffer.resolution();

    Some(Frame {
        data: decoded.into_raw(),
        width: resolution.width(),
        height: resolution.height(),
        format: FrameFormat::Rgb,
        timestamp: Instant::now(),
    })
}
