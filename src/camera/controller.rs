//! Camera controller: open, capture and close with status reporting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::device::{MediaDevices, MediaStream};
use super::encode::CapturedPhoto;
use super::surface::{Canvas, VideoPreview};
use super::types::{CameraError, MediaStreamConstraints};
use crate::status::{Severity, StatusSink};

/// How long `open()` waits for the first frame of a new stream.
pub const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(3);

const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Whether the controller currently holds a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Idle,
    Active,
}

/// Owns the camera stream, the live preview and the capture surface.
///
/// Public operations never return errors. Each one logs what happened and
/// reports exactly one notification to the [`StatusSink`]. The stream is
/// released on drop, so a camera is never left reserved.
pub struct CameraController {
    /// `None` when the host has no camera capability at all
    devices: Option<Arc<dyn MediaDevices>>,
    constraints: MediaStreamConstraints,
    status: Arc<dyn StatusSink>,
    preview: VideoPreview,
    canvas: Canvas,
    stream: Option<Arc<MediaStream>>,
    first_frame_timeout: Duration,
}

impl std::fmt::Debug for CameraController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraController")
            .field("state", &self.state())
            .field("constraints", &self.constraints)
            .field("supported", &self.devices.is_some())
            .finish_non_exhaustive()
    }
}

impl CameraController {
    pub fn new(devices: Arc<dyn MediaDevices>, status: Arc<dyn StatusSink>) -> Self {
        Self::build(Some(devices), status)
    }

    /// A controller for a host without camera support. `open()` always fails.
    pub fn unsupported(status: Arc<dyn StatusSink>) -> Self {
        Self::build(None, status)
    }

    fn build(devices: Option<Arc<dyn MediaDevices>>, status: Arc<dyn StatusSink>) -> Self {
        Self {
            devices,
            constraints: MediaStreamConstraints::default(),
            status,
            preview: VideoPreview::new(),
            canvas: Canvas::new(),
            stream: None,
            first_frame_timeout: FIRST_FRAME_TIMEOUT,
        }
    }

    pub fn with_constraints(mut self, constraints: MediaStreamConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_first_frame_timeout(mut self, timeout: Duration) -> Self {
        self.first_frame_timeout = timeout;
        self
    }

    pub fn constraints(&self) -> &MediaStreamConstraints {
        &self.constraints
    }

    pub fn state(&self) -> CameraState {
        if self.stream.is_some() {
            CameraState::Active
        } else {
            CameraState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == CameraState::Active
    }

    pub fn stream(&self) -> Option<&Arc<MediaStream>> {
        self.stream.as_ref()
    }

    pub fn preview(&self) -> &VideoPreview {
        &self.preview
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Request the camera and start the live preview.
    ///
    /// Returns `true` when this call activated the camera.
    pub async fn open(&mut self) -> bool {
        log::info!("Opening camera...");
        match self.try_open().await {
            Ok(()) => {
                log::info!("Camera opened");
                self.status
                    .show_status("Camera active - ready to capture", Severity::Success);
                true
            }
            Err(e) => {
                log::error!("Failed to open camera: {}", e);
                self.status.show_status(&e.open_message(), Severity::Error);
                false
            }
        }
    }

    async fn try_open(&mut self) -> Result<(), CameraError> {
        if self.stream.is_some() {
            return Err(CameraError::AlreadyActive);
        }
        let devices = self.devices.as_ref().ok_or(CameraError::Unsupported)?;

        let stream = Arc::new(devices.get_user_media(&self.constraints).await?);
        if !stream.active() {
            return Err(CameraError::AccessFailed(
                "stream has no live tracks".to_string(),
            ));
        }

        if let Err(e) = self.wait_for_first_frame(&stream).await {
            stream.stop_all();
            return Err(e);
        }

        self.preview.attach(Arc::clone(&stream));
        self.canvas.hide();
        self.stream = Some(stream);
        Ok(())
    }

    /// Wait until the stream has delivered a frame, so a capture right after
    /// `open()` has something to render.
    async fn wait_for_first_frame(&self, stream: &MediaStream) -> Result<(), CameraError> {
        let deadline = Instant::now() + self.first_frame_timeout;
        loop {
            if let Some(frame) = stream.current_frame() {
                log::debug!("First frame ready: {}", frame.resolution());
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CameraError::NoFrame);
            }
            tokio::time::sleep(FRAME_POLL_INTERVAL).await;
        }
    }

    /// Render the current frame and encode it as PNG.
    ///
    /// The camera stays active, so this can be called repeatedly.
    pub fn capture(&mut self) -> Option<CapturedPhoto> {
        log::info!("Capturing photo...");
        match self.try_capture() {
            Ok(photo) => {
                log::info!("Photo captured: {}", photo.resolution());
                log::info!("Data URL length: {} characters", photo.data_url().len());
                log::debug!(
                    "Data URL: {}...",
                    &photo.data_url()[..photo.data_url().len().min(100)]
                );
                log::info!(
                    "Blob: {} bytes, type {}",
                    photo.blob().size(),
                    photo.blob().mime_type()
                );
                self.status.show_status("Photo captured!", Severity::Success);
                Some(photo)
            }
            Err(e) => {
                log::error!("Failed to capture photo: {}", e);
                self.status
                    .show_status(&format!("Failed to capture photo: {}", e), Severity::Error);
                None
            }
        }
    }

    fn try_capture(&mut self) -> Result<CapturedPhoto, CameraError> {
        if self.stream.is_none() {
            return Err(CameraError::NoActiveStream);
        }

        let frame = self.preview.current_frame().ok_or(CameraError::NoFrame)?;
        let resolution = frame.resolution();
        log::debug!("Video dimensions: {}", resolution);

        self.canvas.resize(resolution);
        self.canvas.draw_frame(&frame)?;
        self.canvas.show();

        let png = self.canvas.to_png()?;
        Ok(CapturedPhoto::from_png(resolution, png))
    }

    /// Stop the camera. Safe to call when already idle.
    pub fn close(&mut self) {
        log::info!("Closing camera...");
        let stopped = self.release();
        log::info!("Camera closed ({} track(s) stopped)", stopped);
        self.status.show_status("Camera closed", Severity::Info);
    }

    /// Stop every track, detach the preview and drop ownership.
    fn release(&mut self) -> usize {
        let stopped = self.stream.take().map(|s| s.stop_all()).unwrap_or(0);
        if let Some(source) = self.preview.detach() {
            // A preview stream not owned by us still gets released
            if source.active() {
                source.stop_all();
            }
        }
        stopped
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        if self.stream.is_some() {
            let stopped = self.release();
            log::info!("Camera released on teardown ({} track(s) stopped)", stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::device::{MediaStreamTrack, SimulatedOutcome, TestPatternDevices};
    use crate::camera::types::{CameraInfo, Frame, FrameFormat, MediaError, TrackKind};
    use crate::status::StatusBoard;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Camera whose frames only arrive after a number of polls.
    struct WarmingUpDevices {
        polls_before_frame: usize,
        issued: std::sync::Mutex<Vec<Arc<WarmingUpTrack>>>,
    }

    struct WarmingUpTrack {
        remaining: AtomicUsize,
        live: AtomicBool,
    }

    impl MediaStreamTrack for WarmingUpTrack {
        fn kind(&self) -> TrackKind {
            TrackKind::Video
        }

        fn label(&self) -> String {
            "warming up".to_string()
        }

        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }

        fn stop(&self) {
            self.live.store(false, Ordering::SeqCst);
        }

        fn latest_frame(&self) -> Option<Frame> {
            if !self.is_live() {
                return None;
            }
            let remaining = self.remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.remaining.store(remaining - 1, Ordering::SeqCst);
                return None;
            }
            Some(Frame {
                data: vec![128; 4 * 2 * 3],
                width: 4,
                height: 2,
                format: FrameFormat::Rgb,
                timestamp: std::time::Instant::now(),
            })
        }
    }

    #[async_trait]
    impl MediaDevices for WarmingUpDevices {
        async fn get_user_media(
            &self,
            _constraints: &MediaStreamConstraints,
        ) -> Result<MediaStream, MediaError> {
            let track = Arc::new(WarmingUpTrack {
                remaining: AtomicUsize::new(self.polls_before_frame),
                live: AtomicBool::new(true),
            });
            self.issued.lock().unwrap().push(Arc::clone(&track));
            let track: Arc<dyn MediaStreamTrack> = track;
            Ok(MediaStream::new(vec![track]))
        }

        fn enumerate_devices(&self) -> Result<Vec<CameraInfo>, MediaError> {
            Ok(Vec::new())
        }
    }

    fn warming_up(polls_before_frame: usize) -> Arc<WarmingUpDevices> {
        Arc::new(WarmingUpDevices {
            polls_before_frame,
            issued: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn controller(devices: TestPatternDevices) -> (CameraController, Arc<StatusBoard>) {
        let board = Arc::new(StatusBoard::new());
        let controller = CameraController::new(Arc::new(devices), board.clone());
        (controller, board)
    }

    #[tokio::test]
    async fn test_capture_right_after_open_waits_for_first_frame() {
        let board = Arc::new(StatusBoard::new());
        let mut camera = CameraController::new(warming_up(5), board.clone());

        assert!(camera.open().await);
        let photo = camera.capture().unwrap();
        assert_eq!(photo.width(), 4);
        assert_eq!(photo.height(), 2);
    }

    #[tokio::test]
    async fn test_open_fails_when_no_frame_arrives() {
        let devices = warming_up(usize::MAX);
        let board = Arc::new(StatusBoard::new());
        let mut camera = CameraController::new(devices.clone(), board.clone())
            .with_first_frame_timeout(Duration::from_millis(50));

        assert!(!camera.open().await);
        assert_eq!(camera.state(), CameraState::Idle);
        assert_eq!(board.latest().unwrap().severity, Severity::Error);
        assert!(devices.issued.lock().unwrap().iter().all(|t| !t.is_live()));
    }

    #[tokio::test]
    async fn test_open_transitions_to_active() {
        let (mut camera, board) = controller(TestPatternDevices::new());
        assert_eq!(camera.state(), CameraState::Idle);

        assert!(camera.open().await);
        assert_eq!(camera.state(), CameraState::Active);
        assert!(camera.preview().is_attached());
        assert_eq!(board.latest().unwrap().severity, Severity::Success);
    }

    #[tokio::test]
    async fn test_second_open_is_rejected() {
        let (mut camera, board) = controller(TestPatternDevices::new());
        assert!(camera.open().await);
        let stream_id = camera.stream().unwrap().id();

        assert!(!camera.open().await);
        assert_eq!(camera.stream().unwrap().id(), stream_id);
        assert_eq!(board.latest().unwrap().severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_unsupported_host_fails_fast() {
        let board = Arc::new(StatusBoard::new());
        let mut camera = CameraController::unsupported(board.clone());

        assert!(!camera.open().await);
        assert_eq!(camera.state(), CameraState::Idle);
        let status = board.latest().unwrap();
        assert_eq!(status.severity, Severity::Error);
        assert!(status.message.contains("not supported"));
    }

    #[tokio::test]
    async fn test_busy_camera_message() {
        let (mut camera, board) = controller(TestPatternDevices::with_outcome(
            SimulatedOutcome::Busy,
        ));
        assert!(!camera.open().await);
        assert!(board.latest().unwrap().message.contains("another application"));
    }

    #[tokio::test]
    async fn test_capture_keeps_camera_active() {
        let (mut camera, _board) = controller(TestPatternDevices::new());
        camera.open().await;

        let first = camera.capture().unwrap();
        let second = camera.capture().unwrap();
        assert_eq!(first.resolution(), second.resolution());
        assert!(camera.is_active());
        assert!(camera.canvas().is_visible());
    }

    #[tokio::test]
    async fn test_open_hides_previous_photo() {
        let (mut camera, _board) = controller(TestPatternDevices::new());
        camera.open().await;
        camera.capture().unwrap();
        camera.close();

        camera.open().await;
        assert!(!camera.canvas().is_visible());
    }

    #[test]
    fn test_close_when_idle_reports_info() {
        let board = Arc::new(StatusBoard::new());
        let mut camera = CameraController::new(Arc::new(TestPatternDevices::new()), board.clone());
        camera.close();
        camera.close();
        assert_eq!(board.len(), 2);
        assert_eq!(board.latest().unwrap().severity, Severity::Info);
    }
}
