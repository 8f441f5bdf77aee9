//! Media backends: stream acquisition and device enumeration.
//!
//! A [`MediaDevices`] backend turns [`MediaStreamConstraints`] into a
//! [`MediaStream`] made of live tracks. The default backend is
//! [`TestPatternDevices`], which renders a deterministic moving pattern and can
//! simulate the failures a real camera produces. The `native-camera` feature
//! adds a hardware backend.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;

use super::types::{
    CameraInfo, Frame, FrameFormat, MediaError, MediaStreamConstraints, Resolution, TrackKind,
};

/// Source of camera streams.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Ask for a stream matching `constraints`. May prompt for permission.
    async fn get_user_media(
        &self,
        constraints: &MediaStreamConstraints,
    ) -> Result<MediaStream, MediaError>;

    /// List available camera devices.
    fn enumerate_devices(&self) -> Result<Vec<CameraInfo>, MediaError>;
}

/// One live media track.
pub trait MediaStreamTrack: Send + Sync {
    fn kind(&self) -> TrackKind;
    fn label(&self) -> String;
    fn is_live(&self) -> bool;
    /// Release the underlying device. Stopping twice is harmless.
    fn stop(&self);
    /// Most recent frame, `None` once stopped or before the first frame arrives.
    fn latest_frame(&self) -> Option<Frame>;
}

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// A set of tracks acquired together.
pub struct MediaStream {
    id: u64,
    tracks: Vec<Arc<dyn MediaStreamTrack>>,
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .field("active", &self.active())
            .finish()
    }
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn MediaStreamTrack>>) -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            tracks,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaStreamTrack>] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Arc<dyn MediaStreamTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    /// Number of tracks that have not been stopped.
    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn active(&self) -> bool {
        self.live_track_count() > 0
    }

    /// Latest frame of the first live video track.
    pub fn current_frame(&self) -> Option<Frame> {
        self.video_tracks()
            .filter(|t| t.is_live())
            .find_map(|t| t.latest_frame())
    }

    /// Stop every track individually. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for track in &self.tracks {
            if track.is_live() {
                track.stop();
                log::info!("Track stopped: {} ({})", track.kind(), track.label());
                stopped += 1;
            }
        }
        stopped
    }
}

/// Outcome the test-pattern backend produces when asked for a stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SimulatedOutcome {
    #[default]
    Grant,
    Deny,
    NoDevice,
    Busy,
    Fail(String),
}

/// Software camera that renders a moving gradient.
pub struct TestPatternDevices {
    outcome: SimulatedOutcome,
    /// Forced native resolution; `None` honours the ideal constraint
    resolution: Option<Resolution>,
    issued: Mutex<Vec<Arc<TestPatternTrack>>>,
}

impl Default for TestPatternDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPatternDevices {
    pub fn new() -> Self {
        Self::with_outcome(SimulatedOutcome::Grant)
    }

    pub fn with_outcome(outcome: SimulatedOutcome) -> Self {
        Self {
            outcome,
            resolution: None,
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Always deliver frames at `resolution`, whatever was requested.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Every track handed out so far.
    pub fn issued_tracks(&self) -> Vec<Arc<TestPatternTrack>> {
        self.issued.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn live_track_count(&self) -> usize {
        self.issued_tracks().iter().filter(|t| t.is_live()).count()
    }
}

#[async_trait]
impl MediaDevices for TestPatternDevices {
    async fn get_user_media(
        &self,
        constraints: &MediaStreamConstraints,
    ) -> Result<MediaStream, MediaError> {
        match &self.outcome {
            SimulatedOutcome::Grant => {}
            SimulatedOutcome::Deny => return Err(MediaError::NotAllowed),
            SimulatedOutcome::NoDevice => return Err(MediaError::NotFound),
            SimulatedOutcome::Busy => {
                return Err(MediaError::NotReadable(
                    "device held by another process".to_string(),
                ))
            }
            SimulatedOutcome::Fail(msg) => return Err(MediaError::Other(msg.clone())),
        }

        let video = constraints.video.as_ref().ok_or(MediaError::NotFound)?;
        let resolution = self.resolution.unwrap_or(video.ideal);
        if resolution.width == 0 || resolution.height == 0 {
            return Err(MediaError::Other(format!(
                "unsupported resolution {}",
                resolution
            )));
        }

        let track = Arc::new(TestPatternTrack::new(
            format!("Test pattern ({})", video.facing_mode.name()),
            resolution,
        ));
        if let Ok(mut issued) = self.issued.lock() {
            issued.push(Arc::clone(&track));
        }
        Ok(MediaStream::new(vec![track]))
    }

    fn enumerate_devices(&self) -> Result<Vec<CameraInfo>, MediaError> {
        if self.outcome == SimulatedOutcome::NoDevice {
            return Ok(Vec::new());
        }
        Ok(vec![CameraInfo {
            index: 0,
            name: "Test pattern".to_string(),
            description: "Synthetic camera".to_string(),
        }])
    }
}

/// Video track of [`TestPatternDevices`].
#[derive(Debug)]
pub struct TestPatternTrack {
    label: String,
    resolution: Resolution,
    live: AtomicBool,
    frames: AtomicU64,
}

impl TestPatternTrack {
    fn new(label: String, resolution: Resolution) -> Self {
        Self {
            label,
            resolution,
            live: AtomicBool::new(true),
            frames: AtomicU64::new(0),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn render(&self, tick: u64) -> Frame {
        let width = self.resolution.width as usize;
        let height = self.resolution.height as usize;
        let mut data = Vec::with_capacity(width * height * 3);
        let shift = (tick % 256) as usize;
        for y in 0..height {
            for x in 0..width {
                data.push(((x * 255 / width.max(1)) + shift) as u8);
                data.push((y * 255 / height.max(1)) as u8);
                data.push(((x + y + shift) % 256) as u8);
            }
        }
        Frame {
            data,
            width: self.resolution.width,
            height: self.resolution.height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        }
    }
}

impl MediaStreamTrack for TestPatternTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> String {
        self.label.clone()
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
        let tick = self.frames.fetch_add(1, Ordering::Relaxed);
        Some(self.render(tick))
    }
}
