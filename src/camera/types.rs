//! Camera types and data structures.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Information about an available camera device.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Device index for selection
    pub index: u32,
    /// Human-readable device name
    pub name: String,
    /// Device description
    pub description: String,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.description)
    }
}

/// Frame resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// VGA (640x480)
    pub const VGA: Resolution = Resolution {
        width: 640,
        height: 480,
    };

    /// HD (1280x720) - the ideal resolution requested when opening the camera
    pub const HD: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
}

impl Default for Resolution {
    fn default() -> Self {
        Self::HD
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which camera to prefer on devices with more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera
    User,
    /// Rear camera
    #[default]
    Environment,
}

impl FacingMode {
    pub fn name(&self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

/// Video part of a stream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConstraints {
    pub facing_mode: FacingMode,
    /// Preferred size; backends pick the closest they support
    pub ideal: Resolution,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            ideal: Resolution::HD,
        }
    }
}

/// What to request from the media backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamConstraints {
    pub video: Option<VideoConstraints>,
    pub audio: bool,
}

impl Default for MediaStreamConstraints {
    /// Video only, rear camera, 1280x720.
    fn default() -> Self {
        Self {
            video: Some(VideoConstraints::default()),
            audio: false,
        }
    }
}

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// Pixel format of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// RGB format (3 bytes per pixel)
    Rgb,
}

/// A single video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data in RGB format
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Get the number of bytes per pixel (3 for RGB).
    pub fn bytes_per_pixel(&self) -> usize {
        match self.format {
            FrameFormat::Rgb => 3,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }
}

/// Failures reported by a media backend while acquiring a stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// The user or the OS refused camera access
    #[error("permission to use the camera was denied")]
    NotAllowed,

    /// No device satisfies the request
    #[error("no camera device found")]
    NotFound,

    /// The device exists but cannot be read, usually because another process holds it
    #[error("camera could not be read: {0}")]
    NotReadable(String),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the camera controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("camera access is not supported in this environment")]
    Unsupported,

    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera found on this device")]
    NoDevice,

    #[error("camera is in use by another application")]
    DeviceBusy,

    #[error("camera access failed: {0}")]
    AccessFailed(String),

    #[error("camera is already open")]
    AlreadyActive,

    #[error("no active camera stream")]
    NoActiveStream,

    #[error("no video frame available")]
    NoFrame,

    #[error("failed to encode photo: {0}")]
    Encode(String),
}

impl From<MediaError> for CameraError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotAllowed => CameraError::PermissionDenied,
            MediaError::NotFound => CameraError::NoDevice,
            MediaError::NotReadable(_) => CameraError::DeviceBusy,
            MediaError::Other(msg) => CameraError::AccessFailed(msg),
        }
    }
}

impl CameraError {
    /// Message shown to the user when `open()` fails.
    pub fn open_message(&self) -> String {
        match self {
            CameraError::PermissionDenied => {
                "Permission denied. Please allow access to the camera.".to_string()
            }
            CameraError::NoDevice => "No camera was found on this device.".to_string(),
            CameraError::DeviceBusy => "The camera is being used by another application.".to_string(),
            CameraError::Unsupported => {
                "Camera access is not supported in this environment.".to_string()
            }
            CameraError::AlreadyActive => "The camera is already open.".to_string(),
            _ => "Camera access failed.".to_string(),
        }
    }
}
