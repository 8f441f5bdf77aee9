//! Camera module: stream acquisition, live preview and still capture.
//!
//! - Backends implement [`MediaDevices`]; [`TestPatternDevices`] is always
//!   available, `NativeDevices` with the `native-camera` feature
//! - [`CameraController`] drives the Idle/Active lifecycle
//! - [`CapturedPhoto`] holds the PNG as a data URL and a [`Blob`]

mod controller;
mod device;
mod encode;
#[cfg(feature = "native-camera")]
mod native;
mod surface;
mod types;

pub use controller::{CameraController, CameraState, FIRST_FRAME_TIMEOUT};
pub use device::{
    MediaDevices, MediaStream, MediaStreamTrack, SimulatedOutcome, TestPatternDevices,
    TestPatternTrack,
};
pub use encode::{decode_png, encode_png, parse_data_url, to_data_url, Blob, CapturedPhoto, PNG_MIME};
#[cfg(feature = "native-camera")]
pub use native::NativeDevices;
pub use surface::{Canvas, VideoPreview};
pub use types::{
    CameraError, CameraInfo, FacingMode, Frame, FrameFormat, MediaError, MediaStreamConstraints,
    Resolution, TrackKind, VideoConstraints,
};
