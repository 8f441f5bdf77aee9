//! Live preview and off-screen drawing surface.

use std::sync::Arc;

use super::device::MediaStream;
use super::encode::encode_png;
use super::types::{CameraError, Frame, FrameFormat, Resolution};

/// Displays the live stream. Holds a shared reference to the attached stream.
#[derive(Debug, Default)]
pub struct VideoPreview {
    source: Option<Arc<MediaStream>>,
}

impl VideoPreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a stream, replacing any previous one.
    pub fn attach(&mut self, stream: Arc<MediaStream>) {
        self.source = Some(stream);
    }

    pub fn detach(&mut self) -> Option<Arc<MediaStream>> {
        self.source.take()
    }

    pub fn source(&self) -> Option<&Arc<MediaStream>> {
        self.source.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    /// Current frame of the attached stream.
    pub fn current_frame(&self) -> Option<Frame> {
        self.source.as_ref()?.current_frame()
    }

    /// Natural size of the current frame, `None` without a stream or frame.
    pub fn natural_size(&self) -> Option<Resolution> {
        self.current_frame().map(|f| f.resolution())
    }
}

/// Off-screen RGB drawing surface used to render a captured frame.
#[derive(Debug, Default)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    visible: bool,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    /// Resize and clear the surface.
    pub fn resize(&mut self, resolution: Resolution) {
        self.width = resolution.width;
        self.height = resolution.height;
        self.pixels = vec![0; resolution.width as usize * resolution.height as usize * 3];
    }

    /// Copy `frame` onto the surface at the origin. Sizes must match.
    pub fn draw_frame(&mut self, frame: &Frame) -> Result<(), CameraError> {
        if frame.resolution() != self.resolution() {
            return Err(CameraError::Encode(format!(
                "frame is {} but canvas is {}",
                frame.resolution(),
                self.resolution()
            )));
        }
        if frame.data.len() != self.pixels.len() {
            return Err(CameraError::Encode(format!(
                "frame holds {} bytes, expected {}",
                frame.data.len(),
                self.pixels.len()
            )));
        }
        match frame.format {
            FrameFormat::Rgb => self.pixels.copy_from_slice(&frame.data),
        }
        Ok(())
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Encode the surface contents as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, CameraError> {
        encode_png(self.resolution(), &self.pixels)
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}
