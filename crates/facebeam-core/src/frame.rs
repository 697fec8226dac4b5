//! Frame type and the capture/display contracts around the recognition loop.

use crate::recognition::FrameReport;
use std::path::Path;
use thiserror::Error;

/// A decoded RGB8 video frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid RGB length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame source failed: {0}")]
    Source(String),
}

impl Frame {
    pub const CHANNELS: usize = 3;

    /// Wrap raw RGB8 bytes, validating the buffer length.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * Self::CHANNELS;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Decode any image format supported by the `image` crate.
    pub fn open(path: &Path, sequence: u32) -> Result<Self, FrameError> {
        let img = image::open(path).map_err(|source| FrameError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Self {
            data: rgb.into_raw(),
            width,
            height,
            sequence,
        })
    }

    /// Per-pixel luma (BT.601 integer approximation).
    pub fn luma(&self) -> impl Iterator<Item = u8> + '_ {
        self.data.chunks_exact(Self::CHANNELS).map(|px| {
            let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
            ((299 * r + 587 * g + 114 * b) / 1000) as u8
        })
    }

    /// Average luma brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let pixels = self.data.len() / Self::CHANNELS;
        if pixels == 0 {
            return 0.0;
        }
        self.luma().map(|y| y as f32).sum::<f32>() / pixels as f32
    }

    /// True if more than `threshold_pct` of pixels fall in the darkest bucket (0–31).
    pub fn is_dark(&self, threshold_pct: f32) -> bool {
        let pixels = self.data.len() / Self::CHANNELS;
        if pixels == 0 {
            return true;
        }
        let dark = self.luma().filter(|&y| y < 32).count();
        (dark as f32 / pixels as f32) > threshold_pct
    }
}

/// Supplies frames to the recognition loop.
///
/// `Ok(None)` means the stream ended. An error means the frame could not be
/// acquired; the loop treats both as terminal.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameError>;
}

/// Whether the loop should keep going after a frame was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Quit,
}

/// Receives each processed frame together with its annotations.
pub trait FrameSink {
    fn present(&mut self, frame: &Frame, report: &FrameReport) -> SinkControl;
}
