//! Frame replay from a directory of image files.

use facebeam_core::{Frame, FrameError, FrameSource};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const FRAME_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "tiff"];

/// Share of pixels in the darkest bucket above which a frame is dropped.
const DARK_FRAME_PCT: f32 = 0.95;

/// Replays the image files of a directory, in file-name order, as a video
/// stream. Fully dark frames are skipped.
pub struct DirectoryFrameSource {
    queue: VecDeque<PathBuf>,
    interval: Duration,
    last_emit: Option<Instant>,
    sequence: u32,
    dark_skipped: usize,
}

impl DirectoryFrameSource {
    /// List the frames in `dir`. `interval` paces delivery (zero = as fast as possible).
    pub fn open(dir: &Path, interval: Duration) -> Result<Self, FrameError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| FrameError::Source(format!("{}: {e}", dir.display())))?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_frame_extension(path))
            .collect();
        frames.sort();

        tracing::info!(dir = %dir.display(), frames = frames.len(), "frame directory opened");

        Ok(Self {
            queue: frames.into(),
            interval,
            last_emit: None,
            sequence: 0,
            dark_skipped: 0,
        })
    }

    pub fn dark_skipped(&self) -> usize {
        self.dark_skipped
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_emit {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        while let Some(path) = self.queue.pop_front() {
            let frame = Frame::open(&path, self.sequence)?;
            self.sequence += 1;

            if frame.is_dark(DARK_FRAME_PCT) {
                self.dark_skipped += 1;
                tracing::debug!(
                    seq = frame.sequence,
                    path = %path.display(),
                    brightness = frame.avg_brightness(),
                    "skipping dark frame"
                );
                continue;
            }

            self.pace();
            return Ok(Some(frame));
        }
        tracing::info!(frames = self.sequence, dark_skipped = self.dark_skipped(), "frame directory exhausted");
        Ok(None)
    }
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
