//! Display sinks.

use facebeam_core::recognition::FrameReport;
use facebeam_core::{Frame, FrameSink, SinkControl};

/// Renders frame reports to the log instead of a window.
///
/// The banner is logged when it changes; per-face annotations go to `debug`.
#[derive(Debug, Default)]
pub struct LogSink {
    last_banner: Option<String>,
    presented: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn last_banner(&self) -> Option<&str> {
        self.last_banner.as_deref()
    }
}

impl FrameSink for LogSink {
    fn present(&mut self, frame: &Frame, report: &FrameReport) -> SinkControl {
        self.presented += 1;

        if self.last_banner.as_deref() != Some(report.banner.as_str()) {
            tracing::info!(seq = frame.sequence, banner = %report.banner, "display");
            self.last_banner = Some(report.banner.clone());
        }

        for a in &report.annotations {
            tracing::debug!(
                seq = frame.sequence,
                label = %a.label,
                x = a.bbox.x,
                y = a.bbox.y,
                w = a.bbox.width,
                h = a.bbox.height,
                "face"
            );
        }

        SinkControl::Continue
    }
}
