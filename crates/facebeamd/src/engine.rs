use facebeam_core::recognition::{LoopConfig, LoopEnd, LoopState};
use facebeam_core::{
    AttendanceStore, FaceEmbedder, Frame, FrameReport, FrameSink, FrameSource, Gallery,
    LoopSummary, RecognitionLoop, SharedLedger, SinkControl, SystemClock, Timetable,
};
use facebeam_io::LogSink;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine thread exited without a summary")]
    ChannelClosed,
}

/// Snapshot published after every frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub banner: String,
    pub subject_id: Option<i64>,
    pub session: Option<String>,
    pub identities: usize,
    pub last_frame: Option<u32>,
    pub frames: u64,
    pub faces: u64,
    pub credits_written: u64,
    pub roster_gaps: u64,
    pub store_failures: u64,
    pub reconciled: u64,
    pub pending: usize,
    /// Why the loop ended, once it has.
    pub end: Option<String>,
}

/// Log sink that also publishes an [`EngineStatus`] for each frame.
struct StatusSink {
    inner: LogSink,
    tx: watch::Sender<EngineStatus>,
}

impl FrameSink for StatusSink {
    fn present(&mut self, frame: &Frame, report: &FrameReport) -> SinkControl {
        let control = self.inner.present(frame, report);
        self.tx.send_modify(|status| {
            status.banner = report.banner.clone();
            status.subject_id = report.state.subject_id();
            status.session = match &report.state {
                LoopState::Active(s) => Some(s.to_string()),
                LoopState::Idle => None,
            };
            status.last_frame = Some(frame.sequence);
            status.frames = report.stats.frames;
            status.faces = report.stats.faces;
            status.credits_written = report.stats.credits_written;
            status.roster_gaps = report.stats.roster_gaps;
            status.store_failures = report.stats.store_failures;
            status.reconciled = report.stats.reconciled;
            status.pending = report.stats.pending;
        });
        control
    }
}

fn end_label(end: &LoopEnd) -> String {
    match end {
        LoopEnd::SourceExhausted => "frame source exhausted".into(),
        LoopEnd::SourceFailed(e) => format!("frame source failed: {e}"),
        LoopEnd::EmbedderExited => "face embedder exited".into(),
        LoopEnd::Quit => "quit".into(),
        LoopEnd::Stopped => "stopped".into(),
    }
}

/// Handle to the engine thread.
pub struct EngineHandle {
    status: watch::Receiver<EngineStatus>,
    ledger: SharedLedger,
    stop: Arc<AtomicBool>,
    done: oneshot::Receiver<LoopSummary>,
}

impl EngineHandle {
    pub fn status(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    /// Ask the loop to stop after the frame in progress.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Wait for the loop to finish.
    pub async fn wait(&mut self) -> Result<LoopSummary, EngineError> {
        (&mut self.done).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the recognition loop on a dedicated OS thread.
///
/// Everything that can fail at startup (store, gallery, frame source,
/// embedder) is opened by the caller beforehand.
pub fn spawn_engine<S, F, E>(
    store: S,
    gallery: Gallery,
    timetable: Timetable,
    mut source: F,
    mut embedder: E,
    config: LoopConfig,
) -> EngineHandle
where
    S: AttendanceStore + Send + 'static,
    F: FrameSource + Send + 'static,
    E: FaceEmbedder + Send + 'static,
{
    let identities = gallery.len();
    let mut recognition = RecognitionLoop::new(gallery, timetable, store, SystemClock, config);
    let ledger = recognition.ledger().clone();

    let (status_tx, status_rx) = watch::channel(EngineStatus {
        running: true,
        banner: LoopState::Idle.banner(),
        identities,
        ..Default::default()
    });
    let (done_tx, done_rx) = oneshot::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    std::thread::Builder::new()
        .name("facebeam-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut sink = StatusSink {
                inner: LogSink::new(),
                tx: status_tx,
            };

            let summary = recognition.run(&mut source, &mut embedder, &mut sink, &stop_flag);

            sink.tx.send_modify(|status| {
                status.running = false;
                status.end = Some(end_label(&summary.end));
            });
            let _ = done_tx.send(summary);
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle {
        status: status_rx,
        ledger,
        stop,
        done: done_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facebeam_core::{
        AttendanceRecord, DetectedFace, EmbedderError, FrameError, StoreError,
    };

    struct NoStore;

    impl AttendanceStore for NoStore {
        fn lookup_student_db_id(&self, _name: &str) -> Result<Option<i64>, StoreError> {
            Ok(None)
        }

        fn insert_attendance(&self, _record: &AttendanceRecord) -> Result<(), StoreError> {
            Ok(())
        }
    }

    /// Yields `remaining` blank frames, or forever when `None`.
    struct BlankFrames {
        remaining: Option<u32>,
        seq: u32,
    }

    impl FrameSource for BlankFrames {
        fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
            if let Some(n) = self.remaining.as_mut() {
                if *n == 0 {
                    return Ok(None);
                }
                *n -= 1;
            }
            self.seq += 1;
            Frame::from_rgb(vec![0; 3], 1, 1, self.seq).map(Some)
        }
    }

    struct NoFaces;

    impl FaceEmbedder for NoFaces {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectedFace>, EmbedderError> {
            Ok(Vec::new())
        }
    }

    struct DeadEmbedder;

    impl FaceEmbedder for DeadEmbedder {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectedFace>, EmbedderError> {
            Err(EmbedderError::Exited)
        }
    }

    fn spawn(remaining: Option<u32>) -> EngineHandle {
        spawn_engine(
            NoStore,
            Gallery::default(),
            Timetable::default(),
            BlankFrames { remaining, seq: 0 },
            NoFaces,
            LoopConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_engine_runs_source_to_end() {
        let mut engine = spawn(Some(3));
        let summary = engine.wait().await.unwrap();
        assert_eq!(summary.end, LoopEnd::SourceExhausted);
        assert_eq!(summary.stats.frames, 3);

        let status = engine.status().borrow().clone();
        assert!(!status.running);
        assert_eq!(status.frames, 3);
        assert_eq!(status.last_frame, Some(3));
        assert_eq!(status.banner, "No Scheduled Class");
        assert_eq!(status.end.as_deref(), Some("frame source exhausted"));
    }

    #[tokio::test]
    async fn test_engine_ends_when_embedder_exits() {
        let mut engine = spawn_engine(
            NoStore,
            Gallery::default(),
            Timetable::default(),
            BlankFrames { remaining: None, seq: 0 },
            DeadEmbedder,
            LoopConfig::default(),
        );
        let summary = engine.wait().await.unwrap();
        assert_eq!(summary.end, LoopEnd::EmbedderExited);
        assert_eq!(summary.stats.frames, 0);

        let status = engine.status().borrow().clone();
        assert!(!status.running);
        assert_eq!(status.end.as_deref(), Some("face embedder exited"));
    }

    #[tokio::test]
    async fn test_engine_stops_on_request() {
        let mut engine = spawn(None);
        engine.stop();
        let summary = engine.wait().await.unwrap();
        assert_eq!(summary.end, LoopEnd::Stopped);
        assert!(engine.ledger().credited(1).is_empty());
    }
}
