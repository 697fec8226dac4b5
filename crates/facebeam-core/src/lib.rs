//! facebeam-core — Attendance marking engine.
//!
//! Matches detected faces against a gallery of known students, resolves the
//! class currently in session from a weekly timetable, and credits each
//! student at most once per class session.

pub mod embedder;
pub mod frame;
pub mod gallery;
pub mod ledger;
pub mod recognition;
pub mod schedule;
pub mod store;
pub mod types;

pub use embedder::{EmbedderError, FaceEmbedder};
pub use frame::{Frame, FrameError, FrameSink, FrameSource, SinkControl};
pub use gallery::{Gallery, SkipReason, SkippedPhoto};
pub use ledger::{RecurrencePolicy, SessionLedger, SharedLedger};
pub use recognition::{FrameReport, LoopConfig, LoopEnd, LoopState, LoopStats, LoopSummary, RecognitionLoop};
pub use schedule::{ActiveSession, Clock, ScheduledSlot, SubjectId, SystemClock, Timetable};
pub use store::{AttendanceRecord, AttendanceStore, StoreError};
pub use types::{
    BoundingBox, DetectedFace, Embedding, EuclideanMatcher, Identity, MatchResult, Matcher,
    DEFAULT_MATCH_THRESHOLD,
};
