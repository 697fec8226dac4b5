//! Recognition loop: per frame, match faces against the gallery and credit
//! recognised students for the subject in session.
//!
//! The loop is either Idle (no class scheduled) or Active for one concrete
//! session. The state is recomputed from the clock on every frame with no
//! hysteresis. Crediting goes through the [`SessionLedger`] first, so each
//! student is written at most once per session no matter how many frames
//! they appear in.
//!
//! [`decide`] holds the per-frame decision logic and performs no I/O;
//! [`RecognitionLoop::process`] wraps it with schedule lookup and store
//! writes; [`RecognitionLoop::run`] drives frames from a source to a sink.

use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::frame::{FrameSink, FrameSource, SinkControl};
use crate::gallery::Gallery;
use crate::ledger::{RecurrencePolicy, SessionLedger, SharedLedger};
use crate::schedule::{ActiveSession, Clock, SubjectId, Timetable};
use crate::store::{AttendanceRecord, AttendanceStore};
use crate::types::{BoundingBox, DetectedFace, EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
use chrono::{Duration, NaiveDateTime};
use std::sync::atomic::{AtomicBool, Ordering};

pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Active(ActiveSession),
}

impl LoopState {
    pub fn session(&self) -> Option<&ActiveSession> {
        match self {
            LoopState::Idle => None,
            LoopState::Active(session) => Some(session),
        }
    }

    pub fn subject_id(&self) -> Option<SubjectId> {
        self.session().map(|s| s.subject_id)
    }

    /// Status line shown over the frame.
    pub fn banner(&self) -> String {
        match self {
            LoopState::Idle => "No Scheduled Class".to_string(),
            LoopState::Active(s) => format!("Class In Session (Subject ID: {})", s.subject_id),
        }
    }
}

/// What the loop decided for one detected face.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceAction {
    /// Newly credited; must be persisted.
    Credit { subject_id: SubjectId, name: String },
    /// Recognised, but already credited in this session.
    AlreadyCredited { subject_id: SubjectId, name: String },
    /// Recognised while no class is in session.
    OutsideSession { name: String },
    /// Nearest identity is too far away.
    Unrecognized,
    /// The face could not be encoded; skipped.
    NotEncoded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceDecision {
    pub bbox: BoundingBox,
    /// Matched name or [`UNKNOWN_LABEL`].
    pub label: String,
    /// Distance to the nearest identity, when the face was encoded.
    pub distance: Option<f32>,
    pub action: FaceAction,
}

/// Decide what to do with each face of one frame.
///
/// The only side effect is the ledger's check-and-set for recognised faces
/// while a session is active.
pub fn decide(
    faces: &[DetectedFace],
    gallery: &Gallery,
    matcher: &dyn Matcher,
    threshold: f32,
    session: Option<&ActiveSession>,
    ledger: &mut SessionLedger,
) -> Vec<FaceDecision> {
    faces
        .iter()
        .map(|face| {
            let Some(embedding) = &face.embedding else {
                return FaceDecision {
                    bbox: face.bbox,
                    label: UNKNOWN_LABEL.to_string(),
                    distance: None,
                    action: FaceAction::NotEncoded,
                };
            };

            let result = gallery.compare(matcher, embedding, threshold);
            let Some(name) = result.name else {
                return FaceDecision {
                    bbox: face.bbox,
                    label: UNKNOWN_LABEL.to_string(),
                    distance: Some(result.distance),
                    action: FaceAction::Unrecognized,
                };
            };

            let action = match session {
                None => FaceAction::OutsideSession { name: name.clone() },
                Some(s) if ledger.credit_if_new(s.subject_id, &name) => FaceAction::Credit {
                    subject_id: s.subject_id,
                    name: name.clone(),
                },
                Some(s) => FaceAction::AlreadyCredited {
                    subject_id: s.subject_id,
                    name: name.clone(),
                },
            };

            FaceDecision {
                bbox: face.bbox,
                label: name,
                distance: Some(result.distance),
                action,
            }
        })
        .collect()
}

/// Result of persisting one credit.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    Written,
    /// Recognised by face but missing from the roster table.
    RosterGap,
    StoreFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditOutcome {
    pub name: String,
    pub subject_id: SubjectId,
    pub outcome: PersistOutcome,
}

/// A face region with the label to draw on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub faces: u64,
    pub credits_written: u64,
    pub roster_gaps: u64,
    pub store_failures: u64,
    /// Failed writes that succeeded on a later retry.
    pub reconciled: u64,
    /// Failed writes waiting for a retry.
    pub pending: usize,
}

/// Everything the loop decided for one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub state: LoopState,
    pub banner: String,
    pub annotations: Vec<Annotation>,
    pub decisions: Vec<FaceDecision>,
    pub credits: Vec<CreditOutcome>,
    pub stats: LoopStats,
}

/// Why [`RecognitionLoop::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEnd {
    SourceExhausted,
    SourceFailed(String),
    /// The embedder is gone; no further frame can be analysed.
    EmbedderExited,
    Quit,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct LoopSummary {
    pub stats: LoopStats,
    pub end: LoopEnd,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Maximum Euclidean distance (exclusive) for a match.
    pub threshold: f32,
    pub policy: RecurrencePolicy,
    /// Retry failed writes no more often than this. `None` never retries.
    pub reconcile_interval: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            policy: RecurrencePolicy::default(),
            reconcile_interval: None,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingCredit {
    name: String,
    subject_id: SubjectId,
    timestamp: NaiveDateTime,
}

pub struct RecognitionLoop<S, C> {
    gallery: Gallery,
    timetable: Timetable,
    ledger: SharedLedger,
    store: S,
    clock: C,
    matcher: EuclideanMatcher,
    config: LoopConfig,
    state: LoopState,
    pending: Vec<PendingCredit>,
    last_reconcile: Option<NaiveDateTime>,
    stats: LoopStats,
}

impl<S: AttendanceStore, C: Clock> RecognitionLoop<S, C> {
    pub fn new(gallery: Gallery, timetable: Timetable, store: S, clock: C, config: LoopConfig) -> Self {
        Self {
            gallery,
            timetable,
            ledger: SharedLedger::new(config.policy),
            store,
            clock,
            matcher: EuclideanMatcher,
            config,
            state: LoopState::Idle,
            pending: Vec::new(),
            last_reconcile: None,
            stats: LoopStats::default(),
        }
    }

    /// Handle to the ledger; clones observe the loop's credits live.
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Process the faces of one frame.
    pub fn process(&mut self, faces: &[DetectedFace]) -> FrameReport {
        let now = self.clock.now();
        self.transition(self.timetable.current_session(now));

        if let LoopState::Active(session) = &self.state {
            self.ledger.enter_session(session);
        }

        self.reconcile(now);

        let decisions = {
            let mut ledger = self.ledger.lock();
            decide(
                faces,
                &self.gallery,
                &self.matcher,
                self.config.threshold,
                self.state.session(),
                &mut ledger,
            )
        };

        let mut credits = Vec::new();
        for decision in &decisions {
            match &decision.action {
                FaceAction::Credit { subject_id, name } => {
                    credits.push(self.persist(name, *subject_id, now));
                }
                FaceAction::OutsideSession { name } => {
                    tracing::trace!(name = %name, "recognised outside a scheduled class");
                }
                _ => {}
            }
        }

        self.stats.frames += 1;
        self.stats.faces += faces.len() as u64;
        self.stats.pending = self.pending.len();

        FrameReport {
            state: self.state,
            banner: self.state.banner(),
            annotations: decisions
                .iter()
                .map(|d| Annotation {
                    bbox: d.bbox,
                    label: d.label.clone(),
                })
                .collect(),
            decisions,
            credits,
            stats: self.stats,
        }
    }

    /// Drive frames until the source ends or fails, the embedder exits, the
    /// sink quits, or `stop` is raised.
    ///
    /// Any other detection failure drops that frame's faces but keeps the
    /// loop going.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        embedder: &mut dyn FaceEmbedder,
        sink: &mut dyn FrameSink,
        stop: &AtomicBool,
    ) -> LoopSummary {
        tracing::info!(identities = self.gallery.len(), "recognition loop started");

        let end = loop {
            if stop.load(Ordering::Relaxed) {
                break LoopEnd::Stopped;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break LoopEnd::SourceExhausted,
                Err(e) => {
                    tracing::warn!(error = %e, "frame acquisition failed; stopping");
                    break LoopEnd::SourceFailed(e.to_string());
                }
            };

            let faces = match embedder.detect(&frame) {
                Ok(faces) => faces,
                Err(EmbedderError::Exited) => {
                    tracing::error!(seq = frame.sequence, "face embedder exited; stopping");
                    break LoopEnd::EmbedderExited;
                }
                Err(e) => {
                    tracing::warn!(seq = frame.sequence, error = %e, "face detection failed; frame skipped");
                    Vec::new()
                }
            };

            let report = self.process(&faces);
            if sink.present(&frame, &report) == SinkControl::Quit {
                break LoopEnd::Quit;
            }
        };

        tracing::info!(
            frames = self.stats.frames,
            credits = self.stats.credits_written,
            roster_gaps = self.stats.roster_gaps,
            store_failures = self.stats.store_failures,
            pending = self.pending.len(),
            end = ?end,
            "recognition loop finished"
        );

        LoopSummary {
            stats: self.stats,
            end,
        }
    }

    fn transition(&mut self, session: Option<ActiveSession>) {
        let next = match session {
            Some(s) => LoopState::Active(s),
            None => LoopState::Idle,
        };
        if next == self.state {
            return;
        }
        match &next {
            LoopState::Active(s) => tracing::info!(session = %s, "class in session"),
            LoopState::Idle => tracing::info!("no scheduled class"),
        }
        self.state = next;
    }

    fn persist(&mut self, name: &str, subject_id: SubjectId, timestamp: NaiveDateTime) -> CreditOutcome {
        let outcome = self.write_credit(name, subject_id, timestamp);
        match &outcome {
            PersistOutcome::Written => {
                self.stats.credits_written += 1;
                tracing::info!(name = %name, subject_id, "attendance logged");
            }
            PersistOutcome::RosterGap => {
                self.stats.roster_gaps += 1;
                tracing::warn!(name = %name, subject_id, "recognised student is not in the roster; attendance not saved");
            }
            PersistOutcome::StoreFailed(e) => {
                self.stats.store_failures += 1;
                tracing::error!(name = %name, subject_id, error = %e, "attendance write failed");
                if self.config.reconcile_interval.is_some() {
                    self.pending.push(PendingCredit {
                        name: name.to_string(),
                        subject_id,
                        timestamp,
                    });
                }
            }
        }
        CreditOutcome {
            name: name.to_string(),
            subject_id,
            outcome,
        }
    }

    fn write_credit(&self, name: &str, subject_id: SubjectId, timestamp: NaiveDateTime) -> PersistOutcome {
        let student_db_id = match self.store.lookup_student_db_id(name) {
            Ok(Some(id)) => id,
            Ok(None) => return PersistOutcome::RosterGap,
            Err(e) => return PersistOutcome::StoreFailed(e.to_string()),
        };
        let record = AttendanceRecord {
            student_name: name.to_string(),
            subject_id,
            student_db_id,
            timestamp,
        };
        match self.store.insert_attendance(&record) {
            Ok(()) => PersistOutcome::Written,
            Err(e) => PersistOutcome::StoreFailed(e.to_string()),
        }
    }

    /// Retry failed writes once the reconcile interval has elapsed.
    fn reconcile(&mut self, now: NaiveDateTime) {
        let Some(interval) = self.config.reconcile_interval else {
            return;
        };
        if self.pending.is_empty() {
            return;
        }
        if let Some(last) = self.last_reconcile {
            if now - last < interval {
                return;
            }
        }
        self.last_reconcile = Some(now);

        let pending = std::mem::take(&mut self.pending);
        for credit in pending {
            match self.write_credit(&credit.name, credit.subject_id, credit.timestamp) {
                PersistOutcome::Written => {
                    self.stats.credits_written += 1;
                    self.stats.reconciled += 1;
                    tracing::info!(name = %credit.name, subject_id = credit.subject_id, "attendance write reconciled");
                }
                PersistOutcome::RosterGap => {
                    self.stats.roster_gaps += 1;
                    tracing::warn!(name = %credit.name, "student left the roster before reconciliation; dropped");
                }
                PersistOutcome::StoreFailed(e) => {
                    tracing::debug!(name = %credit.name, error = %e, "reconciliation failed; will retry");
                    self.pending.push(credit);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameError};
    use crate::schedule::ScheduledSlot;
    use crate::store::StoreError;
    use crate::types::{Embedding, Identity};
    use chrono::{NaiveDate, NaiveTime};
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;

    #[derive(Default)]
    struct MemoryStore {
        roster: HashMap<String, i64>,
        records: RefCell<Vec<AttendanceRecord>>,
        failing: Cell<bool>,
        failing_lookup: Cell<bool>,
    }

    impl MemoryStore {
        fn with_roster(names: &[&str]) -> Self {
            Self {
                roster: names
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (n.to_string(), i as i64 + 1))
                    .collect(),
                ..Default::default()
            }
        }

        fn count(&self) -> usize {
            self.records.borrow().len()
        }
    }

    impl AttendanceStore for MemoryStore {
        fn lookup_student_db_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
            if self.failing_lookup.get() {
                return Err(StoreError::Backend("database is locked".into()));
            }
            Ok(self.roster.get(name).copied())
        }

        fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
            if self.failing.get() {
                return Err(StoreError::Backend("database is locked".into()));
            }
            self.records.borrow_mut().push(record.clone());
            Ok(())
        }
    }

    #[derive(Clone)]
    struct TestClock(Rc<Cell<NaiveDateTime>>);

    impl TestClock {
        fn at(h: u32, m: u32) -> Self {
            Self(Rc::new(Cell::new(monday(h, m))))
        }

        fn set(&self, h: u32, m: u32) {
            self.0.set(monday(h, m));
        }

        fn advance_secs(&self, secs: i64) {
            self.0.set(self.0.get() + Duration::seconds(secs));
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> NaiveDateTime {
            self.0.get()
        }
    }

    /// 2025-10-20 is a Monday.
    fn monday(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 20)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// DBMS (1) Monday 08:50-09:40, DBMS lab 14:40-16:20.
    fn timetable() -> Timetable {
        Timetable::new(vec![
            ScheduledSlot {
                subject_id: 1,
                day_of_week: 0,
                start_time: hm(8, 50),
                end_time: hm(9, 40),
            },
            ScheduledSlot {
                subject_id: 1,
                day_of_week: 0,
                start_time: hm(14, 40),
                end_time: hm(16, 20),
            },
        ])
    }

    fn gallery() -> Gallery {
        Gallery::new(vec![
            Identity {
                name: "Virat Kohli".into(),
                embedding: Embedding::new(vec![1.0, 0.0, 0.0]),
            },
            Identity {
                name: "Anil Kumble".into(),
                embedding: Embedding::new(vec![0.0, 1.0, 0.0]),
            },
        ])
    }

    fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox {
                x: 10.0,
                y: 20.0,
                width: 80.0,
                height: 80.0,
                confidence: 0.99,
            },
            embedding: Some(Embedding::new(values)),
        }
    }

    fn virat() -> DetectedFace {
        face(vec![0.95, 0.05, 0.0])
    }

    fn stranger() -> DetectedFace {
        face(vec![0.0, 0.0, 1.0])
    }

    fn new_loop(store: MemoryStore, clock: TestClock, config: LoopConfig) -> RecognitionLoop<MemoryStore, TestClock> {
        RecognitionLoop::new(gallery(), timetable(), store, clock, config)
    }

    #[test]
    fn test_credits_once_across_many_frames() {
        let clock = TestClock::at(9, 0);
        let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), clock.clone(), LoopConfig::default());

        for i in 0..200 {
            if i % 50 == 0 {
                clock.advance_secs(60);
            }
            rl.process(&[virat(), virat()]);
        }

        assert_eq!(rl.store().count(), 1);
        let record = rl.store().records.borrow()[0].clone();
        assert_eq!(record.student_name, "Virat Kohli");
        assert_eq!(record.subject_id, 1);
        assert_eq!(record.student_db_id, 1);
        assert_eq!(record.timestamp, monday(9, 1));
        assert_eq!(rl.stats().credits_written, 1);
    }

    #[test]
    fn test_same_frame_duplicates_credit_once() {
        let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), TestClock::at(9, 0), LoopConfig::default());
        let report = rl.process(&[virat(), virat()]);

        assert_eq!(report.credits.len(), 1);
        assert!(matches!(report.decisions[0].action, FaceAction::Credit { subject_id: 1, .. }));
        assert!(matches!(report.decisions[1].action, FaceAction::AlreadyCredited { subject_id: 1, .. }));
    }

    #[test]
    fn test_no_credit_outside_session() {
        let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), TestClock::at(12, 0), LoopConfig::default());
        let report = rl.process(&[virat()]);

        assert_eq!(report.state, LoopState::Idle);
        assert_eq!(report.banner, "No Scheduled Class");
        assert_eq!(report.annotations[0].label, "Virat Kohli");
        assert!(matches!(report.decisions[0].action, FaceAction::OutsideSession { .. }));
        assert!(report.credits.is_empty());
        assert_eq!(rl.store().count(), 0);
        assert!(!rl.ledger().is_credited(1, "Virat Kohli"));
    }

    #[test]
    fn test_unknown_face_never_credited() {
        let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), TestClock::at(9, 0), LoopConfig::default());
        let report = rl.process(&[stranger()]);

        assert_eq!(report.annotations[0].label, UNKNOWN_LABEL);
        assert_eq!(report.decisions[0].action, FaceAction::Unrecognized);
        assert!(report.decisions[0].distance.unwrap() > 0.6);
        assert!(rl.ledger().credited(1).is_empty());
        assert_eq!(rl.store().count(), 0);
    }

    #[test]
    fn test_unencoded_face_skipped() {
        let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), TestClock::at(9, 0), LoopConfig::default());
        let mut broken = virat();
        broken.embedding = None;
        let report = rl.process(&[broken, virat()]);

        assert_eq!(report.decisions[0].action, FaceAction::NotEncoded);
        assert_eq!(report.credits.len(), 1);
        assert_eq!(rl.store().count(), 1);
    }

    #[test]
    fn test_roster_gap_warns_and_skips_write() {
        let mut rl = new_loop(MemoryStore::with_roster(&[]), TestClock::at(9, 0), LoopConfig::default());
        let report = rl.process(&[virat()]);

        assert_eq!(report.credits[0].outcome, PersistOutcome::RosterGap);
        assert_eq!(rl.store().count(), 0);
        assert_eq!(rl.stats().roster_gaps, 1);

        // The ledger still holds the credit, so the gap is reported once.
        let report = rl.process(&[virat()]);
        assert!(report.credits.is_empty());
        assert_eq!(rl.stats().roster_gaps, 1);
    }

    #[test]
    fn test_store_failure_is_not_fatal_and_not_retried_by_default() {
        let store = MemoryStore::with_roster(&["Virat Kohli", "Anil Kumble"]);
        store.failing.set(true);
        let clock = TestClock::at(9, 0);
        let mut rl = new_loop(store, clock.clone(), LoopConfig::default());

        let report = rl.process(&[virat()]);
        assert!(matches!(report.credits[0].outcome, PersistOutcome::StoreFailed(_)));

        rl.store().failing.set(false);
        clock.advance_secs(600);
        let report = rl.process(&[virat(), face(vec![0.0, 0.98, 0.0])]);

        // Virat stays credited in memory only; Anil is written normally.
        assert_eq!(report.credits.len(), 1);
        assert_eq!(report.credits[0].name, "Anil Kumble");
        assert_eq!(rl.store().count(), 1);
        assert_eq!(rl.stats().store_failures, 1);
        assert_eq!(rl.stats().pending, 0);
    }

    #[test]
    fn test_lookup_failure_is_a_store_failure() {
        let store = MemoryStore::with_roster(&["Virat Kohli"]);
        store.failing_lookup.set(true);
        let clock = TestClock::at(9, 0);
        let mut rl = new_loop(store, clock.clone(), LoopConfig::default());

        let report = rl.process(&[virat()]);
        assert_eq!(
            report.credits[0].outcome,
            PersistOutcome::StoreFailed("store backend: database is locked".into())
        );
        assert!(rl.ledger().is_credited(1, "Virat Kohli"));
        assert_eq!(rl.stats().store_failures, 1);
        assert_eq!(rl.stats().roster_gaps, 0);

        for _ in 0..3 {
            clock.advance_secs(60);
            let report = rl.process(&[virat()]);
            assert!(report.credits.is_empty());
            assert!(matches!(report.decisions[0].action, FaceAction::AlreadyCredited { .. }));
        }
        assert_eq!(rl.store().count(), 0);
        assert_eq!(rl.stats().store_failures, 1);
        assert_eq!(rl.stats().pending, 0);
    }

    #[test]
    fn test_reconcile_recovers_from_failed_lookup() {
        let store = MemoryStore::with_roster(&["Virat Kohli"]);
        store.failing_lookup.set(true);
        let clock = TestClock::at(9, 0);
        let config = LoopConfig {
            reconcile_interval: Some(Duration::seconds(30)),
            ..LoopConfig::default()
        };
        let mut rl = new_loop(store, clock.clone(), config);

        rl.process(&[virat()]);
        assert_eq!(rl.stats().pending, 1);

        clock.advance_secs(1);
        rl.process(&[]);
        assert_eq!(rl.stats().pending, 1);
        assert_eq!(rl.store().count(), 0);

        rl.store().failing_lookup.set(false);
        clock.advance_secs(30);
        rl.process(&[]);
        assert_eq!(rl.store().count(), 1);
        let record = rl.store().records.borrow()[0].clone();
        assert_eq!(record.student_db_id, 1);
        assert_eq!(record.timestamp, monday(9, 0));
        assert_eq!(rl.stats().reconciled, 1);
        assert_eq!(rl.stats().store_failures, 1);
        assert_eq!(rl.stats().pending, 0);
    }

    #[test]
    fn test_reconcile_retries_failed_writes() {
        let store = MemoryStore::with_roster(&["Virat Kohli"]);
        store.failing.set(true);
        let clock = TestClock::at(9, 0);
        let config = LoopConfig {
            reconcile_interval: Some(Duration::seconds(30)),
            ..LoopConfig::default()
        };
        let mut rl = new_loop(store, clock.clone(), config);

        rl.process(&[virat()]);
        assert_eq!(rl.stats().pending, 1);

        // First retry happens on the next frame and still fails.
        clock.advance_secs(1);
        rl.process(&[]);
        assert_eq!(rl.stats().pending, 1);

        // Store recovers, but the interval has not elapsed yet.
        rl.store().failing.set(false);
        clock.advance_secs(10);
        rl.process(&[]);
        assert_eq!(rl.store().count(), 0);

        clock.advance_secs(30);
        rl.process(&[]);
        assert_eq!(rl.store().count(), 1);
        assert_eq!(rl.store().records.borrow()[0].timestamp, monday(9, 0));
        assert_eq!(rl.stats().reconciled, 1);
        assert_eq!(rl.stats().pending, 0);
    }

    #[test]
    fn test_state_follows_schedule_without_hysteresis() {
        let clock = TestClock::at(9, 39);
        let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), clock.clone(), LoopConfig::default());

        let report = rl.process(&[]);
        assert_eq!(report.state.subject_id(), Some(1));
        assert_eq!(report.banner, "Class In Session (Subject ID: 1)");

        clock.set(9, 40);
        assert_eq!(rl.process(&[]).state.subject_id(), Some(1));

        clock.set(9, 41);
        assert_eq!(rl.process(&[]).state, LoopState::Idle);
    }

    #[test]
    fn test_same_day_recurrence_follows_policy() {
        for (policy, expected) in [
            (RecurrencePolicy::Never, 1),
            (RecurrencePolicy::Daily, 1),
            (RecurrencePolicy::PerSession, 2),
        ] {
            let clock = TestClock::at(9, 0);
            let config = LoopConfig {
                policy,
                ..LoopConfig::default()
            };
            let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), clock.clone(), config);

            rl.process(&[virat()]);
            clock.set(12, 0);
            rl.process(&[virat()]);
            clock.set(15, 0);
            rl.process(&[virat()]);

            assert_eq!(rl.store().count(), expected, "policy {policy:?}");
        }
    }

    struct VecSource {
        frames: VecDeque<Result<Frame, FrameError>>,
    }

    impl VecSource {
        fn new(count: u32) -> Self {
            Self {
                frames: (0..count)
                    .map(|seq| Frame::from_rgb(vec![90; 12], 2, 2, seq))
                    .collect(),
            }
        }
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
            self.frames.pop_front().transpose()
        }
    }

    /// Sees Virat in every frame; fails detection on sequence 1.
    struct ScriptedEmbedder;

    impl FaceEmbedder for ScriptedEmbedder {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, EmbedderError> {
            if frame.sequence == 1 {
                return Err(EmbedderError::Detection("model hiccup".into()));
            }
            Ok(vec![virat()])
        }
    }

    /// Answers for the first `frames` frames, then behaves as a dead helper.
    struct DyingEmbedder {
        frames: u32,
    }

    impl FaceEmbedder for DyingEmbedder {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, EmbedderError> {
            if frame.sequence >= self.frames {
                return Err(EmbedderError::Exited);
            }
            Ok(vec![virat()])
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        banners: Vec<String>,
        quit_after: Option<usize>,
    }

    impl FrameSink for RecordingSink {
        fn present(&mut self, _frame: &Frame, report: &FrameReport) -> SinkControl {
            self.banners.push(report.banner.clone());
            match self.quit_after {
                Some(n) if self.banners.len() >= n => SinkControl::Quit,
                _ => SinkControl::Continue,
            }
        }
    }

    #[test]
    fn test_run_until_source_exhausted() {
        let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), TestClock::at(9, 0), LoopConfig::default());
        let mut sink = RecordingSink::default();
        let stop = AtomicBool::new(false);

        let summary = rl.run(&mut VecSource::new(5), &mut ScriptedEmbedder, &mut sink, &stop);

        assert_eq!(summary.end, LoopEnd::SourceExhausted);
        assert_eq!(summary.stats.frames, 5);
        assert_eq!(summary.stats.faces, 4);
        assert_eq!(summary.stats.credits_written, 1);
        assert_eq!(sink.banners.len(), 5);
    }

    #[test]
    fn test_run_stops_on_unreadable_frame() {
        let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), TestClock::at(9, 0), LoopConfig::default());
        let mut source = VecSource::new(2);
        source.frames.push_back(Err(FrameError::Source("camera unplugged".into())));
        source.frames.push_back(Frame::from_rgb(vec![90; 12], 2, 2, 9));

        let summary = rl.run(&mut source, &mut ScriptedEmbedder, &mut RecordingSink::default(), &AtomicBool::new(false));

        assert!(matches!(summary.end, LoopEnd::SourceFailed(_)));
        assert_eq!(summary.stats.frames, 2);
    }

    #[test]
    fn test_run_stops_when_embedder_exits() {
        let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), TestClock::at(9, 0), LoopConfig::default());
        let mut sink = RecordingSink::default();

        let summary = rl.run(&mut VecSource::new(10), &mut DyingEmbedder { frames: 2 }, &mut sink, &AtomicBool::new(false));

        assert_eq!(summary.end, LoopEnd::EmbedderExited);
        assert_eq!(summary.stats.frames, 2);
        assert_eq!(summary.stats.credits_written, 1);
        assert_eq!(sink.banners.len(), 2);
    }

    #[test]
    fn test_run_quit_and_stop() {
        let mut rl = new_loop(MemoryStore::with_roster(&["Virat Kohli"]), TestClock::at(9, 0), LoopConfig::default());
        let mut sink = RecordingSink {
            quit_after: Some(3),
            ..Default::default()
        };
        let summary = rl.run(&mut VecSource::new(10), &mut ScriptedEmbedder, &mut sink, &AtomicBool::new(false));
        assert_eq!(summary.end, LoopEnd::Quit);
        assert_eq!(summary.stats.frames, 3);

        let summary = rl.run(&mut VecSource::new(10), &mut ScriptedEmbedder, &mut sink, &AtomicBool::new(true));
        assert_eq!(summary.end, LoopEnd::Stopped);
        assert_eq!(summary.stats.frames, 3);
    }
}
