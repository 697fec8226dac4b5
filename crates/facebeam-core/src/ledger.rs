//! Session ledger: which students were already credited for a subject.
//!
//! In-memory and advisory only; it starts empty on every process start.
//! The attendance store is the durable record.

use crate::schedule::{ActiveSession, SubjectId};
use chrono::{NaiveDate, NaiveTime};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

/// When a subject's credited set starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecurrencePolicy {
    /// Never; a student is credited once per subject for the process lifetime.
    Never,
    /// When the session's calendar date changes. Same-day recurrences of a
    /// subject stay blocked.
    #[default]
    Daily,
    /// Whenever a new occurrence (date + start time) of the subject begins.
    PerSession,
}

impl FromStr for RecurrencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "daily" => Ok(Self::Daily),
            "session" | "per-session" => Ok(Self::PerSession),
            other => Err(format!("unknown ledger reset policy '{other}' (expected never, daily or session)")),
        }
    }
}

#[derive(Debug, Default)]
struct SubjectEntry {
    /// Occurrence the set currently belongs to.
    occurrence: Option<(NaiveDate, NaiveTime)>,
    names: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct SessionLedger {
    policy: RecurrencePolicy,
    subjects: HashMap<SubjectId, SubjectEntry>,
}

impl SessionLedger {
    pub fn new(policy: RecurrencePolicy) -> Self {
        Self {
            policy,
            subjects: HashMap::new(),
        }
    }

    /// Note that `session` is in progress, resetting the subject's set if
    /// the policy says this occurrence starts a fresh one.
    pub fn enter_session(&mut self, session: &ActiveSession) {
        let entry = self.subjects.entry(session.subject_id).or_default();
        let occurrence = (session.date, session.start_time);

        let reset = match (self.policy, entry.occurrence) {
            (_, None) => false,
            (RecurrencePolicy::Never, _) => false,
            (RecurrencePolicy::Daily, Some((date, _))) => date != session.date,
            (RecurrencePolicy::PerSession, Some(prev)) => prev != occurrence,
        };

        if reset && !entry.names.is_empty() {
            tracing::info!(
                subject_id = session.subject_id,
                cleared = entry.names.len(),
                "new session occurrence; credited set reset"
            );
            entry.names.clear();
        }
        entry.occurrence = Some(occurrence);
    }

    /// Credit `name` for `subject_id` unless already credited.
    ///
    /// Returns `true` if the student was newly credited.
    pub fn credit_if_new(&mut self, subject_id: SubjectId, name: &str) -> bool {
        let entry = self.subjects.entry(subject_id).or_default();
        if entry.names.contains(name) {
            return false;
        }
        entry.names.insert(name.to_string());
        true
    }

    pub fn is_credited(&self, subject_id: SubjectId, name: &str) -> bool {
        self.subjects
            .get(&subject_id)
            .is_some_and(|e| e.names.contains(name))
    }

    /// Names credited for `subject_id`, sorted.
    pub fn credited(&self, subject_id: SubjectId) -> Vec<String> {
        let mut names: Vec<String> = self
            .subjects
            .get(&subject_id)
            .map(|e| e.names.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Ledger shared between threads processing frames concurrently.
///
/// The check-and-set runs under one lock, so of several concurrent
/// `credit_if_new` calls for the same student and subject exactly one
/// returns `true`.
#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<Mutex<SessionLedger>>,
}

impl SharedLedger {
    pub fn new(policy: RecurrencePolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionLedger::new(policy))),
        }
    }

    pub fn enter_session(&self, session: &ActiveSession) {
        self.lock().enter_session(session);
    }

    pub fn credit_if_new(&self, subject_id: SubjectId, name: &str) -> bool {
        self.lock().credit_if_new(subject_id, name)
    }

    pub fn is_credited(&self, subject_id: SubjectId, name: &str) -> bool {
        self.lock().is_credited(subject_id, name)
    }

    pub fn credited(&self, subject_id: SubjectId) -> Vec<String> {
        self.lock().credited(subject_id)
    }

    /// Hold the ledger for several operations in a row.
    pub fn lock(&self) -> MutexGuard<'_, SessionLedger> {
        // A panic while holding the lock cannot leave the ledger half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
