//! Weekly timetable and "which subject is in session right now".

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SubjectId = i64;

/// One weekly class slot. Day 0 is Monday, 6 is Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledSlot {
    pub subject_id: SubjectId,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl ScheduledSlot {
    /// Inclusive at both ends.
    fn contains(&self, day: u8, time: NaiveTime) -> bool {
        self.day_of_week == day && self.start_time <= time && time <= self.end_time
    }
}

/// A concrete occurrence of a slot on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveSession {
    pub subject_id: SubjectId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl fmt::Display for ActiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subject {} on {} {}-{}",
            self.subject_id,
            self.date,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

/// Immutable weekly schedule.
#[derive(Debug, Clone, Default)]
pub struct Timetable {
    slots: Vec<ScheduledSlot>,
}

impl Timetable {
    pub fn new(slots: Vec<ScheduledSlot>) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[ScheduledSlot] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots scheduled on `day`, ordered by start time.
    pub fn slots_on(&self, day: u8) -> Vec<ScheduledSlot> {
        let mut slots: Vec<_> = self.slots.iter().filter(|s| s.day_of_week == day).copied().collect();
        slots.sort_by_key(|s| (s.start_time, s.subject_id));
        slots
    }

    /// The session in progress at `now`, compared at minute precision.
    ///
    /// Overlapping slots resolve to the earliest start time, then the
    /// lowest subject id, then load order.
    pub fn current_session(&self, now: NaiveDateTime) -> Option<ActiveSession> {
        let day = day_of_week(now.date());
        let time = truncate_to_minute(now.time());

        self.slots
            .iter()
            .filter(|slot| slot.contains(day, time))
            .min_by_key(|slot| (slot.start_time, slot.subject_id))
            .map(|slot| ActiveSession {
                subject_id: slot.subject_id,
                date: now.date(),
                start_time: slot.start_time,
                end_time: slot.end_time,
            })
    }

    pub fn current_subject(&self, now: NaiveDateTime) -> Option<SubjectId> {
        self.current_session(now).map(|s| s.subject_id)
    }
}

/// Day of week with Monday = 0.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

/// Parse a wall-clock time in `HH:MM` form.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Source of the current local wall-clock time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}
