//! The schedule view: subjects laid out by time of day.

use crate::subject::{ClockTime, SubjectRecord};

const MINUTES_PER_DAY: u16 = 24 * 60;

/// One subject's time window.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleSlot<'a> {
  pub subject: &'a SubjectRecord,
  pub start:   ClockTime,
  pub end:     ClockTime,
}

impl ScheduleSlot<'_> {
  /// `7:00 AM - 8:30 AM`
  pub fn label(&self) -> String { format!("{} - {}", self.start, self.end) }

  /// Length of the window. An end at or before the start runs past midnight.
  pub fn duration_minutes(&self) -> u16 {
    let start = self.start.minutes_since_midnight();
    let end = self.end.minutes_since_midnight();
    if end > start { end - start } else { end + MINUTES_PER_DAY - start }
  }
}

/// Subjects ordered by start time, ties broken by name.
#[derive(Debug, Clone, Default)]
pub struct Schedule<'a> {
  slots: Vec<ScheduleSlot<'a>>,
}

impl<'a> Schedule<'a> {
  pub fn from_subjects(subjects: &'a [SubjectRecord]) -> Self {
    let mut slots: Vec<ScheduleSlot<'a>> = subjects
      .iter()
      .map(|subject| ScheduleSlot { subject, start: subject.start(), end: subject.end() })
      .collect();
    slots.sort_by(|a, b| {
      a.start
        .minutes_since_midnight()
        .cmp(&b.start.minutes_since_midnight())
        .then_with(|| a.subject.fields.name.cmp(&b.subject.fields.name))
    });
    Self { slots }
  }

  pub fn slots(&self) -> &[ScheduleSlot<'a>] { &self.slots }

  pub fn is_empty(&self) -> bool { self.slots.is_empty() }

  /// Sum of all slot durations.
  pub fn total_minutes(&self) -> u32 {
    self.slots.iter().map(|s| u32::from(s.duration_minutes())).sum()
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::subject::{NewSubject, Period};

  fn record(name: &str, start: (u8, u8, Period), end: (u8, u8, Period)) -> SubjectRecord {
    SubjectRecord {
      id:         format!("id-{name}"),
      owner_id:   "u1".into(),
      fields:     NewSubject {
        name:         name.into(),
        instructor:   "Staff".into(),
        room:         "R1".into(),
        start_hour:   start.0,
        start_minute: start.1,
        start_period: start.2,
        end_hour:     end.0,
        end_minute:   end.1,
        end_period:   end.2,
      },
      created_at: Utc::now(),
    }
  }

  #[test]
  fn orders_by_start_time_across_periods() {
    let subjects = vec![
      record("Music", (1, 0, Period::Pm), (2, 0, Period::Pm)),
      record("Physics", (9, 0, Period::Am), (10, 30, Period::Am)),
      record("Algebra", (12, 30, Period::Pm), (1, 0, Period::Pm)),
      record("Art", (9, 0, Period::Am), (9, 50, Period::Am)),
    ];
    let schedule = Schedule::from_subjects(&subjects);
    let names: Vec<_> = schedule
      .slots()
      .iter()
      .map(|s| s.subject.fields.name.as_str())
      .collect();
    assert_eq!(names, ["Art", "Physics", "Algebra", "Music"]);
  }

  #[test]
  fn slot_label_and_duration() {
    let subjects = vec![record("Physics", (11, 30, Period::Am), (1, 0, Period::Pm))];
    let schedule = Schedule::from_subjects(&subjects);
    let slot = schedule.slots()[0];
    assert_eq!(slot.label(), "11:30 AM - 1:00 PM");
    assert_eq!(slot.duration_minutes(), 90);
    assert_eq!(schedule.total_minutes(), 90);
  }

  #[test]
  fn window_past_midnight_wraps() {
    let subjects = vec![record("Night lab", (11, 0, Period::Pm), (1, 0, Period::Am))];
    let schedule = Schedule::from_subjects(&subjects);
    assert_eq!(schedule.slots()[0].duration_minutes(), 120);
  }

  #[test]
  fn empty_schedule() {
    assert!(Schedule::from_subjects(&[]).is_empty());
  }
}
