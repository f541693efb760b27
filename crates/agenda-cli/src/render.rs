//! Plain-text rendering of store state.

use std::fmt::Write as _;

use agenda_client::ProfileState;
use agenda_core::{schedule::Schedule, subject::SubjectRecord};

pub fn subjects(subjects: &[SubjectRecord]) -> String {
  if subjects.is_empty() {
    return "No subjects yet. Add one with `agenda subjects add`.\n".to_owned();
  }
  let mut out = String::new();
  for s in subjects {
    let _ = writeln!(out, "{}  {}", s.id, s.fields.name);
    let _ = writeln!(out, "    {} - {}", s.start(), s.end());
    let _ = writeln!(out, "    {} · room {}", s.fields.instructor, s.fields.room);
  }
  out
}

pub fn schedule(schedule: &Schedule<'_>) -> String {
  if schedule.is_empty() {
    return "Nothing scheduled.\n".to_owned();
  }
  let mut out = String::new();
  for slot in schedule.slots() {
    let _ = writeln!(
      out,
      "{:<20} {:<24} {}",
      slot.label(),
      slot.subject.fields.name,
      slot.subject.fields.room
    );
  }
  let total = schedule.total_minutes();
  let _ = writeln!(
    out,
    "{} classes, {}h {:02}m in total",
    schedule.slots().len(),
    total / 60,
    total % 60
  );
  out
}

pub fn profile(state: &ProfileState, display_name: Option<&str>) -> String {
  let p = &state.profile;
  let or_dash = |s: &str| if s.is_empty() { "-".to_owned() } else { s.to_owned() };

  let mut out = String::new();
  if let Some(name) = display_name {
    let _ = writeln!(out, "Account:       {name}");
  }
  let _ = writeln!(out, "Name:          {}", or_dash(&p.name));
  let _ = writeln!(out, "School ID:     {}", or_dash(&p.school_id));
  let _ = writeln!(
    out,
    "Semester:      {}",
    p.semester.map_or_else(|| "-".to_owned(), |n| n.to_string())
  );
  let _ = writeln!(out, "Major:         {}", or_dash(&p.major));
  let _ = writeln!(
    out,
    "Notifications: {}",
    if p.notifications_enabled { "on" } else { "off" }
  );
  if let Some(at) = p.updated_at {
    let _ = writeln!(out, "Last saved:    {}", at.format("%Y-%m-%d %H:%M UTC"));
  }
  if let Some(error) = &state.error {
    let _ = writeln!(out, "\n{error}");
  }
  out
}

#[cfg(test)]
mod tests {
  use agenda_core::{
    profile::ProfileRecord,
    subject::{NewSubject, Period},
  };
  use chrono::{TimeZone, Utc};

  use super::*;

  fn record(id: &str, name: &str, hour: u8, period: Period) -> SubjectRecord {
    SubjectRecord {
      id:         id.into(),
      owner_id:   "u1".into(),
      fields:     NewSubject {
        name:         name.into(),
        instructor:   "Dr. Ruiz".into(),
        room:         "A1".into(),
        start_hour:   hour,
        start_minute: 0,
        start_period: period,
        end_hour:     hour,
        end_minute:   50,
        end_period:   period,
      },
      created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
  }

  #[test]
  fn empty_lists_get_a_hint() {
    assert!(subjects(&[]).contains("agenda subjects add"));
    assert_eq!(schedule(&Schedule::from_subjects(&[])), "Nothing scheduled.\n");
  }

  #[test]
  fn schedule_lists_slots_in_time_order() {
    let list = [record("k1", "Quimica", 1, Period::Pm), record("k2", "Algebra", 7, Period::Am)];
    let text = schedule(&Schedule::from_subjects(&list));
    let algebra = text.find("Algebra").unwrap();
    let quimica = text.find("Quimica").unwrap();
    assert!(algebra < quimica);
    assert!(text.contains("7:00 AM - 7:50 AM"));
    assert!(text.contains("2 classes, 1h 40m in total"));
  }

  #[test]
  fn profile_shows_unset_fields_as_dashes() {
    let state = ProfileState { profile: ProfileRecord::default(), ..ProfileState::default() };
    let text = profile(&state, None);
    assert!(text.contains("Semester:      -"));
    assert!(text.contains("Notifications: on"));
    assert!(!text.contains("Last saved"));
  }
}
