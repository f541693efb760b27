//! Subject records: the classes a student is enrolled in.
//!
//! A subject is stored as a flat document under `users/{uid}/materias/{id}`.
//! The `id` is never part of the document: the backend assigns it as the
//! entry key, and the client learns it from the next snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::Result;

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Half of a 12-hour clock.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Period {
  #[default]
  #[serde(rename = "AM")]
  #[strum(to_string = "AM")]
  Am,
  #[serde(rename = "PM")]
  #[strum(to_string = "PM")]
  Pm,
}

impl Period {
  /// The other half of the day; backs the AM/PM toggle on the add form.
  pub fn toggled(self) -> Self {
    match self {
      Self::Am => Self::Pm,
      Self::Pm => Self::Am,
    }
  }
}

/// A time of day on a 12-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockTime {
  /// 1–12.
  pub hour:   u8,
  /// 0–59.
  pub minute: u8,
  pub period: Period,
}

impl ClockTime {
  /// Returns `None` when the hour or minute is out of range.
  pub fn new(hour: u8, minute: u8, period: Period) -> Option<Self> {
    ((1..=12).contains(&hour) && minute <= 59).then_some(Self { hour, minute, period })
  }

  /// 12 AM is midnight (0) and 12 PM is noon (720).
  pub fn minutes_since_midnight(&self) -> u16 {
    let hour = u16::from(self.hour % 12)
      + match self.period {
        Period::Am => 0,
        Period::Pm => 12,
      };
    hour * 60 + u16::from(self.minute)
  }
}

impl fmt::Display for ClockTime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{:02} {}", self.hour, self.minute, self.period)
  }
}

// ─── NewSubject ──────────────────────────────────────────────────────────────

/// The user-editable fields of a subject, as produced by the add form.
///
/// Input to the subject store's add operation; `id`, `ownerId` and
/// `createdAt` are stamped by the store and the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
  pub name:         String,
  pub instructor:   String,
  pub room:         String,
  pub start_hour:   u8,
  pub start_minute: u8,
  pub start_period: Period,
  pub end_hour:     u8,
  pub end_minute:   u8,
  pub end_period:   Period,
}

impl NewSubject {
  pub fn start(&self) -> ClockTime {
    ClockTime {
      hour:   self.start_hour,
      minute: self.start_minute,
      period: self.start_period,
    }
  }

  pub fn end(&self) -> ClockTime {
    ClockTime {
      hour:   self.end_hour,
      minute: self.end_minute,
      period: self.end_period,
    }
  }

  /// The document written when the subject is first pushed. Carries no `id`.
  pub fn to_document(&self, owner_id: &str, created_at: DateTime<Utc>) -> Result<Value> {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Document<'a> {
      owner_id:   &'a str,
      #[serde(flatten)]
      fields:     &'a NewSubject,
      created_at: DateTime<Utc>,
    }

    Ok(serde_json::to_value(Document { owner_id, fields: self, created_at })?)
  }
}

// ─── SubjectRecord ───────────────────────────────────────────────────────────

/// A persisted subject, as mirrored from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
  /// The entry key the backend assigned; filled in from the snapshot.
  #[serde(skip_deserializing)]
  pub id:         String,
  /// Identifier of the user who created the subject; never changes.
  pub owner_id:   String,
  #[serde(flatten)]
  pub fields:     NewSubject,
  /// Set when the subject is first pushed; never changes.
  pub created_at: DateTime<Utc>,
}

impl SubjectRecord {
  /// Decode one entry of a collection snapshot, attaching its key as `id`.
  pub fn from_entry(key: &str, value: &Value) -> Result<Self> {
    let mut record: SubjectRecord = serde_json::from_value(value.clone())?;
    record.id = key.to_owned();
    Ok(record)
  }

  pub fn start(&self) -> ClockTime { self.fields.start() }

  pub fn end(&self) -> ClockTime { self.fields.end() }
}

// ─── SubjectPatch ────────────────────────────────────────────────────────────

/// A partial update. `None` fields are left untouched by the merge write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name:         Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub instructor:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub room:         Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_hour:   Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_minute: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_period: Option<Period>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_hour:     Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_minute:   Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_period:   Option<Period>,
}

impl SubjectPatch {
  pub fn is_empty(&self) -> bool { self == &Self::default() }

  /// The field map handed to the backend's merge update.
  pub fn to_fields(&self) -> Result<Map<String, Value>> {
    match serde_json::to_value(self)? {
      Value::Object(map) => Ok(map),
      _ => Ok(Map::new()),
    }
  }
}
