//! The account profile stored at `users/{uid}`.
//!
//! Profile fields sit at the root of the user document, next to the
//! `materias` collection. Every save writes all of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::Result;

/// One user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
  #[serde(default)]
  pub name:                  String,
  /// Enrollment number ("matrícula").
  #[serde(default)]
  pub school_id:             String,
  /// `None` is stored as the empty string.
  #[serde(default, with = "semester_field")]
  pub semester:              Option<u8>,
  #[serde(default)]
  pub major:                 String,
  #[serde(default = "enabled")]
  pub notifications_enabled: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at:            Option<DateTime<Utc>>,
}

impl Default for ProfileRecord {
  fn default() -> Self {
    Self {
      name:                  String::new(),
      school_id:             String::new(),
      semester:              None,
      major:                 String::new(),
      notifications_enabled: true,
      updated_at:            None,
    }
  }
}

impl ProfileRecord {
  /// Decode the user document. Fields other than the profile's are ignored.
  pub fn from_document(value: &Value) -> Result<Self> {
    Ok(serde_json::from_value(value.clone())?)
  }

  /// Every profile field, for a write that replaces the whole profile.
  pub fn to_fields(&self) -> Result<Map<String, Value>> {
    match serde_json::to_value(self)? {
      Value::Object(map) => Ok(map),
      _ => Ok(Map::new()),
    }
  }
}

fn enabled() -> bool { true }

/// Free-text profile fields editable one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ProfileField {
  Name,
  SchoolId,
  Major,
}

mod semester_field {
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
  use serde_json::Value;

  pub fn serialize<S: Serializer>(value: &Option<u8>, s: S) -> Result<S::Ok, S::Error> {
    match value {
      Some(n) => s.serialize_u8(*n),
      None => s.serialize_str(""),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
    match Value::deserialize(d)? {
      Value::Null => Ok(None),
      Value::String(s) if s.trim().is_empty() => Ok(None),
      Value::String(s) => s
        .trim()
        .parse::<u8>()
        .map(Some)
        .map_err(|_| D::Error::custom(format!("invalid semester: {s:?}"))),
      Value::Number(n) => n
        .as_u64()
        .and_then(|n| u8::try_from(n).ok())
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("invalid semester: {n}"))),
      other => Err(D::Error::custom(format!("invalid semester: {other}"))),
    }
  }
}
