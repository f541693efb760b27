//! Pure input checks for the subject, profile and account forms.
//!
//! Nothing here touches a store: failures are returned to the form directly so
//! it can point at the offending field.

use thiserror::Error;

use crate::subject::{NewSubject, Period};

/// Why a form was refused. The message is suitable for display as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("enter the subject name")]
  MissingName,
  #[error("enter the instructor's name")]
  MissingInstructor,
  #[error("enter the room")]
  MissingRoom,
  #[error("enter a valid start time")]
  InvalidStartTime,
  #[error("enter a valid end time")]
  InvalidEndTime,
  #[error("please fill in all fields")]
  MissingCredentials,
  #[error("please enter a valid email address")]
  InvalidEmail,
  #[error("password must be at least 6 characters")]
  PasswordTooShort,
}

/// Shortest password the auth service accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Highest semester number a profile may hold.
pub const MAX_SEMESTER: u8 = 14;

// ─── Numbers ─────────────────────────────────────────────────────────────────

/// Drop every character that is not an ASCII decimal digit.
pub fn normalize_digits(text: &str) -> String {
  text.chars().filter(char::is_ascii_digit).collect()
}

pub fn is_valid_semester(n: f64) -> bool {
  n.is_finite() && (0.0..=f64::from(MAX_SEMESTER)).contains(&n)
}

/// Parse the digits of a semester text box. `None` for empty or out-of-range
/// input.
pub fn parse_semester(text: &str) -> Option<u8> {
  let n = normalize_digits(text).parse::<u8>().ok()?;
  is_valid_semester(f64::from(n)).then_some(n)
}

/// Both values parse as integers, the hour is 1–12 and the minute 0–59.
pub fn is_valid_clock_value(hour: &str, minute: &str) -> bool {
  parse_clock_value(hour, minute).is_some()
}

fn parse_clock_value(hour: &str, minute: &str) -> Option<(u8, u8)> {
  let hour = hour.trim().parse::<i64>().ok()?;
  let minute = minute.trim().parse::<i64>().ok()?;
  if !(1..=12).contains(&hour) || !(0..=59).contains(&minute) {
    return None;
  }
  Some((u8::try_from(hour).ok()?, u8::try_from(minute).ok()?))
}

/// Filter an edit to a numeric text box: keep only digits, and refuse the
/// edit (returning `current`) if the result would exceed `max`.
pub fn clamp_numeric_input(current: &str, text: &str, max: u32) -> String {
  let digits = normalize_digits(text);
  if digits.is_empty() || digits.parse::<u64>().is_ok_and(|n| n <= u64::from(max)) {
    digits
  } else {
    current.to_owned()
  }
}

// ─── Subject form ────────────────────────────────────────────────────────────

/// Raw text of the add/edit subject form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectForm {
  pub name:         String,
  pub instructor:   String,
  pub room:         String,
  pub start_hour:   String,
  pub start_minute: String,
  pub start_period: Period,
  pub end_hour:     String,
  pub end_minute:   String,
  pub end_period:   Period,
}

pub fn is_valid_subject_fields(form: &SubjectForm) -> bool {
  validate_subject_form(form).is_ok()
}

/// Check the form field by field, in display order, and build the typed
/// subject on success. Text fields are trimmed.
pub fn validate_subject_form(form: &SubjectForm) -> Result<NewSubject, ValidationError> {
  let name = required(&form.name, ValidationError::MissingName)?;
  let instructor = required(&form.instructor, ValidationError::MissingInstructor)?;
  let room = required(&form.room, ValidationError::MissingRoom)?;
  let (start_hour, start_minute) = parse_clock_value(&form.start_hour, &form.start_minute)
    .ok_or(ValidationError::InvalidStartTime)?;
  let (end_hour, end_minute) = parse_clock_value(&form.end_hour, &form.end_minute)
    .ok_or(ValidationError::InvalidEndTime)?;

  Ok(NewSubject {
    name,
    instructor,
    room,
    start_hour,
    start_minute,
    start_period: form.start_period,
    end_hour,
    end_minute,
    end_period: form.end_period,
  })
}

fn required(value: &str, missing: ValidationError) -> Result<String, ValidationError> {
  let trimmed = value.trim();
  if trimmed.is_empty() { Err(missing) } else { Ok(trimmed.to_owned()) }
}

// ─── Account forms ───────────────────────────────────────────────────────────

/// `local@domain.tld`: one `@`, no whitespace, and a dot inside the domain.
pub fn is_valid_email(text: &str) -> bool {
  let Some((local, domain)) = text.split_once('@') else {
    return false;
  };
  if local.is_empty() || domain.contains('@') || text.chars().any(char::is_whitespace) {
    return false;
  }
  domain
    .char_indices()
    .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
  if email.trim().is_empty() || password.is_empty() {
    return Err(ValidationError::MissingCredentials);
  }
  check_credentials(email, password)
}

pub fn validate_registration(
  name: &str,
  email: &str,
  password: &str,
) -> Result<(), ValidationError> {
  if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
    return Err(ValidationError::MissingCredentials);
  }
  check_credentials(email, password)
}

fn check_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
  if !is_valid_email(email.trim()) {
    return Err(ValidationError::InvalidEmail);
  }
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(ValidationError::PasswordTooShort);
  }
  Ok(())
}
