//! Slash-separated paths into the realtime document tree.
//!
//! Every record a user owns lives under `users/{uid}`; subjects are children
//! of `users/{uid}/materias`. Segments follow the hosted service's key rules:
//! non-empty, no `/`, and none of `. # $ [ ]`.

use std::fmt;

use crate::{Error, Result};

/// Top-level collection holding one document per user.
pub const USERS: &str = "users";

/// Per-user collection of subject records.
pub const SUBJECTS: &str = "materias";

const FORBIDDEN: &[char] = &['/', '.', '#', '$', '[', ']'];

/// A validated path. The root is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
  pub fn root() -> Self { Self(String::new()) }

  /// Parse `a/b/c`. Leading, trailing and doubled slashes are ignored.
  pub fn parse(raw: &str) -> Result<Self> {
    raw
      .split('/')
      .filter(|s| !s.is_empty())
      .try_fold(Self::root(), |path, segment| path.child(segment))
  }

  /// Append one segment.
  pub fn child(&self, segment: &str) -> Result<Self> {
    validate_segment(segment)?;
    if self.0.is_empty() {
      Ok(Self(segment.to_owned()))
    } else {
      Ok(Self(format!("{}/{segment}", self.0)))
    }
  }

  /// `users/{uid}`: the profile document.
  pub fn user(uid: &str) -> Result<Self> { Self::root().child(USERS)?.child(uid) }

  /// `users/{uid}/materias`: the subject collection.
  pub fn subjects(uid: &str) -> Result<Self> { Self::user(uid)?.child(SUBJECTS) }

  /// `users/{uid}/materias/{id}`: a single subject entry.
  pub fn subject(uid: &str, id: &str) -> Result<Self> {
    Self::subjects(uid)?.child(id)
  }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn is_root(&self) -> bool { self.0.is_empty() }

  pub fn segments(&self) -> impl Iterator<Item = &str> {
    self.0.split('/').filter(|s| !s.is_empty())
  }

  /// The last segment, or `None` for the root.
  pub fn key(&self) -> Option<&str> { self.segments().last() }

  pub fn parent(&self) -> Option<Self> {
    if self.is_root() {
      return None;
    }
    match self.0.rsplit_once('/') {
      Some((parent, _)) => Some(Self(parent.to_owned())),
      None => Some(Self::root()),
    }
  }

  /// Strict ancestry: a path is not its own ancestor.
  pub fn is_ancestor_of(&self, other: &DocPath) -> bool {
    if self.is_root() {
      return !other.is_root();
    }
    other
      .0
      .strip_prefix(self.0.as_str())
      .is_some_and(|rest| rest.starts_with('/'))
  }

  /// A write at one path changes the value seen at the other.
  pub fn overlaps(&self, other: &DocPath) -> bool {
    self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
  }
}

impl fmt::Display for DocPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_root() { f.write_str("/") } else { f.write_str(&self.0) }
  }
}

fn validate_segment(segment: &str) -> Result<()> {
  if segment.is_empty()
    || segment.contains(FORBIDDEN)
    || segment.chars().any(char::is_control)
  {
    return Err(Error::InvalidPathSegment(segment.to_owned()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builds_user_scoped_paths() {
    assert_eq!(DocPath::user("u1").unwrap().as_str(), "users/u1");
    assert_eq!(DocPath::subjects("u1").unwrap().as_str(), "users/u1/materias");
    assert_eq!(
      DocPath::subject("u1", "-Nabc").unwrap().as_str(),
      "users/u1/materias/-Nabc"
    );
  }

  #[test]
  fn parse_ignores_stray_slashes() {
    let path = DocPath::parse("/users//u1/").unwrap();
    assert_eq!(path, DocPath::user("u1").unwrap());
    assert!(DocPath::parse("").unwrap().is_root());
  }

  #[test]
  fn rejects_forbidden_characters() {
    for bad in ["a.b", "a#b", "a$b", "a[b", "a]b", "a\nb"] {
      assert!(
        matches!(DocPath::root().child(bad), Err(Error::InvalidPathSegment(_))),
        "{bad:?} should be rejected"
      );
    }
    assert!(DocPath::root().child("").is_err());
    assert!(DocPath::subject("u1", "x/y").is_err());
  }

  #[test]
  fn ancestry_is_segment_aware() {
    let user = DocPath::user("u1").unwrap();
    let subjects = DocPath::subjects("u1").unwrap();
    let other = DocPath::parse("users/u10").unwrap();

    assert!(user.is_ancestor_of(&subjects));
    assert!(!subjects.is_ancestor_of(&user));
    assert!(!user.is_ancestor_of(&user));
    assert!(!user.is_ancestor_of(&other));
    assert!(DocPath::root().is_ancestor_of(&user));

    assert!(user.overlaps(&subjects));
    assert!(subjects.overlaps(&user));
    assert!(!other.overlaps(&subjects));
  }

  #[test]
  fn parent_and_key() {
    let entry = DocPath::subject("u1", "k1").unwrap();
    assert_eq!(entry.key(), Some("k1"));
    assert_eq!(entry.parent(), Some(DocPath::subjects("u1").unwrap()));
    assert_eq!(DocPath::parse("users").unwrap().parent(), Some(DocPath::root()));
    assert_eq!(DocPath::root().parent(), None);
    assert_eq!(DocPath::root().key(), None);
  }
}
