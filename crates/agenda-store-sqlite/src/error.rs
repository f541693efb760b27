//! Error type for `agenda-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] agenda_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// Only objects can be stored at the root of the tree.
  #[error("cannot store a scalar at the root")]
  ScalarAtRoot,

  #[error("email already in use")]
  EmailAlreadyInUse,

  #[error("invalid email")]
  InvalidEmail,

  #[error("weak password")]
  WeakPassword,

  #[error("invalid credentials")]
  InvalidCredentials,

  #[error("no authenticated user")]
  NoSession,

  #[error("unknown account: {0}")]
  UnknownAccount(String),

  #[error("password hashing failed: {0}")]
  PasswordHash(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
