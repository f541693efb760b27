//! Error type for the client stores.
//!
//! The display text is what a screen shows; the backend cause, when there is
//! one, is kept as the error's `source` and only ever logged.

use thiserror::Error;

type Cause = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("no authenticated user")]
  NoSession,

  #[error("failed to load subjects")]
  LoadSubjects(#[source] Cause),

  #[error("failed to add subject")]
  AddSubject(#[source] Cause),

  #[error("failed to update subject")]
  UpdateSubject(#[source] Cause),

  #[error("failed to delete subject")]
  DeleteSubject(#[source] Cause),

  #[error("failed to load profile")]
  LoadProfile(#[source] Cause),

  #[error("failed to save profile")]
  SaveProfile(#[source] Cause),

  #[error("failed to log out")]
  Logout(#[source] Cause),
}

impl StoreError {
  /// Wrap a backend error behind one of the general messages above.
  pub(crate) fn wrap<E>(variant: fn(Cause) -> Self) -> impl FnOnce(E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    move |e| variant(Box::new(e))
  }

  /// Log the error together with its backend cause.
  pub(crate) fn log(&self, op: &'static str) {
    match std::error::Error::source(self) {
      Some(cause) => tracing::warn!(op, error = %self, cause = %cause, "store operation failed"),
      None => tracing::warn!(op, error = %self, "store operation failed"),
    }
  }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
