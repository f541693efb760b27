//! Client-side stores for Agenda.
//!
//! - [`SubjectStore`]: live mirror of the signed-in user's subjects, with
//!   add/update/delete.
//! - [`ProfileStore`]: the account form, backed by the user document and a
//!   device copy.
//!
//! Both are generic over the backend traits in [`agenda_core::backend`] and
//! publish their state on a `tokio::sync::watch` channel for the shell to
//! render. Failures never escape a store: operations return `bool` and the
//! message lands in the store's `error`.

mod mount;

pub mod error;
pub mod profile;
pub mod subjects;

pub use error::{Result, StoreError};
pub use profile::{Phase, ProfileState, ProfileStore};
pub use subjects::{SubjectState, SubjectStore};

#[cfg(test)]
mod fake;
#[cfg(test)]
mod tests;
