//! SQLite implementations of the Agenda backend traits.
//!
//! - [`SqliteDocuments`]: the realtime document tree, with in-process
//!   subscriptions.
//! - [`SqliteAuth`]: email/password accounts and the current session.
//! - [`SqliteBackup`]: the on-device key-value backup.
//!
//! Each wraps [`tokio_rusqlite`] so database access runs on a dedicated
//! thread without blocking the async runtime.

mod push_id;
mod schema;
mod tree;

pub mod auth;
pub mod backup;
pub mod documents;
pub mod error;

pub use auth::SqliteAuth;
pub use backup::SqliteBackup;
pub use documents::SqliteDocuments;
pub use error::{Error, Result};
