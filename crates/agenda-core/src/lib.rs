//! Core types and trait definitions for Agenda, a student organizer.
//!
//! This crate is free of database and terminal dependencies. The client
//! stores, the SQLite backend and the CLI all build on it.

// Native `async fn` in traits; the traits spell out `Send` futures where the
// client stores need them.
#![allow(async_fn_in_trait)]

pub mod backend;
pub mod error;
pub mod path;
pub mod profile;
pub mod schedule;
pub mod subject;
pub mod validate;

pub use error::{Error, Result};
