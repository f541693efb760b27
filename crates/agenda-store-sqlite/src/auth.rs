//! Email/password accounts and the current session.

use std::{path::Path, sync::Arc};

use agenda_core::{
  backend::{Authenticator, SessionProvider},
  validate::{MIN_PASSWORD_LEN, is_valid_email},
};
use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use chrono::Utc;
use rand_core::OsRng;
use rusqlite::OptionalExtension as _;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  schema::{self, REMOTE_SCHEMA},
};

/// Accounts stored next to the document tree, plus the signed-in user.
///
/// Cloning is cheap; clones share the session.
#[derive(Clone)]
pub struct SqliteAuth {
  conn:    tokio_rusqlite::Connection,
  session: Arc<watch::Sender<Option<String>>>,
}

impl SqliteAuth {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = schema::open(path, REMOTE_SCHEMA).await?;
    Ok(Self::with_connection(conn))
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = schema::open_in_memory(REMOTE_SCHEMA).await?;
    Ok(Self::with_connection(conn))
  }

  fn with_connection(conn: tokio_rusqlite::Connection) -> Self {
    let (session, _) = watch::channel(None);
    Self { conn, session: Arc::new(session) }
  }

  /// Re-enter a session for `uid`, e.g. one persisted by the shell between
  /// runs. Fails if the account no longer exists.
  pub async fn restore(&self, uid: &str) -> Result<()> {
    if self.display_name_of(uid).await?.is_none() {
      return Err(Error::UnknownAccount(uid.to_owned()));
    }
    self.start_session(uid.to_owned());
    Ok(())
  }

  /// Display name of the signed-in account.
  pub async fn display_name(&self) -> Result<Option<String>> {
    match self.current_user() {
      Some(uid) => self.display_name_of(&uid).await,
      None => Err(Error::NoSession),
    }
  }

  async fn display_name_of(&self, uid: &str) -> Result<Option<String>> {
    let uid = uid.to_owned();
    let name = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT display_name FROM accounts WHERE uid = ?1",
            rusqlite::params![uid],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;
    Ok(name)
  }

  fn start_session(&self, uid: String) {
    info!(uid = %uid, "session started");
    self.session.send_replace(Some(uid));
  }
}

fn hash_password(password: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .is_ok_and(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

// ─── SessionProvider / Authenticator impls ───────────────────────────────────

impl SessionProvider for SqliteAuth {
  type Error = Error;

  fn current_user(&self) -> Option<String> { self.session.borrow().clone() }

  fn session_changes(&self) -> watch::Receiver<Option<String>> { self.session.subscribe() }

  async fn sign_out(&self) -> Result<()> {
    if let Some(uid) = self.session.send_replace(None) {
      info!(uid = %uid, "session ended");
    }
    Ok(())
  }

  async fn set_display_name(&self, name: String) -> Result<()> {
    let uid = self.current_user().ok_or(Error::NoSession)?;
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE accounts SET display_name = ?1 WHERE uid = ?2",
          rusqlite::params![name, uid],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::NoSession);
    }
    Ok(())
  }
}

impl Authenticator for SqliteAuth {
  async fn sign_up(&self, email: String, password: String, display_name: String) -> Result<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
      return Err(Error::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
      return Err(Error::WeakPassword);
    }

    let password_hash = hash_password(&password)?;
    let uid = Uuid::new_v4().simple().to_string();
    let created_at = Utc::now().to_rfc3339();

    let row_uid = uid.clone();
    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let taken = tx
          .query_row(
            "SELECT 1 FROM accounts WHERE email = ?1",
            rusqlite::params![email],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if taken {
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO accounts (uid, email, password_hash, display_name, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![row_uid, email, password_hash, display_name, created_at],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::EmailAlreadyInUse);
    }
    self.start_session(uid.clone());
    Ok(uid)
  }

  async fn sign_in(&self, email: String, password: String) -> Result<String> {
    let email = email.trim().to_lowercase();
    let account: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT uid, password_hash FROM accounts WHERE email = ?1",
            rusqlite::params![email],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?)
      })
      .await?;

    let (uid, phc) = account.ok_or(Error::InvalidCredentials)?;
    if !verify_password(&password, &phc) {
      return Err(Error::InvalidCredentials);
    }
    self.start_session(uid.clone());
    Ok(uid)
  }
}
