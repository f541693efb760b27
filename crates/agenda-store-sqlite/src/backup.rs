//! [`SqliteBackup`]: the on-device key-value store.

use std::path::Path;

use agenda_core::backend::KeyValueStore;
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result,
  schema::{self, DEVICE_SCHEMA},
};

#[derive(Clone)]
pub struct SqliteBackup {
  conn: tokio_rusqlite::Connection,
}

impl SqliteBackup {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Ok(Self { conn: schema::open(path, DEVICE_SCHEMA).await? })
  }

  pub async fn open_in_memory() -> Result<Self> {
    Ok(Self { conn: schema::open_in_memory(DEVICE_SCHEMA).await? })
  }
}

impl KeyValueStore for SqliteBackup {
  type Error = Error;

  async fn get_item(&self, key: String) -> Result<Option<String>> {
    let value = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row("SELECT value FROM kv WHERE key = ?1", rusqlite::params![key], |row| {
            row.get(0)
          })
          .optional()?)
      })
      .await?;
    Ok(value)
  }

  async fn set_item(&self, key: String, value: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO kv (key, value) VALUES (?1, ?2)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value",
          rusqlite::params![key, value],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn remove_item(&self, key: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
