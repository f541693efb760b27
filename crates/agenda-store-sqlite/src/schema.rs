//! SQL schemas for the document/auth database and the device backup.
//!
//! Both are idempotent thanks to `CREATE TABLE IF NOT EXISTS` and run once per
//! connection.

use std::path::Path;

use tokio_rusqlite::Connection;

use crate::Result;

/// Schema of the database standing in for the hosted service.
pub const REMOTE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per object node of the document tree. Scalars live in the
-- `fields` JSON object of their parent; nested objects are rows of their own.
-- A row is never stored with an empty `fields` object.
CREATE TABLE IF NOT EXISTS nodes (
    path    TEXT PRIMARY KEY,   -- slash-separated, e.g. users/u1/materias/-N..
    fields  TEXT NOT NULL       -- JSON object of scalar fields
);

CREATE TABLE IF NOT EXISTS accounts (
    uid            TEXT PRIMARY KEY,
    email          TEXT NOT NULL UNIQUE,   -- lower-cased
    password_hash  TEXT NOT NULL,          -- argon2 PHC string
    display_name   TEXT NOT NULL,
    created_at     TEXT NOT NULL           -- RFC 3339 UTC
);

PRAGMA user_version = 1;
";

/// Schema of the on-device backup.
pub const DEVICE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key    TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);

PRAGMA user_version = 1;
";

/// Open (or create) a database file and apply `schema`.
pub async fn open(path: impl AsRef<Path>, schema: &'static str) -> Result<Connection> {
  let conn = Connection::open(path).await?;
  init(&conn, schema).await?;
  Ok(conn)
}

/// Open a private in-memory database and apply `schema`.
pub async fn open_in_memory(schema: &'static str) -> Result<Connection> {
  let conn = Connection::open_in_memory().await?;
  init(&conn, schema).await?;
  Ok(conn)
}

async fn init(conn: &Connection, schema: &'static str) -> Result<()> {
  conn
    .call(move |conn| {
      conn.execute_batch(schema)?;
      Ok(())
    })
    .await?;
  Ok(())
}
