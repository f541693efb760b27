//! [`SqliteDocuments`]: the SQLite implementation of [`DocumentService`].

use std::{
  collections::HashMap,
  path::Path,
  sync::{
    Arc, Mutex, PoisonError, Weak,
    atomic::{AtomicU64, Ordering},
  },
};

use agenda_core::{
  backend::{DocumentService, Snapshot, Subscription},
  path::DocPath,
};
use chrono::Utc;
use rand_core::OsRng;
use rusqlite::OptionalExtension as _;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
  Result,
  push_id::PushIds,
  schema::{self, REMOTE_SCHEMA},
  tree::{self, Op},
};

type Events = mpsc::UnboundedSender<Result<Snapshot>>;

struct Watcher {
  path:   DocPath,
  events: Events,
}

#[derive(Default)]
struct Shared {
  /// Held across a write and its snapshot fan-out, so every subscriber sees
  /// snapshots in the order the writes happened.
  write_lock: tokio::sync::Mutex<()>,
  watchers:   Mutex<HashMap<u64, Watcher>>,
  next_id:    AtomicU64,
  push_ids:   Mutex<PushIds>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A realtime document tree backed by a single SQLite file.
///
/// Subscriptions are delivered in-process. Cloning is cheap; clones share the
/// connection and the subscriber list.
#[derive(Clone)]
pub struct SqliteDocuments {
  conn:   tokio_rusqlite::Connection,
  shared: Arc<Shared>,
}

impl SqliteDocuments {
  /// Open (or create) the tree at `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = schema::open(path, REMOTE_SCHEMA).await?;
    Ok(Self { conn, shared: Arc::default() })
  }

  /// Open an empty in-memory tree.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = schema::open_in_memory(REMOTE_SCHEMA).await?;
    Ok(Self { conn, shared: Arc::default() })
  }

  /// Number of live subscriptions.
  pub fn subscriber_count(&self) -> usize {
    self.shared.watchers.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  async fn read(&self, path: &DocPath) -> Result<Option<Value>> {
    let root = path.as_str().to_owned();
    let key = path.key().map(str::to_owned);
    let parent = path.parent().map(|p| p.as_str().to_owned());

    let (rows, parent_fields): (Vec<(String, String)>, Option<String>) = self
      .conn
      .call(move |conn| {
        let rows = if root.is_empty() {
          let mut stmt = conn.prepare("SELECT path, fields FROM nodes")?;
          stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(
            "SELECT path, fields FROM nodes
             WHERE path = ?1 OR substr(path, 1, length(?1) + 1) = ?1 || '/'",
          )?;
          stmt
            .query_map(rusqlite::params![root], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        // No rows below the path: it may still be a scalar field of its parent.
        let parent_fields = match (&parent, rows.is_empty()) {
          (Some(parent), true) => conn
            .query_row(
              "SELECT fields FROM nodes WHERE path = ?1",
              rusqlite::params![parent],
              |row| row.get(0),
            )
            .optional()?,
          _ => None,
        };

        Ok((rows, parent_fields))
      })
      .await?;

    if let (Some(raw), Some(key)) = (parent_fields, key) {
      let mut fields: Map<String, Value> = serde_json::from_str(&raw)?;
      return Ok(fields.remove(&key));
    }

    let rows = rows
      .into_iter()
      .map(|(p, raw)| Ok((p, serde_json::from_str(&raw)?)))
      .collect::<Result<Vec<_>>>()?;
    Ok(tree::assemble(path, rows))
  }

  /// Apply a planned write in one transaction, then notify every subscriber
  /// whose path overlaps `written`.
  async fn write(&self, written: &DocPath, ops: Vec<Op>) -> Result<()> {
    let _guard = self.shared.write_lock.lock().await;

    debug!(path = %written, ops = ops.len(), "applying write");
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for op in ops {
          apply(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    self.notify(written).await;
    Ok(())
  }

  async fn notify(&self, written: &DocPath) {
    let targets: Vec<(u64, DocPath, Events)> = {
      let watchers = self.shared.watchers.lock().unwrap_or_else(PoisonError::into_inner);
      watchers
        .iter()
        .filter(|(_, w)| w.path.overlaps(written))
        .map(|(id, w)| (*id, w.path.clone(), w.events.clone()))
        .collect()
    };

    for (id, path, events) in targets {
      let snapshot = self.read(&path).await.map(|value| Snapshot { path, value });
      if events.send(snapshot).is_err() {
        trace!(id, "dropping closed subscriber");
        self.shared.watchers.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
      }
    }
  }
}

fn apply(tx: &rusqlite::Transaction<'_>, op: Op) -> rusqlite::Result<()> {
  match op {
    Op::DeleteSubtree(path) if path.is_root() => {
      tx.execute("DELETE FROM nodes", [])?;
    }
    Op::DeleteSubtree(path) => {
      tx.execute(
        "DELETE FROM nodes
         WHERE path = ?1 OR substr(path, 1, length(?1) + 1) = ?1 || '/'",
        rusqlite::params![path.as_str()],
      )?;
    }
    Op::InsertRow { row, fields } => {
      tx.execute(
        "INSERT OR REPLACE INTO nodes (path, fields) VALUES (?1, ?2)",
        rusqlite::params![row.as_str(), Value::Object(fields).to_string()],
      )?;
    }
    Op::SetField { row, key, value } => {
      let raw: Option<String> = tx
        .query_row(
          "SELECT fields FROM nodes WHERE path = ?1",
          rusqlite::params![row.as_str()],
          |r| r.get(0),
        )
        .optional()?;
      let mut fields: Map<String, Value> = match raw {
        Some(raw) => serde_json::from_str(&raw)
          .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        None => Map::new(),
      };

      if value.is_null() {
        if fields.remove(&key).is_none() {
          return Ok(());
        }
      } else {
        fields.insert(key, value);
      }

      if fields.is_empty() {
        tx.execute("DELETE FROM nodes WHERE path = ?1", rusqlite::params![row.as_str()])?;
      } else {
        tx.execute(
          "INSERT OR REPLACE INTO nodes (path, fields) VALUES (?1, ?2)",
          rusqlite::params![row.as_str(), Value::Object(fields).to_string()],
        )?;
      }
    }
  }
  Ok(())
}

// ─── DocumentService impl ────────────────────────────────────────────────────

impl DocumentService for SqliteDocuments {
  type Error = crate::Error;

  async fn subscribe(&self, path: DocPath) -> Result<Subscription<Self::Error>> {
    let (events, rx) = mpsc::unbounded_channel();
    let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

    // Register under the write lock so no write slips between the initial
    // snapshot and the first notification.
    let _guard = self.shared.write_lock.lock().await;
    let value = self.read(&path).await?;
    // The receiver is alive until this function returns.
    let _ = events.send(Ok(Snapshot { path: path.clone(), value }));

    debug!(id, path = %path, "subscribed");
    self
      .shared
      .watchers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(id, Watcher { path, events });

    let shared: Weak<Shared> = Arc::downgrade(&self.shared);
    Ok(Subscription::new(rx, move || {
      if let Some(shared) = shared.upgrade() {
        shared.watchers.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
        debug!(id, "unsubscribed");
      }
    }))
  }

  async fn get(&self, path: DocPath) -> Result<Option<Value>> { self.read(&path).await }

  async fn push(&self, path: DocPath, value: Value) -> Result<String> {
    let key = self
      .shared
      .push_ids
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .next(Utc::now().timestamp_millis(), &mut OsRng);
    let child = path.child(&key)?;

    let mut ops = Vec::new();
    tree::plan_set(&child, &value, &mut ops)?;
    self.write(&child, ops).await?;
    Ok(key)
  }

  async fn set(&self, path: DocPath, value: Value) -> Result<()> {
    let mut ops = Vec::new();
    tree::plan_set(&path, &value, &mut ops)?;
    self.write(&path, ops).await
  }

  async fn update(&self, path: DocPath, fields: Map<String, Value>) -> Result<()> {
    let mut ops = Vec::new();
    tree::plan_update(&path, &fields, &mut ops)?;
    self.write(&path, ops).await
  }

  async fn remove(&self, path: DocPath) -> Result<()> {
    let mut ops = Vec::new();
    tree::plan_set(&path, &Value::Null, &mut ops)?;
    self.write(&path, ops).await
  }
}
