//! Traits for the collaborators the client stores talk to.
//!
//! - [`SessionProvider`] / [`Authenticator`]: who is signed in.
//! - [`DocumentService`]: the realtime document tree.
//! - [`KeyValueStore`]: the on-device backup.
//!
//! The traits are implemented by `agenda-store-sqlite`; the stores in
//! `agenda-client` depend only on this abstraction. All methods return `Send`
//! futures so the stores can drive them from spawned tokio tasks.

use std::future::Future;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};

use crate::path::DocPath;

/// Device-backup key holding the last saved profile.
pub const PROFILE_BACKUP_KEY: &str = "@user_data";

/// Device-backup key holding the signed-in user id between runs.
pub const SESSION_KEY: &str = "@session";

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// The full value at a path at one moment, as pushed to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
  pub path:  DocPath,
  /// `None` when nothing is stored at or below the path.
  pub value: Option<Value>,
}

impl Snapshot {
  pub fn exists(&self) -> bool { self.value.is_some() }

  /// Direct children of an object value, in key order. Scalars and absent
  /// values have no children.
  pub fn children(&self) -> impl Iterator<Item = (&str, &Value)> {
    self
      .value
      .as_ref()
      .and_then(Value::as_object)
      .into_iter()
      .flat_map(|map| map.iter().map(|(k, v)| (k.as_str(), v)))
  }
}

/// A live listener on one path.
///
/// The first event is the current value; every later event follows a change
/// at or below the path. Dropping the handle releases the listener.
pub struct Subscription<E> {
  events:  mpsc::UnboundedReceiver<Result<Snapshot, E>>,
  release: Option<Box<dyn FnOnce() + Send>>,
}

impl<E> Subscription<E> {
  /// `release` runs exactly once, when the handle is dropped.
  pub fn new(
    events: mpsc::UnboundedReceiver<Result<Snapshot, E>>,
    release: impl FnOnce() + Send + 'static,
  ) -> Self {
    Self { events, release: Some(Box::new(release)) }
  }

  /// Wait for the next snapshot. `None` once the service has gone away.
  pub async fn next(&mut self) -> Option<Result<Snapshot, E>> { self.events.recv().await }
}

impl<E> Drop for Subscription<E> {
  fn drop(&mut self) {
    if let Some(release) = self.release.take() {
      release();
    }
  }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// Knows which user, if any, is signed in.
pub trait SessionProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The signed-in user's id.
  fn current_user(&self) -> Option<String>;

  /// Observe sign-in and sign-out.
  fn session_changes(&self) -> watch::Receiver<Option<String>>;

  /// End the session.
  fn sign_out(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Change the signed-in account's display name.
  fn set_display_name(
    &self,
    name: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

/// Creates accounts and opens sessions. Both calls return the user id.
pub trait Authenticator: SessionProvider {
  fn sign_up(
    &self,
    email: String,
    password: String,
    display_name: String,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  fn sign_in(
    &self,
    email: String,
    password: String,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// A realtime JSON document tree.
///
/// Writes are last-write-wins; each one is atomic at its path.
pub trait DocumentService: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Listen for the value at `path`.
  fn subscribe(
    &self,
    path: DocPath,
  ) -> impl Future<Output = Result<Subscription<Self::Error>, Self::Error>> + Send + '_;

  /// One-shot read. `None` when nothing is stored there.
  fn get(
    &self,
    path: DocPath,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + '_;

  /// Store `value` under a new, service-generated child key of `path` and
  /// return the key. Keys sort in creation order.
  fn push(
    &self,
    path: DocPath,
    value: Value,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  /// Replace the subtree at `path`. `null` removes it.
  fn set(
    &self,
    path: DocPath,
    value: Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Merge `fields` into the object at `path`. A `null` field is removed;
  /// fields not named are kept.
  fn update(
    &self,
    path: DocPath,
    fields: Map<String, Value>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete the subtree at `path`. Deleting nothing succeeds.
  fn remove(&self, path: DocPath) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Device backup ───────────────────────────────────────────────────────────

/// Small string store on the device. Never authoritative.
pub trait KeyValueStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn get_item(
    &self,
    key: String,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  fn set_item(
    &self,
    key: String,
    value: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn remove_item(&self, key: String) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use serde_json::json;

  use super::*;

  #[test]
  fn children_of_absent_and_scalar_values() {
    let path = DocPath::subjects("u1").unwrap();
    let absent = Snapshot { path: path.clone(), value: None };
    assert_eq!(absent.children().count(), 0);
    assert!(!absent.exists());

    let scalar = Snapshot { path: path.clone(), value: Some(json!(3)) };
    assert_eq!(scalar.children().count(), 0);

    let object = Snapshot { path, value: Some(json!({ "b": 2, "a": 1 })) };
    let keys: Vec<_> = object.children().map(|(k, _)| k).collect();
    assert_eq!(keys, ["a", "b"]);
  }

  #[tokio::test]
  async fn subscription_releases_once_on_drop() {
    let released = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::unbounded_channel::<Result<Snapshot, std::io::Error>>();

    let counter = released.clone();
    let mut sub = Subscription::new(rx, move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    let snapshot = Snapshot { path: DocPath::root(), value: None };
    tx.send(Ok(snapshot.clone())).unwrap();
    assert_eq!(sub.next().await.unwrap().unwrap(), snapshot);

    drop(sub);
    assert_eq!(released.load(Ordering::SeqCst), 1);
  }
}
