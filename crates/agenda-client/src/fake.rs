//! In-memory doubles of the backend traits for store tests.
//!
//! Nothing here reacts to writes on its own: a test plays the backend by
//! calling [`FakeDocs::emit`] with the snapshot it wants delivered.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
  },
  time::Duration,
};

use agenda_core::{
  backend::{DocumentService, KeyValueStore, SessionProvider, Snapshot, Subscription},
  path::DocPath,
};
use serde_json::{Map, Value};
use tokio::sync::{OwnedMutexGuard, mpsc, watch};

#[derive(Debug, Clone, thiserror::Error)]
#[error("fake backend failure: {0}")]
pub struct FakeError(pub &'static str);

/// Ordered record of calls across several fakes.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
  pub fn record(&self, entry: impl Into<String>) { self.0.lock().unwrap().push(entry.into()); }

  pub fn entries(&self) -> Vec<String> { self.0.lock().unwrap().clone() }
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
  Subscribe(String),
  Get(String),
  Push(String, Value),
  Set(String, Value),
  Update(String, Value),
  Remove(String),
}

type Feed = mpsc::UnboundedSender<Result<Snapshot, FakeError>>;

#[derive(Default)]
pub struct FakeDocs {
  pub journal:    Journal,
  calls:          Mutex<Vec<Call>>,
  values:         Mutex<HashMap<String, Value>>,
  feeds:          Mutex<Vec<(String, Feed)>>,
  released:       Arc<AtomicUsize>,
  keys:           AtomicU64,
  fail_writes:    AtomicBool,
  fail_subscribe: AtomicBool,
  gate:           Arc<tokio::sync::Mutex<()>>,
}

impl FakeDocs {
  pub fn with_journal(journal: Journal) -> Self { Self { journal, ..Self::default() } }

  pub fn calls(&self) -> Vec<Call> { self.calls.lock().unwrap().clone() }

  /// Deliver `value` to every open subscription on `path`; later
  /// subscriptions start from it.
  pub fn emit(&self, path: &str, value: Option<Value>) {
    {
      let mut values = self.values.lock().unwrap();
      match &value {
        Some(v) => values.insert(path.to_owned(), v.clone()),
        None => values.remove(path),
      };
    }
    let snapshot = Snapshot { path: DocPath::parse(path).unwrap(), value };
    self.send(path, || Ok(snapshot.clone()));
  }

  /// Deliver a read error to every open subscription on `path`.
  pub fn fail_feed(&self, path: &str) { self.send(path, || Err(FakeError("permission denied"))); }

  pub fn fail_next_subscribe(&self) { self.fail_subscribe.store(true, Ordering::SeqCst); }

  pub fn fail_writes(&self, fail: bool) { self.fail_writes.store(fail, Ordering::SeqCst); }

  /// Writes block until the returned guard is dropped.
  pub async fn hold_writes(&self) -> OwnedMutexGuard<()> { self.gate.clone().lock_owned().await }

  /// The key handed out by the latest push.
  pub fn last_key(&self) -> String { key(self.keys.load(Ordering::SeqCst)) }

  pub async fn wait_for_released(&self, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
      while self.released.load(Ordering::SeqCst) < n {
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .expect("subscriptions released in time");
  }

  fn send(&self, path: &str, event: impl Fn() -> Result<Snapshot, FakeError>) {
    self
      .feeds
      .lock()
      .unwrap()
      .retain(|(p, feed)| p != path || feed.send(event()).is_ok());
  }

  async fn write(&self, call: Call) -> Result<(), FakeError> {
    self.journal.record(format!("docs.{}", call_name(&call)));
    self.calls.lock().unwrap().push(call);
    let _open = self.gate.lock().await;
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(FakeError("write rejected"));
    }
    Ok(())
  }
}

fn key(n: u64) -> String { format!("-Key{n:016}") }

fn call_name(call: &Call) -> &'static str {
  match call {
    Call::Subscribe(_) => "subscribe",
    Call::Get(_) => "get",
    Call::Push(..) => "push",
    Call::Set(..) => "set",
    Call::Update(..) => "update",
    Call::Remove(_) => "remove",
  }
}

impl DocumentService for FakeDocs {
  type Error = FakeError;

  async fn subscribe(&self, path: DocPath) -> Result<Subscription<FakeError>, FakeError> {
    let raw = path.as_str().to_owned();
    self.calls.lock().unwrap().push(Call::Subscribe(raw.clone()));
    if self.fail_subscribe.swap(false, Ordering::SeqCst) {
      return Err(FakeError("subscribe refused"));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let value = self.values.lock().unwrap().get(&raw).cloned();
    let _ = tx.send(Ok(Snapshot { path, value }));
    self.feeds.lock().unwrap().push((raw, tx));

    let released = self.released.clone();
    Ok(Subscription::new(rx, move || {
      released.fetch_add(1, Ordering::SeqCst);
    }))
  }

  async fn get(&self, path: DocPath) -> Result<Option<Value>, FakeError> {
    let raw = path.as_str().to_owned();
    self.calls.lock().unwrap().push(Call::Get(raw.clone()));
    Ok(self.values.lock().unwrap().get(&raw).cloned())
  }

  async fn push(&self, path: DocPath, value: Value) -> Result<String, FakeError> {
    self.write(Call::Push(path.as_str().to_owned(), value)).await?;
    Ok(key(self.keys.fetch_add(1, Ordering::SeqCst) + 1))
  }

  async fn set(&self, path: DocPath, value: Value) -> Result<(), FakeError> {
    self.write(Call::Set(path.as_str().to_owned(), value)).await
  }

  async fn update(&self, path: DocPath, fields: Map<String, Value>) -> Result<(), FakeError> {
    self
      .write(Call::Update(path.as_str().to_owned(), Value::Object(fields)))
      .await
  }

  async fn remove(&self, path: DocPath) -> Result<(), FakeError> {
    self.write(Call::Remove(path.as_str().to_owned())).await
  }
}

// ─── Session ─────────────────────────────────────────────────────────────────

pub struct FakeSession {
  pub journal:   Journal,
  user:          watch::Sender<Option<String>>,
  display_names: Mutex<Vec<String>>,
  fail:          AtomicBool,
}

impl FakeSession {
  pub fn new(uid: Option<&str>) -> Self { Self::with_journal(uid, Journal::default()) }

  pub fn with_journal(uid: Option<&str>, journal: Journal) -> Self {
    let (user, _) = watch::channel(uid.map(str::to_owned));
    Self { journal, user, display_names: Mutex::new(Vec::new()), fail: AtomicBool::new(false) }
  }

  pub fn display_names(&self) -> Vec<String> { self.display_names.lock().unwrap().clone() }

  pub fn fail(&self, fail: bool) { self.fail.store(fail, Ordering::SeqCst); }

  /// Sign in as `uid`, or out with `None`, as another screen would.
  pub fn switch_to(&self, uid: Option<&str>) { self.user.send_replace(uid.map(str::to_owned)); }

  fn check(&self) -> Result<(), FakeError> {
    if self.fail.load(Ordering::SeqCst) { Err(FakeError("session unavailable")) } else { Ok(()) }
  }
}

impl SessionProvider for FakeSession {
  type Error = FakeError;

  fn current_user(&self) -> Option<String> { self.user.borrow().clone() }

  fn session_changes(&self) -> watch::Receiver<Option<String>> { self.user.subscribe() }

  async fn sign_out(&self) -> Result<(), FakeError> {
    self.journal.record("session.sign_out");
    self.check()?;
    self.user.send_replace(None);
    Ok(())
  }

  async fn set_display_name(&self, name: String) -> Result<(), FakeError> {
    self.journal.record("session.set_display_name");
    self.check()?;
    self.display_names.lock().unwrap().push(name);
    Ok(())
  }
}

// ─── Device backup ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeBackup {
  pub journal: Journal,
  items:       Mutex<HashMap<String, String>>,
  fail:        AtomicBool,
}

impl FakeBackup {
  pub fn with_journal(journal: Journal) -> Self { Self { journal, ..Self::default() } }

  pub fn item(&self, key: &str) -> Option<String> { self.items.lock().unwrap().get(key).cloned() }

  pub fn put(&self, key: &str, value: &str) {
    self.items.lock().unwrap().insert(key.to_owned(), value.to_owned());
  }

  pub fn fail(&self, fail: bool) { self.fail.store(fail, Ordering::SeqCst); }

  fn check(&self) -> Result<(), FakeError> {
    if self.fail.load(Ordering::SeqCst) { Err(FakeError("storage full")) } else { Ok(()) }
  }
}

impl KeyValueStore for FakeBackup {
  type Error = FakeError;

  async fn get_item(&self, key: String) -> Result<Option<String>, FakeError> {
    self.journal.record("backup.get");
    self.check()?;
    Ok(self.items.lock().unwrap().get(&key).cloned())
  }

  async fn set_item(&self, key: String, value: String) -> Result<(), FakeError> {
    self.journal.record("backup.set");
    self.check()?;
    self.items.lock().unwrap().insert(key, value);
    Ok(())
  }

  async fn remove_item(&self, key: String) -> Result<(), FakeError> {
    self.journal.record("backup.remove");
    self.check()?;
    self.items.lock().unwrap().remove(&key);
    Ok(())
  }
}
