//! Lifetime of a store's background listener.

use std::sync::{
  Arc, Mutex, PoisonError,
  atomic::{AtomicBool, AtomicU64, Ordering},
};

use agenda_core::backend::{Snapshot, Subscription};
use tokio::{sync::watch, task::JoinHandle};

/// Tracks whether a store is mounted and owns the task that feeds it
/// snapshots.
///
/// Every (re)subscribe starts a new generation. A listener keeps the
/// [`Generation`] it was started with and stops publishing once a newer one
/// exists, so a replaced or released listener can never overwrite state.
/// Dropping the mount aborts the task, which drops its subscription.
pub(crate) struct Mount {
  current: Arc<AtomicU64>,
  mounted: AtomicBool,
  task:    Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub(crate) struct Generation {
  current: Arc<AtomicU64>,
  id:      u64,
}

impl Generation {
  pub fn is_current(&self) -> bool { self.current.load(Ordering::SeqCst) == self.id }

  /// Apply `f` to the state while this generation is still current. The
  /// check runs under the channel's write lock, so once [`Mount::fence`]
  /// returns no stale write can land. Returns `false` for a stale generation.
  pub fn publish<T>(&self, state: &watch::Sender<T>, f: impl FnOnce(&mut T)) -> bool {
    state.send_if_modified(|s| {
      if !self.is_current() {
        return false;
      }
      f(s);
      true
    })
  }
}

/// The next event of an open subscription. Never resolves without one.
pub(crate) async fn next_event<E>(
  subscription: &mut Option<Subscription<E>>,
) -> Option<Result<Snapshot, E>> {
  match subscription {
    Some(subscription) => subscription.next().await,
    None => std::future::pending().await,
  }
}

impl Mount {
  pub fn new() -> Self {
    Self {
      current: Arc::new(AtomicU64::new(0)),
      mounted: AtomicBool::new(true),
      task:    Mutex::new(None),
    }
  }

  /// Release any running listener and start a new generation.
  pub fn remount(&self) -> Generation {
    self.abort();
    self.mounted.store(true, Ordering::SeqCst);
    let id = self.current.fetch_add(1, Ordering::SeqCst) + 1;
    Generation { current: self.current.clone(), id }
  }

  /// Hand the listener task for `generation` to the mount. A task for a
  /// generation that has already been replaced is aborted instead.
  pub fn attach(&self, generation: &Generation, task: JoinHandle<()>) {
    let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
    if !generation.is_current() {
      task.abort();
      return;
    }
    if let Some(old) = slot.replace(task) {
      old.abort();
    }
  }

  /// Stop the listener and refuse late results from here on.
  pub fn unmount(&self) {
    self.mounted.store(false, Ordering::SeqCst);
    self.current.fetch_add(1, Ordering::SeqCst);
    self.abort();
  }

  pub fn is_mounted(&self) -> bool { self.mounted.load(Ordering::SeqCst) }

  /// Wait out a write to `state` already under way. Call after
  /// [`Mount::unmount`].
  pub fn fence<T>(&self, state: &watch::Sender<T>) { state.send_if_modified(|_| false); }

  fn abort(&self) {
    if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
      task.abort();
    }
  }
}

impl Drop for Mount {
  fn drop(&mut self) { self.unmount(); }
}
