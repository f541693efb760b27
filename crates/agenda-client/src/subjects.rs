//! [`SubjectStore`]: the live list of the signed-in user's subjects.
//!
//! The list only ever changes through the subscription. Mutations report
//! success or failure and leave it to the next snapshot to show the result.

use std::sync::Arc;

use agenda_core::{
  backend::{DocumentService, SessionProvider, Snapshot, Subscription},
  path::DocPath,
  subject::{NewSubject, SubjectPatch, SubjectRecord},
};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
  Result, StoreError,
  mount::{Generation, Mount, next_event},
};

/// What a subject screen renders.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectState {
  /// In the backend's snapshot order.
  pub subjects: Vec<SubjectRecord>,
  pub loading:  bool,
  pub error:    Option<String>,
}

impl Default for SubjectState {
  fn default() -> Self { Self { subjects: Vec::new(), loading: true, error: None } }
}

pub struct SubjectStore<D, S> {
  docs:    Arc<D>,
  session: Arc<S>,
  state:   Arc<watch::Sender<SubjectState>>,
  mount:   Mount,
}

impl<D, S> SubjectStore<D, S>
where
  D: DocumentService + 'static,
  S: SessionProvider,
{
  pub fn new(docs: Arc<D>, session: Arc<S>) -> Self {
    let (state, _) = watch::channel(SubjectState::default());
    Self { docs, session, state: Arc::new(state), mount: Mount::new() }
  }

  /// The current state.
  pub fn state(&self) -> SubjectState { self.state.borrow().clone() }

  /// Observe every state change.
  pub fn watch(&self) -> watch::Receiver<SubjectState> { self.state.subscribe() }

  /// Start mirroring `users/{uid}/materias`, replacing any earlier listener.
  ///
  /// The listener follows the session: signing out empties the list, and
  /// signing in as another user switches to that user's subjects.
  pub async fn subscribe(&self) {
    let generation = self.mount.remount();
    let mut changes = self.session.session_changes();
    let uid = changes.borrow_and_update().clone();

    let subscription = open(&*self.docs, uid.as_deref(), &self.state, &generation).await;
    let task = tokio::spawn(follow(
      self.docs.clone(),
      changes,
      uid,
      subscription,
      self.state.clone(),
      generation.clone(),
    ));
    self.mount.attach(&generation, task);
  }

  /// Release the listener. Results of mutations still in flight are
  /// discarded.
  pub fn unsubscribe(&self) {
    self.mount.unmount();
    self.mount.fence(&self.state);
  }

  /// Push a new subject. The caller validates first; the owner and creation
  /// time are stamped here.
  pub async fn add_subject(&self, subject: &NewSubject) -> bool {
    let result = self.try_add_subject(subject).await;
    self.settle("add_subject", result)
  }

  /// Merge `patch` into the subject with `id`.
  pub async fn update_subject(&self, id: &str, patch: &SubjectPatch) -> bool {
    let result = self.try_update_subject(id, patch).await;
    self.settle("update_subject", result)
  }

  /// Delete the subject with `id`, whether or not it is in the list.
  pub async fn delete_subject(&self, id: &str) -> bool {
    let result = self.try_delete_subject(id).await;
    self.settle("delete_subject", result)
  }

  async fn try_add_subject(&self, subject: &NewSubject) -> Result<String> {
    let uid = self.session.current_user().ok_or(StoreError::NoSession)?;
    let path = DocPath::subjects(&uid).map_err(StoreError::wrap(StoreError::AddSubject))?;
    let document = subject
      .to_document(&uid, Utc::now())
      .map_err(StoreError::wrap(StoreError::AddSubject))?;
    let key = self
      .docs
      .push(path, document)
      .await
      .map_err(StoreError::wrap(StoreError::AddSubject))?;
    debug!(key = %key, "subject added");
    Ok(key)
  }

  async fn try_update_subject(&self, id: &str, patch: &SubjectPatch) -> Result<()> {
    let uid = self.session.current_user().ok_or(StoreError::NoSession)?;
    let path = DocPath::subject(&uid, id).map_err(StoreError::wrap(StoreError::UpdateSubject))?;
    let fields = patch
      .to_fields()
      .map_err(StoreError::wrap(StoreError::UpdateSubject))?;
    self
      .docs
      .update(path, fields)
      .await
      .map_err(StoreError::wrap(StoreError::UpdateSubject))
  }

  async fn try_delete_subject(&self, id: &str) -> Result<()> {
    let uid = self.session.current_user().ok_or(StoreError::NoSession)?;
    let path = DocPath::subject(&uid, id).map_err(StoreError::wrap(StoreError::DeleteSubject))?;
    self
      .docs
      .remove(path)
      .await
      .map_err(StoreError::wrap(StoreError::DeleteSubject))
  }

  /// Turn a mutation result into the `bool` a screen sees, storing the
  /// message on failure unless the store has been unmounted meanwhile.
  fn settle<T>(&self, op: &'static str, result: Result<T>) -> bool {
    match result {
      Ok(_) => true,
      Err(err) => {
        err.log(op);
        self.state.send_if_modified(|s| {
          if !self.mount.is_mounted() {
            return false;
          }
          s.error = Some(err.to_string());
          true
        });
        false
      }
    }
  }
}

/// Open the subject feed for `uid`, or record why there is none.
async fn open<D: DocumentService>(
  docs: &D,
  uid: Option<&str>,
  state: &watch::Sender<SubjectState>,
  generation: &Generation,
) -> Option<Subscription<D::Error>> {
  let Some(uid) = uid else {
    generation.publish(state, |s| {
      s.subjects.clear();
      s.loading = false;
      s.error = Some(StoreError::NoSession.to_string());
    });
    return None;
  };

  let opened = match DocPath::subjects(uid) {
    Ok(path) => docs
      .subscribe(path)
      .await
      .map_err(StoreError::wrap(StoreError::LoadSubjects)),
    Err(e) => Err(StoreError::LoadSubjects(Box::new(e))),
  };
  match opened {
    Ok(subscription) => {
      debug!(uid = %uid, "listening for subjects");
      Some(subscription)
    }
    Err(err) => {
      err.log("subscribe");
      generation.publish(state, |s| {
        s.loading = false;
        s.error = Some(err.to_string());
      });
      None
    }
  }
}

/// Feed snapshots into the state and reopen the feed whenever the signed-in
/// user changes.
async fn follow<D: DocumentService>(
  docs: Arc<D>,
  mut changes: watch::Receiver<Option<String>>,
  mut uid: Option<String>,
  mut subscription: Option<Subscription<D::Error>>,
  state: Arc<watch::Sender<SubjectState>>,
  generation: Generation,
) {
  let mut sessions_open = true;
  loop {
    tokio::select! {
      event = next_event(&mut subscription), if subscription.is_some() => match event {
        Some(event) => {
          if !apply(&state, &generation, event) {
            break;
          }
        }
        None => subscription = None,
      },
      changed = changes.changed(), if sessions_open => {
        if changed.is_err() {
          sessions_open = false;
          continue;
        }
        let next = changes.borrow_and_update().clone();
        if next == uid {
          continue;
        }
        debug!(from = ?uid, to = ?next, "session changed");
        // Release the old user's feed before anything else is shown.
        subscription = None;
        uid = next;
        if !generation.publish(&state, |s| *s = SubjectState::default()) {
          break;
        }
        subscription = open(&*docs, uid.as_deref(), &state, &generation).await;
      }
      else => break,
    }
  }
}

fn apply<E>(
  state: &watch::Sender<SubjectState>,
  generation: &Generation,
  event: Result<Snapshot, E>,
) -> bool
where
  E: std::error::Error + Send + Sync + 'static,
{
  match event {
    Ok(snapshot) => {
      let subjects = decode(&snapshot);
      debug!(count = subjects.len(), "subjects snapshot");
      generation.publish(state, |s| {
        s.subjects = subjects;
        s.loading = false;
        s.error = None;
      })
    }
    Err(e) => {
      // Keep the last good list.
      let err = StoreError::LoadSubjects(Box::new(e));
      err.log("listen");
      generation.publish(state, |s| {
        s.loading = false;
        s.error = Some(err.to_string());
      })
    }
  }
}

/// Every child of the snapshot becomes one subject, keyed by its entry key.
/// An entry that does not decode is skipped.
fn decode(snapshot: &Snapshot) -> Vec<SubjectRecord> {
  snapshot
    .children()
    .filter_map(|(key, value)| match SubjectRecord::from_entry(key, value) {
      Ok(record) => Some(record),
      Err(e) => {
        warn!(key, error = %e, "skipping malformed subject");
        None
      }
    })
    .collect()
}
