//! [`ProfileStore`]: the account screen's form data.
//!
//! Persistence is two-tier. The remote user document is authoritative and is
//! written first; the device backup mirrors the last successful save and is
//! only read as a stand-in until the first remote snapshot arrives.

use std::sync::Arc;

use agenda_core::{
  backend::{
    DocumentService, KeyValueStore, PROFILE_BACKUP_KEY, SessionProvider, Snapshot, Subscription,
  },
  path::DocPath,
  profile::{ProfileField, ProfileRecord},
  validate::parse_semester,
};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
  Result, StoreError,
  mount::{Generation, Mount, next_event},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
  #[default]
  Uninitialized,
  /// Waiting for the first remote snapshot; the form may show the backup.
  Loading,
  Ready,
  LoggedOut,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileState {
  pub phase:   Phase,
  pub profile: ProfileRecord,
  pub error:   Option<String>,
}

pub struct ProfileStore<D, S, K> {
  docs:    Arc<D>,
  session: Arc<S>,
  backup:  Arc<K>,
  state:   Arc<watch::Sender<ProfileState>>,
  mount:   Mount,
}

impl<D, S, K> ProfileStore<D, S, K>
where
  D: DocumentService + 'static,
  S: SessionProvider,
  K: KeyValueStore,
{
  pub fn new(docs: Arc<D>, session: Arc<S>, backup: Arc<K>) -> Self {
    let (state, _) = watch::channel(ProfileState::default());
    Self { docs, session, backup, state: Arc::new(state), mount: Mount::new() }
  }

  pub fn state(&self) -> ProfileState { self.state.borrow().clone() }

  pub fn watch(&self) -> watch::Receiver<ProfileState> { self.state.subscribe() }

  /// Show the device backup, then follow the remote profile.
  ///
  /// The listener follows the session: a sign-out elsewhere leaves the store
  /// logged out, and signing in as another user loads that user's profile.
  pub async fn load(&self) {
    let generation = self.mount.remount();
    let mut changes = self.session.session_changes();
    let uid = changes.borrow_and_update().clone();

    let Some(id) = uid.clone() else {
      generation.publish(&self.state, |s| {
        s.phase = Phase::Ready;
        s.profile = ProfileRecord::default();
        s.error = Some(StoreError::NoSession.to_string());
      });
      self.attach(generation, changes, uid, None);
      return;
    };

    generation.publish(&self.state, |s| {
      s.phase = Phase::Loading;
      s.error = None;
    });
    if let Some(profile) = self.read_backup().await {
      generation.publish(&self.state, |s| {
        if s.phase == Phase::Loading {
          s.profile = profile;
        }
      });
    }

    let subscription = open(&*self.docs, &id, &self.state, &generation).await;
    self.attach(generation, changes, uid, subscription);
  }

  fn attach(
    &self,
    generation: Generation,
    changes: watch::Receiver<Option<String>>,
    uid: Option<String>,
    subscription: Option<Subscription<D::Error>>,
  ) {
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

  /// Stop following the remote profile. Late results are discarded.
  pub fn unsubscribe(&self) {
    self.mount.unmount();
    self.mount.fence(&self.state);
  }

  pub fn set_field(&self, field: ProfileField, value: &str) {
    self.state.send_modify(|s| {
      let slot = match field {
        ProfileField::Name => &mut s.profile.name,
        ProfileField::SchoolId => &mut s.profile.school_id,
        ProfileField::Major => &mut s.profile.major,
      };
      value.clone_into(slot);
    });
  }

  /// Apply an edit of the semester box. Non-digits are dropped; an empty box
  /// clears the semester. Returns `false`, keeping the old value, when the
  /// number is out of range.
  pub fn set_semester(&self, text: &str) -> bool {
    let semester = if text.is_empty() {
      None
    } else {
      match parse_semester(text) {
        Some(n) => Some(n),
        None => return false,
      }
    };
    self.state.send_modify(|s| s.profile.semester = semester);
    true
  }

  pub fn set_notifications(&self, enabled: bool) {
    self.state.send_modify(|s| s.profile.notifications_enabled = enabled);
  }

  /// Write every profile field to `users/{uid}`, then mirror to the device.
  pub async fn save(&self) -> bool {
    match self.try_save().await {
      Ok(()) => true,
      Err(err) => {
        err.log("save_profile");
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

  async fn try_save(&self) -> Result<()> {
    let uid = self.session.current_user().ok_or(StoreError::NoSession)?;
    let mut profile = self.state.borrow().profile.clone();
    profile.updated_at = Some(Utc::now());

    let path = DocPath::user(&uid).map_err(StoreError::wrap(StoreError::SaveProfile))?;
    let fields = profile
      .to_fields()
      .map_err(StoreError::wrap(StoreError::SaveProfile))?;
    // A merge, so the subject collection next to the profile survives.
    self
      .docs
      .update(path, fields)
      .await
      .map_err(StoreError::wrap(StoreError::SaveProfile))?;
    debug!(uid = %uid, "profile saved");

    self.write_backup(&profile).await;
    if !profile.name.trim().is_empty() {
      if let Err(e) = self.session.set_display_name(profile.name.clone()).await {
        warn!(error = %e, "could not update display name");
      }
    }

    self.state.send_if_modified(|s| {
      if !self.mount.is_mounted() {
        return false;
      }
      s.profile.updated_at = profile.updated_at;
      s.error = None;
      true
    });
    Ok(())
  }

  /// End the session, then forget the device copy and reset the form. When
  /// the session cannot be ended nothing else changes and the store keeps
  /// following the profile.
  pub async fn logout(&self) -> bool {
    if let Err(e) = self.session.sign_out().await {
      let err = StoreError::Logout(Box::new(e));
      err.log("logout");
      self.state.send_modify(|s| s.error = Some(err.to_string()));
      return false;
    }
    info!("logged out");

    self.unsubscribe();
    if let Err(e) = self.backup.remove_item(PROFILE_BACKUP_KEY.to_owned()).await {
      warn!(error = %e, "could not clear profile backup");
    }
    self.state.send_modify(|s| {
      s.phase = Phase::LoggedOut;
      s.profile = ProfileRecord::default();
      s.error = None;
    });
    true
  }

  async fn read_backup(&self) -> Option<ProfileRecord> {
    let raw = match self.backup.get_item(PROFILE_BACKUP_KEY.to_owned()).await {
      Ok(raw) => raw?,
      Err(e) => {
        warn!(error = %e, "could not read profile backup");
        return None;
      }
    };
    match serde_json::from_str(&raw) {
      Ok(profile) => Some(profile),
      Err(e) => {
        warn!(error = %e, "ignoring unreadable profile backup");
        None
      }
    }
  }

  async fn write_backup(&self, profile: &ProfileRecord) {
    let raw = match serde_json::to_string(profile) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(error = %e, "could not encode profile backup");
        return;
      }
    };
    if let Err(e) = self.backup.set_item(PROFILE_BACKUP_KEY.to_owned(), raw).await {
      warn!(error = %e, "could not write profile backup");
    }
  }
}

async fn open<D: DocumentService>(
  docs: &D,
  uid: &str,
  state: &watch::Sender<ProfileState>,
  generation: &Generation,
) -> Option<Subscription<D::Error>> {
  let opened = match DocPath::user(uid) {
    Ok(path) => docs
      .subscribe(path)
      .await
      .map_err(StoreError::wrap(StoreError::LoadProfile)),
    Err(e) => Err(StoreError::LoadProfile(Box::new(e))),
  };
  match opened {
    Ok(subscription) => {
      debug!(uid = %uid, "listening for profile");
      Some(subscription)
    }
    Err(err) => {
      err.log("load_profile");
      generation.publish(state, |s| {
        s.phase = Phase::Ready;
        s.error = Some(err.to_string());
      });
      None
    }
  }
}

/// Feed profile snapshots into the form and reopen the feed whenever the
/// signed-in user changes.
async fn follow<D: DocumentService>(
  docs: Arc<D>,
  mut changes: watch::Receiver<Option<String>>,
  mut uid: Option<String>,
  mut subscription: Option<Subscription<D::Error>>,
  state: Arc<watch::Sender<ProfileState>>,
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
        subscription = None;
        uid = next;
        // Another user's form values must never show, so the backup is not
        // consulted here.
        let phase = if uid.is_some() { Phase::Loading } else { Phase::LoggedOut };
        let current = generation.publish(&state, |s| {
          s.phase = phase;
          s.profile = ProfileRecord::default();
          s.error = None;
        });
        if !current {
          break;
        }
        if let Some(id) = uid.as_deref() {
          subscription = open(&*docs, id, &state, &generation).await;
        }
      }
      else => break,
    }
  }
}

fn apply<E>(
  state: &watch::Sender<ProfileState>,
  generation: &Generation,
  event: Result<Snapshot, E>,
) -> bool
where
  E: std::error::Error + Send + Sync + 'static,
{
  match event {
    Ok(snapshot) => {
      // No document yet: keep whatever the form shows.
      let decoded = snapshot.value.as_ref().map(ProfileRecord::from_document);
      generation.publish(state, |s| {
        s.phase = Phase::Ready;
        match decoded {
          Some(Ok(profile)) => {
            s.profile = profile;
            s.error = None;
          }
          Some(Err(e)) => {
            warn!(error = %e, "ignoring malformed profile");
          }
          None => {}
        }
      })
    }
    Err(e) => {
      let err = StoreError::LoadProfile(Box::new(e));
      err.log("listen_profile");
      generation.publish(state, |s| {
        s.phase = Phase::Ready;
        s.error = Some(err.to_string());
      })
    }
  }
}
