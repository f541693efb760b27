//! The stores running against the SQLite backends.

use std::{sync::Arc, time::Duration};

use agenda_core::{
  backend::{
    Authenticator, DocumentService, KeyValueStore, PROFILE_BACKUP_KEY, SessionProvider,
  },
  path::DocPath,
  profile::ProfileField,
  subject::{NewSubject, Period, SubjectPatch},
};
use agenda_store_sqlite::{SqliteAuth, SqliteBackup, SqliteDocuments};
use tokio::sync::watch;

use crate::{Phase, ProfileStore, SubjectState, SubjectStore};

struct Backend {
  docs:   Arc<SqliteDocuments>,
  auth:   Arc<SqliteAuth>,
  backup: Arc<SqliteBackup>,
}

async fn signed_in() -> (Backend, String) {
  let backend = Backend {
    docs:   Arc::new(SqliteDocuments::open_in_memory().await.unwrap()),
    auth:   Arc::new(SqliteAuth::open_in_memory().await.unwrap()),
    backup: Arc::new(SqliteBackup::open_in_memory().await.unwrap()),
  };
  let uid = backend
    .auth
    .sign_up("ana@example.com".into(), "secret1".into(), "Ana".into())
    .await
    .unwrap();
  (backend, uid)
}

fn subject(name: &str, hour: u8) -> NewSubject {
  NewSubject {
    name:         name.into(),
    instructor:   "Dr. Ruiz".into(),
    room:         "A1".into(),
    start_hour:   hour,
    start_minute: 0,
    start_period: Period::Am,
    end_hour:     hour,
    end_minute:   50,
    end_period:   Period::Am,
  }
}

async fn wait_until<T: Clone>(rx: &mut watch::Receiver<T>, f: impl FnMut(&T) -> bool) -> T {
  tokio::time::timeout(Duration::from_secs(5), rx.wait_for(f))
    .await
    .expect("state change in time")
    .expect("store alive")
    .clone()
}

fn names(state: &SubjectState) -> Vec<&str> {
  state.subjects.iter().map(|s| s.fields.name.as_str()).collect()
}

#[tokio::test]
async fn subject_lifecycle_end_to_end() {
  let (backend, uid) = signed_in().await;
  let store = SubjectStore::new(backend.docs.clone(), backend.auth.clone());
  let mut rx = store.watch();

  store.subscribe().await;
  let state = wait_until(&mut rx, |s| !s.loading).await;
  assert!(state.subjects.is_empty());
  assert_eq!(state.error, None);

  assert!(store.add_subject(&subject("Algebra", 7)).await);
  assert!(store.add_subject(&subject("Biologia", 9)).await);
  let state = wait_until(&mut rx, |s| s.subjects.len() == 2).await;
  assert_eq!(names(&state), ["Algebra", "Biologia"]);
  assert!(state.subjects.iter().all(|s| s.owner_id == uid && s.id.len() == 20));

  let id = state.subjects[0].id.clone();
  let patch = SubjectPatch { room: Some("B2".into()), ..SubjectPatch::default() };
  assert!(store.update_subject(&id, &patch).await);
  let state = wait_until(&mut rx, |s| s.subjects.first().is_some_and(|s| s.fields.room == "B2")).await;
  assert_eq!(state.subjects[0].fields.name, "Algebra");
  assert_eq!(state.subjects[0].fields.start_hour, 7);

  assert!(store.delete_subject(&id).await);
  let state = wait_until(&mut rx, |s| s.subjects.len() == 1).await;
  assert_eq!(names(&state), ["Biologia"]);
}

#[tokio::test]
async fn subjects_follow_the_account_that_is_signed_in() {
  let (backend, ana) = signed_in().await;
  let store = SubjectStore::new(backend.docs.clone(), backend.auth.clone());
  let mut rx = store.watch();
  store.subscribe().await;
  assert!(store.add_subject(&subject("Privado", 7)).await);
  wait_until(&mut rx, |s| s.subjects.len() == 1).await;

  backend.auth.sign_out().await.unwrap();
  let beto = backend
    .auth
    .sign_up("beto@example.com".into(), "secret2".into(), "Beto".into())
    .await
    .unwrap();
  assert_ne!(ana, beto);
  assert!(store.add_subject(&subject("Propio", 9)).await);

  let state = wait_until(&mut rx, |s| names(s) == ["Propio"]).await;
  assert!(state.subjects.iter().all(|s| s.owner_id == beto));
  assert_eq!(backend.docs.subscriber_count(), 1);
}

#[tokio::test]
async fn subject_store_drop_releases_backend_listener() {
  let (backend, _) = signed_in().await;
  let store = SubjectStore::new(backend.docs.clone(), backend.auth.clone());
  let mut rx = store.watch();
  store.subscribe().await;
  wait_until(&mut rx, |s| !s.loading).await;
  assert_eq!(backend.docs.subscriber_count(), 1);

  drop(store);
  tokio::time::timeout(Duration::from_secs(5), async {
    while backend.docs.subscriber_count() > 0 {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await
  .expect("listener released");
}

#[tokio::test]
async fn profile_save_keeps_subjects_and_survives_reload() {
  let (backend, uid) = signed_in().await;
  let subjects = SubjectStore::new(backend.docs.clone(), backend.auth.clone());
  assert!(subjects.add_subject(&subject("Algebra", 7)).await);

  let profile = ProfileStore::new(backend.docs.clone(), backend.auth.clone(), backend.backup.clone());
  let mut rx = profile.watch();
  profile.load().await;
  wait_until(&mut rx, |s| s.phase == Phase::Ready).await;

  profile.set_field(ProfileField::Name, "Ana Maria");
  profile.set_field(ProfileField::Major, "Biology");
  assert!(profile.set_semester("3"));
  assert!(profile.save().await);

  // The subject collection next to the profile is untouched.
  let stored = backend.docs.get(DocPath::subjects(&uid).unwrap()).await.unwrap();
  assert_eq!(stored.and_then(|v| v.as_object().map(|m| m.len())), Some(1));
  assert_eq!(backend.auth.display_name().await.unwrap(), Some("Ana Maria".into()));
  assert!(backend.backup.get_item(PROFILE_BACKUP_KEY.into()).await.unwrap().is_some());

  let fresh = ProfileStore::new(backend.docs.clone(), backend.auth.clone(), backend.backup.clone());
  let mut rx = fresh.watch();
  fresh.load().await;
  let state = wait_until(&mut rx, |s| s.phase == Phase::Ready).await;
  assert_eq!(state.profile.name, "Ana Maria");
  assert_eq!(state.profile.major, "Biology");
  assert_eq!(state.profile.semester, Some(3));
}

#[tokio::test]
async fn logout_ends_session_and_clears_backup() {
  let (backend, _) = signed_in().await;
  let profile = ProfileStore::new(backend.docs.clone(), backend.auth.clone(), backend.backup.clone());
  profile.set_field(ProfileField::Name, "Ana");
  assert!(profile.save().await);

  assert!(profile.logout().await);
  assert_eq!(profile.state().phase, Phase::LoggedOut);
  assert_eq!(backend.backup.get_item(PROFILE_BACKUP_KEY.into()).await.unwrap(), None);

  let subjects = SubjectStore::new(backend.docs.clone(), backend.auth.clone());
  assert!(!subjects.add_subject(&subject("Algebra", 7)).await);
  assert_eq!(subjects.state().error.as_deref(), Some("no authenticated user"));
}
