//! Command dispatcher: opens the backends and drives the client stores.

use std::{
  io::{self, BufRead, Write},
  path::Path,
  sync::Arc,
};

use agenda_client::{Phase, ProfileStore, SubjectStore};
use agenda_core::{
  backend::{Authenticator, KeyValueStore, SESSION_KEY, SessionProvider},
  profile::ProfileField,
  schedule::Schedule,
  subject::SubjectPatch,
  validate::{SubjectForm, validate_login, validate_registration, validate_subject_form},
};
use agenda_store_sqlite::{Error as SqliteError, SqliteAuth, SqliteBackup, SqliteDocuments};
use anyhow::{Context as _, anyhow, bail};
use tracing::{debug, warn};

use crate::{AccountCommand, ClientConfig, Command, EditArgs, SubjectArgs, SubjectsCommand, render};

type Subjects = SubjectStore<SqliteDocuments, SqliteAuth>;
type Profile = ProfileStore<SqliteDocuments, SqliteAuth, SqliteBackup>;

// ─── App ─────────────────────────────────────────────────────────────────────

/// The opened backends, shared by every store a command builds.
pub struct App {
  docs:   Arc<SqliteDocuments>,
  auth:   Arc<SqliteAuth>,
  backup: Arc<SqliteBackup>,
}

impl App {
  /// Open both databases and re-enter the session saved by the last run.
  pub async fn open(config: &ClientConfig) -> anyhow::Result<Self> {
    ensure_parent(&config.remote_path)?;
    ensure_parent(&config.device_path)?;

    let docs = SqliteDocuments::open(&config.remote_path)
      .await
      .with_context(|| format!("failed to open documents at {:?}", config.remote_path))?;
    let auth = SqliteAuth::open(&config.remote_path)
      .await
      .with_context(|| format!("failed to open accounts at {:?}", config.remote_path))?;
    let backup = SqliteBackup::open(&config.device_path)
      .await
      .with_context(|| format!("failed to open device backup at {:?}", config.device_path))?;

    let app = Self { docs: Arc::new(docs), auth: Arc::new(auth), backup: Arc::new(backup) };
    app.restore_session().await?;
    Ok(app)
  }

  pub async fn run(&self, command: Command) -> anyhow::Result<()> {
    match command {
      Command::Register { name, email, password } => self.register(&name, &email, &password).await,
      Command::Login { email, password } => self.login(&email, &password).await,
      Command::Logout => self.logout().await,
      Command::Subjects(cmd) => self.subjects(cmd).await,
      Command::Schedule => self.schedule().await,
      Command::Account(cmd) => self.account(cmd).await,
    }
  }

  // ── Session ───────────────────────────────────────────────────────────────

  async fn restore_session(&self) -> anyhow::Result<()> {
    let Some(uid) = self.backup.get_item(SESSION_KEY.to_owned()).await? else {
      return Ok(());
    };
    match self.auth.restore(&uid).await {
      Ok(()) => debug!(uid = %uid, "session restored"),
      Err(SqliteError::UnknownAccount(_)) => {
        warn!(uid = %uid, "saved session refers to a missing account");
        self.backup.remove_item(SESSION_KEY.to_owned()).await?;
      }
      Err(e) => return Err(e).context("failed to restore session"),
    }
    Ok(())
  }

  async fn remember_session(&self, uid: &str) -> anyhow::Result<()> {
    self
      .backup
      .set_item(SESSION_KEY.to_owned(), uid.to_owned())
      .await
      .context("failed to remember session")
  }

  async fn register(&self, name: &str, email: &str, password: &str) -> anyhow::Result<()> {
    validate_registration(name, email, password)?;
    let uid = self
      .auth
      .sign_up(email.trim().to_owned(), password.to_owned(), name.trim().to_owned())
      .await
      .map_err(auth_error)?;
    self.remember_session(&uid).await?;

    // The display name doubles as the profile's initial name.
    let profile = self.profile();
    profile.set_field(ProfileField::Name, name.trim());
    if !profile.save().await {
      warn!("account created but the initial profile was not saved");
    }
    println!("Account created. Welcome, {}!", name.trim());
    Ok(())
  }

  async fn login(&self, email: &str, password: &str) -> anyhow::Result<()> {
    validate_login(email, password)?;
    self
      .auth
      .sign_in(email.trim().to_owned(), password.to_owned())
      .await
      .map_err(auth_error)?;
    let uid = self.require_session()?;
    self.remember_session(&uid).await?;
    println!("Signed in as {}.", email.trim());
    Ok(())
  }

  async fn logout(&self) -> anyhow::Result<()> {
    let profile = self.profile();
    if !profile.logout().await {
      bail!(store_message(profile.state().error, "failed to log out"));
    }
    self.backup.remove_item(SESSION_KEY.to_owned()).await?;
    println!("Signed out.");
    Ok(())
  }

  fn require_session(&self) -> anyhow::Result<String> {
    self
      .auth
      .current_user()
      .ok_or_else(|| anyhow!("not signed in; run `agenda login` first"))
  }

  // ── Subjects ──────────────────────────────────────────────────────────────

  fn subject_store(&self) -> Subjects { SubjectStore::new(self.docs.clone(), self.auth.clone()) }

  fn profile(&self) -> Profile {
    ProfileStore::new(self.docs.clone(), self.auth.clone(), self.backup.clone())
  }

  /// Subscribe and wait for the first snapshot.
  async fn loaded_subjects(&self) -> anyhow::Result<Subjects> {
    self.require_session()?;
    let store = self.subject_store();
    let mut rx = store.watch();
    store.subscribe().await;
    let state = rx.wait_for(|s| !s.loading).await?.clone();
    if let Some(error) = state.error {
      bail!(error);
    }
    Ok(store)
  }

  async fn subjects(&self, cmd: SubjectsCommand) -> anyhow::Result<()> {
    match cmd {
      SubjectsCommand::List => {
        let store = self.loaded_subjects().await?;
        print!("{}", render::subjects(&store.state().subjects));
        Ok(())
      }
      SubjectsCommand::Watch => self.watch_subjects().await,
      SubjectsCommand::Add(args) => self.add_subject(args).await,
      SubjectsCommand::Edit { id, fields } => self.edit_subject(&id, fields).await,
      SubjectsCommand::Delete { id, yes } => self.delete_subject(&id, yes).await,
    }
  }

  async fn watch_subjects(&self) -> anyhow::Result<()> {
    let store = self.loaded_subjects().await?;
    let mut rx = store.watch();
    print!("{}", render::subjects(&rx.borrow_and_update().subjects));

    loop {
      tokio::select! {
        changed = rx.changed() => {
          changed?;
          let state = rx.borrow_and_update().clone();
          if let Some(error) = &state.error {
            eprintln!("{error}");
          }
          println!("──");
          print!("{}", render::subjects(&state.subjects));
        }
        _ = tokio::signal::ctrl_c() => break,
      }
    }
    store.unsubscribe();
    Ok(())
  }

  async fn add_subject(&self, args: SubjectArgs) -> anyhow::Result<()> {
    let form = SubjectForm {
      name:         args.name,
      instructor:   args.instructor,
      room:         args.room,
      start_hour:   args.start_hour,
      start_minute: args.start_minute,
      start_period: args.start_period,
      end_hour:     args.end_hour,
      end_minute:   args.end_minute,
      end_period:   args.end_period,
    };
    let subject = validate_subject_form(&form)?;

    let store = self.subject_store();
    if !store.add_subject(&subject).await {
      bail!(store_message(store.state().error, "failed to add subject"));
    }
    println!("Subject added.");
    Ok(())
  }

  async fn edit_subject(&self, id: &str, args: EditArgs) -> anyhow::Result<()> {
    let patch = SubjectPatch {
      name:         non_blank(args.name, "name")?,
      instructor:   non_blank(args.instructor, "instructor")?,
      room:         non_blank(args.room, "room")?,
      start_hour:   args.start_hour,
      start_minute: args.start_minute,
      start_period: args.start_period,
      end_hour:     args.end_hour,
      end_minute:   args.end_minute,
      end_period:   args.end_period,
    };
    if patch.is_empty() {
      bail!("nothing to change");
    }

    let store = self.subject_store();
    if !store.update_subject(id, &patch).await {
      bail!(store_message(store.state().error, "failed to update subject"));
    }
    println!("Subject updated.");
    Ok(())
  }

  async fn delete_subject(&self, id: &str, yes: bool) -> anyhow::Result<()> {
    if !yes && !confirm(&format!("Delete subject {id}? This cannot be undone."))? {
      println!("Cancelled.");
      return Ok(());
    }
    let store = self.subject_store();
    if !store.delete_subject(id).await {
      bail!(store_message(store.state().error, "failed to delete subject"));
    }
    println!("Subject deleted.");
    Ok(())
  }

  async fn schedule(&self) -> anyhow::Result<()> {
    let store = self.loaded_subjects().await?;
    let state = store.state();
    print!("{}", render::schedule(&Schedule::from_subjects(&state.subjects)));
    Ok(())
  }

  // ── Account ───────────────────────────────────────────────────────────────

  /// Load the profile and wait until the remote copy has been seen.
  async fn loaded_profile(&self) -> anyhow::Result<Profile> {
    self.require_session()?;
    let profile = self.profile();
    let mut rx = profile.watch();
    profile.load().await;
    rx.wait_for(|s| s.phase == Phase::Ready).await?;
    Ok(profile)
  }

  async fn account(&self, cmd: AccountCommand) -> anyhow::Result<()> {
    let profile = self.loaded_profile().await?;
    match cmd {
      AccountCommand::Show => {
        let display_name = self.auth.display_name().await?;
        print!("{}", render::profile(&profile.state(), display_name.as_deref()));
        return Ok(());
      }
      AccountCommand::Set { name, school_id, semester, major, notifications } => {
        // Stop following the remote copy so the edits are not overwritten.
        profile.unsubscribe();
        for (field, value) in [
          (ProfileField::Name, name),
          (ProfileField::SchoolId, school_id),
          (ProfileField::Major, major),
        ] {
          if let Some(value) = value {
            profile.set_field(field, value.trim());
          }
        }
        if let Some(text) = semester
          && !profile.set_semester(&text)
        {
          bail!("semester must be a number from 0 to 14");
        }
        if let Some(enabled) = notifications {
          profile.set_notifications(enabled);
        }
      }
      AccountCommand::Save => profile.unsubscribe(),
    }

    let saved = profile.save().await;
    if !saved {
      bail!(store_message(profile.state().error, "failed to save profile"));
    }
    println!("Profile saved.");
    Ok(())
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
  if let Some(dir) = path.parent()
    && !dir.as_os_str().is_empty()
  {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {dir:?}"))?;
  }
  Ok(())
}

/// Auth errors are shown as their message alone.
fn auth_error(e: SqliteError) -> anyhow::Error {
  match e {
    SqliteError::EmailAlreadyInUse
    | SqliteError::InvalidEmail
    | SqliteError::WeakPassword
    | SqliteError::InvalidCredentials => anyhow!("{e}"),
    other => anyhow::Error::new(other).context("authentication failed"),
  }
}

fn store_message(error: Option<String>, fallback: &str) -> String {
  error.unwrap_or_else(|| fallback.to_owned())
}

fn non_blank(value: Option<String>, field: &str) -> anyhow::Result<Option<String>> {
  match value.map(|v| v.trim().to_owned()) {
    Some(v) if v.is_empty() => bail!("{field} cannot be empty"),
    other => Ok(other),
  }
}

fn confirm(question: &str) -> anyhow::Result<bool> {
  print!("{question} [y/N] ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
