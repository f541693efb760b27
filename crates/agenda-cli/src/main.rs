//! `agenda`: command-line shell for the Agenda student organizer.
//!
//! # Usage
//!
//! ```
//! agenda register --name Ana --email ana@example.com --password secret1
//! agenda subjects add --name Algebra --instructor "Dr. Ruiz" --room A1 \
//!   --start-hour 7 --start-minute 0 --end-hour 8 --end-minute 30
//! agenda schedule
//! agenda --config ~/.config/agenda/config.toml account show
//! ```

mod app;
mod render;

use std::path::{Path, PathBuf};

use agenda_core::subject::Period;
use anyhow::Context as _;
use app::App;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "agenda", version, about = "Subjects, schedule and profile for students")]
struct Cli {
  /// Path to a TOML config file (remote_path, device_path).
  #[arg(short, long, value_name = "FILE", default_value = "~/.config/agenda/config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Create an account and sign in.
  Register {
    #[arg(long)]
    name:     String,
    #[arg(long)]
    email:    String,
    #[arg(long, env = "AGENDA_PASSWORD")]
    password: String,
  },
  /// Sign in to an existing account.
  Login {
    #[arg(long)]
    email:    String,
    #[arg(long, env = "AGENDA_PASSWORD")]
    password: String,
  },
  /// Sign out and forget the profile stored on this device.
  Logout,
  #[command(subcommand)]
  Subjects(SubjectsCommand),
  /// Your classes ordered by start time.
  Schedule,
  #[command(subcommand)]
  Account(AccountCommand),
}

/// Manage your subjects.
#[derive(Subcommand, Debug)]
pub enum SubjectsCommand {
  List,
  /// Print the list again every time it changes, until Ctrl-C.
  Watch,
  Add(SubjectArgs),
  /// Change some fields of a subject.
  Edit {
    id:     String,
    #[command(flatten)]
    fields: EditArgs,
  },
  Delete {
    id:  String,
    /// Skip the confirmation prompt.
    #[arg(short, long)]
    yes: bool,
  },
}

#[derive(Args, Debug)]
pub struct SubjectArgs {
  #[arg(long)]
  pub name:         String,
  #[arg(long)]
  pub instructor:   String,
  #[arg(long)]
  pub room:         String,
  #[arg(long)]
  pub start_hour:   String,
  #[arg(long)]
  pub start_minute: String,
  #[arg(long, default_value_t = Period::Am)]
  pub start_period: Period,
  #[arg(long)]
  pub end_hour:     String,
  #[arg(long)]
  pub end_minute:   String,
  #[arg(long, default_value_t = Period::Am)]
  pub end_period:   Period,
}

#[derive(Args, Debug)]
pub struct EditArgs {
  #[arg(long)]
  pub name:         Option<String>,
  #[arg(long)]
  pub instructor:   Option<String>,
  #[arg(long)]
  pub room:         Option<String>,
  #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
  pub start_hour:   Option<u8>,
  #[arg(long, value_parser = clap::value_parser!(u8).range(0..=59))]
  pub start_minute: Option<u8>,
  #[arg(long)]
  pub start_period: Option<Period>,
  #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
  pub end_hour:     Option<u8>,
  #[arg(long, value_parser = clap::value_parser!(u8).range(0..=59))]
  pub end_minute:   Option<u8>,
  #[arg(long)]
  pub end_period:   Option<Period>,
}

/// Your profile.
#[derive(Subcommand, Debug)]
pub enum AccountCommand {
  Show,
  /// Change profile fields and save.
  Set {
    #[arg(long)]
    name:          Option<String>,
    #[arg(long)]
    school_id:     Option<String>,
    /// 0–14; an empty value clears it.
    #[arg(long)]
    semester:      Option<String>,
    #[arg(long)]
    major:         Option<String>,
    #[arg(long)]
    notifications: Option<bool>,
  },
  /// Save the profile as it is now.
  Save,
}

// ─── Config file ─────────────────────────────────────────────────────────────

/// Where the two databases live.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
  /// The document and account database.
  #[serde(default = "default_remote_path")]
  pub remote_path: PathBuf,
  /// The on-device backup.
  #[serde(default = "default_device_path")]
  pub device_path: PathBuf,
}

fn default_remote_path() -> PathBuf { PathBuf::from("~/.local/share/agenda/remote.db") }

fn default_device_path() -> PathBuf { PathBuf::from("~/.local/share/agenda/device.db") }

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so command output stays clean.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(expand_tilde(&cli.config)).required(false))
    .add_source(config::Environment::with_prefix("AGENDA"))
    .build()
    .context("failed to read config file")?;

  let mut client_cfg: ClientConfig = settings
    .try_deserialize()
    .context("failed to deserialise ClientConfig")?;
  client_cfg.remote_path = expand_tilde(&client_cfg.remote_path);
  client_cfg.device_path = expand_tilde(&client_cfg.device_path);

  let app = App::open(&client_cfg).await?;
  app.run(cli.command).await
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
