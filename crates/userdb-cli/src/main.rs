//! `userdb`: support tooling for the user database.
//!
//! # Usage
//!
//! ```
//! userdb validate --kind phone --list phones.json
//! userdb --config ~/.config/userdb.toml actions 5f1e6b9e8b3c2a0001a1b2c4
//! userdb proofing letter foob-arra
//! ```

mod validate;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use bson::oid::ObjectId;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use userdb_core::{
  DocumentRecord, UnknownFieldPolicy,
  db::{ActionDb, ProofingStateDb},
  proofing::{LetterProofingState, OidcProofingState, ProofingState},
};
use userdb_store_sqlite::{SqliteCollection, SqliteStore};

const ACTIONS_COLLECTION: &str = "actions";
const LETTER_PROOFING_COLLECTION: &str = "letter_proofing_data";
const OIDC_PROOFING_COLLECTION: &str = "oidc_proofing_data";

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "userdb", version, about = "User database support tool")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "userdb.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Check a JSON document (or array) against the typed model and print its
  /// normalized form.
  Validate {
    #[arg(long, value_enum)]
    kind: validate::Kind,

    /// Keep unknown fields instead of rejecting them.
    #[arg(long)]
    lenient: bool,

    /// The input is an array, validated as one list.
    #[arg(long)]
    list: bool,

    file: PathBuf,
  },

  /// List a user's queued actions, most preferred first.
  Actions { user_oid: String },

  /// Show the stored proofing state of a user.
  Proofing { flow: Flow, eppn: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Flow {
  Letter,
  Oidc,
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `userdb.toml` and `USERDB_*`
/// environment variables.
#[derive(Deserialize)]
struct CliConfig {
  store_path: PathBuf,
}

fn load_config(path: PathBuf) -> anyhow::Result<CliConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("USERDB"))
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise CliConfig")
}

async fn open_store(path: PathBuf) -> anyhow::Result<SqliteStore> {
  let config = load_config(path)?;
  let store_path = expand_tilde(&config.store_path);
  tracing::debug!(?store_path, "opening store");
  SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  match cli.command {
    Command::Validate {
      kind,
      lenient,
      list,
      file,
    } => {
      let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;
      let policy = if lenient {
        UnknownFieldPolicy::Passthrough
      } else {
        UnknownFieldPolicy::Reject
      };
      let input = validate::parse_json(&raw)?;
      let docs = validate::validate(kind, input, list, policy)
        .with_context(|| format!("{} is not a valid {kind:?}", file.display()))?;
      print_json(&validate::to_json(docs))?;
    }

    Command::Actions { user_oid } => {
      let user_oid = ObjectId::parse_str(&user_oid)
        .with_context(|| format!("invalid user_oid {user_oid:?}"))?;
      let store = open_store(cli.config).await?;
      let db = ActionDb::new(store.collection(ACTIONS_COLLECTION))
        .with_policy(UnknownFieldPolicy::Passthrough);
      let actions = db
        .get_actions(&user_oid)
        .await
        .context("failed to load actions")?;
      if actions.is_empty() {
        tracing::info!(%user_oid, "no queued actions");
      }
      let docs = actions.iter().map(|a| a.to_document()).collect();
      print_json(&validate::to_json(docs))?;
    }

    Command::Proofing { flow, eppn } => {
      let store = open_store(cli.config).await?;
      let doc = match flow {
        Flow::Letter => {
          show_state::<LetterProofingState>(
            store.collection(LETTER_PROOFING_COLLECTION),
            &eppn,
          )
          .await?
        }
        Flow::Oidc => {
          show_state::<OidcProofingState>(
            store.collection(OIDC_PROOFING_COLLECTION),
            &eppn,
          )
          .await?
        }
      };
      match doc {
        Some(doc) => print_json(&validate::to_json(vec![doc]))?,
        None => anyhow::bail!("no proofing state for {eppn:?}"),
      }
    }
  }

  Ok(())
}

async fn show_state<T: ProofingState>(
  collection: SqliteCollection,
  eppn: &str,
) -> anyhow::Result<Option<bson::Document>> {
  let db: ProofingStateDb<_, T> =
    ProofingStateDb::new(collection).with_policy(UnknownFieldPolicy::Passthrough);
  let state = db
    .get_state_by_eppn(eppn)
    .await
    .with_context(|| format!("failed to load {} for {eppn:?}", T::KIND))?;
  Ok(state.map(|s| s.to_document()))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
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

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tilde_expands_to_home() {
    let home = std::env::var("HOME").unwrap_or_default();
    let expanded = expand_tilde(Path::new("~/userdb.sqlite"));
    if !home.is_empty() {
      assert_eq!(expanded, PathBuf::from(home).join("userdb.sqlite"));
    }
    assert_eq!(expand_tilde(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
  }

  #[test]
  fn cli_parses_subcommands() {
    let cli = Cli::try_parse_from([
      "userdb", "validate", "--kind", "nin-proofing", "--list", "in.json",
    ])
    .unwrap();
    assert!(matches!(
      cli.command,
      Command::Validate { kind: validate::Kind::NinProofing, list: true, .. }
    ));

    let cli = Cli::try_parse_from(["userdb", "proofing", "oidc", "foob-arra"])
      .unwrap();
    assert!(matches!(cli.command, Command::Proofing { flow: Flow::Oidc, .. }));
  }
}
