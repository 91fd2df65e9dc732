//! dimvault loader binary.
//!
//! Reads `dimvault.toml` (or the path specified with `--config`), opens the
//! SQLite dimension store, and applies or queries versioned dimension data.
//!
//! # Configuration
//!
//! ```toml
//! store_path = "warehouse.db"
//!
//! [dimensions.customer]
//! default_tracking = "type2"
//!
//! [dimensions.customer.attributes]
//! email       = { tracked_as = "type1", normalize = "trim" }
//! risk_rating = { tracked_as = "type2", normalize = "code" }
//! ```
//!
//! Every key can be overridden with `DIMVAULT_*` environment variables.

mod commands;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dimvault_core::{profile::ProfileSet, store::DimensionStore as _};
use dimvault_engine::VersionManager;
use dimvault_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime loader configuration, deserialised from `dimvault.toml`.
#[derive(Deserialize, Clone)]
struct LoaderConfig {
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
  #[serde(default)]
  dimensions: ProfileSet,
}

fn default_store_path() -> PathBuf { PathBuf::from("dimvault.db") }

// ─── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "dimvault warehouse dimension loader")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "dimvault.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Apply NDJSON as-of records from a file, or stdin with `-`.
  Load {
    #[arg(default_value = "-")]
    input:     PathBuf,
    /// Dimension to assume for records that carry no `dimension` field.
    #[arg(long)]
    dimension: Option<String>,
  },
  /// Print the current version for a natural key.
  Current {
    dimension:   String,
    natural_key: String,
  },
  /// Print the version in effect on a given date.
  AsOf {
    dimension:   String,
    natural_key: String,
    date:        NaiveDate,
  },
  /// Print a natural key's full version history, oldest first.
  History {
    dimension:   String,
    natural_key: String,
  },
  /// Validate a natural key's chain invariants.
  Check {
    dimension:   String,
    natural_key: String,
  },
  /// Push a dimension's surrogate-key counter past bulk-loaded rows.
  AdvanceKeys {
    dimension: String,
    floor:     u64,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("DIMVAULT"))
    .build()
    .context("failed to read config file")?;

  let loader_cfg: LoaderConfig = settings
    .try_deserialize()
    .context("failed to deserialise LoaderConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&loader_cfg.store_path);

  // Open the SQLite store and make sure every configured dimension exists.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  for dimension in loader_cfg.dimensions.dimensions() {
    store.ensure_dimension(dimension).await?;
  }

  let manager = VersionManager::new(store, loader_cfg.dimensions.clone());

  match cli.command {
    Command::Load { input, dimension } => {
      commands::load(&manager, &input, dimension.as_deref()).await
    }
    Command::Current { dimension, natural_key } => {
      commands::current(manager.store(), &dimension, &natural_key).await
    }
    Command::AsOf { dimension, natural_key, date } => {
      commands::as_of(manager.store(), &dimension, &natural_key, date).await
    }
    Command::History { dimension, natural_key } => {
      commands::history(manager.store(), &dimension, &natural_key).await
    }
    Command::Check { dimension, natural_key } => {
      commands::check(manager.store(), &dimension, &natural_key).await
    }
    Command::AdvanceKeys { dimension, floor } => {
      commands::advance_keys(manager.store(), &dimension, floor).await
    }
  }
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
