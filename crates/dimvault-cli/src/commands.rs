//! Subcommand implementations for the `dimvault` binary.

use std::{
  fs::File,
  io::{self, BufRead, BufReader},
  path::Path,
};

use anyhow::Context as _;
use chrono::NaiveDate;
use dimvault_core::{
  chain,
  store::{DimensionStore, VersionCursor},
  version::{AsOfRecord, DimensionId, NaturalKey, SurrogateKey},
};
use dimvault_engine::{ApplyOutcome, VersionManager};
use dimvault_store_sqlite::SqliteStore;
use uuid::Uuid;

// ─── load ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LoadCounts {
  created:     usize,
  versioned:   usize,
  overwritten: usize,
  unchanged:   usize,
  failed:      usize,
}

pub async fn load(
  manager: &VersionManager<SqliteStore>,
  input: &Path,
  assume_dimension: Option<&str>,
) -> anyhow::Result<()> {
  let run_id = Uuid::new_v4();
  tracing::info!(%run_id, input = %input.display(), "starting load");

  let reader: Box<dyn BufRead> = if input.as_os_str() == "-" {
    Box::new(BufReader::new(io::stdin()))
  } else {
    Box::new(BufReader::new(
      File::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?,
    ))
  };

  let mut counts = LoadCounts::default();
  let mut total = 0usize;

  for (line_no, line) in reader.lines().enumerate() {
    let line_no = line_no + 1;
    let line = line.with_context(|| format!("read error at line {line_no}"))?;
    if line.trim().is_empty() {
      continue;
    }
    total += 1;

    let record = match parse_record(&line, assume_dimension) {
      Ok(record) => record,
      Err(error) => {
        tracing::error!(%run_id, line_no, %error, "unparseable record");
        counts.failed += 1;
        continue;
      }
    };

    match manager.apply(&record).await {
      Ok(outcome) => note_outcome(run_id, line_no, &record, &outcome, &mut counts),
      Err(error) => {
        // An integrity error halts only this natural key; the run goes on.
        tracing::error!(
          %run_id,
          line_no,
          natural_key = %record.natural_key,
          %error,
          "record failed"
        );
        counts.failed += 1;
      }
    }
  }

  tracing::info!(
    %run_id,
    total,
    created = counts.created,
    versioned = counts.versioned,
    overwritten = counts.overwritten,
    unchanged = counts.unchanged,
    failed = counts.failed,
    "load finished"
  );

  if counts.failed > 0 {
    anyhow::bail!("{} of {} records failed", counts.failed, total);
  }
  Ok(())
}

fn parse_record(
  line: &str,
  assume_dimension: Option<&str>,
) -> anyhow::Result<AsOfRecord> {
  let mut value: serde_json::Value = serde_json::from_str(line)?;

  if value.get("dimension").is_none()
    && let (Some(obj), Some(dimension)) = (value.as_object_mut(), assume_dimension)
  {
    obj.insert("dimension".into(), serde_json::json!(dimension));
  }

  Ok(serde_json::from_value(value)?)
}

fn note_outcome(
  run_id: Uuid,
  line_no: usize,
  record: &AsOfRecord,
  outcome: &ApplyOutcome,
  counts: &mut LoadCounts,
) {
  let natural_key = &record.natural_key;
  match outcome {
    ApplyOutcome::Created { surrogate_key } => {
      counts.created += 1;
      tracing::info!(%run_id, line_no, %natural_key, %surrogate_key, "created");
    }
    ApplyOutcome::Versioned { closed, opened } => {
      counts.versioned += 1;
      tracing::info!(%run_id, line_no, %natural_key, %closed, %opened, "versioned");
    }
    ApplyOutcome::Overwritten { surrogate_key, attributes } => {
      counts.overwritten += 1;
      tracing::info!(
        %run_id, line_no, %natural_key, %surrogate_key,
        attributes = ?attributes, "overwritten"
      );
    }
    ApplyOutcome::Unchanged { surrogate_key } => {
      counts.unchanged += 1;
      tracing::debug!(%run_id, line_no, %natural_key, %surrogate_key, "unchanged");
    }
  }
}

// ─── Queries ──────────────────────────────────────────────────────────────────

pub async fn current(
  store: &SqliteStore,
  dimension: &str,
  natural_key: &str,
) -> anyhow::Result<()> {
  let dimension = DimensionId::new(dimension)?;
  let natural_key = NaturalKey::new(natural_key)?;

  match store.current_version(&dimension, &natural_key).await? {
    Some(version) => {
      println!("{}", serde_json::to_string_pretty(&version)?);
      Ok(())
    }
    None => Err(dimvault_core::Error::NotFound { dimension, natural_key }.into()),
  }
}

pub async fn as_of(
  store: &SqliteStore,
  dimension: &str,
  natural_key: &str,
  date: NaiveDate,
) -> anyhow::Result<()> {
  let dimension = DimensionId::new(dimension)?;
  let natural_key = NaturalKey::new(natural_key)?;

  match store.version_as_of(&dimension, &natural_key, date).await? {
    Some(version) => {
      println!("{}", serde_json::to_string_pretty(&version)?);
      Ok(())
    }
    None => Err(dimvault_core::Error::NotFound { dimension, natural_key }.into()),
  }
}

pub async fn history(
  store: &SqliteStore,
  dimension: &str,
  natural_key: &str,
) -> anyhow::Result<()> {
  let dimension = DimensionId::new(dimension)?;
  let natural_key = NaturalKey::new(natural_key)?;

  let mut cursor = VersionCursor::new(store, dimension, natural_key);
  while let Some(version) = cursor.next().await? {
    println!("{}", serde_json::to_string(&version)?);
  }
  Ok(())
}

pub async fn check(
  store: &SqliteStore,
  dimension: &str,
  natural_key: &str,
) -> anyhow::Result<()> {
  let dimension = DimensionId::new(dimension)?;
  let natural_key = NaturalKey::new(natural_key)?;

  let versions = store.all_versions(&dimension, &natural_key).await?;
  chain::validate(&versions)
    .with_context(|| format!("chain invariants violated for {natural_key}"))?;
  println!("ok: {} version(s), chain is consistent", versions.len());
  Ok(())
}

pub async fn advance_keys(
  store: &SqliteStore,
  dimension: &str,
  floor: u64,
) -> anyhow::Result<()> {
  let dimension = DimensionId::new(dimension)?;
  store.advance_key_floor(&dimension, SurrogateKey(floor)).await?;
  tracing::info!(%dimension, floor, "surrogate-key floor advanced");
  Ok(())
}
