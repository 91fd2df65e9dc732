//! [`SqliteStore`] — the SQLite implementation of [`DimensionStore`].

use std::path::Path;

use dimvault_core::{
  attr::AttributeSet,
  store::{DimensionStore, WriteOutcome},
  version::{DimensionId, DimensionVersion, NaturalKey, SurrogateKey},
};

use crate::{
  Error, Result,
  encode::{RawVersion, encode_date, encode_dt},
  schema::{SCHEMA, dimension_ddl},
};

/// `SELECT` column list for a dimension table, with the prefixed key columns
/// aliased to fixed names so one row reader serves every dimension.
fn select_columns(d: &str) -> String {
  format!(
    "{d}_sk AS sk, {d}_nk AS nk, attributes, effective_from_date, \
     effective_to_date, is_current_record, loaded_at"
  )
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawVersion> {
  Ok(RawVersion {
    surrogate_key:       row.get(0)?,
    natural_key:         row.get(1)?,
    attributes:          row.get(2)?,
    effective_from_date: row.get(3)?,
    effective_to_date:   row.get(4)?,
    is_current_record:   row.get(5)?,
    loaded_at:           row.get(6)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A dimension store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn select_versions(
    &self,
    sql: String,
    params: Vec<Box<dyn rusqlite::types::ToSql + Send>>,
  ) -> Result<Vec<DimensionVersion>> {
    let raws: Vec<RawVersion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::types::ToSql> =
          params.iter().map(|p| p.as_ref() as _).collect();
        let rows = stmt
          .query_map(refs.as_slice(), read_raw)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVersion::into_version).collect()
  }

  /// Values bound when inserting a full version row.
  fn insert_params(version: &DimensionVersion) -> Result<InsertParams> {
    Ok(InsertParams {
      sk:         version.surrogate_key.0 as i64,
      nk:         version.natural_key.as_str().to_owned(),
      attributes: serde_json::to_string(&version.attributes)?,
      from:       encode_date(version.effective_from),
      to:         version.effective_to.map(encode_date),
      is_current: version.is_current,
      loaded_at:  encode_dt(version.loaded_at),
    })
  }
}

struct InsertParams {
  sk:         i64,
  nk:         String,
  attributes: String,
  from:       String,
  to:         Option<String>,
  is_current: bool,
  loaded_at:  String,
}

fn insert_sql(d: &str) -> String {
  format!(
    "INSERT INTO dim_{d} (
       {d}_sk, {d}_nk, attributes, effective_from_date, effective_to_date,
       is_current_record, loaded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
  )
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

// ─── DimensionStore impl ─────────────────────────────────────────────────────

impl DimensionStore for SqliteStore {
  type Error = Error;

  // ── Provisioning ──────────────────────────────────────────────────────────

  async fn ensure_dimension(&self, dimension: &DimensionId) -> Result<()> {
    let ddl = dimension_ddl(dimension);
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Queries ───────────────────────────────────────────────────────────────

  async fn current_version(
    &self,
    dimension: &DimensionId,
    natural_key: &NaturalKey,
  ) -> Result<Option<DimensionVersion>> {
    let d = dimension.as_str();
    let sql = format!(
      "SELECT {cols} FROM dim_{d} WHERE {d}_nk = ?1 AND is_current_record = 1",
      cols = select_columns(d),
    );
    let nk = natural_key.as_str().to_owned();

    let mut versions =
      self.select_versions(sql, vec![Box::new(nk)]).await?;

    match versions.len() {
      0 => Ok(None),
      1 => Ok(versions.pop()),
      count => Err(Error::Core(
        dimvault_core::Error::AmbiguousCurrentVersion {
          dimension: dimension.clone(),
          natural_key: natural_key.clone(),
          count,
        },
      )),
    }
  }

  async fn version_as_of(
    &self,
    dimension: &DimensionId,
    natural_key: &NaturalKey,
    date: chrono::NaiveDate,
  ) -> Result<Option<DimensionVersion>> {
    let d = dimension.as_str();
    let sql = format!(
      "SELECT {cols} FROM dim_{d}
       WHERE {d}_nk = ?1
         AND effective_from_date <= ?2
         AND (effective_to_date IS NULL OR effective_to_date > ?2)
       ORDER BY {d}_sk DESC
       LIMIT 1",
      cols = select_columns(d),
    );
    let nk = natural_key.as_str().to_owned();
    let date_str = encode_date(date);

    let mut versions = self
      .select_versions(sql, vec![Box::new(nk), Box::new(date_str)])
      .await?;
    Ok(versions.pop())
  }

  async fn all_versions(
    &self,
    dimension: &DimensionId,
    natural_key: &NaturalKey,
  ) -> Result<Vec<DimensionVersion>> {
    let d = dimension.as_str();
    let sql = format!(
      "SELECT {cols} FROM dim_{d} WHERE {d}_nk = ?1 ORDER BY {d}_sk ASC",
      cols = select_columns(d),
    );
    let nk = natural_key.as_str().to_owned();
    self.select_versions(sql, vec![Box::new(nk)]).await
  }

  async fn versions_after(
    &self,
    dimension: &DimensionId,
    natural_key: &NaturalKey,
    after: Option<SurrogateKey>,
    limit: usize,
  ) -> Result<Vec<DimensionVersion>> {
    let d = dimension.as_str();
    let sql = format!(
      "SELECT {cols} FROM dim_{d}
       WHERE {d}_nk = ?1 AND {d}_sk > ?2
       ORDER BY {d}_sk ASC
       LIMIT ?3",
      cols = select_columns(d),
    );
    let nk = natural_key.as_str().to_owned();
    let after = after.map_or(-1_i64, |k| k.0 as i64);
    self
      .select_versions(
        sql,
        vec![Box::new(nk), Box::new(after), Box::new(limit as i64)],
      )
      .await
  }

  // ── Conditional writes ────────────────────────────────────────────────────

  async fn insert_first(
    &self,
    dimension: &DimensionId,
    version: DimensionVersion,
  ) -> Result<WriteOutcome> {
    let sql = insert_sql(dimension.as_str());
    let p = Self::insert_params(&version)?;

    let outcome = self
      .conn
      .call(move |conn| {
        // The partial unique index rejects a second current row for the
        // natural key; that rejection is a lost race, not a failure.
        match conn.execute(&sql, rusqlite::params![
          p.sk,
          p.nk,
          p.attributes,
          p.from,
          p.to,
          p.is_current,
          p.loaded_at,
        ]) {
          Ok(_) => Ok(WriteOutcome::Applied),
          Err(ref e) if is_constraint_violation(e) => {
            Ok(WriteOutcome::Conflict)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;
    Ok(outcome)
  }

  async fn close_and_insert(
    &self,
    dimension: &DimensionId,
    expected_current: SurrogateKey,
    version: DimensionVersion,
  ) -> Result<WriteOutcome> {
    let d = dimension.as_str();
    let close_sql = format!(
      "UPDATE dim_{d}
       SET effective_to_date = ?1, is_current_record = 0
       WHERE {d}_sk = ?2 AND is_current_record = 1"
    );
    let ins_sql = insert_sql(d);
    let close_on = encode_date(version.effective_from);
    let expected = expected_current.0 as i64;
    let p = Self::insert_params(&version)?;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let closed =
          tx.execute(&close_sql, rusqlite::params![close_on, expected])?;
        if closed == 0 {
          // Someone else superseded the expected row first; the dropped
          // transaction rolls back.
          return Ok(WriteOutcome::Conflict);
        }

        tx.execute(&ins_sql, rusqlite::params![
          p.sk,
          p.nk,
          p.attributes,
          p.from,
          p.to,
          p.is_current,
          p.loaded_at,
        ])?;
        tx.commit()?;
        Ok(WriteOutcome::Applied)
      })
      .await?;
    Ok(outcome)
  }

  async fn overwrite_attributes(
    &self,
    dimension: &DimensionId,
    surrogate_key: SurrogateKey,
    attributes: AttributeSet,
  ) -> Result<WriteOutcome> {
    let d = dimension.as_str();
    let sql = format!(
      "UPDATE dim_{d}
       SET attributes = ?1, loaded_at = ?2
       WHERE {d}_sk = ?3 AND is_current_record = 1"
    );
    let attrs = serde_json::to_string(&attributes)?;
    let now = encode_dt(chrono::Utc::now());
    let sk = surrogate_key.0 as i64;

    let outcome = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(&sql, rusqlite::params![attrs, now, sk])?;
        Ok(if changed == 0 {
          WriteOutcome::Conflict
        } else {
          WriteOutcome::Applied
        })
      })
      .await?;
    Ok(outcome)
  }

  // ── Surrogate keys ────────────────────────────────────────────────────────

  async fn next_key(&self, dimension: &DimensionId) -> Result<SurrogateKey> {
    let d = dimension.as_str().to_owned();

    let key: i64 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO surrogate_counters (dimension, next_key)
           VALUES (?1, 0)
           ON CONFLICT(dimension) DO NOTHING",
          rusqlite::params![d],
        )?;
        let key = tx.query_row(
          "UPDATE surrogate_counters
           SET next_key = next_key + 1
           WHERE dimension = ?1
           RETURNING next_key",
          rusqlite::params![d],
          |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(key)
      })
      .await?;

    Ok(SurrogateKey(key as u64))
  }

  async fn advance_key_floor(
    &self,
    dimension: &DimensionId,
    floor: SurrogateKey,
  ) -> Result<()> {
    let d = dimension.as_str().to_owned();
    let floor = floor.0 as i64;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO surrogate_counters (dimension, next_key)
           VALUES (?1, ?2)
           ON CONFLICT(dimension) DO UPDATE
           SET next_key = MAX(next_key, excluded.next_key)",
          rusqlite::params![d, floor],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
