//! SQL schema for the dimvault SQLite store.
//!
//! The base schema runs once at connection startup; dimension tables are
//! created on demand by `ensure_dimension`. Future migrations will be gated
//! on `PRAGMA user_version`.

use dimvault_core::version::DimensionId;

/// Base DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Surrogate-key high-water marks, one row per dimension.
CREATE TABLE IF NOT EXISTS surrogate_counters (
    dimension TEXT PRIMARY KEY,
    next_key  INTEGER NOT NULL DEFAULT 0
);

PRAGMA user_version = 1;
";

/// Per-dimension DDL. The dimension id is validated at construction
/// (`[a-z][a-z0-9_]*`), so interpolating it into identifiers is safe.
pub fn dimension_ddl(dimension: &DimensionId) -> String {
  let d = dimension.as_str();
  format!(
    "
CREATE TABLE IF NOT EXISTS dim_{d} (
    {d}_sk              INTEGER PRIMARY KEY,
    {d}_nk              TEXT NOT NULL,
    attributes          TEXT NOT NULL,   -- JSON object
    effective_from_date TEXT NOT NULL,   -- ISO 8601 date
    effective_to_date   TEXT,            -- NULL while current
    is_current_record   INTEGER NOT NULL,
    loaded_at           TEXT NOT NULL,   -- RFC 3339 UTC audit timestamp
    CHECK (is_current_record = (effective_to_date IS NULL))
);

-- At most one current row per natural key. The source warehouse schema had
-- no such constraint; reporting joins assume it, so it is enforced here.
CREATE UNIQUE INDEX IF NOT EXISTS dim_{d}_current_idx
    ON dim_{d}({d}_nk) WHERE is_current_record = 1;

CREATE INDEX IF NOT EXISTS dim_{d}_nk_idx
    ON dim_{d}({d}_nk, {d}_sk);
"
  )
}
