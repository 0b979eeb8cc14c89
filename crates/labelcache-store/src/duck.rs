//! DuckDB storage for the known-beverage cache.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use duckdb::{Connection, Row, params};
use labelcache_core::{CacheEntry, Category, IdentityKey, NewCacheEntry, Source};
use tracing::{debug, info};

use crate::{CacheRepo, StoreError, UpsertOutcome};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS known_beverages (
    brand_key         VARCHAR NOT NULL,
    product_key       VARCHAR NOT NULL,
    abv_key           VARCHAR NOT NULL,
    brand_name        VARCHAR NOT NULL,
    product_name      VARCHAR,
    class_type        VARCHAR NOT NULL,
    beverage_category VARCHAR NOT NULL,
    abv               DOUBLE,
    standard_size_ml  INTEGER,
    country_of_origin VARCHAR,
    producer          VARCHAR,
    is_verified       BOOLEAN NOT NULL DEFAULT false,
    source            VARCHAR NOT NULL,
    source_url        VARCHAR,
    notes             VARCHAR,
    revision          BIGINT NOT NULL DEFAULT 0,
    created_at        TIMESTAMP NOT NULL,
    updated_at        TIMESTAMP NOT NULL,
    PRIMARY KEY (brand_key, product_key, abv_key)
);
";

const ENTRY_COLUMNS: &str = "brand_name, product_name, class_type, beverage_category, abv, \
     standard_size_ml, country_of_origin, producer, is_verified, source, source_url, notes, \
     epoch_us(created_at), epoch_us(updated_at)";

/// `revision` is 0 on insert and bumped on every conflict update, so the
/// returned value tells the two paths apart.
const UPSERT: &str = "
INSERT INTO known_beverages (
    brand_key, product_key, abv_key,
    brand_name, product_name, class_type, beverage_category, abv,
    standard_size_ml, country_of_origin, producer,
    is_verified, source, source_url, notes,
    revision, created_at, updated_at
) VALUES (
    ?, ?, ?,
    ?, ?, ?, ?, ?,
    ?, ?, ?,
    ?, ?, ?, ?,
    0, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP)
)
ON CONFLICT (brand_key, product_key, abv_key) DO UPDATE SET
    class_type = EXCLUDED.class_type,
    beverage_category = EXCLUDED.beverage_category,
    source = EXCLUDED.source,
    source_url = EXCLUDED.source_url,
    notes = EXCLUDED.notes,
    is_verified = EXCLUDED.is_verified,
    updated_at = EXCLUDED.updated_at,
    revision = revision + 1
RETURNING revision
";

/// DuckDB store holding the `known_beverages` table.
///
/// Each row is keyed by its identity triple stored in three derived key
/// columns (`brand_key`, `product_key`, `abv_key`) computed by
/// [`IdentityKey`], so uniqueness is enforced by the primary key and
/// conflicts are resolved by `INSERT ... ON CONFLICT` inside DuckDB.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open an in-memory database with the cache schema.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    /// Open or create a persistent database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), entries = store.entry_count()?, "opened cache");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ── Counts ──

    /// Number of rows in `known_beverages`.
    pub fn entry_count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT count(*) FROM known_beverages", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Per-category entry counts and average ABV for one source.
    ///
    /// Columns: `beverage_category VARCHAR, entries BIGINT, avg_abv DOUBLE`.
    pub fn category_summary(&self, source: Source) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT beverage_category, count(*)::BIGINT AS entries, round(avg(abv), 1) AS avg_abv
             FROM known_beverages
             WHERE source = ?
             GROUP BY beverage_category
             ORDER BY beverage_category",
        )?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([source.as_str()])?.collect();
        Ok(batches)
    }

    // ── Lookups ──

    /// Entries matching brand and class/type case-insensitively, verified
    /// entries first, then lowest ABV.
    pub fn find_by_brand_and_class(
        &self,
        brand_name: &str,
        class_type: &str,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM known_beverages
             WHERE brand_key = ? AND lower(class_type) = ?
             ORDER BY is_verified DESC, abv ASC NULLS LAST
             LIMIT 10"
        );
        self.query_entries(
            &sql,
            params![
                brand_name.trim().to_lowercase(),
                class_type.trim().to_lowercase()
            ],
        )
    }

    /// Entries matching brand only, verified entries first.
    pub fn find_by_brand(&self, brand_name: &str) -> Result<Vec<CacheEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM known_beverages
             WHERE brand_key = ?
             ORDER BY is_verified DESC, abv ASC NULLS LAST
             LIMIT 10"
        );
        self.query_entries(&sql, params![brand_name.trim().to_lowercase()])
    }

    /// Direct access to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn query_entries(
        &self,
        sql: &str,
        params: impl duckdb::Params,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, StoredRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(StoredRow::into_entry).collect()
    }
}

impl CacheRepo for DuckStore {
    fn begin(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn upsert_entry(
        &self,
        entry: &NewCacheEntry,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let key = entry.identity();
        let now = timestamp(now);
        let revision: i64 = self.conn.query_row(
            UPSERT,
            params![
                key.brand,
                key.product,
                key.abv,
                entry.brand_name,
                entry.product_name,
                entry.class_type,
                entry.beverage_category.as_str(),
                entry.abv,
                entry.standard_size_ml,
                entry.country_of_origin,
                entry.producer,
                entry.is_verified,
                entry.source.as_str(),
                entry.source_url,
                entry.notes,
                now,
                now,
            ],
            |row| row.get(0),
        )?;
        debug!(%key, revision, "upserted cache entry");
        Ok(if revision == 0 {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    fn find_by_identity(&self, key: &IdentityKey) -> Result<Option<CacheEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM known_beverages
             WHERE brand_key = ? AND product_key = ? AND abv_key = ?"
        );
        let mut entries = self.query_entries(&sql, params![key.brand, key.product, key.abv])?;
        Ok(entries.pop())
    }

    fn stale_entries(
        &self,
        source: Source,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM known_beverages
             WHERE source = ? AND created_at < CAST(? AS TIMESTAMP)
             ORDER BY created_at
             LIMIT {limit}"
        );
        self.query_entries(&sql, params![source.as_str(), timestamp(created_before)])
    }

    fn refresh_provenance(
        &self,
        key: &IdentityKey,
        source_url: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let now = timestamp(now);
        let changed = self.conn.execute(
            "UPDATE known_beverages
             SET source_url = ?,
                 notes = ?,
                 updated_at = CAST(? AS TIMESTAMP),
                 created_at = CAST(? AS TIMESTAMP),
                 revision = revision + 1
             WHERE brand_key = ? AND product_key = ? AND abv_key = ?",
            params![source_url, notes, now, now, key.brand, key.product, key.abv],
        )?;
        Ok(changed > 0)
    }
}

/// Timestamps are stored as naive UTC `TIMESTAMP`s.
fn timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn from_epoch_us(column: &'static str, us: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(us).ok_or_else(|| StoreError::InvalidValue {
        column,
        value: us.to_string(),
    })
}

/// A row as read from DuckDB, before enum columns are parsed.
struct StoredRow {
    brand_name: String,
    product_name: Option<String>,
    class_type: String,
    beverage_category: String,
    abv: Option<f64>,
    standard_size_ml: Option<i32>,
    country_of_origin: Option<String>,
    producer: Option<String>,
    is_verified: bool,
    source: String,
    source_url: Option<String>,
    notes: Option<String>,
    created_us: i64,
    updated_us: i64,
}

impl StoredRow {
    /// Column order follows [`ENTRY_COLUMNS`].
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            brand_name: row.get(0)?,
            product_name: row.get(1)?,
            class_type: row.get(2)?,
            beverage_category: row.get(3)?,
            abv: row.get(4)?,
            standard_size_ml: row.get(5)?,
            country_of_origin: row.get(6)?,
            producer: row.get(7)?,
            is_verified: row.get(8)?,
            source: row.get(9)?,
            source_url: row.get(10)?,
            notes: row.get(11)?,
            created_us: row.get(12)?,
            updated_us: row.get(13)?,
        })
    }

    fn into_entry(self) -> Result<CacheEntry, StoreError> {
        let beverage_category = self.beverage_category.parse::<Category>().map_err(|e| {
            StoreError::InvalidValue {
                column: "beverage_category",
                value: e.0,
            }
        })?;
        let source = self
            .source
            .parse::<Source>()
            .map_err(|e| StoreError::InvalidValue {
                column: "source",
                value: e.0,
            })?;
        Ok(CacheEntry {
            brand_name: self.brand_name,
            product_name: self.product_name,
            class_type: self.class_type,
            beverage_category,
            abv: self.abv,
            country_of_origin: self.country_of_origin,
            producer: self.producer,
            standard_size_ml: self.standard_size_ml,
            source,
            source_url: self.source_url,
            notes: self.notes,
            is_verified: self.is_verified,
            created_at: from_epoch_us("created_at", self.created_us)?,
            updated_at: from_epoch_us("updated_at", self.updated_us)?,
        })
    }
}
