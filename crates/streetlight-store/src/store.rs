//! Main store implementation.

use std::io::Write;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use tracing::{debug, info};

use streetlight_types::SensorReading;
use streetlight_types::timestamp::{from_unix_millis, to_unix_millis};

use crate::error::{Error, Result};
use crate::models::{CsvRow, StoredReading};
use crate::queries::{READING_COLUMNS, ReadingQuery};
use crate::schema;

/// SQLite-based store for streetlight readings.
///
/// Every reading is inserted with `synced = false`. The flag flips to true
/// once the cloud store has acknowledged the reading and never reverts.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let millis: i64 = row.get(idx)?;
    from_unix_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn map_reading(row: &Row<'_>) -> rusqlite::Result<StoredReading> {
    let synced_at = match row.get::<_, Option<i64>>(6)? {
        Some(millis) => Some(
            from_unix_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(6, millis))?,
        ),
        None => None,
    };

    Ok(StoredReading {
        id: row.get(0)?,
        timestamp: timestamp_at(row, 1)?,
        illuminance: row.get(2)?,
        visibility: row.get(3)?,
        motion: row.get(4)?,
        synced: row.get(5)?,
        synced_at,
    })
}

// Reading operations
impl Store {
    /// Insert a reading. It starts out unsynced.
    pub fn insert_reading(&self, reading: &SensorReading) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO readings (captured_at, illuminance, visibility, motion, synced)
             VALUES (?1, ?2, ?3, ?4, 0)",
            rusqlite::params![
                to_unix_millis(reading.timestamp),
                reading.illuminance,
                reading.visibility,
                reading.motion,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted reading {} ({} lux)", id, reading.illuminance);
        Ok(id)
    }

    /// Query readings with filters.
    pub fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<StoredReading>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let readings = stmt
            .query_map(params_ref.as_slice(), map_reading)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(readings)
    }

    /// Count readings matching the query filters (limit/offset ignored).
    pub fn count_matching(&self, query: &ReadingQuery) -> Result<u64> {
        let sql = query.build_count_sql();
        let (_, params) = query.build_where();
        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = self
            .conn
            .query_row(&sql, params_ref.as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All readings not yet acknowledged by the cloud, oldest first.
    pub fn query_unsynced(&self) -> Result<Vec<StoredReading>> {
        self.query_readings(&ReadingQuery::new().unsynced().oldest_first())
    }

    /// At most `limit` unsynced readings, oldest first.
    pub fn query_unsynced_batch(&self, limit: u32) -> Result<Vec<StoredReading>> {
        self.query_readings(&ReadingQuery::new().unsynced().oldest_first().limit(limit))
    }

    /// The `limit` most recently inserted readings, newest first.
    pub fn query_recent(&self, limit: u32) -> Result<Vec<StoredReading>> {
        self.query_readings(&ReadingQuery::new().insertion_order().limit(limit))
    }

    /// Readings captured at or after `since`, oldest first.
    pub fn query_range(&self, since: OffsetDateTime) -> Result<Vec<StoredReading>> {
        self.query_readings(&ReadingQuery::new().since(since).oldest_first())
    }

    /// Get a single reading by row id.
    pub fn get_reading(&self, id: i64) -> Result<Option<StoredReading>> {
        let sql = format!("SELECT {} FROM readings WHERE id = ?", READING_COLUMNS);
        let reading = self
            .conn
            .query_row(&sql, [id], map_reading)
            .optional()?;
        Ok(reading)
    }

    /// Mark readings as synced.
    ///
    /// Only rows that are currently unsynced are touched, so repeating the
    /// call is a no-op and ids that do not exist are ignored. Returns the
    /// number of rows that changed.
    pub fn mark_synced(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = to_unix_millis(OffsetDateTime::now_utc());
        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE readings SET synced = 1, synced_at = ?1 WHERE id = ?2 AND synced = 0",
            )?;
            for id in ids {
                changed += stmt.execute(rusqlite::params![now, id])?;
            }
        }
        tx.commit()?;

        debug!("Marked {} of {} readings as synced", changed, ids.len());
        Ok(changed)
    }

    /// Delete every reading. Returns the number of rows removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.conn.execute("DELETE FROM readings", [])?;
        info!("Cleared {} readings", removed);
        Ok(removed)
    }

    /// Total number of stored readings.
    pub fn count_readings(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of readings waiting to be synced.
    pub fn count_unsynced(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM readings WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

// Export operations
impl Store {
    /// Write the readings matching `query` as CSV with a header row.
    ///
    /// Returns the number of data rows written.
    pub fn export_csv<W: Write>(&self, query: &ReadingQuery, writer: W) -> Result<usize> {
        let readings = self.query_readings(query)?;
        let mut wtr = csv::Writer::from_writer(writer);
        for reading in &readings {
            wtr.serialize(CsvRow::from_stored(reading))?;
        }
        wtr.flush()?;
        Ok(readings.len())
    }
}
