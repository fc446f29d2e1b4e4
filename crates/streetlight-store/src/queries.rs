//! Query builder for stored readings.
//!
//! # Example
//!
//! ```
//! use streetlight_store::{Store, ReadingQuery};
//! use time::{OffsetDateTime, Duration};
//!
//! let store = Store::open_in_memory()?;
//! let hour_ago = OffsetDateTime::now_utc() - Duration::hours(1);
//!
//! // Last hour, chronological, first page
//! let query = ReadingQuery::new()
//!     .since(hour_ago)
//!     .oldest_first()
//!     .limit(50)
//!     .offset(0);
//!
//! let readings = store.query_readings(&query)?;
//! # Ok::<(), streetlight_store::Error>(())
//! ```

use time::OffsetDateTime;

use streetlight_types::timestamp::to_unix_millis;

/// Columns selected for a [`StoredReading`](crate::StoredReading), in row order.
pub(crate) const READING_COLUMNS: &str =
    "id, captured_at, illuminance, visibility, motion, synced, synced_at";

/// Fluent query builder for stored readings.
///
/// Use this to construct queries for [`Store::query_readings`](crate::Store::query_readings).
/// All filter methods are optional and can be chained in any order.
///
/// By default, queries return results ordered by `captured_at` descending
/// (newest first). Rows with equal timestamps are ordered by id.
#[derive(Debug, Default, Clone)]
pub struct ReadingQuery {
    /// Filter readings at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter readings at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Filter on the synced flag.
    pub synced: Option<bool>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by captured_at descending (newest first).
    pub newest_first: bool,
    /// Order by row id instead of captured_at.
    pub insertion_order: bool,
}

impl ReadingQuery {
    /// Create a new query with default settings.
    ///
    /// Default behavior:
    /// - No time range or sync filter
    /// - No limit (all matching records)
    /// - Ordered by newest first
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter to readings captured at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to readings captured at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Only readings whose synced flag equals `synced`.
    pub fn synced(mut self, synced: bool) -> Self {
        self.synced = Some(synced);
        self
    }

    /// Shorthand for `.synced(false)`.
    pub fn unsynced(self) -> Self {
        self.synced(false)
    }

    /// Limit the maximum number of results returned.
    ///
    /// Use with `offset()` for pagination.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results by oldest first (ascending by `captured_at`).
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Order by row id (insertion order) instead of capture time.
    ///
    /// Remote and simulated readings are stamped by different clocks, so
    /// capture time does not always follow insertion order.
    pub fn insertion_order(mut self) -> Self {
        self.insertion_order = true;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(since) = self.since {
            conditions.push("captured_at >= ?");
            params.push(Box::new(to_unix_millis(since)));
        }

        if let Some(until) = self.until {
            conditions.push("captured_at <= ?");
            params.push(Box::new(to_unix_millis(until)));
        }

        if let Some(synced) = self.synced {
            conditions.push("synced = ?");
            params.push(Box::new(synced));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = if self.insertion_order {
            format!(
                "SELECT {} FROM readings {} ORDER BY id {}",
                READING_COLUMNS, where_clause, order
            )
        } else {
            format!(
                "SELECT {} FROM readings {} ORDER BY captured_at {}, id {}",
                READING_COLUMNS, where_clause, order, order
            )
        };

        // SQLite requires LIMIT when OFFSET is present; -1 means unbounded.
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        sql
    }

    /// Build a `COUNT(*)` over the same filters, ignoring limit and offset.
    pub(crate) fn build_count_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        format!("SELECT COUNT(*) FROM readings {}", where_clause)
    }
}
