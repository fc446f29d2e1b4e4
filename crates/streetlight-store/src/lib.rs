//! Local data persistence for streetlight sensor readings.
//!
//! This crate provides SQLite-based storage for readings, so the controller
//! keeps working offline and syncs to the cloud once connectivity returns.
//!
//! # Features
//!
//! - Store readings with millisecond timestamps
//! - Track which readings the cloud store has acknowledged
//! - Query by time range and sync state, with pagination
//! - CSV export
//!
//! # Example
//!
//! ```no_run
//! use streetlight_store::{Store, ReadingQuery};
//!
//! let store = Store::open_default()?;
//!
//! let pending = store.query_unsynced()?;
//! let ids: Vec<i64> = pending.iter().map(|r| r.id).collect();
//! store.mark_synced(&ids)?;
//!
//! let latest = store.query_readings(&ReadingQuery::new().limit(10))?;
//! # Ok::<(), streetlight_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::StoredReading;
pub use queries::ReadingQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/streetlight/readings.db`
/// - macOS: `~/Library/Application Support/streetlight/readings.db`
/// - Windows: `C:\Users\<user>\AppData\Local\streetlight\readings.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("streetlight")
        .join("readings.db")
}
