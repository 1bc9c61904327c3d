pub mod database;
pub mod schema;

pub use database::Database;

use chrono::{DateTime, Utc};

/// Render a UTC timestamp in the `datetime('now')` text format SQLite uses,
/// so stored timestamps compare directly against SQL-side window expressions.
pub fn sqlite_ts(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}
