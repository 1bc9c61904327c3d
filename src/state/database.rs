//! SQLite database wrapper with WAL mode and migration support.

use crate::state::schema;
use crate::types::{CpuSample, GpuSample, HostInfo, RamSample};
use anyhow::{Context, Result};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

/// The metrics database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema creation and migrations.
    fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn
                .execute_batch(schema::CREATE_SCHEMA)
                .context("Failed to create schema")?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else if version < schema::SCHEMA_VERSION {
            self.conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![schema::SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Tool query execution
    // -----------------------------------------------------------------------

    /// Execute a pre-authored query template with named parameters bound from
    /// the sanitized argument map. Returns an ordered sequence of
    /// column-name → value mappings.
    ///
    /// Parameters declared in the template but absent from `args` bind NULL.
    pub fn run_tool_query(&self, sql: &str, args: &Map<String, Value>) -> Result<Vec<Map<String, Value>>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare tool query")?;

        for idx in 1..=stmt.parameter_count() {
            let value = match stmt.parameter_name(idx) {
                Some(name) => {
                    let key = name.trim_start_matches([':', '@', '$']);
                    args.get(key).map(json_to_sql).unwrap_or(SqlValue::Null)
                }
                None => SqlValue::Null,
            };
            stmt.raw_bind_parameter(idx, value)
                .context("Failed to bind tool query parameter")?;
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut out = Vec::new();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next().context("Tool query failed")? {
            let mut record = Map::new();
            for (i, col) in columns.iter().enumerate() {
                record.insert(col.clone(), sql_to_json(row.get_ref(i)?));
            }
            out.push(record);
        }

        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Host inventory
    // -----------------------------------------------------------------------

    /// Insert or update the host row for this machine; returns its id.
    pub fn upsert_host(&self, host: &HostInfo) -> Result<String> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM hosts WHERE hostname = ?1",
                params![host.hostname],
                |row| row.get(0),
            )
            .ok();

        if let Some(id) = existing {
            self.conn.execute(
                "UPDATE hosts SET os_name = ?2, os_version = ?3, cpu_model = ?4,
                        cpu_cores = ?5, cpu_threads = ?6, ram_total_mb = ?7, gpu_name = ?8
                 WHERE id = ?1",
                params![
                    id,
                    host.os_name,
                    host.os_version,
                    host.cpu_model,
                    host.cpu_cores,
                    host.cpu_threads,
                    host.ram_total_mb,
                    host.gpu_name,
                ],
            )?;
            return Ok(id);
        }

        let id = ulid::Ulid::new().to_string();
        self.conn.execute(
            "INSERT INTO hosts (id, hostname, os_name, os_version, cpu_model,
                                cpu_cores, cpu_threads, ram_total_mb, gpu_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                host.hostname,
                host.os_name,
                host.os_version,
                host.cpu_model,
                host.cpu_cores,
                host.cpu_threads,
                host.ram_total_mb,
                host.gpu_name,
            ],
        )?;
        info!("Registered host '{}' ({})", host.hostname, id);
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Sample inserts
    // -----------------------------------------------------------------------

    pub fn insert_cpu_sample(&self, host_id: &str, ts: &str, s: &CpuSample) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metrics_cpu (host_id, ts, usage_percent, temperature_c, freq_mhz)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![host_id, ts, s.usage_percent, s.temperature_c, s.freq_mhz],
        )?;
        Ok(())
    }

    pub fn insert_ram_sample(&self, host_id: &str, ts: &str, s: &RamSample) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metrics_ram (host_id, ts, used_mb, available_mb, usage_percent)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![host_id, ts, s.used_mb, s.available_mb, s.usage_percent],
        )?;
        Ok(())
    }

    pub fn insert_gpu_sample(&self, host_id: &str, ts: &str, s: &GpuSample) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metrics_gpu (host_id, ts, utilization_percent, temperature_c, memory_used_mb)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![host_id, ts, s.utilization_percent, s.temperature_c, s.memory_used_mb],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Status helpers
    // -----------------------------------------------------------------------

    /// Row counts for (cpu, ram, gpu) sample tables.
    pub fn sample_counts(&self) -> Result<(u64, u64, u64)> {
        let cpu: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM metrics_cpu", [], |row| row.get(0))?;
        let ram: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM metrics_ram", [], |row| row.get(0))?;
        let gpu: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM metrics_gpu", [], |row| row.get(0))?;
        Ok((cpu, ram, gpu))
    }

    /// Timestamp of the most recent CPU sample, if any.
    pub fn latest_sample_ts(&self) -> Result<Option<String>> {
        let ts = self
            .conn
            .query_row("SELECT MAX(ts) FROM metrics_cpu", [], |row| row.get(0))
            .unwrap_or(None);
        Ok(ts)
    }

    /// Number of registered hosts.
    pub fn host_count(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM hosts", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Map a JSON scalar onto a SQLite value for parameter binding.
fn json_to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        // Arrays and objects never survive sanitization for the declared
        // scalar parameter types; serialize defensively if one slips through.
        other => SqlValue::Text(other.to_string()),
    }
}

/// Map a SQLite column value onto JSON.
fn sql_to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_host() -> HostInfo {
        HostInfo {
            hostname: "testhost".into(),
            os_name: Some("linux".into()),
            cpu_cores: Some(4),
            ..Default::default()
        }
    }

    #[test]
    fn upsert_host_is_stable_by_hostname() {
        let db = Database::open_memory().unwrap();
        let id1 = db.upsert_host(&sample_host()).unwrap();
        let id2 = db.upsert_host(&sample_host()).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(db.host_count().unwrap(), 1);
    }

    #[test]
    fn run_tool_query_binds_named_params_and_maps_rows() {
        let db = Database::open_memory().unwrap();
        let host_id = db.upsert_host(&sample_host()).unwrap();
        let ts = crate::state::sqlite_ts(chrono::Utc::now());
        db.insert_cpu_sample(
            &host_id,
            &ts,
            &CpuSample {
                usage_percent: 42.5,
                temperature_c: None,
                freq_mhz: Some(2400.0),
            },
        )
        .unwrap();

        let mut args = Map::new();
        args.insert("minutes".into(), json!(60));
        args.insert("host_id".into(), json!(host_id));

        let rows = db
            .run_tool_query(
                "SELECT MAX(usage_percent) AS max_cpu_usage_percent, COUNT(*) AS sample_count
                 FROM metrics_cpu
                 WHERE ts >= datetime('now', '-' || :minutes || ' minutes')
                   AND (:host_id IS NULL OR host_id = :host_id)",
                &args,
            )
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["max_cpu_usage_percent"], json!(42.5));
        assert_eq!(rows[0]["sample_count"], json!(1));
    }

    #[test]
    fn run_tool_query_missing_param_binds_null() {
        let db = Database::open_memory().unwrap();
        let rows = db
            .run_tool_query("SELECT :missing AS v", &Map::new())
            .unwrap();
        assert_eq!(rows[0]["v"], Value::Null);
    }
}
