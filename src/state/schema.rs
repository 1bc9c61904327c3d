//! Database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Full DDL for the metrics database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Host inventory, upserted by hostname on every collector tick
CREATE TABLE IF NOT EXISTS hosts (
    id           TEXT PRIMARY KEY,
    hostname     TEXT NOT NULL UNIQUE,
    os_name      TEXT,
    os_version   TEXT,
    cpu_model    TEXT,
    cpu_cores    INTEGER,
    cpu_threads  INTEGER,
    ram_total_mb INTEGER,
    gpu_name     TEXT,
    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
);

-- CPU samples
CREATE TABLE IF NOT EXISTS metrics_cpu (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    host_id       TEXT NOT NULL REFERENCES hosts(id),
    ts            TEXT NOT NULL,
    usage_percent REAL NOT NULL,
    temperature_c REAL,
    freq_mhz      REAL
);

-- RAM samples
CREATE TABLE IF NOT EXISTS metrics_ram (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    host_id       TEXT NOT NULL REFERENCES hosts(id),
    ts            TEXT NOT NULL,
    used_mb       INTEGER NOT NULL,
    available_mb  INTEGER NOT NULL,
    usage_percent REAL NOT NULL
);

-- GPU samples (only written when a GPU is present)
CREATE TABLE IF NOT EXISTS metrics_gpu (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    host_id             TEXT NOT NULL REFERENCES hosts(id),
    ts                  TEXT NOT NULL,
    utilization_percent REAL NOT NULL,
    temperature_c       REAL NOT NULL,
    memory_used_mb      INTEGER NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_metrics_cpu_ts ON metrics_cpu(ts);
CREATE INDEX IF NOT EXISTS idx_metrics_cpu_host ON metrics_cpu(host_id);
CREATE INDEX IF NOT EXISTS idx_metrics_ram_ts ON metrics_ram(ts);
CREATE INDEX IF NOT EXISTS idx_metrics_ram_host ON metrics_ram(host_id);
CREATE INDEX IF NOT EXISTS idx_metrics_gpu_ts ON metrics_gpu(ts);
CREATE INDEX IF NOT EXISTS idx_metrics_gpu_host ON metrics_gpu(host_id);
"#;
