//! Periodic metrics collector.
//!
//! Samples CPU/RAM/GPU on a fixed interval and inserts one row per metrics
//! table, upserting host inventory first. Probe or insert failures are
//! logged and the loop continues; shutdown is cooperative via the
//! cancellation token.

use crate::collector::probe;
use crate::config::Config;
use crate::state::{self, Database};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Background metrics collector.
pub struct Collector {
    config: Config,
    db: Arc<Mutex<Database>>,
}

impl Collector {
    pub fn new(config: Config, db: Arc<Mutex<Database>>) -> Self {
        Self { config, db }
    }

    /// Run the sampling loop (call from a tokio::spawn).
    ///
    /// The loop exits cooperatively when `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            interval_seconds = self.config.metrics_interval_seconds,
            "collector started"
        );

        let tick = tokio::time::Duration::from_secs(self.config.metrics_interval_seconds);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick) => {
                    if let Err(e) = self.collect_once().await {
                        error!("collector tick failed: {e:#}");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("collector shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Take one sample of every metric and persist it.
    pub async fn collect_once(&self) -> Result<()> {
        let gpu = probe::gpu_sample().await;
        let host = probe::host_inventory(gpu.as_ref().and_then(|g| g.name.clone()))?;
        let cpu = probe::cpu_sample().await.context("CPU probe failed")?;
        let ram = probe::ram_sample().context("RAM probe failed")?;

        let ts = state::sqlite_ts(Utc::now());

        {
            let db = self.db.lock().await;
            let host_id = db.upsert_host(&host)?;
            db.insert_cpu_sample(&host_id, &ts, &cpu)?;
            db.insert_ram_sample(&host_id, &ts, &ram)?;
            if let Some(gpu) = &gpu {
                db.insert_gpu_sample(&host_id, &ts, gpu)?;
            } else {
                debug!("gpu metrics unavailable, skipping");
            }
        }

        info!(
            ts = %ts,
            cpu_usage = cpu.usage_percent,
            ram_usage = ram.usage_percent,
            gpu_util = gpu.as_ref().map(|g| g.utilization_percent),
            "metrics written"
        );

        Ok(())
    }
}
