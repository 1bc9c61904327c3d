//! Hardware probes: CPU, RAM, GPU readings and host inventory.
//!
//! All probes are best-effort. CPU usage comes from a /proc/stat delta, RAM
//! from /proc/meminfo, temperature and frequency from sysfs/procfs where the
//! platform exposes them, and GPU metrics from nvidia-smi when present.

use crate::types::{CpuSample, GpuSample, HostInfo, RamSample};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::process::Command;

/// Delay between the two /proc/stat reads used for the usage delta.
const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(250);

/// Sample CPU usage, temperature, and frequency.
pub async fn cpu_sample() -> Result<CpuSample> {
    let (busy1, total1) = read_proc_stat()?;
    tokio::time::sleep(CPU_SAMPLE_WINDOW).await;
    let (busy2, total2) = read_proc_stat()?;

    let d_total = total2.saturating_sub(total1);
    let d_busy = busy2.saturating_sub(busy1);
    let usage_percent = if d_total == 0 {
        0.0
    } else {
        (d_busy as f64 / d_total as f64) * 100.0
    };

    Ok(CpuSample {
        usage_percent: (usage_percent * 10.0).round() / 10.0,
        temperature_c: cpu_temperature(),
        freq_mhz: cpu_freq_mhz(),
    })
}

/// Parse the aggregate cpu line of /proc/stat into (busy, total) jiffies.
fn read_proc_stat() -> Result<(u64, u64)> {
    let stat = std::fs::read_to_string("/proc/stat").context("Failed to read /proc/stat")?;
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .context("No aggregate cpu line in /proc/stat")?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        anyhow::bail!("Unexpected /proc/stat format");
    }

    let total: u64 = fields.iter().sum();
    // idle + iowait count as not-busy
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Ok((total - idle, total))
}

/// First available temperature reading from the hwmon tree, in °C.
fn cpu_temperature() -> Option<f64> {
    let hwmon = std::fs::read_dir("/sys/class/hwmon").ok()?;
    for entry in hwmon.flatten() {
        let input = entry.path().join("temp1_input");
        if let Ok(raw) = std::fs::read_to_string(&input) {
            if let Ok(millideg) = raw.trim().parse::<f64>() {
                return Some(millideg / 1000.0);
            }
        }
    }
    None
}

/// Current CPU frequency in MHz, from cpufreq or /proc/cpuinfo.
fn cpu_freq_mhz() -> Option<f64> {
    if let Ok(raw) =
        std::fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq")
    {
        if let Ok(khz) = raw.trim().parse::<f64>() {
            return Some(khz / 1000.0);
        }
    }

    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    cpuinfo
        .lines()
        .find(|l| l.starts_with("cpu MHz"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<f64>().ok())
}

/// Sample RAM usage from /proc/meminfo.
pub fn ram_sample() -> Result<RamSample> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").context("Failed to read /proc/meminfo")?;

    let total_kb = meminfo_field(&meminfo, "MemTotal:").context("MemTotal missing")?;
    let available_kb = meminfo_field(&meminfo, "MemAvailable:").context("MemAvailable missing")?;

    let total_mb = total_kb / 1024;
    let available_mb = available_kb / 1024;
    let used_mb = total_mb.saturating_sub(available_mb);
    let usage_percent = if total_mb == 0 {
        0.0
    } else {
        (used_mb as f64 / total_mb as f64) * 100.0
    };

    Ok(RamSample {
        used_mb: used_mb as i64,
        available_mb: available_mb as i64,
        usage_percent: (usage_percent * 10.0).round() / 10.0,
    })
}

fn meminfo_field(meminfo: &str, key: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|l| l.starts_with(key))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}

/// Read GPU metrics via nvidia-smi: utilization (%), temperature (°C),
/// memory used (MiB), and the device name. None when no NVIDIA GPU is
/// available or the tool is missing.
pub async fn gpu_sample() -> Option<GpuSample> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=utilization.gpu,temperature.gpu,memory.used,name",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    // Multiple GPUs: take the first line for now
    let line = stdout.lines().next()?;
    let parts: Vec<&str> = line.split(',').map(|p| p.trim()).collect();
    if parts.len() < 3 {
        return None;
    }

    Some(GpuSample {
        utilization_percent: parts[0].parse().ok()?,
        temperature_c: parts[1].parse().ok()?,
        memory_used_mb: parts[2].parse().ok()?,
        name: parts.get(3).map(|s| s.to_string()),
    })
}

/// Gather host inventory for the upsert.
pub fn host_inventory(gpu_name: Option<String>) -> Result<HostInfo> {
    let hostname = std::fs::read_to_string("/proc/sys/kernel/hostname")
        .or_else(|_| std::fs::read_to_string("/etc/hostname"))
        .map(|s| s.trim().to_string())
        .context("Failed to determine hostname")?;

    let os_version = std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .ok()
        .map(|s| s.trim().to_string());

    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").unwrap_or_default();
    let cpu_model = cpuinfo
        .lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split(':').nth(1))
        .map(|v| v.trim().to_string());
    let cpu_threads = cpuinfo
        .lines()
        .filter(|l| l.starts_with("processor"))
        .count() as i64;
    let cpu_cores = cpuinfo
        .lines()
        .find(|l| l.starts_with("cpu cores"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<i64>().ok());

    let ram_total_mb = std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|m| meminfo_field(&m, "MemTotal:"))
        .map(|kb| (kb / 1024) as i64);

    Ok(HostInfo {
        hostname,
        os_name: Some(std::env::consts::OS.to_string()),
        os_version,
        cpu_model,
        cpu_cores,
        cpu_threads: (cpu_threads > 0).then_some(cpu_threads),
        ram_total_mb,
        gpu_name,
    })
}
