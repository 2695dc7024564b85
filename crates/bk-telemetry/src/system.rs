//! Host resource sampling and the default resource health checks.
//!
//! CPU and memory come from `/proc`; disk usage from `statvfs(3)`. A sample
//! that cannot be taken (non-Linux host, restricted `/proc`) is `None`, and a
//! check with no samples passes.

use crate::health::CheckResult;
use crate::metrics::{Metrics, ResourceType};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A resource at or above this usage fails its check.
pub const RESOURCE_THRESHOLD_PERCENT: f64 = 90.0;

/// Gap between the two `/proc/stat` reads of the first CPU sample.
const CPU_PRIME_INTERVAL: Duration = Duration::from_millis(100);

/// Aggregate CPU jiffies from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

/// Samples host CPU, memory, and disk usage in percent.
///
/// CPU usage is measured between consecutive calls, so the sampler keeps the
/// previous reading.
#[derive(Debug, Default)]
pub struct ResourceSampler {
    last_cpu: Mutex<Option<CpuTimes>>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// CPU busy percent since the previous call (or over a short window on
    /// the first call).
    pub fn cpu_percent(&self) -> Option<f64> {
        let mut last = self.last_cpu.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = match *last {
            Some(prev) => prev,
            None => {
                let first = read_cpu_times()?;
                std::thread::sleep(CPU_PRIME_INTERVAL);
                first
            }
        };
        let current = read_cpu_times()?;
        *last = Some(current);
        cpu_busy_percent(previous, current)
    }

    pub fn memory_percent(&self) -> Option<f64> {
        let content = std::fs::read_to_string("/proc/meminfo").ok()?;
        memory_percent_from_meminfo(&content)
    }

    pub fn disk_percent(&self, path: &Path) -> Option<f64> {
        disk_usage_percent(path)
    }
}

fn read_cpu_times() -> Option<CpuTimes> {
    let content = std::fs::read_to_string("/proc/stat").ok()?;
    parse_cpu_line(&content)
}

fn parse_cpu_line(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    // user nice system idle iowait irq softirq steal ...
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total = fields.iter().take(8).sum();
    Some(CpuTimes { idle, total })
}

fn cpu_busy_percent(prev: CpuTimes, cur: CpuTimes) -> Option<f64> {
    let total = cur.total.checked_sub(prev.total)?;
    let idle = cur.idle.checked_sub(prev.idle)?;
    if total == 0 {
        return Some(0.0);
    }
    Some(100.0 * total.saturating_sub(idle) as f64 / total as f64)
}

fn memory_percent_from_meminfo(meminfo: &str) -> Option<f64> {
    let field = |key: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(key))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total == 0 {
        return None;
    }
    Some(100.0 * total.saturating_sub(available) as f64 / total as f64)
}

#[cfg(unix)]
fn disk_usage_percent(path: &Path) -> Option<f64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }
    let frsize = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * frsize;
    let free = stat.f_bfree as u64 * frsize;
    if total == 0 {
        return None;
    }
    Some(100.0 * total.saturating_sub(free) as f64 / total as f64)
}

#[cfg(not(unix))]
fn disk_usage_percent(_path: &Path) -> Option<f64> {
    None
}

fn below_threshold(samples: &[Option<f64>]) -> bool {
    samples
        .iter()
        .flatten()
        .all(|pct| *pct < RESOURCE_THRESHOLD_PERCENT)
}

/// `system_resources` check: CPU and memory under the threshold.
///
/// Publishes each sample to `system_resource_usage_percent`.
pub fn system_resources_check(
    metrics: Arc<Metrics>,
    sampler: Arc<ResourceSampler>,
) -> impl Fn() -> CheckResult + Send + 'static {
    move || {
        let cpu = sampler.cpu_percent();
        let memory = sampler.memory_percent();
        if let Some(pct) = cpu {
            metrics.update_resource_usage(ResourceType::Cpu, pct);
        }
        if let Some(pct) = memory {
            metrics.update_resource_usage(ResourceType::Memory, pct);
        }
        Ok(below_threshold(&[cpu, memory]))
    }
}

/// `disk_space` check: usage of the filesystem holding `path` under the
/// threshold.
pub fn disk_space_check(
    metrics: Arc<Metrics>,
    path: impl Into<PathBuf>,
) -> impl Fn() -> CheckResult + Send + 'static {
    let path = path.into();
    move || {
        let disk = disk_usage_percent(&path);
        if let Some(pct) = disk {
            metrics.update_resource_usage(ResourceType::Disk, pct);
        }
        Ok(below_threshold(&[disk]))
    }
}
