use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub pooled_connections: u32,
    pub pooled_hosts: Vec<String>,
    pub memory_usage_mb: f32,
    pub directory_status: String,
    pub directory_failures: u32,
    pub checked_at: String,
}

/// Tracks kernel uptime and how the directory answered lately.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    directory_failures: Arc<AtomicU32>,
    directory_status: Arc<Mutex<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            directory_failures: Arc::new(AtomicU32::new(0)),
            directory_status: Arc::new(Mutex::new("unknown".to_string())),
        }
    }

    pub fn mark_directory_ok(&self) {
        *self.directory_status.lock() = "reachable".to_string();
    }

    pub fn mark_directory_timeout(&self) {
        self.directory_failures.fetch_add(1, Ordering::Relaxed);
        *self.directory_status.lock() = "timeout".to_string();
    }

    pub fn mark_directory_error(&self) {
        self.directory_failures.fetch_add(1, Ordering::Relaxed);
        *self.directory_status.lock() = "error".to_string();
    }

    pub fn directory_status(&self) -> String {
        self.directory_status.lock().clone()
    }

    pub fn get_health(&self, pooled_hosts: Vec<String>) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            pooled_connections: pooled_hosts.len() as u32,
            pooled_hosts,
            memory_usage_mb: get_memory_usage_mb(),
            directory_status: self.directory_status(),
            directory_failures: self.directory_failures.load(Ordering::Relaxed),
            checked_at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Resident set size from /proc; 0 where that is unavailable.
fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(Ok(kb)) = rest.split_whitespace().next().map(str::parse::<u64>) {
                        return (kb as f32) / 1024.0;
                    }
                }
            }
        }
    }

    0.0
}
