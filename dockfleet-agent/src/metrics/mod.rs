//! Host snapshot collection
//!
//! Builds the `HostRecord` an agent publishes: identity (hostname, os, export
//! ip, ports) plus CPU, memory and disk figures. Memory is reported in GB with
//! two decimals, disk in whole GB. On unix hosts disk figures describe the
//! filesystem mounted at `/`; elsewhere every disk is summed.

use chrono::Utc;
use dockfleet_common::host::{HostInfo, HostRecord};
use dockfleet_common::GB;
use sysinfo::{Disks, System};
use tracing::debug;

/// Identity part of a snapshot, fixed for the agent's lifetime
#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub host_name: String,
    pub os: String,
    pub ip: String,
    pub api_port: u16,
    pub grpc_port: u16,
}

impl HostIdentity {
    pub fn detect(ip: String, api_port: u16, grpc_port: u16) -> Self {
        Self {
            host_name: gethostname::gethostname().to_string_lossy().into_owned(),
            os: std::env::consts::OS.to_string(),
            ip,
            api_port,
            grpc_port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiskTotals {
    pub total_gb: u64,
    pub free_gb: u64,
}

/// Keeps one `System` alive so CPU usage is measured between two samples.
pub struct HostCollector {
    identity: HostIdentity,
    sys: System,
}

impl HostCollector {
    pub fn new(identity: HostIdentity) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();
        Self { identity, sys }
    }

    /// Collect complete host snapshot
    pub fn collect(&mut self) -> HostRecord {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();

        let disks = disk_totals(&Disks::new_with_refreshed_list());
        let info = HostInfo {
            host_name: self.identity.host_name.clone(),
            os: self.identity.os.clone(),
            ip: self.identity.ip.clone(),
            api_port: self.identity.api_port,
            grpc_port: self.identity.grpc_port,
            cpu_cores: self.sys.cpus().len() as u32,
            cpu_usage_pct: round2(self.sys.global_cpu_info().cpu_usage() as f64),
            total_mem_gb: bytes_to_gb(self.sys.total_memory()),
            free_mem_gb: bytes_to_gb(self.sys.available_memory()),
            total_disk_gb: disks.total_gb,
            free_disk_gb: disks.free_gb,
        };
        debug!(cpu = info.cpu_usage_pct, free_mem_gb = info.free_mem_gb, "host snapshot collected");

        HostRecord { info, heartbeat: Utc::now().timestamp() }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn bytes_to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / GB as f64)
}

fn disk_totals(disks: &Disks) -> DiskTotals {
    let usage: Vec<(bool, u64, u64)> = disks
        .list()
        .iter()
        .map(|d| (d.mount_point() == std::path::Path::new("/"), d.total_space(), d.available_space()))
        .collect();
    sum_disks(&usage, cfg!(unix))
}

/// `(is_root, total_bytes, free_bytes)` per disk
fn sum_disks(usage: &[(bool, u64, u64)], root_only: bool) -> DiskTotals {
    if root_only {
        if let Some((_, total, free)) = usage.iter().find(|(is_root, _, _)| *is_root) {
            return DiskTotals { total_gb: total / GB, free_gb: free / GB };
        }
    }
    let (total, free) = usage
        .iter()
        .fold((0u64, 0u64), |(t, f), (_, total, free)| (t.saturating_add(*total), f.saturating_add(*free)));
    DiskTotals { total_gb: total / GB, free_gb: free / GB }
}
