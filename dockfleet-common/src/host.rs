//! Host snapshots published by agents
//!
//! An agent overwrites its own `HostRecord` every publish interval. Readers
//! never see the raw heartbeat: it is turned into an age (and a staleness
//! flag) at read time, see `HostRecord::into_view`.

use serde::{Deserialize, Serialize};

/// Resource and identity part of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub host_name: String,
    pub os: String,
    /// Natural key of the record in the directory
    pub ip: String,
    /// Container runtime control API port
    pub api_port: u16,
    /// Entry-point provisioning RPC port
    pub grpc_port: u16,
    pub cpu_cores: u32,
    pub cpu_usage_pct: f64,
    #[serde(rename = "totalMemGB")]
    pub total_mem_gb: f64,
    #[serde(rename = "freeMemGB")]
    pub free_mem_gb: f64,
    #[serde(rename = "totalDiskGB")]
    pub total_disk_gb: u64,
    #[serde(rename = "freeDiskGB")]
    pub free_disk_gb: u64,
}

/// What an agent writes to the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    #[serde(flatten)]
    pub info: HostInfo,
    /// Unix seconds at collection time
    pub heartbeat: i64,
}

/// What the kernel hands to its callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostView {
    #[serde(flatten)]
    pub info: HostInfo,
    pub age_secs: u64,
    pub stale: bool,
}

impl HostRecord {
    /// Age is clamped at zero so a host with a clock ahead of ours reads as fresh.
    pub fn age_at(&self, now_epoch_secs: i64) -> u64 {
        now_epoch_secs.saturating_sub(self.heartbeat).max(0) as u64
    }

    pub fn into_view(self, now_epoch_secs: i64, stale_after_secs: u64) -> HostView {
        let age_secs = self.age_at(now_epoch_secs);
        HostView {
            info: self.info,
            age_secs,
            stale: age_secs > stale_after_secs,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_info(ip: &str) -> HostInfo {
    HostInfo {
        host_name: format!("node-{ip}"),
        os: "linux".to_string(),
        ip: ip.to_string(),
        api_port: 2375,
        grpc_port: 19876,
        cpu_cores: 8,
        cpu_usage_pct: 12.5,
        total_mem_gb: 31.2,
        free_mem_gb: 20.75,
        total_disk_gb: 512,
        free_disk_gb: 300,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_is_now_minus_heartbeat() {
        let rec = HostRecord { info: sample_info("10.0.0.5"), heartbeat: 1000 };
        assert_eq!(rec.age_at(1030), 30);
    }

    #[test]
    fn future_heartbeat_reads_as_zero_age() {
        let rec = HostRecord { info: sample_info("10.0.0.5"), heartbeat: 2000 };
        assert_eq!(rec.age_at(1990), 0);
    }

    #[test]
    fn view_flags_stale_past_threshold() {
        let rec = HostRecord { info: sample_info("10.0.0.5"), heartbeat: 1000 };
        assert!(!rec.clone().into_view(1010, 10).stale);
        assert!(rec.into_view(1011, 10).stale);
    }

    #[test]
    fn record_json_is_flat_camel_case() {
        let rec = HostRecord { info: sample_info("10.0.0.7"), heartbeat: 42 };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["ip"], "10.0.0.7");
        assert_eq!(json["hostName"], "node-10.0.0.7");
        assert_eq!(json["totalMemGB"], 31.2);
        assert_eq!(json["heartbeat"], 42);
        assert!(json.get("info").is_none());
    }

    #[test]
    fn view_exposes_age_not_heartbeat() {
        let rec = HostRecord { info: sample_info("10.0.0.7"), heartbeat: 42 };
        let json = serde_json::to_value(rec.into_view(50, 10)).unwrap();
        assert_eq!(json["ageSecs"], 8);
        assert_eq!(json["stale"], false);
        assert!(json.get("heartbeat").is_none());
    }
}
