//! Data types pushed to clients as JSON.
//! Keep this module minimal and stable: it defines the wire format.

use serde::{Deserialize, Serialize};

/// One system measurement: CPU, memory and temperature sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Per logical CPU, or a single aggregate entry.
    pub cpu: Vec<f64>,
    pub mem: MemoryStats,
    pub sensors: Vec<TemperatureStat>,
}

/// Virtual memory usage in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub used_percent: f64,
    pub free: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureStat {
    pub sensor_key: String,
    /// Degrees Celsius.
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_critical: Option<f64>,
}

/// One process entry of a `/proc` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub pid: i32,
    pub name: String,
    pub cpu_percent: f64,
    pub mem_percent: f32,
    #[serde(rename = "mem")]
    pub memory_info: MemoryInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Resident set size in bytes.
    pub rss: u64,
    /// Virtual memory size in bytes.
    pub vms: u64,
}

/// Filesystem usage for the mount containing a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub path: String,
    pub fstype: String,
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub used_percent: f64,
}
