// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! Windows disk enumeration and counters via WMI

use super::cache::WmiCache;
use crate::core::disk::{refresh_disk_counters, DiskCounterSnapshot, DiskPoll, RawDiskCounters};
use crate::core::partition::{DiskRecord, PartitionRecord};
use crate::platform::common::now_millis;
use serde::Deserialize;

const DISK_PERF_QUERY: &str = "SELECT Name, DiskReadsPerSec, DiskReadBytesPerSec, \
     DiskWritesPerSec, DiskWriteBytesPerSec, CurrentDiskQueueLength, PercentIdleTime, \
     Timestamp_Sys100NS FROM Win32_PerfRawData_PerfDisk_PhysicalDisk";

/// Raw physical disk counters; instance names look like `"0 C:"`
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct DiskPerfRaw {
    pub name: String,
    #[serde(default)]
    pub disk_reads_per_sec: u64,
    #[serde(default)]
    pub disk_read_bytes_per_sec: u64,
    #[serde(default)]
    pub disk_writes_per_sec: u64,
    #[serde(default)]
    pub disk_write_bytes_per_sec: u64,
    #[serde(default)]
    pub current_disk_queue_length: u64,
    #[serde(default)]
    pub percent_idle_time: u64,
    #[serde(default, rename = "Timestamp_Sys100NS")]
    pub timestamp_sys_100ns: u64,
}

impl DiskPerfRaw {
    /// Disk name this instance belongs to, `None` for `_Total`
    pub fn disk_name(&self) -> Option<String> {
        let index: u32 = self.name.split_whitespace().next()?.parse().ok()?;
        Some(disk_name(index))
    }

    /// Raw counters, with busy time derived from idle time
    pub fn raw_counters(&self) -> RawDiskCounters {
        RawDiskCounters::Native {
            reads: self.disk_reads_per_sec,
            read_bytes: self.disk_read_bytes_per_sec,
            writes: self.disk_writes_per_sec,
            write_bytes: self.disk_write_bytes_per_sec,
            queue_length: self.current_disk_queue_length,
            idle_time_100ns: self.percent_idle_time,
            elapsed_time_100ns: self.timestamp_sys_100ns,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Win32DiskDrive {
    index: u32,
    model: Option<String>,
    serial_number: Option<String>,
    size: Option<u64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Win32DiskPartition {
    #[serde(rename = "DeviceID")]
    device_id: String,
    disk_index: u32,
    index: u32,
    name: Option<String>,
    size: Option<u64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Win32LogicalDisk {
    #[serde(rename = "DeviceID")]
    device_id: String,
    file_system: Option<String>,
    volume_serial_number: Option<String>,
}

/// Name of the disk with physical `index`
pub fn disk_name(index: u32) -> String {
    format!("PhysicalDrive{}", index)
}

/// Sample raw counters for all physical disks
pub fn poll_disk_counters(wmi: &WmiCache) -> DiskPoll {
    let mut poll = DiskPoll::new(now_millis());
    for perf in wmi.query::<DiskPerfRaw>(DISK_PERF_QUERY).unwrap_or_default() {
        if let Some(name) = perf.disk_name() {
            poll.rows.insert(name, perf.raw_counters());
        }
    }
    poll
}

fn mounted_volume(wmi: &WmiCache, partition_id: &str) -> Option<Win32LogicalDisk> {
    let query = format!(
        "ASSOCIATORS OF {{Win32_DiskPartition.DeviceID='{}'}} WHERE AssocClass = Win32_LogicalDiskToPartition",
        partition_id.replace('\'', "")
    );
    wmi.query::<Win32LogicalDisk>(&query)?.into_iter().next()
}

fn read_partitions(wmi: &WmiCache, disk_index: u32, partitions: &[Win32DiskPartition]) -> Vec<PartitionRecord> {
    let mut records: Vec<PartitionRecord> = partitions
        .iter()
        .filter(|p| p.disk_index == disk_index)
        .map(|p| {
            let volume = mounted_volume(wmi, &p.device_id);
            PartitionRecord {
                dev_node: format!("\\\\.\\{}\\Partition{}", disk_name(disk_index), p.index),
                name: p.name.clone().unwrap_or_else(|| p.device_id.clone()),
                filesystem_type: volume
                    .as_ref()
                    .and_then(|v| v.file_system.clone())
                    .unwrap_or_default(),
                uuid: volume
                    .as_ref()
                    .and_then(|v| v.volume_serial_number.clone())
                    .unwrap_or_default(),
                size_bytes: p.size.unwrap_or(0),
                major_id: p.disk_index,
                minor_id: p.index,
                mount_point: volume.map(|v| format!("{}\\", v.device_id)).unwrap_or_default(),
            }
        })
        .collect();
    records.sort_by_key(|p| p.minor_id);
    records
}

/// Enumerate physical disks with their partitions and current counters
pub fn enumerate_disks(wmi: &WmiCache) -> Vec<DiskRecord> {
    let drives: Vec<Win32DiskDrive> = wmi
        .query("SELECT Index, Model, SerialNumber, Size FROM Win32_DiskDrive")
        .unwrap_or_default();
    if drives.is_empty() {
        return Vec::new();
    }

    let partitions: Vec<Win32DiskPartition> = wmi
        .query("SELECT DeviceID, DiskIndex, Index, Name, Size FROM Win32_DiskPartition")
        .unwrap_or_default();
    let poll = poll_disk_counters(wmi);

    let mut disks: Vec<DiskRecord> = drives
        .into_iter()
        .map(|drive| {
            let name = disk_name(drive.index);
            let (counters, refreshed) = refresh_disk_counters(
                &DiskCounterSnapshot::default(),
                poll.rows.get(&name),
                poll.timestamp_ms,
            );
            if !refreshed {
                log::debug!("no performance counters for {}", name);
            }

            DiskRecord {
                partitions: read_partitions(wmi, drive.index, &partitions),
                model: drive
                    .model
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unknown".to_string()),
                serial: drive.serial_number.map(|s| s.trim().to_string()).unwrap_or_default(),
                size_bytes: drive.size.unwrap_or(0),
                name,
                counters,
            }
        })
        .collect();
    disks.sort_by(|a, b| a.name.cmp(&b.name));
    disks
}
