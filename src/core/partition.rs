//! Disk and partition inventory records

use crate::core::disk::DiskCounterSnapshot;
use serde::{Deserialize, Serialize};

/// One partition of a disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    /// Device node (e.g., "/dev/sda1", "\\\\.\\PHYSICALDRIVE0\\Partition1")
    pub dev_node: String,
    /// Partition name (e.g., "sda1", "Disk #0, Partition #0")
    pub name: String,
    /// Filesystem type if mounted or known
    pub filesystem_type: String,
    /// Filesystem or partition UUID, empty if unknown
    pub uuid: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Device major number (0 where not applicable)
    pub major_id: u32,
    /// Device minor number (0 where not applicable)
    pub minor_id: u32,
    /// Mount point or drive letter, empty if not mounted
    pub mount_point: String,
}

/// One physical disk with the partitions found on it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskRecord {
    /// Device name used as the counter key (e.g., "sda", "0")
    pub name: String,
    /// Model string
    pub model: String,
    /// Serial number, empty if unavailable
    pub serial: String,
    /// Capacity in bytes
    pub size_bytes: u64,
    /// Partitions, sorted by name
    pub partitions: Vec<PartitionRecord>,
    /// Counters as of enumeration
    pub counters: DiskCounterSnapshot,
}

impl DiskRecord {
    /// Partition mounted at `mount_point`
    pub fn partition_at(&self, mount_point: &str) -> Option<&PartitionRecord> {
        self.partitions
            .iter()
            .find(|p| !p.mount_point.is_empty() && p.mount_point == mount_point)
    }

    /// Sum of partition sizes
    pub fn partitioned_bytes(&self) -> u64 {
        self.partitions.iter().map(|p| p.size_bytes).sum()
    }
}
