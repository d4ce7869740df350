//! Disk I/O counter accounting
//!
//! Disks expose cumulative counters (operations, bytes, busy time). This
//! module keeps the latest absolute values per device; computing rates from
//! two snapshots is left to the caller.
//!
//! Busy time is not a portable concept: Linux reports it directly
//! (`active_ms`), Windows only exposes idle time, so busy time is derived as
//! elapsed minus idle. Both formulas are kept as-is.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Size of a sector in POSIX block-layer statistics
pub const SECTOR_SIZE: u64 = 512;

const HUNDRED_NS_PER_MS: u64 = 10_000;

/// Latest cumulative counters for one disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCounterSnapshot {
    /// Completed read operations
    pub reads: u64,
    /// Bytes read
    pub read_bytes: u64,
    /// Completed write operations
    pub writes: u64,
    /// Bytes written
    pub write_bytes: u64,
    /// Requests currently in flight
    pub queue_length: u64,
    /// Milliseconds the device spent servicing requests
    pub busy_time_ms: u64,
    /// Time of the poll that produced these values (ms since Unix epoch)
    pub timestamp_ms: u64,
}

/// One raw counter row as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawDiskCounters {
    /// Linux block-layer `stat` fields, byte counts in 512-byte sectors
    Sectors {
        reads: u64,
        read_sectors: u64,
        writes: u64,
        write_sectors: u64,
        queue_length: u64,
        active_ms: u64,
    },
    /// Windows `PhysicalDisk` raw counters, bytes in native units
    Native {
        reads: u64,
        read_bytes: u64,
        writes: u64,
        write_bytes: u64,
        queue_length: u64,
        /// `PercentIdleTime` raw value (100ns)
        idle_time_100ns: u64,
        /// Counter timestamp (100ns) the idle time is measured against
        elapsed_time_100ns: u64,
    },
}

impl RawDiskCounters {
    /// Parse a Linux `/sys/block/<dev>/stat` line
    ///
    /// Field layout: reads, reads merged, sectors read, ms reading, writes,
    /// writes merged, sectors written, ms writing, in flight, io_ticks, ...
    /// Returns `None` when fewer than 10 fields are present.
    pub fn from_block_stat(line: &str) -> Option<Self> {
        let fields: Vec<u64> = line
            .split_whitespace()
            .map(|s| s.parse().unwrap_or(0))
            .collect();
        if fields.len() < 10 {
            return None;
        }
        Some(RawDiskCounters::Sectors {
            reads: fields[0],
            read_sectors: fields[2],
            writes: fields[4],
            write_sectors: fields[6],
            queue_length: fields[8],
            active_ms: fields[9],
        })
    }

    fn apply(&self, snapshot: &mut DiskCounterSnapshot) {
        match *self {
            RawDiskCounters::Sectors {
                reads,
                read_sectors,
                writes,
                write_sectors,
                queue_length,
                active_ms,
            } => {
                snapshot.reads = reads;
                snapshot.read_bytes = read_sectors.saturating_mul(SECTOR_SIZE);
                snapshot.writes = writes;
                snapshot.write_bytes = write_sectors.saturating_mul(SECTOR_SIZE);
                snapshot.queue_length = queue_length;
                snapshot.busy_time_ms = active_ms;
            }
            RawDiskCounters::Native {
                reads,
                read_bytes,
                writes,
                write_bytes,
                queue_length,
                idle_time_100ns,
                elapsed_time_100ns,
            } => {
                snapshot.reads = reads;
                snapshot.read_bytes = read_bytes;
                snapshot.writes = writes;
                snapshot.write_bytes = write_bytes;
                snapshot.queue_length = queue_length;
                snapshot.busy_time_ms =
                    elapsed_time_100ns.saturating_sub(idle_time_100ns) / HUNDRED_NS_PER_MS;
            }
        }
    }
}

/// Refresh one snapshot from its raw counter row
///
/// With no row (instance disappeared, lookup failed) the current values are
/// returned unchanged together with `false`.
pub fn refresh_disk_counters(
    current: &DiskCounterSnapshot,
    row: Option<&RawDiskCounters>,
    timestamp_ms: u64,
) -> (DiskCounterSnapshot, bool) {
    match row {
        Some(raw) => {
            let mut updated = current.clone();
            raw.apply(&mut updated);
            updated.timestamp_ms = timestamp_ms;
            (updated, true)
        }
        None => (current.clone(), false),
    }
}

/// Raw counters for every device sampled in one poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskPoll {
    /// Timestamp shared by every row of this poll (ms since Unix epoch)
    pub timestamp_ms: u64,
    /// Raw counters keyed by device name
    pub rows: HashMap<String, RawDiskCounters>,
}

impl DiskPoll {
    /// Create an empty poll at `timestamp_ms`
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            rows: HashMap::new(),
        }
    }
}

/// Per-device result of [`DiskCounterStore::poll`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollOutcome {
    /// Refresh success per tracked device
    pub devices: BTreeMap<String, bool>,
    /// Rows for devices that are not tracked
    pub dropped: Vec<String>,
}

impl PollOutcome {
    /// True if every tracked device was refreshed
    pub fn all_refreshed(&self) -> bool {
        self.devices.values().all(|ok| *ok)
    }

    /// Whether `device` was refreshed; `None` if it is not tracked
    pub fn refreshed(&self, device: &str) -> Option<bool> {
        self.devices.get(device).copied()
    }
}

/// Latest [`DiskCounterSnapshot`] per known disk
#[derive(Debug, Clone, Default)]
pub struct DiskCounterStore {
    snapshots: BTreeMap<String, DiskCounterSnapshot>,
}

impl DiskCounterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `device` with a zero snapshot (no-op if already tracked)
    pub fn track(&mut self, device: impl Into<String>) {
        self.snapshots.entry(device.into()).or_default();
    }

    /// Track `device` starting from `snapshot` (replaces any existing entry)
    pub fn track_with(&mut self, device: impl Into<String>, snapshot: DiskCounterSnapshot) {
        self.snapshots.insert(device.into(), snapshot);
    }

    /// Latest snapshot for `device`
    pub fn get(&self, device: &str) -> Option<&DiskCounterSnapshot> {
        self.snapshots.get(device)
    }

    /// Iterate over tracked devices and their snapshots
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DiskCounterSnapshot)> {
        self.snapshots.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of tracked devices
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// True if no devices are tracked
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Apply one poll to every tracked device
    ///
    /// Devices missing from the poll keep their previous snapshot and report
    /// `false`. Rows for untracked devices are dropped.
    pub fn poll(&mut self, poll: &DiskPoll) -> PollOutcome {
        let mut outcome = PollOutcome::default();

        for (device, snapshot) in self.snapshots.iter_mut() {
            let (updated, ok) =
                refresh_disk_counters(snapshot, poll.rows.get(device), poll.timestamp_ms);
            if ok {
                *snapshot = updated;
            } else {
                log::debug!("no counters for disk {} in this poll, keeping previous values", device);
            }
            outcome.devices.insert(device.clone(), ok);
        }

        for device in poll.rows.keys() {
            if !self.snapshots.contains_key(device) {
                log::debug!("dropping counters for unknown disk {}", device);
                outcome.dropped.push(device.clone());
            }
        }
        outcome.dropped.sort();

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sectors(reads: u64, read_sectors: u64) -> RawDiskCounters {
        RawDiskCounters::Sectors {
            reads,
            read_sectors,
            writes: 7,
            write_sectors: 8,
            queue_length: 1,
            active_ms: 40,
        }
    }

    #[test]
    fn test_sector_to_byte_conversion() {
        let (snap, ok) =
            refresh_disk_counters(&DiskCounterSnapshot::default(), Some(&sectors(3, 100)), 1);
        assert!(ok);
        assert_eq!(snap.read_bytes, 51_200);
        assert_eq!(snap.write_bytes, 8 * SECTOR_SIZE);
        assert_eq!(snap.busy_time_ms, 40);
        assert_eq!(snap.queue_length, 1);
    }

    #[test]
    fn test_native_bytes_pass_through_and_busy_from_idle() {
        let raw = RawDiskCounters::Native {
            reads: 10,
            read_bytes: 4096,
            writes: 20,
            write_bytes: 8192,
            queue_length: 2,
            idle_time_100ns: 60_000_000,
            elapsed_time_100ns: 100_000_000,
        };
        let (snap, ok) = refresh_disk_counters(&DiskCounterSnapshot::default(), Some(&raw), 5);
        assert!(ok);
        assert_eq!(snap.read_bytes, 4096);
        assert_eq!(snap.write_bytes, 8192);
        assert_eq!(snap.busy_time_ms, 4_000);
    }

    #[test]
    fn test_native_idle_exceeding_elapsed_saturates() {
        let raw = RawDiskCounters::Native {
            reads: 0,
            read_bytes: 0,
            writes: 0,
            write_bytes: 0,
            queue_length: 0,
            idle_time_100ns: 200,
            elapsed_time_100ns: 100,
        };
        let (snap, _) = refresh_disk_counters(&DiskCounterSnapshot::default(), Some(&raw), 5);
        assert_eq!(snap.busy_time_ms, 0);
    }

    #[test]
    fn test_refresh_is_idempotent_except_timestamp() {
        let raw = sectors(3, 100);
        let (first, _) = refresh_disk_counters(&DiskCounterSnapshot::default(), Some(&raw), 1_000);
        let (second, ok) = refresh_disk_counters(&first, Some(&raw), 2_000);
        assert!(ok);
        assert_eq!(second.timestamp_ms, 2_000);
        assert_eq!(
            DiskCounterSnapshot {
                timestamp_ms: 0,
                ..second
            },
            DiskCounterSnapshot {
                timestamp_ms: 0,
                ..first
            }
        );
    }

    #[test]
    fn test_missing_row_keeps_previous() {
        let (previous, _) =
            refresh_disk_counters(&DiskCounterSnapshot::default(), Some(&sectors(3, 100)), 1_000);
        let (after, ok) = refresh_disk_counters(&previous, None, 2_000);
        assert!(!ok);
        assert_eq!(after, previous);
    }

    #[test]
    fn test_store_partial_failure() {
        let mut store = DiskCounterStore::new();
        store.track("sda");
        store.track("sdb");

        let mut poll = DiskPoll::new(1_000);
        poll.rows.insert("sda".to_string(), sectors(1, 10));
        poll.rows.insert("sdb".to_string(), sectors(2, 20));
        assert!(store.poll(&poll).all_refreshed());
        let sdb_before = store.get("sdb").cloned().unwrap();

        let mut poll = DiskPoll::new(2_000);
        poll.rows.insert("sda".to_string(), sectors(5, 50));
        poll.rows.insert("sdz".to_string(), sectors(9, 90));
        let outcome = store.poll(&poll);

        assert_eq!(outcome.refreshed("sda"), Some(true));
        assert_eq!(outcome.refreshed("sdb"), Some(false));
        assert_eq!(outcome.refreshed("sdz"), None);
        assert_eq!(outcome.dropped, vec!["sdz".to_string()]);
        assert!(!outcome.all_refreshed());

        assert_eq!(store.get("sda").unwrap().reads, 5);
        assert_eq!(store.get("sda").unwrap().timestamp_ms, 2_000);
        assert_eq!(store.get("sdb").unwrap(), &sdb_before);
        assert!(store.get("sdz").is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_from_block_stat() {
        let raw = RawDiskCounters::from_block_stat(
            "    4617     1570   338936     1762     2299     2554    84634     2364        0     3080     4127        0        0        0        0",
        )
        .unwrap();
        assert_eq!(
            raw,
            RawDiskCounters::Sectors {
                reads: 4617,
                read_sectors: 338936,
                writes: 2299,
                write_sectors: 84634,
                queue_length: 0,
                active_ms: 3080,
            }
        );
        assert!(RawDiskCounters::from_block_stat("1 2 3").is_none());
    }
}
