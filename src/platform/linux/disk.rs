//! Linux disk enumeration and counters via sysfs and procfs

use crate::core::disk::{refresh_disk_counters, DiskCounterSnapshot, DiskPoll, RawDiskCounters, SECTOR_SIZE};
use crate::core::partition::{DiskRecord, PartitionRecord};
use crate::platform::common::{decode_mount_field, now_millis};
use crate::source::TextCounterReader;
use std::collections::HashMap;

const SYS_BLOCK: &str = "/sys/block";
const PROC_MOUNTS: &str = "/proc/mounts";
const DISK_BY_UUID: &str = "/dev/disk/by-uuid";

/// Mount point and filesystem type per device node
fn read_mounts(reader: &dyn TextCounterReader) -> HashMap<String, (String, String)> {
    let mut mounts = HashMap::new();
    let Ok(lines) = reader.read_lines(PROC_MOUNTS) else {
        log::debug!("{} unavailable, partitions reported unmounted", PROC_MOUNTS);
        return mounts;
    };

    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 || !parts[0].starts_with("/dev/") {
            continue;
        }
        // First mount wins for bind-mounted devices
        mounts
            .entry(decode_mount_field(parts[0]))
            .or_insert_with(|| (decode_mount_field(parts[1]), parts[2].to_string()));
    }
    mounts
}

/// Filesystem UUID per partition name, from the `/dev/disk/by-uuid` symlinks
fn read_uuids(reader: &dyn TextCounterReader) -> HashMap<String, String> {
    let mut uuids = HashMap::new();
    let Ok(entries) = reader.list_dir(DISK_BY_UUID) else {
        return uuids;
    };

    for uuid in entries {
        let link = format!("{}/{}", DISK_BY_UUID, uuid);
        if let Ok(target) = reader.read_link(&link) {
            if let Some(name) = target.file_name() {
                uuids.insert(name.to_string_lossy().to_string(), uuid);
            }
        }
    }
    uuids
}

/// Parse a sysfs `dev` attribute ("8:1")
fn parse_dev_numbers(dev: &str) -> (u32, u32) {
    match dev.trim().split_once(':') {
        Some((major, minor)) => (major.parse().unwrap_or(0), minor.parse().unwrap_or(0)),
        None => (0, 0),
    }
}

fn read_raw_counters(reader: &dyn TextCounterReader, name: &str) -> Option<RawDiskCounters> {
    let path = format!("{}/{}/stat", SYS_BLOCK, name);
    match reader.read_string(&path) {
        Ok(line) => {
            let raw = RawDiskCounters::from_block_stat(&line);
            if raw.is_none() {
                log::warn!("malformed block stat for {}: {:?}", name, line);
            }
            raw
        }
        Err(e) => {
            log::debug!("no block stat for {}: {}", name, e);
            None
        }
    }
}

/// Block device names reported as disks
pub fn disk_names(reader: &dyn TextCounterReader, skip_prefixes: &[String]) -> Vec<String> {
    match reader.list_dir(SYS_BLOCK) {
        Ok(names) => names
            .into_iter()
            .filter(|name| !skip_prefixes.iter().any(|p| name.starts_with(p.as_str())))
            .collect(),
        Err(e) => {
            log::warn!("failed to list {}: {}", SYS_BLOCK, e);
            Vec::new()
        }
    }
}

fn read_partitions(
    reader: &dyn TextCounterReader,
    disk: &str,
    mounts: &HashMap<String, (String, String)>,
    uuids: &HashMap<String, String>,
) -> Vec<PartitionRecord> {
    let disk_path = format!("{}/{}", SYS_BLOCK, disk);
    let Ok(entries) = reader.list_dir(&disk_path) else {
        return Vec::new();
    };

    let mut partitions = Vec::new();
    for entry in entries {
        let part_path = format!("{}/{}", disk_path, entry);
        if !reader.exists(&format!("{}/partition", part_path)) {
            continue;
        }

        let (major_id, minor_id) = reader
            .read_string(&format!("{}/dev", part_path))
            .map(|dev| parse_dev_numbers(&dev))
            .unwrap_or((0, 0));
        let dev_node = format!("/dev/{}", entry);
        let (mount_point, filesystem_type) = mounts.get(&dev_node).cloned().unwrap_or_default();

        partitions.push(PartitionRecord {
            size_bytes: reader
                .read_u64(&format!("{}/size", part_path))
                .unwrap_or(0)
                .saturating_mul(SECTOR_SIZE),
            uuid: uuids.get(&entry).cloned().unwrap_or_default(),
            name: entry,
            dev_node,
            filesystem_type,
            major_id,
            minor_id,
            mount_point,
        });
    }
    partitions
}

/// Enumerate disks with their partitions and current counters
pub fn enumerate_disks(reader: &dyn TextCounterReader, skip_prefixes: &[String]) -> Vec<DiskRecord> {
    let mounts = read_mounts(reader);
    let uuids = read_uuids(reader);
    let timestamp_ms = now_millis();

    disk_names(reader, skip_prefixes)
        .into_iter()
        .map(|name| {
            let attr = |a: &str| format!("{}/{}/{}", SYS_BLOCK, name, a);
            let model = reader
                .read_string(&attr("device/model"))
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Unknown".to_string());
            let serial = reader.read_string(&attr("device/serial")).unwrap_or_default();
            let size_bytes = reader
                .read_u64(&attr("size"))
                .unwrap_or(0)
                .saturating_mul(SECTOR_SIZE);

            let raw = read_raw_counters(reader, &name);
            let (counters, _) =
                refresh_disk_counters(&DiskCounterSnapshot::default(), raw.as_ref(), timestamp_ms);

            DiskRecord {
                partitions: read_partitions(reader, &name, &mounts, &uuids),
                name,
                model,
                serial,
                size_bytes,
                counters,
            }
        })
        .collect()
}

/// Sample every disk's `stat` against one shared timestamp
pub fn poll_disk_counters(reader: &dyn TextCounterReader, skip_prefixes: &[String]) -> DiskPoll {
    let mut poll = DiskPoll::new(now_millis());
    for name in disk_names(reader, skip_prefixes) {
        if let Some(raw) = read_raw_counters(reader, &name) {
            poll.rows.insert(name, raw);
        }
    }
    poll
}
