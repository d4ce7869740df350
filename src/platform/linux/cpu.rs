//! Linux CPU tick counters from `/proc/stat`

use crate::core::ticks::{compute_processor_ticks, compute_ticks, parse_stat_line, StatRow, TickVector};
use crate::platform::common::parse_cpu_range;
use crate::source::TextCounterReader;

const PROC_STAT: &str = "/proc/stat";
const CPU_PRESENT: &str = "/sys/devices/system/cpu/present";

fn read_stat_rows(reader: &dyn TextCounterReader) -> Vec<StatRow> {
    match reader.read_lines(PROC_STAT) {
        Ok(lines) => lines.iter().filter_map(|l| parse_stat_line(l)).collect(),
        Err(e) if e.is_expected() => {
            log::debug!("{} unavailable: {}", PROC_STAT, e);
            Vec::new()
        }
        Err(e) => {
            log::warn!("failed to read {}: {}", PROC_STAT, e);
            Vec::new()
        }
    }
}

/// Aggregate tick vector from the `cpu` row
pub fn read_system_ticks(reader: &dyn TextCounterReader) -> TickVector {
    read_stat_rows(reader)
        .iter()
        .find(|row| row.processor.is_none())
        .map(|row| compute_ticks(&row.fields))
        .unwrap_or(TickVector::ZERO)
}

/// Number of logical processors
///
/// Uses the sysfs `present` list, falling back to the highest `cpuN` row.
pub fn logical_processor_count(reader: &dyn TextCounterReader, rows: &[StatRow]) -> usize {
    let present = reader
        .read_string(CPU_PRESENT)
        .ok()
        .and_then(|s| parse_cpu_range(&s));

    present.unwrap_or_else(|| {
        rows.iter()
            .filter_map(|row| row.processor)
            .max()
            .map_or(1, |max| max + 1)
    })
}

/// Tick vectors per logical processor from the `cpuN` rows
///
/// Offline processors have no row and stay zero.
pub fn read_processor_ticks(reader: &dyn TextCounterReader) -> Vec<TickVector> {
    let rows = read_stat_rows(reader);
    let count = logical_processor_count(reader, &rows);

    compute_processor_ticks(
        rows.iter()
            .filter_map(|row| row.processor.map(|cpu| (cpu, compute_ticks(&row.fields)))),
        count,
    )
}

/// Clock ticks per second used by `/proc/stat` (USER_HZ)
pub fn user_hz() -> u64 {
    use nix::unistd::{sysconf, SysconfVar};

    match sysconf(SysconfVar::CLK_TCK) {
        Ok(Some(hz)) if hz > 0 => hz as u64,
        _ => 100,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ticks::TickType;
    use crate::source::FsReader;
    use std::fs;

    fn fixture(stat: &str, present: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("proc")).unwrap();
        fs::write(dir.path().join("proc/stat"), stat).unwrap();
        if let Some(present) = present {
            let cpu_dir = dir.path().join("sys/devices/system/cpu");
            fs::create_dir_all(&cpu_dir).unwrap();
            fs::write(cpu_dir.join("present"), present).unwrap();
        }
        dir
    }

    const STAT: &str = "cpu  300 10 150 27000 60 5 5 12 40 0\n\
                        cpu0 100 0 50 9000 20 0 0\n\
                        cpu1 200 10 100 18000 40 5 5 12 40 0\n\
                        intr 1234 0 0\n\
                        ctxt 99\n";

    #[test]
    fn test_system_ticks() {
        let dir = fixture(STAT, Some("0-1\n"));
        let ticks = read_system_ticks(&FsReader::new(dir.path()));
        assert_eq!(ticks.get(TickType::User), 300);
        assert_eq!(ticks.get(TickType::System), 162);
        assert_eq!(ticks.get(TickType::Idle), 27000);
    }

    #[test]
    fn test_processor_ticks_with_offline_cpu() {
        let dir = fixture(STAT, Some("0-3\n"));
        let ticks = read_processor_ticks(&FsReader::new(dir.path()));
        assert_eq!(ticks.len(), 4);
        assert_eq!(ticks[0].as_array(), &[100, 0, 50, 9000, 20, 0, 0]);
        assert_eq!(ticks[1].get(TickType::System), 112);
        assert!(ticks[2].is_zero());
        assert!(ticks[3].is_zero());
    }

    #[test]
    fn test_processor_count_falls_back_to_rows() {
        let dir = fixture(STAT, None);
        let ticks = read_processor_ticks(&FsReader::new(dir.path()));
        assert_eq!(ticks.len(), 2);
    }

    #[test]
    fn test_absurd_present_list_falls_back_to_rows() {
        let dir = fixture(STAT, Some("0-4000000000\n"));
        let ticks = read_processor_ticks(&FsReader::new(dir.path()));
        assert_eq!(ticks.len(), 2);
    }

    #[test]
    fn test_missing_proc_stat_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let reader = FsReader::new(dir.path());
        assert!(read_system_ticks(&reader).is_zero());
        let ticks = read_processor_ticks(&reader);
        assert_eq!(ticks.len(), 1);
        assert!(ticks[0].is_zero());
    }

    #[test]
    fn test_user_hz_positive() {
        assert!(user_hz() > 0);
    }
}
