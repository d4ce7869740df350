//! CPU tick accounting
//!
//! Converts platform-reported cumulative tick counters into a fixed
//! seven-entry [`TickVector`]. Linux rows come from `/proc/stat`, Windows rows
//! from `GetSystemTimes` and the raw `ProcessorInformation` counters.
//!
//! Malformed or short input never fails; it yields a zero vector.

use serde::{Deserialize, Serialize};

/// Index of each counter in a [`TickVector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickType {
    User,
    Nice,
    System,
    Idle,
    Iowait,
    Irq,
    Softirq,
}

impl TickType {
    /// All tick types in vector order
    pub const ALL: [TickType; TICK_COUNT] = [
        TickType::User,
        TickType::Nice,
        TickType::System,
        TickType::Idle,
        TickType::Iowait,
        TickType::Irq,
        TickType::Softirq,
    ];

    /// Position of this counter in the vector
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Number of counters in a [`TickVector`]
pub const TICK_COUNT: usize = 7;

// Positions in a Linux /proc/stat cpu row
const STAT_IDLE: usize = 3;
const STAT_STEAL: usize = 7;

/// Windows reports processor times in 100ns units
const HUNDRED_NS_PER_MS: u64 = 10_000;

/// Cumulative CPU time per [`TickType`] since boot
///
/// Linux values are USER_HZ clock ticks, Windows values are milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickVector([u64; TICK_COUNT]);

impl TickVector {
    /// All-zero vector
    pub const ZERO: TickVector = TickVector([0; TICK_COUNT]);

    /// Build a vector from raw values in [`TickType`] order
    pub fn from_array(values: [u64; TICK_COUNT]) -> Self {
        Self(values)
    }

    /// Value of one counter
    pub fn get(&self, tick: TickType) -> u64 {
        self.0[tick.index()]
    }

    /// Counters in [`TickType`] order
    pub fn as_array(&self) -> &[u64; TICK_COUNT] {
        &self.0
    }

    /// Sum of all counters
    pub fn total(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// Sum of all non-idle counters (idle and iowait excluded)
    pub fn busy(&self) -> u64 {
        self.total()
            .saturating_sub(self.get(TickType::Idle))
            .saturating_sub(self.get(TickType::Iowait))
    }

    /// True if every counter is zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }
}

/// Compute a tick vector from a Linux-style positional row
///
/// Fields map to USER, NICE, SYSTEM, IDLE, then optionally IOWAIT, IRQ,
/// SOFTIRQ, STEAL, GUEST, GUEST_NICE. STEAL is charged to SYSTEM. GUEST and
/// GUEST_NICE are already part of USER and NICE and are ignored.
pub fn compute_ticks(raw: &[u64]) -> TickVector {
    if raw.len() <= STAT_IDLE {
        return TickVector::ZERO;
    }

    let mut ticks = [0u64; TICK_COUNT];
    for (slot, value) in ticks.iter_mut().zip(raw.iter()) {
        *slot = *value;
    }

    if let Some(steal) = raw.get(STAT_STEAL) {
        let system = TickType::System.index();
        ticks[system] = ticks[system].saturating_add(*steal);
    }

    TickVector(ticks)
}

/// Raw Windows processor times, all cumulative in 100ns units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowsRawTicks {
    /// User mode time
    pub user: u64,
    /// Kernel mode time excluding idle (includes interrupt and DPC time)
    pub privileged: u64,
    /// Idle time
    pub idle: u64,
    /// Hardware interrupt time
    pub interrupt: u64,
    /// Deferred procedure call time
    pub dpc: u64,
}

/// Compute a tick vector (milliseconds) from Windows processor times
///
/// Kernel time already contains interrupt and DPC time, so those are
/// removed from SYSTEM and reported as IRQ and SOFTIRQ.
pub fn compute_windows_ticks(raw: &WindowsRawTicks) -> TickVector {
    let irq = raw.interrupt / HUNDRED_NS_PER_MS;
    let softirq = raw.dpc / HUNDRED_NS_PER_MS;
    let system = (raw.privileged / HUNDRED_NS_PER_MS)
        .saturating_sub(irq)
        .saturating_sub(softirq);

    let mut ticks = [0u64; TICK_COUNT];
    ticks[TickType::User.index()] = raw.user / HUNDRED_NS_PER_MS;
    ticks[TickType::System.index()] = system;
    ticks[TickType::Idle.index()] = raw.idle / HUNDRED_NS_PER_MS;
    ticks[TickType::Irq.index()] = irq;
    ticks[TickType::Softirq.index()] = softirq;
    TickVector(ticks)
}

/// One `/proc/stat` cpu row: aggregate (`cpu`) or a logical processor (`cpuN`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRow {
    /// Logical processor index, `None` for the aggregate row
    pub processor: Option<usize>,
    /// Numeric fields after the label
    pub fields: Vec<u64>,
}

/// Parse a `/proc/stat` cpu line
///
/// Returns `None` for lines that are not cpu rows. A field that does not
/// parse is recorded as 0 to keep the positional mapping intact.
pub fn parse_stat_line(line: &str) -> Option<StatRow> {
    let mut parts = line.split_whitespace();
    let label = parts.next()?;
    let suffix = label.strip_prefix("cpu")?;

    let processor = if suffix.is_empty() {
        None
    } else {
        Some(suffix.parse::<usize>().ok()?)
    };

    let fields = parts.map(|s| s.parse().unwrap_or(0)).collect();
    Some(StatRow { processor, fields })
}

/// Compute one tick vector per logical processor
///
/// `rows` pairs a processor index with its tick vector. Processors without a
/// row stay zero; rows at or past `logical_count` are dropped.
pub fn compute_processor_ticks<I>(rows: I, logical_count: usize) -> Vec<TickVector>
where
    I: IntoIterator<Item = (usize, TickVector)>,
{
    let mut ticks = vec![TickVector::ZERO; logical_count];
    for (cpu, vector) in rows {
        match ticks.get_mut(cpu) {
            Some(slot) => *slot = vector,
            None => log::debug!(
                "dropping tick row for processor {} (only {} logical processors)",
                cpu,
                logical_count
            ),
        }
    }
    ticks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_input_is_zero() {
        assert_eq!(compute_ticks(&[]), TickVector::ZERO);
        assert_eq!(compute_ticks(&[5]), TickVector::ZERO);
        assert_eq!(compute_ticks(&[5, 6, 7]), TickVector::ZERO);
    }

    #[test]
    fn test_four_fields_leave_tail_zero() {
        let ticks = compute_ticks(&[10, 20, 30, 40]);
        assert_eq!(ticks.as_array(), &[10, 20, 30, 40, 0, 0, 0]);
    }

    #[test]
    fn test_proc_stat_scenario() {
        let row = parse_stat_line("cpu0 100 0 50 9000 20 0 0").unwrap();
        assert_eq!(row.processor, Some(0));

        let ticks = compute_ticks(&row.fields);
        assert_eq!(ticks.get(TickType::User), 100);
        assert_eq!(ticks.get(TickType::Nice), 0);
        assert_eq!(ticks.get(TickType::System), 50);
        assert_eq!(ticks.get(TickType::Idle), 9000);
        assert_eq!(ticks.get(TickType::Iowait), 20);
        assert_eq!(ticks.get(TickType::Irq), 0);
        assert_eq!(ticks.get(TickType::Softirq), 0);
    }

    #[test]
    fn test_steal_folded_into_system() {
        let ticks = compute_ticks(&[100, 5, 50, 9000, 20, 3, 4, 7]);
        assert_eq!(ticks.get(TickType::System), 57);
        assert_eq!(ticks.get(TickType::Irq), 3);
        assert_eq!(ticks.get(TickType::Softirq), 4);
    }

    #[test]
    fn test_guest_fields_ignored() {
        let base = compute_ticks(&[100, 5, 50, 9000, 20, 3, 4, 7]);
        let with_guest = compute_ticks(&[100, 5, 50, 9000, 20, 3, 4, 7, 60, 2]);
        assert_eq!(base, with_guest);
        assert_eq!(with_guest.get(TickType::User), 100);
        assert_eq!(with_guest.get(TickType::Nice), 5);
    }

    #[test]
    fn test_steal_saturates() {
        let ticks = compute_ticks(&[0, 0, u64::MAX, 0, 0, 0, 0, 10]);
        assert_eq!(ticks.get(TickType::System), u64::MAX);
    }

    #[test]
    fn test_parse_stat_line_variants() {
        let aggregate = parse_stat_line("cpu  1 2 3 4 5 6 7 8 9 10").unwrap();
        assert_eq!(aggregate.processor, None);
        assert_eq!(aggregate.fields.len(), 10);

        let garbled = parse_stat_line("cpu3 1 x 3 4").unwrap();
        assert_eq!(garbled.processor, Some(3));
        assert_eq!(garbled.fields, vec![1, 0, 3, 4]);

        assert!(parse_stat_line("intr 12345 0 0").is_none());
        assert!(parse_stat_line("cpufreq 1 2 3 4").is_none());
        assert!(parse_stat_line("").is_none());
    }

    #[test]
    fn test_windows_ticks_subtract_interrupts() {
        let raw = WindowsRawTicks {
            user: 50_000_000,
            privileged: 30_000_000,
            idle: 900_000_000,
            interrupt: 5_000_000,
            dpc: 2_000_000,
        };
        let ticks = compute_windows_ticks(&raw);
        assert_eq!(ticks.get(TickType::User), 5_000);
        assert_eq!(ticks.get(TickType::Irq), 500);
        assert_eq!(ticks.get(TickType::Softirq), 200);
        assert_eq!(ticks.get(TickType::System), 3_000 - 700);
        assert_eq!(ticks.get(TickType::Idle), 90_000);
        assert_eq!(ticks.get(TickType::Nice), 0);
        assert_eq!(ticks.get(TickType::Iowait), 0);
    }

    #[test]
    fn test_windows_ticks_never_negative() {
        let raw = WindowsRawTicks {
            privileged: 10_000,
            interrupt: 50_000,
            dpc: 50_000,
            ..Default::default()
        };
        assert_eq!(compute_windows_ticks(&raw).get(TickType::System), 0);
    }

    #[test]
    fn test_processor_ticks_mismatched_count() {
        let one = compute_ticks(&[1, 1, 1, 1]);
        let two = compute_ticks(&[2, 2, 2, 2]);

        let ticks = compute_processor_ticks(vec![(0, one), (2, two), (9, two)], 4);
        assert_eq!(ticks.len(), 4);
        assert_eq!(ticks[0], one);
        assert!(ticks[1].is_zero());
        assert_eq!(ticks[2], two);
        assert!(ticks[3].is_zero());
    }

    #[test]
    fn test_totals() {
        let ticks = TickVector::from_array([10, 0, 5, 80, 5, 0, 0]);
        assert_eq!(ticks.total(), 100);
        assert_eq!(ticks.busy(), 15);
    }
}
