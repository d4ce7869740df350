//! Windows CPU tick counters
//!
//! The aggregate vector comes from `GetSystemTimes` plus the `_Total`
//! interrupt and DPC raw counters. Per-processor vectors come from the
//! processor-information raw performance class.

use super::cache::WmiCache;
use crate::core::ticks::{compute_processor_ticks, compute_windows_ticks, TickVector, WindowsRawTicks};
use crate::source::PerfCounterSource;
use serde::Deserialize;
use std::mem;
use windows::Win32::Foundation::FILETIME;
use windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

const PROCESSOR_TOTAL_INTERRUPT: &str = "Win32_PerfRawData_PerfOS_Processor(_Total)\\PercentInterruptTime";
const PROCESSOR_TOTAL_DPC: &str = "Win32_PerfRawData_PerfOS_Processor(_Total)\\PercentDPCTime";

const PROCESSOR_INFORMATION_QUERY: &str = "SELECT Name, PercentUserTime, PercentPrivilegedTime, \
     PercentIdleTime, PercentInterruptTime, PercentDPCTime \
     FROM Win32_PerfRawData_Counters_ProcessorInformation";
const PERFOS_PROCESSOR_QUERY: &str = "SELECT Name, PercentUserTime, PercentPrivilegedTime, \
     PercentIdleTime, PercentInterruptTime, PercentDPCTime \
     FROM Win32_PerfRawData_PerfOS_Processor";

/// Raw per-processor times (100ns)
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessorTimes {
    pub name: String,
    #[serde(default)]
    pub percent_user_time: u64,
    #[serde(default)]
    pub percent_privileged_time: u64,
    #[serde(default)]
    pub percent_idle_time: u64,
    #[serde(default)]
    pub percent_interrupt_time: u64,
    #[serde(default, rename = "PercentDPCTime")]
    pub percent_dpc_time: u64,
}

impl From<&ProcessorTimes> for WindowsRawTicks {
    fn from(times: &ProcessorTimes) -> Self {
        WindowsRawTicks {
            user: times.percent_user_time,
            privileged: times.percent_privileged_time,
            idle: times.percent_idle_time,
            interrupt: times.percent_interrupt_time,
            dpc: times.percent_dpc_time,
        }
    }
}

fn filetime_to_u64(ft: &FILETIME) -> u64 {
    ((ft.dwHighDateTime as u64) << 32) | (ft.dwLowDateTime as u64)
}

/// Idle, kernel and user time since boot (100ns); kernel includes idle
fn system_times() -> Option<(u64, u64, u64)> {
    // GetSystemTimes is in kernel32.dll - use raw FFI call
    #[link(name = "kernel32")]
    extern "system" {
        fn GetSystemTimes(
            lpIdleTime: *mut FILETIME,
            lpKernelTime: *mut FILETIME,
            lpUserTime: *mut FILETIME,
        ) -> i32;
    }

    let mut idle_time: FILETIME = unsafe { mem::zeroed() };
    let mut kernel_time: FILETIME = unsafe { mem::zeroed() };
    let mut user_time: FILETIME = unsafe { mem::zeroed() };

    let result = unsafe { GetSystemTimes(&mut idle_time, &mut kernel_time, &mut user_time) };
    if result == 0 {
        log::warn!("GetSystemTimes failed");
        return None;
    }

    Some((
        filetime_to_u64(&idle_time),
        filetime_to_u64(&kernel_time),
        filetime_to_u64(&user_time),
    ))
}

fn total_counter(perf: &dyn PerfCounterSource, path: &str) -> u64 {
    match perf.query(path) {
        Ok(raw) => raw.value,
        Err(e) => {
            log::debug!("counter {} unavailable: {}", path, e);
            0
        }
    }
}

/// Aggregate tick vector in milliseconds
pub fn read_system_ticks(perf: &dyn PerfCounterSource) -> TickVector {
    let Some((idle, kernel, user)) = system_times() else {
        return TickVector::ZERO;
    };

    compute_windows_ticks(&WindowsRawTicks {
        user,
        privileged: kernel.saturating_sub(idle),
        idle,
        interrupt: total_counter(perf, PROCESSOR_TOTAL_INTERRUPT),
        dpc: total_counter(perf, PROCESSOR_TOTAL_DPC),
    })
}

/// Logical processor count reported by the OS
pub fn logical_processor_count() -> usize {
    let mut sys_info: SYSTEM_INFO = unsafe { mem::zeroed() };
    unsafe { GetSystemInfo(&mut sys_info) };
    (sys_info.dwNumberOfProcessors as usize).max(1)
}

/// Sort key for an instance name: `"g,n"` (processor groups) or `"n"`
///
/// Returns `None` for `_Total` style aggregate instances.
pub fn instance_key(name: &str) -> Option<(u32, u32)> {
    match name.split_once(',') {
        Some((group, index)) => Some((group.trim().parse().ok()?, index.trim().parse().ok()?)),
        None => Some((0, name.trim().parse().ok()?)),
    }
}

/// Map instances to logical processor indices in group order
pub fn processor_rows(instances: &[ProcessorTimes]) -> Vec<(usize, TickVector)> {
    let mut keyed: Vec<((u32, u32), &ProcessorTimes)> = instances
        .iter()
        .filter_map(|t| instance_key(&t.name).map(|key| (key, t)))
        .collect();
    keyed.sort_by_key(|(key, _)| *key);

    keyed
        .into_iter()
        .enumerate()
        .map(|(index, (_, times))| (index, compute_windows_ticks(&WindowsRawTicks::from(times))))
        .collect()
}

/// Tick vectors per logical processor
///
/// Prefers the group-aware processor-information class; older systems only
/// expose the PerfOS processor class.
pub fn read_processor_ticks(wmi: &WmiCache) -> Vec<TickVector> {
    let instances = wmi
        .query::<ProcessorTimes>(PROCESSOR_INFORMATION_QUERY)
        .filter(|rows| !rows.is_empty())
        .or_else(|| wmi.query::<ProcessorTimes>(PERFOS_PROCESSOR_QUERY))
        .unwrap_or_default();

    let count = logical_processor_count();
    let rows = processor_rows(&instances);
    if rows.len() != count {
        log::debug!(
            "{} processor counter instances for {} logical processors",
            rows.len(),
            count
        );
    }
    compute_processor_ticks(rows, count)
}
