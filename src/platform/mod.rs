//! Platform-specific implementations
//!
//! Each supported OS implements [`HardwareProbe`] on its own; [`detect`]
//! picks the one for the running platform.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(windows)]
pub mod windows;

// Common utilities
pub mod common;

use crate::config::Config;
use crate::core::disk::{DiskCounterStore, DiskPoll, PollOutcome};
use crate::core::identity::ProcessorIdentity;
use crate::core::partition::DiskRecord;
use crate::core::ticks::TickVector;
use crate::error::Result;

/// Hardware counters a platform can report
///
/// Every method degrades instead of failing: zero vectors, empty lists, or a
/// synthesized identity.
pub trait HardwareProbe {
    /// Platform name ("linux", "windows")
    fn platform(&self) -> &'static str;

    /// Aggregate tick vector across all processors
    fn system_ticks(&self) -> TickVector;

    /// One tick vector per logical processor
    fn processor_ticks(&self) -> Vec<TickVector>;

    /// Processor identity with a resolved processor ID
    fn processor_identity(&self) -> ProcessorIdentity;

    /// Enumerate disks and their partitions
    fn disks(&self) -> Vec<DiskRecord>;

    /// Sample raw counters for every disk against one timestamp
    fn poll_disk_counters(&self) -> DiskPoll;

    /// Release cached native handles; later calls degrade to empty results
    fn close(&mut self) {}

    /// Poll disk counters and apply them to `store`
    fn refresh_disk_counters(&self, store: &mut DiskCounterStore) -> PollOutcome {
        store.poll(&self.poll_disk_counters())
    }
}

/// Create the probe for the running platform
pub fn detect(config: &Config) -> Result<Box<dyn HardwareProbe>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxProbe::from_config(config)))
    }

    #[cfg(windows)]
    {
        Ok(Box::new(windows::WindowsProbe::open(config)?))
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        let _ = config;
        Err(crate::error::Error::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        ))
    }
}

/// Build a counter store seeded with the counters of every disk in `disks`
pub fn track_disks(disks: &[DiskRecord]) -> DiskCounterStore {
    let mut store = DiskCounterStore::new();
    for disk in disks {
        store.track_with(disk.name.clone(), disk.counters.clone());
    }
    store
}
