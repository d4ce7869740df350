//! Windows platform implementation
//!
//! All WMI and raw performance counter access goes through one
//! [`WmiCache`] owned by the probe. After [`HardwareProbe::close`] every
//! query degrades to empty results.

pub mod cache;
pub mod cpu;
pub mod disk;
pub mod identity;

use crate::config::Config;
use crate::core::disk::DiskPoll;
use crate::core::identity::ProcessorIdentity;
use crate::core::partition::DiskRecord;
use crate::core::ticks::TickVector;
use crate::error::Result;
use crate::platform::HardwareProbe;

pub use cache::WmiCache;
pub use identity::WmiProcessorTier;

/// [`HardwareProbe`] for Windows
pub struct WindowsProbe {
    wmi: WmiCache,
    use_system_tools: bool,
}

impl WindowsProbe {
    /// Open the WMI connection
    pub fn open(config: &Config) -> Result<Self> {
        let wmi = WmiCache::open()?;
        log::debug!("WMI connection opened");
        Ok(Self {
            wmi,
            use_system_tools: config.identity.use_privileged_tools,
        })
    }
}

impl HardwareProbe for WindowsProbe {
    fn platform(&self) -> &'static str {
        "windows"
    }

    fn system_ticks(&self) -> TickVector {
        cpu::read_system_ticks(&self.wmi)
    }

    fn processor_ticks(&self) -> Vec<TickVector> {
        cpu::read_processor_ticks(&self.wmi)
    }

    fn processor_identity(&self) -> ProcessorIdentity {
        let mut identity = identity::read_registry_identity();
        let wmi_tier = WmiProcessorTier { wmi: &self.wmi };
        if self.use_system_tools {
            identity.resolve_id(&[&wmi_tier]);
        } else {
            identity.resolve_id(&[]);
        }
        identity
    }

    fn disks(&self) -> Vec<DiskRecord> {
        disk::enumerate_disks(&self.wmi)
    }

    fn poll_disk_counters(&self) -> DiskPoll {
        disk::poll_disk_counters(&self.wmi)
    }

    fn close(&mut self) {
        self.wmi.close();
    }
}
