//! Linux platform implementation
//!
//! Reads `/proc` and `/sys` through a [`TextCounterReader`] and runs
//! `dmidecode`/`cpuid` through a [`ToolRunner`], so the whole probe can be
//! pointed at a fixture tree.

pub mod cpu;
pub mod disk;
pub mod identity;

use crate::config::Config;
use crate::core::disk::DiskPoll;
use crate::core::identity::{IdentityTier, ProcessorIdentity};
use crate::core::partition::DiskRecord;
use crate::core::ticks::TickVector;
use crate::platform::HardwareProbe;
use crate::source::{CommandRunner, FsReader, TextCounterReader, ToolRunner};

pub use cpu::{read_processor_ticks, read_system_ticks, user_hz};
pub use disk::{enumerate_disks, poll_disk_counters};
pub use identity::{read_cpuinfo, CpuidTier, DmidecodeTier};

/// Options for [`LinuxProbe`]
#[derive(Debug, Clone)]
pub struct LinuxOptions {
    /// Block device prefixes to skip
    pub skip_prefixes: Vec<String>,
    /// Consult dmidecode/cpuid for the processor ID
    pub use_system_tools: bool,
    /// dmidecode only answers for root; it is skipped otherwise
    pub running_as_root: bool,
    /// dmidecode executable
    pub dmidecode: String,
    /// cpuid executable
    pub cpuid: String,
}

impl LinuxOptions {
    /// Options from configuration, with root detected from the effective UID
    pub fn from_config(config: &Config) -> Self {
        Self {
            skip_prefixes: config.disk.skip_prefixes.clone(),
            use_system_tools: config.identity.use_privileged_tools,
            running_as_root: nix::unistd::geteuid().is_root(),
            dmidecode: config.identity.dmidecode.clone(),
            cpuid: config.identity.cpuid.clone(),
        }
    }
}

/// [`HardwareProbe`] for Linux
pub struct LinuxProbe {
    reader: Box<dyn TextCounterReader>,
    tools: Box<dyn ToolRunner>,
    options: LinuxOptions,
}

impl LinuxProbe {
    /// Create a probe over explicit sources
    pub fn new(
        reader: impl TextCounterReader + 'static,
        tools: impl ToolRunner + 'static,
        options: LinuxOptions,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            tools: Box::new(tools),
            options,
        }
    }

    /// Probe for the live system (or `paths.root`) as configured
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            FsReader::new(config.paths.root.clone()),
            CommandRunner::new(config.general.query_timeout()),
            LinuxOptions::from_config(config),
        )
    }
}

impl HardwareProbe for LinuxProbe {
    fn platform(&self) -> &'static str {
        "linux"
    }

    fn system_ticks(&self) -> TickVector {
        read_system_ticks(self.reader.as_ref())
    }

    fn processor_ticks(&self) -> Vec<TickVector> {
        read_processor_ticks(self.reader.as_ref())
    }

    fn processor_identity(&self) -> ProcessorIdentity {
        let mut identity = read_cpuinfo(self.reader.as_ref());

        let dmidecode = DmidecodeTier {
            tools: self.tools.as_ref(),
            program: &self.options.dmidecode,
        };
        let cpuid = CpuidTier {
            tools: self.tools.as_ref(),
            program: &self.options.cpuid,
        };

        let mut tiers: Vec<&dyn IdentityTier> = Vec::new();
        if self.options.use_system_tools {
            if self.options.running_as_root {
                tiers.push(&dmidecode);
            } else {
                log::debug!("not root, skipping {}", self.options.dmidecode);
            }
            tiers.push(&cpuid);
        }

        identity.resolve_id(&tiers);
        identity
    }

    fn disks(&self) -> Vec<DiskRecord> {
        enumerate_disks(self.reader.as_ref(), &self.options.skip_prefixes)
    }

    fn poll_disk_counters(&self) -> DiskPoll {
        poll_disk_counters(self.reader.as_ref(), &self.options.skip_prefixes)
    }
}
