//! Linux processor identity
//!
//! Processor ID tiers: `dmidecode -t 4` (root only), then the `cpuid -1r`
//! register dump, then an ID synthesized from `/proc/cpuinfo`.

use crate::core::identity::{
    parse_cpuid_dump, parse_cpuinfo, parse_dmidecode_id, IdentityTier, ProcessorIdSource,
    ProcessorIdentity,
};
use crate::source::{TextCounterReader, ToolRunner};

const PROC_CPUINFO: &str = "/proc/cpuinfo";

/// Processor ID from the SMBIOS processor record
pub struct DmidecodeTier<'a> {
    pub tools: &'a dyn ToolRunner,
    pub program: &'a str,
}

impl IdentityTier for DmidecodeTier<'_> {
    fn name(&self) -> &'static str {
        "dmidecode"
    }

    fn source(&self) -> ProcessorIdSource {
        ProcessorIdSource::Authoritative
    }

    fn processor_id(&self) -> Option<String> {
        match self.tools.run(self.program, &["-t", "4"]) {
            Ok(lines) => parse_dmidecode_id(&lines),
            Err(e) => {
                log::debug!("{} unavailable: {}", self.program, e);
                None
            }
        }
    }
}

/// Processor ID from the raw CPUID leaf 1 registers
pub struct CpuidTier<'a> {
    pub tools: &'a dyn ToolRunner,
    pub program: &'a str,
}

impl IdentityTier for CpuidTier<'_> {
    fn name(&self) -> &'static str {
        "cpuid"
    }

    fn source(&self) -> ProcessorIdSource {
        ProcessorIdSource::RegisterDump
    }

    fn processor_id(&self) -> Option<String> {
        match self.tools.run(self.program, &["-1r"]) {
            Ok(lines) => parse_cpuid_dump(&lines),
            Err(e) => {
                log::debug!("{} unavailable: {}", self.program, e);
                None
            }
        }
    }
}

/// Identity fields from `/proc/cpuinfo`, ID not yet resolved
pub fn read_cpuinfo(reader: &dyn TextCounterReader) -> ProcessorIdentity {
    match reader.read_lines(PROC_CPUINFO) {
        Ok(lines) => parse_cpuinfo(&lines),
        Err(e) if e.is_expected() => {
            log::debug!("{} unavailable: {}", PROC_CPUINFO, e);
            ProcessorIdentity::default()
        }
        Err(e) => {
            log::warn!("failed to read {}: {}", PROC_CPUINFO, e);
            ProcessorIdentity::default()
        }
    }
}
