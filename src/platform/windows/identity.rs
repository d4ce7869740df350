//! Windows processor identity
//!
//! The `Win32_Processor.ProcessorId` WMI property is authoritative. Without
//! it the ID is synthesized from the registry identifier string and the
//! processor features the OS reports.

use super::cache::WmiCache;
use crate::core::identity::{parse_windows_identifier, IdentityTier, ProcessorIdSource, ProcessorIdentity};
use serde::Deserialize;
use std::collections::BTreeSet;
use windows::Win32::System::Threading::{
    IsProcessorFeaturePresent, PF_COMPARE_EXCHANGE_DOUBLE, PF_FLOATING_POINT_EMULATED,
    PF_MMX_INSTRUCTIONS_AVAILABLE, PF_PAE_ENABLED, PF_RDTSC_INSTRUCTION_AVAILABLE,
    PF_SSE3_INSTRUCTIONS_AVAILABLE, PF_XMMI64_INSTRUCTIONS_AVAILABLE, PF_XMMI_INSTRUCTIONS_AVAILABLE,
};
use winreg::enums::HKEY_LOCAL_MACHINE;
use winreg::RegKey;

const CENTRAL_PROCESSOR_KEY: &str = "HARDWARE\\DESCRIPTION\\System\\CentralProcessor\\0";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Win32Processor {
    processor_id: Option<String>,
}

/// Processor ID from `Win32_Processor`
pub struct WmiProcessorTier<'a> {
    pub wmi: &'a WmiCache,
}

impl IdentityTier for WmiProcessorTier<'_> {
    fn name(&self) -> &'static str {
        "Win32_Processor"
    }

    fn source(&self) -> ProcessorIdSource {
        ProcessorIdSource::Authoritative
    }

    fn processor_id(&self) -> Option<String> {
        let rows: Vec<Win32Processor> = self.wmi.query("SELECT ProcessorId FROM Win32_Processor")?;
        rows.into_iter()
            .next()?
            .processor_id
            .map(|id| id.trim().to_ascii_uppercase())
            .filter(|id| !id.is_empty())
    }
}

/// Feature flags the OS can report, named as in the CPUID flag table
pub fn feature_flags() -> BTreeSet<String> {
    let present = |feature| unsafe { IsProcessorFeaturePresent(feature) }.as_bool();

    let mut flags = BTreeSet::new();
    if !present(PF_FLOATING_POINT_EMULATED) {
        flags.insert("fpu".to_string());
    }
    let table = [
        (PF_RDTSC_INSTRUCTION_AVAILABLE, "tsc"),
        (PF_PAE_ENABLED, "pae"),
        (PF_COMPARE_EXCHANGE_DOUBLE, "cx8"),
        (PF_MMX_INSTRUCTIONS_AVAILABLE, "mmx"),
        (PF_XMMI_INSTRUCTIONS_AVAILABLE, "sse"),
        (PF_XMMI64_INSTRUCTIONS_AVAILABLE, "sse2"),
        (PF_SSE3_INSTRUCTIONS_AVAILABLE, "sse3"),
    ];
    for (feature, name) in table {
        if present(feature) {
            flags.insert(name.to_string());
        }
    }
    flags
}

/// Identity fields from the registry, ID not yet resolved
pub fn read_registry_identity() -> ProcessorIdentity {
    let mut identity = ProcessorIdentity {
        feature_flags: feature_flags(),
        ..Default::default()
    };

    let key = match RegKey::predef(HKEY_LOCAL_MACHINE).open_subkey(CENTRAL_PROCESSOR_KEY) {
        Ok(key) => key,
        Err(e) => {
            log::warn!("failed to open {}: {}", CENTRAL_PROCESSOR_KEY, e);
            return identity;
        }
    };

    let value = |name: &str| key.get_value::<String, _>(name).map(|v| v.trim().to_string()).ok();
    identity.vendor = value("VendorIdentifier").unwrap_or_default();
    identity.name = value("ProcessorNameString").unwrap_or_default();
    if let Some(identifier) = value("Identifier") {
        let (family, model, stepping) = parse_windows_identifier(&identifier);
        identity.family = family;
        identity.model = model;
        identity.stepping = stepping;
    }
    identity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wmi_tier_without_connection() {
        let wmi = WmiCache::closed();
        let tier = WmiProcessorTier { wmi: &wmi };
        assert_eq!(tier.processor_id(), None);
        assert_eq!(tier.source(), ProcessorIdSource::Authoritative);
    }

    #[test]
    fn test_registry_identity_synthesizes() {
        let wmi = WmiCache::closed();
        let mut identity = read_registry_identity();
        identity.resolve_id(&[&WmiProcessorTier { wmi: &wmi }]);
        assert_eq!(identity.processor_id_source, ProcessorIdSource::Synthesized);
        assert_eq!(identity.processor_id_hex.len(), 16);
    }
}
