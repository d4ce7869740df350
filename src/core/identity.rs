//! Processor identity
//!
//! A processor ID is looked up through a list of [`IdentityTier`]s in
//! priority order (privileged tool output first). When every tier fails, an
//! ID is synthesized from stepping, model, family and the CPUID leaf 1 EDX
//! feature flags using the same bit layout CPUID itself reports:
//!
//! | bits  | field                            |
//! |-------|----------------------------------|
//! | 3:0   | stepping                         |
//! | 7:4   | model, low nibble                |
//! | 11:8  | family, low nibble               |
//! | 13:12 | processor type (always 0)        |
//! | 19:16 | model, high nibble               |
//! | 27:20 | family, high bits                |
//! | 63:32 | one bit per EDX feature flag     |

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// CPUID leaf 1 EDX feature flags, indexed by bit position. Empty entries are reserved.
const EDX_FLAGS: [&str; 32] = [
    "fpu", "vme", "de", "pse", "tsc", "msr", "pae", "mce", "cx8", "apic", "", "sep", "mtrr",
    "pge", "mca", "cmov", "pat", "pse36", "psn", "clfsh", "", "ds", "acpi", "mmx", "fxsr", "sse",
    "sse2", "ss", "htt", "tm", "ia64", "pbe",
];

/// Bit position of a named feature flag in the synthesized ID
fn flag_bit(flag: &str) -> Option<u32> {
    let canonical = match flag {
        "pse-36" => "pse36",
        "clflush" => "clfsh",
        "dts" => "ds",
        "ht" => "htt",
        other => other,
    };
    if canonical.is_empty() {
        return None;
    }
    EDX_FLAGS
        .iter()
        .position(|f| *f == canonical)
        .map(|pos| 32 + pos as u32)
}

/// Synthesize a 16-digit uppercase hex processor ID
///
/// Unrecognized flag names are ignored.
pub fn synthesize_processor_id<S: AsRef<str>>(
    stepping: u32,
    model: u32,
    family: u32,
    flags: &[S],
) -> String {
    let mut id: u64 = u64::from(stepping & 0xf);
    id |= u64::from(model & 0x0f) << 4;
    id |= u64::from((model >> 4) & 0x0f) << 16;
    id |= u64::from(family & 0x0f) << 8;
    id |= u64::from((family >> 4) & 0xff) << 20;

    for flag in flags {
        if let Some(bit) = flag_bit(&flag.as_ref().to_ascii_lowercase()) {
            id |= 1u64 << bit;
        }
    }

    format!("{:016X}", id)
}

/// Where a processor ID came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProcessorIdSource {
    /// Privileged firmware/system query (dmidecode, WMI ProcessorId)
    Authoritative,
    /// Raw CPUID register dump from a system tool
    RegisterDump,
    /// Derived from stepping, model, family and feature flags
    #[default]
    Synthesized,
}

/// Processor identity fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorIdentity {
    /// Vendor string (e.g., "GenuineIntel")
    pub vendor: String,
    /// Marketing name
    pub name: String,
    pub family: u32,
    pub model: u32,
    pub stepping: u32,
    /// Feature flags as reported by the platform
    pub feature_flags: BTreeSet<String>,
    /// 16 hex digit processor ID
    pub processor_id_hex: String,
    /// Which tier produced `processor_id_hex`
    pub processor_id_source: ProcessorIdSource,
}

impl ProcessorIdentity {
    /// ID synthesized from this identity's own fields
    pub fn synthesized_id(&self) -> String {
        let flags: Vec<&str> = self.feature_flags.iter().map(String::as_str).collect();
        synthesize_processor_id(self.stepping, self.model, self.family, &flags)
    }

    /// Fill `processor_id_hex` from the first tier that answers, else synthesize it
    pub fn resolve_id(&mut self, tiers: &[&dyn IdentityTier]) {
        let (id, source) = resolve_processor_id(tiers, || self.synthesized_id());
        self.processor_id_hex = id;
        self.processor_id_source = source;
    }
}

/// One source of an authoritative or semi-authoritative processor ID
pub trait IdentityTier {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Provenance of IDs returned by this tier
    fn source(&self) -> ProcessorIdSource;

    /// Query the processor ID; `None` if the tier has no answer
    fn processor_id(&self) -> Option<String>;
}

/// Try `tiers` in order and fall back to `synthesize` if none answers
///
/// Later tiers are not consulted once one returns a non-empty ID.
pub fn resolve_processor_id<F>(
    tiers: &[&dyn IdentityTier],
    synthesize: F,
) -> (String, ProcessorIdSource)
where
    F: FnOnce() -> String,
{
    for tier in tiers {
        match tier.processor_id() {
            Some(id) if !id.trim().is_empty() => {
                log::debug!("processor id from {}", tier.name());
                return (id.trim().to_string(), tier.source());
            }
            _ => log::debug!("processor id tier {} had no answer", tier.name()),
        }
    }
    (synthesize(), ProcessorIdSource::Synthesized)
}

/// Parse `dmidecode -t 4` output into a processor ID
///
/// dmidecode prints the ID bytes in little-endian order
/// (`ID: EA 06 09 00 FF FB EB BF`); they are reversed so the result reads
/// EDX then EAX, matching [`parse_cpuid_dump`]. Only `ID:` lines inside a
/// `Processor Information` section are considered.
pub fn parse_dmidecode_id<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    let mut in_processor_section = false;
    for line in lines {
        let line = line.as_ref().trim();
        if line.starts_with("Handle ") {
            in_processor_section = false;
            continue;
        }
        if line == "Processor Information" {
            in_processor_section = true;
            continue;
        }
        if !in_processor_section {
            continue;
        }
        let Some(rest) = line.strip_prefix("ID:") else {
            continue;
        };
        let bytes: Vec<&str> = rest.split_whitespace().collect();
        if bytes.is_empty()
            || !bytes
                .iter()
                .all(|b| b.len() == 2 && b.chars().all(|c| c.is_ascii_hexdigit()))
        {
            continue;
        }
        let id: String = bytes.iter().rev().map(|b| b.to_ascii_uppercase()).collect();
        return Some(id);
    }
    None
}

/// Parse a `cpuid -1r` register dump into a processor ID (EDX then EAX of leaf 1)
pub fn parse_cpuid_dump<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    for line in lines {
        let line = line.as_ref().trim();
        let Some(rest) = line.strip_prefix("0x00000001 0x00:") else {
            continue;
        };
        let mut eax = None;
        let mut edx = None;
        for reg in rest.split_whitespace() {
            if let Some((name, value)) = reg.split_once('=') {
                let parsed = u32::from_str_radix(value.trim_start_matches("0x"), 16).ok();
                match name {
                    "eax" => eax = parsed,
                    "edx" => edx = parsed,
                    _ => {}
                }
            }
        }
        if let (Some(eax), Some(edx)) = (eax, edx) {
            return Some(format!("{:08X}{:08X}", edx, eax));
        }
    }
    None
}

/// Parse the first processor block of `/proc/cpuinfo`
///
/// Missing numeric fields default to 0. The ID fields are left empty.
pub fn parse_cpuinfo<S: AsRef<str>>(lines: &[S]) -> ProcessorIdentity {
    let mut identity = ProcessorIdentity::default();
    let mut seen_processor = false;

    for line in lines {
        let line = line.as_ref();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "processor" => {
                if seen_processor {
                    break;
                }
                seen_processor = true;
            }
            "vendor_id" | "CPU implementer" if identity.vendor.is_empty() => {
                identity.vendor = value.to_string()
            }
            "model name" | "Processor" if identity.name.is_empty() => {
                identity.name = value.to_string()
            }
            "cpu family" => identity.family = value.parse().unwrap_or(0),
            "model" => identity.model = value.parse().unwrap_or(0),
            "stepping" => identity.stepping = value.parse().unwrap_or(0),
            "flags" | "Features" => {
                identity.feature_flags = value.split_whitespace().map(str::to_string).collect()
            }
            _ => {}
        }
    }

    identity
}

/// Parse a Windows processor identifier ("Intel64 Family 6 Model 158 Stepping 10")
///
/// Returns (family, model, stepping); absent fields are 0.
pub fn parse_windows_identifier(identifier: &str) -> (u32, u32, u32) {
    let mut family = 0;
    let mut model = 0;
    let mut stepping = 0;
    let mut words = identifier.split_whitespace();
    while let Some(word) = words.next() {
        let target = match word {
            "Family" => &mut family,
            "Model" => &mut model,
            "Stepping" => &mut stepping,
            _ => continue,
        };
        *target = words.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    }
    (family, model, stepping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn id_bits(hex: &str) -> u64 {
        u64::from_str_radix(hex, 16).unwrap()
    }

    #[test]
    fn test_reference_layout() {
        let id = synthesize_processor_id(5, 0x1A, 0x06, &["fpu", "sse2"]);
        assert_eq!(id.len(), 16);
        let bits = id_bits(&id);
        assert_eq!(bits & 0xf, 0x5);
        assert_eq!((bits >> 4) & 0xf, 0xA);
        assert_eq!((bits >> 16) & 0xf, 0x1);
        assert_eq!((bits >> 8) & 0xf, 0x6);
        assert_eq!((bits >> 20) & 0xff, 0x0);
        assert_eq!((bits >> 12) & 0x3, 0);
        assert_eq!(bits >> 32, (1 << 0) | (1 << 26));
        assert_eq!(id, "04000001000106A5");
    }

    #[test]
    fn test_deterministic_and_uppercase() {
        let flags = ["fpu", "vme", "mmx", "sse", "sse2", "ht"];
        let a = synthesize_processor_id(10, 158, 6, &flags);
        let b = synthesize_processor_id(10, 158, 6, &flags);
        assert_eq!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_flag_table_edges_and_aliases() {
        assert_eq!(flag_bit("fpu"), Some(32));
        assert_eq!(flag_bit("vme"), Some(33));
        assert_eq!(flag_bit("de"), Some(34));
        assert_eq!(flag_bit("sse2"), Some(58));
        assert_eq!(flag_bit("pbe"), Some(63));
        assert_eq!(flag_bit("ht"), flag_bit("htt"));
        assert_eq!(flag_bit("clflush"), Some(51));
        assert_eq!(flag_bit("pse-36"), Some(49));
        assert_eq!(flag_bit(""), None);
        assert_eq!(flag_bit("avx512f"), None);
    }

    #[test]
    fn test_unknown_flags_ignored() {
        let plain = synthesize_processor_id(1, 2, 3, &["fpu"]);
        let noisy = synthesize_processor_id(1, 2, 3, &["fpu", "avx2", "bogus", ""]);
        assert_eq!(plain, noisy);
    }

    #[test]
    fn test_extended_family_bits() {
        // AMD Zen: family 0x17 -> low nibble 7, high bits 1
        let bits = id_bits(&synthesize_processor_id(0, 0, 0x17, &[] as &[&str]));
        assert_eq!((bits >> 8) & 0xf, 0x7);
        assert_eq!((bits >> 20) & 0xff, 0x1);
    }

    struct FixedTier {
        answer: Option<&'static str>,
        source: ProcessorIdSource,
        calls: Cell<u32>,
    }

    impl FixedTier {
        fn new(answer: Option<&'static str>, source: ProcessorIdSource) -> Self {
            Self {
                answer,
                source,
                calls: Cell::new(0),
            }
        }
    }

    impl IdentityTier for FixedTier {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn source(&self) -> ProcessorIdSource {
            self.source
        }

        fn processor_id(&self) -> Option<String> {
            self.calls.set(self.calls.get() + 1);
            self.answer.map(str::to_string)
        }
    }

    #[test]
    fn test_first_answering_tier_wins() {
        let first = FixedTier::new(None, ProcessorIdSource::Authoritative);
        let second = FixedTier::new(Some("BFEBFBFF000906EA"), ProcessorIdSource::RegisterDump);
        let third = FixedTier::new(Some("0000000000000000"), ProcessorIdSource::Authoritative);

        let (id, source) =
            resolve_processor_id(&[&first, &second, &third], || panic!("must not synthesize"));
        assert_eq!(id, "BFEBFBFF000906EA");
        assert_eq!(source, ProcessorIdSource::RegisterDump);
        assert_eq!(first.calls.get(), 1);
        assert_eq!(third.calls.get(), 0);
    }

    #[test]
    fn test_fallback_when_all_tiers_fail() {
        let empty = FixedTier::new(Some("   "), ProcessorIdSource::Authoritative);
        let none = FixedTier::new(None, ProcessorIdSource::RegisterDump);
        let (id, source) = resolve_processor_id(&[&empty, &none], || "SYNTH".to_string());
        assert_eq!(id, "SYNTH");
        assert_eq!(source, ProcessorIdSource::Synthesized);
    }

    #[test]
    fn test_parse_dmidecode_id() {
        let output = [
            "Processor Information",
            "\tSocket Designation: U3E1",
            "\tType: Central Processor",
            "\tID: EA 06 09 00 FF FB EB BF",
            "\tSignature: Type 0, Family 6, Model 158, Stepping 10",
        ];
        assert_eq!(
            parse_dmidecode_id(&output).as_deref(),
            Some("BFEBFBFF000906EA")
        );
        assert_eq!(
            parse_dmidecode_id(&["Processor Information", "\tID: Not Specified"]),
            None
        );
        assert_eq!(parse_dmidecode_id::<&str>(&[]), None);
    }

    #[test]
    fn test_dmidecode_id_outside_processor_section_ignored() {
        let output = [
            "Handle 0x0001, DMI type 1, 27 bytes",
            "System Information",
            "\tID: 11 22 33 44 55 66 77 88",
            "Handle 0x0004, DMI type 4, 48 bytes",
            "Processor Information",
            "\tID: A5 06 01 00 FF FB EB BF",
        ];
        assert_eq!(
            parse_dmidecode_id(&output).as_deref(),
            Some("BFEBFBFF000106A5")
        );
        assert_eq!(
            parse_dmidecode_id(&["\tID: A5 06 01 00 FF FB EB BF"]),
            None
        );
    }

    #[test]
    fn test_parse_cpuid_dump() {
        let output = [
            "CPU 0:",
            "   0x00000000 0x00: eax=0x00000016 ebx=0x756e6547 ecx=0x6c65746e edx=0x49656e69",
            "   0x00000001 0x00: eax=0x000906ea ebx=0x00100800 ecx=0x7ffafbbf edx=0xbfebfbff",
        ];
        assert_eq!(parse_cpuid_dump(&output).as_deref(), Some("BFEBFBFF000906EA"));
        assert_eq!(parse_cpuid_dump(&["garbage"]), None);
    }

    #[test]
    fn test_parse_cpuinfo_first_block() {
        let cpuinfo = [
            "processor\t: 0",
            "vendor_id\t: GenuineIntel",
            "cpu family\t: 6",
            "model\t\t: 158",
            "model name\t: Intel(R) Core(TM) i7-8700K CPU @ 3.70GHz",
            "stepping\t: 10",
            "flags\t\t: fpu vme de pse tsc sse sse2 ht",
            "",
            "processor\t: 1",
            "vendor_id\t: SomethingElse",
            "model\t\t: 1",
        ];
        let identity = parse_cpuinfo(&cpuinfo);
        assert_eq!(identity.vendor, "GenuineIntel");
        assert_eq!(identity.family, 6);
        assert_eq!(identity.model, 158);
        assert_eq!(identity.stepping, 10);
        assert!(identity.feature_flags.contains("sse2"));
        assert_eq!(identity.feature_flags.len(), 8);
        assert!(identity.processor_id_hex.is_empty());
    }

    #[test]
    fn test_resolve_id_synthesizes_from_fields() {
        let mut identity = ProcessorIdentity {
            family: 6,
            model: 0x1A,
            stepping: 5,
            feature_flags: ["fpu", "sse2"].iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        identity.resolve_id(&[]);
        assert_eq!(identity.processor_id_hex, "04000001000106A5");
        assert_eq!(identity.processor_id_source, ProcessorIdSource::Synthesized);
    }

    #[test]
    fn test_parse_windows_identifier() {
        assert_eq!(
            parse_windows_identifier("Intel64 Family 6 Model 158 Stepping 10"),
            (6, 158, 10)
        );
        assert_eq!(
            parse_windows_identifier("AMD64 Family 23 Model 113 Stepping 0"),
            (23, 113, 0)
        );
        assert_eq!(parse_windows_identifier("ARMv8 (64-bit) Family 8"), (8, 0, 0));
    }
}
