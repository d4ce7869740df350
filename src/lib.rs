//! # hwtally
//!
//! Hardware counter accounting for Linux and Windows. hwtally reads the raw
//! counters each OS exposes and turns them into plain value objects:
//!
//! - **CPU ticks**: a fixed seven-entry [`TickVector`] (user, nice, system,
//!   idle, iowait, irq, softirq) for the whole system and per logical
//!   processor
//! - **Disk counters**: cumulative reads, writes, bytes, queue length and busy
//!   time per physical disk, refreshed in place from one shared poll
//! - **Processor identity**: vendor, family/model/stepping, feature flags and
//!   a 16 hex digit processor ID from the best available source
//!
//! Raw counters are cumulative since boot. Rates are left to the caller:
//! sample twice and subtract.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hwtally::{detect, track_disks, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let probe = detect(&Config::load()?)?;
//!
//! let ticks = probe.system_ticks();
//! println!("busy {} of {} ticks", ticks.busy(), ticks.total());
//!
//! let identity = probe.processor_identity();
//! println!("{} ({})", identity.name, identity.processor_id_hex);
//!
//! let disks = probe.disks();
//! let mut store = track_disks(&disks);
//! let outcome = probe.refresh_disk_counters(&mut store);
//! for (name, counters) in store.iter() {
//!     println!("{}: {} reads, refreshed: {:?}", name, counters.reads, outcome.refreshed(name));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Pure accounting
//!
//! The accountants need no OS access and can be fed recorded counters:
//!
//! ```
//! use hwtally::{compute_ticks, synthesize_processor_id, TickType};
//!
//! let ticks = compute_ticks(&[100, 0, 50, 9000, 20, 0, 0, 4]);
//! assert_eq!(ticks.get(TickType::System), 54);
//!
//! assert_eq!(synthesize_processor_id(5, 0x1A, 6, &["fpu", "sse2"]), "04000001000106A5");
//! ```
//!
//! ## Platform Support
//!
//! | Feature          | Linux                          | Windows                          |
//! |------------------|--------------------------------|----------------------------------|
//! | CPU ticks        | `/proc/stat`                   | `GetSystemTimes`, WMI raw perf   |
//! | Disk counters    | `/sys/block/*/stat`            | WMI `PerfDisk_PhysicalDisk`      |
//! | Partitions       | sysfs, `/proc/mounts`          | WMI `Win32_DiskPartition`        |
//! | Processor ID     | dmidecode, cpuid, cpuinfo      | WMI `Win32_Processor`, registry  |

pub mod config;
pub mod core;
pub mod error;
pub mod platform;
pub mod source;

pub use error::{Error, Result, SourceError};

// Re-export configuration management
pub use config::{Config, DiskConfig, GeneralConfig, IdentityConfig, PathsConfig};

// Re-export the accountants
pub use core::disk::{
    refresh_disk_counters, DiskCounterSnapshot, DiskCounterStore, DiskPoll, PollOutcome,
    RawDiskCounters,
};
pub use core::identity::{synthesize_processor_id, IdentityTier, ProcessorIdSource, ProcessorIdentity};
pub use core::partition::{DiskRecord, PartitionRecord};
pub use core::ticks::{compute_ticks, TickType, TickVector};

// Re-export platform entry points
pub use platform::{detect, track_disks, HardwareProbe};

// Re-export collaborator seams
pub use source::{CommandRunner, FsReader, PerfCounterSource, TextCounterReader, ToolRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
