//! Platform-independent counter accounting

pub mod disk;
pub mod identity;
pub mod partition;
pub mod ticks;
