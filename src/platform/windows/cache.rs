// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! Owned WMI connection cache
//!
//! Opening a COM/WMI connection costs tens of milliseconds, so
//! [`WindowsProbe`](super::WindowsProbe) opens one [`WmiCache`] and reuses
//! it for every query until [`WmiCache::close`] (or drop). The cache is not
//! `Sync`; use one probe per thread.

use crate::error::{Error, Result, SourceError};
use crate::source::{PerfCounterSource, RawCounterValue};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use wmi::{COMLibrary, Variant, WMIConnection};

const CIMV2: &str = "root\\CIMV2";

/// Create WMI connection with robust COM initialization
/// Handles cases where COM is already initialized by the host application
fn create_wmi_connection() -> Result<WMIConnection> {
    // Strategy 1: Fresh COM initialization (works best in background threads)
    if let Ok(com) = COMLibrary::new() {
        if let Ok(conn) = WMIConnection::with_namespace_path(CIMV2, com) {
            return Ok(conn);
        }
    }

    // Strategy 2: COM without security init
    if let Ok(com) = COMLibrary::without_security() {
        if let Ok(conn) = WMIConnection::with_namespace_path(CIMV2, com) {
            return Ok(conn);
        }
    }

    // Strategy 3: Assume COM is already initialized by the runtime (e.g., GUI apps)
    let com = unsafe { COMLibrary::assume_initialized() };
    WMIConnection::with_namespace_path(CIMV2, com)
        .map_err(|e| Error::InitializationError(e.to_string()))
}

/// Explicitly owned WMI connection
pub struct WmiCache {
    conn: Option<WMIConnection>,
}

impl WmiCache {
    /// Open the connection
    pub fn open() -> Result<Self> {
        Ok(Self {
            conn: Some(create_wmi_connection()?),
        })
    }

    /// A cache with no connection; every query returns no data
    pub fn closed() -> Self {
        Self { conn: None }
    }

    /// True while the connection is held
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Release the connection
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            log::debug!("WMI connection closed");
        }
    }

    /// Run a WQL query; failures and a closed cache both yield `None`
    pub fn query<T: DeserializeOwned>(&self, wql: &str) -> Option<Vec<T>> {
        let conn = self.conn.as_ref()?;
        match conn.raw_query(wql) {
            Ok(rows) => Some(rows),
            Err(e) => {
                log::debug!("WMI query failed ({}): {}", wql, e);
                None
            }
        }
    }
}

impl Drop for WmiCache {
    fn drop(&mut self) {
        self.close();
    }
}

/// A raw counter path of the form `Class(Instance)\Property`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterPath<'a> {
    pub class: &'a str,
    pub instance: &'a str,
    pub property: &'a str,
}

/// Split `Win32_PerfRawData_PerfOS_Processor(_Total)\PercentDPCTime`
pub fn parse_counter_path(path: &str) -> Option<CounterPath<'_>> {
    let (object, property) = path.rsplit_once('\\')?;
    let (class, rest) = object.split_once('(')?;
    let instance = rest.strip_suffix(')')?;
    let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid(class) || !valid(property) || instance.is_empty() || instance.contains('\'') {
        return None;
    }
    Some(CounterPath {
        class,
        instance,
        property,
    })
}

/// Interpret a WMI value as an unsigned raw counter
pub fn variant_u64(value: &Variant) -> Option<u64> {
    match value {
        Variant::UI8(v) => Some(*v),
        Variant::UI4(v) => Some(u64::from(*v)),
        Variant::UI2(v) => Some(u64::from(*v)),
        Variant::UI1(v) => Some(u64::from(*v)),
        Variant::I8(v) => u64::try_from(*v).ok(),
        Variant::I4(v) => u64::try_from(*v).ok(),
        Variant::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl PerfCounterSource for WmiCache {
    fn query(&self, counter_path: &str) -> std::result::Result<RawCounterValue, SourceError> {
        let path = parse_counter_path(counter_path)
            .ok_or_else(|| SourceError::CounterUnavailable(counter_path.to_string()))?;
        let wql = format!(
            "SELECT {}, Timestamp_Sys100NS FROM {} WHERE Name = '{}'",
            path.property, path.class, path.instance
        );

        let rows: Vec<HashMap<String, Variant>> = WmiCache::query(self, &wql)
            .ok_or_else(|| SourceError::CounterUnavailable(counter_path.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| SourceError::NotFound(counter_path.to_string()))?;

        let value = row
            .get(path.property)
            .and_then(variant_u64)
            .ok_or_else(|| SourceError::CounterUnavailable(counter_path.to_string()))?;
        let timestamp_100ns = row
            .get("Timestamp_Sys100NS")
            .and_then(variant_u64)
            .unwrap_or(0);

        Ok(RawCounterValue {
            value,
            timestamp_100ns,
        })
    }
}
