//! Admission control based on free host memory.
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use sysinfo::System;

use crate::error::{InvalidConfigurationSnafu, Result};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Source of free memory readings.
pub trait MemoryProbe: Send + Sync + 'static {
    /// Memory currently available to new allocations, in megabytes.
    fn free_memory_mb(&self) -> f64;
}

/// Reads available memory from the host.
#[derive(Debug)]
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

/// A probe returning a configurable reading.
#[derive(Debug, Default)]
pub struct FixedMemoryProbe {
    free_mb: AtomicU64,
}

/// Decides whether the host has capacity for another payload.
///
/// The probe is queried on every decision.
#[derive(Clone)]
pub struct MemoryGate {
    threshold_mb: u64,
    probe: Arc<dyn MemoryProbe>,
}

impl MemoryGate {
    /// Create a gate admitting payloads while free memory exceeds `threshold_mb`.
    pub fn new(threshold_mb: u64, probe: Arc<dyn MemoryProbe>) -> Result<Self> {
        if threshold_mb == 0 {
            return InvalidConfigurationSnafu {
                message: "memory threshold must be a positive number",
            }
            .fail();
        }

        Ok(Self {
            threshold_mb,
            probe,
        })
    }

    /// Create a gate reading the host's available memory.
    pub fn system(threshold_mb: u64) -> Result<Self> {
        Self::new(threshold_mb, Arc::new(SystemMemoryProbe::new()))
    }

    pub fn threshold_mb(&self) -> u64 {
        self.threshold_mb
    }

    pub fn free_memory_mb(&self) -> f64 {
        self.probe.free_memory_mb()
    }

    /// Returns true if free memory is strictly above the threshold.
    pub fn is_capacity_sufficient(&self) -> bool {
        self.free_memory_mb() > self.threshold_mb as f64
    }
}

impl std::fmt::Debug for MemoryGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGate")
            .field("threshold_mb", &self.threshold_mb)
            .finish()
    }
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn free_memory_mb(&self) -> f64 {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        system.available_memory() as f64 / BYTES_PER_MB
    }
}

impl FixedMemoryProbe {
    pub fn new(free_mb: u64) -> Self {
        Self {
            free_mb: AtomicU64::new(free_mb),
        }
    }

    /// Change the reading returned by the probe.
    pub fn set_free_memory_mb(&self, free_mb: u64) {
        self.free_mb.store(free_mb, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn free_memory_mb(&self) -> f64 {
        self.free_mb.load(Ordering::Relaxed) as f64
    }
}
