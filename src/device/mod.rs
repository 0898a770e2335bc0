//! Accelerator detection and device selection

pub mod cached;
pub mod nvidia;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::error::{AppError, Result};

pub use cached::CachedProbe;
pub use nvidia::NvidiaSmiProbe;

/// Compute device a pipeline is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda(usize),
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }

    /// Tensor precision the runtime should load weights in
    pub fn dtype(&self) -> &'static str {
        match self {
            Device::Cpu => "float32",
            Device::Cuda(_) => "float16",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

/// Configured device preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    /// Use the first accelerator if one is detected, otherwise the CPU
    Auto,
    Cpu,
    Cuda,
}

impl DevicePreference {
    /// Accepted spellings, exactly as they must appear in configuration
    pub const VALUES: [&'static str; 3] = ["auto", "cpu", "cuda"];

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            other => Err(AppError::Config(config::ConfigError::Message(format!(
                "Invalid device '{}'. Must be 'auto', 'cpu' or 'cuda'",
                other
            )))),
        }
    }
}

/// Snapshot of an accelerator's identity and memory usage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceleratorInfo {
    pub name: String,
    pub memory_total_gb: f64,
    pub memory_allocated_gb: f64,
    pub memory_reserved_gb: f64,
}

/// Detects accelerator hardware
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    /// First accelerator found, or `None`. Never fails.
    async fn probe(&self) -> Option<AcceleratorInfo>;
}

/// Probe that always reports a CPU-only host
pub struct CpuOnlyProbe;

#[async_trait]
impl DeviceProbe for CpuOnlyProbe {
    async fn probe(&self) -> Option<AcceleratorInfo> {
        None
    }
}

/// Resolve the device a new pipeline should bind to.
///
/// Also returns the accelerator snapshot read while deciding, so callers do
/// not have to probe again. A forced CPU binding never probes.
pub async fn select_device(
    preference: DevicePreference,
    probe: &dyn DeviceProbe,
) -> (Device, Option<AcceleratorInfo>) {
    match preference {
        DevicePreference::Cpu => (Device::Cpu, None),
        // An explicit request is honored even if the probe sees nothing;
        // the runtime reports the binding failure when it loads.
        DevicePreference::Cuda => (Device::Cuda(0), probe.probe().await),
        DevicePreference::Auto => match probe.probe().await {
            Some(gpu) => (Device::Cuda(0), Some(gpu)),
            None => (Device::Cpu, None),
        },
    }
}
