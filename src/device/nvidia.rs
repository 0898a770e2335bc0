//! Accelerator probe backed by `nvidia-smi`

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{AcceleratorInfo, DeviceProbe};

/// Older drivers reject `memory.reserved`, so the narrower query is tried second.
const QUERIES: [&str; 2] = [
    "name,memory.total,memory.used,memory.reserved",
    "name,memory.total,memory.used",
];

/// Queries the first NVIDIA GPU through the `nvidia-smi` command line tool
pub struct NvidiaSmiProbe {
    binary: String,
    timeout: Duration,
}

impl NvidiaSmiProbe {
    pub fn new() -> Self {
        Self::with_binary("nvidia-smi")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: Duration::from_secs(5),
        }
    }

    async fn query(&self, fields: &str) -> Option<String> {
        let mut command = Command::new(&self.binary);
        command
            .arg(format!("--query-gpu={}", fields))
            .arg("--format=csv,noheader,nounits")
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(binary = %self.binary, error = %e, "GPU probe could not run");
                return None;
            }
            Err(_) => {
                debug!(binary = %self.binary, "GPU probe timed out");
                return None;
            }
        };

        if !output.status.success() {
            debug!(
                binary = %self.binary,
                status = %output.status,
                fields = fields,
                "GPU probe returned failure"
            );
            return None;
        }

        String::from_utf8(output.stdout).ok()
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceProbe for NvidiaSmiProbe {
    async fn probe(&self) -> Option<AcceleratorInfo> {
        for fields in QUERIES {
            if let Some(stdout) = self.query(fields).await {
                return parse_query_output(&stdout);
            }
        }
        None
    }
}

/// Parse the first line of `nvidia-smi --query-gpu=... --format=csv,noheader,nounits`.
///
/// Memory columns are MiB; missing or `[N/A]` columns read as zero.
pub fn parse_query_output(stdout: &str) -> Option<AcceleratorInfo> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut columns = line.split(',').map(str::trim);

    let name = columns.next().filter(|n| !n.is_empty())?.to_string();
    let mut next_gb = || columns.next().map(mib_to_gb).unwrap_or(0.0);

    let memory_total_gb = next_gb();
    let memory_allocated_gb = next_gb();
    let memory_reserved_gb = next_gb();

    Some(AcceleratorInfo {
        name,
        memory_total_gb,
        memory_allocated_gb,
        memory_reserved_gb,
    })
}

fn mib_to_gb(raw: &str) -> f64 {
    let mib = raw.parse::<f64>().unwrap_or(0.0);
    ((mib / 1024.0) * 100.0).round() / 100.0
}
