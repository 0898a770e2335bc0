//! Short-lived memoization of accelerator readings

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{AcceleratorInfo, DeviceProbe};

/// Reuses the last reading of another probe for `ttl`.
///
/// The lock is held while refreshing, so concurrent callers during a refresh
/// wait for the one reading instead of each spawning their own.
pub struct CachedProbe {
    inner: Arc<dyn DeviceProbe>,
    ttl: Duration,
    last: Mutex<Option<(Instant, Option<AcceleratorInfo>)>>,
}

impl CachedProbe {
    pub fn new(inner: Arc<dyn DeviceProbe>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DeviceProbe for CachedProbe {
    async fn probe(&self) -> Option<AcceleratorInfo> {
        let mut last = self.last.lock().await;
        if let Some((read_at, info)) = last.as_ref() {
            if read_at.elapsed() < self.ttl {
                return info.clone();
            }
        }

        let info = self.inner.probe().await;
        *last = Some((Instant::now(), info.clone()));
        info
    }
}
