//! Lazily constructed, process-wide pipeline

use image::DynamicImage;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::device::{select_device, DevicePreference, DeviceProbe};
use crate::error::{AppError, Result};
use crate::pipeline::{GenerationRequest, Pipeline, PipelineLoader};

/// Holds the single pipeline instance of this process.
///
/// Construction happens on first use. Concurrent first callers wait on the
/// same construction; a failed construction leaves the cell empty so the next
/// caller tries again. Construction runs on its own task, so a caller that
/// goes away mid-load does not abort it.
pub struct PipelineCell {
    shared: Arc<Shared>,
    /// Serializes inference for pipelines that are not reentrant
    inference_lock: Mutex<()>,
}

/// State the construction task needs to outlive its caller
struct Shared {
    loader: Arc<dyn PipelineLoader>,
    probe: Arc<dyn DeviceProbe>,
    preference: DevicePreference,
    pipeline: OnceCell<Arc<dyn Pipeline>>,
    last_error: RwLock<Option<String>>,
}

impl PipelineCell {
    pub fn new(
        loader: Arc<dyn PipelineLoader>,
        probe: Arc<dyn DeviceProbe>,
        preference: DevicePreference,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                loader,
                probe,
                preference,
                pipeline: OnceCell::new(),
                last_error: RwLock::new(None),
            }),
            inference_lock: Mutex::new(()),
        }
    }

    /// Whether the pipeline has been constructed
    pub fn is_loaded(&self) -> bool {
        self.shared.pipeline.initialized()
    }

    /// Error from the most recent failed construction, cleared on success
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.read().clone()
    }

    /// Get the pipeline, constructing it if this is the first call
    pub async fn get_or_load(&self) -> Result<Arc<dyn Pipeline>> {
        if let Some(pipeline) = self.shared.pipeline.get() {
            return Ok(pipeline.clone());
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared
                .pipeline
                .get_or_try_init(|| shared.construct())
                .await
                .map(Arc::clone)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Pipeline construction task failed: {}", e)))?
    }

    /// Run one inference call through the shared pipeline
    pub async fn generate(&self, request: &GenerationRequest) -> Result<DynamicImage> {
        let pipeline = self.get_or_load().await?;

        if pipeline.is_reentrant() {
            return pipeline.generate(request).await;
        }

        let _guard = self.inference_lock.lock().await;
        pipeline.generate(request).await
    }
}

impl Shared {
    async fn construct(&self) -> Result<Arc<dyn Pipeline>> {
        let (device, accelerator) = select_device(self.preference, self.probe.as_ref()).await;

        info!(
            model = %self.loader.model_id(),
            device = %device,
            "Loading inference pipeline"
        );
        if let Some(gpu) = accelerator.filter(|_| device.is_accelerator()) {
            info!(
                gpu = %gpu.name,
                memory_total_gb = gpu.memory_total_gb,
                "Binding to accelerator"
            );
        }

        let started = Instant::now();
        match self.loader.load(device).await {
            Ok(pipeline) => {
                *self.last_error.write() = None;
                info!(
                    model = %pipeline.model_id(),
                    device = %pipeline.device(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Inference pipeline loaded"
                );
                Ok(pipeline)
            }
            Err(e) => {
                warn!(
                    model = %self.loader.model_id(),
                    device = %device,
                    error = %e,
                    "Inference pipeline failed to load"
                );
                *self.last_error.write() = Some(e.to_string());
                Err(match e {
                    AppError::ServiceUnavailable(_) => e,
                    other => AppError::ServiceUnavailable(format!(
                        "Failed to load model '{}': {}",
                        self.loader.model_id(),
                        other
                    )),
                })
            }
        }
    }
}
