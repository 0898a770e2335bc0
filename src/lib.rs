//! GPU Image Generation Service
//!
//! An HTTP service that turns text prompts into base64-encoded PNG images.
//! Inference is delegated to a pipeline that is constructed once per process,
//! on first use, and bound to an accelerator when one is present.

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod generation;
pub mod middleware;
pub mod pipeline;
pub mod response;

pub use error::{AppError, Result};

use std::sync::Arc;
use std::time::Duration;

use device::{CachedProbe, DevicePreference, DeviceProbe};
use generation::ImageGenerator;
use pipeline::{PipelineCell, PipelineLoader};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub pipeline: Arc<PipelineCell>,
    pub generator: ImageGenerator,
    /// Accelerator readings for health reports, reused for a short while
    pub probe: Arc<dyn DeviceProbe>,
}

impl AppState {
    /// Wire up the state. Nothing is loaded until the first generation.
    pub fn new(
        settings: config::Settings,
        loader: Arc<dyn PipelineLoader>,
        probe: Arc<dyn DeviceProbe>,
    ) -> Result<Self> {
        let preference = DevicePreference::parse(&settings.model.device)?;
        let pipeline = Arc::new(PipelineCell::new(loader, probe.clone(), preference));
        let generator = ImageGenerator::new(pipeline.clone(), settings.generation.clone());
        let probe: Arc<dyn DeviceProbe> = Arc::new(CachedProbe::new(
            probe,
            Duration::from_millis(settings.model.device_info_ttl_ms),
        ));

        Ok(Self {
            settings: Arc::new(settings),
            pipeline,
            generator,
            probe,
        })
    }
}
