//! Inference pipeline capability traits and the process-wide pipeline holder

pub mod cell;
pub mod remote;

use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;

use crate::device::Device;
use crate::error::Result;

pub use cell::PipelineCell;
pub use remote::{RemotePipeline, RemotePipelineLoader};

/// A validated request, ready to hand to a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The prompt to generate an image from
    pub prompt: String,

    /// Things to steer away from; empty means none
    pub negative_prompt: String,

    /// Number of denoising steps
    pub num_steps: u32,

    /// Classifier-free guidance scale
    pub guidance_scale: f64,

    pub width: u32,
    pub height: u32,
}

/// A loaded model bound to a compute device
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Identifier of the loaded weights
    fn model_id(&self) -> &str;

    /// Device the weights live on
    fn device(&self) -> Device;

    /// Whether overlapping `generate` calls are allowed
    fn is_reentrant(&self) -> bool {
        false
    }

    /// Run inference for a single image
    async fn generate(&self, request: &GenerationRequest) -> Result<DynamicImage>;
}

/// Constructs pipelines. Called at most once per successful load.
#[async_trait]
pub trait PipelineLoader: Send + Sync {
    /// Identifier of the weights this loader produces
    fn model_id(&self) -> &str;

    /// Load the weights and bind them to `device`.
    ///
    /// This is the cold-start path and may take minutes.
    async fn load(&self, device: Device) -> Result<Arc<dyn Pipeline>>;
}
