//! Image generation operation

pub mod validation;

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::error::{AppError, Result};
use crate::pipeline::PipelineCell;
use crate::response::{encode_image, EncodedImage};

pub use validation::GenerateParams;

/// Outcome of a successful generation
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The prompt as it was sent to the pipeline
    pub prompt: String,
    pub image: EncodedImage,
}

/// Validates requests and runs them through the shared pipeline
pub struct ImageGenerator {
    pipeline: Arc<PipelineCell>,
    limits: GenerationConfig,
}

impl ImageGenerator {
    pub fn new(pipeline: Arc<PipelineCell>, limits: GenerationConfig) -> Self {
        Self { pipeline, limits }
    }

    /// Validate `params`, run inference and encode the image.
    ///
    /// The first call in a process also constructs the pipeline.
    pub async fn generate(&self, params: GenerateParams) -> Result<GenerationResult> {
        let request = params.validate(&self.limits)?;

        let preview: String = request.prompt.chars().take(100).collect();
        info!(
            prompt = %preview,
            steps = request.num_steps,
            width = request.width,
            height = request.height,
            "Generating image"
        );

        let image = self.pipeline.generate(&request).await?;

        if (image.width(), image.height()) != (request.width, request.height) {
            return Err(AppError::Internal(format!(
                "Pipeline returned a {}x{} image for a {}x{} request",
                image.width(),
                image.height(),
                request.width,
                request.height
            )));
        }

        let encoded = tokio::task::spawn_blocking(move || encode_image(&image))
            .await
            .map_err(|e| AppError::Internal(format!("Image encoding task failed: {}", e)))??;

        debug!(bytes = encoded.data.len(), "Image encoded");

        Ok(GenerationResult {
            prompt: request.prompt,
            image: encoded,
        })
    }
}
