//! Wire types for the HTTP API

use serde::{Deserialize, Serialize};

use crate::device::AcceleratorInfo;
use crate::generation::GenerationResult;

/// Successful generation
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub prompt: String,
    /// Base64 encoded image
    pub image: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
}

impl From<GenerationResult> for GenerateResponse {
    fn from(result: GenerationResult) -> Self {
        Self {
            success: true,
            prompt: result.prompt,
            image: result.image.data,
            format: result.image.format.to_string(),
            width: result.image.width,
            height: result.image.height,
        }
    }
}

/// Health report
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" after a failed model load
    pub status: &'static str,
    pub gpu_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_info: Option<AcceleratorInfo>,
    pub model_loaded: bool,
}
