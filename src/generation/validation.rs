//! Request validation

use serde::Deserialize;

use crate::config::GenerationConfig;
use crate::error::{AppError, Result};
use crate::pipeline::GenerationRequest;

/// Generation parameters as they arrive over the wire.
///
/// Numeric fields are signed so that negative input reaches validation
/// instead of failing deserialization with an opaque message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateParams {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub num_steps: Option<i64>,
    #[serde(default)]
    pub guidance_scale: Option<f64>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
}

impl GenerateParams {
    /// Fill in defaults and check every field against `limits`
    pub fn validate(self, limits: &GenerationConfig) -> Result<GenerationRequest> {
        let prompt = match self.prompt {
            Some(prompt) if !prompt.trim().is_empty() => prompt,
            _ => {
                return Err(AppError::InvalidArgument(
                    "A non-empty 'prompt' is required".to_string(),
                ))
            }
        };

        let num_steps = match self.num_steps {
            None => limits.default_steps,
            Some(steps) if steps <= 0 => {
                return Err(AppError::InvalidArgument(format!(
                    "'num_steps' must be a positive integer, got {}",
                    steps
                )))
            }
            Some(steps) if steps > i64::from(limits.max_steps) => {
                return Err(AppError::InvalidArgument(format!(
                    "'num_steps' must not exceed {}, got {}",
                    limits.max_steps, steps
                )))
            }
            Some(steps) => steps as u32,
        };

        let guidance_scale = match self.guidance_scale {
            None => limits.default_guidance_scale,
            Some(scale) if scale.is_finite() && scale > 0.0 => scale,
            Some(scale) => {
                return Err(AppError::InvalidArgument(format!(
                    "'guidance_scale' must be a positive number, got {}",
                    scale
                )))
            }
        };

        let width = validate_dimension("width", self.width, limits.default_width, limits)?;
        let height = validate_dimension("height", self.height, limits.default_height, limits)?;

        Ok(GenerationRequest {
            prompt,
            negative_prompt: self.negative_prompt.unwrap_or_default(),
            num_steps,
            guidance_scale,
            width,
            height,
        })
    }
}

fn validate_dimension(
    name: &str,
    value: Option<i64>,
    default: u32,
    limits: &GenerationConfig,
) -> Result<u32> {
    let value = match value {
        None => return Ok(default),
        Some(v) => v,
    };

    if value <= 0 {
        return Err(AppError::InvalidArgument(format!(
            "'{}' must be a positive integer, got {}",
            name, value
        )));
    }
    if value > i64::from(limits.max_dimension) {
        return Err(AppError::InvalidArgument(format!(
            "'{}' must not exceed {}, got {}",
            name, limits.max_dimension, value
        )));
    }
    if value % i64::from(limits.alignment) != 0 {
        return Err(AppError::InvalidArgument(format!(
            "'{}' must be a multiple of {}, got {}",
            name, limits.alignment, value
        )));
    }

    Ok(value as u32)
}
