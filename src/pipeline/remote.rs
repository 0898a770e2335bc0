//! Pipeline backed by an external inference runtime over HTTP

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::device::Device;
use crate::error::{AppError, Result};
use crate::pipeline::{GenerationRequest, Pipeline, PipelineLoader};
use crate::response::base64;

/// Loads a model into the inference runtime and hands out a [`RemotePipeline`]
pub struct RemotePipelineLoader {
    client: Client,
    endpoint: String,
    model_id: String,
    health_path: String,
    load_path: String,
    generate_path: String,
    reentrant: bool,
}

/// Model load request sent to the runtime
#[derive(Debug, Serialize)]
struct ApiLoadRequest<'a> {
    model: &'a str,
    device: String,
    dtype: &'a str,
}

/// Generation request sent to the runtime
#[derive(Debug, Serialize)]
struct ApiGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    num_inference_steps: u32,
    guidance_scale: f64,
    width: u32,
    height: u32,
}

/// Generation response from the runtime
#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    images: Vec<ApiImageData>,
    #[serde(default)]
    data: Vec<ApiImageData>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiImageData {
    Encoded(String),
    Object {
        #[serde(default)]
        b64_json: Option<String>,
        #[serde(default)]
        base64: Option<String>,
        #[serde(default)]
        image: Option<String>,
    },
}

impl ApiImageData {
    fn into_base64(self) -> Option<String> {
        match self {
            ApiImageData::Encoded(s) => Some(s),
            ApiImageData::Object {
                b64_json,
                base64,
                image,
            } => b64_json.or(base64).or(image),
        }
    }
}

impl RemotePipelineLoader {
    /// Create a loader from configuration
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model_id: config.id.clone(),
            health_path: config.health_path.clone(),
            load_path: config.load_path.clone(),
            generate_path: config.generate_path.clone(),
            reentrant: config.reentrant,
        })
    }

    async fn check_runtime(&self) -> Result<()> {
        let url = format!("{}{}", self.endpoint, self.health_path);
        let response = self.client.get(&url).send().await.map_err(|e| {
            AppError::ServiceUnavailable(format!(
                "Inference runtime unreachable at {}: {}",
                self.endpoint, e
            ))
        })?;

        if !response.status().is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "Inference runtime health check returned {}",
                response.status()
            )));
        }

        debug!(endpoint = %self.endpoint, "Inference runtime is up");
        Ok(())
    }

    async fn request_load(&self, device: Device) -> Result<()> {
        let url = format!("{}{}", self.endpoint, self.load_path);
        let body = ApiLoadRequest {
            model: &self.model_id,
            device: device.to_string(),
            dtype: device.dtype(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AppError::ServiceUnavailable(format!("Model load request failed: {}", e))
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                info!(
                    endpoint = %self.endpoint,
                    "Runtime has no load endpoint; assuming the model is preloaded"
                );
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::ServiceUnavailable(format!(
                    "Runtime refused to load '{}' on {} ({}): {}",
                    self.model_id, device, status, body
                )))
            }
        }
    }
}

#[async_trait]
impl PipelineLoader for RemotePipelineLoader {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn load(&self, device: Device) -> Result<Arc<dyn Pipeline>> {
        self.check_runtime().await?;
        self.request_load(device).await?;

        Ok(Arc::new(RemotePipeline {
            client: self.client.clone(),
            url: format!("{}{}", self.endpoint, self.generate_path),
            model_id: self.model_id.clone(),
            device,
            reentrant: self.reentrant,
        }))
    }
}

/// A model loaded inside the inference runtime
pub struct RemotePipeline {
    client: Client,
    url: String,
    model_id: String,
    device: Device,
    reentrant: bool,
}

#[async_trait]
impl Pipeline for RemotePipeline {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn device(&self) -> Device {
        self.device
    }

    fn is_reentrant(&self) -> bool {
        self.reentrant
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<DynamicImage> {
        let body = ApiGenerateRequest {
            model: &self.model_id,
            prompt: &request.prompt,
            negative_prompt: Some(request.negative_prompt.as_str()).filter(|s| !s.is_empty()),
            num_inference_steps: request.num_steps,
            guidance_scale: request.guidance_scale,
            width: request.width,
            height: request.height,
        };

        debug!(url = %self.url, steps = request.num_steps, "Sending inference request");

        let response = self.client.post(&self.url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Inference runtime returned {}: {}",
                status, body
            )));
        }

        let api_response: ApiGenerateResponse = response.json().await?;
        let encoded = api_response
            .images
            .into_iter()
            .chain(api_response.data)
            .find_map(ApiImageData::into_base64)
            .ok_or_else(|| AppError::Internal("Inference runtime returned no image".to_string()))?;

        let bytes = base64::decode(&encoded)?;
        Ok(image::load_from_memory(&bytes)?)
    }
}
