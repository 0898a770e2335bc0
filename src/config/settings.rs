//! Application settings and configuration management

use crate::device::DevicePreference;
use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Environment variable naming the model weights to load
pub const MODEL_ID_ENV: &str = "MODEL_ID";
/// Environment variable carrying the platform storage connection string
pub const STORAGE_CONNECTION_ENV: &str = "AzureWebJobsStorage";
/// Environment variable carrying the platform worker runtime identifier
pub const WORKER_RUNTIME_ENV: &str = "FUNCTIONS_WORKER_RUNTIME";
/// Environment variable overriding the configuration file path
pub const CONFIG_PATH_ENV: &str = "IMG_GEN_CONFIG";

/// Model used when nothing else is configured
pub const DEFAULT_MODEL_ID: &str = "stabilityai/stable-diffusion-2-1-base";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Inference pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Weight set the inference runtime is asked to load
    #[serde(default = "default_model_id")]
    pub id: String,
    /// Device preference: "auto", "cpu" or "cuda"
    #[serde(default = "default_device")]
    pub device: String,
    /// Base URL of the inference runtime
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_load_path")]
    pub load_path: String,
    #[serde(default = "default_generate_path")]
    pub generate_path: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Whether the runtime accepts overlapping inference calls
    #[serde(default)]
    pub reentrant: bool,
    /// How long the health endpoint reuses an accelerator reading
    #[serde(default = "default_device_info_ttl")]
    pub device_info_ttl_ms: u64,
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_device() -> String {
    "auto".to_string()
}

fn default_endpoint() -> String {
    "http://127.0.0.1:7860".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_load_path() -> String {
    "/load".to_string()
}

fn default_generate_path() -> String {
    "/generate".to_string()
}

fn default_timeout() -> u64 {
    600_000
}

fn default_device_info_ttl() -> u64 {
    10_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: default_model_id(),
            device: default_device(),
            endpoint: default_endpoint(),
            health_path: default_health_path(),
            load_path: default_load_path(),
            generate_path: default_generate_path(),
            timeout_ms: default_timeout(),
            reentrant: false,
            device_info_ttl_ms: default_device_info_ttl(),
        }
    }
}

/// Request defaults and limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_steps")]
    pub default_steps: u32,
    #[serde(default = "default_guidance_scale")]
    pub default_guidance_scale: f64,
    #[serde(default = "default_dimension")]
    pub default_width: u32,
    #[serde(default = "default_dimension")]
    pub default_height: u32,
    /// Width and height must be multiples of this
    #[serde(default = "default_alignment")]
    pub alignment: u32,
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

fn default_steps() -> u32 {
    25
}

fn default_guidance_scale() -> f64 {
    7.5
}

fn default_dimension() -> u32 {
    512
}

fn default_alignment() -> u32 {
    8
}

fn default_max_dimension() -> u32 {
    2048
}

fn default_max_steps() -> u32 {
    150
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_steps: default_steps(),
            default_guidance_scale: default_guidance_scale(),
            default_width: default_dimension(),
            default_height: default_dimension(),
            alignment: default_alignment(),
            max_dimension: default_max_dimension(),
            max_steps: default_max_steps(),
        }
    }
}

/// Values handed in by the hosting platform
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub storage_connection: Option<String>,
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("worker_id", &self.worker_id)
            .field(
                "storage_connection",
                &self.storage_connection.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_rps() -> u32 {
    10
}

fn default_burst() -> u32 {
    20
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: default_rps(),
            burst_size: default_burst(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            // Load from configuration file
            .add_source(File::with_name(path.to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (prefixed with IMG_GEN__)
            .add_source(
                Environment::with_prefix("IMG_GEN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            // Platform-provided variables win over everything else
            .set_override_option("model.id", non_empty_env(MODEL_ID_ENV))?
            .set_override_option("runtime.worker_id", non_empty_env(WORKER_RUNTIME_ENV))?
            .set_override_option(
                "runtime.storage_connection",
                non_empty_env(STORAGE_CONNECTION_ENV),
            )?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(config_error("Server port cannot be 0"));
        }

        if self.model.id.trim().is_empty() {
            return Err(config_error("Model id cannot be empty"));
        }

        DevicePreference::parse(&self.model.device)?;

        if reqwest::Url::parse(&self.model.endpoint).is_err() {
            return Err(config_error(format!(
                "Invalid inference endpoint '{}'",
                self.model.endpoint
            )));
        }

        let gen = &self.generation;
        if gen.alignment == 0 {
            return Err(config_error("Dimension alignment cannot be 0"));
        }
        if gen.default_steps == 0 || gen.default_steps > gen.max_steps {
            return Err(config_error(format!(
                "Default step count {} must be between 1 and {}",
                gen.default_steps, gen.max_steps
            )));
        }
        if !(gen.default_guidance_scale.is_finite() && gen.default_guidance_scale > 0.0) {
            return Err(config_error("Default guidance scale must be positive"));
        }
        for (name, value) in [("width", gen.default_width), ("height", gen.default_height)] {
            if value == 0 || value > gen.max_dimension || value % gen.alignment != 0 {
                return Err(config_error(format!(
                    "Default {} {} must be a positive multiple of {} no larger than {}",
                    name, value, gen.alignment, gen.max_dimension
                )));
            }
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(config_error(format!(
                "Invalid log format '{}'. Must be 'json' or 'pretty'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError::Config(config::ConfigError::Message(message.into()))
}
