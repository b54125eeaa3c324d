//! # Processor Configuration
//!
//! Layered configuration for queue processors, loaded with the `config` crate:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. `QUEUE_PROCESSOR__*` environment variables (e.g. `QUEUE_PROCESSOR__QUEUE_NAME`)
//!
//! Every loaded configuration is validated before it is returned.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "QUEUE_PROCESSOR";

/// Default error channel name
pub const DEFAULT_ERROR_QUEUE_NAME: &str = "ERRORS";

/// Default property key naming the logical destination of a sent message
pub const DEFAULT_DISCRIMINATOR_KEY: &str = "MessageName";

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The configuration sources could not be read or deserialized
    #[error("Failed to load configuration: {message}")]
    Load { message: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}'")]
    MissingRequiredField { field: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    pub fn missing_required_field(field: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        Self::load(err.to_string())
    }
}

/// Settings for one queue processor and its workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Queue the processor receives from and sends to
    pub queue_name: String,
    /// Error channel receiving diagnostic records
    pub error_queue_name: String,
    /// Property key carrying the logical destination on sent messages
    pub discriminator_key: String,
    /// How long a single receive waits for a message
    pub receive_timeout_ms: u64,
    /// Peek-lock duration for received messages
    pub lock_duration_seconds: u64,
    /// Worker sleep after a pass that found nothing to do
    pub idle_backoff_ms: u64,
    /// Number of independent workers to run
    pub worker_count: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            queue_name: String::new(),
            error_queue_name: DEFAULT_ERROR_QUEUE_NAME.to_string(),
            discriminator_key: DEFAULT_DISCRIMINATOR_KEY.to_string(),
            receive_timeout_ms: 1_000,
            lock_duration_seconds: 300,
            idle_backoff_ms: 500,
            worker_count: 1,
        }
    }
}

impl ProcessorConfig {
    /// Defaults for the given receive queue
    pub fn for_queue(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Self::default()
        }
    }

    /// Load from defaults and `QUEUE_PROCESSOR__*` environment variables
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::load(None)
    }

    /// Load from defaults, an optional TOML file and environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        Self::load_with_environment(path, environment_source())
    }

    fn load_with_environment(
        path: Option<&Path>,
        environment: Environment,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let config: Self = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;

        tracing::debug!(
            queue = %config.queue_name,
            error_queue = %config.error_queue_name,
            worker_count = config.worker_count,
            "Processor configuration loaded"
        );

        Ok(config)
    }

    /// Check the configuration for values no processor can run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.queue_name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("queue_name"));
        }

        if self.error_queue_name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("error_queue_name"));
        }

        if self.discriminator_key.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("discriminator_key"));
        }

        if self.queue_name == self.error_queue_name {
            return Err(ConfigurationError::invalid_value(
                "error_queue_name",
                &self.error_queue_name,
                "error channel must differ from the work queue",
            ));
        }

        for (field, value) in [
            ("receive_timeout_ms", self.receive_timeout_ms),
            ("lock_duration_seconds", self.lock_duration_seconds),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "must be greater than zero",
                ));
            }
        }

        if self.worker_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker_count",
                self.worker_count,
                "at least one worker is required",
            ));
        }

        Ok(())
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::from_secs(self.lock_duration_seconds)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

fn environment_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
