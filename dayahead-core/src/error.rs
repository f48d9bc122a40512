//! Collaborator error taxonomy.
//!
//! Every failure a collaborator can hand back to the pipeline is one variant
//! of [`ForecastError`], and each variant carries a fixed-shape detail struct
//! filled in by whoever raised it. Classification is an exhaustive match over
//! this closed union.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::validation::{Severity, ValidationResult};

/// Coarse failure category used by the fallback decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    DataSource,
    Feature,
    Model,
    Validation,
    Storage,
    Pipeline,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::DataSource => "DATA_SOURCE",
            ErrorCategory::Feature => "FEATURE",
            ErrorCategory::Model => "MODEL",
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Storage => "STORAGE",
            ErrorCategory::Pipeline => "PIPELINE",
            ErrorCategory::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// An upstream data API could not deliver.
#[derive(Debug, Clone, Error)]
#[error("data source '{source_name}' failed: {message}")]
pub struct DataSourceError {
    pub source_name: String,
    pub api_endpoint: Option<String>,
    pub message: String,
}

impl DataSourceError {
    pub fn new(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            api_endpoint: None,
            message: message.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }
}

/// A feature could not be derived from the history.
#[derive(Debug, Clone, Error)]
#[error("feature '{feature_name}' failed: {message}")]
pub struct FeatureError {
    pub feature_name: String,
    pub source_features: Vec<String>,
    pub message: String,
}

impl FeatureError {
    pub fn new(feature_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            feature_name: feature_name.into(),
            source_features: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_source_features(mut self, features: Vec<String>) -> Self {
        self.source_features = features;
        self
    }
}

/// The forecasting model failed for a product.
#[derive(Debug, Clone, Error)]
#[error("model failed for product '{product}': {message}")]
pub struct ModelError {
    pub product: String,
    pub hour: Option<u32>,
    pub model_id: Option<String>,
    pub message: String,
}

impl ModelError {
    pub fn new(product: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            hour: None,
            model_id: None,
            message: message.into(),
        }
    }

    pub fn at_hour(mut self, hour: u32) -> Self {
        self.hour = Some(hour);
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }
}

/// A produced forecast did not pass validation.
#[derive(Debug, Clone, Error)]
#[error(
    "forecast for '{product}' failed {} validation ({severity}): {} error(s)",
    .result.category(),
    .result.error_count()
)]
pub struct ForecastValidationError {
    pub product: String,
    pub severity: Severity,
    pub result: ValidationResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageOperation {
    Read,
    Write,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageOperation::Read => write!(f, "read"),
            StorageOperation::Write => write!(f, "write"),
        }
    }
}

/// A storage read or write failed.
#[derive(Debug, Clone, Error)]
#[error("storage {operation} failed for {file_path}: {message}")]
pub struct StorageError {
    pub operation: StorageOperation,
    pub file_path: String,
    pub message: String,
}

impl StorageError {
    pub fn read(file_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: StorageOperation::Read,
            file_path: file_path.into(),
            message: message.into(),
        }
    }

    pub fn write(file_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: StorageOperation::Write,
            file_path: file_path.into(),
            message: message.into(),
        }
    }
}

/// Failures owned by the pipeline itself rather than a collaborator.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("pipeline '{pipeline_name}' stage '{stage_name}' failed: {message}")]
    StageFailed {
        pipeline_name: String,
        stage_name: String,
        message: String,
    },

    /// Exceeded a time budget. No stage enforces one yet.
    #[error("pipeline '{pipeline_name}' stage '{stage_name}' exceeded {budget:?}")]
    Timeout {
        pipeline_name: String,
        stage_name: String,
        budget: Duration,
    },

    #[error("pipeline '{pipeline_name}' executor has already been used")]
    AlreadyExecuted { pipeline_name: String },
}

impl PipelineError {
    pub fn pipeline_name(&self) -> &str {
        match self {
            PipelineError::StageFailed { pipeline_name, .. }
            | PipelineError::Timeout { pipeline_name, .. }
            | PipelineError::AlreadyExecuted { pipeline_name } => pipeline_name,
        }
    }

    /// `None` for errors not tied to a stage.
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            PipelineError::StageFailed { stage_name, .. }
            | PipelineError::Timeout { stage_name, .. } => Some(stage_name),
            PipelineError::AlreadyExecuted { .. } => None,
        }
    }
}

/// Every failure a collaborator may report to the pipeline.
#[derive(Debug, Clone, Error)]
pub enum ForecastError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Validation(#[from] ForecastValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Anything that does not belong to the taxonomy.
    #[error("{error_type}: {message}")]
    Unknown { error_type: String, message: String },
}

impl ForecastError {
    pub fn unknown(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        ForecastError::Unknown {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Stable type name for logs and error details.
    pub fn error_type(&self) -> &str {
        match self {
            ForecastError::DataSource(_) => "DataSourceError",
            ForecastError::Feature(_) => "FeatureError",
            ForecastError::Model(_) => "ModelError",
            ForecastError::Validation(_) => "ForecastValidationError",
            ForecastError::Storage(_) => "StorageError",
            ForecastError::Pipeline(PipelineError::Timeout { .. }) => "PipelineTimeoutError",
            ForecastError::Pipeline(_) => "PipelineError",
            ForecastError::Unknown { error_type, .. } => error_type,
        }
    }
}
