//! dayahead core: forecast domain types, collaborator ports, storage, validation.
//!
//! This crate holds everything the pipeline runner consumes:
//! - Domain types (products, forecast records and frames, ids)
//! - The closed collaborator error taxonomy
//! - Collaborator traits and the storage port, plus a Parquet store
//! - The four-validator validation engine and its combinator
//! - Pipeline events and the event sink logging port

pub mod data;
pub mod domain;
pub mod error;
pub mod observability;
pub mod validation;

pub use error::{
    DataSourceError, ErrorCategory, FeatureError, ForecastError, ForecastValidationError,
    ModelError, PipelineError, StorageError, StorageOperation,
};
