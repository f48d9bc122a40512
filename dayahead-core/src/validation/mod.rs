//! Forecast validation engine.
//!
//! Four independent validators (schema, completeness, plausibility,
//! consistency) each produce a [`ValidationResult`]; [`combine`] folds them
//! into one. [`ValidationEngine`] runs whichever validators are enabled.

pub mod completeness;
pub mod consistency;
pub mod plausibility;
pub mod result;
pub mod schema;
pub mod settings;

pub use completeness::{CompletenessValidator, CoverageGaps};
pub use consistency::{ConsistencyValidator, RelationshipViolation};
pub use plausibility::{z_score_outliers, PlausibilityValidator};
pub use result::{combine, ErrorMap, Severity, ValidationCategory, ValidationResult};
pub use schema::{ForecastSchema, SchemaValidator};
pub use settings::{Bounds, Relation, Relationship, ValidationSettings, ZScoreThresholds};

use polars::prelude::DataFrame;
use std::collections::BTreeMap;

use crate::domain::forecast::frame_to_records;

/// A single validation check over a forecast frame.
///
/// Validators never fail: problems are reported inside the result.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    fn category(&self) -> ValidationCategory;

    fn validate(&self, df: &DataFrame) -> ValidationResult;
}

/// Outcome of validating one product's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductValidation {
    pub product: String,
    pub result: ValidationResult,
    /// `None` when the frame passed.
    pub severity: Option<Severity>,
}

impl ProductValidation {
    pub fn is_valid(&self) -> bool {
        self.result.is_valid()
    }
}

/// Runs the enabled validators according to [`ValidationSettings`].
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    settings: ValidationSettings,
}

impl ValidationEngine {
    pub fn new(settings: ValidationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Schema validator for the configured products and horizon.
    pub fn schema_validator(&self) -> SchemaValidator {
        SchemaValidator::new(self.settings.horizon_hours, self.settings.products.clone())
    }

    fn validators_for(
        &self,
        required: Vec<String>,
        relationships: Vec<Relationship>,
    ) -> Vec<Box<dyn Validator>> {
        let s = &self.settings;
        let mut validators: Vec<Box<dyn Validator>> = Vec::new();
        if s.schema {
            validators.push(Box::new(self.schema_validator()));
        }
        if s.completeness {
            validators.push(Box::new(CompletenessValidator::new(required, s.horizon_hours)));
        }
        if s.plausibility {
            validators.push(Box::new(PlausibilityValidator::from_settings(s)));
        }
        if s.consistency {
            validators.push(Box::new(ConsistencyValidator::new(
                relationships,
                s.smoothness_threshold,
            )));
        }
        validators
    }

    /// Validate one product's frame in isolation.
    ///
    /// Completeness only requires `product`; cross-product relationships
    /// are left to [`ValidationEngine::cross_product_violations`].
    pub fn validate_product(&self, df: &DataFrame, product: &str) -> ProductValidation {
        let validators = self.validators_for(vec![product.to_string()], Vec::new());
        let results: Vec<ValidationResult> = validators.iter().map(|v| v.validate(df)).collect();

        // Mixed failures combine to GENERIC, so severity comes from the parts.
        let severity = results
            .iter()
            .filter_map(ValidationResult::severity)
            .max_by_key(|s| matches!(s, Severity::Critical));

        ProductValidation {
            product: product.to_string(),
            result: combine(&results),
            severity,
        }
    }

    /// Validate a frame holding every configured product, relationships included.
    pub fn validate_all(&self, df: &DataFrame) -> ValidationResult {
        let validators = self.validators_for(
            self.settings.products.clone(),
            self.settings.relationships.clone(),
        );
        let results: Vec<ValidationResult> = validators.iter().map(|v| v.validate(df)).collect();
        combine(&results)
    }

    /// Relationship violations across separately produced product frames.
    ///
    /// Frames that cannot be read are skipped; the per-product pass has
    /// already rejected them. Empty when consistency checks are disabled.
    pub fn cross_product_violations(
        &self,
        frames: &BTreeMap<String, DataFrame>,
    ) -> Vec<RelationshipViolation> {
        if !self.settings.consistency || self.settings.relationships.is_empty() {
            return Vec::new();
        }
        let records: Vec<_> = frames
            .values()
            .filter_map(|df| frame_to_records(df).ok())
            .flatten()
            .collect();
        ConsistencyValidator::new(
            self.settings.relationships.clone(),
            self.settings.smoothness_threshold,
        )
        .relationship_violations(&records)
    }
}
