//! Failure classification and the fallback decision table.

use dayahead_core::error::{ErrorCategory, ForecastError, PipelineError, StorageOperation};
use dayahead_core::validation::{ErrorMap, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stage whose failures never justify serving a substitute forecast.
pub const NON_FALLBACK_STAGE: &str = "visualization";

/// Category-specific context attached by whoever raised the error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategoryDetails {
    DataSource {
        api_endpoint: Option<String>,
        source_name: String,
    },
    Feature {
        feature_name: String,
        source_features: Vec<String>,
    },
    Model {
        product: String,
        hour: Option<u32>,
        model_id: Option<String>,
    },
    Validation {
        validation_errors: ErrorMap,
        severity: Severity,
    },
    Storage {
        file_path: String,
        operation: StorageOperation,
    },
    Pipeline {
        pipeline_name: String,
        stage_name: Option<String>,
    },
    Unknown,
}

/// Everything known about a failure, in a fixed shape per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub error_type: String,
    pub error_message: String,
    pub fields: CategoryDetails,
}

impl ErrorDetails {
    /// Flat key/value rendering for logs.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("error_type".to_string(), self.error_type.clone());
        map.insert("error_message".to_string(), self.error_message.clone());
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();

        match &self.fields {
            CategoryDetails::DataSource {
                api_endpoint,
                source_name,
            } => {
                map.insert("api_endpoint".into(), opt(api_endpoint));
                map.insert("source_name".into(), source_name.clone());
            }
            CategoryDetails::Feature {
                feature_name,
                source_features,
            } => {
                map.insert("feature_name".into(), feature_name.clone());
                map.insert("source_features".into(), source_features.join(","));
            }
            CategoryDetails::Model {
                product,
                hour,
                model_id,
            } => {
                map.insert("product".into(), product.clone());
                map.insert("hour".into(), hour.map(|h| h.to_string()).unwrap_or_default());
                map.insert("model_id".into(), opt(model_id));
            }
            CategoryDetails::Validation {
                validation_errors,
                severity,
            } => {
                let keys: Vec<&str> = validation_errors.keys().map(String::as_str).collect();
                map.insert("validation_errors".into(), keys.join(","));
                map.insert("severity".into(), severity.to_string());
            }
            CategoryDetails::Storage {
                file_path,
                operation,
            } => {
                map.insert("file_path".into(), file_path.clone());
                map.insert("operation".into(), operation.to_string());
            }
            CategoryDetails::Pipeline {
                pipeline_name,
                stage_name,
            } => {
                map.insert("pipeline_name".into(), pipeline_name.clone());
                map.insert("stage_name".into(), opt(stage_name));
            }
            CategoryDetails::Unknown => {}
        }
        map
    }
}

/// Maps collaborator failures to categories and decides on fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, error: &ForecastError) -> ErrorCategory {
        match error {
            ForecastError::DataSource(_) => ErrorCategory::DataSource,
            ForecastError::Feature(_) => ErrorCategory::Feature,
            ForecastError::Model(_) => ErrorCategory::Model,
            ForecastError::Validation(_) => ErrorCategory::Validation,
            ForecastError::Storage(_) => ErrorCategory::Storage,
            ForecastError::Pipeline(_) => ErrorCategory::Pipeline,
            ForecastError::Unknown { .. } => ErrorCategory::Unknown,
        }
    }

    /// Details for `error` shaped by `category`.
    ///
    /// A category that does not match the error's variant yields type and
    /// message only.
    pub fn extract_details(&self, error: &ForecastError, category: ErrorCategory) -> ErrorDetails {
        let fields = match (category, error) {
            (ErrorCategory::DataSource, ForecastError::DataSource(e)) => CategoryDetails::DataSource {
                api_endpoint: e.api_endpoint.clone(),
                source_name: e.source_name.clone(),
            },
            (ErrorCategory::Feature, ForecastError::Feature(e)) => CategoryDetails::Feature {
                feature_name: e.feature_name.clone(),
                source_features: e.source_features.clone(),
            },
            (ErrorCategory::Model, ForecastError::Model(e)) => CategoryDetails::Model {
                product: e.product.clone(),
                hour: e.hour,
                model_id: e.model_id.clone(),
            },
            (ErrorCategory::Validation, ForecastError::Validation(e)) => {
                CategoryDetails::Validation {
                    validation_errors: e.result.errors().clone(),
                    severity: e.severity,
                }
            }
            (ErrorCategory::Storage, ForecastError::Storage(e)) => CategoryDetails::Storage {
                file_path: e.file_path.clone(),
                operation: e.operation,
            },
            (ErrorCategory::Pipeline, ForecastError::Pipeline(e)) => CategoryDetails::Pipeline {
                pipeline_name: e.pipeline_name().to_string(),
                stage_name: e.stage_name().map(str::to_string),
            },
            _ => CategoryDetails::Unknown,
        };

        ErrorDetails {
            error_type: error.error_type().to_string(),
            error_message: error.to_string(),
            fields,
        }
    }

    /// The fallback decision table.
    ///
    /// | category    | fallback                                  |
    /// |-------------|-------------------------------------------|
    /// | DATA_SOURCE | always                                    |
    /// | FEATURE     | always                                    |
    /// | MODEL       | always                                    |
    /// | VALIDATION  | always (critical and warning alike)       |
    /// | STORAGE     | reads only, never writes                  |
    /// | PIPELINE    | unless the stage is `visualization`       |
    /// | UNKNOWN     | never                                     |
    pub fn should_activate_fallback(&self, category: ErrorCategory, details: &ErrorDetails) -> bool {
        match category {
            ErrorCategory::DataSource | ErrorCategory::Feature | ErrorCategory::Model => true,
            ErrorCategory::Validation => true,
            ErrorCategory::Storage => matches!(
                details.fields,
                CategoryDetails::Storage {
                    operation: StorageOperation::Read,
                    ..
                }
            ),
            ErrorCategory::Pipeline => match &details.fields {
                CategoryDetails::Pipeline { stage_name, .. } => {
                    stage_name.as_deref() != Some(NON_FALLBACK_STAGE)
                }
                _ => true,
            },
            ErrorCategory::Unknown => false,
        }
    }

    /// Classify, extract and decide in one step.
    pub fn assess(&self, error: &ForecastError) -> (ErrorCategory, ErrorDetails, bool) {
        let category = self.classify(error);
        let details = self.extract_details(error, category);
        let fallback = self.should_activate_fallback(category, &details);
        (category, details, fallback)
    }
}

/// `PipelineError` wrapped for classification.
pub fn pipeline_error(pipeline_name: &str, stage_name: &str, message: impl Into<String>) -> ForecastError {
    ForecastError::Pipeline(PipelineError::StageFailed {
        pipeline_name: pipeline_name.to_string(),
        stage_name: stage_name.to_string(),
        message: message.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dayahead_core::error::{
        DataSourceError, FeatureError, ForecastValidationError, ModelError, StorageError,
    };
    use dayahead_core::validation::{ValidationCategory, ValidationResult};

    fn decide(error: ForecastError) -> (ErrorCategory, bool) {
        let (category, _, fallback) = ErrorClassifier::new().assess(&error);
        (category, fallback)
    }

    fn validation_error(severity: Severity) -> ForecastError {
        let mut errors = ErrorMap::new();
        errors.insert("out_of_range".into(), vec!["fcr hour 3".into()]);
        ForecastError::Validation(ForecastValidationError {
            product: "fcr".into(),
            severity,
            result: ValidationResult::from_errors(ValidationCategory::Plausibility, errors),
        })
    }

    #[test]
    fn data_source_failure_is_classified_and_detailed() {
        let err = ForecastError::DataSource(
            DataSourceError::new("entsoe", "HTTP 503").with_endpoint("/api/prices"),
        );
        let classifier = ErrorClassifier::new();
        let category = classifier.classify(&err);
        assert_eq!(category, ErrorCategory::DataSource);

        let details = classifier.extract_details(&err, category);
        assert_eq!(details.error_type, "DataSourceError");
        let map = details.to_map();
        assert_eq!(map["source_name"], "entsoe");
        assert_eq!(map["api_endpoint"], "/api/prices");
        assert!(map.contains_key("error_message"));
        assert!(classifier.should_activate_fallback(category, &details));
    }

    #[test]
    fn decision_table() {
        assert_eq!(
            decide(FeatureError::new("lag_24", "nan").into()),
            (ErrorCategory::Feature, true)
        );
        assert_eq!(
            decide(ModelError::new("fcr", "diverged").at_hour(3).into()),
            (ErrorCategory::Model, true)
        );
        assert_eq!(
            decide(validation_error(Severity::Critical)),
            (ErrorCategory::Validation, true)
        );
        assert_eq!(
            decide(validation_error(Severity::Warning)),
            (ErrorCategory::Validation, true)
        );
        assert_eq!(
            decide(StorageError::read("/x", "gone").into()),
            (ErrorCategory::Storage, true)
        );
        assert_eq!(
            decide(StorageError::write("/x", "disk full").into()),
            (ErrorCategory::Storage, false)
        );
        assert_eq!(
            decide(ForecastError::unknown("Weird", "???")),
            (ErrorCategory::Unknown, false)
        );
    }

    #[test]
    fn pipeline_failures_depend_on_stage() {
        assert_eq!(
            decide(pipeline_error("day_ahead", "forecast", "boom")),
            (ErrorCategory::Pipeline, true)
        );
        assert_eq!(
            decide(pipeline_error("day_ahead", NON_FALLBACK_STAGE, "boom")),
            (ErrorCategory::Pipeline, false)
        );
    }

    #[test]
    fn mismatched_category_yields_type_and_message_only() {
        let err = ForecastError::from(StorageError::write("/x", "disk full"));
        let details = ErrorClassifier::new().extract_details(&err, ErrorCategory::Model);
        assert_eq!(details.fields, CategoryDetails::Unknown);
        assert_eq!(details.to_map().len(), 2);
    }

    #[test]
    fn unknown_details_have_only_type_and_message() {
        let err = ForecastError::unknown("Weird", "???");
        let details = ErrorClassifier::new().extract_details(&err, ErrorCategory::Unknown);
        let map = details.to_map();
        assert_eq!(map["error_type"], "Weird");
        assert_eq!(map["error_message"], "Weird: ???");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn validation_details_list_subcategories() {
        let err = validation_error(Severity::Warning);
        let details = ErrorClassifier::new().extract_details(&err, ErrorCategory::Validation);
        let map = details.to_map();
        assert_eq!(map["validation_errors"], "out_of_range");
        assert_eq!(map["severity"], "warning");
    }
}
