//! Pipeline events.
//!
//! Every diagnostic the pipeline emits is one [`PipelineEvent`] variant with
//! a human-readable `Display` and a structured `log()` that attaches the
//! variant's fields to a `tracing` event.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::error::ErrorCategory;
use crate::validation::ValidationCategory;

/// Emit a message as a structured `tracing` event.
pub trait StructuredLog {
    fn log(&self);
}

/// Result of probing one earlier date for a substitute forecast.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    NotStored,
    Unreadable(String),
    SchemaInvalid(usize),
    Accepted,
}

impl Display for ProbeOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::NotStored => write!(f, "not stored"),
            ProbeOutcome::Unreadable(e) => write!(f, "unreadable: {e}"),
            ProbeOutcome::SchemaInvalid(n) => write!(f, "schema invalid ({n} error(s))"),
            ProbeOutcome::Accepted => write!(f, "accepted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ExecutionStarted {
        pipeline_name: String,
        execution_id: String,
        target_date: NaiveDate,
        products: Vec<String>,
    },
    ConfigRejected {
        pipeline_name: String,
        reason: String,
    },
    StageStarted {
        stage: String,
        products: usize,
    },
    StageCompleted {
        stage: String,
        kept: usize,
        skipped: usize,
        duration: Duration,
    },
    StageFailed {
        stage: String,
        product: Option<String>,
        category: ErrorCategory,
        details: BTreeMap<String, String>,
        message: String,
    },
    FallbackDenied {
        stage: String,
        category: ErrorCategory,
        reason: String,
    },
    /// Final validation verdict for one product, relationships included.
    ValidationCompleted {
        product: String,
        is_valid: bool,
        category: ValidationCategory,
        error_count: usize,
    },
    FallbackProbe {
        product: String,
        candidate_date: NaiveDate,
        outcome: ProbeOutcome,
    },
    FallbackActivated {
        product: String,
        source_date: NaiveDate,
        target_date: NaiveDate,
        path: String,
    },
    FallbackUnavailable {
        product: String,
        target_date: NaiveDate,
        max_search_days: i64,
    },
    ExecutionCompleted {
        execution_id: String,
        status: String,
        fallback_products: usize,
        duration: Duration,
    },
    ExecutionFailed {
        execution_id: String,
        error: String,
    },
}

impl Display for PipelineEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::ExecutionStarted {
                pipeline_name,
                execution_id,
                target_date,
                products,
            } => write!(
                f,
                "Starting pipeline '{pipeline_name}' ({execution_id}) for {target_date}: {} product(s)",
                products.len()
            ),
            PipelineEvent::ConfigRejected {
                pipeline_name,
                reason,
            } => write!(f, "Configuration for '{pipeline_name}' rejected: {reason}"),
            PipelineEvent::StageStarted { stage, products } => {
                write!(f, "Stage {stage} started with {products} live product(s)")
            }
            PipelineEvent::StageCompleted {
                stage,
                kept,
                skipped,
                duration,
            } => write!(
                f,
                "Stage {stage} completed in {duration:?}: {kept} kept, {skipped} skipped"
            ),
            PipelineEvent::StageFailed {
                stage,
                product,
                category,
                message,
                ..
            } => match product {
                Some(p) => write!(f, "Stage {stage} failed for {p} [{category}]: {message}"),
                None => write!(f, "Stage {stage} failed [{category}]: {message}"),
            },
            PipelineEvent::FallbackDenied {
                stage,
                category,
                reason,
            } => write!(f, "Fallback not activated after {stage} [{category}]: {reason}"),
            PipelineEvent::ValidationCompleted {
                product,
                is_valid,
                category,
                error_count,
            } => {
                if *is_valid {
                    write!(f, "Validation passed for {product}")
                } else {
                    write!(
                        f,
                        "Validation failed for {product} [{category}]: {error_count} error(s)"
                    )
                }
            }
            PipelineEvent::FallbackProbe {
                product,
                candidate_date,
                outcome,
            } => write!(f, "Fallback probe {product} @ {candidate_date}: {outcome}"),
            PipelineEvent::FallbackActivated {
                product,
                source_date,
                target_date,
                path,
            } => write!(
                f,
                "Serving {product} for {target_date} from {source_date} forecast ({path})"
            ),
            PipelineEvent::FallbackUnavailable {
                product,
                target_date,
                max_search_days,
            } => write!(
                f,
                "No fallback for {product} on {target_date} within {max_search_days} day(s)"
            ),
            PipelineEvent::ExecutionCompleted {
                execution_id,
                status,
                fallback_products,
                duration,
            } => write!(
                f,
                "Execution {execution_id} finished with status {status} in {duration:?} ({fallback_products} fallback product(s))"
            ),
            PipelineEvent::ExecutionFailed {
                execution_id,
                error,
            } => write!(f, "Execution {execution_id} failed: {error}"),
        }
    }
}

impl StructuredLog for PipelineEvent {
    fn log(&self) {
        match self {
            PipelineEvent::ExecutionStarted {
                pipeline_name,
                execution_id,
                target_date,
                products,
            } => tracing::info!(
                pipeline_name = pipeline_name.as_str(),
                execution_id = execution_id.as_str(),
                target_date = %target_date,
                product_count = products.len(),
                "{}", self
            ),
            PipelineEvent::ConfigRejected {
                pipeline_name,
                reason,
            } => tracing::error!(
                pipeline_name = pipeline_name.as_str(),
                reason = reason.as_str(),
                "{}", self
            ),
            PipelineEvent::StageStarted { stage, products } => tracing::debug!(
                stage = stage.as_str(),
                products = *products,
                "{}", self
            ),
            PipelineEvent::StageCompleted {
                stage,
                kept,
                skipped,
                duration,
            } => tracing::info!(
                stage = stage.as_str(),
                kept = *kept,
                skipped = *skipped,
                duration_ms = duration.as_millis() as u64,
                "{}", self
            ),
            PipelineEvent::StageFailed {
                stage,
                product,
                category,
                details,
                ..
            } => tracing::warn!(
                stage = stage.as_str(),
                product = product.as_deref().unwrap_or("*"),
                category = %category,
                details = ?details,
                "{}", self
            ),
            PipelineEvent::FallbackDenied {
                stage, category, ..
            } => tracing::error!(
                stage = stage.as_str(),
                category = %category,
                "{}", self
            ),
            PipelineEvent::ValidationCompleted {
                product,
                is_valid,
                category,
                error_count,
            } => {
                if *is_valid {
                    tracing::debug!(product = product.as_str(), is_valid = *is_valid, "{}", self)
                } else {
                    tracing::warn!(
                        product = product.as_str(),
                        is_valid = *is_valid,
                        category = %category,
                        error_count = *error_count,
                        "{}", self
                    )
                }
            }
            PipelineEvent::FallbackProbe {
                product,
                candidate_date,
                outcome,
            } => match outcome {
                ProbeOutcome::Unreadable(_) | ProbeOutcome::SchemaInvalid(_) => tracing::warn!(
                    product = product.as_str(),
                    candidate_date = %candidate_date,
                    "{}", self
                ),
                _ => tracing::debug!(
                    product = product.as_str(),
                    candidate_date = %candidate_date,
                    "{}", self
                ),
            },
            PipelineEvent::FallbackActivated {
                product,
                source_date,
                target_date,
                path,
            } => tracing::warn!(
                product = product.as_str(),
                source_date = %source_date,
                target_date = %target_date,
                path = path.as_str(),
                "{}", self
            ),
            PipelineEvent::FallbackUnavailable {
                product,
                target_date,
                max_search_days,
            } => tracing::error!(
                product = product.as_str(),
                target_date = %target_date,
                max_search_days = *max_search_days,
                "{}", self
            ),
            PipelineEvent::ExecutionCompleted {
                execution_id,
                status,
                fallback_products,
                duration,
            } => tracing::info!(
                execution_id = execution_id.as_str(),
                status = status.as_str(),
                fallback_products = *fallback_products,
                duration_ms = duration.as_millis() as u64,
                "{}", self
            ),
            PipelineEvent::ExecutionFailed {
                execution_id,
                error,
            } => tracing::error!(
                execution_id = execution_id.as_str(),
                error = error.as_str(),
                "{}", self
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failure_display_names_product() {
        let event = PipelineEvent::StageFailed {
            stage: "forecast".into(),
            product: Some("fcr".into()),
            category: ErrorCategory::Model,
            details: BTreeMap::new(),
            message: "diverged".into(),
        };
        assert_eq!(event.to_string(), "Stage forecast failed for fcr [MODEL]: diverged");
    }

    #[test]
    fn whole_stage_failure_display() {
        let event = PipelineEvent::StageFailed {
            stage: "ingest".into(),
            product: None,
            category: ErrorCategory::DataSource,
            details: BTreeMap::new(),
            message: "timeout".into(),
        };
        assert_eq!(event.to_string(), "Stage ingest failed [DATA_SOURCE]: timeout");
    }

    #[test]
    fn validation_verdict_display() {
        let passed = PipelineEvent::ValidationCompleted {
            product: "fcr".into(),
            is_valid: true,
            category: ValidationCategory::Generic,
            error_count: 0,
        };
        assert_eq!(passed.to_string(), "Validation passed for fcr");

        let failed = PipelineEvent::ValidationCompleted {
            product: "fcr".into(),
            is_valid: false,
            category: ValidationCategory::Completeness,
            error_count: 2,
        };
        assert_eq!(
            failed.to_string(),
            "Validation failed for fcr [COMPLETENESS]: 2 error(s)"
        );
        failed.log();
    }

    #[test]
    fn probe_outcome_display() {
        assert_eq!(ProbeOutcome::SchemaInvalid(3).to_string(), "schema invalid (3 error(s))");
        assert_eq!(ProbeOutcome::NotStored.to_string(), "not stored");
    }

    #[test]
    fn log_without_subscriber_is_a_no_op() {
        PipelineEvent::ExecutionFailed {
            execution_id: "x".into(),
            error: "boom".into(),
        }
        .log();
    }
}
