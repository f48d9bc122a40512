//! Drives one execution through the stage state machine.
//!
//! Each working stage reads only the output its predecessor cached in the
//! [`ExecutionContext`]. Per-product work is partitioned into kept and
//! skipped products; skipped products leave the live set and go through
//! failure handling while the others carry on.

use chrono::NaiveDate;
use dayahead_core::data::{
    DataIngestion, FeatureEngineering, FeatureSet, ForecastingEngine, HistoricalData,
    StorageManager,
};
use dayahead_core::error::{ErrorCategory, ForecastError, ForecastValidationError, ModelError};
use dayahead_core::observability::{report, EventSink, PipelineEvent};
use dayahead_core::validation::consistency::RELATIONSHIP;
use dayahead_core::validation::{
    ErrorMap, Severity, ValidationCategory, ValidationEngine, ValidationResult,
};
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::classifier::{pipeline_error, ErrorClassifier};
use crate::context::{
    ExecutionContext, FeatureOutput, ForecastOutput, IngestOutput, StoreOutput, ValidateOutput,
};
use crate::fallback::{FallbackError, FallbackRecord, FallbackResolver};
use crate::stages::{InvalidTransition, StageState};

/// The external services one execution talks to.
#[derive(Clone)]
pub struct PipelineCollaborators {
    pub ingestion: Arc<dyn DataIngestion>,
    pub features: Arc<dyn FeatureEngineering>,
    pub engine: Arc<dyn ForecastingEngine>,
    pub storage: Arc<dyn StorageManager>,
}

/// A collaborator failure attributed to a stage (and product, if scoped).
#[derive(Debug, Clone, Error)]
#[error("stage {stage} of pipeline '{pipeline_name}' failed: {cause}")]
pub struct StageFailure {
    pub stage: StageState,
    pub pipeline_name: String,
    pub execution_id: String,
    /// `None` when the whole stage failed.
    pub product: Option<String>,
    #[source]
    pub cause: ForecastError,
}

/// Per-product results of one stage.
#[derive(Debug)]
pub struct Partition<T> {
    pub kept: BTreeMap<String, T>,
    pub skipped: Vec<StageFailure>,
}

impl<T> Default for Partition<T> {
    fn default() -> Self {
        Self {
            kept: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Partition<T> {
    pub fn keep(&mut self, product: impl Into<String>, value: T) {
        self.kept.insert(product.into(), value);
    }

    pub fn skip(&mut self, failure: StageFailure) {
        self.skipped.push(failure);
    }
}

/// Conditions that end an execution.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("fallback not permitted for {category} failure: {failure}")]
    FallbackNotPermitted {
        category: ErrorCategory,
        #[source]
        failure: StageFailure,
    },

    #[error("fallback is disabled: {failure}")]
    FallbackDisabled {
        #[source]
        failure: StageFailure,
    },

    #[error(transparent)]
    Fallback(#[from] FallbackError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Kept count plus skipped products, or a whole-stage failure.
type StageOutcome = Result<(usize, Vec<StageFailure>), StageFailure>;

pub struct StageRunner {
    collaborators: PipelineCollaborators,
    classifier: ErrorClassifier,
    sink: Arc<dyn EventSink>,
}

impl StageRunner {
    pub fn new(collaborators: PipelineCollaborators, sink: Arc<dyn EventSink>) -> Self {
        Self {
            collaborators,
            classifier: ErrorClassifier::new(),
            sink,
        }
    }

    /// Run every stage.
    ///
    /// `Ok(true)` when all products were produced fresh, `Ok(false)` when at
    /// least one product is served from a fallback forecast.
    pub fn run(&self, ctx: &mut ExecutionContext) -> Result<bool, RunnerError> {
        let validation = ValidationEngine::new(ctx.config().validation_settings());

        for stage in StageState::WORKING {
            let _span = tracing::info_span!("stage", stage = stage.name()).entered();
            report(
                self.sink.as_ref(),
                PipelineEvent::StageStarted {
                    stage: stage.name().to_string(),
                    products: ctx.live_products().len(),
                },
            );

            let started = Instant::now();
            let outcome = match stage {
                StageState::Ingest => self.ingest(ctx),
                StageState::Feature => self.feature(ctx),
                StageState::Forecast => self.forecast(ctx),
                StageState::Validate => self.validate(ctx, &validation),
                _ => self.store(ctx),
            };
            let duration = started.elapsed();
            ctx.record_timing(stage, duration);

            let failures = match outcome {
                Ok((kept, skipped)) => {
                    report(
                        self.sink.as_ref(),
                        PipelineEvent::StageCompleted {
                            stage: stage.name().to_string(),
                            kept,
                            skipped: skipped.len(),
                            duration,
                        },
                    );
                    skipped
                }
                Err(failure) => vec![failure],
            };
            for failure in failures {
                self.handle_failure(ctx, &validation, failure)?;
            }

            if stage == StageState::Store {
                break;
            }
            if ctx.live_products().is_empty() {
                ctx.transition(StageState::Failure)?;
                ctx.transition(StageState::Fallback)?;
                return Ok(false);
            }
            if let Some(next) = stage.next() {
                ctx.transition(next)?;
            }
        }

        if ctx.used_fallback() {
            ctx.transition(StageState::Fallback)?;
            Ok(false)
        } else {
            ctx.transition(StageState::Success)?;
            Ok(true)
        }
    }

    /// Classify a stage failure and either fall back or end the run.
    pub fn handle_failure(
        &self,
        ctx: &mut ExecutionContext,
        validation: &ValidationEngine,
        failure: StageFailure,
    ) -> Result<Vec<FallbackRecord>, RunnerError> {
        let (category, details, permitted) = self.classifier.assess(&failure.cause);
        // A product whose fresh write failed is still served from an earlier forecast.
        let permitted = permitted || failure.stage == StageState::Store;
        report(
            self.sink.as_ref(),
            PipelineEvent::StageFailed {
                stage: failure.stage.name().to_string(),
                product: failure.product.clone(),
                category,
                details: details.to_map(),
                message: failure.cause.to_string(),
            },
        );

        if !permitted {
            self.deny(&failure, category, "failure category does not permit fallback");
            return Err(fail(ctx, RunnerError::FallbackNotPermitted { category, failure }));
        }
        if !ctx.config().fallback.enabled {
            self.deny(&failure, category, "fallback disabled in configuration");
            return Err(fail(ctx, RunnerError::FallbackDisabled { failure }));
        }

        let resolver = FallbackResolver::new(
            self.collaborators.storage.clone(),
            validation.schema_validator(),
            self.sink.clone(),
        );
        self.activate_fallback(ctx, &resolver, &failure)
    }

    /// Resolve a substitute for every product in the failure's scope.
    ///
    /// A whole-stage failure covers every product still live.
    pub fn activate_fallback(
        &self,
        ctx: &mut ExecutionContext,
        resolver: &FallbackResolver,
        failure: &StageFailure,
    ) -> Result<Vec<FallbackRecord>, RunnerError> {
        let scope: Vec<String> = match &failure.product {
            Some(product) => vec![product.clone()],
            None => ctx.live_products().iter().cloned().collect(),
        };
        let max_search_days = ctx.config().fallback.max_search_days;
        tracing::debug!(
            stage = failure.stage.name(),
            products = scope.len(),
            max_search_days,
            "activating fallback"
        );

        let mut records = Vec::with_capacity(scope.len());
        for product in scope {
            let record = match resolver.resolve(&product, ctx.target_date(), max_search_days) {
                Ok(record) => record,
                Err(e) => return Err(fail(ctx, e.into())),
            };
            ctx.record_fallback(record.clone());
            records.push(record);
        }
        Ok(records)
    }

    fn deny(&self, failure: &StageFailure, category: ErrorCategory, reason: &str) {
        report(
            self.sink.as_ref(),
            PipelineEvent::FallbackDenied {
                stage: failure.stage.name().to_string(),
                category,
                reason: reason.to_string(),
            },
        );
    }

    // ── Stages ──────────────────────────────────────────────────────

    fn ingest(&self, ctx: &mut ExecutionContext) -> StageOutcome {
        let target = ctx.target_date();
        let start = ctx.config().history_start(target).ok_or_else(|| {
            let cause = pipeline_error(
                ctx.pipeline_name(),
                StageState::Ingest.name(),
                "history window starts before the earliest representable date",
            );
            stage_failure(ctx, StageState::Ingest, None, cause)
        })?;
        let sources: Vec<String> = ctx.config().data_sources.keys().cloned().collect();

        let mut history = HistoricalData::new(start, target);
        for source in sources {
            let frame = self
                .collaborators
                .ingestion
                .get_data(&source, start, target)
                .map_err(|e| stage_failure(ctx, StageState::Ingest, None, e.into()))?;
            history.insert(source, frame);
        }

        ctx.cache_mut().ingest = Some(IngestOutput { history });
        Ok((ctx.live_products().len(), Vec::new()))
    }

    fn feature(&self, ctx: &mut ExecutionContext) -> StageOutcome {
        let history = match &ctx.cache().ingest {
            Some(output) => output.history.clone(),
            None => return Err(missing_input(ctx, StageState::Feature)),
        };
        let horizon = ctx.config().horizon_hours;

        let mut partition: Partition<Vec<FeatureSet>> = Partition::default();
        for product in live(ctx) {
            let sets: Result<Vec<FeatureSet>, _> = (0..horizon)
                .map(|hour| {
                    self.collaborators
                        .features
                        .create_features(&history, &product, hour)
                })
                .collect();
            match sets {
                Ok(sets) => partition.keep(product, sets),
                Err(e) => partition.skip(stage_failure(
                    ctx,
                    StageState::Feature,
                    Some(&product),
                    e.into(),
                )),
            }
        }

        let kept = partition.kept.len();
        ctx.cache_mut().feature = Some(FeatureOutput {
            history,
            features: partition.kept,
        });
        Ok((kept, partition.skipped))
    }

    fn forecast(&self, ctx: &mut ExecutionContext) -> StageOutcome {
        let Some(FeatureOutput { history, features }) = ctx.cache().feature.clone() else {
            return Err(missing_input(ctx, StageState::Forecast));
        };
        let target = ctx.target_date();

        let mut partition: Partition<DataFrame> = Partition::default();
        for (product, sets) in features {
            match self.predict(&product, &sets, &history, target) {
                Ok(frame) => partition.keep(product, frame),
                Err(e) => partition.skip(stage_failure(
                    ctx,
                    StageState::Forecast,
                    Some(&product),
                    e.into(),
                )),
            }
        }

        let kept = partition.kept.len();
        ctx.cache_mut().forecast = Some(ForecastOutput {
            frames: partition.kept,
        });
        Ok((kept, partition.skipped))
    }

    fn predict(
        &self,
        product: &str,
        features: &[FeatureSet],
        history: &HistoricalData,
        target: NaiveDate,
    ) -> Result<DataFrame, ModelError> {
        self.collaborators
            .engine
            .generate_ensemble(product, features, history, target)?
            .to_dataframe()
    }

    fn validate(&self, ctx: &mut ExecutionContext, validation: &ValidationEngine) -> StageOutcome {
        let frames = match &ctx.cache().forecast {
            Some(output) => output.frames.clone(),
            None => return Err(missing_input(ctx, StageState::Validate)),
        };

        let mut partition: Partition<DataFrame> = Partition::default();
        let mut verdicts: BTreeMap<String, PipelineEvent> = BTreeMap::new();
        for (product, frame) in frames {
            let outcome = validation.validate_product(&frame, &product);
            verdicts.insert(product.clone(), verdict(&product, &outcome.result));
            if outcome.is_valid() {
                partition.keep(product, frame);
                continue;
            }
            let severity = outcome
                .severity
                .unwrap_or_else(|| Severity::for_category(outcome.result.category()));
            let cause = ForecastValidationError {
                product: product.clone(),
                severity,
                result: outcome.result,
            };
            partition.skip(stage_failure(
                ctx,
                StageState::Validate,
                Some(&product),
                cause.into(),
            ));
        }

        // Relationship violations count against both products involved.
        let violations = validation.cross_product_violations(&partition.kept);
        let products: Vec<String> = partition.kept.keys().cloned().collect();
        for product in products {
            let messages: Vec<String> = violations
                .iter()
                .filter(|v| v.involves(&product))
                .map(|v| v.message())
                .collect();
            if messages.is_empty() {
                continue;
            }
            partition.kept.remove(&product);
            let mut errors = ErrorMap::new();
            errors.insert(RELATIONSHIP.to_string(), messages);
            let result = ValidationResult::from_errors(ValidationCategory::Consistency, errors);
            verdicts.insert(product.clone(), verdict(&product, &result));
            let cause = ForecastValidationError {
                product: product.clone(),
                severity: Severity::for_category(ValidationCategory::Consistency),
                result,
            };
            partition.skip(stage_failure(
                ctx,
                StageState::Validate,
                Some(&product),
                cause.into(),
            ));
        }

        for event in verdicts.into_values() {
            report(self.sink.as_ref(), event);
        }

        let kept = partition.kept.len();
        ctx.cache_mut().validate = Some(ValidateOutput {
            frames: partition.kept,
        });
        Ok((kept, partition.skipped))
    }

    fn store(&self, ctx: &mut ExecutionContext) -> StageOutcome {
        let frames = match &ctx.cache().validate {
            Some(output) => output.frames.clone(),
            None => return Err(missing_input(ctx, StageState::Store)),
        };
        let target = ctx.target_date();

        let mut partition: Partition<PathBuf> = Partition::default();
        for (product, frame) in frames {
            match self
                .collaborators
                .storage
                .save_forecast(&frame, target, &product, false)
            {
                Ok(path) => {
                    ctx.record_stored(&product, path.clone());
                    partition.keep(product, path);
                }
                Err(e) => partition.skip(stage_failure(
                    ctx,
                    StageState::Store,
                    Some(&product),
                    e.into(),
                )),
            }
        }

        let kept = partition.kept.len();
        ctx.cache_mut().store = Some(StoreOutput {
            paths: partition.kept,
        });
        Ok((kept, partition.skipped))
    }
}

fn live(ctx: &ExecutionContext) -> Vec<String> {
    ctx.live_products().iter().cloned().collect()
}

fn stage_failure(
    ctx: &ExecutionContext,
    stage: StageState,
    product: Option<&str>,
    cause: ForecastError,
) -> StageFailure {
    StageFailure {
        stage,
        pipeline_name: ctx.pipeline_name().to_string(),
        execution_id: ctx.execution_id().to_string(),
        product: product.map(str::to_string),
        cause,
    }
}

fn verdict(product: &str, result: &ValidationResult) -> PipelineEvent {
    PipelineEvent::ValidationCompleted {
        product: product.to_string(),
        is_valid: result.is_valid(),
        category: result.category(),
        error_count: result.error_count(),
    }
}

fn missing_input(ctx: &ExecutionContext, stage: StageState) -> StageFailure {
    let cause = pipeline_error(ctx.pipeline_name(), stage.name(), "previous stage left no output");
    stage_failure(ctx, stage, None, cause)
}

/// Move a still-working context to FAILURE before surfacing a fatal error.
fn fail(ctx: &mut ExecutionContext, error: RunnerError) -> RunnerError {
    if ctx.state().is_working() {
        if let Err(e) = ctx.transition(StageState::Failure) {
            return e.into();
        }
    }
    error
}
