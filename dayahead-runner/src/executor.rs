//! Single-use entry point for one forecast run.

use chrono::NaiveDate;
use dayahead_core::domain::ExecutionId;
use dayahead_core::error::PipelineError;
use dayahead_core::observability::{report, EventSink, PipelineEvent, TracingSink};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig, DEFAULT_PIPELINE_NAME};
use crate::context::{ExecutionContext, ExecutionStatus};
use crate::result::ExecutionResult;
use crate::stage_runner::{PipelineCollaborators, RunnerError, StageRunner};

/// A fatal error that escaped the stage runner.
#[derive(Debug, Error)]
#[error("pipeline '{pipeline_name}' execution {execution_id} for {target_date} failed: {source}")]
pub struct PipelineExecutionError {
    pub pipeline_name: String,
    pub execution_id: String,
    pub target_date: NaiveDate,
    pub source: RunnerError,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    AlreadyExecuted(PipelineError),

    #[error(transparent)]
    Execution(#[from] PipelineExecutionError),
}

/// Runs the pipeline exactly once.
///
/// Any second `execute()` fails with `AlreadyExecuted`, whatever happened
/// the first time.
pub struct PipelineExecutor {
    collaborators: PipelineCollaborators,
    sink: Arc<dyn EventSink>,
    used: bool,
    context: Option<ExecutionContext>,
}

impl PipelineExecutor {
    pub fn new(collaborators: PipelineCollaborators, sink: Arc<dyn EventSink>) -> Self {
        Self {
            collaborators,
            sink,
            used: false,
            context: None,
        }
    }

    /// Executor that reports events through `tracing`.
    pub fn with_tracing(collaborators: PipelineCollaborators) -> Self {
        Self::new(collaborators, Arc::new(TracingSink))
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Context of the finished execution, if one got past configuration.
    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    pub fn execute(
        &mut self,
        target_date: NaiveDate,
        config: &Value,
    ) -> Result<ExecutionResult, ExecutorError> {
        let pipeline_name = config
            .get("pipeline_name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PIPELINE_NAME)
            .to_string();
        if self.used {
            return Err(ExecutorError::AlreadyExecuted(
                PipelineError::AlreadyExecuted { pipeline_name },
            ));
        }
        self.used = true;
        let started = Instant::now();

        let (typed, merged) = match PipelineConfig::resolve(config) {
            Ok(resolved) => resolved,
            Err(e) => {
                report(
                    self.sink.as_ref(),
                    PipelineEvent::ConfigRejected {
                        pipeline_name,
                        reason: e.to_string(),
                    },
                );
                return Err(e.into());
            }
        };

        let execution_id = ExecutionId::generate();
        let span = tracing::info_span!(
            "execution",
            pipeline = typed.pipeline_name.as_str(),
            execution_id = execution_id.as_str(),
            target_date = %target_date,
        );
        let _enter = span.enter();

        let mut ctx = ExecutionContext::new(execution_id, target_date, typed, merged);
        report(
            self.sink.as_ref(),
            PipelineEvent::ExecutionStarted {
                pipeline_name: ctx.pipeline_name().to_string(),
                execution_id: ctx.execution_id().to_string(),
                target_date,
                products: ctx.config().products.clone(),
            },
        );

        let runner = StageRunner::new(self.collaborators.clone(), self.sink.clone());
        let outcome = runner.run(&mut ctx);

        let result = match outcome {
            Ok(clean) => {
                ctx.complete(if clean {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failure
                });
                let result = ExecutionResult::from_context(&ctx, started.elapsed());
                report(
                    self.sink.as_ref(),
                    PipelineEvent::ExecutionCompleted {
                        execution_id: result.execution_id.clone(),
                        status: result.status.to_string(),
                        fallback_products: ctx.fallbacks().len(),
                        duration: started.elapsed(),
                    },
                );
                Ok(result)
            }
            Err(source) => {
                ctx.complete(ExecutionStatus::Failure);
                let error = PipelineExecutionError {
                    pipeline_name: ctx.pipeline_name().to_string(),
                    execution_id: ctx.execution_id().to_string(),
                    target_date,
                    source,
                };
                report(
                    self.sink.as_ref(),
                    PipelineEvent::ExecutionFailed {
                        execution_id: error.execution_id.clone(),
                        error: error.to_string(),
                    },
                );
                Err(error.into())
            }
        };

        self.context = Some(ctx);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dayahead_core::data::{
        DataIngestion, Ensemble, FeatureEngineering, FeatureSet, ForecastingEngine,
        HistoricalData, ParquetStore,
    };
    use dayahead_core::error::{DataSourceError, FeatureError, ModelError};
    use dayahead_core::observability::MemorySink;
    use polars::prelude::DataFrame;
    use serde_json::json;

    struct Unreachable;

    impl DataIngestion for Unreachable {
        fn get_data(&self, s: &str, _: NaiveDate, _: NaiveDate) -> Result<DataFrame, DataSourceError> {
            Err(DataSourceError::new(s, "unreachable"))
        }
    }

    impl FeatureEngineering for Unreachable {
        fn create_features(
            &self,
            _: &HistoricalData,
            _: &str,
            _: u32,
        ) -> Result<FeatureSet, FeatureError> {
            Err(FeatureError::new("none", "unreachable"))
        }
    }

    impl ForecastingEngine for Unreachable {
        fn generate_ensemble(
            &self,
            product: &str,
            _: &[FeatureSet],
            _: &HistoricalData,
            _: NaiveDate,
        ) -> Result<Box<dyn Ensemble>, ModelError> {
            Err(ModelError::new(product, "unreachable"))
        }
    }

    fn executor(root: &std::path::Path, sink: Arc<MemorySink>) -> PipelineExecutor {
        let collaborators = PipelineCollaborators {
            ingestion: Arc::new(Unreachable),
            features: Arc::new(Unreachable),
            engine: Arc::new(Unreachable),
            storage: Arc::new(ParquetStore::new(root)),
        };
        PipelineExecutor::new(collaborators, sink)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn configuration_failure_runs_no_stage_and_consumes_executor() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut exec = executor(dir.path(), sink.clone());

        let err = exec.execute(date(), &json!({ "products": ["fcr"] })).unwrap_err();
        assert!(matches!(err, ExecutorError::Configuration(_)));
        assert!(exec.context().is_none());
        assert!(sink
            .events()
            .iter()
            .all(|e| !matches!(e, PipelineEvent::StageStarted { .. })));

        let again = exec.execute(date(), &json!({})).unwrap_err();
        assert!(matches!(
            again,
            ExecutorError::AlreadyExecuted(PipelineError::AlreadyExecuted { .. })
        ));
    }

    #[test]
    fn fatal_runner_error_is_wrapped_with_execution_identity() {
        let dir = tempfile::tempdir().unwrap();
        let mut exec = executor(dir.path(), Arc::new(MemorySink::new()));
        let config = json!({
            "data_sources": { "prices": {} },
            "products": ["fcr"],
            "fallback": { "enabled": true, "max_search_days": 2 },
            "validation": { "schema": true, "completeness": true, "plausibility": true },
            "storage": { "format": "parquet", "compression": "snappy" },
        });

        match exec.execute(date(), &config).unwrap_err() {
            ExecutorError::Execution(e) => {
                assert_eq!(e.pipeline_name, DEFAULT_PIPELINE_NAME);
                assert_eq!(e.target_date, date());
                assert!(matches!(e.source, RunnerError::Fallback(_)));
                let ctx = exec.context().unwrap();
                assert_eq!(ctx.execution_id().as_str(), e.execution_id);
                assert_eq!(ctx.status(), ExecutionStatus::Failure);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
