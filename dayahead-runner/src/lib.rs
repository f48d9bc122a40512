//! dayahead runner: pipeline orchestration on top of `dayahead-core`.
//!
//! - Configuration: defaults, structural validation, deep merge, TOML files
//! - The stage state machine and the stage runner
//! - Failure classification and the fallback decision table
//! - Backward search for substitute forecasts
//! - The single-use pipeline executor and its serializable result

pub mod classifier;
pub mod config;
pub mod context;
pub mod executor;
pub mod fallback;
pub mod result;
pub mod stage_runner;
pub mod stages;

pub use classifier::{CategoryDetails, ErrorClassifier, ErrorDetails};
pub use config::{
    default_config, is_valid_config, load_config_file, merge_configs, validate_config,
    ConfigError, PipelineConfig,
};
pub use context::{ExecutionContext, ExecutionStatus, ProductOutcome};
pub use executor::{ExecutorError, PipelineExecutionError, PipelineExecutor};
pub use fallback::{FallbackError, FallbackRecord, FallbackResolver};
pub use result::ExecutionResult;
pub use stage_runner::{PipelineCollaborators, Partition, RunnerError, StageFailure, StageRunner};
pub use stages::{InvalidTransition, StageState};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
    }

    #[test]
    fn results_are_send_sync() {
        assert_send::<ExecutionResult>();
        assert_sync::<ExecutionResult>();
        assert_send::<FallbackRecord>();
        assert_sync::<FallbackRecord>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<ExecutorError>();
        assert_sync::<ExecutorError>();
        assert_send::<RunnerError>();
        assert_sync::<RunnerError>();
    }

    #[test]
    fn runner_components_are_send_sync() {
        assert_send::<StageRunner>();
        assert_sync::<StageRunner>();
        assert_send::<FallbackResolver>();
        assert_sync::<FallbackResolver>();
        assert_send::<ExecutionContext>();
        assert_send::<PipelineExecutor>();
    }
}
