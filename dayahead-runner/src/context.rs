//! Per-execution state.
//!
//! One [`ExecutionContext`] is created for each `execute()` call and owned
//! by the executor. Stage outputs, timings and per-product outcomes are
//! written through crate-private methods while the run is in progress;
//! afterwards the context is only reachable through `&` accessors.

use chrono::NaiveDate;
use dayahead_core::data::{FeatureSet, HistoricalData};
use dayahead_core::domain::ExecutionId;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::fallback::FallbackRecord;
use crate::stages::{InvalidTransition, StageState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failure,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: StageState,
    pub duration: Duration,
}

/// Where a product's published forecast ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOutcome {
    pub forecast_path: PathBuf,
    pub is_fallback: bool,
    /// Date the forecast was originally produced for.
    pub source_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct IngestOutput {
    pub history: HistoricalData,
}

/// Features per product, with the ingest output carried forward.
#[derive(Debug, Clone)]
pub struct FeatureOutput {
    pub history: HistoricalData,
    pub features: BTreeMap<String, Vec<FeatureSet>>,
}

#[derive(Debug, Clone)]
pub struct ForecastOutput {
    pub frames: BTreeMap<String, DataFrame>,
}

#[derive(Debug, Clone)]
pub struct ValidateOutput {
    pub frames: BTreeMap<String, DataFrame>,
}

#[derive(Debug, Clone)]
pub struct StoreOutput {
    pub paths: BTreeMap<String, PathBuf>,
}

/// Outputs of the stages that have completed so far.
#[derive(Debug, Clone, Default)]
pub struct StageCache {
    pub ingest: Option<IngestOutput>,
    pub feature: Option<FeatureOutput>,
    pub forecast: Option<ForecastOutput>,
    pub validate: Option<ValidateOutput>,
    pub store: Option<StoreOutput>,
}

#[derive(Debug)]
pub struct ExecutionContext {
    execution_id: ExecutionId,
    target_date: NaiveDate,
    config: PipelineConfig,
    merged_config: Value,
    state: StageState,
    status: ExecutionStatus,
    timings: Vec<StageTiming>,
    live: BTreeSet<String>,
    outcomes: BTreeMap<String, ProductOutcome>,
    fallbacks: Vec<FallbackRecord>,
    cache: StageCache,
}

impl ExecutionContext {
    pub fn new(
        execution_id: ExecutionId,
        target_date: NaiveDate,
        config: PipelineConfig,
        merged_config: Value,
    ) -> Self {
        let live = config.products.iter().cloned().collect();
        Self {
            execution_id,
            target_date,
            config,
            merged_config,
            state: StageState::Ingest,
            status: ExecutionStatus::Pending,
            timings: Vec::new(),
            live,
            outcomes: BTreeMap::new(),
            fallbacks: Vec::new(),
            cache: StageCache::default(),
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    pub fn pipeline_name(&self) -> &str {
        &self.config.pipeline_name
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The caller's config merged over the defaults.
    pub fn merged_config(&self) -> &Value {
        &self.merged_config
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    /// Products still progressing through the stages.
    pub fn live_products(&self) -> &BTreeSet<String> {
        &self.live
    }

    pub fn outcomes(&self) -> &BTreeMap<String, ProductOutcome> {
        &self.outcomes
    }

    pub fn fallbacks(&self) -> &[FallbackRecord] {
        &self.fallbacks
    }

    pub fn used_fallback(&self) -> bool {
        !self.fallbacks.is_empty()
    }

    pub fn cache(&self) -> &StageCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut StageCache {
        &mut self.cache
    }

    pub(crate) fn transition(&mut self, to: StageState) -> Result<(), InvalidTransition> {
        self.state = self.state.transition(to)?;
        Ok(())
    }

    pub(crate) fn record_timing(&mut self, stage: StageState, duration: Duration) {
        self.timings.push(StageTiming { stage, duration });
    }

    /// A fresh forecast was stored for `product`.
    pub(crate) fn record_stored(&mut self, product: &str, path: PathBuf) {
        self.live.remove(product);
        self.outcomes.insert(
            product.to_string(),
            ProductOutcome {
                forecast_path: path,
                is_fallback: false,
                source_date: self.target_date,
            },
        );
    }

    /// `record.product` is now served from a substitute.
    pub(crate) fn record_fallback(&mut self, record: FallbackRecord) {
        self.live.remove(&record.product);
        self.outcomes.insert(
            record.product.clone(),
            ProductOutcome {
                forecast_path: record.storage_path.clone(),
                is_fallback: true,
                source_date: record.source_date,
            },
        );
        self.fallbacks.push(record);
    }

    pub(crate) fn complete(&mut self, status: ExecutionStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ExecutionContext {
        let caller = json!({
            "data_sources": {},
            "products": ["day_ahead_energy", "fcr"],
            "fallback": { "enabled": true, "max_search_days": 2 },
            "validation": { "schema": true, "completeness": true, "plausibility": true },
            "storage": { "format": "parquet", "compression": "snappy" },
        });
        let (config, merged) = PipelineConfig::resolve(&caller).unwrap();
        ExecutionContext::new(
            ExecutionId::from_raw("test"),
            NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
            config,
            merged,
        )
    }

    #[test]
    fn starts_pending_at_ingest_with_all_products_live() {
        let ctx = context();
        assert_eq!(ctx.state(), StageState::Ingest);
        assert_eq!(ctx.status(), ExecutionStatus::Pending);
        assert_eq!(ctx.live_products().len(), 2);
        assert!(!ctx.used_fallback());
    }

    #[test]
    fn fallback_outcome_replaces_live_entry() {
        let mut ctx = context();
        let record = FallbackRecord {
            product: "fcr".into(),
            source_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            target_date: ctx.target_date(),
            storage_path: PathBuf::from("/x/fallback.parquet"),
            is_fallback: true,
        };
        ctx.record_fallback(record);
        ctx.record_stored("day_ahead_energy", PathBuf::from("/x/forecast.parquet"));

        assert!(ctx.live_products().is_empty());
        assert!(ctx.outcomes()["fcr"].is_fallback);
        assert!(!ctx.outcomes()["day_ahead_energy"].is_fallback);
        assert_eq!(ctx.outcomes()["day_ahead_energy"].source_date, ctx.target_date());
        assert!(ctx.used_fallback());
    }

    #[test]
    fn illegal_transition_leaves_state_unchanged() {
        let mut ctx = context();
        assert!(ctx.transition(StageState::Store).is_err());
        assert_eq!(ctx.state(), StageState::Ingest);
    }

    #[test]
    fn status_serialises_lowercase() {
        assert_eq!(serde_json::to_value(ExecutionStatus::Success).unwrap(), json!("success"));
    }
}
