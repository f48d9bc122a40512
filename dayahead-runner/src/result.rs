//! Serializable outcome of one pipeline execution.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::context::{ExecutionContext, ExecutionStatus, ProductOutcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub per_product: BTreeMap<String, ProductOutcome>,
    pub execution_time_seconds: f64,
    pub pipeline_name: String,
    pub target_date: NaiveDate,
}

impl ExecutionResult {
    pub fn from_context(ctx: &ExecutionContext, elapsed: Duration) -> Self {
        Self {
            execution_id: ctx.execution_id().to_string(),
            status: ctx.status(),
            per_product: ctx.outcomes().clone(),
            execution_time_seconds: elapsed.as_secs_f64(),
            pipeline_name: ctx.pipeline_name().to_string(),
            target_date: ctx.target_date(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Products served from a substitute forecast.
    pub fn fallback_products(&self) -> Vec<&str> {
        self.per_product
            .iter()
            .filter(|(_, o)| o.is_fallback)
            .map(|(p, _)| p.as_str())
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
