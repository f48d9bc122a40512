//! Backward search for a substitute forecast.
//!
//! When a product cannot be produced fresh, walk back one day at a time
//! from the target date, take the first stored forecast that still passes
//! schema validation, re-date it to the target date and store it under the
//! fallback key.

use chrono::{Days, NaiveDate};
use dayahead_core::data::StorageManager;
use dayahead_core::domain::shift_days;
use dayahead_core::error::StorageError;
use dayahead_core::observability::{report, EventSink, PipelineEvent, ProbeOutcome};
use dayahead_core::validation::{SchemaValidator, Validator};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// A substitute forecast that has been written under the target date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub product: String,
    pub source_date: NaiveDate,
    pub target_date: NaiveDate,
    pub storage_path: PathBuf,
    pub is_fallback: bool,
}

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error(
        "no fallback forecast for '{product}' on {target_date} within {max_search_days} day(s)"
    )]
    NoFallbackAvailable {
        product: String,
        target_date: NaiveDate,
        max_search_days: i64,
    },

    #[error("failed to store fallback for '{product}': {cause}")]
    Storage {
        product: String,
        #[source]
        cause: StorageError,
    },
}

pub struct FallbackResolver {
    storage: Arc<dyn StorageManager>,
    schema: SchemaValidator,
    sink: Arc<dyn EventSink>,
}

impl FallbackResolver {
    pub fn new(
        storage: Arc<dyn StorageManager>,
        schema: SchemaValidator,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            storage,
            schema,
            sink,
        }
    }

    /// Find, re-date and store a substitute for `product` on `target_date`.
    ///
    /// Probes `target_date - 1 ..= target_date - max_search_days` in order.
    /// Unreadable or schema-invalid candidates are skipped. Nothing is read
    /// when `max_search_days <= 0`.
    pub fn resolve(
        &self,
        product: &str,
        target_date: NaiveDate,
        max_search_days: i64,
    ) -> Result<FallbackRecord, FallbackError> {
        for day in 1..=max_search_days.max(0) {
            let Some(candidate) = target_date.checked_sub_days(Days::new(day as u64)) else {
                break;
            };

            let outcome = self.probe(product, candidate);
            report(
                self.sink.as_ref(),
                PipelineEvent::FallbackProbe {
                    product: product.to_string(),
                    candidate_date: candidate,
                    outcome: outcome.describe(),
                },
            );
            let Probe::Accepted(frame) = outcome else {
                continue;
            };

            let redated = shift_days(&frame, day).map_err(|e| FallbackError::Storage {
                product: product.to_string(),
                cause: StorageError::write(
                    candidate.to_string(),
                    format!("re-dating failed: {e}"),
                ),
            })?;
            let storage_path = self
                .storage
                .save_forecast(&redated, target_date, product, true)
                .map_err(|cause| FallbackError::Storage {
                    product: product.to_string(),
                    cause,
                })?;

            report(
                self.sink.as_ref(),
                PipelineEvent::FallbackActivated {
                    product: product.to_string(),
                    source_date: candidate,
                    target_date,
                    path: storage_path.display().to_string(),
                },
            );
            return Ok(FallbackRecord {
                product: product.to_string(),
                source_date: candidate,
                target_date,
                storage_path,
                is_fallback: true,
            });
        }

        report(
            self.sink.as_ref(),
            PipelineEvent::FallbackUnavailable {
                product: product.to_string(),
                target_date,
                max_search_days,
            },
        );
        Err(FallbackError::NoFallbackAvailable {
            product: product.to_string(),
            target_date,
            max_search_days,
        })
    }

    fn probe(&self, product: &str, candidate: NaiveDate) -> Probe {
        if !self.storage.check_availability(candidate, product) {
            return Probe::NotStored;
        }
        let frame = match self.storage.get_forecast(candidate, product) {
            Ok(frame) => frame,
            Err(e) => return Probe::Unreadable(e.to_string()),
        };
        let result = self.schema.validate(&frame);
        if result.is_valid() {
            Probe::Accepted(frame)
        } else {
            Probe::SchemaInvalid(result.error_count())
        }
    }
}

enum Probe {
    NotStored,
    Unreadable(String),
    SchemaInvalid(usize),
    Accepted(polars::prelude::DataFrame),
}

impl Probe {
    fn describe(&self) -> ProbeOutcome {
        match self {
            Probe::NotStored => ProbeOutcome::NotStored,
            Probe::Unreadable(e) => ProbeOutcome::Unreadable(e.clone()),
            Probe::SchemaInvalid(n) => ProbeOutcome::SchemaInvalid(*n),
            Probe::Accepted(_) => ProbeOutcome::Accepted,
        }
    }
}
