//! Collaborator traits for the forecast stages.
//!
//! The pipeline only knows these seams: how history is fetched, how features
//! are built, and how a model produces an ensemble. Concrete HTTP clients,
//! feature code and models live outside this crate and are swapped for
//! mocks in tests.

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;

use crate::error::{DataSourceError, FeatureError, ModelError};

/// History fetched during ingest, keyed by data source name.
#[derive(Debug, Clone, Default)]
pub struct HistoricalData {
    pub frames: BTreeMap<String, DataFrame>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl HistoricalData {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            frames: BTreeMap::new(),
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn insert(&mut self, source: impl Into<String>, frame: DataFrame) {
        self.frames.insert(source.into(), frame);
    }

    pub fn frame(&self, source: &str) -> Option<&DataFrame> {
        self.frames.get(source)
    }

    /// Total rows across sources.
    pub fn row_count(&self) -> usize {
        self.frames.values().map(DataFrame::height).sum()
    }
}

/// Named feature values for one product and delivery hour.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub product: String,
    pub hour: u32,
    pub values: BTreeMap<String, f64>,
}

impl FeatureSet {
    pub fn new(product: impl Into<String>, hour: u32) -> Self {
        Self {
            product: product.into(),
            hour,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }
}

/// Fetches raw history from an upstream source.
pub trait DataIngestion: Send + Sync {
    fn get_data(
        &self,
        source: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, DataSourceError>;
}

/// Derives model inputs from history.
pub trait FeatureEngineering: Send + Sync {
    fn create_features(
        &self,
        history: &HistoricalData,
        product: &str,
        hour: u32,
    ) -> Result<FeatureSet, FeatureError>;
}

/// A fitted ensemble that can render itself as a forecast frame.
pub trait Ensemble: Send {
    fn to_dataframe(&self) -> Result<DataFrame, ModelError>;
}

/// Produces an ensemble forecast for one product.
pub trait ForecastingEngine: Send + Sync {
    fn generate_ensemble(
        &self,
        product: &str,
        features: &[FeatureSet],
        history: &HistoricalData,
        target_date: NaiveDate,
    ) -> Result<Box<dyn Ensemble>, ModelError>;
}

/// Ensemble that already holds its output frame.
#[derive(Debug, Clone)]
pub struct FrameEnsemble {
    frame: DataFrame,
}

impl FrameEnsemble {
    pub fn new(frame: DataFrame) -> Self {
        Self { frame }
    }
}

impl Ensemble for FrameEnsemble {
    fn to_dataframe(&self) -> Result<DataFrame, ModelError> {
        Ok(self.frame.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn history_counts_rows_across_sources() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 29).unwrap();
        let mut history = HistoricalData::new(start, end);
        history.insert("prices", df!("x" => [1.0, 2.0, 3.0]).unwrap());
        history.insert("load", df!("y" => [1i32]).unwrap());
        assert_eq!(history.row_count(), 4);
        assert!(history.frame("prices").is_some());
        assert!(history.frame("weather").is_none());
    }

    #[test]
    fn frame_ensemble_returns_its_frame() {
        let df = df!("value" => [1.0, 2.0]).unwrap();
        let ensemble: Box<dyn Ensemble> = Box::new(FrameEnsemble::new(df.clone()));
        assert!(ensemble.to_dataframe().unwrap().equals(&df));
    }

    #[test]
    fn feature_set_builder() {
        let fs = FeatureSet::new("fcr", 3).with("lag_24", 12.5);
        assert_eq!(fs.values.get("lag_24"), Some(&12.5));
        assert_eq!(fs.hour, 3);
    }
}
