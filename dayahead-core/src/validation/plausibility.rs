//! Plausibility: static per-product bounds plus a z-score outlier check.

use polars::prelude::DataFrame;
use std::collections::BTreeMap;

use super::result::{ErrorCollector, ValidationCategory, ValidationResult};
use super::settings::{Bounds, ValidationSettings, ZScoreThresholds, MIN_STD};
use super::Validator;
use crate::domain::forecast::{frame_to_records, ForecastRecord};
use crate::domain::ProductCatalog;

pub const OUT_OF_RANGE: &str = "out_of_range";
pub const OUTLIERS: &str = "outliers";

#[derive(Debug, Clone)]
pub struct PlausibilityValidator {
    catalog: ProductCatalog,
    bounds: BTreeMap<String, Bounds>,
    z_score: ZScoreThresholds,
}

impl PlausibilityValidator {
    pub fn new(
        catalog: ProductCatalog,
        bounds: BTreeMap<String, Bounds>,
        z_score: ZScoreThresholds,
    ) -> Self {
        Self {
            catalog,
            bounds,
            z_score,
        }
    }

    pub fn from_settings(settings: &ValidationSettings) -> Self {
        Self::new(
            settings.catalog.clone(),
            settings.bounds.clone(),
            settings.z_score,
        )
    }

    /// Configured bounds, or the product kind's defaults.
    pub fn bounds_for(&self, product: &str) -> Bounds {
        self.bounds
            .get(product)
            .copied()
            .unwrap_or_else(|| Bounds::for_kind(self.catalog.kind_of(product)))
    }

    pub fn z_threshold_for(&self, product: &str) -> f64 {
        self.z_score.for_kind(self.catalog.kind_of(product))
    }

    fn check_product(&self, product: &str, rows: &[&ForecastRecord], errors: &mut ErrorCollector) {
        let bounds = self.bounds_for(product);

        let mut finite: Vec<(Option<i32>, f64)> = Vec::with_capacity(rows.len());
        for row in rows {
            match row.finite_value() {
                Some(v) if bounds.contains(v) => finite.push((row.hour, v)),
                Some(v) => {
                    errors.push(
                        OUT_OF_RANGE,
                        format!(
                            "{product} {}: value {v} outside [{}, {}]",
                            hour_label(row.hour),
                            bounds.min,
                            bounds.max
                        ),
                    );
                    finite.push((row.hour, v));
                }
                None => errors.push(
                    OUT_OF_RANGE,
                    format!("{product} {}: value is null or NaN", hour_label(row.hour)),
                ),
            }
        }

        let threshold = self.z_threshold_for(product);
        let values: Vec<f64> = finite.iter().map(|(_, v)| *v).collect();
        for idx in z_score_outliers(&values, threshold) {
            let (hour, v) = finite[idx];
            errors.push(
                OUTLIERS,
                format!(
                    "{product} {}: value {v} is more than {threshold} std from the mean",
                    hour_label(hour)
                ),
            );
        }
    }
}

fn hour_label(hour: Option<i32>) -> String {
    match hour {
        Some(h) => format!("hour {h}"),
        None => "hour ?".to_string(),
    }
}

/// Indices whose `|v - mean| / std` exceeds `threshold` (sample std).
///
/// Returns nothing for fewer than two values or a near-constant series.
pub fn z_score_outliers(values: &[f64], threshold: f64) -> Vec<usize> {
    if values.len() < 2 {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std < MIN_STD {
        return Vec::new();
    }
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| ((**v - mean) / std).abs() > threshold)
        .map(|(i, _)| i)
        .collect()
}

impl Validator for PlausibilityValidator {
    fn name(&self) -> &'static str {
        "plausibility"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Plausibility
    }

    fn validate(&self, df: &DataFrame) -> ValidationResult {
        let mut errors = ErrorCollector::default();

        let records = match frame_to_records(df) {
            Ok(records) => records,
            Err(e) => {
                errors.push("frame", format!("unreadable frame: {e}"));
                return errors.finish(ValidationCategory::Plausibility);
            }
        };

        let mut by_product: BTreeMap<&str, Vec<&ForecastRecord>> = BTreeMap::new();
        for record in &records {
            if let Some(product) = record.product.as_deref() {
                by_product.entry(product).or_default().push(record);
            }
        }

        for (product, rows) in &by_product {
            self.check_product(product, rows, &mut errors);
        }

        errors.finish(ValidationCategory::Plausibility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::records_to_frame;
    use crate::domain::ProductKind;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    fn validator() -> PlausibilityValidator {
        let mut bounds = BTreeMap::new();
        bounds.insert("fcr".to_string(), Bounds::new(0.0, 100.0));
        PlausibilityValidator::new(ProductCatalog::new(), bounds, ZScoreThresholds::default())
    }

    fn frame(product: &str, values: &[Option<f64>]) -> DataFrame {
        let records: Vec<ForecastRecord> = values
            .iter()
            .enumerate()
            .map(|(h, v)| {
                let mut r = ForecastRecord::new(date(), product, h as i32, 0.0, 0.0, 0.0);
                r.value = *v;
                r
            })
            .collect();
        records_to_frame(&records).unwrap()
    }

    #[test]
    fn configured_bounds_override_kind_defaults() {
        let mut settings = ValidationSettings::for_products(&["fcr"]);
        let defaults = PlausibilityValidator::from_settings(&settings);
        assert_eq!(defaults.bounds_for("fcr"), Bounds::for_kind(ProductKind::Ancillary));
        assert_eq!(defaults.z_threshold_for("fcr"), 5.0);

        settings.bounds.insert("fcr".into(), Bounds::new(1.0, 2.0));
        let configured = PlausibilityValidator::from_settings(&settings);
        assert_eq!(configured.bounds_for("fcr"), Bounds::new(1.0, 2.0));
    }

    #[test]
    fn values_at_the_bounds_are_in_range() {
        let df = frame("fcr", &[Some(0.0), Some(100.0), Some(50.0)]);
        let result = validator().validate(&df);
        assert!(result.is_valid(), "{:?}", result.errors());
    }

    #[test]
    fn values_outside_bounds_are_flagged() {
        let df = frame("fcr", &[Some(-0.01), Some(100.5), Some(50.0)]);
        let result = validator().validate(&df);
        assert_eq!(result.messages(OUT_OF_RANGE).len(), 2);
    }

    #[test]
    fn null_and_nan_are_always_out_of_range() {
        let df = frame("fcr", &[Some(10.0), None, Some(f64::NAN)]);
        let result = validator().validate(&df);
        assert!(!result.is_valid());
        assert_eq!(result.messages(OUT_OF_RANGE).len(), 2);
        assert!(result.messages(OUT_OF_RANGE)[0].contains("null or NaN"));
    }

    #[test]
    fn energy_allows_negative_prices_by_default() {
        let df = frame("day_ahead_energy", &[Some(-150.0), Some(40.0), Some(60.0)]);
        assert!(validator().validate(&df).is_valid());
    }

    #[test]
    fn ancillary_rejects_negative_prices_by_default() {
        let df = frame("afrr", &[Some(-1.0), Some(40.0)]);
        let result = validator().validate(&df);
        assert_eq!(result.messages(OUT_OF_RANGE).len(), 1);
    }

    #[test]
    fn spike_is_flagged_as_outlier() {
        let mut values = vec![Some(20.0); 199];
        for (i, v) in values.iter_mut().enumerate() {
            *v = Some(20.0 + (i % 5) as f64);
        }
        values.push(Some(5000.0));
        let df = frame("afrr", &values);
        let result = validator().validate(&df);
        assert_eq!(result.messages(OUTLIERS).len(), 1);
        assert!(result.messages(OUTLIERS)[0].contains("hour 199"));
    }

    #[test]
    fn constant_series_skips_outlier_detection() {
        assert!(z_score_outliers(&[7.0; 50], 5.0).is_empty());
        assert!(z_score_outliers(&[7.0], 5.0).is_empty());
    }
}
