//! Completeness: every required product must be present for every hour.
//!
//! Gaps are reported in exactly three buckets:
//! - `missing_products`: a product absent for every hour
//! - `missing_timestamps`: an hour absent for every present product
//! - `partial_missing`: a present product missing some (not all) hours,
//!   not counting hours already reported under `missing_timestamps`
//!
//! A product that is missing entirely only ever shows up in
//! `missing_products`.

use polars::prelude::DataFrame;
use std::collections::{BTreeMap, BTreeSet};

use super::result::{ErrorCollector, ValidationCategory, ValidationResult};
use super::Validator;
use crate::domain::forecast::frame_to_records;

pub const MISSING_PRODUCTS: &str = "missing_products";
pub const MISSING_TIMESTAMPS: &str = "missing_timestamps";
pub const PARTIAL_MISSING: &str = "partial_missing";

/// Gaps found in a frame, before rendering to messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageGaps {
    pub missing_products: Vec<String>,
    pub missing_hours: Vec<i32>,
    pub partial: BTreeMap<String, Vec<i32>>,
}

impl CoverageGaps {
    pub fn is_complete(&self) -> bool {
        self.missing_products.is_empty() && self.missing_hours.is_empty() && self.partial.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CompletenessValidator {
    required_products: Vec<String>,
    horizon_hours: u32,
}

impl CompletenessValidator {
    pub fn new(required_products: impl IntoIterator<Item = String>, horizon_hours: u32) -> Self {
        let mut required_products: Vec<String> = required_products.into_iter().collect();
        required_products.sort();
        required_products.dedup();
        Self {
            required_products,
            horizon_hours,
        }
    }

    /// Diff the present `(product, hour)` pairs against the expected grid.
    pub fn gaps(&self, present: &BTreeSet<(String, i32)>) -> CoverageGaps {
        let hours: Vec<i32> = (0..self.horizon_hours as i32).collect();

        let mut hours_by_product: BTreeMap<&str, BTreeSet<i32>> = BTreeMap::new();
        for product in &self.required_products {
            let seen: BTreeSet<i32> = hours
                .iter()
                .copied()
                .filter(|h| present.contains(&(product.clone(), *h)))
                .collect();
            hours_by_product.insert(product.as_str(), seen);
        }

        let missing_products: Vec<String> = hours_by_product
            .iter()
            .filter(|(_, seen)| seen.is_empty())
            .map(|(p, _)| p.to_string())
            .collect();

        let present_products: Vec<(&str, &BTreeSet<i32>)> = hours_by_product
            .iter()
            .filter(|(_, seen)| !seen.is_empty())
            .map(|(p, seen)| (*p, seen))
            .collect();

        // With no product present every gap is already a missing product.
        let missing_hours: Vec<i32> = if present_products.is_empty() {
            Vec::new()
        } else {
            hours
                .iter()
                .copied()
                .filter(|h| present_products.iter().all(|(_, seen)| !seen.contains(h)))
                .collect()
        };

        let mut partial = BTreeMap::new();
        for (product, seen) in &present_products {
            let gaps: Vec<i32> = hours
                .iter()
                .copied()
                .filter(|h| !seen.contains(h) && !missing_hours.contains(h))
                .collect();
            if !gaps.is_empty() {
                partial.insert(product.to_string(), gaps);
            }
        }

        CoverageGaps {
            missing_products,
            missing_hours,
            partial,
        }
    }
}

impl Validator for CompletenessValidator {
    fn name(&self) -> &'static str {
        "completeness"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Completeness
    }

    fn validate(&self, df: &DataFrame) -> ValidationResult {
        let mut errors = ErrorCollector::default();

        let records = match frame_to_records(df) {
            Ok(records) => records,
            Err(e) => {
                errors.push("frame", format!("unreadable frame: {e}"));
                return errors.finish(ValidationCategory::Completeness);
            }
        };

        let present: BTreeSet<(String, i32)> = records
            .into_iter()
            .filter_map(|r| Some((r.product?, r.hour?)))
            .collect();

        let gaps = self.gaps(&present);
        for product in gaps.missing_products {
            errors.push(MISSING_PRODUCTS, product);
        }
        for hour in gaps.missing_hours {
            errors.push(MISSING_TIMESTAMPS, format!("hour {hour}"));
        }
        for (product, hours) in gaps.partial {
            let listed: Vec<String> = hours.iter().map(|h| h.to_string()).collect();
            errors.push(
                PARTIAL_MISSING,
                format!("{product}: missing hours [{}]", listed.join(", ")),
            );
        }

        errors.finish(ValidationCategory::Completeness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::{records_to_frame, ForecastRecord};
    use chrono::NaiveDate;

    fn frame(products: &[&str], hours: impl Fn(&str) -> Vec<i32>) -> DataFrame {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let records: Vec<ForecastRecord> = products
            .iter()
            .flat_map(|p| {
                hours(*p)
                    .into_iter()
                    .map(|h| ForecastRecord::new(date, p, h, 50.0, 40.0, 60.0))
                    .collect::<Vec<_>>()
            })
            .collect();
        records_to_frame(&records).unwrap()
    }

    fn validator() -> CompletenessValidator {
        CompletenessValidator::new(
            ["day_ahead_energy".to_string(), "fcr".into(), "afrr".into()],
            4,
        )
    }

    #[test]
    fn full_grid_is_complete() {
        let df = frame(&["day_ahead_energy", "fcr", "afrr"], |_| (0..4).collect());
        assert!(validator().validate(&df).is_valid());
    }

    #[test]
    fn absent_product_is_missing_product_only() {
        let df = frame(&["day_ahead_energy", "afrr"], |_| (0..4).collect());
        let result = validator().validate(&df);
        assert!(!result.is_valid());
        assert_eq!(result.messages(MISSING_PRODUCTS), ["fcr".to_string()]);
        assert!(result.messages(PARTIAL_MISSING).is_empty());
        assert!(result.messages(MISSING_TIMESTAMPS).is_empty());
    }

    #[test]
    fn hour_absent_everywhere_is_missing_timestamp() {
        let df = frame(&["day_ahead_energy", "fcr", "afrr"], |_| vec![0, 1, 3]);
        let result = validator().validate(&df);
        assert_eq!(result.messages(MISSING_TIMESTAMPS), ["hour 2".to_string()]);
        assert!(result.messages(PARTIAL_MISSING).is_empty());
    }

    #[test]
    fn product_with_some_hours_is_partial() {
        let df = frame(&["day_ahead_energy", "fcr", "afrr"], |p| {
            if p == "fcr" {
                vec![0, 1]
            } else {
                (0..4).collect()
            }
        });
        let result = validator().validate(&df);
        assert_eq!(
            result.messages(PARTIAL_MISSING),
            ["fcr: missing hours [2, 3]".to_string()]
        );
        assert!(result.messages(MISSING_PRODUCTS).is_empty());
    }

    #[test]
    fn single_required_product_missing_entirely() {
        let v = CompletenessValidator::new(["fcr".to_string()], 24);
        let df = frame(&["afrr"], |_| (0..24).collect());
        let result = v.validate(&df);
        assert_eq!(result.messages(MISSING_PRODUCTS), ["fcr".to_string()]);
        assert!(result.messages(MISSING_TIMESTAMPS).is_empty());
        assert!(result.messages(PARTIAL_MISSING).is_empty());
    }

    #[test]
    fn extra_products_do_not_count_as_gaps() {
        let v = CompletenessValidator::new(["fcr".to_string()], 2);
        let df = frame(&["fcr", "afrr"], |_| vec![0, 1]);
        assert!(v.validate(&df).is_valid());
    }
}
