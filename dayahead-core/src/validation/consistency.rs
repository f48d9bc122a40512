//! Consistency: cross-product relationships and temporal smoothness.

use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;

use super::result::{ErrorCollector, ValidationCategory, ValidationResult};
use super::settings::{Relation, Relationship};
use super::Validator;
use crate::domain::forecast::{frame_to_records, ForecastRecord};

pub const RELATIONSHIP: &str = "relationship";
pub const SMOOTHNESS: &str = "smoothness";

/// A relationship that failed at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipViolation {
    pub timestamp: NaiveDateTime,
    pub left: String,
    pub relation: Relation,
    pub right: String,
    pub left_value: Option<f64>,
    pub right_value: Option<f64>,
}

impl RelationshipViolation {
    pub fn message(&self) -> String {
        format!(
            "{}: {}={} must be {} {}={}",
            self.timestamp,
            self.left,
            fmt_operand(self.left_value),
            self.relation,
            self.right,
            fmt_operand(self.right_value),
        )
    }

    pub fn involves(&self, product: &str) -> bool {
        self.left == product || self.right == product
    }
}

fn fmt_operand(v: Option<f64>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "null".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct ConsistencyValidator {
    relationships: Vec<Relationship>,
    smoothness_threshold: f64,
}

impl ConsistencyValidator {
    pub fn new(relationships: Vec<Relationship>, smoothness_threshold: f64) -> Self {
        Self {
            relationships,
            smoothness_threshold,
        }
    }

    /// Check every configured relationship at the timestamps both products share.
    ///
    /// Relationships whose products are not both in the records are skipped.
    pub fn relationship_violations(&self, records: &[ForecastRecord]) -> Vec<RelationshipViolation> {
        let series = series_by_product(records);
        let mut violations = Vec::new();

        for rel in &self.relationships {
            let (Some(left), Some(right)) = (series.get(rel.left.as_str()), series.get(rel.right.as_str()))
            else {
                continue;
            };
            for (ts, left_value) in left {
                let Some(right_value) = right.get(ts) else {
                    continue;
                };
                let holds = match (left_value, right_value) {
                    (Some(l), Some(r)) => rel.relation.holds(*l, *r),
                    _ => false,
                };
                if !holds {
                    violations.push(RelationshipViolation {
                        timestamp: *ts,
                        left: rel.left.clone(),
                        relation: rel.relation,
                        right: rel.right.clone(),
                        left_value: *left_value,
                        right_value: *right_value,
                    });
                }
            }
        }

        violations
    }

    /// Hour-over-hour relative jumps above the threshold.
    ///
    /// A previous value of exactly zero is skipped, as are non-finite operands.
    pub fn smoothness_violations(&self, records: &[ForecastRecord]) -> Vec<String> {
        let mut messages = Vec::new();
        for (product, points) in series_by_product(records) {
            let ordered: Vec<(&NaiveDateTime, &Option<f64>)> = points.iter().collect();
            for pair in ordered.windows(2) {
                let (_, prev) = pair[0];
                let (ts, cur) = pair[1];
                let (Some(prev), Some(cur)) = (prev, cur) else {
                    continue;
                };
                if !prev.is_finite() || !cur.is_finite() || *prev == 0.0 {
                    continue;
                }
                let change = (cur - prev).abs() / prev.abs();
                if change > self.smoothness_threshold {
                    messages.push(format!(
                        "{product} {ts}: change of {:.1}% exceeds {:.1}%",
                        change * 100.0,
                        self.smoothness_threshold * 100.0
                    ));
                }
            }
        }
        messages
    }
}

/// product → (timestamp → value), time-ordered. Rows without a product or
/// timestamp cannot be placed and are left to the schema validator.
fn series_by_product(
    records: &[ForecastRecord],
) -> BTreeMap<&str, BTreeMap<NaiveDateTime, Option<f64>>> {
    let mut series: BTreeMap<&str, BTreeMap<NaiveDateTime, Option<f64>>> = BTreeMap::new();
    for record in records {
        if let (Some(product), Some(ts)) = (record.product.as_deref(), record.timestamp) {
            series.entry(product).or_default().insert(ts, record.value);
        }
    }
    series
}

impl Validator for ConsistencyValidator {
    fn name(&self) -> &'static str {
        "consistency"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Consistency
    }

    fn validate(&self, df: &DataFrame) -> ValidationResult {
        let mut errors = ErrorCollector::default();

        let records = match frame_to_records(df) {
            Ok(records) => records,
            Err(e) => {
                errors.push("frame", format!("unreadable frame: {e}"));
                return errors.finish(ValidationCategory::Consistency);
            }
        };

        for violation in self.relationship_violations(&records) {
            errors.push(RELATIONSHIP, violation.message());
        }
        for message in self.smoothness_violations(&records) {
            errors.push(SMOOTHNESS, message);
        }

        errors.finish(ValidationCategory::Consistency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::records_to_frame;
    use crate::validation::settings::DEFAULT_SMOOTHNESS_THRESHOLD;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 5).unwrap()
    }

    fn series(product: &str, values: &[f64]) -> Vec<ForecastRecord> {
        values
            .iter()
            .enumerate()
            .map(|(h, v)| ForecastRecord::new(date(), product, h as i32, *v, *v, *v))
            .collect()
    }

    fn validator() -> ConsistencyValidator {
        ConsistencyValidator::new(
            vec![Relationship::new("day_ahead_energy", Relation::GreaterThan, "fcr")],
            DEFAULT_SMOOTHNESS_THRESHOLD,
        )
    }

    #[test]
    fn relationship_violation_names_both_products() {
        let mut records = series("day_ahead_energy", &[50.0, 10.0]);
        records.extend(series("fcr", &[20.0, 11.0]));
        let result = validator().validate(&records_to_frame(&records).unwrap());

        assert!(!result.is_valid());
        let msgs = result.messages(RELATIONSHIP);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("day_ahead_energy"));
        assert!(msgs[0].contains("fcr"));
    }

    #[test]
    fn nan_operand_fails_relationship() {
        let mut records = series("day_ahead_energy", &[f64::NAN]);
        records.extend(series("fcr", &[1.0]));
        let violations = validator().relationship_violations(&records);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].involves("fcr"));
    }

    #[test]
    fn null_operand_fails_relationship() {
        let mut records = series("day_ahead_energy", &[30.0]);
        let mut fcr = series("fcr", &[1.0]);
        fcr[0].value = None;
        records.extend(fcr);
        assert_eq!(validator().relationship_violations(&records).len(), 1);
    }

    #[test]
    fn missing_partner_product_is_skipped() {
        let records = series("day_ahead_energy", &[30.0, 31.0]);
        assert!(validator().relationship_violations(&records).is_empty());
    }

    #[test]
    fn fifty_percent_jump_is_flagged() {
        let records = series("fcr", &[10.0, 15.0]);
        let result = validator().validate(&records_to_frame(&records).unwrap());
        assert_eq!(result.messages(SMOOTHNESS).len(), 1);
        assert!(result.messages(SMOOTHNESS)[0].contains("50.0%"));
    }

    #[test]
    fn small_moves_pass() {
        let records = series("fcr", &[10.0, 12.0, 14.0, 13.0]);
        assert!(validator().smoothness_violations(&records).is_empty());
    }

    #[test]
    fn zero_previous_value_never_flags() {
        let records = series("day_ahead_energy", &[0.0, 500.0]);
        assert!(validator().smoothness_violations(&records).is_empty());
    }

    #[test]
    fn series_is_time_ordered_before_differencing() {
        let mut records = series("fcr", &[10.0, 10.5, 11.0]);
        records.reverse();
        assert!(validator().smoothness_violations(&records).is_empty());
    }
}
