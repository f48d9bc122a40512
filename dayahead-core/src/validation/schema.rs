use polars::prelude::*;
use std::collections::BTreeSet;

use super::result::{ErrorCollector, ValidationCategory, ValidationResult};
use super::Validator;
use crate::domain::forecast::{
    frame_to_records, HOUR, LOWER, PRODUCT, TIMESTAMP, UPPER, VALUE,
};

/// Expected schema for forecast output frames.
pub struct ForecastSchema;

impl ForecastSchema {
    /// Canonical forecast schema (millisecond timestamps).
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new(
                TIMESTAMP.into(),
                DataType::Datetime(TimeUnit::Milliseconds, None),
            ),
            Field::new(PRODUCT.into(), DataType::String),
            Field::new(HOUR.into(), DataType::Int32),
            Field::new(VALUE.into(), DataType::Float64),
            Field::new(LOWER.into(), DataType::Float64),
            Field::new(UPPER.into(), DataType::Float64),
        ])
    }

    /// Datetime columns may use any time unit or zone.
    fn dtype_matches(expected: &DataType, actual: &DataType) -> bool {
        match (expected, actual) {
            (DataType::Datetime(_, _), DataType::Datetime(_, _)) => true,
            _ => expected == actual,
        }
    }
}

/// Structural checks: columns, types, nulls, and value ranges.
///
/// Errors are keyed by column name; `frame` is used for frame-level issues.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    horizon_hours: u32,
    allowed_products: BTreeSet<String>,
}

impl SchemaValidator {
    /// An empty `allowed_products` set accepts any product name.
    pub fn new(horizon_hours: u32, allowed_products: impl IntoIterator<Item = String>) -> Self {
        Self {
            horizon_hours,
            allowed_products: allowed_products.into_iter().collect(),
        }
    }

    fn check_columns(&self, df: &DataFrame, errors: &mut ErrorCollector) -> bool {
        let actual = df.schema();
        let mut structurally_ok = true;

        for field in ForecastSchema::schema().iter_fields() {
            let name = field.name().as_str();
            match actual.get(name) {
                None => {
                    errors.push(name, "missing required column");
                    structurally_ok = false;
                }
                Some(dtype) if !ForecastSchema::dtype_matches(field.dtype(), dtype) => {
                    errors.push(
                        name,
                        format!("expected type {}, got {dtype}", field.dtype()),
                    );
                    structurally_ok = false;
                }
                Some(_) => {
                    if let Ok(column) = df.column(name) {
                        let nulls = column.null_count();
                        if nulls > 0 {
                            errors.push(name, format!("{nulls} null value(s)"));
                        }
                    }
                }
            }
        }

        structurally_ok
    }

    fn check_ranges(&self, df: &DataFrame, errors: &mut ErrorCollector) {
        let records = match frame_to_records(df) {
            Ok(records) => records,
            Err(e) => {
                errors.push("frame", format!("unreadable frame: {e}"));
                return;
            }
        };

        let horizon = self.horizon_hours as i32;
        let mut unknown_products = BTreeSet::new();

        for (row, record) in records.iter().enumerate() {
            if let Some(hour) = record.hour {
                if hour < 0 || hour >= horizon {
                    errors.push(
                        HOUR,
                        format!("row {row}: hour {hour} outside [0, {horizon})"),
                    );
                }
            }
            if let Some(product) = &record.product {
                if !self.allowed_products.is_empty() && !self.allowed_products.contains(product) {
                    unknown_products.insert(product.clone());
                }
            }
            if let (Some(value), Some(lower)) = (record.value, record.lower) {
                if lower > value {
                    errors.push(LOWER, format!("row {row}: lower {lower} above value {value}"));
                }
            }
            if let (Some(value), Some(upper)) = (record.value, record.upper) {
                if upper < value {
                    errors.push(UPPER, format!("row {row}: upper {upper} below value {value}"));
                }
            }
        }

        for product in unknown_products {
            errors.push(PRODUCT, format!("unknown product '{product}'"));
        }
    }
}

impl Validator for SchemaValidator {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Schema
    }

    fn validate(&self, df: &DataFrame) -> ValidationResult {
        let mut errors = ErrorCollector::default();

        if df.height() == 0 {
            errors.push("frame", "frame has no rows");
        }
        if self.check_columns(df, &mut errors) {
            self.check_ranges(df, &mut errors);
        }

        errors.finish(ValidationCategory::Schema)
    }
}
