//! Forecast output contract and DataFrame conversions.
//!
//! A forecast frame is long-format: one row per `(product, hour)` with a
//! point value and a lower/upper band from the ensemble.
//!
//! | column      | dtype            |
//! |-------------|------------------|
//! | `timestamp` | Datetime(ms)     |
//! | `product`   | String           |
//! | `hour`      | Int32            |
//! | `value`     | Float64          |
//! | `lower`     | Float64          |
//! | `upper`     | Float64          |

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TIMESTAMP: &str = "timestamp";
pub const PRODUCT: &str = "product";
pub const HOUR: &str = "hour";
pub const VALUE: &str = "value";
pub const LOWER: &str = "lower";
pub const UPPER: &str = "upper";

/// All contract columns, in frame order.
pub const FORECAST_COLUMNS: [&str; 6] = [TIMESTAMP, PRODUCT, HOUR, VALUE, LOWER, UPPER];

/// One row of a forecast frame.
///
/// Every field is optional because frames read back from storage or handed
/// over by a model may contain nulls; validators decide what that means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub timestamp: Option<NaiveDateTime>,
    pub product: Option<String>,
    pub hour: Option<i32>,
    pub value: Option<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ForecastRecord {
    /// Fully populated record for `hour` of `target_date`.
    pub fn new(
        target_date: NaiveDate,
        product: &str,
        hour: i32,
        value: f64,
        lower: f64,
        upper: f64,
    ) -> Self {
        Self {
            timestamp: Some(hour_timestamp(target_date, hour)),
            product: Some(product.to_string()),
            hour: Some(hour),
            value: Some(value),
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// The point value if it is present and finite.
    pub fn finite_value(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

/// Timestamp of delivery hour `hour` on `date`.
pub fn hour_timestamp(date: NaiveDate, hour: i32) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + TimeDelta::hours(hour as i64)
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has type {actual}, expected {expected}")]
    WrongType {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("shifting '{column}' by {days} day(s) overflows")]
    ShiftOverflow { column: String, days: i64 },

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// Build a contract frame from records.
pub fn records_to_frame(records: &[ForecastRecord]) -> Result<DataFrame, FrameError> {
    let timestamps: Vec<Option<i64>> = records
        .iter()
        .map(|r| r.timestamp.map(|t| t.and_utc().timestamp_millis()))
        .collect();
    let products: Vec<Option<String>> = records.iter().map(|r| r.product.clone()).collect();
    let hours: Vec<Option<i32>> = records.iter().map(|r| r.hour).collect();
    let values: Vec<Option<f64>> = records.iter().map(|r| r.value).collect();
    let lowers: Vec<Option<f64>> = records.iter().map(|r| r.lower).collect();
    let uppers: Vec<Option<f64>> = records.iter().map(|r| r.upper).collect();

    let df = DataFrame::new(vec![
        Column::new(TIMESTAMP.into(), timestamps)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        Column::new(PRODUCT.into(), products),
        Column::new(HOUR.into(), hours),
        Column::new(VALUE.into(), values),
        Column::new(LOWER.into(), lowers),
        Column::new(UPPER.into(), uppers),
    ])?;
    Ok(df)
}

/// Read a frame back into records.
///
/// Lenient on numeric widths (any integer hour, any float value) but strict
/// on column presence and on non-numeric data in numeric columns.
pub fn frame_to_records(df: &DataFrame) -> Result<Vec<ForecastRecord>, FrameError> {
    let timestamps = timestamp_millis(df)?;
    let products = string_column(df, PRODUCT)?;
    let hours = int_column(df, HOUR)?;
    let values = float_column(df, VALUE)?;
    let lowers = float_column(df, LOWER)?;
    let uppers = float_column(df, UPPER)?;

    let records = (0..df.height())
        .map(|i| ForecastRecord {
            timestamp: timestamps[i]
                .and_then(DateTime::from_timestamp_millis)
                .map(|t| t.naive_utc()),
            product: products[i].clone(),
            hour: hours[i],
            value: values[i],
            lower: lowers[i],
            upper: uppers[i],
        })
        .collect();
    Ok(records)
}

/// Shift every timestamp in the frame forward by `days`, keeping its dtype.
///
/// Used when a stored forecast for an earlier day is re-published under a
/// later target date.
pub fn shift_days(df: &DataFrame, days: i64) -> Result<DataFrame, FrameError> {
    let column = required(df, TIMESTAMP)?;
    let dtype = column.dtype().clone();
    let per_day = match &dtype {
        DataType::Datetime(unit, _) => match unit {
            TimeUnit::Milliseconds => 86_400_000_i64,
            TimeUnit::Microseconds => 86_400_000_000,
            TimeUnit::Nanoseconds => 86_400_000_000_000,
        },
        other => return Err(wrong_type(TIMESTAMP, "Datetime", other)),
    };
    let overflow = || FrameError::ShiftOverflow {
        column: TIMESTAMP.to_string(),
        days,
    };
    let offset = days.checked_mul(per_day).ok_or_else(overflow)?;

    let raw = column.cast(&DataType::Int64)?;
    let shifted = raw
        .i64()?
        .into_iter()
        .map(|v| v.map(|t| t.checked_add(offset).ok_or_else(overflow)).transpose())
        .collect::<Result<Vec<Option<i64>>, FrameError>>()?;

    let mut out = df.clone();
    out.with_column(Column::new(TIMESTAMP.into(), shifted).cast(&dtype)?)?;
    Ok(out)
}

fn required<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, FrameError> {
    df.column(name)
        .map_err(|_| FrameError::MissingColumn(name.to_string()))
}

fn wrong_type(column: &str, expected: &str, actual: &DataType) -> FrameError {
    FrameError::WrongType {
        column: column.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn timestamp_millis(df: &DataFrame) -> Result<Vec<Option<i64>>, FrameError> {
    let column = required(df, TIMESTAMP)?;
    let divisor = match column.dtype() {
        DataType::Datetime(TimeUnit::Milliseconds, _) => 1,
        DataType::Datetime(TimeUnit::Microseconds, _) => 1_000,
        DataType::Datetime(TimeUnit::Nanoseconds, _) => 1_000_000,
        other => return Err(wrong_type(TIMESTAMP, "Datetime", other)),
    };
    let raw = column.cast(&DataType::Int64)?;
    let millis = raw
        .i64()?
        .into_iter()
        .map(|v| v.map(|t| t.div_euclid(divisor)))
        .collect();
    Ok(millis)
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, FrameError> {
    let column = required(df, name)?;
    if column.dtype() != &DataType::String {
        return Err(wrong_type(name, "String", column.dtype()));
    }
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i32>>, FrameError> {
    let column = required(df, name)?;
    if !column.dtype().is_integer() {
        return Err(wrong_type(name, "integer", column.dtype()));
    }
    let cast = column.cast(&DataType::Int32)?;
    Ok(cast.i32()?.into_iter().collect())
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, FrameError> {
    let column = required(df, name)?;
    let dtype = column.dtype();
    if !(dtype.is_float() || dtype.is_integer()) {
        return Err(wrong_type(name, "float", dtype));
    }
    let cast = column.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    fn sample() -> Vec<ForecastRecord> {
        vec![
            ForecastRecord::new(date(), "day_ahead_energy", 0, 80.0, 70.0, 95.0),
            ForecastRecord::new(date(), "day_ahead_energy", 1, 75.5, 60.0, 90.0),
        ]
    }

    #[test]
    fn frame_has_contract_columns() {
        let df = records_to_frame(&sample()).unwrap();
        for name in FORECAST_COLUMNS {
            assert!(df.column(name).is_ok(), "missing {name}");
        }
        assert_eq!(df.height(), 2);
        assert!(matches!(
            df.column(TIMESTAMP).unwrap().dtype(),
            DataType::Datetime(TimeUnit::Milliseconds, None)
        ));
    }

    #[test]
    fn records_survive_frame_conversion() {
        let records = sample();
        let df = records_to_frame(&records).unwrap();
        assert_eq!(frame_to_records(&df).unwrap(), records);
    }

    #[test]
    fn nulls_are_preserved() {
        let mut records = sample();
        records[1].value = None;
        let df = records_to_frame(&records).unwrap();
        let back = frame_to_records(&df).unwrap();
        assert_eq!(back[1].value, None);
        assert_eq!(back[1].finite_value(), None);
    }

    #[test]
    fn shift_days_moves_timestamps_only() {
        let df = records_to_frame(&sample()).unwrap();
        let shifted = shift_days(&df, 1).unwrap();
        let back = frame_to_records(&shifted).unwrap();
        let next = date().succ_opt().unwrap();
        assert_eq!(back[0].timestamp, Some(hour_timestamp(next, 0)));
        assert_eq!(back[1].timestamp, Some(hour_timestamp(next, 1)));
        assert_eq!(back[0].value, Some(80.0));
        assert_eq!(back[1].hour, Some(1));
    }

    #[test]
    fn shift_beyond_timestamp_range_is_an_error() {
        let df = records_to_frame(&sample()).unwrap();
        assert!(matches!(
            shift_days(&df, i64::MAX / 1_000),
            Err(FrameError::ShiftOverflow { .. })
        ));
    }

    #[test]
    fn missing_column_is_reported() {
        let df = records_to_frame(&sample()).unwrap().drop(UPPER).unwrap();
        let err = frame_to_records(&df).unwrap_err();
        assert!(matches!(err, FrameError::MissingColumn(ref c) if c == UPPER));
    }

    #[test]
    fn string_values_are_rejected() {
        let df = DataFrame::new(vec![
            Column::new(TIMESTAMP.into(), [0i64])
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .unwrap(),
            Column::new(PRODUCT.into(), ["fcr"]),
            Column::new(HOUR.into(), [0i32]),
            Column::new(VALUE.into(), ["oops"]),
            Column::new(LOWER.into(), [1.0]),
            Column::new(UPPER.into(), [2.0]),
        ])
        .unwrap();
        assert!(matches!(
            frame_to_records(&df).unwrap_err(),
            FrameError::WrongType { .. }
        ));
    }
}
