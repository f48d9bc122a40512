//! Integration tests for the Parquet store together with schema re-validation.

use chrono::NaiveDate;
use dayahead_core::data::{ParquetStore, StorageManager, StoreOptions};
use dayahead_core::domain::{frame_to_records, records_to_frame, shift_days, ForecastRecord};
use dayahead_core::validation::{SchemaValidator, Validator};
use dayahead_core::StorageOperation;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
}

fn forecast(date: NaiveDate, product: &str) -> polars::prelude::DataFrame {
    let records: Vec<ForecastRecord> = (0..24)
        .map(|h| {
            let v = 40.0 + h as f64;
            ForecastRecord::new(date, product, h, v, v - 5.0, v + 5.0)
        })
        .collect();
    records_to_frame(&records).unwrap()
}

#[test]
fn every_compression_round_trips_a_schema_valid_frame() {
    let schema = SchemaValidator::new(24, ["day_ahead_energy".to_string()]);
    for compression in ["snappy", "zstd", "gzip", "lz4", "uncompressed"] {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions::from_names("parquet", compression).unwrap();
        let store = ParquetStore::with_options(dir.path(), options);

        store
            .save_forecast(&forecast(day(3), "day_ahead_energy"), day(3), "day_ahead_energy", false)
            .unwrap();
        let loaded = store.get_forecast(day(3), "day_ahead_energy").unwrap();

        let result = schema.validate(&loaded);
        assert!(result.is_valid(), "{compression}: {:?}", result.errors());
        assert_eq!(loaded.height(), 24);
    }
}

#[test]
fn redated_fallback_is_stored_under_target_date() {
    let dir = tempfile::tempdir().unwrap();
    let store = ParquetStore::new(dir.path());

    store.save_forecast(&forecast(day(9), "fcr"), day(9), "fcr", false).unwrap();
    let previous = store.get_forecast(day(9), "fcr").unwrap();
    let redated = shift_days(&previous, 1).unwrap();
    let path = store.save_forecast(&redated, day(10), "fcr", true).unwrap();

    assert!(path.to_string_lossy().contains("date=2024-09-10"));
    let stored = frame_to_records(&store.get_forecast(day(10), "fcr").unwrap()).unwrap();
    assert_eq!(stored, frame_to_records(&forecast(day(10), "fcr")).unwrap());
}

#[test]
fn products_and_dates_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let store = ParquetStore::new(dir.path());

    store.save_forecast(&forecast(day(1), "fcr"), day(1), "fcr", false).unwrap();
    store.save_forecast(&forecast(day(1), "afrr"), day(1), "afrr", false).unwrap();

    assert!(store.check_availability(day(1), "fcr"));
    assert!(store.check_availability(day(1), "afrr"));
    assert!(!store.check_availability(day(2), "fcr"));

    let fcr = frame_to_records(&store.get_forecast(day(1), "fcr").unwrap()).unwrap();
    assert!(fcr.iter().all(|r| r.product.as_deref() == Some("fcr")));
}

#[test]
fn truncated_file_becomes_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = ParquetStore::new(dir.path());
    let path = store.save_forecast(&forecast(day(4), "fcr"), day(4), "fcr", false).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() / 3]).unwrap();

    let err = store.get_forecast(day(4), "fcr").unwrap_err();
    assert_eq!(err.operation, StorageOperation::Read);
    assert!(!store.check_availability(day(4), "fcr"));
}
