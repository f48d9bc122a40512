//! Storage port for published forecasts.

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::path::PathBuf;

use crate::error::StorageError;

/// Date + product addressable forecast storage.
///
/// Fresh and fallback forecasts for the same date and product live under
/// distinct keys so a substitute never overwrites a real forecast.
pub trait StorageManager: Send + Sync {
    /// Persist `frame` and return where it was written.
    fn save_forecast(
        &self,
        frame: &DataFrame,
        target_date: NaiveDate,
        product: &str,
        is_fallback: bool,
    ) -> Result<PathBuf, StorageError>;

    /// Stored forecast for a date and product, preferring a fresh one.
    fn get_forecast(&self, target_date: NaiveDate, product: &str)
        -> Result<DataFrame, StorageError>;

    /// Whether any forecast is stored for a date and product.
    fn check_availability(&self, target_date: NaiveDate, product: &str) -> bool;
}
