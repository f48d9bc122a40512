//! Domain types for dayahead

pub mod forecast;
pub mod ids;
pub mod product;

pub use forecast::{
    frame_to_records, hour_timestamp, records_to_frame, shift_days, ForecastRecord, FrameError,
    FORECAST_COLUMNS,
};
pub use ids::{ExecutionId, FrameHash};
pub use product::{ProductCatalog, ProductKind, ProductName};
