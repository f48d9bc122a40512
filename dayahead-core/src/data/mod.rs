//! Collaborator ports and forecast storage

pub mod parquet_store;
pub mod provider;
pub mod store;

pub use parquet_store::{
    read_frame, Compression, ForecastMeta, ParquetStore, StorageFormat, StoreConfigError,
    StoreOptions, StoreStatus,
};
pub use provider::{
    DataIngestion, Ensemble, FeatureEngineering, FeatureSet, ForecastingEngine, FrameEnsemble,
    HistoricalData,
};
pub use store::StorageManager;
