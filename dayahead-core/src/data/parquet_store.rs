//! Parquet forecast store with Hive-style partitioning.
//!
//! Layout: `{root}/date={YYYY-MM-DD}/product={P}/{forecast|fallback}.parquet`
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Metadata sidecar per file (`{stem}.meta.json`: rows, BLAKE3 hash)
//! - Quarantine for files that fail to decode (`{filename}.quarantined`)

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use super::store::StorageManager;
use crate::domain::FrameHash;
use crate::error::StorageError;

const FRESH_STEM: &str = "forecast";
const FALLBACK_STEM: &str = "fallback";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreConfigError {
    #[error("unsupported storage format '{0}' (supported: parquet)")]
    UnsupportedFormat(String),

    #[error("unsupported compression '{0}' (supported: snappy, zstd, gzip, lz4, uncompressed)")]
    UnsupportedCompression(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    Parquet,
}

impl FromStr for StorageFormat {
    type Err = StoreConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" => Ok(StorageFormat::Parquet),
            _ => Err(StoreConfigError::UnsupportedFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Snappy,
    Zstd,
    Gzip,
    Lz4,
    Uncompressed,
}

impl Compression {
    fn to_parquet(self) -> ParquetCompression {
        match self {
            Compression::Snappy => ParquetCompression::Snappy,
            Compression::Zstd => ParquetCompression::Zstd(None),
            Compression::Gzip => ParquetCompression::Gzip(None),
            Compression::Lz4 => ParquetCompression::Lz4Raw,
            Compression::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

impl FromStr for Compression {
    type Err = StoreConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snappy" => Ok(Compression::Snappy),
            "zstd" => Ok(Compression::Zstd),
            "gzip" => Ok(Compression::Gzip),
            "lz4" => Ok(Compression::Lz4),
            "uncompressed" | "none" => Ok(Compression::Uncompressed),
            _ => Err(StoreConfigError::UnsupportedCompression(s.to_string())),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Compression::Snappy => "snappy",
            Compression::Zstd => "zstd",
            Compression::Gzip => "gzip",
            Compression::Lz4 => "lz4",
            Compression::Uncompressed => "uncompressed",
        };
        write!(f, "{s}")
    }
}

/// How forecasts are encoded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    pub format: StorageFormat,
    pub compression: Compression,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            format: StorageFormat::Parquet,
            compression: Compression::Snappy,
        }
    }
}

impl StoreOptions {
    /// Parse the `storage.format` / `storage.compression` config strings.
    pub fn from_names(format: &str, compression: &str) -> Result<Self, StoreConfigError> {
        Ok(Self {
            format: format.parse()?,
            compression: compression.parse()?,
        })
    }
}

/// Metadata sidecar for one stored forecast file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMeta {
    pub product: String,
    pub target_date: NaiveDate,
    pub is_fallback: bool,
    pub row_count: usize,
    pub data_hash: FrameHash,
    pub written_at: chrono::NaiveDateTime,
}

/// What is stored for one product on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub product: String,
    pub fresh: bool,
    pub fallback: bool,
    pub row_count: Option<usize>,
}

/// The Parquet store.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
    options: StoreOptions,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, StoreOptions::default())
    }

    pub fn with_options(root: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// `{root}/date={YYYY-MM-DD}/product={P}/`
    fn product_dir(&self, target_date: NaiveDate, product: &str) -> PathBuf {
        self.root
            .join(format!("date={}", target_date.format("%Y-%m-%d")))
            .join(format!("product={product}"))
    }

    /// Path of the fresh or fallback file for a date and product.
    pub fn forecast_path(
        &self,
        target_date: NaiveDate,
        product: &str,
        is_fallback: bool,
    ) -> PathBuf {
        let stem = if is_fallback { FALLBACK_STEM } else { FRESH_STEM };
        self.product_dir(target_date, product)
            .join(format!("{stem}.parquet"))
    }

    fn meta_path(data_path: &Path) -> PathBuf {
        data_path.with_extension("meta.json")
    }

    /// Sidecar metadata, if the file and its sidecar exist.
    pub fn get_meta(
        &self,
        target_date: NaiveDate,
        product: &str,
        is_fallback: bool,
    ) -> Option<ForecastMeta> {
        let path = Self::meta_path(&self.forecast_path(target_date, product, is_fallback));
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Stored state for each product on `target_date`.
    pub fn status(&self, target_date: NaiveDate, products: &[&str]) -> Vec<StoreStatus> {
        products
            .iter()
            .map(|product| {
                let fresh = self.forecast_path(target_date, product, false).exists();
                let fallback = self.forecast_path(target_date, product, true).exists();
                let meta = self
                    .get_meta(target_date, product, false)
                    .or_else(|| self.get_meta(target_date, product, true));
                StoreStatus {
                    product: product.to_string(),
                    fresh,
                    fallback,
                    row_count: meta.map(|m| m.row_count),
                }
            })
            .collect()
    }
}

impl StorageManager for ParquetStore {
    fn save_forecast(
        &self,
        frame: &DataFrame,
        target_date: NaiveDate,
        product: &str,
        is_fallback: bool,
    ) -> Result<PathBuf, StorageError> {
        let path = self.forecast_path(target_date, product, is_fallback);
        let path_str = path.display().to_string();

        let dir = self.product_dir(target_date, product);
        fs::create_dir_all(&dir)
            .map_err(|e| StorageError::write(&path_str, format!("failed to create dir: {e}")))?;

        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(frame, &tmp_path, self.options.compression)
            .map_err(|e| StorageError::write(&path_str, e))?;

        let bytes = fs::read(&tmp_path)
            .map_err(|e| StorageError::write(&path_str, format!("hash read: {e}")))?;
        let data_hash = FrameHash::of_bytes(&bytes);

        // Atomic rename
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StorageError::write(&path_str, format!("atomic rename failed: {e}"))
        })?;

        let meta = ForecastMeta {
            product: product.to_string(),
            target_date,
            is_fallback,
            row_count: frame.height(),
            data_hash,
            written_at: chrono::Utc::now().naive_utc(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StorageError::write(&path_str, format!("meta serialization: {e}")))?;
        fs::write(Self::meta_path(&path), meta_json)
            .map_err(|e| StorageError::write(&path_str, format!("meta write: {e}")))?;

        tracing::debug!(
            product,
            %target_date,
            is_fallback,
            rows = meta.row_count,
            path = %path_str,
            "forecast stored"
        );
        Ok(path)
    }

    fn get_forecast(
        &self,
        target_date: NaiveDate,
        product: &str,
    ) -> Result<DataFrame, StorageError> {
        let fresh = self.forecast_path(target_date, product, false);
        if fresh.exists() {
            return read_frame(&fresh);
        }
        let fallback = self.forecast_path(target_date, product, true);
        if !fallback.exists() {
            return Err(StorageError::read(
                fresh.display().to_string(),
                "no forecast stored",
            ));
        }
        read_frame(&fallback)
    }

    fn check_availability(&self, target_date: NaiveDate, product: &str) -> bool {
        self.forecast_path(target_date, product, false).exists()
            || self.forecast_path(target_date, product, true).exists()
    }
}

/// Read a forecast file, quarantining it if it cannot be decoded.
pub fn read_frame(path: &Path) -> Result<DataFrame, StorageError> {
    let path_str = path.display().to_string();
    let file =
        fs::File::open(path).map_err(|e| StorageError::read(&path_str, format!("open: {e}")))?;

    match ParquetReader::new(file).finish() {
        Ok(df) => Ok(df),
        Err(e) => {
            let quarantine = path.with_extension("parquet.quarantined");
            tracing::warn!(path = %path_str, error = %e, "quarantining corrupt forecast file");
            let _ = fs::rename(path, &quarantine);
            Err(StorageError::read(path_str, format!("decode failed: {e}")))
        }
    }
}

fn write_parquet(df: &DataFrame, path: &Path, compression: Compression) -> Result<(), String> {
    let file = fs::File::create(path).map_err(|e| format!("create file: {e}"))?;
    ParquetWriter::new(file)
        .with_compression(compression.to_parquet())
        .finish(&mut df.clone())
        .map_err(|e| format!("write parquet: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::{records_to_frame, ForecastRecord};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()
    }

    fn frame(value: f64) -> DataFrame {
        let records: Vec<ForecastRecord> = (0..24)
            .map(|h| ForecastRecord::new(date(), "fcr", h, value, value - 1.0, value + 1.0))
            .collect();
        records_to_frame(&records).unwrap()
    }

    #[test]
    fn save_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());

        let path = store.save_forecast(&frame(10.0), date(), "fcr", false).unwrap();
        assert!(path.ends_with("date=2024-04-02/product=fcr/forecast.parquet"));

        let loaded = store.get_forecast(date(), "fcr").unwrap();
        assert!(loaded.equals_missing(&frame(10.0)));
        assert!(!path.with_extension("parquet.tmp").exists());
    }

    #[test]
    fn fallback_uses_its_own_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());

        let fallback = store.save_forecast(&frame(1.0), date(), "fcr", true).unwrap();
        assert!(fallback.ends_with("fallback.parquet"));
        assert!(store.check_availability(date(), "fcr"));

        let fresh = store.save_forecast(&frame(2.0), date(), "fcr", false).unwrap();
        assert_ne!(fresh, fallback);
        assert!(fallback.exists());

        // Fresh wins once both exist.
        let loaded = store.get_forecast(date(), "fcr").unwrap();
        assert!(loaded.equals_missing(&frame(2.0)));
    }

    #[test]
    fn missing_forecast_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        assert!(!store.check_availability(date(), "fcr"));
        let err = store.get_forecast(date(), "fcr").unwrap_err();
        assert_eq!(err.operation, crate::error::StorageOperation::Read);
        assert!(err.file_path.ends_with("forecast.parquet"));
    }

    #[test]
    fn fallback_key_is_read_when_no_fresh_forecast() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.save_forecast(&frame(7.0), date(), "fcr", true).unwrap();

        let loaded = store.get_forecast(date(), "fcr").unwrap();
        assert!(loaded.equals_missing(&frame(7.0)));
    }

    #[test]
    fn corrupt_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let path = store.forecast_path(date(), "fcr", false);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not parquet").unwrap();

        let err = store.get_forecast(date(), "fcr").unwrap_err();
        assert!(err.message.contains("decode failed"));
        assert!(!path.exists());
        assert!(path.with_extension("parquet.quarantined").exists());
        assert!(!store.check_availability(date(), "fcr"));
    }

    #[test]
    fn meta_sidecar_records_hash_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::with_options(
            dir.path(),
            StoreOptions::from_names("parquet", "zstd").unwrap(),
        );
        store.save_forecast(&frame(3.0), date(), "fcr", true).unwrap();

        let meta = store.get_meta(date(), "fcr", true).unwrap();
        assert_eq!(meta.row_count, 24);
        assert!(meta.is_fallback);
        assert_eq!(meta.data_hash.0.len(), 64);
        assert!(store.get_meta(date(), "fcr", false).is_none());
    }

    #[test]
    fn status_reports_both_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.save_forecast(&frame(3.0), date(), "fcr", true).unwrap();

        let status = store.status(date(), &["fcr", "afrr"]);
        assert!(!status[0].fresh);
        assert!(status[0].fallback);
        assert_eq!(status[0].row_count, Some(24));
        assert!(!status[1].fresh && !status[1].fallback);
    }

    #[test]
    fn options_reject_unknown_names() {
        assert!(StoreOptions::from_names("csv", "snappy").is_err());
        assert_eq!(
            StoreOptions::from_names("parquet", "brotli").unwrap_err(),
            StoreConfigError::UnsupportedCompression("brotli".into())
        );
        assert_eq!(
            StoreOptions::from_names("Parquet", "LZ4").unwrap().compression,
            Compression::Lz4
        );
    }
}
