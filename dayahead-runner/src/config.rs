//! Pipeline configuration: defaults, deep merge, structural validation.
//!
//! Configuration travels as a `serde_json::Value` tree until it has been
//! validated and merged over [`default_config`]; only then is it turned into
//! a typed [`PipelineConfig`]. Files are TOML and are converted to the same
//! JSON tree on load.

use chrono::NaiveDate;
use dayahead_core::data::{StoreConfigError, StoreOptions};
use dayahead_core::domain::{ProductCatalog, ProductKind};
use dayahead_core::validation::{
    Bounds, Relationship, ValidationSettings, ZScoreThresholds,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PIPELINE_NAME: &str = "day_ahead";
pub const DEFAULT_MAX_SEARCH_DAYS: i64 = 7;
pub const DEFAULT_HISTORY_DAYS: u32 = 28;
pub const DEFAULT_STORAGE_PATH: &str = "data/forecasts";

/// Longest horizon accepted (one week of hourly points).
pub const MAX_HORIZON_HOURS: u64 = 168;

/// Longest history window accepted (ten years).
pub const MAX_HISTORY_DAYS: u64 = 3660;

/// Sections every caller-supplied config must contain.
pub const REQUIRED_SECTIONS: [&str; 5] =
    ["data_sources", "products", "fallback", "validation", "storage"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration must be a table/object")]
    NotAnObject,

    #[error("missing required section '{0}'")]
    MissingSection(String),

    #[error("invalid '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StoreConfigError),

    #[error("{} configuration errors: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<ConfigError>),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("merged configuration is not usable: {0}")]
    Deserialize(String),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidField {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Built-in defaults every caller config is merged over.
pub fn default_config() -> Value {
    json!({
        "pipeline_name": DEFAULT_PIPELINE_NAME,
        "horizon_hours": dayahead_core::validation::settings::DEFAULT_HORIZON_HOURS,
        "history_days": DEFAULT_HISTORY_DAYS,
        "data_sources": {},
        "products": [],
        "fallback": {
            "enabled": true,
            "max_search_days": DEFAULT_MAX_SEARCH_DAYS,
        },
        "validation": {
            "schema": true,
            "completeness": true,
            "plausibility": true,
            "consistency": true,
        },
        "storage": {
            "format": "parquet",
            "compression": "snappy",
            "path": DEFAULT_STORAGE_PATH,
        },
        "thresholds": {
            "bounds": {},
            "product_kinds": {},
            "z_score": {
                "energy": ProductKind::Energy.default_z_threshold(),
                "ancillary": ProductKind::Ancillary.default_z_threshold(),
            },
            "smoothness": dayahead_core::validation::settings::DEFAULT_SMOOTHNESS_THRESHOLD,
        },
    })
}

/// Deep-merge `overlay` over `base` into a new value.
///
/// Nested objects merge key by key; scalars and lists from `overlay`
/// replace what `base` has. Neither input is modified.
pub fn merge_configs(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => merge_configs(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Every structural problem in a caller-supplied config.
pub fn config_issues(config: &Value) -> Vec<ConfigError> {
    let Some(root) = config.as_object() else {
        return vec![ConfigError::NotAnObject];
    };

    let mut issues = Vec::new();
    for section in REQUIRED_SECTIONS {
        if !root.contains_key(section) {
            issues.push(ConfigError::MissingSection(section.to_string()));
        }
    }

    if let Some(v) = root.get("data_sources") {
        if !v.is_object() {
            issues.push(invalid("data_sources", "must be a table of source configs"));
        }
    }

    let mut products = BTreeSet::new();
    if let Some(v) = root.get("products") {
        match v.as_array() {
            None => issues.push(invalid("products", "must be a list of product names")),
            Some(list) if list.is_empty() => issues.push(invalid("products", "must not be empty")),
            Some(list) => {
                for item in list {
                    match item.as_str() {
                        Some(name) if !name.trim().is_empty() => {
                            if !products.insert(name.to_string()) {
                                issues.push(invalid("products", format!("duplicate product '{name}'")));
                            }
                        }
                        _ => issues.push(invalid("products", format!("{item} is not a product name"))),
                    }
                }
            }
        }
    }

    if let Some(v) = root.get("fallback") {
        check_table(v, "fallback", &mut issues, |t, issues| {
            require_bool(t, "fallback", "enabled", issues);
            match t.get("max_search_days") {
                None => issues.push(invalid("fallback.max_search_days", "missing")),
                Some(d) if d.as_i64().is_none() => {
                    issues.push(invalid("fallback.max_search_days", "must be an integer"))
                }
                Some(_) => {}
            }
        });
    }

    if let Some(v) = root.get("validation") {
        check_table(v, "validation", &mut issues, |t, issues| {
            for key in ["schema", "completeness", "plausibility"] {
                require_bool(t, "validation", key, issues);
            }
            if let Some(c) = t.get("consistency") {
                if !c.is_boolean() {
                    issues.push(invalid("validation.consistency", "must be a boolean"));
                }
            }
        });
    }

    if let Some(v) = root.get("storage") {
        check_table(v, "storage", &mut issues, |t, issues| {
            let format = t.get("format").and_then(Value::as_str);
            let compression = t.get("compression").and_then(Value::as_str);
            match (format, compression) {
                (Some(f), Some(c)) => {
                    if let Err(e) = StoreOptions::from_names(f, c) {
                        issues.push(e.into());
                    }
                }
                _ => {
                    if format.is_none() {
                        issues.push(invalid("storage.format", "must be a string"));
                    }
                    if compression.is_none() {
                        issues.push(invalid("storage.compression", "must be a string"));
                    }
                }
            }
            if let Some(p) = t.get("path") {
                if !p.is_string() {
                    issues.push(invalid("storage.path", "must be a string"));
                }
            }
        });
    }

    if let Some(v) = root.get("pipeline_name") {
        if v.as_str().map_or(true, |s| s.trim().is_empty()) {
            issues.push(invalid("pipeline_name", "must be a non-empty string"));
        }
    }
    if let Some(v) = root.get("horizon_hours") {
        match v.as_u64() {
            Some(h) if (1..=MAX_HORIZON_HOURS).contains(&h) => {}
            _ => issues.push(invalid(
                "horizon_hours",
                format!("must be an integer in 1..={MAX_HORIZON_HOURS}"),
            )),
        }
    }
    if let Some(v) = root.get("history_days") {
        match v.as_u64() {
            Some(d) if d <= MAX_HISTORY_DAYS => {}
            _ => issues.push(invalid(
                "history_days",
                format!("must be an integer in 0..={MAX_HISTORY_DAYS}"),
            )),
        }
    }
    if let Some(v) = root.get("thresholds") {
        check_thresholds(v, &products, &mut issues);
    }

    issues
}

/// Structural validation of a caller-supplied config.
pub fn validate_config(config: &Value) -> Result<(), ConfigError> {
    let mut issues = config_issues(config);
    match issues.len() {
        0 => Ok(()),
        1 => Err(issues.remove(0)),
        _ => Err(ConfigError::Multiple(issues)),
    }
}

pub fn is_valid_config(config: &Value) -> bool {
    config_issues(config).is_empty()
}

fn check_table(
    value: &Value,
    section: &str,
    issues: &mut Vec<ConfigError>,
    check: impl FnOnce(&Map<String, Value>, &mut Vec<ConfigError>),
) {
    match value.as_object() {
        Some(table) => check(table, issues),
        None => issues.push(invalid(section, "must be a table")),
    }
}

fn require_bool(table: &Map<String, Value>, section: &str, key: &str, issues: &mut Vec<ConfigError>) {
    if !table.get(key).is_some_and(Value::is_boolean) {
        issues.push(invalid(&format!("{section}.{key}"), "must be a boolean"));
    }
}

/// Caller-side view of `thresholds`; every part optional.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThresholdsSection {
    #[serde(default)]
    bounds: BTreeMap<String, Bounds>,
    #[serde(default)]
    product_kinds: BTreeMap<String, ProductKind>,
    #[serde(default)]
    z_score: BTreeMap<String, f64>,
    smoothness: Option<f64>,
    relationships: Option<Vec<Relationship>>,
}

fn check_thresholds(value: &Value, products: &BTreeSet<String>, issues: &mut Vec<ConfigError>) {
    let section: ThresholdsSection = match serde_json::from_value(value.clone()) {
        Ok(s) => s,
        Err(e) => {
            issues.push(invalid("thresholds", e.to_string()));
            return;
        }
    };

    for (product, b) in &section.bounds {
        if !(b.min.is_finite() && b.max.is_finite() && b.min <= b.max) {
            issues.push(invalid(
                &format!("thresholds.bounds.{product}"),
                format!("min {} must not exceed max {}", b.min, b.max),
            ));
        }
    }
    for (kind, threshold) in &section.z_score {
        if kind != "energy" && kind != "ancillary" {
            issues.push(invalid(&format!("thresholds.z_score.{kind}"), "unknown product kind"));
        } else if !(threshold.is_finite() && *threshold > 0.0) {
            issues.push(invalid(&format!("thresholds.z_score.{kind}"), "must be positive"));
        }
    }
    if let Some(s) = section.smoothness {
        if !(s.is_finite() && s > 0.0) {
            issues.push(invalid("thresholds.smoothness", "must be positive"));
        }
    }
    for rel in section.relationships.iter().flatten() {
        for side in [&rel.left, &rel.right] {
            if !products.is_empty() && !products.contains(side) {
                issues.push(invalid(
                    "thresholds.relationships",
                    format!("'{side}' is not a configured product"),
                ));
            }
        }
    }
    for product in section.product_kinds.keys() {
        if !products.is_empty() && !products.contains(product) {
            issues.push(invalid(
                &format!("thresholds.product_kinds.{product}"),
                "not a configured product",
            ));
        }
    }
}

/// Convert a parsed TOML document to the JSON tree used for merging.
pub fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(d) => Value::String(d.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Read a TOML config file into a JSON tree (not yet validated).
pub fn load_config_file(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let parsed: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(toml_to_json(parsed))
}

// ── Typed configuration ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub max_search_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationToggles {
    pub schema: bool,
    pub completeness: bool,
    pub plausibility: bool,
    #[serde(default = "default_true")]
    pub consistency: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub format: String,
    pub compression: String,
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_PATH)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    #[serde(default)]
    pub bounds: BTreeMap<String, Bounds>,
    #[serde(default)]
    pub product_kinds: BTreeMap<String, ProductKind>,
    #[serde(default)]
    pub z_score: ZScoreThresholds,
    pub smoothness: f64,
    /// `None` means every energy product must price above every ancillary one.
    #[serde(default)]
    pub relationships: Option<Vec<Relationship>>,
}

/// Merged, validated configuration for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pipeline_name: String,
    pub horizon_hours: u32,
    pub history_days: u32,
    pub data_sources: BTreeMap<String, Value>,
    pub products: Vec<String>,
    pub fallback: FallbackConfig,
    pub validation: ValidationToggles,
    pub storage: StorageConfig,
    pub thresholds: ThresholdsConfig,
}

impl PipelineConfig {
    /// Typed view of an already merged config tree.
    pub fn from_value(merged: &Value) -> Result<Self, ConfigError> {
        serde_json::from_value(merged.clone()).map_err(|e| ConfigError::Deserialize(e.to_string()))
    }

    /// Validate `caller`, merge it over the defaults, and type it.
    pub fn resolve(caller: &Value) -> Result<(Self, Value), ConfigError> {
        validate_config(caller)?;
        let merged = merge_configs(&default_config(), caller);
        let typed = Self::from_value(&merged)?;
        Ok((typed, merged))
    }

    pub fn store_options(&self) -> Result<StoreOptions, ConfigError> {
        Ok(StoreOptions::from_names(
            &self.storage.format,
            &self.storage.compression,
        )?)
    }

    pub fn catalog(&self) -> ProductCatalog {
        ProductCatalog::with_overrides(self.thresholds.product_kinds.clone())
    }

    /// First day of history fetched for `target_date`, `None` if it falls
    /// before the earliest representable date.
    pub fn history_start(&self, target_date: NaiveDate) -> Option<NaiveDate> {
        target_date.checked_sub_days(chrono::Days::new(u64::from(self.history_days)))
    }

    pub fn validation_settings(&self) -> ValidationSettings {
        let catalog = self.catalog();
        let relationships = match &self.thresholds.relationships {
            Some(configured) => configured.clone(),
            None => Relationship::energy_over_ancillary(&self.products, &catalog),
        };
        ValidationSettings {
            schema: self.validation.schema,
            completeness: self.validation.completeness,
            plausibility: self.validation.plausibility,
            consistency: self.validation.consistency,
            products: self.products.clone(),
            horizon_hours: self.horizon_hours,
            catalog,
            bounds: self.thresholds.bounds.clone(),
            z_score: self.thresholds.z_score,
            smoothness_threshold: self.thresholds.smoothness,
            relationships,
        }
    }
}
